//! 表示状態のクエリ文字列
//!
//! `lat`, `lon`, `zoom`, `selected_id` を読み書きする。
//! それ以外のパラメータは順序ごと保持する。

use crate::types::{LngLat, Viewport};
use url::form_urlencoded;

const LAT: &str = "lat";
const LON: &str = "lon";
const ZOOM: &str = "zoom";
const SELECTED_ID: &str = "selected_id";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewQuery {
    params: Vec<(String, String)>,
}

impl ViewQuery {
    /// `?` 付きでも可
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self {
            params: form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 既存のキーは位置を保って置き換え、無ければ末尾に追加
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let mut replaced = false;
        self.params.retain_mut(|(k, v)| {
            if k != key {
                return true;
            }
            if replaced {
                return false;
            }
            *v = value.clone();
            replaced = true;
            true
        });
        if !replaced {
            self.params.push((key.to_string(), value));
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.params.retain(|(k, _)| k != key);
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.get(key)?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// lat/lon/zoom がすべて読めたときだけ初期表示を返す
    pub fn initial_view(&self) -> Option<(LngLat, f64)> {
        let lat = self.number(LAT)?;
        let lon = self.number(LON)?;
        let zoom = self.number(ZOOM)?;
        Some((LngLat::new(lon, lat), zoom))
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.get(SELECTED_ID).filter(|id| !id.is_empty())
    }

    pub fn set_view(&mut self, viewport: &Viewport) {
        self.set(LAT, format!("{:.4}", viewport.center.lat));
        self.set(LON, format!("{:.4}", viewport.center.lon));
        self.set(ZOOM, format!("{:.1}", viewport.zoom));
    }

    pub fn set_selected(&mut self, id: Option<&str>) {
        match id {
            Some(id) => self.set(SELECTED_ID, id),
            None => self.remove(SELECTED_ID),
        }
    }

    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BBox;

    fn viewport(lon: f64, lat: f64, zoom: f64) -> Viewport {
        Viewport::new(LngLat::new(lon, lat), zoom, BBox::new(-1.0, -1.0, 1.0, 1.0))
    }

    #[test]
    fn test_initial_view() {
        let q = ViewQuery::parse("?lat=35.6812&lon=139.7671&zoom=12.5");
        assert_eq!(q.initial_view(), Some((LngLat::new(139.7671, 35.6812), 12.5)));
    }

    #[test]
    fn test_initial_view_requires_all_three() {
        assert!(ViewQuery::parse("lat=1&lon=2").initial_view().is_none());
        assert!(ViewQuery::parse("lat=1&lon=abc&zoom=3").initial_view().is_none());
        assert!(ViewQuery::parse("").initial_view().is_none());
    }

    #[test]
    fn test_set_view_formats_and_preserves_others() {
        let mut q = ViewQuery::parse("basemap=hot&zoom=3&lang=ja");
        q.set_view(&viewport(139.767_123, 35.681_234, 12.46));
        assert_eq!(
            q.to_query_string(),
            "basemap=hot&zoom=12.5&lang=ja&lat=35.6812&lon=139.7671"
        );
    }

    #[test]
    fn test_selected_id_roundtrip() {
        let mut q = ViewQuery::parse("selected_id=abc%20def");
        assert_eq!(q.selected_id(), Some("abc def"));

        q.set_selected(None);
        assert!(q.selected_id().is_none());
        assert!(!q.to_query_string().contains("selected_id"));

        q.set_selected(Some("5a1b"));
        assert_eq!(q.to_query_string(), "selected_id=5a1b");
    }

    #[test]
    fn test_set_collapses_duplicates() {
        let mut q = ViewQuery::parse("lat=1&x=2&lat=3");
        q.set("lat", "9");
        assert_eq!(q.to_query_string(), "lat=9&x=2");
    }
}
