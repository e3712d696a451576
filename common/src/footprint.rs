//! フットプリント（撮影範囲）アイテム
//!
//! 取得結果1件 = 1アイテム。結果セットの間は不変で、
//! 新しい取得のたびにコレクションごと置き換える。

use crate::error::{Error, Result};
use crate::types::BBox;
use geo::{Centroid, ChamberlainDuquetteArea, Geometry, MultiPolygon};
use geojson::{Feature, FeatureCollection, JsonObject};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 「大きい」画像とみなす面積（km²）
pub const LARGE_IMAGE_THRESHOLD_SQ_KM: f64 = 25.0;

/// 測地面積（km²）
pub fn footprint_area_sq_km(geometry: &MultiPolygon<f64>) -> f64 {
    geometry.chamberlain_duquette_unsigned_area() / 1_000_000.0
}

/// 大きいフットプリントかどうか
pub fn is_large_footprint(geometry: &MultiPolygon<f64>) -> bool {
    footprint_area_sq_km(geometry) >= LARGE_IMAGE_THRESHOLD_SQ_KM
}

/// ポリゴン系ジオメトリのみ受け付ける
///
/// 頂点が無く代表点を取れないもの（`"coordinates": []` など）も None
pub fn polygonal(geometry: Geometry<f64>) -> Option<MultiPolygon<f64>> {
    let polygons: MultiPolygon<f64> = match geometry {
        Geometry::Polygon(p) => p.into(),
        Geometry::MultiPolygon(m) => m,
        _ => return None,
    };
    let centroid = polygons.centroid()?;
    (centroid.x().is_finite() && centroid.y().is_finite()).then_some(polygons)
}

/// 表示用メタデータ（一覧カード・ポップアップ向け）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemMeta {
    pub uuid: String,
    pub title: String,
    pub provider: String,
    pub date: String,
    pub platform: String,
    pub sensor: String,
    pub gsd: String,
    pub file_size: String,
    pub license: String,
    pub tags: String,
}

/// フットプリントアイテム
#[derive(Debug, Clone, PartialEq)]
pub struct FootprintItem {
    id: String,
    geometry: MultiPolygon<f64>,
    is_large: bool,
    thumbnail: Option<String>,
    meta: ItemMeta,
}

impl FootprintItem {
    pub fn new(
        id: impl Into<String>,
        geometry: impl Into<MultiPolygon<f64>>,
        thumbnail: Option<String>,
    ) -> Self {
        let geometry = geometry.into();
        let is_large = is_large_footprint(&geometry);
        Self {
            id: id.into(),
            geometry,
            is_large,
            thumbnail: thumbnail.filter(|t| !t.is_empty()),
            meta: ItemMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: ItemMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn is_large(&self) -> bool {
        self.is_large
    }

    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }

    pub fn meta(&self) -> &ItemMeta {
        &self.meta
    }

    pub fn bounds(&self) -> Option<BBox> {
        BBox::of_geometry(&self.geometry)
    }

    /// GeoJSON Feature に変換（プロパティ: id, is_large, thumbnail + メタデータ）
    pub fn to_feature(&self) -> Feature {
        let mut properties = match serde_json::to_value(&self.meta) {
            Ok(Value::Object(map)) => map,
            _ => JsonObject::new(),
        };
        properties.insert("id".into(), Value::from(self.id.clone()));
        properties.insert("is_large".into(), Value::from(self.is_large));
        properties.insert(
            "thumbnail".into(),
            self.thumbnail.clone().map(Value::from).unwrap_or(Value::Null),
        );

        Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&self.geometry))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }

    /// `to_feature` で書き出した Feature から復元
    ///
    /// is_large は保存値を使わずジオメトリから再判定する
    pub fn from_feature(feature: &Feature) -> Result<Self> {
        let properties = feature.properties.clone().unwrap_or_default();
        let id = properties
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Parse("feature without string 'id' property".into()))?
            .to_string();

        let geometry = feature
            .geometry
            .clone()
            .ok_or_else(|| Error::Geometry(format!("{}: geometry missing", id)))?;
        let geometry: Geometry<f64> = geometry.value.try_into()?;
        let geometry = polygonal(geometry)
            .ok_or_else(|| Error::Geometry(format!("{}: no usable polygon", id)))?;

        let thumbnail = properties
            .get("thumbnail")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let meta: ItemMeta = serde_json::from_value(Value::Object(properties))?;

        Ok(Self::new(id, geometry, thumbnail).with_meta(meta))
    }
}

pub fn to_feature_collection(items: &[FootprintItem]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: items.iter().map(FootprintItem::to_feature).collect(),
        foreign_members: None,
    }
}
