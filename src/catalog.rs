//! カタログ取得
//!
//! - `CatalogClient`: OpenAerialMap `/meta` API（reqwest）
//! - `FixtureSource`: 保存済みファイルからの読み込み（オフライン・テスト用）

use crate::config::Config;
use crate::error::{OamError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use oam_browser_common::catalog::{load_items, normalize_records, MetaResponse};
use oam_browser_common::footprint::to_feature_collection;
use oam_browser_common::{CatalogFilters, CatalogQuery, FootprintItem};
use std::path::Path;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 取得元
#[async_trait]
pub trait DataSource: Send + Sync {
    /// 条件に合うアイテムを新しい順に返す（0件もあり得る）
    async fn fetch(&self, query: &CatalogQuery) -> Result<Vec<FootprintItem>>;
}

/// `/meta` API クライアント
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base: Url,
}

impl CatalogClient {
    pub fn new(api_base: &str) -> Result<Self> {
        let mut base = Url::parse(api_base)
            .map_err(|e| OamError::Config(format!("APIのURLが不正です ({}): {}", api_base, e)))?;
        // join は末尾 `/` の無いパス要素を置き換えるため、接頭辞として扱えるようにする
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, base })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.api_base)
    }

    /// リクエストURL
    pub fn meta_url(&self, query: &CatalogQuery) -> Result<Url> {
        let mut url = self
            .base
            .join("meta")
            .map_err(|e| OamError::Config(format!("APIのURLが不正です: {}", e)))?;
        url.query_pairs_mut().extend_pairs(query.to_pairs());
        Ok(url)
    }
}

#[async_trait]
impl DataSource for CatalogClient {
    async fn fetch(&self, query: &CatalogQuery) -> Result<Vec<FootprintItem>> {
        let url = self.meta_url(query)?;
        tracing::debug!(%url, "catalog request");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OamError::ApiResponse(format!("HTTP {}", status)));
        }

        let body: MetaResponse = response.json().await?;
        let items = normalize_records(body.results.unwrap_or_default());
        let items = query.filters.apply(items);
        tracing::debug!(count = items.len(), "catalog response");
        Ok(items)
    }
}

/// 固定データ
///
/// API と同じく範囲・撮影日・フィルタ・件数上限を適用する
#[derive(Debug, Clone, Default)]
pub struct FixtureSource {
    items: Vec<FootprintItem>,
}

impl FixtureSource {
    pub fn new(items: Vec<FootprintItem>) -> Self {
        Self { items }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(read_items(path)?))
    }
}

#[async_trait]
impl DataSource for FixtureSource {
    async fn fetch(&self, query: &CatalogQuery) -> Result<Vec<FootprintItem>> {
        let in_range = |item: &FootprintItem| match (&query.bbox, item.bounds()) {
            (Some(bbox), Some(bounds)) => bbox.intersects(&bounds),
            (Some(_), None) => false,
            (None, _) => true,
        };

        Ok(self
            .items
            .iter()
            .filter(|item| {
                in_range(item) && acquired_within(item, &query.filters) && query.filters.accepts(item)
            })
            .take(query.limit as usize)
            .cloned()
            .collect())
    }
}

/// 撮影日が範囲内か（日付不明は範囲指定があれば除外）
fn acquired_within(item: &FootprintItem, filters: &CatalogFilters) -> bool {
    if filters.date_start.is_none() && filters.date_end.is_none() {
        return true;
    }
    let date = item
        .meta()
        .date
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
    let Some(date) = date else {
        return false;
    };
    filters.date_start.map_or(true, |start| date >= start)
        && filters.date_end.map_or(true, |end| date <= end)
}

/// 保存済みファイル（/meta レスポンス or FeatureCollection）を読む
pub fn read_items(path: &Path) -> Result<Vec<FootprintItem>> {
    if !path.exists() {
        return Err(OamError::FileNotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(load_items(&content)?)
}

/// FeatureCollection として保存
pub fn write_items(path: &Path, items: &[FootprintItem]) -> Result<()> {
    let collection = to_feature_collection(items);
    let json = serde_json::to_string_pretty(&collection)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oam_browser_common::{BBox, PlatformFilter};

    #[test]
    fn test_meta_url() {
        let client = CatalogClient::new("https://api.openaerialmap.org").unwrap();
        let query = CatalogQuery::new(
            Some(BBox::new(-1.0, 2.0, 3.0, 4.0)),
            CatalogFilters {
                platform: Some(PlatformFilter::Uav),
                ..Default::default()
            },
            50,
        );
        let url = client.meta_url(&query).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.openaerialmap.org/meta?limit=50&order_by=acquisition_end&sort=desc&bbox=-1%2C2%2C3%2C4&platform=uav"
        );
    }

    #[test]
    fn test_meta_url_keeps_base_path() {
        let mut config = Config::default();
        config.set_api_base("https://proxy.example/oam/".into()).unwrap();
        let client = CatalogClient::from_config(&config).unwrap();
        let url = client
            .meta_url(&CatalogQuery::new(None, CatalogFilters::default(), 50))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://proxy.example/oam/meta?limit=50&order_by=acquisition_end&sort=desc"
        );

        let client = CatalogClient::new("http://localhost:5173/api").unwrap();
        let url = client
            .meta_url(&CatalogQuery::new(None, CatalogFilters::default(), 10))
            .unwrap();
        assert!(url.as_str().starts_with("http://localhost:5173/api/meta?"), "{}", url);
    }

    #[test]
    fn test_invalid_api_base() {
        assert!(matches!(CatalogClient::new("not a url"), Err(OamError::Config(_))));
    }
}
