//! カタログ（/meta API）の共有ロジック
//!
//! - レスポンスのレコード → FootprintItem への正規化
//! - 日付・プラットフォーム・ライセンスのフィルタ
//! - 検索クエリパラメータの組み立て
//!
//! 通信自体は持たない（CLI側の catalog モジュールが担当）。

use crate::error::{Error, Result};
use crate::footprint::{polygonal, FootprintItem, ItemMeta};
use crate::types::BBox;
use chrono::{Datelike, Duration, NaiveDate};
use geo::Geometry;
use geojson::GeoJson;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref LICENSE_NOISE: Regex = Regex::new(r"[\s-]").unwrap();
}

/// 1回の取得件数の既定値
pub const DEFAULT_RESULT_LIMIT: u32 = 50;

const GIB: f64 = 1_073_741_824.0;
const MIB: f64 = 1_048_576.0;

/// `/meta` レスポンス
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetaResponse {
    #[serde(default)]
    pub results: Option<Vec<MetaRecord>>,
}

/// レコード内の `properties`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecordProperties {
    pub thumbnail: Option<String>,
    pub platform: Option<String>,
    pub sensor: Option<String>,
    pub license: Option<String>,
}

/// 画像1件分のレコード
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetaRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub uuid: Option<String>,
    pub title: Option<String>,
    pub provider: Option<String>,
    pub geojson: Option<geojson::Geometry>,
    pub acquisition_end: Option<String>,
    pub platform: Option<String>,
    pub sensor: Option<String>,
    pub gsd: Option<f64>,
    pub file_size: Option<f64>,
    pub license: Option<String>,
    pub tags: Option<Vec<String>>,
    pub properties: Option<RecordProperties>,
}

/// 空文字は未設定扱い
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

pub fn format_gsd(gsd: Option<f64>) -> String {
    match gsd {
        Some(m) if m != 0.0 && m.is_finite() => format!("{:.2} m", m),
        _ => "N/A".to_string(),
    }
}

pub fn format_file_size(bytes: Option<f64>) -> String {
    match bytes {
        Some(b) if b != 0.0 && b.is_finite() => {
            if b >= GIB {
                format!("{:.2} GB", b / GIB)
            } else {
                format!("{} MB", (b / MIB).round() as i64)
            }
        }
        _ => "Unknown".to_string(),
    }
}

impl MetaRecord {
    fn nested(&self, pick: impl Fn(&RecordProperties) -> &Option<String>) -> Option<&str> {
        self.properties.as_ref().and_then(|p| present(pick(p)))
    }

    fn meta(&self) -> ItemMeta {
        ItemMeta {
            uuid: self.uuid.clone().unwrap_or_default(),
            title: present(&self.title).unwrap_or("Untitled Image").to_string(),
            provider: self.provider.clone().unwrap_or_default(),
            date: present(&self.acquisition_end).unwrap_or("Unknown Date").to_string(),
            platform: present(&self.platform)
                .or_else(|| self.nested(|p| &p.platform))
                .unwrap_or("unknown")
                .to_lowercase(),
            sensor: present(&self.sensor)
                .or_else(|| self.nested(|p| &p.sensor))
                .unwrap_or("Unknown Sensor")
                .to_string(),
            gsd: format_gsd(self.gsd),
            file_size: format_file_size(self.file_size),
            license: present(&self.license)
                .or_else(|| self.nested(|p| &p.license))
                .unwrap_or("Unknown License")
                .to_string(),
            tags: match &self.tags {
                Some(tags) => tags.join(", "),
                None => "None".to_string(),
            },
        }
    }

    /// ポリゴン系ジオメトリを持たないレコードはエラー
    pub fn into_item(self) -> Result<FootprintItem> {
        let meta = self.meta();
        let geometry = self
            .geojson
            .ok_or_else(|| Error::Geometry(format!("{}: record has no geojson", self.id)))?;
        let geometry: Geometry<f64> = geometry.value.try_into()?;
        let geometry = polygonal(geometry)
            .ok_or_else(|| Error::Geometry(format!("{}: footprint has no usable polygon", self.id)))?;

        let thumbnail = self
            .properties
            .and_then(|p| p.thumbnail)
            .filter(|t| !t.is_empty());

        Ok(FootprintItem::new(self.id, geometry, thumbnail).with_meta(meta))
    }
}

/// レコード列を正規化。使えないレコードは警告して飛ばす
pub fn normalize_records(records: Vec<MetaRecord>) -> Vec<FootprintItem> {
    records
        .into_iter()
        .filter_map(|record| {
            let id = record.id.clone();
            match record.into_item() {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!("skipping record {}: {}", id, e);
                    None
                }
            }
        })
        .collect()
}

/// `/meta` レスポンス本文 → アイテム（`results` が無ければ空）
pub fn parse_meta_response(body: &str) -> Result<Vec<FootprintItem>> {
    let response: MetaResponse = serde_json::from_str(body)?;
    Ok(normalize_records(response.results.unwrap_or_default()))
}

/// 保存済みファイルを読む
///
/// `/meta` レスポンス形式と、このツールが書き出す FeatureCollection の両方を受け付ける
pub fn load_items(json: &str) -> Result<Vec<FootprintItem>> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if value.get("type").and_then(|t| t.as_str()) == Some("FeatureCollection") {
        let GeoJson::FeatureCollection(collection) = GeoJson::from_json_value(value)? else {
            return Err(Error::Parse("expected a FeatureCollection".into()));
        };
        return collection
            .features
            .iter()
            .map(FootprintItem::from_feature)
            .collect();
    }

    let response: MetaResponse = serde_json::from_value(value)?;
    Ok(normalize_records(response.results.unwrap_or_default()))
}

/// プラットフォーム絞り込み
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFilter {
    Satellite,
    Uav,
    #[serde(alias = "other")]
    Aircraft,
}

impl PlatformFilter {
    pub fn as_query_value(&self) -> &'static str {
        match self {
            Self::Satellite => "satellite",
            Self::Uav => "uav",
            Self::Aircraft => "aircraft",
        }
    }

    /// 正規化済み（小文字）のプラットフォーム名と照合
    pub fn matches(&self, platform: &str) -> bool {
        let is_drone = platform == "uav" || platform == "drone";
        match self {
            Self::Satellite => platform == "satellite",
            Self::Uav => is_drone,
            Self::Aircraft => platform != "satellite" && !is_drone,
        }
    }
}

impl FromStr for PlatformFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "satellite" => Ok(Self::Satellite),
            "uav" | "drone" => Ok(Self::Uav),
            "aircraft" | "other" => Ok(Self::Aircraft),
            other => Err(Error::Parse(format!("unknown platform '{}'", other))),
        }
    }
}

impl fmt::Display for PlatformFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Satellite => write!(f, "Satellite"),
            Self::Uav => write!(f, "Drone"),
            Self::Aircraft => write!(f, "Other"),
        }
    }
}

fn squash_license(s: &str) -> String {
    LICENSE_NOISE.replace_all(s, "").to_lowercase()
}

/// 空白とハイフンを除いた部分一致
pub fn license_matches(filter: &str, license: &str) -> bool {
    squash_license(license).contains(&squash_license(filter))
}

/// 検索フィルタ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogFilters {
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub platform: Option<PlatformFilter>,
    pub license: Option<String>,
}

impl CatalogFilters {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn with_dates(mut self, (start, end): (Option<NaiveDate>, Option<NaiveDate>)) -> Self {
        self.date_start = start;
        self.date_end = end;
        self
    }

    /// プラットフォーム・ライセンスの照合（日付は API 側で絞る）
    pub fn accepts(&self, item: &FootprintItem) -> bool {
        let meta = item.meta();
        let platform_ok = self.platform.map_or(true, |p| p.matches(&meta.platform));
        let license_ok = match self.license.as_deref().filter(|l| !l.is_empty()) {
            Some(filter) => license_matches(filter, &meta.license),
            None => true,
        };
        platform_ok && license_ok
    }

    pub fn apply(&self, items: Vec<FootprintItem>) -> Vec<FootprintItem> {
        items.into_iter().filter(|item| self.accepts(item)).collect()
    }
}

/// 日付プリセット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePreset {
    AnyDate,
    PastWeek,
    PastMonth,
    YearToDate,
}

impl DatePreset {
    /// `today` 基準の (開始, 終了)
    pub fn range(&self, today: NaiveDate) -> (Option<NaiveDate>, Option<NaiveDate>) {
        match self {
            Self::AnyDate => (None, None),
            Self::PastWeek => (Some(today - Duration::days(7)), Some(today)),
            Self::PastMonth => (Some(today - Duration::days(30)), Some(today)),
            Self::YearToDate => (NaiveDate::from_ymd_opt(today.year(), 1, 1), Some(today)),
        }
    }
}

impl FromStr for DatePreset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "any" => Ok(Self::AnyDate),
            "week" => Ok(Self::PastWeek),
            "month" => Ok(Self::PastMonth),
            "ytd" => Ok(Self::YearToDate),
            other => Err(Error::Parse(format!("unknown date preset '{}'", other))),
        }
    }
}

/// 1回分の検索条件
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    pub bbox: Option<BBox>,
    pub filters: CatalogFilters,
    pub limit: u32,
}

impl CatalogQuery {
    pub fn new(bbox: Option<BBox>, filters: CatalogFilters, limit: u32) -> Self {
        Self { bbox, filters, limit }
    }

    /// `/meta` のクエリパラメータ
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("limit", self.limit.to_string()),
            ("order_by", "acquisition_end".to_string()),
            ("sort", "desc".to_string()),
        ];
        if let Some(bbox) = &self.bbox {
            pairs.push(("bbox", bbox.to_string()));
        }
        if let Some(start) = self.filters.date_start {
            pairs.push(("acquisition_from", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = self.filters.date_end {
            pairs.push(("acquisition_to", end.format("%Y-%m-%d").to_string()));
        }
        if let Some(platform) = self.filters.platform {
            pairs.push(("platform", platform.as_query_value().to_string()));
        }
        pairs
    }
}
