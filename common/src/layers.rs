//! レイヤー表示状態
//!
//! 表示モード（フットプリントのみ / ライブプレビュー）と
//! アイテム単位の手動上書きから、画像オーバーレイを出すべき
//! アイテムの集合を決める。
//!
//! - FootprintsOnly: `manual_show` に入っているものだけ表示
//! - LivePreviews: `manual_hide` 以外すべて表示（ズーム 8 未満は自動表示なし）
//! - `manual_show` のピンはモードとズームに関係なく常に有効
//!
//! モードを切り替えても両方の集合は保持される。

use crate::error::{Error, Result};
use crate::footprint::FootprintItem;
use crate::types::LngLat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// ライブプレビューで自動表示を始めるズーム
pub const PREVIEW_MIN_ZOOM: f64 = 8.0;

/// プレビュー画像レイヤーIDの接頭辞
pub const PREVIEW_LAYER_PREFIX: &str = "preview-";

/// 表示モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayerMode {
    #[default]
    #[serde(rename = "none")]
    FootprintsOnly,
    #[serde(rename = "previews")]
    LivePreviews,
}

impl FromStr for LayerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "footprints" => Ok(Self::FootprintsOnly),
            "previews" => Ok(Self::LivePreviews),
            other => Err(Error::Parse(format!("unknown layer mode '{}'", other))),
        }
    }
}

impl fmt::Display for LayerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FootprintsOnly => write!(f, "Footprints Only"),
            Self::LivePreviews => write!(f, "Live Previews"),
        }
    }
}

/// 画面に出す案内
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayNotice {
    ZoomIn,
}

impl fmt::Display for OverlayNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZoomIn => write!(f, "Zoom in to see images"),
        }
    }
}

/// 表示状態（モード + 手動上書き）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerVisibilityState {
    mode: LayerMode,
    manual_show: BTreeSet<String>,
    manual_hide: BTreeSet<String>,
}

impl LayerVisibilityState {
    pub fn new(mode: LayerMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn mode(&self) -> LayerMode {
        self.mode
    }

    /// モード切り替え（ピン・除外はそのまま）
    pub fn set_mode(&mut self, mode: LayerMode) {
        self.mode = mode;
    }

    pub fn manual_show(&self) -> &BTreeSet<String> {
        &self.manual_show
    }

    pub fn manual_hide(&self) -> &BTreeSet<String> {
        &self.manual_hide
    }

    /// 現在のモードの集合で id を出し入れする
    ///
    /// 戻り値は操作後に集合へ含まれているかどうか
    pub fn toggle(&mut self, id: &str) -> bool {
        let set = match self.mode {
            LayerMode::FootprintsOnly => &mut self.manual_show,
            LayerMode::LivePreviews => &mut self.manual_hide,
        };
        if set.remove(id) {
            false
        } else {
            set.insert(id.to_string());
            true
        }
    }

    pub fn effective(&self, zoom: f64, items: &[FootprintItem]) -> BTreeSet<String> {
        effective_overlay_set(self.mode, &self.manual_show, &self.manual_hide, zoom, items)
    }

    pub fn notice(&self, zoom: f64) -> Option<OverlayNotice> {
        overlay_notice(self.mode, zoom)
    }
}

/// オーバーレイを出すアイテムIDの集合
///
/// サムネイルを持つ現在のアイテムに限る。結果セットに無いピンは含めない。
pub fn effective_overlay_set(
    mode: LayerMode,
    manual_show: &BTreeSet<String>,
    manual_hide: &BTreeSet<String>,
    zoom: f64,
    items: &[FootprintItem],
) -> BTreeSet<String> {
    let auto_show = mode == LayerMode::LivePreviews && zoom >= PREVIEW_MIN_ZOOM;

    items
        .iter()
        .filter(|item| item.thumbnail().is_some())
        .map(FootprintItem::id)
        .filter(|id| manual_show.contains(*id) || (auto_show && !manual_hide.contains(*id)))
        .map(str::to_string)
        .collect()
}

pub fn overlay_notice(mode: LayerMode, zoom: f64) -> Option<OverlayNotice> {
    (mode == LayerMode::LivePreviews && zoom < PREVIEW_MIN_ZOOM).then_some(OverlayNotice::ZoomIn)
}

/// 描画中の集合と目標集合の差分
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayDiff {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl OverlayDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

pub fn diff_overlays(rendered: &BTreeSet<String>, wanted: &BTreeSet<String>) -> OverlayDiff {
    OverlayDiff {
        add: wanted.difference(rendered).cloned().collect(),
        remove: rendered.difference(wanted).cloned().collect(),
    }
}

pub fn preview_layer_id(item_id: &str) -> String {
    format!("{}{}", PREVIEW_LAYER_PREFIX, item_id)
}

/// プレビューレイヤーIDからアイテムIDを取り出す
pub fn preview_item_id(layer_id: &str) -> Option<&str> {
    layer_id.strip_prefix(PREVIEW_LAYER_PREFIX)
}

/// サムネイルURLの解決方法
///
/// 画像の取得経路（中継サーバ等）は利用側で差し替える
pub trait ThumbnailResolver: Send + Sync {
    fn resolve(&self, raw: &str) -> String;
}

/// URLをそのまま使う
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectThumbnails;

impl ThumbnailResolver for DirectThumbnails {
    fn resolve(&self, raw: &str) -> String {
        raw.to_string()
    }
}

/// 四隅で位置合わせしたラスター画像
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOverlay {
    pub layer_id: String,
    pub url: String,
    /// 左上・右上・右下・左下
    pub corners: [LngLat; 4],
}

/// アイテムの外接矩形にサムネイルを貼るオーバーレイを作る
pub fn build_overlay(
    layer_id: impl Into<String>,
    item: &FootprintItem,
    resolver: &dyn ThumbnailResolver,
) -> Result<ImageOverlay> {
    let raw = item
        .thumbnail()
        .ok_or_else(|| Error::Overlay(format!("{}: no thumbnail", item.id())))?;
    let bounds = item
        .bounds()
        .ok_or_else(|| Error::Overlay(format!("{}: cannot compute corners", item.id())))?;
    bounds.validate()?;

    Ok(ImageOverlay {
        layer_id: layer_id.into(),
        url: resolver.resolve(raw),
        corners: bounds.overlay_corners(),
    })
}
