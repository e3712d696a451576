//! 選択とハイライト
//!
//! 選択は常に高々1件。アイテム本体は持たず、IDと大きさの分類だけを覚える。

use crate::footprint::FootprintItem;
use crate::layers::{build_overlay, ThumbnailResolver};
use crate::surface::{FitOptions, LayerFilter, MapSurface, HIGHLIGHT_LAYER};
use crate::sync::MoveIntent;

/// 選択中アイテムの全体画像レイヤー
pub const SELECTED_OVERLAY_ID: &str = "selected-thumbnail";

/// 選択時の fit 設定
pub const SELECTION_FIT: FitOptions = FitOptions {
    padding: 50.0,
    max_zoom: Some(18.0),
    duration_ms: 1500,
};

/// 選択の発生元
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectSource {
    /// 地図上の足跡をクリック（既に見えているので fit しない）
    MapClick,
    /// 一覧から選択
    List,
    /// URL の selected_id から復元
    Restore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    pub id: String,
    pub is_large: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionOverlay {
    selected: Option<Selected>,
}

impl SelectionOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&Selected> {
        self.selected.as_ref()
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_ref().map(|s| s.id.as_str())
    }

    pub fn selected_is_large(&self) -> Option<bool> {
        self.selected.as_ref().map(|s| s.is_large)
    }

    /// 選択してハイライトする
    ///
    /// fit を発行したら true。fit と画像追加の失敗はログのみで選択は成立する
    pub fn select<S: MapSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        item: &FootprintItem,
        source: SelectSource,
        resolver: &dyn ThumbnailResolver,
    ) -> bool {
        surface.remove_image_overlay(SELECTED_OVERLAY_ID);
        surface.set_layer_filter(HIGHLIGHT_LAYER, LayerFilter::IdEquals(item.id().to_string()));
        self.selected = Some(Selected {
            id: item.id().to_string(),
            is_large: item.is_large(),
        });

        let mut fitted = false;
        if source != SelectSource::MapClick {
            match item.bounds() {
                Some(bounds) => {
                    match surface.fit_bounds(bounds, &SELECTION_FIT, MoveIntent::Programmatic) {
                        Ok(()) => fitted = true,
                        Err(e) => tracing::warn!("fit to selection {} ignored: {}", item.id(), e),
                    }
                }
                None => tracing::warn!("fit to selection {} ignored: no bounds", item.id()),
            }
        }

        if item.thumbnail().is_some() {
            let added = build_overlay(SELECTED_OVERLAY_ID, item, resolver)
                .and_then(|overlay| surface.add_image_overlay(overlay));
            if let Err(e) = added {
                tracing::warn!("Error adding selected image {}: {}", item.id(), e);
            }
        }

        tracing::debug!(id = item.id(), ?source, fitted, "selected");
        fitted
    }

    /// 選択解除。選択があった場合 true
    pub fn clear<S: MapSurface + ?Sized>(&mut self, surface: &mut S) -> bool {
        surface.remove_image_overlay(SELECTED_OVERLAY_ID);
        surface.set_layer_filter(HIGHLIGHT_LAYER, LayerFilter::MatchNone);
        self.selected.take().is_some()
    }
}
