//! ビューポート同期
//!
//! 地図の移動イベントを受けて、表示状態の保存・グリッド再生成・
//! 再取得・選択の自動解除を決める。副作用は `SyncEffect` として返し、
//! 実行は呼び出し側に任せる。
//!
//! 状態遷移: Idle → (移動開始) → Moving → (移動終了) → Settling → (タイマー消化) → Idle

use crate::debounce::{DebounceSlot, TimerChannel, TimerHandle};
use crate::types::{BBox, LngLat, Viewport};
use serde::{Deserialize, Serialize};

/// 大きい画像の選択を保つ最小ズーム
pub const LARGE_SELECTION_MIN_ZOOM: f64 = 8.0;
/// 小さい画像の選択を保つ最小ズーム
pub const SMALL_SELECTION_MIN_ZOOM: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    Moving,
    Settling,
}

/// 移動の発生元
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveIntent {
    /// ユーザー操作
    #[default]
    User,
    /// システムによる fit（検索結果・選択）
    Programmatic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEffect {
    /// 表示状態をクエリ文字列へ保存
    PersistView(Viewport),
    Schedule(TimerHandle),
    Cancel(TimerHandle),
    /// 選択解除
    Deselect,
    RegenerateGrid,
    TriggerFetch { bounds: BBox, center: LngLat },
}

/// 選択中アイテムの足跡がこのズームで描かれなくなるか
pub fn should_auto_deselect(is_large: bool, zoom: f64) -> bool {
    let threshold = if is_large {
        LARGE_SELECTION_MIN_ZOOM
    } else {
        SMALL_SELECTION_MIN_ZOOM
    };
    zoom < threshold
}

#[derive(Debug, Clone)]
pub struct ViewportSync {
    phase: SyncPhase,
    grid: DebounceSlot,
    fetch: DebounceSlot,
    last_viewport: Option<Viewport>,
}

impl Default for ViewportSync {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewportSync {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Idle,
            grid: DebounceSlot::new(TimerChannel::GridRegen),
            fetch: DebounceSlot::new(TimerChannel::FetchTrigger),
            last_viewport: None,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn last_viewport(&self) -> Option<Viewport> {
        self.last_viewport
    }

    pub fn pending(&self, channel: TimerChannel) -> Option<TimerHandle> {
        self.slot(channel).pending()
    }

    fn slot(&self, channel: TimerChannel) -> &DebounceSlot {
        match channel {
            TimerChannel::GridRegen => &self.grid,
            TimerChannel::FetchTrigger => &self.fetch,
        }
    }

    fn slot_mut(&mut self, channel: TimerChannel) -> &mut DebounceSlot {
        match channel {
            TimerChannel::GridRegen => &mut self.grid,
            TimerChannel::FetchTrigger => &mut self.fetch,
        }
    }

    /// 移動開始。保留中の再取得は取り消す
    pub fn move_started(&mut self) -> Vec<SyncEffect> {
        self.phase = SyncPhase::Moving;
        self.fetch
            .cancel()
            .map(SyncEffect::Cancel)
            .into_iter()
            .collect()
    }

    /// 移動終了
    ///
    /// `selected_is_large` は選択中アイテムの分類（未選択なら None）
    pub fn move_ended(
        &mut self,
        viewport: Viewport,
        intent: MoveIntent,
        selected_is_large: Option<bool>,
    ) -> Vec<SyncEffect> {
        self.phase = SyncPhase::Settling;
        self.last_viewport = Some(viewport);

        let mut effects = vec![SyncEffect::PersistView(viewport)];
        self.rearm(TimerChannel::GridRegen, &mut effects);

        if let Some(is_large) = selected_is_large {
            if should_auto_deselect(is_large, viewport.zoom) {
                tracing::debug!(zoom = viewport.zoom, is_large, "selection out of visible zoom");
                effects.push(SyncEffect::Deselect);
            }
        }

        match intent {
            MoveIntent::User => self.rearm(TimerChannel::FetchTrigger, &mut effects),
            MoveIntent::Programmatic => {
                tracing::debug!("programmatic move, fetch not scheduled");
            }
        }

        effects
    }

    fn rearm(&mut self, channel: TimerChannel, effects: &mut Vec<SyncEffect>) {
        let (handle, replaced) = self.slot_mut(channel).arm();
        if let Some(old) = replaced {
            effects.push(SyncEffect::Cancel(old));
        }
        effects.push(SyncEffect::Schedule(handle));
    }

    /// タイマー発火。置き換え済みのハンドルは無視する
    pub fn timer_fired(&mut self, handle: TimerHandle) -> Vec<SyncEffect> {
        if !self.slot_mut(handle.channel).fire(handle) {
            tracing::trace!(?handle, "stale timer ignored");
            return Vec::new();
        }

        let mut effects = Vec::new();
        match handle.channel {
            TimerChannel::GridRegen => effects.push(SyncEffect::RegenerateGrid),
            TimerChannel::FetchTrigger => {
                if let Some(viewport) = self.last_viewport {
                    effects.push(SyncEffect::TriggerFetch {
                        bounds: viewport.bounds,
                        center: viewport.center,
                    });
                }
            }
        }

        if self.phase == SyncPhase::Settling && !self.grid.is_pending() && !self.fetch.is_pending() {
            self.phase = SyncPhase::Idle;
        }
        effects
    }
}
