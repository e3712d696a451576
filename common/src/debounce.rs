//! デバウンス用タイマースロット
//!
//! チャネルごとに保留中のタイマーは高々1つ。再設定すると前のハンドルは
//! 無効になり、呼び出し側がキャンセルする。実際のタイマーは
//! ホスト側（tokio 等）が持ち、発火時にハンドルを返してくる。

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// グリッド再生成の待ち時間
pub const GRID_REGEN_DELAY: Duration = Duration::from_millis(300);
/// データ再取得の待ち時間
pub const FETCH_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerChannel {
    GridRegen,
    FetchTrigger,
}

impl TimerChannel {
    pub fn delay(&self) -> Duration {
        match self {
            Self::GridRegen => GRID_REGEN_DELAY,
            Self::FetchTrigger => FETCH_DELAY,
        }
    }
}

/// 保留中タイマーの識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerHandle {
    pub channel: TimerChannel,
    pub generation: u64,
}

/// 1チャネル分のスロット
#[derive(Debug, Clone)]
pub struct DebounceSlot {
    channel: TimerChannel,
    generation: u64,
    pending: Option<TimerHandle>,
}

impl DebounceSlot {
    pub fn new(channel: TimerChannel) -> Self {
        Self {
            channel,
            generation: 0,
            pending: None,
        }
    }

    pub fn channel(&self) -> TimerChannel {
        self.channel
    }

    /// 新しいハンドルを発行する
    ///
    /// 戻り値: (新しいハンドル, 置き換えられた保留中ハンドル)
    pub fn arm(&mut self) -> (TimerHandle, Option<TimerHandle>) {
        self.generation += 1;
        let handle = TimerHandle {
            channel: self.channel,
            generation: self.generation,
        };
        let replaced = self.pending.replace(handle);
        (handle, replaced)
    }

    pub fn cancel(&mut self) -> Option<TimerHandle> {
        self.pending.take()
    }

    /// 発火通知。保留中のハンドルと一致した場合のみ true
    pub fn fire(&mut self, handle: TimerHandle) -> bool {
        if self.pending == Some(handle) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<TimerHandle> {
        self.pending
    }
}
