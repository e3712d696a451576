//! セッション実行
//!
//! `MapEngine` + `HeadlessSurface` を tokio 上のイベントループで動かす。
//!
//! - デバウンスタイマー: チャネルごとに1つの tokio タスク（取り消し時は abort）
//! - 取得: `DataSource` を別タスクで呼び、結果を `DataLoaded` として戻す
//! - 描画面が起こした移動（fit）は MoveStarted/MoveEnded として即時に配送
//!
//! リプレイスクリプトは `{ "at_ms": 0, "action": { "type": "pan_zoom", ... } }` の配列。

use crate::catalog::DataSource;
use crate::config::Config;
use crate::error::{OamError, Result};
use oam_browser_common::engine::EngineCommand;
use oam_browser_common::{
    BBox, CatalogFilters, CatalogQuery, FootprintItem, HeadlessSurface, LayerMode, LngLat,
    MapEngine, MapEvent, MapSurface, OverlayNotice, ThumbnailResolver, TimerChannel, TimerHandle,
    ViewQuery,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Duration, Instant};

/// 古い取得結果の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalePolicy {
    /// 届いた順に適用（後着優先）
    #[default]
    Apply,
    /// 最新の依頼より古い結果は捨てる
    Drop,
}

/// スクリプトの操作
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    PanZoom { center: LngLat, zoom: f64 },
    Click { lon: f64, lat: f64 },
    Select { id: String },
    Deselect,
    Mode { mode: LayerMode },
    Toggle { id: String },
    Search { bbox: BBox },
    Filters { filters: CatalogFilters },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptStep {
    /// セッション開始からの時刻
    pub at_ms: u64,
    pub action: Action,
}

/// スクリプトを読む（時刻は昇順であること）
pub fn parse_script(json: &str) -> Result<Vec<ScriptStep>> {
    let steps: Vec<ScriptStep> = serde_json::from_str(json)?;
    if let Some(w) = steps.windows(2).find(|w| w[1].at_ms < w[0].at_ms) {
        return Err(OamError::Script(format!(
            "at_ms が昇順ではありません ({} → {})",
            w[0].at_ms, w[1].at_ms
        )));
    }
    Ok(steps)
}

pub fn load_script(path: &Path) -> Result<Vec<ScriptStep>> {
    if !path.exists() {
        return Err(OamError::FileNotFound(path.display().to_string()));
    }
    parse_script(&std::fs::read_to_string(path)?)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub fetches_issued: u64,
    pub responses_applied: u64,
    pub responses_dropped: u64,
    pub fetch_errors: u64,
    pub timers_scheduled: u64,
    pub timers_cancelled: u64,
    pub grid_passes: u64,
    pub moves_delivered: u64,
}

/// 実行結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub query_string: String,
    pub center: LngLat,
    pub zoom: f64,
    pub bounds: BBox,
    pub item_count: usize,
    pub grid_zoom: u8,
    pub grid_cells: usize,
    pub grid_total: u64,
    pub selected_id: Option<String>,
    pub mode: LayerMode,
    pub overlays: Vec<String>,
    pub notice: Option<String>,
    pub stats: SessionStats,
}

enum Internal {
    Timer(TimerHandle),
    Loaded { seq: u64, result: Result<Vec<FootprintItem>> },
}

pub struct Session {
    engine: MapEngine<HeadlessSurface>,
    source: Arc<dyn DataSource>,
    limit: u32,
    stale: StalePolicy,
    timers: HashMap<TimerChannel, (TimerHandle, JoinHandle<()>)>,
    tx: mpsc::UnboundedSender<Internal>,
    rx: mpsc::UnboundedReceiver<Internal>,
    issued: u64,
    in_flight: usize,
    query_string: String,
    notice: Option<OverlayNotice>,
    stats: SessionStats,
}

impl Session {
    /// `query` の lat/lon/zoom が揃っていればそこから、無ければ設定の初期表示から始める
    pub fn new(
        config: &Config,
        source: Arc<dyn DataSource>,
        resolver: Box<dyn ThumbnailResolver>,
        query: ViewQuery,
    ) -> Self {
        let (center, zoom) = query
            .initial_view()
            .unwrap_or((config.initial_view.center(), config.initial_view.zoom));
        let surface = HeadlessSurface::new(config.canvas.width, config.canvas.height, center, zoom);
        let engine = MapEngine::new(surface, resolver, query);
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            engine,
            source,
            limit: config.result_limit,
            stale: config.stale_responses,
            timers: HashMap::new(),
            tx,
            rx,
            issued: 0,
            in_flight: 0,
            query_string: String::new(),
            notice: None,
            stats: SessionStats::default(),
        }
    }

    pub fn engine(&self) -> &MapEngine<HeadlessSurface> {
        &self.engine
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// タイマーも取得も残っていない
    pub fn is_idle(&self) -> bool {
        self.timers.is_empty() && self.in_flight == 0
    }

    pub fn pending_timer(&self, channel: TimerChannel) -> Option<TimerHandle> {
        self.timers.get(&channel).map(|(h, _)| *h)
    }

    /// レイヤー設置と初回取得
    pub fn start(&mut self) {
        let commands = self.engine.start();
        self.execute(commands);
    }

    /// イベントを処理し、描画面が起こした移動も続けて配送する
    pub fn dispatch(&mut self, event: MapEvent) {
        let commands = self.engine.handle(event);
        self.execute(commands);

        while self.engine.surface().has_pending_moves() {
            let moves = self.engine.surface_mut().take_pending_moves();
            for m in moves {
                self.stats.moves_delivered += 1;
                tracing::debug!(zoom = m.viewport.zoom, intent = ?m.intent, "surface move");
                let commands = self.engine.handle(MapEvent::MoveStarted);
                self.execute(commands);
                let commands = self.engine.handle(MapEvent::MoveEnded {
                    viewport: m.viewport,
                    intent: m.intent,
                });
                self.execute(commands);
            }
        }
    }

    /// ユーザー操作を再現する
    pub fn apply(&mut self, action: Action) {
        tracing::debug!(?action, "action");
        match action {
            Action::PanZoom { center, zoom } => {
                self.dispatch(MapEvent::MoveStarted);
                let viewport = self.engine.surface_mut().jump_to(center, zoom);
                self.dispatch(MapEvent::MoveEnded {
                    viewport,
                    intent: oam_browser_common::MoveIntent::User,
                });
            }
            Action::Click { lon, lat } => {
                let point = self.engine.surface().lnglat_to_screen(LngLat::new(lon, lat));
                self.dispatch(MapEvent::Clicked(point));
            }
            Action::Select { id } => self.dispatch(MapEvent::SelectItem(id)),
            Action::Deselect => self.dispatch(MapEvent::Deselect),
            Action::Mode { mode } => self.dispatch(MapEvent::SetLayerMode(mode)),
            Action::Toggle { id } => self.dispatch(MapEvent::TogglePreview(id)),
            Action::Search { bbox } => self.dispatch(MapEvent::SearchTarget(bbox)),
            Action::Filters { filters } => self.dispatch(MapEvent::FiltersChanged(filters)),
        }
    }

    fn execute(&mut self, commands: Vec<EngineCommand>) {
        for command in commands {
            match command {
                EngineCommand::ScheduleTimer(handle) => self.schedule(handle),
                EngineCommand::CancelTimer(handle) => self.cancel(handle),
                EngineCommand::Fetch { bbox, filters } => {
                    self.fetch(CatalogQuery::new(bbox, filters, self.limit))
                }
                EngineCommand::PersistQuery(query) => self.query_string = query,
                EngineCommand::Notice(notice) => {
                    if let Some(n) = notice {
                        tracing::info!("{}", n);
                    }
                    self.notice = notice;
                }
                EngineCommand::SelectionChanged(id) => {
                    tracing::info!(selected = ?id, "selection changed");
                }
            }
        }
    }

    fn schedule(&mut self, handle: TimerHandle) {
        let tx = self.tx.clone();
        let delay = handle.channel.delay();
        let task = tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(Internal::Timer(handle));
        });

        if let Some((old, task)) = self.timers.insert(handle.channel, (handle, task)) {
            tracing::trace!(?old, "timer replaced without cancel");
            task.abort();
        }
        self.stats.timers_scheduled += 1;
    }

    fn cancel(&mut self, handle: TimerHandle) {
        let matches = self
            .timers
            .get(&handle.channel)
            .is_some_and(|(pending, _)| *pending == handle);
        if matches {
            if let Some((_, task)) = self.timers.remove(&handle.channel) {
                task.abort();
                self.stats.timers_cancelled += 1;
            }
        }
    }

    fn fetch(&mut self, query: CatalogQuery) {
        self.issued += 1;
        self.in_flight += 1;
        self.stats.fetches_issued += 1;

        let seq = self.issued;
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        tracing::debug!(seq, bbox = ?query.bbox, "fetch issued");

        tokio::spawn(async move {
            let result = source.fetch(&query).await;
            let _ = tx.send(Internal::Loaded { seq, result });
        });
    }

    fn receive(&mut self, message: Internal) {
        match message {
            Internal::Timer(handle) => {
                let current = self.timers.get(&handle.channel).map(|(h, _)| *h);
                if current == Some(handle) {
                    self.timers.remove(&handle.channel);
                    if handle.channel == TimerChannel::GridRegen {
                        self.stats.grid_passes += 1;
                    }
                }
                self.dispatch(MapEvent::TimerFired(handle));
            }
            Internal::Loaded { seq, result } => {
                self.in_flight = self.in_flight.saturating_sub(1);

                if self.stale == StalePolicy::Drop && seq < self.issued {
                    tracing::debug!(seq, newest = self.issued, "stale response dropped");
                    self.stats.responses_dropped += 1;
                    return;
                }

                let items = match result {
                    Ok(items) => items,
                    Err(e) => {
                        tracing::warn!("Fetch error: {}", e);
                        self.stats.fetch_errors += 1;
                        Vec::new()
                    }
                };
                self.stats.responses_applied += 1;
                self.dispatch(MapEvent::DataLoaded(items));
            }
        }
    }

    /// 次の内部メッセージを1つ処理する。何も残っていなければ false
    pub async fn step(&mut self) -> bool {
        if self.is_idle() {
            return false;
        }
        match self.rx.recv().await {
            Some(message) => {
                self.receive(message);
                true
            }
            None => false,
        }
    }

    /// タイマーと取得がすべて片付くまで処理する
    pub async fn drain(&mut self) {
        while self.step().await {}
    }

    /// 時刻まで内部メッセージを処理しながら待つ
    async fn run_until(&mut self, deadline: Instant) {
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return,
                message = self.rx.recv() => match message {
                    Some(message) => self.receive(message),
                    None => return,
                },
            }
        }
    }

    /// スクリプトを実行して結果を返す
    pub async fn run_script(&mut self, steps: Vec<ScriptStep>) -> SessionReport {
        let origin = Instant::now();
        self.start();

        for step in steps {
            self.run_until(origin + Duration::from_millis(step.at_ms)).await;
            self.apply(step.action);
        }

        self.drain().await;
        self.report()
    }

    pub fn report(&self) -> SessionReport {
        let viewport = self.engine.surface().viewport();
        let grid = self.engine.grid();
        SessionReport {
            query_string: self.query_string.clone(),
            center: viewport.center,
            zoom: viewport.zoom,
            bounds: viewport.bounds,
            item_count: self.engine.items().len(),
            grid_zoom: grid.grid_zoom,
            grid_cells: grid.cells.len(),
            grid_total: grid.total_count(),
            selected_id: self.engine.selected_id().map(str::to_string),
            mode: self.engine.layer_state().mode(),
            overlays: self.engine.rendered_previews().into_iter().collect(),
            notice: self.notice.map(|n| n.to_string()),
            stats: self.stats,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for (_, (_, task)) in self.timers.drain() {
            task.abort();
        }
    }
}
