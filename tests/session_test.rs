//! セッション実行テスト
//!
//! tokio の停止時間（start_paused）でデバウンスと取得の流れを検証

mod support;

use async_trait::async_trait;
use oam_browser::catalog::{DataSource, FixtureSource};
use oam_browser::config::Config;
use oam_browser::error::{OamError, Result};
use oam_browser::session::{parse_script, Action, ScriptStep, Session, StalePolicy};
use oam_browser_common::{
    CatalogQuery, DirectThumbnails, FootprintItem, LayerMode, LngLat, TimerChannel, ViewQuery,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TOKYO: &str = "lat=35.6812&lon=139.7671&zoom=11";

fn session(source: Arc<dyn DataSource>, query: &str) -> Session {
    session_with(Config::default(), source, query)
}

fn session_with(config: Config, source: Arc<dyn DataSource>, query: &str) -> Session {
    Session::new(&config, source, Box::new(DirectThumbnails), ViewQuery::parse(query))
}

fn fixture() -> Arc<dyn DataSource> {
    Arc::new(FixtureSource::new(support::tokyo_pair()))
}

fn step(at_ms: u64, action: Action) -> ScriptStep {
    ScriptStep { at_ms, action }
}

fn pan(at_ms: u64, lon: f64, lat: f64, zoom: f64) -> ScriptStep {
    step(at_ms, Action::PanZoom { center: LngLat::new(lon, lat), zoom })
}

/// 呼ばれた順に遅延と結果を変える取得元
struct ScriptedSource {
    calls: AtomicUsize,
    responses: Vec<(u64, Vec<FootprintItem>)>,
}

#[async_trait]
impl DataSource for ScriptedSource {
    async fn fetch(&self, _query: &CatalogQuery) -> Result<Vec<FootprintItem>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, items) = self
            .responses
            .get(n)
            .or_else(|| self.responses.last())
            .cloned()
            .unwrap_or_default();
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(items)
    }
}

struct FailingSource;

#[async_trait]
impl DataSource for FailingSource {
    async fn fetch(&self, _query: &CatalogQuery) -> Result<Vec<FootprintItem>> {
        Err(OamError::ApiResponse("HTTP 503 Service Unavailable".into()))
    }
}

/// 起動時は範囲なしで1回取得し、クエリの表示から始まる
#[tokio::test(start_paused = true)]
async fn test_startup_fetch_and_grid() {
    let mut session = session(fixture(), "lat=35.6812&lon=139.7671&zoom=9");
    session.start();
    assert!(!session.is_idle());

    session.drain().await;
    let report = session.report();

    assert_eq!(report.item_count, 2);
    assert_eq!(report.grid_total, 2);
    assert_eq!(report.zoom, 9.0);
    assert_eq!(report.query_string, "lat=35.6812&lon=139.7671&zoom=9.0");
    assert_eq!(report.stats.fetches_issued, 1);
    assert_eq!(report.stats.responses_applied, 1);
    assert!(session.is_idle());
}

/// クエリが無ければ設定の初期表示
#[tokio::test(start_paused = true)]
async fn test_startup_without_query_uses_config() {
    let mut session = session(fixture(), "");
    session.start();
    session.drain().await;

    let report = session.report();
    assert_eq!(report.center, LngLat::new(0.0, 20.0));
    assert_eq!(report.zoom, 2.0);
    assert_eq!(report.query_string, "lat=20.0000&lon=0.0000&zoom=2.0");
}

/// 連続した移動は最後の1回分だけ取得・再集約される
#[tokio::test(start_paused = true)]
async fn test_rapid_moves_collapse_into_one_fetch() {
    let mut session = session(fixture(), TOKYO);
    let report = session
        .run_script(vec![
            pan(0, 139.77, 35.68, 11.0),
            pan(100, 139.78, 35.69, 11.5),
            pan(200, 139.7671, 35.6812, 12.0),
        ])
        .await;

    // 初回 + デバウンス後の1回
    assert_eq!(report.stats.fetches_issued, 2);
    assert_eq!(report.stats.grid_passes, 1);
    assert_eq!(report.stats.timers_scheduled, 6);
    assert_eq!(report.stats.timers_cancelled, 4);
    assert_eq!(report.zoom, 12.0);
    assert_eq!(report.query_string, "lat=35.6812&lon=139.7671&zoom=12.0");
    assert!(session.is_idle());
}

/// 取得タイマーは移動が止まってから 1500ms 後に発火する
#[tokio::test(start_paused = true)]
async fn test_fetch_timer_waits_for_settle() {
    let mut session = session(fixture(), TOKYO);
    session.start();
    session.drain().await;

    session.apply(Action::PanZoom { center: LngLat::new(139.77, 35.68), zoom: 12.0 });
    assert!(session.pending_timer(TimerChannel::GridRegen).is_some());
    assert!(session.pending_timer(TimerChannel::FetchTrigger).is_some());

    tokio::time::sleep(Duration::from_millis(1000)).await;
    while session.pending_timer(TimerChannel::GridRegen).is_some() {
        session.step().await;
    }
    assert_eq!(session.stats().fetches_issued, 1);
    assert!(session.pending_timer(TimerChannel::FetchTrigger).is_some());

    // 移動開始で保留中の取得は取り消される
    session.apply(Action::PanZoom { center: LngLat::new(139.78, 35.69), zoom: 12.0 });
    session.drain().await;
    assert_eq!(session.stats().fetches_issued, 2);
}

/// 受信前に張り直された再集約タイマーの古い発火は数えない
#[tokio::test(start_paused = true)]
async fn test_superseded_grid_fire_not_counted() {
    let mut session = session(fixture(), TOKYO);
    session.start();
    session.drain().await;
    let before = session.stats().grid_passes;

    session.apply(Action::PanZoom { center: LngLat::new(139.77, 35.68), zoom: 12.0 });
    // 300ms の再集約タイマーが発火済み（未受信）のまま次の移動
    tokio::time::sleep(Duration::from_millis(400)).await;
    session.apply(Action::PanZoom { center: LngLat::new(139.78, 35.69), zoom: 12.5 });
    session.drain().await;

    assert_eq!(session.stats().grid_passes - before, 1);
    assert_eq!(session.stats().fetches_issued, 2);
}

/// 選択時の fit はプログラム移動なので再取得しない
#[tokio::test(start_paused = true)]
async fn test_selection_fit_does_not_refetch() {
    let mut session = session(fixture(), TOKYO);
    let report = session
        .run_script(vec![step(10, Action::Select { id: "a".into() })])
        .await;

    assert_eq!(report.selected_id.as_deref(), Some("a"));
    assert_eq!(report.stats.fetches_issued, 1);
    assert_eq!(report.stats.moves_delivered, 1);
    assert!(report.zoom > 11.0);
    assert!(report.query_string.contains("selected_id=a"));
}

/// ズームアウトで小さい画像の選択は自動解除される
#[tokio::test(start_paused = true)]
async fn test_zoom_out_clears_small_selection() {
    let mut session = session(fixture(), TOKYO);
    let report = session
        .run_script(vec![
            step(10, Action::Select { id: "a".into() }),
            pan(2000, 139.7671, 35.6812, 9.0),
        ])
        .await;

    assert_eq!(report.selected_id, None);
    assert!(!report.query_string.contains("selected_id"));
    assert_eq!(report.stats.fetches_issued, 2);
}

/// selected_id は最初の読み込みで1回だけ復元される
#[tokio::test(start_paused = true)]
async fn test_restore_selected_id_from_query() {
    let mut session = session(fixture(), "lat=35.6812&lon=139.7671&zoom=11&selected_id=b");
    let report = session.run_script(Vec::new()).await;

    assert_eq!(report.selected_id.as_deref(), Some("b"));
    assert_eq!(report.stats.fetches_issued, 1);
    assert_eq!(report.stats.moves_delivered, 1);
}

/// グリッドセルのクリックはユーザー移動として拡大し、再取得する
#[tokio::test(start_paused = true)]
async fn test_grid_cell_click_zooms_in() {
    let mut session = session(fixture(), "lat=35.6812&lon=139.7671&zoom=5");
    let report = session
        .run_script(vec![step(10, Action::Click { lon: 139.7671, lat: 35.6812 })])
        .await;

    assert!(report.zoom > 9.0, "zoom {}", report.zoom);
    assert_eq!(report.stats.moves_delivered, 1);
    assert_eq!(report.stats.fetches_issued, 2);
    assert_eq!(report.selected_id, None);
}

/// プレビュー表示はズーム 8 未満で案内を出す
#[tokio::test(start_paused = true)]
async fn test_live_previews_follow_zoom() {
    let mut session = session(fixture(), TOKYO);
    let report = session
        .run_script(vec![
            step(10, Action::Mode { mode: LayerMode::LivePreviews }),
            step(20, Action::Toggle { id: "b".into() }),
        ])
        .await;
    assert_eq!(report.overlays, vec!["a".to_string()]);
    assert_eq!(report.notice, None);

    let mut session = session_with(Config::default(), fixture(), "lat=35.6812&lon=139.7671&zoom=6");
    let report = session
        .run_script(vec![step(10, Action::Mode { mode: LayerMode::LivePreviews })])
        .await;
    assert!(report.overlays.is_empty());
    assert_eq!(report.notice.as_deref(), Some("Zoom in to see images"));
}

/// 既定（Apply）では遅れて届いた古い応答が上書きする
#[tokio::test(start_paused = true)]
async fn test_stale_response_applied_by_default() {
    let source = Arc::new(ScriptedSource {
        calls: AtomicUsize::new(0),
        responses: vec![
            (5000, support::tokyo_pair()[..1].to_vec()),
            (10, support::tokyo_pair()),
        ],
    });
    let mut session = session(source, TOKYO);
    let report = session.run_script(vec![pan(0, 139.77, 35.68, 11.0)]).await;

    assert_eq!(report.stats.fetches_issued, 2);
    assert_eq!(report.stats.responses_applied, 2);
    assert_eq!(report.item_count, 1);
}

/// Drop では最新より古い応答を捨てる
#[tokio::test(start_paused = true)]
async fn test_stale_response_dropped() {
    let source = Arc::new(ScriptedSource {
        calls: AtomicUsize::new(0),
        responses: vec![
            (5000, support::tokyo_pair()[..1].to_vec()),
            (10, support::tokyo_pair()),
        ],
    });
    let config = Config { stale_responses: StalePolicy::Drop, ..Config::default() };
    let mut session = session_with(config, source, TOKYO);
    let report = session.run_script(vec![pan(0, 139.77, 35.68, 11.0)]).await;

    assert_eq!(report.stats.responses_applied, 1);
    assert_eq!(report.stats.responses_dropped, 1);
    assert_eq!(report.item_count, 2);
}

/// 取得失敗は空の状態として描画し、セッションは続く
#[tokio::test(start_paused = true)]
async fn test_fetch_error_renders_empty() {
    let mut session = session(Arc::new(FailingSource), TOKYO);
    let report = session.run_script(vec![pan(0, 139.77, 35.68, 12.0)]).await;

    assert_eq!(report.stats.fetch_errors, 2);
    assert_eq!(report.item_count, 0);
    assert_eq!(report.grid_cells, 0);
}

/// 検索は即時取得とプログラム移動、フィルタ変更は即時取得
#[tokio::test(start_paused = true)]
async fn test_search_and_filters_fetch_immediately() {
    let script = parse_script(
        r#"[
            {"at_ms": 10, "action": {"type": "search", "bbox": [139.7, 35.6, 139.8, 35.75]}},
            {"at_ms": 20, "action": {"type": "filters", "filters": {"platform": "satellite"}}}
        ]"#,
    )
    .expect("script");

    let mut session = session(fixture(), TOKYO);
    let report = session.run_script(script).await;

    // 初回 + 検索 + フィルタ変更（検索の fit では取得しない）
    assert_eq!(report.stats.fetches_issued, 3);
    assert_eq!(report.stats.moves_delivered, 1);
    assert_eq!(report.item_count, 0);
}
