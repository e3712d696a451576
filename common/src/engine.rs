//! 地図エンジン
//!
//! グリッド集約・レイヤー表示状態・ビューポート同期・選択を1つの
//! 状態オブジェクトにまとめ、イベント単位で更新する。
//! タイマーと取得はホストに `EngineCommand` として依頼し、
//! 結果は `MapEvent` として戻ってくる。
//!
//! ```text
//! ホスト ──MapEvent──▶ MapEngine ──描画操作──▶ MapSurface
//!    ▲                    │
//!    └──EngineCommand─────┘
//! ```

use crate::catalog::CatalogFilters;
use crate::debounce::TimerHandle;
use crate::footprint::{to_feature_collection, FootprintItem};
use crate::grid::{aggregate_or_empty, GridAggregation};
use crate::layers::{
    build_overlay, diff_overlays, preview_item_id, preview_layer_id, LayerMode,
    LayerVisibilityState, OverlayNotice, ThumbnailResolver,
};
use crate::selection::{SelectSource, SelectionOverlay};
use crate::surface::{
    default_layers, FitOptions, MapSurface, RenderedFeature, GRID_FILL_LAYER, GRID_SOURCE,
    IMAGERY_SOURCE, INTERACTIVE_LAYERS, LARGE_FILL_LAYER, LARGE_IMAGERY_SOURCE, SMALL_FILL_LAYER,
    SMALL_IMAGERY_SOURCE,
};
use crate::sync::{MoveIntent, SyncEffect, SyncPhase, ViewportSync};
use crate::types::{BBox, ScreenPoint, Viewport};
use crate::view_state::ViewQuery;
use std::collections::BTreeSet;

/// 検索結果への fit
pub const SEARCH_FIT: FitOptions = FitOptions {
    padding: 50.0,
    max_zoom: Some(14.0),
    duration_ms: 0,
};

/// グリッドセルクリック時の fit
pub const GRID_CELL_FIT: FitOptions = FitOptions {
    padding: 20.0,
    max_zoom: None,
    duration_ms: 0,
};

/// エンジンへの入力
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    MoveStarted,
    MoveEnded { viewport: Viewport, intent: MoveIntent },
    TimerFired(TimerHandle),
    Clicked(ScreenPoint),
    /// 取得結果（コレクションごと置き換え）
    DataLoaded(Vec<FootprintItem>),
    /// 地名検索などで決まった範囲
    SearchTarget(BBox),
    FiltersChanged(CatalogFilters),
    SetLayerMode(LayerMode),
    TogglePreview(String),
    SelectItem(String),
    Deselect,
}

/// ホストへの依頼
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    ScheduleTimer(TimerHandle),
    CancelTimer(TimerHandle),
    Fetch {
        bbox: Option<BBox>,
        filters: CatalogFilters,
    },
    /// 表示状態のクエリ文字列を保存
    PersistQuery(String),
    Notice(Option<OverlayNotice>),
    SelectionChanged(Option<String>),
}

/// クリックの解釈（1回のクリックにつき1つ）
#[derive(Debug, Clone, PartialEq)]
pub enum ClickAction {
    SelectFootprint(String),
    ZoomToCell(BBox),
    ClearSelection,
    Nothing,
}

/// 描画されている地物からクリックの意味を決める
///
/// 足跡 > 件数ありのグリッドセル > 何もない場所
pub fn resolve_click(hits: &[RenderedFeature]) -> ClickAction {
    let footprint = hits
        .iter()
        .filter(|h| h.layer == LARGE_FILL_LAYER || h.layer == SMALL_FILL_LAYER)
        .find_map(|h| h.id());
    if let Some(id) = footprint {
        return ClickAction::SelectFootprint(id.to_string());
    }

    let cell = hits
        .iter()
        .filter(|h| h.layer == GRID_FILL_LAYER && h.count().unwrap_or(0) > 0)
        .find_map(|h| h.bounds);
    if let Some(bounds) = cell {
        return ClickAction::ZoomToCell(bounds);
    }

    if hits.is_empty() {
        ClickAction::ClearSelection
    } else {
        ClickAction::Nothing
    }
}

pub struct MapEngine<S: MapSurface> {
    surface: S,
    resolver: Box<dyn ThumbnailResolver>,
    sync: ViewportSync,
    layers: LayerVisibilityState,
    selection: SelectionOverlay,
    items: Vec<FootprintItem>,
    grid: GridAggregation,
    filters: CatalogFilters,
    last_bbox: Option<BBox>,
    query: ViewQuery,
    pending_restore: Option<String>,
    notice: Option<OverlayNotice>,
}

impl<S: MapSurface> MapEngine<S> {
    /// `query` は初期表示時のクエリ文字列（selected_id の復元に使う）
    pub fn new(surface: S, resolver: Box<dyn ThumbnailResolver>, query: ViewQuery) -> Self {
        let pending_restore = query.selected_id().map(str::to_string);
        Self {
            surface,
            resolver,
            sync: ViewportSync::new(),
            layers: LayerVisibilityState::default(),
            selection: SelectionOverlay::new(),
            items: Vec::new(),
            grid: GridAggregation::empty(),
            filters: CatalogFilters::default(),
            last_bbox: None,
            query,
            pending_restore,
            notice: None,
        }
    }

    pub fn with_filters(mut self, filters: CatalogFilters) -> Self {
        self.filters = filters;
        self
    }

    /// レイヤーを設置し、初回の取得を依頼する
    pub fn start(&mut self) -> Vec<EngineCommand> {
        self.surface.install_layers(&default_layers());
        let viewport = self.surface.viewport();
        self.query.set_view(&viewport);
        tracing::debug!(zoom = viewport.zoom, "engine started");

        vec![
            EngineCommand::PersistQuery(self.query.to_query_string()),
            EngineCommand::Fetch {
                bbox: None,
                filters: self.filters.clone(),
            },
        ]
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn items(&self) -> &[FootprintItem] {
        &self.items
    }

    pub fn grid(&self) -> &GridAggregation {
        &self.grid
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selection.selected_id()
    }

    pub fn layer_state(&self) -> &LayerVisibilityState {
        &self.layers
    }

    pub fn filters(&self) -> &CatalogFilters {
        &self.filters
    }

    pub fn query(&self) -> &ViewQuery {
        &self.query
    }

    pub fn notice(&self) -> Option<OverlayNotice> {
        self.notice
    }

    pub fn phase(&self) -> SyncPhase {
        self.sync.phase()
    }

    /// 描画中のプレビュー対象アイテム
    pub fn rendered_previews(&self) -> BTreeSet<String> {
        self.surface
            .overlay_ids()
            .iter()
            .filter_map(|layer| preview_item_id(layer))
            .map(str::to_string)
            .collect()
    }

    pub fn handle(&mut self, event: MapEvent) -> Vec<EngineCommand> {
        let mut commands = Vec::new();

        match event {
            MapEvent::MoveStarted => {
                let effects = self.sync.move_started();
                self.apply_effects(effects, &mut commands);
            }
            MapEvent::MoveEnded { viewport, intent } => {
                let effects =
                    self.sync
                        .move_ended(viewport, intent, self.selection.selected_is_large());
                self.apply_effects(effects, &mut commands);
            }
            MapEvent::TimerFired(handle) => {
                let effects = self.sync.timer_fired(handle);
                self.apply_effects(effects, &mut commands);
            }
            MapEvent::Clicked(point) => self.click(point, &mut commands),
            MapEvent::DataLoaded(items) => self.load(items, &mut commands),
            MapEvent::SearchTarget(bbox) => {
                self.last_bbox = Some(bbox);
                commands.push(EngineCommand::Fetch {
                    bbox: Some(bbox),
                    filters: self.filters.clone(),
                });
                if let Err(e) = self.surface.fit_bounds(bbox, &SEARCH_FIT, MoveIntent::Programmatic) {
                    tracing::warn!("fit to search target ignored: {}", e);
                }
            }
            MapEvent::FiltersChanged(filters) => {
                self.filters = filters;
                commands.push(EngineCommand::Fetch {
                    bbox: self.last_bbox,
                    filters: self.filters.clone(),
                });
            }
            MapEvent::SetLayerMode(mode) => {
                self.layers.set_mode(mode);
                self.refresh_overlays(&mut commands);
            }
            MapEvent::TogglePreview(id) => {
                self.layers.toggle(&id);
                self.refresh_overlays(&mut commands);
            }
            MapEvent::SelectItem(id) => self.select_by_id(&id, SelectSource::List, &mut commands),
            MapEvent::Deselect => self.deselect(&mut commands),
        }

        commands
    }

    fn apply_effects(&mut self, effects: Vec<SyncEffect>, commands: &mut Vec<EngineCommand>) {
        for effect in effects {
            match effect {
                SyncEffect::PersistView(viewport) => {
                    self.query.set_view(&viewport);
                    commands.push(EngineCommand::PersistQuery(self.query.to_query_string()));
                }
                SyncEffect::Schedule(handle) => commands.push(EngineCommand::ScheduleTimer(handle)),
                SyncEffect::Cancel(handle) => commands.push(EngineCommand::CancelTimer(handle)),
                SyncEffect::Deselect => self.deselect(commands),
                SyncEffect::RegenerateGrid => {
                    self.regenerate_grid();
                    self.refresh_overlays(commands);
                }
                SyncEffect::TriggerFetch { bounds, center } => {
                    tracing::debug!(%bounds, lon = center.lon, lat = center.lat, "viewport fetch");
                    self.last_bbox = Some(bounds);
                    commands.push(EngineCommand::Fetch {
                        bbox: Some(bounds),
                        filters: self.filters.clone(),
                    });
                }
            }
        }
    }

    fn click(&mut self, point: ScreenPoint, commands: &mut Vec<EngineCommand>) {
        let hits = self.surface.query_rendered_features(point, &INTERACTIVE_LAYERS);
        match resolve_click(&hits) {
            ClickAction::SelectFootprint(id) => {
                self.select_by_id(&id, SelectSource::MapClick, commands)
            }
            ClickAction::ZoomToCell(bounds) => {
                if let Err(e) = self.surface.fit_bounds(bounds, &GRID_CELL_FIT, MoveIntent::User) {
                    tracing::warn!("fit to grid cell ignored: {}", e);
                }
            }
            ClickAction::ClearSelection => self.deselect(commands),
            ClickAction::Nothing => {}
        }
    }

    fn load(&mut self, items: Vec<FootprintItem>, commands: &mut Vec<EngineCommand>) {
        let (large, small): (Vec<FootprintItem>, Vec<FootprintItem>) =
            items.iter().cloned().partition(FootprintItem::is_large);
        self.surface
            .set_source_data(IMAGERY_SOURCE, to_feature_collection(&items));
        self.surface
            .set_source_data(LARGE_IMAGERY_SOURCE, to_feature_collection(&large));
        self.surface
            .set_source_data(SMALL_IMAGERY_SOURCE, to_feature_collection(&small));
        tracing::debug!(total = items.len(), large = large.len(), "data loaded");
        self.items = items;

        // 結果に無くなった選択は解除
        let orphaned = self
            .selection
            .selected_id()
            .is_some_and(|id| !self.items.iter().any(|i| i.id() == id));
        if orphaned {
            self.deselect(commands);
        }

        self.regenerate_grid();
        self.refresh_overlays(commands);

        if !self.items.is_empty() {
            if let Some(id) = self.pending_restore.take() {
                if self.items.iter().any(|i| i.id() == id) {
                    self.select_by_id(&id, SelectSource::Restore, commands);
                } else {
                    tracing::debug!(id = %id, "selected_id from query not in first result");
                }
            }
        }
    }

    fn regenerate_grid(&mut self) {
        let viewport = self.surface.viewport();
        self.grid = aggregate_or_empty(&self.items, &viewport);
        self.surface
            .set_source_data(GRID_SOURCE, self.grid.to_feature_collection());
    }

    /// プレビュー画像を目標集合に合わせる
    fn refresh_overlays(&mut self, commands: &mut Vec<EngineCommand>) {
        let zoom = self.surface.viewport().zoom;
        let wanted = self.layers.effective(zoom, &self.items);
        let diff = diff_overlays(&self.rendered_previews(), &wanted);

        for id in &diff.remove {
            self.surface.remove_image_overlay(&preview_layer_id(id));
        }
        for id in &diff.add {
            let Some(item) = self.items.iter().find(|i| i.id() == id) else {
                continue;
            };
            let added = build_overlay(preview_layer_id(id), item, self.resolver.as_ref())
                .and_then(|overlay| self.surface.add_image_overlay(overlay));
            if let Err(e) = added {
                tracing::warn!("Error adding layer {}: {}", id, e);
            }
        }

        let notice = self.layers.notice(zoom);
        if notice != self.notice {
            self.notice = notice;
            commands.push(EngineCommand::Notice(notice));
        }
    }

    fn select_by_id(&mut self, id: &str, source: SelectSource, commands: &mut Vec<EngineCommand>) {
        let Some(item) = self.items.iter().find(|i| i.id() == id) else {
            tracing::warn!("select ignored, unknown item {}", id);
            return;
        };
        self.selection
            .select(&mut self.surface, item, source, self.resolver.as_ref());
        self.query.set_selected(Some(id));
        commands.push(EngineCommand::PersistQuery(self.query.to_query_string()));
        commands.push(EngineCommand::SelectionChanged(Some(id.to_string())));
    }

    fn deselect(&mut self, commands: &mut Vec<EngineCommand>) {
        if self.selection.clear(&mut self.surface) {
            self.query.set_selected(None);
            commands.push(EngineCommand::PersistQuery(self.query.to_query_string()));
            commands.push(EngineCommand::SelectionChanged(None));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debounce::TimerChannel;
    use crate::footprint::fixtures::square;
    use crate::layers::DirectThumbnails;
    use crate::selection::SELECTED_OVERLAY_ID;
    use crate::surface::{HeadlessSurface, LayerFilter, HIGHLIGHT_LAYER};
    use crate::types::LngLat;

    fn engine_at(center: LngLat, zoom: f64, query: &str) -> MapEngine<HeadlessSurface> {
        let surface = HeadlessSurface::new(1024, 768, center, zoom);
        let mut engine = MapEngine::new(surface, Box::new(DirectThumbnails), ViewQuery::parse(query));
        engine.start();
        engine
    }

    fn items() -> Vec<FootprintItem> {
        vec![
            square("small", LngLat::new(10.0, 10.0), 0.01),
            square("large", LngLat::new(20.0, 20.0), 1.0),
            square("other", LngLat::new(10.02, 10.02), 0.01),
        ]
    }

    fn scheduled(commands: &[EngineCommand]) -> Vec<TimerHandle> {
        commands
            .iter()
            .filter_map(|c| match c {
                EngineCommand::ScheduleTimer(h) => Some(*h),
                _ => None,
            })
            .collect()
    }

    fn has_fetch(commands: &[EngineCommand]) -> bool {
        commands.iter().any(|c| matches!(c, EngineCommand::Fetch { .. }))
    }

    /// 描画面が起こした移動を MoveStarted/MoveEnded として配送する
    fn deliver_moves(engine: &mut MapEngine<HeadlessSurface>) -> Vec<EngineCommand> {
        let moves = engine.surface_mut().take_pending_moves();
        let mut commands = Vec::new();
        for m in moves {
            commands.extend(engine.handle(MapEvent::MoveStarted));
            commands.extend(engine.handle(MapEvent::MoveEnded {
                viewport: m.viewport,
                intent: m.intent,
            }));
        }
        commands
    }

    fn user_move(engine: &mut MapEngine<HeadlessSurface>, center: LngLat, zoom: f64) -> Vec<EngineCommand> {
        let mut commands = engine.handle(MapEvent::MoveStarted);
        let viewport = engine.surface_mut().jump_to(center, zoom);
        commands.extend(engine.handle(MapEvent::MoveEnded {
            viewport,
            intent: MoveIntent::User,
        }));
        commands
    }

    #[test]
    fn test_start_requests_initial_fetch() {
        let surface = HeadlessSurface::new(800, 600, LngLat::new(0.0, 20.0), 2.0);
        let mut engine = MapEngine::new(surface, Box::new(DirectThumbnails), ViewQuery::default());
        let commands = engine.start();
        assert_eq!(
            commands[1],
            EngineCommand::Fetch { bbox: None, filters: CatalogFilters::default() }
        );
        assert_eq!(
            commands[0],
            EngineCommand::PersistQuery("lat=20.0000&lon=0.0000&zoom=2.0".into())
        );
    }

    #[test]
    fn test_data_load_replaces_sources_and_grid() {
        let mut engine = engine_at(LngLat::new(10.0, 10.0), 5.0, "");
        engine.handle(MapEvent::DataLoaded(items()));

        let surface = engine.surface();
        assert_eq!(surface.source(IMAGERY_SOURCE).unwrap().features.len(), 3);
        assert_eq!(surface.source(LARGE_IMAGERY_SOURCE).unwrap().features.len(), 1);
        assert_eq!(surface.source(SMALL_IMAGERY_SOURCE).unwrap().features.len(), 2);
        assert_eq!(engine.grid().total_count(), 3);
        assert_eq!(
            surface.source(GRID_SOURCE).unwrap().features.len(),
            engine.grid().cells.len()
        );

        engine.handle(MapEvent::DataLoaded(Vec::new()));
        assert!(engine.grid().is_empty());
        assert!(engine.surface().source(IMAGERY_SOURCE).unwrap().features.is_empty());
    }

    #[test]
    fn test_auto_deselect_on_zoom_out() {
        let mut engine = engine_at(LngLat::new(10.0, 10.0), 10.0, "");
        engine.handle(MapEvent::DataLoaded(items()));
        engine.handle(MapEvent::SelectItem("small".into()));
        deliver_moves(&mut engine);
        assert_eq!(engine.selected_id(), Some("small"));

        // 10 → 10.5 は維持
        user_move(&mut engine, LngLat::new(10.0, 10.0), 10.5);
        assert_eq!(engine.selected_id(), Some("small"));

        // 10 → 9 で解除
        user_move(&mut engine, LngLat::new(10.0, 10.0), 10.0);
        let commands = user_move(&mut engine, LngLat::new(10.0, 10.0), 9.0);
        assert_eq!(engine.selected_id(), None);
        assert!(commands.contains(&EngineCommand::SelectionChanged(None)));
        assert_eq!(
            engine.surface().filter(HIGHLIGHT_LAYER),
            Some(&LayerFilter::MatchNone)
        );
    }

    #[test]
    fn test_large_selection_survives_until_eight() {
        let mut engine = engine_at(LngLat::new(20.0, 20.0), 12.0, "");
        engine.handle(MapEvent::DataLoaded(items()));
        engine.handle(MapEvent::SelectItem("large".into()));
        deliver_moves(&mut engine);

        user_move(&mut engine, LngLat::new(20.0, 20.0), 9.0);
        assert_eq!(engine.selected_id(), Some("large"));
        user_move(&mut engine, LngLat::new(20.0, 20.0), 7.5);
        assert_eq!(engine.selected_id(), None);
    }

    #[test]
    fn test_selection_fit_does_not_arm_fetch() {
        let mut engine = engine_at(LngLat::new(0.0, 0.0), 3.0, "");
        engine.handle(MapEvent::DataLoaded(items()));

        engine.handle(MapEvent::SelectItem("small".into()));
        assert!(engine.surface().has_pending_moves());

        let commands = deliver_moves(&mut engine);
        let channels: Vec<TimerChannel> = scheduled(&commands).iter().map(|h| h.channel).collect();
        assert_eq!(channels, vec![TimerChannel::GridRegen]);
        assert_eq!(engine.selected_id(), Some("small"));
        assert!(engine.surface().overlay(SELECTED_OVERLAY_ID).is_some());
    }

    #[test]
    fn test_user_move_arms_fetch_with_viewport_bounds() {
        let mut engine = engine_at(LngLat::new(0.0, 0.0), 3.0, "");
        let commands = user_move(&mut engine, LngLat::new(5.0, 5.0), 6.0);
        let handles = scheduled(&commands);
        assert_eq!(handles.len(), 2);

        let fetch = handles[1];
        assert_eq!(fetch.channel, TimerChannel::FetchTrigger);
        let commands = engine.handle(MapEvent::TimerFired(fetch));
        let expected = engine.surface().viewport().bounds;
        assert_eq!(
            commands,
            vec![EngineCommand::Fetch { bbox: Some(expected), filters: CatalogFilters::default() }]
        );
    }

    #[test]
    fn test_click_footprint_selects_without_fit() {
        let mut engine = engine_at(LngLat::new(10.0, 10.0), 12.0, "");
        engine.handle(MapEvent::DataLoaded(items()));

        let point = engine.surface().lnglat_to_screen(LngLat::new(10.0, 10.0));
        let commands = engine.handle(MapEvent::Clicked(point));
        assert!(commands.contains(&EngineCommand::SelectionChanged(Some("small".into()))));
        assert!(!engine.surface().has_pending_moves());
    }

    #[test]
    fn test_click_grid_cell_fits_as_user_move() {
        let mut engine = engine_at(LngLat::new(10.0, 10.0), 5.0, "");
        engine.handle(MapEvent::DataLoaded(items()));

        let point = engine.surface().lnglat_to_screen(LngLat::new(10.0, 10.0));
        engine.handle(MapEvent::Clicked(point));
        let moves = engine.surface_mut().take_pending_moves();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].intent, MoveIntent::User);
        assert!(moves[0].viewport.zoom > 5.0);
    }

    #[test]
    fn test_click_empty_area_deselects() {
        let mut engine = engine_at(LngLat::new(10.0, 10.0), 12.0, "");
        engine.handle(MapEvent::DataLoaded(items()));
        let point = engine.surface().lnglat_to_screen(LngLat::new(10.0, 10.0));
        engine.handle(MapEvent::Clicked(point));
        assert_eq!(engine.selected_id(), Some("small"));

        let empty = engine.surface().lnglat_to_screen(LngLat::new(10.01, 9.99));
        let commands = engine.handle(MapEvent::Clicked(empty));
        assert_eq!(engine.selected_id(), None);
        assert!(commands.contains(&EngineCommand::SelectionChanged(None)));
    }

    #[test]
    fn test_resolve_click_priority() {
        let mut cell_props = geojson::JsonObject::new();
        cell_props.insert("count".into(), 3.into());
        let cell = RenderedFeature {
            layer: GRID_FILL_LAYER.into(),
            properties: cell_props,
            bounds: Some(BBox::new(0.0, 0.0, 1.0, 1.0)),
        };
        let mut fp_props = geojson::JsonObject::new();
        fp_props.insert("id".into(), "x".into());
        let footprint = RenderedFeature {
            layer: SMALL_FILL_LAYER.into(),
            properties: fp_props,
            bounds: None,
        };

        assert_eq!(
            resolve_click(&[cell.clone(), footprint]),
            ClickAction::SelectFootprint("x".into())
        );
        assert_eq!(
            resolve_click(&[cell]),
            ClickAction::ZoomToCell(BBox::new(0.0, 0.0, 1.0, 1.0))
        );
        assert_eq!(resolve_click(&[]), ClickAction::ClearSelection);
    }

    #[test]
    fn test_live_previews_follow_zoom() {
        let mut engine = engine_at(LngLat::new(10.0, 10.0), 5.0, "");
        engine.handle(MapEvent::DataLoaded(items()));

        let commands = engine.handle(MapEvent::SetLayerMode(LayerMode::LivePreviews));
        assert!(commands.contains(&EngineCommand::Notice(Some(OverlayNotice::ZoomIn))));
        assert!(engine.rendered_previews().is_empty());

        // ズームイン後のグリッド再生成でプレビューが出る
        let commands = user_move(&mut engine, LngLat::new(10.0, 10.0), 9.0);
        let grid = scheduled(&commands)[0];
        let commands = engine.handle(MapEvent::TimerFired(grid));
        assert!(commands.contains(&EngineCommand::Notice(None)));
        assert_eq!(engine.rendered_previews().len(), 3);

        engine.handle(MapEvent::TogglePreview("other".into()));
        assert!(!engine.rendered_previews().contains("other"));
        assert_eq!(engine.layer_state().manual_hide().len(), 1);
    }

    #[test]
    fn test_pins_in_footprint_mode() {
        let mut engine = engine_at(LngLat::new(10.0, 10.0), 3.0, "");
        engine.handle(MapEvent::DataLoaded(items()));
        engine.handle(MapEvent::TogglePreview("small".into()));
        assert!(engine.surface().overlay("preview-small").is_some());

        // 新しい結果に無ければ外れる
        engine.handle(MapEvent::DataLoaded(vec![square("new", LngLat::new(0.0, 0.0), 0.01)]));
        assert!(engine.rendered_previews().is_empty());
    }

    #[test]
    fn test_restore_selected_id_once() {
        let mut engine = engine_at(LngLat::new(10.0, 10.0), 12.0, "selected_id=other");
        engine.handle(MapEvent::DataLoaded(Vec::new()));
        assert_eq!(engine.selected_id(), None);

        engine.handle(MapEvent::DataLoaded(items()));
        assert_eq!(engine.selected_id(), Some("other"));
        let moves = engine.surface_mut().take_pending_moves();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].intent, MoveIntent::Programmatic);

        engine.handle(MapEvent::Deselect);
        engine.handle(MapEvent::DataLoaded(items()));
        assert_eq!(engine.selected_id(), None);
    }

    #[test]
    fn test_selection_cleared_when_item_disappears() {
        let mut engine = engine_at(LngLat::new(10.0, 10.0), 12.0, "");
        engine.handle(MapEvent::DataLoaded(items()));
        engine.handle(MapEvent::SelectItem("small".into()));
        let commands = engine.handle(MapEvent::DataLoaded(Vec::new()));
        assert_eq!(engine.selected_id(), None);
        assert!(commands.contains(&EngineCommand::SelectionChanged(None)));
    }

    #[test]
    fn test_search_target_fetches_and_fits() {
        let mut engine = engine_at(LngLat::new(0.0, 0.0), 2.0, "");
        let target = BBox::new(139.5, 35.5, 140.0, 36.0);
        let commands = engine.handle(MapEvent::SearchTarget(target));
        assert!(commands.contains(&EngineCommand::Fetch {
            bbox: Some(target),
            filters: CatalogFilters::default(),
        }));

        let commands = deliver_moves(&mut engine);
        assert!(!has_fetch(&commands));
        assert_eq!(scheduled(&commands).len(), 1);
        assert!(engine.surface().viewport().zoom <= 14.0);

        let filters = CatalogFilters { license: Some("CC-BY".into()), ..Default::default() };
        let commands = engine.handle(MapEvent::FiltersChanged(filters.clone()));
        assert_eq!(commands, vec![EngineCommand::Fetch { bbox: Some(target), filters }]);
    }

    #[test]
    fn test_move_end_persists_view() {
        let mut engine = engine_at(LngLat::new(0.0, 0.0), 2.0, "basemap=hot");
        let commands = user_move(&mut engine, LngLat::new(139.7671, 35.6812), 11.04);
        assert!(commands.contains(&EngineCommand::PersistQuery(
            "basemap=hot&lat=35.6812&lon=139.7671&zoom=11.0".into()
        )));
    }
}
