//! 地図描画面
//!
//! エンジンが描画面に求める操作を `MapSurface` にまとめる。
//! ブラウザでは MapLibre、CLI とテストでは `HeadlessSurface` が実装する。

use crate::error::{Error, Result};
use crate::layers::ImageOverlay;
use crate::sync::MoveIntent;
use crate::tile::{project, unproject, MAX_LATITUDE};
use crate::types::{BBox, LngLat, ScreenPoint, Viewport};
use geo::{BoundingRect, Geometry, Intersects, Point};
use geojson::{Feature, FeatureCollection, JsonObject};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

// ソース名
pub const IMAGERY_SOURCE: &str = "oam-imagery";
pub const LARGE_IMAGERY_SOURCE: &str = "oam-large-imagery";
pub const SMALL_IMAGERY_SOURCE: &str = "oam-small-imagery";
pub const GRID_SOURCE: &str = "oam-grid";

// レイヤー名
pub const GRID_FILL_LAYER: &str = "grid-fill";
pub const GRID_COUNT_LAYER: &str = "grid-count";
pub const LARGE_FILL_LAYER: &str = "oam-large-fill";
pub const LARGE_LINE_LAYER: &str = "oam-large-line";
pub const SMALL_FILL_LAYER: &str = "oam-small-fill";
pub const SMALL_LINE_LAYER: &str = "oam-small-line";
pub const HIGHLIGHT_LAYER: &str = "oam-highlight";

/// クリック判定の対象（上から順に優先）
pub const INTERACTIVE_LAYERS: [&str; 3] = [LARGE_FILL_LAYER, SMALL_FILL_LAYER, GRID_FILL_LAYER];

/// 描画面のズーム上限
pub const MAX_SURFACE_ZOOM: f64 = 22.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Fill,
    Line,
    Symbol,
}

/// レイヤー定義（ソース + 描画ルール）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerDef {
    pub id: &'static str,
    pub source: &'static str,
    pub kind: LayerKind,
    /// 表示する最小ズーム（含む）
    pub min_zoom: f64,
    /// 表示する最大ズーム（含まない）
    pub max_zoom: f64,
    pub paint: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<LayerFilter>,
}

impl LayerDef {
    pub fn visible_at(&self, zoom: f64) -> bool {
        zoom >= self.min_zoom && zoom < self.max_zoom
    }
}

/// 標準のレイヤー構成（描画順）
pub fn default_layers() -> Vec<LayerDef> {
    let footprint_fill = json!({ "fill-color": "#00E5FF", "fill-opacity": 0.1 });
    let footprint_line = json!({ "line-color": "#00B0FF", "line-width": 2, "line-opacity": 0.8 });

    vec![
        LayerDef {
            id: GRID_FILL_LAYER,
            source: GRID_SOURCE,
            kind: LayerKind::Fill,
            min_zoom: 0.0,
            max_zoom: 10.0,
            paint: json!({
                "fill-color": ["interpolate", ["linear"], ["get", "count"],
                    1, "#cceeff", 5, "#66b3ff", 20, "#0066cc", 50, "#003366"],
                "fill-opacity": 0.65
            }),
            filter: None,
        },
        LayerDef {
            id: GRID_COUNT_LAYER,
            source: GRID_SOURCE,
            kind: LayerKind::Symbol,
            min_zoom: 0.0,
            max_zoom: 10.0,
            paint: json!({ "text-color": "#003366", "text-halo-color": "#ffffff", "text-halo-width": 2 }),
            filter: None,
        },
        LayerDef {
            id: LARGE_FILL_LAYER,
            source: LARGE_IMAGERY_SOURCE,
            kind: LayerKind::Fill,
            min_zoom: 8.0,
            max_zoom: MAX_SURFACE_ZOOM,
            paint: footprint_fill.clone(),
            filter: None,
        },
        LayerDef {
            id: LARGE_LINE_LAYER,
            source: LARGE_IMAGERY_SOURCE,
            kind: LayerKind::Line,
            min_zoom: 8.0,
            max_zoom: MAX_SURFACE_ZOOM,
            paint: footprint_line.clone(),
            filter: None,
        },
        LayerDef {
            id: SMALL_FILL_LAYER,
            source: SMALL_IMAGERY_SOURCE,
            kind: LayerKind::Fill,
            min_zoom: 10.0,
            max_zoom: MAX_SURFACE_ZOOM,
            paint: footprint_fill,
            filter: None,
        },
        LayerDef {
            id: SMALL_LINE_LAYER,
            source: SMALL_IMAGERY_SOURCE,
            kind: LayerKind::Line,
            min_zoom: 10.0,
            max_zoom: MAX_SURFACE_ZOOM,
            paint: footprint_line,
            filter: None,
        },
        LayerDef {
            id: HIGHLIGHT_LAYER,
            source: IMAGERY_SOURCE,
            kind: LayerKind::Line,
            min_zoom: 0.0,
            max_zoom: MAX_SURFACE_ZOOM,
            paint: json!({ "line-color": "#FF0000", "line-width": 3 }),
            filter: Some(LayerFilter::MatchNone),
        },
    ]
}

/// `id` プロパティによるレイヤーフィルタ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerFilter {
    MatchNone,
    IdEquals(String),
}

impl LayerFilter {
    /// MapLibre の式表現
    pub fn to_json(&self) -> Value {
        match self {
            Self::MatchNone => json!(["==", "id", ""]),
            Self::IdEquals(id) => json!(["==", "id", id]),
        }
    }

    pub fn matches(&self, properties: &JsonObject) -> bool {
        match self {
            Self::MatchNone => false,
            Self::IdEquals(id) => properties.get("id").and_then(Value::as_str) == Some(id.as_str()),
        }
    }
}

impl Serialize for LayerFilter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// fit_bounds のオプション
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// 四辺の余白（px）
    pub padding: f64,
    pub max_zoom: Option<f64>,
    pub duration_ms: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            padding: 0.0,
            max_zoom: None,
            duration_ms: 0,
        }
    }
}

/// クリック位置で描画されている地物
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFeature {
    pub layer: String,
    pub properties: JsonObject,
    pub bounds: Option<BBox>,
}

impl RenderedFeature {
    pub fn id(&self) -> Option<&str> {
        self.properties.get("id").and_then(Value::as_str)
    }

    pub fn count(&self) -> Option<u64> {
        self.properties.get("count").and_then(Value::as_u64)
    }
}

/// 地図描画面
pub trait MapSurface {
    fn install_layers(&mut self, layers: &[LayerDef]);

    /// ソースのデータを丸ごと置き換える
    fn set_source_data(&mut self, source: &str, data: FeatureCollection);

    fn add_image_overlay(&mut self, overlay: ImageOverlay) -> Result<()>;

    /// 存在しなければ false
    fn remove_image_overlay(&mut self, layer_id: &str) -> bool;

    fn overlay_ids(&self) -> BTreeSet<String>;

    fn set_layer_filter(&mut self, layer: &str, filter: LayerFilter);

    fn query_rendered_features(&self, point: ScreenPoint, layers: &[&str]) -> Vec<RenderedFeature>;

    /// 現在の表示範囲
    fn viewport(&self) -> Viewport;

    fn screen_to_lnglat(&self, point: ScreenPoint) -> LngLat;

    fn lnglat_to_screen(&self, point: LngLat) -> ScreenPoint;

    /// 範囲が収まるように視点を動かす。移動は `intent` 付きで通知される
    fn fit_bounds(&mut self, bounds: BBox, options: &FitOptions, intent: MoveIntent) -> Result<()>;
}

/// 描画面が起こした移動（ホストが MoveStarted/MoveEnded として配送する）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingMove {
    pub viewport: Viewport,
    pub intent: MoveIntent,
    pub duration_ms: u64,
}

/// GPU を使わない描画面
///
/// ソース・オーバーレイ・フィルタをメモリに保持し、
/// 固定サイズのキャンバスと Web Mercator で座標変換する。
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    width: f64,
    height: f64,
    center: LngLat,
    zoom: f64,
    layers: Vec<LayerDef>,
    sources: HashMap<String, FeatureCollection>,
    overlays: BTreeMap<String, ImageOverlay>,
    filters: HashMap<String, LayerFilter>,
    pending_moves: VecDeque<PendingMove>,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32, center: LngLat, zoom: f64) -> Self {
        Self {
            width: width.max(1) as f64,
            height: height.max(1) as f64,
            center,
            zoom: zoom.clamp(0.0, MAX_SURFACE_ZOOM),
            layers: Vec::new(),
            sources: HashMap::new(),
            overlays: BTreeMap::new(),
            filters: HashMap::new(),
            pending_moves: VecDeque::new(),
        }
    }

    pub fn canvas_size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    /// 視点を即座に移動（ユーザー操作の再現用）
    pub fn jump_to(&mut self, center: LngLat, zoom: f64) -> Viewport {
        self.center = LngLat::new(center.lon, center.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE));
        self.zoom = zoom.clamp(0.0, MAX_SURFACE_ZOOM);
        self.viewport()
    }

    pub fn take_pending_moves(&mut self) -> Vec<PendingMove> {
        self.pending_moves.drain(..).collect()
    }

    pub fn has_pending_moves(&self) -> bool {
        !self.pending_moves.is_empty()
    }

    pub fn source(&self, name: &str) -> Option<&FeatureCollection> {
        self.sources.get(name)
    }

    pub fn overlay(&self, layer_id: &str) -> Option<&ImageOverlay> {
        self.overlays.get(layer_id)
    }

    pub fn filter(&self, layer: &str) -> Option<&LayerFilter> {
        self.filters.get(layer)
    }

    pub fn layer(&self, id: &str) -> Option<&LayerDef> {
        self.layers.iter().find(|l| l.id == id)
    }

    fn feature_hit(feature: &Feature, point: &Point<f64>) -> Option<Geometry<f64>> {
        let geometry = feature.geometry.clone()?;
        let geometry: Geometry<f64> = geometry.value.try_into().ok()?;
        geometry.intersects(point).then_some(geometry)
    }
}

impl MapSurface for HeadlessSurface {
    fn install_layers(&mut self, layers: &[LayerDef]) {
        for layer in layers {
            self.sources
                .entry(layer.source.to_string())
                .or_insert_with(|| FeatureCollection {
                    bbox: None,
                    features: Vec::new(),
                    foreign_members: None,
                });
            if let Some(filter) = &layer.filter {
                self.filters.insert(layer.id.to_string(), filter.clone());
            }
            self.layers.retain(|l| l.id != layer.id);
            self.layers.push(layer.clone());
        }
    }

    fn set_source_data(&mut self, source: &str, data: FeatureCollection) {
        self.sources.insert(source.to_string(), data);
    }

    fn add_image_overlay(&mut self, overlay: ImageOverlay) -> Result<()> {
        if self.overlays.contains_key(&overlay.layer_id) {
            return Err(Error::Overlay(format!("layer '{}' already exists", overlay.layer_id)));
        }
        if !overlay.corners.iter().all(LngLat::is_finite) {
            return Err(Error::Overlay(format!("{}: non-finite corners", overlay.layer_id)));
        }
        self.overlays.insert(overlay.layer_id.clone(), overlay);
        Ok(())
    }

    fn remove_image_overlay(&mut self, layer_id: &str) -> bool {
        self.overlays.remove(layer_id).is_some()
    }

    fn overlay_ids(&self) -> BTreeSet<String> {
        self.overlays.keys().cloned().collect()
    }

    fn set_layer_filter(&mut self, layer: &str, filter: LayerFilter) {
        self.filters.insert(layer.to_string(), filter);
    }

    fn query_rendered_features(&self, point: ScreenPoint, layers: &[&str]) -> Vec<RenderedFeature> {
        let location: Point<f64> = self.screen_to_lnglat(point).into();
        let mut hits = Vec::new();

        // 後から追加したレイヤーが上
        for layer in self.layers.iter().rev() {
            if !layers.contains(&layer.id) || !layer.visible_at(self.zoom) {
                continue;
            }
            let Some(source) = self.sources.get(layer.source) else {
                continue;
            };
            let filter = self.filters.get(layer.id);

            for feature in &source.features {
                let properties = feature.properties.clone().unwrap_or_default();
                if filter.is_some_and(|f| !f.matches(&properties)) {
                    continue;
                }
                if let Some(geometry) = Self::feature_hit(feature, &location) {
                    hits.push(RenderedFeature {
                        layer: layer.id.to_string(),
                        properties,
                        bounds: geometry.bounding_rect().map(BBox::from),
                    });
                }
            }
        }
        hits
    }

    fn viewport(&self) -> Viewport {
        let (cx, cy) = project(self.center, self.zoom);
        let (hw, hh) = (self.width / 2.0, self.height / 2.0);
        let nw = unproject(cx - hw, cy - hh, self.zoom);
        let se = unproject(cx + hw, cy + hh, self.zoom);
        Viewport::new(self.center, self.zoom, BBox::new(nw.lon, se.lat, se.lon, nw.lat))
    }

    fn screen_to_lnglat(&self, point: ScreenPoint) -> LngLat {
        let (cx, cy) = project(self.center, self.zoom);
        unproject(
            cx + point.x - self.width / 2.0,
            cy + point.y - self.height / 2.0,
            self.zoom,
        )
    }

    fn lnglat_to_screen(&self, point: LngLat) -> ScreenPoint {
        let (cx, cy) = project(self.center, self.zoom);
        let (x, y) = project(point, self.zoom);
        ScreenPoint::new(x - cx + self.width / 2.0, y - cy + self.height / 2.0)
    }

    fn fit_bounds(&mut self, bounds: BBox, options: &FitOptions, intent: MoveIntent) -> Result<()> {
        bounds.validate()?;

        let avail_w = self.width - 2.0 * options.padding;
        let avail_h = self.height - 2.0 * options.padding;
        if avail_w <= 0.0 || avail_h <= 0.0 {
            return Err(Error::InvalidBounds(format!(
                "padding {} leaves no room on {}x{} canvas",
                options.padding, self.width, self.height
            )));
        }

        let clamp_lat = |lat: f64| lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        let (x0, y0) = project(LngLat::new(bounds.west, clamp_lat(bounds.north)), 0.0);
        let (x1, y1) = project(LngLat::new(bounds.east, clamp_lat(bounds.south)), 0.0);
        let (dx, dy) = ((x1 - x0).abs(), (y1 - y0).abs());

        let max_zoom = options.max_zoom.unwrap_or(MAX_SURFACE_ZOOM).min(MAX_SURFACE_ZOOM);
        let fit_zoom = if dx == 0.0 && dy == 0.0 {
            max_zoom
        } else {
            (avail_w / dx).min(avail_h / dy).log2()
        };
        let zoom = fit_zoom.min(max_zoom).max(0.0);

        let center = unproject((x0 + x1) / 2.0, (y0 + y1) / 2.0, 0.0);
        let viewport = self.jump_to(center, zoom);

        self.pending_moves.push_back(PendingMove {
            viewport,
            intent,
            duration_ms: options.duration_ms,
        });
        Ok(())
    }
}
