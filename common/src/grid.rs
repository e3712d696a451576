//! グリッド集約
//!
//! フットプリントの代表点（重心）をタイル単位で数え、
//! 密集域の表示用にズーム依存のグリッドを生成する。
//!
//! ## 処理フロー
//! 1. 各アイテムを代表点に変換
//! 2. 代表点の外接矩形を計算
//! 3. 初期解像度 = floor(表示ズーム) + 4（2〜14に制限）
//! 4. 範囲のタイル数が上限を超える間は解像度を下げる
//! 5. タイルごとに代表点を数え、1以上のものだけ出力
//!
//! 表示ズームが 8〜10 の間は、大きいフットプリントに中心が
//! 含まれるタイルを出力しない（同じ範囲の二重表示を避ける）。
//!
//! 毎回全件を再計算する。入力に対して冪等で副作用はない。

use crate::error::{Error, Result};
use crate::footprint::FootprintItem;
use crate::tile::{tile_containing, tile_polygon, TileCoord, TilePolygon, TileRange, MAX_LATITUDE};
use crate::types::{BBox, LngLat, Viewport};
use geo::{Centroid, Intersects, MultiPolygon, Point};
use geojson::{Feature, FeatureCollection, JsonObject};
use serde_json::Value;
use std::collections::HashMap;

/// 1回の集約で走査するタイル数の上限
pub const MAX_GRID_TILES: u64 = 2500;
/// 初期解像度の下限・上限
pub const MIN_GRID_ZOOM: u8 = 2;
pub const MAX_GRID_ZOOM: u8 = 14;
/// 表示ズームに足すオフセット
pub const GRID_ZOOM_OFFSET: i64 = 4;
/// 大きいフットプリントとの重複を抑制する表示ズーム帯 [start, end)
pub const HYBRID_ZOOM_START: f64 = 8.0;
pub const HYBRID_ZOOM_END: f64 = 10.0;

/// 集約セル（count >= 1 のものだけ生成される）
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub tile: TilePolygon,
    pub count: u32,
}

impl GridCell {
    pub fn coord(&self) -> TileCoord {
        self.tile.coord
    }

    /// レンダラ用 Feature（プロパティ: x, y, z, count）
    pub fn to_feature(&self) -> Feature {
        let coord = self.coord();
        let mut properties = JsonObject::new();
        properties.insert("x".into(), Value::from(coord.x));
        properties.insert("y".into(), Value::from(coord.y));
        properties.insert("z".into(), Value::from(coord.z));
        properties.insert("count".into(), Value::from(self.count));

        Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(
                &self.tile.to_polygon(),
            ))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// 1回分の集約結果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridAggregation {
    /// 自動選択された解像度
    pub grid_zoom: u8,
    /// 走査したタイル数
    pub tiles_examined: u64,
    pub cells: Vec<GridCell>,
}

impl GridAggregation {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn total_count(&self) -> u64 {
        self.cells.iter().map(|c| c.count as u64).sum()
    }

    pub fn cell_at(&self, coord: TileCoord) -> Option<&GridCell> {
        self.cells.iter().find(|c| c.coord() == coord)
    }

    pub fn to_feature_collection(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.cells.iter().map(GridCell::to_feature).collect(),
            foreign_members: None,
        }
    }
}

/// ズーム 8〜10 の重複抑制帯かどうか
pub fn is_hybrid_zoom(zoom: f64) -> bool {
    (HYBRID_ZOOM_START..HYBRID_ZOOM_END).contains(&zoom)
}

/// 初期解像度
pub fn initial_grid_zoom(view_zoom: f64) -> u8 {
    let candidate = (view_zoom.floor() as i64).saturating_add(GRID_ZOOM_OFFSET);
    candidate.clamp(MIN_GRID_ZOOM as i64, MAX_GRID_ZOOM as i64) as u8
}

/// タイル数が上限以下になるまで解像度を下げる
///
/// 戻り値の範囲は `tile_count() <= MAX_GRID_TILES` か `zoom == 0` を満たす
pub fn select_resolution(bounds: &BBox, view_zoom: f64) -> TileRange {
    let mut zoom = initial_grid_zoom(view_zoom);
    let mut range = TileRange::covering(bounds, zoom);

    while range.tile_count() > MAX_GRID_TILES && zoom > 0 {
        zoom -= 1;
        range = TileRange::covering(bounds, zoom);
    }
    range
}

/// アイテムの代表点（ジオメトリ重心）
///
/// 緯度は Mercator の有効範囲に収める
pub fn representative_point(item: &FootprintItem) -> Result<LngLat> {
    let centroid = item
        .geometry()
        .centroid()
        .ok_or_else(|| Error::Geometry(format!("{}: empty geometry has no centroid", item.id())))?;

    let point = LngLat::new(centroid.x(), centroid.y());
    if !point.is_finite() {
        return Err(Error::Geometry(format!("{}: non-finite centroid", item.id())));
    }
    Ok(LngLat::new(point.lon, point.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)))
}

/// グリッドを生成
///
/// ジオメトリ不正はエラーとして返す。描画側は `aggregate_or_empty` を使う
pub fn aggregate(items: &[FootprintItem], viewport: &Viewport) -> Result<GridAggregation> {
    if items.is_empty() {
        return Ok(GridAggregation::empty());
    }

    let points = items
        .iter()
        .map(representative_point)
        .collect::<Result<Vec<_>>>()?;

    let large: Vec<&MultiPolygon<f64>> = if is_hybrid_zoom(viewport.zoom) {
        items
            .iter()
            .filter(|i| i.is_large())
            .map(|i| i.geometry())
            .collect()
    } else {
        Vec::new()
    };

    aggregate_points(&points, &large, viewport.zoom)
}

/// 代表点からグリッドを生成
///
/// `large` に中心が含まれるタイルは出力しない（重複抑制帯の判定は呼び出し側）
pub fn aggregate_points(
    points: &[LngLat],
    large: &[&MultiPolygon<f64>],
    view_zoom: f64,
) -> Result<GridAggregation> {
    let Some(bounds) = BBox::around_points(points) else {
        return Ok(GridAggregation::empty());
    };
    if !bounds.is_valid() {
        return Err(Error::Geometry(format!("invalid point bounds {}", bounds)));
    }

    let range = select_resolution(&bounds, view_zoom);
    let zoom = range.zoom;

    // 代表点 → 含むタイル。タイルは西端・南端を含むので各点はちょうど1枚に入る
    let mut counts: HashMap<TileCoord, u32> = HashMap::new();
    for point in points {
        *counts.entry(tile_containing(*point, zoom)).or_insert(0) += 1;
    }

    let mut cells = Vec::new();
    let mut tiles_examined = 0u64;

    for coord in range.tiles() {
        tiles_examined += 1;

        let count = counts.get(&coord).copied().unwrap_or(0);
        if count == 0 {
            continue;
        }

        let tile = tile_polygon(coord.x, coord.y, zoom);
        let center: Point<f64> = tile.center().into();
        if large.iter().any(|poly| poly.intersects(&center)) {
            continue;
        }

        cells.push(GridCell { tile, count });
    }

    Ok(GridAggregation {
        grid_zoom: zoom,
        tiles_examined,
        cells,
    })
}

/// 失敗したパスは空グリッドに縮退（ログのみ）
pub fn aggregate_or_empty(items: &[FootprintItem], viewport: &Viewport) -> GridAggregation {
    match aggregate(items, viewport) {
        Ok(grid) => {
            tracing::debug!(
                grid_zoom = grid.grid_zoom,
                tiles = grid.tiles_examined,
                cells = grid.cells.len(),
                "grid aggregated"
            );
            grid
        }
        Err(e) => {
            tracing::warn!("Grid update error: {}", e);
            GridAggregation::empty()
        }
    }
}
