//! タイル座標演算
//!
//! 経緯度と slippy-map タイル番号 (x, y, z) の相互変換。
//! Web Mercator の有効緯度（約 ±85.05°）外の入力は未定義で、
//! 変換結果は意味を持たない（パニックはしない）。

use crate::types::{BBox, LngLat};
use geo::{LineString, Polygon};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Web Mercator の有効緯度上限
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// ピクセル投影で使うタイル一辺（MapLibre 互換）
pub const WORLD_TILE_SIZE: f64 = 512.0;

/// タイル座標
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i64,
    pub y: i64,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: i64, y: i64, z: u8) -> Self {
        Self { x, y, z }
    }
}

fn tiles_per_axis(zoom: u8) -> f64 {
    2f64.powi(zoom as i32)
}

/// 緯度 → 正規化 Mercator y（0 = 北端, 1 = 南端）
fn mercator_y(lat: f64) -> f64 {
    let rad = lat.to_radians();
    (1.0 - (rad.tan() + 1.0 / rad.cos()).ln() / PI) / 2.0
}

pub fn lon_to_tile_x(lon: f64, zoom: u8) -> i64 {
    ((lon + 180.0) / 360.0 * tiles_per_axis(zoom)).floor() as i64
}

pub fn lat_to_tile_y(lat: f64, zoom: u8) -> i64 {
    (mercator_y(lat) * tiles_per_axis(zoom)).floor() as i64
}

/// タイル北西角の経度
pub fn tile_to_lon(x: i64, zoom: u8) -> f64 {
    x as f64 / tiles_per_axis(zoom) * 360.0 - 180.0
}

/// タイル北西角の緯度
pub fn tile_to_lat(y: i64, zoom: u8) -> f64 {
    let n = PI - 2.0 * PI * y as f64 / tiles_per_axis(zoom);
    n.sinh().atan().to_degrees()
}

/// 点を含むタイル
///
/// タイルは西端と南端を含み、東端と北端を含まない。
/// 境界上の点はちょうど1枚のタイルに属する。
pub fn tile_containing(point: LngLat, zoom: u8) -> TileCoord {
    let v = mercator_y(point.lat) * tiles_per_axis(zoom);
    TileCoord::new(lon_to_tile_x(point.lon, zoom), v.ceil() as i64 - 1, zoom)
}

/// タイルの閉じたリング（先頭 = 末尾の5点）
#[derive(Debug, Clone, PartialEq)]
pub struct TilePolygon {
    pub coord: TileCoord,
    pub ring: [LngLat; 5],
}

pub fn tile_polygon(x: i64, y: i64, zoom: u8) -> TilePolygon {
    let w = tile_to_lon(x, zoom);
    let e = tile_to_lon(x + 1, zoom);
    let n = tile_to_lat(y, zoom);
    let s = tile_to_lat(y + 1, zoom);

    TilePolygon {
        coord: TileCoord::new(x, y, zoom),
        ring: [
            LngLat::new(w, n),
            LngLat::new(e, n),
            LngLat::new(e, s),
            LngLat::new(w, s),
            LngLat::new(w, n),
        ],
    }
}

impl TilePolygon {
    pub fn bounds(&self) -> BBox {
        let nw = self.ring[0];
        let se = self.ring[2];
        BBox::new(nw.lon, se.lat, se.lon, nw.lat)
    }

    /// タイルの中心（経緯度空間での矩形中心）
    pub fn center(&self) -> LngLat {
        self.bounds().center()
    }

    /// `tile_containing` と同じ半開区間での包含判定
    pub fn contains(&self, p: &LngLat) -> bool {
        let b = self.bounds();
        p.lon >= b.west && p.lon < b.east && p.lat >= b.south && p.lat < b.north
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        let coords: Vec<(f64, f64)> = self.ring.iter().map(|p| (p.lon, p.lat)).collect();
        Polygon::new(LineString::from(coords), vec![])
    }
}

/// あるズームでのタイル番号の矩形範囲（両端を含む）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: i64,
    pub max_x: i64,
    pub min_y: i64,
    pub max_y: i64,
}

impl TileRange {
    /// 範囲を覆うタイル。y は北（小）→ 南（大）
    pub fn covering(bounds: &BBox, zoom: u8) -> Self {
        let nw = tile_containing(LngLat::new(bounds.west, bounds.north), zoom);
        let se = tile_containing(LngLat::new(bounds.east, bounds.south), zoom);
        Self {
            zoom,
            min_x: nw.x,
            max_x: se.x,
            min_y: nw.y,
            max_y: se.y,
        }
    }

    /// 範囲内のタイル数（オーバーフローしない）
    pub fn tile_count(&self) -> u64 {
        let span = |min: i64, max: i64| -> u64 {
            let d = max.saturating_sub(min);
            if d < 0 {
                0
            } else {
                (d as u64).saturating_add(1)
            }
        };
        span(self.min_x, self.max_x).saturating_mul(span(self.min_y, self.max_y))
    }

    /// x 外側・y 内側の順に列挙
    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (self.min_x..=self.max_x).flat_map(move |x| {
            (self.min_y..=self.max_y).map(move |y| TileCoord::new(x, y, self.zoom))
        })
    }
}

/// ズームにおける世界全体のピクセル幅
pub fn world_size(zoom: f64) -> f64 {
    WORLD_TILE_SIZE * 2f64.powf(zoom)
}

/// 経緯度 → ワールドピクセル座標
pub fn project(point: LngLat, zoom: f64) -> (f64, f64) {
    let size = world_size(zoom);
    ((point.lon + 180.0) / 360.0 * size, mercator_y(point.lat) * size)
}

/// ワールドピクセル座標 → 経緯度
pub fn unproject(x: f64, y: f64, zoom: f64) -> LngLat {
    let size = world_size(zoom);
    let n = PI * (1.0 - 2.0 * y / size);
    LngLat::new(x / size * 360.0 - 180.0, n.sinh().atan().to_degrees())
}
