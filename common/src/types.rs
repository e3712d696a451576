//! 地理座標・ビューポートの型定義
//!
//! - LngLat: 経度・緯度（度）
//! - BBox: 軸平行な矩形範囲（west, south, east, north）
//! - Viewport: 表示範囲 + 連続ズーム + 中心

use crate::error::{Error, Result};
use geo::{BoundingRect, Coord, MultiPolygon, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 経度・緯度の組。JSONでは `[lon, lat]` 配列
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LngLat {
    pub lon: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }
}

impl From<[f64; 2]> for LngLat {
    fn from(v: [f64; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(p: LngLat) -> Self {
        [p.lon, p.lat]
    }
}

impl From<Point<f64>> for LngLat {
    fn from(p: Point<f64>) -> Self {
        Self::new(p.x(), p.y())
    }
}

impl From<LngLat> for Point<f64> {
    fn from(p: LngLat) -> Self {
        Point::new(p.lon, p.lat)
    }
}

impl From<LngLat> for Coord<f64> {
    fn from(p: LngLat) -> Self {
        Coord { x: p.lon, y: p.lat }
    }
}

/// 軸平行な地理範囲。JSONでは `[west, south, east, north]` 配列
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self { west, south, east, north }
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }

    /// 有限値かつ west <= east, south <= north であること
    pub fn validate(&self) -> Result<()> {
        if !self.to_array().iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidBounds(format!("non-finite bounds {}", self)));
        }
        if self.west > self.east || self.south > self.north {
            return Err(Error::InvalidBounds(format!("inverted bounds {}", self)));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// 点集合の外接矩形（空なら None）
    pub fn around_points(points: &[LngLat]) -> Option<Self> {
        let first = points.first()?;
        let init = Self::new(first.lon, first.lat, first.lon, first.lat);
        Some(points.iter().skip(1).fold(init, |b, p| Self {
            west: b.west.min(p.lon),
            south: b.south.min(p.lat),
            east: b.east.max(p.lon),
            north: b.north.max(p.lat),
        }))
    }

    /// ジオメトリの外接矩形
    pub fn of_geometry(geometry: &MultiPolygon<f64>) -> Option<Self> {
        geometry.bounding_rect().map(Self::from)
    }

    pub fn center(&self) -> LngLat {
        LngLat::new((self.west + self.east) / 2.0, (self.south + self.north) / 2.0)
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// 境界を含む包含判定
    pub fn contains(&self, p: &LngLat) -> bool {
        p.lon >= self.west && p.lon <= self.east && p.lat >= self.south && p.lat <= self.north
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.west <= other.east
            && other.west <= self.east
            && self.south <= other.north
            && other.south <= self.north
    }

    /// 画像オーバーレイの四隅（左上・右上・右下・左下の順）
    pub fn overlay_corners(&self) -> [LngLat; 4] {
        [
            LngLat::new(self.west, self.north),
            LngLat::new(self.east, self.north),
            LngLat::new(self.east, self.south),
            LngLat::new(self.west, self.south),
        ]
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Rect::new(
            Coord { x: self.west, y: self.south },
            Coord { x: self.east, y: self.north },
        )
        .to_polygon()
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        b.to_array()
    }
}

impl From<Rect<f64>> for BBox {
    fn from(r: Rect<f64>) -> Self {
        Self::new(r.min().x, r.min().y, r.max().x, r.max().y)
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

/// "west,south,east,north" 形式をパース
impl FromStr for BBox {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let values: Vec<f64> = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Parse(format!("bbox '{}': {}", s, e)))?;

        if values.len() != 4 {
            return Err(Error::Parse(format!(
                "bbox '{}': expected 4 values, got {}",
                s,
                values.len()
            )));
        }

        let bbox = Self::new(values[0], values[1], values[2], values[3]);
        bbox.validate()?;
        Ok(bbox)
    }
}

/// 現在の表示状態
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: LngLat,
    pub zoom: f64,
    pub bounds: BBox,
}

impl Viewport {
    pub fn new(center: LngLat, zoom: f64, bounds: BBox) -> Self {
        Self { center, zoom, bounds }
    }
}

/// 画面上のピクセル座標（左上原点）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
