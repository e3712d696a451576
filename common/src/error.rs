//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Overlay error: {0}")]
    Overlay(String),
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
