//! OAM Browser Common Library
//!
//! 地図エンジン本体（I/Oを持たず、CLI以外のフロントエンドからも使える）
//!
//! - タイル座標演算とグリッド集約
//! - レイヤー表示状態・ビューポート同期・選択
//! - カタログレコードの正規化とフィルタ

pub mod error;
pub mod types;
pub mod tile;
pub mod footprint;
pub mod grid;
pub mod layers;
pub mod debounce;
pub mod sync;
pub mod selection;
pub mod view_state;
pub mod surface;
pub mod engine;
pub mod catalog;

pub use error::{Error, Result};
pub use types::{BBox, LngLat, ScreenPoint, Viewport};
pub use tile::{TileCoord, TilePolygon, TileRange};
pub use footprint::{FootprintItem, ItemMeta};
pub use grid::{aggregate, aggregate_or_empty, GridAggregation, GridCell};
pub use layers::{
    effective_overlay_set, DirectThumbnails, ImageOverlay, LayerMode, LayerVisibilityState,
    OverlayNotice, ThumbnailResolver,
};
pub use debounce::{TimerChannel, TimerHandle};
pub use sync::{MoveIntent, SyncPhase, ViewportSync};
pub use selection::SelectionOverlay;
pub use view_state::ViewQuery;
pub use surface::{HeadlessSurface, MapSurface, PendingMove};
pub use engine::{EngineCommand, MapEngine, MapEvent};
pub use catalog::{CatalogFilters, CatalogQuery, DatePreset, PlatformFilter};
