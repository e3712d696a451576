//! oam-browser: OpenAerialMap フットプリント閲覧ツール（ホスト側）
//!
//! マップエンジン本体は `oam_browser_common`。ここでは CLI・設定・カタログ取得・
//! tokio 上のセッション実行を扱う。

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod report;
pub mod session;
pub mod thumbnails;
