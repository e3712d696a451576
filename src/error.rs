use thiserror::Error;

#[derive(Error, Debug)]
pub enum OamError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("HTTPエラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error("カタログAPIエラー: {0}")]
    ApiResponse(String),

    #[error("リプレイスクリプトが不正: {0}")]
    Script(String),

    #[error("エンジンエラー: {0}")]
    Core(#[from] oam_browser_common::Error),

    #[error("JSON解析エラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OamError>;
