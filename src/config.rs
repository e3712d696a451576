use crate::error::{OamError, Result};
use crate::session::StalePolicy;
use oam_browser_common::catalog::DEFAULT_RESULT_LIMIT;
use oam_browser_common::LngLat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 起動時の表示（クエリ文字列に lat/lon/zoom が無いとき）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialView {
    pub lon: f64,
    pub lat: f64,
    pub zoom: f64,
}

impl InitialView {
    pub fn center(&self) -> LngLat {
        LngLat::new(self.lon, self.lat)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub result_limit: u32,
    /// サムネイル中継の接頭辞（未設定なら直接取得）
    pub thumbnail_relay: Option<String>,
    pub canvas: Canvas,
    pub initial_view: InitialView,
    pub stale_responses: StalePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "https://api.openaerialmap.org".into(),
            result_limit: DEFAULT_RESULT_LIMIT,
            thumbnail_relay: None,
            canvas: Canvas { width: 1280, height: 800 },
            initial_view: InitialView { lon: 0.0, lat: 20.0, zoom: 2.0 },
            stale_responses: StalePolicy::Apply,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// ファイルが無ければ既定値
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| OamError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("oam-browser").join("config.json"))
    }

    pub fn set_api_base(&mut self, url: String) -> Result<()> {
        url::Url::parse(&url)
            .map_err(|e| OamError::Config(format!("APIのURLが不正です ({}): {}", url, e)))?;
        self.api_base = url.trim_end_matches('/').to_string();
        Ok(())
    }

    pub fn set_relay(&mut self, prefix: Option<String>) {
        self.thumbnail_relay = prefix.filter(|p| !p.is_empty());
    }
}
