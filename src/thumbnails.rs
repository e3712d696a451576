//! サムネイル中継
//!
//! ブラウザの同一オリジン制約を回避する中継サーバを経由させる場合に使う。
//! 中継先は設定で指定し、未設定なら `DirectThumbnails` を使う。

use crate::config::Config;
use oam_browser_common::{DirectThumbnails, ThumbnailResolver};
use url::form_urlencoded::byte_serialize;

/// `{prefix}{percent-encoded URL}` に変換する
#[derive(Debug, Clone)]
pub struct RelayThumbnails {
    prefix: String,
}

impl RelayThumbnails {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl ThumbnailResolver for RelayThumbnails {
    fn resolve(&self, raw: &str) -> String {
        // form エンコードの '+' は中継側で空白に戻らないので %20 にする
        let encoded: String = byte_serialize(raw.as_bytes()).collect::<String>().replace('+', "%20");
        format!("{}{}", self.prefix, encoded)
    }
}

/// 設定に応じた解決方法
pub fn resolver_from_config(config: &Config) -> Box<dyn ThumbnailResolver> {
    match &config.thumbnail_relay {
        Some(prefix) => Box::new(RelayThumbnails::new(prefix.clone())),
        None => Box::new(DirectThumbnails),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_encodes_url() {
        let relay = RelayThumbnails::new("https://relay.example/?");
        assert_eq!(
            relay.resolve("https://oin.example/a b.png?x=1&y=2"),
            "https://relay.example/?https%3A%2F%2Foin.example%2Fa%20b.png%3Fx%3D1%26y%3D2"
        );
    }

    #[test]
    fn test_direct_without_relay() {
        let config = Config::default();
        let resolver = resolver_from_config(&config);
        assert_eq!(resolver.resolve("https://oin.example/a.png"), "https://oin.example/a.png");
    }
}
