use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use oam_browser_common::{BBox, DatePreset, LayerMode, PlatformFilter};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "oam")]
#[command(about = "OpenAerialMap 航空写真フットプリント閲覧ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// カタログからフットプリントを取得
    Fetch {
        /// 取得範囲 (west,south,east,north)
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<BBox>,

        /// 撮影日の範囲 (any/week/month/ytd)
        #[arg(long)]
        preset: Option<DatePreset>,

        /// 撮影日（開始） YYYY-MM-DD
        #[arg(long)]
        from: Option<NaiveDate>,

        /// 撮影日（終了） YYYY-MM-DD
        #[arg(long)]
        to: Option<NaiveDate>,

        /// プラットフォーム (satellite/uav/aircraft)
        #[arg(long)]
        platform: Option<PlatformFilter>,

        /// ライセンス（部分一致）
        #[arg(long)]
        license: Option<String>,

        /// 保存先（FeatureCollection）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 保存済みデータのグリッド集約
    Grid {
        /// 入力ファイル（/meta レスポンス or FeatureCollection）
        #[arg(required = true)]
        input: PathBuf,

        /// 表示ズーム
        #[arg(short, long)]
        zoom: f64,

        /// 集約結果の保存先（GeoJSON）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// プレビュー表示対象の算出
    Overlays {
        #[arg(required = true)]
        input: PathBuf,

        #[arg(short, long)]
        zoom: f64,

        /// 表示モード (footprints/previews)
        #[arg(short, long, default_value = "footprints")]
        mode: LayerMode,

        /// 手動で表示するID
        #[arg(long)]
        pin: Vec<String>,

        /// 手動で隠すID
        #[arg(long)]
        hide: Vec<String>,
    },

    /// 操作スクリプトを再生
    Replay {
        /// スクリプト（JSON）
        #[arg(required = true)]
        script: PathBuf,

        /// 保存済みデータを使う（省略時はカタログAPI）
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// 起動時のクエリ文字列 (例: lat=35.68&lon=139.76&zoom=11)
        #[arg(short, long, default_value = "")]
        query: String,

        /// 結果をJSONで出力
        #[arg(long)]
        json: bool,
    },

    /// 設定を表示/編集
    Config {
        /// 設定を表示
        #[arg(long)]
        show: bool,

        /// カタログAPIのURLを設定
        #[arg(long)]
        set_api_base: Option<String>,

        /// サムネイル中継の接頭辞を設定
        #[arg(long)]
        set_relay: Option<String>,

        /// サムネイル中継を解除
        #[arg(long, conflicts_with = "set_relay")]
        clear_relay: bool,
    },
}
