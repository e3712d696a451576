use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use oam_browser::catalog::{self, CatalogClient, DataSource, FixtureSource};
use oam_browser::cli::{Cli, Commands};
use oam_browser::config::Config;
use oam_browser::session::{self, Session};
use oam_browser::{report, thumbnails};
use oam_browser_common::layers::overlay_notice;
use oam_browser_common::{
    aggregate, effective_overlay_set, BBox, CatalogFilters, CatalogQuery, FootprintItem, LngLat,
    ViewQuery, Viewport,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut config = Config::load()?;

    match cli.command {
        Commands::Fetch { bbox, preset, from, to, platform, license, output } => {
            println!("🛰 oam - フットプリント取得\n");

            let mut filters = CatalogFilters { platform, license, ..Default::default() };
            if let Some(preset) = preset {
                filters = filters.with_dates(preset.range(Local::now().date_naive()));
            }
            if from.is_some() {
                filters.date_start = from;
            }
            if to.is_some() {
                filters.date_end = to;
            }

            let client = CatalogClient::from_config(&config)?;
            let query = CatalogQuery::new(bbox, filters, config.result_limit);
            println!("取得中... {}", client.meta_url(&query)?);
            let items = client.fetch(&query).await?;
            report::print_items(&items);

            if let Some(output) = output {
                catalog::write_items(&output, &items)
                    .with_context(|| format!("write {}", output.display()))?;
                println!("✔ 保存: {}", output.display());
            }
        }

        Commands::Grid { input, zoom, output } => {
            println!("🗺 oam - グリッド集約\n");

            let items = load_input(&input)?;
            let Some(viewport) = survey_viewport(&items, zoom) else {
                println!("アイテムがありません");
                return Ok(());
            };
            let grid = aggregate(&items, &viewport)?;
            report::print_grid(&grid);

            if let Some(output) = output {
                let json = serde_json::to_string_pretty(&grid.to_feature_collection())?;
                std::fs::write(&output, json)
                    .with_context(|| format!("write {}", output.display()))?;
                println!("✔ 保存: {}", output.display());
            }
        }

        Commands::Overlays { input, zoom, mode, pin, hide } => {
            println!("🖼 oam - プレビュー算出\n");

            let items = load_input(&input)?;
            let pinned: BTreeSet<String> = pin.into_iter().collect();
            let hidden: BTreeSet<String> = hide.into_iter().collect();
            let overlays = effective_overlay_set(mode, &pinned, &hidden, zoom, &items);
            report::print_overlays(mode, zoom, &overlays, overlay_notice(mode, zoom));
        }

        Commands::Replay { script, input, query, json } => {
            println!("▶ oam - リプレイ\n");

            let steps = session::load_script(&script)?;
            let source: Arc<dyn DataSource> = match input {
                Some(path) => Arc::new(FixtureSource::from_file(&path)?),
                None => Arc::new(CatalogClient::from_config(&config)?),
            };
            let resolver = thumbnails::resolver_from_config(&config);
            let mut session = Session::new(&config, source, resolver, ViewQuery::parse(&query));

            println!("{}ステップを再生中...", steps.len());
            let result = session.run_script(steps).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                report::print_session(&result);
            }
            println!("\n✅ 完了");
        }

        Commands::Config { show, set_api_base, set_relay, clear_relay } => {
            let mut changed = false;
            if let Some(url) = set_api_base {
                config.set_api_base(url)?;
                println!("✔ APIのURLを設定しました");
                changed = true;
            }
            if set_relay.is_some() || clear_relay {
                config.set_relay(set_relay);
                println!("✔ サムネイル中継を{}しました", if clear_relay { "解除" } else { "設定" });
                changed = true;
            }
            if changed {
                config.save()?;
            }

            if show || !changed {
                println!("設定:");
                println!("  API: {}", config.api_base);
                println!("  取得件数: {}", config.result_limit);
                println!("  サムネイル中継: {}", config.thumbnail_relay.as_deref().unwrap_or("なし"));
                println!("  描画サイズ: {}x{}", config.canvas.width, config.canvas.height);
                println!(
                    "  初期表示: {:.4}, {:.4} z{:.1}",
                    config.initial_view.lat, config.initial_view.lon, config.initial_view.zoom
                );
                println!("  古い応答: {:?}", config.stale_responses);
            }
        }
    }

    Ok(())
}

/// 既定は info、`--verbose` で debug。RUST_LOG があればそちらを優先
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_input(path: &Path) -> Result<Vec<FootprintItem>> {
    let items = catalog::read_items(path).with_context(|| format!("read {}", path.display()))?;
    println!("✔ {}件を読み込み\n", items.len());
    Ok(items)
}

/// 全アイテムを覆う表示範囲
fn survey_viewport(items: &[FootprintItem], zoom: f64) -> Option<Viewport> {
    let corners: Vec<LngLat> = items
        .iter()
        .filter_map(FootprintItem::bounds)
        .flat_map(|b| [LngLat::new(b.west, b.south), LngLat::new(b.east, b.north)])
        .collect();
    let bounds: BBox = BBox::around_points(&corners)?;
    Some(Viewport::new(bounds.center(), zoom, bounds))
}
