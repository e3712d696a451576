//! コンソール出力

use crate::session::SessionReport;
use oam_browser_common::{FootprintItem, GridAggregation, LayerMode, OverlayNotice};
use std::collections::BTreeSet;

/// 取得結果の一覧
pub fn print_items(items: &[FootprintItem]) {
    let large = items.iter().filter(|i| i.is_large()).count();
    println!("✔ {}件のフットプリント（大: {} / 小: {}）", items.len(), large, items.len() - large);

    for item in items {
        let meta = item.meta();
        println!(
            "  {} {} [{}] {} {}",
            if item.is_large() { "■" } else { "□" },
            item.id(),
            meta.platform,
            meta.date,
            meta.title
        );
    }
}

pub fn print_grid(grid: &GridAggregation) {
    if grid.is_empty() {
        println!("グリッド: セルなし");
        return;
    }

    println!(
        "グリッド: z{} / {}セル / 合計{}件（走査{}タイル）",
        grid.grid_zoom,
        grid.cells.len(),
        grid.total_count(),
        grid.tiles_examined
    );
    for cell in &grid.cells {
        let coord = cell.coord();
        println!("  {}/{}/{}: {}", coord.z, coord.x, coord.y, cell.count);
    }
}

pub fn print_overlays(mode: LayerMode, zoom: f64, overlays: &BTreeSet<String>, notice: Option<OverlayNotice>) {
    println!("表示モード: {} / ズーム {:.1}", mode, zoom);
    if let Some(notice) = notice {
        println!("⚠ {}", notice);
    }
    if overlays.is_empty() {
        println!("プレビュー: なし");
    } else {
        println!("プレビュー: {}件", overlays.len());
        for id in overlays {
            println!("  {}", id);
        }
    }
}

pub fn print_session(report: &SessionReport) {
    println!("表示: {:.4}, {:.4} z{:.1}", report.center.lat, report.center.lon, report.zoom);
    println!("クエリ: ?{}", report.query_string);
    println!("アイテム: {}件", report.item_count);
    println!(
        "グリッド: z{} / {}セル / 合計{}件",
        report.grid_zoom, report.grid_cells, report.grid_total
    );
    println!("選択: {}", report.selected_id.as_deref().unwrap_or("なし"));
    println!("表示モード: {}", report.mode);
    if let Some(notice) = &report.notice {
        println!("⚠ {}", notice);
    }
    if !report.overlays.is_empty() {
        println!("プレビュー: {}", report.overlays.join(", "));
    }

    let s = &report.stats;
    println!(
        "取得: {}回（適用 {} / 破棄 {} / エラー {}）",
        s.fetches_issued, s.responses_applied, s.responses_dropped, s.fetch_errors
    );
    println!(
        "タイマー: 予約 {} / 取消 {} / 再集約 {}、移動配送 {}",
        s.timers_scheduled, s.timers_cancelled, s.grid_passes, s.moves_delivered
    );
}
