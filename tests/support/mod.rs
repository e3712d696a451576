//! テスト用データ

#![allow(dead_code)]

use oam_browser_common::catalog::parse_meta_response;
use oam_browser_common::FootprintItem;
use serde_json::{json, Value};

/// 中心 (lon, lat)・一辺 size 度の正方形レコード（/meta 形式）
pub fn square_record(id: &str, lon: f64, lat: f64, size: f64, platform: &str) -> Value {
    let h = size / 2.0;
    json!({
        "_id": id,
        "title": format!("Image {}", id),
        "acquisition_end": "2024-05-01T00:00:00.000Z",
        "platform": platform,
        "gsd": 0.05,
        "file_size": 52428800.0,
        "license": "CC-BY 4.0",
        "geojson": {
            "type": "Polygon",
            "coordinates": [[
                [lon - h, lat - h],
                [lon + h, lat - h],
                [lon + h, lat + h],
                [lon - h, lat + h],
                [lon - h, lat - h]
            ]]
        },
        "properties": { "thumbnail": format!("https://tiles.example/{}.png", id) }
    })
}

pub fn meta_response(records: Vec<Value>) -> String {
    json!({ "results": records }).to_string()
}

pub fn items(records: Vec<Value>) -> Vec<FootprintItem> {
    parse_meta_response(&meta_response(records)).expect("fixture records")
}

/// 東京駅付近の小さな2件
pub fn tokyo_pair() -> Vec<FootprintItem> {
    items(vec![
        square_record("a", 139.7671, 35.6812, 0.01, "uav"),
        square_record("b", 139.7871, 35.7012, 0.01, "uav"),
    ])
}
