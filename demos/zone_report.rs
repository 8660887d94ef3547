//! Print zone traffic, significant flows and the pickup hotspot for a CSV export.
//!
//! ```text
//! cargo run --release --features parallel --example zone_report -- trips.csv
//! ```

use std::env;

use log::warn;
use trip_flow::{
    zone_flow, zone_traffic, EngineConfig, HeatmapConfig, TripEngine, TripFilter, ZoneFlowRow,
    ZoneRegistry, generate_pickup_heatmap, query_heatmap_cell,
};

fn main() -> trip_flow::Result<()> {
    pretty_env_logger::init();

    let Some(path) = env::args().nth(1) else {
        warn!("usage: zone_report <trips.csv>");
        return Ok(());
    };

    let engine = TripEngine::load_csv(&path, ZoneRegistry::default(), EngineConfig::default())?;
    let Some((first, last)) = engine.date_range() else {
        warn!("No trips survived normalization");
        return Ok(());
    };

    let subset = engine.filter(&TripFilter::new(first, last));
    let zones = engine.zones();

    println!("Pickups per zone ({} to {})", first, last);
    for row in zone_traffic(subset.records(), zones) {
        let name = zones.get(row.zone_id).map_or("?", |z| z.name.as_str());
        println!("  {:>2} {:<14} {:>8}", row.zone_id, name, row.count);
    }

    println!("Significant flows");
    for row in zone_flow(subset.records(), zones) {
        if let ZoneFlowRow::Flow { zone_name, count, .. } = row {
            println!("  {:<32} {:>8}", zone_name, count);
        }
    }

    let grid = generate_pickup_heatmap(subset.records(), &HeatmapConfig::default());
    let center = grid.bounds.center();
    println!(
        "{} pickups in {} cells, extent centered at ({:.4}, {:.4})",
        grid.total_pickups,
        grid.cells.len(),
        center.latitude,
        center.longitude
    );

    if let Some(hottest) = grid.cells.iter().max_by_key(|c| c.pickup_count) {
        if let Some(hit) = query_heatmap_cell(&grid, hottest.center_lat, hottest.center_lng) {
            println!(
                "Hotspot at ({:.4}, {:.4}): {}",
                hit.cell.center_lat, hit.cell.center_lng, hit.suggested_label
            );
        }
    }

    Ok(())
}
