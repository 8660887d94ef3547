//! Run one dashboard query and print the result bundle as JSON.
//!
//! ```text
//! RUST_LOG=debug cargo run --example dashboard_query [trips.csv] [config.json]
//! ```
//!
//! Without a CSV path a seeded synthetic week of trips is generated.

use std::env;
use std::fs;

use chrono::{Duration, NaiveDate};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trip_flow::{EngineConfig, RawTable, TripEngine, TripFilter, ZoneRegistry};

const HEADERS: [&str; 8] = [
    "pickup_datetime",
    "dropoff_datetime",
    "pickup_latitude",
    "pickup_longitude",
    "dropoff_latitude",
    "dropoff_longitude",
    "trip_miles",
    "driver_pay",
];

/// A week of trips jittered around the borough centers.
fn synthetic_trips(zones: &ZoneRegistry, n: usize) -> RawTable {
    let mut rng = StdRng::seed_from_u64(7);
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid start date");
    let centers: Vec<_> = zones.zones().iter().map(|z| z.center).collect();

    let rows = (0..n)
        .map(|_| {
            let from = centers[rng.gen_range(0..centers.len())];
            let to = centers[rng.gen_range(0..centers.len())];
            let pickup = start + Duration::minutes(rng.gen_range(0..7 * 24 * 60));
            let minutes = rng.gen_range(5..90);
            let miles: f64 = rng.gen_range(0.5..25.0);

            vec![
                pickup.format("%Y-%m-%d %H:%M:%S").to_string(),
                (pickup + Duration::minutes(minutes)).format("%Y-%m-%d %H:%M:%S").to_string(),
                format!("{:.5}", from.latitude + rng.gen_range(-0.01..0.01)),
                format!("{:.5}", from.longitude + rng.gen_range(-0.01..0.01)),
                format!("{:.5}", to.latitude + rng.gen_range(-0.01..0.01)),
                format!("{:.5}", to.longitude + rng.gen_range(-0.01..0.01)),
                format!("{:.2}", miles),
                format!("{:.2}", 3.0 + miles * 1.8),
            ]
        })
        .collect();

    RawTable::new(HEADERS.iter().map(|h| h.to_string()).collect(), rows)
}

fn main() -> trip_flow::Result<()> {
    pretty_env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config = match args.get(2) {
        Some(path) => EngineConfig::from_json(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    let zones = ZoneRegistry::default();

    let engine = match args.get(1) {
        Some(path) => TripEngine::load_csv(path, zones, config)?,
        None => {
            let raw = synthetic_trips(&zones, 5_000);
            TripEngine::from_raw(&raw, zones, config)?
        }
    };

    let Some((first, last)) = engine.date_range() else {
        info!("No trips survived normalization");
        return Ok(());
    };
    info!("Dataset covers {} to {}", first, last);

    let result = engine.query(&TripFilter::new(first, last));
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
