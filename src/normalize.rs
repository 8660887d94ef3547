//! # Record Normalization
//!
//! Turns raw tabular trip data into the canonical, read-only [`TripTable`].
//!
//! ## Pipeline
//! 1. Resolve heterogeneous headers to canonical fields ([`resolve_columns`])
//! 2. Parse timestamps, coordinates and metrics per row
//! 3. Derive date, hour, weekday and weekend flag from the pickup time
//! 4. Attach a per-date weather label ([`assign_weather`])
//! 5. Drop rows violating any cleaning bound (never clamp)
//! 6. Subsample to a fixed row cap with a seeded RNG
//!
//! ## Synthetic weather
//! The weather label is NOT measured data. Each distinct pickup date draws one
//! label from a categorical distribution (clear 0.7, rain 0.2, snow 0.1 by
//! default) and every trip on that date shares it. Dates are drawn in ascending
//! order from a seeded RNG, so the same input and seed always yield the same
//! labels.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use log::{debug, info, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::GpsPoint;

// ============================================================================
// Raw Input
// ============================================================================

/// Header row plus string cells, as read from a CSV export.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Build a raw table from headers and rows. Short rows read as empty cells.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Read a headed CSV document.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    /// Open and read a headed CSV file.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let table = Self::from_reader(std::io::BufReader::new(file))?;
        debug!(
            "Read {} rows x {} columns from {}",
            table.rows.len(),
            table.headers.len(),
            path.as_ref().display()
        );
        Ok(table)
    }

    /// Header row as read.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if there are no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// Canonical Types
// ============================================================================

/// Synthetic per-date weather label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    Clear,
    Rain,
    Snow,
}

impl Weather {
    /// Categories in the order used by [`WeatherWeights`].
    pub const ALL: [Weather; 3] = [Weather::Clear, Weather::Rain, Weather::Snow];

    /// Lowercase label, as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Weather::Clear => "clear",
            Weather::Rain => "rain",
            Weather::Snow => "snow",
        }
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cleaned trip.
///
/// Optional fields are `None` for every record exactly when the source column
/// was missing from the input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TripRecord {
    pub pickup_time: NaiveDateTime,
    pub dropoff_time: Option<NaiveDateTime>,
    pub pickup: Option<GpsPoint>,
    pub dropoff: Option<GpsPoint>,
    pub trip_miles: Option<f64>,
    pub driver_pay: Option<f64>,
    pub pickup_date: NaiveDate,
    /// 0-23
    pub pickup_hour: u8,
    /// Monday = 0 .. Sunday = 6
    pub day_of_week: u8,
    pub is_weekend: bool,
    pub weather: Weather,
    pub trip_duration_minutes: Option<f64>,
}

impl TripRecord {
    /// Time of day of the pickup as minutes since midnight (seconds ignored).
    pub fn pickup_minutes(&self) -> u32 {
        self.pickup_time.hour() * 60 + self.pickup_time.minute()
    }
}

/// The canonical trip table. Built once per load, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct TripTable {
    records: Vec<TripRecord>,
}

impl TripTable {
    /// Wrap already cleaned records.
    pub fn new(records: Vec<TripRecord>) -> Self {
        Self { records }
    }

    /// Records in load order.
    pub fn records(&self) -> &[TripRecord] {
        &self.records
    }

    /// Number of trips.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no trips survived normalization.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in load order.
    pub fn iter(&self) -> std::slice::Iter<'_, TripRecord> {
        self.records.iter()
    }

    /// Earliest and latest pickup date, or `None` for an empty table.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.records.iter().map(|r| r.pickup_date).min()?;
        let max = self.records.iter().map(|r| r.pickup_date).max()?;
        Some((min, max))
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Outlier bounds. A record outside any bound is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningBounds {
    /// Inclusive latitude range for pickup and dropoff. Default: 40.5..=41.0
    pub min_lat: f64,
    pub max_lat: f64,
    /// Inclusive longitude range for pickup and dropoff. Default: -74.3..=-73.7
    pub min_lng: f64,
    pub max_lng: f64,
    /// Exclusive upper bound on trip miles. Default: 100
    pub max_trip_miles: f64,
    /// Exclusive upper bound on trip duration. Default: 300 minutes
    pub max_duration_minutes: f64,
}

impl Default for CleaningBounds {
    fn default() -> Self {
        Self {
            min_lat: 40.5,
            max_lat: 41.0,
            min_lng: -74.3,
            max_lng: -73.7,
            max_trip_miles: 100.0,
            max_duration_minutes: 300.0,
        }
    }
}

impl CleaningBounds {
    fn contains_lat(&self, lat: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat
    }

    fn contains_lng(&self, lng: f64) -> bool {
        lng >= self.min_lng && lng <= self.max_lng
    }
}

/// Relative weights of the synthetic weather categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherWeights {
    pub clear: f64,
    pub rain: f64,
    pub snow: f64,
}

impl Default for WeatherWeights {
    fn default() -> Self {
        Self { clear: 0.7, rain: 0.2, snow: 0.1 }
    }
}

/// Configuration for [`normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub bounds: CleaningBounds,
    pub weather_weights: WeatherWeights,
    /// Seed for weather draws. `None` draws from OS entropy (non-reproducible).
    /// Default: Some(42)
    pub weather_seed: Option<u64>,
    /// Row cap after cleaning. Default: 100,000
    pub max_rows: usize,
    /// Seed for the subsample. Default: 42
    pub sample_seed: u64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            bounds: CleaningBounds::default(),
            weather_weights: WeatherWeights::default(),
            weather_seed: Some(42),
            max_rows: 100_000,
            sample_seed: 42,
        }
    }
}

// ============================================================================
// Column Resolution
// ============================================================================

/// Input column index for each canonical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub pickup_time: usize,
    pub dropoff_time: Option<usize>,
    pub pickup_lat: Option<usize>,
    pub pickup_lon: Option<usize>,
    pub dropoff_lat: Option<usize>,
    pub dropoff_lon: Option<usize>,
    pub trip_miles: Option<usize>,
    pub driver_pay: Option<usize>,
}

fn find_exact(lower: &[String], names: &[&str]) -> Option<usize> {
    names
        .iter()
        .find_map(|name| lower.iter().position(|h| h == name))
}

fn find_containing(lower: &[String], all_of: &[&str], none_of: &[&str]) -> Option<usize> {
    lower.iter().position(|h| {
        all_of.iter().all(|t| h.contains(t)) && !none_of.iter().any(|t| h.contains(t))
    })
}

fn find_coordinate(lower: &[String], exact: &[&str], prefixes: &[&str], axis: &[&str]) -> Option<usize> {
    find_exact(lower, exact).or_else(|| {
        lower.iter().position(|h| {
            axis.iter().any(|a| h.contains(a)) && prefixes.iter().any(|p| h.contains(p))
        })
    })
}

/// Resolve input headers (case-insensitive) to canonical fields.
///
/// Only the pickup time is required; everything else is optional.
///
/// # Errors
///
/// [`EngineError::SchemaResolution`] naming `pickup_time` if no header looks
/// like a pickup timestamp.
///
/// # Example
/// ```
/// use trip_flow::resolve_columns;
///
/// let headers: Vec<String> = ["tpep_pickup_datetime", "start_lat", "start_lon"]
///     .iter().map(|s| s.to_string()).collect();
/// let mapping = resolve_columns(&headers).unwrap();
/// assert_eq!(mapping.pickup_time, 0);
/// assert_eq!(mapping.pickup_lat, Some(1));
/// assert_eq!(mapping.dropoff_time, None);
/// ```
pub fn resolve_columns(headers: &[String]) -> Result<ColumnMapping> {
    let lower: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();

    let pickup_time = find_exact(&lower, &["pickup_datetime"])
        .or_else(|| find_containing(&lower, &["pickup", "time"], &[]))
        .or_else(|| find_containing(&lower, &["time"], &["drop"]))
        .ok_or_else(|| EngineError::SchemaResolution {
            field: "pickup_time",
            available: headers.join(", "),
        })?;

    let dropoff_time = find_exact(&lower, &["dropoff_datetime"])
        .or_else(|| find_containing(&lower, &["drop", "time"], &[]));

    let pickup_prefixes = ["pickup", "start"];
    let dropoff_prefixes = ["drop", "end"];
    let lat_axis = ["lat"];
    let lon_axis = ["lon", "lng"];

    let mapping = ColumnMapping {
        pickup_time,
        dropoff_time,
        pickup_lat: find_coordinate(
            &lower,
            &["pickup_latitude", "pickup_lat", "start_lat"],
            &pickup_prefixes,
            &lat_axis,
        ),
        pickup_lon: find_coordinate(
            &lower,
            &["pickup_longitude", "pickup_lon", "pickup_lng", "start_lon", "start_lng"],
            &pickup_prefixes,
            &lon_axis,
        ),
        dropoff_lat: find_coordinate(
            &lower,
            &["dropoff_latitude", "dropoff_lat", "end_lat"],
            &dropoff_prefixes,
            &lat_axis,
        ),
        dropoff_lon: find_coordinate(
            &lower,
            &["dropoff_longitude", "dropoff_lon", "dropoff_lng", "end_lon", "end_lng"],
            &dropoff_prefixes,
            &lon_axis,
        ),
        trip_miles: find_exact(&lower, &["trip_miles"]),
        driver_pay: find_exact(&lower, &["driver_pay"]),
    };

    if mapping.pickup_lat.is_some() != mapping.pickup_lon.is_some() {
        warn!("Only one pickup coordinate column resolved; pickup points ignored, column still cleaned");
    }
    if mapping.dropoff_lat.is_some() != mapping.dropoff_lon.is_some() {
        warn!("Only one dropoff coordinate column resolved; dropoff points ignored, column still cleaned");
    }

    Ok(mapping)
}

// ============================================================================
// Cell Parsing
// ============================================================================

const TIMESTAMP_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse a timestamp cell. RFC 3339 offsets are dropped (wall-clock kept);
/// a bare date reads as midnight.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(t) = TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(t);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// A parsed optional cell: column missing, cell unusable, or a value.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Field<T> {
    Absent,
    Invalid,
    Value(T),
}

impl<T: Copy> Field<T> {
    fn read(row: &[String], column: Option<usize>, parse: impl Fn(&str) -> Option<T>) -> Self {
        match column {
            None => Field::Absent,
            Some(idx) => row
                .get(idx)
                .and_then(|cell| parse(cell.as_str()))
                .map_or(Field::Invalid, Field::Value),
        }
    }

    /// Absent columns pass; invalid cells never do.
    fn passes(&self, check: impl Fn(T) -> bool) -> bool {
        match self {
            Field::Absent => true,
            Field::Invalid => false,
            Field::Value(v) => check(*v),
        }
    }

    fn value(self) -> Option<T> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// A point only exists when both halves of the pair were read.
fn assemble_point(lat: Field<f64>, lon: Field<f64>) -> Option<GpsPoint> {
    Some(GpsPoint::new(lat.value()?, lon.value()?))
}

/// A row with a valid pickup time, before weather and cleaning.
struct ParsedRow {
    pickup_time: NaiveDateTime,
    dropoff_time: Field<NaiveDateTime>,
    pickup_lat: Field<f64>,
    pickup_lon: Field<f64>,
    dropoff_lat: Field<f64>,
    dropoff_lon: Field<f64>,
    trip_miles: Field<f64>,
    driver_pay: Field<f64>,
    duration: Field<f64>,
}

impl ParsedRow {
    fn parse(row: &[String], mapping: &ColumnMapping) -> Option<Self> {
        let pickup_time = row.get(mapping.pickup_time).and_then(|c| parse_timestamp(c))?;
        let dropoff_time = Field::read(row, mapping.dropoff_time, parse_timestamp);
        let duration = match dropoff_time {
            Field::Absent => Field::Absent,
            Field::Invalid => Field::Invalid,
            Field::Value(drop) => {
                let ms = (drop - pickup_time).num_milliseconds();
                Field::Value(ms as f64 / 60_000.0)
            }
        };

        Some(Self {
            pickup_time,
            dropoff_time,
            pickup_lat: Field::read(row, mapping.pickup_lat, parse_number),
            pickup_lon: Field::read(row, mapping.pickup_lon, parse_number),
            dropoff_lat: Field::read(row, mapping.dropoff_lat, parse_number),
            dropoff_lon: Field::read(row, mapping.dropoff_lon, parse_number),
            trip_miles: Field::read(row, mapping.trip_miles, parse_number),
            driver_pay: Field::read(row, mapping.driver_pay, parse_number),
            duration,
        })
    }

    /// Every resolved column is checked on its own, even when its pair is
    /// incomplete.
    fn within(&self, bounds: &CleaningBounds) -> bool {
        self.trip_miles.passes(|m| m >= 0.0 && m < bounds.max_trip_miles)
            && self.duration.passes(|d| d >= 0.0 && d < bounds.max_duration_minutes)
            && self.driver_pay.passes(|p| p >= 0.0)
            && self.pickup_lat.passes(|v| bounds.contains_lat(v))
            && self.pickup_lon.passes(|v| bounds.contains_lng(v))
            && self.dropoff_lat.passes(|v| bounds.contains_lat(v))
            && self.dropoff_lon.passes(|v| bounds.contains_lng(v))
    }

    fn into_record(self, weather: Weather) -> TripRecord {
        let t = self.pickup_time;
        let day_of_week = t.weekday().num_days_from_monday() as u8;
        TripRecord {
            pickup_time: t,
            dropoff_time: self.dropoff_time.value(),
            pickup: assemble_point(self.pickup_lat, self.pickup_lon),
            dropoff: assemble_point(self.dropoff_lat, self.dropoff_lon),
            trip_miles: self.trip_miles.value(),
            driver_pay: self.driver_pay.value(),
            pickup_date: t.date(),
            pickup_hour: t.hour() as u8,
            day_of_week,
            is_weekend: day_of_week >= 5,
            weather,
            trip_duration_minutes: self.duration.value(),
        }
    }
}

// ============================================================================
// Weather / Normalization
// ============================================================================

/// Draw one synthetic weather label per distinct date.
///
/// Dates are visited in ascending order, so the result depends only on the set
/// of dates and the seed.
///
/// # Errors
///
/// [`EngineError::WeatherDistribution`] if the weights are negative, non-finite
/// or all zero.
pub fn assign_weather<I>(dates: I, config: &NormalizeConfig) -> Result<BTreeMap<NaiveDate, Weather>>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let w = &config.weather_weights;
    let dist = WeightedIndex::new([w.clear, w.rain, w.snow]).map_err(|e| {
        EngineError::WeatherDistribution { message: e.to_string() }
    })?;

    let mut rng = match config.weather_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let unique: BTreeSet<NaiveDate> = dates.into_iter().collect();
    Ok(unique
        .into_iter()
        .map(|date| (date, Weather::ALL[dist.sample(&mut rng)]))
        .collect())
}

/// Build the canonical table from raw rows.
///
/// Rows whose pickup time cannot be parsed are dropped, as are rows failing
/// any [`CleaningBounds`] check. If more than `max_rows` survive, a uniform
/// seeded subsample of exactly `max_rows` is kept in original row order.
///
/// # Errors
///
/// [`EngineError::SchemaResolution`] if no pickup-time column exists, or
/// [`EngineError::WeatherDistribution`] for unusable weather weights.
pub fn normalize(raw: &RawTable, config: &NormalizeConfig) -> Result<TripTable> {
    let mapping = resolve_columns(raw.headers())?;
    debug!("Resolved columns: {:?}", mapping);

    let parsed: Vec<ParsedRow> = raw
        .rows
        .iter()
        .filter_map(|row| ParsedRow::parse(row, &mapping))
        .collect();
    let unparsed = raw.len() - parsed.len();
    if unparsed > 0 {
        warn!("Dropped {} rows with unparseable pickup time", unparsed);
    }

    let weather = assign_weather(parsed.iter().map(|r| r.pickup_time.date()), config)?;

    let before_clean = parsed.len();
    let mut records: Vec<TripRecord> = parsed
        .into_iter()
        .filter(|r| r.within(&config.bounds))
        .map(|r| {
            let label = weather
                .get(&r.pickup_time.date())
                .copied()
                .unwrap_or(Weather::Clear);
            r.into_record(label)
        })
        .collect();
    let outliers = before_clean - records.len();

    if records.len() > config.max_rows {
        let mut rng = StdRng::seed_from_u64(config.sample_seed);
        let mut keep = rand::seq::index::sample(&mut rng, records.len(), config.max_rows).into_vec();
        keep.sort_unstable();
        info!("Subsampling {} cleaned rows to {}", records.len(), config.max_rows);
        records = keep.into_iter().map(|i| records[i]).collect();
    }

    info!(
        "Normalized {} of {} rows ({} unparseable, {} outliers, {} dates)",
        records.len(),
        raw.len(),
        unparsed,
        outliers,
        weather.len()
    );

    Ok(TripTable::new(records))
}

// ============================================================================
// Tests
// ============================================================================
