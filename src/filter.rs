//! Query-time predicates over the canonical table.
//!
//! All predicates are conjunctive. Ranges are inclusive and never wrap: a
//! start after its end simply matches nothing.

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::normalize::{TripRecord, TripTable, Weather};

/// Weekday/weekend selector, also used to label weekday/weekend series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayType {
    All,
    Weekday,
    Weekend,
}

impl DayType {
    /// Label for a single record (never `All`).
    pub fn of(is_weekend: bool) -> Self {
        if is_weekend {
            DayType::Weekend
        } else {
            DayType::Weekday
        }
    }

    fn matches(&self, is_weekend: bool) -> bool {
        match self {
            DayType::All => true,
            DayType::Weekday => !is_weekend,
            DayType::Weekend => is_weekend,
        }
    }
}

/// Weather selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WeatherFilter {
    All,
    Clear,
    Rain,
    Snow,
}

impl WeatherFilter {
    fn matches(&self, weather: Weather) -> bool {
        match self {
            WeatherFilter::All => true,
            WeatherFilter::Clear => weather == Weather::Clear,
            WeatherFilter::Rain => weather == Weather::Rain,
            WeatherFilter::Snow => weather == Weather::Snow,
        }
    }
}

impl From<Weather> for WeatherFilter {
    fn from(weather: Weather) -> Self {
        match weather {
            Weather::Clear => WeatherFilter::Clear,
            Weather::Rain => WeatherFilter::Rain,
            Weather::Snow => WeatherFilter::Snow,
        }
    }
}

/// Dashboard filter parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TripFilter {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Truncated to the minute (seconds ignored) and compared against the
    /// pickup's minute of day, so 08:00:30..=08:00:10 still matches 08:00.
    pub start_time: NaiveTime,
    /// Truncated to the minute, like `start_time`.
    pub end_time: NaiveTime,
    pub day_type: DayType,
    pub weather: WeatherFilter,
}

fn minutes(t: &NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

impl TripFilter {
    /// Whole days between `start_date` and `end_date`, any day type or weather.
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            start_time: NaiveTime::MIN,
            end_time: NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN),
            day_type: DayType::All,
            weather: WeatherFilter::All,
        }
    }

    /// Restrict to an inclusive time-of-day window.
    pub fn with_time_range(mut self, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    pub fn with_day_type(mut self, day_type: DayType) -> Self {
        self.day_type = day_type;
        self
    }

    pub fn with_weather(mut self, weather: WeatherFilter) -> Self {
        self.weather = weather;
        self
    }

    /// True if `record` satisfies every predicate.
    pub fn matches(&self, record: &TripRecord) -> bool {
        let minute = record.pickup_minutes();
        record.pickup_date >= self.start_date
            && record.pickup_date <= self.end_date
            && minute >= minutes(&self.start_time)
            && minute <= minutes(&self.end_time)
            && self.day_type.matches(record.is_weekend)
            && self.weather.matches(record.weather)
    }
}

/// Working subset of `table` matching `filter`, in table order.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use trip_flow::{filter_trips, TripFilter, TripTable};
///
/// let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let subset = filter_trips(&TripTable::default(), &TripFilter::new(day, day));
/// assert!(subset.is_empty());
/// ```
pub fn filter_trips(table: &TripTable, filter: &TripFilter) -> TripTable {
    TripTable::new(
        table
            .iter()
            .filter(|r| filter.matches(r))
            .copied()
            .collect(),
    )
}
