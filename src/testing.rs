//! Record builders shared by unit tests.

use chrono::{Datelike, Timelike};

use crate::normalize::{parse_timestamp, TripRecord, Weather};
use crate::GpsPoint;

/// A clear-weather trip with a 15 minute duration and no metrics.
pub(crate) fn trip(pickup_time: &str, pickup: GpsPoint, dropoff: GpsPoint) -> TripRecord {
    let t = parse_timestamp(pickup_time).expect("test timestamp");
    let day_of_week = t.weekday().num_days_from_monday() as u8;
    TripRecord {
        pickup_time: t,
        dropoff_time: Some(t + chrono::Duration::minutes(15)),
        pickup: Some(pickup),
        dropoff: Some(dropoff),
        trip_miles: None,
        driver_pay: None,
        pickup_date: t.date(),
        pickup_hour: t.hour() as u8,
        day_of_week,
        is_weekend: day_of_week >= 5,
        weather: Weather::Clear,
        trip_duration_minutes: Some(15.0),
    }
}
