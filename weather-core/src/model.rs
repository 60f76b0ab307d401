use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Offset between the Kelvin and Celsius scales.
pub const KELVIN_OFFSET: f64 = 273.15;

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

/// A monitored city, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self { name: name.into(), lat, lon }
    }
}

/// Current conditions as reported by the provider, temperatures still in Kelvin.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditions {
    pub condition: String,
    pub description: String,
    pub temp_k: f64,
    pub feels_like_k: f64,
    pub humidity_pct: u8,
    pub wind_speed: f64,
    pub rain_1h_mm: f64,
    pub observed_at_epoch: i64,
}

/// One normalized reading for one city, as stored in `weather_updates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub city: String,
    pub main: String,
    pub description: String,
    pub temp: f64,
    pub feels_like: f64,
    pub humidity: u8,
    pub wind_speed: f64,
    pub rain: f64,
    pub dt: DateTime<Utc>,
}

impl Observation {
    /// Normalize provider conditions for `city`.
    ///
    /// An out-of-range epoch falls back to the current time rather than
    /// discarding the reading.
    pub fn from_conditions(city: &str, conditions: CurrentConditions) -> Self {
        let dt = DateTime::<Utc>::from_timestamp(conditions.observed_at_epoch, 0)
            .unwrap_or_else(Utc::now);

        Self {
            city: city.to_string(),
            main: conditions.condition,
            description: conditions.description,
            temp: kelvin_to_celsius(conditions.temp_k),
            feels_like: kelvin_to_celsius(conditions.feels_like_k),
            humidity: conditions.humidity_pct,
            wind_speed: conditions.wind_speed,
            rain: conditions.rain_1h_mm,
            dt,
        }
    }
}

/// Aggregate of one city's trailing 24 hours, as stored in `daily_weather_summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub city: String,
    pub avg_temp: f64,
    pub max_temp: f64,
    pub min_temp: f64,
    pub dominant_condition: String,
    pub summary_date: NaiveDate,
}
