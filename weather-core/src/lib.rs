//! Core library for the `weather-monitor` service.
//!
//! This crate defines:
//! - Configuration loading and validation
//! - The OpenWeather client behind the `WeatherProvider` trait
//! - The SQLite storage gateway
//! - Ingestion and aggregation tasks, and the cron scheduler that drives them
//! - The HTML summary page
//!
//! It is used by the `weather-monitor` binary, which only wires these together.

pub mod aggregate;
pub mod app;
pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod provider;
pub mod scheduler;
pub mod storage;
pub mod web;

pub use app::AppContext;
pub use config::Config;
pub use error::{FetchError, FetchErrorKind, StorageError};
pub use ingest::IngestReport;
pub use model::{CurrentConditions, DailySummary, Location, Observation};
pub use provider::{OpenWeatherProvider, WeatherProvider};
pub use storage::Storage;
