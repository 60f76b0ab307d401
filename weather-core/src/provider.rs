use crate::{
    error::FetchError,
    model::{CurrentConditions, Location},
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openweather;

pub use openweather::OpenWeatherProvider;

/// Source of current conditions for a monitored location.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn current_conditions(&self, location: &Location)
    -> Result<CurrentConditions, FetchError>;
}
