use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::{collections::HashMap, time::Duration};

use crate::{
    error::{FetchError, FetchErrorKind},
    model::{CurrentConditions, Location},
};

use super::WeatherProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    /// Apply a request timeout; without one, reqwest's default applies.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, reqwest::Error> {
        self.http = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    async fn fetch_current(&self, location: &Location) -> Result<CurrentConditions, FetchErrorKind> {
        let url = format!("{}/data/2.5/weather", self.base_url);
        let lat = location.lat.to_string();
        let lon = location.lon.to_string();

        let res = self
            .http
            .get(&url)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("appid", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(FetchErrorKind::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        parse_current(&body)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    main: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
    #[serde(default)]
    rain: Option<HashMap<String, f64>>,
}

/// Parse a `/data/2.5/weather` body. Temperatures stay in Kelvin.
pub(crate) fn parse_current(body: &str) -> Result<CurrentConditions, FetchErrorKind> {
    let parsed: OwCurrentResponse = serde_json::from_str(body)?;

    let weather = parsed
        .weather
        .into_iter()
        .next()
        .ok_or(FetchErrorKind::MissingField("weather[0]"))?;

    let rain_1h_mm = parsed
        .rain
        .and_then(|rain| rain.get("1h").copied())
        .unwrap_or(0.0);

    Ok(CurrentConditions {
        condition: weather.main,
        description: weather.description,
        temp_k: parsed.main.temp,
        feels_like_k: parsed.main.feels_like,
        humidity_pct: parsed.main.humidity,
        wind_speed: parsed.wind.speed,
        rain_1h_mm,
        observed_at_epoch: parsed.dt,
    })
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn current_conditions(
        &self,
        location: &Location,
    ) -> Result<CurrentConditions, FetchError> {
        self.fetch_current(location)
            .await
            .map_err(|kind| FetchError::new(location.name.clone(), kind))
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
