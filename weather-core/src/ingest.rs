//! One ingestion pass: fetch, normalize, persist and alert, per location.
//!
//! Locations are handled in declaration order. A failure for one location
//! is logged and never stops the rest of the batch.

use futures::{StreamExt, stream};
use std::fmt;

use crate::{
    app::AppContext,
    model::{Location, Observation},
};

/// Outcome of one ingestion pass, by city name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub stored: Vec<String>,
    pub failed: Vec<String>,
    pub alerts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureAlert {
    pub city: String,
    pub temp_c: f64,
    pub threshold_c: f64,
}

impl fmt::Display for TemperatureAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ALERT: Temperature in {} has exceeded {}°C",
            self.city, self.threshold_c
        )
    }
}

/// An alert when `temp_c` is strictly above `threshold_c`.
pub fn check_alert(city: &str, temp_c: f64, threshold_c: f64) -> Option<TemperatureAlert> {
    (temp_c > threshold_c).then(|| TemperatureAlert {
        city: city.to_string(),
        temp_c,
        threshold_c,
    })
}

enum Outcome {
    Stored(Option<TemperatureAlert>),
    Failed,
}

async fn ingest_location(ctx: AppContext, location: Location) -> (Location, Outcome) {
    let outcome = fetch_and_store(&ctx, &location).await;
    (location, outcome)
}

async fn fetch_and_store(ctx: &AppContext, location: &Location) -> Outcome {
    let conditions = match ctx.provider.current_conditions(location).await {
        Ok(conditions) => conditions,
        Err(e) => {
            log::error!("Error fetching data for {}: {}", location.name, e.kind);
            return Outcome::Failed;
        }
    };

    let observation = Observation::from_conditions(&location.name, conditions);

    if let Err(e) = ctx.storage.insert_observation(&observation).await {
        log::error!("Error saving observation for {}: {}", location.name, e);
        return Outcome::Failed;
    }
    log::debug!(
        "stored {} at {}: {:.2}°C {}",
        observation.city,
        observation.dt,
        observation.temp,
        observation.main
    );

    let alert = check_alert(&location.name, observation.temp, ctx.config.alert.threshold_c);
    if let Some(alert) = &alert {
        log::warn!("{}", alert);
    }

    Outcome::Stored(alert)
}

/// Run one ingestion pass over every configured location.
pub async fn run_ingestion(ctx: &AppContext) -> IngestReport {
    let width = ctx.config.ingest.concurrency.max(1);

    let outcomes: Vec<_> = stream::iter(ctx.config.locations.clone())
        .map(|location| ingest_location(ctx.clone(), location))
        .buffered(width)
        .collect()
        .await;

    let mut report = IngestReport::default();
    for (location, outcome) in outcomes {
        match outcome {
            Outcome::Stored(alert) => {
                if alert.is_some() {
                    report.alerts.push(location.name.clone());
                }
                report.stored.push(location.name);
            }
            Outcome::Failed => report.failed.push(location.name),
        }
    }

    log::info!(
        "ingestion finished: {} stored, {} failed, {} alerts",
        report.stored.len(),
        report.failed.len(),
        report.alerts.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        error::{FetchError, FetchErrorKind},
        model::CurrentConditions,
        provider::WeatherProvider,
        storage::Storage,
    };
    use async_trait::async_trait;
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    /// Serves fixed Kelvin temperatures; cities without one fail.
    #[derive(Debug, Default)]
    struct FakeProvider {
        temps_k: HashMap<String, f64>,
        rain: HashMap<String, f64>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn with_temps(temps: &[(&str, f64)]) -> Self {
            Self {
                temps_k: temps.iter().map(|(c, t)| (c.to_string(), *t)).collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl WeatherProvider for FakeProvider {
        async fn current_conditions(
            &self,
            location: &Location,
        ) -> Result<CurrentConditions, FetchError> {
            self.calls.lock().unwrap().push(location.name.clone());

            let temp_k = self.temps_k.get(&location.name).copied().ok_or_else(|| {
                FetchError::new(
                    location.name.clone(),
                    FetchErrorKind::Status { status: 503, body: "unavailable".into() },
                )
            })?;

            Ok(CurrentConditions {
                condition: "Clear".into(),
                description: "clear sky".into(),
                temp_k,
                feels_like_k: temp_k + 1.0,
                humidity_pct: 40,
                wind_speed: 3.0,
                rain_1h_mm: self.rain.get(&location.name).copied().unwrap_or(0.0),
                observed_at_epoch: 1_729_324_800,
            })
        }
    }

    fn context(locations: &[&str], provider: FakeProvider, concurrency: usize) -> (AppContext, Arc<FakeProvider>) {
        let mut cfg = Config::default();
        cfg.locations = locations.iter().map(|n| Location::new(*n, 0.0, 0.0)).collect();
        cfg.ingest.concurrency = concurrency;

        let provider = Arc::new(provider);
        let ctx = AppContext::new(cfg, Storage::open_in_memory().unwrap(), provider.clone());
        (ctx, provider)
    }

    #[test]
    fn alert_only_above_threshold() {
        assert!(check_alert("Delhi", 35.0, 35.0).is_none());
        assert!(check_alert("Delhi", 34.9, 35.0).is_none());

        let alert = check_alert("Delhi", 35.01, 35.0).unwrap();
        assert_eq!(alert.to_string(), "ALERT: Temperature in Delhi has exceeded 35°C");
    }

    #[tokio::test]
    async fn failed_location_does_not_stop_the_batch() {
        let _ = env_logger::builder().is_test(true).try_init();
        let provider = FakeProvider::with_temps(&[("Delhi", 300.0), ("Chennai", 302.0)]);
        let (ctx, provider) = context(&["Delhi", "Mumbai", "Chennai"], provider, 1);

        let report = run_ingestion(&ctx).await;

        assert_eq!(report.stored, ["Delhi", "Chennai"]);
        assert_eq!(report.failed, ["Mumbai"]);
        assert_eq!(*provider.calls.lock().unwrap(), ["Delhi", "Mumbai", "Chennai"]);

        assert_eq!(ctx.storage.observations_for("Delhi").await.unwrap().len(), 1);
        assert!(ctx.storage.observations_for("Mumbai").await.unwrap().is_empty());
        assert_eq!(ctx.storage.observations_for("Chennai").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stored_observation_is_in_celsius() {
        let mut provider = FakeProvider::with_temps(&[("Delhi", 305.2)]);
        provider.rain.insert("Delhi".into(), 0.73);
        let (ctx, _) = context(&["Delhi"], provider, 1);

        run_ingestion(&ctx).await;

        let stored = ctx.storage.observations_for("Delhi").await.unwrap();
        assert_eq!(stored[0].temp, 305.2 - 273.15);
        assert_eq!(stored[0].feels_like, (305.2 + 1.0) - 273.15);
        assert_eq!(stored[0].rain, 0.73);
        assert_eq!(stored[0].dt.timestamp(), 1_729_324_800);
    }

    #[tokio::test]
    async fn hot_city_raises_alert() {
        let provider = FakeProvider::with_temps(&[("Delhi", 310.0), ("Bangalore", 295.0)]);
        let (ctx, _) = context(&["Delhi", "Bangalore"], provider, 1);

        let report = run_ingestion(&ctx).await;

        assert_eq!(report.alerts, ["Delhi"]);
        assert_eq!(report.stored.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_fan_out_keeps_order_and_isolation() {
        let provider = FakeProvider::with_temps(&[("A", 290.0), ("C", 291.0), ("D", 292.0)]);
        let (ctx, _) = context(&["A", "B", "C", "D"], provider, 3);

        let report = run_ingestion(&ctx).await;

        assert_eq!(report.stored, ["A", "C", "D"]);
        assert_eq!(report.failed, ["B"]);
    }
}
