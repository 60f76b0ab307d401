use anyhow::{Context, Result, anyhow};
use std::{sync::Arc, time::Duration};

use crate::{
    aggregate, ingest,
    config::Config,
    provider::{OpenWeatherProvider, WeatherProvider},
    scheduler::{Job, Scheduler, SchedulerError},
    storage::Storage,
};

/// Everything a task or request handler needs, built once at startup.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub storage: Storage,
    pub provider: Arc<dyn WeatherProvider>,
}

impl AppContext {
    pub fn new(config: Config, storage: Storage, provider: Arc<dyn WeatherProvider>) -> Self {
        Self { config: Arc::new(config), storage, provider }
    }

    /// Validate `config`, open the database and build the OpenWeather client.
    pub fn from_config(config: Config) -> Result<Self> {
        let api_key = config.api_key();
        Self::with_api_key(config, api_key)
    }

    fn with_api_key(config: Config, api_key: Option<String>) -> Result<Self> {
        config.validate()?;

        let api_key = api_key.ok_or_else(|| {
            anyhow!(
                "No OpenWeather API key configured.\n\
                 Hint: run `weather-monitor configure` or set {}.",
                crate::config::API_KEY_ENV
            )
        })?;

        let mut provider = OpenWeatherProvider::with_base_url(api_key, &config.provider.base_url);
        if let Some(secs) = config.provider.timeout_secs {
            provider = provider
                .with_timeout(Duration::from_secs(secs))
                .context("Failed to build HTTP client")?;
        }

        let storage = Storage::open(&config.database.path).with_context(|| {
            format!("Failed to open database: {}", config.database.path.display())
        })?;

        Ok(Self::new(config, storage, Arc::new(provider)))
    }

    /// The ingestion and aggregation jobs on their configured schedules.
    pub fn scheduler(&self) -> Result<Scheduler, SchedulerError> {
        let ingest_ctx = self.clone();
        let ingest_job = Job::new("ingest", &self.config.schedule.ingest, move || {
            let ctx = ingest_ctx.clone();
            async move {
                log::info!("Fetching weather data...");
                ingest::run_ingestion(&ctx).await;
                anyhow::Ok(())
            }
        })?;

        let storage = self.storage.clone();
        let aggregate_job = Job::new("aggregate", &self.config.schedule.aggregate, move || {
            let storage = storage.clone();
            async move {
                log::info!("Calculating daily weather summary...");
                aggregate::run_aggregation(&storage).await?;
                anyhow::Ok(())
            }
        })?;

        let mut scheduler = Scheduler::new();
        scheduler.add(ingest_job).add(aggregate_job);
        Ok(scheduler)
    }
}
