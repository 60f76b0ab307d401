use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use crate::{model::Location, provider::openweather::DEFAULT_BASE_URL, scheduler};

/// Environment variable that overrides the stored API key.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

/// Credentials and endpoint for the weather provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Per-request timeout; unset means the HTTP client default.
    pub timeout_secs: Option<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("weather.db") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Temperatures strictly above this raise an alert.
    pub threshold_c: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { threshold_c: 35.0 }
    }
}

/// Cron expressions, evaluated in the local timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub ingest: String,
    pub aggregate: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            ingest: "*/5 * * * *".to_string(),
            aggregate: "0 0 * * *".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Fetches in flight at once. 1 keeps the batch strictly sequential.
    pub concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    pub static_dir: PathBuf,
    pub summary_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".to_string(),
            static_dir: PathBuf::from("public"),
            summary_limit: 10,
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [provider]
/// api_key = "..."
///
/// [[locations]]
/// name = "Delhi"
/// lat = 28.6139
/// lon = 77.209
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub database: DatabaseConfig,
    pub alert: AlertConfig,
    pub schedule: ScheduleConfig,
    pub ingest: IngestConfig,
    pub server: ServerConfig,
    pub locations: Vec<Location>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            database: DatabaseConfig::default(),
            alert: AlertConfig::default(),
            schedule: ScheduleConfig::default(),
            ingest: IngestConfig::default(),
            server: ServerConfig::default(),
            locations: default_locations(),
        }
    }
}

pub fn default_locations() -> Vec<Location> {
    vec![
        Location::new("Delhi", 28.6139, 77.209),
        Location::new("Mumbai", 19.076, 72.8777),
        Location::new("Chennai", 13.0827, 80.2707),
        Location::new("Bangalore", 12.9716, 77.5946),
        Location::new("Kolkata", 22.5726, 88.3639),
        Location::new("Hyderabad", 17.385, 78.4867),
    ]
}

impl Config {
    /// Load config from the default path, or defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Load config from `path`, or defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-monitor", "weather-monitor")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Prefer the environment override, then the stored key.
    pub fn api_key(&self) -> Option<String> {
        resolve_api_key(std::env::var(API_KEY_ENV).ok(), self.provider.api_key.as_deref())
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.provider.api_key = Some(api_key);
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.locations.is_empty() {
            bail!("No locations configured. Add at least one [[locations]] entry.");
        }

        let mut seen = HashSet::new();
        for location in &self.locations {
            if !seen.insert(location.name.as_str()) {
                bail!("Duplicate location name '{}'", location.name);
            }
        }

        if self.ingest.concurrency == 0 {
            bail!("ingest.concurrency must be at least 1");
        }
        if self.server.summary_limit == 0 {
            bail!("server.summary_limit must be at least 1");
        }

        scheduler::parse_schedule(&self.schedule.ingest)
            .context("Invalid schedule.ingest")?;
        scheduler::parse_schedule(&self.schedule.aggregate)
            .context("Invalid schedule.aggregate")?;

        Ok(())
    }
}

fn resolve_api_key(from_env: Option<String>, stored: Option<&str>) -> Option<String> {
    from_env
        .filter(|key| !key.trim().is_empty())
        .or_else(|| stored.filter(|key| !key.trim().is_empty()).map(str::to_owned))
}
