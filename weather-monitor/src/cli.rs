use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use inquire::Password;
use std::path::PathBuf;
use tokio::sync::watch;
use weather_core::{AppContext, Config, Storage, aggregate, ingest, web};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-monitor", version, about = "Scheduled weather ingestion and daily summaries")]
pub struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduled jobs and the summary page until interrupted.
    Serve,

    /// Fetch and store current conditions for every location once.
    Ingest,

    /// Compute daily summaries from the last 24 hours once.
    Aggregate,

    /// Print the most recent daily summaries.
    Summaries {
        /// Number of rows; defaults to the configured page limit.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print every stored observation for a city.
    Observations {
        city: String,
    },

    /// Store the OpenWeather API key in the config file.
    Configure,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => Config::config_file_path()?,
        };
        let config = Config::load_from(&config_path)?;

        match self.command {
            Command::Serve => serve(config).await,
            Command::Ingest => {
                let ctx = AppContext::from_config(config)?;
                let report = ingest::run_ingestion(&ctx).await;

                println!("Stored: {}", report.stored.join(", "));
                if !report.failed.is_empty() {
                    println!("Failed: {}", report.failed.join(", "));
                }
                if !report.alerts.is_empty() {
                    println!("Alerts: {}", report.alerts.join(", "));
                }
                if report.stored.is_empty() {
                    bail!("No location could be ingested");
                }
                Ok(())
            }
            Command::Aggregate => {
                let storage = open_storage(&config)?;
                let inserted = aggregate::run_aggregation(&storage).await?;
                println!("Inserted {inserted} daily summaries");
                Ok(())
            }
            Command::Summaries { limit } => {
                let storage = open_storage(&config)?;
                let limit = limit.unwrap_or(config.server.summary_limit);
                for s in storage.recent_summaries(limit).await? {
                    println!(
                        "{}  {:<12} avg {:>6.2}°C  max {:>6.2}°C  min {:>6.2}°C  {}",
                        s.summary_date, s.city, s.avg_temp, s.max_temp, s.min_temp, s.dominant_condition
                    );
                }
                Ok(())
            }
            Command::Observations { city } => {
                let storage = open_storage(&config)?;
                for o in storage.observations_for(&city).await? {
                    println!(
                        "{}  {:>6.2}°C (feels {:>6.2}°C)  {:>3}%  wind {:.1}  rain {:.2}  {} / {}",
                        o.dt, o.temp, o.feels_like, o.humidity, o.wind_speed, o.rain, o.main, o.description
                    );
                }
                Ok(())
            }
            Command::Configure => configure(config, &config_path),
        }
    }
}

fn open_storage(config: &Config) -> Result<Storage> {
    Storage::open(&config.database.path)
        .with_context(|| format!("Failed to open database: {}", config.database.path.display()))
}

async fn serve(config: Config) -> Result<()> {
    let ctx = AppContext::from_config(config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let jobs = ctx.scheduler()?.start(shutdown_rx.clone());

    tokio::spawn(forward_shutdown(tokio::signal::ctrl_c(), shutdown_tx));

    web::serve(ctx, shutdown_rx).await?;

    for job in jobs {
        if let Err(e) = job.await {
            log::error!("scheduler task ended abnormally: {}", e);
        }
    }
    Ok(())
}

/// Broadcast shutdown once `signal` resolves. If the signal can't be
/// listened for, the sender is held forever so receivers keep waiting.
async fn forward_shutdown<F>(signal: F, shutdown_tx: watch::Sender<()>)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            log::info!("shutdown requested");
            let _ = shutdown_tx.send(());
        }
        Err(e) => {
            log::error!("failed to listen for Ctrl-C, running until killed: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

fn configure(mut config: Config, path: &std::path::Path) -> Result<()> {
    let api_key = Password::new("OpenWeather API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    if api_key.trim().is_empty() {
        bail!("API key must not be empty");
    }

    config.set_api_key(api_key.trim().to_string());
    config.save_to(path)?;

    println!("Saved configuration to {}", path.display());
    Ok(())
}
