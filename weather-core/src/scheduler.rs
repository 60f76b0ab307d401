//! Cron-driven recurring jobs.
//!
//! Each job runs its own timer loop on the local clock. Every firing is
//! spawned as a separate task so a failing or panicking run is logged and
//! the loop keeps going. A job never overlaps with itself: if the previous
//! run is still in flight when the next tick arrives, that tick is skipped.

use chrono::{DateTime, Local, TimeZone};
use cron::Schedule;
use std::{
    future::Future,
    pin::Pin,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::{sync::watch, task::JoinHandle};

/// Errors from scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid cron expression '{expr}': {reason}")]
    CronParse { expr: String, reason: String },
}

pub type JobFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Produces one run of a job each time it is called.
pub type JobFn = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Parse a 5- or 6-field cron expression.
pub fn parse_schedule(expr: &str) -> Result<Schedule, SchedulerError> {
    Schedule::from_str(&normalize_cron_expr(expr)).map_err(|e| SchedulerError::CronParse {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// The `cron` crate expects seconds as the first field. Standard 5-field
/// expressions get "0 " prepended so they fire on the minute.
fn normalize_cron_expr(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Next occurrence strictly after `after`, in `after`'s timezone.
pub fn next_fire_after<Tz: TimeZone>(schedule: &Schedule, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    schedule.after(after).next()
}

/// Flag that at most one run of a job holds at a time.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    running: Arc<AtomicBool>,
}

/// Releases the [`SingleFlight`] slot on drop.
#[derive(Debug)]
pub struct FlightGuard {
    running: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn try_acquire(&self) -> Option<FlightGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard { running: Arc::clone(&self.running) })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// A named recurring job.
pub struct Job {
    name: String,
    schedule: Schedule,
    run: JobFn,
    flight: SingleFlight,
}

impl Job {
    pub fn new<F, Fut>(name: impl Into<String>, cron_expr: &str, run: F) -> Result<Self, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Ok(Self {
            name: name.into(),
            schedule: parse_schedule(cron_expr)?,
            run: Arc::new(move || Box::pin(run()) as JobFuture),
            flight: SingleFlight::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start one run in the background unless the previous one is still going.
    ///
    /// Returns the supervising task, or `None` if the tick was skipped.
    fn fire(&self) -> Option<JoinHandle<()>> {
        let Some(guard) = self.flight.try_acquire() else {
            log::warn!("[Scheduler] '{}' is still running, skipping this tick", self.name);
            return None;
        };

        let name = self.name.clone();
        let run = tokio::spawn((self.run)());

        Some(tokio::spawn(async move {
            let _guard = guard;
            match run.await {
                Ok(Ok(())) => log::debug!("[Scheduler] '{}' finished", name),
                Ok(Err(e)) => log::error!("[Scheduler] '{}' failed: {:#}", name, e),
                Err(e) if e.is_panic() => log::error!("[Scheduler] '{}' panicked", name),
                Err(e) => log::error!("[Scheduler] '{}' was cancelled: {}", name, e),
            }
        }))
    }

    async fn run_loop(self, mut shutdown: watch::Receiver<()>) {
        loop {
            let now = Local::now();
            let Some(next) = next_fire_after(&self.schedule, &now) else {
                log::warn!("[Scheduler] '{}' has no upcoming occurrence, stopping", self.name);
                return;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            log::debug!("[Scheduler] '{}' next run at {}", self.name, next);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    log::info!("[Scheduler] running '{}'", self.name);
                    self.fire();
                }
                _ = shutdown.changed() => {
                    log::info!("[Scheduler] '{}' received shutdown, exiting", self.name);
                    return;
                }
            }
        }
    }
}

/// A set of independent jobs, each on its own task.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<Job>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, job: Job) -> &mut Self {
        self.jobs.push(job);
        self
    }

    /// Spawn every job. Each loop exits when `shutdown` fires or its sender drops.
    pub fn start(self, shutdown: watch::Receiver<()>) -> Vec<JoinHandle<()>> {
        self.jobs
            .into_iter()
            .map(|job| {
                log::info!("[Scheduler] starting '{}'", job.name());
                tokio::spawn(job.run_loop(shutdown.clone()))
            })
            .collect()
    }
}
