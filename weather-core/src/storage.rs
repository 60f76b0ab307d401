//! SQLite storage gateway: the observation log and the daily summaries.
//!
//! A single connection is shared behind a mutex. Every statement runs on
//! the blocking pool and holds the lock only for its own duration, never
//! across an `.await`.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, params};
use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use crate::{
    error::StorageError,
    model::{DailySummary, Observation},
};

pub type Result<T> = std::result::Result<T, StorageError>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS weather_updates (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    city        TEXT NOT NULL,
    main        TEXT NOT NULL,
    description TEXT NOT NULL,
    temp        REAL NOT NULL,
    feels_like  REAL NOT NULL,
    humidity    INTEGER NOT NULL,
    wind_speed  REAL NOT NULL,
    rain        REAL NOT NULL DEFAULT 0,
    dt          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_weather_updates_dt ON weather_updates(dt);

CREATE TABLE IF NOT EXISTS daily_weather_summary (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    city               TEXT NOT NULL,
    avg_temp           REAL NOT NULL,
    max_temp           REAL NOT NULL,
    min_temp           REAL NOT NULL,
    dominant_condition TEXT NOT NULL,
    summary_date       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_daily_summary_date ON daily_weather_summary(summary_date);
";

// Ties on the modal label go to the alphabetically first one.
const AGGREGATE_SQL: &str = "
WITH recent AS (
    SELECT city, main, temp
    FROM weather_updates
    WHERE dt >= ?1
),
ranked AS (
    SELECT city,
           main,
           ROW_NUMBER() OVER (PARTITION BY city ORDER BY COUNT(*) DESC, main ASC) AS rn
    FROM recent
    GROUP BY city, main
)
INSERT INTO daily_weather_summary
    (city, avg_temp, max_temp, min_temp, dominant_condition, summary_date)
SELECT r.city, AVG(r.temp), MAX(r.temp), MIN(r.temp), k.main, ?2
FROM recent r
JOIN ranked k ON k.city = r.city AND k.rn = 1
GROUP BY r.city, k.main
";

/// Handle to the relational store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        log::debug!("opened database at {}", path.display());

        Self::with_schema(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_schema(Connection::open_in_memory()?)
    }

    fn with_schema(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StorageError::Poisoned)?;
            f(&guard)
        })
        .await?
    }

    /// Append one observation to `weather_updates`.
    pub async fn insert_observation(&self, obs: &Observation) -> Result<()> {
        let obs = obs.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO weather_updates \
                 (city, main, description, temp, feels_like, humidity, wind_speed, rain, dt) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    obs.city,
                    obs.main,
                    obs.description,
                    obs.temp,
                    obs.feels_like,
                    obs.humidity,
                    obs.wind_speed,
                    obs.rain,
                    obs.dt,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Summarise every city with observations at or after `since` into one
    /// row each, stamped with `summary_date`. Returns the number of rows
    /// inserted.
    pub async fn insert_daily_summaries(
        &self,
        since: DateTime<Utc>,
        summary_date: NaiveDate,
    ) -> Result<usize> {
        self.run(move |conn| Ok(conn.execute(AGGREGATE_SQL, params![since, summary_date])?))
            .await
    }

    /// Latest summaries, newest date first.
    pub async fn recent_summaries(&self, limit: usize) -> Result<Vec<DailySummary>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT city, avg_temp, max_temp, min_temp, dominant_condition, summary_date \
                 FROM daily_weather_summary \
                 ORDER BY summary_date DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                Ok(DailySummary {
                    city: row.get(0)?,
                    avg_temp: row.get(1)?,
                    max_temp: row.get(2)?,
                    min_temp: row.get(3)?,
                    dominant_condition: row.get(4)?,
                    summary_date: row.get(5)?,
                })
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Observations for one city, oldest first.
    pub async fn observations_for(&self, city: &str) -> Result<Vec<Observation>> {
        let city = city.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT city, main, description, temp, feels_like, humidity, wind_speed, rain, dt \
                 FROM weather_updates WHERE city = ?1 ORDER BY dt, id",
            )?;
            let rows = stmt.query_map(params![city], |row| {
                Ok(Observation {
                    city: row.get(0)?,
                    main: row.get(1)?,
                    description: row.get(2)?,
                    temp: row.get(3)?,
                    feels_like: row.get(4)?,
                    humidity: row.get(5)?,
                    wind_speed: row.get(6)?,
                    rain: row.get(7)?,
                    dt: row.get(8)?,
                })
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
        .await
    }
}
