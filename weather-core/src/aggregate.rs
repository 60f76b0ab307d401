use chrono::{DateTime, Local, SubsecRound, TimeDelta, Utc};

use crate::{error::StorageError, storage::Storage};

/// Width of the trailing window a daily summary covers.
pub const SUMMARY_WINDOW_HOURS: i64 = 24;

/// Summarise the trailing 24 hours of every city, stamped with today's local date.
pub async fn run_aggregation(storage: &Storage) -> Result<usize, StorageError> {
    run_aggregation_at(storage, Local::now()).await
}

/// As [`run_aggregation`], with an explicit "now".
pub async fn run_aggregation_at(
    storage: &Storage,
    now: DateTime<Local>,
) -> Result<usize, StorageError> {
    let since = (now.with_timezone(&Utc) - TimeDelta::hours(SUMMARY_WINDOW_HOURS)).trunc_subsecs(0);
    let summary_date = now.date_naive();

    let inserted = storage.insert_daily_summaries(since, summary_date).await?;
    log::info!("stored {} daily summaries for {}", inserted, summary_date);
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Observation;

    fn reading(city: &str, temp: f64, dt: DateTime<Utc>) -> Observation {
        Observation {
            city: city.into(),
            main: "Clear".into(),
            description: "clear sky".into(),
            temp,
            feels_like: temp,
            humidity: 30,
            wind_speed: 2.0,
            rain: 0.0,
            dt,
        }
    }

    #[tokio::test]
    async fn delhi_summary_over_trailing_day() {
        let storage = Storage::open_in_memory().unwrap();
        let now = Local::now();
        let base = now.with_timezone(&Utc);
        for (hours_ago, temp) in [(1, 30.0), (6, 32.0), (23, 34.0)] {
            storage
                .insert_observation(&reading("Delhi", temp, base - TimeDelta::hours(hours_ago)))
                .await
                .unwrap();
        }
        storage
            .insert_observation(&reading("Delhi", 50.0, base - TimeDelta::hours(25)))
            .await
            .unwrap();

        let inserted = run_aggregation_at(&storage, now).await.unwrap();
        assert_eq!(inserted, 1);

        let summaries = storage.recent_summaries(10).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].avg_temp, 32.0);
        assert_eq!(summaries[0].max_temp, 34.0);
        assert_eq!(summaries[0].min_temp, 30.0);
        assert_eq!(summaries[0].summary_date, now.date_naive());
    }

    #[tokio::test]
    async fn nothing_to_summarise_inserts_nothing() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(run_aggregation(&storage).await.unwrap(), 0);
        assert!(storage.recent_summaries(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_day_runs_append() {
        let storage = Storage::open_in_memory().unwrap();
        let now = Local::now();
        storage
            .insert_observation(&reading("Mumbai", 29.0, now.with_timezone(&Utc) - TimeDelta::hours(2)))
            .await
            .unwrap();

        run_aggregation_at(&storage, now).await.unwrap();
        run_aggregation_at(&storage, now).await.unwrap();

        let summaries = storage.recent_summaries(10).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].summary_date, summaries[1].summary_date);
    }
}
