//! HTTP front end: the summary page and static assets.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use std::fmt::Write as _;
use tokio::sync::watch;
use tower_http::services::ServeDir;

use crate::{app::AppContext, error::StorageError, model::DailySummary};

/// Storage failure surfaced to the client as a plain 500.
#[derive(Debug)]
pub struct PageError(StorageError);

impl From<StorageError> for PageError {
    fn from(err: StorageError) -> Self {
        Self(err)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        log::error!("failed to load summaries: {}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

pub fn router(ctx: AppContext) -> Router {
    let assets = ServeDir::new(&ctx.config.server.static_dir);

    Router::new()
        .route("/", get(index))
        .fallback_service(assets)
        .with_state(ctx)
}

/// `GET /`: the most recent daily summaries, newest first.
pub async fn index(State(ctx): State<AppContext>) -> Result<Html<String>, PageError> {
    let summaries = ctx
        .storage
        .recent_summaries(ctx.config.server.summary_limit)
        .await?;
    Ok(Html(render_summaries(&summaries)))
}

/// Serve until `shutdown` fires.
pub async fn serve(ctx: AppContext, mut shutdown: watch::Receiver<()>) -> anyhow::Result<()> {
    let listen = ctx.config.server.listen.clone();
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    log::info!("Weather monitoring app listening at http://{}", listener.local_addr()?);

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    Ok(())
}

pub fn render_summaries(summaries: &[DailySummary]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n\
         <meta charset=\"utf-8\">\n\
         <title>Weather Monitoring</title>\n\
         <link rel=\"stylesheet\" href=\"/style.css\">\n\
         </head>\n<body>\n<h1>Daily Weather Summary</h1>\n",
    );

    if summaries.is_empty() {
        html.push_str("<p class=\"empty\">No summaries yet.</p>\n");
    } else {
        html.push_str(
            "<table>\n<thead><tr>\
             <th>City</th><th>Date</th><th>Avg (°C)</th><th>Max (°C)</th>\
             <th>Min (°C)</th><th>Dominant condition</th>\
             </tr></thead>\n<tbody>\n",
        );
        for s in summaries {
            let _ = writeln!(
                html,
                "<tr class=\"summary\"><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td><td>{}</td></tr>",
                escape_html(&s.city),
                s.summary_date.format("%Y-%m-%d"),
                s.avg_temp,
                s.max_temp,
                s.min_temp,
                escape_html(&s.dominant_condition),
            );
        }
        html.push_str("</tbody>\n</table>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, model::Observation, provider::OpenWeatherProvider, storage::Storage};
    use chrono::{NaiveDate, TimeDelta, Utc};
    use std::sync::Arc;

    fn context(storage: Storage) -> AppContext {
        context_with(Config::default(), storage)
    }

    fn context_with(config: Config, storage: Storage) -> AppContext {
        AppContext::new(config, storage, Arc::new(OpenWeatherProvider::new("KEY".into())))
    }

    async fn seed_days(storage: &Storage, days: i64) {
        let now = Utc::now();
        storage
            .insert_observation(&Observation {
                city: "Delhi".into(),
                main: "Haze".into(),
                description: "haze".into(),
                temp: 31.5,
                feels_like: 33.0,
                humidity: 45,
                wind_speed: 2.1,
                rain: 0.0,
                dt: now - TimeDelta::hours(1),
            })
            .await
            .unwrap();

        let first = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        for day in 0..days {
            storage
                .insert_daily_summaries(now - TimeDelta::hours(24), first + TimeDelta::days(day))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn index_lists_ten_newest_summaries() {
        let storage = Storage::open_in_memory().unwrap();
        seed_days(&storage, 12).await;

        let Html(page) = index(State(context(storage))).await.unwrap();

        assert_eq!(page.matches("<tr class=\"summary\">").count(), 10);
        let newest = page.find("2024-10-12").unwrap();
        let older = page.find("2024-10-11").unwrap();
        assert!(newest < older, "rows must be ordered newest first");
        assert!(!page.contains("2024-10-02"), "oldest rows fall outside the limit");
        assert!(page.contains("<td>31.50</td>"));
    }

    #[tokio::test]
    async fn index_renders_empty_state() {
        let Html(page) = index(State(context(Storage::open_in_memory().unwrap())))
            .await
            .unwrap();

        assert!(page.contains("No summaries yet."));
        assert!(!page.contains("<table>"));
    }

    #[tokio::test]
    async fn storage_failure_is_a_bare_500() {
        let response = PageError(StorageError::Poisoned).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Internal Server Error");
    }

    #[tokio::test]
    async fn router_serves_page_static_files_and_404() {
        let assets = tempfile::tempdir().unwrap();
        std::fs::write(assets.path().join("style.css"), "table { width: 100%; }").unwrap();

        let mut cfg = Config::default();
        cfg.server.static_dir = assets.path().to_path_buf();
        let ctx = context_with(cfg, Storage::open_in_memory().unwrap());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move { axum::serve(listener, router(ctx)).await });

        let css = reqwest::get(format!("{base}/style.css")).await.unwrap();
        assert_eq!(css.status(), reqwest::StatusCode::OK);
        assert_eq!(css.text().await.unwrap(), "table { width: 100%; }");

        let page = reqwest::get(format!("{base}/")).await.unwrap();
        assert_eq!(page.status(), reqwest::StatusCode::OK);
        let content_type = page.headers()[reqwest::header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/html"));
        assert!(page.text().await.unwrap().contains("No summaries yet."));

        let missing = reqwest::get(format!("{base}/nope")).await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        server.abort();
    }

    #[test]
    fn city_names_are_escaped() {
        let page = render_summaries(&[DailySummary {
            city: "<script>alert('x')</script>".into(),
            avg_temp: 1.0,
            max_temp: 2.0,
            min_temp: 0.0,
            dominant_condition: "Clear & Sunny".into(),
            summary_date: NaiveDate::from_ymd_opt(2024, 10, 19).unwrap(),
        }]);

        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(page.contains("Clear &amp; Sunny"));
    }
}
