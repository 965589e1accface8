//! Scheduled cache warm-up for popular tickers.
//!
//! One `prewarm-ticker` job per ticker per UTC day; the job id makes repeated
//! triggers on the same day collapse into a single computation.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use ticker_core::{EnqueueOutcome, JobQueue, JobRequest, TickerSymbol};

use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PrewarmFailure {
    pub ticker: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrewarmReport {
    pub success: bool,
    pub timestamp: String,
    pub jobs_added: usize,
    pub jobs_deduplicated: usize,
    pub errors: Vec<PrewarmFailure>,
}

/// Enqueue a prewarm job for each ticker. A failing ticker is reported and
/// does not stop the rest.
pub async fn prewarm(queue: &dyn JobQueue, tickers: &[TickerSymbol]) -> PrewarmReport {
    let now = Utc::now();
    let timestamp = now.to_rfc3339();
    let today = now.date_naive();
    tracing::info!("Prewarm triggered at {} for {} tickers", timestamp, tickers.len());

    let mut report = PrewarmReport {
        success: true,
        timestamp,
        jobs_added: 0,
        jobs_deduplicated: 0,
        errors: Vec::new(),
    };

    for ticker in tickers {
        match queue.enqueue(JobRequest::prewarm(ticker.clone(), today)).await {
            Ok(EnqueueOutcome::Queued { job_id }) => {
                tracing::debug!("Prewarm queued: {}", job_id);
                report.jobs_added += 1;
            }
            Ok(EnqueueOutcome::Deduplicated { job_id }) => {
                tracing::debug!("Prewarm already pending: {}", job_id);
                report.jobs_deduplicated += 1;
            }
            Err(e) => {
                tracing::error!("Failed to queue prewarm for {}: {}", ticker, e);
                report.errors.push(PrewarmFailure {
                    ticker: ticker.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        "Prewarm finished: {} added, {} already pending, {} failed",
        report.jobs_added,
        report.jobs_deduplicated,
        report.errors.len()
    );
    report
}

/// Run [`prewarm`] on a fixed interval, first tick immediately
pub fn spawn_prewarm_schedule(
    queue: Arc<dyn JobQueue>,
    tickers: Vec<TickerSymbol>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            prewarm(queue.as_ref(), &tickers).await;
        }
    })
}

pub fn cron_routes() -> Router<AppState> {
    Router::new().route("/api/cron/prewarm", get(trigger_prewarm))
}

#[utoipa::path(
    get,
    path = "/api/cron/prewarm",
    responses((status = 200, description = "Prewarm jobs enqueued", body = PrewarmReport)),
    tag = "Cron"
)]
pub async fn trigger_prewarm(State(state): State<AppState>) -> Json<PrewarmReport> {
    Json(prewarm(state.queue.as_ref(), &state.config.prewarm_tickers).await)
}
