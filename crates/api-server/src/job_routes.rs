//! HTTP side door for workers that cannot publish on the Redis completion
//! channel: the finished analysis is written to the shared cache and fanned
//! out to socket subscribers, same as a `job-completed` publication.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use ticker_core::AnalysisResult;

use crate::{AppError, AppState};

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CompletionAck {
    pub ticker: String,
    /// Socket subscribers the event reached
    pub delivered: usize,
}

pub fn job_routes() -> Router<AppState> {
    Router::new().route("/api/jobs/completed", post(report_completion))
}

#[utoipa::path(
    post,
    path = "/api/jobs/completed",
    request_body = AnalysisResult,
    responses(
        (status = 200, description = "Result cached and announced", body = CompletionAck),
        (status = 401, description = "No valid session"),
        (status = 500, description = "Cache write failed")
    ),
    tag = "Jobs"
)]
pub async fn report_completion(
    State(state): State<AppState>,
    Json(result): Json<AnalysisResult>,
) -> Result<Json<CompletionAck>, AppError> {
    state
        .cache
        .put(&result, state.config.cache_ttl)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to cache result for {}: {}", result.ticker, e))?;

    let delivered = state.hub.publish_completion(&result)?;
    tracing::info!("Completion for {} reported over HTTP", result.ticker);

    Ok(Json(CompletionAck {
        ticker: result.ticker.to_string(),
        delivered,
    }))
}
