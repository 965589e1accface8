//! Ticker data and search endpoints.
//!
//! `/api/ticker-data` answers from the shared cache when it can; otherwise it
//! queues an `analyze-stock` job and replies 202 so the client starts
//! listening for the completion event.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use ticker_core::{AnalysisResult, JobRequest, TickerInfo, TickerSymbol};

use crate::search::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::{AppError, AppState};

pub const PROCESSING_MESSAGE: &str = "Analysis has been started. You will be notified when it is complete.";

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct TickerDataQuery {
    pub ticker: Option<String>,
    /// Display name forwarded to the worker
    pub name: Option<String>,
    /// Skip the cache and recompute. A bare `&refresh` counts as set.
    #[serde(default, deserialize_with = "presence_flag")]
    pub refresh: bool,
}

/// Query flag that is on when present, unless spelled `false`, `0` or `no`.
fn presence_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(match raw {
        None => false,
        Some(value) => !matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "false" | "0" | "no"
        ),
    })
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TickerDataReady {
    pub status: String,
    pub source: String,
    pub data: AnalysisResult,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TickerDataProcessing {
    pub status: String,
    pub message: String,
    pub ticker: String,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct TickerSearchQuery {
    pub ticker: Option<String>,
    pub limit: Option<usize>,
}

pub fn ticker_routes() -> Router<AppState> {
    Router::new()
        .route("/api/ticker-data", get(get_ticker_data))
        .route("/api/ticker-search", get(search_tickers))
}

#[utoipa::path(
    get,
    path = "/api/ticker-data",
    params(TickerDataQuery),
    responses(
        (status = 200, description = "Served from the shared cache", body = TickerDataReady),
        (status = 202, description = "Analysis queued; wait for job-completed", body = TickerDataProcessing),
        (status = 400, description = "Ticker missing"),
        (status = 401, description = "No valid session"),
        (status = 500, description = "Queue unavailable")
    ),
    tag = "Tickers"
)]
pub async fn get_ticker_data(
    State(state): State<AppState>,
    Query(query): Query<TickerDataQuery>,
) -> Result<Response, AppError> {
    let symbol = query
        .ticker
        .as_deref()
        .map(TickerSymbol::parse)
        .transpose()
        .ok()
        .flatten()
        .ok_or_else(|| AppError::bad_request("Ticker is required"))?;

    tracing::info!("ticker-data requested for {} (refresh: {})", symbol, query.refresh);

    if !query.refresh {
        if let Some(data) = cached_result(&state, &symbol).await {
            tracing::info!("Cache hit for {}, serving from cache", symbol);
            return Ok(Json(TickerDataReady {
                status: "success".into(),
                source: "cache".into(),
                data,
            })
            .into_response());
        }
    }

    tracing::info!("Cache miss for {}, queueing analysis", symbol);
    let outcome = state
        .queue
        .enqueue(JobRequest::analyze(symbol.clone(), query.name.clone()))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to queue analysis for {}: {}", symbol, e))?;
    tracing::debug!("Analysis for {} is job {}", symbol, outcome.job_id());

    Ok((
        StatusCode::ACCEPTED,
        Json(TickerDataProcessing {
            status: "processing".into(),
            message: PROCESSING_MESSAGE.into(),
            ticker: symbol.to_string(),
        }),
    )
        .into_response())
}

/// Cached analysis for `symbol`. Unreadable entries and cache outages count as misses.
async fn cached_result(state: &AppState, symbol: &TickerSymbol) -> Option<AnalysisResult> {
    match state.cache.get_raw(symbol).await {
        Ok(Some(raw)) => match AnalysisResult::from_json(&raw) {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!("Ignoring unreadable cache entry for {}: {}", symbol, e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Cache unavailable for {}, queueing anyway: {}", symbol, e);
            None
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/ticker-search",
    params(TickerSearchQuery),
    responses(
        (status = 200, description = "Instruments ranked by similarity", body = Vec<TickerInfo>),
        (status = 400, description = "Empty query")
    ),
    tag = "Tickers"
)]
pub async fn search_tickers(
    State(state): State<AppState>,
    Query(query): Query<TickerSearchQuery>,
) -> Result<Json<Vec<TickerInfo>>, AppError> {
    let q = query.ticker.as_deref().unwrap_or("").trim();
    if q.is_empty() {
        return Err(AppError::bad_request("No ticker provided"));
    }

    let limit = query
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_LIMIT)
        .min(MAX_LIMIT);

    Ok(Json(state.directory.search(q, limit)))
}
