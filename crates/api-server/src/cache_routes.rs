//! Cache probe used by clients before asking for a computation.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use ticker_core::{AnalysisResult, TickerSymbol};

use crate::{AppError, AppState};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct CheckCacheQuery {
    /// Ticker symbol, any case
    pub ticker: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CheckCacheResponse {
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<AnalysisResult>,
}

impl CheckCacheResponse {
    pub fn hit(data: AnalysisResult) -> Self {
        Self {
            cached: true,
            data: Some(data),
        }
    }

    pub fn miss() -> Self {
        Self {
            cached: false,
            data: None,
        }
    }
}

pub fn cache_routes() -> Router<AppState> {
    Router::new().route("/api/check-cache", get(check_cache))
}

/// Response when the cache cannot be read: a miss with status 500, so the
/// caller proceeds as if nothing were cached.
pub fn fail_open_miss() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(CheckCacheResponse::miss()),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/api/check-cache",
    params(CheckCacheQuery),
    responses(
        (status = 200, description = "Cached analysis or a miss", body = CheckCacheResponse),
        (status = 400, description = "Ticker missing"),
        (status = 500, description = "Cache unavailable, reported as a miss", body = CheckCacheResponse)
    ),
    tag = "Cache"
)]
pub async fn check_cache(
    State(state): State<AppState>,
    Query(query): Query<CheckCacheQuery>,
) -> Result<Response, AppError> {
    let symbol = query
        .ticker
        .as_deref()
        .map(TickerSymbol::parse)
        .transpose()
        .ok()
        .flatten()
        .ok_or_else(|| AppError::bad_request("Ticker symbol is required"))?;

    let raw = match state.cache.get_raw(&symbol).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!("Cache check for {} failed: {}", symbol, e);
            return Ok(fail_open_miss());
        }
    };

    let Some(raw) = raw else {
        tracing::debug!("Cache miss for {}", symbol);
        return Ok(Json(CheckCacheResponse::miss()).into_response());
    };

    match AnalysisResult::from_json(&raw) {
        Ok(data) => {
            tracing::debug!("Cache hit for {}", symbol);
            Ok(Json(CheckCacheResponse::hit(data)).into_response())
        }
        Err(e) => {
            tracing::error!("Unreadable cache entry for {}: {}", symbol, e);
            Ok(fail_open_miss())
        }
    }
}
