//! HTTP and WebSocket front for ticker analyses.
//!
//! Serves the shared-cache probe, the cache-or-queue data endpoint, ticker
//! search, the daily prewarm trigger, and the `/ws` notification channel that
//! relays worker completions to subscribed clients.

use anyhow::Context;
use axum::{
    http::{HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use resolution_engine::TopicHub;
use ticker_core::{JobQueue, ResultCache};

pub mod auth;
pub mod cache_routes;
pub mod config;
pub mod cron_routes;
pub mod job_routes;
pub mod memory_store;
pub mod redis_store;
pub mod search;
pub mod ticker_routes;
pub mod ws_routes;

#[cfg(test)]
#[path = "routes_tests.rs"]
mod routes_tests;

use auth::SessionVerifier;
use config::ServerConfig;
use memory_store::{MemoryCache, MemoryJobQueue};
use redis_store::{RedisCache, RedisJobQueue};
use search::TickerDirectory;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn ResultCache>,
    pub queue: Arc<dyn JobQueue>,
    pub hub: TopicHub,
    pub sessions: Arc<SessionVerifier>,
    pub directory: Arc<TickerDirectory>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        cache: Arc<dyn ResultCache>,
        queue: Arc<dyn JobQueue>,
        hub: TopicHub,
        directory: TickerDirectory,
    ) -> Self {
        Self {
            cache,
            queue,
            hub,
            sessions: Arc::new(SessionVerifier::new(&config.session_tokens)),
            directory: Arc::new(directory),
            config: Arc::new(config),
        }
    }
}

/// Handler error carrying an HTTP status; renders `{"message": ...}`
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn bad_request(message: impl std::fmt::Display) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!("{}", message))
    }

    pub fn unauthorized(message: impl std::fmt::Display) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, anyhow::anyhow!("{}", message))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.error);
        }
        (self.status, Json(json!({ "message": self.error.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.into())
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        cache_routes::check_cache,
        ticker_routes::get_ticker_data,
        ticker_routes::search_tickers,
        cron_routes::trigger_prewarm,
        job_routes::report_completion,
        ws_routes::ws_handler,
    ),
    tags(
        (name = "Cache", description = "Shared result cache"),
        (name = "Tickers", description = "Ticker data and search"),
        (name = "Cron", description = "Scheduled cache warm-up"),
        (name = "Jobs", description = "Worker completion reports"),
        (name = "System", description = "Health and notification channel")
    )
)]
pub struct ApiDoc;

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up")),
    tag = "System"
)]
pub async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "topics": state.hub.topic_count(),
    }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return base.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(ticker_routes::ticker_routes())
        .merge(job_routes::job_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(cache_routes::cache_routes())
        .merge(cron_routes::cron_routes())
        .merge(ws_routes::ws_routes())
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,api_server=debug"));
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env();
    config.log_summary();

    let directory = TickerDirectory::load(config.ticker_directory_path.as_deref())?;
    let hub = TopicHub::new();

    let (cache, queue): (Arc<dyn ResultCache>, Arc<dyn JobQueue>) = match &config.redis_url {
        Some(url) => {
            let (client, conn) = redis_store::init_redis(url).await?;
            redis_store::spawn_completion_bridge(client, hub.clone());
            (
                Arc::new(RedisCache::new(conn.clone())),
                Arc::new(RedisJobQueue::new(conn, config.queue_name.clone(), config.dedup_ttl)),
            )
        }
        None => {
            tracing::warn!("Running with in-memory cache and queue; jobs are not processed");
            (
                Arc::new(MemoryCache::new()),
                Arc::new(MemoryJobQueue::new(config.dedup_ttl)),
            )
        }
    };

    if let Some(every) = config.prewarm_interval {
        tracing::info!("Prewarm schedule every {}s", every.as_secs());
        cron_routes::spawn_prewarm_schedule(queue.clone(), config.prewarm_tickers.clone(), every);
    }

    let bind_addr = config.bind_addr.clone();
    let app = build_router(AppState::new(config, cache, queue, hub, directory));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("api-server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
