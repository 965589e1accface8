use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;

use ticker_core::{
    AnalysisResult, CacheLookup, FetchOutcome, FlowError, HistorySink, InstrumentRef,
    RemoteCache, TickerFetcher, TickerSymbol,
};

use crate::config::BackendConfig;

const CHECK_CACHE_ROUTE: &str = "/api/check-cache";
const TICKER_DATA_ROUTE: &str = "/api/ticker-data";
const ADD_TO_HISTORY_ROUTE: &str = "/api/update-user-data/add-to-instruments-history";

#[derive(Debug, Deserialize)]
struct CheckCacheResponse {
    #[serde(default)]
    cached: bool,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TickerDataResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the dashboard backend: cache check and synchronous fetch.
/// History goes to the record store when one is configured, else to the
/// dashboard backend itself.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    history_url: Option<String>,
    session_token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, FlowError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FlowError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            history_url: config
                .history_url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
            session_token: config.session_token.clone(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.session_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    fn history_endpoint(&self) -> String {
        let base = self.history_url.as_deref().unwrap_or(&self.base_url);
        format!("{}{}", base, ADD_TO_HISTORY_ROUTE)
    }
}

#[async_trait]
impl RemoteCache for HttpBackend {
    /// Anything other than a well-formed hit is a miss. Only transport
    /// failures surface as errors.
    async fn lookup(&self, symbol: &TickerSymbol) -> Result<CacheLookup, FlowError> {
        let response = self
            .authorized(self.client.get(self.url(CHECK_CACHE_ROUTE)))
            .query(&[("ticker", symbol.as_str())])
            .send()
            .await
            .map_err(|e| FlowError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("check-cache for {} answered {}, treating as miss", symbol, status);
        }

        let body: CheckCacheResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Unreadable check-cache body for {}: {}", symbol, e);
                return Ok(CacheLookup::Miss);
            }
        };

        let data = match (body.cached, body.data) {
            (true, Some(data)) => data,
            _ => return Ok(CacheLookup::Miss),
        };

        match AnalysisResult::from_value(data) {
            Ok(result) if result.ticker == *symbol => Ok(CacheLookup::Hit(result)),
            Ok(result) => {
                tracing::warn!("check-cache for {} returned data for {}, ignoring", symbol, result.ticker);
                Ok(CacheLookup::Miss)
            }
            Err(e) => {
                tracing::warn!("Malformed cached data for {}: {}", symbol, e);
                Ok(CacheLookup::Miss)
            }
        }
    }
}

#[async_trait]
impl TickerFetcher for HttpBackend {
    async fn fetch(&self, instrument: &InstrumentRef, refresh: bool) -> Result<FetchOutcome, FlowError> {
        let mut query = vec![("ticker", instrument.symbol.to_string())];
        if let Some(name) = &instrument.name {
            query.push(("name", name.clone()));
        }
        if refresh {
            query.push(("refresh", "true".to_string()));
        }

        let response = self
            .authorized(self.client.get(self.url(TICKER_DATA_ROUTE)))
            .query(&query)
            .send()
            .await
            .map_err(|e| FlowError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(FlowError::Unauthorized);
        }

        let text = response
            .text()
            .await
            .map_err(|e| FlowError::Network(e.to_string()))?;
        let body: Option<TickerDataResponse> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let message = body
                .and_then(|b| b.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("API Error").to_string());
            return Err(FlowError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body = body.ok_or_else(|| {
            FlowError::MalformedPayload(format!("ticker-data body is not JSON: {:.80}", text))
        })?;

        match body.status.as_deref() {
            Some("success") => {
                let data = body.data.ok_or_else(|| {
                    FlowError::MalformedPayload("success response without data".to_string())
                })?;
                Ok(FetchOutcome::Ready(AnalysisResult::from_value(data)?))
            }
            Some("processing") => Ok(FetchOutcome::Processing),
            other => Err(FlowError::MalformedPayload(format!(
                "unexpected ticker-data status: {:?}",
                other
            ))),
        }
    }
}

#[async_trait]
impl HistorySink for HttpBackend {
    async fn record(&self, instrument: &InstrumentRef) -> Result<(), FlowError> {
        let response = self
            .authorized(self.client.post(self.history_endpoint()))
            .json(&json!({ "instrument": instrument }))
            .send()
            .await
            .map_err(|e| FlowError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FlowError::Upstream {
                status: response.status().as_u16(),
                message: "Failed to update history".to_string(),
            });
        }
        Ok(())
    }
}
