use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FlowError, TickerSymbol};

/// Price overview block of an analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct Overview {
    pub current_price: Option<f64>,
    pub change: Option<f64>,
    pub percent_change: Option<String>,
    pub previous_close: Option<f64>,
    pub open: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub day_range: Option<String>,
    #[serde(rename = "52_week_range")]
    pub week_52_range: Option<String>,
    pub volume: Option<String>,
    pub avg_volume: Option<String>,
    pub market_cap: Option<String>,
    pub beta: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub eps: Option<f64>,
    pub earnings_date: Option<String>,
    pub forward_dividend_yield: Option<String>,
    pub ex_dividend_date: Option<String>,
    #[serde(rename = "1y_target_est")]
    pub target_est_1y: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum RecommendationAction {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Recommendation {
    pub action: RecommendationAction,
    /// 0 to 100
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PricePoint {
    pub x: String,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct VisualizationData {
    pub price_trend: Vec<PricePoint>,
    pub bullishness_meter: f64,
    pub risk_score: f64,
}

/// AI commentary generated for a ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AiInsights {
    pub summary: String,
    pub recommendation: Recommendation,
    #[serde(default)]
    pub key_takeaways: Vec<String>,
    #[serde(default)]
    pub visualization_data: VisualizationData,
}

/// Full computed data bundle for one ticker.
///
/// Produced whole by the worker (or the synchronous fetch path) and replaced
/// whole on refresh. Sections other than the overview and AI insights are kept
/// as the upstream computation shaped them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AnalysisResult {
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "AAPL"))]
    pub ticker: TickerSymbol,
    #[serde(alias = "timestamp")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub overview: Option<Overview>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub fundamental: Option<serde_json::Value>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub analysis: Option<serde_json::Value>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub technicals: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_insights: Option<AiInsights>,
}

impl AnalysisResult {
    /// Bare result with only identity and timestamp set
    pub fn new(ticker: TickerSymbol, last_updated: DateTime<Utc>) -> Self {
        Self {
            ticker,
            last_updated,
            overview: None,
            fundamental: None,
            analysis: None,
            technicals: None,
            ai_insights: None,
        }
    }

    pub fn with_overview(mut self, overview: Overview) -> Self {
        self.overview = Some(overview);
        self
    }

    /// Parse an untrusted JSON payload (cache entry, socket event).
    pub fn from_value(value: serde_json::Value) -> Result<Self, FlowError> {
        serde_json::from_value(value).map_err(|e| FlowError::MalformedPayload(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, FlowError> {
        serde_json::from_str(raw).map_err(|e| FlowError::MalformedPayload(e.to_string()))
    }

    pub fn current_price(&self) -> Option<f64> {
        self.overview.as_ref().and_then(|o| o.current_price)
    }
}

/// Ticker metadata returned by search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TickerInfo {
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub exchange: String,
    /// Yahoo Finance symbol
    #[serde(default)]
    pub yf: String,
    /// TradingView symbol
    #[serde(default)]
    pub tv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// What the user picked in the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentRef {
    pub symbol: TickerSymbol,
    pub name: Option<String>,
}

impl InstrumentRef {
    pub fn new(symbol: TickerSymbol) -> Self {
        Self { symbol, name: None }
    }

    pub fn parse(raw_symbol: &str) -> Result<Self, FlowError> {
        Ok(Self::new(TickerSymbol::parse(raw_symbol)?))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Outcome of a remote shared cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(AnalysisResult),
    Miss,
}

/// Outcome of the synchronous fetch path
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Result computed or served inline
    Ready(AnalysisResult),
    /// Work was queued; a completion event will follow on the notification channel
    Processing,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_payload() {
        let payload = json!({
            "ticker": "aapl",
            "last_updated": "2024-06-01T12:00:00Z",
            "overview": { "current_price": 191.5, "52_week_range": "164.08 - 199.62", "1y_target_est": 210.0 },
            "fundamental": { "valuation_measures": {} },
            "analysis": null,
            "technicals": null,
            "ai_insights": {
                "summary": "Steady",
                "recommendation": { "action": "Hold", "confidence": 62.0, "reasoning": "Range bound" },
                "key_takeaways": ["a", "b"],
                "visualization_data": { "price_trend": [{ "x": "2024-05-31", "y": 190.0 }], "bullishness_meter": 55.0, "risk_score": 30.0 }
            }
        });

        let result = AnalysisResult::from_value(payload).unwrap();
        assert_eq!(result.ticker.as_str(), "AAPL");
        assert_eq!(result.current_price(), Some(191.5));
        let overview = result.overview.as_ref().unwrap();
        assert_eq!(overview.week_52_range.as_deref(), Some("164.08 - 199.62"));
        assert_eq!(overview.target_est_1y, Some(210.0));
        assert_eq!(
            result.ai_insights.as_ref().unwrap().recommendation.action,
            RecommendationAction::Hold
        );
    }

    #[test]
    fn test_worker_timestamp_alias() {
        let payload = json!({ "ticker": "TSLA", "timestamp": "2024-06-01T12:00:00Z", "price": 12.5 });
        let result = AnalysisResult::from_value(payload).unwrap();
        assert_eq!(result.ticker.as_str(), "TSLA");
        assert!(result.overview.is_none());
    }

    #[test]
    fn test_missing_ticker_is_malformed() {
        let payload = json!({ "last_updated": "2024-06-01T12:00:00Z" });
        assert!(matches!(
            AnalysisResult::from_value(payload),
            Err(FlowError::MalformedPayload(_))
        ));
        assert!(matches!(
            AnalysisResult::from_json("not json"),
            Err(FlowError::MalformedPayload(_))
        ));
    }
}
