use std::path::PathBuf;
use std::time::Duration;

use ticker_core::TickerSymbol;

const DAY_SECS: u64 = 24 * 60 * 60;

pub const DEFAULT_PREWARM_TICKERS: &[&str] = &["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "META", "NVDA"];

/// Server settings, read from the environment at startup
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// `None` runs against the in-memory cache and queue (development only)
    pub redis_url: Option<String>,
    pub queue_name: String,
    /// How long a finished analysis stays in the shared cache
    pub cache_ttl: Duration,
    /// How long a job id blocks duplicates
    pub dedup_ttl: Duration,
    pub prewarm_tickers: Vec<TickerSymbol>,
    /// `None` disables the in-process prewarm schedule; the endpoint stays available
    pub prewarm_interval: Option<Duration>,
    pub session_tokens: Vec<String>,
    pub ticker_directory_path: Option<PathBuf>,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            redis_url: Some("redis://127.0.0.1:6379".to_string()),
            queue_name: "ticker-queue".to_string(),
            cache_ttl: Duration::from_secs(30 * DAY_SECS),
            dedup_ttl: Duration::from_secs(2 * DAY_SECS),
            prewarm_tickers: DEFAULT_PREWARM_TICKERS
                .iter()
                .filter_map(|s| TickerSymbol::parse(s).ok())
                .collect(),
            prewarm_interval: None,
            session_tokens: Vec::new(),
            ticker_directory_path: None,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let redis_url = match std::env::var("REDIS_URL") {
            Ok(url) if url.eq_ignore_ascii_case("memory") => None,
            Ok(url) if !url.trim().is_empty() => Some(url),
            _ => defaults.redis_url,
        };

        let prewarm_tickers = std::env::var("PREWARM_TICKERS")
            .ok()
            .map(|v| parse_symbols(&v))
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.prewarm_tickers);

        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            redis_url,
            queue_name: std::env::var("QUEUE_NAME")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.queue_name),
            cache_ttl: env_secs("CACHE_TTL_SECS").unwrap_or(defaults.cache_ttl),
            dedup_ttl: env_secs("DEDUP_TTL_SECS").unwrap_or(defaults.dedup_ttl),
            prewarm_tickers,
            prewarm_interval: env_secs("PREWARM_INTERVAL_SECS").filter(|d| !d.is_zero()),
            session_tokens: std::env::var("SESSION_TOKENS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            ticker_directory_path: std::env::var("TICKER_DIRECTORY_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
        }
    }

    pub fn log_summary(&self) {
        tracing::info!(
            "Config: bind={} redis={} queue={} cache_ttl={}s dedup_ttl={}s prewarm={} every {:?} auth={}",
            self.bind_addr,
            self.redis_url.as_deref().unwrap_or("memory"),
            self.queue_name,
            self.cache_ttl.as_secs(),
            self.dedup_ttl.as_secs(),
            self.prewarm_tickers.len(),
            self.prewarm_interval,
            if self.session_tokens.is_empty() { "disabled" } else { "enabled" },
        );
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_symbols(raw: &str) -> Vec<TickerSymbol> {
    raw.split(',')
        .filter_map(|s| match TickerSymbol::parse(s) {
            Ok(symbol) => Some(symbol),
            Err(e) => {
                if !s.trim().is_empty() {
                    tracing::warn!("Skipping prewarm entry: {}", e);
                }
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.queue_name, "ticker-queue");
        assert_eq!(config.cache_ttl, Duration::from_secs(2_592_000));
        assert_eq!(config.prewarm_tickers.len(), 7);
        assert_eq!(config.prewarm_tickers[0].as_str(), "AAPL");
        assert!(config.prewarm_interval.is_none());
        assert!(config.session_tokens.is_empty());
    }

    #[test]
    fn test_parse_symbols_skips_blanks() {
        let symbols = parse_symbols(" nvda, ,amd ");
        let names: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["NVDA", "AMD"]);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }
}
