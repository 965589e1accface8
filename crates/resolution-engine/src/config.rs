use std::time::Duration;

/// Resolution engine tuning
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Upper bound on the `analyzing` wait. `None` waits for the completion
    /// event indefinitely. When set and exceeded, the engine makes a single
    /// remote cache lookup and gives up with an error on a miss.
    pub analysis_wait_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn with_analysis_wait_timeout(mut self, timeout: Duration) -> Self {
        self.analysis_wait_timeout = Some(timeout);
        self
    }
}

/// Where the dashboard backend lives and how to authenticate against it
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub api_url: String,
    pub ws_url: String,
    pub session_token: Option<String>,
    pub timeout: Duration,
    /// Record store serving the instruments history. Unset disables history.
    pub history_url: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".to_string(),
            ws_url: "ws://localhost:3000/ws".to_string(),
            session_token: None,
            timeout: Duration::from_secs(10),
            history_url: None,
        }
    }
}

impl BackendConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("VECTOREDGE_API_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_url),
            ws_url: std::env::var("VECTOREDGE_WS_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.ws_url),
            session_token: std::env::var("VECTOREDGE_SESSION_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            timeout: std::env::var("VECTOREDGE_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            history_url: std::env::var("VECTOREDGE_HISTORY_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.trim_end_matches('/').to_string()),
        }
    }
}
