use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized: sign in to continue")]
    Unauthorized,

    #[error("Invalid ticker symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl FlowError {
    /// Transient infrastructure failures the user may retry by hand.
    /// Authorization failures and malformed data are not retriable.
    pub fn is_retriable(&self) -> bool {
        match self {
            FlowError::Network(_)
            | FlowError::Cache(_)
            | FlowError::Queue(_)
            | FlowError::Subscription(_)
            | FlowError::Timeout(_) => true,
            FlowError::Upstream { status, .. } => *status >= 500,
            FlowError::Unauthorized
            | FlowError::InvalidSymbol(_)
            | FlowError::MalformedPayload(_) => false,
        }
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        FlowError::MalformedPayload(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(FlowError::Network("reset".into()).is_retriable());
        assert!(FlowError::Upstream { status: 503, message: "down".into() }.is_retriable());
        assert!(!FlowError::Upstream { status: 400, message: "bad".into() }.is_retriable());
        assert!(!FlowError::Unauthorized.is_retriable());
        assert!(!FlowError::MalformedPayload("x".into()).is_retriable());
    }
}
