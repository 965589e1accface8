//! Wire frames of the notification channel.
//!
//! Clients join a topic named after the upper-cased ticker; the worker's
//! completion is delivered as a `job-completed` frame on that topic carrying
//! the full analysis result.

use serde::{Deserialize, Serialize};

use crate::{normalize, AnalysisResult};

pub const JOB_COMPLETED_EVENT: &str = "job-completed";

/// Topic name for a ticker
pub fn topic_for(symbol: &str) -> String {
    normalize(symbol)
}

/// Frames a client sends to the notification server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientFrame {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
}

/// Frames the notification server pushes to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    pub event: String,
    pub topic: String,
    pub data: serde_json::Value,
}

impl ServerFrame {
    pub fn job_completed(result: &AnalysisResult) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: JOB_COMPLETED_EVENT.to_string(),
            topic: topic_for(result.ticker.as_str()),
            data: serde_json::to_value(result)?,
        })
    }

    pub fn is_job_completed(&self) -> bool {
        self.event == JOB_COMPLETED_EVENT
    }
}
