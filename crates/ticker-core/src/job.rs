use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::TickerSymbol;

/// Job names understood by the analysis worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// User-triggered analysis; the worker emits a completion event.
    AnalyzeStock,
    /// Scheduled cache warm-up; the worker only writes the cache.
    PrewarmTicker,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::AnalyzeStock => "analyze-stock",
            JobKind::PrewarmTicker => "prewarm-ticker",
        }
    }
}

/// Deduplication key for a scheduled prewarm: `prewarm:<SYMBOL>:<YYYY-MM-DD>`.
pub fn prewarm_job_id(symbol: &TickerSymbol, date: NaiveDate) -> String {
    format!("prewarm:{}:{}", symbol, date.format("%Y-%m-%d"))
}

/// A unit of work handed to the job queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub kind: JobKind,
    pub ticker: TickerSymbol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Requests sharing a job id collapse into one computation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub remove_on_complete: bool,
    #[serde(default)]
    pub remove_on_fail: bool,
}

impl JobRequest {
    pub fn analyze(ticker: TickerSymbol, name: Option<String>) -> Self {
        Self {
            kind: JobKind::AnalyzeStock,
            ticker,
            name,
            job_id: None,
            remove_on_complete: false,
            remove_on_fail: false,
        }
    }

    pub fn prewarm(ticker: TickerSymbol, date: NaiveDate) -> Self {
        let job_id = prewarm_job_id(&ticker, date);
        Self {
            kind: JobKind::PrewarmTicker,
            ticker,
            name: None,
            job_id: Some(job_id),
            remove_on_complete: true,
            remove_on_fail: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued { job_id: String },
    /// A job with the same id is already pending; nothing was added
    Deduplicated { job_id: String },
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            EnqueueOutcome::Queued { job_id } | EnqueueOutcome::Deduplicated { job_id } => job_id,
        }
    }
}
