//! Process-local cache and queue for running without Redis.
//!
//! Nothing consumes the queue here; jobs only accumulate until drained. Used
//! for local development (`REDIS_URL=memory`) and in tests.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ticker_core::{
    AnalysisResult, EnqueueOutcome, FlowError, JobQueue, JobRequest, ResultCache, TickerSymbol,
};

#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw entry as-is, bypassing serialization
    pub fn insert_raw(&self, symbol: &TickerSymbol, raw: impl Into<String>, ttl: Duration) {
        self.entries
            .insert(symbol.to_string(), (raw.into(), Instant::now() + ttl));
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get_raw(&self, symbol: &TickerSymbol) -> Result<Option<String>, FlowError> {
        let key = symbol.to_string();
        let expired = match self.entries.get(&key) {
            Some(entry) if entry.1 > Instant::now() => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(&key);
        }
        Ok(None)
    }

    async fn put(&self, result: &AnalysisResult, ttl: Duration) -> Result<(), FlowError> {
        let payload = serde_json::to_string(result)?;
        self.insert_raw(&result.ticker, payload, ttl);
        Ok(())
    }
}

#[derive(Clone)]
pub struct MemoryJobQueue {
    claimed: Arc<DashMap<String, Instant>>,
    pending: Arc<Mutex<Vec<(String, JobRequest)>>>,
    next_id: Arc<AtomicU64>,
    dedup_ttl: Duration,
}

impl MemoryJobQueue {
    pub fn new(dedup_ttl: Duration) -> Self {
        Self {
            claimed: Arc::new(DashMap::new()),
            pending: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            dedup_ttl,
        }
    }

    /// Remove and return every queued job, oldest first
    pub fn drain(&self) -> Vec<(String, JobRequest)> {
        match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: JobRequest) -> Result<EnqueueOutcome, FlowError> {
        let job_id = job
            .job_id
            .clone()
            .unwrap_or_else(|| self.next_id.fetch_add(1, Ordering::SeqCst).to_string());

        let now = Instant::now();
        let mut fresh = false;
        self.claimed
            .entry(job_id.clone())
            .and_modify(|expires| {
                if *expires <= now {
                    *expires = now + self.dedup_ttl;
                    fresh = true;
                }
            })
            .or_insert_with(|| {
                fresh = true;
                now + self.dedup_ttl
            });
        if !fresh {
            return Ok(EnqueueOutcome::Deduplicated { job_id });
        }

        self.pending
            .lock()
            .map_err(|_| FlowError::Queue("queue lock poisoned".into()))?
            .push((job_id.clone(), job));
        Ok(EnqueueOutcome::Queued { job_id })
    }
}
