use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::{
    AnalysisResult, CacheLookup, EnqueueOutcome, FetchOutcome, FlowError, InstrumentRef,
    JobRequest, TickerSymbol,
};

/// Client view of the cross-session result cache
#[async_trait]
pub trait RemoteCache: Send + Sync {
    async fn lookup(&self, symbol: &TickerSymbol) -> Result<CacheLookup, FlowError>;
}

/// The synchronous fetch path: returns a ready result or reports the work as queued
#[async_trait]
pub trait TickerFetcher: Send + Sync {
    async fn fetch(&self, instrument: &InstrumentRef, refresh: bool) -> Result<FetchOutcome, FlowError>;
}

/// Publish/subscribe transport delivering completion events per ticker topic
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn open(&self, symbol: &TickerSymbol) -> Result<Subscription, FlowError>;
}

/// Records instruments the user viewed
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, instrument: &InstrumentRef) -> Result<(), FlowError>;
}

/// Server view of the shared cache. Entries are returned raw so callers decide
/// how to treat unparseable data.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get_raw(&self, symbol: &TickerSymbol) -> Result<Option<String>, FlowError>;
    async fn put(&self, result: &AnalysisResult, ttl: Duration) -> Result<(), FlowError>;
}

/// Durable work queue consumed by the analysis worker
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: JobRequest) -> Result<EnqueueOutcome, FlowError>;
}

type CloseHook = Box<dyn FnOnce() + Send + Sync>;

/// An open listen on the notification channel for exactly one ticker.
///
/// Closing (explicitly or by drop) runs the transport's teardown hook once,
/// so abandoning a subscription can never leak a listener.
pub struct Subscription {
    symbol: TickerSymbol,
    events: mpsc::Receiver<serde_json::Value>,
    on_close: Option<CloseHook>,
}

impl Subscription {
    pub fn new(
        symbol: TickerSymbol,
        events: mpsc::Receiver<serde_json::Value>,
        on_close: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            symbol,
            events,
            on_close: Some(Box::new(on_close)),
        }
    }

    pub fn symbol(&self) -> &TickerSymbol {
        &self.symbol
    }

    /// Next raw event payload. `None` once the transport side has gone away.
    /// Cancel-safe.
    pub async fn recv(&mut self) -> Option<serde_json::Value> {
        self.events.recv().await
    }

    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(hook) = self.on_close.take() {
            tracing::debug!("Closing subscription for {}", self.symbol);
            self.events.close();
            hook();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("symbol", &self.symbol)
            .field("open", &self.on_close.is_some())
            .finish()
    }
}
