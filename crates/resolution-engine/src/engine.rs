use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use ticker_core::{
    AnalysisResult, CacheLookup, FetchOutcome, FlowError, HistorySink, InstrumentRef,
    NotificationTransport, RemoteCache, Subscription, TickerFetcher, TickerSymbol,
};

use crate::config::{BackendConfig, EngineConfig};
use crate::http::HttpBackend;
use crate::socket::WsTransport;
use crate::store::LocalResultStore;

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;

/// Where a resolution request currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Idle,
    CheckingCache,
    ConfirmationNeeded,
    Loading,
    Analyzing,
    Success,
    Error,
}

impl FlowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStatus::Idle => "idle",
            FlowStatus::CheckingCache => "checking_cache",
            FlowStatus::ConfirmationNeeded => "confirmation_needed",
            FlowStatus::Loading => "loading",
            FlowStatus::Analyzing => "analyzing",
            FlowStatus::Success => "success",
            FlowStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Out-of-band updates for the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum FlowNotice {
    /// Every state transition, in order
    Status(FlowStatus),
    /// A background analysis finished. `is_active` tells whether it is the
    /// ticker on screen; otherwise the UI may offer to switch to it.
    AnalysisReady {
        ticker: TickerSymbol,
        current_price: Option<f64>,
        is_active: bool,
    },
    /// The active request failed. `retriable` is false for failures a manual
    /// retry cannot fix, such as a rejected session.
    Error { message: String, retriable: bool },
}

/// Input for the session driver, see [`ResolutionEngine::run`]
#[derive(Debug, Clone)]
pub enum FlowCommand {
    Select(Option<InstrumentRef>),
    Confirm,
    Refresh,
    Reset,
    Shutdown,
}

/// External collaborators the engine talks to
#[derive(Clone)]
pub struct EngineDeps {
    pub remote_cache: Arc<dyn RemoteCache>,
    pub fetcher: Arc<dyn TickerFetcher>,
    pub transport: Arc<dyn NotificationTransport>,
    pub history: Option<Arc<dyn HistorySink>>,
}

impl EngineDeps {
    /// HTTP backend for cache and fetch plus the WebSocket notification
    /// channel. History is recorded only when a record store URL is configured.
    pub fn http(config: &BackendConfig) -> Result<Self, FlowError> {
        let backend = Arc::new(HttpBackend::new(config)?);
        let history: Option<Arc<dyn HistorySink>> = match config.history_url {
            Some(_) => Some(backend.clone()),
            None => None,
        };
        Ok(Self {
            remote_cache: backend.clone(),
            fetcher: backend,
            transport: Arc::new(WsTransport::new(config)),
            history,
        })
    }
}

/// Decides how to obtain the analysis for the selected ticker: local store,
/// remote cache, or a confirmed background computation announced over the
/// notification channel.
///
/// At most one subscription is open at a time. It outlives a symbol switch
/// until its event arrives or a newer subscription replaces it, so a result
/// for an abandoned ticker still lands in the store.
pub struct ResolutionEngine {
    deps: EngineDeps,
    config: EngineConfig,
    store: LocalResultStore,
    selected: Option<InstrumentRef>,
    status: FlowStatus,
    data: Option<AnalysisResult>,
    error: Option<String>,
    subscription: Option<Subscription>,
    wait_deadline: Option<Instant>,
    refresh_pending: bool,
    notices: mpsc::UnboundedSender<FlowNotice>,
}

impl ResolutionEngine {
    pub fn new(
        deps: EngineDeps,
        store: LocalResultStore,
        config: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<FlowNotice>) {
        let (notices, rx) = mpsc::unbounded_channel();
        let engine = Self {
            deps,
            config,
            store,
            selected: None,
            status: FlowStatus::Idle,
            data: None,
            error: None,
            subscription: None,
            wait_deadline: None,
            refresh_pending: false,
            notices,
        };
        (engine, rx)
    }

    pub fn status(&self) -> FlowStatus {
        self.status
    }

    /// Data currently on screen
    pub fn data(&self) -> Option<&AnalysisResult> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn active_symbol(&self) -> Option<&TickerSymbol> {
        self.selected.as_ref().map(|i| &i.symbol)
    }

    pub fn subscribed_symbol(&self) -> Option<&TickerSymbol> {
        self.subscription.as_ref().map(|s| s.symbol())
    }

    pub fn store(&self) -> &LocalResultStore {
        &self.store
    }

    /// Change the selected instrument and resolve it as far as possible
    /// without user consent: local store, then remote cache, then stop at
    /// `confirmation_needed`.
    pub async fn select(&mut self, instrument: Option<InstrumentRef>) -> FlowStatus {
        let Some(instrument) = instrument else {
            self.selected = None;
            self.data = None;
            self.error = None;
            self.set_status(FlowStatus::Idle);
            return self.status;
        };
        let symbol = instrument.symbol.clone();

        if self.data.as_ref().is_some_and(|d| d.ticker == symbol) {
            self.selected = Some(instrument);
            return self.status;
        }

        // A pending refresh only applies to the ticker it was requested for
        if !self.is_active(&symbol) {
            self.refresh_pending = false;
        }
        self.selected = Some(instrument);
        self.data = None;
        self.error = None;

        if let Some(local) = self.store.get(&symbol) {
            tracing::info!("{}: found in local store", symbol);
            self.show(local);
            return self.status;
        }

        self.set_status(FlowStatus::CheckingCache);
        match self.deps.remote_cache.lookup(&symbol).await {
            Ok(CacheLookup::Hit(result)) => {
                tracing::info!("{}: found in remote cache", symbol);
                self.store.upsert(result.clone());
                self.show(result);
                return self.status;
            }
            Ok(CacheLookup::Miss) => {
                tracing::debug!("{}: remote cache miss", symbol);
            }
            Err(e) => {
                tracing::warn!("{}: remote cache unavailable, treating as miss: {}", symbol, e);
            }
        }

        tracing::info!("{}: no cached analysis, asking for confirmation", symbol);
        self.set_status(FlowStatus::ConfirmationNeeded);
        self.status
    }

    /// User consent to compute. Valid from `confirmation_needed`, or from
    /// `error` as a manual retry.
    pub async fn confirm(&mut self) -> FlowStatus {
        let Some(instrument) = self.selected.clone() else {
            return self.status;
        };
        if !matches!(self.status, FlowStatus::ConfirmationNeeded | FlowStatus::Error) {
            tracing::debug!("Ignoring confirm for {} in state {}", instrument.symbol, self.status);
            return self.status;
        }

        self.error = None;
        self.set_status(FlowStatus::Loading);
        let refresh = std::mem::take(&mut self.refresh_pending);
        tracing::info!("{}: confirmed, fetching (refresh: {})", instrument.symbol, refresh);

        match self.deps.fetcher.fetch(&instrument, refresh).await {
            Ok(FetchOutcome::Ready(result)) if result.ticker != instrument.symbol => {
                self.fail(FlowError::MalformedPayload(format!(
                    "requested {} but received {}",
                    instrument.symbol, result.ticker
                )));
            }
            Ok(FetchOutcome::Ready(result)) => {
                tracing::info!("{}: analysis returned inline", instrument.symbol);
                self.store.upsert(result.clone());
                self.show(result);
                self.record_history(&instrument);
            }
            Ok(FetchOutcome::Processing) => {
                tracing::info!("{}: analysis queued, waiting for completion event", instrument.symbol);
                self.open_subscription(&instrument.symbol).await;
            }
            Err(e) => self.fail(e),
        }
        self.status
    }

    /// Forget the active ticker's local entry and return to `idle`. The next
    /// selection runs a full cache check; a subsequent fetch asks the backend
    /// to bypass its cache.
    pub fn refresh(&mut self) -> FlowStatus {
        if let Some(symbol) = self.active_symbol().cloned() {
            tracing::info!("{}: refresh, clearing local entry", symbol);
            self.store.remove(&symbol);
            self.refresh_pending = true;
        }
        self.data = None;
        self.error = None;
        self.set_status(FlowStatus::Idle);
        self.status
    }

    pub fn reset(&mut self) {
        self.close_subscription();
        self.data = None;
        self.error = None;
        self.refresh_pending = false;
        self.set_status(FlowStatus::Idle);
    }

    /// Wait for the open subscription to deliver a completion and commit it.
    ///
    /// Returns the ticker whose result was applied, or `None` when no
    /// subscription is open or the wait ended without a result. Malformed
    /// payloads and payloads for another ticker are skipped.
    ///
    /// Cancel-safe: the subscription stays open until the wait is settled, so
    /// a call dropped mid-way (including during the timeout fallback lookup)
    /// resumes on the next call.
    pub async fn next_notification(&mut self) -> Option<TickerSymbol> {
        loop {
            let deadline = self.wait_deadline;
            let sub = self.subscription.as_mut()?;
            let symbol = sub.symbol().clone();

            let received = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, sub.recv()).await.ok(),
                None => Some(sub.recv().await),
            };
            let Some(received) = received else {
                return self.on_wait_timeout(symbol).await;
            };

            let Some(payload) = received else {
                tracing::warn!("{}: notification channel closed", symbol);
                self.close_subscription();
                if self.is_active(&symbol) && self.status == FlowStatus::Analyzing {
                    self.fail(FlowError::Subscription(format!(
                        "lost notification channel while waiting for {}",
                        symbol
                    )));
                }
                return None;
            };

            let result = match AnalysisResult::from_value(payload) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("{}: ignoring malformed completion event: {}", symbol, e);
                    continue;
                }
            };
            if result.ticker != symbol {
                tracing::warn!("{}: ignoring completion event for {}", symbol, result.ticker);
                continue;
            }

            self.apply_completion(result);
            return Some(symbol);
        }
    }

    /// Commit a finished analysis. Always cached; shown only when its ticker
    /// is the one selected.
    pub fn apply_completion(&mut self, result: AnalysisResult) {
        let ticker = result.ticker.clone();
        let current_price = result.current_price();

        if self.subscribed_symbol() == Some(&ticker) {
            self.close_subscription();
        }
        self.store.upsert(result.clone());

        let is_active = self.is_active(&ticker);
        if is_active {
            tracing::info!("{}: analysis ready, updating view", ticker);
            self.show(result);
            if let Some(instrument) = self.selected.clone() {
                self.record_history(&instrument);
            }
        } else {
            tracing::info!(
                "{}: analysis ready in background, view stays on {:?}",
                ticker,
                self.active_symbol().map(|s| s.as_str())
            );
        }

        let _ = self.notices.send(FlowNotice::AnalysisReady {
            ticker,
            current_price,
            is_active,
        });
    }

    /// Session driver: applies commands in order and delivers notifications
    /// in between, until `Shutdown` or the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<FlowCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(FlowCommand::Select(instrument)) => {
                        self.select(instrument).await;
                    }
                    Some(FlowCommand::Confirm) => {
                        self.confirm().await;
                    }
                    Some(FlowCommand::Refresh) => {
                        let selected = self.selected.clone();
                        self.refresh();
                        if selected.is_some() {
                            self.select(selected).await;
                        }
                    }
                    Some(FlowCommand::Reset) => self.reset(),
                    Some(FlowCommand::Shutdown) | None => break,
                },
                _ = self.next_notification(), if self.subscription.is_some() => {}
            }
        }
        self.close_subscription();
        tracing::debug!("Resolution session ended");
    }

    async fn open_subscription(&mut self, symbol: &TickerSymbol) {
        if let Some(previous) = self.subscription.take() {
            tracing::info!("Replacing subscription for {} with {}", previous.symbol(), symbol);
            previous.close();
        }
        self.wait_deadline = None;

        match self.deps.transport.open(symbol).await {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.wait_deadline = self
                    .config
                    .analysis_wait_timeout
                    .map(|timeout| Instant::now() + timeout);
                self.set_status(FlowStatus::Analyzing);
            }
            Err(e) => self.fail(e),
        }
    }

    async fn on_wait_timeout(&mut self, symbol: TickerSymbol) -> Option<TickerSymbol> {
        if !(self.is_active(&symbol) && self.status == FlowStatus::Analyzing) {
            self.close_subscription();
            tracing::info!("{}: stopped waiting for background analysis", symbol);
            return None;
        }

        tracing::warn!("{}: no completion event in time, checking remote cache once", symbol);
        // Closed only after the lookup settles; an interrupted lookup is retried
        let lookup = self.deps.remote_cache.lookup(&symbol).await;
        self.close_subscription();
        match lookup {
            Ok(CacheLookup::Hit(result)) => {
                self.apply_completion(result);
                Some(symbol)
            }
            Ok(CacheLookup::Miss) | Err(_) => {
                self.fail(FlowError::Timeout(format!(
                    "analysis for {} did not complete in time",
                    symbol
                )));
                None
            }
        }
    }

    fn close_subscription(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.close();
        }
        self.wait_deadline = None;
    }

    fn is_active(&self, symbol: &TickerSymbol) -> bool {
        self.active_symbol() == Some(symbol)
    }

    /// Always announced, even from `success`: the ticker on screen changed.
    fn show(&mut self, result: AnalysisResult) {
        self.data = Some(result);
        self.error = None;
        self.emit_status(FlowStatus::Success);
    }

    fn fail(&mut self, error: FlowError) {
        let message = error.to_string();
        let retriable = error.is_retriable();
        tracing::error!(
            "Resolution failed for {:?}: {}",
            self.active_symbol().map(|s| s.as_str()),
            message
        );
        self.error = Some(message.clone());
        self.set_status(FlowStatus::Error);
        let _ = self.notices.send(FlowNotice::Error { message, retriable });
    }

    fn set_status(&mut self, next: FlowStatus) {
        if self.status != next {
            self.emit_status(next);
        }
    }

    fn emit_status(&mut self, next: FlowStatus) {
        tracing::debug!("Flow status {} -> {}", self.status, next);
        self.status = next;
        let _ = self.notices.send(FlowNotice::Status(next));
    }

    /// Fire-and-forget; failures only logged
    fn record_history(&self, instrument: &InstrumentRef) {
        let Some(history) = self.deps.history.clone() else {
            return;
        };
        let instrument = instrument.clone();
        tokio::spawn(async move {
            if let Err(e) = history.record(&instrument).await {
                tracing::warn!("Failed to record history for {}: {}", instrument.symbol, e);
            }
        });
    }
}
