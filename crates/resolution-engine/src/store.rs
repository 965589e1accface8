use dashmap::DashMap;
use std::sync::Arc;
use ticker_core::{normalize, AnalysisResult, TickerSymbol};

/// Per-session map of ticker -> last known analysis.
///
/// The fastest cache tier. Cloning yields another handle to the same map, so
/// the engine and the UI layer can share it; only the engine writes. Entries
/// live for the session, there is no eviction.
#[derive(Clone, Default)]
pub struct LocalResultStore {
    entries: Arc<DashMap<String, AnalysisResult>>,
}

impl LocalResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &TickerSymbol) -> Option<AnalysisResult> {
        self.entries.get(symbol.as_str()).map(|e| e.value().clone())
    }

    /// Lookup by a raw, possibly un-normalized symbol
    pub fn get_raw(&self, symbol: &str) -> Option<AnalysisResult> {
        self.entries.get(&normalize(symbol)).map(|e| e.value().clone())
    }

    /// Insert or replace the entry keyed by the result's ticker. Never merges.
    pub fn upsert(&self, result: AnalysisResult) -> Option<AnalysisResult> {
        self.entries.insert(result.ticker.as_str().to_string(), result)
    }

    pub fn remove(&self, symbol: &TickerSymbol) -> Option<AnalysisResult> {
        self.entries.remove(symbol.as_str()).map(|(_, v)| v)
    }

    pub fn contains(&self, symbol: &TickerSymbol) -> bool {
        self.entries.contains_key(symbol.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted list of stored tickers
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }
}

impl std::fmt::Debug for LocalResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalResultStore")
            .field("symbols", &self.symbols())
            .finish()
    }
}
