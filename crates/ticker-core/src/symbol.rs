use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::FlowError;

/// Trim and upper-case a raw symbol. Every lookup and comparison goes through this.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// A normalized ticker symbol (e.g. `AAPL`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TickerSymbol(String);

impl TickerSymbol {
    pub fn parse(raw: &str) -> Result<Self, FlowError> {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return Err(FlowError::InvalidSymbol(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive, whitespace-tolerant comparison against a raw symbol.
    pub fn matches(&self, raw: &str) -> bool {
        self.0 == normalize(raw)
    }
}

impl fmt::Display for TickerSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TickerSymbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for TickerSymbol {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for TickerSymbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
