//! Multi-level data-availability resolution for ticker analyses.
//!
//! The [`ResolutionEngine`] decides for a selected ticker whether data comes
//! from the in-process [`LocalResultStore`], the shared remote cache, or a
//! background computation announced over the notification channel.

pub mod config;
pub mod engine;
pub mod http;
pub mod hub;
pub mod socket;
pub mod store;

pub use config::{BackendConfig, EngineConfig};
pub use engine::{EngineDeps, FlowCommand, FlowNotice, FlowStatus, ResolutionEngine};
pub use http::HttpBackend;
pub use hub::TopicHub;
pub use socket::WsTransport;
pub use store::LocalResultStore;
