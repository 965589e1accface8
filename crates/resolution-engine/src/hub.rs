use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use ticker_core::{
    topic_for, AnalysisResult, FlowError, NotificationTransport, Subscription, TickerSymbol,
};

const TOPIC_CAPACITY: usize = 64;
const SUBSCRIPTION_BUFFER: usize = 16;

/// In-process publish/subscribe fan-out keyed by ticker topic.
///
/// The server uses it to route worker completions to connected sockets; it
/// also works directly as a [`NotificationTransport`] when engine and hub
/// share a process.
#[derive(Clone, Default)]
pub struct TopicHub {
    topics: Arc<DashMap<String, broadcast::Sender<serde_json::Value>>>,
}

impl TopicHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a topic, creating it on first use
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<serde_json::Value> {
        self.topics
            .entry(topic_for(topic))
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Deliver a payload to every current member of the topic.
    /// Returns the number of receivers reached.
    pub fn publish(&self, topic: &str, payload: serde_json::Value) -> usize {
        let topic = topic_for(topic);
        match self.topics.get(&topic) {
            Some(tx) => tx.send(payload).unwrap_or(0),
            None => {
                tracing::debug!("No listeners on topic {}", topic);
                0
            }
        }
    }

    pub fn publish_completion(&self, result: &AnalysisResult) -> Result<usize, FlowError> {
        let payload = serde_json::to_value(result)?;
        let reached = self.publish(result.ticker.as_str(), payload);
        tracing::info!("Completion for {} delivered to {} listener(s)", result.ticker, reached);
        Ok(reached)
    }

    pub fn receiver_count(&self, topic: &str) -> usize {
        self.topics
            .get(&topic_for(topic))
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Drop topics nobody listens to anymore
    pub fn prune(&self) {
        self.topics.retain(|_, tx| tx.receiver_count() > 0);
    }
}

#[async_trait]
impl NotificationTransport for TopicHub {
    async fn open(&self, symbol: &TickerSymbol) -> Result<Subscription, FlowError> {
        let mut rx = self.subscribe(symbol.as_str());
        let (tx, events) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let topic = symbol.to_string();

        let forwarder = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Subscription for {} lagged, {} event(s) dropped", topic, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(symbol.clone(), events, move || forwarder.abort()))
    }
}
