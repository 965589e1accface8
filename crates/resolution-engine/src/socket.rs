use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
};

use ticker_core::{
    topic_for, ClientFrame, FlowError, NotificationTransport, ServerFrame, Subscription,
    TickerSymbol,
};

use crate::config::BackendConfig;

const SUBSCRIPTION_BUFFER: usize = 16;

/// WebSocket client for the notification channel.
///
/// Each [`Subscription`] owns one connection joined to one ticker topic.
/// Closing the subscription aborts the reader task, which drops the socket.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
    session_token: Option<String>,
}

impl WsTransport {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            url: config.ws_url.clone(),
            session_token: config.session_token.clone(),
        }
    }
}

#[async_trait]
impl NotificationTransport for WsTransport {
    async fn open(&self, symbol: &TickerSymbol) -> Result<Subscription, FlowError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| FlowError::Subscription(format!("Invalid socket URL {}: {}", self.url, e)))?;
        if let Some(token) = &self.session_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| FlowError::Subscription(e.to_string()))?;
            request.headers_mut().insert("authorization", value);
        }

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| FlowError::Subscription(format!("Socket connect failed: {}", e)))?;
        let (mut write, mut read) = stream.split();

        let topic = topic_for(symbol.as_str());
        let join = serde_json::to_string(&ClientFrame::Subscribe { topic: topic.clone() })?;
        write
            .send(Message::Text(join))
            .await
            .map_err(|e| FlowError::Subscription(format!("Subscribe failed: {}", e)))?;
        tracing::info!("Socket subscribed to {}", topic);

        let (tx, events) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let reader = tokio::spawn(async move {
            // Holding the write half keeps the connection open for the reader's lifetime.
            let _write = write;
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(frame) if frame.is_job_completed() && frame.topic == topic => {
                            if tx.send(frame.data).await.is_err() {
                                break;
                            }
                        }
                        Ok(frame) => {
                            tracing::debug!("Ignoring {} frame on topic {}", frame.event, frame.topic);
                        }
                        Err(e) => {
                            tracing::warn!("Unreadable socket frame on {}: {}", topic, e);
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Socket error on {}: {}", topic, e);
                        break;
                    }
                }
            }
            tracing::debug!("Socket reader for {} finished", topic);
        });

        Ok(Subscription::new(symbol.clone(), events, move || reader.abort()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade},
        response::IntoResponse,
        routing::get,
        Router,
    };
    use serde_json::json;
    use std::time::Duration;

    async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
        ws.on_upgrade(serve_socket)
    }

    /// Waits for a subscribe frame, then sends noise followed by the real completion.
    async fn serve_socket(mut socket: WebSocket) {
        let topic = loop {
            match socket.recv().await {
                Some(Ok(AxumMessage::Text(text))) => {
                    if let Ok(ClientFrame::Subscribe { topic }) = serde_json::from_str(&text) {
                        break topic;
                    }
                }
                _ => return,
            }
        };

        let stray = json!({ "event": "job-completed", "topic": "OTHER", "data": { "ticker": "OTHER" } });
        let noise = "not json".to_string();
        let real = json!({
            "event": "job-completed",
            "topic": topic,
            "data": { "ticker": topic, "last_updated": "2024-06-01T12:00:00Z" }
        });
        for frame in [stray.to_string(), noise, real.to_string()] {
            if socket.send(AxumMessage::Text(frame)).await.is_err() {
                return;
            }
        }
        while socket.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn test_subscription_receives_matching_completion() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/ws", get(ws_handler)))
                .await
                .unwrap();
        });

        let transport = WsTransport::new(&BackendConfig {
            ws_url: format!("ws://{}/ws", addr),
            ..Default::default()
        });
        let mut sub = transport.open(&TickerSymbol::parse("aapl").unwrap()).await.unwrap();

        let payload = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload["ticker"], "AAPL");
        sub.close();
    }

    #[tokio::test]
    async fn test_connect_failure_is_subscription_error() {
        let transport = WsTransport::new(&BackendConfig {
            ws_url: "ws://127.0.0.1:9/ws".to_string(),
            ..Default::default()
        });
        assert!(matches!(
            transport.open(&TickerSymbol::parse("AAPL").unwrap()).await,
            Err(FlowError::Subscription(_))
        ));
    }
}
