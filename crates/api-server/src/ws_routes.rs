use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use resolution_engine::TopicHub;
use ticker_core::{topic_for, ClientFrame, ServerFrame, JOB_COMPLETED_EVENT};

use crate::AppState;

const OUTBOUND_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// WebSocket handler: /ws
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/ws",
    responses((status = 101, description = "WebSocket upgrade for job-completed notifications")),
    tag = "System"
)]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: TopicHub) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    // Single writer; topic forwarders feed it through the channel
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut topics: HashMap<String, JoinHandle<()>> = HashMap::new();

    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue, // axum answers pings itself
        };

        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(ClientFrame::Subscribe { topic }) => {
                let topic = topic_for(&topic);
                if topic.is_empty() || topics.contains_key(&topic) {
                    continue;
                }
                tracing::debug!("Socket joined {}", topic);
                let forwarder = spawn_forwarder(hub.subscribe(&topic), topic.clone(), out_tx.clone());
                topics.insert(topic, forwarder);
            }
            Ok(ClientFrame::Unsubscribe { topic }) => {
                if let Some(forwarder) = topics.remove(&topic_for(&topic)) {
                    forwarder.abort();
                }
            }
            Err(e) => tracing::warn!("Ignoring unreadable client frame: {}", e),
        }
    }

    for (_, forwarder) in topics.drain() {
        forwarder.abort();
    }
    writer.abort();
    hub.prune();
    tracing::debug!("Socket disconnected");
}

fn spawn_forwarder(
    mut rx: broadcast::Receiver<serde_json::Value>,
    topic: String,
    out: mpsc::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let data = match rx.recv().await {
                Ok(data) => data,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Socket lagged on {}, {} event(s) dropped", topic, skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let frame = ServerFrame {
                event: JOB_COMPLETED_EVENT.to_string(),
                topic: topic.clone(),
                data,
            };
            let Ok(json) = serde_json::to_string(&frame) else {
                continue;
            };
            if out.send(json).await.is_err() {
                break;
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}
