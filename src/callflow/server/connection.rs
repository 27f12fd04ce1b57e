//! One WebSocket connection, one session

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::callflow::session::{ClientEvent, ServerEvent, SessionEngine};

type WsSink = Arc<Mutex<futures::stream::SplitSink<WebSocket, Message>>>;

async fn send_event(sink: &WsSink, event: &ServerEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "failed to encode event");
            return true;
        }
    };
    sink.lock().await.send(Message::Text(json.into())).await.is_ok()
}

/// Pump frames between the socket and a fresh session until either side
/// stops. Closing the socket ends the session.
pub async fn handle_connection(socket: WebSocket, engine: SessionEngine) {
    let (ws_tx, mut ws_rx) = socket.split();
    let ws_tx: WsSink = Arc::new(Mutex::new(ws_tx));

    let (session, mut events) = engine.open();
    debug!(session = session.session_id(), "client connected");

    let forward_tx = ws_tx.clone();
    let forward = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if !send_event(&forward_tx, &event).await {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "WebSocket read error");
                break;
            }
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(ClientEvent::End) => break,
                Ok(event) => session.send(event),
                Err(e) => {
                    let error = ServerEvent::ApiError {
                        message: format!("Invalid frame: {}", e),
                    };
                    if !send_event(&ws_tx, &error).await {
                        break;
                    }
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    session.close().await;
    // Drains whatever the session emitted before it ended
    let _ = forward.await;
    debug!("client disconnected");
}
