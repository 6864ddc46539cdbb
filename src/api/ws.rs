//! `/ws`: client sessions for realtime notification signals.
//!
//! A client connects, sends `{"event":"join","userId":"..."}`, and from then
//! on receives every realtime message addressed to that user. Frames the
//! server does not recognise are ignored.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::notification::realtime::{ConnectionId, ConnectionRegistry, RealtimeMessage};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum ClientFrame {
    #[serde(alias = "register")]
    Join {
        #[serde(rename = "userId", alias = "user_id")]
        user_id: String,
    },
    Leave,
    Ping,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| session(socket, state))
}

async fn session(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = Uuid::new_v4();
    let registry = state.pipeline.realtime().registry().clone();
    let (tx, mut rx) = mpsc::unbounded_channel::<RealtimeMessage>();
    let (mut sink, mut stream) = socket.split();
    let started = Instant::now();
    let mut frames_in: u64 = 0;

    debug!(%conn_id, "realtime: client connected");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(message) = outbound else { break };
                let text = match serde_json::to_string(&message) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(%conn_id, error = %e, "realtime: frame serialize error");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        frames_in += 1;
                        let reply = match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(frame) => handle_frame(frame, conn_id, &tx, &registry),
                            Err(e) => {
                                debug!(%conn_id, error = %e, "realtime: ignoring unrecognised frame");
                                None
                            }
                        };
                        if let Some(reply) = reply {
                            if tx.send(reply).is_err() {
                                break;
                            }
                        }
                    }
                    // axum answers protocol pings itself
                    Some(Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                }
            }
        }
    }

    registry.unregister(conn_id);
    info!(
        %conn_id,
        frames_in,
        duration_ms = started.elapsed().as_millis() as u64,
        "realtime: session ended"
    );
}

fn handle_frame(
    frame: ClientFrame,
    conn_id: ConnectionId,
    tx: &mpsc::UnboundedSender<RealtimeMessage>,
    registry: &ConnectionRegistry,
) -> Option<RealtimeMessage> {
    match frame {
        ClientFrame::Join { user_id } => {
            let user_id = user_id.trim();
            if user_id.is_empty() {
                return Some(RealtimeMessage::new(
                    "error",
                    json!({ "message": "userId must not be empty" }),
                ));
            }
            registry.register(user_id, conn_id, tx.clone());
            Some(RealtimeMessage::new("joined", json!({ "userId": user_id })))
        }
        ClientFrame::Leave => {
            registry.unregister(conn_id);
            Some(RealtimeMessage::new("left", json!({})))
        }
        ClientFrame::Ping => Some(RealtimeMessage::new("pong", json!({}))),
    }
}
