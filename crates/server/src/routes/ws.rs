//! The proxy WebSocket.
//!
//! `GET /ws/{user_id}` upgrades into the persistent per-user channel the
//! router multiplexes proxy requests over. The handshake is authenticated
//! with a gateway session token (query `token` or bearer header); a token
//! that does not match the path user closes with 4401. The pump here owns
//! the socket: one writer task draining the router's outbound queue, one
//! read loop feeding frames back, and the ping/pong liveness check.

use axum::{
    Router,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket},
    },
    http::HeaderMap,
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use services::services::proxy::router::{CLOSE_UNAUTHORIZED, PING_INTERVAL, PONG_TIMEOUT};
use services::services::proxy::{OutboundFrame, WireMessage};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::AppState;
use crate::middleware::session::{bearer_token, verify_session_token};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: Option<String>,
}

async fn ws_upgrade(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = query
        .token
        .clone()
        .or_else(|| bearer_token(&headers).map(str::to_string));
    let authenticated = token
        .as_deref()
        .and_then(|t| verify_session_token(&state.config.jwt_secret, t).ok());

    match authenticated {
        Some(token_user) if token_user == user_id => {
            ws.on_upgrade(move |socket| handle_socket(state, user_id, socket))
        }
        _ => {
            tracing::warn!("ws handshake for user {} failed authentication", user_id);
            ws.on_upgrade(reject_socket)
        }
    }
}

async fn reject_socket(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_UNAUTHORIZED,
            reason: "session token does not match this user".into(),
        })))
        .await;
}

async fn handle_socket(state: AppState, user_id: Uuid, socket: WebSocket) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(64);
    let session = state.proxy.register(user_id, outbound_tx.clone());
    let session_id = session.session_id;
    tracing::info!("proxy socket connected for user {}", user_id);

    let (mut sink, mut stream) = socket.split();

    // Serialized writer: the only task touching the sink.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            match frame {
                OutboundFrame::Text(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                OutboundFrame::Close { code, reason } => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
                        .await;
                    break;
                }
            }
        }
    });

    let mut ping_interval =
        tokio::time::interval_at(tokio::time::Instant::now() + PING_INTERVAL, PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut ping_sent_at: Option<std::time::Instant> = None;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    loop {
        let armed_deadline = pong_deadline;
        let pong_check = async move {
            match armed_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        state.proxy.handle_frame(user_id, text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("ws receive error for user {}: {}", user_id, e);
                        break;
                    }
                }
            }
            _ = ping_interval.tick() => {
                let ping = WireMessage::Ping { timestamp: chrono::Utc::now().timestamp_millis() };
                if let Ok(frame) = serde_json::to_string(&ping) {
                    if outbound_tx.send(OutboundFrame::Text(frame)).await.is_err() {
                        break;
                    }
                }
                ping_sent_at = Some(std::time::Instant::now());
                pong_deadline = Some(tokio::time::Instant::now() + PONG_TIMEOUT);
            }
            _ = pong_check => {
                let answered = match (ping_sent_at, session.last_pong()) {
                    (Some(sent), Some(pong)) => pong >= sent,
                    (None, _) => true,
                    _ => false,
                };
                if answered {
                    pong_deadline = None;
                } else {
                    tracing::warn!("user {} missed pong deadline; closing proxy socket", user_id);
                    break;
                }
            }
        }
    }

    state.proxy.unregister(user_id, session_id);
    writer.abort();
    tracing::info!("proxy socket closed for user {}", user_id);
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/{user_id}", get(ws_upgrade))
}
