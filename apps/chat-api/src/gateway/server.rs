//! WebSocket upgrade handler and per-connection pumps.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::auth::middleware::bearer_token;
use crate::auth::tokens;
use crate::dispatch::SendMessage;
use crate::error::ApiError;
use crate::AppState;

use super::events::{self, AckKind, ClientFrame};
use super::session::ConnectionSession;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

#[derive(Debug, Deserialize)]
struct WsParams {
    token: Option<String>,
}

/// Upgrade to WebSocket. The bearer token comes from the Authorization
/// header or, for browser clients that cannot set one, a `token` query
/// parameter.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)
        .map(str::to_string)
        .or(params.token)
        .ok_or_else(|| ApiError::unauthorized("Missing credentials"))?;

    let data = tokens::lookup_token(state.kv.as_ref(), &token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, data.user_id)))
}

/// Drive one connection until either pump fails, then unregister exactly once.
async fn handle_connection(socket: WebSocket, state: AppState, identity: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (session, mut outbound) = ConnectionSession::channel(identity.clone());
    let session_id = session.session_id.clone();

    tracing::info!(%session_id, user_id = %identity, "gateway connection established");

    state.hub.register(session);

    loop {
        tokio::select! {
            // Outbound flush: drain the queue in order; a write failure
            // terminates the session.
            queued = outbound.recv() => {
                match queued {
                    Some(payload) => {
                        if ws_tx.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    // Queue closed: the hub evicted this session or a
                    // reconnect replaced it.
                    None => break,
                }
            }

            // Inbound decode: acknowledgements and chat envelopes; malformed
            // frames are silently ignored.
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state, &identity, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // ping/pong/binary
                    Some(Err(err)) => {
                        tracing::debug!(?err, %session_id, "ws read error");
                        break;
                    }
                }
            }
        }
    }

    state.hub.unregister(session_id.clone());

    tracing::info!(%session_id, user_id = %identity, "gateway connection closed");
}

async fn handle_frame(state: &AppState, identity: &str, text: &str) {
    match events::decode_frame(text) {
        ClientFrame::Ack { kind, message_id } => {
            // The acknowledging recipient is always the session's own
            // identity, never whatever the payload claims.
            let result = match kind {
                AckKind::Delivered => state.coordinator.mark_delivered(message_id, identity).await,
                AckKind::Read => state.coordinator.mark_read(message_id, identity).await,
            };
            if let Err(err) = result {
                tracing::debug!(message_id, user_id = %identity, code = %err.code, "ack rejected");
            }
        }
        ClientFrame::Chat(frame) => {
            if let Err(err) = state
                .dispatcher
                .send(identity, SendMessage::from(frame))
                .await
            {
                tracing::debug!(user_id = %identity, code = %err.code, "inbound chat frame rejected");
            }
        }
        ClientFrame::Unknown => {
            tracing::trace!(user_id = %identity, "ignoring unrecognized frame");
        }
    }
}
