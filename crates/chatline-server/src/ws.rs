//! Websocket endpoint for live events.
//!
//! A client connects with `?user_id=`, receives a `connected` event, and then
//! gets every event the service pushes to that user. Inbound frames carry
//! typing signals and pings, as JSON text or length-prefixed MessagePack.

use crate::error::ApiError;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use bytes::BytesMut;
use chatline_core::{ConnectionHandle, ConnectionId};
use chatline_protocol::{codec, ClientSignal, Encoding, ProtocolError, ServerEvent, UserId};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handshake query parameters.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    user_id: Option<String>,
}

/// Websocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let user = params
        .user_id
        .filter(|id| !id.trim().is_empty())
        .map(UserId::new)
        .ok_or(ApiError::Unauthenticated)?;

    Ok(ws.on_upgrade(move |socket| handle_websocket(socket, user, state)))
}

/// Encode an event in the connection's wire format.
fn encode_event(event: &ServerEvent, encoding: Encoding) -> Result<WsMessage, ProtocolError> {
    match encoding {
        Encoding::Json => codec::encode_text(event).map(WsMessage::Text),
        Encoding::Msgpack => codec::encode(event).map(|data| WsMessage::Binary(data.to_vec())),
    }
}

/// Handle a websocket connection.
async fn handle_websocket(socket: WebSocket, user: UserId, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let encoding = state.config.transport.encoding;

    let connection_id = ConnectionId::generate();
    let (handle, mut events) = ConnectionHandle::channel(connection_id.clone());

    debug!(user = %user, connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    state.service.connect(&user, handle.clone()).await;

    // Read buffer for partial binary frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            Some(event) = events.recv() => {
                let kind = event.kind().as_str();
                match encode_event(&event, encoding) {
                    Ok(frame) => {
                        metrics::record_event_pushed(kind);
                        if sender.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(connection = %connection_id, event = kind, error = %e, "Failed to encode event");
                        metrics::record_error("encode");
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        match codec::decode_text::<ClientSignal>(&text) {
                            Ok(signal) => handle_signal(signal, &user, &state, &handle),
                            Err(e) => reject_frame(&handle, &connection_id, &e),
                        }
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        read_buffer.extend_from_slice(&data);
                        loop {
                            match codec::decode_from::<ClientSignal>(&mut read_buffer) {
                                Ok(Some(signal)) => handle_signal(signal, &user, &state, &handle),
                                Ok(None) => break,
                                Err(e) => {
                                    read_buffer.clear();
                                    reject_frame(&handle, &connection_id, &e);
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sender.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    state.service.disconnect(&user, &connection_id).await;
    debug!(user = %user, connection = %connection_id, "WebSocket disconnected");
}

/// Act on a signal from the connected user.
fn handle_signal(signal: ClientSignal, user: &UserId, state: &AppState, handle: &ConnectionHandle) {
    match signal {
        ClientSignal::Typing { receiver_id } => {
            state.service.typing(user, &receiver_id);
        }
        ClientSignal::StopTyping { receiver_id } => {
            state.service.stop_typing(user, &receiver_id);
        }
        ClientSignal::Ping { timestamp } => {
            handle.send(ServerEvent::Pong { timestamp });
        }
    }
}

fn reject_frame(handle: &ConnectionHandle, connection_id: &ConnectionId, error: &ProtocolError) {
    warn!(connection = %connection_id, error = %error, "Invalid client frame");
    metrics::record_error("protocol");
    handle.send(ServerEvent::error(400, error.to_string()));
}
