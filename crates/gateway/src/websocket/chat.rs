//! Room WebSocket handler
//!
//! Each socket gets a fresh [`ConnectionId`] and a bounded outbound queue
//! drained by a writer task. The receive loop turns client events into hub
//! calls; errors go back to this connection only.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use huddle_chats::{ChatError, ClientEvent, ConnectionId, ServerEvent};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::state::GatewayState;

/// What the receive loop does after an event was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Per-socket state owned by the receive loop
struct Session {
    connection_id: ConnectionId,
    remote_address: SocketAddr,
    joined: bool,
    out_tx: mpsc::Sender<ServerEvent>,
}

/// Room WebSocket connection handler
pub async fn chat_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    if state.hub.is_closing() {
        return GatewayError::ServiceUnavailable.into_response();
    }

    let remote_address = connect_info
        .map(|ConnectInfo(addr)| addr)
        .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));

    ws.on_upgrade(move |socket| handle_socket(socket, state, remote_address))
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>, remote_address: SocketAddr) {
    let connection_id = ConnectionId::new();
    let (mut ws_sender, mut receiver) = socket.split();

    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(state.hub.outbound_buffer());
    let sender_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(%connection_id, "Failed to serialize server event: {}", e);
                    continue;
                }
            };
            if let Err(e) = ws_sender.send(Message::Text(json)).await {
                tracing::debug!(%connection_id, "Failed to send WebSocket message: {}", e);
                return;
            }
        }
        let _ = ws_sender.close().await;
    });

    tracing::debug!(%connection_id, %remote_address, "WebSocket connected");

    let mut session = Session {
        connection_id,
        remote_address,
        joined: false,
        out_tx,
    };

    let mut closing = state.hub.closing();
    if !*closing.borrow() {
        loop {
            tokio::select! {
                changed = closing.changed() => {
                    if changed.is_err() || *closing.borrow() {
                        tracing::debug!(%connection_id, "Hub closing, ending WebSocket session");
                        break;
                    }
                }
                msg = receiver.next() => {
                    let flow = match msg {
                        Some(Ok(Message::Text(text))) => handle_text(&text, &mut session, &state).await,
                        Some(Ok(Message::Close(_))) | None => Flow::Close,
                        Some(Err(e)) => {
                            tracing::debug!(%connection_id, "WebSocket error: {}", e);
                            Flow::Close
                        }
                        // Ignore other message types (ping, pong, binary)
                        Some(Ok(_)) => Flow::Continue,
                    };
                    if flow == Flow::Close {
                        break;
                    }
                }
            }
        }
    }

    state.hub.leave(connection_id).await;
    drop(session);
    let _ = sender_task.await;

    tracing::info!(%connection_id, "WebSocket session finished");
}

async fn handle_text(text: &str, session: &mut Session, state: &GatewayState) -> Flow {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(connection_id = %session.connection_id, "Failed to parse client event: {}", e);
            let error = ChatError::from(e);
            let _ = session.out_tx.send(ServerEvent::from(&error)).await;
            return Flow::Continue;
        }
    };

    match handle_client_event(event, session, state).await {
        Ok(()) => Flow::Continue,
        Err(error) => {
            tracing::debug!(connection_id = %session.connection_id, code = error.code(), "Client event rejected: {}", error);
            let _ = session.out_tx.send(ServerEvent::from(&error)).await;
            if matches!(error, ChatError::RoomFull { .. }) {
                Flow::Close
            } else {
                Flow::Continue
            }
        }
    }
}

async fn handle_client_event(
    event: ClientEvent,
    session: &mut Session,
    state: &GatewayState,
) -> Result<(), ChatError> {
    let connection_id = session.connection_id;

    match event {
        ClientEvent::Ping => {
            let _ = session.out_tx.send(ServerEvent::Pong).await;
        }
        ClientEvent::Join { name } => {
            state
                .hub
                .join(connection_id, &name, session.remote_address, session.out_tx.clone())
                .await?;
            session.joined = true;
        }
        _ if !session.joined => return Err(ChatError::NotJoined),
        ClientEvent::Message { text } => {
            state.hub.post_text(connection_id, &text).await?;
        }
        ClientEvent::File { key } => {
            state.hub.share_file(connection_id, &key).await?;
        }
        ClientEvent::SetCapacity { capacity } => {
            state.hub.set_capacity(connection_id, capacity).await?;
        }
    }

    Ok(())
}
