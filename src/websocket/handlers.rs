use std::ops::ControlFlow;

use axum::{
    extract::{
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, warn};
use uuid::Uuid;

use crate::security::jwt::TokenKind;
use crate::services::message_service::MessageService;
use crate::state::AppState;
use crate::websocket::message_types::{WsInboundEvent, WsOutboundEvent};
use crate::websocket::{
    ConnectionId, CLOSE_AUTH_FAILED, CLOSE_AUTH_TIMEOUT, CLOSE_PROTOCOL_VIOLATION,
};

/// Upgrade endpoint. The HTTP handshake is open to anyone; authentication
/// happens in-band on the first frame.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

enum AuthOutcome {
    Authenticated(Uuid),
    Rejected,
    Disconnected,
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    }))
}

/// Wait for the first meaningful frame, which must be a valid `authenticate`
/// event carrying an access token.
async fn await_authentication(state: &AppState, socket: &mut WebSocket) -> AuthOutcome {
    loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => {
                let token = match serde_json::from_str::<WsInboundEvent>(text.as_str()) {
                    Ok(WsInboundEvent::Authenticate { token }) => token,
                    _ => {
                        warn!("websocket rejected: first frame was not an authenticate event");
                        return AuthOutcome::Rejected;
                    }
                };
                return match state.tokens.verify(&token, TokenKind::Access) {
                    Ok(claims) => match claims.user_id() {
                        Ok(user_id) => AuthOutcome::Authenticated(user_id),
                        Err(_) => AuthOutcome::Rejected,
                    },
                    Err(_) => {
                        warn!("websocket rejected: invalid access token");
                        AuthOutcome::Rejected
                    }
                };
            }
            // Control frames may arrive ahead of the first text frame.
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => return AuthOutcome::Disconnected,
            Some(Ok(_)) => return AuthOutcome::Rejected,
            Some(Err(_)) => return AuthOutcome::Disconnected,
        }
    }
}

async fn handle_socket(state: AppState, mut socket: WebSocket) {
    let auth = tokio::time::timeout(
        state.config.ws_auth_timeout,
        await_authentication(&state, &mut socket),
    )
    .await;

    let user_id = match auth {
        Err(_) => {
            let _ = socket
                .send(close_message(CLOSE_AUTH_TIMEOUT, "authentication timed out"))
                .await;
            return;
        }
        Ok(AuthOutcome::Rejected) => {
            let _ = socket
                .send(close_message(CLOSE_AUTH_FAILED, "authentication failed"))
                .await;
            return;
        }
        Ok(AuthOutcome::Disconnected) => return,
        Ok(AuthOutcome::Authenticated(user_id)) => user_id,
    };

    let connection_id = ConnectionId::new();
    let (tx, mut rx) = unbounded_channel();
    state.registry.register(user_id, connection_id, tx.clone()).await;
    tracing::info!(%user_id, "websocket authenticated");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // Frames queued for this connection: pushes, acks, server closes.
            outbound = rx.recv() => match outbound {
                Some(message) => {
                    let closing = matches!(message, Message::Close(_));
                    if sender.send(message).await.is_err() || closing {
                        break;
                    }
                }
                None => break,
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if handle_client_event(&state, user_id, &tx, text.as_str())
                        .await
                        .is_break()
                    {
                        // Fatal event: stop reading immediately and flush the
                        // already-queued close frame.
                        flush_until_close(&mut sender, &mut rx).await;
                        break;
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Binary(_))) => {
                    warn!(%user_id, "ignoring binary frame");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!(%user_id, error = %e, "websocket receive error");
                    break;
                }
            },
        }
    }

    state.registry.unregister_if_current(user_id, connection_id).await;
    tracing::info!(%user_id, "websocket disconnected");
}

/// Send whatever is queued for this connection, stopping at the close frame.
/// Called once a fatal event has been observed, so a close frame is already
/// in the queue ahead of us.
async fn flush_until_close(
    sender: &mut SplitSink<WebSocket, Message>,
    rx: &mut UnboundedReceiver<Message>,
) {
    while let Some(message) = rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if sender.send(message).await.is_err() || closing {
            return;
        }
    }
}

/// Handle one post-authentication text frame. Malformed frames and messages
/// the service refuses are dropped without tearing the connection down; only
/// a spoofed sender id is fatal, signalled with `Break` so the caller stops
/// reading further frames.
async fn handle_client_event(
    state: &AppState,
    user_id: Uuid,
    tx: &UnboundedSender<Message>,
    text: &str,
) -> ControlFlow<()> {
    let event = match serde_json::from_str::<WsInboundEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(%user_id, error = %e, "dropping unparseable frame");
            return ControlFlow::Continue(());
        }
    };

    match event {
        WsInboundEvent::Authenticate { .. } => {
            warn!(%user_id, "ignoring repeated authenticate event");
        }
        WsInboundEvent::SendMessage {
            sender_id,
            receiver_id,
            content,
        } => {
            if sender_id != user_id {
                warn!(%user_id, claimed = %sender_id, "sender id does not match connection, closing");
                let _ = tx.send(close_message(
                    CLOSE_PROTOCOL_VIOLATION,
                    "sender id does not match connection",
                ));
                return ControlFlow::Break(());
            }
            send_direct_message(state, user_id, receiver_id, content, tx).await;
        }
    }
    ControlFlow::Continue(())
}

/// Persist the message, then push to the receiver and ack the sender. The ack
/// goes through this connection's own queue rather than a registry lookup: if
/// the user reconnected mid-flight, the registry already points at the new
/// socket and the ack still belongs here.
async fn send_direct_message(
    state: &AppState,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: String,
    tx: &UnboundedSender<Message>,
) {
    let message =
        match MessageService::record(state.store.as_ref(), sender_id, receiver_id, &content).await
        {
            Ok(message) => message,
            Err(e) => {
                warn!(%sender_id, %receiver_id, error = %e, "message rejected, nothing delivered");
                return;
            }
        };

    let push = WsOutboundEvent::MessageReceived {
        message: message.clone(),
    };
    if let Some(frame) = event_frame(&push) {
        if !state.registry.send_to(receiver_id, frame).await {
            tracing::debug!(%receiver_id, "receiver offline, message stored only");
        }
    }

    if let Some(frame) = event_frame(&WsOutboundEvent::MessageSent { message }) {
        let _ = tx.send(frame);
    }
}

fn event_frame(event: &WsOutboundEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            error!(error = %e, "failed to serialize outbound event");
            None
        }
    }
}
