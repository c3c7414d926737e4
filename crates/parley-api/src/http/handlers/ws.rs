//! WebSocket handler for real-time direct messaging.
//!
//! The `/ws` endpoint upgrades an authenticated HTTP connection to a
//! WebSocket. Once connected, the handler:
//!
//! - **Registers a session** for the token's user and unregisters it when
//!   the socket closes, for whatever reason.
//! - **Forwards pushes:** every [`ServerEvent`] the delivery router enqueues
//!   in the session mailbox is written to the client as a JSON text frame.
//! - **Receives commands:** parses incoming text frames as [`ClientEvent`]
//!   and answers on the same socket (the send echo, history pages, pongs).
//!
//! The sender of a message is always the session's user; the payload has no
//! say in it.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parley_types::event::{ClientEvent, NewMessage, ServerEvent};
use parley_types::session::Session;
use parley_types::user::UserId;

use crate::http::extractors::auth::AuthenticatedUser;
use crate::state::AppState;

/// Upgrade an HTTP request to a WebSocket connection.
///
/// This is mounted at `/ws` in the router.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    auth: AuthenticatedUser,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, auth.user_id, state))
}

/// Core WebSocket connection handler.
///
/// Uses `tokio::select!` to multiplex between the session mailbox, incoming
/// client frames and server shutdown, keeping both halves of the socket in a
/// single task.
async fn handle_ws_connection(socket: WebSocket, user_id: UserId, state: AppState) {
    let (session, mut mailbox) = state.registry.connect(user_id);
    let session_id = session.session_id;
    tracing::info!(user_id = %session.user_id, %session_id, "WebSocket session opened");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let shutdown = state.shutdown.clone();

    loop {
        tokio::select! {
            // --- Branch 1: Server shutting down ---
            _ = shutdown.cancelled() => {
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }

            // --- Branch 2: Forward pushed events to the client ---
            event = mailbox.recv() => {
                match event {
                    Some(event) => {
                        if send_event(&mut ws_sender, &event).await.is_err() {
                            break;
                        }
                    }
                    // Registry dropped our sender (session unregistered elsewhere)
                    None => break,
                }
            }

            // --- Branch 3: Process frames from the client ---
            msg_result = ws_receiver.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = process_frame(text.as_str(), &session, &state).await {
                            if send_event(&mut ws_sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        // Client disconnected
                        break;
                    }
                    Some(Err(err)) => {
                        tracing::debug!(%session_id, "WebSocket receive error: {err}");
                        break;
                    }
                    // Ignore binary, ping, pong protocol frames (handled by axum/tungstenite)
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.registry.unregister(&session_id);
    tracing::info!(%session_id, "WebSocket session closed");
}

/// Serialize and write one event. Serialization failures are logged and
/// skipped; socket failures end the connection.
async fn send_event(
    ws_sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => ws_sender.send(Message::Text(json.into())).await,
        Err(err) => {
            tracing::warn!("Failed to serialize ServerEvent: {err}");
            Ok(())
        }
    }
}

/// Handle one client text frame and produce the reply for this socket.
pub(crate) async fn process_frame(
    text: &str,
    session: &Session,
    state: &AppState,
) -> Option<ServerEvent> {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(
                session_id = %session.session_id,
                error = %err,
                "Ignoring malformed WebSocket frame"
            );
            return Some(ServerEvent::error(
                "INVALID_FRAME",
                format!("Invalid message: {err}"),
            ));
        }
    };

    match event {
        ClientEvent::SendMessage { receiver, message } => {
            Some(handle_send(session, state, &receiver, &message).await)
        }
        ClientEvent::History { peer, since, limit } => {
            Some(handle_history(session, state, &peer, since, limit).await)
        }
        ClientEvent::Ping => Some(ServerEvent::Pong),
    }
}

fn send_failed(code: &str, message: impl Into<String>) -> ServerEvent {
    ServerEvent::SendFailed {
        code: code.to_string(),
        message: message.into(),
    }
}

async fn handle_send(session: &Session, state: &AppState, receiver: &str, body: &str) -> ServerEvent {
    let Ok(receiver_id) = UserId::parse(receiver.trim()) else {
        return send_failed("UNKNOWN_RECIPIENT", format!("Unknown recipient '{receiver}'"));
    };
    match state.account_service.exists(&receiver_id).await {
        Ok(true) => {}
        Ok(false) => {
            return send_failed("UNKNOWN_RECIPIENT", format!("Unknown recipient '{receiver_id}'"));
        }
        Err(e) => {
            tracing::warn!(error = %e, "recipient lookup failed");
            return send_failed("SEND_FAILED", "Recipient lookup failed");
        }
    }

    match state.router.send(session, &receiver_id, body).await {
        Ok(receipt) => ServerEvent::new_message(&receipt.message),
        Err(e) => send_failed(e.code(), e.to_string()),
    }
}

async fn handle_history(
    session: &Session,
    state: &AppState,
    peer: &str,
    since: u64,
    limit: u32,
) -> ServerEvent {
    let Ok(peer_id) = UserId::parse(peer.trim()) else {
        return ServerEvent::error("VALIDATION_ERROR", format!("Invalid peer '{peer}'"));
    };

    let query = state
        .router
        .history_query(&session.user_id, &peer_id, since, limit);
    match query.collect(state.router.store().clone()).await {
        Ok(messages) => ServerEvent::History {
            conversation_id: query.conversation_id.clone(),
            messages: messages.iter().map(NewMessage::from).collect(),
        },
        Err(e) => {
            tracing::warn!(error = %e, "history replay failed");
            ServerEvent::error("STORAGE_UNAVAILABLE", e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    async fn test_state() -> AppState {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        std::mem::forget(dir);
        let state = AppState::open(path).await.unwrap();
        for user in ["alice", "bob"] {
            state
                .account_service
                .register(user, &SecretString::from("pw".to_string()))
                .await
                .unwrap();
        }
        state
    }

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn send_echoes_persisted_message() {
        let state = test_state().await;
        let (alice, _rx) = state.registry.connect(uid("alice"));

        let reply = process_frame(
            r#"{"type":"send_message","receiver":"bob","message":"hi"}"#,
            &alice,
            &state,
        )
        .await
        .unwrap();

        match reply {
            ServerEvent::NewMessage(m) => {
                assert_eq!(m.sender.as_str(), "alice");
                assert_eq!(m.receiver.as_str(), "bob");
                assert_eq!(m.message_id, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_to_unknown_user_fails() {
        let state = test_state().await;
        let (alice, _rx) = state.registry.connect(uid("alice"));

        let reply = process_frame(
            r#"{"type":"send_message","receiver":"mallory","message":"hi"}"#,
            &alice,
            &state,
        )
        .await
        .unwrap();
        assert!(matches!(reply, ServerEvent::SendFailed { ref code, .. } if code == "UNKNOWN_RECIPIENT"));
    }

    #[tokio::test]
    async fn whitespace_message_is_rejected() {
        let state = test_state().await;
        let (alice, _rx) = state.registry.connect(uid("alice"));

        let reply = process_frame(
            r#"{"type":"send_message","receiver":"bob","message":"   "}"#,
            &alice,
            &state,
        )
        .await
        .unwrap();
        assert!(matches!(reply, ServerEvent::SendFailed { ref code, .. } if code == "EMPTY_MESSAGE"));
    }

    #[tokio::test]
    async fn history_after_reconnect() {
        let state = test_state().await;
        let (alice, _a) = state.registry.connect(uid("alice"));
        process_frame(
            r#"{"type":"send_message","receiver":"bob","message":"hi"}"#,
            &alice,
            &state,
        )
        .await;

        let (bob, _b) = state.registry.connect(uid("bob"));
        let reply = process_frame(r#"{"type":"history","peer":"alice","since":0,"limit":10}"#, &bob, &state)
            .await
            .unwrap();
        match reply {
            ServerEvent::History { messages, .. } => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].message, "hi");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_frame_and_ping() {
        let state = test_state().await;
        let (alice, _rx) = state.registry.connect(uid("alice"));

        let reply = process_frame("not json", &alice, &state).await.unwrap();
        assert!(matches!(reply, ServerEvent::Error { ref code, .. } if code == "INVALID_FRAME"));

        let reply = process_frame(r#"{"type":"ping"}"#, &alice, &state).await.unwrap();
        assert_eq!(reply, ServerEvent::Pong);
    }
}
