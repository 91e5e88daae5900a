//! WebSocket transport attaching browser connections to sessions.
//!
//! Clients connect to `/ws/chat?user=<id>`, get attached to the user's
//! session, and exchange JSON messages: `prompt`, `interrupt` and `ping`
//! inbound; the [`Outbound`] protocol from parley-core outbound.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use parley_core::meta::SessionRecord;
use parley_core::session::Session;
use parley_core::title::{extract_title, fallback_title};
use parley_core::{Connection, ConnectionId, Outbound};

use crate::state::SharedState;

/// Messages a client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Inbound {
    /// Run a prompt against the user's session.
    Prompt { text: String },
    /// Interrupt the in-flight request, if any.
    Interrupt,
    /// Keepalive; answered with `pong`.
    Ping,
}

#[derive(Deserialize)]
pub struct WsQuery {
    /// The requesting user's identifier.
    pub user: String,
}

/// The session side of one WebSocket: a non-blocking sender into the
/// per-socket forwarding queue.
struct WsConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Connection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, message: &Outbound) -> bool {
        self.tx.send(message.clone()).is_ok()
    }
}

/// Handler for GET /ws/chat
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<SharedState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.user))
}

async fn handle_socket(socket: WebSocket, state: Arc<SharedState>, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connection = Arc::new(WsConnection {
        id: ConnectionId::new(),
        tx,
    });
    let connection_id = connection.id();

    let session = state.registry.get_or_create(&user_id);
    state.registry.attach_connection(connection.clone(), &session);
    log::debug!("connection {} attached for user {}", connection_id, user_id);

    // Drain the outbound queue onto the socket.
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break; // client disconnected
                    }
                }
                Err(err) => log::warn!("failed to serialize outbound message: {}", err),
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<Inbound>(&text) {
            Ok(Inbound::Prompt { text }) => {
                let session = Arc::clone(&session);
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    session.submit(text).await;
                    record_metadata(&state, &session);
                });
            }
            Ok(Inbound::Interrupt) => {
                session.interrupt();
            }
            Ok(Inbound::Ping) => {
                connection.send(&Outbound::Pong);
            }
            Err(err) => {
                log::debug!("ignoring malformed client message: {}", err);
            }
        }
    }

    state.registry.detach_connection(connection_id);
    send_task.abort();
    log::debug!("connection {} closed for user {}", connection_id, user_id);
}

/// After a request finishes, refresh this conversation's stored title and
/// last-activity. Best-effort: failures are logged, never surfaced.
fn record_metadata(state: &SharedState, session: &Session) {
    let Some(session_id) = session.remote_session_id() else {
        return;
    };
    let title = extract_title(session.home_dir(), &session_id)
        .unwrap_or_else(|| fallback_title(session.created_at()));
    let record = SessionRecord {
        user_id: session.user_id().to_string(),
        session_id,
        title,
        favorite: false,
        last_activity: chrono::Utc::now(),
    };
    if let Err(err) = state.metadata.upsert(record) {
        log::warn!(
            "failed to persist session metadata for {}: {}",
            session.user_id(),
            err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_prompt_parses() {
        let msg: Inbound = serde_json::from_str(r#"{"type":"prompt","text":"hello"}"#).unwrap();
        assert!(matches!(msg, Inbound::Prompt { text } if text == "hello"));
    }

    #[test]
    fn inbound_interrupt_and_ping_parse() {
        assert!(matches!(
            serde_json::from_str::<Inbound>(r#"{"type":"interrupt"}"#).unwrap(),
            Inbound::Interrupt
        ));
        assert!(matches!(
            serde_json::from_str::<Inbound>(r#"{"type":"ping"}"#).unwrap(),
            Inbound::Ping
        ));
    }

    #[test]
    fn unknown_inbound_is_rejected() {
        assert!(serde_json::from_str::<Inbound>(r#"{"type":"dance"}"#).is_err());
        assert!(serde_json::from_str::<Inbound>("not json").is_err());
    }

    #[test]
    fn ws_connection_reports_closed_after_receiver_drops() {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = WsConnection {
            id: ConnectionId::new(),
            tx,
        };

        assert!(connection.is_open());
        assert!(connection.send(&Outbound::Pong));

        drop(rx);
        assert!(!connection.is_open());
        assert!(!connection.send(&Outbound::Pong));
    }
}
