//! Per-user conversation sessions.
//!
//! A [`Session`] serializes access to one user's conversation with the
//! agent runtime: it owns an isolated home directory, admits at most one
//! in-flight request, fans events out to every attached transport
//! connection, and supports cooperative interruption.
//!
//! `attach`, `detach` and `interrupt` are synchronous and never suspend,
//! so they are safe to call at any time, including while a `submit` is
//! awaiting the runtime.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::identity::sanitize;
use crate::outbound::{ErrorCode, Outbound};
use crate::runtime::{AgentRuntime, RuntimeEvent, RuntimeRequest};

/// Unique identifier for a transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live transport connection the session can deliver messages to.
///
/// The session holds membership only; connection lifecycle belongs to the
/// transport layer. Implementations must make `send` non-blocking so a
/// slow or closed peer cannot stall delivery to others.
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn is_open(&self) -> bool;

    /// Best-effort delivery. Returns `false` if the peer is gone.
    fn send(&self, message: &Outbound) -> bool;
}

struct SessionState {
    remote_session_id: Option<String>,
    busy: bool,
    /// Interrupt handle for the in-flight call; present exactly while busy.
    cancel: Option<CancellationToken>,
    last_activity: Instant,
    last_error: Option<String>,
    connections: HashMap<ConnectionId, Arc<dyn Connection>>,
}

/// One user's conversation with the agent runtime.
pub struct Session {
    user_id: String,
    home_dir: PathBuf,
    created_at: DateTime<Utc>,
    runtime: Arc<dyn AgentRuntime>,
    state: Mutex<SessionState>,
}

impl Session {
    /// Create a session rooted under `sessions_root`. The home directory
    /// path is derived here; the directory itself is created lazily on the
    /// first submit.
    pub fn new(
        user_id: impl Into<String>,
        sessions_root: &Path,
        runtime: Arc<dyn AgentRuntime>,
    ) -> Self {
        let user_id = user_id.into();
        let home_dir = sessions_root.join(sanitize(&user_id));
        Self {
            user_id,
            home_dir,
            created_at: Utc::now(),
            runtime,
            state: Mutex::new(SessionState {
                remote_session_id: None,
                busy: false,
                cancel: None,
                last_activity: Instant::now(),
                last_error: None,
                connections: HashMap::new(),
            }),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().unwrap().busy
    }

    pub fn has_connections(&self) -> bool {
        !self.state.lock().unwrap().connections.is_empty()
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().unwrap().connections.len()
    }

    /// Time since the last inbound prompt or runtime event.
    pub fn idle_for(&self) -> Duration {
        self.state.lock().unwrap().last_activity.elapsed()
    }

    pub fn remote_session_id(&self) -> Option<String> {
        self.state.lock().unwrap().remote_session_id.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().unwrap().last_error.clone()
    }

    /// Attach a connection. Idempotent: re-attaching the same connection
    /// is a no-op beyond set semantics.
    ///
    /// If the conversation identity is already known it is replayed to the
    /// newly attached connection so late joiners learn it immediately.
    pub fn attach(&self, connection: Arc<dyn Connection>) {
        let mut state = self.state.lock().unwrap();
        let replay = state.remote_session_id.clone();
        state.connections.insert(connection.id(), connection.clone());
        if let Some(session_id) = replay {
            connection.send(&Outbound::SessionInit { session_id });
        }
    }

    /// Remove a connection from the set. Detaching never cancels in-flight
    /// work.
    pub fn detach(&self, connection_id: ConnectionId) -> bool {
        self.state
            .lock()
            .unwrap()
            .connections
            .remove(&connection_id)
            .is_some()
    }

    /// Interrupt the in-flight request, if any.
    ///
    /// Signals cancellation and transitions straight back to idle without
    /// waiting for the runtime to observe the token; an `aborted` error is
    /// reported to attached connections. Returns `false` (no-op) when the
    /// session was already idle.
    pub fn interrupt(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(cancel) = state.cancel.take() else {
            return false;
        };
        cancel.cancel();
        state.busy = false;
        log::info!("interrupted in-flight request for user {}", self.user_id);
        broadcast(
            &state.connections,
            &Outbound::error(ErrorCode::Aborted, "request interrupted", false),
        );
        true
    }

    /// Run one prompt against the agent runtime, streaming results to all
    /// attached connections.
    ///
    /// Single-flight: if a request is already in flight the prompt is
    /// rejected with a `busy` error and nothing is queued. Failures are
    /// terminal for this request only; the session stays usable.
    pub async fn submit(&self, prompt: String) {
        // Admission and the idle→busy transition happen under one lock so
        // two racing submits can never both enter the busy state.
        let (cancel, resume) = {
            let mut state = self.state.lock().unwrap();
            if state.busy {
                log::debug!("session for user {} busy, rejecting prompt", self.user_id);
                broadcast(
                    &state.connections,
                    &Outbound::error(ErrorCode::Busy, "a request is already in flight", false),
                );
                return;
            }
            state.busy = true;
            state.last_error = None;
            state.last_activity = Instant::now();
            let cancel = CancellationToken::new();
            state.cancel = Some(cancel.clone());
            (cancel, state.remote_session_id.clone())
        };

        let outcome = self.run_request(prompt, resume, &cancel).await;

        let mut state = self.state.lock().unwrap();
        if cancel.is_cancelled() {
            // `interrupt` already reported the abort and reset the slot,
            // possibly for a newer request. Leave state alone.
            return;
        }
        state.busy = false;
        state.cancel = None;
        match outcome {
            Ok(()) => broadcast(&state.connections, &Outbound::Done),
            Err(message) => {
                log::warn!("request failed for user {}: {}", self.user_id, message);
                state.last_error = Some(message.clone());
                broadcast(
                    &state.connections,
                    &Outbound::error(ErrorCode::ServerError, message, true),
                );
            }
        }
    }

    async fn run_request(
        &self,
        prompt: String,
        resume: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        tokio::fs::create_dir_all(&self.home_dir)
            .await
            .map_err(|e| format!("failed to create session directory: {e}"))?;

        let request = RuntimeRequest {
            prompt,
            working_dir: self.home_dir.clone(),
            cancel: cancel.clone(),
            resume,
        };

        let mut events = self.runtime.start(request).map_err(|e| e.to_string())?;

        while let Some(item) = events.recv().await {
            // A runtime that ignores cancellation may keep producing;
            // stale output from an interrupted call is dropped, never
            // delivered.
            if cancel.is_cancelled() {
                return Ok(());
            }
            match item {
                Ok(event) => self.deliver(event),
                Err(err) => return Err(err.to_string()),
            }
        }

        Ok(())
    }

    /// Deliver one runtime event: refresh activity, latch a newly revealed
    /// conversation identity (announcing it before the raw event), then
    /// fan the event out.
    fn deliver(&self, event: RuntimeEvent) {
        let mut state = self.state.lock().unwrap();
        state.last_activity = Instant::now();

        if let Some(ref session_id) = event.session_id {
            if state.remote_session_id.as_deref() != Some(session_id) {
                state.remote_session_id = Some(session_id.clone());
                broadcast(
                    &state.connections,
                    &Outbound::SessionInit {
                        session_id: session_id.clone(),
                    },
                );
            }
        }

        broadcast(&state.connections, &Outbound::Message { event: event.payload });
    }
}

/// Best-effort fan-out: closed connections are skipped, never retried.
fn broadcast(connections: &HashMap<ConnectionId, Arc<dyn Connection>>, message: &Outbound) {
    for connection in connections.values() {
        if !connection.is_open() {
            continue;
        }
        if !connection.send(message) {
            log::debug!("dropped delivery to closed connection {}", connection.id());
        }
    }
}
