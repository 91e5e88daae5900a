//! Messages delivered to transport connections.
//!
//! This is the wire protocol between a session and its attached browser
//! connections, serialized as JSON with a `"type"` tag.

use serde::{Deserialize, Serialize};

/// Error codes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A request is already in flight for this session.
    Busy,
    /// The request was deliberately interrupted.
    Aborted,
    /// The runtime or session setup failed.
    ServerError,
    /// The transport layer gave up waiting.
    Timeout,
}

/// One outbound message to a transport connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// The remote conversation identity became known, or is replayed to a
    /// newly attached connection.
    SessionInit { session_id: String },
    /// Opaque passthrough of one agent runtime event.
    Message { event: serde_json::Value },
    /// A request failed. `retriable` tells the UI whether offering a retry
    /// makes sense.
    Error {
        code: ErrorCode,
        message: String,
        retriable: bool,
    },
    /// The in-flight request finished successfully.
    Done,
    /// Liveness response to a client ping.
    Pong,
}

impl Outbound {
    /// Build an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>, retriable: bool) -> Self {
        Self::Error {
            code,
            message: message.into(),
            retriable,
        }
    }
}
