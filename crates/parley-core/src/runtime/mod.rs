//! The agent runtime boundary.
//!
//! The session engine treats the conversational agent as an opaque
//! streaming call: one request in, an ordered sequence of JSON events out,
//! terminated by channel exhaustion or an error item. Cancellation is
//! cooperative via a token carried in the request.

use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod cli;

pub use cli::CliRuntime;

/// One request to the agent runtime.
///
/// The working directory is an explicit field, never ambient process
/// state, so concurrent in-process calls cannot contaminate each other.
#[derive(Debug, Clone)]
pub struct RuntimeRequest {
    /// The user's prompt text.
    pub prompt: String,
    /// The session home directory the agent operates in.
    pub working_dir: PathBuf,
    /// Cooperative cancellation handle; may fire at any point.
    pub cancel: CancellationToken,
    /// Remote session identity to continue, if resuming a conversation.
    pub resume: Option<String>,
}

/// One structured event produced by the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeEvent {
    /// Conversation identity assigned by the runtime, carried at most once
    /// near the start of a fresh conversation.
    pub session_id: Option<String>,
    /// The raw event payload, passed through to clients untouched.
    pub payload: serde_json::Value,
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to spawn agent: {0}")]
    Spawn(String),

    #[error("Agent I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed agent event: {0}")]
    Protocol(String),
}

/// Receiver half of one in-flight agent call.
///
/// The channel closing without an `Err` item is normal exhaustion; an
/// `Err` item is terminal for the call.
pub type EventReceiver = mpsc::Receiver<Result<RuntimeEvent, RuntimeError>>;

/// The conversational agent engine, seen through a narrow seam so tests
/// can substitute scripted doubles.
pub trait AgentRuntime: Send + Sync {
    /// Begin one request. Events arrive on the returned channel in the
    /// order the agent produced them.
    fn start(&self, request: RuntimeRequest) -> Result<EventReceiver, RuntimeError>;
}
