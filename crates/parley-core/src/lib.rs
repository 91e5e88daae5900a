//! # parley-core
//!
//! Core session engine for Parley, a web chat frontend for conversational
//! agents.
//!
//! This crate is framework-agnostic and owns the per-user multiplexing
//! layer that sits between transport connections (WebSocket, SSE) and the
//! agent runtime:
//!
//! - **Session**: one user's conversation, with an isolated home directory,
//!   a single-flight request slot, and event fan-out to attached connections
//! - **SessionRegistry**: the user→Session map, connection bookkeeping, and
//!   the periodic eviction sweep
//! - **AgentRuntime**: the narrow interface to the agent engine, with a
//!   CLI-backed production implementation

pub mod config;
pub mod identity;
pub mod meta;
pub mod outbound;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod title;

// Re-export commonly used types
pub use config::RegistryConfig;
pub use outbound::{ErrorCode, Outbound};
pub use registry::SessionRegistry;
pub use runtime::{AgentRuntime, RuntimeError, RuntimeEvent, RuntimeRequest};
pub use session::{Connection, ConnectionId, Session};
