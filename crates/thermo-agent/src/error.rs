//! Error types for the thermo agent.
//!
//! Transport errors are per-operation and never abort a batch on their own;
//! only session exhaustion (`SessionError::Fatal`) propagates to the top
//! level.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

// ============================================================================
// Transport Errors
// ============================================================================

/// Failures of a single transport operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Could not open a session with the server.
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// The operation did not finish in time.
    #[error("Timed out after {after:?}")]
    Timeout { after: Duration },

    /// The session was closed or replaced.
    #[error("Session closed")]
    SessionClosed,

    /// The server refused the handshake.
    #[error("Rejected by server: {0}")]
    Rejected(String),

    /// The server answered a request with an error.
    #[error("Server error: {message}")]
    Server {
        message: String,
        code: Option<String>,
    },

    /// Unexpected or unparseable message.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Malformed server URL.
    #[error("Invalid server URL '{0}'")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl TransportError {
    /// True when the session itself is gone, not just one request.
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::SessionClosed | Self::Io(_) | Self::Timeout { .. })
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

// ============================================================================
// Session Errors
// ============================================================================

/// Errors surfaced by the session manager.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Reconnection attempts exhausted; the session will not retry again.
    #[error("Session failed after {attempts} attempts: {last_error}")]
    Fatal { attempts: u32, last_error: String },

    /// Shutdown was requested while connecting.
    #[error("Session cancelled")]
    Cancelled,
}

// ============================================================================
// Agent Errors
// ============================================================================

/// Top-level agent errors.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Convenience Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
