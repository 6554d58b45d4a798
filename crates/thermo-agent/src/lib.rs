//! thermo-agent - temperature telemetry agent
//!
//! This library provides the producer side of thermo. Each lab PC runs one
//! agent that reads its temperature sensors and pushes them to the
//! registry server.
//!
//! # Architecture
//!
//! The agent is a single periodic loop over four components:
//!
//! 1. **Probe**: enumerates hardware sensors (`sysinfo` components)
//! 2. **Submitter**: derives node ids, resolves handles and writes values
//! 3. **Session Manager**: owns the transport session and its bounded
//!    reconnect state machine
//! 4. **Transport**: newline-JSON over TCP behind the `Transport` trait
//!
//! The loop respects a shared `CancellationToken` for graceful shutdown.

pub mod agent;
pub mod cache;
pub mod config;
pub mod error;
pub mod probe;
pub mod session;
pub mod submitter;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use agent::Agent;
pub use config::AgentConfig;
pub use error::{AgentError, Result, SessionError, TransportError};
pub use session::{SessionManager, SessionState};
pub use submitter::{BatchOutcome, TelemetrySubmitter};
pub use transport::TcpTransport;
