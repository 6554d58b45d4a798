//! thermo protocol - wire protocol for registry sessions
//!
//! This crate provides message types and parsing for communication
//! between producer agents and the registry server: a handshake with
//! version and namespace negotiation, followed by newline-delimited
//! JSON request/response pairs.

pub mod message;
pub mod parse;
pub mod version;

pub use message::{ClientMessage, MessageType, NodeSummary, ServerMessage};
pub use parse::{RawSensorReading, SensorReading};
pub use version::ProtocolVersion;

/// Namespace URI both sides must agree on during the handshake.
pub const DEFAULT_NAMESPACE_URI: &str = "http://university.temperature.monitoring";
