//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `RegistryEvent`: Events published by the registry for subscribers

use std::collections::HashMap;

use thermo_core::{NodeId, RegistryEntry, SensorKey, SensorMetadata};
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Registry Commands
// ============================================================================

/// Result of resolving a sensor key to its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHandle {
    pub node_id: NodeId,
    /// True when this call materialised the slot.
    pub created: bool,
}

/// Entry and collision counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub entries: usize,
    /// Distinct keys that landed on a slot owned by a different key.
    pub collisions: usize,
}

/// Commands sent to the registry actor.
///
/// Each command carries a oneshot channel for the response.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Resolve a key to its slot, creating the slot if absent.
    ///
    /// # Errors
    /// - `RegistryError::RegistryFull` if at maximum capacity
    GetOrCreate {
        key: SensorKey,
        metadata: SensorMetadata,
        respond_to: oneshot::Sender<Result<NodeHandle, RegistryError>>,
    },

    /// Store a value in an existing slot.
    ///
    /// # Errors
    /// - `RegistryError::NotFound` if the slot doesn't exist
    /// - `RegistryError::Invalid` if the value is not finite
    Write {
        node_id: NodeId,
        value: f64,
        metadata: SensorMetadata,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Get-or-create followed by a write, in one actor step.
    WriteReading {
        key: SensorKey,
        value: f64,
        metadata: SensorMetadata,
        respond_to: oneshot::Sender<Result<NodeHandle, RegistryError>>,
    },

    /// Read the current value of a slot.
    Read {
        node_id: NodeId,
        respond_to: oneshot::Sender<Result<f64, RegistryError>>,
    },

    /// Get a single entry. Returns `None` if the slot doesn't exist.
    GetEntry {
        node_id: NodeId,
        respond_to: oneshot::Sender<Option<RegistryEntry>>,
    },

    /// All entries ordered by node id.
    ListEntries {
        respond_to: oneshot::Sender<Vec<(NodeId, RegistryEntry)>>,
    },

    /// Current value of every slot.
    Snapshot {
        respond_to: oneshot::Sender<HashMap<NodeId, f64>>,
    },

    Stats {
        respond_to: oneshot::Sender<RegistryStats>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The registry has reached its maximum capacity.
    #[error("registry is full (max: {max} entries)")]
    RegistryFull { max: usize },

    /// The requested slot was not found.
    #[error("node not found: {0}")]
    NotFound(NodeId),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,

    /// Rejected input.
    #[error("invalid request: {0}")]
    Invalid(String),
}

// ============================================================================
// Registry Events
// ============================================================================

/// Events published by the registry to subscribers.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A new slot was materialised.
    Created {
        node_id: NodeId,
        display_name: String,
    },

    /// A slot's hardware name was resolved.
    Upgraded {
        node_id: NodeId,
        hardware_name: String,
    },

    /// A key landed on a slot already owned by a different key.
    Collision {
        node_id: NodeId,
        existing: SensorKey,
        incoming: SensorKey,
    },
}
