//! Registry actor - owns the address space and processes commands.
//!
//! The RegistryActor is the single writer of registry state. It receives
//! commands via an mpsc channel and publishes events via broadcast, so
//! concurrent get-or-create calls for the same key are serialised here and
//! converge on one slot.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are ignored or logged, never panicked on

use std::collections::{HashMap, HashSet};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use thermo_core::{NodeId, RegistryEntry, SensorKey, SensorMetadata};

use super::commands::{NodeHandle, RegistryCommand, RegistryError, RegistryEvent, RegistryStats};

/// Maximum number of entries the registry can hold.
///
/// Larger than the node id space, so it is never reached in practice.
pub const MAX_ENTRIES: usize = 2_000_000;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns every slot.
///
/// Entries are never removed; the map only grows.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Slot storage keyed by derived node id
    entries: HashMap<NodeId, RegistryEntry>,

    /// Keys already reported as colliding, so each is counted once
    colliding_keys: HashSet<SensorKey>,

    /// Event publisher for subscribers
    event_publisher: broadcast::Sender<RegistryEvent>,
}

impl RegistryActor {
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            receiver,
            entries: HashMap::new(),
            colliding_keys: HashSet::new(),
            event_publisher,
        }
    }

    /// Runs the actor event loop until all senders are dropped.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            entries = self.entries.len(),
            collisions = self.colliding_keys.len(),
            "Registry actor stopped"
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::GetOrCreate {
                key,
                metadata,
                respond_to,
            } => {
                let result = self.handle_get_or_create(key, &metadata);
                // Ignore send error - caller may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Write {
                node_id,
                value,
                metadata,
                respond_to,
            } => {
                let result = self.handle_write(node_id, value, &metadata);
                let _ = respond_to.send(result);
            }
            RegistryCommand::WriteReading {
                key,
                value,
                metadata,
                respond_to,
            } => {
                let result = self.handle_write_reading(key, value, &metadata);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Read {
                node_id,
                respond_to,
            } => {
                let result = self
                    .entries
                    .get(&node_id)
                    .map(|entry| entry.value)
                    .ok_or(RegistryError::NotFound(node_id));
                let _ = respond_to.send(result);
            }
            RegistryCommand::GetEntry {
                node_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.entries.get(&node_id).cloned());
            }
            RegistryCommand::ListEntries { respond_to } => {
                let _ = respond_to.send(self.handle_list_entries());
            }
            RegistryCommand::Snapshot { respond_to } => {
                let snapshot = self
                    .entries
                    .iter()
                    .map(|(id, entry)| (*id, entry.value))
                    .collect();
                let _ = respond_to.send(snapshot);
            }
            RegistryCommand::Stats { respond_to } => {
                let _ = respond_to.send(RegistryStats {
                    entries: self.entries.len(),
                    collisions: self.colliding_keys.len(),
                });
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_get_or_create(
        &mut self,
        key: SensorKey,
        metadata: &SensorMetadata,
    ) -> Result<NodeHandle, RegistryError> {
        let node_id = NodeId::derive(&key);

        if let Some(existing) = self.entries.get(&node_id).map(|entry| entry.key) {
            if existing != key {
                self.note_collision(node_id, existing, key);
            }
            self.apply_upgrade(node_id, metadata);
            return Ok(NodeHandle {
                node_id,
                created: false,
            });
        }

        if self.entries.len() >= MAX_ENTRIES {
            warn!(
                key = %key,
                max = MAX_ENTRIES,
                "Registry is full, rejecting slot creation"
            );
            return Err(RegistryError::RegistryFull { max: MAX_ENTRIES });
        }

        let entry = RegistryEntry::new(key, metadata.clone());
        let display_name = entry.display_name();
        self.entries.insert(node_id, entry);

        debug!(
            node_id = %node_id,
            display_name = %display_name,
            total = self.entries.len(),
            "Slot created"
        );

        let _ = self.event_publisher.send(RegistryEvent::Created {
            node_id,
            display_name,
        });

        Ok(NodeHandle {
            node_id,
            created: true,
        })
    }

    fn handle_write(
        &mut self,
        node_id: NodeId,
        value: f64,
        metadata: &SensorMetadata,
    ) -> Result<(), RegistryError> {
        if !value.is_finite() {
            return Err(RegistryError::Invalid(format!(
                "value for node {node_id} is not finite: {value}"
            )));
        }

        let entry = self
            .entries
            .get_mut(&node_id)
            .ok_or(RegistryError::NotFound(node_id))?;
        entry.record(value);

        self.apply_upgrade(node_id, metadata);
        Ok(())
    }

    fn handle_write_reading(
        &mut self,
        key: SensorKey,
        value: f64,
        metadata: &SensorMetadata,
    ) -> Result<NodeHandle, RegistryError> {
        // Validate before creating so a bad value never leaves an empty slot behind
        if !value.is_finite() {
            return Err(RegistryError::Invalid(format!(
                "value for {key} is not finite: {value}"
            )));
        }
        let handle = self.handle_get_or_create(key, metadata)?;
        self.handle_write(handle.node_id, value, metadata)?;
        Ok(handle)
    }

    fn handle_list_entries(&self) -> Vec<(NodeId, RegistryEntry)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Moves a slot's metadata from Unknown to Known when possible.
    fn apply_upgrade(&mut self, node_id: NodeId, metadata: &SensorMetadata) {
        let Some(entry) = self.entries.get_mut(&node_id) else {
            return;
        };
        if !entry.upgrade_metadata(metadata) {
            return;
        }

        let hardware_name = entry.metadata.hardware_name.clone().unwrap_or_default();
        info!(
            node_id = %node_id,
            display_name = %entry.display_name(),
            hardware_name = %hardware_name,
            "Hardware resolved"
        );
        let _ = self.event_publisher.send(RegistryEvent::Upgraded {
            node_id,
            hardware_name,
        });
    }

    /// Records a key that shares a slot with a different key.
    fn note_collision(&mut self, node_id: NodeId, existing: SensorKey, incoming: SensorKey) {
        if !self.colliding_keys.insert(incoming) {
            return;
        }

        warn!(
            node_id = %node_id,
            existing = %existing,
            incoming = %incoming,
            collisions = self.colliding_keys.len(),
            "Node id collision, keys share one slot"
        );
        let _ = self.event_publisher.send(RegistryEvent::Collision {
            node_id,
            existing,
            incoming,
        });
    }

    #[cfg(test)]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}
