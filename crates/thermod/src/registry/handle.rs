//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to registry events.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use std::collections::HashMap;

use tokio::sync::{broadcast, mpsc, oneshot};

use thermo_core::{NodeId, RegistryEntry, SensorKey, SensorMetadata};

use super::commands::{NodeHandle, RegistryCommand, RegistryError, RegistryEvent, RegistryStats};

/// Handle for interacting with the registry actor.
///
/// Clone it freely; every clone talks to the same actor.
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl RegistryHandle {
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Resolves a key to its slot, creating the slot on first sight.
    ///
    /// A slot that already exists is returned unchanged apart from an
    /// Unknown -> Known hardware upgrade.
    ///
    /// # Errors
    ///
    /// - `RegistryError::RegistryFull` if the registry is at maximum capacity
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn get_or_create(
        &self,
        key: SensorKey,
        metadata: SensorMetadata,
    ) -> Result<NodeHandle, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::GetOrCreate {
                key,
                metadata,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Stores a value in an existing slot.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotFound` if the slot doesn't exist
    /// - `RegistryError::Invalid` if the value is NaN or infinite
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn write(
        &self,
        node_id: NodeId,
        value: f64,
        metadata: SensorMetadata,
    ) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Write {
                node_id,
                value,
                metadata,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Writes a reading for a key, creating its slot if this is the first
    /// write for an unseen key.
    pub async fn write_reading(
        &self,
        key: SensorKey,
        value: f64,
        metadata: SensorMetadata,
    ) -> Result<NodeHandle, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::WriteReading {
                key,
                value,
                metadata,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Reads the current value of a slot.
    pub async fn read(&self, node_id: NodeId) -> Result<f64, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Read {
                node_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Gets a single entry by node id.
    ///
    /// Returns `None` if the slot doesn't exist or if communication
    /// with the actor fails.
    pub async fn get_entry(&self, node_id: NodeId) -> Option<RegistryEntry> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::GetEntry {
                node_id,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Lists all entries, ordered by node id.
    pub async fn list_entries(&self) -> Result<Vec<(NodeId, RegistryEntry)>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::ListEntries { respond_to: tx })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Current value of every slot, keyed by node id.
    pub async fn snapshot(&self) -> Result<HashMap<NodeId, f64>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Snapshot { respond_to: tx })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    pub async fn stats(&self) -> Result<RegistryStats, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Stats { respond_to: tx })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Subscribes to registry events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Checks if the actor is still accepting commands.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_reports_closed_channel() {
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        let (event_tx, _) = broadcast::channel(1);
        let handle = RegistryHandle::new(cmd_tx, event_tx);
        drop(cmd_rx);

        assert!(!handle.is_connected());
        assert!(matches!(
            handle.stats().await,
            Err(RegistryError::ChannelClosed)
        ));
        assert!(handle.list_entries().await.is_err());
    }
}
