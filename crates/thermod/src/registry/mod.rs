//! Address-space registry using the actor pattern.
//!
//! The registry maps derived node ids to value slots. It receives commands
//! via a tokio mpsc channel and is the only place slots are created or
//! mutated.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ Connections /   │────▶│  RegistryActor  │────▶│ Broadcast Channel│
//! │ catalog sweep   │     └─────────────────┘     └──────────────────┘
//! └─────────────────┘             │                        │
//!         │   RegistryCommand     │   RegistryEvent        │
//!         │   (mpsc channel)      │   (broadcast)          │
//!         ▼                       ▼                        ▼
//!   get_or_create / write   HashMap<NodeId,          monitor, logs
//!                           RegistryEntry>
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;

pub use actor::{RegistryActor, MAX_ENTRIES};
pub use commands::{NodeHandle, RegistryCommand, RegistryError, RegistryEvent, RegistryStats};
pub use handle::RegistryHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 1024;

/// Spawns the registry actor and returns a handle for interaction.
///
/// # Example
///
/// ```no_run
/// use thermod::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry();
///     let entries = handle.list_entries().await;
/// }
/// ```
pub fn spawn_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone());
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}
