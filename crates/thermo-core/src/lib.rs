//! thermo core - shared types for temperature telemetry
//!
//! This crate provides the domain types shared between the registry
//! server (thermod) and the producer agent (thermo): sensor identity,
//! deterministic node id derivation and registry entries.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod entry;
pub mod error;
pub mod node_id;
pub mod sensor;

// Re-exports for convenience
pub use entry::{EntryMetadata, HardwareState, RegistryEntry, SensorMetadata, UNKNOWN_HARDWARE};
pub use error::{DomainError, DomainResult};
pub use node_id::{derive, NodeId, NODE_ID_SPACE};
pub use sensor::{HardwareType, Location, SensorKey};
