//! thermod - temperature registry server
//!
//! This crate provides the server side of thermo:
//! - `registry` - Address-space registry actor mapping node ids to value slots
//! - `catalog` - Startup pre-population from a typical sensor catalog
//! - `monitor` - Poll-and-diff change monitor
//! - `status` - Periodic per-PC activity summary
//! - `server` - TCP listener for agent sessions
//! - `config` - TOML server configuration
//! - `daemon` - Wiring of all of the above
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        thermod                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ RegistryServer  │────▶│     RegistryActor           │   │
//! │  │     (TCP)       │     │  (single slot writer)       │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ connections                 │ snapshot          │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionHandler│     │     ChangeMonitor           │   │
//! │  │  (per agent)    │     │  (poll and diff)            │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod catalog;
pub mod config;
pub mod daemon;
pub mod monitor;
pub mod registry;
pub mod server;
pub mod status;
