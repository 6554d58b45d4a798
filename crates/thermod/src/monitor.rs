//! Change monitor for the registry.
//!
//! Polls the registry on a fixed interval, diffs each value against the
//! previous poll and reports slots whose temperature moved. Detection is
//! poll-and-diff, so `poll_interval` trades report latency against load on
//! the registry actor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Registry failures are logged and retried, never propagated as panics

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use thermo_core::NodeId;

use crate::registry::RegistryHandle;

/// Default poll period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default minimum change reported.
pub const DEFAULT_EPSILON: f64 = 0.1;

/// Back-off after a failed snapshot.
pub const SNAPSHOT_RETRY_DELAY: Duration = Duration::from_secs(1);

const EVENT_BUFFER: usize = 256;

/// A slot whose value moved between two polls.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub node_id: NodeId,
    pub display_name: String,
    pub value: f64,
    /// `None` when the slot was absent from the previous poll
    pub previous: Option<f64>,
    pub hardware_name: Option<String>,
    pub sensor_name: String,
}

/// Monitor tunables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub epsilon: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// Node ids that changed between two snapshots, ordered by node id.
///
/// A slot counts as changed when it is new or moved by more than `epsilon`,
/// and only while its current value is positive.
pub fn detect_changes(
    previous: &HashMap<NodeId, f64>,
    current: &HashMap<NodeId, f64>,
    epsilon: f64,
) -> Vec<(NodeId, Option<f64>)> {
    let mut changed: Vec<_> = current
        .iter()
        .filter(|(_, value)| **value > 0.0)
        .filter_map(|(id, value)| match previous.get(id) {
            None => Some((*id, None)),
            Some(prev) if (value - prev).abs() > epsilon => Some((*id, Some(*prev))),
            Some(_) => None,
        })
        .collect();
    changed.sort_by_key(|(id, _)| *id);
    changed
}

/// Poll-and-diff state over one registry.
pub struct ChangeMonitor {
    registry: RegistryHandle,
    config: MonitorConfig,
    last_snapshot: HashMap<NodeId, f64>,
    events: broadcast::Sender<ChangeEvent>,
}

impl ChangeMonitor {
    pub fn new(registry: RegistryHandle, config: MonitorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            registry,
            config,
            last_snapshot: HashMap::new(),
            events,
        }
    }

    /// Subscribes to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    /// Runs one poll cycle and returns the changes it found.
    ///
    /// The stored snapshot is replaced wholesale on success.
    pub async fn poll(&mut self) -> Result<Vec<ChangeEvent>, crate::registry::RegistryError> {
        let current = self.registry.snapshot().await?;
        let changed = detect_changes(&self.last_snapshot, &current, self.config.epsilon);

        let mut events = Vec::with_capacity(changed.len());
        for (node_id, previous) in changed {
            let value = current.get(&node_id).copied().unwrap_or_default();
            let event = match self.registry.get_entry(node_id).await {
                Some(entry) => ChangeEvent {
                    node_id,
                    display_name: entry.display_name(),
                    value,
                    previous,
                    hardware_name: entry.metadata.hardware_name,
                    sensor_name: entry.metadata.sensor_name,
                },
                None => ChangeEvent {
                    node_id,
                    display_name: node_id.to_string(),
                    value,
                    previous,
                    hardware_name: None,
                    sensor_name: String::new(),
                },
            };
            log_change(&event);
            let _ = self.events.send(event.clone());
            events.push(event);
        }

        self.last_snapshot = current;
        Ok(events)
    }

    /// Runs until the token is cancelled.
    pub async fn run(mut self, cancel_token: CancellationToken) {
        let mut tick = interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.config.poll_interval.as_millis() as u64,
            epsilon = self.config.epsilon,
            "Change monitor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Change monitor shutting down");
                    break;
                }

                _ = tick.tick() => {}
            }

            // The poll itself is cancellable so a stuck registry can't hold up shutdown
            let result = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                result = self.poll() => result,
            };

            if let Err(e) = result {
                error!(error = %e, "Registry snapshot failed");
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = sleep(SNAPSHOT_RETRY_DELAY) => {}
                }
            }
        }

        debug!("Change monitor task completed");
    }
}

/// Spawns the change monitor task.
///
/// Returns the join handle and a receiver for change events.
pub fn spawn_monitor_task(
    registry: RegistryHandle,
    config: MonitorConfig,
    cancel_token: CancellationToken,
) -> (tokio::task::JoinHandle<()>, broadcast::Receiver<ChangeEvent>) {
    let monitor = ChangeMonitor::new(registry, config);
    let events = monitor.subscribe();
    (tokio::spawn(monitor.run(cancel_token)), events)
}

fn log_change(event: &ChangeEvent) {
    match &event.hardware_name {
        Some(hardware) => info!(
            node_id = %event.node_id,
            display_name = %event.display_name,
            temperature = format!("{:.1}", event.value),
            hardware = %hardware,
            sensor = %event.sensor_name,
            "Temperature changed"
        ),
        None => info!(
            node_id = %event.node_id,
            display_name = %event.display_name,
            temperature = format!("{:.1}", event.value),
            "Temperature changed"
        ),
    }
}
