//! Periodic per-PC activity summary.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use thermo_core::{HardwareState, HardwareType, Location, NodeId, RegistryEntry};

use crate::registry::RegistryHandle;

/// Activity of one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcStatus {
    pub location: Location,
    /// Slots with a positive value
    pub active_sensors: usize,
    /// Active slots whose hardware has been identified
    pub known_sensors: usize,
    pub hardware_types: BTreeSet<HardwareType>,
}

/// Registry-wide summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub total_nodes: usize,
    /// Slots that have received at least one write
    pub written_nodes: usize,
    pub pcs: Vec<PcStatus>,
}

impl StatusSummary {
    /// Groups positive-valued slots by machine.
    pub fn from_entries(entries: &[(NodeId, RegistryEntry)]) -> Self {
        let mut by_pc: BTreeMap<Location, PcStatus> = BTreeMap::new();

        for (_, entry) in entries.iter().filter(|(_, e)| e.value > 0.0) {
            let location = entry.metadata.location;
            let status = by_pc.entry(location).or_insert_with(|| PcStatus {
                location,
                active_sensors: 0,
                known_sensors: 0,
                hardware_types: BTreeSet::new(),
            });
            status.active_sensors += 1;
            if entry.state() == HardwareState::Known {
                status.known_sensors += 1;
            }
            status.hardware_types.insert(entry.key.hardware_type);
        }

        Self {
            total_nodes: entries.len(),
            written_nodes: entries.iter().filter(|(_, e)| e.written).count(),
            pcs: by_pc.into_values().collect(),
        }
    }

    pub fn active_pcs(&self) -> usize {
        self.pcs.len()
    }

    pub fn log(&self) {
        info!(
            nodes = self.total_nodes,
            written = self.written_nodes,
            active_pcs = self.active_pcs(),
            "Registry status"
        );
        for pc in &self.pcs {
            let kinds: Vec<&str> = pc.hardware_types.iter().map(HardwareType::as_str).collect();
            info!(
                pc = %pc.location.label(),
                active = pc.active_sensors,
                known = pc.known_sensors,
                hardware = %kinds.join(", "),
                "PC status"
            );
        }
    }
}

/// Spawns a task that logs a summary every `period`.
pub fn spawn_status_task(
    registry: RegistryHandle,
    period: Duration,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the sweep can finish first
        tick.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => break,

                _ = tick.tick() => {
                    match registry.list_entries().await {
                        Ok(entries) => StatusSummary::from_entries(&entries).log(),
                        Err(e) => warn!(error = %e, "Status summary unavailable"),
                    }
                }
            }
        }

        debug!("Status task completed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermo_core::{SensorKey, SensorMetadata};

    fn entry(loc: Location, kind: HardwareType, idx: u32, value: f64, hw: Option<&str>) -> (NodeId, RegistryEntry) {
        let key = SensorKey::new(loc, kind, idx);
        let mut e = RegistryEntry::new(key, SensorMetadata::new(hw.map(str::to_string), "t"));
        if value != 0.0 {
            e.record(value);
        }
        (NodeId::derive(&key), e)
    }

    #[test]
    fn test_groups_active_pcs() {
        let a = Location::new(1, 101, 1);
        let b = Location::new(2, 105, 3);
        let entries = vec![
            entry(a, HardwareType::CPU, 0, 45.0, Some("Intel Core i5")),
            entry(a, HardwareType::SSD, 0, 33.0, None),
            entry(a, HardwareType::HDD, 0, 0.0, None),
            entry(b, HardwareType::CPU, 0, 0.0, None),
        ];

        let summary = StatusSummary::from_entries(&entries);
        assert_eq!(summary.total_nodes, 4);
        assert_eq!(summary.written_nodes, 2);
        assert_eq!(summary.active_pcs(), 1);

        let pc = &summary.pcs[0];
        assert_eq!(pc.location, a);
        assert_eq!(pc.active_sensors, 2);
        assert_eq!(pc.known_sensors, 1);
        assert_eq!(
            pc.hardware_types,
            BTreeSet::from([HardwareType::CPU, HardwareType::SSD])
        );
    }

    #[test]
    fn test_written_zero_counts_as_written() {
        let loc = Location::new(3, 102, 4);
        let (id, mut cooled) = entry(loc, HardwareType::GpuAti, 0, 0.0, None);
        cooled.record(0.0);
        let entries = vec![(id, cooled), entry(loc, HardwareType::HDD, 0, 0.0, None)];

        let summary = StatusSummary::from_entries(&entries);
        assert_eq!(summary.total_nodes, 2);
        assert_eq!(summary.written_nodes, 1);
        assert_eq!(summary.active_pcs(), 0);
    }

    #[test]
    fn test_empty_registry() {
        let summary = StatusSummary::from_entries(&[]);
        assert_eq!(summary, StatusSummary::default());
    }
}
