//! Registry entry types: the value slot and descriptive metadata for a node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node_id::NodeId;
use crate::sensor::{Location, SensorKey};

/// Hardware name placeholder used by probes that could not resolve one.
pub const UNKNOWN_HARDWARE: &str = "Unknown";

// ============================================================================
// Sensor Metadata
// ============================================================================

/// Descriptive metadata sent alongside a reading.
///
/// `hardware_name` is `None` while the hardware is unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SensorMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_name: Option<String>,
    pub sensor_name: String,
}

impl SensorMetadata {
    /// Creates metadata, treating empty or `"Unknown"` hardware names as unresolved.
    pub fn new(hardware_name: Option<String>, sensor_name: impl Into<String>) -> Self {
        let hardware_name = hardware_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty() && name != UNKNOWN_HARDWARE);
        Self {
            hardware_name,
            sensor_name: sensor_name.into(),
        }
    }

    /// Metadata with an unresolved hardware name.
    pub fn unknown(sensor_name: impl Into<String>) -> Self {
        Self::new(None, sensor_name)
    }

    pub fn state(&self) -> HardwareState {
        if self.hardware_name.is_some() {
            HardwareState::Known
        } else {
            HardwareState::Unknown
        }
    }
}

/// Whether the hardware behind a slot has been identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareState {
    Known,
    Unknown,
}

// ============================================================================
// Registry Entry
// ============================================================================

/// Metadata stored with a registry slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub hardware_name: Option<String>,
    pub sensor_name: String,
    pub location: Location,
    pub created_at: DateTime<Utc>,
}

/// One address-space slot: latest value plus metadata.
///
/// Entries are never removed during the registry's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Key that first created this slot. Later keys colliding on the same
    /// node id share the slot but do not replace this.
    pub key: SensorKey,
    pub value: f64,
    pub metadata: EntryMetadata,
    /// False until the first write after creation.
    pub written: bool,
}

impl RegistryEntry {
    /// Creates an empty slot with value `0.0`.
    pub fn new(key: SensorKey, metadata: SensorMetadata) -> Self {
        Self {
            key,
            value: 0.0,
            metadata: EntryMetadata {
                hardware_name: metadata.hardware_name,
                sensor_name: metadata.sensor_name,
                location: key.location,
                created_at: Utc::now(),
            },
            written: false,
        }
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::derive(&self.key)
    }

    pub fn display_name(&self) -> String {
        self.key.display_name()
    }

    pub fn state(&self) -> HardwareState {
        if self.metadata.hardware_name.is_some() {
            HardwareState::Known
        } else {
            HardwareState::Unknown
        }
    }

    /// Applies incoming metadata, only ever moving Unknown -> Known.
    ///
    /// Returns true when the stored metadata changed.
    pub fn upgrade_metadata(&mut self, incoming: &SensorMetadata) -> bool {
        if self.metadata.hardware_name.is_some() {
            return false;
        }
        match &incoming.hardware_name {
            Some(name) => {
                self.metadata.hardware_name = Some(name.clone());
                if !incoming.sensor_name.is_empty() {
                    self.metadata.sensor_name = incoming.sensor_name.clone();
                }
                true
            }
            None => false,
        }
    }

    /// Stores a new value.
    pub fn record(&mut self, value: f64) {
        self.value = value;
        self.written = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::HardwareType;

    fn test_key() -> SensorKey {
        SensorKey::new(Location::new(1, 101, 1), HardwareType::CPU, 2)
    }

    #[test]
    fn test_metadata_normalizes_unknown() {
        assert_eq!(SensorMetadata::new(Some("Unknown".into()), "x").hardware_name, None);
        assert_eq!(SensorMetadata::new(Some("  ".into()), "x").hardware_name, None);
        assert_eq!(
            SensorMetadata::new(Some("Intel Core i5".into()), "x").state(),
            HardwareState::Known
        );
    }

    #[test]
    fn test_new_entry_defaults() {
        let entry = RegistryEntry::new(test_key(), SensorMetadata::unknown("CPU Core #3"));
        assert_eq!(entry.value, 0.0);
        assert!(!entry.written);
        assert_eq!(entry.state(), HardwareState::Unknown);
        assert_eq!(entry.metadata.location, Location::new(1, 101, 1));
        assert_eq!(entry.display_name(), "B1_R101_P1_CPU_2");
        assert_eq!(entry.node_id().get(), 415_735);
    }

    #[test]
    fn test_upgrade_unknown_to_known() {
        let mut entry = RegistryEntry::new(test_key(), SensorMetadata::unknown("CPU Core #3"));
        let changed = entry.upgrade_metadata(&SensorMetadata::new(
            Some("Intel Core i7-8700".into()),
            "CPU Core #3",
        ));
        assert!(changed);
        assert_eq!(entry.state(), HardwareState::Known);
        assert_eq!(
            entry.metadata.hardware_name.as_deref(),
            Some("Intel Core i7-8700")
        );
    }

    #[test]
    fn test_never_downgrades() {
        let mut entry = RegistryEntry::new(
            test_key(),
            SensorMetadata::new(Some("Intel Core i7-8700".into()), "CPU Core #3"),
        );
        assert!(!entry.upgrade_metadata(&SensorMetadata::unknown("something else")));
        assert_eq!(
            entry.metadata.hardware_name.as_deref(),
            Some("Intel Core i7-8700")
        );
        assert_eq!(entry.metadata.sensor_name, "CPU Core #3");

        // A different resolved name does not replace the first one either.
        assert!(!entry.upgrade_metadata(&SensorMetadata::new(Some("AMD".into()), "Tctl")));
        assert_eq!(
            entry.metadata.hardware_name.as_deref(),
            Some("Intel Core i7-8700")
        );
    }

    #[test]
    fn test_record_marks_written() {
        let mut entry = RegistryEntry::new(test_key(), SensorMetadata::unknown("t"));
        entry.record(42.3);
        assert!(entry.written);
        assert_eq!(entry.value, 42.3);
    }
}
