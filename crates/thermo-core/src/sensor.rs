//! Sensor identity: physical location, hardware category and sensor key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

// ============================================================================
// Location
// ============================================================================

/// Physical coordinate of a machine: building, room and PC number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub building: u32,
    pub room: u32,
    pub pc: u32,
}

impl Location {
    pub const fn new(building: u32, room: u32, pc: u32) -> Self {
        Self { building, room, pc }
    }

    /// Builds a location from signed input, rejecting negative coordinates.
    pub fn try_new(building: i64, room: i64, pc: i64) -> DomainResult<Self> {
        Ok(Self {
            building: coordinate("building", building)?,
            room: coordinate("room", room)?,
            pc: coordinate("pc", pc)?,
        })
    }

    /// Short label used when grouping sensors per machine, e.g. `B1_R101_P1`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("B{}_R{}_P{}", self.building, self.room, self.pc)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.building, self.room, self.pc)
    }
}

/// Converts a signed coordinate into the unsigned domain.
pub(crate) fn coordinate(field: &'static str, value: i64) -> DomainResult<u32> {
    u32::try_from(value).map_err(|_| DomainError::InvalidCoordinate { field, value })
}

// ============================================================================
// Hardware Type
// ============================================================================

/// Category of hardware a temperature sensor belongs to.
///
/// The `as_str` spelling is part of the node id derivation and must never
/// change.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HardwareType {
    Mainboard,
    SuperIO,
    CPU,
    RAM,
    GpuNvidia,
    GpuAti,
    TBalancer,
    Heatmaster,
    HDD,
    SSD,
    Network,
}

impl HardwareType {
    /// All known categories, in probe numbering order.
    pub const ALL: [HardwareType; 11] = [
        Self::Mainboard,
        Self::SuperIO,
        Self::CPU,
        Self::RAM,
        Self::GpuNvidia,
        Self::GpuAti,
        Self::TBalancer,
        Self::Heatmaster,
        Self::HDD,
        Self::SSD,
        Self::Network,
    ];

    /// Canonical name used in node id derivation and display names.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainboard => "Mainboard",
            Self::SuperIO => "SuperIO",
            Self::CPU => "CPU",
            Self::RAM => "RAM",
            Self::GpuNvidia => "GpuNvidia",
            Self::GpuAti => "GpuAti",
            Self::TBalancer => "TBalancer",
            Self::Heatmaster => "Heatmaster",
            Self::HDD => "HDD",
            Self::SSD => "SSD",
            Self::Network => "Network",
        }
    }

    /// Maps a probe's numeric hardware code onto a category.
    pub fn from_code(code: i64) -> DomainResult<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .ok_or_else(|| DomainError::InvalidKind {
                kind: format!("Unknown{code}"),
            })
    }
}

impl fmt::Display for HardwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HardwareType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DomainError::InvalidKind {
                kind: s.to_string(),
            })
    }
}

// ============================================================================
// Sensor Key
// ============================================================================

/// Identifies one physical sensor: where it is, what it is attached to,
/// and its index on that hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorKey {
    pub location: Location,
    pub hardware_type: HardwareType,
    pub sensor_index: u32,
}

impl SensorKey {
    pub const fn new(location: Location, hardware_type: HardwareType, sensor_index: u32) -> Self {
        Self {
            location,
            hardware_type,
            sensor_index,
        }
    }

    /// Validates untrusted key parts (e.g. from the wire or a probe).
    pub fn parse(location: Location, hardware_type: &str, sensor_index: i64) -> DomainResult<Self> {
        Ok(Self {
            location,
            hardware_type: hardware_type.parse()?,
            sensor_index: coordinate("sensor_index", sensor_index)?,
        })
    }

    /// Canonical string form hashed by the node id deriver.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!(
            "{}.{}.{}.{}.{}",
            self.location.building,
            self.location.room,
            self.location.pc,
            self.hardware_type.as_str(),
            self.sensor_index
        )
    }

    /// Human-readable slot name, e.g. `B1_R101_P1_CPU_2`.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!(
            "{}_{}_{}",
            self.location.label(),
            self.hardware_type.as_str(),
            self.sensor_index
        )
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_rejects_negative() {
        assert_eq!(
            Location::try_new(1, -101, 1),
            Err(DomainError::InvalidCoordinate {
                field: "room",
                value: -101
            })
        );
        assert_eq!(Location::try_new(1, 101, 1), Ok(Location::new(1, 101, 1)));
    }

    #[test]
    fn test_location_label() {
        assert_eq!(Location::new(2, 105, 3).label(), "B2_R105_P3");
    }

    #[test]
    fn test_hardware_type_roundtrip_names() {
        for kind in HardwareType::ALL {
            assert_eq!(kind.as_str().parse::<HardwareType>(), Ok(kind));
        }
    }

    #[test]
    fn test_hardware_type_unknown_rejected() {
        let err = "Toaster".parse::<HardwareType>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidKind { .. }));
        // Case matters: the spelling feeds the hash.
        assert!("cpu".parse::<HardwareType>().is_err());
    }

    #[test]
    fn test_hardware_type_from_code() {
        assert_eq!(HardwareType::from_code(2), Ok(HardwareType::CPU));
        assert_eq!(HardwareType::from_code(10), Ok(HardwareType::Network));
        assert_eq!(
            HardwareType::from_code(11),
            Err(DomainError::InvalidKind {
                kind: "Unknown11".to_string()
            })
        );
        assert!(HardwareType::from_code(-1).is_err());
    }

    #[test]
    fn test_sensor_key_canonical_and_display() {
        let key = SensorKey::new(Location::new(1, 101, 1), HardwareType::CPU, 2);
        assert_eq!(key.canonical(), "1.101.1.CPU.2");
        assert_eq!(key.display_name(), "B1_R101_P1_CPU_2");
    }

    #[test]
    fn test_sensor_key_parse_rejects_bad_parts() {
        let loc = Location::new(1, 101, 1);
        assert!(SensorKey::parse(loc, "GpuNvidia", 0).is_ok());
        assert!(matches!(
            SensorKey::parse(loc, "Unknown12", 0),
            Err(DomainError::InvalidKind { .. })
        ));
        assert!(matches!(
            SensorKey::parse(loc, "CPU", -1),
            Err(DomainError::InvalidCoordinate {
                field: "sensor_index",
                ..
            })
        ));
    }

    #[test]
    fn test_sensor_key_serde() {
        let key = SensorKey::new(Location::new(1, 101, 1), HardwareType::SSD, 0);
        let json = serde_json::to_string(&key).unwrap();
        assert!(json.contains("\"hardware_type\":\"SSD\""));
        let back: SensorKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
