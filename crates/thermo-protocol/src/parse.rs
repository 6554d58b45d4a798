//! Validation of raw probe output into typed readings.
//!
//! Probes report loosely typed data (string hardware categories, signed
//! indices, whatever float the driver produced). This module is the
//! boundary where that data is checked before it reaches the node id
//! deriver.

use serde::{Deserialize, Serialize};
use thermo_core::{DomainError, DomainResult, Location, SensorKey, SensorMetadata};

/// Untrusted reading as enumerated by a hardware probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSensorReading {
    pub hardware_type: String,
    #[serde(default)]
    pub hardware_name: Option<String>,
    pub sensor_index: i64,
    pub sensor_name: String,
    pub temperature: f64,
}

impl RawSensorReading {
    /// Validates the reading for a machine at `location`.
    pub fn to_reading(&self, location: Location) -> DomainResult<SensorReading> {
        let key = SensorKey::parse(location, &self.hardware_type, self.sensor_index)?;
        if !self.temperature.is_finite() {
            return Err(DomainError::InvalidTemperature {
                sensor: key.display_name(),
                value: self.temperature,
            });
        }
        Ok(SensorReading {
            key,
            metadata: SensorMetadata::new(self.hardware_name.clone(), self.sensor_name.as_str()),
            temperature: self.temperature,
        })
    }
}

/// Validated reading ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub key: SensorKey,
    pub metadata: SensorMetadata,
    pub temperature: f64,
}
