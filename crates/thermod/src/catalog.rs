//! Startup pre-population of the address space.
//!
//! Lab machines share a handful of motherboard and disk layouts, so the
//! registry materialises slots for a typical sensor set on every machine in
//! the configured coordinate range before any agent connects. Agents with
//! different hardware still get their slots lazily on first write.

use tracing::{debug, info, warn};

use thermo_core::{HardwareType, Location, SensorKey, SensorMetadata};

use crate::config::PrepopulateConfig;
use crate::registry::RegistryHandle;

/// One expected sensor on a typical machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogSensor {
    pub hardware_type: HardwareType,
    pub sensor_index: u32,
    pub sensor_name: &'static str,
}

const fn sensor(hardware_type: HardwareType, sensor_index: u32, sensor_name: &'static str) -> CatalogSensor {
    CatalogSensor {
        hardware_type,
        sensor_index,
        sensor_name,
    }
}

/// Sensors expected on a typical lab machine.
pub const TYPICAL_SENSORS: [CatalogSensor; 22] = [
    sensor(HardwareType::CPU, 0, "CPU Core #1"),
    sensor(HardwareType::CPU, 1, "CPU Core #2"),
    sensor(HardwareType::CPU, 2, "CPU Core #3"),
    sensor(HardwareType::CPU, 3, "CPU Core #4"),
    sensor(HardwareType::CPU, 4, "CPU Package"),
    sensor(HardwareType::CPU, 5, "CPU Core #5"),
    sensor(HardwareType::CPU, 6, "CPU Core #6"),
    sensor(HardwareType::CPU, 7, "CPU Core #7"),
    sensor(HardwareType::CPU, 8, "CPU Core #8"),
    sensor(HardwareType::SuperIO, 0, "CPU Core"),
    sensor(HardwareType::SuperIO, 1, "Temperature #1"),
    sensor(HardwareType::SuperIO, 2, "Temperature #2"),
    sensor(HardwareType::SuperIO, 3, "Temperature #3"),
    sensor(HardwareType::SuperIO, 4, "Temperature #4"),
    sensor(HardwareType::SuperIO, 5, "Temperature #5"),
    sensor(HardwareType::GpuNvidia, 0, "GPU Core"),
    sensor(HardwareType::GpuAti, 0, "GPU Core"),
    sensor(HardwareType::HDD, 0, "Temperature"),
    sensor(HardwareType::HDD, 1, "Temperature"),
    sensor(HardwareType::HDD, 2, "Temperature"),
    sensor(HardwareType::SSD, 0, "Temperature"),
    sensor(HardwareType::SSD, 1, "Temperature"),
];

/// Counts from one pre-population sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Keys visited
    pub attempted: usize,
    /// Slots newly materialised
    pub created: usize,
    /// Keys that resolved to an existing slot
    pub existing: usize,
    /// Keys whose creation failed and were skipped
    pub failed: usize,
}

/// Every location in the configured range.
pub fn locations(config: &PrepopulateConfig) -> impl Iterator<Item = Location> + '_ {
    config.buildings.iter().flat_map(move |building| {
        config.rooms.iter().flat_map(move |room| {
            config
                .pcs
                .iter()
                .map(move |pc| Location::new(building, room, pc))
        })
    })
}

/// Every catalog key for every location in the configured range.
pub fn catalog_keys(config: &PrepopulateConfig) -> impl Iterator<Item = (SensorKey, &'static str)> + '_ {
    locations(config).flat_map(|location| {
        TYPICAL_SENSORS.iter().map(move |s| {
            (
                SensorKey::new(location, s.hardware_type, s.sensor_index),
                s.sensor_name,
            )
        })
    })
}

/// Materialises catalog slots for the configured range.
///
/// A failed slot is logged and skipped; the sweep always runs to the end
/// unless the registry itself goes away.
pub async fn prepopulate(registry: &RegistryHandle, config: &PrepopulateConfig) -> SweepReport {
    let mut report = SweepReport::default();

    info!(
        buildings = %config.buildings,
        rooms = %config.rooms,
        pcs = %config.pcs,
        sensors_per_pc = TYPICAL_SENSORS.len(),
        "Pre-populating address space"
    );

    for (key, sensor_name) in catalog_keys(config) {
        report.attempted += 1;
        match registry
            .get_or_create(key, SensorMetadata::unknown(sensor_name))
            .await
        {
            Ok(handle) if handle.created => report.created += 1,
            Ok(handle) => {
                debug!(key = %key, node_id = %handle.node_id, "Catalog slot already present");
                report.existing += 1;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to create catalog slot, skipping");
                report.failed += 1;
                if !registry.is_connected() {
                    break;
                }
            }
        }
    }

    info!(
        attempted = report.attempted,
        created = report.created,
        existing = report.existing,
        failed = report.failed,
        "Pre-population complete"
    );
    report
}
