//! Hardware probes.
//!
//! A probe enumerates temperature sensors as untrusted
//! `RawSensorReading`s; validation happens later in
//! `RawSensorReading::to_reading`.

use std::collections::HashMap;

use sysinfo::{Components, CpuRefreshKind, RefreshKind, System};
use thermo_core::HardwareType;
use thermo_protocol::RawSensorReading;
use tracing::debug;

/// Source of temperature readings.
pub trait SensorProbe: Send {
    /// Current readings, limited to sensors with a present non-zero value.
    fn enumerate_sensors(&mut self) -> Vec<RawSensorReading>;
}

/// Maps a sensor chip label onto a hardware category.
///
/// Labels come from the platform (hwmon chip names on Linux, SMC keys on
/// macOS) and are matched case-insensitively on known fragments.
pub fn classify_label(label: &str) -> HardwareType {
    let label = label.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| label.contains(n));

    if has(&["amdgpu", "radeon"]) {
        HardwareType::GpuAti
    } else if has(&["nvidia", "gpu"]) {
        HardwareType::GpuNvidia
    } else if has(&["coretemp", "k10temp", "zenpower", "cpu", "package", "core", "tctl", "tdie"]) {
        HardwareType::CPU
    } else if has(&["nvme", "ssd"]) {
        HardwareType::SSD
    } else if has(&["drivetemp", "hdd", "sata", "disk"]) {
        HardwareType::HDD
    } else if has(&["dimm", "memory", "ram", "spd"]) {
        HardwareType::RAM
    } else if has(&["iwlwifi", "wifi", "eth", "network"]) {
        HardwareType::Network
    } else if has(&["nct", "it87", "w83", "superio"]) {
        HardwareType::SuperIO
    } else {
        HardwareType::Mainboard
    }
}

/// Probe backed by `sysinfo` components.
pub struct SysinfoProbe {
    components: Components,
    cpu_brand: Option<String>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let system =
            System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::new()));
        let cpu_brand = system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty());

        Self {
            components: Components::new_with_refreshed_list(),
            cpu_brand,
        }
    }

    fn hardware_name(&self, hardware_type: HardwareType, label: &str) -> Option<String> {
        if hardware_type == HardwareType::CPU {
            if let Some(brand) = &self.cpu_brand {
                return Some(brand.clone());
            }
        }
        label.split_whitespace().next().map(str::to_string)
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorProbe for SysinfoProbe {
    fn enumerate_sensors(&mut self) -> Vec<RawSensorReading> {
        self.components.refresh();

        let mut next_index: HashMap<HardwareType, i64> = HashMap::new();
        let mut readings = Vec::new();
        for component in self.components.list() {
            let temperature = f64::from(component.temperature());
            if !temperature.is_finite() || temperature == 0.0 {
                continue;
            }

            let label = component.label();
            let hardware_type = classify_label(label);
            let index = next_index.entry(hardware_type).or_insert(0);
            readings.push(RawSensorReading {
                hardware_type: hardware_type.as_str().to_string(),
                hardware_name: self.hardware_name(hardware_type, label),
                sensor_index: *index,
                sensor_name: label.to_string(),
                temperature,
            });
            *index += 1;
        }

        debug!(count = readings.len(), "Enumerated sensors");
        readings
    }
}

/// Fixed readings, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    readings: Vec<RawSensorReading>,
}

impl StaticProbe {
    pub fn new(readings: Vec<RawSensorReading>) -> Self {
        Self { readings }
    }

    /// Replaces the readings returned by later calls.
    pub fn set(&mut self, readings: Vec<RawSensorReading>) {
        self.readings = readings;
    }
}

impl SensorProbe for StaticProbe {
    fn enumerate_sensors(&mut self) -> Vec<RawSensorReading> {
        self.readings
            .iter()
            .filter(|r| r.temperature.is_finite() && r.temperature != 0.0)
            .cloned()
            .collect()
    }
}
