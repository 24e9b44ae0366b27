// ── OS sources ──
//
// Thin traits over the raw OS reads so samplers stay testable. The
// production implementations use sysinfo, plus the Linux power_supply
// class for the battery.

use std::fs;
use std::path::{Path, PathBuf};

use sysinfo::{Components, Networks, System};

use crate::error::SamplerError;
use crate::model::SamplerKind;

/// Cumulative byte counters of one interface since it came up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub received: u64,
    pub transmitted: u64,
}

/// One temperature sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentTemperature {
    pub label: String,
    pub celsius: f64,
    pub critical: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryStatus {
    /// Charge, 0.0 ..= 1.0.
    pub level: f64,
    pub charging: bool,
}

pub trait NetworkSource: Send {
    fn interfaces(&mut self) -> Result<Vec<InterfaceCounters>, SamplerError>;
}

pub trait CpuSource: Send {
    /// Busy percentage since the previous call.
    fn usage(&mut self) -> Result<f64, SamplerError>;
}

pub trait BatterySource: Send {
    /// `Ok(None)` when the host has no battery.
    fn status(&mut self) -> Result<Option<BatteryStatus>, SamplerError>;
}

pub trait ThermalSource: Send {
    fn temperatures(&mut self) -> Result<Vec<ComponentTemperature>, SamplerError>;
}

/// The four sources a coordinator samples from.
pub struct Sources {
    pub network: Box<dyn NetworkSource>,
    pub cpu: Box<dyn CpuSource>,
    pub battery: Box<dyn BatterySource>,
    pub thermal: Box<dyn ThermalSource>,
}

impl std::fmt::Debug for Sources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sources").finish_non_exhaustive()
    }
}

impl Sources {
    /// Sources backed by the running host.
    pub fn system() -> Self {
        Self {
            network: Box::new(SysNetworks::new()),
            cpu: Box::new(SysCpu::new()),
            battery: Box::new(PowerSupply::default()),
            thermal: Box::new(SysComponents::new()),
        }
    }
}

// ── sysinfo ──────────────────────────────────────────────────────────

pub struct SysNetworks {
    networks: Networks,
}

impl SysNetworks {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysNetworks {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSource for SysNetworks {
    fn interfaces(&mut self) -> Result<Vec<InterfaceCounters>, SamplerError> {
        self.networks.refresh();
        Ok(self
            .networks
            .list()
            .iter()
            .map(|(name, data)| InterfaceCounters {
                name: name.clone(),
                received: data.total_received(),
                transmitted: data.total_transmitted(),
            })
            .collect())
    }
}

pub struct SysCpu {
    system: System,
}

impl SysCpu {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for SysCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSource for SysCpu {
    fn usage(&mut self) -> Result<f64, SamplerError> {
        self.system.refresh_cpu_all();
        if self.system.cpus().is_empty() {
            return Err(SamplerError::new(SamplerKind::Cpu, "no CPUs reported"));
        }
        Ok(f64::from(self.system.global_cpu_usage()))
    }
}

pub struct SysComponents {
    components: Components,
}

impl SysComponents {
    pub fn new() -> Self {
        Self {
            components: Components::new_with_refreshed_list(),
        }
    }
}

impl Default for SysComponents {
    fn default() -> Self {
        Self::new()
    }
}

impl ThermalSource for SysComponents {
    fn temperatures(&mut self) -> Result<Vec<ComponentTemperature>, SamplerError> {
        self.components.refresh();
        Ok(self
            .components
            .list()
            .iter()
            .map(|c| ComponentTemperature {
                label: c.label().to_owned(),
                celsius: f64::from(c.temperature()),
                critical: c.critical().map(f64::from),
            })
            .collect())
    }
}

// ── /sys/class/power_supply ──────────────────────────────────────────

/// Battery status from the Linux power_supply class. Hosts without the
/// directory (or without a battery entry) report no battery.
#[derive(Debug, Clone)]
pub struct PowerSupply {
    root: PathBuf,
}

impl Default for PowerSupply {
    fn default() -> Self {
        Self::at("/sys/class/power_supply")
    }
}

impl PowerSupply {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_battery(dir: &Path) -> Result<BatteryStatus, SamplerError> {
        let read = |name: &str| {
            fs::read_to_string(dir.join(name))
                .map(|s| s.trim().to_owned())
                .map_err(|e| SamplerError::new(SamplerKind::Battery, format!("{name}: {e}")))
        };

        let capacity: f64 = read("capacity")?
            .parse()
            .map_err(|e| SamplerError::new(SamplerKind::Battery, format!("capacity: {e}")))?;
        let status = read("status").unwrap_or_default();

        Ok(BatteryStatus {
            level: (capacity / 100.0).clamp(0.0, 1.0),
            charging: matches!(status.as_str(), "Charging" | "Full"),
        })
    }
}

impl BatterySource for PowerSupply {
    fn status(&mut self) -> Result<Option<BatteryStatus>, SamplerError> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Ok(None);
        };

        let mut batteries: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                fs::read_to_string(p.join("type")).is_ok_and(|t| t.trim() == "Battery")
            })
            .collect();
        batteries.sort();

        match batteries.first() {
            Some(dir) => Self::read_battery(dir).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn supply(dir: &Path, name: &str, kind: &str, capacity: &str, status: &str) {
        let d = dir.join(name);
        fs::create_dir_all(&d).unwrap();
        fs::write(d.join("type"), format!("{kind}\n")).unwrap();
        fs::write(d.join("capacity"), format!("{capacity}\n")).unwrap();
        fs::write(d.join("status"), format!("{status}\n")).unwrap();
    }

    #[test]
    fn reads_first_battery() {
        let dir = tempfile::tempdir().unwrap();
        supply(dir.path(), "AC", "Mains", "0", "Unknown");
        supply(dir.path(), "BAT0", "Battery", "64", "Discharging");

        let status = PowerSupply::at(dir.path()).status().unwrap().unwrap();
        assert!((status.level - 0.64).abs() < 1e-9);
        assert!(!status.charging);
    }

    #[test]
    fn no_battery_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        supply(dir.path(), "AC", "Mains", "0", "Unknown");
        assert!(PowerSupply::at(dir.path()).status().unwrap().is_none());
        assert!(PowerSupply::at(dir.path().join("missing")).status().unwrap().is_none());
    }

    #[test]
    fn garbage_capacity_is_a_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        supply(dir.path(), "BAT0", "Battery", "lots", "Charging");
        let err = PowerSupply::at(dir.path()).status().unwrap_err();
        assert_eq!(err.kind, SamplerKind::Battery);
    }
}
