// Scripted sources replaying fixed readings. Once a script runs out the
// last step repeats.

use std::collections::VecDeque;

use super::source::{
    BatterySource, BatteryStatus, ComponentTemperature, CpuSource, InterfaceCounters,
    NetworkSource, ThermalSource,
};
use crate::error::SamplerError;
use crate::model::SamplerKind;

fn next<T: Clone>(steps: &mut VecDeque<T>) -> Option<T> {
    if steps.len() > 1 {
        steps.pop_front()
    } else {
        steps.front().cloned()
    }
}

/// `None` steps fail the read.
pub struct ScriptedNetwork {
    steps: VecDeque<Option<Vec<InterfaceCounters>>>,
}

impl ScriptedNetwork {
    /// Each step lists `(name, received, transmitted)`.
    pub fn new(steps: Vec<Vec<(&str, u64, u64)>>) -> Self {
        Self {
            steps: steps
                .into_iter()
                .map(|ifaces| {
                    Some(
                        ifaces
                            .into_iter()
                            .map(|(name, received, transmitted)| InterfaceCounters {
                                name: name.to_owned(),
                                received,
                                transmitted,
                            })
                            .collect(),
                    )
                })
                .collect(),
        }
    }

    pub fn failing() -> Self {
        Self {
            steps: VecDeque::from([None]),
        }
    }
}

impl NetworkSource for ScriptedNetwork {
    fn interfaces(&mut self) -> Result<Vec<InterfaceCounters>, SamplerError> {
        next(&mut self.steps)
            .flatten()
            .ok_or_else(|| SamplerError::new(SamplerKind::Network, "scripted failure"))
    }
}

pub struct ScriptedCpu {
    steps: VecDeque<Option<f64>>,
}

impl ScriptedCpu {
    pub fn new(steps: impl IntoIterator<Item = Option<f64>>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }
}

impl CpuSource for ScriptedCpu {
    fn usage(&mut self) -> Result<f64, SamplerError> {
        next(&mut self.steps)
            .flatten()
            .ok_or_else(|| SamplerError::new(SamplerKind::Cpu, "scripted failure"))
    }
}

pub struct ScriptedBattery {
    steps: VecDeque<Option<BatteryStatus>>,
}

impl ScriptedBattery {
    /// `None` steps mean "no battery present".
    pub fn new(steps: Vec<Option<BatteryStatus>>) -> Self {
        Self {
            steps: steps.into(),
        }
    }
}

impl BatterySource for ScriptedBattery {
    fn status(&mut self) -> Result<Option<BatteryStatus>, SamplerError> {
        Ok(next(&mut self.steps).flatten())
    }
}

pub struct ScriptedThermal {
    steps: VecDeque<Vec<ComponentTemperature>>,
}

impl ScriptedThermal {
    /// Each step lists `(label, celsius, critical)`.
    pub fn new(steps: Vec<Vec<(&str, f64, Option<f64>)>>) -> Self {
        Self {
            steps: steps
                .into_iter()
                .map(|sensors| {
                    sensors
                        .into_iter()
                        .map(|(label, celsius, critical)| ComponentTemperature {
                            label: label.to_owned(),
                            celsius,
                            critical,
                        })
                        .collect()
                })
                .collect(),
        }
    }
}

impl ThermalSource for ScriptedThermal {
    fn temperatures(&mut self) -> Result<Vec<ComponentTemperature>, SamplerError> {
        Ok(next(&mut self.steps).unwrap_or_default())
    }
}
