// ── Thermal sampler ──
//
// Maps the hottest sensor, relative to its own critical temperature, to
// the four-step thermal state.

use chrono::{DateTime, Utc};

use super::Sampler;
use super::source::ThermalSource;
use crate::error::SamplerError;
use crate::model::{SamplerKind, ThermalState};

/// Assumed critical temperature for sensors that do not report one.
pub const DEFAULT_CRITICAL_CELSIUS: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThermalReading {
    pub state: ThermalState,
    pub hottest_celsius: Option<f64>,
}

pub struct ThermalSampler {
    source: Box<dyn ThermalSource>,
}

impl ThermalSampler {
    pub fn new(source: Box<dyn ThermalSource>) -> Self {
        Self { source }
    }
}

/// State for a temperature at `ratio` of critical.
pub fn state_for_ratio(ratio: f64) -> ThermalState {
    if ratio < 0.70 {
        ThermalState::Nominal
    } else if ratio < 0.85 {
        ThermalState::Fair
    } else if ratio < 0.95 {
        ThermalState::Serious
    } else {
        ThermalState::Critical
    }
}

impl Sampler for ThermalSampler {
    type Reading = ThermalReading;

    fn kind(&self) -> SamplerKind {
        SamplerKind::Thermal
    }

    fn sample(&mut self, _now: DateTime<Utc>) -> Result<ThermalReading, SamplerError> {
        let mut worst: Option<(f64, f64)> = None;
        for sensor in self.source.temperatures()? {
            if !sensor.celsius.is_finite() || sensor.celsius <= 0.0 {
                continue;
            }
            let critical = sensor
                .critical
                .filter(|c| c.is_finite() && *c > 0.0)
                .unwrap_or(DEFAULT_CRITICAL_CELSIUS);
            let ratio = sensor.celsius / critical;
            if worst.is_none_or(|(r, _)| ratio > r) {
                worst = Some((ratio, sensor.celsius));
            }
        }

        Ok(worst.map_or_else(ThermalReading::default, |(ratio, celsius)| ThermalReading {
            state: state_for_ratio(ratio),
            hottest_celsius: Some(celsius),
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sampler::scripted::ScriptedThermal;

    #[test]
    fn ratio_bands() {
        assert_eq!(state_for_ratio(0.5), ThermalState::Nominal);
        assert_eq!(state_for_ratio(0.70), ThermalState::Fair);
        assert_eq!(state_for_ratio(0.90), ThermalState::Serious);
        assert_eq!(state_for_ratio(0.95), ThermalState::Critical);
    }

    #[test]
    fn hottest_relative_sensor_wins() {
        // 80/100 = 0.8 (fair) vs 60/65 ≈ 0.92 (serious)
        let mut sampler = ThermalSampler::new(Box::new(ScriptedThermal::new(vec![vec![
            ("cpu", 80.0, None),
            ("battery", 60.0, Some(65.0)),
            ("broken", f64::NAN, None),
        ]])));
        let r = sampler.sample(Utc::now()).unwrap();
        assert_eq!(r.state, ThermalState::Serious);
        assert_eq!(r.hottest_celsius, Some(60.0));
    }

    #[test]
    fn no_sensors_is_nominal() {
        let mut sampler = ThermalSampler::new(Box::new(ScriptedThermal::new(vec![vec![]])));
        assert_eq!(sampler.sample(Utc::now()).unwrap(), ThermalReading::default());
    }
}
