// ── CPU sampler ──

use chrono::{DateTime, Utc};

use super::Sampler;
use super::source::CpuSource;
use crate::error::SamplerError;
use crate::model::SamplerKind;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuReading {
    /// Non-idle share of the last interval, 0 ..= 100.
    pub percent: f64,
}

pub struct CpuSampler {
    source: Box<dyn CpuSource>,
}

impl CpuSampler {
    pub fn new(source: Box<dyn CpuSource>) -> Self {
        Self { source }
    }
}

impl Sampler for CpuSampler {
    type Reading = CpuReading;

    fn kind(&self) -> SamplerKind {
        SamplerKind::Cpu
    }

    fn sample(&mut self, _now: DateTime<Utc>) -> Result<CpuReading, SamplerError> {
        let raw = self.source.usage()?;
        if !raw.is_finite() {
            return Err(SamplerError::new(SamplerKind::Cpu, format!("non-finite usage {raw}")));
        }
        Ok(CpuReading {
            percent: raw.clamp(0.0, 100.0),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::sampler::scripted::ScriptedCpu;

    #[test]
    fn clamps_and_rejects_nan() {
        let mut sampler = CpuSampler::new(Box::new(ScriptedCpu::new([
            Some(130.0),
            Some(-2.0),
            Some(f64::NAN),
        ])));
        let now = Utc::now();
        assert_eq!(sampler.sample(now).unwrap().percent, 100.0);
        assert_eq!(sampler.sample(now).unwrap().percent, 0.0);
        assert!(sampler.sample(now).is_err());
    }
}
