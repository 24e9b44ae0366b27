// ── Battery sampler ──
//
// Drain is (level_start - level_end) / elapsed_hours over a rolling
// window, expressed in percent per hour. The window is cleared whenever
// the charging state flips, so a plug/unplug never produces a spike.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use super::Sampler;
use super::source::BatterySource;
use crate::counter::seconds_between;
use crate::error::SamplerError;
use crate::model::SamplerKind;

pub const MIN_WINDOW_READINGS: usize = 3;
pub const MIN_WINDOW_SECS: f64 = 30.0;
const MAX_DRAIN_PER_HOUR: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    /// Charge, 0.0 ..= 1.0. Hosts without a battery report 1.0.
    pub level: f64,
    pub charging: bool,
    /// Percent per hour, never negative.
    pub drain_per_hour: f64,
    pub present: bool,
}

impl Default for BatteryReading {
    fn default() -> Self {
        Self {
            level: 1.0,
            charging: false,
            drain_per_hour: 0.0,
            present: false,
        }
    }
}

pub struct BatterySampler {
    source: Box<dyn BatterySource>,
    window: TimeDelta,
    history: VecDeque<(DateTime<Utc>, f64)>,
    charging: Option<bool>,
}

impl BatterySampler {
    pub fn new(source: Box<dyn BatterySource>, window: Duration) -> Self {
        Self {
            source,
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            history: VecDeque::new(),
            charging: None,
        }
    }

    fn drain(&self) -> f64 {
        let (Some(&(start_at, start)), Some(&(end_at, end))) =
            (self.history.front(), self.history.back())
        else {
            return 0.0;
        };
        if self.history.len() < MIN_WINDOW_READINGS {
            return 0.0;
        }
        let elapsed = seconds_between(start_at, end_at);
        if elapsed < MIN_WINDOW_SECS {
            return 0.0;
        }
        let percent_lost = (start - end) * 100.0;
        (percent_lost / (elapsed / 3600.0)).clamp(0.0, MAX_DRAIN_PER_HOUR)
    }
}

impl Sampler for BatterySampler {
    type Reading = BatteryReading;

    fn kind(&self) -> SamplerKind {
        SamplerKind::Battery
    }

    fn sample(&mut self, now: DateTime<Utc>) -> Result<BatteryReading, SamplerError> {
        let Some(status) = self.source.status()? else {
            return Ok(BatteryReading::default());
        };

        if self.charging != Some(status.charging) {
            self.history.clear();
            self.charging = Some(status.charging);
        }
        self.history.push_back((now, status.level));
        let cutoff = now - self.window;
        while self.history.front().is_some_and(|(at, _)| *at < cutoff) {
            self.history.pop_front();
        }

        let drain_per_hour = if status.charging { 0.0 } else { self.drain() };
        Ok(BatteryReading {
            level: status.level,
            charging: status.charging,
            drain_per_hour,
            present: true,
        })
    }
}
