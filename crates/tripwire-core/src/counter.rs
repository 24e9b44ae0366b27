// ── Monotonic counter → delta / rate conversion ──
//
// OS byte counters only grow until the interface (or the device) is
// reset. A decrease is treated as a reboot: the new absolute reading is
// taken as the bytes transferred since that reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Last observation of a single counter source (e.g. "wifi upload").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    pub last_value: u64,
    pub last_timestamp: DateTime<Utc>,
}

/// Result of feeding one raw reading into a [`RateCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CounterSample {
    /// Bytes (or ticks) since the previous reading.
    pub delta: u64,
    /// `delta / elapsed_seconds`; zero when no time has elapsed.
    pub rate: f64,
}

/// Reset-tolerant converter from a cumulative counter to deltas and rates.
///
/// The first reading after construction or [`reset`](Self::reset) only
/// stores a baseline and yields a zero sample.
#[derive(Debug, Clone, Default)]
pub struct RateCounter {
    state: Option<CounterState>,
}

impl RateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a previously persisted baseline.
    pub fn from_state(state: CounterState) -> Self {
        Self { state: Some(state) }
    }

    pub fn state(&self) -> Option<CounterState> {
        self.state
    }

    /// Forget the baseline; the next reading becomes the new baseline.
    pub fn reset(&mut self) {
        self.state = None;
    }

    pub fn update(&mut self, raw: u64, now: DateTime<Utc>) -> CounterSample {
        let previous = self.state.replace(CounterState {
            last_value: raw,
            last_timestamp: now,
        });

        let Some(previous) = previous else {
            return CounterSample::default();
        };

        let delta = if raw >= previous.last_value {
            raw - previous.last_value
        } else {
            debug!(
                previous = previous.last_value,
                current = raw,
                "counter went backwards, treating reading as post-reset total"
            );
            raw
        };

        let elapsed = seconds_between(previous.last_timestamp, now);
        let rate = if elapsed > 0.0 {
            #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
            let delta_f = delta as f64;
            delta_f / elapsed
        } else {
            0.0
        };

        CounterSample { delta, rate }
    }
}

/// Fractional seconds from `earlier` to `later` (negative if reversed).
pub(crate) fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let micros = (later - earlier).num_microseconds().unwrap_or(i64::MAX);
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    let micros_f = micros as f64;
    micros_f / 1_000_000.0
}
