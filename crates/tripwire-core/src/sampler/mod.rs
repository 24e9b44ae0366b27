// ── Samplers ──
//
// Each sampler wraps one OS source and turns raw readings into domain
// values. A `SamplerHandle` owns the sampler, publishes its latest
// reading for lock-free reads, and counts consecutive failures so the
// coordinator can report degraded health.

mod battery;
mod cpu;
mod network;
pub mod source;
mod thermal;

#[cfg(test)]
pub(crate) mod scripted;

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SamplerError;
use crate::model::SamplerKind;

pub use battery::{BatteryReading, BatterySampler};
pub use cpu::{CpuReading, CpuSampler};
pub use network::{NetworkReading, NetworkSampler};
pub use source::Sources;
pub use thermal::{ThermalReading, ThermalSampler};

/// A periodic poller producing one reading per call.
pub trait Sampler: Send + 'static {
    type Reading: fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> SamplerKind;

    fn sample(&mut self, now: DateTime<Utc>) -> Result<Self::Reading, SamplerError>;
}

/// Health transitions reported to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerEvent {
    Degraded(SamplerKind),
    Recovered(SamplerKind),
}

/// Shared owner of one sampler and its last published reading.
pub struct SamplerHandle<S: Sampler> {
    kind: SamplerKind,
    sampler: Mutex<S>,
    latest: ArcSwapOption<S::Reading>,
    failures: AtomicU32,
    degraded_after: u32,
}

impl<S: Sampler> fmt::Debug for SamplerHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplerHandle")
            .field("kind", &self.kind)
            .field("latest", &self.latest.load_full())
            .field("failures", &self.failures.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<S: Sampler> SamplerHandle<S> {
    pub fn new(sampler: S, degraded_after: u32) -> Self {
        Self {
            kind: sampler.kind(),
            sampler: Mutex::new(sampler),
            latest: ArcSwapOption::empty(),
            failures: AtomicU32::new(0),
            degraded_after: degraded_after.max(1),
        }
    }

    pub fn kind(&self) -> SamplerKind {
        self.kind
    }

    /// Last successful reading; `None` until the first success.
    pub fn latest(&self) -> Option<Arc<S::Reading>> {
        self.latest.load_full()
    }

    pub fn is_degraded(&self) -> bool {
        self.failures.load(Ordering::Relaxed) >= self.degraded_after
    }

    /// Sample once. A failure keeps the previous reading. Returns a
    /// health transition when this poll crossed the degraded threshold
    /// in either direction.
    pub fn poll(&self, now: DateTime<Utc>) -> Option<SamplerEvent> {
        let result = self
            .sampler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sample(now);

        match result {
            Ok(reading) => {
                self.latest.store(Some(Arc::new(reading)));
                let previous = self.failures.swap(0, Ordering::Relaxed);
                (previous >= self.degraded_after).then_some(SamplerEvent::Recovered(self.kind))
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                warn!(sampler = %self.kind, failures, error = %e, "sampler read failed, keeping last value");
                (failures == self.degraded_after).then_some(SamplerEvent::Degraded(self.kind))
            }
        }
    }
}

/// Drive `handle` every `period` until cancelled, forwarding health
/// transitions to `events`.
pub async fn sampler_task<S: Sampler>(
    handle: Arc<SamplerHandle<S>>,
    period: Duration,
    events: mpsc::Sender<SamplerEvent>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Some(event) = handle.poll(Utc::now()) {
                    if events.send(event).await.is_err() {
                        debug!(sampler = %handle.kind(), "event receiver gone, stopping sampler");
                        break;
                    }
                }
            }
        }
    }
    debug!(sampler = %handle.kind(), "sampler task stopped");
}
