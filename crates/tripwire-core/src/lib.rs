//! Monitoring and threat-scoring core for tripwire.
//!
//! Samples network, CPU, battery and thermal state on independent
//! cadences, accounts traffic into calendar windows, scores every tick
//! against configurable thresholds and tracks the incidents that result.
//!
//! - **[`MonitoringCoordinator`]**: Owns sampler lifecycles and the
//!   scoring tick. [`start()`](MonitoringCoordinator::start) spawns the
//!   periodic tasks; [`tick()`](MonitoringCoordinator::tick) can also be
//!   driven directly.
//!
//! - **[`TrafficLedger`]**: Durable per-window byte accounting built on
//!   [`RateCounter`] deltas, with calendar rollover and restart recovery.
//!
//! - **[`IncidentEngine`]**: Rule evaluation with per-kind
//!   deduplication, acknowledge/resolve lifecycle and bounded history.
//!
//! - **[`SleepTracker`]**: Optional monitoring sessions that aggregate
//!   snapshots into a [`FinalizedSession`] summary.
//!
//! - **[`Store`]**: Key/value plus append-log persistence, with
//!   [`FileStore`] and [`MemoryStore`] backends.

pub mod activity;
pub mod config;
pub mod coordinator;
pub mod counter;
pub mod error;
pub mod incident;
pub mod ledger;
pub mod model;
pub mod persist;
pub mod sampler;
pub mod scorer;
pub mod session;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{InterfaceClass, InterfaceRules, MonitorConfig};
pub use coordinator::{
    MonitorEvent, MonitoringCoordinator, Publisher, StaticThresholds, ThresholdSource,
};
pub use counter::{CounterSample, CounterState, RateCounter};
pub use error::{CoreError, PersistenceError, SamplerError};
pub use incident::IncidentEngine;
pub use ledger::{Calendar, LedgerTotals, LedgerWrite, MAX_DAILY_DAYS, TrafficLedger, WindowTotal, Zone};
pub use persist::{FileStore, MemoryStore, Store, StoreExt};
pub use sampler::Sources;
pub use scorer::Assessment;
pub use session::{ActiveSession, SleepSession, SleepTracker};
pub use stream::SnapshotStream;

pub use model::{
    ActivityEntry, ActivityKind, DailyUsage, FinalizedSession, Incident, IncidentFilter,
    IncidentKind, IncidentSeverity, IncidentStatus, LinkClass, MetricSnapshot, MonitorHealth,
    SamplerKind, SnapshotExport, ThermalState, ThreatLevel, Threshold, ThresholdEntry,
    ThresholdIssue, ThresholdMetric, ThresholdSet, TrafficClass, TrafficRecord, TrafficTotals,
    Window,
};
