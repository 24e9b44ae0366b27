// ── Domain model ──
//
// Canonical value types shared by samplers, the ledger, the scorer, the
// incident engine and external consumers.

pub mod activity;
pub mod incident;
pub mod session;
pub mod snapshot;
pub mod threshold;
pub mod traffic;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

pub use activity::{ActivityEntry, ActivityKind};
pub use incident::{Incident, IncidentFilter, IncidentKind, IncidentSeverity, IncidentStatus};
pub use session::FinalizedSession;
pub use snapshot::{MetricSnapshot, SnapshotExport, ThermalState, ThreatLevel};
pub use threshold::{Threshold, ThresholdEntry, ThresholdIssue, ThresholdMetric, ThresholdSet};
pub use traffic::{DailyUsage, LinkClass, TrafficClass, TrafficRecord, TrafficTotals, Window};

/// The independently scheduled samplers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SamplerKind {
    Network,
    Cpu,
    Battery,
    Thermal,
}

/// Health of the sampling pipeline. Deliberately separate from
/// [`ThreatLevel`]: a degraded sampler is not a threat.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum MonitorHealth {
    #[default]
    Healthy,
    Degraded { samplers: Vec<SamplerKind> },
}

impl MonitorHealth {
    pub fn from_degraded(samplers: Vec<SamplerKind>) -> Self {
        if samplers.is_empty() {
            Self::Healthy
        } else {
            Self::Degraded { samplers }
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}
