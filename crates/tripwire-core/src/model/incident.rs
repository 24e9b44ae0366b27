// ── Incident domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

use super::snapshot::MetricSnapshot;

/// Detection categories. Each has its own rule and at most one
/// unresolved incident at a time.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum IncidentKind {
    UploadSpike,
    DataExfiltration,
    HeavyDownload,
    CpuAnomaly,
    BatteryDrain,
    ThermalStress,
    ScreenSurveillance,
    MultiFactor,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Lifecycle position derived from the incident's flags.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Acknowledged,
    Resolved,
}

/// A discrete, deduplicated detection event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub kind: IncidentKind,
    pub severity: IncidentSeverity,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub acknowledged: bool,
    pub resolved: bool,
    /// Human-readable description of what tripped the rule.
    pub reason: String,
    /// Readings at the moment the incident opened.
    pub snapshot: MetricSnapshot,
}

impl Incident {
    pub fn open(
        kind: IncidentKind,
        severity: IncidentSeverity,
        reason: String,
        snapshot: MetricSnapshot,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            opened_at: snapshot.timestamp,
            closed_at: None,
            acknowledged: false,
            resolved: false,
            reason,
            snapshot,
        }
    }

    pub fn status(&self) -> IncidentStatus {
        if self.resolved {
            IncidentStatus::Resolved
        } else if self.acknowledged {
            IncidentStatus::Acknowledged
        } else {
            IncidentStatus::Open
        }
    }

    pub fn is_unresolved(&self) -> bool {
        !self.resolved
    }
}

/// Read-only query over incident history.
#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    /// Only unresolved incidents (open or acknowledged).
    pub unresolved_only: bool,
    pub kind: Option<IncidentKind>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl IncidentFilter {
    pub fn unresolved() -> Self {
        Self {
            unresolved_only: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, incident: &Incident) -> bool {
        if self.unresolved_only && incident.resolved {
            return false;
        }
        if let Some(status) = self.status {
            if incident.status() != status {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if incident.kind != kind {
                return false;
            }
        }
        if let Some(since) = self.since {
            if incident.opened_at < since {
                return false;
            }
        }
        true
    }
}
