// ── Activity log entries ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityKind {
    MonitoringStarted,
    MonitoringStopped,
    LevelChanged,
    IncidentOpened,
    IncidentResolved,
    SamplerDegraded,
    SamplerRecovered,
    LedgerReset,
    SessionStarted,
    SessionEnded,
}

/// One human-readable line in the recent-activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: ActivityKind,
    pub message: String,
}
