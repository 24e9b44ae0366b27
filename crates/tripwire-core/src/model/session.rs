// ── Finalized sleep session ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::snapshot::ThermalState;

/// Aggregates of a completed sleep session. Computed exactly once, when
/// the active session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub samples: u64,

    pub avg_upload_rate: f64,
    pub peak_upload_rate: f64,
    pub avg_download_rate: f64,
    pub peak_download_rate: f64,
    pub avg_cpu_percent: f64,
    pub peak_cpu_percent: f64,
    pub peak_thermal: ThermalState,
    pub peak_threat_score: u8,

    /// Bytes estimated by integrating rates over sample intervals.
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,

    pub incident_count: u32,
    pub anomaly: bool,
}

impl FinalizedSession {
    pub fn duration(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }
}
