// ── Metric snapshot ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::SamplerKind;

/// Device thermal pressure, ordinal 0 (nominal) ..= 3 (critical).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ThermalState {
    #[default]
    Nominal,
    Fair,
    Serious,
    Critical,
}

impl ThermalState {
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Nominal => 0,
            Self::Fair => 1,
            Self::Serious => 2,
            Self::Critical => 3,
        }
    }

    /// Inverse of [`ordinal`](Self::ordinal); values above 3 saturate.
    pub fn from_ordinal(value: u8) -> Self {
        match value {
            0 => Self::Nominal,
            1 => Self::Fair,
            2 => Self::Serious,
            _ => Self::Critical,
        }
    }
}

/// Discrete bucket derived from the 0–100 threat score.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ThreatLevel {
    #[default]
    Normal,
    Warning,
    Alert,
    Critical,
}

impl ThreatLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..15 => Self::Normal,
            15..40 => Self::Warning,
            40..70 => Self::Alert,
            _ => Self::Critical,
        }
    }
}

/// One immutable, timestamped bundle of the latest sampler readings plus
/// the score derived from them. Each coordinator tick produces a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub timestamp: DateTime<Utc>,

    // Network, bytes/sec
    pub upload_rate: f64,
    pub download_rate: f64,
    pub wifi_upload_rate: f64,
    pub wifi_download_rate: f64,
    pub cellular_upload_rate: f64,
    pub cellular_download_rate: f64,

    pub cpu_percent: f64,

    pub battery_level: f64,
    pub battery_charging: bool,
    /// Percent per hour, never negative.
    pub battery_drain_per_hour: f64,

    pub thermal: ThermalState,

    pub threat_score: u8,
    pub threat_level: ThreatLevel,

    /// Samplers currently failing repeatedly. Their fields hold the last
    /// successful reading.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<SamplerKind>,
}

impl MetricSnapshot {
    /// An all-nominal snapshot at `timestamp`, used before the first tick.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            upload_rate: 0.0,
            download_rate: 0.0,
            wifi_upload_rate: 0.0,
            wifi_download_rate: 0.0,
            cellular_upload_rate: 0.0,
            cellular_download_rate: 0.0,
            cpu_percent: 0.0,
            battery_level: 1.0,
            battery_charging: false,
            battery_drain_per_hour: 0.0,
            thermal: ThermalState::Nominal,
            threat_score: 0,
            threat_level: ThreatLevel::Normal,
            degraded: Vec::new(),
        }
    }

    pub fn export(&self) -> SnapshotExport {
        SnapshotExport::from(self)
    }
}

/// JSON export shape consumed by display and export layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotExport {
    pub timestamp: DateTime<Utc>,
    pub upload_bps: f64,
    pub download_bps: f64,
    pub cpu_percent: f64,
    pub battery_level: f64,
    pub battery_drain_per_hour: f64,
    pub thermal_level: u8,
    pub threat_score: u8,
    pub threat_level: ThreatLevel,
    pub degraded: bool,
}

impl From<&MetricSnapshot> for SnapshotExport {
    fn from(s: &MetricSnapshot) -> Self {
        Self {
            timestamp: s.timestamp,
            upload_bps: s.upload_rate,
            download_bps: s.download_rate,
            cpu_percent: s.cpu_percent,
            battery_level: s.battery_level,
            battery_drain_per_hour: s.battery_drain_per_hour,
            thermal_level: s.thermal.ordinal(),
            threat_score: s.threat_score,
            threat_level: s.threat_level,
            degraded: !s.degraded.is_empty(),
        }
    }
}
