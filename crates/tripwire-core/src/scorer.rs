// ── Threat scoring ──
//
// Pure function from the current snapshot, trailing-hour traffic and the
// threshold set to a 0–100 score. Must not touch ledger or incident
// state; the coordinator calls it on every tick.

use serde::{Deserialize, Serialize};

use crate::model::{MetricSnapshot, ThermalState, ThreatLevel, ThresholdMetric, ThresholdSet, TrafficTotals};

pub const UPLOAD_RATE_WEIGHT: u32 = 30;
pub const DOWNLOAD_RATE_WEIGHT: u32 = 20;
pub const HOURLY_UPLOAD_WEIGHT: u32 = 40;
pub const HOURLY_DOWNLOAD_WEIGHT: u32 = 25;
pub const CPU_WEIGHT: u32 = 30;
pub const BATTERY_DRAIN_WEIGHT: u32 = 20;
/// Added when this many distinct factors breach at once.
pub const MULTI_FACTOR_MIN_BREACHES: usize = 3;
pub const MULTI_FACTOR_BONUS: u32 = 20;

const MAX_SCORE: u32 = 100;

/// Graduated thermal contribution.
pub fn thermal_weight(state: ThermalState) -> u32 {
    match state {
        ThermalState::Nominal => 0,
        ThermalState::Fair => 5,
        ThermalState::Serious => 15,
        ThermalState::Critical => 20,
    }
}

/// Result of scoring one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Assessment {
    pub score: u8,
    pub level: ThreatLevel,
    /// Distinct metrics over their enabled threshold, in evaluation order.
    pub breaches: Vec<ThresholdMetric>,
}

impl Assessment {
    pub fn is_breached(&self, metric: ThresholdMetric) -> bool {
        self.breaches.contains(&metric)
    }

    pub fn is_multi_factor(&self) -> bool {
        self.breaches.len() >= MULTI_FACTOR_MIN_BREACHES
    }
}

/// Score `snapshot` against `thresholds`. Disabled thresholds never
/// contribute; exceeding means strictly greater, except thermal which
/// breaches once the state's ordinal reaches the threshold value.
#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
pub fn score(
    snapshot: &MetricSnapshot,
    hourly: TrafficTotals,
    thresholds: &ThresholdSet,
) -> Assessment {
    let mut total = 0_u32;
    let mut breaches = Vec::new();

    let mut check = |metric: ThresholdMetric, observed: f64, weight: u32| {
        if thresholds
            .enabled_value(metric)
            .is_some_and(|limit| observed > limit)
        {
            total += weight;
            breaches.push(metric);
        }
    };

    check(ThresholdMetric::UploadRate, snapshot.upload_rate, UPLOAD_RATE_WEIGHT);
    check(ThresholdMetric::DownloadRate, snapshot.download_rate, DOWNLOAD_RATE_WEIGHT);
    check(ThresholdMetric::HourlyUpload, hourly.upload as f64, HOURLY_UPLOAD_WEIGHT);
    check(ThresholdMetric::HourlyDownload, hourly.download as f64, HOURLY_DOWNLOAD_WEIGHT);
    check(ThresholdMetric::Cpu, snapshot.cpu_percent, CPU_WEIGHT);
    check(ThresholdMetric::BatteryDrain, snapshot.battery_drain_per_hour, BATTERY_DRAIN_WEIGHT);

    let thermal = thermal_weight(snapshot.thermal);
    if thermal > 0
        && thresholds
            .enabled_value(ThresholdMetric::Thermal)
            .is_some_and(|min| f64::from(snapshot.thermal.ordinal()) >= min)
    {
        total += thermal;
        breaches.push(ThresholdMetric::Thermal);
    }

    if breaches.len() >= MULTI_FACTOR_MIN_BREACHES {
        total += MULTI_FACTOR_BONUS;
    }

    let score = u8::try_from(total.min(MAX_SCORE)).unwrap_or(u8::MAX);
    Assessment {
        score,
        level: ThreatLevel::from_score(score),
        breaches,
    }
}
