// ── Detection rules ──
//
// Independent predicates over the current snapshot and trailing-hour
// traffic. A rule only evaluates when its backing threshold is enabled.

use crate::model::{
    IncidentKind, IncidentSeverity, MetricSnapshot, ThermalState, ThresholdMetric, ThresholdSet,
    TrafficTotals,
};
use crate::scorer::{self, Assessment};

/// CPU floor for the screen-surveillance pattern, percent.
pub const SURVEILLANCE_CPU_PERCENT: f64 = 25.0;
/// Upload must exceed its threshold by this factor for surveillance.
pub const SURVEILLANCE_UPLOAD_FACTOR: f64 = 2.0;

/// A rule that fired on this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub kind: IncidentKind,
    pub severity: IncidentSeverity,
    pub reason: String,
}

impl Detection {
    fn new(kind: IncidentKind, reason: String) -> Self {
        Self {
            kind,
            severity: severity_of(kind),
            reason,
        }
    }
}

pub fn severity_of(kind: IncidentKind) -> IncidentSeverity {
    match kind {
        IncidentKind::HeavyDownload | IncidentKind::BatteryDrain => IncidentSeverity::Low,
        IncidentKind::UploadSpike | IncidentKind::CpuAnomaly | IncidentKind::ThermalStress => {
            IncidentSeverity::Medium
        }
        IncidentKind::DataExfiltration | IncidentKind::MultiFactor => IncidentSeverity::High,
        IncidentKind::ScreenSurveillance => IncidentSeverity::Critical,
    }
}

/// Run every rule and return the ones that fire, in a stable order.
pub fn detect(
    snapshot: &MetricSnapshot,
    hourly: TrafficTotals,
    thresholds: &ThresholdSet,
) -> Vec<Detection> {
    let assessment = scorer::score(snapshot, hourly, thresholds);
    detect_with(snapshot, hourly, thresholds, &assessment)
}

/// As [`detect`], reusing an assessment already computed for this tick.
pub fn detect_with(
    snapshot: &MetricSnapshot,
    hourly: TrafficTotals,
    thresholds: &ThresholdSet,
    assessment: &Assessment,
) -> Vec<Detection> {
    let mut fired = Vec::new();
    let limit = |m| thresholds.get(m).value;

    if assessment.is_breached(ThresholdMetric::UploadRate) {
        fired.push(Detection::new(
            IncidentKind::UploadSpike,
            format!(
                "upload {} exceeds {}",
                human_rate(snapshot.upload_rate),
                human_rate(limit(ThresholdMetric::UploadRate))
            ),
        ));
    }
    if assessment.is_breached(ThresholdMetric::HourlyUpload) {
        fired.push(Detection::new(
            IncidentKind::DataExfiltration,
            format!(
                "{} uploaded in the last hour, limit {}",
                human_bytes_u64(hourly.upload),
                human_bytes(limit(ThresholdMetric::HourlyUpload))
            ),
        ));
    }
    if assessment.is_breached(ThresholdMetric::HourlyDownload) {
        fired.push(Detection::new(
            IncidentKind::HeavyDownload,
            format!(
                "{} downloaded in the last hour, limit {}",
                human_bytes_u64(hourly.download),
                human_bytes(limit(ThresholdMetric::HourlyDownload))
            ),
        ));
    }
    if assessment.is_breached(ThresholdMetric::Cpu) {
        fired.push(Detection::new(
            IncidentKind::CpuAnomaly,
            format!(
                "CPU at {:.1}% exceeds {:.0}%",
                snapshot.cpu_percent,
                limit(ThresholdMetric::Cpu)
            ),
        ));
    }
    if assessment.is_breached(ThresholdMetric::BatteryDrain) {
        fired.push(Detection::new(
            IncidentKind::BatteryDrain,
            format!(
                "battery draining {:.1}%/h, limit {:.0}%/h",
                snapshot.battery_drain_per_hour,
                limit(ThresholdMetric::BatteryDrain)
            ),
        ));
    }
    if thresholds.enabled_value(ThresholdMetric::Thermal).is_some()
        && snapshot.thermal >= ThermalState::Serious
    {
        fired.push(Detection::new(
            IncidentKind::ThermalStress,
            format!("device thermal state is {}", snapshot.thermal),
        ));
    }
    if let Some(upload_limit) = thresholds.enabled_value(ThresholdMetric::UploadRate) {
        if snapshot.upload_rate > SURVEILLANCE_UPLOAD_FACTOR * upload_limit
            && snapshot.cpu_percent > SURVEILLANCE_CPU_PERCENT
            && snapshot.thermal > ThermalState::Nominal
        {
            fired.push(Detection::new(
                IncidentKind::ScreenSurveillance,
                format!(
                    "sustained upload {} with CPU {:.1}% and {} thermals",
                    human_rate(snapshot.upload_rate),
                    snapshot.cpu_percent,
                    snapshot.thermal
                ),
            ));
        }
    }
    if assessment.is_multi_factor() {
        let names: Vec<String> = assessment.breaches.iter().map(ToString::to_string).collect();
        fired.push(Detection::new(
            IncidentKind::MultiFactor,
            format!("{} factors breached: {}", names.len(), names.join(", ")),
        ));
    }

    fired
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn human_bytes_u64(bytes: u64) -> String {
    human_bytes(bytes as f64)
}

fn human_bytes(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn human_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", human_bytes(bytes_per_sec))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    const MIB: f64 = 1024.0 * 1024.0;

    fn kinds(d: &[Detection]) -> Vec<IncidentKind> {
        d.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn nominal_snapshot_fires_nothing() {
        let s = MetricSnapshot::empty(Utc::now());
        assert!(detect(&s, TrafficTotals::default(), &ThresholdSet::default()).is_empty());
    }

    #[test]
    fn screen_surveillance_needs_all_three_signals() {
        let mut s = MetricSnapshot::empty(Utc::now());
        s.upload_rate = 5.0 * MIB;
        s.cpu_percent = 30.0;
        s.thermal = ThermalState::Fair;

        let fired = kinds(&detect(&s, TrafficTotals::default(), &ThresholdSet::default()));
        assert!(fired.contains(&IncidentKind::ScreenSurveillance));
        assert!(fired.contains(&IncidentKind::UploadSpike));

        s.thermal = ThermalState::Nominal;
        let fired = kinds(&detect(&s, TrafficTotals::default(), &ThresholdSet::default()));
        assert!(!fired.contains(&IncidentKind::ScreenSurveillance));

        s.thermal = ThermalState::Fair;
        s.upload_rate = 3.0 * MIB;
        let fired = kinds(&detect(&s, TrafficTotals::default(), &ThresholdSet::default()));
        assert!(!fired.contains(&IncidentKind::ScreenSurveillance));
    }

    #[test]
    fn thermal_stress_starts_at_serious() {
        let mut s = MetricSnapshot::empty(Utc::now());
        s.thermal = ThermalState::Fair;
        assert!(detect(&s, TrafficTotals::default(), &ThresholdSet::default()).is_empty());

        s.thermal = ThermalState::Serious;
        let fired = detect(&s, TrafficTotals::default(), &ThresholdSet::default());
        assert_eq!(kinds(&fired), vec![IncidentKind::ThermalStress]);
        assert_eq!(fired[0].severity, IncidentSeverity::Medium);

        let disabled = ThresholdSet::default().with(ThresholdMetric::Thermal, 1.0, false);
        assert!(detect(&s, TrafficTotals::default(), &disabled).is_empty());
    }

    #[test]
    fn hourly_rules_and_multi_factor() {
        let mut s = MetricSnapshot::empty(Utc::now());
        s.cpu_percent = 75.0;
        let hourly = TrafficTotals::new(150 * 1024 * 1024, 2 * 1024 * 1024 * 1024);

        let fired = detect(&s, hourly, &ThresholdSet::default());
        assert_eq!(
            kinds(&fired),
            vec![
                IncidentKind::DataExfiltration,
                IncidentKind::HeavyDownload,
                IncidentKind::CpuAnomaly,
                IncidentKind::MultiFactor,
            ]
        );
        assert!(fired[0].reason.contains("150.0 MiB"));
    }

    #[test]
    fn human_units() {
        assert_eq!(human_bytes(512.0), "512.0 B");
        assert_eq!(human_bytes(1536.0), "1.5 KiB");
        assert_eq!(human_rate(2.0 * MIB), "2.0 MiB/s");
    }
}
