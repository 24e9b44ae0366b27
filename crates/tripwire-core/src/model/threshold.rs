// ── Threshold configuration ──
//
// Thresholds are a tagged enum internally and string-keyed only in their
// persisted form (`ThresholdEntry`). `ThresholdSet` always holds exactly
// one threshold per metric.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::warn;

/// Metrics that can carry a threshold.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ThresholdMetric {
    /// Instant upload rate, bytes/sec.
    UploadRate,
    /// Instant download rate, bytes/sec.
    DownloadRate,
    /// Bytes uploaded over the trailing hour.
    HourlyUpload,
    /// Bytes downloaded over the trailing hour.
    HourlyDownload,
    /// CPU usage, percent.
    Cpu,
    /// Battery drain, percent per hour.
    BatteryDrain,
    /// Minimum thermal ordinal (1 = fair) that counts as a breach.
    Thermal,
}

impl ThresholdMetric {
    pub fn key(self) -> String {
        self.to_string()
    }

    pub fn default_value(self) -> f64 {
        match self {
            Self::UploadRate => 2.0 * 1024.0 * 1024.0,
            Self::DownloadRate => 10.0 * 1024.0 * 1024.0,
            Self::HourlyUpload => 100.0 * 1024.0 * 1024.0,
            Self::HourlyDownload => 1024.0 * 1024.0 * 1024.0,
            Self::Cpu => 60.0,
            Self::BatteryDrain => 20.0,
            Self::Thermal => 1.0,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::UploadRate | Self::DownloadRate => "B/s",
            Self::HourlyUpload | Self::HourlyDownload => "B/h",
            Self::Cpu => "%",
            Self::BatteryDrain => "%/h",
            Self::Thermal => "level",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub metric: ThresholdMetric,
    pub value: f64,
    pub enabled: bool,
}

impl Threshold {
    pub fn default_for(metric: ThresholdMetric) -> Self {
        Self {
            metric,
            value: metric.default_value(),
            enabled: true,
        }
    }
}

/// Persisted, string-keyed threshold form (`[[thresholds]]` in TOML).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEntry {
    pub metric: String,
    pub value: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A problem found while normalizing persisted threshold entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThresholdIssue {
    UnknownMetric { key: String },
    Duplicate { metric: ThresholdMetric },
    InvalidValue { metric: ThresholdMetric },
}

impl std::fmt::Display for ThresholdIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownMetric { key } => write!(f, "unknown threshold metric '{key}'"),
            Self::Duplicate { metric } => {
                write!(f, "threshold '{metric}' configured more than once, using default")
            }
            Self::InvalidValue { metric } => {
                write!(f, "threshold '{metric}' has a non-finite or negative value, using default")
            }
        }
    }
}

/// The active threshold configuration: exactly one entry per metric.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    by_metric: BTreeMap<ThresholdMetric, Threshold>,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            by_metric: ThresholdMetric::iter()
                .map(|m| (m, Threshold::default_for(m)))
                .collect(),
        }
    }
}

impl ThresholdSet {
    /// Every metric present but disabled.
    pub fn all_disabled() -> Self {
        let mut set = Self::default();
        for threshold in set.by_metric.values_mut() {
            threshold.enabled = false;
        }
        set
    }

    /// Builder-style override of one metric.
    pub fn with(mut self, metric: ThresholdMetric, value: f64, enabled: bool) -> Self {
        self.by_metric.insert(
            metric,
            Threshold {
                metric,
                value,
                enabled,
            },
        );
        self
    }

    pub fn get(&self, metric: ThresholdMetric) -> Threshold {
        self.by_metric
            .get(&metric)
            .copied()
            .unwrap_or_else(|| Threshold::default_for(metric))
    }

    /// The threshold value if the metric is enabled.
    pub fn enabled_value(&self, metric: ThresholdMetric) -> Option<f64> {
        let t = self.get(metric);
        t.enabled.then_some(t.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Threshold> {
        self.by_metric.values()
    }

    /// Normalize persisted entries, logging each correction at warn level.
    pub fn from_entries(entries: &[ThresholdEntry]) -> Self {
        let (set, issues) = Self::normalize(entries);
        for issue in &issues {
            warn!(%issue, "threshold configuration corrected");
        }
        set
    }

    /// Normalize persisted entries: unknown keys are dropped, duplicated
    /// or invalid metrics fall back to their default, missing metrics take
    /// their default.
    pub fn normalize(entries: &[ThresholdEntry]) -> (Self, Vec<ThresholdIssue>) {
        let mut issues = Vec::new();
        let mut seen: HashMap<ThresholdMetric, usize> = HashMap::new();
        let mut parsed = Vec::with_capacity(entries.len());

        for entry in entries {
            match ThresholdMetric::from_str(entry.metric.trim()) {
                Ok(metric) => {
                    *seen.entry(metric).or_default() += 1;
                    parsed.push((metric, entry));
                }
                Err(_) => issues.push(ThresholdIssue::UnknownMetric {
                    key: entry.metric.clone(),
                }),
            }
        }

        let mut set = Self::default();
        for (metric, entry) in parsed {
            if seen.get(&metric).copied().unwrap_or(0) > 1 {
                continue;
            }
            if !entry.value.is_finite() || entry.value < 0.0 {
                issues.push(ThresholdIssue::InvalidValue { metric });
                continue;
            }
            set = set.with(metric, entry.value, entry.enabled);
        }

        let mut duplicates: Vec<_> = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(metric, _)| metric)
            .collect();
        duplicates.sort();
        issues.extend(
            duplicates
                .into_iter()
                .map(|metric| ThresholdIssue::Duplicate { metric }),
        );

        (set, issues)
    }

    pub fn to_entries(&self) -> Vec<ThresholdEntry> {
        self.iter()
            .map(|t| ThresholdEntry {
                metric: t.metric.key(),
                value: t.value,
                enabled: t.enabled,
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn entry(metric: &str, value: f64, enabled: bool) -> ThresholdEntry {
        ThresholdEntry {
            metric: metric.into(),
            value,
            enabled,
        }
    }

    #[test]
    fn default_set_covers_every_metric() {
        let set = ThresholdSet::default();
        assert_eq!(set.iter().count(), ThresholdMetric::iter().count());
        assert_eq!(set.enabled_value(ThresholdMetric::Cpu), Some(60.0));
    }

    #[test]
    fn entries_override_defaults() {
        let (set, issues) = ThresholdSet::normalize(&[entry("cpu", 80.0, true), entry(
            "upload_rate",
            1.0,
            false,
        )]);
        assert!(issues.is_empty());
        assert_eq!(set.enabled_value(ThresholdMetric::Cpu), Some(80.0));
        assert_eq!(set.enabled_value(ThresholdMetric::UploadRate), None);
        assert_eq!(
            set.get(ThresholdMetric::BatteryDrain),
            Threshold::default_for(ThresholdMetric::BatteryDrain)
        );
    }

    #[test]
    fn duplicate_key_falls_back_to_default() {
        let (set, issues) =
            ThresholdSet::normalize(&[entry("cpu", 10.0, true), entry("cpu", 90.0, false)]);
        assert_eq!(set.get(ThresholdMetric::Cpu), Threshold::default_for(ThresholdMetric::Cpu));
        assert_eq!(issues, vec![ThresholdIssue::Duplicate {
            metric: ThresholdMetric::Cpu
        }]);
    }

    #[test]
    fn unknown_and_invalid_entries_are_reported() {
        let (set, issues) = ThresholdSet::normalize(&[
            entry("gpu", 1.0, true),
            entry("battery_drain", f64::NAN, true),
        ]);
        assert_eq!(set.get(ThresholdMetric::BatteryDrain).value, 20.0);
        assert_eq!(issues.len(), 2);
        assert!(matches!(issues[0], ThresholdIssue::UnknownMetric { ref key } if key == "gpu"));
    }

    #[test]
    fn entries_round_trip_through_persisted_form() {
        let set = ThresholdSet::default().with(ThresholdMetric::Thermal, 2.0, false);
        let (restored, issues) = ThresholdSet::normalize(&set.to_entries());
        assert!(issues.is_empty());
        assert_eq!(restored, set);
    }
}
