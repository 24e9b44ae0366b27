// ── Traffic accounting types ──

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Link classes the ledger accounts separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LinkClass {
    Wifi,
    Cellular,
}

/// Query selector for windowed totals: one link class or both combined.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TrafficClass {
    Wifi,
    Cellular,
    Combined,
}

/// Accumulation windows. `Hour` is trailing; the others are calendar
/// aligned in the ledger's time zone. `AllTime` only resets explicitly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Window {
    Hour,
    Today,
    Week,
    Month,
    AllTime,
}

/// Upload / download byte pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrafficTotals {
    pub upload: u64,
    pub download: u64,
}

impl TrafficTotals {
    pub fn new(upload: u64, download: u64) -> Self {
        Self { upload, download }
    }

    pub fn total(&self) -> u64 {
        self.upload.saturating_add(self.download)
    }

    pub fn is_zero(&self) -> bool {
        self.upload == 0 && self.download == 0
    }
}

impl std::ops::Add for TrafficTotals {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            upload: self.upload.saturating_add(rhs.upload),
            download: self.download.saturating_add(rhs.download),
        }
    }
}

impl std::ops::AddAssign for TrafficTotals {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// One immutable entry of the traffic log: the deltas applied by a
/// single `record()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficRecord {
    pub timestamp: DateTime<Utc>,
    pub wifi: TrafficTotals,
    pub cellular: TrafficTotals,
}

impl TrafficRecord {
    pub fn combined(&self) -> TrafficTotals {
        self.wifi + self.cellular
    }

    pub fn class(&self, class: TrafficClass) -> TrafficTotals {
        match class {
            TrafficClass::Wifi => self.wifi,
            TrafficClass::Cellular => self.cellular,
            TrafficClass::Combined => self.combined(),
        }
    }
}

/// Per-day usage derived from the traffic log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub upload: u64,
    pub download: u64,
}
