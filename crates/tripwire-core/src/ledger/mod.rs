// ── Traffic ledger ──
//
// Durable accounting of interface byte counters into calendar windows,
// split by link class. The ledger is a passive component: the
// coordinator owns it and feeds it absolute counter readings.

mod calendar;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::counter::{CounterState, RateCounter};
use crate::error::PersistenceError;
use crate::model::{DailyUsage, TrafficClass, TrafficRecord, TrafficTotals, Window};
use crate::persist::{Store, StoreExt, keys};

pub use calendar::{Calendar, Zone};

/// Combined up+down deltas at or below this many bytes are discarded.
pub const NOISE_FLOOR_BYTES: u64 = 1024;

/// Days of per-day usage kept, today included. Also the widest
/// [`TrafficLedger::daily_breakdown`] range.
pub const MAX_DAILY_DAYS: u32 = 3660;

fn hour() -> TimeDelta {
    TimeDelta::seconds(3600)
}

// ── Persisted state ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Baseline {
    wifi_upload: Option<CounterState>,
    wifi_download: Option<CounterState>,
    cellular_upload: Option<CounterState>,
    cellular_download: Option<CounterState>,
}

/// One window's accumulators. Combined totals are derived, so
/// `combined == wifi + cellular` holds structurally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowTotal {
    /// First local date of the window; `None` for all-time.
    pub start: Option<NaiveDate>,
    pub wifi: TrafficTotals,
    pub cellular: TrafficTotals,
}

impl WindowTotal {
    pub fn class(&self, class: TrafficClass) -> TrafficTotals {
        match class {
            TrafficClass::Wifi => self.wifi,
            TrafficClass::Cellular => self.cellular,
            TrafficClass::Combined => self.wifi + self.cellular,
        }
    }

    fn add(&mut self, record: &TrafficRecord) {
        self.wifi += record.wifi;
        self.cellular += record.cellular;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub today: WindowTotal,
    pub week: WindowTotal,
    pub month: WindowTotal,
    pub all_time: WindowTotal,
}

impl LedgerTotals {
    fn calendar_windows(&mut self) -> [(Window, &mut WindowTotal); 3] {
        [
            (Window::Today, &mut self.today),
            (Window::Week, &mut self.week),
            (Window::Month, &mut self.month),
        ]
    }

    fn add(&mut self, record: &TrafficRecord) {
        self.today.add(record);
        self.week.add(record);
        self.month.add(record);
        self.all_time.add(record);
    }
}

/// Combined usage per local day, oldest first.
type DailyTotals = BTreeMap<NaiveDate, TrafficTotals>;

#[derive(Debug, Clone)]
struct SavedTotals {
    totals: LedgerTotals,
    tracking_since: DateTime<Utc>,
    daily: DailyTotals,
}

/// Ledger state that has yet to reach the store. Taken from a
/// write-behind ledger with [`TrafficLedger::take_write`], applied off
/// the ledger, and handed back with [`TrafficLedger::restore_write`] if
/// it fails.
#[derive(Debug, Clone)]
pub struct LedgerWrite {
    baseline: Baseline,
    saved: Option<SavedTotals>,
    records: Vec<TrafficRecord>,
}

impl LedgerWrite {
    /// Save the baseline and totals, then append the records. Records
    /// appended before a failure are removed from `self`.
    pub fn apply(&mut self, store: &dyn Store) -> Result<(), PersistenceError> {
        store.set_json(keys::LEDGER_BASELINE, &self.baseline)?;
        if let Some(saved) = &self.saved {
            store.set_json(keys::LEDGER_TOTALS, &saved.totals)?;
            store.set_json(keys::LEDGER_TRACKING_SINCE, &saved.tracking_since)?;
            store.set_json(keys::LEDGER_DAILY, &saved.daily)?;
        }
        while let Some(record) = self.records.first() {
            store.append_json(keys::TRAFFIC_LOG, record)?;
            self.records.remove(0);
        }
        Ok(())
    }

    pub fn records(&self) -> &[TrafficRecord] {
        &self.records
    }
}

// ── Ledger ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Counters {
    wifi_upload: RateCounter,
    wifi_download: RateCounter,
    cellular_upload: RateCounter,
    cellular_download: RateCounter,
}

impl Counters {
    fn from_baseline(b: Baseline) -> Self {
        let restore = |s: Option<CounterState>| s.map_or_else(RateCounter::new, RateCounter::from_state);
        Self {
            wifi_upload: restore(b.wifi_upload),
            wifi_download: restore(b.wifi_download),
            cellular_upload: restore(b.cellular_upload),
            cellular_download: restore(b.cellular_download),
        }
    }

    fn baseline(&self) -> Baseline {
        Baseline {
            wifi_upload: self.wifi_upload.state(),
            wifi_download: self.wifi_download.state(),
            cellular_upload: self.cellular_upload.state(),
            cellular_download: self.cellular_download.state(),
        }
    }
}

/// Windowed, restart-safe traffic accounting.
pub struct TrafficLedger {
    store: Arc<dyn Store>,
    calendar: Calendar,
    counters: Counters,
    totals: LedgerTotals,
    daily: DailyTotals,
    /// Logged records from the trailing hour, oldest first.
    recent: VecDeque<TrafficRecord>,
    /// Records whose log append failed, retried on the next write.
    pending: Vec<TrafficRecord>,
    tracking_since: DateTime<Utc>,
    last_update: DateTime<Utc>,
    /// Totals changed since they were last saved.
    dirty: bool,
    /// Leave writes to the owner instead of persisting on every record.
    write_behind: bool,
}

impl std::fmt::Debug for TrafficLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficLedger")
            .field("calendar", &self.calendar)
            .field("totals", &self.totals)
            .field("tracking_since", &self.tracking_since)
            .field("dirty", &self.dirty)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl TrafficLedger {
    /// Restore ledger state from `store`. Never fails: unreadable state
    /// falls back to a fresh baseline and zero totals.
    pub fn open(store: Arc<dyn Store>, calendar: Calendar, now: DateTime<Utc>) -> Self {
        let baseline = match store.get_json::<Baseline>(keys::LEDGER_BASELINE) {
            Ok(b) => b.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "ledger baseline unreadable, re-anchoring on next reading");
                Baseline::default()
            }
        };

        let totals = match store.get_json::<LedgerTotals>(keys::LEDGER_TOTALS) {
            Ok(t) => t.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "ledger totals unreadable, starting from zero");
                LedgerTotals::default()
            }
        };

        let (tracking_since, mut dirty) =
            match store.get_json::<DateTime<Utc>>(keys::LEDGER_TRACKING_SINCE) {
                Ok(Some(t)) => (t, false),
                Ok(None) => (now, true),
                Err(e) => {
                    warn!(error = %e, "ledger tracking start unreadable, resetting to now");
                    (now, true)
                }
            };

        let daily = match store.get_json::<DailyTotals>(keys::LEDGER_DAILY) {
            Ok(Some(d)) => d,
            Ok(None) => {
                dirty = true;
                daily_from_log(store.as_ref(), calendar)
            }
            Err(e) => {
                warn!(error = %e, "daily totals unreadable, rebuilding from the traffic log");
                dirty = true;
                daily_from_log(store.as_ref(), calendar)
            }
        };

        let cutoff = now - hour();
        let recent = store
            .tail_json(keys::TRAFFIC_LOG, |r: &TrafficRecord| r.timestamp > cutoff)
            .unwrap_or_else(|e| {
                warn!(error = %e, "traffic log unreadable, hourly totals start empty");
                Vec::new()
            })
            .into();

        let mut ledger = Self {
            store,
            calendar,
            counters: Counters::from_baseline(baseline),
            totals,
            daily,
            recent,
            pending: Vec::new(),
            tracking_since,
            last_update: now,
            dirty,
            write_behind: false,
        };
        ledger.roll_windows(now);
        ledger.prune_daily(now);
        debug!(?ledger, "traffic ledger restored");
        ledger
    }

    /// Stop persisting from [`record`](Self::record). The owner drains
    /// state with [`take_write`](Self::take_write) instead.
    pub fn set_write_behind(&mut self, write_behind: bool) {
        self.write_behind = write_behind;
    }

    /// Feed absolute interface counters. Returns the logged record, or
    /// `None` when this was a baseline reading or fell under the noise
    /// floor.
    pub fn record(
        &mut self,
        wifi_upload: u64,
        wifi_download: u64,
        cellular_upload: u64,
        cellular_download: u64,
        now: DateTime<Utc>,
    ) -> Option<TrafficRecord> {
        let mut changed = self.roll_windows(now);
        self.last_update = now;

        let record = TrafficRecord {
            timestamp: now,
            wifi: TrafficTotals::new(
                self.counters.wifi_upload.update(wifi_upload, now).delta,
                self.counters.wifi_download.update(wifi_download, now).delta,
            ),
            cellular: TrafficTotals::new(
                self.counters.cellular_upload.update(cellular_upload, now).delta,
                self.counters.cellular_download.update(cellular_download, now).delta,
            ),
        };

        let logged = if record.combined().total() > NOISE_FLOOR_BYTES {
            self.totals.add(&record);
            *self.daily.entry(self.calendar.local_date(now)).or_default() += record.combined();
            self.recent.push_back(record);
            self.pending.push(record);
            changed = true;
            Some(record)
        } else {
            None
        };
        self.prune_recent(now);
        if changed {
            self.prune_daily(now);
            self.dirty = true;
        }

        if !self.write_behind {
            self.write_through();
        }
        logged
    }

    /// Zero every accumulator, drop the traffic log and forget the
    /// baseline so the next reading re-anchors. Idempotent.
    pub fn reset_all(&mut self, now: DateTime<Utc>) -> Result<(), PersistenceError> {
        self.counters = Counters::default();
        self.totals = LedgerTotals::default();
        self.daily.clear();
        self.recent.clear();
        self.pending.clear();
        self.tracking_since = now;
        self.last_update = now;
        self.roll_windows(now);
        info!("traffic ledger reset");

        self.store.clear_log(keys::TRAFFIC_LOG)?;
        self.dirty = true;
        self.flush()
    }

    /// Retry any failed writes and persist the full ledger state.
    pub fn flush(&mut self) -> Result<(), PersistenceError> {
        self.dirty = true;
        let mut write = self.take_write();
        match write.apply(self.store.as_ref()) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.restore_write(write);
                Err(e)
            }
        }
    }

    /// Everything not yet persisted: the baseline always, totals when
    /// they changed, and unlogged records.
    pub fn take_write(&mut self) -> LedgerWrite {
        let saved = self.dirty.then(|| SavedTotals {
            totals: self.totals,
            tracking_since: self.tracking_since,
            daily: self.daily.clone(),
        });
        self.dirty = false;
        LedgerWrite {
            baseline: self.counters.baseline(),
            saved,
            records: std::mem::take(&mut self.pending),
        }
    }

    /// Requeue a write that failed. Its unlogged records go ahead of
    /// any recorded since, and totals are saved again next time.
    pub fn restore_write(&mut self, write: LedgerWrite) {
        let mut records = write.records;
        records.append(&mut self.pending);
        self.pending = records;
        self.dirty = true;
    }

    /// Save totals again on the next write.
    pub fn mark_unsaved(&mut self) {
        self.dirty = true;
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn window_total(&self, window: Window, class: TrafficClass) -> TrafficTotals {
        match window {
            Window::Hour => self.hour_total(class, self.last_update),
            Window::Today => self.totals.today.class(class),
            Window::Week => self.totals.week.class(class),
            Window::Month => self.totals.month.class(class),
            Window::AllTime => self.totals.all_time.class(class),
        }
    }

    /// Combined bytes over the hour ending at `now`; the scorer's
    /// "hourly" input.
    pub fn hourly_totals(&self, now: DateTime<Utc>) -> TrafficTotals {
        self.hour_total(TrafficClass::Combined, now)
    }

    pub fn totals(&self) -> &LedgerTotals {
        &self.totals
    }

    pub fn tracking_since(&self) -> DateTime<Utc> {
        self.tracking_since
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    /// Per-day usage for the last `days` local days (today included),
    /// oldest first. Days without traffic are reported as zero. `days`
    /// is capped at [`MAX_DAILY_DAYS`].
    pub fn daily_breakdown(&self, days: u32, now: DateTime<Utc>) -> Vec<DailyUsage> {
        let days = days.min(MAX_DAILY_DAYS);
        if days == 0 {
            return Vec::new();
        }
        let today = self.calendar.local_date(now);
        let first = today
            .checked_sub_days(Days::new(u64::from(days - 1)))
            .unwrap_or(NaiveDate::MIN);

        first
            .iter_days()
            .take_while(|d| *d <= today)
            .map(|date| {
                let t = self.daily.get(&date).copied().unwrap_or_default();
                DailyUsage {
                    date,
                    upload: t.upload,
                    download: t.download,
                }
            })
            .collect()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn hour_total(&self, class: TrafficClass, now: DateTime<Utc>) -> TrafficTotals {
        let cutoff = now - hour();
        self.recent
            .iter()
            .filter(|r| r.timestamp > cutoff && r.timestamp <= now)
            .fold(TrafficTotals::default(), |acc, r| acc + r.class(class))
    }

    fn prune_recent(&mut self, now: DateTime<Utc>) {
        let cutoff = now - hour();
        while self.recent.front().is_some_and(|r| r.timestamp <= cutoff) {
            self.recent.pop_front();
        }
    }

    /// Zero calendar windows whose boundary no longer contains `now`.
    fn roll_windows(&mut self, now: DateTime<Utc>) -> bool {
        let calendar = self.calendar;
        let mut rolled = false;
        for (window, total) in self.totals.calendar_windows() {
            let start = calendar.window_start(window, now);
            if total.start != start {
                if total.start.is_some() {
                    info!(%window, from = ?total.start, to = ?start, "traffic window rolled over");
                }
                *total = WindowTotal {
                    start,
                    ..WindowTotal::default()
                };
                rolled = true;
            }
        }
        rolled
    }

    /// Drop per-day totals older than [`MAX_DAILY_DAYS`].
    fn prune_daily(&mut self, now: DateTime<Utc>) {
        let oldest = self
            .calendar
            .local_date(now)
            .checked_sub_days(Days::new(u64::from(MAX_DAILY_DAYS - 1)))
            .unwrap_or(NaiveDate::MIN);
        self.daily = self.daily.split_off(&oldest);
    }

    fn write_through(&mut self) {
        let mut write = self.take_write();
        if let Err(e) = write.apply(self.store.as_ref()) {
            warn!(error = %e, "ledger write failed, will retry");
            self.restore_write(write);
        }
    }
}

/// Rebuild per-day totals from every logged record.
fn daily_from_log(store: &dyn Store, calendar: Calendar) -> DailyTotals {
    let records = store
        .query_json(keys::TRAFFIC_LOG, |_: &TrafficRecord| true)
        .unwrap_or_else(|e| {
            warn!(error = %e, "traffic log unreadable, daily totals start empty");
            Vec::new()
        });
    let mut daily = DailyTotals::new();
    for record in &records {
        *daily.entry(calendar.local_date(record.timestamp)).or_default() += record.combined();
    }
    info!(records = records.len(), days = daily.len(), "rebuilt daily totals from traffic log");
    daily
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::Bytes;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::persist::MemoryStore;
    use crate::persist::flaky::FlakyStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()
    }

    fn secs(n: i64) -> DateTime<Utc> {
        t0() + TimeDelta::seconds(n)
    }

    fn ledger(store: &Arc<MemoryStore>) -> TrafficLedger {
        TrafficLedger::open(store.clone(), Calendar::utc(), t0())
    }

    fn assert_combined_invariant(l: &TrafficLedger) {
        for window in [Window::Today, Window::Week, Window::Month, Window::AllTime] {
            let wifi = l.window_total(window, TrafficClass::Wifi);
            let cell = l.window_total(window, TrafficClass::Cellular);
            assert_eq!(l.window_total(window, TrafficClass::Combined), wifi + cell);
        }
    }

    #[test]
    fn wifi_upload_sequence_logs_two_records() {
        let store = Arc::new(MemoryStore::new());
        let mut l = ledger(&store);

        assert!(l.record(0, 0, 0, 0, secs(0)).is_none());
        assert!(l.record(2048, 0, 0, 0, secs(1)).is_some());
        assert!(l.record(5000, 0, 0, 0, secs(2)).is_some());

        assert_eq!(store.log_len(keys::TRAFFIC_LOG), 2);
        assert_eq!(
            l.window_total(Window::AllTime, TrafficClass::Wifi).upload,
            4952
        );
        assert_combined_invariant(&l);
    }

    #[test]
    fn reboot_counts_new_reading_as_delta() {
        let store = Arc::new(MemoryStore::new());
        let mut l = ledger(&store);

        l.record(0, 0, 0, 0, secs(0));
        l.record(5_000_000, 0, 0, 0, secs(1));
        let record = l.record(1_000, 0, 0, 0, secs(2));

        // 1000 bytes alone sits under the noise floor.
        assert!(record.is_none());
        assert_eq!(
            l.window_total(Window::AllTime, TrafficClass::Wifi).upload,
            5_000_000
        );

        let record = l.record(1_000, 0, 0, 5_000, secs(3)).unwrap();
        assert_eq!(record.cellular.download, 5_000);
    }

    #[test]
    fn reboot_delta_is_logged_above_noise_floor() {
        let store = Arc::new(MemoryStore::new());
        let mut l = ledger(&store);

        l.record(5_000_000, 0, 0, 0, secs(0));
        let record = l.record(2_000, 0, 0, 0, secs(1)).unwrap();
        assert_eq!(record.wifi.upload, 2_000);
    }

    #[test]
    fn sub_floor_deltas_are_discarded() {
        let store = Arc::new(MemoryStore::new());
        let mut l = ledger(&store);

        l.record(0, 0, 0, 0, secs(0));
        assert!(l.record(500, 524, 0, 0, secs(1)).is_none());
        assert_eq!(
            l.window_total(Window::AllTime, TrafficClass::Combined),
            TrafficTotals::default()
        );
        assert_eq!(store.log_len(keys::TRAFFIC_LOG), 0);
    }

    #[test]
    fn combined_equals_sum_of_classes() {
        let store = Arc::new(MemoryStore::new());
        let mut l = ledger(&store);

        let readings = [
            (0, 0, 0, 0),
            (4_000, 10_000, 0, 0),
            (4_000, 10_000, 3_000, 9_000),
            (1_000, 20_000, 6_000, 9_500),
            (9_000, 30_000, 6_000, 100),
        ];
        for (i, (wu, wd, cu, cd)) in readings.into_iter().enumerate() {
            l.record(wu, wd, cu, cd, secs(i64::try_from(i).unwrap()));
            assert_combined_invariant(&l);
        }
    }

    #[test]
    fn day_rollover_only_resets_today() {
        let store = Arc::new(MemoryStore::new());
        let before = Utc.with_ymd_and_hms(2026, 10, 14, 23, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 10, 15, 0, 1, 0).unwrap();
        let mut l = TrafficLedger::open(store, Calendar::utc(), before);

        l.record(0, 0, 0, 0, before);
        l.record(10_000, 0, 0, 0, before + TimeDelta::seconds(30));
        l.record(13_000, 0, 0, 0, after);

        let up = |w| l.window_total(w, TrafficClass::Wifi).upload;
        assert_eq!(up(Window::Today), 3_000);
        assert_eq!(up(Window::Week), 13_000);
        assert_eq!(up(Window::Month), 13_000);
        assert_eq!(up(Window::AllTime), 13_000);
    }

    #[test]
    fn month_rollover_keeps_all_time() {
        let store = Arc::new(MemoryStore::new());
        let before = Utc.with_ymd_and_hms(2026, 10, 31, 22, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 11, 1, 1, 0, 0).unwrap();
        let mut l = TrafficLedger::open(store, Calendar::utc(), before);

        l.record(0, 0, 0, 0, before);
        l.record(0, 50_000, 0, 0, before + TimeDelta::minutes(5));
        l.record(0, 70_000, 0, 0, after);

        let down = |w| l.window_total(w, TrafficClass::Combined).download;
        assert_eq!(down(Window::Month), 20_000);
        assert_eq!(down(Window::AllTime), 70_000);
    }

    #[test]
    fn restart_resumes_from_persisted_baseline() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut l = ledger(&store);
            l.record(0, 0, 0, 0, secs(0));
            l.record(10_000, 0, 0, 0, secs(1));
        }

        let mut l = TrafficLedger::open(store.clone(), Calendar::utc(), secs(5));
        assert_eq!(
            l.window_total(Window::AllTime, TrafficClass::Wifi).upload,
            10_000
        );
        // Bytes moved while the process was down are counted once.
        l.record(15_000, 0, 0, 0, secs(6));
        assert_eq!(
            l.window_total(Window::AllTime, TrafficClass::Wifi).upload,
            15_000
        );
        assert_eq!(l.tracking_since(), t0());
    }

    #[test]
    fn corrupt_baseline_falls_back_to_first_reading() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(keys::LEDGER_BASELINE, Bytes::from_static(b"{\"wifi_up"))
            .unwrap();
        let mut l = ledger(&store);

        assert!(l.record(9_000_000, 0, 0, 0, secs(0)).is_none());
        assert_eq!(
            l.window_total(Window::AllTime, TrafficClass::Combined),
            TrafficTotals::default()
        );
    }

    #[test]
    fn reset_zeroes_everything_and_reanchors() {
        let store = Arc::new(MemoryStore::new());
        let mut l = ledger(&store);
        l.record(0, 0, 0, 0, secs(0));
        l.record(50_000, 50_000, 50_000, 50_000, secs(1));

        l.reset_all(secs(2)).unwrap();
        l.reset_all(secs(2)).unwrap();

        for window in [Window::Hour, Window::Today, Window::Week, Window::Month, Window::AllTime] {
            assert!(l.window_total(window, TrafficClass::Combined).is_zero());
        }
        assert_eq!(store.log_len(keys::TRAFFIC_LOG), 0);
        assert_eq!(l.tracking_since(), secs(2));

        // First reading after reset only re-anchors.
        assert!(l.record(80_000, 0, 0, 0, secs(3)).is_none());
        assert_eq!(l.daily_breakdown(1, secs(3))[0].upload, 0);
    }

    #[test]
    fn hourly_totals_trail_one_hour() {
        let store = Arc::new(MemoryStore::new());
        let mut l = ledger(&store);
        l.record(0, 0, 0, 0, secs(0));
        l.record(10_000, 0, 0, 0, secs(60));
        l.record(12_000, 0, 0, 0, secs(1800));

        assert_eq!(l.hourly_totals(secs(1800)).upload, 12_000);
        assert_eq!(l.hourly_totals(secs(3700)).upload, 2_000);
        assert_eq!(l.hourly_totals(secs(5500)).upload, 0);
    }

    #[test]
    fn daily_breakdown_groups_by_local_day() {
        let store = Arc::new(MemoryStore::new());
        let day1 = Utc.with_ymd_and_hms(2026, 10, 13, 10, 0, 0).unwrap();
        let day3 = Utc.with_ymd_and_hms(2026, 10, 15, 10, 0, 0).unwrap();
        let mut l = TrafficLedger::open(store, Calendar::utc(), day1);

        l.record(0, 0, 0, 0, day1);
        l.record(4_000, 1_000, 0, 0, day1 + TimeDelta::minutes(1));
        l.record(4_000, 1_000, 0, 0, day3);
        l.record(4_000, 9_000, 0, 0, day3 + TimeDelta::minutes(1));

        let days = l.daily_breakdown(3, day3);
        let summary: Vec<_> = days.iter().map(|d| (d.date.to_string(), d.upload, d.download)).collect();
        assert_eq!(
            summary,
            vec![
                ("2026-10-13".to_owned(), 4_000, 1_000),
                ("2026-10-14".to_owned(), 0, 0),
                ("2026-10-15".to_owned(), 0, 8_000),
            ]
        );
        assert!(l.daily_breakdown(0, day3).is_empty());
    }

    #[test]
    fn failed_writes_are_retried() {
        let store = Arc::new(FlakyStore::default());
        let mut l = TrafficLedger::open(store.clone(), Calendar::utc(), t0());
        l.record(0, 0, 0, 0, secs(0));

        store.set_failing(true);
        l.record(20_000, 0, 0, 0, secs(1));
        assert_eq!(store.inner.log_len(keys::TRAFFIC_LOG), 0);
        assert!(l.flush().is_err());

        store.set_failing(false);
        l.record(20_000, 0, 0, 0, secs(2));
        assert_eq!(store.inner.log_len(keys::TRAFFIC_LOG), 1);

        let reopened = TrafficLedger::open(store, Calendar::utc(), secs(3));
        assert_eq!(
            reopened.window_total(Window::AllTime, TrafficClass::Wifi).upload,
            20_000
        );
    }

    #[test]
    fn daily_breakdown_is_capped() {
        let store = Arc::new(MemoryStore::new());
        let mut l = ledger(&store);
        l.record(0, 0, 0, 0, secs(0));
        l.record(0, 7_000, 0, 0, secs(1));

        let widest = l.daily_breakdown(MAX_DAILY_DAYS, secs(2));
        assert_eq!(widest.len(), 3660);
        assert_eq!(widest.last().unwrap().download, 7_000);
        assert_eq!(widest.first().unwrap().date.to_string(), "2016-10-07");
        assert_eq!(l.daily_breakdown(u32::MAX, secs(2)), widest);
    }

    #[test]
    fn daily_totals_do_not_need_the_log() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut l = ledger(&store);
            l.record(0, 0, 0, 0, secs(0));
            l.record(3_000, 0, 0, 0, secs(1));
        }
        store.clear_log(keys::TRAFFIC_LOG).unwrap();

        let l = TrafficLedger::open(store.clone(), Calendar::utc(), secs(2));
        assert_eq!(l.daily_breakdown(1, secs(2))[0].upload, 3_000);
    }

    #[test]
    fn corrupt_daily_totals_are_rebuilt_from_log() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut l = ledger(&store);
            l.record(0, 0, 0, 0, secs(0));
            l.record(3_000, 0, 0, 0, secs(1));
            l.record(5_000, 0, 0, 0, secs(2));
        }
        store
            .set(keys::LEDGER_DAILY, Bytes::from_static(b"{\"2026-"))
            .unwrap();

        let mut l = TrafficLedger::open(store.clone(), Calendar::utc(), secs(3));
        assert_eq!(l.daily_breakdown(1, secs(3))[0].upload, 5_000);
        l.flush().unwrap();
        let saved: DailyTotals = store.get_json(keys::LEDGER_DAILY).unwrap().unwrap();
        assert_eq!(saved.values().next().unwrap().upload, 5_000);
    }

    #[test]
    fn totals_are_saved_before_the_record_is_logged() {
        let store = Arc::new(FlakyStore::default());
        let mut l = TrafficLedger::open(store.clone(), Calendar::utc(), t0());
        l.record(0, 0, 0, 0, secs(0));

        // Saving state fails, so the record must not reach the log.
        store.set_failing_sets(true);
        l.record(20_000, 0, 0, 0, secs(1));
        assert_eq!(store.inner.log_len(keys::TRAFFIC_LOG), 0);

        // Restart without flushing; the delta is counted exactly once.
        store.set_failing_sets(false);
        drop(l);
        let mut l = TrafficLedger::open(store.clone(), Calendar::utc(), secs(2));
        l.record(20_000, 0, 0, 0, secs(3));
        assert_eq!(store.inner.log_len(keys::TRAFFIC_LOG), 1);
        assert_eq!(l.hourly_totals(secs(3)).upload, 20_000);
        assert_eq!(
            l.window_total(Window::AllTime, TrafficClass::Wifi).upload,
            20_000
        );
    }

    #[test]
    fn write_behind_waits_for_the_owner() {
        let store = Arc::new(FlakyStore::default());
        let mut l = TrafficLedger::open(store.clone(), Calendar::utc(), t0());
        l.set_write_behind(true);
        l.record(0, 0, 0, 0, secs(0));
        l.record(4_000, 0, 0, 0, secs(1));
        assert_eq!(store.inner.log_len(keys::TRAFFIC_LOG), 0);

        store.set_failing(true);
        let mut write = l.take_write();
        assert_eq!(write.records().len(), 1);
        assert!(write.apply(store.as_ref()).is_err());
        l.restore_write(write);

        store.set_failing(false);
        l.record(9_000, 0, 0, 0, secs(2));
        let mut write = l.take_write();
        let logged: Vec<_> = write.records().iter().map(|r| r.wifi.upload).collect();
        assert_eq!(logged, vec![4_000, 5_000]);
        write.apply(store.as_ref()).unwrap();
        assert_eq!(store.inner.log_len(keys::TRAFFIC_LOG), 2);
        assert!(l.take_write().records().is_empty());
    }
}
