// ── Sleep sessions ──
//
// A user-declared quiet period. Snapshots are buffered while the
// session runs and folded into running accumulators; averages are
// computed exactly once, when the session ends.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::counter::seconds_between;
use crate::error::{CoreError, PersistenceError};
use crate::model::{FinalizedSession, Incident, MetricSnapshot, ThermalState};
use crate::persist::{Store, StoreExt, keys};

/// Snapshots buffered before being folded into the accumulators.
pub const BUFFER_CAPACITY: usize = 32;

/// Peak score at or above which a session is flagged anomalous.
pub const ANOMALY_SCORE: u8 = 40;

/// Either a running session or the last one that finished.
#[derive(Debug, Clone)]
pub enum SleepSession {
    Active(ActiveSession),
    Finalized(FinalizedSession),
}

impl SleepSession {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Active(s) => s.id,
            Self::Finalized(s) => s.id,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        match self {
            Self::Active(s) => s.started_at,
            Self::Finalized(s) => s.started_at,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }
}

#[derive(Debug, Clone, Default)]
struct Accumulators {
    samples: u64,
    sum_upload: f64,
    sum_download: f64,
    sum_cpu: f64,
    peak_upload: f64,
    peak_download: f64,
    peak_cpu: f64,
    peak_thermal: ThermalState,
    peak_score: u8,
    bytes_uploaded: f64,
    bytes_downloaded: f64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Accumulators {
    fn fold(&mut self, s: &MetricSnapshot) {
        if let Some(last) = self.last_timestamp {
            let elapsed = seconds_between(last, s.timestamp);
            if elapsed > 0.0 {
                self.bytes_uploaded += s.upload_rate * elapsed;
                self.bytes_downloaded += s.download_rate * elapsed;
            }
        }
        self.last_timestamp = Some(s.timestamp);

        self.samples += 1;
        self.sum_upload += s.upload_rate;
        self.sum_download += s.download_rate;
        self.sum_cpu += s.cpu_percent;
        self.peak_upload = self.peak_upload.max(s.upload_rate);
        self.peak_download = self.peak_download.max(s.download_rate);
        self.peak_cpu = self.peak_cpu.max(s.cpu_percent);
        self.peak_thermal = self.peak_thermal.max(s.thermal);
        self.peak_score = self.peak_score.max(s.threat_score);
    }
}

/// Running state of the active session.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub incident_count: u32,
    acc: Accumulators,
    buffer: Vec<MetricSnapshot>,
}

impl ActiveSession {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            incident_count: 0,
            acc: Accumulators::default(),
            buffer: Vec::with_capacity(BUFFER_CAPACITY),
        }
    }

    /// Snapshots seen so far, buffered or folded.
    pub fn samples(&self) -> u64 {
        self.acc
            .samples
            .saturating_add(u64::try_from(self.buffer.len()).unwrap_or(u64::MAX))
    }

    pub fn peak_threat_score(&self) -> u8 {
        self.buffer
            .iter()
            .map(|s| s.threat_score)
            .fold(self.acc.peak_score, u8::max)
    }

    fn drain(&mut self) {
        for snapshot in self.buffer.drain(..) {
            self.acc.fold(&snapshot);
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::as_conversions
    )]
    fn finalize(mut self, ended_at: DateTime<Utc>) -> FinalizedSession {
        self.drain();
        let acc = &self.acc;
        let avg = |sum: f64| {
            if acc.samples == 0 {
                0.0
            } else {
                sum / acc.samples as f64
            }
        };

        FinalizedSession {
            id: self.id,
            started_at: self.started_at,
            ended_at,
            samples: acc.samples,
            avg_upload_rate: avg(acc.sum_upload),
            peak_upload_rate: acc.peak_upload,
            avg_download_rate: avg(acc.sum_download),
            peak_download_rate: acc.peak_download,
            avg_cpu_percent: avg(acc.sum_cpu),
            peak_cpu_percent: acc.peak_cpu,
            peak_thermal: acc.peak_thermal,
            peak_threat_score: acc.peak_score,
            bytes_uploaded: acc.bytes_uploaded.max(0.0).round() as u64,
            bytes_downloaded: acc.bytes_downloaded.max(0.0).round() as u64,
            incident_count: self.incident_count,
            anomaly: self.incident_count > 0 || acc.peak_score >= ANOMALY_SCORE,
        }
    }
}

/// Owns the single optional sleep session and its history log.
pub struct SleepTracker {
    store: Arc<dyn Store>,
    current: Option<SleepSession>,
    /// Finalized sessions whose log append failed, oldest first.
    pending: Vec<FinalizedSession>,
}

impl std::fmt::Debug for SleepTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SleepTracker")
            .field("current", &self.current)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl SleepTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            current: None,
            pending: Vec::new(),
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<ActiveSession, CoreError> {
        if let Some(active) = self.active() {
            return Err(CoreError::SessionAlreadyActive {
                started_at: active.started_at.to_rfc3339(),
            });
        }
        let session = ActiveSession::new(now);
        info!(id = %session.id, "sleep session started");
        self.current = Some(SleepSession::Active(session.clone()));
        Ok(session)
    }

    /// Buffer a snapshot. Ignored when no session is active. Also
    /// retries sessions that previously failed to persist.
    pub fn record(&mut self, snapshot: &MetricSnapshot) {
        if !self.pending.is_empty() {
            self.retry_pending();
        }
        if let Some(SleepSession::Active(active)) = &mut self.current {
            active.buffer.push(snapshot.clone());
            if active.buffer.len() >= BUFFER_CAPACITY {
                active.drain();
            }
        }
    }

    pub fn on_incident(&mut self, incident: &Incident) {
        if let Some(SleepSession::Active(active)) = &mut self.current {
            active.incident_count = active.incident_count.saturating_add(1);
            debug!(session = %active.id, incident = %incident.id, "incident counted against sleep session");
        }
    }

    /// Drain buffered snapshots, compute the final aggregates and append
    /// the session to history.
    pub fn end(&mut self, now: DateTime<Utc>) -> Result<FinalizedSession, CoreError> {
        let active = match self.current.take() {
            Some(SleepSession::Active(active)) => active,
            other => {
                self.current = other;
                return Err(CoreError::NoActiveSession);
            }
        };

        let finalized = active.finalize(now);
        info!(
            id = %finalized.id,
            samples = finalized.samples,
            incidents = finalized.incident_count,
            anomaly = finalized.anomaly,
            "sleep session ended"
        );
        self.pending.push(finalized.clone());
        self.retry_pending();
        self.current = Some(SleepSession::Finalized(finalized.clone()));
        Ok(finalized)
    }

    /// Append every finalized session still waiting to be persisted.
    pub fn flush(&mut self) -> Result<(), PersistenceError> {
        while let Some(session) = self.pending.first() {
            self.store.append_json(keys::SLEEP_SESSION_LOG, session)?;
            self.pending.remove(0);
        }
        Ok(())
    }

    fn retry_pending(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, pending = self.pending.len(), "failed to persist sleep session, will retry");
        }
    }

    pub fn active(&self) -> Option<&ActiveSession> {
        match &self.current {
            Some(SleepSession::Active(active)) => Some(active),
            _ => None,
        }
    }

    pub fn current(&self) -> Option<&SleepSession> {
        self.current.as_ref()
    }

    /// Finalized sessions, newest first, including any not yet persisted.
    pub fn list(&self, limit: Option<usize>) -> Result<Vec<FinalizedSession>, PersistenceError> {
        let mut sessions: Vec<FinalizedSession> =
            self.store.query_json(keys::SLEEP_SESSION_LOG, |_: &FinalizedSession| true)?;
        sessions.extend(self.pending.iter().cloned());
        sessions.reverse();
        if let Some(limit) = limit {
            sessions.truncate(limit);
        }
        Ok(sessions)
    }
}
