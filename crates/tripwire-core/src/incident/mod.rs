// ── Incident engine ──
//
// Turns sustained rule firings into deduplicated, lifecycle-tracked
// incidents. At most one unresolved incident exists per kind; resolved
// is terminal. Every state change is appended to the `incidents` log as
// the full record, and restore folds the log by id.

pub mod rules;

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{
    Incident, IncidentFilter, IncidentKind, MetricSnapshot, ThresholdSet, TrafficTotals,
};
use crate::persist::{Store, StoreExt, keys};
use crate::scorer::Assessment;

pub use rules::{Detection, detect, detect_with, severity_of};

/// Default number of incidents kept in memory.
pub const DEFAULT_HISTORY: usize = 500;

pub struct IncidentEngine {
    store: Arc<dyn Store>,
    /// Oldest first.
    incidents: VecDeque<Incident>,
    capacity: usize,
    /// Records whose log append failed; memory stays authoritative.
    pending: Vec<Incident>,
}

impl std::fmt::Debug for IncidentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncidentEngine")
            .field("incidents", &self.incidents.len())
            .field("capacity", &self.capacity)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl IncidentEngine {
    /// Rebuild state from the incident log. Unreadable history starts
    /// empty; duplicate unresolved incidents are collapsed.
    pub fn restore(store: Arc<dyn Store>, capacity: usize, now: DateTime<Utc>) -> Self {
        let records = store
            .query_json(keys::INCIDENT_LOG, |_: &Incident| true)
            .unwrap_or_else(|e| {
                warn!(error = %e, "incident log unreadable, starting with empty history");
                Vec::new()
            });

        let mut latest: HashMap<Uuid, Incident> = HashMap::with_capacity(records.len());
        for record in records {
            latest.insert(record.id, record);
        }
        let mut incidents: Vec<Incident> = latest.into_values().collect();
        incidents.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then(a.id.cmp(&b.id)));

        let mut engine = Self {
            store,
            incidents: incidents.into(),
            capacity: capacity.max(1),
            pending: Vec::new(),
        };
        engine.collapse_duplicates(now);
        engine.trim();
        debug!(?engine, "incident engine restored");
        engine
    }

    /// Run every rule and open incidents for kinds without an unresolved
    /// one. Returns only newly opened incidents.
    pub fn evaluate(
        &mut self,
        snapshot: &MetricSnapshot,
        hourly: TrafficTotals,
        thresholds: &ThresholdSet,
    ) -> Vec<Incident> {
        let detections = rules::detect(snapshot, hourly, thresholds);
        self.open_detections(snapshot, detections)
    }

    /// As [`evaluate`](Self::evaluate) with the tick's assessment.
    pub fn evaluate_assessed(
        &mut self,
        snapshot: &MetricSnapshot,
        hourly: TrafficTotals,
        thresholds: &ThresholdSet,
        assessment: &Assessment,
    ) -> Vec<Incident> {
        let detections = rules::detect_with(snapshot, hourly, thresholds, assessment);
        self.open_detections(snapshot, detections)
    }

    /// Set the acknowledged flag. No effect on resolved incidents.
    pub fn acknowledge(&mut self, id: Uuid) -> Result<Incident, CoreError> {
        let incident = self.find_mut(id)?;
        if incident.acknowledged || incident.resolved {
            return Ok(incident.clone());
        }
        incident.acknowledged = true;
        let updated = incident.clone();
        info!(id = %updated.id, kind = %updated.kind, "incident acknowledged");
        self.write(updated.clone());
        Ok(updated)
    }

    /// Resolve and stamp `closed_at`. Resolving twice is a no-op.
    pub fn resolve(&mut self, id: Uuid, now: DateTime<Utc>) -> Result<Incident, CoreError> {
        let incident = self.find_mut(id)?;
        if incident.resolved {
            return Ok(incident.clone());
        }
        incident.resolved = true;
        incident.closed_at = Some(now);
        let updated = incident.clone();
        info!(id = %updated.id, kind = %updated.kind, "incident resolved");
        self.write(updated.clone());
        Ok(updated)
    }

    /// Resolve every unresolved incident whose rule no longer fires.
    /// Only called when auto-resolve is configured.
    pub fn resolve_recovered(
        &mut self,
        snapshot: &MetricSnapshot,
        hourly: TrafficTotals,
        thresholds: &ThresholdSet,
        now: DateTime<Utc>,
    ) -> Vec<Incident> {
        let firing: BTreeSet<IncidentKind> = rules::detect(snapshot, hourly, thresholds)
            .into_iter()
            .map(|d| d.kind)
            .collect();

        let recovered: Vec<Uuid> = self
            .incidents
            .iter()
            .filter(|i| i.is_unresolved() && !firing.contains(&i.kind))
            .map(|i| i.id)
            .collect();

        recovered
            .into_iter()
            .filter_map(|id| self.resolve(id, now).ok())
            .collect()
    }

    /// Unresolved incidents, oldest first.
    pub fn active(&self) -> Vec<Incident> {
        self.incidents
            .iter()
            .filter(|i| i.is_unresolved())
            .cloned()
            .collect()
    }

    /// Matching incidents, newest first.
    pub fn list(&self, filter: &IncidentFilter) -> Vec<Incident> {
        let matching = self.incidents.iter().rev().filter(|i| filter.matches(i));
        match filter.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&Incident> {
        self.incidents.iter().find(|i| i.id == id)
    }

    /// Resolve a full id or an unambiguous id prefix.
    pub fn lookup(&self, id_or_prefix: &str) -> Result<Uuid, CoreError> {
        if let Ok(id) = Uuid::parse_str(id_or_prefix) {
            return self
                .get(id)
                .map(|i| i.id)
                .ok_or_else(|| CoreError::IncidentNotFound {
                    id: id_or_prefix.to_owned(),
                });
        }

        let needle = id_or_prefix.to_ascii_lowercase();
        let mut matches = self
            .incidents
            .iter()
            .filter(|i| !needle.is_empty() && i.id.to_string().starts_with(&needle));
        match (matches.next(), matches.next()) {
            (Some(found), None) => Ok(found.id),
            _ => Err(CoreError::IncidentNotFound {
                id: id_or_prefix.to_owned(),
            }),
        }
    }

    /// Retry log appends that failed earlier.
    pub fn flush(&mut self) -> Result<(), CoreError> {
        while let Some(record) = self.pending.first() {
            self.store.append_json(keys::INCIDENT_LOG, record)?;
            self.pending.remove(0);
        }
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────

    fn open_detections(
        &mut self,
        snapshot: &MetricSnapshot,
        detections: Vec<Detection>,
    ) -> Vec<Incident> {
        let mut opened = Vec::new();
        for detection in detections {
            if self.unresolved_of(detection.kind).is_some() {
                debug!(kind = %detection.kind, "rule fired with incident already open");
                continue;
            }
            let incident = Incident::open(
                detection.kind,
                detection.severity,
                detection.reason,
                snapshot.clone(),
            );
            info!(
                id = %incident.id,
                kind = %incident.kind,
                severity = %incident.severity,
                reason = %incident.reason,
                "incident opened"
            );
            self.incidents.push_back(incident.clone());
            self.write(incident.clone());
            opened.push(incident);
        }
        if !opened.is_empty() {
            self.trim();
        }
        opened
    }

    fn unresolved_of(&self, kind: IncidentKind) -> Option<&Incident> {
        self.incidents
            .iter()
            .find(|i| i.kind == kind && i.is_unresolved())
    }

    fn find_mut(&mut self, id: Uuid) -> Result<&mut Incident, CoreError> {
        self.incidents
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| CoreError::IncidentNotFound { id: id.to_string() })
    }

    fn write(&mut self, incident: Incident) {
        self.pending.push(incident);
        if let Err(e) = self.flush() {
            warn!(error = %e, pending = self.pending.len(), "incident log write failed, will retry");
        }
    }

    /// Keep only the earliest unresolved incident of each kind.
    fn collapse_duplicates(&mut self, now: DateTime<Utc>) {
        let mut seen = BTreeSet::new();
        let mut duplicates = Vec::new();
        for incident in self.incidents.iter().filter(|i| i.is_unresolved()) {
            if !seen.insert(incident.kind) {
                duplicates.push(incident.id);
            }
        }
        for id in duplicates {
            error!(%id, "duplicate unresolved incident found in history, resolving it");
            if let Err(e) = self.resolve(id, now) {
                warn!(error = %e, "failed to collapse duplicate incident");
            }
        }
    }

    /// Drop the oldest resolved incidents beyond capacity.
    fn trim(&mut self) {
        while self.incidents.len() > self.capacity {
            let Some(pos) = self.incidents.iter().position(|i| i.resolved) else {
                break;
            };
            self.incidents.remove(pos);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::Bytes;
    use chrono::{TimeDelta, TimeZone};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{IncidentStatus, ThresholdMetric};
    use crate::persist::MemoryStore;

    fn t(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 3, 0, 0).unwrap() + TimeDelta::seconds(n)
    }

    fn cpu_at(percent: f64, at: DateTime<Utc>) -> MetricSnapshot {
        let mut s = MetricSnapshot::empty(at);
        s.cpu_percent = percent;
        s
    }

    fn engine(store: &Arc<MemoryStore>) -> IncidentEngine {
        IncidentEngine::restore(store.clone(), DEFAULT_HISTORY, t(0))
    }

    fn cpu_only() -> ThresholdSet {
        ThresholdSet::all_disabled().with(ThresholdMetric::Cpu, 60.0, true)
    }

    #[test]
    fn sustained_cpu_opens_one_incident_until_resolved() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine(&store);
        let thresholds = cpu_only();

        let first = engine.evaluate(&cpu_at(70.0, t(0)), TrafficTotals::default(), &thresholds);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, IncidentKind::CpuAnomaly);
        let id = first[0].id;

        for n in 1..3 {
            let again = engine.evaluate(&cpu_at(70.0, t(n * 2)), TrafficTotals::default(), &thresholds);
            assert!(again.is_empty());
        }
        assert_eq!(engine.active().len(), 1);

        // Recovery alone does not resolve.
        engine.evaluate(&cpu_at(40.0, t(8)), TrafficTotals::default(), &thresholds);
        assert_eq!(engine.get(id).unwrap().status(), IncidentStatus::Open);

        let resolved = engine.resolve(id, t(10)).unwrap();
        assert_eq!(resolved.status(), IncidentStatus::Resolved);
        assert_eq!(resolved.closed_at, Some(t(10)));
        assert!(engine.active().is_empty());

        // A fresh breach after resolution opens a new incident.
        let next = engine.evaluate(&cpu_at(90.0, t(12)), TrafficTotals::default(), &thresholds);
        assert_eq!(next.len(), 1);
        assert_ne!(next[0].id, id);
    }

    #[test]
    fn acknowledge_does_not_close() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine(&store);
        let id = engine.evaluate(&cpu_at(80.0, t(0)), TrafficTotals::default(), &cpu_only())[0].id;

        let acked = engine.acknowledge(id).unwrap();
        assert!(acked.acknowledged);
        assert_eq!(acked.status(), IncidentStatus::Acknowledged);
        assert_eq!(engine.active().len(), 1);

        // Still deduplicated while acknowledged.
        assert!(engine
            .evaluate(&cpu_at(80.0, t(2)), TrafficTotals::default(), &cpu_only())
            .is_empty());
    }

    #[test]
    fn resolve_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine(&store);
        let id = engine.evaluate(&cpu_at(80.0, t(0)), TrafficTotals::default(), &cpu_only())[0].id;

        let once = engine.resolve(id, t(5)).unwrap();
        let logged = store.log_len(keys::INCIDENT_LOG);
        let twice = engine.resolve(id, t(9)).unwrap();
        assert_eq!(once, twice);
        assert_eq!(store.log_len(keys::INCIDENT_LOG), logged);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine(&store);
        assert!(matches!(
            engine.resolve(Uuid::new_v4(), t(0)),
            Err(CoreError::IncidentNotFound { .. })
        ));
        assert!(engine.lookup("zzz").is_err());
    }

    #[test]
    fn lookup_accepts_unique_prefix() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine(&store);
        let id = engine.evaluate(&cpu_at(80.0, t(0)), TrafficTotals::default(), &cpu_only())[0].id;
        let prefix = &id.to_string()[..8];
        assert_eq!(engine.lookup(prefix).unwrap(), id);
        assert_eq!(engine.lookup(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn restore_folds_log_by_id() {
        let store = Arc::new(MemoryStore::new());
        let id = {
            let mut engine = engine(&store);
            let id = engine.evaluate(&cpu_at(80.0, t(0)), TrafficTotals::default(), &cpu_only())[0].id;
            engine.acknowledge(id).unwrap();
            id
        };

        let restored = engine(&store);
        assert_eq!(restored.list(&IncidentFilter::default()).len(), 1);
        assert!(restored.get(id).unwrap().acknowledged);
    }

    #[test]
    fn restore_collapses_duplicate_unresolved() {
        let store = Arc::new(MemoryStore::new());
        let early = Incident::open(
            IncidentKind::CpuAnomaly,
            severity_of(IncidentKind::CpuAnomaly),
            "first".into(),
            cpu_at(80.0, t(0)),
        );
        let late = Incident::open(
            IncidentKind::CpuAnomaly,
            severity_of(IncidentKind::CpuAnomaly),
            "second".into(),
            cpu_at(85.0, t(60)),
        );
        store.append_json(keys::INCIDENT_LOG, &late).unwrap();
        store.append_json(keys::INCIDENT_LOG, &early).unwrap();
        store
            .append(keys::INCIDENT_LOG, Bytes::from_static(b"{\"id\":"))
            .unwrap();

        let engine = IncidentEngine::restore(store.clone(), DEFAULT_HISTORY, t(120));
        let active = engine.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, early.id);
        assert!(engine.get(late.id).unwrap().resolved);
    }

    #[test]
    fn resolve_recovered_closes_only_quiet_kinds() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine(&store);
        let thresholds = ThresholdSet::default();

        let mut hot = cpu_at(80.0, t(0));
        hot.thermal = crate::model::ThermalState::Serious;
        let opened = engine.evaluate(&hot, TrafficTotals::default(), &thresholds);
        assert_eq!(opened.len(), 2);

        let mut cooled = hot.clone();
        cooled.thermal = crate::model::ThermalState::Nominal;
        let resolved = engine.resolve_recovered(&cooled, TrafficTotals::default(), &thresholds, t(4));
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].kind, IncidentKind::ThermalStress);
        assert_eq!(engine.active()[0].kind, IncidentKind::CpuAnomaly);
    }

    #[test]
    fn list_filters_newest_first() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine(&store);
        let cpu = engine.evaluate(&cpu_at(80.0, t(0)), TrafficTotals::default(), &cpu_only())[0].id;
        engine.resolve(cpu, t(1)).unwrap();
        engine.evaluate(&cpu_at(81.0, t(2)), TrafficTotals::default(), &cpu_only());

        let all = engine.list(&IncidentFilter::default());
        assert_eq!(all.len(), 2);
        assert!(all[0].opened_at > all[1].opened_at);

        let open = engine.list(&IncidentFilter::unresolved());
        assert_eq!(open.len(), 1);

        let limited = engine.list(&IncidentFilter {
            limit: Some(1),
            ..IncidentFilter::default()
        });
        assert_eq!(limited[0].id, all[0].id);
    }

    #[test]
    fn history_is_bounded() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = IncidentEngine::restore(store, 3, t(0));
        for n in 0..5 {
            let id = engine.evaluate(&cpu_at(80.0, t(n)), TrafficTotals::default(), &cpu_only())[0].id;
            engine.resolve(id, t(n)).unwrap();
        }
        assert_eq!(engine.list(&IncidentFilter::default()).len(), 3);
    }
}
