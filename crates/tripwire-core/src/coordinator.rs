// ── Monitoring coordinator ──
//
// Owns sampler lifecycles and the scoring tick, and is the only
// component that sequences calls across the ledger, scorer, incident
// engine and sleep tracker. Samplers publish independently; the tick
// reads whatever each one published last.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::activity::ActivityLog;
use crate::config::MonitorConfig;
use crate::error::CoreError;
use crate::incident::IncidentEngine;
use crate::ledger::{LedgerTotals, LedgerWrite, TrafficLedger};
use crate::model::{
    ActivityEntry, ActivityKind, DailyUsage, FinalizedSession, Incident, IncidentFilter,
    MetricSnapshot, MonitorHealth, SamplerKind, ThreatLevel, ThresholdSet, TrafficClass,
    TrafficTotals, Window,
};
use crate::persist::Store;
use crate::sampler::{
    BatterySampler, CpuSampler, NetworkSampler, Sampler, SamplerEvent, SamplerHandle, Sources,
    ThermalSampler, sampler_task,
};
use crate::scorer;
use crate::session::SleepTracker;
use crate::stream::SnapshotStream;

const SAMPLER_EVENT_CHANNEL_SIZE: usize = 32;
const EVENT_CHANNEL_SIZE: usize = 128;

// ── Collaborator seams ───────────────────────────────────────────────

/// Push hook for display layers, called with every new snapshot.
pub trait Publisher: Send + Sync {
    fn publish(&self, snapshot: &MetricSnapshot);
}

/// Read-only threshold input, consulted on every tick.
pub trait ThresholdSource: Send + Sync {
    fn thresholds(&self) -> ThresholdSet;
}

/// A fixed threshold set.
#[derive(Debug, Clone, Default)]
pub struct StaticThresholds(pub ThresholdSet);

impl ThresholdSource for StaticThresholds {
    fn thresholds(&self) -> ThresholdSet {
        self.0.clone()
    }
}

/// Notable state changes, broadcast to interested consumers.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    LevelChanged {
        from: ThreatLevel,
        to: ThreatLevel,
        score: u8,
    },
    IncidentOpened(Incident),
    IncidentResolved(Incident),
    Health(MonitorHealth),
}

// ── Coordinator ──────────────────────────────────────────────────────

/// Entry point for consumers of the monitoring core.
///
/// Cheaply cloneable via `Arc`. Construction wires every component but
/// starts nothing; call [`start`](Self::start) to spawn the sampler and
/// tick tasks, or drive [`sample_once`](Self::sample_once) and
/// [`tick`](Self::tick) directly.
#[derive(Clone)]
pub struct MonitoringCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct Samplers {
    network: Arc<SamplerHandle<NetworkSampler>>,
    cpu: Arc<SamplerHandle<CpuSampler>>,
    battery: Arc<SamplerHandle<BatterySampler>>,
    thermal: Arc<SamplerHandle<ThermalSampler>>,
}

/// Mutable engine state, serialized behind one lock.
struct EngineState {
    ledger: TrafficLedger,
    incidents: IncidentEngine,
    sleep: SleepTracker,
    activity: ActivityLog,
    level: ThreatLevel,
    degraded: BTreeSet<SamplerKind>,
}

struct CoordinatorInner {
    config: MonitorConfig,
    thresholds: Arc<dyn ThresholdSource>,
    samplers: Samplers,
    state: Mutex<EngineState>,
    /// Held across a ledger write so writes land in order and never
    /// race a reset.
    ledger_io: Mutex<()>,
    snapshot_tx: watch::Sender<Arc<MetricSnapshot>>,
    health_tx: watch::Sender<MonitorHealth>,
    event_tx: broadcast::Sender<MonitorEvent>,
    publishers: std::sync::RwLock<Vec<Arc<dyn Publisher>>>,
    cancel: CancellationToken,
    /// Child token for the current run; replaced on every start.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MonitoringCoordinator {
    /// Wire a coordinator. Restores ledger and incident state from
    /// `store`; unreadable state is logged and replaced, never fatal.
    pub fn new(
        config: MonitorConfig,
        store: Arc<dyn Store>,
        sources: Sources,
        thresholds: Arc<dyn ThresholdSource>,
    ) -> Self {
        let now = Utc::now();
        let failures = config.degraded_after_failures;
        let samplers = Samplers {
            network: Arc::new(SamplerHandle::new(
                NetworkSampler::new(sources.network, config.interfaces.clone()),
                failures,
            )),
            cpu: Arc::new(SamplerHandle::new(CpuSampler::new(sources.cpu), failures)),
            battery: Arc::new(SamplerHandle::new(
                BatterySampler::new(sources.battery, config.battery_window),
                failures,
            )),
            thermal: Arc::new(SamplerHandle::new(
                ThermalSampler::new(sources.thermal),
                failures,
            )),
        };

        let mut ledger = TrafficLedger::open(Arc::clone(&store), config.calendar, now);
        ledger.set_write_behind(true);
        let state = EngineState {
            ledger,
            incidents: IncidentEngine::restore(Arc::clone(&store), config.incident_history, now),
            sleep: SleepTracker::new(store),
            activity: ActivityLog::new(config.activity_log_size),
            level: ThreatLevel::Normal,
            degraded: BTreeSet::new(),
        };

        let (snapshot_tx, _) = watch::channel(Arc::new(MetricSnapshot::empty(now)));
        let (health_tx, _) = watch::channel(MonitorHealth::Healthy);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                thresholds,
                samplers,
                state: Mutex::new(state),
                ledger_io: Mutex::new(()),
                snapshot_tx,
                health_tx,
                event_tx,
                publishers: std::sync::RwLock::new(Vec::new()),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn add_publisher(&self, publisher: Arc<dyn Publisher>) {
        self.inner
            .publishers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(publisher);
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the sampler tasks and the scoring tick. No-op when already
    /// running.
    pub async fn start(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() {
            debug!("start requested while running");
            return;
        }

        let cancel = {
            let mut child = self.inner.cancel_child.lock().await;
            if child.is_cancelled() {
                *child = self.inner.cancel.child_token();
            }
            child.clone()
        };

        let config = &self.inner.config;
        let samplers = &self.inner.samplers;
        let (sampler_tx, sampler_rx) = mpsc::channel(SAMPLER_EVENT_CHANNEL_SIZE);

        handles.push(spawn_sampler(&samplers.network, config.network_interval, &sampler_tx, &cancel));
        handles.push(spawn_sampler(&samplers.cpu, config.cpu_interval, &sampler_tx, &cancel));
        handles.push(spawn_sampler(&samplers.battery, config.battery_interval, &sampler_tx, &cancel));
        handles.push(spawn_sampler(&samplers.thermal, config.thermal_interval, &sampler_tx, &cancel));
        drop(sampler_tx);

        handles.push(tokio::spawn(sampler_event_task(
            self.clone(),
            sampler_rx,
            cancel.clone(),
        )));
        handles.push(tokio::spawn(tick_task(
            self.clone(),
            config.tick_interval,
            cancel,
        )));

        self.log_activity(Utc::now(), ActivityKind::MonitoringStarted, "monitoring started")
            .await;
        info!(tasks = handles.len(), "monitoring started");
    }

    /// Cancel and join every task, then flush durable state. No-op when
    /// already stopped.
    pub async fn stop(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        if handles.is_empty() {
            return;
        }

        self.inner.cancel_child.lock().await.cancel();
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "monitoring task ended abnormally");
            }
        }
        drop(handles);

        let _io = self.inner.ledger_io.lock().await;
        let mut state = self.inner.state.lock().await;
        if let Err(e) = state.ledger.flush() {
            warn!(error = %e, "ledger flush failed at stop");
        }
        if let Err(e) = state.incidents.flush() {
            warn!(error = %e, "incident flush failed at stop");
        }
        if let Err(e) = state.sleep.flush() {
            warn!(error = %e, "sleep session flush failed at stop");
        }
        state
            .activity
            .push(Utc::now(), ActivityKind::MonitoringStopped, "monitoring stopped");
        info!("monitoring stopped");
    }

    pub async fn is_running(&self) -> bool {
        !self.inner.task_handles.lock().await.is_empty()
    }

    // ── Tick ─────────────────────────────────────────────────────────

    /// Poll every sampler once, in place of the periodic sampler tasks.
    pub async fn sample_once(&self, now: DateTime<Utc>) {
        let samplers = &self.inner.samplers;
        let events = [
            samplers.network.poll(now),
            samplers.cpu.poll(now),
            samplers.battery.poll(now),
            samplers.thermal.poll(now),
        ];
        for event in events.into_iter().flatten() {
            self.apply_sampler_event(event, now).await;
        }
    }

    /// Run one scoring tick: account traffic, assemble and score a new
    /// snapshot, log level transitions, evaluate incidents, feed the
    /// sleep tracker, then publish.
    pub async fn tick(&self, now: DateTime<Utc>) -> Arc<MetricSnapshot> {
        let thresholds = self.inner.thresholds.thresholds();
        let samplers = &self.inner.samplers;
        let network = samplers.network.latest();
        let cpu = samplers.cpu.latest();
        let battery = samplers.battery.latest();
        let thermal = samplers.thermal.latest();

        let io = self.inner.ledger_io.lock().await;
        let mut events = Vec::new();
        let (snapshot, write) = {
            let mut state = self.inner.state.lock().await;

            if let Some(n) = &network {
                state.ledger.record(
                    n.wifi.upload,
                    n.wifi.download,
                    n.cellular.upload,
                    n.cellular.download,
                    now,
                );
            }
            let hourly = state.ledger.hourly_totals(now);

            let mut snapshot = MetricSnapshot::empty(now);
            if let Some(n) = &network {
                snapshot.upload_rate = n.upload_rate;
                snapshot.download_rate = n.download_rate;
                snapshot.wifi_upload_rate = n.wifi_upload_rate;
                snapshot.wifi_download_rate = n.wifi_download_rate;
                snapshot.cellular_upload_rate = n.cellular_upload_rate;
                snapshot.cellular_download_rate = n.cellular_download_rate;
            }
            if let Some(c) = &cpu {
                snapshot.cpu_percent = c.percent;
            }
            if let Some(b) = &battery {
                snapshot.battery_level = b.level;
                snapshot.battery_charging = b.charging;
                snapshot.battery_drain_per_hour = b.drain_per_hour;
            }
            if let Some(t) = &thermal {
                snapshot.thermal = t.state;
            }
            snapshot.degraded = state.degraded.iter().copied().collect();

            let assessment = scorer::score(&snapshot, hourly, &thresholds);
            snapshot.threat_score = assessment.score;
            snapshot.threat_level = assessment.level;

            if assessment.level != state.level {
                let from = state.level;
                state.level = assessment.level;
                let breaches: Vec<String> =
                    assessment.breaches.iter().map(ToString::to_string).collect();
                let message = if breaches.is_empty() {
                    format!("threat level {from} -> {} (score {})", assessment.level, assessment.score)
                } else {
                    format!(
                        "threat level {from} -> {} (score {}: {})",
                        assessment.level,
                        assessment.score,
                        breaches.join(", ")
                    )
                };
                info!(%from, to = %assessment.level, score = assessment.score, "threat level changed");
                state.activity.push(now, ActivityKind::LevelChanged, message);
                events.push(MonitorEvent::LevelChanged {
                    from,
                    to: assessment.level,
                    score: assessment.score,
                });
            }

            if self.inner.config.auto_resolve {
                for incident in state
                    .incidents
                    .resolve_recovered(&snapshot, hourly, &thresholds, now)
                {
                    state.activity.push(
                        now,
                        ActivityKind::IncidentResolved,
                        format!("{} recovered", incident.kind),
                    );
                    events.push(MonitorEvent::IncidentResolved(incident));
                }
            }

            let opened =
                state
                    .incidents
                    .evaluate_assessed(&snapshot, hourly, &thresholds, &assessment);
            for incident in opened {
                state.sleep.on_incident(&incident);
                state.activity.push(
                    now,
                    ActivityKind::IncidentOpened,
                    format!("{} ({}): {}", incident.kind, incident.severity, incident.reason),
                );
                events.push(MonitorEvent::IncidentOpened(incident));
            }

            state.sleep.record(&snapshot);
            (Arc::new(snapshot), state.ledger.take_write())
        };
        self.write_ledger(write).await;
        drop(io);

        self.inner.snapshot_tx.send_replace(Arc::clone(&snapshot));
        for event in events {
            let _ = self.inner.event_tx.send(event);
        }
        let publishers = self
            .inner
            .publishers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        for publisher in publishers {
            publisher.publish(&snapshot);
        }
        snapshot
    }

    /// Persist a ledger write on the blocking pool. Caller holds
    /// `ledger_io`.
    async fn write_ledger(&self, write: LedgerWrite) {
        let store = Arc::clone(self.inner.state.lock().await.ledger.store());
        let result = tokio::task::spawn_blocking(move || {
            let mut write = write;
            let result = write.apply(store.as_ref());
            (write, result)
        })
        .await;
        match result {
            Ok((_, Ok(()))) => {}
            Ok((write, Err(e))) => {
                warn!(error = %e, unlogged = write.records().len(), "ledger write failed, will retry");
                self.inner.state.lock().await.ledger.restore_write(write);
            }
            Err(e) => {
                warn!(error = %e, "ledger write task failed");
                self.inner.state.lock().await.ledger.mark_unsaved();
            }
        }
    }

    async fn apply_sampler_event(&self, event: SamplerEvent, now: DateTime<Utc>) {
        let health = {
            let mut state = self.inner.state.lock().await;
            match event {
                SamplerEvent::Degraded(kind) => {
                    warn!(sampler = %kind, "sampler degraded after repeated failures");
                    state.degraded.insert(kind);
                    state.activity.push(
                        now,
                        ActivityKind::SamplerDegraded,
                        format!("{kind} sampler degraded"),
                    );
                }
                SamplerEvent::Recovered(kind) => {
                    info!(sampler = %kind, "sampler recovered");
                    state.degraded.remove(&kind);
                    state.activity.push(
                        now,
                        ActivityKind::SamplerRecovered,
                        format!("{kind} sampler recovered"),
                    );
                }
            }
            MonitorHealth::from_degraded(state.degraded.iter().copied().collect())
        };
        self.inner.health_tx.send_replace(health.clone());
        let _ = self.inner.event_tx.send(MonitorEvent::Health(health));
    }

    // ── Consumers ────────────────────────────────────────────────────

    pub fn current_snapshot(&self) -> Arc<MetricSnapshot> {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> SnapshotStream {
        SnapshotStream::new(self.inner.snapshot_tx.subscribe())
    }

    pub fn events(&self) -> broadcast::Receiver<MonitorEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Sampling health. Independent of the threat level.
    pub fn health(&self) -> MonitorHealth {
        self.inner.health_tx.borrow().clone()
    }

    pub fn thresholds(&self) -> ThresholdSet {
        self.inner.thresholds.thresholds()
    }

    /// Newest first.
    pub async fn recent_activity(&self) -> Vec<ActivityEntry> {
        self.inner.state.lock().await.activity.entries()
    }

    pub async fn window_total(&self, window: Window, class: TrafficClass) -> TrafficTotals {
        self.inner.state.lock().await.ledger.window_total(window, class)
    }

    pub async fn ledger_totals(&self) -> (LedgerTotals, DateTime<Utc>) {
        let state = self.inner.state.lock().await;
        (*state.ledger.totals(), state.ledger.tracking_since())
    }

    /// At most [`MAX_DAILY_DAYS`](crate::ledger::MAX_DAILY_DAYS) days.
    pub async fn daily_breakdown(&self, days: u32, now: DateTime<Utc>) -> Vec<DailyUsage> {
        self.inner
            .state
            .lock()
            .await
            .ledger
            .daily_breakdown(days, now)
    }

    pub async fn reset_ledger(&self, now: DateTime<Utc>) -> Result<(), CoreError> {
        let _io = self.inner.ledger_io.lock().await;
        let mut state = self.inner.state.lock().await;
        state.ledger.reset_all(now)?;
        state
            .activity
            .push(now, ActivityKind::LedgerReset, "traffic ledger reset");
        Ok(())
    }

    pub async fn list_incidents(&self, filter: &IncidentFilter) -> Vec<Incident> {
        self.inner.state.lock().await.incidents.list(filter)
    }

    /// Acknowledge by full id or unambiguous prefix.
    pub async fn acknowledge_incident(&self, id: &str) -> Result<Incident, CoreError> {
        let mut state = self.inner.state.lock().await;
        let id = state.incidents.lookup(id)?;
        state.incidents.acknowledge(id)
    }

    /// Resolve by full id or unambiguous prefix. Idempotent.
    pub async fn resolve_incident(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Incident, CoreError> {
        let incident = {
            let mut state = self.inner.state.lock().await;
            let id = state.incidents.lookup(id)?;
            let already = state.incidents.get(id).is_some_and(|i| i.resolved);
            let incident = state.incidents.resolve(id, now)?;
            if already {
                return Ok(incident);
            }
            state.activity.push(
                now,
                ActivityKind::IncidentResolved,
                format!("{} resolved", incident.kind),
            );
            incident
        };
        let _ = self
            .inner
            .event_tx
            .send(MonitorEvent::IncidentResolved(incident.clone()));
        Ok(incident)
    }

    pub async fn start_sleep_session(&self, now: DateTime<Utc>) -> Result<Uuid, CoreError> {
        let mut state = self.inner.state.lock().await;
        let session = state.sleep.start(now)?;
        state
            .activity
            .push(now, ActivityKind::SessionStarted, "sleep session started");
        Ok(session.id)
    }

    pub async fn end_sleep_session(
        &self,
        now: DateTime<Utc>,
    ) -> Result<FinalizedSession, CoreError> {
        let mut state = self.inner.state.lock().await;
        let session = state.sleep.end(now)?;
        let message = format!(
            "sleep session ended: {} samples, {} incidents{}",
            session.samples,
            session.incident_count,
            if session.anomaly { ", anomalous" } else { "" }
        );
        state.activity.push(now, ActivityKind::SessionEnded, message);
        Ok(session)
    }

    pub async fn active_sleep_session(&self) -> Option<(Uuid, DateTime<Utc>)> {
        self.inner
            .state
            .lock()
            .await
            .sleep
            .active()
            .map(|s| (s.id, s.started_at))
    }

    pub async fn list_sleep_sessions(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<FinalizedSession>, CoreError> {
        Ok(self.inner.state.lock().await.sleep.list(limit)?)
    }

    async fn log_activity(&self, now: DateTime<Utc>, kind: ActivityKind, message: &str) {
        self.inner
            .state
            .lock()
            .await
            .activity
            .push(now, kind, message);
    }
}

// ── Background tasks ─────────────────────────────────────────────────

fn spawn_sampler<S: Sampler>(
    handle: &Arc<SamplerHandle<S>>,
    period: Duration,
    events: &mpsc::Sender<SamplerEvent>,
    cancel: &CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(sampler_task(
        Arc::clone(handle),
        period,
        events.clone(),
        cancel.clone(),
    ))
}

/// Single consumer applying sampler health transitions.
async fn sampler_event_task(
    coordinator: MonitoringCoordinator,
    mut events: mpsc::Receiver<SamplerEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                coordinator.apply_sampler_event(event, Utc::now()).await;
            }
        }
    }
}

async fn tick_task(coordinator: MonitoringCoordinator, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // let samplers publish before the first score

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let snapshot = coordinator.tick(Utc::now()).await;
                debug!(score = snapshot.threat_score, level = %snapshot.threat_level, "tick");
            }
        }
    }
}
