// ── Core error types ──
//
// Errors surfaced by tripwire-core. Sampler and persistence failures are
// mostly recovered locally (logged, retried, or degraded); they reach a
// caller only through explicit operations like `reset_ledger` or restore.

use thiserror::Error;

use crate::model::SamplerKind;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Sampling ─────────────────────────────────────────────────────
    #[error(transparent)]
    Sampler(#[from] SamplerError),

    // ── Persistence ──────────────────────────────────────────────────
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Incidents / sessions ─────────────────────────────────────────
    #[error("Incident not found: {id}")]
    IncidentNotFound { id: String },

    #[error("A sleep session is already active (started {started_at})")]
    SessionAlreadyActive { started_at: String },

    #[error("No sleep session is active")]
    NoActiveSession,

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Monitoring is not running")]
    NotRunning,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single OS read failed. Recovered by the sampler loop, which keeps
/// the previous reading and escalates after repeated failures.
#[derive(Debug, Error)]
#[error("{kind} sampler read failed: {reason}")]
pub struct SamplerError {
    pub kind: SamplerKind,
    pub reason: String,
}

impl SamplerError {
    pub fn new(kind: SamplerKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// Failures of the durable key-value / append-log store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid storage key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("state directory {path} is in use by another tripwire process")]
    Locked { path: String },

    #[error("record for log '{log}' rejected: {reason}")]
    InvalidRecord { log: String, reason: String },
}
