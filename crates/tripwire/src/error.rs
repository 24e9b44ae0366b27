//! CLI error types with miette diagnostics.
//!
//! Maps core and config errors into user-facing errors with help text
//! and a stable exit code per failure class.

use miette::Diagnostic;
use thiserror::Error;

use tripwire_config::ConfigError;
use tripwire_core::{CoreError, PersistenceError};

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const PERSISTENCE: i32 = 4;
    pub const NOT_FOUND: i32 = 5;
    pub const MONITORING: i32 = 6;
    pub const CONFLICT: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error")]
    #[diagnostic(
        code(tripwire::config),
        help(
            "Check the config file ({path}) and any TRIPWIRE_* environment variables.\n\
             Write a fresh one with: tripwire config init --force"
        )
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    // ── State ────────────────────────────────────────────────────────
    #[error("State storage failed")]
    #[diagnostic(
        code(tripwire::persistence),
        help("Check that the state directory is writable, or point --state-dir elsewhere.")
    )]
    Persistence(#[source] PersistenceError),

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(tripwire::not_found),
        help("Run: tripwire {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{message}")]
    #[diagnostic(code(tripwire::conflict))]
    Conflict { message: String },

    #[error("State directory {path} is in use")]
    #[diagnostic(
        code(tripwire::state_locked),
        help(
            "Another tripwire process (usually `tripwire run`) owns it.\n\
             Stop that process first, or point --state-dir elsewhere."
        )
    )]
    StateLocked { path: String },

    // ── Monitoring ───────────────────────────────────────────────────
    #[error("Monitoring failed: {message}")]
    #[diagnostic(
        code(tripwire::monitoring),
        help("Run with -vv for sampler details.")
    )]
    Monitoring { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(tripwire::validation))]
    Validation { field: String, reason: String },

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(tripwire::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(tripwire::render))]
    Render(String),

    #[error("Internal error: {0}")]
    #[diagnostic(code(tripwire::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => exit_code::CONFIG,
            Self::Persistence(_) => exit_code::PERSISTENCE,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Monitoring { .. } => exit_code::MONITORING,
            Self::Conflict { .. } | Self::StateLocked { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            Self::Io(_) | Self::Render(_) | Self::Internal(_) => exit_code::GENERAL,
        }
    }

    pub fn config(path: &std::path::Path, source: ConfigError) -> Self {
        Self::Config {
            path: path.display().to_string(),
            source,
        }
    }
}

impl From<PersistenceError> for CliError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Locked { path } => Self::StateLocked { path },
            other => Self::Persistence(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Persistence(e) => CliError::from(e),

            CoreError::Sampler(e) => CliError::Monitoring {
                message: e.to_string(),
            },

            CoreError::NotRunning => CliError::Monitoring {
                message: "monitoring is not running".into(),
            },

            CoreError::IncidentNotFound { id } => CliError::NotFound {
                resource_type: "incident".into(),
                identifier: id,
                list_command: "incidents list".into(),
            },

            e @ (CoreError::SessionAlreadyActive { .. } | CoreError::NoActiveSession) => {
                CliError::Conflict {
                    message: e.to_string(),
                }
            }

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}
