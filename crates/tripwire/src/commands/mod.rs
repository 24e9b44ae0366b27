//! Command dispatch: bridges CLI args -> coordinator calls -> output formatting.

pub mod config_cmd;
pub mod incidents;
pub mod ledger;
pub mod run;
pub mod sessions;
pub mod snapshot;
pub mod thresholds;
pub mod util;

use tripwire_core::MonitoringCoordinator;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a coordinator-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    coordinator: &MonitoringCoordinator,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Run(args) => run::handle(coordinator, args, global).await,
        Command::Snapshot(args) => snapshot::handle(coordinator, args, global).await,
        Command::Ledger(args) => ledger::handle(coordinator, args, global).await,
        Command::Incidents(args) => incidents::handle(coordinator, args, global).await,
        Command::Sessions(args) => sessions::handle(coordinator, args, global).await,
        Command::Thresholds | Command::Config(_) | Command::Completions(_) => {
            Err(CliError::Internal("command handled before dispatch".into()))
        }
    }
}
