//! Sleep session history.

use tabled::Tabled;

use tripwire_core::{FinalizedSession, MonitoringCoordinator};

use crate::cli::{GlobalOpts, SessionsArgs, SessionsCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct SessionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Started")]
    started: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Uploaded")]
    uploaded: String,
    #[tabled(rename = "Peak score")]
    peak_score: u8,
    #[tabled(rename = "Incidents")]
    incidents: u32,
    #[tabled(rename = "Anomaly")]
    anomaly: &'static str,
}

impl From<&FinalizedSession> for SessionRow {
    fn from(s: &FinalizedSession) -> Self {
        let secs = s.duration().to_std().unwrap_or_default().as_secs();
        Self {
            id: util::short_id(&s.id),
            started: util::local_time(s.started_at),
            duration: humantime::format_duration(std::time::Duration::from_secs(secs)).to_string(),
            uploaded: util::bytes(s.bytes_uploaded),
            peak_score: s.peak_threat_score,
            incidents: s.incident_count,
            anomaly: if s.anomaly { "yes" } else { "no" },
        }
    }
}

pub async fn handle(
    coordinator: &MonitoringCoordinator,
    args: SessionsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        SessionsCommand::List { limit } => {
            let sessions = coordinator.list_sleep_sessions(limit).await?;
            let rendered = output::render_list(&global.output, &sessions, |x| SessionRow::from(x), |s| {
                s.id.to_string()
            })?;
            output::print_output(&rendered, global.quiet);
            Ok(())
        }
    }
}
