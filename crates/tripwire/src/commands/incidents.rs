//! Incident command handlers.

use chrono::Utc;
use tabled::Tabled;

use tripwire_core::{Incident, IncidentFilter, IncidentKind, MonitoringCoordinator};

use crate::cli::{GlobalOpts, IncidentsArgs, IncidentsCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct IncidentRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Opened")]
    opened: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

impl From<&Incident> for IncidentRow {
    fn from(i: &Incident) -> Self {
        Self {
            id: util::short_id(&i.id),
            kind: i.kind.to_string(),
            severity: i.severity.to_string(),
            status: i.status().to_string(),
            opened: util::local_time(i.opened_at),
            reason: i.reason.clone(),
        }
    }
}

fn detail(i: &Incident) -> String {
    let s = &i.snapshot;
    let mut lines = vec![
        format!("ID:        {}", i.id),
        format!("Kind:      {}", i.kind),
        format!("Severity:  {}", i.severity),
        format!("Status:    {}", i.status()),
        format!("Opened:    {}", util::local_time(i.opened_at)),
    ];
    if let Some(closed) = i.closed_at {
        lines.push(format!("Closed:    {}", util::local_time(closed)));
    }
    lines.push(format!("Reason:    {}", i.reason));
    lines.push(format!(
        "Snapshot:  score {} ({}), up {}, down {}, cpu {:.1}%, thermal {}",
        s.threat_score,
        s.threat_level,
        util::rate(s.upload_rate),
        util::rate(s.download_rate),
        s.cpu_percent,
        s.thermal
    ));
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    coordinator: &MonitoringCoordinator,
    args: IncidentsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        IncidentsCommand::List { open, kind, limit } => {
            let kind = kind
                .map(|k| {
                    k.trim().parse::<IncidentKind>().map_err(|_| CliError::Validation {
                        field: "kind".into(),
                        reason: format!("unknown incident kind '{k}'"),
                    })
                })
                .transpose()?;
            let filter = IncidentFilter {
                unresolved_only: open,
                kind,
                limit,
                ..IncidentFilter::default()
            };
            let incidents = coordinator.list_incidents(&filter).await;
            let rendered = output::render_list(&global.output, &incidents, |x| IncidentRow::from(x), |i| {
                i.id.to_string()
            })?;
            output::print_output(&rendered, global.quiet);
            Ok(())
        }

        IncidentsCommand::Ack { id } => {
            let incident = coordinator.acknowledge_incident(&id).await?;
            let rendered =
                output::render_single(&global.output, &incident, detail, |i| i.id.to_string())?;
            output::print_output(&rendered, global.quiet);
            Ok(())
        }

        IncidentsCommand::Resolve { id } => {
            let incident = coordinator.resolve_incident(&id, Utc::now()).await?;
            let rendered =
                output::render_single(&global.output, &incident, detail, |i| i.id.to_string())?;
            output::print_output(&rendered, global.quiet);
            Ok(())
        }
    }
}
