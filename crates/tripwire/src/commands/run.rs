//! Foreground monitoring.

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use tripwire_core::{FinalizedSession, MonitorEvent, MonitorHealth, MonitoringCoordinator};

use crate::cli::{GlobalOpts, OutputFormat, RunArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(
    coordinator: &MonitoringCoordinator,
    args: RunArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let mut events = coordinator.events();

    if args.sleep {
        coordinator.start_sleep_session(Utc::now()).await?;
    }
    coordinator.start().await;
    info!(duration = ?args.duration, sleep = args.sleep, "monitoring in foreground");
    if !global.quiet {
        eprintln!("monitoring; press Ctrl-C to stop");
    }

    let deadline = async {
        match args.duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                }
                break;
            }
            () = &mut deadline => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event, global, color),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event consumer lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    coordinator.stop().await;

    if args.sleep {
        let session = coordinator.end_sleep_session(Utc::now()).await?;
        let rendered = output::render_single(
            &global.output,
            &session,
            session_detail,
            |s| s.id.to_string(),
        )?;
        output::print_output(&rendered, global.quiet);
    }
    Ok(())
}

fn print_event(event: &MonitorEvent, global: &GlobalOpts, color: bool) {
    if global.quiet {
        return;
    }
    let line = match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => event_json(event),
        _ => event_text(event, color),
    };
    output::print_output(&line, false);
}

fn event_text(event: &MonitorEvent, color: bool) -> String {
    let now = util::local_time(Utc::now());
    match event {
        MonitorEvent::LevelChanged { from, to, score } => format!(
            "{now}  level {} -> {} (score {score})",
            output::paint_level(*from, color),
            output::paint_level(*to, color),
        ),
        MonitorEvent::IncidentOpened(i) => format!(
            "{now}  incident {} {} [{}]: {}",
            util::short_id(&i.id),
            i.kind,
            output::paint_severity(i.severity, color),
            i.reason,
        ),
        MonitorEvent::IncidentResolved(i) => {
            format!("{now}  resolved {} {}", util::short_id(&i.id), i.kind)
        }
        MonitorEvent::Health(MonitorHealth::Healthy) => format!("{now}  samplers healthy"),
        MonitorEvent::Health(MonitorHealth::Degraded { samplers }) => {
            let names: Vec<String> = samplers.iter().map(ToString::to_string).collect();
            format!("{now}  degraded: {}", names.join(", "))
        }
    }
}

/// One JSON object per line, for piping into other tools.
fn event_json(event: &MonitorEvent) -> String {
    let value = match event {
        MonitorEvent::LevelChanged { from, to, score } => serde_json::json!({
            "event": "levelChanged", "from": from, "to": to, "score": score,
        }),
        MonitorEvent::IncidentOpened(i) => serde_json::json!({
            "event": "incidentOpened", "incident": i,
        }),
        MonitorEvent::IncidentResolved(i) => serde_json::json!({
            "event": "incidentResolved", "incident": i,
        }),
        MonitorEvent::Health(health) => serde_json::json!({
            "event": "health", "health": health,
        }),
    };
    value.to_string()
}

pub(crate) fn session_detail(s: &FinalizedSession) -> String {
    [
        format!("Session:    {}", s.id),
        format!("Started:    {}", util::local_time(s.started_at)),
        format!("Ended:      {}", util::local_time(s.ended_at)),
        format!(
            "Duration:   {}",
            humantime::format_duration(std::time::Duration::from_secs(
                s.duration().to_std().unwrap_or_default().as_secs()
            ))
        ),
        format!("Samples:    {}", s.samples),
        format!(
            "Upload:     avg {}  peak {}  total {}",
            util::rate(s.avg_upload_rate),
            util::rate(s.peak_upload_rate),
            util::bytes(s.bytes_uploaded)
        ),
        format!(
            "Download:   avg {}  peak {}  total {}",
            util::rate(s.avg_download_rate),
            util::rate(s.peak_download_rate),
            util::bytes(s.bytes_downloaded)
        ),
        format!(
            "CPU:        avg {:.1}%  peak {:.1}%",
            s.avg_cpu_percent, s.peak_cpu_percent
        ),
        format!("Thermal:    peak {}", s.peak_thermal),
        format!("Score:      peak {}", s.peak_threat_score),
        format!("Incidents:  {}", s.incident_count),
        format!("Anomaly:    {}", if s.anomaly { "yes" } else { "no" }),
    ]
    .join("\n")
}
