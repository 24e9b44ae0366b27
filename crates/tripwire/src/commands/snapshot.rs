//! One-shot sampling.

use chrono::Utc;

use tripwire_core::{MetricSnapshot, MonitorHealth, MonitoringCoordinator};

use crate::cli::{GlobalOpts, OutputFormat, SnapshotArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(
    coordinator: &MonitoringCoordinator,
    args: SnapshotArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    // Rates need two readings: the first only anchors the counters.
    coordinator.sample_once(Utc::now()).await;
    if !args.warmup.is_zero() {
        tokio::time::sleep(args.warmup).await;
    }
    coordinator.sample_once(Utc::now()).await;
    let snapshot = coordinator.tick(Utc::now()).await;

    if let MonitorHealth::Degraded { samplers } = coordinator.health() {
        tracing::warn!(?samplers, "snapshot taken with degraded samplers");
    }

    let color = output::should_color(&global.color);
    let rendered = match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            output::render_single(&global.output, &snapshot.export(), |_| String::new(), |_| {
                String::new()
            })?
        }
        OutputFormat::Table => detail(&snapshot, color),
        OutputFormat::Plain => snapshot.threat_score.to_string(),
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}

fn detail(s: &MetricSnapshot, color: bool) -> String {
    let mut lines = vec![
        format!("Time:       {}", util::local_time(s.timestamp)),
        format!(
            "Threat:     {} (score {})",
            output::paint_level(s.threat_level, color),
            s.threat_score
        ),
        format!(
            "Upload:     {}  (wifi {}, cellular {})",
            util::rate(s.upload_rate),
            util::rate(s.wifi_upload_rate),
            util::rate(s.cellular_upload_rate)
        ),
        format!(
            "Download:   {}  (wifi {}, cellular {})",
            util::rate(s.download_rate),
            util::rate(s.wifi_download_rate),
            util::rate(s.cellular_download_rate)
        ),
        format!("CPU:        {:.1}%", s.cpu_percent),
        format!(
            "Battery:    {:.0}%{}  drain {:.1}%/h",
            s.battery_level * 100.0,
            if s.battery_charging { " (charging)" } else { "" },
            s.battery_drain_per_hour
        ),
        format!("Thermal:    {}", s.thermal),
    ];
    if !s.degraded.is_empty() {
        let names: Vec<String> = s.degraded.iter().map(ToString::to_string).collect();
        lines.push(format!("Degraded:   {}", names.join(", ")));
    }
    lines.join("\n")
}
