//! Ledger command handlers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use tripwire_core::{DailyUsage, MonitoringCoordinator, TrafficClass, TrafficTotals, Window};

use crate::cli::{GlobalOpts, LedgerArgs, LedgerCommand};
use crate::error::CliError;
use crate::output;

use super::util;

const _: () = assert!(crate::cli::MAX_DAILY_DAYS == tripwire_core::MAX_DAILY_DAYS);

const WINDOWS: [Window; 5] = [
    Window::Hour,
    Window::Today,
    Window::Week,
    Window::Month,
    Window::AllTime,
];

// ── Output shapes ───────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LedgerOut {
    tracking_since: DateTime<Utc>,
    windows: Vec<WindowOut>,
}

#[derive(Serialize)]
struct WindowOut {
    window: Window,
    wifi: TrafficTotals,
    cellular: TrafficTotals,
    combined: TrafficTotals,
}

#[derive(Tabled)]
struct WindowRow {
    #[tabled(rename = "Window")]
    window: String,
    #[tabled(rename = "WiFi ↑")]
    wifi_up: String,
    #[tabled(rename = "WiFi ↓")]
    wifi_down: String,
    #[tabled(rename = "Cellular ↑")]
    cell_up: String,
    #[tabled(rename = "Cellular ↓")]
    cell_down: String,
    #[tabled(rename = "Total")]
    total: String,
}

impl From<&WindowOut> for WindowRow {
    fn from(w: &WindowOut) -> Self {
        Self {
            window: w.window.to_string(),
            wifi_up: util::bytes(w.wifi.upload),
            wifi_down: util::bytes(w.wifi.download),
            cell_up: util::bytes(w.cellular.upload),
            cell_down: util::bytes(w.cellular.download),
            total: util::bytes(w.combined.total()),
        }
    }
}

#[derive(Tabled)]
struct DailyRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Upload")]
    upload: String,
    #[tabled(rename = "Download")]
    download: String,
}

impl From<&DailyUsage> for DailyRow {
    fn from(d: &DailyUsage) -> Self {
        Self {
            date: d.date.to_string(),
            upload: util::bytes(d.upload),
            download: util::bytes(d.download),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    coordinator: &MonitoringCoordinator,
    args: LedgerArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        LedgerCommand::Show => {
            let mut windows = Vec::with_capacity(WINDOWS.len());
            for window in WINDOWS {
                windows.push(WindowOut {
                    window,
                    wifi: coordinator.window_total(window, TrafficClass::Wifi).await,
                    cellular: coordinator.window_total(window, TrafficClass::Cellular).await,
                    combined: coordinator.window_total(window, TrafficClass::Combined).await,
                });
            }
            let (_, tracking_since) = coordinator.ledger_totals().await;
            let out = LedgerOut {
                tracking_since,
                windows,
            };

            let rendered = output::render_single(
                &global.output,
                &out,
                |o| {
                    let rows: Vec<WindowRow> = o.windows.iter().map(WindowRow::from).collect();
                    format!(
                        "{}\nTracking since {}",
                        output::render_table(&rows),
                        util::local_time(o.tracking_since)
                    )
                },
                |o| {
                    o.windows
                        .iter()
                        .map(|w| format!("{} {}", w.window, w.combined.total()))
                        .collect::<Vec<_>>()
                        .join("\n")
                },
            )?;
            output::print_output(&rendered, global.quiet);
            Ok(())
        }

        LedgerCommand::Daily { days } => {
            let usage = coordinator.daily_breakdown(days, Utc::now()).await;
            let rendered = output::render_list(&global.output, &usage, |x| DailyRow::from(x), |d| {
                format!("{} {} {}", d.date, d.upload, d.download)
            })?;
            output::print_output(&rendered, global.quiet);
            Ok(())
        }

        LedgerCommand::Reset => {
            if !util::confirm(
                "Zero all traffic totals and delete the traffic log?",
                "ledger reset",
                global.yes,
            )? {
                return Ok(());
            }
            coordinator.reset_ledger(Utc::now()).await?;
            if !global.quiet {
                eprintln!("ledger reset");
            }
            Ok(())
        }
    }
}
