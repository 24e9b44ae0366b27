//! Effective threshold table.

use serde::Serialize;
use tabled::Tabled;

use tripwire_config::Config;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ThresholdRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: f64,
    #[tabled(rename = "Unit")]
    unit: &'static str,
    #[tabled(rename = "Enabled")]
    enabled: &'static str,
}

/// Keyed the way the config file spells metrics.
#[derive(Serialize)]
struct ThresholdOut {
    metric: String,
    value: f64,
    unit: &'static str,
    enabled: bool,
}

impl From<&ThresholdOut> for ThresholdRow {
    fn from(t: &ThresholdOut) -> Self {
        Self {
            metric: t.metric.clone(),
            value: t.value,
            unit: t.unit,
            enabled: if t.enabled { "yes" } else { "no" },
        }
    }
}

pub fn handle(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let thresholds: Vec<ThresholdOut> = cfg
        .threshold_set()
        .iter()
        .map(|t| ThresholdOut {
            metric: t.metric.key(),
            value: t.value,
            unit: t.metric.unit(),
            enabled: t.enabled,
        })
        .collect();

    let rendered = output::render_list(&global.output, &thresholds, |x| ThresholdRow::from(x), |t| {
        format!("{}={}", t.metric, t.value)
    })?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
