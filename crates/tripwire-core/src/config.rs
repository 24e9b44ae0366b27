// ── Runtime configuration ──
//
// The core never reads config files. Callers build a `MonitorConfig`
// (tripwire-config translates the TOML form) and hand it over.

use std::time::Duration;

use crate::ledger::Calendar;
use crate::model::LinkClass;

/// Sampling cadence and engine policy for a [`MonitoringCoordinator`].
///
/// [`MonitoringCoordinator`]: crate::MonitoringCoordinator
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub network_interval: Duration,
    pub cpu_interval: Duration,
    pub battery_interval: Duration,
    pub thermal_interval: Duration,
    /// Cadence of the scoring tick.
    pub tick_interval: Duration,
    /// Capacity of the recent-activity ring buffer.
    pub activity_log_size: usize,
    /// Consecutive read failures before a sampler is reported degraded.
    pub degraded_after_failures: u32,
    /// Resolve incidents automatically once their rule stops firing.
    pub auto_resolve: bool,
    /// Span of the rolling battery-drain window.
    pub battery_window: Duration,
    /// Maximum incidents kept in memory.
    pub incident_history: usize,
    pub interfaces: InterfaceRules,
    pub calendar: Calendar,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            network_interval: Duration::from_secs(1),
            cpu_interval: Duration::from_secs(2),
            battery_interval: Duration::from_secs(15),
            thermal_interval: Duration::from_secs(5),
            tick_interval: Duration::from_secs(2),
            activity_log_size: 50,
            degraded_after_failures: 3,
            auto_resolve: false,
            battery_window: Duration::from_secs(300),
            incident_history: 500,
            interfaces: InterfaceRules::default(),
            calendar: Calendar::default(),
        }
    }
}

/// Prefix patterns mapping interface names to link classes.
///
/// `ignore` wins over everything; names matching neither `wifi` nor
/// `cellular` are classed as "other" and contribute only to combined
/// rates, never to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRules {
    pub wifi: Vec<String>,
    pub cellular: Vec<String>,
    pub ignore: Vec<String>,
}

impl Default for InterfaceRules {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|s| (*s).to_owned()).collect();
        Self {
            wifi: owned(&["wl", "en0", "wi-fi", "wifi"]),
            cellular: owned(&["wwan", "rmnet", "pdp_ip", "ccmni", "ppp"]),
            ignore: owned(&["lo", "docker", "veth", "br-", "utun", "awdl", "llw"]),
        }
    }
}

/// Outcome of classifying one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceClass {
    Link(LinkClass),
    Other,
    Ignored,
}

impl InterfaceRules {
    pub fn classify(&self, name: &str) -> InterfaceClass {
        let name = name.to_ascii_lowercase();
        let hit = |prefixes: &[String]| {
            prefixes
                .iter()
                .any(|p| name.starts_with(&p.to_ascii_lowercase()))
        };

        if hit(&self.ignore) {
            InterfaceClass::Ignored
        } else if hit(&self.wifi) {
            InterfaceClass::Link(LinkClass::Wifi)
        } else if hit(&self.cellular) {
            InterfaceClass::Link(LinkClass::Cellular)
        } else {
            InterfaceClass::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_classify_common_names() {
        let rules = InterfaceRules::default();
        assert_eq!(rules.classify("wlan0"), InterfaceClass::Link(LinkClass::Wifi));
        assert_eq!(rules.classify("en0"), InterfaceClass::Link(LinkClass::Wifi));
        assert_eq!(
            rules.classify("pdp_ip0"),
            InterfaceClass::Link(LinkClass::Cellular)
        );
        assert_eq!(rules.classify("lo"), InterfaceClass::Ignored);
        assert_eq!(rules.classify("eth0"), InterfaceClass::Other);
    }

    #[test]
    fn ignore_takes_precedence() {
        let rules = InterfaceRules {
            wifi: vec!["w".into()],
            cellular: Vec::new(),
            ignore: vec!["wg".into()],
        };
        assert_eq!(rules.classify("wg0"), InterfaceClass::Ignored);
        assert_eq!(rules.classify("WLAN0"), InterfaceClass::Link(LinkClass::Wifi));
    }
}
