// ── Network sampler ──

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::Sampler;
use super::source::NetworkSource;
use crate::config::{InterfaceClass, InterfaceRules};
use crate::counter::RateCounter;
use crate::error::SamplerError;
use crate::model::{LinkClass, SamplerKind, TrafficTotals};

/// Cumulative per-class counters plus the rates derived from them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkReading {
    /// Monotonic WiFi counters (upload = sent). Seeded from the summed
    /// interface counters on the first reading, then advanced only by
    /// per-interface deltas, so an interface leaving the class never
    /// makes the total go backwards.
    pub wifi: TrafficTotals,
    /// Monotonic cellular counters, maintained like `wifi`.
    pub cellular: TrafficTotals,

    pub wifi_upload_rate: f64,
    pub wifi_download_rate: f64,
    pub cellular_upload_rate: f64,
    pub cellular_download_rate: f64,
    /// Every non-ignored interface, "other" included.
    pub upload_rate: f64,
    pub download_rate: f64,
}

#[derive(Debug, Default)]
struct DirectionCounters {
    upload: RateCounter,
    download: RateCounter,
}

/// One link class's share of a single poll.
#[derive(Debug, Clone, Copy, Default)]
struct ClassPoll {
    absolute: TrafficTotals,
    delta: TrafficTotals,
    upload_rate: f64,
    download_rate: f64,
}

impl ClassPoll {
    fn add(&mut self, counters: &mut DirectionCounters, absolute: TrafficTotals, now: DateTime<Utc>) {
        let up = counters.upload.update(absolute.upload, now);
        let down = counters.download.update(absolute.download, now);
        self.absolute += absolute;
        self.delta += TrafficTotals::new(up.delta, down.delta);
        self.upload_rate += up.rate;
        self.download_rate += down.rate;
    }
}

pub struct NetworkSampler {
    source: Box<dyn NetworkSource>,
    rules: InterfaceRules,
    /// Per-interface counters, keyed by interface name.
    interfaces: HashMap<String, DirectionCounters>,
    /// `None` until the first successful poll.
    totals: Option<(TrafficTotals, TrafficTotals)>,
}

impl NetworkSampler {
    pub fn new(source: Box<dyn NetworkSource>, rules: InterfaceRules) -> Self {
        Self {
            source,
            rules,
            interfaces: HashMap::new(),
            totals: None,
        }
    }
}

impl Sampler for NetworkSampler {
    type Reading = NetworkReading;

    fn kind(&self) -> SamplerKind {
        SamplerKind::Network
    }

    fn sample(&mut self, now: DateTime<Utc>) -> Result<NetworkReading, SamplerError> {
        let mut wifi = ClassPoll::default();
        let mut cellular = ClassPoll::default();
        let mut other = ClassPoll::default();
        let mut seen = HashSet::new();

        for iface in self.source.interfaces()? {
            let poll = match self.rules.classify(&iface.name) {
                InterfaceClass::Link(LinkClass::Wifi) => &mut wifi,
                InterfaceClass::Link(LinkClass::Cellular) => &mut cellular,
                InterfaceClass::Other => &mut other,
                InterfaceClass::Ignored => continue,
            };
            let counters = self.interfaces.entry(iface.name.clone()).or_default();
            poll.add(
                counters,
                TrafficTotals::new(iface.transmitted, iface.received),
                now,
            );
            seen.insert(iface.name);
        }

        let before = self.interfaces.len();
        self.interfaces.retain(|name, _| seen.contains(name));
        if self.interfaces.len() != before {
            debug!(
                dropped = before - self.interfaces.len(),
                "network interfaces disappeared, forgetting their counters"
            );
        }

        let (wifi_total, cellular_total) = match self.totals {
            Some((w, c)) => (w + wifi.delta, c + cellular.delta),
            None => (wifi.absolute, cellular.absolute),
        };
        self.totals = Some((wifi_total, cellular_total));

        Ok(NetworkReading {
            wifi: wifi_total,
            cellular: cellular_total,
            wifi_upload_rate: wifi.upload_rate,
            wifi_download_rate: wifi.download_rate,
            cellular_upload_rate: cellular.upload_rate,
            cellular_download_rate: cellular.download_rate,
            upload_rate: wifi.upload_rate + cellular.upload_rate + other.upload_rate,
            download_rate: wifi.download_rate + cellular.download_rate + other.download_rate,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::sampler::scripted::ScriptedNetwork;

    fn t(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap() + TimeDelta::seconds(n)
    }

    #[test]
    fn upload_rates_from_cumulative_bytes() {
        let source = ScriptedNetwork::new(vec![
            vec![("en0", 0, 0)],
            vec![("en0", 0, 1_000_000)],
            vec![("en0", 0, 2_500_000)],
        ]);
        let mut sampler = NetworkSampler::new(Box::new(source), InterfaceRules::default());

        let rates: Vec<f64> = (0..3)
            .map(|n| sampler.sample(t(n)).unwrap().upload_rate)
            .collect();
        assert_eq!(rates, vec![0.0, 1_000_000.0, 1_500_000.0]);
    }

    #[test]
    fn splits_by_link_class() {
        let source = ScriptedNetwork::new(vec![
            vec![("wlan0", 100, 100), ("rmnet0", 100, 100), ("eth0", 0, 0), ("lo", 0, 0)],
            vec![("wlan0", 300, 500), ("rmnet0", 100, 1_100), ("eth0", 40, 60), ("lo", 9_999, 9_999)],
        ]);
        let mut sampler = NetworkSampler::new(Box::new(source), InterfaceRules::default());
        sampler.sample(t(0)).unwrap();
        let r = sampler.sample(t(2)).unwrap();

        assert_eq!(r.wifi, TrafficTotals::new(500, 300));
        assert_eq!(r.cellular, TrafficTotals::new(1_100, 100));
        assert_eq!(r.wifi_upload_rate, 200.0);
        assert_eq!(r.wifi_download_rate, 100.0);
        assert_eq!(r.cellular_upload_rate, 500.0);
        assert_eq!(r.cellular_download_rate, 0.0);
        // Combined includes "other" (eth0) but never loopback.
        assert_eq!(r.upload_rate, 200.0 + 500.0 + 30.0);
        assert_eq!(r.download_rate, 100.0 + 20.0);
    }

    #[test]
    fn vanished_interface_is_not_a_counter_reset() {
        let source = ScriptedNetwork::new(vec![
            vec![("wlan0", 0, 1_000_000), ("wlan1", 0, 5_000_000)],
            vec![("wlan0", 0, 1_000_100), ("wlan1", 0, 5_000_000)],
            vec![("wlan0", 0, 1_000_200)],
            vec![("wlan0", 0, 1_000_300), ("wlan1", 0, 5_000_000)],
        ]);
        let mut sampler = NetworkSampler::new(Box::new(source), InterfaceRules::default());

        let readings: Vec<NetworkReading> =
            (0..4).map(|n| sampler.sample(t(n)).unwrap()).collect();
        let rates: Vec<f64> = readings.iter().map(|r| r.wifi_upload_rate).collect();
        // wlan1 coming back is a fresh baseline, not 5 MB of new traffic.
        assert_eq!(rates, vec![0.0, 100.0, 100.0, 100.0]);

        let uploads: Vec<u64> = readings.iter().map(|r| r.wifi.upload).collect();
        assert_eq!(uploads, vec![6_000_000, 6_000_100, 6_000_200, 6_000_300]);
    }

    #[test]
    fn single_interface_reset_counts_new_reading() {
        let source = ScriptedNetwork::new(vec![
            vec![("wlan0", 0, 4_000_000), ("wlan1", 0, 1_000)],
            vec![("wlan0", 0, 2_000), ("wlan1", 0, 1_000)],
        ]);
        let mut sampler = NetworkSampler::new(Box::new(source), InterfaceRules::default());
        sampler.sample(t(0)).unwrap();
        let r = sampler.sample(t(1)).unwrap();

        assert_eq!(r.wifi_upload_rate, 2_000.0);
        assert_eq!(r.wifi.upload, 4_001_000 + 2_000);
    }

    #[test]
    fn source_failure_propagates() {
        let source = ScriptedNetwork::failing();
        let mut sampler = NetworkSampler::new(Box::new(source), InterfaceRules::default());
        assert_eq!(sampler.sample(t(0)).unwrap_err().kind, SamplerKind::Network);
    }
}
