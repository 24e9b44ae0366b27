//! Configuration for the tripwire monitor.
//!
//! TOML file loading with environment overrides, platform path
//! resolution, translation to [`tripwire_core::MonitorConfig`], and a
//! file-backed [`ThresholdSource`] that picks up edits without a restart.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use chrono::{FixedOffset, Weekday};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use tripwire_core::{
    Calendar, InterfaceRules, MonitorConfig, ThresholdEntry, ThresholdSet, ThresholdSource, Zone,
};

/// Environment prefix; nested keys use `__`, e.g.
/// `TRIPWIRE_MONITOR__TICK_INTERVAL_MS=500`.
pub const ENV_PREFIX: &str = "TRIPWIRE_";

const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub calendar: CalendarSection,

    #[serde(default)]
    pub interfaces: InterfacesSection,

    /// String-keyed thresholds. Missing metrics take their defaults.
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<ThresholdEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitor: MonitorSection::default(),
            storage: StorageSection::default(),
            calendar: CalendarSection::default(),
            interfaces: InterfacesSection::default(),
            thresholds: default_thresholds(),
        }
    }
}

fn default_thresholds() -> Vec<ThresholdEntry> {
    ThresholdSet::default().to_entries()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorSection {
    pub network_interval_ms: u64,
    pub cpu_interval_ms: u64,
    pub battery_interval_ms: u64,
    pub thermal_interval_ms: u64,
    pub tick_interval_ms: u64,
    pub activity_log_size: usize,
    pub degraded_after_failures: u32,
    pub auto_resolve: bool,
    pub battery_window_secs: u64,
    pub incident_history: usize,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            network_interval_ms: 1000,
            cpu_interval_ms: 2000,
            battery_interval_ms: 15_000,
            thermal_interval_ms: 5000,
            tick_interval_ms: 2000,
            activity_log_size: 50,
            degraded_after_failures: 3,
            auto_resolve: false,
            battery_window_secs: 300,
            incident_history: 500,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StorageSection {
    /// Where ledger, incident and session state live. Defaults to the
    /// platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CalendarSection {
    #[serde(default = "default_week_start")]
    pub week_start: String,

    /// Fixed offset from UTC. Absent means the system local time zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,
}

impl Default for CalendarSection {
    fn default() -> Self {
        Self {
            week_start: default_week_start(),
            utc_offset_minutes: None,
        }
    }
}

fn default_week_start() -> String {
    "monday".into()
}

/// Interface name prefixes. Anything unmatched counts as "other".
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InterfacesSection {
    pub wifi: Vec<String>,
    pub cellular: Vec<String>,
    pub ignore: Vec<String>,
}

impl Default for InterfacesSection {
    fn default() -> Self {
        let rules = InterfaceRules::default();
        Self {
            wifi: rules.wifi,
            cellular: rules.cellular,
            ignore: rules.ignore,
        }
    }
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Validate and convert into the core's runtime configuration.
    pub fn to_monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        let m = &self.monitor;
        if m.degraded_after_failures == 0 {
            return Err(ConfigError::invalid(
                "monitor.degraded_after_failures",
                "must be at least 1",
            ));
        }
        Ok(MonitorConfig {
            network_interval: interval("monitor.network_interval_ms", m.network_interval_ms)?,
            cpu_interval: interval("monitor.cpu_interval_ms", m.cpu_interval_ms)?,
            battery_interval: interval("monitor.battery_interval_ms", m.battery_interval_ms)?,
            thermal_interval: interval("monitor.thermal_interval_ms", m.thermal_interval_ms)?,
            tick_interval: interval("monitor.tick_interval_ms", m.tick_interval_ms)?,
            activity_log_size: positive("monitor.activity_log_size", m.activity_log_size)?,
            degraded_after_failures: m.degraded_after_failures,
            auto_resolve: m.auto_resolve,
            battery_window: Duration::from_secs(m.battery_window_secs.max(1)),
            incident_history: positive("monitor.incident_history", m.incident_history)?,
            interfaces: InterfaceRules {
                wifi: self.interfaces.wifi.clone(),
                cellular: self.interfaces.cellular.clone(),
                ignore: self.interfaces.ignore.clone(),
            },
            calendar: self.calendar.to_calendar()?,
        })
    }

    /// Normalized thresholds; corrections are logged at warn level.
    pub fn threshold_set(&self) -> ThresholdSet {
        ThresholdSet::from_entries(&self.thresholds)
    }

    /// Configured state directory, or the platform default.
    pub fn state_dir(&self) -> PathBuf {
        self.storage
            .state_dir
            .clone()
            .unwrap_or_else(default_state_dir)
    }
}

impl CalendarSection {
    pub fn to_calendar(&self) -> Result<Calendar, ConfigError> {
        let week_start: Weekday = self.week_start.trim().parse().map_err(|_| {
            ConfigError::invalid(
                "calendar.week_start",
                format!("expected a weekday name, got '{}'", self.week_start),
            )
        })?;

        let zone = match self.utc_offset_minutes {
            None => Zone::Local,
            Some(minutes) => {
                if minutes.abs() > MAX_UTC_OFFSET_MINUTES {
                    return Err(ConfigError::invalid(
                        "calendar.utc_offset_minutes",
                        format!("{minutes} is outside ±{MAX_UTC_OFFSET_MINUTES}"),
                    ));
                }
                let offset = FixedOffset::east_opt(minutes * 60).ok_or_else(|| {
                    ConfigError::invalid("calendar.utc_offset_minutes", "out of range")
                })?;
                Zone::Fixed(offset)
            }
        };

        Ok(Calendar { zone, week_start })
    }
}

fn interval(field: &str, ms: u64) -> Result<Duration, ConfigError> {
    if ms == 0 {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    Ok(Duration::from_millis(ms))
}

fn positive(field: &str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    Ok(value)
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "tripwire", "tripwire")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Platform data directory for persisted monitor state.
pub fn default_state_dir() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".local/share"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn dirs_fallback(base: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(base);
    p.push("tripwire");
    p
}

// ── Loading / saving ────────────────────────────────────────────────

/// Load from the canonical path plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Layer defaults, the TOML file at `path` (if present) and
/// `TRIPWIRE_*` environment overrides.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

pub fn to_toml(cfg: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(cfg)?)
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = to_toml(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

/// Commented starter file. Every value shown is the built-in default.
pub fn default_template() -> String {
    let m = MonitorSection::default();
    let i = InterfacesSection::default();
    let list = |items: &[String]| {
        items
            .iter()
            .map(|s| format!("\"{s}\""))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut out = format!(
        r#"# tripwire configuration
#
# Environment variables override any value here, using `__` between
# section and key, e.g. TRIPWIRE_MONITOR__AUTO_RESOLVE=true.

[monitor]
# Sampling cadence per sampler, in milliseconds.
network_interval_ms = {network}
cpu_interval_ms = {cpu}
battery_interval_ms = {battery}
thermal_interval_ms = {thermal}
# Threat scoring cadence.
tick_interval_ms = {tick}
# Entries kept in the recent-activity log.
activity_log_size = {activity}
# Consecutive read failures before a sampler is reported degraded.
degraded_after_failures = {degraded}
# Resolve incidents once their condition clears. Off by default.
auto_resolve = {auto_resolve}
# Rolling window for battery drain estimates, in seconds.
battery_window_secs = {battery_window}
incident_history = {history}

[storage]
# state_dir = "/var/lib/tripwire"

[calendar]
week_start = "monday"
# Fixed UTC offset for day/week/month boundaries. Unset uses local time.
# utc_offset_minutes = 0

[interfaces]
# Name prefixes, matched case-insensitively. `ignore` wins.
wifi = [{wifi}]
cellular = [{cellular}]
ignore = [{ignore}]
"#,
        network = m.network_interval_ms,
        cpu = m.cpu_interval_ms,
        battery = m.battery_interval_ms,
        thermal = m.thermal_interval_ms,
        tick = m.tick_interval_ms,
        activity = m.activity_log_size,
        degraded = m.degraded_after_failures,
        auto_resolve = m.auto_resolve,
        battery_window = m.battery_window_secs,
        history = m.incident_history,
        wifi = list(&i.wifi),
        cellular = list(&i.cellular),
        ignore = list(&i.ignore),
    );

    out.push_str(
        "\n# Threat thresholds. `enabled = false` removes a factor from scoring.\n",
    );
    for t in ThresholdSet::default().iter() {
        out.push_str(&format!(
            "\n# {unit}\n[[thresholds]]\nmetric = \"{key}\"\nvalue = {value:?}\nenabled = {enabled}\n",
            unit = t.metric.unit(),
            key = t.metric.key(),
            value = t.value,
            enabled = t.enabled,
        ));
    }
    out
}

/// Write the commented default file. Refuses to overwrite unless `force`.
pub fn init_config(path: &Path, force: bool) -> Result<(), ConfigError> {
    if path.exists() && !force {
        return Err(ConfigError::invalid(
            "config",
            format!("{} already exists", path.display()),
        ));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, default_template())?;
    info!(path = %path.display(), "wrote default configuration");
    Ok(())
}

// ── Hot-reloaded thresholds ─────────────────────────────────────────

/// Thresholds read from the config file, re-read whenever its
/// modification time or size changes.
///
/// A file that disappears or fails to parse keeps the last good set.
pub struct FileThresholdSource {
    path: PathBuf,
    cache: Mutex<CachedThresholds>,
}

struct CachedThresholds {
    stamp: Option<(SystemTime, u64)>,
    set: ThresholdSet,
}

#[derive(Deserialize)]
struct ThresholdsOnly {
    #[serde(default = "default_thresholds")]
    thresholds: Vec<ThresholdEntry>,
}

impl FileThresholdSource {
    /// `initial` is served until the file is first read successfully.
    pub fn new(path: impl Into<PathBuf>, initial: ThresholdSet) -> Self {
        let source = Self {
            path: path.into(),
            cache: Mutex::new(CachedThresholds {
                stamp: None,
                set: initial,
            }),
        };
        // Prime the cache.
        let _ = source.thresholds();
        source
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn stamp(&self) -> Option<(SystemTime, u64)> {
        let meta = std::fs::metadata(&self.path).ok()?;
        Some((meta.modified().ok()?, meta.len()))
    }

    fn read(&self) -> Result<ThresholdSet, ConfigError> {
        let text = std::fs::read_to_string(&self.path)?;
        let parsed: ThresholdsOnly = toml::from_str(&text)
            .map_err(|e| ConfigError::invalid("thresholds", e.to_string()))?;
        Ok(ThresholdSet::from_entries(&parsed.thresholds))
    }
}

impl ThresholdSource for FileThresholdSource {
    fn thresholds(&self) -> ThresholdSet {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(stamp) = self.stamp() else {
            return cache.set.clone();
        };
        if cache.stamp == Some(stamp) {
            return cache.set.clone();
        }

        // A broken file is reported once per edit.
        cache.stamp = Some(stamp);
        match self.read() {
            Ok(set) => {
                if cache.set != set {
                    info!(path = %self.path.display(), "thresholds reloaded");
                }
                cache.set = set;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "threshold reload failed, keeping previous set");
            }
        }
        cache.set.clone()
    }
}

impl std::fmt::Debug for FileThresholdSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileThresholdSource")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::fs::File;

    use pretty_assertions::assert_eq;
    use tripwire_core::ThresholdMetric;

    use super::*;

    #[test]
    fn defaults_translate_to_core_defaults() {
        let monitor = Config::default().to_monitor_config().unwrap();
        let expected = MonitorConfig::default();
        assert_eq!(monitor.network_interval, expected.network_interval);
        assert_eq!(monitor.tick_interval, expected.tick_interval);
        assert_eq!(monitor.battery_window, expected.battery_window);
        assert_eq!(monitor.degraded_after_failures, 3);
        assert!(!monitor.auto_resolve);
        assert_eq!(monitor.interfaces, InterfaceRules::default());
        assert_eq!(monitor.calendar, Calendar::default());
    }

    #[test]
    fn template_parses_back_to_defaults() {
        let parsed: Config = toml::from_str(&default_template()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn file_and_env_layer_over_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [monitor]
                tick_interval_ms = 500

                [calendar]
                week_start = "sunday"
                utc_offset_minutes = -300

                [[thresholds]]
                metric = "cpu"
                value = 80.0
                "#,
            )?;
            jail.set_env("TRIPWIRE_MONITOR__AUTO_RESOLVE", "true");

            let cfg = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg.monitor.tick_interval_ms, 500);
            assert_eq!(cfg.monitor.cpu_interval_ms, 2000);
            assert!(cfg.monitor.auto_resolve);

            let monitor = cfg.to_monitor_config().map_err(|e| e.to_string())?;
            assert_eq!(monitor.calendar.week_start, Weekday::Sun);
            assert_eq!(
                monitor.calendar.zone,
                Zone::Fixed(FixedOffset::west_opt(300 * 60).unwrap())
            );

            let set = cfg.threshold_set();
            assert_eq!(set.get(ThresholdMetric::Cpu).value, 80.0);
            // Metrics absent from the file keep their defaults.
            assert_eq!(
                set.get(ThresholdMetric::BatteryDrain),
                ThresholdSet::default().get(ThresholdMetric::BatteryDrain)
            );
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.monitor, MonitorSection::default());
    }

    #[test]
    fn rejects_invalid_values() {
        let mut cfg = Config::default();
        cfg.monitor.tick_interval_ms = 0;
        assert!(matches!(
            cfg.to_monitor_config(),
            Err(ConfigError::Validation { ref field, .. }) if field == "monitor.tick_interval_ms"
        ));

        let mut cfg = Config::default();
        cfg.calendar.week_start = "someday".into();
        assert!(cfg.to_monitor_config().is_err());

        let mut cfg = Config::default();
        cfg.calendar.utc_offset_minutes = Some(24 * 60);
        assert!(cfg.to_monitor_config().is_err());
    }

    #[test]
    fn save_round_trips_through_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.monitor.auto_resolve = true;
        cfg.storage.state_dir = Some(dir.path().join("state"));
        save_config_to(&cfg, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let loaded: Config = toml::from_str(&text).unwrap();
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.state_dir(), dir.path().join("state"));
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        init_config(&path, false).unwrap();
        assert!(init_config(&path, false).is_err());
        init_config(&path, true).unwrap();
    }

    fn write_thresholds(path: &Path, cpu: f64, bump: u64) {
        std::fs::write(
            path,
            format!("[[thresholds]]\nmetric = \"cpu\"\nvalue = {cpu:?}\n"),
        )
        .unwrap();
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 + bump))
            .unwrap();
    }

    #[test]
    fn threshold_source_reloads_on_change_and_keeps_last_good() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write_thresholds(&path, 70.0, 0);

        let source = FileThresholdSource::new(&path, ThresholdSet::default());
        assert_eq!(source.thresholds().get(ThresholdMetric::Cpu).value, 70.0);

        write_thresholds(&path, 90.0, 1);
        assert_eq!(source.thresholds().get(ThresholdMetric::Cpu).value, 90.0);

        std::fs::write(&path, "[[thresholds]\nbroken").unwrap();
        assert_eq!(source.thresholds().get(ThresholdMetric::Cpu).value, 90.0);

        std::fs::remove_file(&path).unwrap();
        assert_eq!(source.thresholds().get(ThresholdMetric::Cpu).value, 90.0);
    }

    #[test]
    fn threshold_source_without_file_serves_initial() {
        let dir = tempfile::tempdir().unwrap();
        let initial = ThresholdSet::all_disabled();
        let source = FileThresholdSource::new(dir.path().join("none.toml"), initial.clone());
        assert_eq!(source.thresholds(), initial);
    }
}
