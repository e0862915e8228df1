//! Shared configuration for the fleetpulse CLI.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `fleetpulse_core::MonitorConfig`. The CLI adds
//! `GlobalOpts`-aware wrappers on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fleetpulse_core::{
    DEFAULT_BACKEND_URL, MonitorConfig, RebootThresholds, Schedule, ThresholdPolicy,
    TlsVerification,
};

/// Keyring service name for stored secrets.
const KEYRING_SERVICE: &str = "fleetpulse";

/// Overrides the config file location when set.
pub const CONFIG_PATH_ENV: &str = "FLEETPULSE_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("keyring error: {0}")]
    Keyring(String),

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

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named backend profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Backend base URL (e.g., "http://localhost:5050").
    #[serde(default = "default_backend")]
    pub backend: String,

    /// API key (plaintext, prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Probe cadence and reboot thresholds.
    #[serde(default)]
    pub monitor: MonitorSettings,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            api_key: None,
            api_key_env: None,
            ca_cert: None,
            insecure: None,
            timeout: None,
            monitor: MonitorSettings::default(),
        }
    }
}

fn default_backend() -> String {
    DEFAULT_BACKEND_URL.into()
}

/// `[profiles.<name>.monitor]` table. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub probe_interval_secs: u64,
    pub reconcile_interval_secs: u64,
    pub resolve_interval_secs: u64,
    pub probe_timeout_ms: u64,
    pub probe_ports: Vec<u16>,
    pub probe_connect_timeout_ms: u64,
    pub follow_up_secs: Vec<u64>,
    pub control_release_secs: u64,
    pub thresholds: RebootThresholds,
    /// Per device family overrides, keyed by `tech`.
    pub tech_thresholds: HashMap<String, RebootThresholds>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let schedule = Schedule::default();
        let base = MonitorConfig::default();
        Self {
            probe_interval_secs: schedule.probe_interval.as_secs(),
            reconcile_interval_secs: schedule.reconcile_interval.as_secs(),
            resolve_interval_secs: schedule.resolve_interval.as_secs(),
            probe_timeout_ms: duration_ms(schedule.probe_timeout),
            probe_ports: base.probe_ports,
            probe_connect_timeout_ms: duration_ms(base.probe_connect_timeout),
            follow_up_secs: schedule.follow_ups.iter().map(Duration::as_secs).collect(),
            control_release_secs: schedule.control_release.as_secs(),
            thresholds: RebootThresholds::default(),
            tech_thresholds: HashMap::new(),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl MonitorSettings {
    pub fn schedule(&self) -> Schedule {
        Schedule {
            probe_interval: Duration::from_secs(self.probe_interval_secs),
            reconcile_interval: Duration::from_secs(self.reconcile_interval_secs),
            resolve_interval: Duration::from_secs(self.resolve_interval_secs),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            follow_ups: self
                .follow_up_secs
                .iter()
                .copied()
                .map(Duration::from_secs)
                .collect(),
            control_release: Duration::from_secs(self.control_release_secs),
        }
    }

    pub fn threshold_policy(&self) -> ThresholdPolicy {
        self.tech_thresholds
            .iter()
            .fold(ThresholdPolicy::new(self.thresholds), |policy, (tech, th)| {
                policy.with_override(tech, *th)
            })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via `FLEETPULSE_CONFIG` or XDG / platform
/// conventions.
pub fn config_path() -> PathBuf {
    if let Some(p) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(p);
    }
    ProjectDirs::from("net", "fleetpulse", "fleetpulse").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fleetpulse");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields the defaults.
///
/// Environment keys nest with a double underscore:
/// `FLEETPULSE_PROFILES__LAB__BACKEND=http://10.0.0.5:5050`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FLEETPULSE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist or is broken.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution (without CLI flags) ───────────────────────

/// Resolve an API key from the credential chain (no CLI flag step).
///
/// The backend may run without authentication, so an empty chain is `None`.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    // 1. Profile's api_key_env → env var lookup
    if let Some(ref env_name) = profile.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_key(profile_name)) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    profile.api_key.clone().map(SecretString::from)
}

/// Store an API key in the system keyring under the profile's name.
pub fn store_api_key(profile_name: &str, secret: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_key(profile_name))
        .map_err(|e| ConfigError::Keyring(format!("failed to access keyring: {e}")))?;
    entry
        .set_password(secret)
        .map_err(|e| ConfigError::Keyring(format!("failed to store secret in keyring: {e}")))
}

fn keyring_key(profile_name: &str) -> String {
    format!("{profile_name}/api-key")
}

/// Build a `MonitorConfig` from a profile, no CLI flag overrides.
pub fn profile_to_monitor_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<MonitorConfig, ConfigError> {
    let backend_url = parse_backend_url(&profile.backend)?;

    let tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let config = MonitorConfig {
        backend_url,
        api_key: resolve_api_key(profile, profile_name),
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or_else(default_timeout)),
        probe_ports: profile.monitor.probe_ports.clone(),
        probe_connect_timeout: Duration::from_millis(profile.monitor.probe_connect_timeout_ms),
        schedule: profile.monitor.schedule(),
        thresholds: profile.monitor.threshold_policy(),
    };

    config.validate().map_err(|e| ConfigError::Validation {
        field: format!("profiles.{profile_name}.monitor"),
        reason: e.to_string(),
    })?;
    Ok(config)
}

/// Parse a backend URL, accepting only http and https.
pub fn parse_backend_url(raw: &str) -> Result<url::Url, ConfigError> {
    let url: url::Url = raw.parse().map_err(|_| ConfigError::Validation {
        field: "backend".into(),
        reason: format!("invalid URL: {raw}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: "backend".into(),
            reason: format!("unsupported scheme '{}', expected http or https", url.scheme()),
        });
    }
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert_eq!(cfg.defaults.output, "table");
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn partial_monitor_table_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
default_profile = "lab"

[profiles.lab]
backend = "http://10.0.0.5:5050"

[profiles.lab.monitor]
probe_interval_secs = 3

[profiles.lab.monitor.thresholds]
max_visual_time = 120

[profiles.lab.monitor.tech_thresholds.Cisco]
min_downtime = 30
max_visual_time = 240
stall_timeout = 600
"#,
        );
        let cfg = load_config_from(&path).unwrap();
        let lab = &cfg.profiles["lab"];
        assert_eq!(lab.monitor.probe_interval_secs, 3);
        assert_eq!(lab.monitor.reconcile_interval_secs, 7);
        assert_eq!(lab.monitor.probe_ports, vec![80, 443]);
        assert_eq!(lab.monitor.thresholds.max_visual_time, Duration::from_secs(120));
        assert_eq!(lab.monitor.thresholds.min_downtime, Duration::from_secs(10));

        let policy = lab.monitor.threshold_policy();
        assert_eq!(policy.for_tech("cisco").min_downtime, Duration::from_secs(30));
        assert_eq!(policy.for_tech("other").max_visual_time, Duration::from_secs(120));
    }

    #[test]
    fn profile_builds_monitor_config() {
        let profile = Profile {
            backend: "https://fleet.example:8443".into(),
            api_key: Some("plain-key".into()),
            insecure: Some(true),
            timeout: Some(5),
            ..Profile::default()
        };
        let cfg = profile_to_monitor_config(&profile, "fleetpulse-test-plaintext").unwrap();
        assert_eq!(cfg.backend_url.as_str(), "https://fleet.example:8443/");
        assert_eq!(cfg.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert_eq!(cfg.schedule, Schedule::default());
        assert_eq!(cfg.api_key.unwrap().expose_secret(), "plain-key");
    }

    #[test]
    fn ca_cert_selects_custom_ca() {
        let profile = Profile {
            ca_cert: Some(PathBuf::from("/etc/fleet/ca.pem")),
            ..Profile::default()
        };
        let cfg = profile_to_monitor_config(&profile, "fleetpulse-test-ca").unwrap();
        assert_eq!(
            cfg.tls,
            TlsVerification::CustomCa(PathBuf::from("/etc/fleet/ca.pem"))
        );
    }

    #[test]
    fn rejects_bad_backend_urls() {
        assert!(matches!(
            parse_backend_url("not a url"),
            Err(ConfigError::Validation { .. })
        ));
        assert!(matches!(
            parse_backend_url("ftp://host"),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn rejects_unordered_thresholds() {
        let mut profile = Profile::default();
        profile.monitor.thresholds.min_downtime = Duration::from_secs(500);
        let err = profile_to_monitor_config(&profile, "fleetpulse-test-bad").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn save_then_load_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        let mut profile = Profile::default();
        profile.monitor.follow_up_secs = vec![10, 20];
        cfg.profiles.insert("default".into(), profile);
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.profiles["default"].monitor.follow_up_secs, vec![10, 20]);
        assert_eq!(loaded.profiles["default"].backend, DEFAULT_BACKEND_URL);
    }
}
