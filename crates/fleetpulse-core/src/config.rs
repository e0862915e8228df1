// ── Runtime monitor configuration ──
//
// These types describe *how* to reach the backend and how often to do
// background work. They carry credential data and timing, but never touch
// disk. The CLI constructs a `MonitorConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;
use crate::reboot::ThresholdPolicy;

/// Local backend address used when nothing is configured.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5050";

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed certs on the LAN).
    DangerAcceptInvalid,
}

/// Cadence of the background tasks and reboot follow-up timing.
///
/// A zero interval disables the corresponding periodic task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub probe_interval: Duration,
    pub reconcile_interval: Duration,
    pub resolve_interval: Duration,
    /// Upper bound on a single probe; a probe that overruns counts as unreachable.
    pub probe_timeout: Duration,
    /// Extra probes after a reboot dispatch, relative to dispatch time.
    pub follow_ups: Vec<Duration>,
    /// Re-enable the reboot control after this long, whatever the device does.
    pub control_release: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(7),
            reconcile_interval: Duration::from_secs(7),
            resolve_interval: Duration::from_secs(5 * 60),
            probe_timeout: Duration::from_millis(3500),
            follow_ups: [5, 15, 30, 60].into_iter().map(Duration::from_secs).collect(),
            control_release: Duration::from_secs(90),
        }
    }
}

impl Schedule {
    /// A schedule with every periodic task disabled. Used for one-shot runs.
    #[must_use]
    pub fn one_shot(mut self) -> Self {
        self.probe_interval = Duration::ZERO;
        self.reconcile_interval = Duration::ZERO;
        self.resolve_interval = Duration::ZERO;
        self
    }
}

/// Configuration for one monitor instance.
///
/// Built by the CLI, passed to `Monitor`. Core never reads config files.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Backend root URL (e.g., `http://localhost:5050`).
    pub backend_url: Url,
    /// Optional bearer token for the backend.
    pub api_key: Option<SecretString>,
    pub tls: TlsVerification,
    /// Backend request timeout.
    pub timeout: Duration,
    /// TCP ports tried in order by the reachability probe.
    pub probe_ports: Vec<u16>,
    /// Per-port connect timeout of the reachability probe.
    pub probe_connect_timeout: Duration,
    pub schedule: Schedule,
    pub thresholds: ThresholdPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            backend_url: Url::parse(DEFAULT_BACKEND_URL).expect("default backend URL is valid"),
            api_key: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            probe_ports: vec![80, 443],
            probe_connect_timeout: Duration::from_secs(3),
            schedule: Schedule::default(),
            thresholds: ThresholdPolicy::default(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        self.thresholds.validate()?;
        if self.schedule.probe_timeout.is_zero() {
            return Err(CoreError::Config {
                message: "probe timeout must be greater than zero".into(),
            });
        }
        if self.probe_connect_timeout.is_zero()
            || self.probe_connect_timeout > self.schedule.probe_timeout
        {
            return Err(CoreError::Config {
                message: format!(
                    "probe connect timeout ({}ms) must be non-zero and within the probe timeout ({}ms)",
                    self.probe_connect_timeout.as_millis(),
                    self.schedule.probe_timeout.as_millis()
                ),
            });
        }
        if self.probe_ports.is_empty() {
            return Err(CoreError::Config {
                message: "at least one probe port is required".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reboot::RebootThresholds;

    #[test]
    fn defaults_are_valid() {
        assert!(MonitorConfig::default().validate().is_ok());
    }

    #[test]
    fn default_schedule_matches_cadence() {
        let s = Schedule::default();
        assert_eq!(s.probe_interval, Duration::from_secs(7));
        assert_eq!(s.resolve_interval, Duration::from_secs(300));
        assert_eq!(s.follow_ups.len(), 4);
    }

    #[test]
    fn one_shot_disables_periodic_tasks() {
        let s = Schedule::default().one_shot();
        assert!(s.probe_interval.is_zero());
        assert!(s.reconcile_interval.is_zero());
        assert!(s.resolve_interval.is_zero());
        assert_eq!(s.control_release, Duration::from_secs(90));
    }

    #[test]
    fn invalid_thresholds_fail_validation() {
        let config = MonitorConfig {
            thresholds: ThresholdPolicy::new(RebootThresholds {
                min_downtime: Duration::from_secs(100),
                max_visual_time: Duration::from_secs(90),
                stall_timeout: Duration::from_secs(300),
            }),
            ..MonitorConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config { .. })));
    }

    #[test]
    fn connect_timeout_must_fit_probe_timeout() {
        let mut config = MonitorConfig {
            probe_connect_timeout: Duration::from_secs(5),
            ..MonitorConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config { .. })));

        config.probe_connect_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_port_list_is_rejected() {
        let config = MonitorConfig {
            probe_ports: Vec::new(),
            ..MonitorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
