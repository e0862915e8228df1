// ── Reboot state machine ──
//
// A device is either idle or inside a reboot session. Every transition goes
// through `step`, a pure function of the current phase, an event, the wall
// clock, and the thresholds for the device's family. Callers apply the
// returned `Transition` to the record under the registry's entry lock.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::DeviceStatus;

/// Where a device is in its reboot lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RebootPhase {
    #[default]
    Idle,
    /// A reboot command was accepted at `since`.
    Rebooting { since: DateTime<Utc> },
}

impl RebootPhase {
    pub fn is_rebooting(&self) -> bool {
        matches!(self, Self::Rebooting { .. })
    }

    pub fn initiated_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Idle => None,
            Self::Rebooting { since } => Some(*since),
        }
    }

    /// Time since the session started. Clock skew never yields a negative value.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.initiated_at()
            .map(|since| (now - since).to_std().unwrap_or(Duration::ZERO))
    }
}

// ── Thresholds ───────────────────────────────────────────────────

/// Timing windows of a reboot session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebootThresholds {
    /// Reachable probes earlier than this are pre-shutdown echoes and ignored.
    #[serde(with = "duration_secs")]
    pub min_downtime: Duration,
    /// Expected reboot duration; past it the session is shown as overdue.
    #[serde(with = "duration_secs")]
    pub max_visual_time: Duration,
    /// Past this with no reachable probe, the reboot is declared failed.
    #[serde(with = "duration_secs")]
    pub stall_timeout: Duration,
}

impl Default for RebootThresholds {
    fn default() -> Self {
        Self {
            min_downtime: Duration::from_secs(10),
            max_visual_time: Duration::from_secs(90),
            stall_timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl RebootThresholds {
    /// Windows must nest: `min_downtime <= max_visual_time <= stall_timeout`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.min_downtime > self.max_visual_time {
            return Err(CoreError::Config {
                message: format!(
                    "min_downtime ({}s) exceeds max_visual_time ({}s)",
                    self.min_downtime.as_secs(),
                    self.max_visual_time.as_secs()
                ),
            });
        }
        if self.max_visual_time > self.stall_timeout {
            return Err(CoreError::Config {
                message: format!(
                    "max_visual_time ({}s) exceeds stall_timeout ({}s)",
                    self.max_visual_time.as_secs(),
                    self.stall_timeout.as_secs()
                ),
            });
        }
        Ok(())
    }
}

/// Default thresholds plus overrides keyed by device family (`tech`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThresholdPolicy {
    pub default: RebootThresholds,
    by_tech: HashMap<String, RebootThresholds>,
}

impl ThresholdPolicy {
    pub fn new(default: RebootThresholds) -> Self {
        Self {
            default,
            by_tech: HashMap::new(),
        }
    }

    /// Add an override for one device family. Matching is case-insensitive.
    #[must_use]
    pub fn with_override(mut self, tech: &str, thresholds: RebootThresholds) -> Self {
        self.by_tech.insert(tech.to_ascii_lowercase(), thresholds);
        self
    }

    pub fn for_tech(&self, tech: &str) -> &RebootThresholds {
        self.by_tech
            .get(&tech.to_ascii_lowercase())
            .unwrap_or(&self.default)
    }

    pub fn overrides(&self) -> impl Iterator<Item = (&str, &RebootThresholds)> {
        self.by_tech.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.default.validate()?;
        for (tech, th) in &self.by_tech {
            th.validate().map_err(|e| CoreError::Config {
                message: format!("thresholds for {tech}: {e}"),
            })?;
        }
        Ok(())
    }
}

// ── Events and transitions ───────────────────────────────────────

/// Outcome of one reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable { latency: Option<Duration> },
    Unreachable,
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable { .. })
    }
}

impl From<fleetpulse_api::ProbeReport> for ProbeOutcome {
    fn from(report: fleetpulse_api::ProbeReport) -> Self {
        if report.reachable {
            Self::Reachable {
                latency: report.latency,
            }
        } else {
            Self::Unreachable
        }
    }
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootEvent {
    /// An operator asked for a reboot.
    Initiate,
    /// The executor refused or never delivered the command of the session
    /// started at `initiated_at`.
    CommandRejected { initiated_at: DateTime<Utc> },
    /// A probe result arrived.
    Probe(ProbeOutcome),
}

/// What a transition did, for logging and event emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Idle → Rebooting.
    Entered,
    /// Initiate while already rebooting. No-op.
    AlreadyRebooting,
    /// Rebooting → Idle because the command never took effect.
    RolledBack,
    /// Rejection for a session that is no longer current. No-op.
    StaleRejection,
    /// Probe on an idle device; raw status follows the probe.
    Observed,
    /// Unreachable while rebooting, within the stall window.
    Settling { elapsed: Duration },
    /// Reachable too soon after initiation. Ignored.
    TooEarly { elapsed: Duration },
    /// Reachable after the minimum downtime. Rebooting → Idle, online.
    Recovered { elapsed: Duration },
    /// Unreachable past the stall timeout. Rebooting → Idle, offline.
    Stalled { elapsed: Duration },
}

/// Result of `step`: the next phase, and the raw status to set if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: RebootPhase,
    pub status: Option<DeviceStatus>,
    pub step: Step,
}

impl Transition {
    fn stay(phase: RebootPhase, step: Step) -> Self {
        Self {
            next: phase,
            status: None,
            step,
        }
    }
}

/// The reboot transition table.
pub fn step(
    phase: RebootPhase,
    event: RebootEvent,
    now: DateTime<Utc>,
    thresholds: &RebootThresholds,
) -> Transition {
    match (phase, event) {
        (RebootPhase::Idle, RebootEvent::Initiate) => Transition {
            next: RebootPhase::Rebooting { since: now },
            status: None,
            step: Step::Entered,
        },
        (RebootPhase::Rebooting { .. }, RebootEvent::Initiate) => {
            Transition::stay(phase, Step::AlreadyRebooting)
        }

        (RebootPhase::Rebooting { since }, RebootEvent::CommandRejected { initiated_at })
            if since == initiated_at =>
        {
            Transition::stay(RebootPhase::Idle, Step::RolledBack)
        }
        (_, RebootEvent::CommandRejected { .. }) => Transition::stay(phase, Step::StaleRejection),

        (RebootPhase::Idle, RebootEvent::Probe(outcome)) => Transition {
            next: RebootPhase::Idle,
            status: Some(if outcome.is_reachable() {
                DeviceStatus::Online
            } else {
                DeviceStatus::Offline
            }),
            step: Step::Observed,
        },

        (RebootPhase::Rebooting { since }, RebootEvent::Probe(outcome)) => {
            let elapsed = (now - since).to_std().unwrap_or(Duration::ZERO);
            match outcome {
                ProbeOutcome::Unreachable if elapsed > thresholds.stall_timeout => Transition {
                    next: RebootPhase::Idle,
                    status: Some(DeviceStatus::Offline),
                    step: Step::Stalled { elapsed },
                },
                ProbeOutcome::Unreachable => Transition::stay(phase, Step::Settling { elapsed }),
                ProbeOutcome::Reachable { .. } if elapsed < thresholds.min_downtime => {
                    Transition::stay(phase, Step::TooEarly { elapsed })
                }
                ProbeOutcome::Reachable { .. } => Transition {
                    next: RebootPhase::Idle,
                    status: Some(DeviceStatus::Online),
                    step: Step::Recovered { elapsed },
                },
            }
        }
    }
}

/// Serde helper: durations as whole seconds in config files.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 14, 9, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(secs)
    }

    fn rebooting() -> RebootPhase {
        RebootPhase::Rebooting { since: t0() }
    }

    const UP: RebootEvent = RebootEvent::Probe(ProbeOutcome::Reachable { latency: None });
    const DOWN: RebootEvent = RebootEvent::Probe(ProbeOutcome::Unreachable);

    #[test]
    fn initiate_from_idle_enters_rebooting() {
        let t = step(RebootPhase::Idle, RebootEvent::Initiate, t0(), &RebootThresholds::default());
        assert_eq!(t.next, rebooting());
        assert_eq!(t.step, Step::Entered);
        assert!(t.status.is_none());
    }

    #[test]
    fn initiate_while_rebooting_is_noop() {
        let t = step(rebooting(), RebootEvent::Initiate, at(3), &RebootThresholds::default());
        assert_eq!(t.next, rebooting());
        assert_eq!(t.step, Step::AlreadyRebooting);
    }

    #[test]
    fn reachable_before_min_downtime_is_ignored() {
        let th = RebootThresholds::default();
        for secs in [0, 5, 9] {
            let t = step(rebooting(), UP, at(secs), &th);
            assert_eq!(t.next, rebooting(), "at +{secs}s");
            assert!(t.status.is_none());
            assert!(matches!(t.step, Step::TooEarly { .. }));
        }
    }

    #[test]
    fn reachable_at_min_downtime_recovers() {
        let t = step(rebooting(), UP, at(10), &RebootThresholds::default());
        assert_eq!(t.next, RebootPhase::Idle);
        assert_eq!(t.status, Some(DeviceStatus::Online));
        assert_eq!(
            t.step,
            Step::Recovered {
                elapsed: Duration::from_secs(10)
            }
        );
    }

    #[test]
    fn recovery_past_visual_window_still_recovers() {
        let t = step(rebooting(), UP, at(200), &RebootThresholds::default());
        assert_eq!(t.next, RebootPhase::Idle);
        assert_eq!(t.status, Some(DeviceStatus::Online));
    }

    #[test]
    fn unreachable_within_stall_keeps_rebooting() {
        let th = RebootThresholds::default();
        for secs in [1, 60, 91, 300] {
            let t = step(rebooting(), DOWN, at(secs), &th);
            assert_eq!(t.next, rebooting(), "at +{secs}s");
            assert!(t.status.is_none());
        }
    }

    #[test]
    fn unreachable_past_stall_goes_offline() {
        let t = step(rebooting(), DOWN, at(301), &RebootThresholds::default());
        assert_eq!(t.next, RebootPhase::Idle);
        assert_eq!(t.status, Some(DeviceStatus::Offline));
        assert!(matches!(t.step, Step::Stalled { .. }));
    }

    #[test]
    fn idle_probe_sets_raw_status() {
        let th = RebootThresholds::default();
        assert_eq!(step(RebootPhase::Idle, UP, t0(), &th).status, Some(DeviceStatus::Online));
        assert_eq!(step(RebootPhase::Idle, DOWN, t0(), &th).status, Some(DeviceStatus::Offline));
    }

    #[test]
    fn rejection_rolls_back_matching_session_only() {
        let th = RebootThresholds::default();
        let matching = RebootEvent::CommandRejected { initiated_at: t0() };
        let stale = RebootEvent::CommandRejected { initiated_at: at(-60) };

        let t = step(rebooting(), matching, at(2), &th);
        assert_eq!(t.next, RebootPhase::Idle);
        assert_eq!(t.step, Step::RolledBack);
        assert!(t.status.is_none());

        let t = step(rebooting(), stale, at(2), &th);
        assert_eq!(t.next, rebooting());
        assert_eq!(t.step, Step::StaleRejection);

        let t = step(RebootPhase::Idle, matching, at(2), &th);
        assert_eq!(t.next, RebootPhase::Idle);
        assert_eq!(t.step, Step::StaleRejection);
    }

    #[test]
    fn clock_skew_counts_as_zero_elapsed() {
        let t = step(rebooting(), UP, at(-5), &RebootThresholds::default());
        assert_eq!(
            t.step,
            Step::TooEarly {
                elapsed: Duration::ZERO
            }
        );
    }

    #[test]
    fn thresholds_must_nest() {
        assert!(RebootThresholds::default().validate().is_ok());
        let bad = RebootThresholds {
            min_downtime: Duration::from_secs(120),
            ..RebootThresholds::default()
        };
        assert!(bad.validate().is_err());
        let bad = RebootThresholds {
            stall_timeout: Duration::from_secs(30),
            ..RebootThresholds::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn policy_falls_back_to_default() {
        let slow = RebootThresholds {
            min_downtime: Duration::from_secs(30),
            max_visual_time: Duration::from_secs(180),
            stall_timeout: Duration::from_secs(600),
        };
        let policy = ThresholdPolicy::default().with_override("Crestron", slow);

        assert_eq!(policy.for_tech("crestron"), &slow);
        assert_eq!(policy.for_tech("VIA"), &RebootThresholds::default());
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn per_tech_thresholds_change_recovery() {
        let slow = RebootThresholds {
            min_downtime: Duration::from_secs(30),
            max_visual_time: Duration::from_secs(180),
            stall_timeout: Duration::from_secs(600),
        };
        let t = step(rebooting(), UP, at(20), &slow);
        assert!(matches!(t.step, Step::TooEarly { .. }));
        let t = step(rebooting(), DOWN, at(400), &slow);
        assert!(matches!(t.step, Step::Settling { .. }));
    }
}
