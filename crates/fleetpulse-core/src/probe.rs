// ── Probe result application ──
//
// Folds one reachability outcome into a device record. The reboot decision
// itself lives in `reboot::step`; this module owns the bookkeeping around it.

use chrono::{DateTime, Utc};

use crate::model::{Device, DeviceStatus};
use crate::reboot::{self, ProbeOutcome, RebootEvent, RebootThresholds, Step};

/// What a single probe did to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeEffect {
    pub previous: DeviceStatus,
    pub current: DeviceStatus,
    pub step: Step,
}

impl ProbeEffect {
    pub fn status_changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Apply a probe outcome observed at `now`.
///
/// `last_seen` always records the time of the attempt, whatever the outcome.
/// While a reboot is in progress the raw status is only touched when the
/// session ends (recovery or stall).
pub fn apply_probe(
    device: &mut Device,
    outcome: ProbeOutcome,
    now: DateTime<Utc>,
    thresholds: &RebootThresholds,
) -> ProbeEffect {
    let previous = device.status;
    device.last_seen = Some(now);
    device.latency = match outcome {
        ProbeOutcome::Reachable { latency } => latency.or(device.latency),
        ProbeOutcome::Unreachable => None,
    };

    let transition = reboot::step(device.reboot, RebootEvent::Probe(outcome), now, thresholds);
    device.reboot = transition.next;
    if let Some(status) = transition.status {
        device.status = status;
    }

    ProbeEffect {
        previous,
        current: device.status,
        step: transition.step,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::reboot::RebootPhase;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 14, 9, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(secs)
    }

    fn device() -> Device {
        Device::new("a1010.example.net", "Salle A-1010", "A", "VIA", "")
    }

    fn up() -> ProbeOutcome {
        ProbeOutcome::Reachable {
            latency: Some(Duration::from_millis(4)),
        }
    }

    #[test]
    fn idle_device_follows_probe() {
        let mut dev = device();
        let th = RebootThresholds::default();

        let effect = apply_probe(&mut dev, up(), t0(), &th);
        assert_eq!(dev.status, DeviceStatus::Online);
        assert_eq!(dev.last_seen, Some(t0()));
        assert_eq!(dev.latency, Some(Duration::from_millis(4)));
        assert!(effect.status_changed());

        let effect = apply_probe(&mut dev, ProbeOutcome::Unreachable, at(7), &th);
        assert_eq!(dev.status, DeviceStatus::Offline);
        assert_eq!(dev.last_seen, Some(at(7)));
        assert!(dev.latency.is_none());
        assert_eq!(effect.previous, DeviceStatus::Online);
    }

    #[test]
    fn last_seen_updates_even_when_ignored() {
        let mut dev = device();
        dev.status = DeviceStatus::Online;
        dev.reboot = RebootPhase::Rebooting { since: t0() };

        let effect = apply_probe(&mut dev, up(), at(3), &RebootThresholds::default());
        assert!(dev.is_rebooting());
        assert_eq!(dev.last_seen, Some(at(3)));
        assert!(!effect.status_changed());
        assert!(matches!(effect.step, Step::TooEarly { .. }));
    }

    #[test]
    fn failed_probes_while_rebooting_leave_status_alone() {
        let mut dev = device();
        dev.status = DeviceStatus::Online;
        dev.reboot = RebootPhase::Rebooting { since: t0() };

        apply_probe(&mut dev, ProbeOutcome::Unreachable, at(120), &RebootThresholds::default());
        assert!(dev.is_rebooting());
        assert_eq!(dev.status, DeviceStatus::Online);
    }

    #[test]
    fn recovery_clears_reboot_and_sets_online() {
        let mut dev = device();
        dev.status = DeviceStatus::Offline;
        dev.reboot = RebootPhase::Rebooting { since: t0() };

        let effect = apply_probe(&mut dev, up(), at(42), &RebootThresholds::default());
        assert!(!dev.is_rebooting());
        assert!(dev.reboot_initiated_at().is_none());
        assert_eq!(dev.status, DeviceStatus::Online);
        assert_eq!(
            effect.step,
            Step::Recovered {
                elapsed: Duration::from_secs(42)
            }
        );
    }

    #[test]
    fn stall_clears_reboot_and_sets_offline() {
        let mut dev = device();
        dev.status = DeviceStatus::Online;
        dev.reboot = RebootPhase::Rebooting { since: t0() };

        let effect = apply_probe(&mut dev, ProbeOutcome::Unreachable, at(301), &RebootThresholds::default());
        assert!(!dev.is_rebooting());
        assert_eq!(dev.status, DeviceStatus::Offline);
        assert!(effect.status_changed());
    }
}
