// ── Device domain type ──
//
// The monitored device as the rest of the crate sees it. Descriptive fields
// come from the backend inventory; observed fields (network address, status,
// last seen, latency) come from local probing; the reboot phase is owned
// exclusively by the reboot state machine.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::reboot::{RebootPhase, RebootThresholds};

/// Raw reachability status, as last observed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeviceStatus {
    Online,
    Offline,
    /// Never probed, or the backend reported something we do not track.
    #[default]
    Unknown,
}

impl DeviceStatus {
    /// Map a backend status string. Anything other than `online`/`offline`
    /// (e.g. `checking`) is treated as unknown.
    pub fn from_upstream(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "online" => Self::Online,
            "offline" => Self::Offline,
            _ => Self::Unknown,
        }
    }
}

/// Status as presented to operators.
///
/// A device in a reboot session always displays as `Rebooting`, whatever its
/// raw status. A device that was never probed displays as `OfflinePending`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum DisplayStatus {
    Online,
    Offline,
    Rebooting,
    OfflinePending,
}

/// Why a device's address could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// The resolver answered, but the lookup failed.
    #[strum(serialize = "lookup failed")]
    LookupFailed,
    /// The resolver itself could not be reached.
    #[strum(serialize = "resolver unreachable")]
    ResolverUnreachable,
}

/// Result of resolving a device's logical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkAddress {
    Resolved(IpAddr),
    Unresolved(UnresolvedReason),
}

impl NetworkAddress {
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Self::Resolved(ip) => Some(*ip),
            Self::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(ip) => write!(f, "{ip}"),
            Self::Unresolved(reason) => write!(f, "unknown ({reason})"),
        }
    }
}

impl Serialize for NetworkAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ── Device ───────────────────────────────────────────────────────

/// A monitored device, keyed by its logical `address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Stable identity (hostname). Never changes for a record.
    pub address: String,
    pub name: String,
    pub building: String,
    /// Device family, e.g. `VIA` or `Crestron`.
    pub tech: String,
    pub mac: String,

    /// `None` until the first resolution attempt.
    pub ip: Option<NetworkAddress>,
    pub status: DeviceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    /// Connect latency of the last successful probe.
    pub latency: Option<Duration>,

    pub(crate) reboot: RebootPhase,
}

impl Device {
    pub fn new(
        address: impl Into<String>,
        name: impl Into<String>,
        building: impl Into<String>,
        tech: impl Into<String>,
        mac: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            building: building.into(),
            tech: tech.into(),
            mac: mac.into(),
            ip: None,
            status: DeviceStatus::Unknown,
            last_seen: None,
            latency: None,
            reboot: RebootPhase::Idle,
        }
    }

    pub fn reboot_phase(&self) -> RebootPhase {
        self.reboot
    }

    pub fn is_rebooting(&self) -> bool {
        self.reboot.is_rebooting()
    }

    /// When the current reboot session started, if any.
    pub fn reboot_initiated_at(&self) -> Option<DateTime<Utc>> {
        self.reboot.initiated_at()
    }

    /// Derived presentation status.
    pub fn display_status(&self) -> DisplayStatus {
        if self.is_rebooting() {
            return DisplayStatus::Rebooting;
        }
        match self.status {
            DeviceStatus::Online => DisplayStatus::Online,
            DeviceStatus::Offline => DisplayStatus::Offline,
            DeviceStatus::Unknown => DisplayStatus::OfflinePending,
        }
    }

    /// Time spent in the current reboot session, clamped at zero.
    pub fn reboot_elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.reboot.elapsed(now)
    }

    /// `true` once a reboot has run past the visual window without the
    /// device coming back. Presentation layers show a "taking longer than
    /// expected" hint; the session itself is still live.
    pub fn reboot_overdue(&self, now: DateTime<Utc>, thresholds: &RebootThresholds) -> bool {
        self.reboot_elapsed(now)
            .is_some_and(|elapsed| elapsed > thresholds.max_visual_time)
    }
}

/// Flat, camelCase view used for JSON/YAML output.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceView<'a> {
    address: &'a str,
    name: &'a str,
    building: &'a str,
    tech: &'a str,
    mac: &'a str,
    ip: Option<&'a NetworkAddress>,
    status: DeviceStatus,
    display_status: DisplayStatus,
    last_seen: Option<DateTime<Utc>>,
    latency_ms: Option<u64>,
    is_rebooting: bool,
    reboot_initiated_at: Option<DateTime<Utc>>,
}

impl Serialize for Device {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DeviceView {
            address: &self.address,
            name: &self.name,
            building: &self.building,
            tech: &self.tech,
            mac: &self.mac,
            ip: self.ip.as_ref(),
            status: self.status,
            display_status: self.display_status(),
            last_seen: self.last_seen,
            latency_ms: self
                .latency
                .map(|l| u64::try_from(l.as_millis()).unwrap_or(u64::MAX)),
            is_rebooting: self.is_rebooting(),
            reboot_initiated_at: self.reboot_initiated_at(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn device() -> Device {
        Device::new("a1010.example.net", "Salle A-1010", "A", "VIA", "00:11:22:33:44:55")
    }

    #[test]
    fn new_device_is_pending() {
        let dev = device();
        assert_eq!(dev.display_status(), DisplayStatus::OfflinePending);
        assert!(!dev.is_rebooting());
        assert!(dev.reboot_initiated_at().is_none());
    }

    #[test]
    fn rebooting_overrides_raw_status() {
        let mut dev = device();
        dev.status = DeviceStatus::Online;
        dev.reboot = RebootPhase::Rebooting {
            since: Utc.with_ymd_and_hms(2025, 10, 14, 9, 0, 0).unwrap(),
        };
        assert_eq!(dev.display_status(), DisplayStatus::Rebooting);
    }

    #[test]
    fn upstream_status_mapping() {
        assert_eq!(DeviceStatus::from_upstream("online"), DeviceStatus::Online);
        assert_eq!(DeviceStatus::from_upstream("Offline"), DeviceStatus::Offline);
        assert_eq!(DeviceStatus::from_upstream("checking"), DeviceStatus::Unknown);
        assert_eq!(DeviceStatus::from_upstream(""), DeviceStatus::Unknown);
    }

    #[test]
    fn display_status_strings() {
        assert_eq!(DisplayStatus::OfflinePending.to_string(), "offline-pending");
        assert_eq!(
            "Offline-Pending".parse::<DisplayStatus>().unwrap(),
            DisplayStatus::OfflinePending
        );
    }

    #[test]
    fn unresolved_address_renders_reason() {
        let addr = NetworkAddress::Unresolved(UnresolvedReason::ResolverUnreachable);
        assert_eq!(addr.to_string(), "unknown (resolver unreachable)");
        assert!(addr.ip().is_none());
    }

    #[test]
    fn overdue_after_visual_window() {
        let since = Utc.with_ymd_and_hms(2025, 10, 14, 9, 0, 0).unwrap();
        let mut dev = device();
        dev.reboot = RebootPhase::Rebooting { since };
        let th = RebootThresholds::default();

        assert!(!dev.reboot_overdue(since + chrono::Duration::seconds(90), &th));
        assert!(dev.reboot_overdue(since + chrono::Duration::seconds(91), &th));
    }

    #[test]
    fn json_view_is_camel_case() {
        let mut dev = device();
        dev.ip = Some(NetworkAddress::Resolved("10.0.0.7".parse().unwrap()));
        dev.latency = Some(Duration::from_millis(12));

        let json = serde_json::to_value(&dev).unwrap();
        assert_eq!(json["displayStatus"], "offline-pending");
        assert_eq!(json["ip"], "10.0.0.7");
        assert_eq!(json["latencyMs"], 12);
        assert_eq!(json["isRebooting"], false);
        assert!(json["rebootInitiatedAt"].is_null());
    }
}
