// ── Filter predicate for device snapshots ──
//
// Used by the CLI to narrow snapshots without re-querying the backend.

use crate::model::{Device, DisplayStatus};

/// Conjunction of optional criteria. The default filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Case-insensitive substring over name, building, tech, ip and mac.
    pub search: Option<String>,
    pub building: Option<String>,
    pub tech: Option<String>,
    /// Matches the display status. `Offline` also matches devices that were
    /// never probed.
    pub status: Option<DisplayStatus>,
}

impl DeviceFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, device: &Device) -> bool {
        if let Some(status) = self.status {
            let shown = device.display_status();
            let ok = match status {
                DisplayStatus::Offline => {
                    matches!(shown, DisplayStatus::Offline | DisplayStatus::OfflinePending)
                }
                other => shown == other,
            };
            if !ok {
                return false;
            }
        }

        if let Some(needle) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            let ip = device.ip.map(|a| a.to_string()).unwrap_or_default();
            let haystack = [
                device.name.as_str(),
                device.building.as_str(),
                device.tech.as_str(),
                ip.as_str(),
                device.mac.as_str(),
            ]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
            if !haystack.contains(&needle) {
                return false;
            }
        }

        if let Some(ref building) = self.building {
            if !device.building.eq_ignore_ascii_case(building) {
                return false;
            }
        }
        if let Some(ref tech) = self.tech {
            if !device.tech.eq_ignore_ascii_case(tech) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{DeviceStatus, NetworkAddress};
    use crate::reboot::RebootPhase;
    use chrono::Utc;

    fn device(status: DeviceStatus) -> Device {
        let mut d = Device::new("a1010.example.net", "Salle A-1010", "A", "VIA", "00:11:22:33:44:55");
        d.status = status;
        d.ip = Some(NetworkAddress::Resolved("10.20.30.40".parse().unwrap()));
        d
    }

    fn by_status(status: DisplayStatus) -> DeviceFilter {
        DeviceFilter {
            status: Some(status),
            ..DeviceFilter::default()
        }
    }

    #[test]
    fn empty_filter_matches_all() {
        assert!(DeviceFilter::default().is_empty());
        assert!(DeviceFilter::default().matches(&device(DeviceStatus::Unknown)));
    }

    #[test]
    fn search_covers_ip_and_mac() {
        let dev = device(DeviceStatus::Online);
        for needle in ["a-1010", "via", "10.20.30", "44:55", "SALLE"] {
            let f = DeviceFilter {
                search: Some(needle.into()),
                ..DeviceFilter::default()
            };
            assert!(f.matches(&dev), "{needle}");
        }
        let miss = DeviceFilter {
            search: Some("crestron".into()),
            ..DeviceFilter::default()
        };
        assert!(!miss.matches(&dev));
    }

    #[test]
    fn unprobed_devices_only_match_offline() {
        let dev = device(DeviceStatus::Unknown);
        assert!(by_status(DisplayStatus::Offline).matches(&dev));
        assert!(by_status(DisplayStatus::OfflinePending).matches(&dev));
        assert!(!by_status(DisplayStatus::Online).matches(&dev));
        assert!(!by_status(DisplayStatus::Rebooting).matches(&dev));
    }

    #[test]
    fn rebooting_matches_rebooting_only() {
        let mut dev = device(DeviceStatus::Online);
        dev.reboot = RebootPhase::Rebooting { since: Utc::now() };
        assert!(by_status(DisplayStatus::Rebooting).matches(&dev));
        assert!(!by_status(DisplayStatus::Online).matches(&dev));
    }

    #[test]
    fn building_and_tech_are_exact() {
        let dev = device(DeviceStatus::Online);
        let f = DeviceFilter {
            building: Some("a".into()),
            tech: Some("VIA".into()),
            ..DeviceFilter::default()
        };
        assert!(f.matches(&dev));
        let f = DeviceFilter {
            building: Some("AB".into()),
            ..DeviceFilter::default()
        };
        assert!(!f.matches(&dev));
    }
}
