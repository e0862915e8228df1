// ── Upstream reconciliation ──
//
// Merges a fresh backend device list into the registry field by field.
// Records are upserted first and missing addresses pruned afterwards, so a
// reader never observes a transiently empty set. Fields the backend does not
// own (the reboot phase) are never touched.

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleetpulse_api::UpstreamDevice;
use strum::{Display, EnumIter, IntoEnumIterator};
use tracing::{debug, warn};

use super::DeviceRegistry;
use crate::model::{Device, DeviceStatus, NetworkAddress};

/// Who is allowed to write a device field during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAuthority {
    /// The key. Never rewritten.
    Identity,
    /// Inventory data. Set when the record is created.
    Descriptive,
    /// Observations. Taken from upstream only when upstream reports them.
    Observed,
    /// Owned by this process. Upstream values are ignored.
    Local,
}

/// Every field of `Device`, for merge classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, Display)]
#[strum(serialize_all = "camelCase")]
pub enum DeviceField {
    Address,
    Name,
    Building,
    Tech,
    Mac,
    Ip,
    Status,
    LastSeen,
    Latency,
    Reboot,
}

impl DeviceField {
    pub const fn authority(self) -> FieldAuthority {
        match self {
            Self::Address => FieldAuthority::Identity,
            Self::Name | Self::Building | Self::Tech | Self::Mac => FieldAuthority::Descriptive,
            Self::Ip | Self::Status | Self::LastSeen | Self::Latency => FieldAuthority::Observed,
            Self::Reboot => FieldAuthority::Local,
        }
    }
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Existing records whose observed fields changed.
    pub updated: usize,
}

impl MergeReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated == 0
    }
}

impl DeviceRegistry {
    /// Reconcile the registry against an upstream list.
    ///
    /// New addresses are inserted with their descriptive fields. Existing
    /// records only take observed fields from upstream. Addresses absent
    /// upstream are removed. Subscribers are notified once, at the end.
    pub fn upsert_from_upstream(&self, upstream: &[UpstreamDevice]) -> MergeReport {
        let mut report = MergeReport::default();
        let mut incoming: HashSet<&str> = HashSet::with_capacity(upstream.len());

        for record in upstream {
            let address = record.address.trim();
            if address.is_empty() {
                warn!(name = %record.name, "skipping upstream device without address");
                continue;
            }
            if !incoming.insert(address) {
                debug!(address, "duplicate upstream address; keeping first");
                continue;
            }

            if self.contains(address) {
                if self.update_quiet(address, |local| merge_observed(local, record)) {
                    report.updated += 1;
                }
            } else if self.insert_quiet(device_from_upstream(address, record)) {
                report.added.push(address.to_owned());
            }
        }

        for existing in self.addresses() {
            if !incoming.contains(existing.as_str()) && self.remove_quiet(&existing).is_some() {
                report.removed.push(existing);
            }
        }

        if !report.is_noop() {
            self.publish();
        }
        report
    }
}

/// Build a new local record from an upstream entry.
pub(crate) fn device_from_upstream(address: &str, record: &UpstreamDevice) -> Device {
    let mut device = Device::new(
        address,
        record.name.as_str(),
        record.building.as_str(),
        record.tech.as_str(),
        record.mac.as_str(),
    );
    merge_observed(&mut device, record);
    device
}

/// Copy upstream observations onto `local`. Returns whether anything changed.
fn merge_observed(local: &mut Device, record: &UpstreamDevice) -> bool {
    let mut changed = false;
    for field in DeviceField::iter() {
        if field.authority() != FieldAuthority::Observed {
            continue;
        }
        changed |= match field {
            DeviceField::Ip => merge_ip(local, record.ip.as_deref()),
            DeviceField::Status => merge_status(local, record.status.as_deref()),
            DeviceField::LastSeen => merge_last_seen(local, record.last_seen.as_deref()),
            DeviceField::Latency => merge_latency(local, record.latency_ms),
            _ => false,
        };
    }
    changed
}

fn merge_ip(local: &mut Device, raw: Option<&str>) -> bool {
    let Some(ip) = raw.and_then(|s| s.trim().parse::<IpAddr>().ok()) else {
        return false;
    };
    let next = Some(NetworkAddress::Resolved(ip));
    if local.ip == next {
        return false;
    }
    local.ip = next;
    true
}

fn merge_status(local: &mut Device, raw: Option<&str>) -> bool {
    let Some(raw) = raw else { return false };
    let next = DeviceStatus::from_upstream(raw);
    if local.status == next {
        return false;
    }
    local.status = next;
    true
}

fn merge_last_seen(local: &mut Device, raw: Option<&str>) -> bool {
    let Some(ts) = raw.and_then(parse_timestamp) else {
        return false;
    };
    if local.last_seen == Some(ts) {
        return false;
    }
    local.last_seen = Some(ts);
    true
}

fn merge_latency(local: &mut Device, raw: Option<i64>) -> bool {
    let Some(ms) = raw.and_then(|ms| u64::try_from(ms).ok()).filter(|ms| *ms > 0) else {
        return false;
    };
    let next = Some(Duration::from_millis(ms));
    if local.latency == next {
        return false;
    }
    local.latency = next;
    true
}

/// Parse an upstream timestamp: RFC 3339, or RFC 2822/1123 as HTTP-style
/// backends emit (including a literal `UTC` zone).
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let gmt = raw.strip_suffix(" UTC").map(|head| format!("{head} GMT"))?;
    DateTime::parse_from_rfc2822(&gmt)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
