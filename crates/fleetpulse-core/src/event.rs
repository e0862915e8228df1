// ── Monitor events ──
//
// Broadcast to every subscriber of `Monitor::events()`. Events describe
// transitions; the registry snapshot remains the source of truth.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{DeviceStatus, NetworkAddress};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// The initial device list could not be loaded.
    BootstrapFailed { message: String },
    DevicesAdded { addresses: Vec<String> },
    DevicesRemoved { addresses: Vec<String> },
    /// Raw status changed outside a reboot session, or a session ended.
    StatusChanged {
        address: String,
        from: DeviceStatus,
        to: DeviceStatus,
    },
    AddressChanged {
        address: String,
        ip: NetworkAddress,
    },
    /// The device entered a reboot session.
    RebootAccepted {
        address: String,
        at: DateTime<Utc>,
    },
    /// The executor confirmed delivery.
    RebootDispatched {
        address: String,
        output: Option<String>,
    },
    /// The command was refused or never delivered; the session was rolled back.
    RebootRejected { address: String, message: String },
    RebootRecovered {
        address: String,
        #[serde(with = "secs")]
        elapsed: Duration,
    },
    RebootStalled {
        address: String,
        #[serde(with = "secs")]
        elapsed: Duration,
    },
    /// The reboot control for `address` is usable again.
    ControlReleased {
        address: String,
        still_rebooting: bool,
    },
}

impl MonitorEvent {
    /// Device the event is about, if any.
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::StatusChanged { address, .. }
            | Self::AddressChanged { address, .. }
            | Self::RebootAccepted { address, .. }
            | Self::RebootDispatched { address, .. }
            | Self::RebootRejected { address, .. }
            | Self::RebootRecovered { address, .. }
            | Self::RebootStalled { address, .. }
            | Self::ControlReleased { address, .. } => Some(address),
            Self::BootstrapFailed { .. } | Self::DevicesAdded { .. } | Self::DevicesRemoved { .. } => {
                None
            }
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_tag() {
        let ev = MonitorEvent::RebootRecovered {
            address: "a1".into(),
            elapsed: Duration::from_secs(42),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "reboot_recovered");
        assert_eq!(json["elapsed"], 42);
        assert_eq!(ev.address(), Some("a1"));
    }
}
