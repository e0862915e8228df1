// ── Address resolution application ──

use std::net::IpAddr;

use crate::error::CoreError;
use crate::model::{Device, NetworkAddress, UnresolvedReason};

/// Which resolution pass produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Load-time pass: every device gets a value, even on failure.
    Initial,
    /// Periodic refresh: failures keep the last known value.
    Periodic,
}

/// Outcome of resolving one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved(IpAddr),
    Failed(UnresolvedReason),
}

impl Resolution {
    /// Classify a resolver call. A lookup the resolver reported as failed is
    /// distinguished from not reaching the resolver at all.
    pub fn from_result(result: Result<IpAddr, CoreError>) -> Self {
        match result {
            Ok(ip) => Self::Resolved(ip),
            Err(CoreError::ResolutionFailed { .. }) => {
                Self::Failed(UnresolvedReason::LookupFailed)
            }
            Err(_) => Self::Failed(UnresolvedReason::ResolverUnreachable),
        }
    }
}

/// Apply a resolution result. Returns `true` if `ip` changed.
///
/// A success only writes when the address differs. A failure writes the
/// unresolved sentinel during the initial pass, or when the device never had
/// an address; otherwise the stale address is kept.
pub fn apply_resolution(device: &mut Device, resolution: Resolution, mode: ResolveMode) -> bool {
    let next = match resolution {
        Resolution::Resolved(ip) => NetworkAddress::Resolved(ip),
        Resolution::Failed(reason) => {
            if device.ip.is_some() && mode == ResolveMode::Periodic {
                return false;
            }
            NetworkAddress::Unresolved(reason)
        }
    };
    if device.ip == Some(next) {
        return false;
    }
    device.ip = Some(next);
    true
}
