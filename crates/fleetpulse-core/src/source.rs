// ── Collaborator seams ──
//
// The monitor talks to the outside world through four narrow traits. The
// production implementations wrap `BackendClient` and `TcpProber`; tests
// substitute in-memory fakes.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use fleetpulse_api::{BackendClient, TcpProber, UpstreamDevice};
use tracing::debug;

use crate::error::CoreError;
use crate::model::Device;
use crate::reboot::ProbeOutcome;

/// What the executor reported for an accepted reboot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebootReceipt {
    pub message: Option<String>,
    /// Diagnostic output of the remote action.
    pub output: Option<String>,
}

/// Canonical device inventory.
#[async_trait]
pub trait DeviceSource: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<UpstreamDevice>, CoreError>;
}

/// Logical address to network address.
///
/// A failed lookup must be reported as `CoreError::ResolutionFailed`; any
/// other error means the resolver itself was not reachable.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<IpAddr, CoreError>;
}

/// Reachability check. Never fails; problems are an unreachable outcome.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self, device: &Device) -> ProbeOutcome;
}

/// Delivers a reboot command.
///
/// `Ok` means the command was accepted by the device. A refusal is
/// `CoreError::RebootRejected`.
#[async_trait]
pub trait RebootExecutor: Send + Sync {
    async fn reboot(&self, address: &str) -> Result<RebootReceipt, CoreError>;
}

/// The collaborators a `Monitor` runs against.
#[derive(Clone)]
pub struct Services {
    pub source: Arc<dyn DeviceSource>,
    pub resolver: Arc<dyn AddressResolver>,
    pub prober: Arc<dyn ReachabilityProbe>,
    pub executor: Arc<dyn RebootExecutor>,
}

impl Services {
    /// Backend for inventory, resolution and reboots; TCP for reachability.
    pub fn from_backend(backend: BackendClient, prober: TcpProber) -> Self {
        let backend = Arc::new(backend);
        Self {
            source: backend.clone(),
            resolver: backend.clone(),
            prober: Arc::new(prober),
            executor: backend,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

// ── Production implementations ───────────────────────────────────

#[async_trait]
impl DeviceSource for BackendClient {
    async fn list_devices(&self) -> Result<Vec<UpstreamDevice>, CoreError> {
        Ok(BackendClient::list_devices(self).await?)
    }
}

#[async_trait]
impl AddressResolver for BackendClient {
    async fn resolve(&self, address: &str) -> Result<IpAddr, CoreError> {
        let resp = match BackendClient::resolve(self, address).await {
            Ok(resp) => resp,
            // A bare 404 is the resolver saying the name has no address.
            Err(e) if e.is_not_found() => {
                return Err(CoreError::ResolutionFailed {
                    address: address.to_owned(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if !resp.success {
            return Err(CoreError::ResolutionFailed {
                address: address.to_owned(),
                reason: resp.failure_reason(),
            });
        }
        let raw = resp.address.unwrap_or_default();
        raw.parse().map_err(|_| CoreError::ResolutionFailed {
            address: address.to_owned(),
            reason: format!("resolver returned an invalid address: {raw:?}"),
        })
    }
}

#[async_trait]
impl RebootExecutor for BackendClient {
    async fn reboot(&self, address: &str) -> Result<RebootReceipt, CoreError> {
        let resp = BackendClient::reboot(self, address).await?;
        if resp.success {
            Ok(RebootReceipt {
                message: resp.message,
                output: resp.output,
            })
        } else {
            Err(CoreError::RebootRejected {
                address: address.to_owned(),
                message: resp
                    .error
                    .or(resp.message)
                    .unwrap_or_else(|| "reboot failed".into()),
            })
        }
    }
}

#[async_trait]
impl ReachabilityProbe for TcpProber {
    async fn probe(&self, device: &Device) -> ProbeOutcome {
        let report = TcpProber::probe(self, &device.address).await;
        debug!(address = %device.address, reachable = report.reachable, port = ?report.port, "probe");
        report.into()
    }
}
