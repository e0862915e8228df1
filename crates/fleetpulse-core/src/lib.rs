//! Device monitoring and reboot orchestration between `fleetpulse-api` and
//! the CLI.
//!
//! This crate owns the business logic, domain model, and reactive data
//! infrastructure of the fleetpulse workspace:
//!
//! - **[`Monitor`]**: Central facade managing the full lifecycle:
//!   [`start()`](Monitor::start) loads the inventory, resolves addresses,
//!   then spawns the probe, reconcile and resolve tasks.
//!   [`Monitor::oneshot()`](Monitor::oneshot) provides a lightweight mode for
//!   single CLI invocations. [`Monitor::initiate()`](Monitor::initiate)
//!   drives reboots.
//!
//! - **[`DeviceRegistry`]**: Concurrent reactive storage (`DashMap` +
//!   `tokio::sync::watch`). Merges backend inventory field by field, never
//!   touching locally owned reboot state.
//!
//! - **[`reboot`]**: The reboot state machine as an explicit transition
//!   table, with per-family [`ThresholdPolicy`].
//!
//! - **[`DeviceStream`]**: Subscription handle vended by the registry.
//!   Exposes `current()` / `latest()` / `changed()` for live rendering.
//!
//! - **[`source`]**: `async_trait` seams to the backend and the prober, so
//!   orchestration can be exercised against in-memory fakes.

pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod monitor;
pub mod probe;
pub mod reboot;
pub mod resolve;
pub mod source;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DEFAULT_BACKEND_URL, MonitorConfig, Schedule, TlsVerification};
pub use error::CoreError;
pub use event::MonitorEvent;
pub use monitor::{Monitor, MonitorState, RebootTicket};
pub use probe::{ProbeEffect, apply_probe};
pub use reboot::{ProbeOutcome, RebootPhase, RebootThresholds, Step, ThresholdPolicy};
pub use resolve::{ResolveMode, Resolution, apply_resolution};
pub use source::{
    AddressResolver, DeviceSource, ReachabilityProbe, RebootExecutor, RebootReceipt, Services,
};
pub use store::{DeviceRegistry, MergeReport};
pub use stream::{DeviceFilter, DeviceStream};

pub use model::{Device, DeviceStatus, DisplayStatus, NetworkAddress, UnresolvedReason};

// Wire type consumers need to implement `DeviceSource`.
pub use fleetpulse_api::UpstreamDevice;
