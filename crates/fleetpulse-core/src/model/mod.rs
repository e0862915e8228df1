// ── Domain model ──

pub mod device;

pub use device::{Device, DeviceStatus, DisplayStatus, NetworkAddress, UnresolvedReason};
