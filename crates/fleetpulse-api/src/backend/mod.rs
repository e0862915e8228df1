// Device backend API
//
// The backend is the upstream source of truth for the device list and the
// gateway to the resolver and reboot executor.

mod client;
mod models;

pub use client::BackendClient;
pub use models::{RebootResponse, ResolveResponse, UpstreamDevice};
