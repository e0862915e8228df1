// fleetpulse-api: Async client for the device backend and reachability probing

pub mod backend;
pub mod error;
pub mod probe;
pub mod transport;

pub use backend::{BackendClient, RebootResponse, ResolveResponse, UpstreamDevice};
pub use error::Error;
pub use probe::{ProbeReport, TcpProber};
pub use transport::{TlsMode, TransportConfig};
