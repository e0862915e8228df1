// TCP reachability probe
//
// A device counts as reachable when any of its management ports accepts a
// TCP connection. Ports are tried in order; the first success wins. With an
// overall budget, each attempt gets an equal share of what is left, capped
// at the per-port connect timeout.

use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tracing::trace;

/// Result of a single reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub reachable: bool,
    /// Port that accepted the connection.
    pub port: Option<u16>,
    /// Time from the first attempt until the successful connect.
    pub latency: Option<Duration>,
}

impl ProbeReport {
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            port: None,
            latency: None,
        }
    }
}

/// Probes devices by opening a TCP connection to a list of ports.
#[derive(Debug, Clone)]
pub struct TcpProber {
    ports: Vec<u16>,
    connect_timeout: Duration,
    budget: Option<Duration>,
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new(vec![80, 443], Duration::from_secs(3))
    }
}

impl TcpProber {
    pub fn new(ports: Vec<u16>, connect_timeout: Duration) -> Self {
        Self {
            ports,
            connect_timeout,
            budget: None,
        }
    }

    /// Bound the whole probe, all ports included.
    #[must_use]
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// Probe `host`. Never fails: connect errors and timeouts are folded
    /// into an unreachable report.
    pub async fn probe(&self, host: &str) -> ProbeReport {
        let started = Instant::now();
        for (i, &port) in self.ports.iter().enumerate() {
            let limit = match self.budget {
                Some(budget) => attempt_timeout(
                    self.connect_timeout,
                    budget.saturating_sub(started.elapsed()),
                    self.ports.len() - i,
                ),
                None => self.connect_timeout,
            };
            if limit.is_zero() {
                trace!(host, port, "probe budget spent");
                break;
            }
            let attempt = tokio::time::timeout(limit, TcpStream::connect((host, port))).await;
            match attempt {
                Ok(Ok(_stream)) => {
                    let latency = started.elapsed();
                    trace!(host, port, ?latency, "probe connected");
                    return ProbeReport {
                        reachable: true,
                        port: Some(port),
                        latency: Some(latency),
                    };
                }
                Ok(Err(e)) => trace!(host, port, error = %e, "probe connect failed"),
                Err(_) => trace!(host, port, "probe connect timed out"),
            }
        }
        ProbeReport::unreachable()
    }
}

/// Share of the remaining budget for the next attempt, with `ports_left`
/// attempts still to run.
fn attempt_timeout(connect_timeout: Duration, remaining: Duration, ports_left: usize) -> Duration {
    let share = remaining / u32::try_from(ports_left.max(1)).unwrap_or(u32::MAX);
    share.min(connect_timeout)
}
