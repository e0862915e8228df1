#![allow(clippy::unwrap_used)]
// Integration tests for `TcpProber` against local listeners.

use std::time::Duration;

use tokio::net::TcpListener;

use fleetpulse_api::TcpProber;

/// Bind and immediately drop a listener to get a port nothing listens on.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_open_port_is_reachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let prober = TcpProber::new(vec![port], Duration::from_secs(1));
    let report = prober.probe("127.0.0.1").await;

    assert!(report.reachable);
    assert_eq!(report.port, Some(port));
    assert!(report.latency.is_some());
}

#[tokio::test]
async fn test_falls_through_to_second_port() {
    let closed = closed_port().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().port();

    let prober = TcpProber::new(vec![closed, open], Duration::from_secs(1));
    let report = prober.probe("127.0.0.1").await;

    assert!(report.reachable);
    assert_eq!(report.port, Some(open));
}

#[tokio::test]
async fn test_closed_ports_are_unreachable() {
    let closed = closed_port().await;

    let prober = TcpProber::new(vec![closed], Duration::from_millis(500));
    let report = prober.probe("127.0.0.1").await;

    assert!(!report.reachable);
    assert!(report.port.is_none());
    assert!(report.latency.is_none());
}

#[tokio::test]
async fn test_unknown_host_is_unreachable() {
    let prober = TcpProber::new(vec![80], Duration::from_millis(500));
    let report = prober.probe("does-not-exist.invalid").await;
    assert!(!report.reachable);
}

#[tokio::test]
async fn test_budget_carries_over_refused_port() {
    let closed = closed_port().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().port();

    let prober = TcpProber::new(vec![closed, open], Duration::from_secs(3))
        .with_budget(Duration::from_millis(3500));
    let report = prober.probe("127.0.0.1").await;

    assert!(report.reachable);
    assert_eq!(report.port, Some(open));
}

#[tokio::test]
async fn test_spent_budget_skips_connecting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let prober = TcpProber::new(vec![port], Duration::from_secs(1)).with_budget(Duration::ZERO);
    let report = prober.probe("127.0.0.1").await;

    assert!(!report.reachable);
}
