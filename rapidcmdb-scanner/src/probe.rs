//! TCP reachability pre-filter.
//!
//! Most scanned addresses are silent; a short parallel connect probe across
//! a handful of well-known ports rules them out far cheaper than waiting
//! out the SNMP timeout budget.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::timeout;

/// Result of probing one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// At least one port completed a TCP handshake.
    pub reachable: bool,
    /// Errors that were neither refusals, unreachables nor timeouts.
    pub anomalies: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortResult {
    Open,
    Closed,
    Anomaly,
}

/// Probe a host on the given ports in parallel.
///
/// Returns as soon as any port accepts a connection; the remaining
/// attempts are aborted and their sockets closed. An empty port list
/// disables the probe and reports the host reachable.
pub async fn probe_host(address: IpAddr, ports: &[u16], connect_timeout: Duration) -> ProbeOutcome {
    if ports.is_empty() {
        return ProbeOutcome {
            reachable: true,
            anomalies: 0,
        };
    }

    let mut attempts = JoinSet::new();
    for port in ports {
        let target = SocketAddr::new(address, *port);
        attempts.spawn(async move { probe_port(target, connect_timeout).await });
    }

    let mut anomalies = 0;
    while let Some(joined) = attempts.join_next().await {
        match joined {
            Ok(PortResult::Open) => {
                attempts.abort_all();
                return ProbeOutcome {
                    reachable: true,
                    anomalies,
                };
            }
            Ok(PortResult::Closed) => {}
            Ok(PortResult::Anomaly) => anomalies += 1,
            // Aborted or panicked probe tasks count as not reachable.
            Err(_) => {}
        }
    }

    ProbeOutcome {
        reachable: false,
        anomalies,
    }
}

async fn probe_port(target: SocketAddr, connect_timeout: Duration) -> PortResult {
    match timeout(connect_timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            PortResult::Open
        }
        Ok(Err(e)) => match e.kind() {
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::HostUnreachable
            | std::io::ErrorKind::NetworkUnreachable
            | std::io::ErrorKind::TimedOut => PortResult::Closed,
            _ => {
                tracing::debug!(target = %target, error = %e, "Unexpected probe error");
                PortResult::Anomaly
            }
        },
        Err(_) => PortResult::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_empty_port_list_is_reachable() {
        let outcome = probe_host(
            "127.0.0.1".parse().unwrap(),
            &[],
            Duration::from_millis(100),
        )
        .await;
        assert!(outcome.reachable);
    }

    #[tokio::test]
    async fn test_open_port_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let outcome = probe_host(
            "127.0.0.1".parse().unwrap(),
            &[port],
            Duration::from_secs(2),
        )
        .await;
        assert!(outcome.reachable);
    }

    #[tokio::test]
    async fn test_closed_port_is_not_reachable() {
        // Bind then drop to find a port nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let outcome = probe_host(
            "127.0.0.1".parse().unwrap(),
            &[port],
            Duration::from_secs(2),
        )
        .await;
        assert!(!outcome.reachable);
    }

    #[tokio::test]
    async fn test_one_open_port_among_closed_wins() {
        let open = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = open.local_addr().unwrap().port();

        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed_port = closed.local_addr().unwrap().port();
        drop(closed);

        let outcome = probe_host(
            "127.0.0.1".parse().unwrap(),
            &[closed_port, open_port],
            Duration::from_secs(2),
        )
        .await;
        assert!(outcome.reachable);
    }
}
