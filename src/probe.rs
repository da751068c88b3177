//! Port availability checks.

use crate::node::Node;
use std::time::Duration;
use tokio::net::TcpStream;

/// Idle timeout used by [`probe_port`].
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortStatus {
    pub free: bool,
}

/// Check whether something is accepting connections on `host:port`.
///
/// A refused or failed connection means the port is free. A successful connection,
/// or one that neither succeeds nor fails within `idle_timeout`, means it is taken.
/// The transient connection is closed before returning.
pub async fn probe(port: u16, host: &str, idle_timeout: Duration) -> PortStatus {
    let free = match tokio::time::timeout(idle_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            false
        }
        Ok(Err(_)) => true,
        Err(_) => false,
    };
    PortStatus { free }
}

pub async fn probe_port(port: u16, host: &str) -> bool {
    probe(port, host, DEFAULT_PROBE_TIMEOUT).await.free
}

/// Ask the OS for a port nobody is listening on.
pub fn find_free_port() -> Option<u16> {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .ok()
}

impl Node {
    /// [`probe`] with this node's configured timeout, logged.
    pub async fn probe_port(&self, port: u16, host: &str) -> bool {
        let status = probe(port, host, self.options().probe_timeout).await;
        self.logger().port_probe(host, port, status.free);
        status.free
    }
}
