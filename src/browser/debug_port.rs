//! Remote-debugging port probing.
//!
//! The debug endpoint itself is served by the embedded engine; all the host
//! does is make sure a fixed port is free before handing it over, and give
//! a lingering previous process a bounded window to release it.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{info, warn};

pub const PORT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_PORT_WAIT_MS: i64 = 3000;
pub const MAX_PORT_WAIT_MS: i64 = 60_000;

pub fn clamp_wait_timeout(timeout_ms: i64) -> Duration {
    Duration::from_millis(timeout_ms.clamp(0, MAX_PORT_WAIT_MS) as u64)
}

/// True if `port` can be bound on 127.0.0.1 right now. Port 0 is always
/// available (the engine picks one).
pub fn can_bind_local_port(port: u16) -> bool {
    if port == 0 {
        return true;
    }

    match TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)) {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(e) => {
            if !matches!(e.kind(), ErrorKind::AddrInUse | ErrorKind::PermissionDenied) {
                warn!("Unexpected error probing port {}: {}", port, e);
            }
            false
        }
    }
}

/// Polls every 100 ms until `port` is free or `timeout` passes, then checks
/// one last time.
pub async fn wait_for_port_availability(port: u16, timeout: Duration) -> bool {
    if port == 0 || can_bind_local_port(port) {
        return true;
    }
    if timeout.is_zero() {
        return false;
    }

    info!(
        "Remote debugging port {} is busy; waiting up to {} ms for release",
        port,
        timeout.as_millis()
    );

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        time::sleep(PORT_POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now()))).await;
        if can_bind_local_port(port) {
            info!("Remote debugging port {} is now free", port);
            return true;
        }
    }

    can_bind_local_port(port)
}
