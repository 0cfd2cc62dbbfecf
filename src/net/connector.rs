use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::net::connection::Connection;

/// Initiates an outbound TCP connection.
///
/// Returns `None` when the connect fails or does not complete within
/// `connect_timeout`; the caller reports the connect failure. The produced
/// [`Connection`] carries `idle_timeout` for all subsequent I/O.
pub async fn connect(
    addr: SocketAddr,
    connect_timeout: Duration,
    idle_timeout: Duration,
) -> Option<Connection> {
    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Some(Connection::new(stream, addr, idle_timeout)),
        Ok(Err(e)) => {
            debug!(addr = %addr, error = %e, "Connect failed");
            None
        }
        Err(_) => {
            debug!(addr = %addr, "Connect timed out");
            None
        }
    }
}
