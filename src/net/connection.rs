use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tracing::debug;

/// How long one poll iteration waits before re-checking timeouts and the
/// close flag. Every "blocking" loop in the stack yields at this cadence.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Largest chunk handed to the socket in a single write. Roughly one
/// Ethernet MTU of TCP payload, so a slow peer never stalls us on a huge
/// buffered write.
const SEND_CHUNK: usize = 1460;

/// Result of a non-consuming readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Nothing buffered yet; the connection is still healthy.
    NoData,
    /// At least one byte can be read without blocking.
    DataAvailable,
    /// The peer closed, an I/O error occurred, or the idle timeout fired.
    ClosedOrError,
}

/// Cross-task close request for a [`Connection`].
///
/// Setting the flag does not touch the socket; the owning task observes it
/// on its next poll iteration, returns 0 from the in-flight `recv`/`send`,
/// and the socket is shut down exactly once by the owner.
#[derive(Clone)]
pub struct CloseSignal(Arc<AtomicBool>);

impl CloseSignal {
    pub fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One established socket with timeout-aware, non-throwing I/O.
///
/// `recv` and `send` never return errors: all failures (peer close, I/O
/// error, idle timeout) surface as a 0 / short byte count after the
/// connection has closed itself. The idle timeout is measured from the
/// last successful I/O; `Duration::ZERO` means "never time out".
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    idle_timeout: Duration,
    last_activity: Instant,
    closed: Arc<AtomicBool>,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, idle_timeout: Duration) -> Self {
        Self {
            stream,
            peer,
            idle_timeout,
            last_activity: Instant::now(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Local address, resolved lazily (an outbound socket may not be bound
    /// at construction time).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.stream.local_addr().ok()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Replaces the idle timeout, e.g. after a WebSocket upgrade or for a
    /// data-transfer connection governed by a higher-level policy.
    pub fn set_idle_timeout(&mut self, idle_timeout: Duration) {
        self.idle_timeout = idle_timeout;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Handle for requesting close from another task.
    pub fn close_signal(&self) -> CloseSignal {
        CloseSignal(Arc::clone(&self.closed))
    }

    /// Whether the idle timeout has elapsed since the last successful I/O.
    /// Protocol layers use this to tell a timeout apart from a peer error
    /// after a close.
    pub fn idle_expired(&self) -> bool {
        self.idle_timeout != Duration::ZERO && self.last_activity.elapsed() >= self.idle_timeout
    }

    /// Reads into `buf`, polling at [`POLL_INTERVAL`] until data arrives,
    /// the idle timeout elapses, or the connection closes. Returns the
    /// number of bytes read; 0 means closed (orderly, error, or timeout).
    pub async fn recv(&mut self, buf: &mut [u8]) -> usize {
        loop {
            if self.is_closed() {
                return 0;
            }
            match timeout(POLL_INTERVAL, self.stream.read(buf)).await {
                Ok(Ok(0)) => {
                    self.close().await;
                    return 0;
                }
                Ok(Ok(n)) => {
                    self.last_activity = Instant::now();
                    return n;
                }
                Ok(Err(e)) => {
                    debug!(peer = %self.peer, error = %e, "Receive failed");
                    self.close().await;
                    return 0;
                }
                Err(_) => {
                    if self.idle_expired() {
                        debug!(peer = %self.peer, "Connection idle timeout");
                        self.close().await;
                        return 0;
                    }
                }
            }
        }
    }

    /// Writes all of `buf` in bounded chunks. Returns the number of bytes
    /// actually written; short counts indicate the connection closed or
    /// timed out mid-send.
    pub async fn send(&mut self, buf: &[u8]) -> usize {
        let mut sent = 0;
        while sent < buf.len() {
            if self.is_closed() {
                return sent;
            }
            let end = (sent + SEND_CHUNK).min(buf.len());
            match timeout(POLL_INTERVAL, self.stream.write(&buf[sent..end])).await {
                Ok(Ok(0)) => {
                    self.close().await;
                    return sent;
                }
                Ok(Ok(n)) => {
                    sent += n;
                    self.last_activity = Instant::now();
                }
                Ok(Err(e)) => {
                    debug!(peer = %self.peer, error = %e, "Send failed");
                    self.close().await;
                    return sent;
                }
                Err(_) => {
                    if self.idle_expired() {
                        debug!(peer = %self.peer, "Send timed out");
                        self.close().await;
                        return sent;
                    }
                }
            }
        }
        sent
    }

    /// Non-consuming probe: distinguishes "nothing yet" from "broken"
    /// without taking bytes out of the stream.
    pub async fn readiness(&mut self) -> Readiness {
        if self.is_closed() {
            return Readiness::ClosedOrError;
        }
        let mut probe = [0u8; 1];
        match timeout(POLL_INTERVAL, self.stream.peek(&mut probe)).await {
            Ok(Ok(0)) => {
                self.close().await;
                Readiness::ClosedOrError
            }
            Ok(Ok(_)) => Readiness::DataAvailable,
            Ok(Err(e)) => {
                debug!(peer = %self.peer, error = %e, "Peek failed");
                self.close().await;
                Readiness::ClosedOrError
            }
            Err(_) => {
                if self.idle_expired() {
                    self.close().await;
                    Readiness::ClosedOrError
                } else {
                    Readiness::NoData
                }
            }
        }
    }

    /// Idempotent close. The first call shuts the socket down; later calls
    /// (or a close already requested through a [`CloseSignal`]) are no-ops.
    pub async fn close(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.stream.shutdown().await;
        }
    }
}
