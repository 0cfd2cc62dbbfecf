use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{error, info, warn};

use crate::net::connection::{Connection, POLL_INTERVAL};

/// Per-peer accept predicate. Returning `false` closes the socket before a
/// [`Connection`] is ever constructed.
pub type Firewall = Arc<dyn Fn(IpAddr) -> bool + Send + Sync>;

/// Transient bind failures (port still in TIME_WAIT, momentary resource
/// exhaustion) are retried before giving up; the device favors
/// availability over fast failure.
const BIND_ATTEMPTS: u32 = 5;
const BIND_RETRY_DELAY: Duration = Duration::from_millis(500);

/// A bound, listening socket.
///
/// Two modes of use, mirrored by two consuming methods:
/// - [`serve`](Listener::serve) / [`spawn`](Listener::spawn): fan-out —
///   accept forever, one spawned handler task per connection.
/// - [`accept_one`](Listener::accept_one): single-shot — produce at most
///   one connection, then stop listening (the listener is consumed, so no
///   further peer is ever accepted). Used for FTP passive data channels.
pub struct Listener {
    inner: TcpListener,
    idle_timeout: Duration,
    firewall: Option<Firewall>,
}

impl Listener {
    pub async fn bind(
        addr: &str,
        idle_timeout: Duration,
        firewall: Option<Firewall>,
    ) -> anyhow::Result<Self> {
        let mut attempt = 1;
        let inner = loop {
            match TcpListener::bind(addr).await {
                Ok(l) => break l,
                Err(e) if attempt < BIND_ATTEMPTS => {
                    warn!(addr = %addr, attempt, error = %e, "Bind failed, retrying");
                    attempt += 1;
                    sleep(BIND_RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to bind {addr}"));
                }
            }
        };
        Ok(Self {
            inner,
            idle_timeout,
            firewall,
        })
    }

    /// Single bind attempt, no retry. Used when the caller rotates through
    /// candidate ports itself (FTP passive mode).
    pub async fn bind_once(
        addr: &str,
        idle_timeout: Duration,
        firewall: Option<Firewall>,
    ) -> anyhow::Result<Self> {
        let inner = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self {
            inner,
            idle_timeout,
            firewall,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    fn allows(&self, peer: SocketAddr) -> bool {
        match &self.firewall {
            Some(allow) => allow(peer.ip()),
            None => true,
        }
    }

    /// Fan-out accept loop: every allowed peer gets its own handler task.
    /// Runs until the accept socket fails fatally.
    pub async fn serve<F, Fut>(self, handler: F) -> anyhow::Result<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        loop {
            let (socket, peer) = self.inner.accept().await?;
            if !self.allows(peer) {
                info!(peer = %peer, "Connection rejected by firewall");
                drop(socket);
                continue;
            }
            info!(peer = %peer, "Accepted connection");
            let conn = Connection::new(socket, peer, self.idle_timeout);
            tokio::spawn(handler(conn));
        }
    }

    /// Runs the fan-out loop as an owned task. The returned handle is the
    /// teardown point: the accept loop cannot outlive it.
    pub fn spawn<F, Fut>(self, handler: F) -> ListenerHandle
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            if let Err(e) = self.serve(handler).await {
                error!(error = %e, "Accept loop failed");
            }
        });
        ListenerHandle { task }
    }

    /// Single-shot mode: waits up to `wait` for one allowed peer and
    /// returns its connection, or `None` on timeout. Consumes the
    /// listener, so at most one connection is ever produced.
    pub async fn accept_one(self, wait: Duration) -> Option<Connection> {
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match timeout(remaining, self.inner.accept()).await {
                Ok(Ok((socket, peer))) => {
                    if !self.allows(peer) {
                        info!(peer = %peer, "Connection rejected by firewall");
                        drop(socket);
                        continue;
                    }
                    return Some(Connection::new(socket, peer, self.idle_timeout));
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Accept failed");
                    sleep(POLL_INTERVAL).await;
                }
                Err(_) => return None,
            }
        }
    }
}

/// Owned handle to a running accept loop. Dropping the handle detaches the
/// loop; call [`shutdown`](ListenerHandle::shutdown) to stop it and wait
/// for it to exit before its resources are reused.
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}
