use std::sync::{Arc, Mutex};

use tracing::info;

use crate::auth::Authenticator;
use crate::config::FtpConfig;
use crate::ftp::session::Session;
use crate::net::{Firewall, Listener};
use crate::store::FileStore;

/// Rotating passive-mode port counter, shared by all sessions of one
/// server. Rotation avoids immediate reuse of a port still in TIME_WAIT.
/// The lock is held only to increment, never across I/O.
#[derive(Clone)]
pub struct PassivePorts {
    min: u16,
    max: u16,
    next: Arc<Mutex<u16>>,
}

impl PassivePorts {
    pub fn new(min: u16, max: u16) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            next: Arc::new(Mutex::new(min)),
        }
    }

    pub fn next_port(&self) -> u16 {
        let mut slot = self.next.lock().unwrap_or_else(|e| e.into_inner());
        let port = *slot;
        *slot = if port >= self.max { self.min } else { port + 1 };
        port
    }

    /// Number of distinct ports in the range; bounds bind retries.
    pub fn span(&self) -> usize {
        (self.max - self.min) as usize + 1
    }
}

/// The FTP control listener: one [`Session`] task per accepted control
/// connection. Owns the passive-port rotation state and injects it into
/// every session.
pub struct FtpServer<S, A> {
    cfg: FtpConfig,
    store: Arc<S>,
    auth: Arc<A>,
    passive: PassivePorts,
    firewall: Option<Firewall>,
}

impl<S, A> FtpServer<S, A>
where
    S: FileStore,
    A: Authenticator,
{
    pub fn new(cfg: FtpConfig, store: Arc<S>, auth: A) -> Self {
        let passive = PassivePorts::new(cfg.passive_port_min, cfg.passive_port_max);
        Self {
            cfg,
            store,
            auth: Arc::new(auth),
            passive,
            firewall: None,
        }
    }

    pub fn with_firewall(mut self, firewall: Firewall) -> Self {
        self.firewall = Some(firewall);
        self
    }

    pub async fn bind(&self) -> anyhow::Result<Listener> {
        let listener = Listener::bind(
            &self.cfg.listen_addr,
            self.cfg.idle_timeout(),
            self.firewall.clone(),
        )
        .await?;
        info!("FTP listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    pub async fn serve(self, listener: Listener) -> anyhow::Result<()> {
        let store = self.store;
        let auth = self.auth;
        let passive = self.passive;
        listener
            .serve(move |conn| {
                let session = Session::new(conn, store.clone(), auth.clone(), passive.clone());
                session.run()
            })
            .await
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passive_ports_rotate_and_wrap() {
        let ports = PassivePorts::new(4000, 4002);
        assert_eq!(ports.next_port(), 4000);
        assert_eq!(ports.next_port(), 4001);
        assert_eq!(ports.next_port(), 4002);
        assert_eq!(ports.next_port(), 4000);
        assert_eq!(ports.span(), 3);
    }
}
