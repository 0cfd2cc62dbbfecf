use std::sync::Arc;

use tracing::info;

use crate::config::HttpConfig;
use crate::http::connection::HttpConnection;
use crate::http::handler::{RequestHandler, WsHandler};
use crate::net::{Firewall, Listener};
use crate::store::FileStore;

/// The HTTP listener: binds the configured address and runs one
/// [`HttpConnection`] pipeline per accepted socket.
pub struct HttpServer<H, W, S> {
    cfg: HttpConfig,
    handler: Arc<H>,
    ws_handler: Arc<W>,
    store: Option<Arc<S>>,
    firewall: Option<Firewall>,
}

impl<H, W, S> HttpServer<H, W, S>
where
    H: RequestHandler,
    W: WsHandler,
    S: FileStore,
{
    pub fn new(cfg: HttpConfig, handler: H, ws_handler: W, store: Option<Arc<S>>) -> Self {
        Self {
            cfg,
            handler: Arc::new(handler),
            ws_handler: Arc::new(ws_handler),
            store,
            firewall: None,
        }
    }

    pub fn with_firewall(mut self, firewall: Firewall) -> Self {
        self.firewall = Some(firewall);
        self
    }

    /// Binds the configured address. Split from [`serve`](Self::serve) so
    /// callers can learn the actual port before accepting.
    pub async fn bind(&self) -> anyhow::Result<Listener> {
        let listener = Listener::bind(
            &self.cfg.listen_addr,
            self.cfg.idle_timeout(),
            self.firewall.clone(),
        )
        .await?;
        info!("HTTP listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Fan-out accept loop: one request pipeline per accepted socket.
    pub async fn serve(self, listener: Listener) -> anyhow::Result<()> {
        let ws_timeout = self.cfg.ws_timeout();
        let handler = self.handler;
        let ws_handler = self.ws_handler;
        let store = self.store;
        listener
            .serve(move |conn| {
                let pipeline = HttpConnection::new(
                    conn,
                    handler.clone(),
                    ws_handler.clone(),
                    store.clone(),
                    ws_timeout,
                );
                pipeline.run()
            })
            .await
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }
}
