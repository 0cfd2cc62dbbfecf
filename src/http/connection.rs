use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, info, warn};

use crate::ftp::paths;
use crate::http::handler::{RequestHandler, WsHandler};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::{handshake, mime};
use crate::net::Connection;
use crate::store::FileStore;
use crate::ws::WebSocket;

/// Upper bound on one request's header section.
const MAX_REQUEST: usize = 8192;

/// Chunk size for streaming static files; keeps memory bounded no matter
/// the file size.
const FILE_CHUNK: usize = 2048;

/// The per-socket request pipeline.
///
/// Reads pipelined requests off one [`Connection`], dispatching each to
/// WebSocket upgrade, the request handler, static file serving, or 404,
/// and loops while the client holds keep-alive.
pub struct HttpConnection<H, W, S> {
    conn: Connection,
    buffer: BytesMut,
    handler: Arc<H>,
    ws_handler: Arc<W>,
    store: Option<Arc<S>>,
    ws_timeout: Duration,
}

impl<H, W, S> HttpConnection<H, W, S>
where
    H: RequestHandler,
    W: WsHandler,
    S: FileStore,
{
    pub fn new(
        conn: Connection,
        handler: Arc<H>,
        ws_handler: Arc<W>,
        store: Option<Arc<S>>,
        ws_timeout: Duration,
    ) -> Self {
        Self {
            conn,
            buffer: BytesMut::with_capacity(1024),
            handler,
            ws_handler,
            store,
            ws_timeout,
        }
    }

    pub async fn run(mut self) {
        loop {
            let Some(head) = self.read_head().await else {
                self.conn.close().await;
                return;
            };
            let req = Request::new(head);
            debug!(peer = %self.conn.peer_addr(), method = %req.method(), path = %req.path(), "Request");

            // An upgraded socket never returns to HTTP.
            if req.is_websocket_upgrade() {
                self.upgrade(&req).await;
                return;
            }

            let keep_alive = req.keep_alive();
            let mut resp = Response::new();
            self.handler.handle(&req, &mut resp);

            let sent = if !resp.body().is_empty() {
                if !resp.has_header("Content-Type") {
                    resp.header("Content-Type", mime::sniff(resp.body()));
                }
                self.send_response(&resp).await
            } else if let Some(store) = self.store.clone() {
                self.serve_file(&store, req.path()).await
            } else {
                self.send_response(&Response::not_found()).await
            };

            if !sent || !keep_alive {
                self.conn.close().await;
                return;
            }
            // Loop: any surplus bytes of the next pipelined request are
            // still in the buffer.
        }
    }

    /// Accumulates bytes until the `\r\n\r\n` terminator and returns the
    /// header section, leaving surplus bytes buffered for the next
    /// request. `None` on timeout, close, or an oversized request.
    async fn read_head(&mut self) -> Option<String> {
        loop {
            if let Some(pos) = find_headers_end(&self.buffer) {
                let head = self.buffer.split_to(pos + 4);
                return Some(String::from_utf8_lossy(&head).into_owned());
            }
            if self.buffer.len() >= MAX_REQUEST {
                warn!(peer = %self.conn.peer_addr(), "Request header section too large");
                return None;
            }
            let mut tmp = [0u8; 1024];
            let n = self.conn.recv(&mut tmp).await;
            if n == 0 {
                return None;
            }
            self.buffer.extend_from_slice(&tmp[..n]);
        }
    }

    async fn upgrade(mut self, req: &Request) {
        let Some(key) = req.field("Sec-WebSocket-Key") else {
            warn!(peer = %self.conn.peer_addr(), "Upgrade request without Sec-WebSocket-Key");
            let _ = self.conn.send(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            self.conn.close().await;
            return;
        };
        let response = handshake::upgrade_response(key);
        if self.conn.send(response.as_bytes()).await != response.len() {
            self.conn.close().await;
            return;
        }
        info!(peer = %self.conn.peer_addr(), "WebSocket upgrade complete");
        self.conn.set_idle_timeout(self.ws_timeout);
        // A client may pipeline its first frame behind the handshake;
        // whatever followed the request head belongs to the session.
        let surplus = std::mem::take(&mut self.buffer);
        self.ws_handler
            .handle(WebSocket::with_buffered(self.conn, surplus.to_vec()))
            .await;
    }

    async fn send_response(&mut self, resp: &Response) -> bool {
        let bytes = resp.serialize();
        self.conn.send(&bytes).await == bytes.len()
    }

    /// Streams a file under the static root in bounded chunks.
    async fn serve_file(&mut self, store: &Arc<S>, path: &str) -> bool {
        let clean = path.split('?').next().unwrap_or("/");
        let clean = if clean.ends_with('/') {
            format!("{clean}index.html")
        } else {
            clean.to_string()
        };
        let Some(resolved) = paths::resolve("/", &clean) else {
            return self.send_response(&Response::not_found()).await;
        };

        match store.stat(&resolved).await {
            Some(meta) if !meta.is_dir => {
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
                    mime::from_extension(&resolved),
                    meta.len
                );
                if self.conn.send(head.as_bytes()).await != head.len() {
                    return false;
                }
                let mut offset = 0u64;
                let mut chunk = [0u8; FILE_CHUNK];
                while offset < meta.len {
                    match store.read_at(&resolved, offset, &mut chunk).await {
                        Ok(0) | Err(_) => return false,
                        Ok(n) => {
                            if self.conn.send(&chunk[..n]).await != n {
                                return false;
                            }
                            offset += n as u64;
                        }
                    }
                }
                true
            }
            _ => {
                debug!(path = %resolved, "No such static file");
                self.send_response(&Response::not_found()).await
            }
        }
    }
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
