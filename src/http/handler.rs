use crate::http::request::Request;
use crate::http::response::Response;
use crate::ws::WebSocket;

/// Application hook for dynamic content.
///
/// The handler inspects the raw request and fills in the response. Leaving
/// the body empty falls through to static file serving (when configured)
/// and then to 404.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, req: &Request, resp: &mut Response);
}

/// Application hook for upgraded WebSocket connections. The handler owns
/// the socket for the remainder of its lifetime; no further HTTP requests
/// follow on it.
pub trait WsHandler: Send + Sync + 'static {
    fn handle(&self, socket: WebSocket) -> impl Future<Output = ()> + Send;
}

/// WsHandler for servers without a WebSocket feature: upgraded sockets are
/// closed immediately.
pub struct NoUpgrade;

impl WsHandler for NoUpgrade {
    async fn handle(&self, mut socket: WebSocket) {
        socket.close().await;
    }
}
