use wharf::auth::SingleUser;
use wharf::config::Config;
use wharf::ftp::FtpServer;
use wharf::http::{HttpServer, Request, RequestHandler, Response, WsHandler};
use wharf::store::DiskStore;
use wharf::ws::WebSocket;

/// Dynamic content: a single status endpoint. Everything else falls
/// through to static file serving.
struct StatusPage;

impl RequestHandler for StatusPage {
    fn handle(&self, req: &Request, resp: &mut Response) {
        if req.path() == "/status" {
            resp.header("Content-Type", "application/json");
            resp.set_body(r#"{"service":"wharf","status":"up"}"#);
        }
    }
}

/// Echoes text messages back until the peer closes.
struct EchoWs;

impl WsHandler for EchoWs {
    async fn handle(&self, mut socket: WebSocket) {
        while let Some(text) = socket.read_text().await {
            if !socket.send_text(&text).await {
                break;
            }
        }
        socket.close().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load();

    let store = DiskStore::new(cfg.http.static_root.clone());
    // An empty static root disables file serving; handler-less paths 404.
    let web_root = (!cfg.http.static_root.is_empty()).then(|| store.clone());
    let http = HttpServer::new(cfg.http.clone(), StatusPage, EchoWs, web_root);

    let auth = SingleUser {
        user: cfg.ftp.user.clone(),
        password: cfg.ftp.password.clone(),
        home: cfg.ftp.home_dir.clone(),
    };
    let ftp = FtpServer::new(cfg.ftp.clone(), store, auth);

    tokio::select! {
        res = http.run() => {
            res?;
        }
        res = ftp.run() => {
            res?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
