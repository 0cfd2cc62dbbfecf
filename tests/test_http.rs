use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use wharf::config::HttpConfig;
use wharf::http::{HttpServer, NoUpgrade, Request, RequestHandler, Response};
use wharf::store::MemStore;

struct TestHandler;

impl RequestHandler for TestHandler {
    fn handle(&self, req: &Request, resp: &mut Response) {
        match req.path() {
            "/status" => resp.set_body("{\"state\": \"up\"}"),
            "/fail" => {
                resp.set_status("500 Internal Server Error");
                resp.set_body("boom");
            }
            _ => {}
        }
    }
}

async fn start(store: Option<Arc<MemStore>>) -> SocketAddr {
    let cfg = HttpConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        static_root: "/".to_string(),
        idle_timeout_secs: 2,
        ws_timeout_secs: 5,
    };
    let server = HttpServer::new(cfg, TestHandler, NoUpgrade, store);
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve(listener));
    addr
}

/// Writes one blob of request bytes and reads until the server closes.
async fn exchange(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => out.extend_from_slice(&buf[..n]),
            Ok(Err(_)) => break,
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[tokio::test]
async fn test_missing_file_is_404_with_fixed_body() {
    let addr = start(Some(MemStore::new())).await;
    let reply = exchange(addr, b"GET /missing.html HTTP/1.1\r\nHost: t\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 404 Not Found\r\n"), "{reply}");
    assert!(reply.contains("Content-Length: 20\r\n"));
    assert!(reply.ends_with("Error 404 Not Found\n"));
}

#[tokio::test]
async fn test_static_file_served_with_mime_type() {
    let store = MemStore::new();
    store.put("/index.html", b"<html>welcome</html>").await;
    let addr = start(Some(store)).await;

    let reply = exchange(addr, b"GET / HTTP/1.1\r\nHost: t\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{reply}");
    assert!(reply.contains("Content-Type: text/html\r\n"));
    assert!(reply.ends_with("<html>welcome</html>"));
}

#[tokio::test]
async fn test_query_string_is_ignored_for_files() {
    let store = MemStore::new();
    store.put("/page.html", b"<html>x</html>").await;
    let addr = start(Some(store)).await;

    let reply = exchange(addr, b"GET /page.html?v=2 HTTP/1.1\r\nHost: t\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{reply}");
}

#[tokio::test]
async fn test_handler_body_gets_sniffed_content_type() {
    let addr = start(Some(MemStore::new())).await;
    let reply = exchange(addr, b"GET /status HTTP/1.1\r\nHost: t\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{reply}");
    assert!(reply.contains("Content-Type: application/json\r\n"));
    assert!(reply.ends_with("{\"state\": \"up\"}"));
}

#[tokio::test]
async fn test_keep_alive_pipelining_resets_status_per_request() {
    let addr = start(Some(MemStore::new())).await;
    // Two pipelined requests in one write; only the first asks to keep the
    // connection alive, so the server closes after the second response.
    let reply = exchange(
        addr,
        b"GET /fail HTTP/1.1\r\nConnection: keep-alive\r\n\r\n\
          GET /status HTTP/1.1\r\nHost: t\r\n\r\n",
    )
    .await;
    let fail = reply.find("HTTP/1.1 500 Internal Server Error").unwrap();
    let ok = reply.find("HTTP/1.1 200 OK").unwrap();
    assert!(fail < ok, "{reply}");
    assert!(reply.ends_with("{\"state\": \"up\"}"));
}

#[tokio::test]
async fn test_without_keep_alive_connection_closes_after_one() {
    let addr = start(Some(MemStore::new())).await;
    let reply = exchange(
        addr,
        b"GET /status HTTP/1.1\r\nHost: t\r\n\r\n\
          GET /status HTTP/1.1\r\nHost: t\r\n\r\n",
    )
    .await;
    // Exactly one response came back before the close.
    assert_eq!(reply.matches("HTTP/1.1 200 OK").count(), 1, "{reply}");
}

#[tokio::test]
async fn test_parent_traversal_is_rejected() {
    let store = MemStore::new();
    store.put("/secret.txt", b"keys").await;
    let addr = start(Some(store)).await;

    let reply = exchange(addr, b"GET /../secret.txt HTTP/1.1\r\nHost: t\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 404 Not Found\r\n"), "{reply}");
    assert!(!reply.contains("keys"));
}

#[tokio::test]
async fn test_no_store_means_404_for_unhandled_paths() {
    let addr = start(None).await;
    let reply = exchange(addr, b"GET /anything HTTP/1.1\r\nHost: t\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 404 Not Found\r\n"), "{reply}");
}

#[tokio::test]
async fn test_upgrade_without_key_is_bad_request() {
    let addr = start(Some(MemStore::new())).await;
    let reply = exchange(
        addr,
        b"GET /ws HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n",
    )
    .await;
    assert!(reply.starts_with("HTTP/1.1 400 Bad Request"), "{reply}");
}
