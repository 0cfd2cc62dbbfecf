use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use wharf::auth::SingleUser;
use wharf::config::FtpConfig;
use wharf::ftp::FtpServer;
use wharf::store::MemStore;

/// Starts an FTP server over `store` and returns its control address.
/// Each test gets its own passive port range so parallel tests never
/// contend for data ports.
async fn start(store: Arc<MemStore>, home: &str, pasv: (u16, u16)) -> SocketAddr {
    let cfg = FtpConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        user: "admin".to_string(),
        password: "secret".to_string(),
        home_dir: home.to_string(),
        idle_timeout_secs: 10,
        passive_port_min: pasv.0,
        passive_port_max: pasv.1,
    };
    let auth = SingleUser {
        user: cfg.user.clone(),
        password: cfg.password.clone(),
        home: cfg.home_dir.clone(),
    };
    let server = FtpServer::new(cfg, store, auth);
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve(listener));
    addr
}

/// Minimal line-oriented FTP control client.
struct Control {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl Control {
    /// Connects and consumes the greeting.
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut ctrl = Self {
            stream,
            buf: Vec::new(),
        };
        let greeting = ctrl.line().await;
        assert!(greeting.starts_with("220 "), "{greeting}");
        ctrl
    }

    async fn line(&mut self) -> String {
        loop {
            if let Some(pos) = self.buf.windows(2).position(|w| w == b"\r\n") {
                let line: Vec<u8> = self.buf.drain(..pos + 2).collect();
                return String::from_utf8_lossy(&line[..pos]).into_owned();
            }
            let mut tmp = [0u8; 512];
            let n = tokio::time::timeout(Duration::from_secs(10), self.stream.read(&mut tmp))
                .await
                .expect("control reply timed out")
                .unwrap();
            assert!(n > 0, "control connection closed mid-reply");
            self.buf.extend_from_slice(&tmp[..n]);
        }
    }

    async fn cmd(&mut self, line: &str) -> String {
        self.stream
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
        self.line().await
    }

    async fn login(&mut self) {
        let r = self.cmd("USER admin").await;
        assert!(r.starts_with("331 "), "{r}");
        let r = self.cmd("PASS secret").await;
        assert!(r.starts_with("230 "), "{r}");
    }
}

/// Decodes a `227 Entering Passive Mode (h,h,h,h,p,p)` reply.
fn pasv_addr(reply: &str) -> SocketAddr {
    let inner = reply
        .split('(')
        .nth(1)
        .and_then(|s| s.split(')').next())
        .unwrap_or_else(|| panic!("unparseable PASV reply: {reply}"));
    let nums: Vec<u16> = inner.split(',').map(|n| n.parse().unwrap()).collect();
    assert_eq!(nums.len(), 6);
    SocketAddr::from((
        Ipv4Addr::new(nums[0] as u8, nums[1] as u8, nums[2] as u8, nums[3] as u8),
        nums[4] * 256 + nums[5],
    ))
}

async fn read_to_end(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        match tokio::time::timeout(Duration::from_secs(10), stream.read(&mut tmp)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => return out,
            Ok(Ok(n)) => out.extend_from_slice(&tmp[..n]),
        }
    }
}

#[tokio::test]
async fn test_login_and_navigation() {
    let addr = start(MemStore::new(), "/", (47000, 47004)).await;
    let mut ctrl = Control::connect(addr).await;

    let r = ctrl.cmd("USER admin").await;
    assert_eq!(r, "331 Password required");
    let r = ctrl.cmd("PASS secret").await;
    assert_eq!(r, "230 Logged in, home directory is /");

    assert_eq!(ctrl.cmd("PWD").await, "257 \"/\"");
    assert_eq!(ctrl.cmd("SYST").await, "215 UNIX Type: L8");
    assert_eq!(ctrl.cmd("NOOP").await, "200 OK");
    assert_eq!(ctrl.cmd("TYPE I").await, "200 OK");

    // Climbing out of the root is refused.
    assert_eq!(ctrl.cmd("CWD ..").await, "550 Access denied");

    assert_eq!(ctrl.cmd("QUIT").await, "221 Goodbye");
}

#[tokio::test]
async fn test_commands_require_login() {
    let addr = start(MemStore::new(), "/", (47010, 47014)).await;
    let mut ctrl = Control::connect(addr).await;

    assert_eq!(ctrl.cmd("PWD").await, "530 Not logged in");
    assert_eq!(ctrl.cmd("RETR x").await, "530 Not logged in");
    assert_eq!(ctrl.cmd("PASV").await, "530 Not logged in");

    let r = ctrl.cmd("USER admin").await;
    assert!(r.starts_with("331 "));
    assert_eq!(ctrl.cmd("PASS wrong").await, "530 Login incorrect");
    assert_eq!(ctrl.cmd("PWD").await, "530 Not logged in");
}

#[tokio::test]
async fn test_size_reports_file_length() {
    let store = MemStore::new();
    store.put("/hello.txt", b"hello").await;
    let addr = start(store, "/", (47020, 47024)).await;

    let mut ctrl = Control::connect(addr).await;
    ctrl.login().await;

    assert_eq!(ctrl.cmd("SIZE hello.txt").await, "213 5");
    assert_eq!(ctrl.cmd("SIZE missing.txt").await, "550 File not found");
}

#[tokio::test]
async fn test_passive_retrieve() {
    let store = MemStore::new();
    store.put("/data.bin", b"twelve bytes").await;
    let addr = start(store, "/", (47030, 47037)).await;

    let mut ctrl = Control::connect(addr).await;
    ctrl.login().await;

    let pasv = ctrl.cmd("PASV").await;
    assert!(pasv.starts_with("227 "), "{pasv}");
    let data_addr = pasv_addr(&pasv);

    let r = ctrl.cmd("RETR data.bin").await;
    assert_eq!(r, "150 Opening data connection");

    let mut data = TcpStream::connect(data_addr).await.unwrap();
    let body = read_to_end(&mut data).await;
    assert_eq!(body, b"twelve bytes");

    assert_eq!(ctrl.line().await, "226 Transfer complete");
}

#[tokio::test]
async fn test_passive_store_roundtrip() {
    let store = MemStore::new();
    let addr = start(store.clone(), "/", (47040, 47047)).await;

    let mut ctrl = Control::connect(addr).await;
    ctrl.login().await;

    let pasv = ctrl.cmd("PASV").await;
    let data_addr = pasv_addr(&pasv);

    assert_eq!(
        ctrl.cmd("STOR upload.txt").await,
        "150 Opening data connection"
    );
    let mut data = TcpStream::connect(data_addr).await.unwrap();
    data.write_all(b"uploaded contents").await.unwrap();
    drop(data);

    assert_eq!(ctrl.line().await, "226 Transfer complete");
    assert_eq!(
        store.get("/upload.txt").await.as_deref(),
        Some(b"uploaded contents".as_slice())
    );
    assert_eq!(ctrl.cmd("SIZE upload.txt").await, "213 17");
}

#[tokio::test]
async fn test_mkd_cwd_and_listing() {
    let store = MemStore::new();
    let addr = start(store.clone(), "/", (47050, 47057)).await;

    let mut ctrl = Control::connect(addr).await;
    ctrl.login().await;

    assert_eq!(ctrl.cmd("MKD docs").await, "257 \"/docs\" created");
    assert_eq!(ctrl.cmd("CWD docs").await, "250 Directory changed to /docs");
    assert_eq!(ctrl.cmd("PWD").await, "257 \"/docs\"");

    store.put("/docs/a.txt", b"a").await;

    // NLST with no argument lists the cwd.
    let pasv = ctrl.cmd("PASV").await;
    let data_addr = pasv_addr(&pasv);
    assert_eq!(ctrl.cmd("NLST").await, "150 Opening data connection");
    let mut data = TcpStream::connect(data_addr).await.unwrap();
    let names = String::from_utf8(read_to_end(&mut data).await).unwrap();
    assert_eq!(names, "a.txt\r\n");
    assert_eq!(ctrl.line().await, "226 Transfer complete");

    // LIST produces the long form.
    let pasv = ctrl.cmd("PASV").await;
    let data_addr = pasv_addr(&pasv);
    assert_eq!(ctrl.cmd("LIST").await, "150 Opening data connection");
    let mut data = TcpStream::connect(data_addr).await.unwrap();
    let listing = String::from_utf8(read_to_end(&mut data).await).unwrap();
    assert!(listing.contains("a.txt"), "{listing}");
    assert!(listing.starts_with('-'), "{listing}");
    assert_eq!(ctrl.line().await, "226 Transfer complete");
}

#[tokio::test]
async fn test_rename_and_delete() {
    let store = MemStore::new();
    store.put("/old.txt", b"payload").await;
    let addr = start(store, "/", (47060, 47064)).await;

    let mut ctrl = Control::connect(addr).await;
    ctrl.login().await;

    assert_eq!(ctrl.cmd("RNFR missing.txt").await, "550 File not found");

    assert_eq!(ctrl.cmd("RNFR old.txt").await, "350 Ready for RNTO");
    assert_eq!(ctrl.cmd("RNTO new.txt").await, "250 Rename successful");
    assert_eq!(ctrl.cmd("SIZE new.txt").await, "213 7");
    assert_eq!(ctrl.cmd("SIZE old.txt").await, "550 File not found");

    // RNFR must be followed by RNTO.
    assert_eq!(ctrl.cmd("RNFR new.txt").await, "350 Ready for RNTO");
    assert_eq!(ctrl.cmd("NOOP").await, "503 RNTO required");

    assert_eq!(ctrl.cmd("DELE new.txt").await, "250 Deleted");
    assert_eq!(ctrl.cmd("SIZE new.txt").await, "550 File not found");
}

#[tokio::test]
async fn test_home_prefix_confinement() {
    let store = MemStore::new();
    store.put("/secret.txt", b"keys").await;
    store.put("/files/ok.txt", b"fine").await;
    let addr = start(store, "/files", (47070, 47074)).await;

    let mut ctrl = Control::connect(addr).await;
    ctrl.login().await;

    assert_eq!(ctrl.cmd("PWD").await, "257 \"/files\"");
    assert_eq!(ctrl.cmd("SIZE ok.txt").await, "213 4");
    assert_eq!(ctrl.cmd("SIZE ../secret.txt").await, "550 Access denied");
    assert_eq!(ctrl.cmd("CWD /").await, "550 Access denied");
    assert_eq!(ctrl.cmd("RETR /secret.txt").await, "550 Access denied");
}

#[tokio::test]
async fn test_active_mode_transfer() {
    let store = MemStore::new();
    store.put("/f.txt", b"hello").await;
    let addr = start(store, "/", (47080, 47084)).await;

    let mut ctrl = Control::connect(addr).await;
    ctrl.login().await;

    // The client listens; the server dials out on PORT.
    let data_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = data_listener.local_addr().unwrap().port();
    let r = ctrl
        .cmd(&format!("PORT 127,0,0,1,{},{}", port >> 8, port & 0xFF))
        .await;
    assert_eq!(r, "200 PORT command successful");
    let (mut data, _) = data_listener.accept().await.unwrap();

    assert_eq!(ctrl.cmd("RETR f.txt").await, "150 Opening data connection");
    assert_eq!(read_to_end(&mut data).await, b"hello");
    assert_eq!(ctrl.line().await, "226 Transfer complete");
}

#[tokio::test]
async fn test_unknown_command() {
    let addr = start(MemStore::new(), "/", (47090, 47094)).await;
    let mut ctrl = Control::connect(addr).await;
    ctrl.login().await;
    assert_eq!(ctrl.cmd("FOOB").await, "502 Command not implemented");
}
