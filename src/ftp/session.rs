use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::ftp::paths;
use crate::ftp::server::PassivePorts;
use crate::net::{self, Connection, Listener};
use crate::store::FileStore;

/// How long a transfer command waits for the passive peer to connect, and
/// the idle bound applied to an established data connection.
const DATA_WAIT: Duration = Duration::from_secs(30);
const DATA_TIMEOUT: Duration = Duration::from_secs(30);
const PORT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transfer chunk size.
const CHUNK: usize = 2048;

/// The pending data channel. A session holds at most one of the two
/// establishment modes at a time; every transfer command consumes and
/// clears it, success or failure.
enum DataChannel {
    None,
    /// PASV: a single-shot listener waiting for the client to connect.
    Passive(Listener),
    /// PORT: an already-established outbound connection.
    Active(Connection),
}

/// One FTP control-connection session.
///
/// An empty `home` means not logged in; every verb except
/// USER/PASS/OPTS/NOOP is rejected with 530 until PASS succeeds.
pub struct Session<S, A> {
    conn: Connection,
    store: Arc<S>,
    auth: Arc<A>,
    passive: PassivePorts,
    inbuf: VecDeque<u8>,
    pending_user: String,
    user: String,
    home: String,
    cwd: String,
    data: DataChannel,
}

struct Command {
    verb: String,
    args: Vec<String>,
    /// Everything after the verb, verbatim, so filenames keep their spaces.
    param: String,
}

impl Command {
    fn parse(line: &str) -> Self {
        let trimmed = line.trim_start();
        let (verb_raw, rest) = trimmed.split_once(' ').unwrap_or((trimmed, ""));
        let verb = verb_raw.to_ascii_uppercase();
        let param = rest.trim_start().to_string();
        let args: Vec<String> = rest.split_whitespace().take(8).map(str::to_string).collect();
        Self { verb, args, param }
    }
}

impl<S, A> Session<S, A>
where
    S: FileStore,
    A: Authenticator,
{
    pub fn new(conn: Connection, store: Arc<S>, auth: Arc<A>, passive: PassivePorts) -> Self {
        Self {
            conn,
            store,
            auth,
            passive,
            inbuf: VecDeque::new(),
            pending_user: String::new(),
            user: String::new(),
            home: String::new(),
            cwd: String::new(),
            data: DataChannel::None,
        }
    }

    pub async fn run(mut self) {
        let peer = self.conn.peer_addr();
        if !self.store.mounted().await {
            warn!(peer = %peer, "File store unavailable, refusing FTP session");
            let _ = self.reply("421 File system unavailable").await;
            self.conn.close().await;
            return;
        }
        if !self.reply("220 wharf FTP server ready").await {
            return;
        }
        info!(peer = %peer, "FTP session started");

        loop {
            let Some(line) = self.read_line().await else {
                break;
            };
            if line.is_empty() {
                continue;
            }
            let cmd = Command::parse(&line);
            debug!(peer = %peer, verb = %cmd.verb, "FTP command");
            if !self.dispatch(&cmd).await {
                break;
            }
        }

        self.close_data().await;
        self.conn.close().await;
        info!(peer = %peer, user = %self.user, "FTP session ended");
    }

    /// Reads one command line. Bare LF bytes are ignored; a CR terminates
    /// the line. `None` when the control connection closes or times out.
    async fn read_line(&mut self) -> Option<String> {
        let mut line = Vec::new();
        loop {
            while let Some(byte) = self.inbuf.pop_front() {
                match byte {
                    b'\n' => {}
                    b'\r' => return Some(String::from_utf8_lossy(&line).into_owned()),
                    other => line.push(other),
                }
            }
            let mut tmp = [0u8; 256];
            let n = self.conn.recv(&mut tmp).await;
            if n == 0 {
                return None;
            }
            self.inbuf.extend(&tmp[..n]);
        }
    }

    async fn reply(&mut self, text: &str) -> bool {
        let msg = format!("{text}\r\n");
        self.conn.send(msg.as_bytes()).await == msg.len()
    }

    fn logged_in(&self) -> bool {
        !self.home.is_empty()
    }

    /// Resolves a client path argument and applies the home-prefix
    /// authorization boundary. `None` means the 550 reply.
    fn checked_path(&self, arg: &str) -> Option<String> {
        let resolved = paths::resolve(&self.cwd, arg)?;
        paths::authorized(&resolved, &self.home).then_some(resolved)
    }

    async fn dispatch(&mut self, cmd: &Command) -> bool {
        match cmd.verb.as_str() {
            "OPTS" => self.reply("200 OK").await,
            "NOOP" => self.reply("200 OK").await,
            "USER" => {
                self.pending_user = cmd.param.clone();
                self.reply("331 Password required").await
            }
            "PASS" => self.cmd_pass(&cmd.param).await,
            _ if !self.logged_in() => self.reply("530 Not logged in").await,
            "PWD" | "XPWD" => {
                let msg = format!("257 \"{}\"", self.cwd);
                self.reply(&msg).await
            }
            "TYPE" => self.reply("200 OK").await,
            "SYST" => self.reply("215 UNIX Type: L8").await,
            "SIZE" => self.cmd_size(&cmd.param).await,
            "PASV" => self.cmd_pasv().await,
            "PORT" => self.cmd_port(&cmd.param).await,
            "CWD" => self.cmd_cwd(&cmd.param).await,
            "XMKD" | "MKD" => self.cmd_mkd(&cmd.param).await,
            "XRMD" | "DELE" => self.cmd_dele(&cmd.param).await,
            "RNFR" => self.cmd_rnfr(&cmd.param).await,
            "RETR" => self.transfer_command(Transfer::Retr, &cmd.param).await,
            "STOR" => self.transfer_command(Transfer::Stor, &cmd.param).await,
            "NLST" => self.transfer_command(Transfer::Nlst, &cmd.param).await,
            "LIST" => self.transfer_command(Transfer::List, &cmd.param).await,
            "QUIT" => {
                self.close_data().await;
                let _ = self.reply("221 Goodbye").await;
                false
            }
            _ => {
                debug!(verb = %cmd.verb, args = cmd.args.len(), "Unknown FTP command");
                self.reply("502 Command not implemented").await
            }
        }
    }

    async fn cmd_pass(&mut self, password: &str) -> bool {
        let user = std::mem::take(&mut self.pending_user);
        if user.is_empty() || !self.auth.check(&user, password) {
            warn!(user = %user, "FTP login failed");
            return self.reply("530 Login incorrect").await;
        }
        let Some(home) = self.auth.home_dir(&user) else {
            return self.reply("530 Login incorrect").await;
        };
        self.user = user;
        self.cwd = home.clone();
        self.home = home;
        info!(user = %self.user, home = %self.home, "FTP login");
        let msg = format!("230 Logged in, home directory is {}", self.home);
        self.reply(&msg).await
    }

    async fn cmd_size(&mut self, param: &str) -> bool {
        let Some(path) = self.checked_path(param) else {
            return self.reply("550 Access denied").await;
        };
        match self.store.stat(&path).await {
            Some(meta) if !meta.is_dir => {
                let msg = format!("213 {}", meta.len);
                self.reply(&msg).await
            }
            _ => self.reply("550 File not found").await,
        }
    }

    async fn cmd_cwd(&mut self, param: &str) -> bool {
        let Some(path) = self.checked_path(param) else {
            return self.reply("550 Access denied").await;
        };
        match self.store.stat(&path).await {
            Some(meta) if meta.is_dir => {
                self.cwd = path;
                let msg = format!("250 Directory changed to {}", self.cwd);
                self.reply(&msg).await
            }
            _ => self.reply("550 Directory not found").await,
        }
    }

    async fn cmd_mkd(&mut self, param: &str) -> bool {
        let Some(path) = self.checked_path(param) else {
            return self.reply("550 Access denied").await;
        };
        match self.store.make_dir(&path).await {
            Ok(()) => {
                let msg = format!("257 \"{path}\" created");
                self.reply(&msg).await
            }
            Err(e) => {
                debug!(path = %path, error = %e, "MKD failed");
                self.reply("550 Could not create directory").await
            }
        }
    }

    async fn cmd_dele(&mut self, param: &str) -> bool {
        let Some(path) = self.checked_path(param) else {
            return self.reply("550 Access denied").await;
        };
        let result = match self.store.stat(&path).await {
            Some(meta) if meta.is_dir => self.store.remove_dir(&path).await,
            Some(_) => self.store.remove(&path).await,
            None => {
                return self.reply("550 File not found").await;
            }
        };
        match result {
            Ok(()) => self.reply("250 Deleted").await,
            Err(e) => {
                debug!(path = %path, error = %e, "Delete failed");
                self.reply("550 Could not delete").await
            }
        }
    }

    /// RNFR is half a command: the rename completes only after an RNTO
    /// line read synchronously off the same control connection.
    async fn cmd_rnfr(&mut self, param: &str) -> bool {
        let Some(from) = self.checked_path(param) else {
            return self.reply("550 Access denied").await;
        };
        if self.store.stat(&from).await.is_none() {
            return self.reply("550 File not found").await;
        }
        if !self.reply("350 Ready for RNTO").await {
            return false;
        }
        let Some(line) = self.read_line().await else {
            return false;
        };
        let next = Command::parse(&line);
        if next.verb != "RNTO" {
            return self.reply("503 RNTO required").await;
        }
        let Some(to) = self.checked_path(&next.param) else {
            return self.reply("550 Access denied").await;
        };
        match self.store.rename(&from, &to).await {
            Ok(()) => self.reply("250 Rename successful").await,
            Err(e) => {
                debug!(from = %from, to = %to, error = %e, "Rename failed");
                self.reply("550 Rename failed").await
            }
        }
    }

    async fn cmd_pasv(&mut self) -> bool {
        self.close_data().await;
        let Some(local) = self.conn.local_addr() else {
            return self.reply("425 Cannot open data connection").await;
        };
        let IpAddr::V4(ip) = local.ip() else {
            return self.reply("425 Cannot open data connection").await;
        };

        let attempts = self.passive.span().min(8);
        for _ in 0..attempts {
            let port = self.passive.next_port();
            match Listener::bind_once(&format!("{ip}:{port}"), Duration::ZERO, None).await {
                Ok(listener) => {
                    let o = ip.octets();
                    let msg = format!(
                        "227 Entering Passive Mode ({},{},{},{},{},{})",
                        o[0],
                        o[1],
                        o[2],
                        o[3],
                        port >> 8,
                        port & 0xFF
                    );
                    self.data = DataChannel::Passive(listener);
                    return self.reply(&msg).await;
                }
                Err(e) => {
                    debug!(port, error = %e, "Passive bind failed, rotating");
                }
            }
        }
        self.reply("425 Cannot open data connection").await
    }

    async fn cmd_port(&mut self, param: &str) -> bool {
        self.close_data().await;
        let Some(addr) = parse_port_param(param) else {
            return self.reply("501 Bad PORT argument").await;
        };
        match net::connect(addr, PORT_CONNECT_TIMEOUT, Duration::ZERO).await {
            Some(conn) => {
                self.data = DataChannel::Active(conn);
                self.reply("200 PORT command successful").await
            }
            None => self.reply("425 Cannot open data connection").await,
        }
    }

    /// Runs one data-transfer verb. The data channel is consumed and
    /// cleared on every exit path; the final reply reports the outcome.
    async fn transfer_command(&mut self, kind: Transfer, param: &str) -> bool {
        let outcome = self.run_transfer(kind, param).await;
        self.close_data().await;
        match outcome {
            TransferOutcome::Reply(text) => self.reply(&text).await,
            TransferOutcome::ControlLost => false,
        }
    }

    async fn run_transfer(&mut self, kind: Transfer, param: &str) -> TransferOutcome {
        let target = match kind {
            // Listings default to the cwd; a flags-only argument (`-a`)
            // also means the cwd.
            Transfer::Nlst | Transfer::List if param.is_empty() || param.starts_with('-') => {
                self.cwd.clone()
            }
            _ => param.to_string(),
        };
        let Some(path) = self.checked_path(&target) else {
            return TransferOutcome::denied();
        };

        // Pre-transfer checks that need no data connection.
        let retr_len = match kind {
            Transfer::Retr => match self.store.stat(&path).await {
                Some(meta) if !meta.is_dir => Some(meta.len),
                _ => return TransferOutcome::reply("550 File not found"),
            },
            _ => None,
        };

        if !self.reply("150 Opening data connection").await {
            return TransferOutcome::ControlLost;
        }
        let Some(mut data) = self.open_data_conn().await else {
            return TransferOutcome::reply("425 Cannot open data connection");
        };
        data.set_idle_timeout(DATA_TIMEOUT);

        let result = match kind {
            Transfer::Retr => self.send_file(&path, retr_len.unwrap_or(0), &mut data).await,
            Transfer::Stor => self.receive_file(&path, &mut data).await,
            Transfer::Nlst => self.send_listing(&path, &mut data, false).await,
            Transfer::List => self.send_listing(&path, &mut data, true).await,
        };
        data.close().await;

        if result {
            TransferOutcome::reply("226 Transfer complete")
        } else {
            TransferOutcome::reply("550 Transfer failed")
        }
    }

    async fn send_file(&mut self, path: &str, len: u64, data: &mut Connection) -> bool {
        let mut offset = 0u64;
        let mut chunk = [0u8; CHUNK];
        while offset < len {
            match self.store.read_at(path, offset, &mut chunk).await {
                Ok(0) | Err(_) => return false,
                Ok(n) => {
                    if data.send(&chunk[..n]).await != n {
                        return false;
                    }
                    offset += n as u64;
                }
            }
        }
        offset == len
    }

    async fn receive_file(&mut self, path: &str, data: &mut Connection) -> bool {
        if self.store.create(path).await.is_err() {
            return false;
        }
        let mut chunk = [0u8; CHUNK];
        loop {
            let n = data.recv(&mut chunk).await;
            if n == 0 {
                // Orderly close ends the upload; a timeout does too, and
                // the client sees the byte count it managed to deliver.
                return true;
            }
            if self.store.append(path, &chunk[..n]).await.is_err() {
                return false;
            }
        }
    }

    async fn send_listing(&mut self, path: &str, data: &mut Connection, long: bool) -> bool {
        let Ok(entries) = self.store.list(path).await else {
            return false;
        };
        let mut out = String::new();
        for entry in &entries {
            if long {
                let kind = if entry.meta.is_dir { 'd' } else { '-' };
                out.push_str(&format!(
                    "{}rw-r--r-- 1 ftp ftp {:>12} Jan  1 00:00 {}\r\n",
                    kind, entry.meta.len, entry.name
                ));
            } else {
                out.push_str(&entry.name);
                out.push_str("\r\n");
            }
        }
        data.send(out.as_bytes()).await == out.len()
    }

    /// Takes the pending data channel, producing an established
    /// connection. Clears the channel regardless of outcome.
    async fn open_data_conn(&mut self) -> Option<Connection> {
        match std::mem::replace(&mut self.data, DataChannel::None) {
            DataChannel::Passive(listener) => listener.accept_one(DATA_WAIT).await,
            DataChannel::Active(conn) => Some(conn),
            DataChannel::None => None,
        }
    }

    async fn close_data(&mut self) {
        match std::mem::replace(&mut self.data, DataChannel::None) {
            DataChannel::Active(mut conn) => conn.close().await,
            // Dropping a passive listener stops it from ever accepting.
            DataChannel::Passive(_) | DataChannel::None => {}
        }
    }
}

#[derive(Clone, Copy)]
enum Transfer {
    Retr,
    Stor,
    Nlst,
    List,
}

enum TransferOutcome {
    Reply(String),
    /// The control connection itself failed; end the session.
    ControlLost,
}

impl TransferOutcome {
    fn reply(text: &str) -> Self {
        TransferOutcome::Reply(text.to_string())
    }

    fn denied() -> Self {
        TransferOutcome::reply("550 Access denied")
    }
}

/// Parses the `h1,h2,h3,h4,p1,p2` argument of PORT.
fn parse_port_param(param: &str) -> Option<SocketAddr> {
    let mut nums = [0u16; 6];
    let mut count = 0;
    for part in param.split(',') {
        if count == 6 {
            return None;
        }
        nums[count] = part.trim().parse().ok()?;
        count += 1;
    }
    if count != 6 || nums[..4].iter().any(|&n| n > 255) || nums[4] > 255 || nums[5] > 255 {
        return None;
    }
    let ip = std::net::Ipv4Addr::new(nums[0] as u8, nums[1] as u8, nums[2] as u8, nums[3] as u8);
    let port = nums[4] * 256 + nums[5];
    Some(SocketAddr::from((ip, port)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_port_argument() {
        let addr = parse_port_param("127,0,0,1,7,232").unwrap();
        assert_eq!(addr, "127.0.0.1:2024".parse().unwrap());
        assert!(parse_port_param("127,0,0,1,7").is_none());
        assert!(parse_port_param("300,0,0,1,7,232").is_none());
        assert!(parse_port_param("junk").is_none());
    }

    #[test]
    fn command_param_keeps_spaces() {
        let cmd = Command::parse("STOR my file.txt");
        assert_eq!(cmd.verb, "STOR");
        assert_eq!(cmd.param, "my file.txt");
        assert_eq!(cmd.args, vec!["my", "file.txt"]);
    }

    #[test]
    fn command_verb_is_uppercased() {
        let cmd = Command::parse("pasv");
        assert_eq!(cmd.verb, "PASV");
        assert!(cmd.param.is_empty());
    }
}
