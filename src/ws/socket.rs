use std::net::SocketAddr;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::net::{Connection, POLL_INTERVAL, Readiness};
use crate::ws::frame::{self, FrameHeader, Opcode};

/// What the incremental decoder can report after advancing on the bytes
/// currently available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// No complete message yet; poll again.
    NotAvailable,
    TextReady,
    BinaryReady,
    /// Peer sent a close frame; the connection has been closed.
    Closed,
    /// Protocol violation or I/O failure; the connection has been closed.
    Error,
    /// Idle timeout elapsed; the connection has been closed.
    TimedOut,
}

/// Decoder state. Exactly one message can be `Ready` at a time; the
/// consumer must drain it before the next frame's header is consumed.
enum FrameState {
    Empty,
    /// Partial header bytes (2 fixed + optional 2 extended-length + 4 mask).
    Header(Vec<u8>),
    Payload {
        header: FrameHeader,
        buf: Vec<u8>,
    },
    Ready {
        opcode: Opcode,
        payload: Vec<u8>,
    },
}

/// One upgraded WebSocket session over a [`Connection`].
pub struct WebSocket {
    conn: Connection,
    state: FrameState,
    /// Bytes received before the session started (a frame the client
    /// pipelined behind its upgrade request). Drained before the socket
    /// is read again.
    carry: Vec<u8>,
}

impl WebSocket {
    pub fn new(conn: Connection) -> Self {
        Self::with_buffered(conn, Vec::new())
    }

    /// Session over a connection with bytes already read off its stream.
    pub fn with_buffered(conn: Connection, carry: Vec<u8>) -> Self {
        Self {
            conn,
            state: FrameState::Empty,
            carry,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.conn.peer_addr()
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    /// Advances the frame state machine as far as the bytes already
    /// available allow and reports what is ready. Never waits for the
    /// peer beyond one bounded readiness probe: a frame cut off
    /// mid-header or mid-payload yields `NotAvailable` and the partial
    /// state carries over to the next call.
    pub async fn availability(&mut self) -> Availability {
        loop {
            match &mut self.state {
                FrameState::Ready { opcode, .. } => {
                    return match opcode {
                        Opcode::Text => Availability::TextReady,
                        _ => Availability::BinaryReady,
                    };
                }
                FrameState::Empty => {
                    match self.probe().await {
                        Readiness::NoData => return Availability::NotAvailable,
                        Readiness::ClosedOrError => return self.failure(),
                        Readiness::DataAvailable => {
                            self.state = FrameState::Header(Vec::with_capacity(8));
                        }
                    }
                }
                FrameState::Header(buf) => {
                    let need = match frame::header_len(buf) {
                        Ok(n) => n,
                        Err(_) => return self.protocol_error("unsupported frame length").await,
                    };
                    if buf.len() < need {
                        if self.carry.is_empty() {
                            match self.conn.readiness().await {
                                Readiness::NoData => return Availability::NotAvailable,
                                Readiness::ClosedOrError => {
                                    self.state = FrameState::Empty;
                                    return self.failure();
                                }
                                Readiness::DataAvailable => {}
                            }
                        }
                        let mut tmp = [0u8; 8];
                        let want = need - buf.len();
                        let n = Self::pull(&mut self.carry, &mut self.conn, &mut tmp[..want]).await;
                        if n == 0 {
                            self.state = FrameState::Empty;
                            return self.failure();
                        }
                        buf.extend_from_slice(&tmp[..n]);
                        continue;
                    }
                    match frame::parse_header(buf) {
                        Err(e) => {
                            return self.protocol_error(&format!("bad frame header: {e:?}")).await;
                        }
                        Ok(None) => continue, // extended form revealed; need more bytes
                        Ok(Some(header)) => {
                            if header.opcode == Opcode::Close {
                                debug!(peer = %self.conn.peer_addr(), "WebSocket close frame");
                                self.state = FrameState::Empty;
                                self.conn.close().await;
                                return Availability::Closed;
                            }
                            self.state = FrameState::Payload {
                                header,
                                buf: Vec::with_capacity(header.payload_len),
                            };
                        }
                    }
                }
                FrameState::Payload { header, buf } => {
                    let header = *header;
                    if buf.len() == header.payload_len {
                        frame::unmask(buf, header.mask);
                        let payload = std::mem::take(buf);
                        self.state = FrameState::Ready {
                            opcode: header.opcode,
                            payload,
                        };
                        continue;
                    }
                    if self.carry.is_empty() {
                        match self.conn.readiness().await {
                            Readiness::NoData => return Availability::NotAvailable,
                            Readiness::ClosedOrError => {
                                self.state = FrameState::Empty;
                                return self.failure();
                            }
                            Readiness::DataAvailable => {}
                        }
                    }
                    let mut tmp = [0u8; 2048];
                    let want = (header.payload_len - buf.len()).min(tmp.len());
                    let n = Self::pull(&mut self.carry, &mut self.conn, &mut tmp[..want]).await;
                    if n == 0 {
                        self.state = FrameState::Empty;
                        return self.failure();
                    }
                    buf.extend_from_slice(&tmp[..n]);
                }
            }
        }
    }

    /// Readiness that counts carried-over bytes as available data.
    async fn probe(&mut self) -> Readiness {
        if !self.carry.is_empty() {
            return Readiness::DataAvailable;
        }
        self.conn.readiness().await
    }

    /// Reads into `buf`, draining the carry-over bytes before touching
    /// the socket. Free-standing over the fields so callers can hold a
    /// borrow on the frame state.
    async fn pull(carry: &mut Vec<u8>, conn: &mut Connection, buf: &mut [u8]) -> usize {
        if carry.is_empty() {
            return conn.recv(buf).await;
        }
        let n = carry.len().min(buf.len());
        buf[..n].copy_from_slice(&carry[..n]);
        carry.drain(..n);
        n
    }

    /// Polls until a text message is ready and returns it. A binary
    /// message arriving instead is discarded (logged at WARN) and `None`
    /// is returned; there is no queue.
    pub async fn read_text(&mut self) -> Option<String> {
        loop {
            match self.availability().await {
                Availability::NotAvailable => sleep(POLL_INTERVAL).await,
                Availability::TextReady => {
                    return String::from_utf8(self.take_ready()?).ok();
                }
                Availability::BinaryReady => {
                    warn!(peer = %self.conn.peer_addr(), "Discarding binary frame while reading text");
                    self.take_ready();
                    return None;
                }
                _ => return None,
            }
        }
    }

    /// Binary counterpart of [`read_text`](WebSocket::read_text); a text
    /// message arriving instead is discarded.
    pub async fn read_binary(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.availability().await {
                Availability::NotAvailable => sleep(POLL_INTERVAL).await,
                Availability::BinaryReady => return self.take_ready(),
                Availability::TextReady => {
                    warn!(peer = %self.conn.peer_addr(), "Discarding text frame while reading binary");
                    self.take_ready();
                    return None;
                }
                _ => return None,
            }
        }
    }

    pub async fn send_text(&mut self, text: &str) -> bool {
        self.send_frame(Opcode::Text, text.as_bytes()).await
    }

    pub async fn send_binary(&mut self, data: &[u8]) -> bool {
        self.send_frame(Opcode::Binary, data).await
    }

    /// Best-effort close: a zero-length close frame, then the connection.
    pub async fn close(&mut self) {
        if !self.conn.is_closed() {
            if let Ok(bytes) = frame::encode(Opcode::Close, &[]) {
                let _ = self.conn.send(&bytes).await;
            }
            self.conn.close().await;
        }
    }

    async fn send_frame(&mut self, opcode: Opcode, payload: &[u8]) -> bool {
        match frame::encode(opcode, payload) {
            Ok(bytes) => self.conn.send(&bytes).await == bytes.len(),
            Err(e) => {
                warn!(peer = %self.conn.peer_addr(), error = ?e, "Refusing to send frame");
                self.conn.close().await;
                false
            }
        }
    }

    fn take_ready(&mut self) -> Option<Vec<u8>> {
        match std::mem::replace(&mut self.state, FrameState::Empty) {
            FrameState::Ready { payload, .. } => Some(payload),
            other => {
                self.state = other;
                None
            }
        }
    }

    fn failure(&self) -> Availability {
        if self.conn.idle_expired() {
            Availability::TimedOut
        } else {
            Availability::Error
        }
    }

    async fn protocol_error(&mut self, what: &str) -> Availability {
        warn!(peer = %self.conn.peer_addr(), "WebSocket protocol error: {what}");
        self.state = FrameState::Empty;
        self.conn.close().await;
        Availability::Error
    }
}
