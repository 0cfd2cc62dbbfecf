//! Wharf - Embedded Network Service Stack
//!
//! TCP connection management, an HTTP/1.1 server with WebSocket upgrade,
//! and an FTP server, sized for a single small host with a bounded number
//! of concurrent connections.

pub mod auth;
pub mod config;
pub mod ftp;
pub mod http;
pub mod net;
pub mod store;
pub mod ws;
