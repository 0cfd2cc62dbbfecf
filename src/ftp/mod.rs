//! FTP server: a per-session command interpreter on one control
//! connection, opening transient data connections (passive via a
//! single-shot listener, active via the outbound connector) per command.

pub mod paths;
pub mod server;
pub mod session;

pub use server::{FtpServer, PassivePorts};
pub use session::Session;
