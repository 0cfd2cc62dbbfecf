//! TCP primitives: the timeout-aware [`Connection`] wrapper, the accepting
//! [`Listener`] (fan-out or single-shot), and the outbound [`connect`]or.
//!
//! Every protocol layer in this crate (HTTP, WebSocket, FTP) sits on top of
//! `Connection`'s byte stream. The concurrency contract is one reader and
//! one writer per connection; only `close` (via [`CloseSignal`]) is safe to
//! call from another task while I/O is in flight.

pub mod connection;
pub mod connector;
pub mod listener;

pub use connection::{CloseSignal, Connection, POLL_INTERVAL, Readiness};
pub use connector::connect;
pub use listener::{Firewall, Listener, ListenerHandle};
