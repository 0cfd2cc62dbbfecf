//! HTTP/1.1 server with WebSocket upgrade.
//!
//! Each accepted socket runs one [`connection::HttpConnection`] pipeline:
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← accumulate until the header terminator
//!        └──────┬──────┘
//!               │ request complete
//!               ▼
//!        ┌──────────────────────────────┐
//!        │  Upgrade? → WebSocket handler │ (socket leaves HTTP forever)
//!        │  Handler content? → respond   │
//!        │  Static file?    → stream     │
//!        │  Else            → 404        │
//!        └──────┬───────────────────────┘
//!               │ response sent
//!               ├─ Connection: keep-alive → Reading (buffered surplus kept)
//!               └─ otherwise → Closed
//! ```
//!
//! Handlers plug in through the [`handler::RequestHandler`] and
//! [`handler::WsHandler`] traits.

pub mod connection;
pub mod handler;
pub mod handshake;
pub mod mime;
pub mod request;
pub mod response;
pub mod server;

pub use handler::{NoUpgrade, RequestHandler, WsHandler};
pub use request::Request;
pub use response::Response;
pub use server::HttpServer;
