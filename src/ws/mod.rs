//! WebSocket engine: a pure frame codec plus the polling session state
//! machine that sits on a [`crate::net::Connection`] byte stream.
//!
//! Only the subset the device needs is implemented: FIN-only frames,
//! opcodes text/binary/close, payloads up to 65535 bytes (short and 16-bit
//! length forms). Fragmentation and 64-bit lengths are rejected.

pub mod frame;
pub mod socket;

pub use frame::{FrameError, FrameHeader, MAX_PAYLOAD, Opcode};
pub use socket::{Availability, WebSocket};
