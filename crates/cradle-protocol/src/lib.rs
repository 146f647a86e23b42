//! Cradle Wire Protocol
//!
//! This crate defines the control messages exchanged between a slave and the
//! engine that owns it, together with their serialization.
//!
//! # Wire Format
//!
//! One logical message occupies one frame on the bus:
//!
//! ```text
//! ┌─────────────────┬──────────────────────────────┐
//! │ Length (4 bytes)│ Payload (N bytes)            │
//! │ Big-endian u32  │ Postcard-encoded RpcMessage  │
//! └─────────────────┴──────────────────────────────┘
//! ```
//!
//! The length prefix is written and consumed by the transport layer; this
//! crate produces and parses the payload. A frame is received all-or-nothing,
//! so a reader is never left mid-message.
//!
//! # Protocol Stability
//!
//! The enum variant order is significant: postcard encodes the variant index
//! as the leading command tag, and both ends of the bus must agree on it.
//! New commands may only be appended.

mod error;
mod messages;
pub mod serde_utils;

pub use error::{ProtocolError, Result};
pub use messages::{RpcMessage, APP_ERROR, SERVER_ERROR};

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u32 = 1;

/// Size of the frame length prefix written by the transport.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum encoded message size (16 MiB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
