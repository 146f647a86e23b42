//! Protocol message types

use crate::error::Result;
use crate::{ProtocolError, MAX_MESSAGE_SIZE};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Error code reported when the runtime itself failed to serve a request.
pub const SERVER_ERROR: u32 = 1;

/// Error code reported when user code failed during an invocation.
pub const APP_ERROR: u32 = 2;

/// Control messages exchanged between a slave and its engine.
///
/// # Stability
///
/// **WARNING**: Variant order must remain stable. The postcard-encoded
/// variant index doubles as the numeric command tag on the wire, so
/// reordering variants breaks compatibility with deployed peers. New
/// commands may only be appended at the end of the enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcMessage {
    /// Liveness probe, sent by the slave every heartbeat period.
    Ping,

    /// Liveness reply from the engine; disarms the slave's disown watchdog.
    Pong,

    /// Start serving the named event. Opens an invocation, which the slave
    /// closes with exactly one `Choke`.
    Invoke {
        /// Event name dispatched to the sandbox.
        event: String,
    },

    /// One payload fragment of the current invocation, either direction.
    Chunk(#[serde(with = "crate::serde_utils::bytes_serde")] Bytes),

    /// Invocation failure report, slave to engine.
    Error {
        /// [`SERVER_ERROR`] or [`APP_ERROR`].
        code: u32,
        /// Human-readable failure description.
        message: String,
    },

    /// Closes the current invocation; follows all of its chunks and errors.
    Choke,

    /// Shutdown request (engine to slave) or shutdown notice (slave to
    /// engine). A slave acknowledges by echoing it back before exiting.
    Terminate,
}

impl RpcMessage {
    /// Numeric command tag of this message as it appears on the wire.
    pub fn tag(&self) -> u32 {
        match self {
            RpcMessage::Ping => 0,
            RpcMessage::Pong => 1,
            RpcMessage::Invoke { .. } => 2,
            RpcMessage::Chunk(_) => 3,
            RpcMessage::Error { .. } => 4,
            RpcMessage::Choke => 5,
            RpcMessage::Terminate => 6,
        }
    }

    /// Serialize to wire bytes (postcard payload, no length prefix).
    ///
    /// The transport layer prepends the big-endian u32 length.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MessageTooLarge`] if the encoded message
    /// exceeds [`MAX_MESSAGE_SIZE`](crate::MAX_MESSAGE_SIZE).
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        let encoded = postcard::to_allocvec(self)?;

        if encoded.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(
                encoded.len(),
                MAX_MESSAGE_SIZE,
            ));
        }

        Ok(encoded)
    }

    /// Deserialize from wire bytes (postcard payload, length prefix already
    /// stripped by the transport).
    pub fn from_wire(data: &[u8]) -> Result<Self> {
        postcard::from_bytes(data).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_tags_are_stable() {
        // The leading wire byte is the postcard varint of the variant index
        // and must equal tag() for every command.
        let messages = [
            RpcMessage::Ping,
            RpcMessage::Pong,
            RpcMessage::Invoke {
                event: "echo".into(),
            },
            RpcMessage::Chunk(Bytes::from_static(b"data")),
            RpcMessage::Error {
                code: APP_ERROR,
                message: "boom".into(),
            },
            RpcMessage::Choke,
            RpcMessage::Terminate,
        ];

        for (index, msg) in messages.iter().enumerate() {
            assert_eq!(msg.tag(), index as u32);
            let wire = msg.to_wire().unwrap();
            assert_eq!(wire[0] as u32, msg.tag());
        }
    }

    #[test]
    fn test_roundtrip() {
        let messages = [
            RpcMessage::Ping,
            RpcMessage::Invoke {
                event: "process".into(),
            },
            RpcMessage::Chunk(Bytes::from_static(b"\x00\xff payload")),
            RpcMessage::Error {
                code: SERVER_ERROR,
                message: "unable to configure the slave".into(),
            },
            RpcMessage::Choke,
            RpcMessage::Terminate,
        ];

        for msg in &messages {
            let wire = msg.to_wire().unwrap();
            let decoded = RpcMessage::from_wire(&wire).unwrap();
            assert_eq!(&decoded, msg);
        }
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(SERVER_ERROR, 1);
        assert_eq!(APP_ERROR, 2);
    }

    #[test]
    fn test_from_wire_rejects_garbage() {
        assert!(RpcMessage::from_wire(&[0xff, 0xff, 0xff]).is_err());
        assert!(RpcMessage::from_wire(&[]).is_err());
    }

    #[test]
    fn test_empty_chunk_roundtrip() {
        let msg = RpcMessage::Chunk(Bytes::new());
        let decoded = RpcMessage::from_wire(&msg.to_wire().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }
}
