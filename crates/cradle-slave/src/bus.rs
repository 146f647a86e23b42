//! Message bus: a framed duplex channel between a slave and its engine.
//!
//! The bus connects to the app's Unix-domain endpoint and exchanges
//! length-prefixed [`RpcMessage`] frames. Outgoing messages are enqueued
//! without blocking into a bounded send queue and pushed out by explicit
//! [`Bus::flush`] calls from the event loop; incoming frames are decoded
//! from an internal buffer, so a receive that is abandoned on a timeout
//! never leaves the stream mid-frame.

use bytes::{Buf, BytesMut};
use cradle_protocol::{ProtocolError, RpcMessage, LENGTH_PREFIX_SIZE, MAX_MESSAGE_SIZE};
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout;

/// Bound on locally queued outgoing messages.
const SEND_QUEUE_LIMIT: usize = 10;

/// Errors that can occur on the bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The engine closed the connection.
    #[error("connection lost unexpectedly")]
    Disconnected,

    /// The send queue high-water mark was hit.
    #[error("send queue overflow: {0} messages pending")]
    QueueFull(usize),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// The slave's end of the bus.
pub struct Bus {
    reader: OwnedReadHalf,
    writer: BufWriter<OwnedWriteHalf>,
    inbuf: BytesMut,
    outbox: VecDeque<Vec<u8>>,
}

impl Bus {
    /// Connect to the engine's endpoint.
    pub async fn connect(endpoint: &Path) -> Result<Self, BusError> {
        let stream = UnixStream::connect(endpoint).await?;
        Ok(Self::new(stream))
    }

    fn new(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();

        Self {
            reader,
            writer: BufWriter::new(writer),
            inbuf: BytesMut::with_capacity(4096),
            outbox: VecDeque::new(),
        }
    }

    /// Enqueue a message without blocking.
    ///
    /// The message reaches the socket on the next [`flush`](Self::flush).
    /// Exceeding the queue bound means the engine has stopped draining us
    /// and is an error.
    pub fn send(&mut self, message: &RpcMessage) -> Result<(), BusError> {
        if self.outbox.len() >= SEND_QUEUE_LIMIT {
            return Err(BusError::QueueFull(self.outbox.len()));
        }

        self.outbox.push_back(message.to_wire()?);
        Ok(())
    }

    /// Drain the send queue to the socket.
    pub async fn flush(&mut self) -> Result<(), BusError> {
        while let Some(payload) = self.outbox.front() {
            self.writer
                .write_all(&(payload.len() as u32).to_be_bytes())
                .await?;
            self.writer.write_all(payload).await?;
            self.outbox.pop_front();
        }

        self.writer.flush().await?;
        Ok(())
    }

    /// Receive the next frame.
    ///
    /// Cancel-safe: all partial-read state lives in the internal buffer, so
    /// abandoning this future (e.g. on a timeout) never desynchronizes the
    /// stream.
    pub async fn recv(&mut self) -> Result<RpcMessage, BusError> {
        loop {
            if let Some(message) = self.try_decode()? {
                return Ok(message);
            }

            if self.reader.read_buf(&mut self.inbuf).await? == 0 {
                return Err(BusError::Disconnected);
            }
        }
    }

    /// Receive the next frame, giving up after `limit`.
    pub async fn recv_timeout(&mut self, limit: Duration) -> Result<Option<RpcMessage>, BusError> {
        match timeout(limit, self.recv()).await {
            Ok(result) => result.map(Some),
            Err(_elapsed) => Ok(None),
        }
    }

    // Decode one frame from the input buffer, consuming its bytes even if
    // the payload turns out to be malformed so the stream stays framed.
    fn try_decode(&mut self) -> Result<Option<RpcMessage>, BusError> {
        if self.inbuf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&self.inbuf[..LENGTH_PREFIX_SIZE]);
        let length = u32::from_be_bytes(prefix) as usize;

        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(length, MAX_MESSAGE_SIZE).into());
        }

        if self.inbuf.len() < LENGTH_PREFIX_SIZE + length {
            return Ok(None);
        }

        self.inbuf.advance(LENGTH_PREFIX_SIZE);
        let payload = self.inbuf.split_to(length);

        Ok(Some(RpcMessage::from_wire(&payload)?))
    }
}

/// Read one frame from `reader`, or `None` on a clean EOF at a frame
/// boundary.
///
/// This is the engine-side (and test-side) counterpart of [`Bus::recv`];
/// unlike it, this helper is not cancel-safe.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<RpcMessage>, BusError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let length = u32::from_be_bytes(prefix) as usize;
    if length > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(length, MAX_MESSAGE_SIZE).into());
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            BusError::Disconnected
        } else {
            BusError::Io(e)
        }
    })?;

    Ok(Some(RpcMessage::from_wire(&payload)?))
}

/// Write one frame to `writer`.
pub async fn write_frame<W>(writer: &mut W, message: &RpcMessage) -> Result<(), BusError>
where
    W: AsyncWrite + Unpin,
{
    let payload = message.to_wire()?;
    writer
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}
