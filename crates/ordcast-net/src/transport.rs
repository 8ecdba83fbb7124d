//! Transport abstraction for peer links.
//!
//! A transport is one reliable, ordered, bidirectional stream to a single
//! peer. Messages are carried as length-delimited frames whose bodies are the
//! CBOR wire form from `ordcast_core::codec`.
//!
//! A transport splits into a read half and a write half so a link worker can
//! keep reading while a write is blocked on a full stream.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use ordcast_core::{decode_message, encode_message, Message};

use crate::error::{NetError, Result};

/// Default upper bound on a single frame body.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Read side of a transport.
#[async_trait]
pub trait MessageSource: Send + 'static {
    /// Read the next message.
    ///
    /// Returns `None` at end of stream. Must be cancel safe: the link worker
    /// races it against shutdown.
    async fn recv(&mut self) -> Option<Result<Message>>;
}

/// Write side of a transport.
#[async_trait]
pub trait MessageSink: Send + 'static {
    /// Write one message and flush it.
    async fn send(&mut self, message: &Message) -> Result<()>;

    /// Flush and close the write side.
    async fn close(&mut self) -> Result<()>;
}

/// Transport trait for one peer connection.
pub trait Transport: Send + 'static {
    /// Read half produced by [`split`](Transport::split).
    type Reader: MessageSource;
    /// Write half produced by [`split`](Transport::split).
    type Writer: MessageSink;

    /// Human-readable name of the remote end, for logs.
    fn peer_label(&self) -> String;

    /// Separate the stream into halves that can be driven concurrently.
    fn split(self) -> (Self::Reader, Self::Writer);
}

/// Read half of a [`FramedTransport`].
pub struct FrameReader<S> {
    frames: FramedRead<ReadHalf<S>, LengthDelimitedCodec>,
}

/// Write half of a [`FramedTransport`].
pub struct FrameWriter<S> {
    frames: FramedWrite<WriteHalf<S>, LengthDelimitedCodec>,
}

#[async_trait]
impl<S> MessageSource for FrameReader<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn recv(&mut self) -> Option<Result<Message>> {
        let frame = self.frames.next().await?;
        Some(
            frame
                .map_err(|e| NetError::Transport(e.to_string()))
                .and_then(|bytes| decode_message(&bytes).map_err(NetError::from)),
        )
    }
}

#[async_trait]
impl<S> MessageSink for FrameWriter<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn send(&mut self, message: &Message) -> Result<()> {
        let body = encode_message(message)?;
        self.frames
            .send(Bytes::from(body))
            .await
            .map_err(|e| NetError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        SinkExt::<Bytes>::close(&mut self.frames)
            .await
            .map_err(|e| NetError::Transport(e.to_string()))
    }
}

/// Length-delimited transport over any async byte stream.
pub struct FramedTransport<S> {
    reader: FrameReader<S>,
    writer: FrameWriter<S>,
    label: String,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap a stream with the default frame limit.
    pub fn new(stream: S, label: impl Into<String>) -> Self {
        Self::with_max_frame_len(stream, label, DEFAULT_MAX_FRAME_LEN)
    }

    /// Wrap a stream, rejecting frames longer than `max_frame_len`.
    pub fn with_max_frame_len(stream: S, label: impl Into<String>, max_frame_len: usize) -> Self {
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(max_frame_len)
            .new_codec();
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: FrameReader {
                frames: FramedRead::new(read_half, codec.clone()),
            },
            writer: FrameWriter {
                frames: FramedWrite::new(write_half, codec),
            },
            label: label.into(),
        }
    }
}

impl<S> Transport for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    type Reader = FrameReader<S>;
    type Writer = FrameWriter<S>;

    fn peer_label(&self) -> String {
        self.label.clone()
    }

    fn split(self) -> (FrameReader<S>, FrameWriter<S>) {
        (self.reader, self.writer)
    }
}

#[async_trait]
impl<S> MessageSource for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn recv(&mut self) -> Option<Result<Message>> {
        self.reader.recv().await
    }
}

#[async_trait]
impl<S> MessageSink for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn send(&mut self, message: &Message) -> Result<()> {
        self.writer.send(message).await
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.close().await
    }
}

/// In-memory transports for tests and local clusters.
///
/// Each pair is backed by a `tokio::io::duplex` pipe, so the full framing and
/// codec path is exercised without sockets.
pub mod memory {
    use super::*;
    use tokio::io::DuplexStream;

    /// Buffer size of each direction of the pipe.
    const PIPE_CAPACITY: usize = 64 * 1024;

    /// A transport over one end of an in-memory pipe.
    pub type MemoryTransport = FramedTransport<DuplexStream>;

    /// Create two connected transports labelled after their remote ends.
    pub fn pair(left: &str, right: &str) -> (MemoryTransport, MemoryTransport) {
        let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
        (FramedTransport::new(a, right), FramedTransport::new(b, left))
    }
}
