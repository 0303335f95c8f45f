//! Upstream-side connection adapter.
//!
//! Simpler than the client side: the upstream server never sends
//! startup-dialect packets to the proxy, so every inbound message is an
//! opaque frame from the first byte on.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use pgrelay_wire::{Frame, FrameDecoder, Message, MessageEncoder};

use crate::error::SessionError;

/// Adapter over the connection to the upstream server.
pub struct UpstreamChannel<S> {
    reader: FramedRead<ReadHalf<S>, FrameDecoder>,
    writer: FramedWrite<WriteHalf<S>, MessageEncoder>,
    peer: SocketAddr,
}

impl<S> UpstreamChannel<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        let (read_half, write_half) = split(stream);
        Self {
            reader: FramedRead::new(read_half, FrameDecoder::new()),
            writer: FramedWrite::new(write_half, MessageEncoder::new()),
            peer,
        }
    }

    /// Encodes one client-originated message toward the server.
    pub async fn write(&mut self, message: Message) -> Result<(), SessionError> {
        self.writer
            .send(message)
            .await
            .map_err(SessionError::UpstreamWrite)
    }

    /// Closes the upstream connection.
    pub async fn close(mut self) {
        let _ = self.writer.get_mut().shutdown().await;
        debug!(upstream_addr = %self.peer, "upstream connection closed");
    }

    /// Splits the adapter into its two halves for concurrent pumping.
    pub fn into_split(self) -> (UpstreamReader<S>, UpstreamWriter<S>) {
        (
            UpstreamReader {
                inner: self.reader,
                peer: self.peer,
            },
            UpstreamWriter {
                inner: self.writer,
                peer: self.peer,
            },
        )
    }
}

/// Read half of the upstream connection.
pub struct UpstreamReader<S> {
    inner: FramedRead<ReadHalf<S>, FrameDecoder>,
    peer: SocketAddr,
}

impl<S> UpstreamReader<S>
where
    S: AsyncRead,
{
    /// Reads one frame; `None` means the server half-closed cleanly.
    pub async fn read(&mut self) -> Result<Option<Frame>, SessionError> {
        match self.inner.next().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(SessionError::UpstreamRead(e)),
            None => {
                debug!(upstream_addr = %self.peer, "upstream closed its write side");
                Ok(None)
            }
        }
    }
}

/// Write half of the upstream connection.
pub struct UpstreamWriter<S> {
    inner: FramedWrite<WriteHalf<S>, MessageEncoder>,
    peer: SocketAddr,
}

impl<S> UpstreamWriter<S>
where
    S: AsyncWrite,
{
    /// Encodes one client-originated frame toward the server.
    pub async fn write(&mut self, frame: Frame) -> Result<(), SessionError> {
        self.inner
            .send(frame)
            .await
            .map_err(SessionError::UpstreamWrite)
    }

    /// Shuts down the write side toward the server.
    pub async fn close(mut self) {
        let _ = self.inner.get_mut().shutdown().await;
        debug!(upstream_addr = %self.peer, "upstream connection closed");
    }
}
