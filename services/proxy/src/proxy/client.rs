//! Client-side connection adapter.
//!
//! Owns the socket a database client connected with. Until the startup
//! handshake completes this adapter answers encryption-upgrade requests
//! itself and rejects cancel requests; afterwards it is a plain frame
//! decoder/encoder.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use pgrelay_wire::{
    ClientDecoder, ClientPacket, Frame, Message, MessageEncoder, WireError, ENCRYPTION_REFUSED,
};

use crate::error::SessionError;

/// Outcome of one client-side read.
#[derive(Debug)]
pub enum ClientInbound {
    /// A message that must be forwarded upstream.
    Forward(Message),
    /// Pre-startup control traffic answered locally; nothing to forward,
    /// read again.
    Handled,
    /// The client closed its write side cleanly.
    Closed,
}

/// Adapter over the client connection, including the startup state machine.
pub struct ClientChannel<S> {
    reader: FramedRead<ReadHalf<S>, ClientDecoder>,
    writer: FramedWrite<WriteHalf<S>, MessageEncoder>,
    peer: SocketAddr,
}

impl<S> ClientChannel<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        let (read_half, write_half) = split(stream);
        Self {
            reader: FramedRead::new(read_half, ClientDecoder::new()),
            writer: FramedWrite::new(write_half, MessageEncoder::new()),
            peer,
        }
    }

    /// Whether the startup handshake message has been received.
    pub fn startup_complete(&self) -> bool {
        self.reader.decoder().startup_complete()
    }

    /// Reads one message from the client.
    ///
    /// Encryption-upgrade requests are refused on the spot and reported as
    /// [`ClientInbound::Handled`]; a cancel request is a terminal protocol
    /// violation on this socket.
    pub async fn read(&mut self) -> Result<ClientInbound, SessionError> {
        let packet = match self.reader.next().await {
            Some(Ok(packet)) => packet,
            Some(Err(e)) => return Err(SessionError::ClientRead(e)),
            None => return Ok(ClientInbound::Closed),
        };

        match packet {
            ClientPacket::SslRequest | ClientPacket::GssEncRequest => {
                self.refuse_encryption().await?;
                debug!(peer_addr = %self.peer, "encryption upgrade refused");
                Ok(ClientInbound::Handled)
            }
            ClientPacket::Cancel(_) => Err(SessionError::CancelRequest),
            ClientPacket::Startup(message) => {
                debug!(
                    peer_addr = %self.peer,
                    user = message.user().unwrap_or("-"),
                    database = message.database().unwrap_or("-"),
                    "client startup received"
                );
                Ok(ClientInbound::Forward(Message::Startup(message)))
            }
            ClientPacket::Regular(frame) => Ok(ClientInbound::Forward(Message::Regular(frame))),
        }
    }

    async fn refuse_encryption(&mut self) -> Result<(), SessionError> {
        let socket = self.writer.get_mut();
        socket
            .write_all(&[ENCRYPTION_REFUSED])
            .await
            .map_err(|e| SessionError::ClientWrite(e.into()))?;
        socket
            .flush()
            .await
            .map_err(|e| SessionError::ClientWrite(e.into()))
    }

    /// Closes the client connection.
    pub async fn close(mut self) {
        let _ = self.writer.get_mut().shutdown().await;
        debug!(peer_addr = %self.peer, "client connection closed");
    }

    /// Splits the adapter into its two halves for concurrent pumping.
    pub fn into_split(self) -> (ClientReader<S>, ClientWriter<S>) {
        (
            ClientReader {
                inner: self.reader,
                peer: self.peer,
            },
            ClientWriter {
                inner: self.writer,
                peer: self.peer,
            },
        )
    }
}

/// Read half of the client connection, post-handshake.
pub struct ClientReader<S> {
    inner: FramedRead<ReadHalf<S>, ClientDecoder>,
    peer: SocketAddr,
}

impl<S> ClientReader<S>
where
    S: AsyncRead,
{
    /// Reads one opaque frame; `None` means the client half-closed cleanly.
    pub async fn read(&mut self) -> Result<Option<Frame>, SessionError> {
        match self.inner.next().await {
            Some(Ok(ClientPacket::Regular(frame))) => Ok(Some(frame)),
            Some(Ok(_)) => Err(SessionError::ClientRead(WireError::Malformed(
                "startup packet after handshake",
            ))),
            Some(Err(e)) => Err(SessionError::ClientRead(e)),
            None => {
                debug!(peer_addr = %self.peer, "client closed its write side");
                Ok(None)
            }
        }
    }
}

/// Write half of the client connection.
pub struct ClientWriter<S> {
    inner: FramedWrite<WriteHalf<S>, MessageEncoder>,
    peer: SocketAddr,
}

impl<S> ClientWriter<S>
where
    S: AsyncWrite,
{
    /// Encodes one server-originated frame to the client.
    pub async fn write(&mut self, frame: Frame) -> Result<(), SessionError> {
        self.inner.send(frame).await.map_err(SessionError::ClientWrite)
    }

    /// Shuts down the write side toward the client.
    pub async fn close(mut self) {
        let _ = self.inner.get_mut().shutdown().await;
        debug!(peer_addr = %self.peer, "client connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use pgrelay_wire::{CANCEL_REQUEST_CODE, SSL_REQUEST_CODE};
    use tokio::io::AsyncReadExt;

    fn test_peer() -> SocketAddr {
        "127.0.0.1:54321".parse().unwrap()
    }

    fn startup_packet(code: i32, body: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_i32((4 + 4 + body.len()) as i32);
        buf.put_i32(code);
        buf.extend_from_slice(body);
        buf
    }

    fn startup_message_bytes() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(b"user\0alice\0");
        body.push(0);
        startup_packet(3 << 16, &body)
    }

    #[tokio::test]
    async fn refuses_encryption_with_single_byte() {
        let (mut client_end, proxy_end) = tokio::io::duplex(1024);
        let mut channel = ClientChannel::new(proxy_end, test_peer());

        client_end
            .write_all(&startup_packet(SSL_REQUEST_CODE, &[]))
            .await
            .unwrap();

        let inbound = channel.read().await.unwrap();
        assert!(matches!(inbound, ClientInbound::Handled));
        assert!(!channel.startup_complete());

        let mut answer = [0u8; 1];
        client_end.read_exact(&mut answer).await.unwrap();
        assert_eq!(answer[0], ENCRYPTION_REFUSED);
    }

    #[tokio::test]
    async fn rejects_cancel_request() {
        let (mut client_end, proxy_end) = tokio::io::duplex(1024);
        let mut channel = ClientChannel::new(proxy_end, test_peer());

        let mut body = Vec::new();
        body.put_i32(1);
        body.put_i32(2);
        client_end
            .write_all(&startup_packet(CANCEL_REQUEST_CODE, &body))
            .await
            .unwrap();

        let result = channel.read().await;
        assert!(matches!(result, Err(SessionError::CancelRequest)));
    }

    #[tokio::test]
    async fn startup_completes_and_is_forwarded() {
        let (mut client_end, proxy_end) = tokio::io::duplex(1024);
        let mut channel = ClientChannel::new(proxy_end, test_peer());

        client_end.write_all(&startup_message_bytes()).await.unwrap();

        let inbound = channel.read().await.unwrap();
        let ClientInbound::Forward(Message::Startup(msg)) = inbound else {
            panic!("expected a startup message, got {inbound:?}");
        };
        assert_eq!(msg.user(), Some("alice"));
        assert!(channel.startup_complete());
    }

    #[tokio::test]
    async fn clean_close_before_startup() {
        let (client_end, proxy_end) = tokio::io::duplex(1024);
        let mut channel = ClientChannel::new(proxy_end, test_peer());

        drop(client_end);
        let inbound = channel.read().await.unwrap();
        assert!(matches!(inbound, ClientInbound::Closed));
    }
}
