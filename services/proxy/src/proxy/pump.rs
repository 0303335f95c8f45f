//! The forwarding pump.
//!
//! One step: read a message from one side, write it unchanged to the other.
//! Each step ends in one of three ways: continue, graceful end (the source
//! half-closed cleanly), or fatal end (any other failure). The relay loops
//! repeat the step until one of the terminal outcomes; they are duplicated
//! per direction because the two directions differ in adapter types and in
//! error labeling, not behavior.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

use crate::error::SessionError;
use crate::proxy::client::{ClientChannel, ClientInbound, ClientReader, ClientWriter};
use crate::proxy::upstream::{UpstreamChannel, UpstreamReader, UpstreamWriter};

/// Non-fatal outcome of a single startup-phase pump step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A message was forwarded upstream.
    Forwarded,
    /// The adapter handled the message locally; nothing was forwarded.
    Handled,
    /// The client closed before completing the handshake.
    SourceClosed,
}

/// One client-to-upstream pump step during the startup phase.
pub async fn startup_step<C, U>(
    client: &mut ClientChannel<C>,
    upstream: &mut UpstreamChannel<U>,
) -> Result<Step, SessionError>
where
    C: AsyncRead + AsyncWrite,
    U: AsyncRead + AsyncWrite,
{
    match client.read().await? {
        ClientInbound::Forward(message) => {
            upstream.write(message).await?;
            Ok(Step::Forwarded)
        }
        ClientInbound::Handled => Ok(Step::Handled),
        ClientInbound::Closed => Ok(Step::SourceClosed),
    }
}

/// Relays frames from the client to the upstream until termination.
///
/// `Ok(())` is the graceful outcome: the client half-closed at a frame
/// boundary, and the half-close is propagated to the upstream so it can
/// wind down its side. Any error is fatal for the whole session.
pub async fn relay_client_to_upstream<C, U>(
    mut source: ClientReader<C>,
    mut sink: UpstreamWriter<U>,
) -> Result<(), SessionError>
where
    C: AsyncRead,
    U: AsyncWrite,
{
    loop {
        match source.read().await? {
            Some(frame) => {
                trace!(tag = frame.tag, len = frame.wire_len(), "relay client->upstream");
                sink.write(frame).await?;
            }
            None => {
                sink.close().await;
                return Ok(());
            }
        }
    }
}

/// Relays frames from the upstream to the client until termination.
pub async fn relay_upstream_to_client<C, U>(
    mut source: UpstreamReader<U>,
    mut sink: ClientWriter<C>,
) -> Result<(), SessionError>
where
    C: AsyncWrite,
    U: AsyncRead,
{
    loop {
        match source.read().await? {
            Some(frame) => {
                trace!(tag = frame.tag, len = frame.wire_len(), "relay upstream->client");
                sink.write(frame).await?;
            }
            None => {
                sink.close().await;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use pgrelay_wire::SSL_REQUEST_CODE;

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

    fn frame_bytes(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(tag);
        buf.put_i32((4 + body.len()) as i32);
        buf.extend_from_slice(body);
        buf
    }

    #[tokio::test]
    async fn startup_step_refusal_forwards_nothing() {
        let (mut client_end, proxy_client_end) = tokio::io::duplex(1024);
        let (mut server_end, proxy_server_end) = tokio::io::duplex(1024);
        let mut client = ClientChannel::new(proxy_client_end, test_peer());
        let mut upstream = UpstreamChannel::new(proxy_server_end, test_peer());

        client_end
            .write_all(&startup_packet(SSL_REQUEST_CODE, &[]))
            .await
            .unwrap();
        client_end.write_all(&startup_message_bytes()).await.unwrap();

        let step = startup_step(&mut client, &mut upstream).await.unwrap();
        assert_eq!(step, Step::Handled);

        let step = startup_step(&mut client, &mut upstream).await.unwrap();
        assert_eq!(step, Step::Forwarded);
        assert!(client.startup_complete());

        // Only the startup message reached the upstream; the refusal was
        // answered locally.
        drop(upstream);
        let mut forwarded = Vec::new();
        server_end.read_to_end(&mut forwarded).await.unwrap();
        assert_eq!(forwarded, startup_message_bytes());
    }

    #[tokio::test]
    async fn relay_preserves_order_and_bytes() {
        let (mut client_end, proxy_client_end) = tokio::io::duplex(4096);
        let (mut server_end, proxy_server_end) = tokio::io::duplex(4096);
        let mut client = ClientChannel::new(proxy_client_end, test_peer());
        let mut upstream = UpstreamChannel::new(proxy_server_end, test_peer());

        client_end.write_all(&startup_message_bytes()).await.unwrap();
        startup_step(&mut client, &mut upstream).await.unwrap();

        let (client_reader, _client_writer) = client.into_split();
        let (_upstream_reader, upstream_writer) = upstream.into_split();
        let relay = tokio::spawn(relay_client_to_upstream(client_reader, upstream_writer));

        let mut sent = Vec::new();
        for (tag, body) in [
            (b'Q', &b"SELECT 1\0"[..]),
            (b'P', &b"stmt\0"[..]),
            (b'S', &b""[..]),
        ] {
            let bytes = frame_bytes(tag, body);
            client_end.write_all(&bytes).await.unwrap();
            sent.extend_from_slice(&bytes);
        }
        // Half-close the client; the relay should finish gracefully and
        // propagate the shutdown.
        client_end.shutdown().await.unwrap();

        assert!(relay.await.unwrap().is_ok());

        let mut received = Vec::new();
        let startup = startup_message_bytes();
        server_end.read_to_end(&mut received).await.unwrap();
        assert_eq!(&received[..startup.len()], &startup[..]);
        assert_eq!(&received[startup.len()..], &sent[..]);
    }

    #[tokio::test]
    async fn relay_upstream_to_client_ends_on_server_close() {
        let (mut client_end, proxy_client_end) = tokio::io::duplex(1024);
        let (mut server_end, proxy_server_end) = tokio::io::duplex(1024);

        let mut client = ClientChannel::new(proxy_client_end, test_peer());
        let upstream = UpstreamChannel::new(proxy_server_end, test_peer());

        client_end.write_all(&startup_message_bytes()).await.unwrap();
        client.read().await.unwrap();

        let (_client_reader, client_writer) = client.into_split();
        let (upstream_reader, _upstream_writer) = upstream.into_split();
        let relay = tokio::spawn(relay_upstream_to_client(upstream_reader, client_writer));

        let reply = frame_bytes(b'Z', b"I");
        server_end.write_all(&reply).await.unwrap();
        server_end.shutdown().await.unwrap();

        assert!(relay.await.unwrap().is_ok());

        let mut received = Vec::new();
        client_end.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, reply);
    }
}
