//! Per-connection session orchestration.
//!
//! A session owns exactly one client connection and one upstream
//! connection. It relays the startup handshake first, then pumps the two
//! directions concurrently until either side terminates; the first terminal
//! outcome wins and tears the pair down.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::SessionError;
use crate::proxy::client::ClientChannel;
use crate::proxy::pump::{self, Step};
use crate::proxy::upstream::UpstreamChannel;

/// Runs one proxied session over an established connection pair.
///
/// Returns `Ok(())` when the session ended with a clean peer close and the
/// terminal [`SessionError`] otherwise. Either way both connections are
/// released before returning; nothing is retried.
pub async fn run<C, U>(
    client_stream: C,
    peer_addr: SocketAddr,
    upstream_stream: U,
    upstream_addr: SocketAddr,
) -> Result<(), SessionError>
where
    C: AsyncRead + AsyncWrite,
    U: AsyncRead + AsyncWrite,
{
    let mut client = ClientChannel::new(client_stream, peer_addr);
    let mut upstream = UpstreamChannel::new(upstream_stream, upstream_addr);

    // Relay the startup handshake before pumping both directions. The
    // upstream stays silent until it has seen the startup message, so only
    // the client-to-upstream direction can carry traffic here.
    while !client.startup_complete() {
        match pump::startup_step(&mut client, &mut upstream).await {
            Ok(Step::Forwarded | Step::Handled) => {}
            Ok(Step::SourceClosed) => {
                debug!(peer_addr = %peer_addr, "client left during startup");
                client.close().await;
                upstream.close().await;
                return Ok(());
            }
            Err(e) => {
                client.close().await;
                upstream.close().await;
                return Err(e);
            }
        }
    }

    let (client_reader, client_writer) = client.into_split();
    let (upstream_reader, upstream_writer) = upstream.into_split();

    // Race the two directions; the first terminal outcome wins. Dropping
    // the losing future releases its halves of both connections, so the
    // pair is fully torn down when this returns.
    let outcome = tokio::select! {
        r = pump::relay_client_to_upstream(client_reader, upstream_writer) => r,
        r = pump::relay_upstream_to_client(upstream_reader, client_writer) => r,
    };

    debug!(
        peer_addr = %peer_addr,
        upstream_addr = %upstream_addr,
        graceful = outcome.is_ok(),
        "session finished"
    );
    outcome
}
