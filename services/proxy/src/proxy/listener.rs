//! TCP listener and per-connection dispatch.
//!
//! Accepts client connections, dials the upstream server once per client,
//! and hands each established pair to a session. Everything protocol-aware
//! lives in the session and below; this module is plain accept-loop
//! orchestration.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn, Instrument};

use crate::config::ProxyConfig;
use crate::proxy::session;

/// Statistics for a proxy listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicU64,
    /// Connections currently being proxied.
    pub connections_active: AtomicU64,
    /// Total connections closed.
    pub connections_closed: AtomicU64,
    /// Upstream dials that failed.
    pub upstream_failures: AtomicU64,
    /// Sessions that ended with a fatal error.
    pub sessions_failed: AtomicU64,
}

/// A proxy listener bound to its configured address.
pub struct Listener {
    config: ProxyConfig,
    listener: TcpListener,
    stats: Arc<ListenerStats>,
}

impl Listener {
    /// Binds the listen address.
    pub async fn bind(config: ProxyConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr.as_str()).await?;
        let local_addr = listener.local_addr()?;

        info!(
            listen_addr = %local_addr,
            upstream_addr = %config.upstream_addr,
            "listener bound"
        );

        Ok(Self {
            config,
            listener,
            stats: Arc::new(ListenerStats::default()),
        })
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Listener statistics.
    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Accepts and proxies connections until the process ends.
    ///
    /// Session concurrency is unbounded: every accepted client gets its own
    /// task and its own upstream connection.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!(listen_addr = %local_addr, "listener started");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    self.stats
                        .connections_accepted
                        .fetch_add(1, Ordering::Relaxed);
                    self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
                    debug!(peer_addr = %peer_addr, "connection accepted");

                    let listener = Arc::clone(&self);
                    let stats = Arc::clone(&self.stats);
                    tokio::spawn(
                        async move {
                            listener.handle_connection(stream, peer_addr).await;
                            stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                            stats.connections_closed.fetch_add(1, Ordering::Relaxed);
                        }
                        .instrument(tracing::info_span!("session", peer = %peer_addr)),
                    );
                }
                Err(e) => {
                    error!(error = %e, "accept error");
                    // Brief sleep to avoid a tight loop on persistent errors.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Proxies a single accepted connection to completion.
    ///
    /// A failed upstream dial ends only this session; the listener keeps
    /// accepting.
    async fn handle_connection(&self, client: TcpStream, peer_addr: SocketAddr) {
        let upstream = match TcpStream::connect(self.config.upstream_addr.as_str()).await {
            Ok(stream) => stream,
            Err(e) => {
                self.stats.upstream_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    upstream_addr = %self.config.upstream_addr,
                    error = %e,
                    "upstream connect failed, dropping client"
                );
                return;
            }
        };
        let upstream_addr = match upstream.peer_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.stats.upstream_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "upstream connection unusable, dropping client");
                return;
            }
        };
        debug!(upstream_addr = %upstream_addr, "upstream connected");

        match session::run(client, peer_addr, upstream, upstream_addr).await {
            Ok(()) => debug!(peer_addr = %peer_addr, "session closed"),
            Err(e) => {
                self.stats.sessions_failed.fetch_add(1, Ordering::Relaxed);
                warn!(peer_addr = %peer_addr, error = %e, "session terminated");
            }
        }
    }
}
