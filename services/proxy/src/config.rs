//! Proxy configuration.

/// Immutable proxy configuration, resolved once at startup and passed into
/// the listener constructor.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// `host:port` to accept client connections on.
    pub listen_addr: String,

    /// `host:port` of the upstream PostgreSQL server.
    pub upstream_addr: String,
}
