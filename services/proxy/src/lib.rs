//! pgrelay: a transparent PostgreSQL wire-protocol proxy.
//!
//! This service:
//! - accepts PostgreSQL client connections and dials one upstream
//!   connection per client
//! - refuses SSL/GSSAPI encryption upgrades with the protocol's
//!   single-byte answer and rejects cancel requests
//! - relays the startup message and all subsequent traffic byte-for-byte
//!   in both directions until either side closes or fails

pub mod config;
pub mod error;
pub mod proxy;

pub use config::ProxyConfig;
pub use error::SessionError;
pub use proxy::{ClientChannel, Listener, ListenerStats, UpstreamChannel};
