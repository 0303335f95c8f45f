//! Session error types.

use pgrelay_wire::WireError;
use thiserror::Error;

/// Terminal failure of one proxied session.
///
/// Every variant is fatal for its session and never retried; a graceful
/// peer close is not an error and is reported as a plain `Ok` termination
/// instead.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A cancel request arrived where a startup message was expected.
    /// Cancel requests target another connection's operation and are not
    /// relayed by this proxy.
    #[error("cancel request received during startup")]
    CancelRequest,

    /// Reading or decoding a client message failed.
    #[error("client read: {0}")]
    ClientRead(#[source] WireError),

    /// Writing a message to the client failed.
    #[error("client write: {0}")]
    ClientWrite(#[source] WireError),

    /// Reading or decoding an upstream message failed.
    #[error("upstream read: {0}")]
    UpstreamRead(#[source] WireError),

    /// Writing a message upstream failed.
    #[error("upstream write: {0}")]
    UpstreamWrite(#[source] WireError),
}
