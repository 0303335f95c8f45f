//! Wire-level error types.

use thiserror::Error;

/// Errors raised while framing or parsing protocol messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// A declared message length outside the legal range.
    #[error("message length {len} out of range (max {max})")]
    LengthOutOfRange { len: i64, max: usize },

    /// A startup packet whose code is neither a known request code nor a
    /// supported protocol version.
    #[error("unsupported protocol version {0:#010x}")]
    UnsupportedVersion(i32),

    /// A message body that does not match its declared layout.
    #[error("malformed message: {0}")]
    Malformed(&'static str),

    /// Startup parameters that are not valid UTF-8.
    #[error("startup parameters are not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The peer closed the connection in the middle of a frame.
    #[error("connection closed mid-message")]
    Truncated,

    /// Transport failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
