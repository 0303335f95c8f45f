//! PostgreSQL v3 wire-protocol framing for pgrelay.
//!
//! This crate knows just enough of the protocol to relay it:
//!
//! - the startup dialect (SSLRequest, GSSENCRequest, CancelRequest, and the
//!   startup parameters message) is parsed in full, because a proxy must
//!   answer or reject those packets itself;
//! - everything after the handshake is an opaque tagged [`Frame`], decoded
//!   and re-encoded byte-identically without interpretation.
//!
//! Framing is built on tokio-util's [`Decoder`]/[`Encoder`] traits so the
//! proxy can drive it through `FramedRead`/`FramedWrite`.
//!
//! [`Decoder`]: tokio_util::codec::Decoder
//! [`Encoder`]: tokio_util::codec::Encoder

mod codec;
mod error;
mod message;

pub use codec::{ClientDecoder, FrameDecoder, MessageEncoder, MAX_MESSAGE_LEN};
pub use error::WireError;
pub use message::{
    CancelRequest, ClientPacket, Frame, Message, StartupMessage, CANCEL_REQUEST_CODE,
    ENCRYPTION_REFUSED, GSSENC_REQUEST_CODE, SSL_REQUEST_CODE,
};
