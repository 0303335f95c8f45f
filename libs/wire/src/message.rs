//! In-memory message types.
//!
//! The proxy only understands the startup dialect in full; everything after
//! the handshake is carried as an opaque [`Frame`] and re-encoded
//! byte-identically.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::WireError;

/// SSLRequest magic number.
pub const SSL_REQUEST_CODE: i32 = (1234 << 16) | 5679; // 80877103

/// GSSENCRequest magic number.
pub const GSSENC_REQUEST_CODE: i32 = (1234 << 16) | 5680; // 80877104

/// CancelRequest magic number.
pub const CANCEL_REQUEST_CODE: i32 = (1234 << 16) | 5678; // 80877102

/// Single byte answering an encryption-upgrade request with "not supported".
pub const ENCRYPTION_REFUSED: u8 = b'N';

/// A regular protocol message: a one-byte type tag and an opaque payload.
///
/// The length word on the wire covers itself plus the payload; it is
/// recomputed on encode, so a decoded frame always round-trips to the exact
/// bytes it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: u8,
    pub payload: Bytes,
}

impl Frame {
    /// Total size of this frame on the wire.
    pub fn wire_len(&self) -> usize {
        1 + 4 + self.payload.len()
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_len());
        dst.put_u8(self.tag);
        dst.put_i32(4 + self.payload.len() as i32);
        dst.put_slice(&self.payload);
    }
}

/// The startup parameters message, sent exactly once per connection.
///
/// Parameters keep their wire order so that re-encoding reproduces the
/// original bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupMessage {
    pub protocol_version: i32,
    pub parameters: Vec<(String, String)>,
}

impl StartupMessage {
    /// The `user` connection parameter, if present.
    pub fn user(&self) -> Option<&str> {
        self.parameter("user")
    }

    /// The `database` connection parameter, if present.
    pub fn database(&self) -> Option<&str> {
        self.parameter("database")
    }

    fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Decodes the body of a startup message (version and parameter list,
    /// the length word already consumed).
    pub(crate) fn decode_body(src: &mut BytesMut) -> Result<Self, WireError> {
        if src.len() < 4 {
            return Err(WireError::Malformed("startup message too short"));
        }
        let protocol_version = src.get_i32();

        let mut parameters = Vec::new();
        while !src.is_empty() {
            let name = get_cstring(src)?;
            // An empty name terminates the parameter list.
            if name.is_empty() {
                break;
            }
            let value = get_cstring(src)?;
            parameters.push((name, value));
        }

        Ok(Self {
            protocol_version,
            parameters,
        })
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        let body_len: usize = self
            .parameters
            .iter()
            .map(|(n, v)| n.len() + v.len() + 2)
            .sum();
        // length word + version + parameters + terminator
        let total = 4 + 4 + body_len + 1;
        dst.reserve(total);
        dst.put_i32(total as i32);
        dst.put_i32(self.protocol_version);
        for (name, value) in &self.parameters {
            put_cstring(dst, name);
            put_cstring(dst, value);
        }
        dst.put_u8(0);
    }
}

/// A request to cancel an operation running on another connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelRequest {
    pub process_id: i32,
    pub secret_key: i32,
}

impl CancelRequest {
    pub(crate) fn decode_body(src: &mut BytesMut) -> Result<Self, WireError> {
        if src.len() < 8 {
            return Err(WireError::Malformed("cancel request too short"));
        }
        Ok(Self {
            process_id: src.get_i32(),
            secret_key: src.get_i32(),
        })
    }
}

/// One unit of client-originated traffic, as seen by the proxy's
/// client-facing decoder.
#[derive(Debug)]
pub enum ClientPacket {
    /// Pre-startup request to upgrade the connection to TLS.
    SslRequest,
    /// Pre-startup request to upgrade the connection to GSSAPI encryption.
    GssEncRequest,
    /// Out-of-band cancellation of another connection's operation.
    Cancel(CancelRequest),
    /// The startup handshake message.
    Startup(StartupMessage),
    /// Any post-startup message, opaque.
    Regular(Frame),
}

/// A message the proxy forwards: the startup handshake or an opaque frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Startup(StartupMessage),
    Regular(Frame),
}

impl Message {
    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        match self {
            Message::Startup(m) => m.encode(dst),
            Message::Regular(f) => f.encode(dst),
        }
    }
}

/// Reads a null-terminated string, consuming the terminator.
fn get_cstring(src: &mut BytesMut) -> Result<String, WireError> {
    let Some(null_pos) = src.iter().position(|&b| b == 0) else {
        return Err(WireError::Malformed("unterminated string"));
    };
    let bytes = src.split_to(null_pos);
    src.advance(1);
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn put_cstring(dst: &mut BytesMut, s: &str) {
    dst.put_slice(s.as_bytes());
    dst.put_u8(0);
}
