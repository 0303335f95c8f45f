//! Framing codecs.
//!
//! Two stream shapes exist on a proxied connection:
//!
//! - the startup dialect: untagged packets of `Int32 length, Int32 code,
//!   body`, sent only by the client and only before the handshake completes;
//! - regular traffic: tagged frames of `Byte1 tag, Int32 length, body`,
//!   sent by both sides for the rest of the connection.
//!
//! [`ClientDecoder`] understands both and switches permanently from the
//! first to the second when it sees the startup message. [`FrameDecoder`]
//! only understands regular frames; the upstream never speaks the startup
//! dialect to the proxy.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::WireError;
use crate::message::{
    CancelRequest, ClientPacket, Frame, Message, StartupMessage, CANCEL_REQUEST_CODE,
    GSSENC_REQUEST_CODE, SSL_REQUEST_CODE,
};

/// Maximum accepted message length in bytes (16 MiB).
///
/// PostgreSQL itself allows up to 1 GB; a relay has no business buffering
/// that much for a single message.
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// Decoder for the client side of a proxied connection.
///
/// Starts in the startup dialect and flips to regular framing when the
/// startup message arrives. The flip is one-way: once regular traffic has
/// begun, bytes that happen to look like startup packets are framed as
/// opaque regular messages like everything else.
#[derive(Debug)]
pub struct ClientDecoder {
    startup_complete: bool,
    max_message_len: usize,
}

impl ClientDecoder {
    pub fn new() -> Self {
        Self {
            startup_complete: false,
            max_message_len: MAX_MESSAGE_LEN,
        }
    }

    /// Whether the startup handshake message has been decoded.
    pub fn startup_complete(&self) -> bool {
        self.startup_complete
    }

    fn decode_startup(&mut self, src: &mut BytesMut) -> Result<Option<ClientPacket>, WireError> {
        // Int32 length (includes itself) followed by Int32 code.
        if src.len() < 8 {
            return Ok(None);
        }
        let len = i32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        if len < 8 || len as usize > self.max_message_len {
            return Err(WireError::LengthOutOfRange {
                len: i64::from(len),
                max: self.max_message_len,
            });
        }
        let len = len as usize;
        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        let mut body = src.split_to(len);
        body.advance(4);
        let code = i32::from_be_bytes([body[0], body[1], body[2], body[3]]);

        let packet = match code {
            SSL_REQUEST_CODE => ClientPacket::SslRequest,
            GSSENC_REQUEST_CODE => ClientPacket::GssEncRequest,
            CANCEL_REQUEST_CODE => {
                body.advance(4);
                ClientPacket::Cancel(CancelRequest::decode_body(&mut body)?)
            }
            version if version >> 16 == 3 => {
                let message = StartupMessage::decode_body(&mut body)?;
                self.startup_complete = true;
                ClientPacket::Startup(message)
            }
            other => return Err(WireError::UnsupportedVersion(other)),
        };
        Ok(Some(packet))
    }
}

impl Default for ClientDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ClientDecoder {
    type Item = ClientPacket;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.startup_complete {
            Ok(decode_frame(src, self.max_message_len)?.map(ClientPacket::Regular))
        } else {
            self.decode_startup(src)
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(packet) => Ok(Some(packet)),
            None if src.is_empty() => Ok(None),
            None => Err(WireError::Truncated),
        }
    }
}

/// Decoder for regular tagged frames, used on the upstream side.
#[derive(Debug)]
pub struct FrameDecoder {
    max_message_len: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            max_message_len: MAX_MESSAGE_LEN,
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameDecoder {
    type Item = Frame;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, self.max_message_len)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(WireError::Truncated),
        }
    }
}

fn decode_frame(src: &mut BytesMut, max: usize) -> Result<Option<Frame>, WireError> {
    // Byte1 tag followed by Int32 length (includes itself, excludes the tag).
    if src.len() < 5 {
        return Ok(None);
    }
    let len = i32::from_be_bytes([src[1], src[2], src[3], src[4]]);
    if len < 4 || len as usize > max {
        return Err(WireError::LengthOutOfRange {
            len: i64::from(len),
            max,
        });
    }
    let total = 1 + len as usize;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    let mut buf = src.split_to(total);
    let tag = buf.get_u8();
    buf.advance(4);
    Ok(Some(Frame {
        tag,
        payload: buf.freeze(),
    }))
}

/// Encoder for everything the proxy writes: opaque frames in both
/// directions and the startup message toward the upstream.
#[derive(Debug, Default)]
pub struct MessageEncoder;

impl MessageEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<Frame> for MessageEncoder {
    type Error = WireError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst);
        Ok(())
    }
}

impl Encoder<Message> for MessageEncoder {
    type Error = WireError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst);
        Ok(())
    }
}
