//! Tokio codec for framing messages over a byte stream.
//!
//! Streaming decode: returns `None` until a whole frame is buffered, and
//! consumes it with a zero-copy `split_to` once complete.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::frame::{Frame, HEADER_SIZE, MAGIC_BYTES, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use crate::error::BusError;

/// Frame codec for use with `tokio_util::codec::Framed`.
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = BusError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, BusError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        if src[0..4] != MAGIC_BYTES {
            return Err(BusError::InvalidHeader);
        }
        let version = src[4];
        if version != PROTOCOL_VERSION {
            return Err(BusError::UnsupportedVersion(version));
        }
        let len = u32::from_be_bytes([src[5], src[6], src[7], src[8]]) as usize;
        if len > MAX_PAYLOAD_SIZE {
            return Err(BusError::OversizedFrame(len));
        }

        if src.len() < HEADER_SIZE + len {
            // Reserve for the remainder so the next read lands in one buffer.
            src.reserve(HEADER_SIZE + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(len).freeze();
        Ok(Some(Frame { version, payload }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = BusError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), BusError> {
        if frame.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(BusError::OversizedFrame(frame.payload.len()));
        }
        dst.reserve(HEADER_SIZE + frame.payload.len());
        dst.put_slice(&MAGIC_BYTES);
        dst.put_u8(frame.version);
        dst.put_u32(frame.payload.len() as u32);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}
