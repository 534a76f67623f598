//! Binary frame format.
//!
//! One frame carries exactly one protocol message, already rendered to
//! msgpack bytes by [`crate::core::value`] and [`crate::protocol::message`].
//!
//! ## Wire Format
//! ```text
//! [Magic(4)] [Version(1)] [Length(4, BE)] [Payload(N)]
//! ```
//!
//! Length is validated against [`MAX_PAYLOAD_SIZE`] before any allocation;
//! a frame with bad magic or an unknown version is a fatal connection error.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{BusError, Result};

/// Current supported frame format version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Magic bytes identifying bus frames (0x4F425553, "OBUS").
pub const MAGIC_BYTES: [u8; 4] = [0x4F, 0x42, 0x55, 0x53];

/// Frame header size: magic + version + length.
pub const HEADER_SIZE: usize = 9;

/// Max allowed payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// A single framed message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame format version.
    pub version: u8,
    /// Encoded message bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Wrap a message payload in a current-version frame.
    pub fn new(payload: Bytes) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload,
        }
    }

    /// Serialize the frame, header included.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_slice(&MAGIC_BYTES);
        buf.put_u8(self.version);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a frame from a complete byte slice.
    ///
    /// # Errors
    /// Returns [`BusError::InvalidHeader`] on short input or bad magic,
    /// [`BusError::UnsupportedVersion`] on a version mismatch, and
    /// [`BusError::OversizedFrame`] when the declared length exceeds
    /// [`MAX_PAYLOAD_SIZE`].
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(BusError::InvalidHeader);
        }
        if data[0..4] != MAGIC_BYTES {
            return Err(BusError::InvalidHeader);
        }
        let version = data[4];
        if version != PROTOCOL_VERSION {
            return Err(BusError::UnsupportedVersion(version));
        }
        let len = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) as usize;
        if len > MAX_PAYLOAD_SIZE {
            return Err(BusError::OversizedFrame(len));
        }
        if data.len() < HEADER_SIZE + len {
            return Err(BusError::InvalidHeader);
        }
        Ok(Self {
            version,
            payload: Bytes::copy_from_slice(&data[HEADER_SIZE..HEADER_SIZE + len]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let frame = Frame::new(Bytes::from_static(b"hello"));
        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE + 5);
        let parsed = Frame::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn rejects_bad_magic() {
        let frame = Frame::new(Bytes::from_static(b"x"));
        let mut bytes = frame.to_bytes().to_vec();
        bytes[0] = 0xFF;
        assert!(matches!(
            Frame::from_bytes(&bytes),
            Err(BusError::InvalidHeader)
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let frame = Frame::new(Bytes::from_static(b"x"));
        let mut bytes = frame.to_bytes().to_vec();
        bytes[4] = 9;
        assert!(matches!(
            Frame::from_bytes(&bytes),
            Err(BusError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn rejects_oversized_length() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC_BYTES);
        bytes.push(PROTOCOL_VERSION);
        bytes.extend_from_slice(&((MAX_PAYLOAD_SIZE as u32) + 1).to_be_bytes());
        assert!(matches!(
            Frame::from_bytes(&bytes),
            Err(BusError::OversizedFrame(_))
        ));
    }
}
