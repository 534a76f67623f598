//! Integration tests for frame codec streaming behavior.
//!
//! Validates the zero-copy characteristics of the codec and its handling
//! of partial, exact, and batched input.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::{Bytes, BytesMut};
use object_bus::core::codec::FrameCodec;
use object_bus::core::frame::{Frame, HEADER_SIZE, MAGIC_BYTES, PROTOCOL_VERSION};
use object_bus::error::BusError;
use tokio_util::codec::{Decoder, Encoder};

#[test]
fn test_decode_zero_copy_split() {
    let mut codec = FrameCodec;

    let frame = Frame::new(Bytes::from_static(&[1, 2, 3, 4, 5]));
    let bytes = frame.to_bytes();

    let mut buffer = BytesMut::from(&bytes[..]);
    let original_capacity = buffer.capacity();

    let decoded = codec.decode(&mut buffer).expect("decode").expect("frame");
    assert_eq!(decoded.payload, Bytes::from_static(&[1, 2, 3, 4, 5]));

    // Buffer fully consumed, capacity preserved (no reallocation).
    assert_eq!(buffer.len(), 0);
    assert!(buffer.capacity() <= original_capacity);
}

#[test]
fn test_partial_decode_preserves_buffer() {
    let mut codec = FrameCodec;

    // Only magic + version, no length yet.
    let mut buffer = BytesMut::new();
    buffer.extend_from_slice(&MAGIC_BYTES);
    buffer.extend_from_slice(&[PROTOCOL_VERSION]);

    let result = codec.decode(&mut buffer).expect("decode should not error");
    assert!(result.is_none());
    assert_eq!(buffer.len(), 5);
}

#[test]
fn test_encode_exact_layout() {
    let mut codec = FrameCodec;

    let payload = Bytes::from(vec![0u8; 100]);
    let mut buffer = BytesMut::new();
    codec
        .encode(Frame::new(payload.clone()), &mut buffer)
        .expect("encode");

    assert_eq!(buffer.len(), HEADER_SIZE + 100);

    let decoded = Frame::from_bytes(&buffer.freeze()).expect("from_bytes");
    assert_eq!(decoded.payload, payload);
}

#[test]
fn test_multiple_frames_in_buffer() {
    let mut codec = FrameCodec;

    let mut buffer = BytesMut::new();
    codec
        .encode(Frame::new(Bytes::from_static(&[1, 2, 3])), &mut buffer)
        .expect("encode");
    codec
        .encode(Frame::new(Bytes::from_static(&[4, 5, 6])), &mut buffer)
        .expect("encode");

    let first = codec.decode(&mut buffer).expect("decode").expect("frame");
    assert_eq!(first.payload, Bytes::from_static(&[1, 2, 3]));

    let second = codec.decode(&mut buffer).expect("decode").expect("frame");
    assert_eq!(second.payload, Bytes::from_static(&[4, 5, 6]));

    assert_eq!(buffer.len(), 0);
}

#[test]
fn test_incremental_buffer_fill() {
    let mut codec = FrameCodec;

    let frame = Frame::new(Bytes::from(vec![7u8; 10]));
    let full_bytes = frame.to_bytes();

    let mut buffer = BytesMut::new();
    for (i, byte) in full_bytes.iter().enumerate() {
        buffer.extend_from_slice(&[*byte]);

        let result = codec.decode(&mut buffer).expect("decode");
        if i < full_bytes.len() - 1 {
            assert!(result.is_none());
            assert!(!buffer.is_empty());
        } else {
            let decoded = result.expect("frame complete");
            assert_eq!(decoded.payload, Bytes::from(vec![7u8; 10]));
            assert_eq!(buffer.len(), 0);
        }
    }
}

#[test]
fn test_large_payload_roundtrip() {
    let mut codec = FrameCodec;

    let payload = Bytes::from(vec![0xAB; 1024 * 1024]);
    let mut buffer = BytesMut::new();
    codec
        .encode(Frame::new(payload.clone()), &mut buffer)
        .expect("encode");

    assert_eq!(buffer.len(), HEADER_SIZE + 1024 * 1024);

    let decoded = codec.decode(&mut buffer).expect("decode").expect("frame");
    assert_eq!(decoded.payload.len(), 1024 * 1024);
    assert_eq!(decoded.payload[0], 0xAB);
}

#[test]
fn test_bad_magic_is_fatal() {
    let mut codec = FrameCodec;

    let mut buffer = BytesMut::from(&[0xDE, 0xAD, 0xBE, 0xEF, 1, 0, 0, 0, 0][..]);
    assert!(matches!(
        codec.decode(&mut buffer),
        Err(BusError::InvalidHeader)
    ));
}

#[test]
fn test_version_mismatch_is_fatal() {
    let mut codec = FrameCodec;

    let mut buffer = BytesMut::new();
    buffer.extend_from_slice(&MAGIC_BYTES);
    buffer.extend_from_slice(&[99, 0, 0, 0, 0]);
    assert!(matches!(
        codec.decode(&mut buffer),
        Err(BusError::UnsupportedVersion(99))
    ));
}

#[test]
fn test_oversized_length_rejected_before_allocation() {
    let mut codec = FrameCodec;

    let mut buffer = BytesMut::new();
    buffer.extend_from_slice(&MAGIC_BYTES);
    buffer.extend_from_slice(&[PROTOCOL_VERSION]);
    buffer.extend_from_slice(&u32::MAX.to_be_bytes());
    assert!(matches!(
        codec.decode(&mut buffer),
        Err(BusError::OversizedFrame(_))
    ));
}

#[test]
fn test_buffer_reuse_across_frames() {
    let mut codec = FrameCodec;

    let mut buffer = BytesMut::with_capacity(1024);
    for i in 0..10u8 {
        codec
            .encode(Frame::new(Bytes::from(vec![i; 10])), &mut buffer)
            .expect("encode");
    }

    assert_eq!(buffer.len(), 10 * (HEADER_SIZE + 10));

    let mut count = 0u8;
    while let Some(frame) = codec.decode(&mut buffer).expect("decode") {
        assert_eq!(frame.payload.len(), 10);
        assert_eq!(frame.payload[0], count);
        count += 1;
    }
    assert_eq!(count, 10);
}
