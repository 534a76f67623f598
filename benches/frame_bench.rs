use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use object_bus::core::{codec::FrameCodec, frame::Frame};
use tokio_util::codec::{Decoder, Encoder};

#[allow(clippy::unwrap_used)]
fn bench_frame_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode_decode");
    let payload_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];

    for &size in &payload_sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || Bytes::from(vec![0u8; size]),
                |payload| {
                    let mut buf = BytesMut::with_capacity(size + 32);
                    let mut codec = FrameCodec;
                    codec.encode(Frame::new(payload), &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("decode_{size}b"), |b| {
            let mut encoded = BytesMut::new();
            let mut codec = FrameCodec;
            codec
                .encode(Frame::new(Bytes::from(vec![0u8; size])), &mut encoded)
                .unwrap();
            b.iter_batched(
                || encoded.clone(),
                |mut buf| {
                    let mut codec = FrameCodec;
                    let decoded = codec.decode(&mut buf).unwrap();
                    assert!(decoded.is_some());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_frame_encode_decode);
criterion_main!(benches);
