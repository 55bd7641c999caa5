//! NetworkMessage encode/decode benchmarks

use criterion::{Criterion, criterion_group, criterion_main};
use pubsub_common::pubsub::types::{ContentFlags, DataSetContentMask, PublisherId};
use pubsub_common::types::Variant;
use pubsub_message::{NetworkMessage, text, uadp};
use std::hint::black_box;

fn build(nb_fields: usize) -> NetworkMessage {
    let mut msg = NetworkMessage::create(1, nb_fields).unwrap();
    msg.set_header(PublisherId::UInt16(1), Some(1), Some(1), 1).unwrap();
    msg.set_writer_id(0, 1).unwrap();
    msg.set_content_mask(0, DataSetContentMask::key_frame(ContentFlags::SEQUENCE_NUMBER))
        .unwrap();
    for i in 0..nb_fields {
        msg.set_field(0, i, Variant::from(i as u32)).unwrap();
    }
    msg
}

/// Benchmark UADP encoding into a preallocated buffer
fn bench_encode(c: &mut Criterion) {
    for n in [8usize, 64, 200] {
        let msg = build(n);
        let mut buf = vec![0u8; 1500];
        c.bench_function(&format!("uadp_encode_{n}_fields"), |b| {
            b.iter(|| black_box(msg.encode_to_slice(&mut buf).unwrap()));
        });
    }
}

/// Benchmark UADP and text decoding
fn bench_decode(c: &mut Criterion) {
    let bytes = build(64).encode(1500).unwrap();
    c.bench_function("uadp_decode_64_fields", |b| {
        b.iter(|| black_box(uadp::decode(black_box(&bytes)).unwrap()));
    });

    let frame: String = (0..32).map(|i| format!("Field{i}:{i},")).collect();
    c.bench_function("text_decode_32_pairs", |b| {
        b.iter(|| black_box(text::decode_pairs(black_box(&frame)).unwrap().len()));
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
