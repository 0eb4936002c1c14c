use criterion::{black_box, criterion_group, criterion_main, Criterion};

use veil::crypto::{aead_open, aead_seal};
use veil::proto::{decode, WireFrame};
use veil::session::AckBitmap;

fn bench_aead(c: &mut Criterion) {
    let key = [7u8; 32];
    let nonce = [0u8; 12];
    let payload = vec![0xABu8; 1400];

    c.bench_function("aead_seal_1400b", |b| {
        b.iter(|| aead_seal(&key, &nonce, &[], black_box(&payload)).unwrap())
    });

    let sealed = aead_seal(&key, &nonce, &[], &payload).unwrap();
    c.bench_function("aead_open_1400b", |b| {
        b.iter(|| aead_open(&key, &nonce, &[], black_box(&sealed)).unwrap())
    });
}

fn bench_frame_codec(c: &mut Criterion) {
    let frame = WireFrame::Data {
        stream_id: 1,
        sequence: 42,
        fin: false,
        payload: vec![0u8; 1200],
    };
    let encoded = frame.encode();

    c.bench_function("frame_encode_1200b", |b| {
        b.iter(|| black_box(&frame).encode())
    });

    c.bench_function("frame_decode_1200b", |b| {
        b.iter(|| decode(black_box(&encoded)).unwrap())
    });
}

fn bench_ack_bitmap(c: &mut Criterion) {
    c.bench_function("ack_bitmap_sequential_update", |b| {
        b.iter(|| {
            let mut bitmap = AckBitmap::default();
            for seq in 0..256u64 {
                bitmap.ack(black_box(seq));
            }
            bitmap
        })
    });
}

criterion_group!(benches, bench_aead, bench_frame_codec, bench_ack_bitmap);
criterion_main!(benches);
