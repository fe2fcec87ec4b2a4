//! Wire codec benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pxs_core::assembly::{chunk_delivery, ChunkAssembler};
use pxs_core::defaults;
use pxs_core::registry::{decode_with, encode_with};
use pxs_core::wire::{self, FieldValue};
use pxs_core::Direction;

fn encode_benchmark(c: &mut Criterion) {
    let table = defaults::table(Direction::ToStreamer);
    let values = [
        FieldValue::U16(512),
        FieldValue::U16(384),
        FieldValue::I16(-3),
        FieldValue::I16(7),
    ];

    c.bench_function("encode_mouse_move", |b| {
        b.iter(|| black_box(encode_with(&table, "MouseMove", &values).unwrap()))
    });

    let json = FieldValue::from(r#"{"Console":"stat fps","Resolution":{"Width":1920,"Height":1080}}"#);
    c.bench_function("encode_ui_interaction", |b| {
        b.iter(|| black_box(encode_with(&table, "UIInteraction", std::slice::from_ref(&json)).unwrap()))
    });
}

fn decode_benchmark(c: &mut Criterion) {
    let table = defaults::table(Direction::ToStreamer);
    let encoded = encode_with(
        &table,
        "TouchMove",
        &[
            FieldValue::U8(1),
            FieldValue::U16(100),
            FieldValue::U16(200),
            FieldValue::U8(0),
            FieldValue::U8(128),
            FieldValue::U8(1),
        ],
    )
    .unwrap();

    c.bench_function("decode_touch_move", |b| {
        b.iter(|| {
            let (name, descriptor, payload) = decode_with(&table, &encoded).unwrap();
            black_box(wire::decode_fields(name, &descriptor.structure, payload).unwrap())
        })
    });
}

fn reassembly_benchmark(c: &mut Criterion) {
    let chunk = vec![0xAB; 16 * 1024];
    let total = (chunk.len() * 64) as u32;
    let delivery = chunk_delivery(total, &chunk);

    c.bench_function("reassemble_1mb_freeze_frame", |b| {
        b.iter(|| {
            let mut assembler = ChunkAssembler::new("FreezeFrame");
            let mut out = None;
            for _ in 0..64 {
                out = assembler.push(&delivery).unwrap();
            }
            black_box(out)
        })
    });
}

criterion_group!(benches, encode_benchmark, decode_benchmark, reassembly_benchmark);
criterion_main!(benches);
