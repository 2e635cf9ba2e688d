//! Codec benchmarks for live events.

use chatline_protocol::{codec, ConversationId, DeliveryStatus, ServerEvent};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_encode(c: &mut Criterion) {
    let event = ServerEvent::StatusUpdated {
        conversation_id: ConversationId::generate(),
        status: DeliveryStatus::Seen,
        updated_by: "bob".into(),
        count: 12,
    };

    c.bench_function("encode_status_msgpack", |b| {
        b.iter(|| codec::encode(black_box(&event)).unwrap())
    });
    c.bench_function("encode_status_json", |b| {
        b.iter(|| codec::encode_text(black_box(&event)).unwrap())
    });
}

fn bench_decode(c: &mut Criterion) {
    let event = ServerEvent::MessageEdited {
        message_id: chatline_protocol::MessageId::generate(),
        content: "x".repeat(256),
    };
    let encoded = codec::encode(&event).unwrap();

    c.bench_function("decode_edit_msgpack", |b| {
        b.iter(|| codec::decode::<ServerEvent>(black_box(&encoded)).unwrap())
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
