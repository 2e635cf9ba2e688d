//! Send path benchmarks for chatline.

use chatline_bench::{connect_users, drain, runtime, service};
use chatline_protocol::{NewMessage, UserId};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

/// Benchmark sends within one existing conversation.
fn bench_send_existing_conversation(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("send");
    group.throughput(Throughput::Elements(1));

    let alice = UserId::from("alice");
    let bob = UserId::from("bob");

    group.bench_function("receiver_offline", |b| {
        let svc = service();
        b.iter(|| {
            rt.block_on(svc.send(&alice, &bob, black_box(NewMessage::text("hello"))))
                .unwrap()
        });
    });

    group.bench_function("receiver_online", |b| {
        let svc = service();
        let mut online = rt.block_on(connect_users(&svc, 1));
        let receiver = online[0].0.clone();
        b.iter(|| {
            let message = rt
                .block_on(svc.send(&alice, &receiver, black_box(NewMessage::text("hello"))))
                .unwrap();
            drain(&mut online[0].1);
            message
        });
    });

    group.finish();
}

/// Benchmark first contact, which creates a conversation.
fn bench_send_new_conversation(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("send_first_contact");

    group.bench_function("new_pair", |b| {
        let svc = service();
        let alice = UserId::from("alice");
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let receiver = UserId::new(format!("user-{}", n));
            rt.block_on(svc.send(&alice, &receiver, NewMessage::text("hi")))
                .unwrap()
        });
    });

    group.finish();
}

/// Benchmark unread counting against a growing inbox.
fn bench_unread(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("unread");

    for senders in [10usize, 100] {
        let svc = service();
        let bob = UserId::from("bob");
        rt.block_on(async {
            for i in 0..senders {
                let sender = UserId::new(format!("sender-{}", i));
                for _ in 0..10 {
                    svc.send(&sender, &bob, NewMessage::text("ping")).await.unwrap();
                }
            }
        });

        group.bench_function(format!("total_{}_senders", senders), |b| {
            b.iter(|| rt.block_on(svc.total_unread(black_box(&bob))).unwrap());
        });
        group.bench_function(format!("by_sender_{}_senders", senders), |b| {
            b.iter(|| rt.block_on(svc.unread_by_sender(black_box(&bob))).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_send_existing_conversation,
    bench_send_new_conversation,
    bench_unread
);
criterion_main!(benches);
