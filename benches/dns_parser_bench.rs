use criterion::{Criterion, criterion_group, criterion_main};
use netwatch::dns;
use std::hint::black_box;

fn query_packet() -> Vec<u8> {
    let mut buf = vec![0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    buf.extend(b"\x03www\x07example\x03com\x00");
    buf.extend([0x00, 0x01, 0x00, 0x01]);
    buf
}

fn criterion_benchmark(c: &mut Criterion) {
    let packet = query_packet();
    c.bench_function("dns query parse", |b| {
        b.iter(|| {
            let _ = dns::parse(black_box(&packet));
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
