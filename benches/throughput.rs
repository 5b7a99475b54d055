//! Throughput Benchmark for kvscout
//!
//! Measures the client-side cost of decoding the replies a scan receives:
//! SCAN pages, ZSCAN pages and INFO text.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use kvscout::protocol::{RespParser, RespValue};
use kvscout::transport::ServerInfo;

fn scan_page(keys: usize) -> Vec<u8> {
    RespValue::array(vec![
        RespValue::bulk_string("1792"),
        RespValue::array(
            (0..keys)
                .map(|i| RespValue::bulk_string(format!("user:session:{}", i)))
                .collect(),
        ),
    ])
    .serialize()
}

/// Benchmark decoding of SCAN replies
fn bench_scan_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_page");

    for keys in [100, 10_000] {
        let frame = scan_page(keys);
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_function(format!("{}_keys", keys), |b| {
            let mut parser = RespParser::new();
            b.iter(|| parser.parse(black_box(&frame)).unwrap());
        });
    }

    group.finish();
}

/// Benchmark a reply that arrives in pieces and is re-parsed as it grows
fn bench_partial_reply(c: &mut Criterion) {
    let frame = scan_page(1_000);
    let mut group = c.benchmark_group("partial_reply");
    group.throughput(Throughput::Bytes(frame.len() as u64));

    group.bench_function("16_chunks", |b| {
        let mut parser = RespParser::new();
        let step = frame.len() / 16;
        b.iter(|| {
            let mut end = step;
            loop {
                match parser.parse(&frame[..end.min(frame.len())]).unwrap() {
                    Some(parsed) => break black_box(parsed),
                    None => end += step,
                }
            }
        });
    });

    group.finish();
}

/// Benchmark decoding of ZSCAN replies with scores
fn bench_sorted_set_page(c: &mut Criterion) {
    let mut items = Vec::new();
    for i in 0..5_000 {
        items.push(RespValue::bulk_string(format!("player:{}", i)));
        items.push(RespValue::bulk_string(format!("{}.5", i)));
    }
    let frame = RespValue::array(vec![RespValue::bulk_string("0"), RespValue::array(items)]).serialize();

    let mut group = c.benchmark_group("zscan_page");
    group.throughput(Throughput::Elements(5_000));
    group.bench_function("decode_and_scores", |b| {
        let mut parser = RespParser::new();
        b.iter(|| {
            let (value, _) = parser.parse(&frame).unwrap().unwrap();
            let page = value.into_array().unwrap();
            let items = page[1].as_array().unwrap();
            let total: f64 = items
                .chunks(2)
                .filter_map(|pair| pair[1].as_str()?.parse::<f64>().ok())
                .sum();
            black_box(total)
        });
    });
    group.finish();
}

/// Benchmark INFO parsing
fn bench_info(c: &mut Criterion) {
    let mut text = String::from("# Server\r\nredis_version:7.2.4\r\nredis_mode:standalone\r\n");
    for section in ["Clients", "Memory", "Persistence", "Stats", "Replication", "CPU"] {
        text.push_str(&format!("\r\n# {}\r\n", section));
        for i in 0..30 {
            text.push_str(&format!("{}_field_{}:{}\r\n", section.to_lowercase(), i, i * 17));
        }
    }
    text.push_str("\r\n# Keyspace\r\ndb0:keys=1200,expires=3,avg_ttl=0\r\n");

    let mut group = c.benchmark_group("info");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("parse_and_lookup", |b| {
        b.iter(|| {
            let info = ServerInfo::parse(black_box(&text));
            black_box(info.get("server", "redis_version").map(str::len))
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_scan_page,
    bench_partial_reply,
    bench_sorted_set_page,
    bench_info,
);

criterion_main!(benches);
