use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use thinkgate::normalize::StreamNormalizer;
use thinkgate::provider::ReasoningPattern;

fn build_reasoning_body(events: usize) -> String {
    let mut body = String::new();
    body.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n");
    for i in 0..events {
        if i < events / 2 {
            body.push_str(&format!(
                "data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"reasoning\":\"thought {i} \"}}}}]}}\n\n"
            ));
        } else {
            body.push_str(&format!(
                "data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"token {i} \"}}}}]}}\n\n"
            ));
        }
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn build_plain_body(events: usize) -> String {
    let mut body = String::new();
    for i in 0..events {
        body.push_str(&format!(
            "data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"token {i} \"}}}}]}}\n\n"
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn run_normalizer(body: &str) -> Vec<String> {
    let mut normalizer = StreamNormalizer::new(ReasoningPattern::ImplicitDefault);
    let mut out = Vec::with_capacity(64);
    normalizer.feed_into(body, &mut out);
    normalizer.finish_into(&mut out);
    out
}

fn bench_stream_normalize(c: &mut Criterion) {
    let reasoning_body = build_reasoning_body(512);
    let plain_body = build_plain_body(512);

    let mut group = c.benchmark_group("stream_normalize");

    group.throughput(Throughput::Bytes(reasoning_body.len() as u64));
    group.bench_function("rewrite_reasoning_512_events", |b| {
        b.iter(|| run_normalizer(black_box(&reasoning_body)));
    });

    group.throughput(Throughput::Bytes(plain_body.len() as u64));
    group.bench_function("forward_plain_512_events", |b| {
        b.iter(|| run_normalizer(black_box(&plain_body)));
    });

    group.finish();
}

criterion_group!(benches, bench_stream_normalize);
criterion_main!(benches);
