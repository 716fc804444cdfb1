use criterion::{black_box, criterion_group, criterion_main, Criterion};
use floodgate::route::discriminator;
use floodgate::{Method, RateLimitHeaders};
use std::collections::{HashMap, HashSet};

fn bucket_keys(c: &mut Criterion) {
    let parents: HashSet<String> =
        ["channels", "guilds", "webhooks"].iter().map(|s| s.to_string()).collect();

    c.bench_function("discriminator_shallow", |b| {
        b.iter(|| discriminator(black_box(Method::Get), black_box("/gateway/bot"), &parents))
    });

    c.bench_function("discriminator_deep", |b| {
        b.iter(|| {
            discriminator(
                black_box(Method::Patch),
                black_box("/channels/813847887657123840/messages/811744550109119488"),
                &parents,
            )
        })
    });
}

fn header_parsing(c: &mut Criterion) {
    let headers: HashMap<String, String> = [
        ("X-RateLimit-Bucket", "abcd1234"),
        ("X-RateLimit-Limit", "5"),
        ("X-RateLimit-Remaining", "4"),
        ("X-RateLimit-Reset-After", "10.5"),
        ("Content-Type", "application/json"),
        ("Date", "Thu, 06 Aug 2026 00:00:00 GMT"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    c.bench_function("parse_rate_limit_headers", |b| {
        b.iter(|| RateLimitHeaders::parse(black_box(&headers)))
    });
}

criterion_group!(benches, bucket_keys, header_parsing);
criterion_main!(benches);
