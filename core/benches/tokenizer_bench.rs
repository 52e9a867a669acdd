use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sift_core::tokenizer::tokenize;

const PAGE: &str = "Search engines split documents into terms, stem them and record where each \
term appears. Contact ops@example.org or visit https://example.org/docs for the 2.4 release \
notes. Running indexers in parallel keeps 16 writer queues busy while readers rank results.";

fn bench_tokenize(c: &mut Criterion) {
    let long = PAGE.repeat(64);
    c.bench_function("tokenize_paragraph", |b| b.iter(|| tokenize(black_box(PAGE))));
    c.bench_function("tokenize_page", |b| b.iter(|| tokenize(black_box(&long))));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
