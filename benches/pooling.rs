use criterion::{Criterion, criterion_group, criterion_main};
use recipe_search::encoder::pooling::{l2_normalize, mean_pool};
use std::hint::black_box;

const BATCH: usize = 16;
const SEQ_LEN: usize = 128;
const HIDDEN: usize = 384;

pub fn criterion_benchmark(c: &mut Criterion) {
    let hidden: Vec<f32> = (0..BATCH * SEQ_LEN * HIDDEN)
        .map(|i| ((i % 97) as f32 - 48.0) / 48.0)
        .collect();
    // Each row has a different amount of padding
    let mask: Vec<i64> = (0..BATCH)
        .flat_map(|row| (0..SEQ_LEN).map(move |pos| i64::from(pos < SEQ_LEN - row * 4)))
        .collect();

    c.bench_function("mean_pool", |b| {
        b.iter(|| {
            mean_pool(
                black_box(&hidden),
                black_box(&mask),
                BATCH,
                SEQ_LEN,
                HIDDEN,
            )
        });
    });

    let pooled = mean_pool(&hidden, &mask, BATCH, SEQ_LEN, HIDDEN);
    c.bench_function("l2_normalize", |b| {
        b.iter(|| {
            let mut vectors = pooled.clone();
            for vector in &mut vectors {
                l2_normalize(black_box(vector));
            }
            vectors
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
