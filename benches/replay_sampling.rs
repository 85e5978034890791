use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array1;
use perdqn::config::PerConfig;
use perdqn::replay_buffer::{Experience, PrioritizedReplayBuffer, PrioritizedSampler};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const STATE_SIZE: usize = 8;

fn filled_buffer(size: usize, rng: &mut StdRng) -> PrioritizedReplayBuffer {
    let per = PerConfig::default();
    let mut buffer = PrioritizedReplayBuffer::new(size, &per);
    for i in 0..size {
        buffer.add(Experience {
            state: Array1::from_shape_fn(STATE_SIZE, |_| rng.gen_range(-1.0..1.0)),
            action: i % 4,
            reward: rng.gen_range(-1.0..1.0),
            next_state: Array1::from_shape_fn(STATE_SIZE, |_| rng.gen_range(-1.0..1.0)),
            done: rng.gen_bool(0.05),
        });
    }
    let indices: Vec<usize> = (0..size).collect();
    let deltas: Vec<f32> = (0..size).map(|_| rng.gen_range(0.0..2.0)).collect();
    buffer.update_priorities(&indices, &deltas);
    buffer
}

fn bench_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("prioritized_sample");
    let mut rng = StdRng::seed_from_u64(0);

    for &size in &[1_000usize, 10_000, 100_000] {
        let buffer = filled_buffer(size, &mut rng);
        let mut sampler = PrioritizedSampler::new(&PerConfig::default());
        group.bench_with_input(BenchmarkId::from_parameter(size), &buffer, |b, buffer| {
            b.iter(|| black_box(sampler.sample(buffer, 64, &mut rng).unwrap()))
        });
    }
    group.finish();
}

fn bench_update_priorities(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);
    let mut buffer = filled_buffer(100_000, &mut rng);
    let indices: Vec<usize> = (0..64).map(|_| rng.gen_range(0..100_000)).collect();
    let deltas: Vec<f32> = (0..64).map(|_| rng.gen_range(0.0..2.0)).collect();

    c.bench_function("update_priorities_64", |b| {
        b.iter(|| buffer.update_priorities(black_box(&indices), black_box(&deltas)))
    });
}

criterion_group!(benches, bench_sample, bench_update_priorities);
criterion_main!(benches);
