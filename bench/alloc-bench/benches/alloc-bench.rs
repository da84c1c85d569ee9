use std::time::Duration;

use alloc_bench::workload::{CHALLENGES, Config, Strategy};
use criterion::{Criterion, criterion_group, criterion_main};

fn groups(c: &mut Criterion) {
    alloc_bench::tracing_init();

    let config = Config::from_env();
    if let Err(err) = alloc_bench::report(&config) {
        panic!("failed to run the challenge report: {}", err);
    }

    // traces are only written by the report
    let shape = config.shape();
    let mut g = c.benchmark_group("alloc_benchmark");
    for challenge in CHALLENGES {
        for strategy in Strategy::ALL {
            let id = format!(
                "alloc_benchmark_{:02}_{}_{}_{}",
                challenge.index,
                challenge.min,
                challenge.max,
                strategy.name()
            );
            g.bench_function(&id, |b| {
                b.iter_custom(|iters| {
                    let mut rng = fastrand::Rng::with_seed(config.seed);
                    (0..iters)
                        .map(|_| strategy.run(challenge, shape, &mut rng, None, None).elapsed)
                        .sum::<Duration>()
                })
            });
        }
    }
}

criterion_group!(
    name = alloc_benchmark;
    config = Criterion::default().sample_size(10).measurement_time(Duration::from_secs(30));
    targets = groups
);
criterion_main!(alloc_benchmark);
