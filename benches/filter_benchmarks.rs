//! Benchmarks for position filter performance

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use parallax_window::filters::{
    exponential::ExponentialFilter, kalman::KalmanFilter, moving_average::MovingAverageFilter, NoFilter,
    PositionFilter,
};

fn benchmark_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("filters");

    // Face centres in pixels, drifting across a 640x480 frame with jitter
    let test_data: Vec<(f64, f64)> = (0..100)
        .map(|i| {
            let t = f64::from(i) * 0.1;
            let x = 320.0 + 120.0 * t.sin() + 4.0 * rand::random::<f64>();
            let y = 240.0 + 60.0 * t.cos() + 4.0 * rand::random::<f64>();
            (x, y)
        })
        .collect();

    let filter_configs = vec![
        ("no_filter", Box::new(NoFilter) as Box<dyn PositionFilter>),
        ("moving_average_5", Box::new(MovingAverageFilter::new(5))),
        ("moving_average_10", Box::new(MovingAverageFilter::new(10))),
        ("exponential_0.5", Box::new(ExponentialFilter::new(0.5))),
        ("exponential_0.2", Box::new(ExponentialFilter::new(0.2))),
        ("kalman", Box::new(KalmanFilter::new())),
    ];

    for (name, mut filter) in filter_configs {
        group.bench_with_input(BenchmarkId::new("single_update", name), &test_data[0], |b, &(x, y)| {
            b.iter(|| black_box(filter.apply(black_box(x), black_box(y))));
        });

        group.bench_with_input(BenchmarkId::new("sequence_100", name), &test_data, |b, data| {
            b.iter(|| {
                filter.reset();
                for &(x, y) in data {
                    black_box(filter.apply(x, y));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_filters);
criterion_main!(benches);
