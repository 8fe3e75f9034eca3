use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use superq_estimator::objective::{objective_gradient, objective_value, ObjectiveKind};
use superq_model::Superquadric;

fn bench_objective(c: &mut Criterion) {
    let mut group = c.benchmark_group("objective");

    let x = [0.05, 0.04, 0.03, 0.6, 0.9, 0.1, -0.1, 0.3, 0.4, 0.7, -0.2];
    let truth = [0.055, 0.038, 0.031, 0.5, 1.0, 0.1, -0.1, 0.3, 0.4, 0.7, -0.2];
    let shape = Superquadric::from_params(&truth).unwrap_or_default();

    for (n_lat, n_lon) in [(5, 10), (10, 20), (20, 50)].iter() {
        let points = shape.sample_surface(*n_lat, *n_lon);
        group.throughput(criterion::Throughput::Elements(points.len() as u64));
        let parameter_string = format!("{}", points.len());

        for kind in [ObjectiveKind::SumOfSquares, ObjectiveKind::VolumeNormalized] {
            group.bench_with_input(
                BenchmarkId::new(format!("value_{kind:?}"), &parameter_string),
                &points,
                |b, points| b.iter(|| black_box(objective_value(kind, &x, points))),
            );

            group.bench_with_input(
                BenchmarkId::new(format!("gradient_{kind:?}"), &parameter_string),
                &points,
                |b, points| {
                    let mut grad = [0.0; 11];
                    b.iter(|| {
                        objective_gradient(kind, &x, points, &mut grad);
                        black_box(grad);
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_objective);
criterion_main!(benches);
