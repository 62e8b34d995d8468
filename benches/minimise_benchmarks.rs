// File: benches/minimise_benchmarks.rs

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ndarray::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

use relax_minimise::minimize::{hessian_mods::hessian_mod_from_kind, newton_direction};
use relax_minimise::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
enum TestType {
    SteepestDescent,
    Bfgs,
    Newton,
    NewtonCg,
    Dogleg,
    PolakRibierePlus,
}

impl TestType {
    pub fn name(&self) -> &'static str {
        match self {
            TestType::SteepestDescent => "SteepestDescent",
            TestType::Bfgs => "BFGS",
            TestType::Newton => "Newton",
            TestType::NewtonCg => "NewtonCG",
            TestType::Dogleg => "Dogleg",
            TestType::PolakRibierePlus => "PolakRibierePlus",
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            TestType::SteepestDescent => Algorithm::SteepestDescent,
            TestType::Bfgs => Algorithm::Bfgs,
            TestType::Newton => Algorithm::Newton,
            TestType::NewtonCg => Algorithm::NewtonCg,
            TestType::Dogleg => Algorithm::Dogleg,
            TestType::PolakRibierePlus => Algorithm::PolakRibierePlus,
        }
    }

    pub fn all_types() -> Vec<TestType> {
        vec![
            TestType::SteepestDescent,
            TestType::Bfgs,
            TestType::Newton,
            TestType::NewtonCg,
            TestType::Dogleg,
            TestType::PolakRibierePlus,
        ]
    }
}

#[derive(Clone)]
struct TestProblem {
    name: String,
    function: fn(&Array1<f64>) -> f64,
    gradient: fn(&Array1<f64>) -> Array1<f64>,
    hessian: fn(&Array1<f64>) -> Array2<f64>,
    x0: Array1<f64>,
    dimensions: usize,
}

// Test Functions
fn sphere_function(x: &Array1<f64>) -> f64 {
    x.dot(x)
}

fn sphere_gradient(x: &Array1<f64>) -> Array1<f64> {
    x * 2.0
}

fn sphere_hessian(x: &Array1<f64>) -> Array2<f64> {
    Array2::eye(x.len()) * 2.0
}

fn rosenbrock_function(x: &Array1<f64>) -> f64 {
    (0..x.len() - 1)
        .map(|i| 100.0 * (x[i + 1] - x[i] * x[i]).powi(2) + (1.0 - x[i]).powi(2))
        .sum()
}

fn rosenbrock_gradient(x: &Array1<f64>) -> Array1<f64> {
    let n = x.len();
    let mut g = Array1::zeros(n);
    for i in 0..n - 1 {
        let t = x[i + 1] - x[i] * x[i];
        g[i] += -400.0 * x[i] * t - 2.0 * (1.0 - x[i]);
        g[i + 1] += 200.0 * t;
    }
    g
}

fn rosenbrock_hessian(x: &Array1<f64>) -> Array2<f64> {
    let n = x.len();
    let mut h = Array2::zeros((n, n));
    for i in 0..n - 1 {
        h[[i, i]] += 1200.0 * x[i] * x[i] - 400.0 * x[i + 1] + 2.0;
        h[[i, i + 1]] -= 400.0 * x[i];
        h[[i + 1, i]] -= 400.0 * x[i];
        h[[i + 1, i + 1]] += 200.0;
    }
    h
}

fn setup_test_problems() -> Vec<TestProblem> {
    vec![
        TestProblem {
            name: "sphere_3d".to_string(),
            function: sphere_function,
            gradient: sphere_gradient,
            hessian: sphere_hessian,
            x0: array![5.0, 5.0, 5.0],
            dimensions: 3,
        },
        TestProblem {
            name: "rosenbrock_2d".to_string(),
            function: rosenbrock_function,
            gradient: rosenbrock_gradient,
            hessian: rosenbrock_hessian,
            x0: array![-1.2, 1.0],
            dimensions: 2,
        },
        TestProblem {
            name: "rosenbrock_5d".to_string(),
            function: rosenbrock_function,
            gradient: rosenbrock_gradient,
            hessian: rosenbrock_hessian,
            x0: Array1::from_elem(5, -0.5),
            dimensions: 5,
        },
        TestProblem {
            name: "sphere_10d".to_string(),
            function: sphere_function,
            gradient: sphere_gradient,
            hessian: sphere_hessian,
            x0: Array1::from_elem(10, 0.3),
            dimensions: 10,
        },
    ]
}

fn run_optimization_benchmark(
    problem: &TestProblem,
    category: TestType,
    iterations: usize,
    rng: &mut ChaCha8Rng,
) -> (f64, usize) {
    let x_start = problem.x0.mapv(|v| v + rng.gen_range(-0.1..0.1));
    let f = MultiDimHessFn::new(problem.function, problem.gradient, Some(problem.hessian));

    match generic_minimise(
        &f,
        &x_start,
        category.algorithm(),
        &MinOptions::default(),
        None,
        Some(1e-8),
        iterations,
    ) {
        Ok(result) => (result.f, result.iterations),
        Err(_) => (f64::NAN, 0),
    }
}

fn bench_iterations(c: &mut Criterion, iterations: usize, seconds: u64) {
    let problems = setup_test_problems();
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let mut group = c.benchmark_group(format!("minimise_{}_iterations", iterations));
    group.measurement_time(Duration::from_secs(seconds));
    group.sample_size(20);

    for problem in &problems {
        for category in TestType::all_types() {
            group.throughput(Throughput::Elements(problem.dimensions as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("optimization_{}", category.name()), &problem.name),
                &(problem, category),
                |b, (prob, cat)| {
                    b.iter(|| {
                        let (final_value, iterations) = run_optimization_benchmark(
                            black_box(prob),
                            black_box(*cat),
                            black_box(iterations),
                            &mut rng,
                        );
                        black_box((final_value, iterations))
                    });
                },
            );
        }
    }
    group.finish();
}

fn bench_iterations_10(c: &mut Criterion) {
    bench_iterations(c, 10, 5);
}

fn bench_iterations_1000(c: &mut Criterion) {
    bench_iterations(c, 1000, 20);
}

fn bench_hessian_modifiers(c: &mut Criterion) {
    let mut group = c.benchmark_group("hessian_modifiers");
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    for n in [5, 20, 50] {
        let a = Array2::from_shape_fn((n, n), |_| rng.gen_range(-1.0..1.0));
        let h = &a + &a.t();
        let g = Array1::from_shape_fn(n, |_| rng.gen_range(-1.0..1.0));
        for kind in [HessianModKind::Gmw, HessianModKind::Se99, HessianModKind::AddedIdentity] {
            group.bench_with_input(BenchmarkId::new(kind.to_string(), n), &h, |b, h| {
                b.iter(|| {
                    let modifier = hessian_mod_from_kind(kind, 1e-16);
                    black_box(newton_direction(
                        modifier.as_deref(),
                        black_box(h),
                        black_box(&g),
                    ))
                });
            });
        }
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_iterations_10,
    bench_iterations_1000,
    bench_hessian_modifiers
);
criterion_main!(benches);
