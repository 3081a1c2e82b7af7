//! Criterion benchmarks for the market-model evolvers and engines.
//!
//! Benchmarks cover:
//! - one forward-rate path per iteration, by scheme and drift method
//! - accounting-engine valuation of caplets, sequential and path-parallel

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ql_core::Result;
use ql_marketmodels::{
    parallel_path_values, AccountingEngine, BrownianGeneratorFactory, CorrelationModel,
    CorrelationStructure, DriftMethod, EvolutionDescription, EvolutionScheme, EvolverConfig,
    ForwardRateEvolver, MarketModel, MarketModelEvolver, MtBrownianGeneratorFactory,
    MultiStepCaplets, ParallelConfig,
};
use ql_math::SequenceStatistics;

const RATES: usize = 20;
const FACTORS: usize = 3;

fn rate_times() -> Vec<f64> {
    (0..=RATES).map(|i| 0.5 * (i + 1) as f64).collect()
}

fn model() -> Arc<dyn MarketModel> {
    let times = rate_times();
    let evolution = EvolutionDescription::new(times.clone(), times[..RATES].to_vec(), None, None)
        .expect("valid evolution");
    Arc::new(
        CorrelationModel::new(
            evolution,
            vec![0.2; RATES],
            CorrelationStructure::Exponential {
                long_term_correlation: 0.5,
                beta: 0.2,
            },
            vec![0.04; RATES],
            FACTORS,
        )
        .expect("valid model"),
    )
}

fn evolver(model: Arc<dyn MarketModel>, config: EvolverConfig, seed: u64) -> Box<dyn MarketModelEvolver> {
    let generator = MtBrownianGeneratorFactory::new(seed).create(FACTORS, RATES);
    Box::new(ForwardRateEvolver::new(model, generator, config).expect("valid evolver"))
}

fn caplets() -> MultiStepCaplets {
    let times = rate_times();
    MultiStepCaplets::new(&times, vec![0.5; RATES], times[1..].to_vec(), vec![0.04; RATES])
        .expect("valid caplets")
}

/// One full path per iteration.
fn bench_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_rate_path");
    let m = model();

    for (name, scheme, drift) in [
        ("euler_plain", EvolutionScheme::Euler, DriftMethod::Plain),
        ("euler_reduced", EvolutionScheme::Euler, DriftMethod::Reduced),
        ("pc_reduced", EvolutionScheme::PredictorCorrector, DriftMethod::Reduced),
    ] {
        let config = EvolverConfig::default()
            .with_scheme(scheme)
            .with_drift_method(drift);
        let mut e = evolver(m.clone(), config, 42);
        group.bench_function(name, |b| {
            b.iter(|| {
                e.start_new_path().expect("path starts");
                for _ in 0..RATES {
                    black_box(e.advance_step().expect("step"));
                }
            })
        });
    }

    group.finish();
}

/// Caplet valuation with varying path counts.
fn bench_valuation(c: &mut Criterion) {
    let mut group = c.benchmark_group("caplet_valuation");
    group.sample_size(20);
    let m = model();

    for paths in [1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("sequential", paths), &paths, |b, &n| {
            b.iter(|| {
                let mut engine =
                    AccountingEngine::new(evolver(m.clone(), EvolverConfig::default(), 42), Box::new(caplets()), 1.0)
                        .expect("valid engine");
                let mut stats = SequenceStatistics::new(RATES);
                engine.multiple_path_values(&mut stats, n).expect("paths");
                black_box(stats.mean())
            })
        });

        group.bench_with_input(BenchmarkId::new("parallel", paths), &paths, |b, &n| {
            let factory = MtBrownianGeneratorFactory::new(42);
            let make = |chunk: usize| -> Result<Box<dyn MarketModelEvolver>> {
                let generator = factory.for_stream(chunk as u64).create(FACTORS, RATES);
                Ok(Box::new(ForwardRateEvolver::new(
                    m.clone(),
                    generator,
                    EvolverConfig::default(),
                )?))
            };
            let product = caplets();
            b.iter(|| {
                let stats = parallel_path_values(make, &product, 1.0, n, &ParallelConfig::default())
                    .expect("paths");
                black_box(stats.mean())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_paths, bench_valuation);
criterion_main!(benches);
