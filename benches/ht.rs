// Copyright (c) 2022. Sebastien Soudan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http:www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A/B test resampling benchmark
#![allow(missing_docs)]

use std::time::Duration;

use abtest_ht::bootstrap::quantile_treatment_effect;
use abtest_ht::prelude::default_quantiles;
use abtest_ht::resampler::{permutation_null_distribution, proportion_null_distribution};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::Distribution;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;

const REPETITIONS: usize = 1_000;

fn samples(size: usize) -> (Vec<f64>, Vec<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(123);

    // control: mean 0, variant: mean 0.5, both with unit standard deviation
    let normal_a = Normal::new(0.0, 1.0).unwrap();
    let s_a = normal_a
        .sample_iter(&mut rng)
        .take(size)
        .collect::<Vec<f64>>();

    let normal_b = Normal::new(0.5, 1.0).unwrap();
    let s_b = normal_b
        .sample_iter(&mut rng)
        .take(size)
        .collect::<Vec<f64>>();

    (s_a, s_b)
}

fn permutation_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("permutation_null_distribution");
    for size in [10, 100, 1000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &samples(size), |b, ab| {
            let (s_a, s_b) = ab;
            let mut rng = ChaCha8Rng::seed_from_u64(42);

            b.iter(|| permutation_null_distribution(&mut rng, s_a, s_b, REPETITIONS))
        });
    }
    group.finish();
}

fn proportion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("proportion_null_distribution");
    for size in [100, 1000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut rng = ChaCha8Rng::seed_from_u64(42);

            b.iter(|| proportion_null_distribution(&mut rng, 0.12, size, size, REPETITIONS))
        });
    }
    group.finish();
}

fn quantile_bootstrap_benchmark(c: &mut Criterion) {
    let quantiles = default_quantiles();

    let mut group = c.benchmark_group("quantile_treatment_effect");
    for size in [100, 1000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &samples(size), |b, ab| {
            let (s_a, s_b) = ab;
            let mut rng = ChaCha8Rng::seed_from_u64(42);

            b.iter(|| quantile_treatment_effect(&mut rng, s_a, s_b, &quantiles, 100))
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(20));
    targets = permutation_benchmark, proportion_benchmark, quantile_bootstrap_benchmark
}
criterion_main!(benches);
