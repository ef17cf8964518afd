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

//! Null-hypothesis simulation.
//!
//! Under H0 the group a row belongs to has no effect on the metric. The distribution of the
//! treatment effect under H0 is built by simulation rather than from a closed form:
//! - continuous metrics: permutation test, the pooled values are shuffled and split back
//!   into two groups of the original sizes;
//! - conversion metrics: both groups are redrawn as Bernoulli trials at the pooled rate.
//!
//! The p-value is then read off the simulated distribution.

use std::iter::Sum;

use num_traits::Float;
use rand::prelude::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::config::PValueType;
use crate::utils::{as_float, mean};
use crate::Error;

const PROGRESS_EVERY: usize = 100;

/// Shuffles the pooled values of two groups and splits them back at the control size.
///
/// The pool is shuffled in place, so each split costs a single pass over `n + m` values.
pub struct PermutationSampler<F> {
    pool: Vec<F>,
    n_control: usize,
}

impl<F: Float> PermutationSampler<F> {
    /// Pool `control` and `variant`.
    pub fn new(control: &[F], variant: &[F]) -> Result<Self, Error> {
        if control.is_empty() || variant.is_empty() {
            return Err(Error::NotEnoughSamples);
        }
        Ok(Self {
            pool: [control, variant].concat(),
            n_control: control.len(),
        })
    }

    /// Draw a uniformly random relabelling: `(simulated control, simulated variant)`.
    pub fn next_split<R: Rng + ?Sized>(&mut self, rng: &mut R) -> (&[F], &[F]) {
        self.pool.shuffle(rng);
        self.pool.split_at(self.n_control)
    }
}

/// Null distribution of the difference of means `mean(variant) - mean(control)` by
/// permutation, one value per repetition.
///
/// # Example
///
/// ```rust
/// use abtest_ht::prelude::*;
///
/// let mut rng = seeded(42);
/// let control = [1.0, 2.0, 3.0, 4.0];
/// let variant = [2.0, 3.0, 4.0, 5.0, 6.0];
/// let null = permutation_null_distribution(&mut rng, &control, &variant, 500).unwrap();
/// assert_eq!(null.len(), 500);
/// ```
pub fn permutation_null_distribution<R: Rng + ?Sized, F: Float + Sum>(
    rng: &mut R,
    control: &[F],
    variant: &[F],
    rep: usize,
) -> Result<Vec<F>, Error> {
    if rep == 0 {
        return Err(Error::invalid_input("at least one repetition is required"));
    }
    let mut sampler = PermutationSampler::new(control, variant)?;

    let mut null_dist = Vec::with_capacity(rep);
    for i in 0..rep {
        if i % PROGRESS_EVERY == 0 {
            debug!(iteration = i, rep, "permutation test under H0");
        }
        let (control_, variant_) = sampler.next_split(rng);
        null_dist.push(mean(variant_)? - mean(control_)?);
    }

    Ok(null_dist)
}

/// Simulated success counts of both groups under H0, one entry per repetition.
#[derive(Debug, Clone, PartialEq)]
pub struct ProportionNullSample {
    /// Size of the control group.
    pub n_control: usize,
    /// Size of the variant group.
    pub n_variant: usize,
    /// Simulated control conversions.
    pub control_successes: Vec<usize>,
    /// Simulated variant conversions.
    pub variant_successes: Vec<usize>,
}

impl ProportionNullSample {
    /// Simulated control conversion, in percent.
    pub fn control_pct(&self) -> Vec<f64> {
        percentages(&self.control_successes, self.n_control)
    }

    /// Simulated variant conversion, in percent.
    pub fn variant_pct(&self) -> Vec<f64> {
        percentages(&self.variant_successes, self.n_variant)
    }

    /// Difference of conversion rates `variant - control` per repetition.
    ///
    /// Computed with [`rate_difference`], so a repetition that reproduces the observed
    /// counts yields exactly the observed effect.
    pub fn differences(&self) -> Vec<f64> {
        self.variant_successes
            .iter()
            .zip(&self.control_successes)
            .map(|(&v, &c)| rate_difference(c, self.n_control, v, self.n_variant))
            .collect()
    }
}

fn percentages(successes: &[usize], n: usize) -> Vec<f64> {
    successes
        .iter()
        .map(|&k| k as f64 / n as f64 * 100.0)
        .collect()
}

/// `k_variant / n_variant - k_control / n_control`, rounded once.
///
/// Equal differences of rates map to the same `f64`, whatever the counts they come from.
pub fn rate_difference(
    k_control: usize,
    n_control: usize,
    k_variant: usize,
    n_variant: usize,
) -> f64 {
    let numerator =
        k_variant as i128 * n_control as i128 - k_control as i128 * n_variant as i128;
    let denominator = n_control as i128 * n_variant as i128;
    numerator as f64 / denominator as f64
}

/// Conversion rate of both groups pooled together.
pub fn pooled_rate(control: &[f64], variant: &[f64]) -> Result<f64, Error> {
    let n = control.len() + variant.len();
    if n == 0 {
        return Err(Error::NotEnoughSamples);
    }
    let conversions = control.iter().sum::<f64>() + variant.iter().sum::<f64>();
    Ok(conversions / n as f64)
}

/// Number of successes among `n` Bernoulli(`p`) trials.
pub fn simulate_group_successes<R: Rng + ?Sized>(rng: &mut R, n: usize, p: f64) -> usize {
    (0..n).filter(|_| rng.gen::<f64>() < p).count()
}

/// Redraw both groups `rep` times as Bernoulli trials at the pooled rate `p`.
pub fn proportion_null_distribution<R: Rng + ?Sized>(
    rng: &mut R,
    p: f64,
    n_control: usize,
    n_variant: usize,
    rep: usize,
) -> Result<ProportionNullSample, Error> {
    if rep == 0 {
        return Err(Error::invalid_input("at least one repetition is required"));
    }
    if n_control == 0 || n_variant == 0 {
        return Err(Error::NotEnoughSamples);
    }
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::invalid_input(format!(
            "pooled rate must lie in [0, 1], got {p}"
        )));
    }

    let mut sample = ProportionNullSample {
        n_control,
        n_variant,
        control_successes: Vec::with_capacity(rep),
        variant_successes: Vec::with_capacity(rep),
    };
    for i in 0..rep {
        if i % PROGRESS_EVERY == 0 {
            debug!(iteration = i, rep, "binomial simulation under H0");
        }
        sample
            .control_successes
            .push(simulate_group_successes(rng, n_control, p));
        sample
            .variant_successes
            .push(simulate_group_successes(rng, n_variant, p));
    }

    Ok(sample)
}

/// p-value of the observed statistic `t_stat` against the simulated `null_dist`.
///
/// For [`PValueType::TwoSided`], `p = Pr(T <= t | H0)` is folded to `min(p, 1 - p)`, so the
/// result never exceeds 0.5. Values of the null distribution equal to `t_stat` count in the
/// left tail, except when all of them do: the two-sided p-value is then 0.5.
pub fn p_value<F: Float>(
    null_dist: &[F],
    t_stat: F,
    pvalue_type: PValueType,
) -> Result<F, Error> {
    if null_dist.is_empty() {
        return Err(Error::NotEnoughSamples);
    }
    let rep = as_float::<F>(null_dist.len())?;

    let left_p_value =
        as_float::<F>(null_dist.iter().filter(|&&t| t <= t_stat).count())? / rep;

    let p_value = match pvalue_type {
        // a null distribution collapsed on the observed statistic carries no evidence
        PValueType::TwoSided if null_dist.iter().all(|&t| t == t_stat) => {
            F::one() / (F::one() + F::one())
        }
        PValueType::TwoSided => {
            let right = F::one() - left_p_value;
            if left_p_value <= right {
                left_p_value
            } else {
                right
            }
        }
        PValueType::OneSidedRightTail => {
            as_float::<F>(null_dist.iter().filter(|&&t| t >= t_stat).count())? / rep
        }
        PValueType::OneSidedLeftTail => left_p_value,
    };

    Ok(p_value)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use itertools::Itertools;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, StandardNormal};

    use super::*;

    fn sorted(xs: impl IntoIterator<Item = f64>) -> Vec<f64> {
        xs.into_iter().sorted_by(|a, b| a.total_cmp(b)).collect()
    }

    #[test]
    fn test_permutation_conserves_pool() {
        let control = vec![1.0, 1.0, 2.0, 7.5, -3.0];
        let variant = vec![4.0, 9.0, 1.0];
        let expected = sorted(control.iter().chain(&variant).copied());

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut sampler = PermutationSampler::new(&control, &variant).unwrap();
        for _ in 0..200 {
            let (c, v) = sampler.next_split(&mut rng);
            assert_eq!(c.len(), control.len());
            assert_eq!(v.len(), variant.len());
            assert_eq!(sorted(c.iter().chain(v).copied()), expected);
        }
    }

    #[test]
    fn test_permutation_is_deterministic() {
        let mut rng = &mut ChaCha8Rng::seed_from_u64(42);
        let a = StandardNormal
            .sample_iter(&mut rng)
            .take(100)
            .collect::<Vec<f64>>();
        let b = StandardNormal
            .sample_iter(&mut rng)
            .take(40)
            .collect::<Vec<f64>>();

        let first =
            permutation_null_distribution(&mut ChaCha8Rng::seed_from_u64(7), &a, &b, 300).unwrap();
        let second =
            permutation_null_distribution(&mut ChaCha8Rng::seed_from_u64(7), &a, &b, 300).unwrap();
        assert_eq!(first, second);

        let other =
            permutation_null_distribution(&mut ChaCha8Rng::seed_from_u64(8), &a, &b, 300).unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn test_permutation_two_different_normal_distributions() {
        let mut rng = &mut ChaCha8Rng::seed_from_u64(42);
        let a = StandardNormal
            .sample_iter(&mut rng)
            .take(100)
            .collect::<Vec<f64>>();
        let b = StandardNormal
            .sample_iter(&mut rng)
            .take(100)
            .map(|x: f64| x + 1.0)
            .collect::<Vec<f64>>();

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let null_dist = permutation_null_distribution(&mut rng, &a, &b, 1_000).unwrap();

        // the null is centred on zero
        let null_mean = null_dist.iter().sum::<f64>() / null_dist.len() as f64;
        assert!(null_mean.abs() < 0.05);

        let t_stat = mean(&b).unwrap() - mean(&a).unwrap();
        let p = p_value(&null_dist, t_stat, PValueType::TwoSided).unwrap();
        assert!(p < 0.01);
        // p_value is small enough to reject the null hypothesis that the means are equal
    }

    #[test]
    fn test_permutation_identical_groups() {
        let mut rng = &mut ChaCha8Rng::seed_from_u64(42);
        let a = StandardNormal
            .sample_iter(&mut rng)
            .take(200)
            .collect::<Vec<f64>>();

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let null_dist = permutation_null_distribution(&mut rng, &a, &a, 1_000).unwrap();
        let p = p_value(&null_dist, 0.0, PValueType::TwoSided).unwrap();
        assert!(p > 0.3);
    }

    #[test]
    fn test_permutation_rejects_empty_input() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(matches!(
            permutation_null_distribution(&mut rng, &[], &[1.0], 10),
            Err(Error::NotEnoughSamples)
        ));
        assert!(matches!(
            permutation_null_distribution(&mut rng, &[1.0], &[1.0], 0),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_p_value_tie_break() {
        let null_dist = [0.0, 0.0, 1.0, 1.0];
        assert_relative_eq!(p_value(&null_dist, 0.0, PValueType::TwoSided).unwrap(), 0.5);
        assert_relative_eq!(p_value(&null_dist, 1.0, PValueType::TwoSided).unwrap(), 0.0);
        assert_relative_eq!(p_value(&null_dist, -1.0, PValueType::TwoSided).unwrap(), 0.0);

        let null_dist = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(p_value(&null_dist, 1.0, PValueType::TwoSided).unwrap(), 0.25);
        assert_relative_eq!(p_value(&null_dist, 3.5, PValueType::TwoSided).unwrap(), 0.25);
        assert_relative_eq!(
            p_value(&null_dist, 2.0, PValueType::OneSidedLeftTail).unwrap(),
            0.5
        );
        assert_relative_eq!(
            p_value(&null_dist, 2.0, PValueType::OneSidedRightTail).unwrap(),
            0.75
        );

        // degenerate null, e.g. two groups of identical constant values
        assert_relative_eq!(p_value(&[0.0; 10], 0.0, PValueType::TwoSided).unwrap(), 0.5);
        assert_relative_eq!(p_value(&[0.0; 10], 0.1, PValueType::TwoSided).unwrap(), 0.0);

        assert!(matches!(
            p_value::<f64>(&[], 0.0, PValueType::TwoSided),
            Err(Error::NotEnoughSamples)
        ));
    }

    #[test]
    fn test_two_sided_p_value_is_bounded() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for size in [1, 2, 5, 50, 500] {
            let null_dist = StandardNormal
                .sample_iter(&mut rng)
                .take(size)
                .collect::<Vec<f64>>();
            for _ in 0..20 {
                let z: f64 = StandardNormal.sample(&mut rng);
                let t_stat = 3.0 * z;
                let p = p_value(&null_dist, t_stat, PValueType::TwoSided).unwrap();
                assert!((0.0..=0.5).contains(&p));
            }
        }
    }

    #[test]
    fn test_proportion_null_distribution() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let sample = proportion_null_distribution(&mut rng, 0.1, 1000, 800, 200).unwrap();
        assert_eq!(sample.control_successes.len(), 200);
        assert_eq!(sample.variant_successes.len(), 200);
        assert!(sample.control_successes.iter().all(|&k| k <= 1000));
        assert!(sample.variant_successes.iter().all(|&k| k <= 800));
        assert!(sample
            .control_pct()
            .iter()
            .chain(&sample.variant_pct())
            .all(|pct| (0.0..=100.0).contains(pct)));

        let control_mean = mean(&sample.control_pct()).unwrap();
        assert!((control_mean - 10.0).abs() < 0.5);
        let diff_mean = mean(&sample.differences()).unwrap();
        assert!(diff_mean.abs() < 0.005);

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let again = proportion_null_distribution(&mut rng, 0.1, 1000, 800, 200).unwrap();
        assert_eq!(sample, again);
    }

    #[test]
    fn test_proportion_extreme_rates() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let never = proportion_null_distribution(&mut rng, 0.0, 10, 10, 20).unwrap();
        assert!(never.differences().iter().all(|d| *d == 0.0));
        assert!(never.control_pct().iter().all(|c| *c == 0.0));

        let always = proportion_null_distribution(&mut rng, 1.0, 10, 10, 20).unwrap();
        assert!(always.variant_pct().iter().all(|v| *v == 100.0));

        assert!(proportion_null_distribution(&mut rng, 1.5, 10, 10, 20).is_err());
        assert!(proportion_null_distribution(&mut rng, 0.5, 0, 10, 20).is_err());
    }

    #[test]
    fn test_rate_difference_ties_are_exact() {
        // same difference of rates from different counts
        assert_eq!(rate_difference(3, 20, 7, 20), rate_difference(4, 20, 8, 20));
        assert_eq!(rate_difference(3, 30, 9, 45), rate_difference(5, 30, 12, 45));
        assert_eq!(rate_difference(3, 30, 9, 45), 0.1);
        assert_relative_eq!(rate_difference(20, 200, 31, 250), 0.024, epsilon = 1e-12);
        assert!(rate_difference(4, 20, 7, 20) < rate_difference(3, 20, 7, 20));

        let sample = ProportionNullSample {
            n_control: 20,
            n_variant: 20,
            control_successes: vec![3, 4, 5],
            variant_successes: vec![7, 8, 8],
        };
        let observed = rate_difference(3, 20, 7, 20);
        let differences = sample.differences();
        assert_eq!(differences[0], observed);
        assert_eq!(differences[1], observed);
        assert!(differences[2] < observed);
        assert_relative_eq!(
            p_value(&differences, observed, PValueType::OneSidedLeftTail).unwrap(),
            1.0
        );
    }

    #[test]
    fn test_pooled_rate() {
        assert_relative_eq!(
            pooled_rate(&[1.0, 0.0, 0.0, 1.0], &[1.0, 1.0]).unwrap(),
            4.0 / 6.0
        );
        assert!(pooled_rate(&[], &[]).is_err());
    }
}
