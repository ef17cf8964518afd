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

//! Quantile treatment effect by bootstrap.
//!
//! Each iteration resamples control and variant with replacement and reads both resamples
//! at every point of a quantile grid. The draws are then summarized per quantile: mean of
//! each group, mean difference, and a 95% percentile interval of the difference.

use itertools::Itertools;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::validate_quantiles;
use crate::utils::{format_grouped, mean, quantile_sorted, sort_ascending};
use crate::Error;

const LOWER_BOUND: f64 = 0.025;
const UPPER_BOUND: f64 = 0.975;

/// Quantiles of both groups at one grid point, for one bootstrap iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantileDraw {
    /// Bootstrap iteration.
    pub iteration: usize,
    /// Grid point.
    pub quantile: f64,
    /// Quantile of the control resample.
    pub control: f64,
    /// Quantile of the variant resample.
    pub variant: f64,
}

/// Bootstrap summary of the treatment effect at one quantile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileEffect {
    /// Grid point.
    pub quantile: f64,
    /// Mean of the variant quantile over the draws.
    pub variant_mean: f64,
    /// Mean of the control quantile over the draws.
    pub control_mean: f64,
    /// Mean of `variant - control` over the draws.
    pub diff_mean: f64,
    /// 2.5th percentile of `variant - control`.
    pub diff_lower: f64,
    /// 97.5th percentile of `variant - control`.
    pub diff_upper: f64,
    /// Axis label, e.g. `0.50 | 1,234` (quantile, then variant mean).
    pub label: String,
}

impl QuantileEffect {
    /// `true` if the 95% interval of the difference excludes zero.
    pub fn is_significant(&self) -> bool {
        self.diff_lower > 0.0 || self.diff_upper < 0.0
    }
}

fn resample_sorted<R: Rng + ?Sized>(rng: &mut R, series: &[f64], resample: &mut [f64]) {
    for x in resample.iter_mut() {
        *x = series[rng.gen_range(0..series.len())];
    }
    sort_ascending(resample);
}

/// Raw bootstrap draws: `iterations` resamples of each group, read at every `quantiles`
/// point. Rows are ordered by iteration, then by grid point.
pub fn bootstrap_quantiles<R: Rng + ?Sized>(
    rng: &mut R,
    control: &[f64],
    variant: &[f64],
    quantiles: &[f64],
    iterations: usize,
) -> Result<Vec<QuantileDraw>, Error> {
    if control.is_empty() || variant.is_empty() {
        return Err(Error::NotEnoughSamples);
    }
    if iterations == 0 {
        return Err(Error::invalid_input("at least one bootstrap iteration is required"));
    }
    validate_quantiles(quantiles)?;

    let mut control_ = vec![0.0; control.len()];
    let mut variant_ = vec![0.0; variant.len()];
    let mut draws = Vec::with_capacity(iterations * quantiles.len());

    for iteration in 0..iterations {
        if iteration % 10 == 0 {
            debug!(iteration, iterations, "quantile bootstrap");
        }
        resample_sorted(rng, control, &mut control_);
        resample_sorted(rng, variant, &mut variant_);

        for &q in quantiles {
            draws.push(QuantileDraw {
                iteration,
                quantile: q,
                control: quantile_sorted(&control_, q)?,
                variant: quantile_sorted(&variant_, q)?,
            });
        }
    }

    Ok(draws)
}

/// Summarize raw draws per grid point, in increasing quantile order.
pub fn summarize_quantile_effect(draws: &[QuantileDraw]) -> Result<Vec<QuantileEffect>, Error> {
    if draws.is_empty() {
        return Err(Error::NotEnoughSamples);
    }

    let by_quantile = draws
        .iter()
        .sorted_by(|a, b| a.quantile.total_cmp(&b.quantile))
        .chunk_by(|draw| draw.quantile);

    let mut summary = Vec::new();
    for (quantile, group) in &by_quantile {
        let group = group.collect::<Vec<_>>();
        let controls = group.iter().map(|d| d.control).collect::<Vec<_>>();
        let variants = group.iter().map(|d| d.variant).collect::<Vec<_>>();
        let mut diffs = group
            .iter()
            .map(|d| d.variant - d.control)
            .collect::<Vec<_>>();
        sort_ascending(&mut diffs);

        let variant_mean = mean(&variants)?;
        summary.push(QuantileEffect {
            quantile,
            variant_mean,
            control_mean: mean(&controls)?,
            diff_mean: mean(&diffs)?,
            diff_lower: quantile_sorted(&diffs, LOWER_BOUND)?,
            diff_upper: quantile_sorted(&diffs, UPPER_BOUND)?,
            label: format!("{quantile:.2} | {}", format_grouped(variant_mean)),
        });
    }

    Ok(summary)
}

/// [`bootstrap_quantiles`] followed by [`summarize_quantile_effect`].
pub fn quantile_treatment_effect<R: Rng + ?Sized>(
    rng: &mut R,
    control: &[f64],
    variant: &[f64],
    quantiles: &[f64],
    iterations: usize,
) -> Result<Vec<QuantileEffect>, Error> {
    let draws = bootstrap_quantiles(rng, control, variant, quantiles, iterations)?;
    summarize_quantile_effect(&draws)
}
