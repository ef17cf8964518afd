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

//! Full analysis of one metric of an A/B test.
//!
//! [`Analyzer`] ties the pieces together over a [`Dataset`] and a [`TestConfiguration`]:
//! 1. sanity checks (sample ratio mismatch, power),
//! 2. hypothesis test on the difference of means, with H0 simulated by resampling,
//! 3. quantile treatment effect, to see where in the distribution the effect lies.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bootstrap::{quantile_treatment_effect, QuantileEffect};
use crate::checker::{SanityChecker, SanityReport};
use crate::config::{TestConfiguration, VariantType};
use crate::dataset::{ConversionSummary, Dataset, Group};
use crate::resampler::{
    p_value, permutation_null_distribution, pooled_rate, proportion_null_distribution,
    rate_difference,
};
use crate::utils::mean;
use crate::Error;

/// Outcome of the simulated hypothesis test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisTestResult {
    /// `mean(variant) - mean(control)`.
    pub observed_effect: f64,
    /// p-value of the observed effect against the null distribution.
    pub p_value: f64,
    /// Simulated effects under H0, in the unit of `observed_effect`.
    pub null_distribution: Vec<f64>,
    /// Significance level of the test.
    pub alpha: f64,
}

impl HypothesisTestResult {
    /// `true` when the p-value is below the significance level.
    pub fn is_significant(&self) -> bool {
        self.p_value < self.alpha
    }
}

/// Metric values of both groups, for histograms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSeries {
    /// Control values.
    pub control: Vec<f64>,
    /// Variant values.
    pub variant: Vec<f64>,
}

/// Analysis of one metric of a two-group experiment.
#[derive(Debug, Clone)]
pub struct Analyzer<'a> {
    dataset: &'a Dataset,
    config: TestConfiguration,
    control: Vec<f64>,
    variant: Vec<f64>,
}

impl<'a> Analyzer<'a> {
    /// Validate `config` against `dataset` and extract the metric of both groups.
    ///
    /// Fails with [`Error::InvalidInput`] if the metric column is missing or non-numeric,
    /// the dataset does not hold exactly the two expected groups, or a proportion metric
    /// holds values other than 0 and 1.
    pub fn new(dataset: &'a Dataset, config: TestConfiguration) -> Result<Self, Error> {
        config.validate()?;
        let metric = config.metric();
        if !dataset.has_column(metric) {
            return Err(Error::invalid_input(format!(
                "variable `{metric}` is not in the dataset"
            )));
        }

        let split = dataset.split_by_group()?;
        let control = split.column(metric, Group::Control)?;
        let variant = split.column(metric, Group::Variation)?;

        if config.variant_type() == VariantType::Proportion {
            if let Some(x) = control
                .iter()
                .chain(&variant)
                .find(|&&x| x != 0.0 && x != 1.0)
            {
                return Err(Error::invalid_input(format!(
                    "proportion metric `{metric}` must only hold 0 or 1, found {x}"
                )));
            }
        }

        Ok(Self {
            dataset,
            config,
            control,
            variant,
        })
    }

    /// Settings of the analysis.
    pub fn config(&self) -> &TestConfiguration {
        &self.config
    }

    /// Metric values of the control group.
    pub fn control(&self) -> &[f64] {
        &self.control
    }

    /// Metric values of the variant group.
    pub fn variant(&self) -> &[f64] {
        &self.variant
    }

    /// Sample Ratio Mismatch and power checks.
    ///
    /// Power uses the per-row values for continuous metrics, and the per-group conversion
    /// rates (with the control size as number of observations) for proportions.
    pub fn run_sanity_checks(&self) -> Result<SanityReport, Error> {
        let checker = SanityChecker::new(self.config.alpha(), self.config.power());

        let smr_p_value =
            checker.check_sample_ratio_mismatch(self.control.len(), self.variant.len())?;

        let power = match self.config.variant_type() {
            VariantType::Continuous => checker.power_for_mean(&self.control, &self.variant)?,
            VariantType::Proportion => {
                let summary = self.conversion_summary()?;
                let (control, variant) = match summary.as_slice() {
                    [control, variant] => (control, variant),
                    _ => return Err(Error::invalid_input("expected exactly two groups")),
                };
                checker.power_for_proportion(control.cvr, variant.cvr, control.count)?
            }
        };

        let report = checker.report(smr_p_value, power);
        for warning in report.warnings() {
            warn!(metric = self.config.metric(), "{warning}");
        }
        info!(
            metric = self.config.metric(),
            smr_p_value, power, "sanity checks done"
        );

        Ok(report)
    }

    /// Test whether `mean(variant) - mean(control)` is significant, simulating H0 with a
    /// permutation test (continuous metrics) or binomial draws at the pooled rate
    /// (proportions).
    pub fn run_hypothesis_test<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<HypothesisTestResult, Error> {
        let rep = self.config.iterations();
        info!(
            metric = self.config.metric(),
            variant_type = %self.config.variant_type(),
            rep,
            "simulating the null hypothesis"
        );

        let (observed_effect, null_distribution) = match self.config.variant_type() {
            VariantType::Continuous => (
                mean(&self.variant)? - mean(&self.control)?,
                permutation_null_distribution(rng, &self.control, &self.variant, rep)?,
            ),
            VariantType::Proportion => {
                // simulated and observed effects share the count arithmetic, so ties are exact
                let observed_effect = rate_difference(
                    successes(&self.control),
                    self.control.len(),
                    successes(&self.variant),
                    self.variant.len(),
                );
                let p = pooled_rate(&self.control, &self.variant)?;
                let sample = proportion_null_distribution(
                    rng,
                    p,
                    self.control.len(),
                    self.variant.len(),
                    rep,
                )?;
                (observed_effect, sample.differences())
            }
        };

        let p_value = p_value(
            &null_distribution,
            observed_effect,
            self.config.p_value_type(),
        )?;
        info!(
            metric = self.config.metric(),
            observed_effect, p_value, "hypothesis test done"
        );

        Ok(HypothesisTestResult {
            observed_effect,
            p_value,
            null_distribution,
            alpha: self.config.alpha(),
        })
    }

    /// Bootstrapped treatment effect at every quantile of the configured grid.
    pub fn compute_quantile_effect<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Vec<QuantileEffect>, Error> {
        info!(
            metric = self.config.metric(),
            quantiles = self.config.quantiles().len(),
            iterations = self.config.bootstrap_iterations(),
            "bootstrapping quantiles"
        );
        quantile_treatment_effect(
            rng,
            &self.control,
            &self.variant,
            self.config.quantiles(),
            self.config.bootstrap_iterations(),
        )
    }

    /// Metric values of both groups, keeping only values below `cap` when given.
    ///
    /// A cap of `0.0` means no cap.
    pub fn histogram_series(&self, cap: Option<f64>) -> HistogramSeries {
        let below = |xs: &[f64]| -> Vec<f64> {
            match cap {
                Some(cap) if cap != 0.0 => xs.iter().copied().filter(|&x| x < cap).collect(),
                _ => xs.to_vec(),
            }
        };
        HistogramSeries {
            control: below(&self.control),
            variant: below(&self.variant),
        }
    }

    /// Conversion rate and size of each group, control first.
    pub fn conversion_summary(&self) -> Result<Vec<ConversionSummary>, Error> {
        self.dataset.aggregate_by_conversion(self.config.metric())
    }
}

fn successes(xs: &[f64]) -> usize {
    xs.iter().filter(|&&x| x == 1.0).count()
}
