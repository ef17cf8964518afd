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

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Default significance level.
pub const DEFAULT_ALPHA: f64 = 0.05;
/// Default target power.
pub const DEFAULT_POWER: f64 = 0.8;
/// Default number of null-hypothesis simulations.
pub const DEFAULT_ITERATIONS: usize = 1_000;
/// Default number of bootstrap resamples for the quantile treatment effect.
pub const DEFAULT_BOOTSTRAP_ITERATIONS: usize = 100;

/// Kind of metric under analysis. Selects the power formula and the null simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantType {
    /// Real-valued measurement per row (revenue, latency...).
    Continuous,
    /// 0/1 conversion flag per row.
    Proportion,
}

impl FromStr for VariantType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continuous" => Ok(VariantType::Continuous),
            "proportion" => Ok(VariantType::Proportion),
            other => Err(Error::invalid_input(format!(
                "unsupported variant type `{other}`, choose one of \"proportion\" or \"continuous\""
            ))),
        }
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantType::Continuous => f.write_str("continuous"),
            VariantType::Proportion => f.write_str("proportion"),
        }
    }
}

/// Part of the null distribution counted as at least as extreme as the observed statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PValueType {
    /// Two-sided test - smaller of the two tails around the observed statistic
    /// min (Pr(T <= t | H0), 1 - Pr(T <= t | H0))
    #[default]
    TwoSided,
    /// One-sided test (right tail)
    /// Pr(T >= t | H0)
    OneSidedRightTail,
    /// One-sided test (left tail)
    /// Pr(T <= t | H0)
    OneSidedLeftTail,
}

/// `100` evenly spaced quantiles over `[0.01, 1.0)`.
pub fn default_quantiles() -> Vec<f64> {
    let step = (1.0 - 0.01) / 100.0;
    (0..100).map(|k| 0.01 + step * k as f64).collect()
}

/// Settings of one analysis run.
///
/// Built with [`TestConfiguration::new`] and the `with_*` setters, and checked by
/// [`TestConfiguration::validate`] before use. Unset fields take the crate defaults when
/// deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfiguration {
    metric: String,
    variant_type: VariantType,
    #[serde(default = "default_alpha")]
    alpha: f64,
    #[serde(default = "default_power")]
    power: f64,
    #[serde(default = "default_iterations")]
    iterations: usize,
    #[serde(default = "default_bootstrap_iterations")]
    bootstrap_iterations: usize,
    #[serde(default = "default_quantiles")]
    quantiles: Vec<f64>,
    #[serde(default)]
    p_value_type: PValueType,
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

fn default_power() -> f64 {
    DEFAULT_POWER
}

fn default_iterations() -> usize {
    DEFAULT_ITERATIONS
}

fn default_bootstrap_iterations() -> usize {
    DEFAULT_BOOTSTRAP_ITERATIONS
}

impl TestConfiguration {
    /// Configuration for `metric` with default settings.
    pub fn new(metric: impl Into<String>, variant_type: VariantType) -> Self {
        Self {
            metric: metric.into(),
            variant_type,
            alpha: DEFAULT_ALPHA,
            power: DEFAULT_POWER,
            iterations: DEFAULT_ITERATIONS,
            bootstrap_iterations: DEFAULT_BOOTSTRAP_ITERATIONS,
            quantiles: default_quantiles(),
            p_value_type: PValueType::default(),
        }
    }

    /// Read a configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::invalid_input(format!("malformed configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Significance level.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Target power.
    pub fn with_power(mut self, power: f64) -> Self {
        self.power = power;
        self
    }

    /// Number of null-hypothesis simulations.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Number of bootstrap resamples.
    pub fn with_bootstrap_iterations(mut self, iterations: usize) -> Self {
        self.bootstrap_iterations = iterations;
        self
    }

    /// Quantile grid of the quantile treatment effect.
    pub fn with_quantiles(mut self, quantiles: Vec<f64>) -> Self {
        self.quantiles = quantiles;
        self
    }

    /// Tail(s) used for the p-value.
    pub fn with_p_value_type(mut self, p_value_type: PValueType) -> Self {
        self.p_value_type = p_value_type;
        self
    }

    /// Check every setting is usable.
    pub fn validate(&self) -> Result<(), Error> {
        if self.metric.is_empty() {
            return Err(Error::invalid_input("metric name is empty"));
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(Error::invalid_input(format!(
                "alpha must lie in (0, 1], got {}",
                self.alpha
            )));
        }
        if !(self.power > 0.0 && self.power <= 1.0) {
            return Err(Error::invalid_input(format!(
                "power must lie in (0, 1], got {}",
                self.power
            )));
        }
        if self.iterations == 0 || self.bootstrap_iterations == 0 {
            return Err(Error::invalid_input("iteration counts must be positive"));
        }
        validate_quantiles(&self.quantiles)
    }

    /// Metric (column) under analysis.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Kind of metric.
    pub fn variant_type(&self) -> VariantType {
        self.variant_type
    }

    /// Significance level.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Target power.
    pub fn power(&self) -> f64 {
        self.power
    }

    /// Number of null-hypothesis simulations.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Number of bootstrap resamples.
    pub fn bootstrap_iterations(&self) -> usize {
        self.bootstrap_iterations
    }

    /// Quantile grid.
    pub fn quantiles(&self) -> &[f64] {
        &self.quantiles
    }

    /// Tail(s) used for the p-value.
    pub fn p_value_type(&self) -> PValueType {
        self.p_value_type
    }
}

pub(crate) fn validate_quantiles(quantiles: &[f64]) -> Result<(), Error> {
    if quantiles.is_empty() {
        return Err(Error::invalid_input("quantile grid is empty"));
    }
    match quantiles.iter().find(|q| !(0.0..1.0).contains(*q)) {
        Some(q) => Err(Error::invalid_input(format!(
            "quantiles must lie in [0, 1), got {q}"
        ))),
        None => Ok(()),
    }
}
