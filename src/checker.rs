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

//! Design checks run before trusting an experiment's results.
//!
//! - Sample Ratio Mismatch: chi-square goodness of fit of the group sizes against an even
//!   split.
//! - Power: probability of detecting the observed effect at the configured significance
//!   level, for a t-test on means (continuous metrics) or a two-proportion z-test
//!   (conversion metrics).

use std::fmt;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal, StudentsT};
use statrs::function::beta::beta_reg;
use statrs::function::gamma::ln_gamma;

use crate::utils::{mean, sample_std};
use crate::Error;

/// Non-fatal finding of a sanity check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NumericalWarning {
    /// Group sizes deviate significantly from an even split.
    SampleRatioMismatch {
        /// chi-square p-value of the group sizes
        p_value: f64,
        /// significance level it was compared to
        alpha: f64,
    },
    /// The test cannot reliably detect the observed effect.
    InsufficientPower {
        /// achieved power
        power: f64,
        /// target power
        target: f64,
    },
}

impl fmt::Display for NumericalWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericalWarning::SampleRatioMismatch { .. } => {
                f.write_str("Warning. SRM may be present.")
            }
            NumericalWarning::InsufficientPower { power, .. } => {
                write!(f, "Power is {power:.2}. Warning. Test has low Power.")
            }
        }
    }
}

/// Value of one check with its warning, if raised.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// p-value (SRM) or achieved power.
    pub value: f64,
    /// Set when the value fails the check.
    pub warning: Option<NumericalWarning>,
}

impl CheckOutcome {
    /// `true` if the check raised a warning.
    pub fn is_flagged(&self) -> bool {
        self.warning.is_some()
    }
}

/// Outcome of the sanity checks of one experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SanityReport {
    /// Sample Ratio Mismatch p-value.
    pub sample_ratio: CheckOutcome,
    /// Achieved power.
    pub power: CheckOutcome,
}

impl SanityReport {
    /// Message describing the SRM check.
    pub fn sample_ratio_message(&self) -> String {
        match &self.sample_ratio.warning {
            Some(w) => w.to_string(),
            None => "Probably no SRM.".to_string(),
        }
    }

    /// Message describing the power check.
    pub fn power_message(&self) -> String {
        match &self.power.warning {
            Some(w) => w.to_string(),
            None => "Test has enough power".to_string(),
        }
    }

    /// Raised warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &NumericalWarning> {
        self.sample_ratio
            .warning
            .iter()
            .chain(self.power.warning.iter())
    }
}

/// Sanity checks at a given significance level and target power.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SanityChecker {
    alpha: f64,
    power: f64,
}

impl SanityChecker {
    /// Checker comparing against `alpha` and the target `power`.
    pub fn new(alpha: f64, power: f64) -> Self {
        Self { alpha, power }
    }

    /// p-value of the Sample Ratio Mismatch test. See [`sample_ratio_p_value`].
    pub fn check_sample_ratio_mismatch(
        &self,
        n_control: usize,
        n_variant: usize,
    ) -> Result<f64, Error> {
        sample_ratio_p_value(n_control, n_variant)
    }

    /// Power of a two-sided t-test to detect the observed difference of means.
    ///
    /// The standardized effect size is `|mean(control) - mean(variant)| / std(control)` and
    /// the control size is used as the number of observations.
    pub fn power_for_mean(&self, control: &[f64], variant: &[f64]) -> Result<f64, Error> {
        let control_std = sample_std(control)?;
        if control_std == 0.0 || !control_std.is_finite() {
            return Err(Error::degenerate(format!(
                "control standard deviation is {control_std}, effect size is undefined"
            )));
        }
        let effect_size = (mean(control)? - mean(variant)?).abs() / control_std;
        t_test_power(effect_size, control.len(), self.alpha)
    }

    /// Power of a two-sided two-proportion z-test with `nobs` observations per group.
    pub fn power_for_proportion(
        &self,
        control_rate: f64,
        variant_rate: f64,
        nobs: usize,
    ) -> Result<f64, Error> {
        let effect_size = proportion_effect_size(control_rate, variant_rate)?;
        normal_ind_power(effect_size, nobs, self.alpha)
    }

    /// Pair the check values with their warnings.
    pub fn report(&self, smr_p_value: f64, power: f64) -> SanityReport {
        let smr_warning = (smr_p_value < self.alpha).then_some(
            NumericalWarning::SampleRatioMismatch {
                p_value: smr_p_value,
                alpha: self.alpha,
            },
        );
        let power_warning = (power < self.power).then_some(NumericalWarning::InsufficientPower {
            power,
            target: self.power,
        });
        SanityReport {
            sample_ratio: CheckOutcome {
                value: smr_p_value,
                warning: smr_warning,
            },
            power: CheckOutcome {
                value: power,
                warning: power_warning,
            },
        }
    }
}

/// Chi-square (1 degree of freedom) goodness-of-fit p-value of the observed group sizes
/// against an even split.
pub fn sample_ratio_p_value(n_a: usize, n_b: usize) -> Result<f64, Error> {
    if n_a == 0 || n_b == 0 {
        return Err(Error::degenerate(format!(
            "sample ratio needs two non-empty groups, got {n_a} and {n_b}"
        )));
    }
    let (a, b) = (n_a as f64, n_b as f64);
    let expected = (a + b) / 2.0;
    let chi2 = (a - expected).powi(2) / expected + (b - expected).powi(2) / expected;

    let dist = ChiSquared::new(1.0).map_err(|e| Error::degenerate(e.to_string()))?;
    Ok(dist.sf(chi2))
}

/// Cohen's h between two proportions: `2 asin(sqrt(p1)) - 2 asin(sqrt(p2))`.
pub fn proportion_effect_size(p1: f64, p2: f64) -> Result<f64, Error> {
    for p in [p1, p2] {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::invalid_input(format!(
                "proportion must lie in [0, 1], got {p}"
            )));
        }
    }
    Ok(2.0 * p1.sqrt().asin() - 2.0 * p2.sqrt().asin())
}

/// Power of a two-sided one-sample t-test with standardized `effect_size`.
pub fn t_test_power(effect_size: f64, nobs: usize, alpha: f64) -> Result<f64, Error> {
    if nobs < 2 {
        return Err(Error::degenerate(format!(
            "t-test power needs at least 2 observations, got {nobs}"
        )));
    }
    if !effect_size.is_finite() {
        return Err(Error::degenerate(format!("effect size is {effect_size}")));
    }
    let df = (nobs - 1) as f64;
    let t = StudentsT::new(0.0, 1.0, df).map_err(|e| Error::degenerate(e.to_string()))?;
    let crit = t.inverse_cdf(1.0 - alpha / 2.0);
    let nc = effect_size * (nobs as f64).sqrt();

    let power = (1.0 - noncentral_t_cdf(crit, df, nc)) + noncentral_t_cdf(-crit, df, nc);
    Ok(power.clamp(0.0, 1.0))
}

/// Power of a two-sided z-test between two independent groups of `nobs` observations
/// each, with standardized `effect_size`.
pub fn normal_ind_power(effect_size: f64, nobs: usize, alpha: f64) -> Result<f64, Error> {
    if nobs == 0 {
        return Err(Error::degenerate("z-test power needs observations"));
    }
    if !effect_size.is_finite() {
        return Err(Error::degenerate(format!("effect size is {effect_size}")));
    }
    let normal = Normal::new(0.0, 1.0).map_err(|e| Error::degenerate(e.to_string()))?;
    // harmonic combination of two equal groups
    let effective_nobs = nobs as f64 / 2.0;
    let crit = normal.inverse_cdf(1.0 - alpha / 2.0);
    let shift = effect_size * effective_nobs.sqrt();

    let power = normal.sf(crit - shift) + normal.cdf(-crit - shift);
    Ok(power.clamp(0.0, 1.0))
}

const NCT_MAX_ITERATIONS: usize = 1_000;
const NCT_MAX_ERROR: f64 = 1e-12;

/// CDF of the noncentral t distribution with `df` degrees of freedom and noncentrality
/// `delta`, evaluated at `t`.
///
/// Series expansion of Lenth (1989), Algorithm AS 243.
pub fn noncentral_t_cdf(t: f64, df: f64, delta: f64) -> f64 {
    let (t, delta, negative) = if t >= 0.0 {
        (t, delta, false)
    } else {
        (-t, -delta, true)
    };

    let x = t * t / (t * t + df);
    let mut tnc = 0.0;
    if x > 0.0 {
        let lambda = delta * delta;
        let mut p = 0.5 * (-0.5 * lambda).exp();
        let mut q = std::f64::consts::FRAC_2_PI.sqrt() * p * delta;
        let mut s = 0.5 - p;
        let mut a = 0.5;
        let b = 0.5 * df;
        let rxb = (1.0 - x).powf(b);
        let albeta = ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b);
        let mut xodd = beta_reg(a, b, x);
        let mut godd = 2.0 * rxb * (a * x.ln() - albeta).exp();
        let mut xeven = 1.0 - rxb;
        let mut geven = b * x * rxb;
        tnc = p * xodd + q * xeven;

        let mut en = 1.0;
        loop {
            a += 1.0;
            xodd -= godd;
            xeven -= geven;
            godd *= x * (a + b - 1.0) / a;
            geven *= x * (a + b - 0.5) / (a + 0.5);
            p *= lambda / (2.0 * en);
            q *= lambda / (2.0 * en + 1.0);
            s -= p;
            en += 1.0;
            tnc += p * xodd + q * xeven;

            let error_bound = 2.0 * s * (xodd - godd);
            if error_bound <= NCT_MAX_ERROR || en > NCT_MAX_ITERATIONS as f64 {
                break;
            }
        }
    }

    tnc += standard_normal_sf(delta);
    let cdf = if negative { 1.0 - tnc } else { tnc };
    cdf.clamp(0.0, 1.0)
}

fn standard_normal_sf(x: f64) -> f64 {
    0.5 * statrs::function::erf::erfc(x / std::f64::consts::SQRT_2)
}
