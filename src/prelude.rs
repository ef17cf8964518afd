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

//! A/B Test Hypothesis Testing
//!
//! Deciding whether a variant beats its control takes more than comparing two averages:
//! - the experiment itself must be sound. The groups should have the expected sizes (no
//!   Sample Ratio Mismatch) and enough observations to detect the effect (power);
//! - the observed difference of means must be unlikely under the null hypothesis that the
//!   group has no effect. Instead of assuming a distribution for the test statistic, we
//!   simulate it under H0, shuffling the group labels (continuous metrics) or redrawing
//!   conversions at the pooled rate (proportions), and read the p-value off the simulated
//!   distribution;
//! - the mean may hide where the effect happens. The quantile treatment effect compares
//!   both groups quantile by quantile, with bootstrap confidence intervals.
//!
//! # References
//! - [Hypothesis testing by simulation](https://allendowney.github.io/ElementsOfDataScience/13_hypothesis.html)
//! - [Sample Ratio Mismatch](https://www.microsoft.com/en-us/research/group/experimentation-platform-exp/articles/diagnosing-sample-ratio-mismatch-in-a-b-testing/)
//! - [Quantile bootstrapping](https://towardsdatascience.com/recreating-netflixs-quantile-bootstrapping-in-r-a4739a69adb6)
//!
//! # Example
//!
//! ```rust
//! use abtest_ht::prelude::*;
//! use rand::Rng;
//!
//! let mut rng = seeded(42);
//!
//! // revenue per user, the variant adds about 2.0 on average
//! let control = (0..400)
//!     .map(|_| 20.0 + 5.0 * rng.gen::<f64>())
//!     .collect::<Vec<f64>>();
//! let variant = (0..400)
//!     .map(|_| 22.0 + 5.0 * rng.gen::<f64>())
//!     .collect::<Vec<f64>>();
//! let data = Dataset::from_series("revenue", &control, &variant);
//!
//! let config = TestConfiguration::new("revenue", VariantType::Continuous)
//!     .with_alpha(0.05)
//!     .with_quantiles(vec![0.25, 0.5, 0.75]);
//! let analyzer = Analyzer::new(&data, config).unwrap();
//!
//! let report = analyzer.run_sanity_checks().unwrap();
//! assert_eq!(report.sample_ratio_message(), "Probably no SRM.");
//!
//! let test = analyzer.run_hypothesis_test(&mut rng).unwrap();
//! assert!(test.observed_effect > 1.0);
//! assert!(test.is_significant());
//!
//! let effects = analyzer.compute_quantile_effect(&mut rng).unwrap();
//! assert_eq!(effects.len(), 3);
//! assert_eq!(effects[1].quantile, 0.5);
//! ```

pub use crate::analyzer::{Analyzer, HistogramSeries, HypothesisTestResult};
pub use crate::config::{
    default_quantiles, PValueType, TestConfiguration, VariantType, DEFAULT_ALPHA,
    DEFAULT_BOOTSTRAP_ITERATIONS, DEFAULT_ITERATIONS, DEFAULT_POWER,
};
pub use crate::dataset::{
    ConversionSummary, Dataset, Group, GroupSplit, Row, Value, VARIANT_COLUMN,
};
pub use crate::random::{seeded, RandomSource};
pub use crate::Error;

/// sanity checks
pub mod checker {
    pub use crate::checker::{
        sample_ratio_p_value, CheckOutcome, NumericalWarning, SanityChecker, SanityReport,
    };
}

pub use checker::{NumericalWarning, SanityChecker, SanityReport};

/// null-hypothesis simulation
pub mod resampler {
    pub use crate::resampler::{
        p_value, permutation_null_distribution, proportion_null_distribution, rate_difference,
        ProportionNullSample,
    };
}

pub use resampler::permutation_null_distribution;

/// quantile treatment effect by bootstrap
pub mod bootstrap {
    pub use crate::bootstrap::{
        bootstrap_quantiles, quantile_treatment_effect, summarize_quantile_effect,
        QuantileDraw, QuantileEffect,
    };
}

pub use bootstrap::QuantileEffect;
