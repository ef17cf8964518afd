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
//! Sanity checks (sample ratio mismatch, power), simulation-based hypothesis tests
//! (permutation for continuous metrics, binomial simulation for conversion rates) and
//! bootstrapped quantile treatment effects for two-group experiments.
//!
//! Check the [`prelude`] module for the public API.
use thiserror::Error;

/// The prelude module re-exports the most commonly used types and traits.
/// This is the public API. Enjoy!
pub mod prelude;

mod analyzer;
mod config;
mod dataset;
mod random;

#[cfg(any(feature = "unstable", test))]
/// unstable quantile bootstrap API
pub mod bootstrap;

#[cfg(not(any(feature = "unstable", test)))]
pub(crate) mod bootstrap;

#[cfg(any(feature = "unstable", test))]
/// unstable sanity checks API
pub mod checker;

#[cfg(not(any(feature = "unstable", test)))]
pub(crate) mod checker;

#[cfg(any(feature = "unstable", test))]
/// unstable null-hypothesis simulation API
pub mod resampler;

#[cfg(not(any(feature = "unstable", test)))]
pub(crate) mod resampler;

#[cfg(any(feature = "unstable", test))]
/// unstable utils API
pub mod utils;

#[cfg(not(any(feature = "unstable", test)))]
pub(crate) mod utils;

/// The error type for this crate.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// NotEnoughSamples
    #[error("Not enough samples")]
    NotEnoughSamples,
    /// The caller handed over data or settings the analysis cannot work with.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// A statistic is undefined for the given data (zero variance, empty group...).
    #[error("Degenerate statistic: {0}")]
    DegenerateStatistic(String),
}

impl Error {
    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub(crate) fn degenerate(msg: impl Into<String>) -> Self {
        Error::DegenerateStatistic(msg.into())
    }
}
