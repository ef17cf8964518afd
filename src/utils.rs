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

use std::iter::Sum;

use num_traits::Float;

use crate::Error;

/// `n` as a float.
pub fn as_float<F: Float>(n: usize) -> Result<F, Error> {
    F::from(n).ok_or_else(|| Error::degenerate(format!("count {n} is not representable")))
}

/// Arithmetic mean of `xs`.
pub fn mean<F: Float + Sum>(xs: &[F]) -> Result<F, Error> {
    if xs.is_empty() {
        return Err(Error::NotEnoughSamples);
    }
    Ok(xs.iter().copied().sum::<F>() / as_float(xs.len())?)
}

/// Sample standard deviation of `xs` (denominator `n - 1`).
pub fn sample_std<F: Float + Sum>(xs: &[F]) -> Result<F, Error> {
    if xs.len() < 2 {
        return Err(Error::NotEnoughSamples);
    }
    let m = mean(xs)?;
    let ss = xs.iter().map(|&x| (x - m) * (x - m)).sum::<F>();
    Ok((ss / as_float(xs.len() - 1)?).sqrt())
}

/// Quantile `q` of an ascending `sorted` slice.
///
/// Linear interpolation between the order statistics surrounding `(n - 1) * q`.
pub fn quantile_sorted<F: Float>(sorted: &[F], q: F) -> Result<F, Error> {
    let n = sorted.len();
    if n == 0 {
        return Err(Error::NotEnoughSamples);
    }
    if n == 1 {
        return Ok(sorted[0]);
    }

    let rank = as_float::<F>(n - 1)? * q;
    let lower = rank.floor().to_usize().unwrap_or(0).min(n - 1);
    let upper = (lower + 1).min(n - 1);
    let fraction = rank - as_float(lower)?;

    Ok(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
}

/// Sort floats ascending, NaNs last.
pub fn sort_ascending<F: Float>(xs: &mut [F]) {
    xs.sort_by(|a, b| match (a.is_nan(), b.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal),
    });
}

/// Format `value` with no decimals and thousands separators, e.g. `-1,234,568`.
pub fn format_grouped(value: f64) -> String {
    let digits = format!("{:.0}", value.abs());
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        // inf / NaN
        return format!("{value:.0}");
    }

    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0.0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
