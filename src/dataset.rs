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

//! In-memory experiment data.
//!
//! A [`Dataset`] is an ordered list of rows, each mapping column names to [`Value`]s. The
//! `variant` column assigns every row to one of the two experiment [`Group`]s.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Name of the column holding the group label of each row.
pub const VARIANT_COLUMN: &str = "variant";

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean flag, read as 1.0 / 0.0 by numeric extraction.
    Bool(bool),
    /// Any numeric measurement.
    Number(f64),
    /// Free text (labels, identifiers...).
    Text(String),
}

impl Value {
    /// Numeric view of the cell, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(x) => Some(*x),
            Value::Text(_) => None,
        }
    }

    /// Text view of the cell, if it has one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Number(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// One observation: column name to value.
pub type Row = BTreeMap<String, Value>;

/// Experiment arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Group {
    /// Baseline arm, labelled `"Control"`.
    Control,
    /// Treatment arm, labelled `"Variation1"`.
    Variation,
}

impl Group {
    /// Label used in the `variant` column.
    pub fn label(self) -> &'static str {
        match self {
            Group::Control => "Control",
            Group::Variation => "Variation1",
        }
    }

    /// Group for a `variant` column label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Control" => Some(Group::Control),
            "Variation1" => Some(Group::Variation),
            _ => None,
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Conversion rate and size of one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionSummary {
    /// The group.
    pub group: Group,
    /// Mean of the conversion column over the group.
    pub cvr: f64,
    /// Number of rows in the group.
    pub count: usize,
}

/// Rows of a [`Dataset`] split by [`Group`].
#[derive(Debug, Clone)]
pub struct GroupSplit<'a> {
    /// Control rows, in dataset order.
    pub control: Vec<&'a Row>,
    /// Variation rows, in dataset order.
    pub variation: Vec<&'a Row>,
}

impl<'a> GroupSplit<'a> {
    /// Rows of `group`.
    pub fn rows(&self, group: Group) -> &[&'a Row] {
        match group {
            Group::Control => &self.control,
            Group::Variation => &self.variation,
        }
    }

    /// `(control size, variation size)`.
    pub fn sizes(&self) -> (usize, usize) {
        (self.control.len(), self.variation.len())
    }

    /// Numeric values of `column` for `group`.
    pub fn column(&self, column: &str, group: Group) -> Result<Vec<f64>, Error> {
        self.rows(group)
            .iter()
            .map(|row| numeric_cell(row, column))
            .collect()
    }
}

fn numeric_cell(row: &Row, column: &str) -> Result<f64, Error> {
    match row.get(column) {
        Some(value) => value.as_f64().ok_or_else(|| {
            Error::invalid_input(format!("column `{column}` holds a non-numeric value"))
        }),
        None => Err(Error::invalid_input(format!(
            "a row has no value for column `{column}`"
        ))),
    }
}

/// Tabular experiment data. Read-only once handed to the analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    rows: Vec<Row>,
}

impl Dataset {
    /// Empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dataset made of `rows`, kept in order.
    pub fn from_rows(rows: impl IntoIterator<Item = Row>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }

    /// Dataset from a JSON array of objects, e.g.
    /// `[{"variant": "Control", "revenue": 12.5}, ...]`.
    pub fn from_json_records(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json)
            .map_err(|e| Error::invalid_input(format!("malformed records: {e}")))
    }

    /// Two-group dataset with a single numeric `column`.
    pub fn from_series(column: &str, control: &[f64], variation: &[f64]) -> Self {
        let row = |group: Group, x: f64| -> Row {
            let mut row = Row::new();
            row.insert(VARIANT_COLUMN.to_string(), group.label().into());
            row.insert(column.to_string(), x.into());
            row
        };
        Self::from_rows(
            control
                .iter()
                .map(|&x| row(Group::Control, x))
                .chain(variation.iter().map(|&x| row(Group::Variation, x))),
        )
    }

    /// Append a row.
    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Rows, in insertion order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `true` if at least one row has `column`.
    pub fn has_column(&self, column: &str) -> bool {
        self.rows.iter().any(|row| row.contains_key(column))
    }

    /// Split the rows into control and variation.
    ///
    /// Fails with [`Error::InvalidInput`] unless every row carries a known group label and
    /// both groups are non-empty.
    pub fn split_by_group(&self) -> Result<GroupSplit<'_>, Error> {
        let mut split = GroupSplit {
            control: Vec::new(),
            variation: Vec::new(),
        };

        for (i, row) in self.rows.iter().enumerate() {
            let label = row
                .get(VARIANT_COLUMN)
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::invalid_input(format!("row {i} has no `{VARIANT_COLUMN}` label"))
                })?;
            match Group::from_label(label) {
                Some(Group::Control) => split.control.push(row),
                Some(Group::Variation) => split.variation.push(row),
                None => {
                    return Err(Error::invalid_input(format!(
                        "unexpected group `{label}` in row {i}, expected `{}` or `{}`",
                        Group::Control,
                        Group::Variation
                    )))
                }
            }
        }

        for group in [Group::Control, Group::Variation] {
            if split.rows(group).is_empty() {
                return Err(Error::invalid_input(format!("group `{group}` has no rows")));
            }
        }

        Ok(split)
    }

    /// Numeric values of `column` for `group`.
    pub fn extract_column(&self, column: &str, group: Group) -> Result<Vec<f64>, Error> {
        self.split_by_group()?.column(column, group)
    }

    /// Per-group mean and size of `column`, control first.
    pub fn aggregate_by_conversion(&self, column: &str) -> Result<Vec<ConversionSummary>, Error> {
        let split = self.split_by_group()?;
        [Group::Control, Group::Variation]
            .into_iter()
            .map(|group| {
                let values = split.column(column, group)?;
                Ok(ConversionSummary {
                    group,
                    cvr: crate::utils::mean(&values)?,
                    count: values.len(),
                })
            })
            .collect()
    }
}
