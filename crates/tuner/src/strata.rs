//! Stratification levels
//!
//! Groups dataset rows by the level of a stratification field. Categorical
//! fields use their levels directly; numeric fields (typically the
//! continuous outcome) are cut into quantile bins.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dataset::{Column, Dataset};
use crate::errors::TuningError;

/// Which field to stratify on, and how finely to bin it when numeric
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StrataSpec {
    pub field: String,
    /// Number of quantile bins for numeric fields (ignored for categorical)
    pub bins: usize,
}

/// Rows grouped by stratum level, levels in sorted order, rows ascending
#[derive(Clone, Debug, PartialEq)]
pub struct Strata {
    pub field: String,
    pub levels: BTreeMap<String, Vec<usize>>,
}

impl Strata {
    /// Group the rows of `dataset` by `spec`
    pub fn assign(dataset: &Dataset, spec: &StrataSpec) -> Result<Self, TuningError> {
        let (_, column) = dataset.column(&spec.field).ok_or_else(|| {
            TuningError::InvalidConfig(format!(
                "stratification field '{}' is not in the schema",
                spec.field
            ))
        })?;

        let labels: Vec<String> = match column {
            Column::Categorical { levels, codes } => codes
                .iter()
                .enumerate()
                .map(|(row, code)| {
                    code.map(|c| levels[c as usize].clone())
                        .ok_or_else(|| missing_strata(&spec.field, row))
                })
                .collect::<Result<_, _>>()?,
            Column::Numeric { values } => {
                let values = values
                    .iter()
                    .enumerate()
                    .map(|(row, v)| v.ok_or_else(|| missing_strata(&spec.field, row)))
                    .collect::<Result<Vec<f64>, _>>()?;
                bin_labels(&values, spec.bins)?
            }
        };

        let mut levels: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (row, label) in labels.into_iter().enumerate() {
            levels.entry(label).or_default().push(row);
        }

        Ok(Self {
            field: spec.field.clone(),
            levels,
        })
    }

    /// Fail with `Stratification` if a level has fewer than `min` rows
    pub fn require_min_count(&self, min: usize) -> Result<(), TuningError> {
        match self.levels.iter().find(|(_, rows)| rows.len() < min) {
            Some((level, rows)) => Err(TuningError::Stratification {
                field: self.field.clone(),
                level: level.clone(),
                count: rows.len(),
            }),
            None => Ok(()),
        }
    }
}

fn missing_strata(field: &str, row: usize) -> TuningError {
    TuningError::Dataset(format!(
        "stratification field '{}' is missing at row {}",
        field, row
    ))
}

/// Interpolated quantile breaks (`bins - 1` of them, duplicates collapsed)
pub fn quantile_breaks(values: &[f64], bins: usize) -> Vec<f64> {
    if values.is_empty() || bins < 2 {
        return Vec::new();
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let last = sorted.len() - 1;

    let mut breaks: Vec<f64> = (1..bins)
        .map(|k| {
            let h = last as f64 * k as f64 / bins as f64;
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(last);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        })
        .collect();
    breaks.dedup();
    breaks
}

fn bin_labels(values: &[f64], bins: usize) -> Result<Vec<String>, TuningError> {
    if bins == 0 {
        return Err(TuningError::InvalidConfig(
            "strata bins must be at least 1".to_string(),
        ));
    }

    let breaks = quantile_breaks(values, bins);
    Ok(values
        .iter()
        .map(|&v| format!("q{}", breaks.partition_point(|&b| b < v) + 1))
        .collect())
}
