//! Regression metrics

use serde::{Deserialize, Serialize};
use std::fmt;

/// Performance metric computed on assessment rows
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Root mean squared error
    Rmse,
    /// Mean absolute error
    Mae,
    /// Squared Pearson correlation between truth and estimate
    Rsq,
}

impl Metric {
    /// Whether smaller values are better
    pub fn minimize(&self) -> bool {
        match self {
            Metric::Rmse | Metric::Mae => true,
            Metric::Rsq => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Rmse => "rmse",
            Metric::Mae => "mae",
            Metric::Rsq => "rsq",
        }
    }

    /// Score `estimate` against `truth`. `None` when the metric is undefined
    /// (no rows, or zero variance for rsq).
    pub fn compute(&self, truth: &[f64], estimate: &[f64]) -> Option<f64> {
        if truth.is_empty() || truth.len() != estimate.len() {
            return None;
        }

        let value = match self {
            Metric::Rmse => rmse(truth, estimate),
            Metric::Mae => mae(truth, estimate),
            Metric::Rsq => rsq(truth, estimate)?,
        };

        value.is_finite().then_some(value)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn rmse(truth: &[f64], estimate: &[f64]) -> f64 {
    let mse = truth
        .iter()
        .zip(estimate)
        .map(|(t, e)| (t - e).powi(2))
        .sum::<f64>()
        / truth.len() as f64;
    mse.sqrt()
}

pub fn mae(truth: &[f64], estimate: &[f64]) -> f64 {
    truth
        .iter()
        .zip(estimate)
        .map(|(t, e)| (t - e).abs())
        .sum::<f64>()
        / truth.len() as f64
}

pub fn rsq(truth: &[f64], estimate: &[f64]) -> Option<f64> {
    let n = truth.len() as f64;
    let mean_t = truth.iter().sum::<f64>() / n;
    let mean_e = estimate.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_t = 0.0;
    let mut var_e = 0.0;
    for (t, e) in truth.iter().zip(estimate) {
        cov += (t - mean_t) * (e - mean_e);
        var_t += (t - mean_t).powi(2);
        var_e += (e - mean_e).powi(2);
    }

    if var_t <= 0.0 || var_e <= 0.0 {
        return None;
    }
    Some(cov * cov / (var_t * var_e))
}
