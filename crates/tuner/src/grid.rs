//! Regular hyperparameter grids
//!
//! Each tunable parameter gets `levels` evenly spaced candidates on a
//! linear or log10 scale; the grid is their cross product.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::TuningError;

/// Spacing of candidate values
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    /// Values are `10^x` for `x` evenly spaced in `[min, max]`
    Log10,
    Linear,
}

/// Candidate range of one hyperparameter
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub levels: usize,
    pub scale: Scale,
}

impl ParamRange {
    /// Evenly spaced candidates, ascending
    pub fn values(&self, name: &str) -> Result<Vec<f64>, TuningError> {
        if self.levels == 0 {
            return Err(TuningError::InvalidConfig(format!(
                "{}: levels must be at least 1",
                name
            )));
        }
        if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
            return Err(TuningError::InvalidConfig(format!(
                "{}: invalid range [{}, {}]",
                name, self.min, self.max
            )));
        }

        let step = if self.levels > 1 {
            (self.max - self.min) / (self.levels - 1) as f64
        } else {
            0.0
        };

        Ok((0..self.levels)
            .map(|i| {
                let x = if i + 1 == self.levels && self.levels > 1 {
                    self.max
                } else {
                    self.min + step * i as f64
                };
                match self.scale {
                    Scale::Log10 => 10f64.powf(x),
                    Scale::Linear => x,
                }
            })
            .collect())
    }
}

/// One concrete assignment of every tunable hyperparameter (a grid point)
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct HyperParams {
    /// Relative cost-complexity pruning parameter
    pub cost_complexity: f64,
    /// Minimum node size for a split to be attempted
    pub min_n: usize,
}

pub type GridPoint = HyperParams;

impl HyperParams {
    /// `Greater` when `self` is the simpler tree: higher cost_complexity,
    /// then larger min_n.
    pub fn simplicity_cmp(&self, other: &Self) -> Ordering {
        self.cost_complexity
            .total_cmp(&other.cost_complexity)
            .then(self.min_n.cmp(&other.min_n))
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("cost_complexity".to_string(), self.cost_complexity);
        map.insert("min_n".to_string(), self.min_n as f64);
        map
    }
}

impl fmt::Display for HyperParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cost_complexity={:e}, min_n={}",
            self.cost_complexity, self.min_n
        )
    }
}

/// Ordered set of grid points
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Grid {
    pub points: Vec<HyperParams>,
}

impl Grid {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Cross product of the candidate values, cost_complexity varying fastest.
///
/// min_n candidates are rounded to integers; values that collapse onto the
/// same integer are kept once.
pub fn regular_grid(cost_complexity: &ParamRange, min_n: &ParamRange) -> Result<Grid, TuningError> {
    let mut costs = cost_complexity.values("cost_complexity")?;
    costs.dedup();

    let mut sizes = Vec::new();
    for value in min_n.values("min_n")? {
        let rounded = value.round();
        if rounded < 1.0 {
            return Err(TuningError::InvalidConfig(format!(
                "min_n: candidate {} is below 1",
                value
            )));
        }
        sizes.push(rounded as usize);
    }
    sizes.dedup();

    let points = sizes
        .iter()
        .flat_map(|&n| {
            costs.iter().map(move |&c| HyperParams {
                cost_complexity: c,
                min_n: n,
            })
        })
        .collect();

    Ok(Grid { points })
}
