//! Best-model selection from a tuning table

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::errors::TuningError;
use crate::grid::HyperParams;
use crate::metrics::Metric;
use crate::tuner::{GridSummary, TuningTable};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// Best mean metric
    Best,
    /// Simplest grid point within one standard error of the best
    OneStdErr,
}

/// A grid point in the final ranking
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RankedPoint {
    pub grid_index: usize,
    pub params: HyperParams,
    pub mean: f64,
    pub std_err: Option<f64>,
    pub n: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Selection {
    pub metric: Metric,
    pub rule: SelectionRule,
    /// Selected point first, then the runners-up in ranking order
    pub ranked: Vec<RankedPoint>,
}

impl Selection {
    /// The chosen grid point
    pub fn selected(&self) -> &RankedPoint {
        &self.ranked[0]
    }
}

impl RankedPoint {
    fn from_summary(summary: &GridSummary) -> Option<Self> {
        Some(Self {
            grid_index: summary.grid_index,
            params: summary.params,
            mean: summary.mean?,
            std_err: summary.std_err,
            n: summary.n,
        })
    }
}

/// Rank the valid grid points of `table` and pick one under `rule`.
///
/// Ties on the mean go to the simpler grid point, then the lower grid index,
/// so the result does not depend on the order of the table's entries.
pub fn select(
    table: &TuningTable,
    top_k: usize,
    rule: SelectionRule,
) -> Result<Selection, TuningError> {
    if top_k == 0 {
        return Err(TuningError::InvalidConfig(
            "top_k must be at least 1".to_string(),
        ));
    }

    let metric = table.metric;
    let mut ranked: Vec<RankedPoint> = table
        .summaries
        .iter()
        .filter_map(RankedPoint::from_summary)
        .collect();
    if ranked.is_empty() {
        return Err(TuningError::EmptyTuningTable);
    }

    ranked.sort_by(|a, b| {
        let by_mean = if metric.minimize() {
            a.mean.total_cmp(&b.mean)
        } else {
            b.mean.total_cmp(&a.mean)
        };
        by_mean
            .then_with(|| b.params.simplicity_cmp(&a.params))
            .then(a.grid_index.cmp(&b.grid_index))
    });

    if rule == SelectionRule::OneStdErr {
        let pick = one_std_err_index(&ranked, metric);
        let chosen = ranked.remove(pick);
        ranked.insert(0, chosen);
    }

    ranked.truncate(top_k);
    Ok(Selection {
        metric,
        rule,
        ranked,
    })
}

/// Index of the simplest point whose mean lies within one standard error
/// of the best. `ranked` must already be sorted best first.
fn one_std_err_index(ranked: &[RankedPoint], metric: Metric) -> usize {
    let best = &ranked[0];
    let band = best.std_err.unwrap_or(0.0);
    let within = |p: &RankedPoint| {
        if metric.minimize() {
            p.mean <= best.mean + band
        } else {
            p.mean >= best.mean - band
        }
    };

    let mut pick = 0;
    for (i, point) in ranked.iter().enumerate().skip(1) {
        if within(point) && point.params.simplicity_cmp(&ranked[pick].params) == Ordering::Greater {
            pick = i;
        }
    }
    pick
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::tuner::{FitOutcome, FitRecord};

    fn grid() -> Grid {
        Grid {
            points: vec![
                HyperParams {
                    cost_complexity: 0.001,
                    min_n: 2,
                },
                HyperParams {
                    cost_complexity: 0.01,
                    min_n: 2,
                },
                HyperParams {
                    cost_complexity: 0.1,
                    min_n: 2,
                },
                HyperParams {
                    cost_complexity: 0.1,
                    min_n: 20,
                },
            ],
        }
    }

    /// Two resamples per grid point with the given (low, high) values
    fn table(metric: Metric, values: &[(f64, f64)]) -> TuningTable {
        let records = values.iter().enumerate().flat_map(|(g, &(a, b))| {
            [a, b].into_iter().enumerate().map(move |(r, value)| FitRecord {
                grid_index: g,
                resample_index: r,
                outcome: FitOutcome::Scored { value },
            })
        });
        TuningTable::from_records(metric, &grid(), 2, records.collect::<Vec<_>>())
    }

    #[test]
    fn test_best_minimizes_rmse() {
        // means 10, 9, 12, 20
        let t = table(Metric::Rmse, &[(9.0, 11.0), (8.0, 10.0), (11.0, 13.0), (19.0, 21.0)]);
        let selection = select(&t, 3, SelectionRule::Best).unwrap();

        let order: Vec<usize> = selection.ranked.iter().map(|p| p.grid_index).collect();
        assert_eq!(order, vec![1, 0, 2]);
        assert_eq!(selection.selected().mean, 9.0);
    }

    #[test]
    fn test_best_maximizes_rsq() {
        let t = table(Metric::Rsq, &[(0.5, 0.5), (0.6, 0.6), (0.4, 0.4), (0.1, 0.1)]);
        let selection = select(&t, 1, SelectionRule::Best).unwrap();
        assert_eq!(selection.selected().grid_index, 1);
        assert_eq!(selection.ranked.len(), 1);
    }

    #[test]
    fn test_one_std_err_prefers_simpler() {
        // best is grid 1 (mean 9, se 1); grid 2 (mean 9.8) is within the band
        // and simpler; grid 3 (mean 20) is not
        let t = table(Metric::Rmse, &[(9.0, 11.0), (8.0, 10.0), (9.6, 10.0), (19.0, 21.0)]);
        let selection = select(&t, 2, SelectionRule::OneStdErr).unwrap();

        assert_eq!(selection.selected().grid_index, 2);
        assert_eq!(selection.ranked[1].grid_index, 1);
    }

    #[test]
    fn test_ties_go_to_simpler_point() {
        let t = table(Metric::Rmse, &[(5.0, 5.0), (5.0, 5.0), (5.0, 5.0), (5.0, 5.0)]);
        let selection = select(&t, 4, SelectionRule::Best).unwrap();
        let order: Vec<usize> = selection.ranked.iter().map(|p| p.grid_index).collect();
        assert_eq!(order, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_errors() {
        let t = table(Metric::Rmse, &[(1.0, 1.0), (1.0, 1.0), (1.0, 1.0), (1.0, 1.0)]);
        assert!(matches!(
            select(&t, 0, SelectionRule::Best),
            Err(TuningError::InvalidConfig(_))
        ));

        let empty = TuningTable::from_records(Metric::Rmse, &grid(), 2, Vec::new());
        assert!(matches!(
            select(&empty, 1, SelectionRule::Best),
            Err(TuningError::EmptyTuningTable)
        ));
    }
}
