//! Grid search over bootstrap resamples
//!
//! Every (grid point, resample) pair is an independent fit. Pairs run on a
//! rayon pool owned by the tuning run; each worker folds its results into a
//! private partial table and the partial tables are merged once all fits are
//! done. The merged table is keyed by (grid index, resample index), so the
//! summary does not depend on which worker finished first.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::dataset::Dataset;
use crate::errors::{FitError, TuningError};
use crate::grid::{Grid, HyperParams};
use crate::learner::TreeLearner;
use crate::metrics::Metric;
use crate::resample::ResampleCollection;

/// Result of one (grid point, resample) fit
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FitOutcome {
    Scored { value: f64 },
    Failed { reason: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FitRecord {
    pub grid_index: usize,
    pub resample_index: usize,
    pub outcome: FitOutcome,
}

/// Aggregated performance of one grid point
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GridSummary {
    pub grid_index: usize,
    pub params: HyperParams,
    /// Metric value per resample, in resample order; `None` marks a failed fit
    pub values: Vec<Option<f64>>,
    /// Successful fits
    pub n: usize,
    pub failures: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation over `sqrt(n)`; needs at least two values
    pub std_err: Option<f64>,
}

impl GridSummary {
    pub fn is_valid(&self) -> bool {
        self.mean.is_some()
    }
}

/// A grid point with no successful fit
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExcludedGridPoint {
    pub grid_index: usize,
    pub params: HyperParams,
    pub failures: usize,
    /// Distinct failure reasons, sorted
    pub reasons: Vec<String>,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TuningTable {
    pub metric: Metric,
    pub resamples: usize,
    /// One entry per grid point, in grid order
    pub summaries: Vec<GridSummary>,
    pub excluded: Vec<ExcludedGridPoint>,
}

#[derive(Serialize)]
struct CsvRow {
    cost_complexity: f64,
    min_n: usize,
    mean: Option<f64>,
    std_err: Option<f64>,
    n: usize,
    failures: usize,
}

impl TuningTable {
    /// Aggregate fit records. The result depends only on the set of
    /// records, not on their order.
    pub fn from_records<I>(metric: Metric, grid: &Grid, resamples: usize, records: I) -> Self
    where
        I: IntoIterator<Item = FitRecord>,
    {
        let keyed: BTreeMap<(usize, usize), FitOutcome> = records
            .into_iter()
            .map(|r| ((r.grid_index, r.resample_index), r.outcome))
            .collect();

        let mut summaries = Vec::with_capacity(grid.len());
        let mut excluded = Vec::new();

        for (grid_index, params) in grid.points.iter().enumerate() {
            let values: Vec<Option<f64>> = (0..resamples)
                .map(|r| match keyed.get(&(grid_index, r)) {
                    Some(FitOutcome::Scored { value }) => Some(*value),
                    _ => None,
                })
                .collect();

            let scored: Vec<f64> = values.iter().flatten().copied().collect();
            let n = scored.len();
            let failures = resamples - n;
            let (mean, std_err) = mean_and_std_err(&scored);

            if n == 0 {
                let reasons: Vec<String> = (0..resamples)
                    .map(|r| match keyed.get(&(grid_index, r)) {
                        Some(FitOutcome::Failed { reason }) => reason.clone(),
                        _ => "no result recorded".to_string(),
                    })
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let error = TuningError::InsufficientData {
                    grid_point: *params,
                    failures,
                    reasons: reasons.join("; "),
                };
                warn!("{}", error);
                excluded.push(ExcludedGridPoint {
                    grid_index,
                    params: *params,
                    failures,
                    reasons,
                    reason: error.to_string(),
                });
            }

            summaries.push(GridSummary {
                grid_index,
                params: *params,
                values,
                n,
                failures,
                mean,
                std_err,
            });
        }

        Self {
            metric,
            resamples,
            summaries,
            excluded,
        }
    }

    /// Summaries with at least one successful fit
    pub fn valid(&self) -> impl Iterator<Item = &GridSummary> {
        self.summaries.iter().filter(|s| s.is_valid())
    }

    /// Total recorded results (successful fits)
    pub fn result_count(&self) -> usize {
        self.summaries.iter().map(|s| s.n).sum()
    }

    /// Write cost_complexity, min_n, mean, std_err, n, failures per grid point
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), TuningError> {
        let mut writer = csv::Writer::from_path(path.as_ref())
            .map_err(|e| TuningError::Io(std::io::Error::other(e)))?;

        for summary in &self.summaries {
            writer
                .serialize(CsvRow {
                    cost_complexity: summary.params.cost_complexity,
                    min_n: summary.params.min_n,
                    mean: summary.mean,
                    std_err: summary.std_err,
                    n: summary.n,
                    failures: summary.failures,
                })
                .map_err(|e| TuningError::Io(std::io::Error::other(e)))?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn mean_and_std_err(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (Some(mean), None);
    }

    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (Some(mean), Some((variance / n).sqrt()))
}

/// Fits every grid point on every resample and scores it.
///
/// Owns the worker pool of a run; `install` runs other parallel stages of
/// the same run (resampling) on that pool.
pub struct Tuner<L: TreeLearner> {
    learner: L,
    metric: Metric,
    pool: rayon::ThreadPool,
}

impl<L: TreeLearner> Tuner<L> {
    /// `workers == 0` means one worker per CPU
    pub fn new(learner: L, metric: Metric, workers: usize) -> Result<Self, TuningError> {
        let workers = if workers == 0 {
            num_cpus::get()
        } else {
            workers
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| TuningError::InvalidConfig(format!("cannot start worker pool: {}", e)))?;

        Ok(Self {
            learner,
            metric,
            pool,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `op` on the run's worker pool
    pub fn install<R, F>(&self, op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(op)
    }

    /// Run the grid search. Per-pair failures are recorded, not returned.
    pub fn tune(
        &self,
        train: &Dataset,
        resamples: &ResampleCollection,
        grid: &Grid,
    ) -> Result<TuningTable, TuningError> {
        if grid.is_empty() {
            return Err(TuningError::InvalidConfig("grid is empty".to_string()));
        }
        if resamples.is_empty() {
            return Err(TuningError::InvalidConfig(
                "no resamples to tune over".to_string(),
            ));
        }

        let pairs: Vec<(usize, usize)> = (0..grid.len())
            .flat_map(|g| (0..resamples.len()).map(move |r| (g, r)))
            .collect();

        info!(
            "Tuning {} grid points x {} resamples on {} workers",
            grid.len(),
            resamples.len(),
            self.workers()
        );

        let records: Vec<FitRecord> = self.install(|| {
            pairs
                .par_iter()
                .fold(Vec::new, |mut partial, &(g, r)| {
                    partial.push(self.fit_pair(train, resamples, grid, g, r));
                    partial
                })
                .reduce(Vec::new, |mut a, mut b| {
                    a.append(&mut b);
                    a
                })
        });

        let table = TuningTable::from_records(self.metric, grid, resamples.len(), records);
        info!(
            "Tuning finished: {} results, {} grid point(s) excluded",
            table.result_count(),
            table.excluded.len()
        );
        Ok(table)
    }

    fn fit_pair(
        &self,
        train: &Dataset,
        resamples: &ResampleCollection,
        grid: &Grid,
        grid_index: usize,
        resample_index: usize,
    ) -> FitRecord {
        let resample = &resamples.resamples[resample_index];
        let params = &grid.points[grid_index];

        let outcome = match self.score(train, &resample.analysis, &resample.assessment, params) {
            Ok(Some(value)) => FitOutcome::Scored { value },
            Ok(None) => FitOutcome::Failed {
                reason: format!("{} is undefined on the assessment set", self.metric),
            },
            Err(e) => FitOutcome::Failed {
                reason: e.to_string(),
            },
        };

        if let FitOutcome::Failed { reason } = &outcome {
            debug!("Fit failed for {} on {}: {}", params, resample.id, reason);
        }

        FitRecord {
            grid_index,
            resample_index,
            outcome,
        }
    }

    /// Fit on `analysis`, score on `assessment`. A tree with no splits
    /// counts as a failed pair.
    fn score(
        &self,
        train: &Dataset,
        analysis: &[usize],
        assessment: &[usize],
        params: &HyperParams,
    ) -> Result<Option<f64>, FitError> {
        let model = self.learner.fit(train, analysis, params)?;
        if self.learner.split_count(&model) == 0 {
            return Err(FitError::Degenerate);
        }

        let estimate = self.learner.predict(&model, train, assessment)?;
        let truth: Vec<f64> = assessment.iter().map(|&row| train.targets[row]).collect();
        Ok(self.metric.compute(&truth, &estimate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{regular_grid, ParamRange, Scale};
    use crate::learner::CartLearner;
    use crate::resample::{bootstraps, BootstrapConfig};
    use crate::test_support::survey_dataset;

    fn small_grid() -> Grid {
        regular_grid(
            &ParamRange {
                min: -4.0,
                max: -1.0,
                levels: 2,
                scale: Scale::Log10,
            },
            &ParamRange {
                min: 4.0,
                max: 10.0,
                levels: 2,
                scale: Scale::Linear,
            },
        )
        .unwrap()
    }

    fn scored(grid_index: usize, resample_index: usize, value: f64) -> FitRecord {
        FitRecord {
            grid_index,
            resample_index,
            outcome: FitOutcome::Scored { value },
        }
    }

    fn failed(grid_index: usize, resample_index: usize) -> FitRecord {
        FitRecord {
            grid_index,
            resample_index,
            outcome: FitOutcome::Failed {
                reason: "tree has no splits after pruning".to_string(),
            },
        }
    }

    #[test]
    fn test_summary_statistics() {
        let grid = small_grid();
        let records = vec![
            scored(0, 0, 2.0),
            scored(0, 1, 4.0),
            scored(0, 2, 6.0),
            failed(1, 0),
            scored(1, 1, 3.0),
            failed(1, 2),
        ];
        let table = TuningTable::from_records(Metric::Rmse, &grid, 3, records);

        let first = &table.summaries[0];
        assert_eq!(first.n, 3);
        assert_eq!(first.mean, Some(4.0));
        assert!((first.std_err.unwrap() - 2.0 / 3f64.sqrt()).abs() < 1e-12);

        let second = &table.summaries[1];
        assert_eq!(second.values, vec![None, Some(3.0), None]);
        assert_eq!(second.failures, 2);
        assert_eq!(second.std_err, None);

        // grid points 2 and 3 have no records at all
        assert_eq!(table.excluded.len(), 2);
        assert_eq!(table.valid().count(), 2);
        assert_eq!(table.excluded[0].reasons, vec!["no result recorded".to_string()]);
    }

    #[test]
    fn test_excluded_point_names_failure_reasons() {
        let grid = small_grid();
        let records = vec![
            failed(0, 0),
            FitRecord {
                grid_index: 0,
                resample_index: 1,
                outcome: FitOutcome::Failed {
                    reason: "rmse is undefined on the assessment set".to_string(),
                },
            },
            failed(0, 2),
        ];
        let table = TuningTable::from_records(Metric::Rmse, &grid, 3, records);

        let first = &table.excluded[0];
        assert_eq!(first.grid_index, 0);
        assert_eq!(first.failures, 3);
        assert_eq!(
            first.reasons,
            vec![
                "rmse is undefined on the assessment set".to_string(),
                "tree has no splits after pruning".to_string(),
            ]
        );
        assert!(first.reason.contains("tree has no splits after pruning"));
        assert!(first.reason.contains("rmse is undefined"));
    }

    #[test]
    fn test_record_order_does_not_matter() {
        let grid = small_grid();
        let records = vec![scored(0, 0, 1.5), scored(0, 1, 2.5), scored(3, 0, 9.0), failed(3, 1)];
        let mut reversed = records.clone();
        reversed.reverse();

        assert_eq!(
            TuningTable::from_records(Metric::Rmse, &grid, 2, records),
            TuningTable::from_records(Metric::Rmse, &grid, 2, reversed)
        );
    }

    #[test]
    fn test_tune_covers_every_pair() {
        let train = survey_dataset(60);
        let resamples = bootstraps(
            &train,
            &BootstrapConfig {
                bootstraps: 4,
                strata: "monthly_spend".to_string(),
                strata_bins: 4,
            },
            9,
        )
        .unwrap();
        let grid = small_grid();

        let tuner = Tuner::new(CartLearner::default(), Metric::Rmse, 2).unwrap();
        let table = tuner.tune(&train, &resamples, &grid).unwrap();

        assert_eq!(table.summaries.len(), grid.len());
        for summary in &table.summaries {
            assert_eq!(summary.values.len(), 4);
            assert_eq!(summary.n + summary.failures, 4);
        }
        assert!(table.valid().count() > 0);
    }

    #[test]
    fn test_tune_independent_of_worker_count() {
        let train = survey_dataset(60);
        let resamples = bootstraps(
            &train,
            &BootstrapConfig {
                bootstraps: 6,
                strata: "age_group".to_string(),
                strata_bins: 4,
            },
            21,
        )
        .unwrap();
        let grid = small_grid();

        let one = Tuner::new(CartLearner::default(), Metric::Mae, 1)
            .unwrap()
            .tune(&train, &resamples, &grid)
            .unwrap();
        let four = Tuner::new(CartLearner::default(), Metric::Mae, 4)
            .unwrap()
            .tune(&train, &resamples, &grid)
            .unwrap();
        assert_eq!(one, four);
    }

    #[test]
    fn test_root_only_fits_are_failures() {
        let train = survey_dataset(60);
        let resamples = bootstraps(
            &train,
            &BootstrapConfig {
                bootstraps: 3,
                strata: "monthly_spend".to_string(),
                strata_bins: 4,
            },
            4,
        )
        .unwrap();
        // pruning penalty far above the root's SSE
        let grid = Grid {
            points: vec![HyperParams {
                cost_complexity: 10.0,
                min_n: 2,
            }],
        };

        let table = Tuner::new(CartLearner::default(), Metric::Rmse, 2)
            .unwrap()
            .tune(&train, &resamples, &grid)
            .unwrap();
        assert_eq!(table.summaries[0].failures, 3);
        assert_eq!(
            table.excluded[0].reasons,
            vec![FitError::Degenerate.to_string()]
        );
    }

    #[test]
    fn test_install_uses_run_pool() {
        let tuner = Tuner::new(CartLearner::default(), Metric::Rmse, 3).unwrap();
        assert_eq!(tuner.workers(), 3);
        assert_eq!(tuner.install(rayon::current_num_threads), 3);

        let train = survey_dataset(40);
        let config = BootstrapConfig {
            bootstraps: 8,
            strata: "age_group".to_string(),
            strata_bins: 4,
        };
        let inside = tuner.install(|| bootstraps(&train, &config, 2)).unwrap();
        let single = Tuner::new(CartLearner::default(), Metric::Rmse, 1)
            .unwrap()
            .install(|| bootstraps(&train, &config, 2))
            .unwrap();
        assert_eq!(inside, single);
    }

    #[test]
    fn test_write_csv() {
        let grid = small_grid();
        let table = TuningTable::from_records(Metric::Rmse, &grid, 1, vec![scored(0, 0, 2.5)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuning_table.csv");
        table.write_csv(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next(),
            Some("cost_complexity,min_n,mean,std_err,n,failures")
        );
        let first: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert!((first[0].parse::<f64>().unwrap() - 1e-4).abs() < 1e-15);
        assert_eq!(&first[1..], &["4", "2.5", "", "1", "0"]);
        assert_eq!(contents.lines().count(), grid.len() + 1);
    }
}
