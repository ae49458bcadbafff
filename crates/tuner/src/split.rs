//! Stratified train/test splitting

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::Dataset;
use crate::deterministic::{LcgRng, SPLIT_STREAM};
use crate::errors::TuningError;
use crate::strata::{Strata, StrataSpec};

/// How to partition the dataset
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SplitConfig {
    /// Fraction of rows sent to the training subset, in (0, 1)
    pub proportion: f64,
    /// Stratification field
    pub strata: String,
    /// Quantile bins when the stratification field is numeric
    pub strata_bins: usize,
}

impl SplitConfig {
    pub fn strata_spec(&self) -> StrataSpec {
        StrataSpec {
            field: self.strata.clone(),
            bins: self.strata_bins,
        }
    }
}

/// Disjoint, exhaustive train/test partition
#[derive(Clone, Debug, PartialEq)]
pub struct Split {
    pub train: Dataset,
    pub test: Dataset,
    /// Source row of each training row, ascending
    pub train_rows: Vec<usize>,
    /// Source row of each test row, ascending
    pub test_rows: Vec<usize>,
}

/// Split `dataset` into training and test subsets, stratified by `config.strata`.
///
/// Each stratum level contributes `round(p * n)` rows to training, clamped
/// so both subsets receive at least one row of that level.
pub fn initial_split(
    dataset: &Dataset,
    config: &SplitConfig,
    seed: u64,
) -> Result<Split, TuningError> {
    let p = config.proportion;
    if !(p > 0.0 && p < 1.0) {
        return Err(TuningError::InvalidProportion(p));
    }

    let strata = Strata::assign(dataset, &config.strata_spec())?;
    strata.require_min_count(2)?;

    let mut rng = LcgRng::for_stream(seed, SPLIT_STREAM);
    let mut train_rows = Vec::with_capacity(dataset.len());
    let mut test_rows = Vec::with_capacity(dataset.len());

    for (level, rows) in &strata.levels {
        let n = rows.len();
        let take = ((p * n as f64).round() as usize).clamp(1, n - 1);

        let mut shuffled = rows.clone();
        rng.shuffle(&mut shuffled);
        train_rows.extend_from_slice(&shuffled[..take]);
        test_rows.extend_from_slice(&shuffled[take..]);

        debug!("Stratum {}={}: {} train, {} test", strata.field, level, take, n - take);
    }

    train_rows.sort_unstable();
    test_rows.sort_unstable();

    Ok(Split {
        train: dataset.subset(&train_rows),
        test: dataset.subset(&test_rows),
        train_rows,
        test_rows,
    })
}
