use survey_tree_core::ModelError;
use thiserror::Error;

use crate::grid::HyperParams;

/// Errors returned by the tuning pipeline.
#[derive(Debug, Error)]
pub enum TuningError {
    #[error("invalid split proportion {0}: must lie strictly between 0 and 1")]
    InvalidProportion(f64),

    #[error("cannot stratify on '{field}': level '{level}' has {count} record(s), at least 2 required")]
    Stratification {
        field: String,
        level: String,
        count: usize,
    },

    #[error("bootstrap resample {resample} has an empty assessment set")]
    DegenerateResample { resample: usize },

    #[error("grid point {grid_point} excluded: all {failures} resample fit(s) failed: {reasons}")]
    InsufficientData {
        grid_point: HyperParams,
        failures: usize,
        reasons: String,
    },

    #[error("tuning table has no valid grid points")]
    EmptyTuningTable,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("model fit failed: {0}")]
    Fit(#[from] FitError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a single tree fit. Recovered per (grid point, resample) pair.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FitError {
    #[error("no rows to fit")]
    EmptyNode,

    #[error("outcome is not finite at row {row}")]
    NonFiniteOutcome { row: usize },

    #[error("tree has no splits after pruning")]
    Degenerate,

    #[error("invalid model: {0}")]
    Model(String),
}
