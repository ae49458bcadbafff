//! Survey Tree Tuner
//!
//! Deterministic hyperparameter tuning for a regression tree fitted to a
//! tabular survey. The pipeline splits the data into stratified train and
//! test subsets, draws stratified bootstrap resamples of the training
//! subset, fits every point of a regular `cost_complexity × min_n` grid on
//! every resample in parallel, and selects and refits the best grid point.
//!
//! Identical configuration, data and seed always produce identical
//! resamples, tuning tables, selections and model hashes.

pub mod cache;
pub mod cart;
pub mod config;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod fitter;
pub mod grid;
pub mod learner;
pub mod metrics;
pub mod pipeline;
pub mod resample;
pub mod selector;
pub mod split;
pub mod strata;
pub mod tuner;

#[cfg(test)]
mod test_support;

pub use cache::{
    open_cache, CacheBackend, CacheConfig, CacheKey, CacheKeyMaterial, MemoryCache, NoCache,
    SledCache, TuningCache,
};
pub use cart::{CartBuilder, TreeConfig};
pub use config::{DataConfig, ExecutionConfig, GridConfig, PipelineConfig, SelectionConfig};
pub use dataset::{Column, ColumnKind, ColumnSpec, Dataset, MissingPolicy, Record, Value};
pub use errors::{FitError, TuningError};
pub use fitter::{evaluate_holdout, finalize, FeatureImportance, FinalFit, FitDiagnostics, HoldoutMetrics};
pub use grid::{regular_grid, Grid, GridPoint, HyperParams, ParamRange, Scale};
pub use learner::{CartLearner, TreeLearner};
pub use metrics::Metric;
pub use pipeline::{Pipeline, PipelineReport};
pub use resample::{bootstraps, BootstrapConfig, Resample, ResampleCollection};
pub use selector::{select, RankedPoint, Selection, SelectionRule};
pub use split::{initial_split, Split, SplitConfig};
pub use strata::{Strata, StrataSpec};
pub use tuner::{ExcludedGridPoint, FitOutcome, FitRecord, GridSummary, Tuner, TuningTable};
