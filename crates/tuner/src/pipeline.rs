//! End-to-end tuning pipeline
//!
//! load → split → resample → grid → tune → select → final fit → hold-out

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use survey_tree_core::to_canonical_json_pretty;
use tracing::info;

use crate::cache::{open_cache, CacheKey, CacheKeyMaterial, TuningCache};
use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::errors::TuningError;
use crate::fitter::{evaluate_holdout, finalize, FinalFit, HoldoutMetrics};
use crate::grid::regular_grid;
use crate::metrics::Metric;
use crate::resample::bootstraps;
use crate::selector::{select, Selection};
use crate::split::initial_split;
use crate::tuner::{Tuner, TuningTable};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DatasetSummary {
    pub rows: usize,
    pub outcome: String,
    pub predictors: Vec<String>,
    pub fingerprint: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SplitSummary {
    pub strata: String,
    pub train: usize,
    pub test: usize,
}

/// Everything a run produced
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PipelineReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub seed: u64,
    pub metric: Metric,
    pub dataset: DatasetSummary,
    pub split: SplitSummary,
    pub resamples: usize,
    pub grid_size: usize,
    pub cache_key: String,
    pub cache_hit: bool,
    pub tuning: TuningTable,
    pub selection: Selection,
    pub final_fit: FinalFit,
    pub holdout: HoldoutMetrics,
}

impl PipelineReport {
    /// Write `report.json`, `tuning_table.csv`, `model.json` and `model.hash`
    /// into `dir`, creating it if needed
    pub fn write_artifacts<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>, TuningError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let report_path = dir.join("report.json");
        std::fs::write(&report_path, to_canonical_json_pretty(self)?)?;

        let table_path = dir.join("tuning_table.csv");
        self.tuning.write_csv(&table_path)?;

        let model_path = dir.join("model.json");
        self.final_fit.model.save_json(&model_path)?;

        let hash_path = dir.join("model.hash");
        std::fs::write(&hash_path, &self.final_fit.diagnostics.model_hash)?;

        Ok(vec![report_path, table_path, model_path, hash_path])
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    cache: Box<dyn TuningCache>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, cache: Box<dyn TuningCache>) -> Self {
        Self { config, cache }
    }

    /// Pipeline with the cache backend named in the configuration
    pub fn from_config(config: PipelineConfig) -> Result<Self, TuningError> {
        let cache = open_cache(&config.cache)?;
        Ok(Self::new(config, cache))
    }

    /// Load the configured CSV and run every stage
    pub fn run(&self) -> Result<PipelineReport, TuningError> {
        let data = &self.config.data;
        info!("Loading dataset from: {}", data.path.display());
        let dataset = Dataset::from_csv(
            &data.path,
            &data.schema,
            &data.outcome,
            &data.predictors,
            data.missing,
        )?;

        self.run_on_dataset(&dataset)
    }

    pub fn run_on_dataset(&self, dataset: &Dataset) -> Result<PipelineReport, TuningError> {
        let started_at = Utc::now();
        let config = &self.config;
        config.validate()?;
        let tuner = Tuner::new(config.tree.clone(), config.metric, config.execution.workers)?;

        info!(
            "Loaded {} rows with {} predictors",
            dataset.len(),
            dataset.feature_count
        );
        for (name, min, max) in dataset.feature_stats() {
            info!("  {}: min={}, max={}", name, min, max);
        }
        let fingerprint = dataset.fingerprint()?;

        let split = initial_split(dataset, &config.split, config.seed)?;
        info!(
            "Split on '{}': {} train, {} test",
            config.split.strata,
            split.train.len(),
            split.test.len()
        );

        let resamples =
            tuner.install(|| bootstraps(&split.train, &config.resampling, config.seed))?;
        info!("Drew {} bootstrap resamples", resamples.len());

        let grid = regular_grid(&config.grid.cost_complexity, &config.grid.min_n)?;
        info!("Grid has {} points", grid.len());

        let key = CacheKey::derive(&CacheKeyMaterial {
            dataset: &fingerprint,
            split: &config.split,
            resampling: &config.resampling,
            grid: &grid,
            metric: config.metric,
            seed: config.seed,
            learner: &config.tree,
        })?;

        let (tuning, cache_hit) = match self.cache.get(&key)? {
            Some(table) => {
                info!("Tuning cache hit ({})", key.as_str());
                (table, true)
            }
            None => {
                let table = tuner.tune(&split.train, &resamples, &grid)?;
                self.cache.put(&key, &table)?;
                (table, false)
            }
        };

        let selection = select(&tuning, config.selection.top_k, config.selection.rule)?;
        let best = selection.selected();
        info!(
            "Selected {} ({} = {:.4}, n = {})",
            best.params, config.metric, best.mean, best.n
        );

        let final_fit = finalize(&config.tree, &split.train, &best.params)?;
        let holdout = evaluate_holdout(&config.tree, &final_fit.model, &split.test)?;
        info!(
            "Hold-out on {} rows: rmse={:.4}, mae={:.4}",
            holdout.n, holdout.rmse, holdout.mae
        );

        Ok(PipelineReport {
            started_at,
            finished_at: Utc::now(),
            seed: config.seed,
            metric: config.metric,
            dataset: DatasetSummary {
                rows: dataset.len(),
                outcome: dataset.outcome_name().to_string(),
                predictors: dataset
                    .predictor_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                fingerprint,
            },
            split: SplitSummary {
                strata: config.split.strata.clone(),
                train: split.train.len(),
                test: split.test.len(),
            },
            resamples: resamples.len(),
            grid_size: grid.len(),
            cache_key: key.0,
            cache_hit,
            tuning,
            selection,
            final_fit,
            holdout,
        })
    }
}
