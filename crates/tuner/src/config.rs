//! Pipeline configuration
//!
//! Loaded from a TOML file. Every setting must be spelled out in the file;
//! unknown keys are rejected.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cache::{CacheBackend, CacheConfig};
use crate::dataset::{ColumnKind, ColumnSpec, MissingPolicy};
use crate::errors::TuningError;
use crate::grid::ParamRange;
use crate::learner::CartLearner;
use crate::metrics::Metric;
use crate::resample::BootstrapConfig;
use crate::selector::SelectionRule;
use crate::split::SplitConfig;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub seed: u64,
    pub metric: Metric,
    pub data: DataConfig,
    pub split: SplitConfig,
    pub resampling: BootstrapConfig,
    pub grid: GridConfig,
    pub tree: CartLearner,
    pub selection: SelectionConfig,
    pub execution: ExecutionConfig,
    pub cache: CacheConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    /// CSV file; relative paths resolve against the config file's directory
    pub path: PathBuf,
    pub outcome: String,
    pub predictors: Vec<String>,
    pub missing: MissingPolicy,
    pub schema: Vec<ColumnSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    pub cost_complexity: ParamRange,
    pub min_n: ParamRange,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SelectionConfig {
    pub rule: SelectionRule,
    pub top_k: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Tuning worker threads; 0 means one per CPU
    pub workers: usize,
}

impl PipelineConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, TuningError> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;

        if let Some(base) = path.parent() {
            if config.data.path.is_relative() {
                config.data.path = base.join(&config.data.path);
            }
            if let Some(cache_path) = config.cache.path.as_mut() {
                if cache_path.is_relative() {
                    *cache_path = base.join(&*cache_path);
                }
            }
        }

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, TuningError> {
        let config: PipelineConfig = toml::from_str(content)
            .map_err(|e| TuningError::InvalidConfig(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked before touching the data
    pub fn validate(&self) -> Result<(), TuningError> {
        let p = self.split.proportion;
        if !(p > 0.0 && p < 1.0) {
            return Err(TuningError::InvalidProportion(p));
        }
        if self.resampling.bootstraps == 0 {
            return Err(invalid("resampling.bootstraps must be at least 1"));
        }
        if self.split.strata_bins == 0 || self.resampling.strata_bins == 0 {
            return Err(invalid("strata_bins must be at least 1"));
        }
        if self.grid.cost_complexity.levels == 0 || self.grid.min_n.levels == 0 {
            return Err(invalid("grid levels must be at least 1"));
        }
        if self.selection.top_k == 0 {
            return Err(invalid("selection.top_k must be at least 1"));
        }
        if self.tree.max_depth == 0 {
            return Err(invalid("tree.max_depth must be at least 1"));
        }
        if self.cache.backend == CacheBackend::Sled && self.cache.path.is_none() {
            return Err(invalid("cache.path is required for the sled backend"));
        }

        let schema = &self.data.schema;
        let declared = |name: &str| schema.iter().find(|c| c.name == name);

        for (i, column) in schema.iter().enumerate() {
            if schema[..i].iter().any(|c| c.name == column.name) {
                return Err(invalid(&format!(
                    "column '{}' is declared twice",
                    column.name
                )));
            }
        }

        match declared(&self.data.outcome) {
            Some(c) if c.kind == ColumnKind::Numeric => {}
            Some(_) => {
                return Err(invalid(&format!(
                    "outcome '{}' must be numeric",
                    self.data.outcome
                )))
            }
            None => {
                return Err(invalid(&format!(
                    "outcome '{}' is not declared in data.schema",
                    self.data.outcome
                )))
            }
        }

        if self.data.predictors.is_empty() {
            return Err(invalid("data.predictors must not be empty"));
        }
        for name in self
            .data
            .predictors
            .iter()
            .chain([&self.split.strata, &self.resampling.strata])
        {
            if declared(name).is_none() {
                return Err(invalid(&format!(
                    "field '{}' is not declared in data.schema",
                    name
                )));
            }
        }

        Ok(())
    }
}

fn invalid(message: &str) -> TuningError {
    TuningError::InvalidConfig(message.to_string())
}
