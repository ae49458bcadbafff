//! Tuning-table cache
//!
//! A tuning run is a pure function of its inputs, so its table can be
//! reused when the dataset, split, resampling, grid, metric, seed and
//! learner settings are all unchanged. The key is the BLAKE3 hash of the
//! canonical JSON of those inputs.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use survey_tree_core::hash_canonical_hex;
use tracing::debug;

use crate::errors::TuningError;
use crate::grid::Grid;
use crate::learner::CartLearner;
use crate::metrics::Metric;
use crate::resample::BootstrapConfig;
use crate::split::SplitConfig;
use crate::tuner::TuningTable;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    None,
    Memory,
    Sled,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Database directory, required by the sled backend
    pub path: Option<PathBuf>,
}

/// Everything a tuning table depends on
#[derive(Debug, Serialize)]
pub struct CacheKeyMaterial<'a> {
    pub dataset: &'a str,
    pub split: &'a SplitConfig,
    pub resampling: &'a BootstrapConfig,
    pub grid: &'a Grid,
    pub metric: Metric,
    pub seed: u64,
    pub learner: &'a CartLearner,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(pub String);

impl CacheKey {
    pub fn derive(material: &CacheKeyMaterial<'_>) -> Result<Self, TuningError> {
        Ok(Self(hash_canonical_hex(material)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Storage for tuning tables
pub trait TuningCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<TuningTable>, TuningError>;
    fn put(&self, key: &CacheKey, table: &TuningTable) -> Result<(), TuningError>;
}

/// Caching disabled
#[derive(Debug, Default)]
pub struct NoCache;

impl TuningCache for NoCache {
    fn get(&self, _key: &CacheKey) -> Result<Option<TuningTable>, TuningError> {
        Ok(None)
    }

    fn put(&self, _key: &CacheKey, _table: &TuningTable) -> Result<(), TuningError> {
        Ok(())
    }
}

/// Process-local cache
#[derive(Debug, Default, Clone)]
pub struct MemoryCache {
    tables: Arc<RwLock<HashMap<CacheKey, TuningTable>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

impl TuningCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<TuningTable>, TuningError> {
        Ok(self.tables.read().get(key).cloned())
    }

    fn put(&self, key: &CacheKey, table: &TuningTable) -> Result<(), TuningError> {
        self.tables.write().insert(key.clone(), table.clone());
        Ok(())
    }
}

/// On-disk cache backed by a sled tree of JSON-encoded tables
pub struct SledCache {
    db: Db,
    tables: Tree,
}

impl SledCache {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TuningError> {
        let db = sled::open(path).map_err(cache_error)?;
        let tables = db.open_tree("tuning_tables").map_err(cache_error)?;
        Ok(Self { db, tables })
    }

    pub fn flush(&self) -> Result<(), TuningError> {
        self.db.flush().map_err(cache_error)?;
        Ok(())
    }
}

impl TuningCache for SledCache {
    fn get(&self, key: &CacheKey) -> Result<Option<TuningTable>, TuningError> {
        match self.tables.get(key.as_str().as_bytes()).map_err(cache_error)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &CacheKey, table: &TuningTable) -> Result<(), TuningError> {
        let data = serde_json::to_vec(table)?;
        self.tables
            .insert(key.as_str().as_bytes(), data)
            .map_err(cache_error)?;
        self.flush()
    }
}

fn cache_error(e: sled::Error) -> TuningError {
    TuningError::Cache(e.to_string())
}

/// Open the configured cache backend
pub fn open_cache(config: &CacheConfig) -> Result<Box<dyn TuningCache>, TuningError> {
    match config.backend {
        CacheBackend::None => Ok(Box::new(NoCache)),
        CacheBackend::Memory => Ok(Box::new(MemoryCache::new())),
        CacheBackend::Sled => {
            let path = config.path.as_ref().ok_or_else(|| {
                TuningError::InvalidConfig("cache.path is required for the sled backend".to_string())
            })?;
            debug!("Opening tuning cache at {}", path.display());
            Ok(Box::new(SledCache::open(path)?))
        }
    }
}
