//! Learner seam between the tuning machinery and the tree algorithm

use serde::{Deserialize, Serialize};
use survey_tree_core::TreeModel;

use crate::cart::{CartBuilder, TreeConfig};
use crate::dataset::Dataset;
use crate::errors::FitError;
use crate::grid::HyperParams;

/// A model family that can be fitted on a subset of rows and scored on another.
///
/// Implementations are shared read-only across tuning workers.
pub trait TreeLearner: Sync {
    type Model: Send + Sync;

    /// Fit on `rows` of `data` (rows may repeat)
    fn fit(&self, data: &Dataset, rows: &[usize], params: &HyperParams)
        -> Result<Self::Model, FitError>;

    /// Predictions for `rows` of `data`, in the same order
    fn predict(&self, model: &Self::Model, data: &Dataset, rows: &[usize])
        -> Result<Vec<f64>, FitError>;

    /// Internal nodes of a fitted model; zero for a single-leaf tree
    fn split_count(&self, model: &Self::Model) -> usize;
}

/// CART regression tree with cost-complexity pruning
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CartLearner {
    pub max_depth: usize,
}

impl CartLearner {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

impl Default for CartLearner {
    fn default() -> Self {
        Self { max_depth: 30 }
    }
}

impl TreeLearner for CartLearner {
    type Model = TreeModel;

    fn fit(
        &self,
        data: &Dataset,
        rows: &[usize],
        params: &HyperParams,
    ) -> Result<TreeModel, FitError> {
        let layout = data.feature_info();
        let config = TreeConfig::from_params(params, self.max_depth);
        let tree = CartBuilder::new(&data.features, &data.targets, &layout, config).build(rows)?;

        let model = TreeModel::new(data.outcome_name(), layout, params.to_map(), tree);
        model
            .validate()
            .map_err(|e| FitError::Model(e.to_string()))?;
        Ok(model)
    }

    fn predict(
        &self,
        model: &TreeModel,
        data: &Dataset,
        rows: &[usize],
    ) -> Result<Vec<f64>, FitError> {
        rows.iter()
            .map(|&r| {
                model
                    .predict(&data.features[r])
                    .map_err(|e| FitError::Model(e.to_string()))
            })
            .collect()
    }

    fn split_count(&self, model: &TreeModel) -> usize {
        model.tree.split_count()
    }
}
