//! Fitted regression tree model
//!
//! Wraps a [`Tree`] with the feature layout it was fitted against, the
//! outcome name and the hyperparameters used. Canonical JSON keeps the
//! BLAKE3 hash stable across runs and platforms.

use crate::errors::ModelError;
use crate::serde_canon::{hash_canonical_hex, to_canonical_json_pretty};
use crate::tree::{SplitRule, Tree};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Current model format version
pub const MODEL_VERSION: i32 = 1;

/// Kind of an encoded predictor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureKind {
    Numeric,
    /// Encoded as the index into `levels`
    Categorical { levels: Vec<String> },
}

/// A predictor column as seen by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureInfo {
    pub name: String,
    pub kind: FeatureKind,
}

/// A fitted regression tree together with its feature layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeModel {
    /// Model format version
    pub version: i32,

    /// Outcome column the tree predicts
    pub outcome: String,

    /// Predictor layout, in encoding order
    pub features: Vec<FeatureInfo>,

    /// Hyperparameters the tree was fitted with
    pub hyperparameters: BTreeMap<String, f64>,

    /// The fitted tree
    pub tree: Tree,
}

impl TreeModel {
    pub fn new(
        outcome: impl Into<String>,
        features: Vec<FeatureInfo>,
        hyperparameters: BTreeMap<String, f64>,
        tree: Tree,
    ) -> Self {
        Self {
            version: MODEL_VERSION,
            outcome: outcome.into(),
            features,
            hyperparameters,
            tree,
        }
    }

    /// Validate model structure against its feature layout
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.version != MODEL_VERSION {
            return Err(ModelError::ValidationFailed(format!(
                "Unsupported model version: {}",
                self.version
            )));
        }

        self.tree.validate().map_err(ModelError::ValidationFailed)?;

        for node in self.tree.nodes.iter().filter(|n| !n.is_leaf()) {
            let feature = self.features.get(node.feature_idx as usize).ok_or_else(|| {
                ModelError::ValidationFailed(format!(
                    "Node {} references unknown feature {}",
                    node.id, node.feature_idx
                ))
            })?;

            match (&node.rule, &feature.kind) {
                (Some(SplitRule::Numeric { .. }), FeatureKind::Numeric) => {}
                (Some(SplitRule::Categorical { left_levels }), FeatureKind::Categorical { levels }) => {
                    if left_levels.iter().any(|&code| code as usize >= levels.len()) {
                        return Err(ModelError::ValidationFailed(format!(
                            "Node {} references a level outside feature '{}'",
                            node.id, feature.name
                        )));
                    }
                }
                _ => {
                    return Err(ModelError::ValidationFailed(format!(
                        "Node {} rule does not match kind of feature '{}'",
                        node.id, feature.name
                    )))
                }
            }
        }

        Ok(())
    }

    /// Predict the outcome for one encoded feature row
    pub fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        if features.len() != self.features.len() {
            return Err(ModelError::FeatureMismatch {
                expected: self.features.len(),
                actual: features.len(),
            });
        }
        Ok(self.tree.evaluate(features))
    }

    /// Compute model hash as hex string
    pub fn hash_hex(&self) -> Result<String, ModelError> {
        Ok(hash_canonical_hex(self)?)
    }

    /// Save model to a JSON file with canonical key order
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        fs::write(path, to_canonical_json_pretty(self)?)?;
        Ok(())
    }

    /// Load and validate a model from a JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let json = fs::read_to_string(path)?;
        let model: TreeModel = serde_json::from_str(&json)?;
        model.validate()?;
        Ok(model)
    }
}
