//! Final fit on the whole training subset, plus hold-out scoring

use serde::{Deserialize, Serialize};
use survey_tree_core::TreeModel;
use tracing::{info, warn};

use crate::dataset::Dataset;
use crate::errors::TuningError;
use crate::grid::HyperParams;
use crate::learner::TreeLearner;
use crate::metrics::{mae, rmse, rsq};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FeatureImportance {
    pub feature: String,
    /// Share of the total SSE reduction attributed to this feature
    pub importance: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FitDiagnostics {
    pub rmse: f64,
    pub mae: f64,
    pub rsq: Option<f64>,
    pub leaves: usize,
    pub depth: usize,
    pub nodes: usize,
    /// Sorted by importance, descending
    pub importances: Vec<FeatureImportance>,
    pub model_hash: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FinalFit {
    pub params: HyperParams,
    pub model: TreeModel,
    pub diagnostics: FitDiagnostics,
}

/// Metrics of the final model on the untouched test subset
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HoldoutMetrics {
    pub n: usize,
    pub rmse: f64,
    pub mae: f64,
    pub rsq: Option<f64>,
}

/// Refit `params` on every training row.
///
/// A tree pruned back to its root is a valid final model: it predicts the
/// training mean for every record.
pub fn finalize<L>(learner: &L, train: &Dataset, params: &HyperParams) -> Result<FinalFit, TuningError>
where
    L: TreeLearner<Model = TreeModel>,
{
    let rows: Vec<usize> = (0..train.len()).collect();
    let model = learner.fit(train, &rows, params)?;

    if learner.split_count(&model) == 0 {
        warn!(
            "Final fit ({}) has no splits after pruning; predicting the training mean",
            params
        );
    }

    let fitted = learner.predict(&model, train, &rows)?;
    let diagnostics = FitDiagnostics {
        rmse: rmse(&train.targets, &fitted),
        mae: mae(&train.targets, &fitted),
        rsq: rsq(&train.targets, &fitted),
        leaves: model.tree.leaf_count(),
        depth: model.tree.depth(),
        nodes: model.tree.nodes.len(),
        importances: importances(&model),
        model_hash: model.hash_hex()?,
    };

    info!(
        "Final fit ({}): {} leaves, depth {}, in-sample rmse {:.4}",
        params, diagnostics.leaves, diagnostics.depth, diagnostics.rmse
    );

    Ok(FinalFit {
        params: *params,
        model,
        diagnostics,
    })
}

/// Total SSE reduction per feature, normalised to sum to 1
fn importances(model: &TreeModel) -> Vec<FeatureImportance> {
    let nodes = &model.tree.nodes;
    let mut gains = vec![0.0; model.features.len()];

    for node in nodes.iter().filter(|n| !n.is_leaf()) {
        let left = &nodes[node.left as usize];
        let right = &nodes[node.right as usize];
        gains[node.feature_idx as usize] += (node.sse - left.sse - right.sse).max(0.0);
    }

    let total: f64 = gains.iter().sum();
    let mut result: Vec<FeatureImportance> = model
        .features
        .iter()
        .zip(gains)
        .map(|(info, gain)| FeatureImportance {
            feature: info.name.clone(),
            importance: if total > 0.0 { gain / total } else { 0.0 },
        })
        .collect();

    result.sort_by(|a, b| {
        b.importance
            .total_cmp(&a.importance)
            .then_with(|| a.feature.cmp(&b.feature))
    });
    result
}

/// Score the final model on the test subset
pub fn evaluate_holdout<L>(
    learner: &L,
    model: &TreeModel,
    test: &Dataset,
) -> Result<HoldoutMetrics, TuningError>
where
    L: TreeLearner<Model = TreeModel>,
{
    if test.is_empty() {
        return Err(TuningError::Dataset("test subset is empty".to_string()));
    }

    let rows: Vec<usize> = (0..test.len()).collect();
    let estimate = learner.predict(model, test, &rows)?;

    Ok(HoldoutMetrics {
        n: test.len(),
        rmse: rmse(&test.targets, &estimate),
        mae: mae(&test.targets, &estimate),
        rsq: rsq(&test.targets, &estimate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learner::CartLearner;
    use crate::dataset::{ColumnSpec, MissingPolicy, Value};
    use crate::deterministic::LcgRng;
    use crate::test_support::survey_dataset;

    /// Outcome is uniform noise, unrelated to either predictor
    fn noise_dataset(rows: usize, seed: u64) -> Dataset {
        let mut rng = LcgRng::new(seed);
        let schema = vec![
            ColumnSpec::numeric("y"),
            ColumnSpec::numeric("x"),
            ColumnSpec::categorical("region"),
        ];
        let values = (0..rows)
            .map(|i| {
                vec![
                    Value::Numeric(rng.next_range(1000) as f64 / 10.0),
                    Value::Numeric((i % 7) as f64),
                    Value::Categorical(["north", "south"][i % 2].to_string()),
                ]
            })
            .collect();
        Dataset::from_rows(
            schema,
            values,
            "y",
            &["x".to_string(), "region".to_string()],
            MissingPolicy::Reject,
        )
        .unwrap()
    }

    fn params() -> HyperParams {
        HyperParams {
            cost_complexity: 0.001,
            min_n: 6,
        }
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let train = survey_dataset(60);
        let learner = CartLearner::default();

        let a = finalize(&learner, &train, &params()).unwrap();
        let b = finalize(&learner, &train, &params()).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.diagnostics.model_hash, a.model.hash_hex().unwrap());
    }

    #[test]
    fn test_diagnostics() {
        let train = survey_dataset(60);
        let fit = finalize(&CartLearner::default(), &train, &params()).unwrap();
        let d = &fit.diagnostics;

        assert!(d.leaves >= 2);
        assert_eq!(d.nodes, 2 * d.leaves - 1);
        assert!(d.depth >= 1);
        assert!(d.rmse >= 0.0 && d.mae <= d.rmse + 1e-12);

        let total: f64 = d.importances.iter().map(|i| i.importance).sum();
        assert!((total - 1.0).abs() < 1e-9);
        for pair in d.importances.windows(2) {
            assert!(pair[0].importance >= pair[1].importance);
        }
        // spend is driven by household size and store type
        assert!(["household_size", "store_type"].contains(&d.importances[0].feature.as_str()));
    }

    #[test]
    fn test_finalize_accepts_root_only_tree() {
        let train = noise_dataset(60, 17);
        let learner = CartLearner::default();
        let fit = finalize(
            &learner,
            &train,
            &HyperParams {
                cost_complexity: 5.0,
                min_n: 2,
            },
        )
        .unwrap();

        let d = &fit.diagnostics;
        assert_eq!(d.leaves, 1);
        assert_eq!(d.nodes, 1);
        assert_eq!(d.depth, 0);
        assert!(d.importances.iter().all(|i| i.importance == 0.0));

        let mean = train.targets.iter().sum::<f64>() / train.len() as f64;
        assert!((fit.model.tree.nodes[0].value - mean).abs() < 1e-9);

        let test = noise_dataset(20, 18);
        let holdout = evaluate_holdout(&learner, &fit.model, &test).unwrap();
        assert_eq!(holdout.n, 20);
        assert!(holdout.rmse.is_finite());
    }

    #[test]
    fn test_holdout() {
        let data = survey_dataset(80);
        let train = data.subset(&(0..60).collect::<Vec<_>>());
        let test = data.subset(&(60..80).collect::<Vec<_>>());
        let learner = CartLearner::default();

        let fit = finalize(&learner, &train, &params()).unwrap();
        let holdout = evaluate_holdout(&learner, &fit.model, &test).unwrap();
        assert_eq!(holdout.n, 20);
        assert!(holdout.rmse.is_finite());
        assert!(holdout.mae <= holdout.rmse + 1e-12);
    }
}
