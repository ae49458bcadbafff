//! CART (Classification and Regression Tree) builder
//!
//! Grows a regression tree by exact greedy search over binary splits that
//! minimise the summed squared error of the children, then applies
//! cost-complexity pruning. Rows may repeat (bootstrap analysis sets); each
//! occurrence counts as one observation.

use std::collections::BTreeMap;
use survey_tree_core::{FeatureInfo, FeatureKind, Node, SplitRule, Tree};

use crate::deterministic::SplitTieBreaker;
use crate::errors::FitError;
use crate::grid::HyperParams;

/// Training parameters for a single tree
#[derive(Clone, Debug, PartialEq)]
pub struct TreeConfig {
    pub max_depth: usize,
    /// Minimum rows in a node for a split to be attempted
    pub min_split: usize,
    /// Minimum rows in each child of a split
    pub min_leaf: usize,
    /// Relative complexity parameter; the pruning penalty per leaf is
    /// `cost_complexity * SSE(root)`
    pub cost_complexity: f64,
}

impl TreeConfig {
    /// Map tuned hyperparameters onto tree limits.
    ///
    /// `min_leaf` follows the usual `round(min_split / 3)` convention.
    pub fn from_params(params: &HyperParams, max_depth: usize) -> Self {
        Self {
            max_depth,
            min_split: params.min_n.max(2),
            min_leaf: ((params.min_n as f64) / 3.0).round().max(1.0) as usize,
            cost_complexity: params.cost_complexity.max(0.0),
        }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 30,
            min_split: 20,
            min_leaf: 7,
            cost_complexity: 0.01,
        }
    }
}

/// Running sums for one node
#[derive(Clone, Copy, Debug, Default)]
struct NodeStats {
    count: usize,
    sum: f64,
    sum_sq: f64,
}

impl NodeStats {
    fn push(&mut self, y: f64) {
        self.count += 1;
        self.sum += y;
        self.sum_sq += y * y;
    }

    fn minus(&self, other: &Self) -> Self {
        Self {
            count: self.count - other.count,
            sum: self.sum - other.sum,
            sum_sq: self.sum_sq - other.sum_sq,
        }
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    fn sse(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.sum_sq - self.sum * self.sum / self.count as f64).max(0.0)
    }
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    rule: SplitRule,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

/// Node of the unpruned tree
#[derive(Debug, Clone)]
struct GrowNode {
    value: f64,
    samples: usize,
    sse: f64,
    split: Option<(usize, SplitRule, usize, usize)>,
}

/// Build a regression tree using exact-greedy CART
pub struct CartBuilder<'a> {
    config: TreeConfig,
    features: &'a [Vec<f64>],
    targets: &'a [f64],
    categorical: Vec<bool>,
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        features: &'a [Vec<f64>],
        targets: &'a [f64],
        layout: &[FeatureInfo],
        config: TreeConfig,
    ) -> Self {
        debug_assert_eq!(features.len(), targets.len());

        let categorical = layout
            .iter()
            .map(|f| matches!(f.kind, FeatureKind::Categorical { .. }))
            .collect();

        Self {
            config,
            features,
            targets,
            categorical,
        }
    }

    /// Grow and prune a tree on `rows`
    pub fn build(&self, rows: &[usize]) -> Result<Tree, FitError> {
        if rows.is_empty() {
            return Err(FitError::EmptyNode);
        }
        if let Some(&row) = rows.iter().find(|&&r| !self.targets[r].is_finite()) {
            return Err(FitError::NonFiniteOutcome { row });
        }

        let mut grown = Vec::new();
        self.grow(rows, 0, &mut grown);

        let alpha = self.config.cost_complexity * grown[0].sse;
        let mut collapsed = vec![false; grown.len()];
        prune(&grown, 0, alpha, &mut collapsed);

        let mut nodes = Vec::new();
        emit(&grown, &collapsed, 0, &mut nodes);
        Ok(Tree::new(nodes))
    }

    /// Recursively grow nodes in preorder, returning the node's index
    fn grow(&self, rows: &[usize], depth: usize, nodes: &mut Vec<GrowNode>) -> usize {
        let current_idx = nodes.len();
        let stats = self.stats(rows);
        let value = stats.mean();
        let sse = rows
            .iter()
            .map(|&r| (self.targets[r] - value).powi(2))
            .sum::<f64>();

        nodes.push(GrowNode {
            value,
            samples: rows.len(),
            sse,
            split: None,
        });

        // Check stopping conditions
        if depth >= self.config.max_depth
            || rows.len() < self.config.min_split
            || sse <= f64::EPSILON * stats.sum_sq
        {
            return current_idx;
        }

        let Some(split) = self.find_best_split(rows, &stats) else {
            return current_idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| split.rule.goes_left(self.features[r][split.feature_idx]));

        let left = self.grow(&left_rows, depth + 1, nodes);
        let right = self.grow(&right_rows, depth + 1, nodes);
        nodes[current_idx].split = Some((split.feature_idx, split.rule, left, right));

        current_idx
    }

    fn stats(&self, rows: &[usize]) -> NodeStats {
        let mut stats = NodeStats::default();
        for &r in rows {
            stats.push(self.targets[r]);
        }
        stats
    }

    /// Find the best split across all features
    fn find_best_split(&self, rows: &[usize], parent: &NodeStats) -> Option<SplitCandidate> {
        let parent_sse = parent.sse();
        let min_gain = parent_sse * 1e-12;
        let mut best: Option<SplitCandidate> = None;

        for feature_idx in 0..self.categorical.len() {
            let candidate = if self.categorical[feature_idx] {
                self.best_categorical_split(rows, feature_idx, parent)
            } else {
                self.best_numeric_split(rows, feature_idx, parent)
            };

            let Some(candidate) = candidate else {
                continue;
            };
            if candidate.gain <= min_gain {
                continue;
            }

            best = match best {
                None => Some(candidate),
                Some(current) => {
                    // Deterministic tie-breaking
                    if candidate.gain > current.gain
                        || (candidate.gain == current.gain
                            && candidate.tie_breaker < current.tie_breaker)
                    {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            };
        }

        best
    }

    /// Sweep sorted values; thresholds sit halfway between distinct neighbours
    fn best_numeric_split(
        &self,
        rows: &[usize],
        feature_idx: usize,
        parent: &NodeStats,
    ) -> Option<SplitCandidate> {
        let mut pairs: Vec<(f64, f64)> = rows
            .iter()
            .map(|&r| (self.features[r][feature_idx], self.targets[r]))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let parent_sse = parent.sse();
        let mut left = NodeStats::default();
        let mut best: Option<SplitCandidate> = None;

        for i in 0..pairs.len().saturating_sub(1) {
            left.push(pairs[i].1);
            if pairs[i].0 == pairs[i + 1].0 {
                continue;
            }

            let right = parent.minus(&left);
            if left.count < self.config.min_leaf || right.count < self.config.min_leaf {
                continue;
            }

            let gain = parent_sse - left.sse() - right.sse();
            if best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature_idx,
                    rule: SplitRule::Numeric {
                        threshold: (pairs[i].0 + pairs[i + 1].0) / 2.0,
                    },
                    gain,
                    tie_breaker: SplitTieBreaker::new(feature_idx, i),
                });
            }
        }

        best
    }

    /// Order levels by mean response, then sweep that order
    fn best_categorical_split(
        &self,
        rows: &[usize],
        feature_idx: usize,
        parent: &NodeStats,
    ) -> Option<SplitCandidate> {
        let mut groups: BTreeMap<u32, NodeStats> = BTreeMap::new();
        for &r in rows {
            let code = self.features[r][feature_idx] as u32;
            groups.entry(code).or_default().push(self.targets[r]);
        }
        if groups.len() < 2 {
            return None;
        }

        let mut ordered: Vec<(u32, NodeStats)> = groups.into_iter().collect();
        ordered.sort_by(|a, b| a.1.mean().total_cmp(&b.1.mean()).then(a.0.cmp(&b.0)));

        let parent_sse = parent.sse();
        let mut left = NodeStats::default();
        let mut best: Option<(usize, f64)> = None;

        for (k, (_, stats)) in ordered.iter().enumerate().take(ordered.len() - 1) {
            left.count += stats.count;
            left.sum += stats.sum;
            left.sum_sq += stats.sum_sq;

            let right = parent.minus(&left);
            if left.count < self.config.min_leaf || right.count < self.config.min_leaf {
                continue;
            }

            let gain = parent_sse - left.sse() - right.sse();
            if best.map_or(true, |(_, g)| gain > g) {
                best = Some((k, gain));
            }
        }

        best.map(|(k, gain)| {
            let mut left_levels: Vec<u32> = ordered[..=k].iter().map(|(code, _)| *code).collect();
            left_levels.sort_unstable();
            SplitCandidate {
                feature_idx,
                rule: SplitRule::Categorical { left_levels },
                gain,
                tie_breaker: SplitTieBreaker::new(feature_idx, k),
            }
        })
    }
}

/// Minimal cost-complexity subtree: collapse a node when
/// `R(t) + alpha <= sum over its pruned subtree of (R(leaf) + alpha)`.
/// Returns the pruned subtree's cost.
fn prune(nodes: &[GrowNode], idx: usize, alpha: f64, collapsed: &mut [bool]) -> f64 {
    let node = &nodes[idx];
    let as_leaf = node.sse + alpha;

    match &node.split {
        None => as_leaf,
        Some((_, _, left, right)) => {
            let subtree = prune(nodes, *left, alpha, collapsed) + prune(nodes, *right, alpha, collapsed);
            if as_leaf <= subtree {
                collapsed[idx] = true;
                as_leaf
            } else {
                subtree
            }
        }
    }
}

/// Write the pruned tree in preorder so children follow their parent
fn emit(grown: &[GrowNode], collapsed: &[bool], idx: usize, out: &mut Vec<Node>) -> i32 {
    let id = out.len() as i32;
    let node = &grown[idx];

    match (&node.split, collapsed[idx]) {
        (Some((feature_idx, rule, left, right)), false) => {
            out.push(Node::internal(
                id,
                *feature_idx as i32,
                rule.clone(),
                -1,
                -1,
                node.value,
                node.samples,
                node.sse,
            ));
            let left_id = emit(grown, collapsed, *left, out);
            let right_id = emit(grown, collapsed, *right, out);
            out[id as usize].left = left_id;
            out[id as usize].right = right_id;
        }
        _ => out.push(Node::leaf(id, node.value, node.samples, node.sse)),
    }

    id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_layout(n: usize) -> Vec<FeatureInfo> {
        (0..n)
            .map(|i| FeatureInfo {
                name: format!("x{i}"),
                kind: FeatureKind::Numeric,
            })
            .collect()
    }

    fn config(min_split: usize, min_leaf: usize, cost_complexity: f64) -> TreeConfig {
        TreeConfig {
            max_depth: 10,
            min_split,
            min_leaf,
            cost_complexity,
        }
    }

    #[test]
    fn test_step_function() {
        let features: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64]).collect();
        let targets = vec![1.0, 1.0, 1.0, 1.0, 9.0, 9.0, 9.0, 9.0];
        let layout = numeric_layout(1);
        let rows: Vec<usize> = (0..8).collect();

        let tree = CartBuilder::new(&features, &targets, &layout, config(2, 1, 0.0))
            .build(&rows)
            .unwrap();

        assert_eq!(tree.split_count(), 1);
        assert_eq!(tree.nodes[0].rule, Some(SplitRule::Numeric { threshold: 3.5 }));
        assert_eq!(tree.evaluate(&[2.0]), 1.0);
        assert_eq!(tree.evaluate(&[6.0]), 9.0);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_categorical_split_groups_levels() {
        // levels 0 and 2 are low, level 1 is high
        let codes = [0.0, 1.0, 2.0, 0.0, 1.0, 2.0];
        let features: Vec<Vec<f64>> = codes.iter().map(|&c| vec![c]).collect();
        let targets = vec![2.0, 10.0, 3.0, 2.0, 10.0, 3.0];
        let layout = vec![FeatureInfo {
            name: "store_type".to_string(),
            kind: FeatureKind::Categorical {
                levels: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            },
        }];
        let rows: Vec<usize> = (0..6).collect();

        let tree = CartBuilder::new(&features, &targets, &layout, config(2, 1, 0.0))
            .build(&rows)
            .unwrap();

        assert_eq!(
            tree.nodes[0].rule,
            Some(SplitRule::Categorical {
                left_levels: vec![0, 2]
            })
        );
        assert_eq!(tree.evaluate(&[1.0]), 10.0);
    }

    #[test]
    fn test_min_split_stops_growth() {
        let features: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let layout = numeric_layout(1);
        let rows: Vec<usize> = (0..8).collect();

        let tree = CartBuilder::new(&features, &targets, &layout, config(9, 1, 0.0))
            .build(&rows)
            .unwrap();
        assert_eq!(tree.nodes.len(), 1);
    }

    #[test]
    fn test_min_leaf_respected() {
        let features: Vec<Vec<f64>> = (0..9).map(|i| vec![i as f64]).collect();
        let targets = vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 50.0];
        let layout = numeric_layout(1);
        let rows: Vec<usize> = (0..9).collect();

        let tree = CartBuilder::new(&features, &targets, &layout, config(2, 3, 0.0))
            .build(&rows)
            .unwrap();
        for node in tree.nodes.iter().filter(|n| n.is_leaf()) {
            assert!(node.samples >= 3);
        }
    }

    #[test]
    fn test_pruning_removes_weak_splits() {
        let features: Vec<Vec<f64>> = (0..16).map(|i| vec![i as f64]).collect();
        // strong step at 8 plus a weak wiggle
        let targets: Vec<f64> = (0..16)
            .map(|i| if i < 8 { 0.0 } else { 100.0 } + (i % 2) as f64)
            .collect();
        let layout = numeric_layout(1);
        let rows: Vec<usize> = (0..16).collect();

        let full = CartBuilder::new(&features, &targets, &layout, config(2, 1, 0.0))
            .build(&rows)
            .unwrap();
        let pruned = CartBuilder::new(&features, &targets, &layout, config(2, 1, 0.01))
            .build(&rows)
            .unwrap();

        assert!(full.leaf_count() > 2);
        assert_eq!(pruned.leaf_count(), 2);
        assert!(pruned.validate().is_ok());
    }

    #[test]
    fn test_bootstrap_duplicates_count() {
        let features: Vec<Vec<f64>> = (0..4).map(|i| vec![i as f64]).collect();
        let targets = vec![0.0, 0.0, 10.0, 10.0];
        let layout = numeric_layout(1);

        let tree = CartBuilder::new(&features, &targets, &layout, config(2, 1, 0.0))
            .build(&[0, 0, 0, 3])
            .unwrap();
        assert_eq!(tree.nodes[0].samples, 4);
        assert_eq!(tree.evaluate(&[0.0]), 0.0);
        assert_eq!(tree.evaluate(&[3.0]), 10.0);
    }

    #[test]
    fn test_empty_rows_fail() {
        let features: Vec<Vec<f64>> = vec![vec![1.0]];
        let targets = vec![1.0];
        let layout = numeric_layout(1);

        let err = CartBuilder::new(&features, &targets, &layout, TreeConfig::default())
            .build(&[])
            .unwrap_err();
        assert_eq!(err, FitError::EmptyNode);
    }

    #[test]
    fn test_from_params_min_leaf() {
        let cfg = TreeConfig::from_params(
            &HyperParams {
                cost_complexity: 0.01,
                min_n: 40,
            },
            30,
        );
        assert_eq!(cfg.min_split, 40);
        assert_eq!(cfg.min_leaf, 13);
    }
}
