//! Regression tree structures
//!
//! Nodes live in a flat vector with node 0 as the root. Every node keeps
//! the mean response, row count and sum of squared errors of the rows that
//! reached it during fitting, so pruning and diagnostics can work on the
//! fitted tree without the training data.

use serde::{Deserialize, Serialize};

/// Routing rule of an internal node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitRule {
    /// Go left when the feature value is `<= threshold`
    Numeric { threshold: f64 },
    /// Go left when the level code is one of `left_levels` (kept sorted)
    Categorical { left_levels: Vec<u32> },
}

impl SplitRule {
    /// Whether a value routes to the left child
    pub fn goes_left(&self, value: f64) -> bool {
        match self {
            SplitRule::Numeric { threshold } => value <= *threshold,
            SplitRule::Categorical { left_levels } => {
                value >= 0.0 && left_levels.binary_search(&(value as u32)).is_ok()
            }
        }
    }
}

/// A regression tree node (internal or leaf)
///
/// For leaves `feature_idx == -1`, `left == right == -1` and `rule` is `None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Node ID (position in the node vector)
    pub id: i32,

    /// Left child index (-1 for leaf nodes)
    pub left: i32,

    /// Right child index (-1 for leaf nodes)
    pub right: i32,

    /// Feature index to split on (-1 for leaf nodes)
    pub feature_idx: i32,

    /// Split rule for internal nodes
    pub rule: Option<SplitRule>,

    /// Mean response of the node's training rows (the prediction at leaves)
    pub value: f64,

    /// Number of training rows that reached the node
    pub samples: usize,

    /// Sum of squared errors around `value`
    pub sse: f64,
}

impl Node {
    /// Create a new internal (split) node
    #[allow(clippy::too_many_arguments)]
    pub fn internal(
        id: i32,
        feature_idx: i32,
        rule: SplitRule,
        left: i32,
        right: i32,
        value: f64,
        samples: usize,
        sse: f64,
    ) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            rule: Some(rule),
            value,
            samples,
            sse,
        }
    }

    /// Create a new leaf node
    pub fn leaf(id: i32, value: f64, samples: usize, sse: f64) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            rule: None,
            value,
            samples,
            sse,
        }
    }

    /// Check if this node is a leaf
    pub fn is_leaf(&self) -> bool {
        self.feature_idx < 0 || self.rule.is_none()
    }
}

/// A single regression tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    /// Tree nodes (node 0 is the root)
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Predict the response for one encoded feature row.
    ///
    /// Categorical features are encoded as their level code.
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;

        loop {
            let Some(node) = self.nodes.get(idx) else {
                return f64::NAN;
            };

            let rule = match (&node.rule, node.is_leaf()) {
                (Some(rule), false) => rule,
                _ => return node.value,
            };

            let Some(&feature_value) = features.get(node.feature_idx as usize) else {
                return node.value;
            };

            idx = if rule.goes_left(feature_value) {
                node.left as usize
            } else {
                node.right as usize
            };
        }
    }

    /// Number of leaves
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Number of internal nodes
    pub fn split_count(&self) -> usize {
        self.nodes.len() - self.leaf_count()
    }

    /// Depth of the deepest leaf (a single leaf has depth 0)
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];

        while let Some((idx, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(idx) else {
                continue;
            };
            if node.is_leaf() {
                max_depth = max_depth.max(depth);
            } else {
                stack.push((node.left as usize, depth + 1));
                stack.push((node.right as usize, depth + 1));
            }
        }

        max_depth
    }

    /// Validate tree structure
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }

        let len = self.nodes.len() as i32;
        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                if !node.value.is_finite() {
                    return Err(format!("Leaf node {i} has non-finite value"));
                }
                continue;
            }

            // Children are always stored after their parent
            if node.left <= i as i32 || node.left >= len {
                return Err(format!("Node {} has invalid left child: {}", i, node.left));
            }
            if node.right <= i as i32 || node.right >= len {
                return Err(format!("Node {} has invalid right child: {}", i, node.right));
            }
            if let Some(SplitRule::Categorical { left_levels }) = &node.rule {
                if left_levels.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(format!("Node {i} has unsorted categorical levels"));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_stump() -> Tree {
        // if feature[0] <= 50 then 10 else 20
        Tree::new(vec![
            Node::internal(0, 0, SplitRule::Numeric { threshold: 50.0 }, 1, 2, 15.0, 4, 100.0),
            Node::leaf(1, 10.0, 2, 0.0),
            Node::leaf(2, 20.0, 2, 0.0),
        ])
    }

    #[test]
    fn test_node_creation() {
        let leaf = Node::leaf(1, -2.5, 3, 0.5);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.feature_idx, -1);

        let internal = Node::internal(0, 3, SplitRule::Numeric { threshold: 1.0 }, 1, 2, 0.0, 6, 1.0);
        assert!(!internal.is_leaf());
        assert_eq!(internal.feature_idx, 3);
    }

    #[test]
    fn test_numeric_evaluation() {
        let tree = numeric_stump();
        assert_eq!(tree.evaluate(&[30.0]), 10.0);
        assert_eq!(tree.evaluate(&[50.0]), 10.0); // Equal goes left
        assert_eq!(tree.evaluate(&[60.0]), 20.0);
    }

    #[test]
    fn test_categorical_evaluation() {
        let tree = Tree::new(vec![
            Node::internal(
                0,
                1,
                SplitRule::Categorical {
                    left_levels: vec![0, 2],
                },
                1,
                2,
                5.0,
                6,
                12.0,
            ),
            Node::leaf(1, 3.0, 3, 1.0),
            Node::leaf(2, 7.0, 3, 1.0),
        ]);

        assert_eq!(tree.evaluate(&[0.0, 0.0]), 3.0);
        assert_eq!(tree.evaluate(&[0.0, 2.0]), 3.0);
        assert_eq!(tree.evaluate(&[0.0, 1.0]), 7.0);
    }

    #[test]
    fn test_shape_metrics() {
        let tree = numeric_stump();
        assert_eq!(tree.leaf_count(), 2);
        assert_eq!(tree.split_count(), 1);
        assert_eq!(tree.depth(), 1);

        let single = Tree::new(vec![Node::leaf(0, 1.0, 5, 2.0)]);
        assert_eq!(single.depth(), 0);
        assert_eq!(single.split_count(), 0);
    }

    #[test]
    fn test_tree_validation() {
        assert!(numeric_stump().validate().is_ok());
        assert!(Tree::new(vec![]).validate().is_err());

        let invalid = Tree::new(vec![
            Node::internal(0, 0, SplitRule::Numeric { threshold: 1.0 }, 5, 2, 0.0, 2, 0.0),
            Node::leaf(1, 1.0, 1, 0.0),
            Node::leaf(2, 2.0, 1, 0.0),
        ]);
        assert!(invalid.validate().is_err());
    }
}
