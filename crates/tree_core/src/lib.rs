//! Survey Tree Core
//!
//! Regression tree representation shared by the tuning pipeline:
//! array-backed nodes, traversal over encoded feature rows, and
//! canonical JSON / BLAKE3 hashing of fitted models.

pub mod errors;
pub mod model;
pub mod serde_canon;
pub mod tree;

pub use errors::ModelError;
pub use model::{FeatureInfo, FeatureKind, TreeModel};
pub use serde_canon::{hash_canonical_hex, to_canonical_json_pretty};
pub use tree::{Node, SplitRule, Tree};
