//! FILENAME: core/rollup-engine/src/error.rs

use thiserror::Error;

use crate::tree::NodeId;

#[derive(Error, Debug)]
pub enum RollupError {
    #[error("unrecognised aggregation function: {0}")]
    UnknownAggregateFunction(String),

    #[error("no pivot bucket for key path [{key_path}] under node {node}")]
    MissingPivotBucket { node: NodeId, key_path: String },

    #[error("Node not found: {0}")]
    UnknownNode(NodeId),

    #[error("Invalid rollup definition: {0}")]
    InvalidDefinition(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RollupError {
    /// Errors that degrade a single cell to "no value" instead of failing a run.
    pub fn is_cell_local(&self) -> bool {
        matches!(
            self,
            RollupError::UnknownAggregateFunction(_) | RollupError::MissingPivotBucket { .. }
        )
    }
}
