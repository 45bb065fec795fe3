//! FILENAME: core/rollup-engine/src/lib.rs
//! Group rollup subsystem.
//!
//! This crate computes per-group summary values over a grouped row tree,
//! bottom-up, optionally cross-tabulated against a pivot dimension, and writes
//! the results back onto each group (and its footer). It depends on `engine`
//! only for shared types (CellValue, RowRecord).
//!
//! Layers:
//! - `definition`: Serializable configuration (WHAT gets aggregated)
//! - `tree`: The grouped row hierarchy the results are written into
//! - `registry`: Named aggregate functions
//! - `value_source`: Where each cell's input values come from
//! - `aggregator`: Aggregation of a single group
//! - `stage`: Post-order traversal of a whole tree (HOW we calculate)

pub mod logging;
pub mod error;
pub mod definition;
pub mod tree;
pub mod registry;
pub mod value_source;
pub mod aggregator;
pub mod stage;

pub use error::RollupError;
pub use definition::*;
pub use tree::*;
pub use registry::AggFunctionRegistry;
pub use value_source::{values_for, RecordValueGetter, ValueRetrieval, ValueSource};
pub use aggregator::{AggregationPlan, GroupAggOverride, RowAggregator};
pub use stage::{aggregate_tree, AggregationReport, AggregationStage, GroupingState};
