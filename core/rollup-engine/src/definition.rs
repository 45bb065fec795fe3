//! FILENAME: core/rollup-engine/src/definition.rs
//! Rollup Definition - The serializable configuration.
//!
//! This module contains all the types needed to DESCRIBE an aggregation run:
//! which columns are summarised, with which functions, and which pivot cells
//! exist. These structures are designed to be:
//! - Serializable (for saving/loading alongside a grid layout)
//! - Immutable snapshots of user intent
//!
//! Function values and the per-group override cannot be serialized; they are
//! attached at runtime.

use std::fmt;
use std::sync::Arc;

use engine::CellValue;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::aggregator::GroupAggOverride;
use crate::error::RollupError;
use crate::stage::GroupingState;

// ============================================================================
// AGGREGATE FUNCTIONS
// ============================================================================

/// A reducer over an ordered sequence of values.
/// Returns `CellValue::Empty` when there is nothing to report.
#[derive(Clone)]
pub struct AggFn(Arc<dyn Fn(&[CellValue]) -> CellValue + Send + Sync>);

impl AggFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[CellValue]) -> CellValue + Send + Sync + 'static,
    {
        AggFn(Arc::new(f))
    }

    pub fn call(&self, values: &[CellValue]) -> CellValue {
        (self.0)(values)
    }
}

impl fmt::Debug for AggFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AggFn(..)")
    }
}

/// How a value column names its aggregate function.
/// In JSON a named function is a bare string, e.g. `"agg_func": "max"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggFuncRef {
    /// Looked up in the registry by name (case-sensitive).
    Named(String),
    /// Supplied directly; never goes through the registry.
    #[serde(skip)]
    Custom(AggFn),
}

impl AggFuncRef {
    pub fn named(name: &str) -> Self {
        AggFuncRef::Named(name.to_string())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[CellValue]) -> CellValue + Send + Sync + 'static,
    {
        AggFuncRef::Custom(AggFn::new(f))
    }
}

impl Default for AggFuncRef {
    fn default() -> Self {
        AggFuncRef::Named("sum".to_string())
    }
}

impl fmt::Display for AggFuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggFuncRef::Named(name) => f.write_str(name),
            AggFuncRef::Custom(_) => f.write_str("<custom>"),
        }
    }
}

// ============================================================================
// COLUMN DEFINITIONS
// ============================================================================

/// A column participating in aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueColumn {
    /// Column id; also the output key in flat mode.
    pub id: String,

    /// The aggregate function to apply.
    #[serde(default)]
    pub agg_func: AggFuncRef,
}

impl ValueColumn {
    pub fn new(id: &str, agg_func: AggFuncRef) -> Self {
        ValueColumn {
            id: id.to_string(),
            agg_func,
        }
    }

    /// Shorthand for a column aggregated by a registry name.
    pub fn named(id: &str, agg_func: &str) -> Self {
        ValueColumn::new(id, AggFuncRef::named(agg_func))
    }
}

/// Pivot key values identifying one cell, outer dimension first.
pub type KeyPath = SmallVec<[String; 4]>;

/// One cross-tabulated output cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotColumnDescriptor {
    /// Output key written into each group's data.
    pub output_col_id: String,

    /// Bucket path inside a leaf group's pivot index.
    pub key_path: KeyPath,

    /// The value column summarised into this cell.
    pub source_value_column: ValueColumn,
}

impl PivotColumnDescriptor {
    pub fn new(output_col_id: &str, key_path: &[&str], source_value_column: ValueColumn) -> Self {
        PivotColumnDescriptor {
            output_col_id: output_col_id.to_string(),
            key_path: key_path.iter().map(|k| k.to_string()).collect(),
            source_value_column,
        }
    }

    /// Key path rendered for diagnostics, e.g. `2024/Q1`.
    pub fn key_path_label(&self) -> String {
        self.key_path.join("/")
    }
}

// ============================================================================
// MAIN DEFINITION STRUCT
// ============================================================================

/// The complete definition of what the aggregation stage computes.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct RollupDefinition {
    /// Columns summarised per group (ordered).
    #[serde(default)]
    pub value_columns: Vec<ValueColumn>,

    /// Pivot cells; empty when no pivot dimension is active.
    #[serde(default)]
    pub pivot_columns: Vec<PivotColumnDescriptor>,

    /// Groups were supplied pre-formed by the caller; skip aggregation.
    #[serde(default)]
    pub externally_grouped: bool,

    /// Version for cache invalidation.
    #[serde(default)]
    pub version: u64,

    /// Per-group override replacing column-by-column aggregation.
    #[serde(skip)]
    pub group_agg_override: Option<Arc<dyn GroupAggOverride>>,
}

impl fmt::Debug for RollupDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollupDefinition")
            .field("value_columns", &self.value_columns)
            .field("pivot_columns", &self.pivot_columns)
            .field("externally_grouped", &self.externally_grouped)
            .field("version", &self.version)
            .field("group_agg_override", &self.group_agg_override.is_some())
            .finish()
    }
}

impl RollupDefinition {
    pub fn new(value_columns: Vec<ValueColumn>) -> Self {
        RollupDefinition {
            value_columns,
            ..Default::default()
        }
    }

    /// Parses and validates a definition from JSON.
    pub fn from_json(json: &str) -> Result<Self, RollupError> {
        let definition: RollupDefinition = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn to_json(&self) -> Result<String, RollupError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_pivot_columns(mut self, pivot_columns: Vec<PivotColumnDescriptor>) -> Self {
        self.pivot_columns = pivot_columns;
        self
    }

    pub fn with_override(mut self, group_agg_override: Arc<dyn GroupAggOverride>) -> Self {
        self.group_agg_override = Some(group_agg_override);
        self
    }

    /// Increments the version (for cache invalidation).
    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Rejects empty ids and ids that would collide in a group's data.
    pub fn validate(&self) -> Result<(), RollupError> {
        let mut seen = rustc_hash::FxHashSet::default();
        for column in &self.value_columns {
            if column.id.is_empty() {
                return Err(RollupError::InvalidDefinition("value column with empty id".to_string()));
            }
            if !seen.insert(column.id.as_str()) {
                return Err(RollupError::InvalidDefinition(format!(
                    "duplicate value column id '{}'",
                    column.id
                )));
            }
        }

        let mut seen = rustc_hash::FxHashSet::default();
        for descriptor in &self.pivot_columns {
            if descriptor.output_col_id.is_empty() {
                return Err(RollupError::InvalidDefinition("pivot column with empty output id".to_string()));
            }
            if !seen.insert(descriptor.output_col_id.as_str()) {
                return Err(RollupError::InvalidDefinition(format!(
                    "duplicate pivot output id '{}'",
                    descriptor.output_col_id
                )));
            }
        }
        Ok(())
    }
}

impl GroupingState for RollupDefinition {
    fn is_externally_grouped(&self) -> bool {
        self.externally_grouped
    }

    fn value_columns(&self) -> &[ValueColumn] {
        &self.value_columns
    }

    fn pivot_column_descriptors(&self) -> &[PivotColumnDescriptor] {
        &self.pivot_columns
    }

    fn group_agg_override(&self) -> Option<&dyn GroupAggOverride> {
        self.group_agg_override.as_deref()
    }
}
