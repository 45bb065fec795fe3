//! FILENAME: core/rollup-engine/src/value_source.rs
//! Value Source - gathers the raw inputs of one aggregate cell.
//!
//! Three strategies, picked once per cell:
//! - `Flat`: one value per visible child. Group children contribute their
//!   already-aggregated value, raw rows go through `ValueRetrieval`.
//! - `PivotLeaf`: the rows filed under the key path in a leaf group's bucket
//!   index, read through `ValueRetrieval`.
//! - `PivotIntermediate`: one already-aggregated pivot cell per visible child.
//!   Upper levels never re-descend into buckets.

use engine::CellValue;

use crate::definition::{PivotColumnDescriptor, ValueColumn};
use crate::error::RollupError;
use crate::tree::{NodeId, RowNode, RowTree};

// ============================================================================
// VALUE RETRIEVAL
// ============================================================================

/// Fetches the raw value of a column for a raw data row.
pub trait ValueRetrieval {
    fn get_value(&self, column: &ValueColumn, row: &RowNode) -> CellValue;
}

/// Reads the row's backing record at the column id.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordValueGetter;

impl ValueRetrieval for RecordValueGetter {
    fn get_value(&self, column: &ValueColumn, row: &RowNode) -> CellValue {
        row.record()
            .and_then(|record| record.get(&column.id))
            .cloned()
            .unwrap_or(CellValue::Empty)
    }
}

impl<F> ValueRetrieval for F
where
    F: Fn(&ValueColumn, &RowNode) -> CellValue,
{
    fn get_value(&self, column: &ValueColumn, row: &RowNode) -> CellValue {
        self(column, row)
    }
}

// ============================================================================
// VALUE SOURCE
// ============================================================================

/// Where the values of one aggregate cell come from.
#[derive(Debug, Clone, Copy)]
pub enum ValueSource<'a> {
    Flat {
        column: &'a ValueColumn,
    },
    PivotLeaf {
        descriptor: &'a PivotColumnDescriptor,
    },
    PivotIntermediate {
        output_col_id: &'a str,
    },
}

impl<'a> ValueSource<'a> {
    /// Flat mode for a plain value column.
    pub fn flat(column: &'a ValueColumn) -> Self {
        ValueSource::Flat { column }
    }

    /// Pivot mode: leaf groups read their buckets, everything above reads the
    /// children's cells.
    pub fn pivot(node: &RowNode, descriptor: &'a PivotColumnDescriptor) -> Self {
        if node.is_leaf_group() {
            ValueSource::PivotLeaf { descriptor }
        } else {
            ValueSource::PivotIntermediate {
                output_col_id: &descriptor.output_col_id,
            }
        }
    }

    /// Collects the ordered input values for `node`.
    /// A key path that does not resolve is reported as `MissingPivotBucket`.
    pub fn collect(
        &self,
        tree: &RowTree,
        node: NodeId,
        retrieval: &dyn ValueRetrieval,
    ) -> Result<Vec<CellValue>, RollupError> {
        match *self {
            ValueSource::Flat { column } => Ok(tree
                .children(node)
                .into_iter()
                .map(|child| {
                    // Groups only have an aggregated result; the getter is never used for them.
                    if child.is_group() {
                        child.value_at(&column.id)
                    } else {
                        retrieval.get_value(column, child)
                    }
                })
                .collect()),

            ValueSource::PivotLeaf { descriptor } => {
                let rows = tree
                    .get(node)?
                    .children_by_pivot_key
                    .as_ref()
                    .and_then(|buckets| buckets.lookup(descriptor.key_path.as_slice()))
                    .ok_or_else(|| RollupError::MissingPivotBucket {
                        node,
                        key_path: descriptor.key_path_label(),
                    })?;

                Ok(rows
                    .iter()
                    .filter_map(|row| tree.get(*row).ok())
                    .map(|row| retrieval.get_value(&descriptor.source_value_column, row))
                    .collect())
            }

            ValueSource::PivotIntermediate { output_col_id } => Ok(tree
                .children(node)
                .into_iter()
                .map(|child| child.value_at(output_col_id))
                .collect()),
        }
    }
}

/// Gathers the values of one cell: `descriptor` selects pivot mode.
pub fn values_for(
    tree: &RowTree,
    node: NodeId,
    column: &ValueColumn,
    descriptor: Option<&PivotColumnDescriptor>,
    retrieval: &dyn ValueRetrieval,
) -> Result<Vec<CellValue>, RollupError> {
    let source = match descriptor {
        Some(descriptor) => ValueSource::pivot(tree.get(node)?, descriptor),
        None => ValueSource::flat(column),
    };
    source.collect(tree, node, retrieval)
}
