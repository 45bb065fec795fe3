//! FILENAME: core/rollup-engine/src/aggregator.rs
//! Row Aggregator - computes the result object of a single group node.
//!
//! Resolution order (first match wins):
//! 1. A caller-supplied override receives the visible children and its result
//!    is used verbatim.
//! 2. No value columns: the node gets no data at all.
//! 3. No pivot columns: one entry per value column.
//! 4. Otherwise: one entry per pivot column descriptor.
//!
//! Unknown function names and missing pivot buckets only degrade the affected
//! cell to `Empty`; they are logged and handed back as diagnostics.

use engine::CellValue;

use crate::definition::{AggFuncRef, PivotColumnDescriptor, ValueColumn};
use crate::error::RollupError;
use crate::logging::AGG;
use crate::registry::AggFunctionRegistry;
use crate::stage::GroupingState;
use crate::tree::{AggResult, NodeId, RowNode, RowTree};
use crate::value_source::{ValueRetrieval, ValueSource};
use crate::{log_debug, log_warn};

// ============================================================================
// OVERRIDE STRATEGY
// ============================================================================

/// Replaces per-column aggregation for every group with a caller function.
pub trait GroupAggOverride {
    fn aggregate(&self, children: &[&RowNode]) -> AggResult;
}

impl<F> GroupAggOverride for F
where
    F: Fn(&[&RowNode]) -> AggResult,
{
    fn aggregate(&self, children: &[&RowNode]) -> AggResult {
        self(children)
    }
}

// ============================================================================
// PLAN
// ============================================================================

/// The per-run inputs, captured once from the grouping state.
#[derive(Clone, Copy)]
pub struct AggregationPlan<'a> {
    pub value_columns: &'a [ValueColumn],
    pub pivot_columns: &'a [PivotColumnDescriptor],
    pub group_agg_override: Option<&'a dyn GroupAggOverride>,
}

impl<'a> AggregationPlan<'a> {
    pub fn new(value_columns: &'a [ValueColumn], pivot_columns: &'a [PivotColumnDescriptor]) -> Self {
        AggregationPlan {
            value_columns,
            pivot_columns,
            group_agg_override: None,
        }
    }

    pub fn from_state(state: &'a dyn GroupingState) -> Self {
        AggregationPlan {
            value_columns: state.value_columns(),
            pivot_columns: state.pivot_column_descriptors(),
            group_agg_override: state.group_agg_override(),
        }
    }

    pub fn with_override(mut self, group_agg_override: &'a dyn GroupAggOverride) -> Self {
        self.group_agg_override = Some(group_agg_override);
        self
    }
}

// ============================================================================
// ROW AGGREGATOR
// ============================================================================

pub struct RowAggregator<'a> {
    registry: &'a AggFunctionRegistry,
    retrieval: &'a dyn ValueRetrieval,
}

impl<'a> RowAggregator<'a> {
    pub fn new(registry: &'a AggFunctionRegistry, retrieval: &'a dyn ValueRetrieval) -> Self {
        RowAggregator { registry, retrieval }
    }

    /// Computes and stores the result of `node`, sharing it with the node's
    /// footer if there is one.
    pub fn aggregate(
        &self,
        tree: &mut RowTree,
        node: NodeId,
        plan: &AggregationPlan<'_>,
        diagnostics: &mut Vec<RollupError>,
    ) -> Result<(), RollupError> {
        let result = self.compute(tree, node, plan, diagnostics)?;
        tree.assign_data(node, result)
    }

    /// Computes the result of `node` without storing it.
    pub fn compute(
        &self,
        tree: &RowTree,
        node: NodeId,
        plan: &AggregationPlan<'_>,
        diagnostics: &mut Vec<RollupError>,
    ) -> Result<Option<AggResult>, RollupError> {
        tree.get(node)?;

        if let Some(group_agg_override) = plan.group_agg_override {
            let children = tree.children(node);
            return Ok(Some(group_agg_override.aggregate(&children)));
        }
        if plan.value_columns.is_empty() {
            return Ok(None);
        }
        if plan.pivot_columns.is_empty() {
            return self.aggregate_values_only(tree, node, plan.value_columns, diagnostics).map(Some);
        }
        self.aggregate_values_and_pivot(tree, node, plan.pivot_columns, diagnostics).map(Some)
    }

    fn aggregate_values_only(
        &self,
        tree: &RowTree,
        node: NodeId,
        value_columns: &[ValueColumn],
        diagnostics: &mut Vec<RollupError>,
    ) -> Result<AggResult, RollupError> {
        let mut result = AggResult::new();
        for column in value_columns {
            let values = ValueSource::flat(column).collect(tree, node, self.retrieval)?;
            let value = self.aggregate_values(&values, &column.agg_func, diagnostics);
            result.insert(&column.id, value);
        }
        Ok(result)
    }

    fn aggregate_values_and_pivot(
        &self,
        tree: &RowTree,
        node: NodeId,
        pivot_columns: &[PivotColumnDescriptor],
        diagnostics: &mut Vec<RollupError>,
    ) -> Result<AggResult, RollupError> {
        let row_node = tree.get(node)?;
        let mut result = AggResult::new();

        for descriptor in pivot_columns {
            let source = ValueSource::pivot(row_node, descriptor);
            let values = match source.collect(tree, node, self.retrieval) {
                Ok(values) => values,
                Err(err @ RollupError::MissingPivotBucket { .. }) => {
                    log_debug!(AGG, "{} -> '{}' reads as empty", err, descriptor.output_col_id);
                    diagnostics.push(err);
                    Vec::new()
                }
                Err(err) => return Err(err),
            };

            let value = self.aggregate_values(&values, &descriptor.source_value_column.agg_func, diagnostics);
            result.insert(&descriptor.output_col_id, value);
        }
        Ok(result)
    }

    fn aggregate_values(
        &self,
        values: &[CellValue],
        agg_func: &AggFuncRef,
        diagnostics: &mut Vec<RollupError>,
    ) -> CellValue {
        match self.registry.resolve(agg_func) {
            Ok(function) => function.call(values),
            Err(err) => {
                log_warn!(AGG, "{}", err);
                diagnostics.push(err);
                CellValue::Empty
            }
        }
    }
}
