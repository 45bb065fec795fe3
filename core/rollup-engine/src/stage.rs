//! FILENAME: core/rollup-engine/src/stage.rs
//! Aggregation Stage - runs the row aggregator over a whole group tree.
//!
//! Algorithm:
//! 1. Skip everything if the groups were supplied pre-formed by the caller
//! 2. Capture the value columns, pivot columns and override once per run
//! 3. Walk the tree post-order: every group child is aggregated before its
//!    parent, so a parent always reads up-to-date child data
//! 4. Collect the non-fatal diagnostics of every cell into a report
//!
//! A run recomputes every visited group from scratch. Running twice on an
//! unchanged tree gives the same data.

use crate::aggregator::{AggregationPlan, GroupAggOverride, RowAggregator};
use crate::definition::{PivotColumnDescriptor, RollupDefinition, ValueColumn};
use crate::error::RollupError;
use crate::logging::AGG;
use crate::registry::AggFunctionRegistry;
use crate::tree::{NodeId, RowTree};
use crate::value_source::{RecordValueGetter, ValueRetrieval};
use crate::{log_debug, log_error};

// ============================================================================
// GROUPING STATE
// ============================================================================

/// What the grouping side of the grid tells the aggregation stage.
pub trait GroupingState {
    /// Rows were grouped by the caller; their groups already carry any summary data.
    fn is_externally_grouped(&self) -> bool;

    fn value_columns(&self) -> &[ValueColumn];

    fn pivot_column_descriptors(&self) -> &[PivotColumnDescriptor];

    fn group_agg_override(&self) -> Option<&dyn GroupAggOverride>;
}

// ============================================================================
// REPORT
// ============================================================================

/// Outcome of one aggregation run.
#[derive(Debug, Default)]
pub struct AggregationReport {
    /// True when the run was skipped because groups came from the caller.
    pub skipped: bool,

    /// Number of group nodes whose data was (re)written.
    pub nodes_aggregated: usize,

    /// Cell-level problems that degraded a value to `Empty`.
    pub diagnostics: Vec<RollupError>,
}

impl AggregationReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

// ============================================================================
// STAGE
// ============================================================================

/// The aggregation stage of the row pipeline.
pub struct AggregationStage<S: GroupingState = RollupDefinition> {
    state: S,
    registry: AggFunctionRegistry,
    retrieval: Box<dyn ValueRetrieval>,
}

impl<S: GroupingState> AggregationStage<S> {
    /// Creates a stage with the built-in functions that reads raw rows from
    /// their backing records.
    pub fn new(state: S) -> Self {
        AggregationStage {
            state,
            registry: AggFunctionRegistry::new(),
            retrieval: Box::new(RecordValueGetter),
        }
    }

    pub fn with_registry(mut self, registry: AggFunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_value_retrieval(mut self, retrieval: Box<dyn ValueRetrieval>) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Recomputes the aggregates of the whole tree without rebuilding it.
    pub fn recompute_aggregates(&self, tree: &mut RowTree) -> Result<AggregationReport, RollupError> {
        match tree.root() {
            Some(root) => self.execute(tree, root),
            None => Ok(AggregationReport::default()),
        }
    }

    /// Aggregates the subtree under `root`, children before parents.
    pub fn execute(&self, tree: &mut RowTree, root: NodeId) -> Result<AggregationReport, RollupError> {
        let mut report = AggregationReport::default();

        // we don't do aggregation if the caller provided the groups
        if self.state.is_externally_grouped() {
            log_debug!(AGG, "groups supplied externally, skipping aggregation");
            report.skipped = true;
            return Ok(report);
        }

        let root_node = match tree.get(root) {
            Ok(node) => node,
            Err(err) => {
                log_error!(AGG, "cannot aggregate: {}", err);
                return Err(err);
            }
        };
        if !root_node.is_group() {
            log_debug!(AGG, "node {} is not a group, nothing to aggregate", root);
            return Ok(report);
        }

        let plan = AggregationPlan::from_state(&self.state);
        let aggregator = RowAggregator::new(&self.registry, self.retrieval.as_ref());

        log_debug!(
            AGG,
            "aggregate root={} value_columns={} pivot_columns={} override={}",
            root,
            plan.value_columns.len(),
            plan.pivot_columns.len(),
            plan.group_agg_override.is_some()
        );

        Self::recursively_aggregate(&aggregator, tree, root, &plan, &mut report)?;

        log_debug!(
            AGG,
            "aggregated {} groups, {} diagnostics",
            report.nodes_aggregated,
            report.diagnostics.len()
        );
        Ok(report)
    }

    fn recursively_aggregate(
        aggregator: &RowAggregator<'_>,
        tree: &mut RowTree,
        node: NodeId,
        plan: &AggregationPlan<'_>,
        report: &mut AggregationReport,
    ) -> Result<(), RollupError> {
        // aggregate all group children first, as we use their results here
        let group_children: Vec<NodeId> = tree
            .children(node)
            .into_iter()
            .filter(|child| child.is_group())
            .map(|child| child.id)
            .collect();

        for child in group_children {
            Self::recursively_aggregate(aggregator, tree, child, plan, report)?;
        }

        aggregator.aggregate(tree, node, plan, &mut report.diagnostics)?;
        report.nodes_aggregated += 1;
        Ok(())
    }
}

/// Aggregates a whole tree with the built-in functions and record-based
/// value retrieval. This is the main entry point for simple callers.
pub fn aggregate_tree(
    definition: &RollupDefinition,
    tree: &mut RowTree,
) -> Result<AggregationReport, RollupError> {
    AggregationStage::new(definition.clone()).recompute_aggregates(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::AggFuncRef;
    use crate::tree::{AggResult, PivotBuckets, RowNode};
    use engine::{CellValue, RowRecord};
    use std::rc::Rc;
    use std::sync::Arc;

    /// Root -> two leaf groups (North: 100, 150 / South: 200, 250).
    fn create_test_tree() -> (RowTree, NodeId, NodeId, NodeId) {
        let mut tree = RowTree::new();
        let root = tree.add_root(false);
        let north = tree.add_group(root, true).unwrap();
        let south = tree.add_group(root, true).unwrap();
        for (group, sales) in [(north, 100.0), (north, 150.0), (south, 200.0), (south, 250.0)] {
            tree.add_leaf(group, RowRecord::new().with("sales", sales).with("qty", 1.0)).unwrap();
        }
        (tree, root, north, south)
    }

    fn create_test_definition() -> RollupDefinition {
        RollupDefinition::new(vec![
            ValueColumn::named("sales", "sum"),
            ValueColumn::named("qty", "max"),
        ])
    }

    #[test]
    fn test_basic_rollup() {
        let (mut tree, root, north, south) = create_test_tree();
        let report = aggregate_tree(&create_test_definition(), &mut tree).unwrap();

        assert_eq!(report.nodes_aggregated, 3);
        assert!(report.is_clean());
        assert_eq!(tree.get(north).unwrap().value_at("sales"), CellValue::Number(250.0));
        assert_eq!(tree.get(south).unwrap().value_at("sales"), CellValue::Number(450.0));
        assert_eq!(tree.get(root).unwrap().value_at("sales"), CellValue::Number(700.0));
        assert_eq!(tree.get(root).unwrap().value_at("qty"), CellValue::Number(1.0));
    }

    #[test]
    fn test_parent_reads_child_results() {
        // A custom function that counts its inputs shows the parent sees one
        // value per child group, not one per raw row.
        let (mut tree, root, north, _) = create_test_tree();
        let definition = RollupDefinition::new(vec![ValueColumn::new(
            "sales",
            AggFuncRef::custom(|values| CellValue::Number(values.len() as f64)),
        )]);
        aggregate_tree(&definition, &mut tree).unwrap();

        assert_eq!(tree.get(north).unwrap().value_at("sales"), CellValue::Number(2.0));
        assert_eq!(tree.get(root).unwrap().value_at("sales"), CellValue::Number(2.0));
    }

    #[test]
    fn test_externally_grouped_skips_everything() {
        let (mut tree, root, north, _) = create_test_tree();
        let mut definition = create_test_definition();
        definition.externally_grouped = true;

        let report = aggregate_tree(&definition, &mut tree).unwrap();
        assert!(report.skipped);
        assert_eq!(report.nodes_aggregated, 0);
        assert!(tree.get(root).unwrap().data.is_none());
        assert!(tree.get(north).unwrap().data.is_none());
    }

    #[test]
    fn test_externally_grouped_keeps_existing_data() {
        let (mut tree, root, _, _) = create_test_tree();
        tree.assign_data(root, Some(vec![("sales", -1.0)].into_iter().collect())).unwrap();
        let before = tree.get(root).unwrap().data.clone().unwrap();

        let mut definition = create_test_definition();
        definition.externally_grouped = true;
        aggregate_tree(&definition, &mut tree).unwrap();

        let after = tree.get(root).unwrap().data.clone().unwrap();
        assert!(Rc::ptr_eq(&before, &after));
        assert_eq!(after.borrow().get("sales"), CellValue::Number(-1.0));
    }

    #[test]
    fn test_no_value_columns() {
        let (mut tree, root, north, _) = create_test_tree();
        let report = aggregate_tree(&RollupDefinition::default(), &mut tree).unwrap();
        assert_eq!(report.nodes_aggregated, 3);
        assert!(tree.get(root).unwrap().data.is_none());
        assert!(tree.get(north).unwrap().data.is_none());
    }

    #[test]
    fn test_idempotent_runs() {
        let (mut tree, root, north, south) = create_test_tree();
        let stage = AggregationStage::new(create_test_definition());

        stage.recompute_aggregates(&mut tree).unwrap();
        let first: Vec<Option<AggResult>> = [root, north, south]
            .iter()
            .map(|id| tree.get(*id).unwrap().data_snapshot())
            .collect();

        stage.recompute_aggregates(&mut tree).unwrap();
        let second: Vec<Option<AggResult>> = [root, north, south]
            .iter()
            .map(|id| tree.get(*id).unwrap().data_snapshot())
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_filtered_children_only() {
        let (mut tree, root, north, _) = create_test_tree();
        tree.set_children_after_filter(root, vec![north]).unwrap();

        aggregate_tree(&create_test_definition(), &mut tree).unwrap();
        assert_eq!(tree.get(root).unwrap().value_at("sales"), CellValue::Number(250.0));
    }

    #[test]
    fn test_execute_on_subtree() {
        let (mut tree, root, north, south) = create_test_tree();
        let stage = AggregationStage::new(create_test_definition());

        let report = stage.execute(&mut tree, north).unwrap();
        assert_eq!(report.nodes_aggregated, 1);
        assert!(tree.get(north).unwrap().data.is_some());
        assert!(tree.get(south).unwrap().data.is_none());
        assert!(tree.get(root).unwrap().data.is_none());
    }

    #[test]
    fn test_execute_unknown_root() {
        let (mut tree, _, _, _) = create_test_tree();
        let stage = AggregationStage::new(create_test_definition());
        assert!(matches!(
            stage.execute(&mut tree, NodeId(500)),
            Err(RollupError::UnknownNode(NodeId(500)))
        ));
    }

    #[test]
    fn test_empty_tree() {
        let mut tree = RowTree::new();
        let report = aggregate_tree(&create_test_definition(), &mut tree).unwrap();
        assert_eq!(report.nodes_aggregated, 0);
    }

    #[test]
    fn test_override_applies_to_every_group() {
        let (mut tree, root, north, _) = create_test_tree();
        let definition = create_test_definition().with_override(Arc::new(|children: &[&RowNode]| {
            vec![("children", children.len() as f64)].into_iter().collect::<AggResult>()
        }));

        aggregate_tree(&definition, &mut tree).unwrap();
        assert_eq!(tree.get(north).unwrap().value_at("children"), CellValue::Number(2.0));
        assert_eq!(tree.get(root).unwrap().value_at("children"), CellValue::Number(2.0));
        assert_eq!(tree.get(root).unwrap().value_at("sales"), CellValue::Empty);
    }

    #[test]
    fn test_custom_registry_and_retrieval() {
        let (mut tree, root, _, _) = create_test_tree();
        let registry = AggFunctionRegistry::new().with(
            "spread",
            crate::definition::AggFn::new(|values| {
                match (crate::registry::agg_min(values), crate::registry::agg_max(values)) {
                    (CellValue::Number(lo), CellValue::Number(hi)) => CellValue::Number(hi - lo),
                    _ => CellValue::Empty,
                }
            }),
        );
        let stage = AggregationStage::new(RollupDefinition::new(vec![ValueColumn::named("sales", "spread")]))
            .with_registry(registry)
            .with_value_retrieval(Box::new(|column: &ValueColumn, row: &RowNode| {
                RecordValueGetter.get_value(column, row)
            }));

        stage.recompute_aggregates(&mut tree).unwrap();
        // North spread 50, South spread 50, root spread over child spreads = 0
        assert_eq!(tree.get(root).unwrap().value_at("sales"), CellValue::Number(0.0));
    }

    #[test]
    fn test_pivot_rollup() {
        let mut tree = RowTree::new();
        let root = tree.add_root(false);
        let group = tree.add_group(root, true).unwrap();
        let r1 = tree.add_leaf(group, RowRecord::new().with("v", 2.0)).unwrap();
        let r2 = tree.add_leaf(group, RowRecord::new().with("v", 3.0)).unwrap();
        let r3 = tree.add_leaf(group, RowRecord::new().with("v", 5.0)).unwrap();

        let mut buckets = PivotBuckets::branch();
        buckets.insert(&["keyA"], r1);
        buckets.insert(&["keyA"], r2);
        buckets.insert(&["keyB"], r3);
        tree.set_pivot_buckets(group, buckets).unwrap();

        let value = ValueColumn::named("v", "sum");
        let definition = RollupDefinition::new(vec![value.clone()]).with_pivot_columns(vec![
            PivotColumnDescriptor::new("cellA", &["keyA"], value.clone()),
            PivotColumnDescriptor::new("cellB", &["keyB"], value),
        ]);

        let report = aggregate_tree(&definition, &mut tree).unwrap();
        assert!(report.is_clean());
        for id in [group, root] {
            let node = tree.get(id).unwrap();
            assert_eq!(node.value_at("cellA"), CellValue::Number(5.0));
            assert_eq!(node.value_at("cellB"), CellValue::Number(5.0));
        }
    }

    #[test]
    fn test_diagnostics_do_not_abort() {
        let (mut tree, root, _, _) = create_test_tree();
        let definition = RollupDefinition::new(vec![
            ValueColumn::named("sales", "nope"),
            ValueColumn::named("qty", "sum"),
        ]);

        let report = aggregate_tree(&definition, &mut tree).unwrap();
        assert_eq!(report.nodes_aggregated, 3);
        // One per group
        assert_eq!(report.diagnostics.len(), 3);
        assert!(report.diagnostics.iter().all(RollupError::is_cell_local));
        assert_eq!(tree.get(root).unwrap().value_at("sales"), CellValue::Empty);
        assert_eq!(tree.get(root).unwrap().value_at("qty"), CellValue::Number(4.0));
    }
}
