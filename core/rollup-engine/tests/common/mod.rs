//! FILENAME: tests/common/mod.rs
//! Fixtures and assertion helpers for rollup-engine integration tests.

#![allow(dead_code)]

use engine::{CellValue, RowRecord};
use rollup_engine::{NodeId, PivotBuckets, PivotColumnDescriptor, RowTree, ValueColumn};

// ============================================================================
// SALES FIXTURE
// ============================================================================

pub struct SalesFixture;

impl SalesFixture {
    pub fn data() -> Vec<(&'static str, &'static str, &'static str, f64, f64)> {
        vec![
            ("North", "Widget", "Q1", 10000.0, 100.0),
            ("North", "Widget", "Q2", 12000.0, 120.0),
            ("North", "Gadget", "Q1", 8000.0, 80.0),
            ("North", "Gadget", "Q2", 9000.0, 90.0),
            ("South", "Widget", "Q1", 15000.0, 150.0),
            ("South", "Widget", "Q2", 14000.0, 140.0),
            ("South", "Gadget", "Q1", 11000.0, 110.0),
            ("South", "Gadget", "Q2", 13000.0, 130.0),
            ("East", "Widget", "Q1", 9000.0, 90.0),
            ("East", "Widget", "Q2", 11000.0, 110.0),
            ("East", "Gadget", "Q1", 7000.0, 70.0),
            ("East", "Gadget", "Q2", 8500.0, 85.0),
        ]
    }

    pub fn record(region: &str, product: &str, quarter: &str, sales: f64, quantity: f64) -> RowRecord {
        RowRecord::new()
            .with("region", region)
            .with("product", product)
            .with("quarter", quarter)
            .with("sales", sales)
            .with("quantity", quantity)
    }

    /// One pivot cell per quarter over the given value column.
    pub fn quarter_columns(value: &ValueColumn) -> Vec<PivotColumnDescriptor> {
        ["Q1", "Q2"]
            .iter()
            .map(|q| PivotColumnDescriptor::new(&format!("{}_{}", q, value.id), &[*q], value.clone()))
            .collect()
    }
}

// ============================================================================
// SALES TREE
// ============================================================================

/// Root -> Region groups (with footers) -> Product leaf groups -> rows.
/// Leaf groups index their rows by quarter.
pub struct SalesTree {
    pub tree: RowTree,
    pub root: NodeId,
    /// (region, group id, footer id)
    pub regions: Vec<(String, NodeId, NodeId)>,
    /// (region, product, leaf group id)
    pub products: Vec<(String, String, NodeId)>,
}

impl SalesTree {
    pub fn build() -> Self {
        let mut tree = RowTree::new();
        let root = tree.add_root(false);
        let mut regions: Vec<(String, NodeId, NodeId)> = Vec::new();
        let mut products: Vec<(String, String, NodeId)> = Vec::new();
        let mut buckets: Vec<(NodeId, PivotBuckets)> = Vec::new();

        for (region, product, quarter, sales, quantity) in SalesFixture::data() {
            let region_id = match regions.iter().find(|(name, _, _)| name == region) {
                Some((_, id, _)) => *id,
                None => {
                    let id = tree.add_group(root, false).unwrap();
                    let footer = tree.add_footer(id).unwrap();
                    regions.push((region.to_string(), id, footer));
                    id
                }
            };

            let product_id = match products.iter().find(|(r, p, _)| r == region && p == product) {
                Some((_, _, id)) => *id,
                None => {
                    let id = tree.add_group(region_id, true).unwrap();
                    products.push((region.to_string(), product.to_string(), id));
                    buckets.push((id, PivotBuckets::branch()));
                    id
                }
            };

            let row = tree
                .add_leaf(product_id, SalesFixture::record(region, product, quarter, sales, quantity))
                .unwrap();
            let (_, index) = buckets.iter_mut().find(|(id, _)| *id == product_id).unwrap();
            index.insert(&[quarter], row);
        }

        for (id, index) in buckets {
            tree.set_pivot_buckets(id, index).unwrap();
        }

        SalesTree { tree, root, regions, products }
    }

    pub fn region(&self, name: &str) -> NodeId {
        self.regions.iter().find(|(n, _, _)| n == name).unwrap().1
    }

    pub fn footer(&self, name: &str) -> NodeId {
        self.regions.iter().find(|(n, _, _)| n == name).unwrap().2
    }

    pub fn product(&self, region: &str, product: &str) -> NodeId {
        self.products
            .iter()
            .find(|(r, p, _)| r == region && p == product)
            .unwrap()
            .2
    }

    pub fn value(&self, node: NodeId, column: &str) -> CellValue {
        self.tree.get(node).unwrap().value_at(column)
    }
}

// ============================================================================
// ASSERTION HELPERS
// ============================================================================

/// Assert that a node holds an expected number for a column.
pub fn assert_number(sales: &SalesTree, node: NodeId, column: &str, expected: f64) {
    match sales.value(node, column) {
        CellValue::Number(n) => {
            assert!(
                (n - expected).abs() < 0.001,
                "Node {} column '{}' expected {} but got {}",
                node, column, expected, n
            );
        }
        other => panic!(
            "Node {} column '{}' expected Number({}) but got {:?}",
            node, column, expected, other
        ),
    }
}
