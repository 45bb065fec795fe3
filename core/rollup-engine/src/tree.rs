//! FILENAME: core/rollup-engine/src/tree.rs
//! Row Tree - The grouped row hierarchy that aggregation writes into.
//!
//! The tree is an arena of `RowNode`s addressed by `NodeId`. It is built by
//! whatever groups the rows (not by this crate's aggregation stage), which only
//! ever writes the `data` slot of group and footer nodes.
//!
//! Ownership:
//! - Group nodes own their children by id (`children_after_filter`).
//! - A footer node points back to its owning group; the group points at the
//!   footer. Neither owns the other.
//! - Aggregated results live behind `SharedAggData` so a group and its footer
//!   can hold the very same result object.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use engine::{CellValue, RowRecord};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::RollupError;

// ============================================================================
// IDS AND RESULTS
// ============================================================================

/// Index of a node within its `RowTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The aggregated values of one group: output column id -> value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggResult {
    values: FxHashMap<String, CellValue>,
}

impl AggResult {
    pub fn new() -> Self {
        AggResult {
            values: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, column_id: &str, value: CellValue) {
        self.values.insert(column_id.to_string(), value);
    }

    /// Returns the value for a column. Missing columns read as `Empty`.
    pub fn get(&self, column_id: &str) -> CellValue {
        self.values.get(column_id).cloned().unwrap_or(CellValue::Empty)
    }

    pub fn contains(&self, column_id: &str) -> bool {
        self.values.contains_key(column_id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for AggResult {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        AggResult {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One result object, shared by reference between a group and its footer.
pub type SharedAggData = Rc<RefCell<AggResult>>;

// ============================================================================
// PIVOT BUCKETS
// ============================================================================

/// Leaf-group index of raw rows by pivot key path.
/// Each level of the pivot dimension adds one `Branch` level.
#[derive(Debug, Clone, PartialEq)]
pub enum PivotBuckets {
    Branch(FxHashMap<String, PivotBuckets>),
    Rows(Vec<NodeId>),
}

impl PivotBuckets {
    pub fn branch() -> Self {
        PivotBuckets::Branch(FxHashMap::default())
    }

    /// Files a row under the given key path, creating branches as needed.
    /// Returns false (and files nothing) if the path collides with an existing
    /// bucket of the other shape.
    pub fn insert(&mut self, key_path: &[&str], row: NodeId) -> bool {
        match (self, key_path.split_first()) {
            (PivotBuckets::Rows(rows), None) => {
                rows.push(row);
                true
            }
            (PivotBuckets::Branch(map), Some((key, rest))) => {
                let child = map.entry((*key).to_string()).or_insert_with(|| {
                    if rest.is_empty() {
                        PivotBuckets::Rows(Vec::new())
                    } else {
                        PivotBuckets::branch()
                    }
                });
                child.insert(rest, row)
            }
            _ => false,
        }
    }

    /// Follows the key path segment by segment. Resolves only when every
    /// segment exists and the path ends on a `Rows` bucket.
    pub fn lookup<S: AsRef<str>>(&self, key_path: &[S]) -> Option<&[NodeId]> {
        let mut pointer = self;
        for key in key_path {
            pointer = match pointer {
                PivotBuckets::Branch(map) => map.get(key.as_ref())?,
                PivotBuckets::Rows(_) => return None,
            };
        }
        match pointer {
            PivotBuckets::Rows(rows) => Some(rows),
            PivotBuckets::Branch(_) => None,
        }
    }
}

// ============================================================================
// NODES
// ============================================================================

/// What a node in the row tree represents.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A synthetic group. `leaf_group` is true when its children are raw rows.
    Group { leaf_group: bool },
    /// A raw data row with its backing record.
    Leaf { record: RowRecord },
    /// A summary row mirroring its owning group's aggregated values.
    Footer { owner: NodeId },
}

/// A node in the row tree.
#[derive(Debug, Clone)]
pub struct RowNode {
    pub id: NodeId,

    pub kind: NodeKind,

    /// Children surviving the current filters, in display order.
    pub children_after_filter: Vec<NodeId>,

    /// Pivot bucket index (leaf groups only).
    pub children_by_pivot_key: Option<PivotBuckets>,

    /// Aggregated values. `None` means no aggregation was produced.
    pub data: Option<SharedAggData>,

    /// Paired footer node, if the group displays one.
    pub footer: Option<NodeId>,
}

impl RowNode {
    fn new(id: NodeId, kind: NodeKind) -> Self {
        RowNode {
            id,
            kind,
            children_after_filter: Vec::new(),
            children_by_pivot_key: None,
            data: None,
            footer: None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group { .. })
    }

    pub fn is_leaf_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group { leaf_group: true })
    }

    /// The backing record of a raw row.
    pub fn record(&self) -> Option<&RowRecord> {
        match &self.kind {
            NodeKind::Leaf { record } => Some(record),
            _ => None,
        }
    }

    /// Reads the value a parent sees for a column: aggregated data for groups,
    /// the backing record for raw rows. Anything missing reads as `Empty`.
    pub fn value_at(&self, column_id: &str) -> CellValue {
        match &self.kind {
            NodeKind::Leaf { record } => record.get(column_id).cloned().unwrap_or(CellValue::Empty),
            _ => self
                .data
                .as_ref()
                .map(|data| data.borrow().get(column_id))
                .unwrap_or(CellValue::Empty),
        }
    }

    /// Snapshot of the aggregated data (None if nothing was aggregated).
    pub fn data_snapshot(&self) -> Option<AggResult> {
        self.data.as_ref().map(|data| data.borrow().clone())
    }
}

// ============================================================================
// TREE
// ============================================================================

/// Arena holding every node of one grouped row hierarchy.
#[derive(Debug, Clone, Default)]
pub struct RowTree {
    nodes: Vec<RowNode>,
    root: Option<NodeId>,
}

impl RowTree {
    pub fn new() -> Self {
        RowTree {
            nodes: Vec::new(),
            root: None,
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(RowNode::new(id, kind));
        id
    }

    fn link_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), RollupError> {
        self.get_mut(parent)?.children_after_filter.push(child);
        Ok(())
    }

    /// Creates the root group. The root is never a leaf group unless rows hang
    /// directly off it.
    pub fn add_root(&mut self, leaf_group: bool) -> NodeId {
        let id = self.push(NodeKind::Group { leaf_group });
        self.root = Some(id);
        id
    }

    /// Appends a group under `parent`.
    pub fn add_group(&mut self, parent: NodeId, leaf_group: bool) -> Result<NodeId, RollupError> {
        self.get(parent)?;
        let id = self.push(NodeKind::Group { leaf_group });
        self.link_child(parent, id)?;
        Ok(id)
    }

    /// Appends a raw row under `parent`.
    pub fn add_leaf(&mut self, parent: NodeId, record: RowRecord) -> Result<NodeId, RollupError> {
        self.get(parent)?;
        let id = self.push(NodeKind::Leaf { record });
        self.link_child(parent, id)?;
        Ok(id)
    }

    /// Creates a raw row that is not (yet) visible under any group, e.g. one
    /// that is only reachable through a pivot bucket.
    pub fn add_detached_leaf(&mut self, record: RowRecord) -> NodeId {
        self.push(NodeKind::Leaf { record })
    }

    /// Creates a footer node paired with `owner`.
    pub fn add_footer(&mut self, owner: NodeId) -> Result<NodeId, RollupError> {
        self.get(owner)?;
        let id = self.push(NodeKind::Footer { owner });
        self.get_mut(owner)?.footer = Some(id);
        Ok(id)
    }

    pub fn set_pivot_buckets(&mut self, group: NodeId, buckets: PivotBuckets) -> Result<(), RollupError> {
        self.get_mut(group)?.children_by_pivot_key = Some(buckets);
        Ok(())
    }

    /// Replaces the visible children of a group (e.g. after a filter change).
    pub fn set_children_after_filter(&mut self, group: NodeId, children: Vec<NodeId>) -> Result<(), RollupError> {
        if let Some(missing) = children.iter().find(|id| id.0 as usize >= self.nodes.len()) {
            return Err(RollupError::UnknownNode(*missing));
        }
        self.get_mut(group)?.children_after_filter = children;
        Ok(())
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Result<&RowNode, RollupError> {
        self.nodes.get(id.0 as usize).ok_or(RollupError::UnknownNode(id))
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut RowNode, RollupError> {
        self.nodes.get_mut(id.0 as usize).ok_or(RollupError::UnknownNode(id))
    }

    /// Direct visible children of a node, skipping ids that are not in the arena.
    pub fn children(&self, id: NodeId) -> Vec<&RowNode> {
        match self.get(id) {
            Ok(node) => node
                .children_after_filter
                .iter()
                .filter_map(|child| self.get(*child).ok())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Stores a result on a group and, if it has one, on its footer. Both end
    /// up holding the same `Rc`.
    pub(crate) fn assign_data(&mut self, id: NodeId, result: Option<AggResult>) -> Result<(), RollupError> {
        let shared = result.map(|r| Rc::new(RefCell::new(r)));
        let node = self.get_mut(id)?;
        node.data = shared.clone();
        if let Some(footer) = node.footer {
            self.get_mut(footer)?.data = shared;
        }
        Ok(())
    }
}
