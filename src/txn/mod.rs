//! Per-transaction diff state.
//!
//! A transaction's uncommitted changes live in a diff-set keyed by entity
//! id: added/removed entity sets, per-node label diffs, and per-entity
//! property changes. The state is owned by its transaction, mutated only
//! by that transaction's write operations, and read-only to cursors
//! through [`TxStateView`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::security::AccessMode;
use crate::types::{LabelId, LabelSet, NodeId, PropKeyId, PropValue, RelId, RelTypeId};

/// One uncommitted property change.
#[derive(Clone, Debug, PartialEq)]
pub enum PropChange {
    /// The property was set (added or overwritten) in this transaction.
    Set(PropValue),
    /// The property was removed in this transaction.
    Removed,
}

/// Label changes of one node in this transaction, both sides sorted.
#[derive(Clone, Debug, Default)]
pub struct LabelDiff {
    /// Labels added in this transaction.
    pub added: SmallVec<[LabelId; 8]>,
    /// Labels removed in this transaction.
    pub removed: SmallVec<[LabelId; 8]>,
}

impl LabelDiff {
    /// Whether `label` was added in this transaction.
    pub fn has_added(&self, label: LabelId) -> bool {
        self.added.contains(&label)
    }

    /// Whether `label` was removed in this transaction.
    pub fn has_removed(&self, label: LabelId) -> bool {
        self.removed.contains(&label)
    }
}

/// Nodes whose membership of one label changed in this transaction.
#[derive(Clone, Debug, Default)]
pub struct LabelScanDiff {
    /// Nodes that gained the label (including tx-created nodes), ordered.
    pub added: Vec<NodeId>,
    /// Nodes that lost the label.
    pub removed: FxHashSet<u64>,
}

/// Payload of a relationship created in this transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RelData {
    /// Relationship type.
    pub rel_type: RelTypeId,
    /// Source node.
    pub source: NodeId,
    /// Target node.
    pub target: NodeId,
}

/// Read-only view of a transaction's diff-set, as cursors consume it.
///
/// Enumerating methods return frozen snapshots so a cursor's iteration
/// sources stay stable while the owning transaction keeps writing.
pub trait TxStateView: Send + Sync {
    /// Whether this transaction holds any uncommitted change.
    fn any_changes(&self) -> bool;

    /// Nodes created in this transaction, in creation order.
    fn added_nodes(&self) -> Vec<NodeId>;
    /// Nodes deleted in this transaction.
    fn removed_nodes(&self) -> FxHashSet<u64>;
    /// Whether `node` was created in this transaction.
    fn node_is_added_in_tx(&self, node: NodeId) -> bool;
    /// Whether `node` was deleted in this transaction.
    fn node_is_deleted_in_tx(&self, node: NodeId) -> bool;
    /// Label diff of `node`.
    fn node_label_diff(&self, node: NodeId) -> LabelDiff;
    /// Applies `node`'s label diff to a stored label set.
    fn augment_labels(&self, stored: LabelSet, node: NodeId) -> LabelSet;
    /// Nodes whose membership of `label` changed.
    fn nodes_with_label_changed(&self, label: LabelId) -> LabelScanDiff;
    /// Property changes of `node`, ordered by key.
    fn node_property_changes(&self, node: NodeId) -> Vec<(PropKeyId, PropChange)>;
    /// The change applied to one property of `node`, if any.
    fn node_property_change(&self, node: NodeId, key: PropKeyId) -> Option<PropChange>;
    /// Nodes with any change to property `key`, ordered.
    fn nodes_with_property_changed(&self, key: PropKeyId) -> Vec<NodeId>;

    /// Relationships created in this transaction, in creation order.
    fn added_relationships(&self) -> Vec<RelId>;
    /// Relationships deleted in this transaction.
    fn removed_relationships(&self) -> FxHashSet<u64>;
    /// Whether `rel` was created in this transaction.
    fn relationship_is_added_in_tx(&self, rel: RelId) -> bool;
    /// Whether `rel` was deleted in this transaction.
    fn relationship_is_deleted_in_tx(&self, rel: RelId) -> bool;
    /// Payload of a tx-created relationship.
    fn relationship_data(&self, rel: RelId) -> Option<RelData>;
    /// Tx-created relationships with `node` as either endpoint, ordered.
    fn added_relationships_touching(&self, node: NodeId) -> Vec<RelId>;
    /// Property changes of `rel`, ordered by key.
    fn relationship_property_changes(&self, rel: RelId) -> Vec<(PropKeyId, PropChange)>;
}

#[derive(Default)]
struct NodeLabelState {
    added: FxHashSet<u32>,
    removed: FxHashSet<u32>,
}

#[derive(Default)]
struct TxStateInner {
    added_nodes: Vec<NodeId>,
    added_node_lookup: FxHashSet<u64>,
    removed_nodes: FxHashSet<u64>,
    node_labels: FxHashMap<u64, NodeLabelState>,
    node_props: FxHashMap<u64, FxHashMap<u32, PropChange>>,
    added_rels: Vec<RelId>,
    added_rel_lookup: FxHashMap<u64, RelData>,
    removed_rels: FxHashSet<u64>,
    rel_props: FxHashMap<u64, FxHashMap<u32, PropChange>>,
}

impl TxStateInner {
    fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.node_labels.is_empty()
            && self.node_props.is_empty()
            && self.added_rels.is_empty()
            && self.removed_rels.is_empty()
            && self.rel_props.is_empty()
    }
}

/// Concrete diff-set. Interior-mutable so the owning transaction can keep
/// writing while cursors hold a read-only view.
#[derive(Default)]
pub struct TxState {
    inner: Mutex<TxStateInner>,
}

impl TxState {
    /// Creates an empty diff-set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a node created in this transaction.
    pub fn create_node(&self, node: NodeId) {
        let mut inner = self.inner.lock();
        if inner.added_node_lookup.insert(node.0) {
            inner.added_nodes.push(node);
        }
    }

    /// Records a node deletion. Deleting a tx-created node rolls the
    /// creation back instead of tombstoning it.
    pub fn delete_node(&self, node: NodeId) {
        let mut inner = self.inner.lock();
        if inner.added_node_lookup.remove(&node.0) {
            inner.added_nodes.retain(|n| *n != node);
            inner.node_labels.remove(&node.0);
            inner.node_props.remove(&node.0);
        } else {
            inner.removed_nodes.insert(node.0);
        }
    }

    /// Records a label addition on `node`.
    pub fn add_label(&self, node: NodeId, label: LabelId) {
        let mut inner = self.inner.lock();
        let diff = inner.node_labels.entry(node.0).or_default();
        if !diff.removed.remove(&label.0) {
            diff.added.insert(label.0);
        }
    }

    /// Records a label removal on `node`.
    pub fn remove_label(&self, node: NodeId, label: LabelId) {
        let mut inner = self.inner.lock();
        let diff = inner.node_labels.entry(node.0).or_default();
        if !diff.added.remove(&label.0) {
            diff.removed.insert(label.0);
        }
    }

    /// Records a property write on `node`.
    pub fn set_node_property(&self, node: NodeId, key: PropKeyId, value: PropValue) {
        let mut inner = self.inner.lock();
        inner
            .node_props
            .entry(node.0)
            .or_default()
            .insert(key.0, PropChange::Set(value));
    }

    /// Records a property removal on `node`.
    pub fn remove_node_property(&self, node: NodeId, key: PropKeyId) {
        let mut inner = self.inner.lock();
        inner
            .node_props
            .entry(node.0)
            .or_default()
            .insert(key.0, PropChange::Removed);
    }

    /// Records a relationship created in this transaction.
    pub fn create_relationship(&self, rel: RelId, data: RelData) {
        let mut inner = self.inner.lock();
        if inner.added_rel_lookup.insert(rel.0, data).is_none() {
            inner.added_rels.push(rel);
        }
    }

    /// Records a relationship deletion, rolling back a tx-created one.
    pub fn delete_relationship(&self, rel: RelId) {
        let mut inner = self.inner.lock();
        if inner.added_rel_lookup.remove(&rel.0).is_some() {
            inner.added_rels.retain(|r| *r != rel);
            inner.rel_props.remove(&rel.0);
        } else {
            inner.removed_rels.insert(rel.0);
        }
    }

    /// Records a property write on `rel`.
    pub fn set_relationship_property(&self, rel: RelId, key: PropKeyId, value: PropValue) {
        let mut inner = self.inner.lock();
        inner
            .rel_props
            .entry(rel.0)
            .or_default()
            .insert(key.0, PropChange::Set(value));
    }

    /// Records a property removal on `rel`.
    pub fn remove_relationship_property(&self, rel: RelId, key: PropKeyId) {
        let mut inner = self.inner.lock();
        inner
            .rel_props
            .entry(rel.0)
            .or_default()
            .insert(key.0, PropChange::Removed);
    }
}

fn sorted_changes(map: Option<&FxHashMap<u32, PropChange>>) -> Vec<(PropKeyId, PropChange)> {
    let mut changes: Vec<(PropKeyId, PropChange)> = map
        .map(|map| {
            map.iter()
                .map(|(key, change)| (PropKeyId(*key), change.clone()))
                .collect()
        })
        .unwrap_or_default();
    changes.sort_by_key(|(key, _)| *key);
    changes
}

impl TxStateView for TxState {
    fn any_changes(&self) -> bool {
        !self.inner.lock().is_empty()
    }

    fn added_nodes(&self) -> Vec<NodeId> {
        self.inner.lock().added_nodes.clone()
    }

    fn removed_nodes(&self) -> FxHashSet<u64> {
        self.inner.lock().removed_nodes.clone()
    }

    fn node_is_added_in_tx(&self, node: NodeId) -> bool {
        self.inner.lock().added_node_lookup.contains(&node.0)
    }

    fn node_is_deleted_in_tx(&self, node: NodeId) -> bool {
        self.inner.lock().removed_nodes.contains(&node.0)
    }

    fn node_label_diff(&self, node: NodeId) -> LabelDiff {
        let inner = self.inner.lock();
        let Some(state) = inner.node_labels.get(&node.0) else {
            return LabelDiff::default();
        };
        let mut diff = LabelDiff {
            added: state.added.iter().map(|l| LabelId(*l)).collect(),
            removed: state.removed.iter().map(|l| LabelId(*l)).collect(),
        };
        diff.added.sort_unstable();
        diff.removed.sort_unstable();
        diff
    }

    fn augment_labels(&self, stored: LabelSet, node: NodeId) -> LabelSet {
        let diff = self.node_label_diff(node);
        let mut labels: LabelSet = stored
            .into_iter()
            .filter(|label| !diff.has_removed(*label))
            .collect();
        labels.extend(diff.added.iter().copied());
        labels.sort_unstable();
        labels.dedup();
        labels
    }

    fn nodes_with_label_changed(&self, label: LabelId) -> LabelScanDiff {
        let inner = self.inner.lock();
        let mut diff = LabelScanDiff::default();
        for (node, state) in &inner.node_labels {
            if state.added.contains(&label.0) {
                diff.added.push(NodeId(*node));
            } else if state.removed.contains(&label.0) {
                diff.removed.insert(*node);
            }
        }
        diff.added.sort_unstable();
        diff
    }

    fn node_property_changes(&self, node: NodeId) -> Vec<(PropKeyId, PropChange)> {
        sorted_changes(self.inner.lock().node_props.get(&node.0))
    }

    fn node_property_change(&self, node: NodeId, key: PropKeyId) -> Option<PropChange> {
        self.inner
            .lock()
            .node_props
            .get(&node.0)
            .and_then(|props| props.get(&key.0).cloned())
    }

    fn nodes_with_property_changed(&self, key: PropKeyId) -> Vec<NodeId> {
        let inner = self.inner.lock();
        let mut nodes: Vec<NodeId> = inner
            .node_props
            .iter()
            .filter(|(_, props)| props.contains_key(&key.0))
            .map(|(node, _)| NodeId(*node))
            .collect();
        nodes.sort_unstable();
        nodes
    }

    fn added_relationships(&self) -> Vec<RelId> {
        self.inner.lock().added_rels.clone()
    }

    fn removed_relationships(&self) -> FxHashSet<u64> {
        self.inner.lock().removed_rels.clone()
    }

    fn relationship_is_added_in_tx(&self, rel: RelId) -> bool {
        self.inner.lock().added_rel_lookup.contains_key(&rel.0)
    }

    fn relationship_is_deleted_in_tx(&self, rel: RelId) -> bool {
        self.inner.lock().removed_rels.contains(&rel.0)
    }

    fn relationship_data(&self, rel: RelId) -> Option<RelData> {
        self.inner.lock().added_rel_lookup.get(&rel.0).copied()
    }

    fn added_relationships_touching(&self, node: NodeId) -> Vec<RelId> {
        let inner = self.inner.lock();
        inner
            .added_rels
            .iter()
            .filter(|rel| {
                inner
                    .added_rel_lookup
                    .get(&rel.0)
                    .is_some_and(|data| data.source == node || data.target == node)
            })
            .copied()
            .collect()
    }

    fn relationship_property_changes(&self, rel: RelId) -> Vec<(PropKeyId, PropChange)> {
        sorted_changes(self.inner.lock().rel_props.get(&rel.0))
    }
}

/// The transaction context an overlay cursor binds to.
pub trait Transaction: Send + Sync {
    /// Whether the transaction holds any uncommitted change.
    fn has_changes(&self) -> bool;
    /// The transaction's diff-set.
    fn state(&self) -> &dyn TxStateView;
    /// The transaction's access policy.
    fn access_mode(&self) -> &dyn AccessMode;
}

/// A transaction: diff-set, access policy and entity-id allocation.
pub struct KernelTransaction {
    state: TxState,
    mode: Arc<dyn AccessMode>,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
}

impl KernelTransaction {
    /// Creates a transaction allocating entity ids from zero.
    pub fn new(mode: Arc<dyn AccessMode>) -> Self {
        Self::with_id_base(mode, 0, 0)
    }

    /// Creates a transaction allocating entity ids from the given floors,
    /// typically the storage engine's next unused ids.
    pub fn with_id_base(mode: Arc<dyn AccessMode>, next_node_id: u64, next_rel_id: u64) -> Self {
        Self {
            state: TxState::new(),
            mode,
            next_node_id: AtomicU64::new(next_node_id),
            next_rel_id: AtomicU64::new(next_rel_id),
        }
    }

    /// Creates a node, returning its id.
    pub fn create_node(&self) -> NodeId {
        let node = NodeId(self.next_node_id.fetch_add(1, Ordering::Relaxed));
        self.state.create_node(node);
        node
    }

    /// Deletes a node.
    pub fn delete_node(&self, node: NodeId) {
        self.state.delete_node(node);
    }

    /// Adds a label to a node.
    pub fn add_label(&self, node: NodeId, label: LabelId) {
        self.state.add_label(node, label);
    }

    /// Removes a label from a node.
    pub fn remove_label(&self, node: NodeId, label: LabelId) {
        self.state.remove_label(node, label);
    }

    /// Sets a node property.
    pub fn set_node_property(&self, node: NodeId, key: PropKeyId, value: PropValue) {
        self.state.set_node_property(node, key, value);
    }

    /// Removes a node property.
    pub fn remove_node_property(&self, node: NodeId, key: PropKeyId) {
        self.state.remove_node_property(node, key);
    }

    /// Creates a relationship, returning its id.
    pub fn create_relationship(
        &self,
        rel_type: RelTypeId,
        source: NodeId,
        target: NodeId,
    ) -> RelId {
        let rel = RelId(self.next_rel_id.fetch_add(1, Ordering::Relaxed));
        self.state.create_relationship(
            rel,
            RelData {
                rel_type,
                source,
                target,
            },
        );
        rel
    }

    /// Deletes a relationship.
    pub fn delete_relationship(&self, rel: RelId) {
        self.state.delete_relationship(rel);
    }

    /// Sets a relationship property.
    pub fn set_relationship_property(&self, rel: RelId, key: PropKeyId, value: PropValue) {
        self.state.set_relationship_property(rel, key, value);
    }

    /// Removes a relationship property.
    pub fn remove_relationship_property(&self, rel: RelId, key: PropKeyId) {
        self.state.remove_relationship_property(rel, key);
    }
}

impl Transaction for KernelTransaction {
    fn has_changes(&self) -> bool {
        self.state.any_changes()
    }

    fn state(&self) -> &dyn TxStateView {
        &self.state
    }

    fn access_mode(&self) -> &dyn AccessMode {
        self.mode.as_ref()
    }
}
