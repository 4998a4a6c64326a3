//! Index overlay cursors: label scans and value-index seeks.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::storage::{
    IndexQuery, StorageCursorFactory, StorageIndexCursor, StorageLabelIndexCursor,
    StorageNodeCursor,
};
use crate::tracer::ReadTracer;
use crate::txn::{PropChange, Transaction};
use crate::types::{LabelId, LabelSet, NodeId, PropKeyId};

use super::HasChanges;

/// Cursor over the nodes effectively carrying one label: tx-state label
/// additions first, then the committed posting list filtered by tx label
/// removals and node deletions. Both sides pass the access mode's
/// per-node check.
///
/// When the access mode denies the scanned label itself the cursor yields
/// nothing at all.
pub struct NodeLabelIndexCursor {
    storage: Box<dyn StorageLabelIndexCursor>,
    /// Resolves storage hits to their labels for per-node access checks.
    node_lookup: Box<dyn StorageNodeCursor>,
    txn: Option<Arc<dyn Transaction>>,
    tracer: Option<Arc<dyn ReadTracer>>,
    has_changes: HasChanges,
    denied: bool,
    /// Frozen tx additions in reverse order; `next` pops from the tail.
    added: Vec<NodeId>,
    /// Nodes that lost the label in this transaction.
    removed_from_label: FxHashSet<u64>,
    removed_nodes: FxHashSet<u64>,
    current: Option<NodeId>,
}

impl NodeLabelIndexCursor {
    pub(crate) fn new(factory: &dyn StorageCursorFactory) -> Self {
        Self {
            storage: factory.allocate_label_index_cursor(),
            node_lookup: factory.allocate_node_cursor(),
            txn: None,
            tracer: None,
            has_changes: HasChanges::Unknown,
            denied: false,
            added: Vec::new(),
            removed_from_label: FxHashSet::default(),
            removed_nodes: FxHashSet::default(),
            current: None,
        }
    }

    /// Positions at the start of a scan for `label`.
    pub fn scan(
        &mut self,
        label: LabelId,
        txn: Arc<dyn Transaction>,
        tracer: Option<Arc<dyn ReadTracer>>,
    ) {
        self.added.clear();
        self.removed_from_label.clear();
        self.removed_nodes.clear();
        self.current = None;
        if let Some(tracer) = &tracer {
            tracer.on_label_scan(label);
        }
        let mode = txn.access_mode();
        self.denied = !mode.allows_read_all_labels() && !mode.allows_read_labels(&[label]);
        self.has_changes = if txn.has_changes() {
            HasChanges::Yes
        } else {
            HasChanges::No
        };
        if self.denied {
            self.storage.reset();
        } else {
            if self.has_changes == HasChanges::Yes {
                let state = txn.state();
                let diff = state.nodes_with_label_changed(label);
                self.added = diff.added;
                self.added.reverse();
                self.removed_from_label = diff.removed;
                self.removed_nodes = state.removed_nodes();
            }
            self.storage.scan(label);
        }
        self.txn = Some(txn);
        self.tracer = tracer;
    }

    /// Advances to the next visible node with the label.
    pub fn next(&mut self) -> bool {
        let txn = Arc::clone(self.bound());
        if self.denied {
            return false;
        }
        // Tx additions go through the same per-node check as storage
        // hits: a committed node can gain the scanned label in-tx while
        // still carrying a denied one.
        while let Some(node) = self.added.pop() {
            if !self.allowed(txn.as_ref(), node) {
                continue;
            }
            self.current = Some(node);
            self.trace(node);
            return true;
        }
        while self.storage.next() {
            let node = self.storage.node_id();
            if self.removed_from_label.contains(&node.0) || self.removed_nodes.contains(&node.0) {
                continue;
            }
            if !self.allowed(txn.as_ref(), node) {
                continue;
            }
            self.current = Some(node);
            self.trace(node);
            return true;
        }
        self.current = None;
        false
    }

    /// Id of the current node.
    pub fn node_reference(&self) -> NodeId {
        self.current
            .unwrap_or_else(|| panic!("label index cursor not positioned"))
    }

    /// Detaches transaction, tracer and snapshots. Idempotent.
    pub fn close(&mut self) {
        self.txn = None;
        self.tracer = None;
        self.has_changes = HasChanges::Unknown;
        self.denied = false;
        self.added.clear();
        self.removed_from_label.clear();
        self.removed_nodes.clear();
        self.current = None;
        self.storage.reset();
        self.node_lookup.reset();
    }

    /// Whether the cursor holds no transaction.
    pub fn is_closed(&self) -> bool {
        self.txn.is_none()
    }

    fn bound(&self) -> &Arc<dyn Transaction> {
        self.txn
            .as_ref()
            .unwrap_or_else(|| panic!("label index cursor is closed"))
    }

    fn allowed(&mut self, txn: &dyn Transaction, node: NodeId) -> bool {
        let mode = txn.access_mode();
        if mode.allows_read_all_labels() {
            return true;
        }
        self.node_lookup.single(node);
        // A tx-created node has no stored record; its diff labels decide.
        let stored = if self.node_lookup.next() {
            self.node_lookup.labels()
        } else {
            LabelSet::new()
        };
        let labels = if self.has_changes == HasChanges::Yes {
            txn.state().augment_labels(stored, node)
        } else {
            stored
        };
        mode.allows_read_labels(&labels)
    }

    fn trace(&self, node: NodeId) {
        if let Some(tracer) = &self.tracer {
            tracer.on_node(node);
        }
    }
}

/// Cursor over the nodes whose effective value of one property matches an
/// exact-match index query: tx-changed nodes whose effective value
/// matches first, then committed index hits filtered by deletions and by
/// tx property changes that falsify the match.
pub struct NodeIndexCursor {
    storage: Box<dyn StorageIndexCursor>,
    txn: Option<Arc<dyn Transaction>>,
    tracer: Option<Arc<dyn ReadTracer>>,
    /// Frozen tx-side matches in reverse order; `next` pops from the tail.
    added: Vec<NodeId>,
    /// Nodes with any tx change on the sought key; the tx side already
    /// decided them, so storage hits for them are skipped.
    changed: FxHashSet<u64>,
    removed_nodes: FxHashSet<u64>,
    current: Option<NodeId>,
}

impl NodeIndexCursor {
    pub(crate) fn new(factory: &dyn StorageCursorFactory) -> Self {
        Self {
            storage: factory.allocate_index_cursor(),
            txn: None,
            tracer: None,
            added: Vec::new(),
            changed: FxHashSet::default(),
            removed_nodes: FxHashSet::default(),
            current: None,
        }
    }

    /// Positions at the nodes matching `query` on `key`.
    pub fn seek(
        &mut self,
        key: PropKeyId,
        query: IndexQuery,
        txn: Arc<dyn Transaction>,
        tracer: Option<Arc<dyn ReadTracer>>,
    ) {
        self.added.clear();
        self.changed.clear();
        self.removed_nodes.clear();
        self.current = None;
        if let Some(tracer) = &tracer {
            tracer.on_index_seek();
        }
        if txn.has_changes() {
            let state = txn.state();
            let IndexQuery::Exact(wanted) = &query;
            for node in state.nodes_with_property_changed(key) {
                self.changed.insert(node.0);
                if state.node_is_deleted_in_tx(node) {
                    continue;
                }
                if let Some(PropChange::Set(value)) = state.node_property_change(node, key) {
                    if value == *wanted {
                        self.added.push(node);
                    }
                }
            }
            self.added.reverse();
            self.removed_nodes = state.removed_nodes();
        }
        self.storage.seek(key, &query);
        self.txn = Some(txn);
        self.tracer = tracer;
    }

    /// Advances to the next matching node.
    pub fn next(&mut self) -> bool {
        let _ = self.bound();
        if let Some(node) = self.added.pop() {
            self.current = Some(node);
            self.trace(node);
            return true;
        }
        while self.storage.next() {
            let node = self.storage.node_id();
            if self.removed_nodes.contains(&node.0) || self.changed.contains(&node.0) {
                continue;
            }
            self.current = Some(node);
            self.trace(node);
            return true;
        }
        self.current = None;
        false
    }

    /// Id of the current node.
    pub fn node_reference(&self) -> NodeId {
        self.current
            .unwrap_or_else(|| panic!("index cursor not positioned"))
    }

    /// Detaches transaction, tracer and snapshots. Idempotent.
    pub fn close(&mut self) {
        self.txn = None;
        self.tracer = None;
        self.added.clear();
        self.changed.clear();
        self.removed_nodes.clear();
        self.current = None;
        self.storage.reset();
    }

    /// Whether the cursor holds no transaction.
    pub fn is_closed(&self) -> bool {
        self.txn.is_none()
    }

    fn bound(&self) -> &Arc<dyn Transaction> {
        self.txn
            .as_ref()
            .unwrap_or_else(|| panic!("index cursor is closed"))
    }

    fn trace(&self, node: NodeId) {
        if let Some(tracer) = &self.tracer {
            tracer.on_node(node);
        }
    }
}
