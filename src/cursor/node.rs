//! Node overlay cursor.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::storage::{AllNodeScan, StorageCursorFactory, StorageNodeCursor};
use crate::tracer::ReadTracer;
use crate::txn::Transaction;
use crate::types::{GroupRef, LabelId, LabelSet, NodeId, PropRef, RelRef};

use super::{
    HasChanges, PropertyCursor, RelationshipGroupCursor, RelationshipTraversalCursor,
};

enum Current {
    None,
    TxAdded(NodeId),
    Storage,
}

/// Cursor over the nodes a transaction can see: its own uncommitted
/// additions first, then committed nodes it has not deleted and its
/// access mode lets it read.
pub struct NodeCursor {
    storage: Box<dyn StorageNodeCursor>,
    txn: Option<Arc<dyn Transaction>>,
    tracer: Option<Arc<dyn ReadTracer>>,
    has_changes: HasChanges,
    /// Frozen tx additions in reverse order; `next` pops from the tail.
    added: Vec<NodeId>,
    /// Frozen tx deletions.
    removed: FxHashSet<u64>,
    current: Current,
}

impl NodeCursor {
    pub(crate) fn new(factory: &dyn StorageCursorFactory) -> Self {
        Self {
            storage: factory.allocate_node_cursor(),
            txn: None,
            tracer: None,
            has_changes: HasChanges::Unknown,
            added: Vec::new(),
            removed: FxHashSet::default(),
            current: Current::None,
        }
    }

    fn bind(&mut self, txn: Arc<dyn Transaction>, tracer: Option<Arc<dyn ReadTracer>>) {
        self.added.clear();
        self.removed.clear();
        self.current = Current::None;
        self.has_changes = if txn.has_changes() {
            HasChanges::Yes
        } else {
            HasChanges::No
        };
        if self.has_changes == HasChanges::Yes {
            self.removed = txn.state().removed_nodes();
        }
        self.txn = Some(txn);
        self.tracer = tracer;
    }

    /// Positions on one node id. Emits no scan-start trace event.
    pub fn single(
        &mut self,
        node: NodeId,
        txn: Arc<dyn Transaction>,
        tracer: Option<Arc<dyn ReadTracer>>,
    ) {
        self.bind(txn, tracer);
        if self.has_changes == HasChanges::Yes
            && self.bound().state().node_is_added_in_tx(node)
        {
            self.added.push(node);
        }
        self.storage.single(node);
    }

    /// Positions at the start of an all-node scan.
    pub fn scan(&mut self, txn: Arc<dyn Transaction>, tracer: Option<Arc<dyn ReadTracer>>) {
        self.bind(txn, tracer);
        if let Some(tracer) = &self.tracer {
            tracer.on_all_nodes_scan();
        }
        if self.has_changes == HasChanges::Yes {
            self.added = self.bound().state().added_nodes();
            self.added.reverse();
        }
        self.storage.scan();
    }

    /// Claims the next batch of a shared scan and positions over it. Tx
    /// additions attach to the batch that starts at position zero, so
    /// workers draining one scan see them exactly once.
    pub fn scan_batch(
        &mut self,
        scan: &AllNodeScan,
        size_hint: u64,
        txn: Arc<dyn Transaction>,
        tracer: Option<Arc<dyn ReadTracer>>,
    ) {
        self.bind(txn, tracer);
        let start = scan.claim(size_hint);
        if self.has_changes == HasChanges::Yes && start == 0 {
            self.added = self.bound().state().added_nodes();
            self.added.reverse();
        }
        self.storage.scan_range(start, size_hint);
    }

    /// Advances to the next visible node.
    pub fn next(&mut self) -> bool {
        let txn = Arc::clone(self.bound());
        if let Some(node) = self.added.pop() {
            self.current = Current::TxAdded(node);
            self.trace(node);
            return true;
        }
        while self.storage.next() {
            let node = self.storage.node_id();
            if self.removed.contains(&node.0) {
                continue;
            }
            if !self.allowed(txn.as_ref()) {
                continue;
            }
            self.current = Current::Storage;
            self.trace(node);
            return true;
        }
        self.current = Current::None;
        false
    }

    /// Id of the current node.
    pub fn node_reference(&self) -> NodeId {
        match self.current {
            Current::TxAdded(node) => node,
            Current::Storage => self.storage.node_id(),
            Current::None => panic!("node cursor not positioned"),
        }
    }

    /// Effective labels of the current node, tx diff applied.
    pub fn labels(&self) -> LabelSet {
        match self.current {
            Current::TxAdded(node) => {
                self.bound().state().augment_labels(LabelSet::new(), node)
            }
            Current::Storage => {
                let stored = self.storage.labels();
                if self.has_changes == HasChanges::Yes {
                    self.bound()
                        .state()
                        .augment_labels(stored, self.storage.node_id())
                } else {
                    stored
                }
            }
            Current::None => panic!("node cursor not positioned"),
        }
    }

    /// Whether the current node effectively carries `label`. A label the
    /// access mode denies reads as absent.
    pub fn has_label(&self, label: LabelId) -> bool {
        if matches!(self.current, Current::None) {
            panic!("node cursor not positioned");
        }
        let mode = self.bound().access_mode();
        if !mode.allows_read_all_labels() && !mode.allows_read_labels(&[label]) {
            return false;
        }
        match self.current {
            Current::TxAdded(node) => {
                self.bound().state().node_label_diff(node).has_added(label)
            }
            Current::Storage => {
                if self.has_changes == HasChanges::Yes {
                    let diff = self
                        .bound()
                        .state()
                        .node_label_diff(self.storage.node_id());
                    if diff.has_added(label) {
                        return true;
                    }
                    if diff.has_removed(label) {
                        return false;
                    }
                }
                self.storage.has_label(label)
            }
            Current::None => panic!("node cursor not positioned"),
        }
    }

    /// Property-chain reference of the current node. Tx-created nodes
    /// have no stored chain.
    pub fn properties_reference(&self) -> PropRef {
        match self.current {
            Current::TxAdded(_) => PropRef::NONE,
            Current::Storage => self.storage.properties_ref(),
            Current::None => panic!("node cursor not positioned"),
        }
    }

    /// Relationship reference of the current node, dense tag included.
    pub fn all_relationships_reference(&self) -> RelRef {
        match self.current {
            Current::TxAdded(_) => RelRef::NONE,
            Current::Storage => self.storage.relationships_ref(),
            Current::None => panic!("node cursor not positioned"),
        }
    }

    /// Group-chain reference of the current node, dense tag included.
    pub fn relationship_group_reference(&self) -> GroupRef {
        match self.current {
            Current::TxAdded(_) => GroupRef::NONE,
            Current::Storage => self.storage.group_ref(),
            Current::None => panic!("node cursor not positioned"),
        }
    }

    /// Whether the current node is stored dense.
    pub fn is_dense(&self) -> bool {
        self.all_relationships_reference().is_dense()
    }

    /// Initializes `into` over the current node's effective properties.
    /// When the access mode denies the node's effective labels, `into`
    /// closes and yields nothing.
    pub fn properties(&self, into: &mut PropertyCursor) {
        if !self.read_allowed() {
            into.close();
            return;
        }
        into.init_node(
            self.node_reference(),
            self.properties_reference(),
            Arc::clone(self.bound()),
            self.tracer.clone(),
        );
    }

    /// Initializes `into` over the current node's relationships, or
    /// closes it when the access mode denies the node.
    pub fn all_relationships(&self, into: &mut RelationshipTraversalCursor) {
        if !self.read_allowed() {
            into.close();
            return;
        }
        into.init(
            self.node_reference(),
            self.all_relationships_reference(),
            self.is_dense(),
            Arc::clone(self.bound()),
            self.tracer.clone(),
        );
    }

    /// Initializes `into` over the current node's relationship groups, or
    /// closes it when the access mode denies the node.
    pub fn relationships(&self, into: &mut RelationshipGroupCursor) {
        if !self.read_allowed() {
            into.close();
            return;
        }
        into.init(
            self.node_reference(),
            self.relationship_group_reference(),
            self.is_dense(),
            Arc::clone(self.bound()),
            self.tracer.clone(),
        );
    }

    /// Detaches transaction, tracer and snapshots. Idempotent; the
    /// storage cursor stays allocated for reuse.
    pub fn close(&mut self) {
        self.txn = None;
        self.tracer = None;
        self.has_changes = HasChanges::Unknown;
        self.added.clear();
        self.removed.clear();
        self.current = Current::None;
        self.storage.reset();
    }

    /// Whether the cursor holds no transaction.
    pub fn is_closed(&self) -> bool {
        self.txn.is_none()
    }

    fn bound(&self) -> &Arc<dyn Transaction> {
        self.txn
            .as_ref()
            .unwrap_or_else(|| panic!("node cursor is closed"))
    }

    /// Access re-check for attribute fan-out. The scan filter only covers
    /// storage hits; the current node may be tx-added, so this checks the
    /// effective label set of whatever is current.
    fn read_allowed(&self) -> bool {
        let mode = self.bound().access_mode();
        mode.allows_read_all_labels() || mode.allows_read_labels(&self.labels())
    }

    fn allowed(&self, txn: &dyn Transaction) -> bool {
        let mode = txn.access_mode();
        if mode.allows_read_all_labels() {
            return true;
        }
        let stored = self.storage.labels();
        let labels = if self.has_changes == HasChanges::Yes {
            txn.state().augment_labels(stored, self.storage.node_id())
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
