//! Relationship overlay cursors.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::storage::{
    AllRelationshipScan, StorageCursorFactory, StorageNodeCursor, StorageRelationshipCursor,
};
use crate::tracer::ReadTracer;
use crate::txn::{RelData, Transaction};
use crate::types::{LabelSet, NodeId, PropRef, RelId, RelRef, RelTypeId};

use super::{HasChanges, PropertyCursor};

enum Current {
    None,
    TxAdded(RelId),
    Storage,
}

fn tx_rel_data(txn: &dyn Transaction, rel: RelId) -> RelData {
    txn.state()
        .relationship_data(rel)
        .unwrap_or_else(|| panic!("transaction relationship payload missing"))
}

/// Attribute-path access check: a relationship's properties are readable
/// only when the access mode can read both endpoints' effective labels.
/// Tx-created endpoints have no stored record; their diff labels decide.
fn endpoints_allowed(
    txn: &dyn Transaction,
    lookup: &mut dyn StorageNodeCursor,
    source: NodeId,
    target: NodeId,
) -> bool {
    let mode = txn.access_mode();
    if mode.allows_read_all_labels() {
        return true;
    }
    let changed = txn.has_changes();
    for node in [source, target] {
        lookup.single(node);
        let stored = if lookup.next() {
            lookup.labels()
        } else {
            LabelSet::new()
        };
        let labels = if changed {
            txn.state().augment_labels(stored, node)
        } else {
            stored
        };
        if !mode.allows_read_labels(&labels) {
            lookup.reset();
            return false;
        }
    }
    lookup.reset();
    true
}

/// Cursor over the relationships a transaction can see, by id: its own
/// uncommitted additions first, then committed relationships it has not
/// deleted.
pub struct RelationshipScanCursor {
    storage: Box<dyn StorageRelationshipCursor>,
    /// Endpoint lookup for the attribute-path access check.
    node_lookup: Box<dyn StorageNodeCursor>,
    txn: Option<Arc<dyn Transaction>>,
    tracer: Option<Arc<dyn ReadTracer>>,
    has_changes: HasChanges,
    /// Frozen tx additions in reverse order; `next` pops from the tail.
    added: Vec<RelId>,
    removed: FxHashSet<u64>,
    current: Current,
}

impl RelationshipScanCursor {
    pub(crate) fn new(factory: &dyn StorageCursorFactory) -> Self {
        Self {
            storage: factory.allocate_relationship_cursor(),
            node_lookup: factory.allocate_node_cursor(),
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
            self.removed = txn.state().removed_relationships();
        }
        self.txn = Some(txn);
        self.tracer = tracer;
    }

    /// Positions on one relationship id.
    pub fn single(
        &mut self,
        rel: RelId,
        txn: Arc<dyn Transaction>,
        tracer: Option<Arc<dyn ReadTracer>>,
    ) {
        self.bind(txn, tracer);
        if self.has_changes == HasChanges::Yes
            && self.bound().state().relationship_is_added_in_tx(rel)
        {
            self.added.push(rel);
        }
        self.storage.single(rel);
    }

    /// Positions at the start of an all-relationship scan.
    pub fn scan(&mut self, txn: Arc<dyn Transaction>, tracer: Option<Arc<dyn ReadTracer>>) {
        self.bind(txn, tracer);
        if self.has_changes == HasChanges::Yes {
            self.added = self.bound().state().added_relationships();
            self.added.reverse();
        }
        self.storage.scan();
    }

    /// Claims the next batch of a shared scan and positions over it. Tx
    /// additions attach to the batch that starts at position zero.
    pub fn scan_batch(
        &mut self,
        scan: &AllRelationshipScan,
        size_hint: u64,
        txn: Arc<dyn Transaction>,
        tracer: Option<Arc<dyn ReadTracer>>,
    ) {
        self.bind(txn, tracer);
        let start = scan.claim(size_hint);
        if self.has_changes == HasChanges::Yes && start == 0 {
            self.added = self.bound().state().added_relationships();
            self.added.reverse();
        }
        self.storage.scan_range(start, size_hint);
    }

    /// Advances to the next visible relationship.
    pub fn next(&mut self) -> bool {
        let _ = self.bound();
        if let Some(rel) = self.added.pop() {
            self.current = Current::TxAdded(rel);
            self.trace(rel);
            return true;
        }
        while self.storage.next() {
            let rel = self.storage.rel_id();
            if self.removed.contains(&rel.0) {
                continue;
            }
            self.current = Current::Storage;
            self.trace(rel);
            return true;
        }
        self.current = Current::None;
        false
    }

    /// Id of the current relationship.
    pub fn relationship_reference(&self) -> RelId {
        match self.current {
            Current::TxAdded(rel) => rel,
            Current::Storage => self.storage.rel_id(),
            Current::None => panic!("relationship cursor not positioned"),
        }
    }

    /// Type of the current relationship.
    pub fn rel_type(&self) -> RelTypeId {
        match self.current {
            Current::TxAdded(rel) => tx_rel_data(self.bound().as_ref(), rel).rel_type,
            Current::Storage => self.storage.rel_type(),
            Current::None => panic!("relationship cursor not positioned"),
        }
    }

    /// Source node of the current relationship.
    pub fn source_node_reference(&self) -> NodeId {
        match self.current {
            Current::TxAdded(rel) => tx_rel_data(self.bound().as_ref(), rel).source,
            Current::Storage => self.storage.source(),
            Current::None => panic!("relationship cursor not positioned"),
        }
    }

    /// Target node of the current relationship.
    pub fn target_node_reference(&self) -> NodeId {
        match self.current {
            Current::TxAdded(rel) => tx_rel_data(self.bound().as_ref(), rel).target,
            Current::Storage => self.storage.target(),
            Current::None => panic!("relationship cursor not positioned"),
        }
    }

    /// Property-chain reference of the current relationship.
    pub fn properties_reference(&self) -> PropRef {
        match self.current {
            Current::TxAdded(_) => PropRef::NONE,
            Current::Storage => self.storage.properties_ref(),
            Current::None => panic!("relationship cursor not positioned"),
        }
    }

    /// Initializes `into` over the current relationship's properties, or
    /// closes it when the access mode denies either endpoint.
    pub fn properties(&mut self, into: &mut PropertyCursor) {
        let source = self.source_node_reference();
        let target = self.target_node_reference();
        let txn = Arc::clone(self.bound());
        if !endpoints_allowed(txn.as_ref(), self.node_lookup.as_mut(), source, target) {
            into.close();
            return;
        }
        into.init_relationship(
            self.relationship_reference(),
            self.properties_reference(),
            txn,
            self.tracer.clone(),
        );
    }

    /// Detaches transaction, tracer and snapshots. Idempotent.
    pub fn close(&mut self) {
        self.txn = None;
        self.tracer = None;
        self.has_changes = HasChanges::Unknown;
        self.added.clear();
        self.removed.clear();
        self.current = Current::None;
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
            .unwrap_or_else(|| panic!("relationship cursor is closed"))
    }

    fn trace(&self, rel: RelId) {
        if let Some(tracer) = &self.tracer {
            tracer.on_relationship(rel);
        }
    }
}

/// Cursor over the relationships touching one origin node: the
/// transaction's additions touching that node first, then committed
/// relationships it has not deleted.
pub struct RelationshipTraversalCursor {
    storage: Box<dyn StorageRelationshipCursor>,
    /// Endpoint lookup for the attribute-path access check.
    node_lookup: Box<dyn StorageNodeCursor>,
    txn: Option<Arc<dyn Transaction>>,
    tracer: Option<Arc<dyn ReadTracer>>,
    has_changes: HasChanges,
    origin: Option<NodeId>,
    added: Vec<RelId>,
    removed: FxHashSet<u64>,
    current: Current,
}

impl RelationshipTraversalCursor {
    pub(crate) fn new(factory: &dyn StorageCursorFactory) -> Self {
        Self {
            storage: factory.allocate_relationship_cursor(),
            node_lookup: factory.allocate_node_cursor(),
            txn: None,
            tracer: None,
            has_changes: HasChanges::Unknown,
            origin: None,
            added: Vec::new(),
            removed: FxHashSet::default(),
            current: Current::None,
        }
    }

    /// Positions over the relationships touching `origin`, as addressed
    /// by `reference`. The caller's dense flag re-tags the reference so
    /// the engine picks the matching traversal path.
    pub fn init(
        &mut self,
        origin: NodeId,
        reference: RelRef,
        dense: bool,
        txn: Arc<dyn Transaction>,
        tracer: Option<Arc<dyn ReadTracer>>,
    ) {
        self.added.clear();
        self.removed.clear();
        self.current = Current::None;
        self.origin = Some(origin);
        self.has_changes = if txn.has_changes() {
            HasChanges::Yes
        } else {
            HasChanges::No
        };
        if self.has_changes == HasChanges::Yes {
            let state = txn.state();
            self.added = state.added_relationships_touching(origin);
            self.added.reverse();
            self.removed = state.removed_relationships();
        }
        let reference = if dense {
            reference.encode_dense()
        } else {
            reference
        };
        self.storage.traverse(origin, reference);
        self.txn = Some(txn);
        self.tracer = tracer;
    }

    /// Advances to the next visible relationship of the origin. A closed
    /// cursor yields nothing.
    pub fn next(&mut self) -> bool {
        if self.txn.is_none() {
            return false;
        }
        if let Some(rel) = self.added.pop() {
            self.current = Current::TxAdded(rel);
            self.trace(rel);
            return true;
        }
        while self.storage.next() {
            let rel = self.storage.rel_id();
            if self.removed.contains(&rel.0) {
                continue;
            }
            self.current = Current::Storage;
            self.trace(rel);
            return true;
        }
        self.current = Current::None;
        false
    }

    /// Id of the current relationship.
    pub fn relationship_reference(&self) -> RelId {
        match self.current {
            Current::TxAdded(rel) => rel,
            Current::Storage => self.storage.rel_id(),
            Current::None => panic!("relationship cursor not positioned"),
        }
    }

    /// Type of the current relationship.
    pub fn rel_type(&self) -> RelTypeId {
        match self.current {
            Current::TxAdded(rel) => tx_rel_data(self.bound().as_ref(), rel).rel_type,
            Current::Storage => self.storage.rel_type(),
            Current::None => panic!("relationship cursor not positioned"),
        }
    }

    /// Source node of the current relationship.
    pub fn source_node_reference(&self) -> NodeId {
        match self.current {
            Current::TxAdded(rel) => tx_rel_data(self.bound().as_ref(), rel).source,
            Current::Storage => self.storage.source(),
            Current::None => panic!("relationship cursor not positioned"),
        }
    }

    /// Target node of the current relationship.
    pub fn target_node_reference(&self) -> NodeId {
        match self.current {
            Current::TxAdded(rel) => tx_rel_data(self.bound().as_ref(), rel).target,
            Current::Storage => self.storage.target(),
            Current::None => panic!("relationship cursor not positioned"),
        }
    }

    /// The node this traversal was initialized from.
    pub fn origin_node_reference(&self) -> NodeId {
        self.origin
            .unwrap_or_else(|| panic!("relationship cursor is closed"))
    }

    /// The far endpoint of the current relationship. For a loop this is
    /// the origin itself.
    pub fn neighbour_node_reference(&self) -> NodeId {
        let origin = self.origin_node_reference();
        let source = self.source_node_reference();
        if source == origin {
            self.target_node_reference()
        } else {
            source
        }
    }

    /// Property-chain reference of the current relationship.
    pub fn properties_reference(&self) -> PropRef {
        match self.current {
            Current::TxAdded(_) => PropRef::NONE,
            Current::Storage => self.storage.properties_ref(),
            Current::None => panic!("relationship cursor not positioned"),
        }
    }

    /// Initializes `into` over the current relationship's properties, or
    /// closes it when the access mode denies either endpoint.
    pub fn properties(&mut self, into: &mut PropertyCursor) {
        let source = self.source_node_reference();
        let target = self.target_node_reference();
        let txn = Arc::clone(self.bound());
        if !endpoints_allowed(txn.as_ref(), self.node_lookup.as_mut(), source, target) {
            into.close();
            return;
        }
        into.init_relationship(
            self.relationship_reference(),
            self.properties_reference(),
            txn,
            self.tracer.clone(),
        );
    }

    /// Detaches transaction, tracer and snapshots. Idempotent.
    pub fn close(&mut self) {
        self.txn = None;
        self.tracer = None;
        self.has_changes = HasChanges::Unknown;
        self.origin = None;
        self.added.clear();
        self.removed.clear();
        self.current = Current::None;
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
            .unwrap_or_else(|| panic!("relationship cursor is closed"))
    }

    fn trace(&self, rel: RelId) {
        if let Some(tracer) = &self.tracer {
            tracer.on_relationship(rel);
        }
    }
}
