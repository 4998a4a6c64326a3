//! Storage engine seam.
//!
//! Overlay cursors read committed data exclusively through the cursor
//! traits defined here, so any engine that can enumerate nodes,
//! relationships, groups and properties plugs in underneath. The crate
//! ships [`MemStore`], an in-memory engine used by the tests.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{
    GroupRef, LabelId, LabelSet, NodeId, PropKeyId, PropRef, PropValue, RelId, RelRef, RelTypeId,
};

mod memstore;

pub use memstore::MemStore;

/// An index predicate. Only exact-match lookups are supported.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexQuery {
    /// Entities whose indexed property equals the value.
    Exact(PropValue),
}

/// Shared progress of a batched all-node scan. Worker threads claim
/// disjoint id ranges from one scan handle and drain them in parallel.
#[derive(Debug, Default)]
pub struct AllNodeScan {
    next: AtomicU64,
}

impl AllNodeScan {
    /// Creates a scan positioned at id zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the next `size_hint` ids, returning the range start.
    pub fn claim(&self, size_hint: u64) -> u64 {
        self.next.fetch_add(size_hint, Ordering::Relaxed)
    }
}

/// Shared progress of a batched all-relationship scan.
#[derive(Debug, Default)]
pub struct AllRelationshipScan {
    next: AtomicU64,
}

impl AllRelationshipScan {
    /// Creates a scan positioned at id zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the next `size_hint` ids, returning the range start.
    pub fn claim(&self, size_hint: u64) -> u64 {
        self.next.fetch_add(size_hint, Ordering::Relaxed)
    }
}

/// Committed-node cursor.
///
/// Attribute accessors panic when the cursor is not positioned on a node;
/// callers must only read after `next` returned `true`.
pub trait StorageNodeCursor: Send {
    /// Positions on a single node id, if it exists.
    fn single(&mut self, node: NodeId);
    /// Positions at the start of a full scan.
    fn scan(&mut self);
    /// Positions over the id range `[start, start + count)`.
    fn scan_range(&mut self, start: u64, count: u64);
    /// Advances to the next node. Returns `false` when exhausted.
    fn next(&mut self) -> bool;
    /// Id of the current node.
    fn node_id(&self) -> NodeId;
    /// Stored labels of the current node.
    fn labels(&self) -> LabelSet;
    /// Whether the current node carries `label` in storage.
    fn has_label(&self, label: LabelId) -> bool;
    /// Property-chain reference of the current node.
    fn properties_ref(&self) -> PropRef;
    /// Relationship reference of the current node, dense-tagged when the
    /// node's degree crosses the engine's dense threshold.
    fn relationships_ref(&self) -> RelRef;
    /// Group-chain reference of the current node, dense-tagged likewise.
    fn group_ref(&self) -> GroupRef;
    /// Clears positioning for reuse.
    fn reset(&mut self);
}

/// Committed-relationship cursor.
pub trait StorageRelationshipCursor: Send {
    /// Positions on a single relationship id, if it exists.
    fn single(&mut self, rel: RelId);
    /// Positions at the start of a full scan.
    fn scan(&mut self);
    /// Positions over the id range `[start, start + count)`.
    fn scan_range(&mut self, start: u64, count: u64);
    /// Positions over the committed relationships touching `node`, as
    /// addressed by a node cursor's relationship reference.
    fn traverse(&mut self, node: NodeId, reference: RelRef);
    /// Advances to the next relationship. Returns `false` when exhausted.
    fn next(&mut self) -> bool;
    /// Id of the current relationship.
    fn rel_id(&self) -> RelId;
    /// Type of the current relationship.
    fn rel_type(&self) -> RelTypeId;
    /// Source node of the current relationship.
    fn source(&self) -> NodeId;
    /// Target node of the current relationship.
    fn target(&self) -> NodeId;
    /// Property-chain reference of the current relationship.
    fn properties_ref(&self) -> PropRef;
    /// Clears positioning for reuse.
    fn reset(&mut self);
}

/// Committed-property cursor, reading one entity's property chain.
pub trait StoragePropertyCursor: Send {
    /// Positions at the head of the chain `reference` addresses.
    fn init(&mut self, reference: PropRef);
    /// Advances to the next property. Returns `false` when exhausted.
    fn next(&mut self) -> bool;
    /// Key of the current property.
    fn key(&self) -> PropKeyId;
    /// Value of the current property.
    fn value(&self) -> PropValue;
    /// Clears positioning for reuse.
    fn reset(&mut self);
}

/// Committed relationship-group cursor for dense nodes. Each group holds
/// one relationship type's degree counts.
pub trait StorageGroupCursor: Send {
    /// Positions at the group chain of `node`.
    fn init(&mut self, node: NodeId, reference: GroupRef);
    /// Advances to the next group. Returns `false` when exhausted.
    fn next(&mut self) -> bool;
    /// Relationship type of the current group.
    fn group_type(&self) -> RelTypeId;
    /// Committed outgoing degree of the group. Loops count here too.
    fn outgoing_degree(&self) -> u64;
    /// Committed incoming degree of the group. Loops count here too.
    fn incoming_degree(&self) -> u64;
    /// Committed relationship count of the group, each loop counted once.
    fn total_degree(&self) -> u64;
    /// Clears positioning for reuse.
    fn reset(&mut self);
}

/// Committed label-index cursor, yielding node ids in ascending order.
pub trait StorageLabelIndexCursor: Send {
    /// Positions at the start of the posting list for `label`.
    fn scan(&mut self, label: LabelId);
    /// Advances to the next node. Returns `false` when exhausted.
    fn next(&mut self) -> bool;
    /// Id of the current node.
    fn node_id(&self) -> NodeId;
    /// Clears positioning for reuse.
    fn reset(&mut self);
}

/// Committed value-index cursor, yielding matching node ids in ascending
/// order.
pub trait StorageIndexCursor: Send {
    /// Positions at the committed nodes matching `query` on `key`.
    fn seek(&mut self, key: PropKeyId, query: &IndexQuery);
    /// Advances to the next match. Returns `false` when exhausted.
    fn next(&mut self) -> bool;
    /// Id of the current node.
    fn node_id(&self) -> NodeId;
    /// Clears positioning for reuse.
    fn reset(&mut self);
}

/// Allocates storage cursors for one engine.
pub trait StorageCursorFactory: Send + Sync {
    /// A fresh committed-node cursor.
    fn allocate_node_cursor(&self) -> Box<dyn StorageNodeCursor>;
    /// A fresh committed-relationship cursor.
    fn allocate_relationship_cursor(&self) -> Box<dyn StorageRelationshipCursor>;
    /// A fresh committed-property cursor.
    fn allocate_property_cursor(&self) -> Box<dyn StoragePropertyCursor>;
    /// A fresh committed-group cursor.
    fn allocate_group_cursor(&self) -> Box<dyn StorageGroupCursor>;
    /// A fresh committed label-index cursor.
    fn allocate_label_index_cursor(&self) -> Box<dyn StorageLabelIndexCursor>;
    /// A fresh committed value-index cursor.
    fn allocate_index_cursor(&self) -> Box<dyn StorageIndexCursor>;
}
