//! In-memory storage engine.
//!
//! Backs the cursor seam with plain ordered maps. Reads are
//! snapshot-per-cursor-init: each positioning call collects the matching
//! ids up front, so a cursor's iteration is unaffected by later inserts.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{
    GroupRef, LabelId, LabelSet, NodeId, PropKeyId, PropRef, PropValue, RelId, RelRef, RelTypeId,
};

use super::{
    IndexQuery, StorageCursorFactory, StorageGroupCursor, StorageIndexCursor,
    StorageLabelIndexCursor, StorageNodeCursor, StoragePropertyCursor, StorageRelationshipCursor,
};

/// Property references carry the owning entity id; this bit distinguishes
/// relationship owners from node owners.
const REL_OWNER_BIT: u64 = 1 << 62;

#[derive(Clone, Debug)]
struct NodeRecord {
    labels: LabelSet,
    props: BTreeMap<u32, PropValue>,
}

#[derive(Clone, Debug)]
struct RelRecord {
    rel_type: RelTypeId,
    source: NodeId,
    target: NodeId,
    props: BTreeMap<u32, PropValue>,
}

#[derive(Default)]
struct StoreInner {
    nodes: BTreeMap<u64, NodeRecord>,
    rels: BTreeMap<u64, RelRecord>,
    next_node_id: u64,
    next_rel_id: u64,
}

impl StoreInner {
    fn degree(&self, node: u64) -> u64 {
        self.rels
            .values()
            .filter(|rel| rel.source.0 == node || rel.target.0 == node)
            .count() as u64
    }
}

struct Shared {
    dense_threshold: u64,
    inner: RwLock<StoreInner>,
}

/// Cheaply cloneable handle to one in-memory store.
#[derive(Clone)]
pub struct MemStore {
    shared: Arc<Shared>,
}

impl MemStore {
    /// Default degree at which a node reports dense references.
    pub const DEFAULT_DENSE_THRESHOLD: u64 = 8;

    /// Creates an empty store with the default dense threshold.
    pub fn new() -> Self {
        Self::with_dense_threshold(Self::DEFAULT_DENSE_THRESHOLD)
    }

    /// Creates an empty store reporting nodes of degree `threshold` or
    /// more as dense.
    pub fn with_dense_threshold(threshold: u64) -> Self {
        Self {
            shared: Arc::new(Shared {
                dense_threshold: threshold,
                inner: RwLock::new(StoreInner::default()),
            }),
        }
    }

    /// Inserts a committed node, returning its id.
    pub fn insert_node(
        &self,
        labels: impl IntoIterator<Item = LabelId>,
        props: impl IntoIterator<Item = (PropKeyId, PropValue)>,
    ) -> NodeId {
        let mut inner = self.shared.inner.write();
        let id = inner.next_node_id;
        inner.next_node_id += 1;
        let mut labels: LabelSet = labels.into_iter().collect();
        labels.sort_unstable();
        labels.dedup();
        inner.nodes.insert(
            id,
            NodeRecord {
                labels,
                props: props.into_iter().map(|(k, v)| (k.0, v)).collect(),
            },
        );
        NodeId(id)
    }

    /// Inserts a committed relationship, returning its id.
    pub fn insert_relationship(
        &self,
        rel_type: RelTypeId,
        source: NodeId,
        target: NodeId,
        props: impl IntoIterator<Item = (PropKeyId, PropValue)>,
    ) -> RelId {
        let mut inner = self.shared.inner.write();
        let id = inner.next_rel_id;
        inner.next_rel_id += 1;
        inner.rels.insert(
            id,
            RelRecord {
                rel_type,
                source,
                target,
                props: props.into_iter().map(|(k, v)| (k.0, v)).collect(),
            },
        );
        RelId(id)
    }

    /// Next unused node and relationship ids, the floor a transaction's
    /// id allocation starts from.
    pub fn id_base(&self) -> (u64, u64) {
        let inner = self.shared.inner.read();
        (inner.next_node_id, inner.next_rel_id)
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageCursorFactory for MemStore {
    fn allocate_node_cursor(&self) -> Box<dyn StorageNodeCursor> {
        Box::new(MemNodeCursor {
            store: self.clone(),
            pending: Vec::new(),
            current: None,
        })
    }

    fn allocate_relationship_cursor(&self) -> Box<dyn StorageRelationshipCursor> {
        Box::new(MemRelationshipCursor {
            store: self.clone(),
            pending: Vec::new(),
            current: None,
        })
    }

    fn allocate_property_cursor(&self) -> Box<dyn StoragePropertyCursor> {
        Box::new(MemPropertyCursor {
            store: self.clone(),
            pending: Vec::new(),
            current: None,
        })
    }

    fn allocate_group_cursor(&self) -> Box<dyn StorageGroupCursor> {
        Box::new(MemGroupCursor {
            store: self.clone(),
            pending: Vec::new(),
            current: None,
        })
    }

    fn allocate_label_index_cursor(&self) -> Box<dyn StorageLabelIndexCursor> {
        Box::new(MemLabelIndexCursor {
            store: self.clone(),
            pending: Vec::new(),
            current: None,
        })
    }

    fn allocate_index_cursor(&self) -> Box<dyn StorageIndexCursor> {
        Box::new(MemIndexCursor {
            store: self.clone(),
            pending: Vec::new(),
            current: None,
        })
    }
}

struct MemNodeCursor {
    store: MemStore,
    /// Candidate ids in reverse order so `next` pops from the tail.
    pending: Vec<u64>,
    current: Option<(u64, NodeRecord)>,
}

impl MemNodeCursor {
    fn record(&self) -> &(u64, NodeRecord) {
        self.current
            .as_ref()
            .unwrap_or_else(|| panic!("node cursor read before next"))
    }
}

impl StorageNodeCursor for MemNodeCursor {
    fn single(&mut self, node: NodeId) {
        self.current = None;
        self.pending.clear();
        if self.store.shared.inner.read().nodes.contains_key(&node.0) {
            self.pending.push(node.0);
        }
    }

    fn scan(&mut self) {
        self.current = None;
        let inner = self.store.shared.inner.read();
        self.pending = inner.nodes.keys().rev().copied().collect();
    }

    fn scan_range(&mut self, start: u64, count: u64) {
        self.current = None;
        let end = start.saturating_add(count);
        let inner = self.store.shared.inner.read();
        self.pending = inner.nodes.range(start..end).rev().map(|(id, _)| *id).collect();
    }

    fn next(&mut self) -> bool {
        while let Some(id) = self.pending.pop() {
            let record = self.store.shared.inner.read().nodes.get(&id).cloned();
            if let Some(record) = record {
                self.current = Some((id, record));
                return true;
            }
        }
        self.current = None;
        false
    }

    fn node_id(&self) -> NodeId {
        NodeId(self.record().0)
    }

    fn labels(&self) -> LabelSet {
        self.record().1.labels.clone()
    }

    fn has_label(&self, label: LabelId) -> bool {
        self.record().1.labels.contains(&label)
    }

    fn properties_ref(&self) -> PropRef {
        let (id, record) = self.record();
        if record.props.is_empty() {
            PropRef::NONE
        } else {
            PropRef(*id)
        }
    }

    fn relationships_ref(&self) -> RelRef {
        let id = self.record().0;
        let inner = self.store.shared.inner.read();
        let degree = inner.degree(id);
        if degree == 0 {
            RelRef::NONE
        } else if degree >= self.store.shared.dense_threshold {
            RelRef(id).encode_dense()
        } else {
            RelRef(id)
        }
    }

    fn group_ref(&self) -> GroupRef {
        let id = self.record().0;
        let inner = self.store.shared.inner.read();
        let degree = inner.degree(id);
        if degree == 0 {
            GroupRef::NONE
        } else if degree >= self.store.shared.dense_threshold {
            GroupRef(id).encode_dense()
        } else {
            GroupRef(id)
        }
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.current = None;
    }
}

struct MemRelationshipCursor {
    store: MemStore,
    pending: Vec<u64>,
    current: Option<(u64, RelRecord)>,
}

impl MemRelationshipCursor {
    fn record(&self) -> &(u64, RelRecord) {
        self.current
            .as_ref()
            .unwrap_or_else(|| panic!("relationship cursor read before next"))
    }
}

impl StorageRelationshipCursor for MemRelationshipCursor {
    fn single(&mut self, rel: RelId) {
        self.current = None;
        self.pending.clear();
        if self.store.shared.inner.read().rels.contains_key(&rel.0) {
            self.pending.push(rel.0);
        }
    }

    fn scan(&mut self) {
        self.current = None;
        let inner = self.store.shared.inner.read();
        self.pending = inner.rels.keys().rev().copied().collect();
    }

    fn scan_range(&mut self, start: u64, count: u64) {
        self.current = None;
        let end = start.saturating_add(count);
        let inner = self.store.shared.inner.read();
        self.pending = inner.rels.range(start..end).rev().map(|(id, _)| *id).collect();
    }

    fn traverse(&mut self, node: NodeId, reference: RelRef) {
        self.current = None;
        self.pending.clear();
        if reference.is_none() {
            return;
        }
        let inner = self.store.shared.inner.read();
        self.pending = inner
            .rels
            .iter()
            .rev()
            .filter(|(_, rel)| rel.source == node || rel.target == node)
            .map(|(id, _)| *id)
            .collect();
    }

    fn next(&mut self) -> bool {
        while let Some(id) = self.pending.pop() {
            let record = self.store.shared.inner.read().rels.get(&id).cloned();
            if let Some(record) = record {
                self.current = Some((id, record));
                return true;
            }
        }
        self.current = None;
        false
    }

    fn rel_id(&self) -> RelId {
        RelId(self.record().0)
    }

    fn rel_type(&self) -> RelTypeId {
        self.record().1.rel_type
    }

    fn source(&self) -> NodeId {
        self.record().1.source
    }

    fn target(&self) -> NodeId {
        self.record().1.target
    }

    fn properties_ref(&self) -> PropRef {
        let (id, record) = self.record();
        if record.props.is_empty() {
            PropRef::NONE
        } else {
            PropRef(*id | REL_OWNER_BIT)
        }
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.current = None;
    }
}

struct MemPropertyCursor {
    store: MemStore,
    /// Properties in reverse key order so `next` pops from the tail.
    pending: Vec<(u32, PropValue)>,
    current: Option<(u32, PropValue)>,
}

impl StoragePropertyCursor for MemPropertyCursor {
    fn init(&mut self, reference: PropRef) {
        self.current = None;
        self.pending.clear();
        if reference.is_none() {
            return;
        }
        let inner = self.store.shared.inner.read();
        let props = if reference.0 & REL_OWNER_BIT != 0 {
            inner.rels.get(&(reference.0 & !REL_OWNER_BIT)).map(|r| &r.props)
        } else {
            inner.nodes.get(&reference.0).map(|n| &n.props)
        };
        if let Some(props) = props {
            self.pending = props.iter().rev().map(|(k, v)| (*k, v.clone())).collect();
        }
    }

    fn next(&mut self) -> bool {
        self.current = self.pending.pop();
        self.current.is_some()
    }

    fn key(&self) -> PropKeyId {
        PropKeyId(
            self.current
                .as_ref()
                .unwrap_or_else(|| panic!("property cursor read before next"))
                .0,
        )
    }

    fn value(&self) -> PropValue {
        self.current
            .as_ref()
            .unwrap_or_else(|| panic!("property cursor read before next"))
            .1
            .clone()
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.current = None;
    }
}

#[derive(Clone, Copy)]
struct GroupRow {
    rel_type: RelTypeId,
    outgoing: u64,
    incoming: u64,
    total: u64,
}

struct MemGroupCursor {
    store: MemStore,
    /// Groups in reverse type order so `next` pops from the tail.
    pending: Vec<GroupRow>,
    current: Option<GroupRow>,
}

impl StorageGroupCursor for MemGroupCursor {
    fn init(&mut self, node: NodeId, reference: GroupRef) {
        self.current = None;
        self.pending.clear();
        if reference.is_none() {
            return;
        }
        let inner = self.store.shared.inner.read();
        let mut groups: BTreeMap<u32, GroupRow> = BTreeMap::new();
        for rel in inner.rels.values() {
            if rel.source != node && rel.target != node {
                continue;
            }
            let row = groups.entry(rel.rel_type.0).or_insert(GroupRow {
                rel_type: rel.rel_type,
                outgoing: 0,
                incoming: 0,
                total: 0,
            });
            // Loops count on both sides but once in the total.
            if rel.source == node {
                row.outgoing += 1;
            }
            if rel.target == node {
                row.incoming += 1;
            }
            row.total += 1;
        }
        self.pending = groups.into_values().rev().collect();
    }

    fn next(&mut self) -> bool {
        self.current = self.pending.pop();
        self.current.is_some()
    }

    fn group_type(&self) -> RelTypeId {
        self.row().rel_type
    }

    fn outgoing_degree(&self) -> u64 {
        self.row().outgoing
    }

    fn incoming_degree(&self) -> u64 {
        self.row().incoming
    }

    fn total_degree(&self) -> u64 {
        self.row().total
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.current = None;
    }
}

impl MemGroupCursor {
    fn row(&self) -> &GroupRow {
        self.current
            .as_ref()
            .unwrap_or_else(|| panic!("group cursor read before next"))
    }
}

struct MemLabelIndexCursor {
    store: MemStore,
    pending: Vec<u64>,
    current: Option<u64>,
}

impl StorageLabelIndexCursor for MemLabelIndexCursor {
    fn scan(&mut self, label: LabelId) {
        self.current = None;
        let inner = self.store.shared.inner.read();
        self.pending = inner
            .nodes
            .iter()
            .rev()
            .filter(|(_, record)| record.labels.contains(&label))
            .map(|(id, _)| *id)
            .collect();
    }

    fn next(&mut self) -> bool {
        self.current = self.pending.pop();
        self.current.is_some()
    }

    fn node_id(&self) -> NodeId {
        NodeId(
            self.current
                .unwrap_or_else(|| panic!("label index cursor read before next")),
        )
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.current = None;
    }
}

struct MemIndexCursor {
    store: MemStore,
    pending: Vec<u64>,
    current: Option<u64>,
}

impl StorageIndexCursor for MemIndexCursor {
    fn seek(&mut self, key: PropKeyId, query: &IndexQuery) {
        self.current = None;
        let IndexQuery::Exact(wanted) = query;
        let inner = self.store.shared.inner.read();
        self.pending = inner
            .nodes
            .iter()
            .rev()
            .filter(|(_, record)| record.props.get(&key.0) == Some(wanted))
            .map(|(id, _)| *id)
            .collect();
    }

    fn next(&mut self) -> bool {
        self.current = self.pending.pop();
        self.current.is_some()
    }

    fn node_id(&self) -> NodeId {
        NodeId(
            self.current
                .unwrap_or_else(|| panic!("index cursor read before next")),
        )
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.current = None;
    }
}
