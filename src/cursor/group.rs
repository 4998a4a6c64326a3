//! Relationship-group overlay cursor.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::storage::{StorageCursorFactory, StorageGroupCursor, StorageRelationshipCursor};
use crate::tracer::ReadTracer;
use crate::txn::Transaction;
use crate::types::{GroupRef, NodeId, RelId, RelTypeId};

/// Cursor over one node's relationship types with effective degrees:
/// committed group counts adjusted by the transaction's additions and
/// deletions, plus virtual groups for types that exist only in the
/// transaction. Types whose effective degree drops to zero are skipped.
pub struct RelationshipGroupCursor {
    storage: Box<dyn StorageGroupCursor>,
    /// Resolves deleted relationship ids back to type and endpoints.
    rel_lookup: Box<dyn StorageRelationshipCursor>,
    txn: Option<Arc<dyn Transaction>>,
    tracer: Option<Arc<dyn ReadTracer>>,
    /// Merged rows in reverse type order; `next` pops from the tail.
    rows: Vec<(RelTypeId, u64)>,
    current: Option<(RelTypeId, u64)>,
}

impl RelationshipGroupCursor {
    pub(crate) fn new(factory: &dyn StorageCursorFactory) -> Self {
        Self {
            storage: factory.allocate_group_cursor(),
            rel_lookup: factory.allocate_relationship_cursor(),
            txn: None,
            tracer: None,
            rows: Vec::new(),
            current: None,
        }
    }

    /// Positions over the relationship groups of `origin`. The merged
    /// rows are computed here, so writes after initialization do not
    /// change this cursor's results.
    pub fn init(
        &mut self,
        origin: NodeId,
        reference: GroupRef,
        dense: bool,
        txn: Arc<dyn Transaction>,
        tracer: Option<Arc<dyn ReadTracer>>,
    ) {
        self.current = None;
        let reference = if dense {
            reference.encode_dense()
        } else {
            reference
        };
        let mut degrees: BTreeMap<u32, i64> = BTreeMap::new();
        self.storage.init(origin, reference);
        while self.storage.next() {
            degrees.insert(self.storage.group_type().0, self.storage.total_degree() as i64);
        }
        if txn.has_changes() {
            let state = txn.state();
            for rel in state.added_relationships_touching(origin) {
                if let Some(data) = state.relationship_data(rel) {
                    *degrees.entry(data.rel_type.0).or_insert(0) += 1;
                }
            }
            for rel in state.removed_relationships() {
                self.rel_lookup.single(RelId(rel));
                if self.rel_lookup.next()
                    && (self.rel_lookup.source() == origin || self.rel_lookup.target() == origin)
                {
                    *degrees.entry(self.rel_lookup.rel_type().0).or_insert(0) -= 1;
                }
            }
            self.rel_lookup.reset();
        }
        self.rows = degrees
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(rel_type, degree)| (RelTypeId(rel_type), degree as u64))
            .rev()
            .collect();
        self.txn = Some(txn);
        self.tracer = tracer;
    }

    /// Advances to the next non-empty group. A closed cursor yields
    /// nothing.
    pub fn next(&mut self) -> bool {
        if self.txn.is_none() {
            return false;
        }
        self.current = self.rows.pop();
        if let (Some((rel_type, _)), Some(tracer)) = (self.current, &self.tracer) {
            tracer.on_relationship_group(rel_type);
        }
        self.current.is_some()
    }

    /// Relationship type of the current group.
    pub fn group_type(&self) -> RelTypeId {
        self.row().0
    }

    /// Effective relationship count of the current group.
    pub fn total_degree(&self) -> u64 {
        self.row().1
    }

    /// Detaches transaction, tracer and merged rows. Idempotent.
    pub fn close(&mut self) {
        self.txn = None;
        self.tracer = None;
        self.rows.clear();
        self.current = None;
        self.storage.reset();
        self.rel_lookup.reset();
    }

    /// Whether the cursor holds no transaction.
    pub fn is_closed(&self) -> bool {
        self.txn.is_none()
    }

    fn row(&self) -> (RelTypeId, u64) {
        self.current
            .unwrap_or_else(|| panic!("group cursor not positioned"))
    }
}
