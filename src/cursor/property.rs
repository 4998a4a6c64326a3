//! Property overlay cursor.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::storage::{StorageCursorFactory, StoragePropertyCursor};
use crate::tracer::ReadTracer;
use crate::txn::{PropChange, Transaction};
use crate::types::{NodeId, PropKeyId, PropRef, PropValue, RelId};

/// Cursor over one entity's effective properties: the stored chain with
/// the transaction's overrides applied, then keys the transaction added.
///
/// An uninitialized or closed cursor yields no rows; callers that were
/// refused a property chain observe an empty result rather than stale
/// data.
pub struct PropertyCursor {
    storage: Box<dyn StoragePropertyCursor>,
    txn: Option<Arc<dyn Transaction>>,
    tracer: Option<Arc<dyn ReadTracer>>,
    /// This entity's tx changes, frozen at init and sorted by key.
    changes: Vec<(PropKeyId, PropChange)>,
    overrides: FxHashMap<u32, PropChange>,
    /// Keys already merged while draining the stored chain.
    consumed: FxHashSet<u32>,
    tail_idx: usize,
    storage_done: bool,
    current: Option<(PropKeyId, PropValue)>,
}

impl PropertyCursor {
    pub(crate) fn new(factory: &dyn StorageCursorFactory) -> Self {
        Self {
            storage: factory.allocate_property_cursor(),
            txn: None,
            tracer: None,
            changes: Vec::new(),
            overrides: FxHashMap::default(),
            consumed: FxHashSet::default(),
            tail_idx: 0,
            storage_done: false,
            current: None,
        }
    }

    fn bind(
        &mut self,
        reference: PropRef,
        changes: Vec<(PropKeyId, PropChange)>,
        txn: Arc<dyn Transaction>,
        tracer: Option<Arc<dyn ReadTracer>>,
    ) {
        self.overrides = changes
            .iter()
            .map(|(key, change)| (key.0, change.clone()))
            .collect();
        self.changes = changes;
        self.consumed.clear();
        self.tail_idx = 0;
        self.storage_done = false;
        self.current = None;
        self.storage.init(reference);
        self.txn = Some(txn);
        self.tracer = tracer;
    }

    /// Positions over the effective properties of `node`.
    pub fn init_node(
        &mut self,
        node: NodeId,
        reference: PropRef,
        txn: Arc<dyn Transaction>,
        tracer: Option<Arc<dyn ReadTracer>>,
    ) {
        let changes = if txn.has_changes() {
            txn.state().node_property_changes(node)
        } else {
            Vec::new()
        };
        self.bind(reference, changes, txn, tracer);
    }

    /// Positions over the effective properties of `rel`.
    pub fn init_relationship(
        &mut self,
        rel: RelId,
        reference: PropRef,
        txn: Arc<dyn Transaction>,
        tracer: Option<Arc<dyn ReadTracer>>,
    ) {
        let changes = if txn.has_changes() {
            txn.state().relationship_property_changes(rel)
        } else {
            Vec::new()
        };
        self.bind(reference, changes, txn, tracer);
    }

    /// Advances to the next effective property. A closed cursor returns
    /// `false`.
    pub fn next(&mut self) -> bool {
        if self.txn.is_none() {
            return false;
        }
        while !self.storage_done {
            if !self.storage.next() {
                self.storage_done = true;
                break;
            }
            let key = self.storage.key();
            match self.overrides.get(&key.0) {
                Some(PropChange::Removed) => {
                    self.consumed.insert(key.0);
                }
                Some(PropChange::Set(value)) => {
                    let value = value.clone();
                    self.consumed.insert(key.0);
                    self.current = Some((key, value));
                    self.trace(key);
                    return true;
                }
                None => {
                    self.current = Some((key, self.storage.value()));
                    self.trace(key);
                    return true;
                }
            }
        }
        while self.tail_idx < self.changes.len() {
            let (key, change) = self.changes[self.tail_idx].clone();
            self.tail_idx += 1;
            if self.consumed.contains(&key.0) {
                continue;
            }
            if let PropChange::Set(value) = change {
                self.current = Some((key, value));
                self.trace(key);
                return true;
            }
        }
        self.current = None;
        false
    }

    /// Key of the current property.
    pub fn property_key(&self) -> PropKeyId {
        self.row().0
    }

    /// Value of the current property.
    pub fn property_value(&self) -> PropValue {
        self.row().1.clone()
    }

    /// Detaches transaction, tracer and merge state. Idempotent.
    pub fn close(&mut self) {
        self.txn = None;
        self.tracer = None;
        self.changes.clear();
        self.overrides.clear();
        self.consumed.clear();
        self.tail_idx = 0;
        self.storage_done = false;
        self.current = None;
        self.storage.reset();
    }

    /// Whether the cursor holds no transaction.
    pub fn is_closed(&self) -> bool {
        self.txn.is_none()
    }

    fn row(&self) -> &(PropKeyId, PropValue) {
        self.current
            .as_ref()
            .unwrap_or_else(|| panic!("property cursor not positioned"))
    }

    fn trace(&self, key: PropKeyId) {
        if let Some(tracer) = &self.tracer {
            tracer.on_property(key);
        }
    }
}
