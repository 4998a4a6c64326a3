//! Cursor pooling.
//!
//! Cursors are reused rather than reallocated: the pool keeps one shelf
//! per cursor kind, and [`Pooled`] guards return their cursor on drop
//! after closing it. A closed cursor keeps its storage cursor allocated
//! but holds no transaction, tracer or snapshot state.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::storage::StorageCursorFactory;

use super::{
    NodeCursor, NodeIndexCursor, NodeLabelIndexCursor, PropertyCursor, RelationshipGroupCursor,
    RelationshipScanCursor, RelationshipTraversalCursor,
};

/// A cursor kind the pool can shelve.
pub trait PooledCursor: Sized + Send {
    /// Builds a fresh, closed cursor over the given engine.
    fn create(factory: &dyn StorageCursorFactory) -> Self;
    /// Detaches transaction, tracer and snapshot state. Idempotent.
    fn close(&mut self);
    /// The pool shelf holding closed cursors of this kind.
    fn shelf(pool: &CursorPool) -> &Mutex<Vec<Self>>;
}

/// Per-kind shelves of closed cursors, backed by one storage engine.
pub struct CursorPool {
    factory: Arc<dyn StorageCursorFactory>,
    nodes: Mutex<Vec<NodeCursor>>,
    relationship_scans: Mutex<Vec<RelationshipScanCursor>>,
    relationship_traversals: Mutex<Vec<RelationshipTraversalCursor>>,
    properties: Mutex<Vec<PropertyCursor>>,
    groups: Mutex<Vec<RelationshipGroupCursor>>,
    label_indexes: Mutex<Vec<NodeLabelIndexCursor>>,
    indexes: Mutex<Vec<NodeIndexCursor>>,
}

impl CursorPool {
    /// Creates an empty pool over `factory`.
    pub fn new(factory: Arc<dyn StorageCursorFactory>) -> Arc<Self> {
        Arc::new(Self {
            factory,
            nodes: Mutex::new(Vec::new()),
            relationship_scans: Mutex::new(Vec::new()),
            relationship_traversals: Mutex::new(Vec::new()),
            properties: Mutex::new(Vec::new()),
            groups: Mutex::new(Vec::new()),
            label_indexes: Mutex::new(Vec::new()),
            indexes: Mutex::new(Vec::new()),
        })
    }

    fn allocate<C: PooledCursor>(self: &Arc<Self>) -> Pooled<C> {
        let cursor = C::shelf(self)
            .lock()
            .pop()
            .unwrap_or_else(|| C::create(self.factory.as_ref()));
        Pooled {
            cursor: Some(cursor),
            pool: Arc::clone(self),
        }
    }

    /// Number of shelved cursors of one kind, for reuse assertions.
    pub fn shelved<C: PooledCursor>(&self) -> usize {
        C::shelf(self).lock().len()
    }

    /// Takes a node cursor from the pool.
    pub fn allocate_node_cursor(self: &Arc<Self>) -> Pooled<NodeCursor> {
        self.allocate()
    }

    /// Takes a relationship scan cursor from the pool.
    pub fn allocate_relationship_scan_cursor(self: &Arc<Self>) -> Pooled<RelationshipScanCursor> {
        self.allocate()
    }

    /// Takes a relationship traversal cursor from the pool.
    pub fn allocate_relationship_traversal_cursor(
        self: &Arc<Self>,
    ) -> Pooled<RelationshipTraversalCursor> {
        self.allocate()
    }

    /// Takes a property cursor from the pool.
    pub fn allocate_property_cursor(self: &Arc<Self>) -> Pooled<PropertyCursor> {
        self.allocate()
    }

    /// Takes a relationship group cursor from the pool.
    pub fn allocate_relationship_group_cursor(self: &Arc<Self>) -> Pooled<RelationshipGroupCursor> {
        self.allocate()
    }

    /// Takes a node label index cursor from the pool.
    pub fn allocate_node_label_index_cursor(self: &Arc<Self>) -> Pooled<NodeLabelIndexCursor> {
        self.allocate()
    }

    /// Takes a node value index cursor from the pool.
    pub fn allocate_node_index_cursor(self: &Arc<Self>) -> Pooled<NodeIndexCursor> {
        self.allocate()
    }
}

macro_rules! shelve {
    ($cursor:ty, $field:ident) => {
        impl PooledCursor for $cursor {
            fn create(factory: &dyn StorageCursorFactory) -> Self {
                <$cursor>::new(factory)
            }

            fn close(&mut self) {
                <$cursor>::close(self);
            }

            fn shelf(pool: &CursorPool) -> &Mutex<Vec<Self>> {
                &pool.$field
            }
        }
    };
}

shelve!(NodeCursor, nodes);
shelve!(RelationshipScanCursor, relationship_scans);
shelve!(RelationshipTraversalCursor, relationship_traversals);
shelve!(PropertyCursor, properties);
shelve!(RelationshipGroupCursor, groups);
shelve!(NodeLabelIndexCursor, label_indexes);
shelve!(NodeIndexCursor, indexes);

/// Owning guard over a pooled cursor. Dropping it closes the cursor and
/// shelves it back on the pool.
pub struct Pooled<C: PooledCursor> {
    cursor: Option<C>,
    pool: Arc<CursorPool>,
}

impl<C: PooledCursor> Deref for Pooled<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.cursor.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<C: PooledCursor> DerefMut for Pooled<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.cursor.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<C: PooledCursor> Drop for Pooled<C> {
    fn drop(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
            C::shelf(&self.pool).lock().push(cursor);
        }
    }
}
