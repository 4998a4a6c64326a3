//! Overlay cursors.
//!
//! Every read goes through a cursor that merges three sources into one
//! iteration: the transaction's uncommitted additions first, then
//! committed storage filtered by the transaction's deletions and by the
//! access mode. Cursors are pooled; dropping a [`Pooled`] guard closes
//! the cursor and shelves it for reuse.

mod group;
mod index;
mod node;
mod pool;
mod property;
mod relationship;

pub use group::RelationshipGroupCursor;
pub use index::{NodeIndexCursor, NodeLabelIndexCursor};
pub use node::NodeCursor;
pub use pool::{CursorPool, Pooled, PooledCursor};
pub use property::PropertyCursor;
pub use relationship::{RelationshipScanCursor, RelationshipTraversalCursor};

/// Whether the bound transaction held uncommitted changes at cursor
/// initialization. Decided exactly once per initialization so a cursor's
/// merge strategy never flips mid-iteration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HasChanges {
    /// Cursor is closed; no transaction bound.
    Unknown,
    /// The transaction had changes when the cursor was initialized.
    Yes,
    /// The transaction had no changes when the cursor was initialized.
    No,
}
