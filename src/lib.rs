//! Umbra: the read/storage core of a transactional graph kernel.
//!
//! Two tightly coupled subsystems live here: a concurrent fixed-frame page
//! cache serving file-backed pages under stamped locking, and the
//! transaction-state overlay protocol that read cursors use to present one
//! consistent view over committed storage plus a transaction's own
//! uncommitted changes.

pub mod cursor;
pub mod primitives;
pub mod security;
pub mod storage;
pub mod tracer;
pub mod txn;
pub mod types;
