//! Low-level primitives underneath the storage cursors.
//!
//! Includes the stamped page lock, page-granular I/O, and the fixed-frame
//! page cache with its flush coordinator.

/// Concurrency primitives.
///
/// The stamped lock offering optimistic-read, shared-read and
/// exclusive-write modes over a version token.
pub mod concurrency;

/// Page-granular I/O abstractions.
///
/// The page swapper seam between the cache and per-file storage.
pub mod io;

/// Fixed-frame page cache.
///
/// Frame pool, fault-in and eviction, and coordinated dirty-page flushing.
pub mod pager;
