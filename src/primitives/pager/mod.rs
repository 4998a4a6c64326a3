//! Fixed-frame page cache and flush coordination.

mod cache;
mod flush;
mod frame;

pub use cache::{CacheOptions, CacheStats, PageCache, PinnedPage, DEFAULT_PAGE_SIZE};
pub use flush::{FlushEventSink, FlushSummary, NullFlushSink};
