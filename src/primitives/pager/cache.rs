use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::frame::{Binding, Frame};
use crate::primitives::io::PageSwapper;
use crate::types::{FileId, Result, UmbraError};

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Page cache configuration, constructed once before startup.
#[derive(Clone, Debug)]
pub struct CacheOptions {
    /// Size of each page in bytes.
    pub page_size: usize,
    /// Number of frames in the fixed pool.
    pub frame_count: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            frame_count: 128,
        }
    }
}

/// Counters describing cache activity.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    /// Pins satisfied from an existing mapping.
    pub hits: u64,
    /// Pins that had to fault the page in.
    pub misses: u64,
    /// Frames rebound to a different page.
    pub evictions: u64,
    /// Dirty pages written back during eviction.
    pub dirty_writebacks: u64,
    /// Pages written back by flush passes.
    pub flushed_pages: u64,
}

pub(crate) struct CacheInner {
    pub(crate) page_table: FxHashMap<(FileId, u64), usize>,
    pub(crate) files: Vec<Option<Arc<dyn PageSwapper>>>,
    clock_hand: usize,
    pub(crate) stats: CacheStats,
}

impl CacheInner {
    pub(crate) fn swapper(&self, file: FileId) -> Result<Arc<dyn PageSwapper>> {
        self.files
            .get(file.0 as usize)
            .and_then(|slot| slot.clone())
            .ok_or(UmbraError::Invalid("file is not mapped"))
    }
}

/// Concurrent fixed-frame page cache.
///
/// Serves file-backed pages under the stamped lock protocol; pages are
/// faulted in on first access and evicted (flushing first when dirty) by
/// a second-chance clock over unpinned frames.
pub struct PageCache {
    pub(crate) frames: Box<[Arc<Frame>]>,
    page_size: usize,
    pub(crate) inner: Mutex<CacheInner>,
}

impl PageCache {
    /// Creates a cache with a fixed pool of `options.frame_count` frames.
    pub fn new(options: CacheOptions) -> Self {
        let count = options.frame_count.max(1);
        let frames = (0..count)
            .map(|_| Arc::new(Frame::new(options.page_size)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            frames,
            page_size: options.page_size,
            inner: Mutex::new(CacheInner {
                page_table: FxHashMap::default(),
                files: Vec::new(),
                clock_hand: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Returns the page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Maps a file into the cache and returns its identifier.
    pub fn map_file(&self, swapper: Arc<dyn PageSwapper>) -> FileId {
        let mut inner = self.inner.lock();
        let file = FileId(inner.files.len() as u32);
        inner.files.push(Some(swapper));
        debug!(file = file.0, "cache.map_file");
        file
    }

    /// Unmaps a file: flushes its dirty pages, drops its mappings and
    /// closes the swapper. Fails if any of its pages is still pinned.
    pub fn unmap_file(&self, file: FileId) -> Result<()> {
        self.flush_file(file, &super::flush::NullFlushSink)?;
        let swapper = {
            let mut inner = self.inner.lock();
            let mapped: Vec<usize> = inner
                .page_table
                .iter()
                .filter(|((f, _), _)| *f == file)
                .map(|(_, &idx)| idx)
                .collect();
            if mapped.iter().any(|&idx| self.frames[idx].is_pinned()) {
                return Err(UmbraError::Invalid("file has pinned pages"));
            }
            for idx in mapped {
                let frame = &self.frames[idx];
                let stamp = frame.lock.write();
                *frame.binding.lock() = None;
                frame.dirty.store(false, Ordering::Release);
                frame.lock.unlock_write(stamp);
            }
            inner.page_table.retain(|(f, _), _| *f != file);
            inner.files[file.0 as usize].take()
        };
        match swapper {
            Some(swapper) => swapper.close(),
            None => Err(UmbraError::Invalid("file is not mapped")),
        }
    }

    /// Pins the page at `(file, page_index)`, faulting it in if unmapped.
    ///
    /// The returned pin keeps the frame's mapping stable; lock acquisition
    /// happens through the pin. I/O failures during fault-in (including an
    /// eviction-triggered flush) abort only this request.
    pub fn pin(&self, file: FileId, page_index: u64) -> Result<PinnedPage> {
        let key = (file, page_index);
        let mut inner = self.inner.lock();
        if let Some(&idx) = inner.page_table.get(&key) {
            let frame = &self.frames[idx];
            frame.referenced.store(true, Ordering::Release);
            frame.pin();
            inner.stats.hits += 1;
            return Ok(PinnedPage {
                frame: Arc::clone(frame),
                file,
                page_index,
            });
        }
        inner.stats.misses += 1;
        let swapper = inner.swapper(file)?;
        let (inner, idx, stamp) = self.claim_frame(inner)?;
        let frame = Arc::clone(&self.frames[idx]);
        // The mapping is published only once the load succeeds; the bound,
        // pinned frame keeps other fault-ins from claiming it meanwhile.
        *frame.binding.lock() = Some(Binding { file, page_index });
        frame.referenced.store(true, Ordering::Release);
        frame.pin();
        drop(inner);

        debug!(file = file.0, page = page_index, "cache.fault_in");
        match swapper.read_page(page_index, frame.data_mut()) {
            Ok(()) => {
                let mut inner = self.inner.lock();
                if let Some(&winner) = inner.page_table.get(&key) {
                    // A concurrent fault-in of the same page published
                    // first; hand this request over to its frame.
                    let theirs = Arc::clone(&self.frames[winner]);
                    theirs.referenced.store(true, Ordering::Release);
                    theirs.pin();
                    inner.stats.hits += 1;
                    drop(inner);
                    *frame.binding.lock() = None;
                    frame.unpin();
                    frame.lock.unlock_write(stamp);
                    return Ok(PinnedPage {
                        frame: theirs,
                        file,
                        page_index,
                    });
                }
                inner.page_table.insert(key, idx);
                drop(inner);
                frame.lock.unlock_write(stamp);
                Ok(PinnedPage {
                    frame,
                    file,
                    page_index,
                })
            }
            Err(err) => {
                warn!(file = file.0, page = page_index, error = %err, "cache.fault_in.read_failed");
                *frame.binding.lock() = None;
                frame.unpin();
                frame.lock.unlock_write(stamp);
                Err(err)
            }
        }
    }

    /// Returns a snapshot of cache counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    /// Finds a frame for a new mapping: a free frame if one exists,
    /// otherwise a clock (second-chance) victim. Returns the frame index
    /// with its exclusive lock held and any previous mapping removed. The
    /// guard is released around a dirty victim's write-back so other pins
    /// can proceed during the I/O, and handed back reacquired.
    fn claim_frame<'a>(
        &'a self,
        mut inner: MutexGuard<'a, CacheInner>,
    ) -> Result<(MutexGuard<'a, CacheInner>, usize, u64)> {
        for (idx, frame) in self.frames.iter().enumerate() {
            if frame.binding.lock().is_none() && !frame.is_pinned() {
                if let Some(stamp) = frame.lock.try_write() {
                    if frame.binding.lock().is_none() {
                        return Ok((inner, idx, stamp));
                    }
                    frame.lock.unlock_write(stamp);
                }
            }
        }
        // Two full sweeps: the first clears reference bits, the second can
        // then reclaim any frame that stayed unreferenced.
        for _ in 0..self.frames.len() * 2 {
            let idx = inner.clock_hand;
            inner.clock_hand = (inner.clock_hand + 1) % self.frames.len();
            let frame = &self.frames[idx];
            if frame.is_pinned() {
                continue;
            }
            if frame.referenced.swap(false, Ordering::AcqRel) {
                continue;
            }
            let Some(stamp) = frame.lock.try_write() else {
                continue;
            };
            if frame.is_pinned() {
                frame.lock.unlock_write(stamp);
                continue;
            }
            let binding = *frame.binding.lock();
            if let Some(old) = binding {
                if frame.dirty.load(Ordering::Acquire) {
                    let swapper = match inner.swapper(old.file) {
                        Ok(swapper) => swapper,
                        Err(err) => {
                            frame.lock.unlock_write(stamp);
                            return Err(err);
                        }
                    };
                    drop(inner);
                    let written = swapper.write_page(old.page_index, frame.data());
                    inner = self.inner.lock();
                    if let Err(err) = written {
                        warn!(
                            file = old.file.0,
                            page = old.page_index,
                            error = %err,
                            "cache.evict.flush_failed"
                        );
                        frame.lock.unlock_write(stamp);
                        return Err(UmbraError::Flush {
                            file: old.file,
                            page: old.page_index,
                            source: Box::new(err),
                        });
                    }
                    frame.dirty.store(false, Ordering::Release);
                    inner.stats.dirty_writebacks += 1;
                    if frame.is_pinned() {
                        // The old page was pinned again while the guard was
                        // released; it stays resident.
                        frame.lock.unlock_write(stamp);
                        continue;
                    }
                }
                inner.page_table.remove(&(old.file, old.page_index));
                *frame.binding.lock() = None;
                inner.stats.evictions += 1;
                debug!(file = old.file.0, page = old.page_index, "cache.evict");
            }
            return Ok((inner, idx, stamp));
        }
        Err(UmbraError::Invalid("no evictable frame in the pool"))
    }
}

/// A pinned page: a stable mapping plus the per-page lock operations.
///
/// Dropping the pin releases the frame for eviction; any lock acquired
/// through the pin must be released before the pin is dropped.
pub struct PinnedPage {
    frame: Arc<Frame>,
    file: FileId,
    page_index: u64,
}

impl PinnedPage {
    /// File this page belongs to.
    pub fn file(&self) -> FileId {
        self.file
    }

    /// File-local page index.
    pub fn page_index(&self) -> u64 {
        self.page_index
    }

    /// Issues an optimistic read stamp.
    pub fn optimistic_read(&self) -> u64 {
        self.frame.lock.optimistic_read()
    }

    /// Validates an optimistic stamp.
    pub fn validate(&self, stamp: u64) -> bool {
        self.frame.lock.validate(stamp)
    }

    /// Copies the page bytes without locking, then validates `stamp`.
    /// The copy must be discarded when this returns false.
    pub fn optimistic_copy(&self, stamp: u64, dst: &mut [u8]) -> bool {
        self.frame.optimistic_copy(dst);
        self.validate(stamp)
    }

    /// Acquires the shared read lock.
    pub fn read_lock(&self) -> u64 {
        self.frame.lock.read()
    }

    /// Releases the shared read lock.
    pub fn unlock_read(&self, stamp: u64) {
        self.frame.lock.unlock_read(stamp);
    }

    /// Acquires the exclusive write lock.
    pub fn write_lock(&self) -> u64 {
        self.frame.lock.write()
    }

    /// Releases the exclusive write lock, marking the page dirty when the
    /// holder modified it.
    pub fn unlock_write(&self, stamp: u64, mark_dirty: bool) {
        if mark_dirty {
            self.frame.dirty.store(true, Ordering::Release);
        }
        self.frame.lock.unlock_write(stamp);
    }

    /// Whether the page has unpersisted modifications.
    pub fn is_dirty(&self) -> bool {
        self.frame.dirty.load(Ordering::Acquire)
    }

    /// Page bytes; requires a held shared or exclusive lock.
    pub fn data(&self) -> &[u8] {
        self.frame.data()
    }

    /// Mutable page bytes; requires the held exclusive lock.
    #[allow(clippy::mut_from_ref)]
    pub fn data_mut(&self) -> &mut [u8] {
        self.frame.data_mut()
    }
}

impl Drop for PinnedPage {
    fn drop(&mut self) {
        self.frame.unpin();
    }
}
