use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::cache::PageCache;
use super::frame::Frame;
use crate::types::{FileId, Result, UmbraError};

/// Sink for per-page flush completions, aggregated per major flush pass.
pub trait FlushEventSink: Send + Sync {
    /// One page was written back: byte count, I/O count and elapsed time.
    fn page_flushed(
        &self,
        file: FileId,
        page_index: u64,
        bytes: usize,
        io_ops: u64,
        elapsed: Duration,
    );
}

/// Sink that discards all flush events.
pub struct NullFlushSink;

impl FlushEventSink for NullFlushSink {
    fn page_flushed(&self, _: FileId, _: u64, _: usize, _: u64, _: Duration) {}
}

/// Outcome of one major flush pass over a file.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FlushSummary {
    /// Pages written back during the pass.
    pub pages_flushed: u64,
    /// Bytes written back during the pass.
    pub bytes_written: u64,
}

impl PageCache {
    /// Writes back every dirty page of `file`, reporting each completion
    /// to `sink`.
    ///
    /// Each page is copied out under its shared read lock: flushing only
    /// observes bytes, so it coexists with concurrent readers but excludes
    /// an in-progress writer, and no torn page content ever reaches the
    /// swapper. The first I/O error aborts the remainder of the pass;
    /// pages not yet visited stay dirty for the next scheduled pass, and
    /// a failed sync re-dirties the pages this pass had written.
    pub fn flush_file(&self, file: FileId, sink: &dyn FlushEventSink) -> Result<FlushSummary> {
        let (swapper, dirty) = {
            let inner = self.inner.lock();
            let swapper = inner.swapper(file)?;
            let dirty: Vec<(u64, Arc<Frame>)> = inner
                .page_table
                .iter()
                .filter(|((f, _), _)| *f == file)
                .map(|((_, page_index), &idx)| (*page_index, Arc::clone(&self.frames[idx])))
                .filter(|(_, frame)| frame.dirty.load(Ordering::Acquire))
                .collect();
            (swapper, dirty)
        };

        let mut summary = FlushSummary::default();
        let mut written: Vec<(u64, Arc<Frame>)> = Vec::with_capacity(dirty.len());
        for (page_index, frame) in dirty {
            let stamp = frame.lock.read();
            // The frame may have been evicted and rebound between the
            // table snapshot and this lock; skip it if so.
            let still_ours = *frame.binding.lock()
                == Some(super::frame::Binding { file, page_index })
                && frame.dirty.load(Ordering::Acquire);
            if !still_ours {
                frame.lock.unlock_read(stamp);
                continue;
            }
            let started = Instant::now();
            let result = swapper.write_page(page_index, frame.data());
            match result {
                Ok(()) => {
                    frame.dirty.store(false, Ordering::Release);
                    frame.lock.unlock_read(stamp);
                }
                Err(err) => {
                    frame.lock.unlock_read(stamp);
                    warn!(file = file.0, page = page_index, error = %err, "cache.flush.aborted");
                    return Err(UmbraError::Flush {
                        file,
                        page: page_index,
                        source: Box::new(err),
                    });
                }
            }
            sink.page_flushed(file, page_index, self.page_size(), 1, started.elapsed());
            summary.pages_flushed += 1;
            summary.bytes_written += self.page_size() as u64;
            written.push((page_index, frame));
        }
        if let Err(err) = swapper.sync() {
            // The written pages are not durable without the sync; mark
            // them dirty again so the next pass retries them.
            for (page_index, frame) in &written {
                let still_ours = *frame.binding.lock()
                    == Some(super::frame::Binding {
                        file,
                        page_index: *page_index,
                    });
                if still_ours {
                    frame.dirty.store(true, Ordering::Release);
                }
            }
            warn!(file = file.0, error = %err, "cache.flush.aborted");
            return Err(err);
        }

        if summary.pages_flushed > 0 {
            let mut inner = self.inner.lock();
            inner.stats.flushed_pages += summary.pages_flushed;
        }
        debug!(
            file = file.0,
            pages = summary.pages_flushed,
            bytes = summary.bytes_written,
            "cache.flush.pass"
        );
        Ok(summary)
    }
}
