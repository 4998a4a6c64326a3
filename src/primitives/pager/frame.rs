#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::primitives::concurrency::StampedLock;
use crate::types::FileId;

/// Current file+page mapping of a frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Binding {
    pub file: FileId,
    pub page_index: u64,
}

/// One fixed-size page frame.
///
/// The buffer is guarded by the frame's stamped lock: bytes are read only
/// under a shared or exclusive stamp (or copied optimistically and
/// validated afterwards) and written only under an exclusive stamp. The
/// binding is mutated only while holding both the cache's table lock and
/// the frame's exclusive lock.
pub(crate) struct Frame {
    pub(crate) lock: StampedLock,
    buf: UnsafeCell<Box<[u8]>>,
    pub(crate) dirty: AtomicBool,
    pub(crate) pin_count: AtomicU32,
    pub(crate) referenced: AtomicBool,
    pub(crate) binding: Mutex<Option<Binding>>,
}

// The unsafe cell is only reached through the lock protocol above.
unsafe impl Send for Frame {}
unsafe impl Sync for Frame {}

impl Frame {
    pub(crate) fn new(page_size: usize) -> Self {
        Self {
            lock: StampedLock::new(),
            buf: UnsafeCell::new(vec![0u8; page_size].into_boxed_slice()),
            dirty: AtomicBool::new(false),
            pin_count: AtomicU32::new(0),
            referenced: AtomicBool::new(false),
            binding: Mutex::new(None),
        }
    }

    /// Immutable view of the page bytes. Requires a held shared or
    /// exclusive lock.
    pub(crate) fn data(&self) -> &[u8] {
        assert!(
            self.lock.shared_count() > 0 || self.lock.is_write_locked(),
            "page bytes read without a held lock"
        );
        unsafe { &*self.buf.get() }
    }

    /// Mutable view of the page bytes. Requires the held exclusive lock.
    #[allow(clippy::mut_from_ref)]
    pub(crate) fn data_mut(&self) -> &mut [u8] {
        assert!(
            self.lock.is_write_locked(),
            "page bytes written without the exclusive lock"
        );
        unsafe { &mut *self.buf.get() }
    }

    /// Copies the page bytes without holding any lock. The copy is only
    /// trustworthy if the caller's optimistic stamp validates afterwards.
    pub(crate) fn optimistic_copy(&self, dst: &mut [u8]) {
        let src = self.buf.get();
        unsafe {
            let len = (&*src).len().min(dst.len());
            std::ptr::copy_nonoverlapping((&*src).as_ptr(), dst.as_mut_ptr(), len);
        }
    }

    pub(crate) fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unpin(&self) {
        let held = self
            .pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
        if held.is_err() {
            panic!("unpin of a frame with zero pins");
        }
    }

    pub(crate) fn is_pinned(&self) -> bool {
        self.pin_count.load(Ordering::Acquire) > 0
    }
}
