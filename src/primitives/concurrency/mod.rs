#![allow(unsafe_code)]

//! Stamped page lock.
//!
//! One lock per page frame, with three modes: optimistic-read (issue a
//! version stamp, validate later), shared-read (blocks writers only) and
//! exclusive-write (blocks everyone). The version counter is odd exactly
//! while a writer holds the lock, so an optimistic stamp taken during a
//! write can never validate.

use std::sync::atomic::{fence, AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::lock_api::RawRwLock as _;
use parking_lot::RawRwLock;

/// Version-stamped reader/writer lock.
///
/// Misuse (releasing a mode that is not held, releasing with a stale
/// stamp) is an invariant violation and panics rather than returning an
/// error.
pub struct StampedLock {
    raw: RawRwLock,
    version: AtomicU64,
    shared: AtomicU32,
    writer: AtomicBool,
}

impl Default for StampedLock {
    fn default() -> Self {
        Self::new()
    }
}

impl StampedLock {
    /// Creates an unlocked lock with an even (valid) version.
    pub const fn new() -> Self {
        Self {
            raw: RawRwLock::INIT,
            version: AtomicU64::new(0),
            shared: AtomicU32::new(0),
            writer: AtomicBool::new(false),
        }
    }

    /// Issues an optimistic read stamp without blocking.
    ///
    /// The stamp is only meaningful through [`StampedLock::validate`]; a
    /// stamp issued while a writer holds the lock is odd and never
    /// validates.
    pub fn optimistic_read(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Validates an optimistic stamp: true iff no writer held the lock at
    /// issue time and none has acquired it since.
    pub fn validate(&self, stamp: u64) -> bool {
        fence(Ordering::Acquire);
        stamp & 1 == 0 && self.version.load(Ordering::Acquire) == stamp
    }

    /// Acquires the shared read lock, blocking only on exclusive holders.
    pub fn read(&self) -> u64 {
        self.raw.lock_shared();
        self.shared.fetch_add(1, Ordering::AcqRel);
        self.version.load(Ordering::Acquire)
    }

    /// Releases a shared read lock.
    pub fn unlock_read(&self, stamp: u64) {
        debug_assert_eq!(stamp & 1, 0, "read stamps are always even");
        let held = self.shared.fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
            count.checked_sub(1)
        });
        if held.is_err() {
            panic!("lock protocol violation: releasing a shared lock that is not held");
        }
        unsafe { self.raw.unlock_shared() };
    }

    /// Acquires the exclusive write lock, blocking until all readers and
    /// writers release.
    pub fn write(&self) -> u64 {
        self.raw.lock_exclusive();
        self.writer.store(true, Ordering::Release);
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Attempts to acquire the exclusive write lock without blocking.
    pub fn try_write(&self) -> Option<u64> {
        if !self.raw.try_lock_exclusive() {
            return None;
        }
        self.writer.store(true, Ordering::Release);
        Some(self.version.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Releases the exclusive write lock, returning the version to even.
    pub fn unlock_write(&self, stamp: u64) {
        if !self.writer.swap(false, Ordering::AcqRel) {
            panic!("lock protocol violation: releasing a write lock that is not held");
        }
        let current = self.version.load(Ordering::Acquire);
        if stamp & 1 != 1 || current != stamp {
            panic!("lock protocol violation: stale write stamp");
        }
        self.version.fetch_add(1, Ordering::AcqRel);
        unsafe { self.raw.unlock_exclusive() };
    }

    /// Whether a writer currently holds the lock.
    pub fn is_write_locked(&self) -> bool {
        self.writer.load(Ordering::Acquire)
    }

    /// Number of shared holders. Used for lock-discipline assertions.
    pub fn shared_count(&self) -> u32 {
        self.shared.load(Ordering::Acquire)
    }
}
