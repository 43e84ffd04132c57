//! Cross-process wait/notify primitive
//!
//! A condition variable living in memory mapped by unrelated processes, any
//! of which may terminate abnormally while holding associated state. All
//! shared-memory-resident state in the datastore, including the metadata
//! store's own serialization lock, is built on this primitive.
//!
//! Two interchangeable backends satisfy the same contract and are selected
//! at initialization, not through scattered conditionals: one sits on the
//! platform's process-shared condition variable, the other on a 32-bit
//! futex word with a waiter count guarded by a lock held only while
//! physically parking. [`CondCell`] is the shared-memory storage both
//! operate on; callers place it in a shared mapping themselves.
//!
//! Recovery: when a holder of the associated [`SharedMutex`] dies, the next
//! acquirer observes [`Acquired::OwnerDied`] and must call
//! [`SharedCond::make_consistent`] before any further wait or broadcast, or
//! all subsequent waiters risk blocking indefinitely.

pub mod futex;
pub mod mutex;
pub mod pthread;

pub use mutex::{Acquired, SharedMutex};

use std::cell::UnsafeCell;

use libc::c_int;
use serde::{Deserialize, Serialize};

use crate::error::{MetaError, Result};

/// Required alignment of the wait word for atomic wait/wake operations
pub(crate) const COND_ALIGN: usize = 4;

/// Futex backend state: wait word, waiter count, and the lock held while a
/// waiter is physically parked
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct FutexState {
    pub(crate) word: u32,
    pub(crate) waiters: u32,
    pub(crate) wait_lock: libc::pthread_mutex_t,
}

/// Backend-specific storage overlay
#[repr(C)]
pub(crate) union CondState {
    pub(crate) pthread: libc::pthread_cond_t,
    pub(crate) futex: FutexState,
}

/// Shared-memory resident condition variable storage
///
/// Both backends operate on the same cell; all attached processes must be
/// configured with the same backend.
#[repr(C)]
pub struct CondCell {
    state: UnsafeCell<CondState>,
}

// Only touched through the backend operations, which synchronize.
unsafe impl Send for CondCell {}
unsafe impl Sync for CondCell {}

impl CondCell {
    /// Uninitialized storage; initialize through [`SharedCond::init`]
    pub fn new() -> Self {
        Self {
            state: UnsafeCell::new(unsafe { std::mem::zeroed() }),
        }
    }

    pub(crate) fn pthread_ptr(&self) -> *mut libc::pthread_cond_t {
        unsafe { std::ptr::addr_of_mut!((*self.state.get()).pthread) }
    }

    pub(crate) fn futex_ptr(&self) -> *mut FutexState {
        unsafe { std::ptr::addr_of_mut!((*self.state.get()).futex) }
    }
}

impl Default for CondCell {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CondCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CondCell").finish_non_exhaustive()
    }
}

/// Backend selection, from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CondBackend {
    /// Process-shared `pthread_cond_t`
    Pthread,
    /// 32-bit futex word plus waiter count
    Futex,
}

impl Default for CondBackend {
    fn default() -> Self {
        CondBackend::Futex
    }
}

/// Capability interface both backends implement
///
/// `wait`/`timed_wait` return the raw platform status instead of translating
/// it; interpretation is the caller's (0 success, `ETIMEDOUT` on timeout,
/// other errno values on failure).
pub trait CondOps: Send + Sync {
    fn init(&self, cond: &CondCell, shared: bool, robust: bool) -> Result<()>;
    fn destroy(&self, cond: &CondCell);
    fn wait(&self, cond: &CondCell, mutex: &SharedMutex) -> c_int;
    fn timed_wait(&self, cond: &CondCell, mutex: &SharedMutex, timeout_ms: u32) -> c_int;
    fn broadcast(&self, cond: &CondCell);
    fn make_consistent(&self, cond: &CondCell);
}

/// Operations for a configured backend
pub fn cond_ops(backend: CondBackend) -> &'static dyn CondOps {
    match backend {
        CondBackend::Pthread => &pthread::PthreadCond,
        CondBackend::Futex => &futex::FutexCond,
    }
}

/// A cell paired with its configured backend
#[derive(Clone, Copy)]
pub struct SharedCond<'a> {
    cell: &'a CondCell,
    ops: &'static dyn CondOps,
}

impl<'a> SharedCond<'a> {
    /// Attach to a cell with the configured backend
    pub fn new(cell: &'a CondCell, backend: CondBackend) -> Self {
        Self {
            cell,
            ops: cond_ops(backend),
        }
    }

    /// Prepare the primitive
    ///
    /// Fails with a system error when the underlying synchronization object
    /// cannot be configured, or with an internal error when the cell address
    /// violates the platform's atomic wait/wake alignment.
    pub fn init(&self, shared: bool, robust: bool) -> Result<()> {
        self.ops.init(self.cell, shared, robust)
    }

    /// Release resources; no waiters may remain
    pub fn destroy(&self) {
        self.ops.destroy(self.cell);
    }

    /// Block until notified, atomically releasing `mutex` while blocked and
    /// reacquiring it before returning
    pub fn wait(&self, mutex: &SharedMutex) -> c_int {
        self.ops.wait(self.cell, mutex)
    }

    /// As [`SharedCond::wait`], returning `ETIMEDOUT` when unnotified within
    /// `timeout_ms`
    pub fn timed_wait(&self, mutex: &SharedMutex, timeout_ms: u32) -> c_int {
        self.ops.timed_wait(self.cell, mutex, timeout_ms)
    }

    /// Wake every blocked waiter
    pub fn broadcast(&self) {
        self.ops.broadcast(self.cell);
    }

    /// Recover a primitive abandoned by a crashed holder
    ///
    /// A live waiter may already be parked inside, so the primitive is
    /// reinitialized in place as shared and robust instead of destroyed and
    /// recreated. Errors are logged, never propagated; this runs during
    /// best-effort crash recovery and must not fail the recovering process.
    pub fn make_consistent(&self) {
        self.ops.make_consistent(self.cell);
    }
}

impl std::fmt::Debug for SharedCond<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCond").finish_non_exhaustive()
    }
}

/// Check the cell's address alignment for atomic wait/wake operations;
/// checked explicitly rather than risking undefined behavior
pub(crate) fn check_alignment(cond: &CondCell) -> Result<()> {
    if (cond as *const CondCell as usize) % COND_ALIGN != 0 {
        return Err(MetaError::internal(
            "condition variable address not aligned",
        ));
    }
    Ok(())
}
