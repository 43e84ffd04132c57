//! Robust, process-shared mutex
//!
//! Wraps a `pthread_mutex_t` placed in memory shared between unrelated
//! processes. Shared mutexes are always robust: any holder may be killed
//! mid-critical-section, and the next acquirer is told so it can run the
//! recovery handshake on the associated condition variable before waiting
//! or broadcasting again.

use std::cell::UnsafeCell;

use libc::c_int;

use crate::error::{MetaError, Result};

/// Initialize a raw mutex, process-shared and robust when `shared`
pub(crate) unsafe fn raw_init(mutex: *mut libc::pthread_mutex_t, shared: bool) -> c_int {
    if !shared {
        return libc::pthread_mutex_init(mutex, std::ptr::null());
    }

    let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
    let mut r = libc::pthread_mutexattr_init(&mut attr);
    if r != 0 {
        return r;
    }
    r = libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
    if r == 0 {
        // if shared, always robust
        r = libc::pthread_mutexattr_setrobust(&mut attr, libc::PTHREAD_MUTEX_ROBUST);
    }
    if r == 0 {
        r = libc::pthread_mutex_init(mutex, &attr);
    }
    libc::pthread_mutexattr_destroy(&mut attr);
    r
}

pub(crate) unsafe fn raw_lock(mutex: *mut libc::pthread_mutex_t) -> c_int {
    libc::pthread_mutex_lock(mutex)
}

pub(crate) unsafe fn raw_trylock(mutex: *mut libc::pthread_mutex_t) -> c_int {
    libc::pthread_mutex_trylock(mutex)
}

pub(crate) unsafe fn raw_unlock(mutex: *mut libc::pthread_mutex_t) -> c_int {
    libc::pthread_mutex_unlock(mutex)
}

pub(crate) unsafe fn raw_consistent(mutex: *mut libc::pthread_mutex_t) -> c_int {
    libc::pthread_mutex_consistent(mutex)
}

/// How a lock acquisition completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// Normal acquisition
    Clean,
    /// The previous holder died while holding the mutex; the mutex has been
    /// made consistent, but any condition variable associated with it must
    /// be recovered with `make_consistent` before further waits/broadcasts
    OwnerDied,
}

/// A mutex residing in caller-provided (typically shared) memory
#[repr(C)]
pub struct SharedMutex {
    inner: UnsafeCell<libc::pthread_mutex_t>,
}

// The cell is only touched through pthread calls, which provide the
// synchronization.
unsafe impl Send for SharedMutex {}
unsafe impl Sync for SharedMutex {}

impl SharedMutex {
    /// Uninitialized storage; call [`SharedMutex::init`] before use
    pub fn new() -> Self {
        Self {
            inner: UnsafeCell::new(unsafe { std::mem::zeroed() }),
        }
    }

    /// Initialize, process-shared and robust when `shared`
    pub fn init(&self, shared: bool) -> Result<()> {
        let r = unsafe { raw_init(self.inner.get(), shared) };
        if r != 0 {
            return Err(MetaError::System {
                call: "pthread_mutex_init",
                errno: r,
            });
        }
        Ok(())
    }

    /// Block until the mutex is acquired
    pub fn lock(&self) -> Result<Acquired> {
        match unsafe { raw_lock(self.inner.get()) } {
            0 => Ok(Acquired::Clean),
            libc::EOWNERDEAD => {
                let r = unsafe { raw_consistent(self.inner.get()) };
                if r != 0 {
                    return Err(MetaError::System {
                        call: "pthread_mutex_consistent",
                        errno: r,
                    });
                }
                Ok(Acquired::OwnerDied)
            }
            r => Err(MetaError::System {
                call: "pthread_mutex_lock",
                errno: r,
            }),
        }
    }

    /// Acquire the mutex if free, `None` when contended
    pub fn try_lock(&self) -> Result<Option<Acquired>> {
        match unsafe { raw_trylock(self.inner.get()) } {
            0 => Ok(Some(Acquired::Clean)),
            libc::EBUSY => Ok(None),
            libc::EOWNERDEAD => {
                let r = unsafe { raw_consistent(self.inner.get()) };
                if r != 0 {
                    return Err(MetaError::System {
                        call: "pthread_mutex_consistent",
                        errno: r,
                    });
                }
                Ok(Some(Acquired::OwnerDied))
            }
            r => Err(MetaError::System {
                call: "pthread_mutex_trylock",
                errno: r,
            }),
        }
    }

    /// Release the mutex
    pub fn unlock(&self) {
        unsafe {
            raw_unlock(self.inner.get());
        }
    }

    /// Release resources; the mutex must be unlocked
    pub fn destroy(&self) {
        unsafe {
            libc::pthread_mutex_destroy(self.inner.get());
        }
    }

    pub(crate) fn as_ptr(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get()
    }
}

impl Default for SharedMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SharedMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMutex").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_unlock_cycle() {
        let mutex = SharedMutex::new();
        mutex.init(false).unwrap();
        assert_eq!(mutex.lock().unwrap(), Acquired::Clean);
        mutex.unlock();
        mutex.destroy();
    }

    #[test]
    fn test_try_lock_contended() {
        let mutex = SharedMutex::new();
        mutex.init(true).unwrap();
        assert_eq!(mutex.try_lock().unwrap(), Some(Acquired::Clean));
        // same-thread retry on a non-recursive mutex reports busy
        assert_eq!(mutex.try_lock().unwrap(), None);
        mutex.unlock();
        mutex.destroy();
    }
}
