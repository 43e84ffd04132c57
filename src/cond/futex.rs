//! Condition variable backend on a raw futex word
//!
//! Layout: a 32-bit wait/wake word toggling between idle and ready, a
//! waiter count, and a wait lock held only while a waiter is physically
//! parked. The wait lock makes a crashed parked waiter detectable: it is
//! robust, so the next process to touch it observes the dead owner and
//! reinitializes the primitive.

use std::ptr;

use libc::c_int;

use crate::cond::mutex::{raw_consistent, raw_init, raw_lock, raw_trylock, raw_unlock};
use crate::cond::{check_alignment, CondCell, CondOps, FutexState, SharedMutex};
use crate::error::{MetaError, Result};

const FUTEX_VAL_IDLE: u32 = 0;
const FUTEX_VAL_READY: u32 = 1;

/// Wrapper for syscall FUTEX_WAIT
///
/// Returns 0 when woken or the value changed, the errno otherwise
/// (`ETIMEDOUT` when `timeout` elapsed).
fn sys_futex_wait(uaddr: *mut u32, expected: u32, timeout: Option<&libc::timespec>) -> c_int {
    let ts = timeout.map_or(ptr::null(), |t| t as *const libc::timespec);
    let r = unsafe {
        libc::syscall(
            libc::SYS_futex,
            uaddr,
            libc::FUTEX_WAIT,
            expected,
            ts,
            ptr::null::<u32>(),
            0,
        )
    };
    if r == -1 {
        std::io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(libc::EINVAL)
    } else {
        0
    }
}

/// Wrapper for syscall FUTEX_WAKE
fn sys_futex_wake(uaddr: *mut u32, waiter_count: c_int) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            uaddr,
            libc::FUTEX_WAKE,
            waiter_count,
            ptr::null::<libc::timespec>(),
            ptr::null::<u32>(),
            0,
        );
    }
}

/// Reset the primitive for a recovering waiter
fn reset(state: *mut FutexState) {
    unsafe {
        // futex not ready
        (*state).word = FUTEX_VAL_IDLE;
        // remove all waiters except for the current one
        (*state).waiters = 1;
    }
}

/// futex backend
pub struct FutexCond;

impl CondOps for FutexCond {
    fn init(&self, cond: &CondCell, shared: bool, _robust: bool) -> Result<()> {
        check_alignment(cond)?;

        let state = cond.futex_ptr();
        unsafe {
            (*state).word = FUTEX_VAL_IDLE;
            (*state).waiters = 0;

            // if shared, always robust
            let r = raw_init(ptr::addr_of_mut!((*state).wait_lock), shared);
            if r != 0 {
                return Err(MetaError::System {
                    call: "pthread_mutex_init",
                    errno: r,
                });
            }
        }
        Ok(())
    }

    fn destroy(&self, cond: &CondCell) {
        unsafe {
            libc::pthread_mutex_destroy(ptr::addr_of_mut!((*cond.futex_ptr()).wait_lock));
        }
    }

    fn wait(&self, cond: &CondCell, mutex: &SharedMutex) -> c_int {
        wait_inner(cond, mutex, None)
    }

    fn timed_wait(&self, cond: &CondCell, mutex: &SharedMutex, timeout_ms: u32) -> c_int {
        let timeout = libc::timespec {
            tv_sec: (timeout_ms / 1000) as libc::time_t,
            tv_nsec: ((timeout_ms % 1000) * 1_000_000) as libc::c_long,
        };
        wait_inner(cond, mutex, Some(&timeout))
    }

    fn broadcast(&self, cond: &CondCell) {
        let state = cond.futex_ptr();
        unsafe {
            if (*state).waiters == 0 {
                // no waiters
                return;
            }

            // wake all the current waiters; there can be more parked than
            // the count says if a crashed waiter dropped the others
            (*state).word = FUTEX_VAL_READY;
            sys_futex_wake(ptr::addr_of_mut!((*state).word), c_int::MAX);
        }
    }

    fn make_consistent(&self, cond: &CondCell) {
        reset(cond.futex_ptr());
    }
}

fn wait_inner(cond: &CondCell, mutex: &SharedMutex, timeout: Option<&libc::timespec>) -> c_int {
    let state = cond.futex_ptr();

    unsafe {
        // new waiter
        (*state).waiters += 1;

        let wait_lock = ptr::addr_of_mut!((*state).wait_lock);

        // WAIT LOCK
        let wait_locked = match raw_trylock(wait_lock) {
            0 => true,
            libc::EOWNERDEAD => {
                // dead owner, make consistent
                let r = raw_consistent(wait_lock);
                if r != 0 {
                    return r;
                }
                reset(state);
                true
            }
            libc::EBUSY => {
                // not the first waiter, fine
                false
            }
            r => return r,
        };

        // MUTEX UNLOCK
        raw_unlock(mutex.as_ptr());

        // wait
        let rf = sys_futex_wait(ptr::addr_of_mut!((*state).word), FUTEX_VAL_IDLE, timeout);

        // MUTEX LOCK
        match raw_lock(mutex.as_ptr()) {
            0 => {}
            libc::EOWNERDEAD => {
                let r = raw_consistent(mutex.as_ptr());
                if r != 0 {
                    return r;
                }
                reset(state);
            }
            r => return r,
        }

        if wait_locked {
            // WAIT UNLOCK
            raw_unlock(wait_lock);
        }

        // woken, remove waiter (recovery can have dropped the count already,
        // a stale zero does not matter)
        if (*state).waiters != 0 {
            (*state).waiters -= 1;
            if (*state).waiters == 0 {
                (*state).word = FUTEX_VAL_IDLE;
            }
        }

        // EAGAIN means the word changed before parking, a valid wakeup
        if rf != 0 && rf != libc::EAGAIN {
            return rf;
        }
        0
    }
}
