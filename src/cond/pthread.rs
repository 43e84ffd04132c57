//! Condition variable backend on the platform's process-shared
//! `pthread_cond_t`

use libc::c_int;
use tracing::warn;

use crate::cond::{check_alignment, CondCell, CondOps, SharedMutex};
use crate::error::{MetaError, Result};

/// pthread backend
pub struct PthreadCond;

impl CondOps for PthreadCond {
    fn init(&self, cond: &CondCell, shared: bool, _robust: bool) -> Result<()> {
        check_alignment(cond)?;

        unsafe {
            if shared {
                let mut attr: libc::pthread_condattr_t = std::mem::zeroed();
                let r = libc::pthread_condattr_init(&mut attr);
                if r != 0 {
                    return Err(MetaError::System {
                        call: "pthread_condattr_init",
                        errno: r,
                    });
                }
                let r = libc::pthread_condattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
                if r != 0 {
                    libc::pthread_condattr_destroy(&mut attr);
                    return Err(MetaError::System {
                        call: "pthread_condattr_setpshared",
                        errno: r,
                    });
                }

                let r = libc::pthread_cond_init(cond.pthread_ptr(), &attr);
                libc::pthread_condattr_destroy(&mut attr);
                if r != 0 {
                    return Err(MetaError::System {
                        call: "pthread_cond_init",
                        errno: r,
                    });
                }
            } else {
                let r = libc::pthread_cond_init(cond.pthread_ptr(), std::ptr::null());
                if r != 0 {
                    return Err(MetaError::System {
                        call: "pthread_cond_init",
                        errno: r,
                    });
                }
            }
        }

        Ok(())
    }

    fn destroy(&self, cond: &CondCell) {
        unsafe {
            libc::pthread_cond_destroy(cond.pthread_ptr());
        }
    }

    fn wait(&self, cond: &CondCell, mutex: &SharedMutex) -> c_int {
        unsafe { libc::pthread_cond_wait(cond.pthread_ptr(), mutex.as_ptr()) }
    }

    fn timed_wait(&self, cond: &CondCell, mutex: &SharedMutex, timeout_ms: u32) -> c_int {
        let deadline = abs_realtime(timeout_ms);
        unsafe { libc::pthread_cond_timedwait(cond.pthread_ptr(), mutex.as_ptr(), &deadline) }
    }

    fn broadcast(&self, cond: &CondCell) {
        unsafe {
            libc::pthread_cond_broadcast(cond.pthread_ptr());
        }
    }

    fn make_consistent(&self, cond: &CondCell) {
        // The crashed originator was in all likelihood parked on the cond
        // var, which is corrupted now; destroying it would block, so
        // reinitialize it in place.
        if let Err(e) = self.init(cond, true, true) {
            warn!("Condition variable recovery failed: {}", e);
        }
    }
}

/// Absolute CLOCK_REALTIME deadline `timeout_ms` from now
fn abs_realtime(timeout_ms: u32) -> libc::timespec {
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_REALTIME, &mut now);
    }

    now.tv_sec += (timeout_ms / 1000) as libc::time_t;
    now.tv_nsec += ((timeout_ms % 1000) * 1_000_000) as libc::c_long;
    if now.tv_nsec >= 1_000_000_000 {
        now.tv_sec += 1;
        now.tv_nsec -= 1_000_000_000;
    }
    now
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_normalization() {
        let ts = abs_realtime(1500);
        assert!(ts.tv_nsec < 1_000_000_000);
        assert!(ts.tv_sec > 0);
    }
}
