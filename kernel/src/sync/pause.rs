// SPDX-License-Identifier: MPL-2.0

use core::sync::atomic::{AtomicBool, Ordering};

use super::{WaitQueue, Waiter, Waker};
use crate::prelude::*;

/// A pending-signal flag that can interrupt a paused thread.
///
/// The flag stays raised until [`SigPending::clear`] is called, so every
/// interruptible wait entered while it is raised fails with `EINTR`.
#[derive(Debug, Default)]
pub struct SigPending {
    pending: AtomicBool,
    // The waker of the wait currently observing this flag, if any.
    observer: Mutex<Option<Arc<Waker>>>,
}

impl SigPending {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag and wakes up the thread paused on it.
    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
        let observer = self.observer.lock().clone();
        if let Some(waker) = observer {
            waker.wake_up();
        }
    }

    pub fn clear(&self) {
        self.pending.store(false, Ordering::Relaxed);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    fn check(&self) -> Result<()> {
        if self.is_pending() {
            return_errno_with_message!(Errno::EINTR, "the current thread is interrupted by a signal");
        }
        Ok(())
    }

    fn observe(&self, waker: Arc<Waker>) -> ObserveGuard<'_> {
        *self.observer.lock() = Some(waker);
        ObserveGuard { sig: self }
    }
}

struct ObserveGuard<'a> {
    sig: &'a SigPending,
}

impl Drop for ObserveGuard<'_> {
    fn drop(&mut self) {
        self.sig.observer.lock().take();
    }
}

/// Interruptible waiting.
///
/// This is the signal-aware counterpart of [`WaitQueue::wait_until`]: the wait
/// ends with `EINTR` once `sig` is raised and with `ETIME` once the timeout, if
/// any, elapses.
pub trait Pause {
    /// Pauses until the condition is met or the thread is interrupted.
    fn pause_until<F, R>(&self, sig: &SigPending, cond: F) -> Result<R>
    where
        F: FnMut() -> Option<R>,
    {
        self.pause_until_or_timeout(sig, cond, None)
    }

    /// Pauses until the condition is met, the thread is interrupted, or the
    /// timeout elapses.
    fn pause_until_or_timeout<F, R>(
        &self,
        sig: &SigPending,
        cond: F,
        timeout: Option<Duration>,
    ) -> Result<R>
    where
        F: FnMut() -> Option<R>;
}

impl Pause for Waiter {
    fn pause_until_or_timeout<F, R>(
        &self,
        sig: &SigPending,
        cond: F,
        timeout: Option<Duration>,
    ) -> Result<R>
    where
        F: FnMut() -> Option<R>,
    {
        let _guard = sig.observe(self.waker());
        self.wait_until_or_cancelled(cond, || sig.check(), timeout)
    }
}

impl Pause for WaitQueue {
    fn pause_until_or_timeout<F, R>(
        &self,
        sig: &SigPending,
        mut cond: F,
        timeout: Option<Duration>,
    ) -> Result<R>
    where
        F: FnMut() -> Option<R>,
    {
        if let Some(res) = cond() {
            return Ok(res);
        }

        let (waiter, _) = Waiter::new_pair();
        let cond = || {
            self.enqueue(waiter.waker());
            cond()
        };
        waiter.pause_until_or_timeout(sig, cond, timeout)
    }
}
