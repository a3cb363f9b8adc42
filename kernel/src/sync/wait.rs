// SPDX-License-Identifier: MPL-2.0

use core::{
    marker::PhantomData,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};
use std::{
    thread::{self, Thread},
    time::Instant,
};

use crate::prelude::*;

// # Explanation on the memory orders
//
// As soon as a waiter is woken up by a waker, it must see the condition that
// the waker established before waking it. Wakers therefore publish with
// `Ordering::Release` and waiters consume with `Ordering::Acquire`.
//
// Dropping a waiter is treated as a wait with zero timeout, so that a wake
// event racing with the drop is not lost.

/// A wait queue.
///
/// One may wait on a wait queue to put its executing thread to sleep.
/// Multiple threads may be the waiters of a wait queue.
/// Other threads may invoke the `wake`-family methods of a wait queue to
/// wake up one or many waiting threads.
pub struct WaitQueue {
    // A copy of `wakers.len()`, used for the lock-free fast path in `wake_one` and `wake_all`.
    num_wakers: AtomicU32,
    wakers: Mutex<VecDeque<Arc<Waker>>>,
}

impl WaitQueue {
    /// Creates a new, empty wait queue.
    pub const fn new() -> Self {
        WaitQueue {
            num_wakers: AtomicU32::new(0),
            wakers: Mutex::new(VecDeque::new()),
        }
    }

    /// Waits until some condition is met.
    ///
    /// The method only returns if the condition returns `Some(_)`.
    /// A waker thread should first make the condition `Some(_)`, then invoke the
    /// `wake`-family method.
    pub fn wait_until<F, R>(&self, mut cond: F) -> R
    where
        F: FnMut() -> Option<R>,
    {
        if let Some(res) = cond() {
            return res;
        }

        let (waiter, _) = Waiter::new_pair();
        let cond = || {
            self.enqueue(waiter.waker());
            cond()
        };
        waiter
            .wait_until_or_cancelled(cond, || Ok::<(), Error>(()), None)
            .unwrap_or_else(|_| unreachable!("the wait has neither a cancel condition nor a timeout"))
    }

    /// Wakes up one waiting thread, if there is one at the point of time when this method is
    /// called, returning whether such a thread was woken up.
    pub fn wake_one(&self) -> bool {
        // Fast path
        if self.is_empty() {
            return false;
        }

        loop {
            let mut wakers = self.wakers.lock();
            let Some(waker) = wakers.pop_front() else {
                return false;
            };
            self.num_wakers.fetch_sub(1, Ordering::Release);
            // Avoid holding lock when calling `wake_up`
            drop(wakers);

            if waker.wake_up() {
                return true;
            }
        }
    }

    /// Wakes up all waiting threads, returning the number of threads that were woken up.
    pub fn wake_all(&self) -> usize {
        // Fast path
        if self.is_empty() {
            return 0;
        }

        let mut num_woken = 0;

        loop {
            let mut wakers = self.wakers.lock();
            let Some(waker) = wakers.pop_front() else {
                break;
            };
            self.num_wakers.fetch_sub(1, Ordering::Release);
            // Avoid holding lock when calling `wake_up`
            drop(wakers);

            if waker.wake_up() {
                num_woken += 1;
            }
        }

        num_woken
    }

    fn is_empty(&self) -> bool {
        self.num_wakers.fetch_add(0, Ordering::Release) == 0
    }

    /// Enqueues the input [`Waker`] to the wait queue.
    #[doc(hidden)]
    pub fn enqueue(&self, waker: Arc<Waker>) {
        let mut wakers = self.wakers.lock();
        wakers.push_back(waker);
        self.num_wakers.fetch_add(1, Ordering::Acquire);
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// A waiter that can put the current thread to sleep until it is woken up by the associated
/// [`Waker`].
///
/// A waiter belongs to the thread that created it, so it cannot be sent to another thread.
pub struct Waiter {
    waker: Arc<Waker>,
    _not_send: PhantomData<*const ()>,
}

/// A waker that can wake up the associated [`Waiter`].
///
/// A waker can be created by calling [`Waiter::new_pair`]. This method creates an `Arc<Waker>`
/// that can be used across different threads.
pub struct Waker {
    has_woken: AtomicBool,
    thread: Thread,
}

impl Waiter {
    /// Creates a waiter and its associated [`Waker`].
    pub fn new_pair() -> (Self, Arc<Waker>) {
        let waker = Arc::new(Waker {
            has_woken: AtomicBool::new(false),
            thread: thread::current(),
        });
        let waiter = Self {
            waker: waker.clone(),
            _not_send: PhantomData,
        };
        (waiter, waker)
    }

    /// Waits until the waiter is woken up by calling [`Waker::wake_up`] on the associated
    /// [`Waker`].
    ///
    /// This method returns immediately if the waiter has been woken since the end of the last call
    /// to this method (or since the waiter was created, if this method has not been called
    /// before).
    pub fn wait(&self) {
        self.waker.do_wait(None);
    }

    /// Like [`Self::wait`], but gives up at `deadline`.
    ///
    /// Returns whether the waiter was woken up.
    pub fn wait_deadline(&self, deadline: Instant) -> bool {
        self.waker.do_wait(Some(deadline))
    }

    /// Waits until some condition is met, the cancel condition becomes true, or the timeout
    /// elapses.
    ///
    /// This method will return `Ok(_)` if the condition returns `Some(_)`, and will stop waiting
    /// if the cancel condition returns `Err(_)`. In this situation, this method will return the
    /// `Err(_)` generated by the cancel condition. An elapsed timeout produces `Err(ETIME)`
    /// converted into `E`.
    pub fn wait_until_or_cancelled<F, R, FCancel, E>(
        &self,
        mut cond: F,
        cancel_cond: FCancel,
        timeout: Option<Duration>,
    ) -> core::result::Result<R, E>
    where
        F: FnMut() -> Option<R>,
        FCancel: Fn() -> core::result::Result<(), E>,
        E: From<Error>,
    {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        loop {
            if let Some(res) = cond() {
                return Ok(res);
            };

            if let Err(e) = cancel_cond() {
                // Close the waker and check again to avoid missing a wake event.
                self.waker.close();
                return cond().ok_or(e);
            }

            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        self.waker.close();
                        return cond().ok_or_else(|| {
                            Error::with_message(Errno::ETIME, "the timeout is reached").into()
                        });
                    }
                    self.wait_deadline(deadline);
                }
                None => self.wait(),
            }
        }
    }

    /// Gets the associated [`Waker`] of the current waiter.
    pub fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        // When dropping the waiter, we need to close the waker to ensure that if someone wants to
        // wake up the waiter afterwards, they will perform a no-op.
        self.waker.close();
    }
}

impl Waker {
    /// Wakes up the associated [`Waiter`].
    ///
    /// This method returns `true` if the waiter is woken by this call. It returns `false` if the
    /// waiter has already been woken by a previous call to the method, or if the waiter has been
    /// dropped.
    pub fn wake_up(&self) -> bool {
        if self.has_woken.swap(true, Ordering::Release) {
            return false;
        }
        self.thread.unpark();

        true
    }

    fn do_wait(&self, deadline: Option<Instant>) -> bool {
        while !self.has_woken.swap(false, Ordering::Acquire) {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    thread::park_timeout(deadline - now);
                }
                None => thread::park(),
            }
        }
        true
    }

    fn close(&self) {
        // This must use `Ordering::Acquire`, although we do not care about the return value.
        let _ = self.has_woken.swap(true, Ordering::Acquire);
    }
}

impl Debug for Waker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Waker")
            .field("has_woken", &self.has_woken.load(Ordering::Relaxed))
            .field("thread", &self.thread.id())
            .finish()
    }
}
