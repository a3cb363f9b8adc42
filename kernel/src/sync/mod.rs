// SPDX-License-Identifier: MPL-2.0

//! Blocking primitives for threads that wait on the identity resolver.

mod pause;
mod wait;

pub use pause::{Pause, SigPending};
pub use wait::{WaitQueue, Waiter, Waker};
