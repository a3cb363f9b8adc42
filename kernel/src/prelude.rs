// SPDX-License-Identifier: MPL-2.0

pub(crate) use alloc::{
    collections::VecDeque,
    string::{String, ToString},
    sync::{Arc, Weak},
    vec::Vec,
};
pub(crate) use core::{fmt::Debug, time::Duration};

pub(crate) use bitflags::bitflags;
pub(crate) use log::{debug, error, info, trace, warn};
pub(crate) use spin::Mutex;

pub(crate) use crate::{
    context::Context,
    error::{Errno, Error},
    identity::{Gid, Guid, Ntsid, Uid},
    sync::{Pause, WaitQueue, Waiter, Waker},
    time::Clock,
};
pub(crate) type Result<T> = core::result::Result<T, Error>;
pub(crate) use crate::return_errno_with_message;
