// SPDX-License-Identifier: MPL-2.0

//! Bounded caches of resolver answers.
//!
//! Expiry is lazy: entries are never swept, they are only judged stale when
//! looked up. Eviction follows LRU order regardless of expiry.

mod groups;
mod identity;
mod names;

pub use groups::GroupCache;
pub use identity::{GroupList, IdentityCache, IdentityRecord};
pub use names::NamePool;

/// The default bound of each cache.
pub const DEFAULT_CACHE_MAX: usize = 100;

/// The largest bound a cache may be given.
pub const CACHE_MAX_CEILING: usize = 10000;
