// SPDX-License-Identifier: MPL-2.0

//! The identity and credential subsystem.
//!
//! [`Kauth`] owns every piece of shared state: the work queue to the
//! user-space identity resolver, the identity and group-membership caches,
//! and the pool of published credentials. Kernel code reaches the subsystem
//! through a [`Kauth`] and the [`Context`] of the calling thread.

#![deny(unsafe_code)]

extern crate alloc;

pub mod access;
pub mod cache;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod identitysvc;
pub mod logger;
pub mod membership;
mod prelude;
pub mod resolver;
pub mod sync;
pub mod time;
pub mod translate;

pub use config::KauthConfig;
pub use context::Context;
pub use credentials::{CredSlot, CredTemplate, Credential};
pub use error::{Errno, Error};

use cache::{GroupCache, IdentityCache};
use credentials::CredStore;
use resolver::ResolverQueue;

use crate::prelude::*;

pub type Result<T> = core::result::Result<T, Error>;

/// The identity subsystem.
pub struct Kauth {
    config: KauthConfig,
    clock: Arc<dyn Clock>,
    resolver: ResolverQueue,
    identities: IdentityCache,
    groups: GroupCache,
    creds: CredStore,
}

impl Kauth {
    pub fn new(config: KauthConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            "kauth: starting, external resolver {}, cache bounds {}/{}",
            if config.ext_resolver() { "on" } else { "off" },
            config.identity_cache_max(),
            config.group_cache_max()
        );
        Self {
            resolver: ResolverQueue::new(config.resolver_timeout(), config.no_resolver_grace()),
            identities: IdentityCache::new(config.identity_cache_max()),
            groups: GroupCache::new(config.group_cache_max()),
            creds: CredStore::new(),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &KauthConfig {
        &self.config
    }

    pub fn resolver(&self) -> &ResolverQueue {
        &self.resolver
    }

    pub fn identity_cache(&self) -> &IdentityCache {
        &self.identities
    }

    pub fn group_cache(&self) -> &GroupCache {
        &self.groups
    }

    pub fn creds(&self) -> &CredStore {
        &self.creds
    }

    /// Returns the credential of the kernel itself.
    pub fn kernel_cred(&self) -> Credential {
        self.creds.kernel()
    }

    /// Creates the context of a kernel thread running as `pid`.
    pub fn kernel_context(&self, pid: u32) -> Context {
        Context::new(pid, self.kernel_cred())
    }

    /// Returns the current uptime in seconds, the time base of cache expiry.
    pub(crate) fn now(&self) -> u64 {
        self.clock.uptime_secs()
    }
}

impl Debug for Kauth {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Kauth")
            .field("config", &self.config)
            .field("resolver", &self.resolver.identity())
            .field("identities", &self.identities.len())
            .field("groups", &self.groups.len())
            .field("creds", &self.creds.stats())
            .finish()
    }
}
