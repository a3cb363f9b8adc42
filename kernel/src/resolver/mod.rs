// SPDX-License-Identifier: MPL-2.0

//! The call-out protocol to the user-space identity resolver.

mod extlookup;
#[cfg(test)]
pub(crate) mod mock;
mod queue;

pub(crate) use extlookup::read_name;
pub use extlookup::{ExtLookup, LookupFlags, LookupResult};
pub use queue::{ResolverQueue, Response, INITIAL_SEQNO, RESOLVER_FAILED, RESOLVER_TIMEOUT_RANGE};
