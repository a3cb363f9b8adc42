// SPDX-License-Identifier: MPL-2.0

//! Local and external identity representations.

mod group;
mod guid;
mod ntsid;
mod user;

pub use group::Gid;
pub use guid::{Guid, WellKnownGuid};
pub use ntsid::{Ntsid, NTSID_MAX_AUTHORITIES};
pub use user::Uid;

/// The maximum number of groups a credential or a resolver message carries.
pub const NGROUPS: usize = 16;

/// The maximum length of a name string, including the terminating NUL.
pub const MAXPATHLEN: usize = 1024;

/// The identity representations the translation facade converts between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Uid,
    Gid,
    Guid,
    Ntsid,
    /// A user name.
    Pwnam,
    /// A group name.
    Grnam,
    /// The supplementary groups of a user.
    Groups,
}

/// A known identity to translate from, or to find in the identity cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IdentitySource<'a> {
    Uid(Uid),
    Gid(Gid),
    Guid(Guid),
    Ntsid(Ntsid),
    Pwnam(&'a str),
    Grnam(&'a str),
}

impl IdentitySource<'_> {
    pub fn kind(&self) -> IdentityKind {
        match self {
            IdentitySource::Uid(_) => IdentityKind::Uid,
            IdentitySource::Gid(_) => IdentityKind::Gid,
            IdentitySource::Guid(_) => IdentityKind::Guid,
            IdentitySource::Ntsid(_) => IdentityKind::Ntsid,
            IdentitySource::Pwnam(_) => IdentityKind::Pwnam,
            IdentitySource::Grnam(_) => IdentityKind::Grnam,
        }
    }
}

/// The key of an identity-cache entry: a user or a group, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    User(Uid),
    Group(Gid),
}

impl IdentityKey {
    pub fn uid(&self) -> Option<Uid> {
        match self {
            IdentityKey::User(uid) => Some(*uid),
            IdentityKey::Group(_) => None,
        }
    }

    pub fn gid(&self) -> Option<Gid> {
        match self {
            IdentityKey::User(_) => None,
            IdentityKey::Group(gid) => Some(*gid),
        }
    }
}
