// SPDX-License-Identifier: MPL-2.0

use smallvec::SmallVec;

use crate::{identity::NGROUPS, prelude::*};

bitflags! {
    #[derive(Default)]
    pub struct CredFlags: u32 {
        /// Group membership is decided by the inline group list only.
        const NOMEMBERD = 1 << 0;
        /// The security label takes part in credential equality.
        const MAC_ENFORCE = 1 << 1;
    }
}

/// The POSIX identity carried by a credential.
///
/// `groups[0]` is the effective group. A published credential always has at
/// least one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PosixCred {
    /// Effective user id.
    pub uid: Uid,
    /// Real user id.
    pub ruid: Uid,
    /// Saved-set user id.
    pub svuid: Uid,
    groups: SmallVec<[Gid; NGROUPS]>,
    /// Real group id.
    pub rgid: Gid,
    /// Saved-set group id.
    pub svgid: Gid,
    /// The user whose external group memberships apply, or `Uid::NONE`.
    pub gmuid: Uid,
    pub flags: CredFlags,
}

impl PosixCred {
    /// Creates a credential body where every id is `uid` or `gid` and `gid`
    /// is the only group.
    pub fn new(uid: Uid, gid: Gid) -> Self {
        let mut groups = SmallVec::new();
        groups.push(gid);
        Self {
            uid,
            ruid: uid,
            svuid: uid,
            groups,
            rgid: gid,
            svgid: gid,
            gmuid: uid,
            flags: CredFlags::empty(),
        }
    }

    /// Returns the effective group id.
    pub fn egid(&self) -> Gid {
        self.groups.first().copied().unwrap_or(Gid::NONE)
    }

    /// Returns the effective group followed by the supplementary groups.
    pub fn groups(&self) -> &[Gid] {
        &self.groups
    }

    /// Replaces the group list, keeping at most `NGROUPS` entries.
    pub fn set_groups(&mut self, groups: &[Gid]) {
        let count = groups.len().min(NGROUPS);
        self.groups = SmallVec::from_slice(&groups[..count]);
    }

    /// Makes `egid` the effective group.
    ///
    /// If `egid` is one of the supplementary groups, the old effective group
    /// takes its slot. Otherwise the old effective group is dropped from the
    /// list, and `true` is returned to report the displacement.
    pub(crate) fn change_egid(&mut self, egid: Gid) -> bool {
        let old = self.egid();
        let mut displaced = true;
        if let Some(slot) = self.groups.iter_mut().skip(1).find(|gid| **gid == egid) {
            *slot = old;
            displaced = false;
        }
        match self.groups.first_mut() {
            Some(first) => *first = egid,
            None => self.groups.push(egid),
        }
        displaced
    }
}
