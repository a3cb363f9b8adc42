// SPDX-License-Identifier: MPL-2.0

use lru::LruCache;

use crate::{
    prelude::*,
    resolver::{ExtLookup, LookupFlags},
    time::{expiry_after, is_expired},
};

#[derive(Debug, Clone, Copy)]
struct Membership {
    is_member: bool,
    expiry: u64,
}

struct MembershipTable {
    lru: LruCache<(Uid, Gid), Membership>,
    max: usize,
}

impl MembershipTable {
    fn shrink_to(&mut self, max: usize) {
        while self.lru.len() > max && self.lru.pop_lru().is_some() {}
    }
}

/// The LRU-bounded cache of answers to "is this user a member of that group".
pub struct GroupCache {
    table: Mutex<MembershipTable>,
}

impl GroupCache {
    pub fn new(max: usize) -> Self {
        Self {
            table: Mutex::new(MembershipTable {
                lru: LruCache::unbounded(),
                max,
            }),
        }
    }

    /// Returns the cached membership of `uid` in `gid`, unless it has expired.
    ///
    /// A hit moves the entry to the hot end even when it has expired.
    pub fn lookup(&self, uid: Uid, gid: Gid, now: u64) -> Option<bool> {
        let mut table = self.table.lock();
        let membership = table.lru.get(&(uid, gid))?;
        if is_expired(membership.expiry, now) {
            return None;
        }
        Some(membership.is_member)
    }

    /// Records a resolver answer about membership.
    ///
    /// Responses that do not carry a user, a group and a membership verdict
    /// are ignored.
    pub fn update(&self, lookup: &ExtLookup, now: u64) {
        let required =
            LookupFlags::VALID_UID | LookupFlags::VALID_GID | LookupFlags::VALID_MEMBERSHIP;
        if !lookup.flags.contains(required) {
            return;
        }

        let membership = Membership {
            is_member: lookup.flags.contains(LookupFlags::ISMEMBER),
            expiry: expiry_after(now, lookup.member_valid),
        };
        let mut guard = self.table.lock();
        let table = &mut *guard;
        table.lru.put((lookup.uid, lookup.gid), membership);
        let max = table.max;
        table.shrink_to(max);
    }

    /// Evicts entries until at most `max` remain, without changing the bound.
    pub fn trim(&self, max: usize) {
        self.table.lock().shrink_to(max);
    }

    /// Changes the bound and evicts down to it.
    pub fn set_max(&self, max: usize) {
        let mut table = self.table.lock();
        table.max = max;
        table.shrink_to(max);
    }

    pub fn max(&self) -> usize {
        self.table.lock().max
    }

    pub fn len(&self) -> usize {
        self.table.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn answer(uid: u32, gid: u32, is_member: bool, ttl: u32) -> ExtLookup {
        let mut flags =
            LookupFlags::VALID_UID | LookupFlags::VALID_GID | LookupFlags::VALID_MEMBERSHIP;
        if is_member {
            flags |= LookupFlags::ISMEMBER;
        }
        ExtLookup {
            flags,
            uid: Uid::new(uid),
            gid: Gid::new(gid),
            member_valid: ttl,
            ..Default::default()
        }
    }

    #[test]
    fn answers_expire() {
        let cache = GroupCache::new(10);
        cache.update(&answer(501, 20, true, 30), 100);
        cache.update(&answer(501, 80, false, 0), 100);

        assert_eq!(cache.lookup(Uid::new(501), Gid::new(20), 129), Some(true));
        assert_eq!(cache.lookup(Uid::new(501), Gid::new(20), 130), None);
        assert_eq!(cache.lookup(Uid::new(501), Gid::new(80), u64::MAX), Some(false));
        assert_eq!(cache.lookup(Uid::new(502), Gid::new(20), 100), None);
    }

    #[test]
    fn incomplete_answers_are_ignored() {
        let cache = GroupCache::new(10);
        let mut partial = answer(501, 20, true, 0);
        partial.flags.remove(LookupFlags::VALID_MEMBERSHIP);
        cache.update(&partial, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn refresh_replaces_verdict() {
        let cache = GroupCache::new(10);
        cache.update(&answer(501, 20, true, 0), 0);
        cache.update(&answer(501, 20, false, 0), 0);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(Uid::new(501), Gid::new(20), 0), Some(false));
    }

    #[test]
    fn bound_evicts_coldest() {
        let cache = GroupCache::new(2);
        cache.update(&answer(1, 1, true, 0), 0);
        cache.update(&answer(2, 2, true, 0), 0);
        assert_eq!(cache.lookup(Uid::new(1), Gid::new(1), 0), Some(true));
        cache.update(&answer(3, 3, true, 0), 0);

        assert_eq!(cache.lookup(Uid::new(2), Gid::new(2), 0), None);
        assert_eq!(cache.lookup(Uid::new(1), Gid::new(1), 0), Some(true));

        cache.trim(0);
        assert!(cache.is_empty());
        assert_eq!(cache.max(), 2);
        cache.set_max(1);
        assert_eq!(cache.max(), 1);
    }
}
