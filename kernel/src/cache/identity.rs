// SPDX-License-Identifier: MPL-2.0

use lru::LruCache;
use smallvec::SmallVec;

use super::names::NamePool;
use crate::{
    identity::{IdentityKey, IdentitySource, NGROUPS},
    prelude::*,
    resolver::{ExtLookup, LookupFlags},
    time::expiry_after,
};

/// The supplementary groups cached for a user.
pub type GroupList = SmallVec<[Gid; NGROUPS]>;

/// A copy of an identity-cache entry.
///
/// Expiries are in seconds of uptime; zero means the translation never
/// expires.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityRecord {
    pub key: IdentityKey,
    pub guid: Option<Guid>,
    pub guid_expiry: u64,
    pub ntsid: Option<Ntsid>,
    pub ntsid_expiry: u64,
    pub groups: Option<GroupList>,
    pub groups_expiry: u64,
    /// The user name of a user entry or the group name of a group entry.
    pub name: Option<String>,
}

#[derive(Debug)]
struct IdentityEntry {
    guid: Option<Guid>,
    guid_expiry: u64,
    ntsid: Option<Ntsid>,
    ntsid_expiry: u64,
    groups: Option<GroupList>,
    groups_expiry: u64,
    name: Option<Arc<str>>,
}

impl IdentityEntry {
    fn matches(&self, key: &IdentityKey, source: &IdentitySource) -> bool {
        match source {
            IdentitySource::Uid(uid) => *key == IdentityKey::User(*uid),
            IdentitySource::Gid(gid) => *key == IdentityKey::Group(*gid),
            IdentitySource::Guid(guid) => self.guid.as_ref() == Some(guid),
            IdentitySource::Ntsid(ntsid) => self.ntsid.as_ref() == Some(ntsid),
            IdentitySource::Pwnam(name) => {
                matches!(key, IdentityKey::User(_)) && self.name.as_deref() == Some(*name)
            }
            IdentitySource::Grnam(name) => {
                matches!(key, IdentityKey::Group(_)) && self.name.as_deref() == Some(*name)
            }
        }
    }

    fn snapshot(&self, key: IdentityKey) -> IdentityRecord {
        IdentityRecord {
            key,
            guid: self.guid,
            guid_expiry: self.guid_expiry,
            ntsid: self.ntsid,
            ntsid_expiry: self.ntsid_expiry,
            groups: self.groups.clone(),
            groups_expiry: self.groups_expiry,
            name: self.name.as_deref().map(String::from),
        }
    }
}

struct IdentityTable {
    lru: LruCache<IdentityKey, IdentityEntry>,
    max: usize,
}

impl IdentityTable {
    /// Evicts from the cold end until at most `max` entries remain.
    fn shrink_to(&mut self, max: usize, released: &mut Vec<Arc<str>>) {
        while self.lru.len() > max {
            let Some((key, entry)) = self.lru.pop_lru() else {
                break;
            };
            trace!("kauth: evicted {:?} from the identity cache", key);
            released.extend(entry.name);
        }
    }
}

/// The LRU-bounded cache of translations between local and external identities.
///
/// Every lookup hit moves the entry to the hot end, expired or not. Expiry
/// is judged by the caller, per translation.
pub struct IdentityCache {
    table: Mutex<IdentityTable>,
    names: NamePool,
}

impl IdentityCache {
    pub fn new(max: usize) -> Self {
        Self {
            table: Mutex::new(IdentityTable {
                lru: LruCache::unbounded(),
                max,
            }),
            names: NamePool::new(),
        }
    }

    /// Finds the entry `source` identifies.
    pub fn find(&self, source: &IdentitySource) -> Option<IdentityRecord> {
        let mut table = self.table.lock();
        let key = match source {
            IdentitySource::Uid(uid) => IdentityKey::User(*uid),
            IdentitySource::Gid(gid) => IdentityKey::Group(*gid),
            _ => table
                .lru
                .iter()
                .find(|(key, entry)| entry.matches(key, source))
                .map(|(key, _)| *key)?,
        };
        table.lru.get(&key).map(|entry| entry.snapshot(key))
    }

    /// Merges a resolver response into the cache and returns the resulting entry.
    ///
    /// A response naming a user is cached under its UID; only a response
    /// naming a group and no user is cached under its GID. Only the fields the
    /// response marks valid are overwritten, but the GUID and NTSID expiries
    /// always are.
    pub fn update(&self, lookup: &ExtLookup, name: Option<&str>, now: u64) -> Option<IdentityRecord> {
        let flags = lookup.flags;
        // Intern before taking the table lock.
        let mut speculative = match name {
            Some(name) if flags.intersects(LookupFlags::VALID_NAME) => Some(self.names.intern(name)),
            _ => None,
        };

        let (key, guid, guid_ttl, ntsid, ntsid_ttl, name_flag) =
            if flags.contains(LookupFlags::VALID_UID) {
                (
                    IdentityKey::User(lookup.uid),
                    flags.contains(LookupFlags::VALID_UGUID).then_some(lookup.uguid),
                    lookup.uguid_valid,
                    flags.contains(LookupFlags::VALID_USID).then_some(lookup.usid),
                    lookup.usid_valid,
                    LookupFlags::VALID_PWNAM,
                )
            } else if flags.contains(LookupFlags::VALID_GID) {
                (
                    IdentityKey::Group(lookup.gid),
                    flags.contains(LookupFlags::VALID_GGUID).then_some(lookup.gguid),
                    lookup.gguid_valid,
                    flags.contains(LookupFlags::VALID_GSID).then_some(lookup.gsid),
                    lookup.gsid_valid,
                    LookupFlags::VALID_GRNAM,
                )
            } else {
                if let Some(name) = speculative {
                    self.names.release(name);
                }
                return None;
            };

        let groups = flags
            .contains(LookupFlags::VALID_SUPGRPS)
            .then(|| GroupList::from_slice(lookup.sup_groups()));
        let groups_expiry = expiry_after(now, lookup.member_valid);
        let guid_expiry = expiry_after(now, guid_ttl);
        let ntsid_expiry = expiry_after(now, ntsid_ttl);
        let new_name = if flags.contains(name_flag) {
            speculative.take()
        } else {
            None
        };

        let mut released = Vec::new();
        let record = {
            let mut guard = self.table.lock();
            let table = &mut *guard;
            if let Some(entry) = table.lru.get_mut(&key) {
                if let Some(groups) = groups {
                    entry.groups = Some(groups);
                    entry.groups_expiry = groups_expiry;
                }
                if guid.is_some() {
                    entry.guid = guid;
                }
                entry.guid_expiry = guid_expiry;
                if ntsid.is_some() {
                    entry.ntsid = ntsid;
                }
                entry.ntsid_expiry = ntsid_expiry;
                if let Some(name) = new_name {
                    released.extend(entry.name.replace(name));
                }
                debug!("kauth: refreshed {:?} in the identity cache", key);
                entry.snapshot(key)
            } else {
                let entry = IdentityEntry {
                    guid,
                    guid_expiry,
                    ntsid,
                    ntsid_expiry,
                    groups,
                    groups_expiry,
                    name: new_name,
                };
                let record = entry.snapshot(key);
                debug!("kauth: learned {:?} in the identity cache", key);
                table.lru.put(key, entry);
                let max = table.max;
                table.shrink_to(max, &mut released);
                record
            }
        };

        released.extend(speculative);
        for name in released {
            self.names.release(name);
        }
        Some(record)
    }

    /// Evicts entries until at most `max` remain, without changing the bound.
    pub fn trim(&self, max: usize) {
        let mut released = Vec::new();
        self.table.lock().shrink_to(max, &mut released);
        for name in released {
            self.names.release(name);
        }
    }

    /// Changes the bound and evicts down to it.
    pub fn set_max(&self, max: usize) {
        self.table.lock().max = max;
        self.trim(max);
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

    /// Returns the number of distinct names held by the cache.
    pub fn name_count(&self) -> usize {
        self.names.len()
    }
}
