// SPDX-License-Identifier: MPL-2.0

use core::sync::atomic::{AtomicU32, Ordering};

use hashbrown::HashMap;

use super::{CredFlags, CredTemplate, Credential, PosixCred};
use crate::prelude::*;

/// The number of buckets credentials are spread over.
pub const CRED_TABLE_SIZE: u32 = 128;

pub(super) struct CredInner {
    pub(super) content: CredTemplate,
    hash: u32,
    // References held by `Credential` handles.
    pub(super) refs: AtomicU32,
    // Long-term holds taken by `CredSlot`s.
    pub(super) holds: AtomicU32,
    pub(super) is_kernel: bool,
    store: Weak<StoreShared>,
}

impl CredInner {
    /// Takes a reference unless the count has already dropped to zero.
    fn try_retain(&self) -> bool {
        self.refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |refs| {
                (refs != 0).then(|| refs + 1)
            })
            .is_ok()
    }

    /// Unlinks a credential whose last reference is gone.
    pub(super) fn unpublish(self: &Arc<Self>) {
        if let Some(store) = self.store.upgrade() {
            store.remove(self);
        }
    }
}

type Buckets = HashMap<u32, Vec<Arc<CredInner>>>;

struct StoreShared {
    buckets: Mutex<Buckets>,
}

impl StoreShared {
    fn remove(&self, inner: &Arc<CredInner>) {
        let mut buckets = self.buckets.lock();
        let bucket_index = inner.hash % CRED_TABLE_SIZE;
        let Some(bucket) = buckets.get_mut(&bucket_index) else {
            return;
        };
        if let Some(pos) = bucket.iter().position(|cred| Arc::ptr_eq(cred, inner)) {
            bucket.remove(pos);
        }
        if bucket.is_empty() {
            buckets.remove(&bucket_index);
        }
    }
}

/// Scans a bucket for a credential equal to `value` and takes a reference.
///
/// Newer credentials sit at the front, so once an equal credential is found
/// that cannot be retained, nothing behind it can be either.
fn find_locked(buckets: &Buckets, hash: u32, value: &CredTemplate) -> Option<Credential> {
    let bucket = buckets.get(&(hash % CRED_TABLE_SIZE))?;
    let found = bucket.iter().find(|cred| cred.content == *value)?;
    if found.try_retain() {
        Some(Credential::from_retained(found.clone()))
    } else {
        None
    }
}

/// Statistics of the credential table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CredStats {
    pub entries: usize,
    pub buckets_used: usize,
    pub longest_chain: usize,
}

/// The pool of published credentials.
///
/// Equal credentials are published once and shared. A published credential
/// is never modified; changes go through [`CredStore::update`].
pub struct CredStore {
    shared: Arc<StoreShared>,
    // Carries one reference that is never given back.
    kernel: Arc<CredInner>,
}

impl CredStore {
    pub fn new() -> Self {
        let shared = Arc::new(StoreShared {
            buckets: Mutex::new(HashMap::with_capacity(CRED_TABLE_SIZE as usize)),
        });

        let mut posix = PosixCred::new(Uid::new_root(), Gid::new_root());
        posix.gmuid = Uid::NONE;
        posix.flags = CredFlags::NOMEMBERD;
        let content = CredTemplate::new(posix);
        let hash = content.content_hash();
        let kernel = Arc::new(CredInner {
            content,
            hash,
            refs: AtomicU32::new(1),
            holds: AtomicU32::new(0),
            is_kernel: true,
            store: Arc::downgrade(&shared),
        });
        shared
            .buckets
            .lock()
            .entry(hash % CRED_TABLE_SIZE)
            .or_default()
            .insert(0, kernel.clone());

        Self { shared, kernel }
    }

    /// Returns the credential of the kernel itself.
    pub fn kernel(&self) -> Credential {
        self.kernel.refs.fetch_add(1, Ordering::Relaxed);
        Credential::from_retained(self.kernel.clone())
    }

    /// Finds a published credential equal to `value`.
    pub fn find_and_ref(&self, value: &CredTemplate) -> Option<Credential> {
        let hash = value.content_hash();
        find_locked(&self.shared.buckets.lock(), hash, value)
    }

    /// Publishes `value`, or returns the equal credential published meanwhile.
    pub fn add(&self, value: CredTemplate) -> Credential {
        let hash = value.content_hash();
        let mut buckets = self.shared.buckets.lock();
        if let Some(found) = find_locked(&buckets, hash, &value) {
            return found;
        }

        let inner = Arc::new(CredInner {
            content: value,
            hash,
            refs: AtomicU32::new(1),
            holds: AtomicU32::new(0),
            is_kernel: false,
            store: Arc::downgrade(&self.shared),
        });
        buckets
            .entry(hash % CRED_TABLE_SIZE)
            .or_default()
            .insert(0, inner.clone());
        Credential::from_retained(inner)
    }

    /// Derives a credential from `old` with the content of `model`.
    ///
    /// With `retain_audit`, the audit session of `old` is kept. If nothing
    /// changes, `old` itself comes back. The reference to `old` is dropped
    /// only after the new credential exists.
    pub fn update(&self, old: Credential, mut model: CredTemplate, retain_audit: bool) -> Credential {
        if retain_audit {
            model.audit = old.content().audit;
        }
        if *old.content() == model {
            return old;
        }

        let new = match self.find_and_ref(&model) {
            Some(found) => found,
            None => self.add(model),
        };
        drop(old);
        new
    }

    /// Returns the statistics of the credential table.
    pub fn stats(&self) -> CredStats {
        let buckets = self.shared.buckets.lock();
        buckets.values().fold(CredStats::default(), |stats, bucket| CredStats {
            entries: stats.entries + bucket.len(),
            buckets_used: stats.buckets_used + (!bucket.is_empty()) as usize,
            longest_chain: stats.longest_chain.max(bucket.len()),
        })
    }
}

impl Default for CredStore {
    fn default() -> Self {
        Self::new()
    }
}
