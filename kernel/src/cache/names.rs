// SPDX-License-Identifier: MPL-2.0

use hashbrown::HashSet;

use crate::{identity::MAXPATHLEN, prelude::*};

/// A pool of interned display names shared by identity-cache entries.
///
/// A name stays in the pool while some entry holds it. Every handle returned
/// by [`NamePool::intern`] must be given back with [`NamePool::release`].
#[derive(Debug, Default)]
pub struct NamePool {
    names: Mutex<HashSet<Arc<str>>>,
}

impl NamePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared copy of `name`, adding it to the pool if needed.
    ///
    /// Names are cut to `MAXPATHLEN - 1` bytes.
    pub fn intern(&self, name: &str) -> Arc<str> {
        let name = truncate(name, MAXPATHLEN - 1);
        let mut names = self.names.lock();
        if let Some(interned) = names.get(name) {
            return interned.clone();
        }
        let interned: Arc<str> = Arc::from(name);
        names.insert(interned.clone());
        interned
    }

    /// Gives back a handle obtained from [`NamePool::intern`].
    pub fn release(&self, name: Arc<str>) {
        let mut names = self.names.lock();
        // The pool's own copy plus the one being released.
        if Arc::strong_count(&name) == 2 {
            names.remove(&*name);
        }
        drop(name);
    }

    pub fn len(&self) -> usize {
        self.names.lock().len()
    }
}

fn truncate(name: &str, max: usize) -> &str {
    let mut end = name.len().min(max);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shared_until_last_release() {
        let pool = NamePool::new();
        let first = pool.intern("staff");
        let second = pool.intern("staff");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.len(), 1);

        pool.release(first);
        assert_eq!(pool.len(), 1);
        pool.release(second);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn long_names_are_truncated() {
        let pool = NamePool::new();
        let long = "é".repeat(MAXPATHLEN);
        let name = pool.intern(&long);
        assert!(name.len() <= MAXPATHLEN - 1);
        assert!(long.starts_with(&*name));
        pool.release(name);
    }
}
