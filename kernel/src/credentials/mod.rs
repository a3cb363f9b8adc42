// SPDX-License-Identifier: MPL-2.0

//! Immutable, shared, reference-counted credentials.
//!
//! A credential is built as a [`CredTemplate`], then published through the
//! [`CredStore`], which hands out the already-published equal credential
//! when there is one. Published credentials never change; every setter
//! derives a new credential and drops the reference to the old one.

mod audit;
mod label;
mod posix;
mod setters;
mod store;

use core::{
    hash::{Hash, Hasher},
    mem,
    sync::atomic::{fence, Ordering},
};

pub use audit::AuditSession;
use jhash::JenkinsHasher;
pub use label::MacLabel;
pub use posix::{CredFlags, PosixCred};
use store::CredInner;
pub use store::{CredStats, CredStore, CRED_TABLE_SIZE};

use crate::prelude::*;

/// The largest number of long-term holds a credential may have.
pub const CRED_HOLD_MAX: u32 = 0x0fff_ffff;

/// The content of a credential.
#[derive(Debug, Clone)]
pub struct CredTemplate {
    pub posix: PosixCred,
    pub audit: AuditSession,
    pub label: Option<MacLabel>,
}

impl CredTemplate {
    pub fn new(posix: PosixCred) -> Self {
        Self {
            posix,
            audit: AuditSession::default(),
            label: None,
        }
    }

    fn mac_enforced(&self) -> bool {
        self.posix.flags.contains(CredFlags::MAC_ENFORCE)
    }

    pub(crate) fn content_hash(&self) -> u32 {
        let mut hasher = JenkinsHasher::default();
        self.posix.hash(&mut hasher);
        self.audit.hash(&mut hasher);
        if self.mac_enforced() {
            if let Some(label) = &self.label {
                hasher.write_u32(label.content_hash());
            }
        }
        hasher.finish_u32()
    }
}

impl PartialEq for CredTemplate {
    /// Labels only count when MAC enforcement is on.
    fn eq(&self, other: &Self) -> bool {
        self.posix == other.posix
            && self.audit == other.audit
            && (!self.mac_enforced() || self.label == other.label)
    }
}

/// A reference to a published credential.
///
/// Cloning takes a reference and dropping gives it back. Two handles are
/// equal when they refer to the same published credential, which, since
/// equal credentials are published once, is the same as having equal
/// content.
pub struct Credential {
    inner: Arc<CredInner>,
}

impl Credential {
    /// Wraps a credential whose reference count already accounts for the handle.
    fn from_retained(inner: Arc<CredInner>) -> Self {
        Self { inner }
    }

    pub fn content(&self) -> &CredTemplate {
        &self.inner.content
    }

    /// Returns a scratch copy of the content to derive a new credential from.
    pub fn template(&self) -> CredTemplate {
        self.inner.content.clone()
    }

    pub fn posix(&self) -> &PosixCred {
        &self.inner.content.posix
    }

    pub fn audit(&self) -> &AuditSession {
        &self.inner.content.audit
    }

    pub fn label(&self) -> Option<&MacLabel> {
        self.inner.content.label.as_ref()
    }

    /// Returns the effective user id.
    pub fn uid(&self) -> Uid {
        self.posix().uid
    }

    pub fn ruid(&self) -> Uid {
        self.posix().ruid
    }

    pub fn svuid(&self) -> Uid {
        self.posix().svuid
    }

    /// Returns the effective group id.
    pub fn gid(&self) -> Gid {
        self.posix().egid()
    }

    pub fn rgid(&self) -> Gid {
        self.posix().rgid
    }

    pub fn svgid(&self) -> Gid {
        self.posix().svgid
    }

    pub fn gmuid(&self) -> Uid {
        self.posix().gmuid
    }

    pub fn groups(&self) -> &[Gid] {
        self.posix().groups()
    }

    pub fn ref_count(&self) -> u32 {
        self.inner.refs.load(Ordering::Acquire)
    }

    pub fn hold_count(&self) -> u32 {
        self.inner.holds.load(Ordering::Acquire)
    }

    fn hold(&self) {
        let holds = self.inner.holds.fetch_add(1, Ordering::Relaxed);
        if holds >= CRED_HOLD_MAX {
            panic!("too many long-term holds on a credential");
        }
    }

    fn unhold(&self) {
        let holds = self.inner.holds.fetch_sub(1, Ordering::Release);
        if holds == 0 {
            panic!("releasing a long-term hold that was never taken");
        }
    }
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        self.inner.refs.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        let refs = self.inner.refs.fetch_sub(1, Ordering::Release);
        if refs == 0 {
            panic!("over-release of a credential");
        }
        if refs != 1 {
            return;
        }
        fence(Ordering::Acquire);

        if self.inner.is_kernel {
            panic!("Over-release of the kernel credentials");
        }
        if self.inner.holds.load(Ordering::Relaxed) != 0 {
            panic!("freeing a credential with long-term holds");
        }
        self.inner.unpublish();
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Credential {}

impl Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credential")
            .field("content", self.content())
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// A persistent field holding a credential, such as the credential of a
/// thread or an open file.
///
/// The slot keeps a reference and a long-term hold on what it stores. A new
/// credential is always retained before the old one is released.
pub struct CredSlot {
    cred: Credential,
}

impl CredSlot {
    pub fn new(cred: Credential) -> Self {
        cred.hold();
        Self { cred }
    }

    pub fn get(&self) -> &Credential {
        &self.cred
    }

    /// Stores a new reference to `cred`.
    pub fn set(&mut self, cred: &Credential) {
        if self.cred == *cred {
            return;
        }
        self.store(cred.clone());
    }

    /// Stores `cred`, consuming the caller's reference.
    pub fn set_and_unref(&mut self, cred: Credential) {
        if self.cred == cred {
            return;
        }
        self.store(cred);
    }

    fn store(&mut self, cred: Credential) {
        cred.hold();
        let old = mem::replace(&mut self.cred, cred);
        old.unhold();
    }
}

impl Drop for CredSlot {
    fn drop(&mut self) {
        self.cred.unhold();
    }
}

impl Debug for CredSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("CredSlot").field(&self.cred).finish()
    }
}
