// SPDX-License-Identifier: MPL-2.0

//! The context of the thread calling into the subsystem.

use crate::{
    credentials::{CredSlot, Credential},
    prelude::*,
    sync::SigPending,
};

/// The calling thread as seen by the identity subsystem.
///
/// It carries the thread's process id, whether the process holds the
/// identity-resolver entitlement, the thread's credential, and the flag other
/// threads raise to interrupt a blocking call.
#[derive(Debug)]
pub struct Context {
    pid: u32,
    entitled: bool,
    cred: CredSlot,
    sig: Arc<SigPending>,
}

impl Context {
    pub fn new(pid: u32, cred: Credential) -> Self {
        Self {
            pid,
            entitled: false,
            cred: CredSlot::new(cred),
            sig: Arc::new(SigPending::new()),
        }
    }

    /// Grants or revokes the identity-resolver entitlement.
    pub fn with_entitlement(mut self, entitled: bool) -> Self {
        self.entitled = entitled;
        self
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_entitled(&self) -> bool {
        self.entitled
    }

    /// Returns the pending-signal flag of the thread.
    pub fn sig_pending(&self) -> &Arc<SigPending> {
        &self.sig
    }

    /// Returns the credential of the thread without taking a reference.
    pub fn get_current(&self) -> &Credential {
        self.cred.get()
    }

    /// Returns a new reference to the credential of the thread.
    pub fn get_current_with_ref(&self) -> Credential {
        self.cred.get().clone()
    }

    /// Replaces the credential of the thread.
    pub fn set_current(&mut self, cred: Credential) {
        self.cred.set_and_unref(cred);
    }
}
