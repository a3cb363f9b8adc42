// SPDX-License-Identifier: MPL-2.0

use crate::prelude::*;

/// The audit session a credential belongs to.
///
/// It is carried and compared as an opaque value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuditSession {
    /// The audit user id, `AUDIT_UID_UNSET` until login.
    pub auid: u32,
    pub asid: u32,
    pub success_mask: u32,
    pub failure_mask: u32,
    pub termid: [u8; 16],
    pub flags: u64,
}

impl AuditSession {
    pub const AUDIT_UID_UNSET: u32 = u32::MAX;

    /// Returns the audit user as a [`Uid`], if one is set.
    pub fn audit_uid(&self) -> Option<Uid> {
        (self.auid != Self::AUDIT_UID_UNSET).then(|| Uid::new(self.auid))
    }
}

impl Default for AuditSession {
    fn default() -> Self {
        Self {
            auid: Self::AUDIT_UID_UNSET,
            asid: 0,
            success_mask: 0,
            failure_mask: 0,
            termid: [0; 16],
            flags: 0,
        }
    }
}
