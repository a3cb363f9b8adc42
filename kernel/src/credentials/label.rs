// SPDX-License-Identifier: MPL-2.0

use jhash::jhash_slice;

use crate::prelude::*;

/// An opaque security label attached to a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacLabel(Arc<[u8]>);

impl MacLabel {
    pub fn new(bytes: &[u8]) -> Self {
        Self(Arc::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub(super) fn content_hash(&self) -> u32 {
        jhash_slice(&self.0, 0)
    }
}
