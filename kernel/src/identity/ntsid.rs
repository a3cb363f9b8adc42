// SPDX-License-Identifier: MPL-2.0

use core::fmt;

/// The maximum number of subauthorities an NTSID can carry.
pub const NTSID_MAX_AUTHORITIES: usize = 16;

const NTSID_HEADER_SIZE: usize = 8;

/// A variable-length external security identifier.
///
/// Only the first [`Ntsid::size`] bytes are meaningful. Two NTSIDs are equal
/// when their sizes match and those bytes match; an NTSID claiming more
/// subauthorities than it can hold never equals anything.
#[derive(Clone, Copy, Default)]
#[repr(C)]
pub struct Ntsid {
    pub kind: u8,
    pub auth_count: u8,
    pub authority: [u8; 6],
    pub sub_authorities: [u32; NTSID_MAX_AUTHORITIES],
}

impl Ntsid {
    pub fn new(kind: u8, authority: [u8; 6], sub_authorities: &[u32]) -> Self {
        let count = sub_authorities.len().min(NTSID_MAX_AUTHORITIES);
        let mut sid = Self {
            kind,
            auth_count: count as u8,
            authority,
            sub_authorities: [0; NTSID_MAX_AUTHORITIES],
        };
        sid.sub_authorities[..count].copy_from_slice(&sub_authorities[..count]);
        sid
    }

    /// Returns the number of meaningful bytes.
    pub const fn size(&self) -> usize {
        NTSID_HEADER_SIZE + self.auth_count as usize * 4
    }

    const fn max_size() -> usize {
        NTSID_HEADER_SIZE + NTSID_MAX_AUTHORITIES * 4
    }

    fn meaningful_sub_authorities(&self) -> &[u32] {
        &self.sub_authorities[..(self.auth_count as usize).min(NTSID_MAX_AUTHORITIES)]
    }
}

impl PartialEq for Ntsid {
    fn eq(&self, other: &Self) -> bool {
        self.size() == other.size()
            && self.size() <= Self::max_size()
            && self.kind == other.kind
            && self.authority == other.authority
            && self.meaningful_sub_authorities() == other.meaningful_sub_authorities()
    }
}

impl fmt::Debug for Ntsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let authority = self
            .authority
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | *byte as u64);
        write!(f, "S-{}-{}", self.kind, authority)?;
        for sub in self.meaningful_sub_authorities() {
            write!(f, "-{}", sub)?;
        }
        Ok(())
    }
}
