// SPDX-License-Identifier: MPL-2.0

use core::fmt;

use super::{Gid, Uid};

/// A 128-bit identifier issued by an external directory service.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Guid([u8; 16]);

/// The prefix shared by the well-known GUIDs and the synthesized group GUIDs.
const WELL_KNOWN_PREFIX: [u8; 12] = [
    0xab, 0xcd, 0xef, 0xab, 0xcd, 0xef, 0xab, 0xcd, 0xef, 0xab, 0xcd, 0xef,
];

/// The prefix of the synthesized user GUIDs.
const COMPAT_USER_PREFIX: [u8; 12] = [
    0xff, 0xff, 0xee, 0xee, 0xdd, 0xdd, 0xcc, 0xcc, 0xbb, 0xbb, 0xaa, 0xaa,
];

const WELL_KNOWN_EVERYBODY: u32 = 0x0c;
const WELL_KNOWN_NOBODY: u32 = 0xffff_fffe;
const WELL_KNOWN_OWNER: u32 = 0x0a;
const WELL_KNOWN_GROUP: u32 = 0x10;

/// The classification of a GUID against the well-known identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnownGuid {
    /// Every identity is a member.
    Everybody,
    /// No identity is a member.
    Nobody,
    /// The owner of an object.
    Owner,
    /// The owning group of an object.
    Group,
    NotWellKnown,
}

impl Guid {
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub const fn everybody() -> Self {
        Self::with_prefix(WELL_KNOWN_PREFIX, WELL_KNOWN_EVERYBODY)
    }

    pub const fn nobody() -> Self {
        Self::with_prefix(WELL_KNOWN_PREFIX, WELL_KNOWN_NOBODY)
    }

    /// Classifies the GUID by its well-known prefix and trailing code.
    pub fn well_known(&self) -> WellKnownGuid {
        let Some(code) = self.code_after(&WELL_KNOWN_PREFIX) else {
            return WellKnownGuid::NotWellKnown;
        };
        match code {
            WELL_KNOWN_EVERYBODY => WellKnownGuid::Everybody,
            WELL_KNOWN_NOBODY => WellKnownGuid::Nobody,
            WELL_KNOWN_OWNER => WellKnownGuid::Owner,
            WELL_KNOWN_GROUP => WellKnownGuid::Group,
            _ => WellKnownGuid::NotWellKnown,
        }
    }

    /// Synthesizes the GUID of a user when no external resolver is in use.
    pub const fn from_compat_uid(uid: Uid) -> Self {
        Self::with_prefix(COMPAT_USER_PREFIX, uid.as_u32())
    }

    /// Synthesizes the GUID of a group when no external resolver is in use.
    pub const fn from_compat_gid(gid: Gid) -> Self {
        Self::with_prefix(WELL_KNOWN_PREFIX, gid.as_u32())
    }

    /// Recovers the UID from a synthesized user GUID.
    pub fn compat_uid(&self) -> Option<Uid> {
        self.code_after(&COMPAT_USER_PREFIX).map(Uid::new)
    }

    /// Recovers the GID from a synthesized group GUID.
    pub fn compat_gid(&self) -> Option<Gid> {
        self.code_after(&WELL_KNOWN_PREFIX).map(Gid::new)
    }

    const fn with_prefix(prefix: [u8; 12], code: u32) -> Self {
        let code = code.to_be_bytes();
        let mut bytes = [0u8; 16];
        let mut i = 0;
        while i < 12 {
            bytes[i] = prefix[i];
            i += 1;
        }
        bytes[12] = code[0];
        bytes[13] = code[1];
        bytes[14] = code[2];
        bytes[15] = code[3];
        Self(bytes)
    }

    fn code_after(&self, prefix: &[u8; 12]) -> Option<u32> {
        let (head, tail) = self.0.split_at(12);
        if head != prefix {
            return None;
        }
        Some(u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]))
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn well_known_codes() {
        assert_eq!(Guid::everybody().well_known(), WellKnownGuid::Everybody);
        assert_eq!(Guid::nobody().well_known(), WellKnownGuid::Nobody);

        let mut owner = *Guid::everybody().as_bytes();
        owner[15] = 0x0a;
        assert_eq!(Guid::new(owner).well_known(), WellKnownGuid::Owner);

        // A group GUID synthesized for GID 0x10 shares the prefix and code.
        assert_eq!(
            Guid::from_compat_gid(Gid::new(0x10)).well_known(),
            WellKnownGuid::Group
        );
        assert_eq!(
            Guid::from_compat_uid(Uid::new(0x0c)).well_known(),
            WellKnownGuid::NotWellKnown
        );
    }

    #[test]
    fn compat_guids_are_big_endian() {
        let guid = Guid::from_compat_uid(Uid::new(501));
        assert_eq!(
            guid.as_bytes(),
            &[
                0xff, 0xff, 0xee, 0xee, 0xdd, 0xdd, 0xcc, 0xcc, 0xbb, 0xbb, 0xaa, 0xaa, 0, 0, 0x01,
                0xf5
            ]
        );
        assert_eq!(guid.compat_uid(), Some(Uid::new(501)));
        assert_eq!(guid.compat_gid(), None);

        let guid = Guid::from_compat_gid(Gid::new(20));
        assert_eq!(guid.compat_gid(), Some(Gid::new(20)));
        assert_eq!(guid.compat_uid(), None);
    }

    #[test]
    fn debug_format() {
        let guid = Guid::new([
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ]);
        assert_eq!(
            alloc::format!("{:?}", guid),
            "00112233-4455-6677-8899-aabbccddeeff"
        );
    }
}
