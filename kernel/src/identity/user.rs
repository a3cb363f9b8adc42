// SPDX-License-Identifier: MPL-2.0

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(C)]
pub struct Uid(u32);

impl Uid {
    /// The "no user" marker. As a credential's gmuid it opts the credential
    /// out of external group membership resolution; as a setter argument it
    /// leaves the field unchanged.
    pub const NONE: Uid = Uid(u32::MAX - 100);

    pub const fn new(uid: u32) -> Self {
        Self(uid)
    }

    pub const fn new_root() -> Self {
        Self(ROOT_UID)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    pub const fn is_root(&self) -> bool {
        self.0 == ROOT_UID
    }

    pub const fn is_none(&self) -> bool {
        self.0 == Self::NONE.0
    }
}

const ROOT_UID: u32 = 0;

impl From<u32> for Uid {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<Uid> for u32 {
    fn from(value: Uid) -> Self {
        value.0
    }
}
