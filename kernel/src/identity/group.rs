// SPDX-License-Identifier: MPL-2.0

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(C)]
pub struct Gid(u32);

impl Gid {
    /// The "no group" marker accepted by the group setters.
    pub const NONE: Gid = Gid(u32::MAX - 100);

    pub const fn new(gid: u32) -> Self {
        Self(gid)
    }

    pub const fn new_root() -> Self {
        Self(ROOT_GID)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    pub const fn is_root(&self) -> bool {
        self.0 == ROOT_GID
    }

    pub const fn is_none(&self) -> bool {
        self.0 == Self::NONE.0
    }
}

const ROOT_GID: u32 = 0;

impl From<u32> for Gid {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<Gid> for u32 {
    fn from(value: Gid) -> Self {
        value.0
    }
}
