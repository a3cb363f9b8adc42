// SPDX-License-Identifier: MPL-2.0

//! POSIX permission checks against a credential.

use crate::{credentials::Credential, prelude::*, Kauth};

bitflags! {
    /// The permission bits of an object's mode.
    pub struct FileMode: u16 {
        /// read by owner
        const S_IRUSR = 0o0400;
        /// write by owner
        const S_IWUSR = 0o0200;
        /// execute/search by owner
        const S_IXUSR = 0o0100;
        /// read by group
        const S_IRGRP = 0o0040;
        /// write by group
        const S_IWGRP = 0o0020;
        /// execute/search by group
        const S_IXGRP = 0o0010;
        /// read by others
        const S_IROTH = 0o0004;
        /// write by others
        const S_IWOTH = 0o0002;
        /// execute/search by others
        const S_IXOTH = 0o0001;
    }
}

impl FileMode {
    const S_IRWXU: u16 = 0o0700;
    const S_IRWXG: u16 = 0o0070;
    const S_IRWXO: u16 = 0o0007;

    /// Returns the owner bits.
    fn owner(&self) -> FileMode {
        FileMode::from_bits_truncate(self.bits() & Self::S_IRWXU)
    }

    /// Returns the group bits, moved to the owner position.
    fn group(&self) -> FileMode {
        FileMode::from_bits_truncate((self.bits() & Self::S_IRWXG) << 3)
    }

    /// Returns the bits for others, moved to the owner position.
    fn world(&self) -> FileMode {
        FileMode::from_bits_truncate((self.bits() & Self::S_IRWXO) << 6)
    }
}

impl Kauth {
    /// Checks whether `cred` may access an object in the `requested` ways.
    ///
    /// `requested` uses the owner bits. Group bits that grant less than the
    /// bits for others exclude the group's members from the extra access.
    pub fn posix_cred_access(
        &self,
        ctx: &Context,
        cred: &Credential,
        object_uid: Uid,
        object_gid: Gid,
        mode: FileMode,
        requested: FileMode,
    ) -> Result<()> {
        let requested = requested.owner();
        let (owner, group, world) = (mode.owner(), mode.group(), mode.world());

        if cred.uid() == object_uid && owner.contains(requested) {
            return Ok(());
        }

        // Group and others grant the same, so membership does not matter.
        if (group & world).contains(requested) {
            return Ok(());
        }

        // An error asking for membership counts as not being a member.
        let is_member = matches!(self.is_member_gid(ctx, cred, object_gid), Ok(true));
        let granted = if !group.contains(requested) {
            !is_member && world.contains(requested)
        } else {
            is_member || world.contains(requested)
        };
        if !granted {
            return_errno_with_message!(Errno::EACCES, "permission denied");
        }
        Ok(())
    }
}
