// SPDX-License-Identifier: MPL-2.0

//! The message exchanged with the user-space identity resolver.

use crate::{
    identity::{MAXPATHLEN, NGROUPS},
    prelude::*,
};

bitflags! {
    /// Which fields of an [`ExtLookup`] are filled in (`VALID_*`) or asked
    /// for (`WANT_*`).
    #[derive(Default)]
    pub struct LookupFlags: u32 {
        const VALID_UID = 1 << 0;
        const WANT_UID = 1 << 1;
        const VALID_UGUID = 1 << 2;
        const WANT_UGUID = 1 << 3;
        const VALID_USID = 1 << 4;
        const WANT_USID = 1 << 5;
        const VALID_GID = 1 << 6;
        const WANT_GID = 1 << 7;
        const VALID_GGUID = 1 << 8;
        const WANT_GGUID = 1 << 9;
        const VALID_GSID = 1 << 10;
        const WANT_GSID = 1 << 11;
        const WANT_MEMBERSHIP = 1 << 12;
        const VALID_MEMBERSHIP = 1 << 13;
        const ISMEMBER = 1 << 14;
        const VALID_PWNAM = 1 << 15;
        const WANT_PWNAM = 1 << 16;
        const VALID_GRNAM = 1 << 17;
        const WANT_GRNAM = 1 << 18;
        const VALID_SUPGRPS = 1 << 19;
        const WANT_SUPGRPS = 1 << 20;
    }
}

impl LookupFlags {
    /// The flags marking a name carried next to the message.
    pub const VALID_NAME: LookupFlags = LookupFlags::from_bits_truncate(
        LookupFlags::VALID_PWNAM.bits() | LookupFlags::VALID_GRNAM.bits(),
    );

    /// The flags asking the resolver to send a name back.
    pub const WANT_NAME: LookupFlags = LookupFlags::from_bits_truncate(
        LookupFlags::WANT_PWNAM.bits() | LookupFlags::WANT_GRNAM.bits(),
    );
}

/// The status the resolver reports for a request.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    Success = 0,
    /// The request was malformed.
    BadRequest = 1,
    /// A transient failure.
    Failure = 2,
    /// The resolver is going away.
    Fatal = 3,
    /// Sent by resolvers that do not fill in the status.
    InProgress = 100,
}

impl TryFrom<u32> for LookupResult {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        let result = match value {
            0 => LookupResult::Success,
            1 => LookupResult::BadRequest,
            2 => LookupResult::Failure,
            3 => LookupResult::Fatal,
            100 => LookupResult::InProgress,
            _ => return_errno_with_message!(Errno::EINVAL, "unknown lookup result"),
        };
        Ok(result)
    }
}

/// A request to, or a response from, the identity resolver.
///
/// The `*_valid` fields are time-to-live values in seconds for the
/// corresponding translation; zero means the answer never expires.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct ExtLookup {
    pub seqno: u32,
    pub result: u32,
    pub flags: LookupFlags,
    pub info_pid: u32,
    pub uid: Uid,
    pub uguid: Guid,
    pub uguid_valid: u32,
    pub usid: Ntsid,
    pub usid_valid: u32,
    pub gid: Gid,
    pub gguid: Guid,
    pub gguid_valid: u32,
    pub gsid: Ntsid,
    pub gsid_valid: u32,
    pub member_valid: u32,
    pub sup_grp_cnt: u32,
    pub sup_groups: [Gid; NGROUPS],
}

impl ExtLookup {
    /// Returns the supplementary groups carried by the message.
    pub fn sup_groups(&self) -> &[Gid] {
        let count = (self.sup_grp_cnt as usize).min(NGROUPS);
        &self.sup_groups[..count]
    }

    pub fn set_sup_groups(&mut self, groups: &[Gid]) {
        let count = groups.len().min(NGROUPS);
        self.sup_groups[..count].copy_from_slice(&groups[..count]);
        self.sup_grp_cnt = count as u32;
    }
}

/// Reads a NUL-terminated name out of a resolver-supplied buffer.
pub(crate) fn read_name(buf: &[u8]) -> Result<String> {
    let limit = buf.len().min(MAXPATHLEN);
    let Some(len) = buf[..limit].iter().position(|byte| *byte == 0) else {
        return_errno_with_message!(Errno::ENAMETOOLONG, "the name is not terminated");
    };
    Ok(core::str::from_utf8(&buf[..len])?.to_string())
}

/// Writes `name` and a terminating NUL into a resolver-supplied buffer.
pub(crate) fn write_name(name: &str, buf: &mut [u8]) -> Result<()> {
    let len = name.len();
    if len + 1 > MAXPATHLEN || len + 1 > buf.len() {
        return_errno_with_message!(Errno::ENAMETOOLONG, "the name does not fit");
    }
    buf[..len].copy_from_slice(name.as_bytes());
    buf[len] = 0;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn name_transfer() {
        let mut buf = [0xffu8; 16];
        write_name("root", &mut buf).unwrap();
        assert_eq!(&buf[..5], b"root\0");
        assert_eq!(read_name(&buf).unwrap(), "root");

        let mut small = [0u8; 4];
        assert_eq!(
            write_name("root", &mut small).unwrap_err().error(),
            Errno::ENAMETOOLONG
        );
        assert_eq!(read_name(b"root").unwrap_err().error(), Errno::ENAMETOOLONG);
        assert_eq!(read_name(b"\xff\xfe\0").unwrap_err().error(), Errno::EINVAL);
    }

    #[test]
    fn sup_groups_are_clamped() {
        let mut lookup = ExtLookup::default();
        let groups: Vec<Gid> = (0..20).map(Gid::new).collect();
        lookup.set_sup_groups(&groups);
        assert_eq!(lookup.sup_grp_cnt as usize, NGROUPS);
        assert_eq!(lookup.sup_groups(), &groups[..NGROUPS]);

        lookup.sup_grp_cnt = 100;
        assert_eq!(lookup.sup_groups().len(), NGROUPS);
    }

    #[test]
    fn result_codes() {
        assert_eq!(LookupResult::try_from(3).unwrap(), LookupResult::Fatal);
        assert_eq!(LookupResult::try_from(100).unwrap(), LookupResult::InProgress);
        assert!(LookupResult::try_from(4).is_err());
        assert_eq!(
            LookupFlags::VALID_NAME,
            LookupFlags::VALID_PWNAM | LookupFlags::VALID_GRNAM
        );
    }
}
