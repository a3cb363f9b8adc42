// SPDX-License-Identifier: MPL-2.0

//! Group membership queries on credentials.
//!
//! The inline group list of a credential is always checked first. Beyond
//! it, membership is resolved externally for the credential's gmuid, unless
//! the credential opted out with a gmuid of `Uid::NONE`.

use crate::{
    credentials::{Credential, PosixCred},
    identity::{IdentityKey, IdentitySource, WellKnownGuid},
    prelude::*,
    resolver::{ExtLookup, LookupFlags},
    time::is_expired,
    Kauth,
};

impl Kauth {
    /// Returns whether `cred` is a member of `gid`.
    ///
    /// Fails with `ENOENT` if the resolver answered without a verdict, and
    /// with the resolver's error if the resolver could not be asked.
    pub fn is_member_gid(&self, ctx: &Context, cred: &Credential, gid: Gid) -> Result<bool> {
        self.posix_is_member(ctx, cred.posix(), gid)
    }

    /// Like [`Kauth::is_member_gid`], for a credential that is not published.
    pub(crate) fn posix_is_member(&self, ctx: &Context, posix: &PosixCred, gid: Gid) -> Result<bool> {
        if posix.groups().contains(&gid) {
            return Ok(true);
        }

        let gmuid = posix.gmuid;
        if gmuid.is_none() || !self.config().ext_resolver() {
            return Ok(false);
        }
        // Without a resolver the inline list is all there is.
        if !self.resolver().is_registered() {
            return Ok(false);
        }

        if let Some(is_member) = self.group_cache().lookup(gmuid, gid, self.now()) {
            trace!("kauth: group cache hit for {:?} in {:?}", gmuid, gid);
            return Ok(is_member);
        }

        let request = ExtLookup {
            flags: LookupFlags::VALID_UID | LookupFlags::VALID_GID | LookupFlags::WANT_MEMBERSHIP,
            info_pid: ctx.pid(),
            uid: gmuid,
            gid,
            ..Default::default()
        };
        let response = self.resolver().submit(ctx.sig_pending(), request, None)?;
        let lookup = response.lookup;
        self.group_cache().update(&lookup, self.now());

        if !lookup.flags.contains(LookupFlags::VALID_MEMBERSHIP) {
            return_errno_with_message!(Errno::ENOENT, "the resolver did not decide the membership");
        }
        Ok(lookup.flags.contains(LookupFlags::ISMEMBER))
    }

    /// Returns whether `cred` is a member of the group `guid` names.
    ///
    /// A GUID that turns out to name a user, or nothing at all, has no
    /// members.
    pub fn is_member_guid(&self, ctx: &Context, cred: &Credential, guid: Guid) -> Result<bool> {
        match guid.well_known() {
            WellKnownGuid::Nobody => return Ok(false),
            WellKnownGuid::Everybody => return Ok(true),
            _ => {}
        }

        if self.config().ext_resolver() {
            let cached = self.identity_cache().find(&IdentitySource::Guid(guid));
            if let Some(record) = cached.filter(|record| !is_expired(record.guid_expiry, self.now())) {
                return match record.key {
                    IdentityKey::Group(gid) => self.is_member_gid(ctx, cred, gid),
                    IdentityKey::User(_) => Ok(false),
                };
            }
        }

        match self.guid2gid(ctx, guid) {
            Ok(gid) => self.is_member_gid(ctx, cred, gid),
            Err(err) if err.error() == Errno::ENOENT => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Returns whether every group of `cred1` is also a group of `cred2`.
    ///
    /// The real and saved groups of both credentials take part.
    pub fn gid_subset(&self, ctx: &Context, cred1: &Credential, cred2: &Credential) -> Result<bool> {
        let groups = cred1
            .groups()
            .iter()
            .copied()
            .chain([cred1.rgid(), cred1.svgid()]);
        for gid in groups {
            let is_member = self.is_member_gid(ctx, cred2, gid)?;
            if !is_member && gid != cred2.rgid() && gid != cred2.svgid() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Returns whether `cred` is the superuser.
pub fn issuser(cred: &Credential) -> bool {
    cred.uid().is_root()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::KauthConfig,
        credentials::CredTemplate,
        resolver::mock::MockResolver,
        time::ManualClock,
    };

    fn kauth() -> Arc<Kauth> {
        let mut config = KauthConfig::default();
        config.set_no_resolver_grace(Duration::from_millis(10));
        Arc::new(Kauth::new(config, Arc::new(ManualClock::new())))
    }

    fn cred(kauth: &Kauth, uid: u32, groups: &[u32], gmuid: Uid) -> Credential {
        let mut posix = PosixCred::new(Uid::new(uid), Gid::new(groups[0]));
        let groups: Vec<Gid> = groups.iter().copied().map(Gid::new).collect();
        posix.set_groups(&groups);
        posix.gmuid = gmuid;
        kauth.creds().add(CredTemplate::new(posix))
    }

    /// Answers membership requests: `uid` is a member of the listed groups.
    fn membership_resolver(kauth: &Arc<Kauth>, members: &'static [u32]) -> MockResolver {
        MockResolver::spawn(kauth, 100, move |lookup, _| {
            assert!(lookup.flags.contains(LookupFlags::WANT_MEMBERSHIP));
            lookup.flags |= LookupFlags::VALID_MEMBERSHIP;
            if members.contains(&lookup.gid.as_u32()) {
                lookup.flags |= LookupFlags::ISMEMBER;
            }
            None
        })
    }

    #[test]
    fn inline_groups_need_no_resolver() {
        let kauth = kauth();
        let ctx = kauth.kernel_context(1);
        let cred = cred(&kauth, 501, &[20, 12], Uid::new(501));

        assert!(kauth.is_member_gid(&ctx, &cred, Gid::new(12)).unwrap());
        // No resolver has registered, so the inline list is final.
        assert!(!kauth.is_member_gid(&ctx, &cred, Gid::new(80)).unwrap());
    }

    #[test]
    fn opted_out_credential_skips_resolver() {
        let kauth = kauth();
        let ctx = kauth.kernel_context(1);
        let resolver = membership_resolver(&kauth, &[80]);

        let cred = cred(&kauth, 501, &[20], Uid::NONE);
        assert!(!kauth.is_member_gid(&ctx, &cred, Gid::new(80)).unwrap());
        kauth.resolver().deregister();
        assert_eq!(resolver.stop(), 0);
    }

    #[test]
    fn resolver_answer_is_cached() {
        let kauth = kauth();
        let ctx = kauth.kernel_context(1);
        let resolver = membership_resolver(&kauth, &[80]);

        let cred = cred(&kauth, 501, &[20], Uid::new(501));
        assert!(kauth.is_member_gid(&ctx, &cred, Gid::new(80)).unwrap());
        assert!(!kauth.is_member_gid(&ctx, &cred, Gid::new(81)).unwrap());
        assert!(kauth.is_member_gid(&ctx, &cred, Gid::new(80)).unwrap());
        assert!(!kauth.is_member_gid(&ctx, &cred, Gid::new(81)).unwrap());
        assert_eq!(kauth.group_cache().len(), 2);

        kauth.resolver().deregister();
        assert_eq!(resolver.stop(), 2);
    }

    #[test]
    fn missing_verdict_is_enoent() {
        let kauth = kauth();
        let ctx = kauth.kernel_context(1);
        let resolver = MockResolver::spawn(&kauth, 100, |_, _| None);

        let cred = cred(&kauth, 501, &[20], Uid::new(501));
        let err = kauth.is_member_gid(&ctx, &cred, Gid::new(80)).unwrap_err();
        assert_eq!(err.error(), Errno::ENOENT);
        assert!(kauth.group_cache().is_empty());

        kauth.resolver().deregister();
        assert_eq!(resolver.stop(), 1);
    }

    #[test]
    fn well_known_guids() {
        let kauth = kauth();
        let ctx = kauth.kernel_context(1);
        let cred = cred(&kauth, 501, &[20], Uid::new(501));

        assert!(kauth.is_member_guid(&ctx, &cred, Guid::everybody()).unwrap());
        assert!(!kauth.is_member_guid(&ctx, &cred, Guid::nobody()).unwrap());
    }

    #[test]
    fn member_of_cached_group_guid() {
        let kauth = kauth();
        let ctx = kauth.kernel_context(1);
        let cred = cred(&kauth, 501, &[20], Uid::new(501));

        let group = Guid::new([0x20; 16]);
        let user = Guid::new([0x01; 16]);
        kauth.identity_cache().update(
            &ExtLookup {
                flags: LookupFlags::VALID_GID | LookupFlags::VALID_GGUID,
                gid: Gid::new(20),
                gguid: group,
                ..Default::default()
            },
            None,
            0,
        );
        kauth.identity_cache().update(
            &ExtLookup {
                flags: LookupFlags::VALID_UID | LookupFlags::VALID_UGUID,
                uid: Uid::new(501),
                uguid: user,
                ..Default::default()
            },
            None,
            0,
        );

        assert!(kauth.is_member_guid(&ctx, &cred, group).unwrap());
        assert!(!kauth.is_member_guid(&ctx, &cred, user).unwrap());
    }

    #[test]
    fn unknown_guid_without_resolver_fails() {
        let kauth = kauth();
        let ctx = kauth.kernel_context(1);
        let cred = cred(&kauth, 501, &[20], Uid::new(501));

        let err = kauth
            .is_member_guid(&ctx, &cred, Guid::new([0x33; 16]))
            .unwrap_err();
        assert_eq!(err.error(), Errno::EWOULDBLOCK);
    }

    #[test]
    fn subset_counts_real_and_saved_groups() {
        let kauth = kauth();
        let ctx = kauth.kernel_context(1);
        let small = cred(&kauth, 501, &[20], Uid::NONE);
        let large = cred(&kauth, 501, &[20, 12, 61], Uid::NONE);

        assert!(kauth.gid_subset(&ctx, &small, &large).unwrap());
        assert!(!kauth.gid_subset(&ctx, &large, &small).unwrap());

        let mut posix = small.posix().clone();
        posix.rgid = Gid::new(12);
        posix.svgid = Gid::new(61);
        let with_real = kauth.creds().add(CredTemplate::new(posix));
        assert!(kauth.gid_subset(&ctx, &large, &with_real).unwrap());
    }

    #[test]
    fn superuser() {
        let kauth = kauth();
        assert!(issuser(&kauth.kernel_cred()));
        assert!(!issuser(&cred(&kauth, 501, &[20], Uid::NONE)));
    }
}
