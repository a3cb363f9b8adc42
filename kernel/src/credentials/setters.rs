// SPDX-License-Identifier: MPL-2.0

//! Creating credentials and deriving changed ones.
//!
//! Every setter takes over the caller's reference to the old credential
//! and returns a reference to the result. When nothing changes, the old
//! credential itself comes back.

use super::{AuditSession, CredFlags, CredTemplate, Credential, MacLabel, PosixCred};
use crate::{cache::GroupList, identity::NGROUPS, prelude::*, Kauth};

impl Kauth {
    /// Publishes a credential built from `template`.
    ///
    /// Unless the template opts out of external group membership, its gmuid
    /// becomes its effective user. A template that cannot be checked for
    /// membership at all is opted out instead.
    pub fn create(&self, ctx: &Context, mut template: CredTemplate) -> Result<Credential> {
        let posix = &mut template.posix;
        if posix.flags.contains(CredFlags::NOMEMBERD) {
            posix.gmuid = Uid::NONE;
        } else {
            match self.posix_is_member(ctx, posix, Gid::new_root()) {
                Ok(_) => posix.gmuid = posix.uid,
                Err(err) => {
                    debug!("kauth: opting {:?} out of external membership: {}", posix.uid, err);
                    posix.gmuid = Uid::NONE;
                    posix.flags |= CredFlags::NOMEMBERD;
                }
            }
        }

        if posix.groups().is_empty() {
            return_errno_with_message!(Errno::EINVAL, "a credential needs an effective group");
        }
        Ok(self.creds().add(template))
    }

    /// Sets the real, effective and saved user ids and the gmuid.
    ///
    /// `Uid::NONE` leaves an id unchanged. A gmuid of `Uid::NONE` opts the
    /// credential out of external group membership.
    pub fn setresuid(&self, cred: Credential, ruid: Uid, euid: Uid, svuid: Uid, gmuid: Uid) -> Credential {
        let posix = cred.posix();
        let unchanged = |new: Uid, old: Uid| new.is_none() || new == old;
        if unchanged(euid, posix.uid)
            && unchanged(ruid, posix.ruid)
            && unchanged(svuid, posix.svuid)
            && posix.gmuid == gmuid
        {
            return cred;
        }

        let mut model = cred.template();
        let posix = &mut model.posix;
        if !euid.is_none() {
            posix.uid = euid;
        }
        if !ruid.is_none() {
            posix.ruid = ruid;
        }
        if !svuid.is_none() {
            posix.svuid = svuid;
        }
        posix.gmuid = gmuid;
        if gmuid.is_none() {
            posix.flags |= CredFlags::NOMEMBERD;
        }
        self.creds().update(cred, model, true)
    }

    /// Sets the real, effective and saved group ids.
    ///
    /// `Gid::NONE` leaves an id unchanged.
    pub fn setresgid(&self, cred: Credential, rgid: Gid, egid: Gid, svgid: Gid) -> Credential {
        if cred.gid() == egid && cred.rgid() == rgid && cred.svgid() == svgid {
            return cred;
        }

        let mut model = cred.template();
        if !egid.is_none() {
            let displaced = model.posix.change_egid(egid);
            self.opt_out_if_displaced(&mut model.posix, displaced);
        }
        if !rgid.is_none() {
            model.posix.rgid = rgid;
        }
        if !svgid.is_none() {
            model.posix.svgid = svgid;
        }
        self.creds().update(cred, model, true)
    }

    /// Replaces the group list, keeping at most `NGROUPS` groups, and sets
    /// the gmuid.
    pub fn setgroups(&self, cred: Credential, groups: &[Gid], gmuid: Uid) -> Credential {
        let groups = &groups[..groups.len().min(NGROUPS)];
        if cred.gmuid() == gmuid && cred.groups() == groups {
            return cred;
        }

        let mut model = cred.template();
        let posix = &mut model.posix;
        posix.set_groups(groups);
        posix.gmuid = gmuid;
        if gmuid.is_none() {
            posix.flags |= CredFlags::NOMEMBERD;
        } else {
            posix.flags -= CredFlags::NOMEMBERD;
        }
        self.creds().update(cred, model, true)
    }

    /// Makes `uid` and `gid` every user id and group id of the credential,
    /// dropping the supplementary groups.
    pub fn setuidgid(&self, cred: Credential, uid: Uid, gid: Gid) -> Credential {
        let old = cred.posix();
        if old.uid == uid
            && old.ruid == uid
            && old.svuid == uid
            && old.egid() == gid
            && old.rgid == gid
            && old.svgid == gid
        {
            return cred;
        }

        let mut posix = PosixCred::new(uid, old.egid());
        posix.flags = old.flags;
        if old.flags.contains(CredFlags::NOMEMBERD) {
            posix.gmuid = Uid::NONE;
        } else {
            posix.gmuid = uid;
        }
        // A lone group has no supplementary slot to swap with.
        let displaced = posix.change_egid(gid);
        self.opt_out_if_displaced(&mut posix, displaced);
        posix.rgid = gid;
        posix.svgid = gid;

        let model = CredTemplate {
            posix,
            audit: AuditSession::default(),
            label: cred.label().cloned(),
        };
        self.creds().update(cred, model, true)
    }

    /// Sets the saved user and group ids.
    pub fn setsvuidgid(&self, cred: Credential, uid: Uid, gid: Gid) -> Credential {
        if cred.svuid() == uid && cred.svgid() == gid {
            return cred;
        }

        let mut model = cred.template();
        model.posix.svuid = uid;
        model.posix.svgid = gid;
        self.creds().update(cred, model, true)
    }

    /// Replaces the audit session.
    pub fn setauditinfo(&self, cred: Credential, audit: AuditSession) -> Credential {
        let mut model = cred.template();
        model.audit = audit;
        self.creds().update(cred, model, false)
    }

    /// Replaces the security label.
    pub fn label_update(&self, cred: Credential, label: Option<MacLabel>) -> Credential {
        let mut model = cred.template();
        model.label = label;
        self.creds().update(cred, model, true)
    }

    /// Returns a credential whose effective ids are the real ids of `cred`.
    pub fn copy_real(&self, cred: &Credential) -> Credential {
        let old = cred.posix();
        if old.ruid == old.uid && old.rgid == old.egid() {
            return cred.clone();
        }

        let mut model = cred.template();
        let posix = &mut model.posix;
        posix.uid = old.ruid;
        let displaced = posix.change_egid(old.rgid);
        self.opt_out_if_displaced(posix, displaced);
        if !posix.gmuid.is_none() {
            posix.gmuid = old.ruid;
        }

        match self.creds().find_and_ref(&model) {
            Some(found) => found,
            None => self.creds().add(model),
        }
    }

    /// Returns up to `max` groups of `cred`.
    ///
    /// Once a resolver has registered, the external list of supplementary
    /// groups is preferred for credentials that take part in external
    /// membership. The inline list is the fallback.
    pub fn getgroups(&self, ctx: &Context, cred: &Credential, max: usize) -> GroupList {
        if self.resolver().has_registered()
            && self.config().ds_supgroups()
            && !cred.posix().flags.contains(CredFlags::NOMEMBERD)
        {
            match self.uid2groups(ctx, cred.uid(), max) {
                Ok(groups) => return groups,
                Err(err) => debug!("kauth: no external groups for {:?}: {}", cred.uid(), err),
            }
        }

        let groups = cred.groups();
        GroupList::from_slice(&groups[..groups.len().min(max)])
    }

    fn opt_out_if_displaced(&self, posix: &mut PosixCred, displaced: bool) {
        if displaced && self.config().displacement_opts_out() {
            trace!("kauth: a group of {:?} was displaced", posix.uid);
            posix.flags |= CredFlags::NOMEMBERD;
            posix.gmuid = Uid::NONE;
        }
    }
}
