// SPDX-License-Identifier: MPL-2.0

//! Translations between local and external identities.
//!
//! Every `x2y` function goes through [`Kauth::cache_lookup`], which answers
//! from the identity cache while the translation is fresh and asks the
//! resolver otherwise. Without an external resolver, only UIDs and GIDs
//! translate to and from synthesized GUIDs.

use crate::{
    cache::{GroupList, IdentityRecord},
    credentials::Credential,
    identity::{IdentityKey, IdentityKind, IdentitySource},
    prelude::*,
    resolver::{ExtLookup, LookupFlags},
    time::is_expired,
    Kauth,
};

/// The result of a translation.
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    Uid(Uid),
    Gid(Gid),
    Guid(Guid),
    Ntsid(Ntsid),
    /// A user or group name.
    Name(String),
    Groups(GroupList),
}

impl Translation {
    pub fn into_uid(self) -> Result<Uid> {
        match self {
            Translation::Uid(uid) => Ok(uid),
            _ => return_errno_with_message!(Errno::ENOENT, "the translation is not a UID"),
        }
    }

    pub fn into_gid(self) -> Result<Gid> {
        match self {
            Translation::Gid(gid) => Ok(gid),
            _ => return_errno_with_message!(Errno::ENOENT, "the translation is not a GID"),
        }
    }

    pub fn into_guid(self) -> Result<Guid> {
        match self {
            Translation::Guid(guid) => Ok(guid),
            _ => return_errno_with_message!(Errno::ENOENT, "the translation is not a GUID"),
        }
    }

    pub fn into_ntsid(self) -> Result<Ntsid> {
        match self {
            Translation::Ntsid(ntsid) => Ok(ntsid),
            _ => return_errno_with_message!(Errno::ENOENT, "the translation is not an NTSID"),
        }
    }

    pub fn into_name(self) -> Result<String> {
        match self {
            Translation::Name(name) => Ok(name),
            _ => return_errno_with_message!(Errno::ENOENT, "the translation is not a name"),
        }
    }

    pub fn into_groups(self) -> Result<GroupList> {
        match self {
            Translation::Groups(groups) => Ok(groups),
            _ => return_errno_with_message!(Errno::ENOENT, "the translation is not a group list"),
        }
    }
}

/// Returns the field whose expiry decides whether a cached `from` to `to`
/// translation is still fresh, or `None` if it never goes stale.
///
/// The expiry of the target wins; a target without an expiry of its own
/// falls back to the expiry of the source.
pub(crate) fn governing_expiry(from: IdentityKind, to: IdentityKind) -> Option<IdentityKind> {
    let expiring = |kind| {
        matches!(
            kind,
            IdentityKind::Guid | IdentityKind::Ntsid | IdentityKind::Groups
        )
    };
    if expiring(to) {
        Some(to)
    } else if matches!(from, IdentityKind::Guid | IdentityKind::Ntsid) {
        Some(from)
    } else {
        None
    }
}

fn is_stale(record: &IdentityRecord, from: IdentityKind, to: IdentityKind, now: u64) -> bool {
    let expiry = match governing_expiry(from, to) {
        Some(IdentityKind::Guid) => record.guid_expiry,
        Some(IdentityKind::Ntsid) => record.ntsid_expiry,
        Some(IdentityKind::Groups) => record.groups_expiry,
        _ => return false,
    };
    is_expired(expiry, now)
}

fn translation_of(record: &IdentityRecord, to: IdentityKind) -> Option<Translation> {
    match (to, record.key) {
        (IdentityKind::Uid, IdentityKey::User(uid)) => Some(Translation::Uid(uid)),
        (IdentityKind::Gid, IdentityKey::Group(gid)) => Some(Translation::Gid(gid)),
        (IdentityKind::Guid, _) => record.guid.map(Translation::Guid),
        (IdentityKind::Ntsid, _) => record.ntsid.map(Translation::Ntsid),
        (IdentityKind::Pwnam, IdentityKey::User(_)) | (IdentityKind::Grnam, IdentityKey::Group(_)) => {
            record.name.clone().map(Translation::Name)
        }
        (IdentityKind::Groups, _) => record.groups.clone().map(Translation::Groups),
        _ => None,
    }
}

/// Returns whether the cached entry proves that an external identity
/// belongs to the other namespace than the one asked for.
fn is_other_namespace(record: &IdentityRecord, from: IdentityKind, to: IdentityKind) -> bool {
    if !matches!(from, IdentityKind::Guid | IdentityKind::Ntsid) {
        return false;
    }
    match to {
        IdentityKind::Gid => record.key.uid().is_some(),
        IdentityKind::Uid => record.key.gid().is_some(),
        _ => false,
    }
}

impl Kauth {
    /// Translates `from` into its `to` representation.
    ///
    /// A fresh cached translation is returned without blocking. Otherwise
    /// the resolver is asked for everything it knows about `from`, and its
    /// answer goes into the identity cache before the translation is read
    /// back from it.
    pub fn cache_lookup(
        &self,
        ctx: &Context,
        from: IdentitySource,
        to: IdentityKind,
    ) -> Result<Translation> {
        if !self.config().ext_resolver() {
            return compat_lookup(from, to);
        }

        let from_kind = from.kind();
        let now = self.now();
        let cached = self.identity_cache().find(&from);
        if let Some(record) = &cached {
            if !is_stale(record, from_kind, to, now) {
                if let Some(found) = translation_of(record, to) {
                    trace!("kauth: cache hit {:?} -> {:?}", from_kind, to);
                    return Ok(found);
                }
                if is_other_namespace(record, from_kind, to) {
                    return_errno_with_message!(
                        Errno::ENOENT,
                        "the identity belongs to the other namespace"
                    );
                }
            }
        }

        let (request, name) = build_request(ctx, &from, to, cached.as_ref());
        let response = self
            .resolver()
            .submit(ctx.sig_pending(), request, name)?;
        let mut lookup = response.lookup;

        // Resolvers do not always echo the name a lookup was made by.
        match from {
            IdentitySource::Pwnam(_) => lookup.flags |= LookupFlags::VALID_PWNAM,
            IdentitySource::Grnam(_) => lookup.flags |= LookupFlags::VALID_GRNAM,
            _ => {}
        }

        let record = self
            .identity_cache()
            .update(&lookup, response.name.as_deref(), self.now());
        match record.as_ref().and_then(|record| translation_of(record, to)) {
            Some(found) => Ok(found),
            None => return_errno_with_message!(Errno::ENOENT, "the resolver has no such translation"),
        }
    }

    pub fn uid2guid(&self, ctx: &Context, uid: Uid) -> Result<Guid> {
        self.cache_lookup(ctx, IdentitySource::Uid(uid), IdentityKind::Guid)?
            .into_guid()
    }

    pub fn uid2ntsid(&self, ctx: &Context, uid: Uid) -> Result<Ntsid> {
        self.cache_lookup(ctx, IdentitySource::Uid(uid), IdentityKind::Ntsid)?
            .into_ntsid()
    }

    pub fn uid2pwnam(&self, ctx: &Context, uid: Uid) -> Result<String> {
        self.cache_lookup(ctx, IdentitySource::Uid(uid), IdentityKind::Pwnam)?
            .into_name()
    }

    /// Returns up to `max` supplementary groups of `uid`.
    pub fn uid2groups(&self, ctx: &Context, uid: Uid, max: usize) -> Result<GroupList> {
        let mut groups = self
            .cache_lookup(ctx, IdentitySource::Uid(uid), IdentityKind::Groups)?
            .into_groups()?;
        groups.truncate(max);
        Ok(groups)
    }

    pub fn gid2guid(&self, ctx: &Context, gid: Gid) -> Result<Guid> {
        self.cache_lookup(ctx, IdentitySource::Gid(gid), IdentityKind::Guid)?
            .into_guid()
    }

    pub fn gid2ntsid(&self, ctx: &Context, gid: Gid) -> Result<Ntsid> {
        self.cache_lookup(ctx, IdentitySource::Gid(gid), IdentityKind::Ntsid)?
            .into_ntsid()
    }

    pub fn gid2grnam(&self, ctx: &Context, gid: Gid) -> Result<String> {
        self.cache_lookup(ctx, IdentitySource::Gid(gid), IdentityKind::Grnam)?
            .into_name()
    }

    pub fn guid2uid(&self, ctx: &Context, guid: Guid) -> Result<Uid> {
        self.cache_lookup(ctx, IdentitySource::Guid(guid), IdentityKind::Uid)?
            .into_uid()
    }

    pub fn guid2gid(&self, ctx: &Context, guid: Guid) -> Result<Gid> {
        self.cache_lookup(ctx, IdentitySource::Guid(guid), IdentityKind::Gid)?
            .into_gid()
    }

    pub fn guid2ntsid(&self, ctx: &Context, guid: Guid) -> Result<Ntsid> {
        self.cache_lookup(ctx, IdentitySource::Guid(guid), IdentityKind::Ntsid)?
            .into_ntsid()
    }

    pub fn guid2pwnam(&self, ctx: &Context, guid: Guid) -> Result<String> {
        self.cache_lookup(ctx, IdentitySource::Guid(guid), IdentityKind::Pwnam)?
            .into_name()
    }

    pub fn guid2grnam(&self, ctx: &Context, guid: Guid) -> Result<String> {
        self.cache_lookup(ctx, IdentitySource::Guid(guid), IdentityKind::Grnam)?
            .into_name()
    }

    pub fn ntsid2uid(&self, ctx: &Context, ntsid: Ntsid) -> Result<Uid> {
        self.cache_lookup(ctx, IdentitySource::Ntsid(ntsid), IdentityKind::Uid)?
            .into_uid()
    }

    pub fn ntsid2gid(&self, ctx: &Context, ntsid: Ntsid) -> Result<Gid> {
        self.cache_lookup(ctx, IdentitySource::Ntsid(ntsid), IdentityKind::Gid)?
            .into_gid()
    }

    pub fn ntsid2guid(&self, ctx: &Context, ntsid: Ntsid) -> Result<Guid> {
        self.cache_lookup(ctx, IdentitySource::Ntsid(ntsid), IdentityKind::Guid)?
            .into_guid()
    }

    pub fn pwnam2uid(&self, ctx: &Context, name: &str) -> Result<Uid> {
        self.cache_lookup(ctx, IdentitySource::Pwnam(name), IdentityKind::Uid)?
            .into_uid()
    }

    pub fn pwnam2guid(&self, ctx: &Context, name: &str) -> Result<Guid> {
        self.cache_lookup(ctx, IdentitySource::Pwnam(name), IdentityKind::Guid)?
            .into_guid()
    }

    pub fn grnam2gid(&self, ctx: &Context, name: &str) -> Result<Gid> {
        self.cache_lookup(ctx, IdentitySource::Grnam(name), IdentityKind::Gid)?
            .into_gid()
    }

    pub fn grnam2guid(&self, ctx: &Context, name: &str) -> Result<Guid> {
        self.cache_lookup(ctx, IdentitySource::Grnam(name), IdentityKind::Guid)?
            .into_guid()
    }

    /// Returns the GUID of the effective user of `cred`.
    pub fn cred_getguid(&self, ctx: &Context, cred: &Credential) -> Result<Guid> {
        self.uid2guid(ctx, cred.uid())
    }

    /// Returns the NTSID of the effective user of `cred`.
    pub fn cred_getntsid(&self, ctx: &Context, cred: &Credential) -> Result<Ntsid> {
        self.uid2ntsid(ctx, cred.uid())
    }
}

/// Builds the resolver request for a cache miss.
///
/// The request asks for every field the identity cache keeps, so that one
/// round trip answers the translations likely to follow.
fn build_request(
    ctx: &Context,
    from: &IdentitySource,
    to: IdentityKind,
    cached: Option<&IdentityRecord>,
) -> (ExtLookup, Option<String>) {
    let mut request = ExtLookup {
        info_pid: ctx.pid(),
        ..Default::default()
    };
    let mut name = None;
    match *from {
        IdentitySource::Uid(uid) => {
            request.flags = LookupFlags::VALID_UID;
            request.uid = uid;
        }
        IdentitySource::Gid(gid) => {
            request.flags = LookupFlags::VALID_GID;
            request.gid = gid;
        }
        IdentitySource::Guid(guid) => {
            request.flags = LookupFlags::VALID_UGUID | LookupFlags::VALID_GGUID;
            request.uguid = guid;
            request.gguid = guid;
        }
        IdentitySource::Ntsid(ntsid) => {
            request.flags = LookupFlags::VALID_USID | LookupFlags::VALID_GSID;
            request.usid = ntsid;
            request.gsid = ntsid;
        }
        IdentitySource::Pwnam(pwnam) => {
            request.flags = LookupFlags::VALID_PWNAM;
            name = Some(pwnam.to_string());
        }
        IdentitySource::Grnam(grnam) => {
            request.flags = LookupFlags::VALID_GRNAM;
            name = Some(grnam.to_string());
        }
    }

    request.flags |= LookupFlags::WANT_UID
        | LookupFlags::WANT_GID
        | LookupFlags::WANT_UGUID
        | LookupFlags::WANT_GGUID
        | LookupFlags::WANT_USID
        | LookupFlags::WANT_GSID;
    match to {
        IdentityKind::Pwnam => request.flags |= LookupFlags::WANT_PWNAM,
        IdentityKind::Grnam => request.flags |= LookupFlags::WANT_GRNAM,
        IdentityKind::Groups => {
            request.flags |= LookupFlags::WANT_SUPGRPS;
            // Tell the resolver which groups were valid last time.
            if let Some(groups) = cached.and_then(|record| record.groups.as_ref()) {
                request.set_sup_groups(groups);
                request.flags |= LookupFlags::VALID_SUPGRPS;
            }
        }
        _ => {}
    }
    (request, name)
}

/// Translates between IDs and synthesized GUIDs, with no resolver involved.
fn compat_lookup(from: IdentitySource, to: IdentityKind) -> Result<Translation> {
    let found = match (from, to) {
        (IdentitySource::Uid(uid), IdentityKind::Guid) => Some(Translation::Guid(Guid::from_compat_uid(uid))),
        (IdentitySource::Gid(gid), IdentityKind::Guid) => Some(Translation::Guid(Guid::from_compat_gid(gid))),
        (IdentitySource::Guid(guid), IdentityKind::Uid) => guid.compat_uid().map(Translation::Uid),
        (IdentitySource::Guid(guid), IdentityKind::Gid) => guid.compat_gid().map(Translation::Gid),
        _ => None,
    };
    match found {
        Some(found) => Ok(found),
        None => return_errno_with_message!(
            Errno::ENOENT,
            "the translation needs an external resolver"
        ),
    }
}
