// SPDX-License-Identifier: MPL-2.0

//! The entry point through which the identity resolver talks to the kernel.

use crate::{
    cache::CACHE_MAX_CEILING,
    prelude::*,
    resolver::ExtLookup,
    Kauth,
};

bitflags! {
    /// The operations of [`Kauth::identitysvc`].
    ///
    /// Registering is the empty set. Only `RESULT` and `WORKER` combine.
    pub struct SvcOp: u32 {
        const RESULT = 1 << 0;
        const WORKER = 1 << 1;
        const DEREGISTER = 1 << 2;
        const GET_CACHE_SIZES = 1 << 3;
        const SET_CACHE_SIZES = 1 << 4;
        const CLEAR_CACHES = 1 << 5;
    }
}

impl SvcOp {
    pub const REGISTER: SvcOp = SvcOp::empty();
}

/// The bounds of the identity and group caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct CacheSizes {
    pub identity: u32,
    pub group: u32,
}

/// The message passed to [`Kauth::identitysvc`].
///
/// Each operation reads and writes the fields it is about.
#[derive(Debug)]
pub struct SvcMessage<'a> {
    /// The timeout in seconds a registering resolver asks for.
    pub timeout_secs: u32,
    /// The result posted by `RESULT`, overwritten by the request `WORKER` claims.
    pub lookup: ExtLookup,
    /// The NUL-terminated name travelling with `lookup`.
    pub name_buf: &'a mut [u8],
    pub cache_sizes: CacheSizes,
}

impl<'a> SvcMessage<'a> {
    pub fn new(name_buf: &'a mut [u8]) -> Self {
        Self {
            timeout_secs: 0,
            lookup: ExtLookup::default(),
            name_buf,
            cache_sizes: CacheSizes::default(),
        }
    }
}

impl Kauth {
    /// Serves one call of the identity resolver.
    ///
    /// Only an entitled process may call in. Any superuser process may
    /// register as the resolver; every other operation is reserved to the
    /// registered resolver.
    pub fn identitysvc(&self, ctx: &Context, op: SvcOp, msg: &mut SvcMessage) -> Result<()> {
        if !ctx.is_entitled() {
            debug!("kauth: pid {} is not entitled to serve identities", ctx.pid());
            return_errno_with_message!(Errno::EPERM, "the process is not entitled to serve identities");
        }

        let uid = ctx.get_current().uid();
        if op == SvcOp::REGISTER {
            if !uid.is_root() {
                debug!("kauth: pid {} refused as identity resolver", ctx.pid());
                return_errno_with_message!(Errno::EPERM, "only the superuser may resolve identities");
            }
            self.resolver().register(ctx.pid(), msg.timeout_secs);
            return Ok(());
        }

        if !uid.is_root() || self.resolver().identity() != Some(ctx.pid()) {
            debug!("kauth: call from bogus resolver {}", ctx.pid());
            return_errno_with_message!(Errno::EPERM, "the caller is not the identity resolver");
        }

        if op == SvcOp::GET_CACHE_SIZES {
            msg.cache_sizes = CacheSizes {
                identity: self.identity_cache().max() as u32,
                group: self.group_cache().max() as u32,
            };
            return Ok(());
        } else if op == SvcOp::SET_CACHE_SIZES {
            let CacheSizes { identity, group } = msg.cache_sizes;
            let (identity, group) = (identity as usize, group as usize);
            if identity > CACHE_MAX_CEILING || group > CACHE_MAX_CEILING {
                return_errno_with_message!(Errno::EINVAL, "the cache bound is too large");
            }
            self.identity_cache().set_max(identity);
            self.group_cache().set_max(group);
            return Ok(());
        } else if op == SvcOp::CLEAR_CACHES {
            self.identity_cache().trim(0);
            self.group_cache().trim(0);
        } else if op == SvcOp::DEREGISTER {
            self.resolver().deregister();
        }

        if op.contains(SvcOp::RESULT) {
            self.resolver().complete(&msg.lookup, Some(&*msg.name_buf))?;
        }
        if op.contains(SvcOp::WORKER) {
            msg.lookup = self.resolver().getwork(ctx.sig_pending(), &mut *msg.name_buf)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::*;
    use crate::{
        config::KauthConfig,
        credentials::{CredTemplate, PosixCred},
        identity::MAXPATHLEN,
        resolver::{LookupFlags, LookupResult},
        time::ManualClock,
    };

    fn kauth() -> Arc<Kauth> {
        let mut config = KauthConfig::default();
        config.set_no_resolver_grace(Duration::from_millis(10));
        Arc::new(Kauth::new(config, Arc::new(ManualClock::new())))
    }

    fn resolver_context(kauth: &Kauth, pid: u32) -> Context {
        kauth.kernel_context(pid).with_entitlement(true)
    }

    fn register(kauth: &Kauth, ctx: &Context) {
        let mut buf = [0u8; 0];
        let mut msg = SvcMessage::new(&mut buf);
        kauth.identitysvc(ctx, SvcOp::REGISTER, &mut msg).unwrap();
    }

    #[test]
    fn entitlement_is_required() {
        let kauth = kauth();
        let ctx = kauth.kernel_context(100);
        let mut buf = [0u8; 0];
        let mut msg = SvcMessage::new(&mut buf);

        let err = kauth.identitysvc(&ctx, SvcOp::REGISTER, &mut msg).unwrap_err();
        assert_eq!(err.error(), Errno::EPERM);
        assert!(!kauth.resolver().is_registered());
    }

    #[test]
    fn only_superuser_registers() {
        let kauth = kauth();
        let user = kauth
            .creds()
            .add(CredTemplate::new(PosixCred::new(Uid::new(501), Gid::new(20))));
        let ctx = Context::new(100, user).with_entitlement(true);
        let mut buf = [0u8; 0];
        let mut msg = SvcMessage::new(&mut buf);

        let err = kauth.identitysvc(&ctx, SvcOp::REGISTER, &mut msg).unwrap_err();
        assert_eq!(err.error(), Errno::EPERM);

        let root = resolver_context(&kauth, 100);
        msg.timeout_secs = 60;
        kauth.identitysvc(&root, SvcOp::REGISTER, &mut msg).unwrap();
        assert_eq!(kauth.resolver().identity(), Some(100));
        assert_eq!(kauth.resolver().timeout(), Duration::from_secs(60));
    }

    #[test]
    fn other_processes_are_refused() {
        let kauth = kauth();
        register(&kauth, &resolver_context(&kauth, 100));

        let intruder = resolver_context(&kauth, 200);
        let mut buf = [0u8; 0];
        let mut msg = SvcMessage::new(&mut buf);
        for op in [SvcOp::GET_CACHE_SIZES, SvcOp::CLEAR_CACHES, SvcOp::DEREGISTER] {
            let err = kauth.identitysvc(&intruder, op, &mut msg).unwrap_err();
            assert_eq!(err.error(), Errno::EPERM);
        }
        assert!(kauth.resolver().is_registered());
    }

    #[test]
    fn cache_sizes() {
        let kauth = kauth();
        let ctx = resolver_context(&kauth, 100);
        register(&kauth, &ctx);
        let mut buf = [0u8; 0];
        let mut msg = SvcMessage::new(&mut buf);

        kauth.identitysvc(&ctx, SvcOp::GET_CACHE_SIZES, &mut msg).unwrap();
        assert_eq!(msg.cache_sizes, CacheSizes { identity: 100, group: 100 });

        msg.cache_sizes = CacheSizes { identity: 20000, group: 5 };
        let err = kauth.identitysvc(&ctx, SvcOp::SET_CACHE_SIZES, &mut msg).unwrap_err();
        assert_eq!(err.error(), Errno::EINVAL);
        assert_eq!(kauth.group_cache().max(), 100);

        msg.cache_sizes = CacheSizes { identity: 50, group: 5 };
        kauth.identitysvc(&ctx, SvcOp::SET_CACHE_SIZES, &mut msg).unwrap();
        msg.cache_sizes = CacheSizes::default();
        kauth.identitysvc(&ctx, SvcOp::GET_CACHE_SIZES, &mut msg).unwrap();
        assert_eq!(msg.cache_sizes, CacheSizes { identity: 50, group: 5 });
    }

    #[test]
    fn clear_caches() {
        let kauth = kauth();
        let ctx = resolver_context(&kauth, 100);
        register(&kauth, &ctx);

        let lookup = ExtLookup {
            flags: LookupFlags::VALID_UID
                | LookupFlags::VALID_UGUID
                | LookupFlags::VALID_GID
                | LookupFlags::VALID_MEMBERSHIP,
            uid: Uid::new(501),
            uguid: Guid::new([0x01; 16]),
            gid: Gid::new(80),
            ..Default::default()
        };
        kauth.identity_cache().update(&lookup, None, 0);
        kauth.group_cache().update(&lookup, 0);
        assert!(!kauth.identity_cache().is_empty());
        assert!(!kauth.group_cache().is_empty());

        let mut buf = [0u8; 0];
        let mut msg = SvcMessage::new(&mut buf);
        kauth.identitysvc(&ctx, SvcOp::CLEAR_CACHES, &mut msg).unwrap();
        assert!(kauth.identity_cache().is_empty());
        assert!(kauth.group_cache().is_empty());
    }

    #[test]
    fn result_then_work() {
        let kauth = kauth();
        let ctx = resolver_context(&kauth, 100);
        register(&kauth, &ctx);

        let requester = {
            let kauth = kauth.clone();
            thread::spawn(move || {
                let ctx = kauth.kernel_context(1);
                kauth.pwnam2uid(&ctx, "alice")
            })
        };

        let mut buf = vec![0u8; MAXPATHLEN];
        let mut msg = SvcMessage::new(&mut buf);
        kauth.identitysvc(&ctx, SvcOp::WORKER, &mut msg).unwrap();
        assert!(msg.lookup.flags.contains(LookupFlags::VALID_PWNAM));
        assert_eq!(&msg.name_buf[..6], b"alice\0");

        // Answer and ask for more work in one call. The queue is then empty,
        // so the interrupted wait for work reports EINTR.
        msg.lookup.result = LookupResult::Success as u32;
        msg.lookup.flags.remove(LookupFlags::VALID_NAME);
        msg.lookup.flags |= LookupFlags::VALID_UID;
        msg.lookup.uid = Uid::new(501);
        ctx.sig_pending().raise();
        let err = kauth
            .identitysvc(&ctx, SvcOp::RESULT | SvcOp::WORKER, &mut msg)
            .unwrap_err();
        assert_eq!(err.error(), Errno::EINTR);

        assert_eq!(requester.join().unwrap().unwrap(), Uid::new(501));
    }

    #[test]
    fn deregister_ends_service() {
        let kauth = kauth();
        let ctx = resolver_context(&kauth, 100);
        register(&kauth, &ctx);

        let mut buf = [0u8; 0];
        let mut msg = SvcMessage::new(&mut buf);
        kauth.identitysvc(&ctx, SvcOp::DEREGISTER, &mut msg).unwrap();
        assert!(!kauth.resolver().is_registered());

        let err = kauth.identitysvc(&ctx, SvcOp::WORKER, &mut msg).unwrap_err();
        assert_eq!(err.error(), Errno::EPERM);
    }
}
