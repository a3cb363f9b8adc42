// SPDX-License-Identifier: MPL-2.0

//! A resolver daemon living in a thread, for tests.

use std::thread::{self, JoinHandle};

use super::{read_name, ExtLookup, LookupFlags, LookupResult};
use crate::{identity::MAXPATHLEN, prelude::*, sync::SigPending, Kauth};

pub(crate) struct MockResolver {
    sig: Arc<SigPending>,
    handle: JoinHandle<usize>,
}

impl MockResolver {
    /// Registers `pid` as the resolver and answers requests with `answer`.
    ///
    /// `answer` gets the request with its status preset to success, and the
    /// name the request carries. It fills in the response and returns the
    /// name to send back.
    pub(crate) fn spawn<F>(kauth: &Arc<Kauth>, pid: u32, mut answer: F) -> Self
    where
        F: FnMut(&mut ExtLookup, Option<String>) -> Option<String> + Send + 'static,
    {
        kauth.resolver().register(pid, 0);

        let sig = Arc::new(SigPending::new());
        let kauth = kauth.clone();
        let sig_cloned = sig.clone();
        let handle = thread::spawn(move || {
            let mut served = 0;
            let mut buf = vec![0u8; MAXPATHLEN];
            while let Ok(mut lookup) = kauth.resolver().getwork(&sig_cloned, &mut buf) {
                let name = if lookup.flags.intersects(LookupFlags::VALID_NAME) {
                    read_name(&buf).ok()
                } else {
                    None
                };
                lookup.result = LookupResult::Success as u32;
                let reply = answer(&mut lookup, name).map(|mut name| {
                    name.push('\0');
                    name.into_bytes()
                });
                let _ = kauth.resolver().complete(&lookup, reply.as_deref());
                served += 1;
            }
            served
        });

        Self { sig, handle }
    }

    /// Stops answering and returns the number of requests answered.
    pub(crate) fn stop(self) -> usize {
        self.sig.raise();
        self.handle.join().unwrap()
    }
}
