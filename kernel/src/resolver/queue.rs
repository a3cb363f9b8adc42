// SPDX-License-Identifier: MPL-2.0

use hashbrown::HashMap;

use super::extlookup::{read_name, write_name, ExtLookup, LookupFlags, LookupResult};
use crate::{prelude::*, sync::SigPending};

/// The sequence number of the first request.
pub const INITIAL_SEQNO: u32 = 31337;

/// The range of timeouts, in seconds, a registering resolver may ask for.
pub const RESOLVER_TIMEOUT_RANGE: core::ops::Range<u32> = 30..10000;

const TIMEOUT_COMPLAINT_INTERVAL: u32 = 1000;
const FAILURE_COMPLAINT_INTERVAL: u32 = 100;

cfg_if::cfg_if! {
    if #[cfg(feature = "resolver_debug")] {
        /// The error reported when the resolver fails or goes away.
        pub const RESOLVER_FAILED: Errno = Errno::EOWNERDEAD;
    } else {
        /// The error reported when the resolver fails or goes away.
        pub const RESOLVER_FAILED: Errno = Errno::EIO;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkState {
    Unsubmitted,
    Submitted,
    Done,
}

struct WorkItem {
    lookup: ExtLookup,
    // The name sent with the request, replaced by the one the resolver returns.
    name: Option<String>,
    state: WorkState,
    result: Result<()>,
    waker: Arc<Waker>,
}

/// The answer of the resolver to a submitted request.
#[derive(Debug, Clone)]
pub struct Response {
    pub lookup: ExtLookup,
    pub name: Option<String>,
}

struct QueueInner {
    identity: Option<u32>,
    has_registered: bool,
    next_seqno: u32,
    timeout: Duration,
    unsubmitted: VecDeque<u32>,
    submitted: VecDeque<u32>,
    done: VecDeque<u32>,
    items: HashMap<u32, WorkItem>,
    timeout_count: u32,
    failure_count: u32,
    warned_inprogress: bool,
}

impl QueueInner {
    /// Forgets the resolver and collects the wakers of every outstanding request.
    fn disown(&mut self) -> Vec<Arc<Waker>> {
        self.identity = None;
        self.submitted
            .iter()
            .chain(self.unsubmitted.iter())
            .filter_map(|seqno| self.items.get(seqno))
            .map(|item| item.waker.clone())
            .collect()
    }

    fn remove(&mut self, seqno: u32) -> Option<WorkItem> {
        let item = self.items.remove(&seqno)?;
        let list = match item.state {
            WorkState::Unsubmitted => &mut self.unsubmitted,
            WorkState::Submitted => &mut self.submitted,
            WorkState::Done => &mut self.done,
        };
        if let Some(pos) = list.iter().position(|queued| *queued == seqno) {
            list.remove(pos);
        }
        Some(item)
    }

    fn complain_failure(&mut self, what: core::fmt::Arguments) {
        if self.failure_count % FAILURE_COMPLAINT_INTERVAL == 0 {
            warn!("kauth: identity resolver failure: {}", what);
        }
        self.failure_count = self.failure_count.wrapping_add(1);
    }
}

/// The work queue between kernel threads and the user-space identity resolver.
///
/// Requests move from the unsubmitted list to the submitted list when a
/// resolver thread claims them, and to the done list when the resolver posts
/// the answer. The submitter always removes its own request.
pub struct ResolverQueue {
    inner: Mutex<QueueInner>,
    // Resolver threads waiting for work.
    workers: WaitQueue,
    // Submitters waiting for a resolver to show up.
    registration: WaitQueue,
    grace: Duration,
}

impl ResolverQueue {
    pub fn new(timeout: Duration, grace: Duration) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                identity: None,
                has_registered: false,
                next_seqno: INITIAL_SEQNO,
                timeout,
                unsubmitted: VecDeque::new(),
                submitted: VecDeque::new(),
                done: VecDeque::new(),
                items: HashMap::new(),
                timeout_count: 0,
                failure_count: 0,
                warned_inprogress: false,
            }),
            workers: WaitQueue::new(),
            registration: WaitQueue::new(),
            grace,
        }
    }

    /// Sends a request to the resolver and waits for the answer.
    ///
    /// Without a registered resolver, this waits once for the grace period
    /// and then fails with `EWOULDBLOCK`. A request that times out before any
    /// resolver thread claimed it makes the resolver count as dead, which
    /// fails every other outstanding request.
    pub fn submit(&self, sig: &SigPending, request: ExtLookup, name: Option<String>) -> Result<Response> {
        if self.identity().is_none() {
            let _ = self.registration.pause_until_or_timeout(
                sig,
                || self.identity().map(|_| ()),
                Some(self.grace),
            );
            if self.identity().is_none() {
                return_errno_with_message!(Errno::EWOULDBLOCK, "no identity resolver is registered");
            }
        }

        let (waiter, waker) = Waiter::new_pair();
        let (seqno, timeout) = {
            let mut inner = self.inner.lock();
            let seqno = inner.next_seqno;
            inner.next_seqno = seqno.wrapping_add(1);

            let mut lookup = request;
            lookup.seqno = seqno;
            lookup.result = LookupResult::InProgress as u32;
            inner.items.insert(
                seqno,
                WorkItem {
                    lookup,
                    name,
                    state: WorkState::Unsubmitted,
                    result: Ok(()),
                    waker,
                },
            );
            inner.unsubmitted.push_back(seqno);
            (seqno, inner.timeout)
        };
        debug!("kauth: submitted resolver request {}", seqno);
        self.workers.wake_one();

        let res = waiter
            .pause_until_or_timeout(
                sig,
                || {
                    let inner = self.inner.lock();
                    match inner.items.get(&seqno) {
                        Some(item) if item.state == WorkState::Done => Some(Ok(())),
                        _ if inner.identity.is_none() => Some(Err(Error::with_message(
                            RESOLVER_FAILED,
                            "the identity resolver went away",
                        ))),
                        _ => None,
                    }
                },
                Some(timeout),
            )
            .and_then(|res| res);

        let mut orphans = None;
        let mut inner = self.inner.lock();
        let res = match res {
            Err(err) if err.error() == Errno::ETIME => {
                if inner.timeout_count % TIMEOUT_COMPLAINT_INTERVAL == 0 {
                    warn!(
                        "kauth: resolver request {} timed out ({} timeouts so far)",
                        seqno,
                        inner.timeout_count + 1
                    );
                }
                inner.timeout_count = inner.timeout_count.wrapping_add(1);

                let unclaimed = inner
                    .items
                    .get(&seqno)
                    .is_some_and(|item| item.state == WorkState::Unsubmitted);
                if unclaimed {
                    error!(
                        "kauth: identity resolver {:?} never claimed request {}, assuming it is dead",
                        inner.identity, seqno
                    );
                    orphans = Some(inner.disown());
                }
                Err(Error::with_message(
                    Errno::EWOULDBLOCK,
                    "the identity resolver timed out",
                ))
            }
            res => res,
        };
        let item = inner.remove(seqno);
        drop(inner);

        if let Some(orphans) = orphans {
            for waker in orphans {
                waker.wake_up();
            }
            self.workers.wake_all();
        }

        res?;
        let Some(item) = item else {
            return_errno_with_message!(RESOLVER_FAILED, "the resolver request vanished");
        };
        item.result?;
        Ok(Response {
            lookup: item.lookup,
            name: item.name,
        })
    }

    /// Claims the oldest unsubmitted request on behalf of a resolver thread.
    ///
    /// If the request carries a name, it is written into `name_buf`. When that
    /// fails the request stays unsubmitted.
    pub fn getwork(&self, sig: &SigPending, name_buf: &mut [u8]) -> Result<ExtLookup> {
        self.workers
            .pause_until(sig, || {
                let mut guard = self.inner.lock();
                let inner = &mut *guard;
                if inner.identity.is_none() {
                    return Some(Err(Error::with_message(
                        RESOLVER_FAILED,
                        "the identity resolver is not registered",
                    )));
                }

                let seqno = *inner.unsubmitted.front()?;
                let item = inner.items.get_mut(&seqno)?;
                if item.lookup.flags.intersects(LookupFlags::VALID_NAME) {
                    if let Some(name) = item.name.as_deref() {
                        if let Err(err) = write_name(name, name_buf) {
                            return Some(Err(err));
                        }
                    }
                }

                item.state = WorkState::Submitted;
                let lookup = item.lookup;
                inner.unsubmitted.pop_front();
                inner.submitted.push_back(seqno);
                Some(Ok(lookup))
            })
            .and_then(|res| res)
    }

    /// Posts the resolver's answer to a submitted request.
    ///
    /// `name_buf` holds the NUL-terminated name the resolver returns, if any.
    /// A fatal result does not complete the request; it makes the resolver
    /// count as dead instead.
    pub fn complete(&self, response: &ExtLookup, name_buf: Option<&[u8]>) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let mut result = Ok(());
        match LookupResult::try_from(response.result) {
            Ok(LookupResult::InProgress) => {
                if !inner.warned_inprogress {
                    warn!("kauth: the identity resolver does not set result codes, assuming success");
                    inner.warned_inprogress = true;
                }
            }
            Ok(LookupResult::Success) => {}
            Ok(LookupResult::Fatal) => {
                let identity = inner.identity;
                inner.complain_failure(format_args!(
                    "resolver {:?} died, waiting for a new one",
                    identity
                ));
                let orphans = inner.disown();
                drop(guard);
                for waker in orphans {
                    waker.wake_up();
                }
                self.workers.wake_all();
                return_errno_with_message!(RESOLVER_FAILED, "the identity resolver reported a fatal error");
            }
            Ok(LookupResult::BadRequest) => {
                debug!("kauth: resolver rejected request {}", response.seqno);
                result = Err(Error::with_message(Errno::EINVAL, "the identity resolver rejected the request"));
            }
            Ok(LookupResult::Failure) => {
                inner.complain_failure(format_args!(
                    "transient failure for request {}",
                    response.seqno
                ));
                result = Err(Error::with_message(RESOLVER_FAILED, "the identity resolver failed"));
            }
            Err(_) => {
                inner.complain_failure(format_args!(
                    "unexpected status {} for request {}",
                    response.result, response.seqno
                ));
                result = Err(Error::with_message(RESOLVER_FAILED, "the identity resolver failed"));
            }
        }

        let Some(pos) = inner
            .submitted
            .iter()
            .position(|seqno| *seqno == response.seqno)
        else {
            debug!("kauth: no submitted request {}", response.seqno);
            return Ok(());
        };
        inner.submitted.remove(pos);
        inner.done.push_back(response.seqno);

        let Some(item) = inner.items.get_mut(&response.seqno) else {
            return Ok(());
        };
        let wants_name = item.lookup.flags.intersects(LookupFlags::WANT_NAME);
        item.state = WorkState::Done;
        item.result = result;
        item.lookup = *response;

        let mut status = Ok(());
        if response.flags.intersects(LookupFlags::VALID_NAME) {
            if wants_name {
                match name_buf.map(read_name) {
                    Some(Ok(name)) => item.name = Some(name),
                    Some(Err(err)) => status = Err(err),
                    None => status = Err(Error::with_message(Errno::EFAULT, "the name is missing")),
                }
            } else {
                debug!(
                    "kauth: resolver returned a name for request {} that did not ask for one",
                    response.seqno
                );
                status = Err(Error::with_message(Errno::EFAULT, "the request did not ask for a name"));
            }
        }

        let waker = item.waker.clone();
        drop(guard);
        waker.wake_up();
        status
    }

    /// Makes `pid` the resolver.
    ///
    /// A new resolver knows nothing about the requests its predecessor
    /// claimed, so those go back to the head of the unsubmitted list. A
    /// resolver registering again changes nothing, not even the timeout.
    pub fn register(&self, pid: u32, timeout_secs: u32) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.identity == Some(pid) {
            return;
        }

        inner.identity = Some(pid);
        inner.has_registered = true;
        while let Some(seqno) = inner.submitted.pop_back() {
            inner.unsubmitted.push_front(seqno);
            if let Some(item) = inner.items.get_mut(&seqno) {
                item.state = WorkState::Unsubmitted;
            }
        }
        if RESOLVER_TIMEOUT_RANGE.contains(&timeout_secs) {
            inner.timeout = Duration::from_secs(timeout_secs as u64);
        }
        drop(guard);

        info!("kauth: identity resolver {} registered", pid);
        self.workers.wake_all();
        self.registration.wake_all();
    }

    /// Forgets the resolver and fails every outstanding request.
    pub fn deregister(&self) {
        let orphans = {
            let mut inner = self.inner.lock();
            if let Some(pid) = inner.identity {
                info!("kauth: identity resolver {} deregistered", pid);
            }
            inner.disown()
        };
        for waker in orphans {
            waker.wake_up();
        }
        self.workers.wake_all();
    }

    /// Forgets a resolver that went away without deregistering.
    pub fn identity_reset(&self) {
        let orphans = {
            let mut inner = self.inner.lock();
            let Some(pid) = inner.identity else {
                return;
            };
            warn!("kauth: identity resolver {} failed to de-register", pid);
            inner.disown()
        };
        for waker in orphans {
            waker.wake_up();
        }
        self.workers.wake_all();
    }

    /// Returns the pid of the current resolver.
    pub fn identity(&self) -> Option<u32> {
        self.inner.lock().identity
    }

    /// Returns whether a resolver is registered and has not been declared dead.
    pub fn is_registered(&self) -> bool {
        self.inner.lock().identity.is_some()
    }

    /// Returns whether any resolver has ever registered.
    pub fn has_registered(&self) -> bool {
        self.inner.lock().has_registered
    }

    pub fn timeout(&self) -> Duration {
        self.inner.lock().timeout
    }

    /// Returns the number of requests whose submitter is still waiting.
    pub fn outstanding(&self) -> usize {
        self.inner.lock().items.len()
    }
}

#[cfg(test)]
mod test {
    use std::{thread, time::Instant};

    use super::*;
    use crate::identity::MAXPATHLEN;

    fn queue(timeout: Duration) -> Arc<ResolverQueue> {
        Arc::new(ResolverQueue::new(timeout, Duration::from_millis(10)))
    }

    fn uid_request(uid: u32) -> ExtLookup {
        ExtLookup {
            flags: LookupFlags::VALID_UID | LookupFlags::WANT_UGUID,
            uid: Uid::new(uid),
            ..Default::default()
        }
    }

    fn wait_outstanding(queue: &ResolverQueue, count: usize) {
        while queue.outstanding() != count {
            thread::yield_now();
        }
    }

    #[test]
    fn submit_without_resolver_fails_fast() {
        let queue = queue(Duration::from_secs(30));
        let sig = SigPending::new();

        let err = queue.submit(&sig, uid_request(501), None).unwrap_err();
        assert_eq!(err.error(), Errno::EWOULDBLOCK);
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn request_round_trip() {
        let queue = queue(Duration::from_secs(30));
        queue.register(100, 0);
        assert_eq!(queue.identity(), Some(100));

        let submitter = {
            let queue = queue.clone();
            thread::spawn(move || queue.submit(&SigPending::new(), uid_request(501), None))
        };

        let sig = SigPending::new();
        let mut buf = [0u8; MAXPATHLEN];
        let mut work = queue.getwork(&sig, &mut buf).unwrap();
        assert_eq!(work.seqno, INITIAL_SEQNO);
        assert_eq!(work.uid, Uid::new(501));
        assert_eq!(work.result, LookupResult::InProgress as u32);

        work.flags |= LookupFlags::VALID_UGUID;
        work.uguid = Guid::new([7; 16]);
        work.result = LookupResult::Success as u32;
        queue.complete(&work, None).unwrap();

        let response = submitter.join().unwrap().unwrap();
        assert_eq!(response.lookup.uguid, Guid::new([7; 16]));
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn names_travel_both_ways() {
        let queue = queue(Duration::from_secs(30));
        queue.register(100, 0);

        let submitter = {
            let queue = queue.clone();
            thread::spawn(move || {
                let request = ExtLookup {
                    flags: LookupFlags::VALID_PWNAM | LookupFlags::WANT_UID | LookupFlags::WANT_PWNAM,
                    ..Default::default()
                };
                queue.submit(&SigPending::new(), request, Some("alice".to_string()))
            })
        };

        let sig = SigPending::new();
        let mut buf = [0u8; 64];
        let mut work = queue.getwork(&sig, &mut buf).unwrap();
        assert_eq!(read_name(&buf).unwrap(), "alice");

        work.flags |= LookupFlags::VALID_UID;
        work.uid = Uid::new(501);
        work.result = LookupResult::Success as u32;
        queue.complete(&work, Some(b"Alice\0")).unwrap();

        let response = submitter.join().unwrap().unwrap();
        assert_eq!(response.lookup.uid, Uid::new(501));
        assert_eq!(response.name.as_deref(), Some("Alice"));
    }

    #[test]
    fn short_name_buffer_leaves_request_queued() {
        let queue = queue(Duration::from_secs(30));
        queue.register(100, 0);

        let submitter = {
            let queue = queue.clone();
            thread::spawn(move || {
                let request = ExtLookup {
                    flags: LookupFlags::VALID_PWNAM | LookupFlags::WANT_UID,
                    ..Default::default()
                };
                queue.submit(&SigPending::new(), request, Some("a-long-name".to_string()))
            })
        };

        let sig = SigPending::new();
        let mut small = [0u8; 4];
        let err = queue.getwork(&sig, &mut small).unwrap_err();
        assert_eq!(err.error(), Errno::ENAMETOOLONG);

        let mut buf = [0u8; 64];
        let mut work = queue.getwork(&sig, &mut buf).unwrap();
        work.result = LookupResult::Success as u32;
        queue.complete(&work, None).unwrap();
        assert!(submitter.join().unwrap().is_ok());
    }

    #[test]
    fn unrequested_name_is_a_fault() {
        let queue = queue(Duration::from_secs(30));
        queue.register(100, 0);

        let submitter = {
            let queue = queue.clone();
            thread::spawn(move || queue.submit(&SigPending::new(), uid_request(501), None))
        };

        let sig = SigPending::new();
        let mut buf = [0u8; 16];
        let mut work = queue.getwork(&sig, &mut buf).unwrap();
        work.flags |= LookupFlags::VALID_PWNAM;
        work.result = LookupResult::Success as u32;
        let err = queue.complete(&work, Some(b"bob\0")).unwrap_err();
        assert_eq!(err.error(), Errno::EFAULT);

        let response = submitter.join().unwrap().unwrap();
        assert_eq!(response.name, None);
    }

    #[test]
    fn bad_request_reaches_submitter() {
        let queue = queue(Duration::from_secs(30));
        queue.register(100, 0);

        let submitter = {
            let queue = queue.clone();
            thread::spawn(move || queue.submit(&SigPending::new(), uid_request(501), None))
        };

        let sig = SigPending::new();
        let mut buf = [0u8; 16];
        let mut work = queue.getwork(&sig, &mut buf).unwrap();
        work.result = LookupResult::BadRequest as u32;
        queue.complete(&work, None).unwrap();

        let err = submitter.join().unwrap().unwrap_err();
        assert_eq!(err.error(), Errno::EINVAL);
        assert!(queue.is_registered());
    }

    #[test]
    fn fatal_result_fails_every_request() {
        let queue = queue(Duration::from_secs(30));
        queue.register(100, 0);

        let spawn_submitter = |uid| {
            let queue = queue.clone();
            thread::spawn(move || queue.submit(&SigPending::new(), uid_request(uid), None))
        };

        let first = spawn_submitter(501);
        let sig = SigPending::new();
        let mut buf = [0u8; 16];
        let mut work = queue.getwork(&sig, &mut buf).unwrap();

        let second = spawn_submitter(502);
        wait_outstanding(&queue, 2);

        work.result = LookupResult::Fatal as u32;
        let err = queue.complete(&work, None).unwrap_err();
        assert_eq!(err.error(), RESOLVER_FAILED);

        assert_eq!(first.join().unwrap().unwrap_err().error(), RESOLVER_FAILED);
        assert_eq!(second.join().unwrap().unwrap_err().error(), RESOLVER_FAILED);
        assert!(!queue.is_registered());
        assert!(queue.has_registered());

        let err = queue.submit(&sig, uid_request(503), None).unwrap_err();
        assert_eq!(err.error(), Errno::EWOULDBLOCK);
    }

    #[test]
    fn unclaimed_timeout_forgets_resolver() {
        let queue = queue(Duration::from_millis(50));
        queue.register(100, 0);

        let sig = SigPending::new();
        let err = queue.submit(&sig, uid_request(501), None).unwrap_err();
        assert_eq!(err.error(), Errno::EWOULDBLOCK);
        assert_eq!(queue.identity(), None);
        assert!(!queue.is_registered());
        assert_eq!(queue.outstanding(), 0);

        // The worker side notices as well.
        let mut buf = [0u8; 16];
        let err = queue.getwork(&sig, &mut buf).unwrap_err();
        assert_eq!(err.error(), RESOLVER_FAILED);
    }

    #[test]
    fn unclaimed_timeout_fails_every_waiter() {
        let queue = queue(Duration::from_secs(30));
        queue.register(100, 0);

        let spawn_submitter = |uid| {
            let queue = queue.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let res = queue.submit(&SigPending::new(), uid_request(uid), None);
                (res, start.elapsed())
            })
        };

        let claimed = spawn_submitter(501);
        let sig = SigPending::new();
        let mut buf = [0u8; 16];
        let work = queue.getwork(&sig, &mut buf).unwrap();
        assert_eq!(work.uid, Uid::new(501));

        let queued = spawn_submitter(502);
        wait_outstanding(&queue, 2);

        // Only requests submitted from now on wait briefly.
        queue.inner.lock().timeout = Duration::from_millis(50);
        let err = queue.submit(&sig, uid_request(503), None).unwrap_err();
        assert_eq!(err.error(), Errno::EWOULDBLOCK);
        assert_eq!(queue.identity(), None);
        assert!(!queue.is_registered());

        for submitter in [claimed, queued] {
            let (res, elapsed) = submitter.join().unwrap();
            assert_eq!(res.unwrap_err().error(), RESOLVER_FAILED);
            assert!(elapsed < Duration::from_secs(10));
        }
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn new_resolver_requeues_claimed_requests() {
        let queue = queue(Duration::from_secs(30));
        queue.register(100, 0);

        let submitter = {
            let queue = queue.clone();
            thread::spawn(move || queue.submit(&SigPending::new(), uid_request(501), None))
        };

        let sig = SigPending::new();
        let mut buf = [0u8; 16];
        let claimed = queue.getwork(&sig, &mut buf).unwrap();

        queue.register(200, 0);
        let mut reclaimed = queue.getwork(&sig, &mut buf).unwrap();
        assert_eq!(reclaimed.seqno, claimed.seqno);

        reclaimed.result = LookupResult::Success as u32;
        queue.complete(&reclaimed, None).unwrap();
        assert!(submitter.join().unwrap().is_ok());
    }

    #[test]
    fn register_clamps_timeout() {
        let queue = queue(Duration::from_secs(30));
        queue.register(100, 10000);
        assert_eq!(queue.timeout(), Duration::from_secs(30));
        queue.register(200, 29);
        assert_eq!(queue.timeout(), Duration::from_secs(30));
        queue.register(300, 120);
        assert_eq!(queue.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn registering_again_keeps_timeout() {
        let queue = queue(Duration::from_secs(30));
        queue.register(100, 120);
        queue.register(100, 60);
        assert_eq!(queue.timeout(), Duration::from_secs(120));
        assert_eq!(queue.identity(), Some(100));
    }

    #[test]
    fn identity_reset_forgets_resolver() {
        let queue = queue(Duration::from_secs(30));
        queue.identity_reset();
        queue.register(100, 0);
        queue.identity_reset();
        assert_eq!(queue.identity(), None);
        assert!(queue.has_registered());
    }

    #[test]
    fn signal_interrupts_submit() {
        let queue = queue(Duration::from_secs(30));
        queue.register(100, 0);

        let sig = SigPending::new();
        sig.raise();
        let err = queue.submit(&sig, uid_request(501), None).unwrap_err();
        assert_eq!(err.error(), Errno::EINTR);
        assert_eq!(queue.outstanding(), 0);
        assert!(queue.is_registered());
    }
}
