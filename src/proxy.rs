//! The epoch manager and reclaimer: one [`Proxy`] per protected domain.
//!
//! Grounded on `jseigh/smrproxy`'s `src/smrproxy.c` (`smrproxy_create`,
//! `smrproxy_poll`/`poll2`, `smrproxy_retire_async_exp`/`retire_sync_exp`,
//! `smrproxy_destroy`) and the teacher's `EpochGcDomain` for the Rust-side
//! shape of a handle-returning, `Arc`-backed domain type.

use std::time::Duration;

use crate::config::Config;
use crate::epoch::{Epoch, EpochCell};
use crate::error::{CreateError, RetireError};
use crate::membarrier::{self, MembarrierSync};
use crate::queue::RetireQueue;
use crate::reference::{new_reader_slot, Reference, ReaderSlot};
use crate::sync::{cv_wait_timeout, fence, thread, Arc, AtomicBool, Condvar, CvMutex, Mutex, Ordering};

/// State protected by the condvar-paired lock: everything the reclaim cycle
/// reads or mutates besides the reader list itself.
struct QueueState {
    queue: RetireQueue,
    /// Oldest epoch not yet known to be safe to reclaim past (spec.md §3).
    head: Epoch,
    /// The epoch the membarrier was last synced against; re-syncing is
    /// skipped when the published epoch hasn't moved since (spec.md §4.5
    /// step 1).
    sync_epoch: Epoch,
}

/// One protected domain: an epoch manager paired with a bounded retire
/// queue and an optional background reclaimer thread.
///
/// Always handed out as `Arc<Proxy>` ([`Proxy::create`]) since every
/// [`Reference`] created from it needs to outlive individual borrows of the
/// proxy. Cheap to `retire` into (acquires one mutex); readers never touch
/// any lock in this type at all.
pub struct Proxy {
    /// The published epoch, shared read-only with every live `Reference`
    /// so the reader fast path never has to go through the proxy itself.
    epoch: Arc<EpochCell>,
    /// Registered reader slots, scanned by each reclaim cycle. Never
    /// locked while waiting, so `antidote`'s poison-free mutex fits
    /// (spec.md §4.5's array-of-handles re-architecture).
    readers: Mutex<Vec<Arc<ReaderSlot>>>,
    qstate: CvMutex<QueueState>,
    condvar: Condvar,
    membarrier: Box<dyn MembarrierSync>,
    config: Config,
    /// Resolved cache-line size (platform probe, or `config.cachesize` if
    /// the probe is unavailable), handed to every new reader slot so it can
    /// widen its own padding when the probe exceeds the static `align(64)`
    /// layout (spec.md §4.5, §4.7).
    cacheline: usize,
    active: AtomicBool,
    poller: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Proxy {
    /// Construct a new proxy, spawning a background reclaimer thread unless
    /// `config.polltime_ms == 0` (spec.md §4.6: callers without a poller
    /// drive reclamation via [`Proxy::reclaim_now`]).
    pub fn create(config: Option<Config>) -> Result<Arc<Proxy>, CreateError> {
        let config = config.unwrap_or_default();
        config.validate()?;

        let epoch = Arc::new(EpochCell::new(Epoch::INITIAL));
        let queue = RetireQueue::new(Epoch::INITIAL, config.queue_size)
            .map_err(|_| CreateError::InvalidQueueSize)?;

        let cacheline = config.resolve_cachesize().max(0) as usize;

        let proxy = Arc::new(Proxy {
            epoch,
            readers: Mutex::new(Vec::new()),
            qstate: CvMutex::new(QueueState {
                queue,
                head: Epoch::INITIAL,
                sync_epoch: Epoch::INITIAL,
            }),
            condvar: Condvar::new(),
            membarrier: membarrier::create(),
            config,
            cacheline,
            active: AtomicBool::new(true),
            poller: Mutex::new(None),
        });

        if proxy.config.polltime_ms > 0 {
            let handle = spawn_poller(Arc::clone(&proxy));
            *proxy.poller.lock() = Some(handle);
        }

        Ok(proxy)
    }

    /// The currently published epoch.
    #[inline]
    pub fn get_epoch(&self) -> Epoch {
        self.epoch.load(Ordering::Acquire)
    }

    /// Create a new reader reference bound to this proxy.
    ///
    /// One should be created per reader thread; the returned value is not
    /// `Sync` and must stay on the thread that created it (spec.md §3's
    /// per-thread reference, exposed here as an explicit owned value rather
    /// than implicit thread-local state).
    pub fn create_reference(self: &Arc<Self>) -> Reference {
        let slot = new_reader_slot(self.cacheline);
        self.readers.lock().push(Arc::clone(&slot));
        Reference::new(
            slot,
            Arc::clone(&self.epoch),
            Arc::downgrade(self),
            self.membarrier.is_expedited(),
        )
    }

    pub(crate) fn deregister(&self, slot: &Arc<ReaderSlot>) {
        let mut readers = self.readers.lock();
        if let Some(pos) = readers.iter().position(|s| Arc::ptr_eq(s, slot)) {
            readers.swap_remove(pos);
        }
    }

    /// Retire an object for deferred destruction. Returns its expiry epoch,
    /// or `None` if the queue stayed full after one reclaim attempt
    /// (spec.md §4.6, async path).
    pub fn retire<T: Send + 'static>(&self, obj: Box<T>) -> Option<Epoch> {
        self.retire_with_expiry_stamp(obj, |_, _| {})
    }

    /// Retire an object, stamping its assigned expiry epoch onto it via
    /// `set_expiry` before it is queued — for retired types that record
    /// their own expiry for use by a long-running [`Reference::next`]
    /// traversal (spec.md §4.4, §6).
    pub fn retire_with_expiry_stamp<T: Send + 'static>(
        &self,
        obj: Box<T>,
        set_expiry: impl FnOnce(Epoch, &T),
    ) -> Option<Epoch> {
        let mut state = self.qstate.lock();
        if state.queue.is_full() {
            drop(state);
            self.reclaim_now();
            state = self.qstate.lock();
            if state.queue.is_full() {
                return None;
            }
        }

        let expiry = state.queue.peek_next_tail();
        set_expiry(expiry, &obj);
        let assigned = state.queue.enqueue(obj);
        drop(state);
        if let Some(new_tail) = assigned {
            // Publish before waking anyone: a reclaim cycle run by the
            // poller or a concurrent `reclaim_now` must see this retire's
            // expiry reflected in `get_epoch` (spec.md §4.6 publish order).
            self.epoch.store(new_tail, Ordering::Release);
        }
        self.condvar.notify_all();
        assigned
    }

    /// Retire an object, blocking the caller until the queue has room.
    ///
    /// Fails with [`RetireError::WouldDeadlock`] if `caller` is a
    /// [`Reference`] created from this same proxy and is currently
    /// acquired: waiting for the queue to drain would wait on exactly the
    /// reference the caller itself holds, which can never release.
    /// Fails with [`RetireError::QueueFull`] if the queue is still full
    /// after a bounded number of reclaim-and-wait attempts.
    pub fn retire_sync<T: Send + 'static>(
        &self,
        obj: Box<T>,
        caller: &Reference,
    ) -> Result<Epoch, RetireError> {
        if caller.belongs_to(self) && caller.acquired_epoch().is_observation() {
            return Err(RetireError::WouldDeadlock);
        }

        let mut obj = Some(obj);
        let max_attempts = (self.config.queue_size as u64).saturating_mul(4).max(64);
        let wait = Duration::from_millis(self.config.polltime_ms.max(1) as u64);

        for _ in 0..max_attempts {
            let mut state = self.qstate.lock();
            if !state.queue.is_full() {
                let assigned = state
                    .queue
                    .enqueue(obj.take().expect("object consumed exactly once"))
                    .expect("queue was just checked non-full");
                drop(state);
                self.epoch.store(assigned, Ordering::Release);
                self.condvar.notify_all();
                return Ok(assigned);
            }
            drop(state);
            self.reclaim_now();

            let state = self.qstate.lock();
            if state.queue.is_full() {
                let _ = cv_wait_timeout(&self.condvar, state, wait);
            }
        }

        Err(RetireError::QueueFull)
    }

    /// Run one reclaim cycle synchronously and return the new head epoch.
    /// Exposed for callers that disabled the background poller
    /// (`polltime_ms == 0`) and want to drive reclamation themselves.
    pub fn reclaim_now(&self) -> Epoch {
        let current = self.get_epoch();

        {
            let mut state = self.qstate.lock();
            if current != state.sync_epoch {
                state.sync_epoch = current;
                drop(state);
                self.membarrier.sync();
                fence(Ordering::SeqCst);
                state = self.qstate.lock();
            }

            if state.queue.is_empty() {
                return current;
            }
        }

        let readers = self.readers.lock();
        let mut oldest = current;
        let head = self.qstate.lock().head;

        for slot in readers.iter() {
            slot.current_epoch.store(current.raw(), Ordering::Relaxed);

            let observed = Epoch::from_raw(slot.epoch.load(Ordering::Relaxed));
            if !observed.is_observation() {
                slot.effective_epoch.store(current.raw(), Ordering::Relaxed);
            } else {
                let effective = Epoch::from_raw(slot.effective_epoch.load(Ordering::Relaxed));
                if observed.cmp_wrapping(effective) == std::cmp::Ordering::Greater {
                    slot.effective_epoch.store(observed.raw(), Ordering::Relaxed);
                }
            }

            let effective = Epoch::from_raw(slot.effective_epoch.load(Ordering::Relaxed));
            if effective.cmp_wrapping(head) == std::cmp::Ordering::Less {
                continue;
            }
            oldest = oldest.min_wrapping(effective);
        }
        drop(readers);

        let mut state = self.qstate.lock();
        state.head = state.queue.dequeue(oldest);
        state.head
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        self.condvar.notify_all();
        if let Some(handle) = self.poller.lock().take() {
            let _ = handle.join();
        }
        // Drain whatever is left unconditionally: a retired object's
        // destructor runs regardless of what any surviving reference still
        // observes, since nothing can call `reclaim_now` on this proxy ever
        // again after this point.
        let mut state = self.qstate.lock();
        let past_everything = state.queue.peek_next_tail();
        state.head = state.queue.dequeue(past_everything);
    }
}

fn spawn_poller(proxy: Arc<Proxy>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let wait = Duration::from_millis(proxy.config.polltime_ms.max(1) as u64);
        loop {
            if !proxy.is_active() {
                return;
            }

            let is_empty = proxy.qstate.lock().queue.is_empty();
            if is_empty {
                let state = proxy.qstate.lock();
                let _ = cv_wait_timeout(&proxy.condvar, state, wait);
                continue;
            }

            proxy.reclaim_now();

            let state = proxy.qstate.lock();
            let _ = cv_wait_timeout(&proxy.condvar, state, wait);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn create_rejects_invalid_config() {
        let config = Config {
            queue_size: 0,
            ..Config::default()
        };
        assert!(matches!(Proxy::create(Some(config)), Err(CreateError::InvalidQueueSize)));
    }

    #[test]
    fn single_reader_single_writer_happy_path() {
        let proxy = Proxy::create(Some(Config {
            polltime_ms: 0,
            ..Config::default()
        }))
        .unwrap();
        let reference = proxy.create_reference();

        reference.acquire();
        let epoch = proxy.retire(Box::new(42)).unwrap();
        assert!(epoch.cmp_wrapping(Epoch::INITIAL) == std::cmp::Ordering::Greater);

        // the retired object must not be collected while the reader still
        // observes an epoch at or before its expiry.
        proxy.reclaim_now();
        reference.release();
        proxy.reclaim_now();
    }

    #[test]
    fn retire_fails_closed_when_queue_stays_full() {
        let proxy = Proxy::create(Some(Config {
            queue_size: 1,
            polltime_ms: 0,
            ..Config::default()
        }))
        .unwrap();
        let reference = proxy.create_reference();
        reference.acquire(); // never releases: nothing can ever be reclaimed

        assert!(proxy.retire(Box::new(1)).is_some());
        assert!(proxy.retire(Box::new(2)).is_none());
    }

    #[test]
    fn retire_sync_detects_self_deadlock() {
        let proxy = Proxy::create(Some(Config {
            polltime_ms: 0,
            ..Config::default()
        }))
        .unwrap();
        let reference = proxy.create_reference();
        reference.acquire();

        let result = proxy.retire_sync(Box::new(1), &reference);
        assert_eq!(result.unwrap_err(), RetireError::WouldDeadlock);
    }

    #[test]
    fn retire_sync_succeeds_once_the_queue_has_room() {
        let proxy = Proxy::create(Some(Config {
            queue_size: 4,
            polltime_ms: 0,
            ..Config::default()
        }))
        .unwrap();
        let writer_ref = proxy.create_reference(); // not acquired: no deadlock risk

        let epoch = proxy.retire_sync(Box::new(7), &writer_ref).unwrap();
        assert!(epoch.is_observation());
    }

    #[test]
    fn deregister_removes_a_dropped_reference_from_the_reader_list() {
        let proxy = Proxy::create(Some(Config {
            polltime_ms: 0,
            ..Config::default()
        }))
        .unwrap();
        {
            let reference = proxy.create_reference();
            reference.acquire();
            assert_eq!(proxy.readers.lock().len(), 1);
        }
        assert_eq!(proxy.readers.lock().len(), 0);
    }
}
