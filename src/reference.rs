//! Per-reader reference state and the reader-side fast paths
//! (`acquire`/`release`/`next`).
//!
//! Grounded on `jseigh/smrproxy`'s `include/smrproxy.h` (`smrproxy_ref_acquire`,
//! `smrproxy_ref_release`) and `src/smrproxy.c`'s `smrproxy_ref_next`, and on
//! the teacher's `PinGuard` for the RAII convenience layered on top.

use crate::epoch::{Epoch, EpochCell};
use crate::proxy::Proxy;
use crate::sync::{fence, Arc, Cell, AtomicU32, Ordering};
use std::sync::Weak;

/// The reclaimer-visible half of a reference: registered into the proxy's
/// reader list as `Arc<ReaderSlot>` and scanned every reclaim cycle.
///
/// Cache-line aligned so the reclaimer's writes to `current_epoch` and
/// `effective_epoch` never invalidate the cache line a reader is spinning
/// `epoch` on during `acquire`/`release`.
#[repr(align(64))]
pub(crate) struct ReaderSlot {
    /// The reader's currently observed epoch, or `Epoch::ZERO` when
    /// released. Written only by the owning reader; read by the reclaimer.
    pub(crate) epoch: AtomicU32,
    /// Reclaimer-maintained shadow of the epoch seen at the start of the
    /// current reclaim cycle (spec.md §4.5 step 3).
    pub(crate) current_epoch: AtomicU32,
    /// Reclaimer-maintained, monotonically-widened conservative epoch used
    /// as this reader's contribution to `oldest` (spec.md §4.5 step 3, the
    /// "effective_epoch" augmentation).
    pub(crate) effective_epoch: AtomicU32,
    /// Trailing filler widening this slot's heap footprint to the proxy's
    /// resolved cache-line size when it exceeds the static 64-byte
    /// alignment above — the "runtime-computed padding newtype" case
    /// (spec.md §4.5) for platforms with a wider probed or configured
    /// cache line.
    _pad: Box<[u8]>,
}

impl ReaderSlot {
    fn new(cacheline: usize) -> Self {
        let unpadded = std::mem::size_of::<AtomicU32>() * 3;
        let extra = cacheline.saturating_sub(unpadded.max(64));
        ReaderSlot {
            epoch: AtomicU32::new(Epoch::ZERO.raw()),
            current_epoch: AtomicU32::new(Epoch::ZERO.raw()),
            effective_epoch: AtomicU32::new(Epoch::ZERO.raw()),
            _pad: vec![0u8; extra].into_boxed_slice(),
        }
    }
}

/// A reader thread's handle into a [`crate::Proxy`].
///
/// One should be created per reader thread via [`crate::Proxy::create_reference`].
/// It is not `Sync` (the recursion-counting `data` cell is single-threaded
/// state) and must be used by only the thread that created it.
///
/// `Reference` holds its proxy's epoch cell by a strong, cheap handle (so
/// the reader fast path never has to check proxy liveness), and a `Weak`
/// back-link to the rest of the proxy's state used only at registration and
/// teardown — the "non-owning back-link" design note in spec.md §9.
pub struct Reference {
    pub(crate) slot: Arc<ReaderSlot>,
    pub(crate) proxy_epoch: Arc<EpochCell>,
    pub(crate) proxy: Weak<Proxy>,
    /// Whether the owning proxy has a real expedited membarrier. `false`
    /// forces the seq-cst double-check loop at runtime (spec.md §4.3) even
    /// when the `mb_fallback` feature isn't compiled in, covering the case
    /// where membarrier registration fails at runtime rather than at
    /// compile time.
    expedited: bool,
    /// Opaque word for the caller's own recursion counting (spec.md §3);
    /// also used internally by [`Reference::pin`] to implement nested pins.
    data: Cell<usize>,
}

impl Reference {
    pub(crate) fn new(
        slot: Arc<ReaderSlot>,
        proxy_epoch: Arc<EpochCell>,
        proxy: Weak<Proxy>,
        expedited: bool,
    ) -> Self {
        Reference {
            slot,
            proxy_epoch,
            proxy,
            expedited,
            data: Cell::new(0),
        }
    }

    /// Whether this reference belongs to `proxy` (by identity, not value).
    /// Used by [`Proxy::retire_sync`]'s self-deadlock check.
    pub(crate) fn belongs_to(&self, proxy: &Proxy) -> bool {
        self.proxy
            .upgrade()
            .is_some_and(|owner| std::ptr::eq(owner.as_ref(), proxy))
    }

    /// Begin a protected section: observe the proxy's current epoch.
    ///
    /// Idempotent from the reader's point of view (back-to-back calls with
    /// no intervening retire yield the same observed epoch) but the library
    /// does not count nesting — callers who need nested acquire/release must
    /// track it themselves, e.g. via [`Reference::data`], or use [`Reference::pin`].
    #[inline]
    pub fn acquire(&self) {
        acquire_fast_path(&self.proxy_epoch, &self.slot.epoch, self.expedited);
    }

    /// End a protected section.
    #[inline]
    pub fn release(&self) {
        self.slot.epoch.store(Epoch::ZERO.raw(), Ordering::Release);
    }

    /// The caller's opaque recursion-counting word (spec.md §3's `data`
    /// field). The library never interprets it.
    #[inline]
    pub fn data(&self) -> usize {
        self.data.get()
    }

    #[inline]
    pub fn set_data(&self, value: usize) {
        self.data.set(value);
    }

    /// The epoch this reference currently has observed, or [`Epoch::ZERO`]
    /// if released. Exposed for diagnostics and tests.
    #[inline]
    pub fn acquired_epoch(&self) -> Epoch {
        Epoch::from_raw(self.slot.epoch.load(Ordering::Acquire))
    }

    /// Advance a long-running monotone traversal (spec.md §4.4).
    ///
    /// `get_expiry(node)` must return `Epoch::ZERO` if `node` is still
    /// reachable from the live structure, or the expiry epoch stamped at
    /// its retirement otherwise. Expiry epochs encountered across a single
    /// traversal must be non-decreasing (wrap-aware); this is a caller
    /// contract the library cannot check.
    pub fn next<N>(&self, get_expiry: impl FnOnce(&N) -> Epoch, node: &N) {
        let observed = self.acquired_epoch();
        if !observed.is_observation() {
            self.acquire();
            return;
        }

        let current = self.proxy_epoch.load(Ordering::Acquire);
        fence(Ordering::SeqCst);
        let expiry = get_expiry(node);

        if !expiry.is_observation() {
            self.slot.epoch.store(current.raw(), Ordering::Relaxed);
        } else if expiry.cmp_wrapping(observed) == std::cmp::Ordering::Greater {
            self.slot.epoch.store(expiry.raw(), Ordering::Relaxed);
        }
        // else: node's expiry is not newer, leave `epoch` unchanged.
    }

    /// A convenience RAII guard pairing `acquire`/`release`, supporting
    /// reentrant nesting via the `data` recursion counter — additive over
    /// the raw `acquire`/`release` pair, not a replacement for them.
    #[must_use]
    pub fn pin(&self) -> Pin<'_> {
        let depth = self.data.get();
        if depth == 0 {
            self.acquire();
        }
        self.data.set(depth + 1);
        Pin { reference: self }
    }
}

impl Drop for Reference {
    fn drop(&mut self) {
        self.release();
        if let Some(proxy) = self.proxy.upgrade() {
            proxy.deregister(&self.slot);
        }
    }
}

/// Select the reader fast path: the `mb_fallback` feature forces the
/// seq-cst double-check loop at compile time (for testing the degraded path
/// without a kernel that actually lacks membarrier support); otherwise the
/// choice is made at runtime from `expedited`, which reflects whether the
/// owning proxy's membarrier adapter actually registered successfully
/// (spec.md §4.3: "a failed registration forces the proxy to record that
/// it is running without a membarrier and use the slower acquire path").
/// The double-check loop bounds visibility loss to one epoch advancement
/// under contention (spec.md §4.4, scenario F).
#[inline]
fn acquire_fast_path(proxy_epoch: &EpochCell, ref_epoch: &AtomicU32, expedited: bool) {
    if cfg!(feature = "mb_fallback") || !expedited {
        loop {
            let first = proxy_epoch.load(Ordering::SeqCst);
            ref_epoch.store(first.raw(), Ordering::SeqCst);
            let second = proxy_epoch.load(Ordering::SeqCst);
            if first == second {
                break;
            }
        }
        fence(Ordering::Acquire);
    } else {
        let observed = proxy_epoch.load(Ordering::Relaxed);
        ref_epoch.store(observed.raw(), Ordering::Relaxed);
        fence(Ordering::Acquire);
    }
}

/// RAII guard returned by [`Reference::pin`]. Dropping it releases the
/// reference once the nesting depth reaches zero.
#[must_use]
pub struct Pin<'a> {
    reference: &'a Reference,
}

impl Drop for Pin<'_> {
    fn drop(&mut self) {
        let depth = self.reference.data.get();
        debug_assert!(depth > 0, "Pin dropped with a zero recursion depth");
        if depth <= 1 {
            self.reference.release();
            self.reference.data.set(0);
        } else {
            self.reference.data.set(depth - 1);
        }
    }
}

pub(crate) fn new_reader_slot(cacheline: usize) -> Arc<ReaderSlot> {
    Arc::new(ReaderSlot::new(cacheline))
}
