//! The fixed-capacity retire queue: a ring of type-erased retired objects
//! keyed by expiry epoch.

use crate::epoch::Epoch;
use std::cmp::Ordering;

/// A type-erased retired value plus the destructor that knows how to drop
/// its concrete type. Mirrors the teacher's `RetiredObject` / `drop_value`
/// erasure technique.
struct RetiredObject {
    ptr: *mut (),
    dtor: unsafe fn(*mut ()),
}

// The retired object is handed off to whichever thread runs the reclaim
// cycle (the reclaimer thread, or the caller of a synchronous retire); the
// destructor is the only thing ever done with it, so `Send` is sound as long
// as `T: Send`, which callers of `RetireQueue::enqueue` must guarantee.
unsafe impl Send for RetiredObject {}

#[inline(always)]
unsafe fn drop_boxed<T>(ptr: *mut ()) {
    unsafe {
        drop(Box::from_raw(ptr as *mut T));
    }
}

impl RetiredObject {
    fn new<T: Send + 'static>(value: Box<T>) -> Self {
        RetiredObject {
            ptr: Box::into_raw(value) as *mut (),
            dtor: drop_boxed::<T>,
        }
    }
}

impl Drop for RetiredObject {
    fn drop(&mut self) {
        unsafe {
            (self.dtor)(self.ptr);
        }
    }
}

/// Errors that can occur constructing a [`RetireQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueConfigError {
    /// `size` was zero.
    ZeroSize,
    /// `size` exceeded the 2^30 ceiling (spec.md open question, resolved:
    /// the slot calculation `(epoch >> 1) % size` assumes headroom that a
    /// larger queue would violate).
    TooLarge,
    /// `initial_epoch` was not odd and nonzero.
    InvalidInitialEpoch,
}

impl std::fmt::Display for QueueConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueConfigError::ZeroSize => write!(f, "queue size must be at least 1"),
            QueueConfigError::TooLarge => write!(f, "queue size must not exceed 2^30"),
            QueueConfigError::InvalidInitialEpoch => {
                write!(f, "initial epoch must be odd and nonzero")
            }
        }
    }
}

impl std::error::Error for QueueConfigError {}

const MAX_QUEUE_SIZE: u32 = 1 << 30;

/// A fixed-capacity ring of retired objects, indexed by expiry epoch.
///
/// Not internally synchronized: the proxy's mutex is the serializer, exactly
/// as spec.md §4.2 requires.
pub(crate) struct RetireQueue {
    slots: Box<[Option<RetiredObject>]>,
    size: u32,
    head: Epoch,
    tail: Epoch,
    head_idx: u32,
    tail_idx: u32,
}

impl RetireQueue {
    pub(crate) fn new(initial_epoch: Epoch, size: u32) -> Result<Self, QueueConfigError> {
        if !initial_epoch.is_valid_epoch() {
            return Err(QueueConfigError::InvalidInitialEpoch);
        }
        if size == 0 {
            return Err(QueueConfigError::ZeroSize);
        }
        if size > MAX_QUEUE_SIZE {
            return Err(QueueConfigError::TooLarge);
        }

        let slots = (0..size).map(|_| None).collect::<Vec<_>>().into_boxed_slice();

        Ok(RetireQueue {
            slots,
            size,
            head: initial_epoch,
            tail: initial_epoch,
            head_idx: 0,
            tail_idx: 0,
        })
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// `full ≡ tail − head == 2·size` (spec.md §3): the ring holds exactly
    /// `size` in-flight retirements, each occupying two epoch units.
    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.tail.raw().wrapping_sub(self.head.raw()) == self.size * 2
    }

    #[inline]
    pub(crate) fn head(&self) -> Epoch {
        self.head
    }

    /// The epoch an `enqueue` right now would assign, without mutating
    /// anything. Used by `retire_with_expiry_stamp` to hand the caller its
    /// expiry epoch before the object is boxed into the queue.
    #[inline]
    pub(crate) fn peek_next_tail(&self) -> Epoch {
        self.tail.next()
    }

    /// Enqueue a retired value. Returns the new tail epoch (the value's
    /// expiry), or `None` if the queue is full.
    pub(crate) fn enqueue<T: Send + 'static>(&mut self, obj: Box<T>) -> Option<Epoch> {
        if self.is_full() {
            return None;
        }

        self.slots[self.tail_idx as usize] = Some(RetiredObject::new(obj));
        self.tail_idx = (self.tail_idx + 1) % self.size;
        self.tail = self.tail.next();
        Some(self.tail)
    }

    /// Destroy every slot whose expiry is strictly older than `oldest`
    /// (wrap-aware), in queue order. Returns the new head epoch.
    pub(crate) fn dequeue(&mut self, oldest: Epoch) -> Epoch {
        while self.head != self.tail && self.head.cmp_wrapping(oldest) == Ordering::Less {
            self.slots[self.head_idx as usize] = None; // runs the destructor
            self.head_idx = (self.head_idx + 1) % self.size;
            self.head = self.head.next();
        }
        self.head
    }
}

impl std::fmt::Debug for RetireQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetireQueue")
            .field("size", &self.size)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .finish()
    }
}
