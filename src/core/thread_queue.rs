//! Per-thread record queues
//!
//! Each logging thread owns the producer half of a [`byte_ring`]: a
//! fixed-size single-producer/single-consumer ring of variable-length
//! frames. The consumer half is handed to the poller through a
//! registration channel together with the thread's [`ThreadContext`].
//!
//! Frame layout, always 8-byte aligned:
//!
//! ```text
//! [payload len u64][payload ... padded to 8]
//! ```
//!
//! A length of `u64::MAX` is a wrap marker: the rest of the ring up to the
//! physical end is padding and the next frame starts at offset 0.

use super::call_site::CallSite;
use crossbeam_utils::CachePadded;
use parking_lot::{RwLock, RwLockReadGuard};
use std::cell::{RefCell, UnsafeCell};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

const FRAME_HEADER: usize = 8;
const WRAP: u64 = u64::MAX;

/// Smallest usable ring: one header plus one word of payload
pub const MIN_RING_CAPACITY: usize = 16;

#[inline]
const fn align8(n: usize) -> usize {
    (n + 7) & !7
}

#[inline]
const fn frame_len(payload: usize) -> usize {
    FRAME_HEADER + align8(payload)
}

struct Ring {
    storage: Box<[UnsafeCell<u64>]>,
    capacity: usize,
    /// consumer position; written by the consumer only
    head: CachePadded<AtomicU64>,
    /// producer position; written by the producer only
    tail: CachePadded<AtomicU64>,
}

// SAFETY: bytes in [head, tail) belong to the consumer and the rest to the
// producer; ownership moves with the Release/Acquire stores of head and tail.
unsafe impl Sync for Ring {}

impl Ring {
    #[inline]
    fn base(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.storage.as_ptr()) as *mut u8
    }
}

/// Why a push did not enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Not enough free space right now
    Full,
    /// The record can never fit, even into an empty ring
    TooLarge,
}

/// Create a ring of `capacity` bytes (rounded up to a multiple of 8)
pub fn byte_ring(capacity: usize) -> (RingProducer, RingConsumer) {
    let capacity = align8(capacity.max(MIN_RING_CAPACITY));
    let storage = (0..capacity / 8).map(|_| UnsafeCell::new(0u64)).collect();
    let ring = Arc::new(Ring {
        storage,
        capacity,
        head: CachePadded::new(AtomicU64::new(0)),
        tail: CachePadded::new(AtomicU64::new(0)),
    });
    (
        RingProducer {
            ring: Arc::clone(&ring),
            tail: 0,
            cached_head: 0,
        },
        RingConsumer {
            ring,
            head: 0,
            cached_tail: 0,
        },
    )
}

pub struct RingProducer {
    ring: Arc<Ring>,
    tail: u64,
    cached_head: u64,
}

impl RingProducer {
    pub fn capacity(&self) -> usize {
        self.ring.capacity
    }

    /// Whether a payload of `len` bytes could ever be enqueued
    pub fn fits(&self, len: usize) -> bool {
        frame_len(len) <= self.ring.capacity
    }

    #[inline]
    fn has_room(&mut self, bytes: usize) -> bool {
        let cap = self.ring.capacity as u64;
        if self.tail + bytes as u64 - self.cached_head <= cap {
            return true;
        }
        self.cached_head = self.ring.head.load(Ordering::Acquire);
        self.tail + bytes as u64 - self.cached_head <= cap
    }

    pub fn push(&mut self, payload: &[u8]) -> Result<(), PushError> {
        let frame = frame_len(payload.len());
        if frame > self.ring.capacity {
            return Err(PushError::TooLarge);
        }

        let base = self.ring.base();
        let mut offset = (self.tail % self.ring.capacity as u64) as usize;
        let contiguous = self.ring.capacity - offset;

        if frame > contiguous {
            if !self.has_room(contiguous) {
                return Err(PushError::Full);
            }
            // SAFETY: offset is 8-aligned, inside the ring and free (checked above).
            unsafe { (base.add(offset) as *mut u64).write(WRAP) };
            self.tail += contiguous as u64;
            self.ring.tail.store(self.tail, Ordering::Release);
            offset = 0;
        }

        if !self.has_room(frame) {
            return Err(PushError::Full);
        }
        // SAFETY: [offset, offset + frame) is inside the ring and free.
        unsafe {
            (base.add(offset) as *mut u64).write(payload.len() as u64);
            ptr::copy_nonoverlapping(
                payload.as_ptr(),
                base.add(offset + FRAME_HEADER),
                payload.len(),
            );
        }
        self.tail += frame as u64;
        self.ring.tail.store(self.tail, Ordering::Release);
        Ok(())
    }
}

pub struct RingConsumer {
    ring: Arc<Ring>,
    head: u64,
    cached_tail: u64,
}

impl RingConsumer {
    /// Oldest undrained payload, if any
    pub fn peek(&mut self) -> Option<&[u8]> {
        let base = self.ring.base();
        loop {
            if self.head == self.cached_tail {
                self.cached_tail = self.ring.tail.load(Ordering::Acquire);
                if self.head == self.cached_tail {
                    return None;
                }
            }
            let offset = (self.head % self.ring.capacity as u64) as usize;
            // SAFETY: head < tail, so a published frame header sits at offset.
            let word = unsafe { (base.add(offset) as *const u64).read() };
            if word == WRAP {
                self.head += (self.ring.capacity - offset) as u64;
                self.ring.head.store(self.head, Ordering::Release);
                continue;
            }
            // SAFETY: the producer published the payload before the tail store
            // we acquired, and cannot reuse it until `pop` advances head.
            return Some(unsafe {
                std::slice::from_raw_parts(base.add(offset + FRAME_HEADER), word as usize)
            });
        }
    }

    /// Release the frame returned by the last `peek`
    pub fn pop(&mut self) {
        if self.peek().is_none() {
            return;
        }
        let offset = (self.head % self.ring.capacity as u64) as usize;
        // SAFETY: peek just confirmed a data frame header at offset.
        let len = unsafe { (self.ring.base().add(offset) as *const u64).read() } as usize;
        self.head += frame_len(len) as u64;
        self.ring.head.store(self.head, Ordering::Release);
    }

    pub fn is_empty(&mut self) -> bool {
        self.peek().is_none()
    }
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one logging thread, shared by its producer and the poller
#[derive(Debug)]
pub struct ThreadContext {
    thread_id: u64,
    name: RwLock<String>,
    closed: AtomicBool,
}

impl ThreadContext {
    /// Context for the calling thread, named after it when it has a name
    pub fn for_current_thread() -> Self {
        let thread_id = current_thread_id();
        let name = std::thread::current()
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| thread_id.to_string());
        Self {
            thread_id,
            name: RwLock::new(name),
            closed: AtomicBool::new(false),
        }
    }

    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    pub fn name(&self) -> RwLockReadGuard<'_, String> {
        self.name.read()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    /// Mark the producer as gone; the poller drains once more and forgets it
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Consumer half plus context, sent to the poller when a thread first logs
pub(crate) struct QueueRegistration {
    pub ctx: Arc<ThreadContext>,
    pub consumer: RingConsumer,
}

/// Producer-side state one thread keeps per logger
pub(crate) struct ProducerSlot {
    pub logger_id: u32,
    pub producer: RingProducer,
    /// record encoding buffer, reused across calls
    pub scratch: Vec<u8>,
    /// set by the first failed push, cleared by the next success
    pub overflowing: bool,
    /// call sites this thread has looked up, by index
    pub sites: Vec<Arc<CallSite>>,
    pub ctx: Arc<ThreadContext>,
}

impl Drop for ProducerSlot {
    fn drop(&mut self) {
        self.ctx.close();
    }
}

thread_local! {
    static SLOTS: RefCell<Vec<ProducerSlot>> = const { RefCell::new(Vec::new()) };
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Sequential id of the calling thread, starting at 1
pub fn current_thread_id() -> u64 {
    THREAD_ID.try_with(|id| *id).unwrap_or(0)
}

/// Run `f` on the calling thread's slot for `logger_id`
///
/// The slot is created by `create` on first use. Returns `None` when the
/// slot table is busy (a log call made from inside another one on this
/// thread), when the thread is being torn down, or when `create` fails.
pub(crate) fn with_slot<R>(
    logger_id: u32,
    create: impl FnOnce() -> Option<ProducerSlot>,
    f: impl FnOnce(&mut ProducerSlot) -> R,
) -> Option<R> {
    SLOTS
        .try_with(|slots| {
            let mut slots = slots.try_borrow_mut().ok()?;
            let idx = match slots.iter().position(|s| s.logger_id == logger_id) {
                Some(idx) => idx,
                None => {
                    // the poller holds the other reference while its logger lives
                    slots.retain(|s| Arc::strong_count(&s.ctx) > 1);
                    slots.push(create()?);
                    slots.len() - 1
                }
            };
            Some(f(&mut slots[idx]))
        })
        .ok()
        .flatten()
}
