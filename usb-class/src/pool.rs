//! # Frame Pool
//!
//! A fixed arena of frame slots shared between the USB interrupt (producer)
//! and the CAN transmit task (consumer).
//!
//! ## Ownership
//!
//! ```text
//!            acquire            enqueue             dequeue            release
//!  ┌──────┐ ────────► handle ─────────► ┌───────┐ ─────────► handle ─────────► ┌──────┐
//!  │ free │                             │ queue │                              │ free │
//!  └──────┘                             └───────┘                              └──────┘
//! ```
//!
//! A [`FrameHandle`] is move-only, so a slot index lives in exactly one place:
//! the free list, the queue, or a handle. Both lists are index deques behind a
//! single critical section, so an interrupt-side `store` can never interleave
//! with a consumer-side `dequeue`.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

use crate::protocol::HOST_FRAME_SIZE;
use crate::traits::ClassError;

/// Errors specific to pool operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PoolError {
    /// Every slot is queued or held by the consumer
    Exhausted,
    /// More bytes than a slot can hold
    FrameTooLarge,
}

impl From<PoolError> for ClassError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Exhausted => ClassError::PoolExhausted,
            PoolError::FrameTooLarge => ClassError::FrameTooLarge,
        }
    }
}

/// Exclusive claim on one pool slot
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameHandle(usize);

impl FrameHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy)]
struct Slot {
    data: [u8; HOST_FRAME_SIZE],
    len: usize,
}

impl Slot {
    const EMPTY: Slot = Slot {
        data: [0; HOST_FRAME_SIZE],
        len: 0,
    };
}

struct PoolInner<const N: usize> {
    slots: [Slot; N],
    free: Deque<usize, N>,
    queue: Deque<usize, N>,
    /// Slots `fresh..N` were never handed out and are implicitly free
    fresh: usize,
}

impl<const N: usize> PoolInner<N> {
    fn take_free(&mut self) -> Option<usize> {
        if let Some(index) = self.free.pop_front() {
            return Some(index);
        }
        if self.fresh < N {
            self.fresh += 1;
            return Some(self.fresh - 1);
        }
        None
    }

    fn free_len(&self) -> usize {
        self.free.len() + (N - self.fresh)
    }
}

/// Fixed capacity pool of host frames with a FIFO processing queue
pub struct FramePool<const N: usize> {
    inner: Mutex<RefCell<PoolInner<N>>>,
}

impl<const N: usize> FramePool<N> {
    /// Create an empty pool; usable in a `static`
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(PoolInner {
                slots: [Slot::EMPTY; N],
                free: Deque::new(),
                queue: Deque::new(),
                fresh: 0,
            })),
        }
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Take a free slot, if any
    pub fn acquire(&self) -> Option<FrameHandle> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).take_free().map(FrameHandle))
    }

    /// Overwrite the slot behind `handle` with `bytes`
    pub fn write(&self, handle: &FrameHandle, bytes: &[u8]) -> Result<(), PoolError> {
        if bytes.len() > HOST_FRAME_SIZE {
            return Err(PoolError::FrameTooLarge);
        }
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let slot = &mut inner.slots[handle.0];
            slot.data[..bytes.len()].copy_from_slice(bytes);
            slot.len = bytes.len();
        });
        Ok(())
    }

    /// Append a filled slot to the processing queue
    pub fn enqueue(&self, handle: FrameHandle) {
        critical_section::with(|cs| {
            // Capacity equals the slot count and the index came out of a
            // unique handle, so there is always room.
            let _ = self.inner.borrow_ref_mut(cs).queue.push_back(handle.0);
        });
    }

    /// Acquire, fill and enqueue in one critical section.
    ///
    /// This is the interrupt-side entry point of the device-bound pipeline.
    pub fn store(&self, bytes: &[u8]) -> Result<(), PoolError> {
        if bytes.len() > HOST_FRAME_SIZE {
            return Err(PoolError::FrameTooLarge);
        }
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let index = inner.take_free().ok_or(PoolError::Exhausted)?;
            let slot = &mut inner.slots[index];
            slot.data[..bytes.len()].copy_from_slice(bytes);
            slot.len = bytes.len();
            let _ = inner.queue.push_back(index);
            Ok(())
        })
    }

    /// Take the oldest queued frame
    pub fn dequeue(&self) -> Option<FrameHandle> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).queue.pop_front().map(FrameHandle))
    }

    /// Run `f` on the bytes stored behind `handle`
    pub fn with_frame<R>(&self, handle: &FrameHandle, f: impl FnOnce(&[u8]) -> R) -> R {
        critical_section::with(|cs| {
            let inner = self.inner.borrow_ref(cs);
            let slot = &inner.slots[handle.0];
            f(&slot.data[..slot.len])
        })
    }

    /// Return a consumed slot to the free list
    pub fn release(&self, handle: FrameHandle) {
        critical_section::with(|cs| {
            let _ = self.inner.borrow_ref_mut(cs).free.push_back(handle.0);
        });
    }

    /// Number of slots available to `acquire`
    pub fn free_len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).free_len())
    }

    /// Number of frames waiting for the consumer
    pub fn queued_len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).queue.len())
    }
}

impl<const N: usize> Default for FramePool<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pool_is_empty() {
        let pool: FramePool<4> = FramePool::new();
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.free_len(), 4);
        assert_eq!(pool.queued_len(), 0);
        assert!(pool.dequeue().is_none());
    }

    #[test]
    fn test_store_and_dequeue_fifo() {
        let pool: FramePool<4> = FramePool::new();
        pool.store(b"first").unwrap();
        pool.store(b"second").unwrap();
        assert_eq!(pool.queued_len(), 2);
        assert_eq!(pool.free_len(), 2);

        let a = pool.dequeue().unwrap();
        let b = pool.dequeue().unwrap();
        pool.with_frame(&a, |bytes| assert_eq!(bytes, b"first"));
        pool.with_frame(&b, |bytes| assert_eq!(bytes, b"second"));
        pool.release(a);
        pool.release(b);

        assert_eq!(pool.free_len(), 4);
    }

    #[test]
    fn test_exhausted_pool() {
        let pool: FramePool<2> = FramePool::new();
        pool.store(&[1]).unwrap();
        pool.store(&[2]).unwrap();
        assert_eq!(pool.store(&[3]), Err(PoolError::Exhausted));
        assert_eq!(pool.queued_len(), 2);

        // Draining one frame makes room again
        let handle = pool.dequeue().unwrap();
        pool.release(handle);
        pool.store(&[3]).unwrap();
    }

    #[test]
    fn test_handles_are_unique() {
        let pool: FramePool<3> = FramePool::new();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        assert_ne!(a.index(), b.index());
        assert_ne!(b.index(), c.index());
        assert_ne!(a.index(), c.index());

        // Recycled slot comes back exactly once
        let recycled = b.index();
        pool.release(b);
        assert_eq!(pool.acquire().map(|h| h.index()), Some(recycled));
        assert!(pool.acquire().is_none());
        pool.release(a);
        pool.release(c);
    }

    #[test]
    fn test_acquire_write_enqueue() {
        let pool: FramePool<2> = FramePool::new();
        let handle = pool.acquire().unwrap();
        pool.write(&handle, &[0xAA; 8]).unwrap();
        assert_eq!(pool.queued_len(), 0);
        pool.enqueue(handle);

        let handle = pool.dequeue().unwrap();
        assert_eq!(pool.with_frame(&handle, |bytes| bytes.len()), 8);
    }

    #[test]
    fn test_oversized_frame() {
        let pool: FramePool<1> = FramePool::new();
        let big = [0u8; HOST_FRAME_SIZE + 1];
        assert_eq!(pool.store(&big), Err(PoolError::FrameTooLarge));
        assert_eq!(pool.free_len(), 1);
        assert_eq!(
            ClassError::from(PoolError::FrameTooLarge),
            ClassError::FrameTooLarge
        );
    }
}
