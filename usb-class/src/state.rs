//! # Shared Transfer State
//!
//! The single outstanding host-bound transfer, shared between the main loop
//! (which starts transfers) and the USB interrupt (which completes them).
//!
//! `busy` is the only lock: whoever flips it from `false` to `true` owns the
//! transmit buffer until the completion handler clears it again. The buffer
//! itself sits behind a critical-section mutex so the borrow is checked, but
//! it is never contended while the busy protocol is followed.
//!
//! The transport gets an [`InTransfer`] token instead of a borrowed slice. It
//! may keep the token and read one packet at a time from it until the IN
//! completion is delivered; after that the token is stale and reads nothing.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;

use crate::protocol::TRANSFER_BUFFER_SIZE;

struct TxSlot {
    data: [u8; TRANSFER_BUFFER_SIZE],
    /// Bumped on every claim and release; tokens carry the value they saw
    generation: u32,
}

/// Host-bound transfer state, one per attached device
pub struct TransferState {
    /// Set from hand-off until the host acknowledged the transfer and its ZLP
    busy: AtomicBool,
    /// The queued transfer ends on a packet boundary and still needs a ZLP
    zlp_pending: AtomicBool,
    /// Bytes of the in-flight transfer
    buffer: Mutex<RefCell<TxSlot>>,
}

impl TransferState {
    /// Create an idle state; usable in a `static`
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            zlp_pending: AtomicBool::new(false),
            buffer: Mutex::new(RefCell::new(TxSlot {
                data: [0; TRANSFER_BUFFER_SIZE],
                generation: 0,
            })),
        }
    }

    /// True while a transfer (or its trailing ZLP) is in flight
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// True while a ZLP still has to follow the current transfer
    #[inline]
    pub fn zlp_pending(&self) -> bool {
        self.zlp_pending.load(Ordering::Acquire)
    }

    /// Drop any in-flight transfer (configuration reset)
    pub fn reset(&self) {
        self.zlp_pending.store(false, Ordering::Release);
        self.retire();
        self.busy.store(false, Ordering::Release);
    }

    /// Claim the transmit buffer. Returns `false` if already claimed.
    pub(crate) fn try_claim(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release(&self) {
        self.retire();
        self.busy.store(false, Ordering::Release);
    }

    /// Invalidate every token handed out so far
    fn retire(&self) {
        critical_section::with(|cs| {
            let mut slot = self.buffer.borrow_ref_mut(cs);
            slot.generation = slot.generation.wrapping_add(1);
        });
    }

    /// Latch whether a transfer of `len` bytes must be terminated by a ZLP
    pub(crate) fn latch_zlp(&self, len: usize, max_packet_size: usize) -> bool {
        let needed = len > 0 && len % max_packet_size == 0;
        self.zlp_pending.store(needed, Ordering::Release);
        needed
    }

    /// Consume the pending ZLP, if any
    pub(crate) fn take_zlp(&self) -> bool {
        self.zlp_pending.swap(false, Ordering::AcqRel)
    }

    /// Refill the transmit buffer and start a new generation.
    ///
    /// Only the owner of the busy claim may call this.
    pub(crate) fn fill<R>(&self, f: impl FnOnce(&mut [u8; TRANSFER_BUFFER_SIZE]) -> R) -> R {
        critical_section::with(|cs| {
            let mut slot = self.buffer.borrow_ref_mut(cs);
            slot.generation = slot.generation.wrapping_add(1);
            f(&mut slot.data)
        })
    }

    /// Token for the first `len` bytes of the current transfer
    pub(crate) fn hand_off(&'static self, len: usize) -> InTransfer {
        let generation = critical_section::with(|cs| self.buffer.borrow_ref(cs).generation);
        InTransfer {
            state: self,
            generation,
            len: len.min(TRANSFER_BUFFER_SIZE),
        }
    }
}

/// Loan of the transmit buffer to the transport.
///
/// Valid from `transmit` until the matching IN completion reaches the engine;
/// the bytes behind it do not change during that time.
pub struct InTransfer {
    state: &'static TransferState,
    generation: u32,
    len: usize,
}

impl InTransfer {
    /// Total length of the transfer
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Zero-length packet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Run `f` on the transfer bytes.
    ///
    /// Returns `None` once the transfer has completed.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        critical_section::with(|cs| {
            let slot = self.state.buffer.borrow_ref(cs);
            (slot.generation == self.generation).then(|| f(&slot.data[..self.len]))
        })
    }

    /// Copy packet `index` (of `max_packet_size` bytes each) into `out`.
    ///
    /// Returns the packet length, or `None` once the transfer has completed.
    pub fn read_packet(
        &self,
        index: usize,
        max_packet_size: usize,
        out: &mut [u8],
    ) -> Option<usize> {
        self.with_data(|data| {
            let start = (index * max_packet_size).min(data.len());
            let end = (start + max_packet_size).min(data.len());
            let len = (end - start).min(out.len());
            out[..len].copy_from_slice(&data[start..start + len]);
            len
        })
    }
}

impl Default for TransferState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_idle() {
        let state = TransferState::new();
        assert!(!state.is_busy());
        assert!(!state.zlp_pending());
    }

    #[test]
    fn test_claim_is_exclusive() {
        let state = TransferState::new();
        assert!(state.try_claim());
        assert!(!state.try_claim());
        state.release();
        assert!(state.try_claim());
    }

    #[test]
    fn test_zlp_latch() {
        let state = TransferState::new();
        assert!(!state.latch_zlp(0, 64));
        assert!(!state.latch_zlp(20, 64));
        assert!(state.latch_zlp(64, 64));
        assert!(state.take_zlp());
        assert!(!state.take_zlp());
        assert!(state.latch_zlp(128, 64));
        assert!(!state.latch_zlp(80, 64));
        assert!(!state.zlp_pending());
    }

    #[test]
    fn test_reset_clears_everything() {
        let state = TransferState::new();
        assert!(state.try_claim());
        state.latch_zlp(64, 64);
        state.reset();
        assert!(!state.is_busy());
        assert!(!state.zlp_pending());
    }

    #[test]
    fn test_token_reads_packets_until_release() {
        let state: &'static TransferState = Box::leak(Box::new(TransferState::new()));
        assert!(state.try_claim());
        state.fill(|buffer| {
            for (i, b) in buffer.iter_mut().enumerate() {
                *b = i as u8;
            }
        });
        let token = state.hand_off(80);

        let mut packet = [0u8; 64];
        assert_eq!(token.read_packet(0, 64, &mut packet), Some(64));
        assert_eq!(packet[63], 63);
        assert_eq!(token.read_packet(1, 64, &mut packet), Some(16));
        assert_eq!(&packet[..2], &[64, 65]);
        assert_eq!(token.read_packet(2, 64, &mut packet), Some(0));

        state.release();
        assert_eq!(token.read_packet(0, 64, &mut packet), None);
        assert_eq!(token.with_data(|d| d.len()), None);
    }

    #[test]
    fn test_reset_invalidates_token() {
        let state: &'static TransferState = Box::leak(Box::new(TransferState::new()));
        assert!(state.try_claim());
        state.fill(|buffer| buffer[0] = 7);
        let token = state.hand_off(1);
        assert_eq!(token.with_data(|d| d[0]), Some(7));

        state.reset();
        assert!(token.with_data(|d| d[0]).is_none());
    }
}
