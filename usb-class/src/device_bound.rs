//! # Device-Bound Frame Pipeline
//!
//! Frames from the host arrive on bulk OUT endpoint 0x02. Each completed
//! transfer is copied into a pool slot and queued for the CAN transmit task;
//! the endpoint is re-armed before the interrupt returns, whether or not a
//! slot was available.

use crate::pool::FramePool;
use crate::protocol::HOST_FRAME_SIZE;
use crate::traits::{CanPort, UsbTransport};
use crate::EP_CAN_OUT;

/// What happened to a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reception {
    /// Frame queued for the CAN side
    Queued,
    /// Pool exhausted, frame dropped and overflow reported
    Overflow,
}

/// Counters of the device-bound path
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReceiveStats {
    /// Frames handed to the CAN queue
    pub queued: u32,
    /// Frames lost to pool exhaustion
    pub overflows: u32,
}

/// Receive side of the bulk pipe: owns the OUT buffer between transfers
pub struct DeviceBound {
    buffer: [u8; HOST_FRAME_SIZE],
    stats: ReceiveStats,
}

impl DeviceBound {
    pub const fn new() -> Self {
        Self {
            buffer: [0; HOST_FRAME_SIZE],
            stats: ReceiveStats {
                queued: 0,
                overflows: 0,
            },
        }
    }

    /// Arm the OUT endpoint for the next frame
    pub fn arm<B: UsbTransport>(&self, bus: &B) {
        bus.prepare_receive(EP_CAN_OUT, self.buffer.len());
    }

    /// Handle one completed OUT transfer
    pub fn receive<B, C, const N: usize>(
        &mut self,
        bus: &B,
        pool: &FramePool<N>,
        can: &C,
    ) -> Reception
    where
        B: UsbTransport,
        C: CanPort,
    {
        let len = bus.read_packet(EP_CAN_OUT, &mut self.buffer);

        let outcome = match pool.store(&self.buffer[..len]) {
            Ok(()) => {
                trace!("OUT frame of {} bytes queued", len);
                self.stats.queued = self.stats.queued.wrapping_add(1);
                Reception::Queued
            }
            Err(e) => {
                warn!("host frame dropped: {:?}", e);
                self.stats.overflows = self.stats.overflows.wrapping_add(1);
                can.report_tx_overflow();
                Reception::Overflow
            }
        };

        self.arm(bus);
        outcome
    }

    pub fn stats(&self) -> ReceiveStats {
        self.stats
    }
}

impl Default for DeviceBound {
    fn default() -> Self {
        Self::new()
    }
}
