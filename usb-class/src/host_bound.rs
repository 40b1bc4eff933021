//! # Host-Bound Frame Pipeline
//!
//! Frames travel to the host on bulk IN endpoint 0x81, one transfer at a time:
//!
//! ```text
//!  main loop                          USB interrupt
//!  ─────────                          ─────────────
//!  send_frame ──► busy = true
//!                 zlp = len % 64 == 0
//!                 copy → buffer
//!                 transmit(len) ──────► transmit_complete
//!                                         zlp? ──yes──► transmit(0) ──► transmit_complete
//!                                          │                               │
//!                                          no                              no
//!                                          ▼                               ▼
//!                                       busy = false                    busy = false
//! ```
//!
//! A bulk transfer whose last packet exactly fills the endpoint looks to the
//! host like "more data follows", so such transfers are closed with a
//! zero-length packet before the pipeline accepts the next frame.

use crate::config::{ModeCell, ProtocolFlags};
use crate::protocol::{WireFormat, TRANSFER_BUFFER_SIZE};
use crate::state::TransferState;
use crate::traits::{CanPort, ClassError, ClassResult, UsbTransport};
use crate::{CAN_MAX_PACKET_SIZE, EP_CAN_IN};

impl TransferState {
    /// Send one frame to the host.
    ///
    /// `frame` holds either a [`crate::LegacyFrame`] or an ElmueSoft message,
    /// as selected by `format`. Legacy frames shorter than the fixed record
    /// length are zero padded. Returns the number of bytes handed to the
    /// transport.
    ///
    /// Fails with [`ClassError::TransmitBusy`] while the previous transfer is
    /// unacknowledged; the frame is left untouched and may be retried.
    ///
    /// The bytes are copied, so `frame` may be reused as soon as this returns.
    /// The transport reads the copy through an [`crate::InTransfer`].
    pub fn send_frame<B: UsbTransport>(
        &'static self,
        bus: &B,
        frame: &[u8],
        format: WireFormat,
    ) -> ClassResult<usize> {
        let len = format.transfer_len(frame)?;
        if len > TRANSFER_BUFFER_SIZE {
            debug!("host frame of {} bytes does not fit", len);
            return Err(ClassError::FrameTooLarge);
        }

        if !self.try_claim() {
            return Err(ClassError::TransmitBusy);
        }

        // Latched before the hand-off: the completion may fire before
        // `transmit` returns.
        self.latch_zlp(len, usize::from(CAN_MAX_PACKET_SIZE));

        self.fill(|buffer| {
            let copied = frame.len().min(len);
            buffer[..copied].copy_from_slice(&frame[..copied]);
            buffer[copied..len].fill(0);
        });
        trace!("IN transfer of {} bytes", len);
        bus.transmit(EP_CAN_IN, self.hand_off(len));

        Ok(len)
    }

    /// [`TransferState::send_frame`] with the format derived from the
    /// protocol flags and the CAN controller mode
    pub fn send_to_host<B: UsbTransport>(
        &'static self,
        bus: &B,
        frame: &[u8],
        flags: ProtocolFlags,
        fd_active: bool,
    ) -> ClassResult<usize> {
        self.send_frame(bus, frame, WireFormat::select(flags, fd_active))
    }

    /// Send with the mode currently stored in `mode`
    pub fn send_with_mode<B: UsbTransport, C: CanPort>(
        &'static self,
        bus: &B,
        frame: &[u8],
        mode: &ModeCell,
        can: &C,
    ) -> ClassResult<usize> {
        self.send_to_host(bus, frame, mode.load(), can.is_fd_active())
    }

    /// IN completion on the CAN endpoint
    pub fn transmit_complete<B: UsbTransport>(&'static self, bus: &B) {
        if self.take_zlp() {
            trace!("IN transfer ended on packet boundary, sending ZLP");
            bus.transmit(EP_CAN_IN, self.hand_off(0));
        } else {
            self.release();
        }
    }
}
