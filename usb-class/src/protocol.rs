//! # Host Wire Formats
//!
//! Two framings share the bulk endpoints. Which one is active is a
//! per-session choice of the host (see [`crate::ProtocolFlags`]).
//!
//! ## Legacy gs_usb record
//!
//! ```text
//! ┌─────────┬────────┬─────┬─────────┬───────┬──────────┬───────────────┬───────────┐
//! │ echo_id │ can_id │ dlc │ channel │ flags │ reserved │   data[64]    │ timestamp │
//! │ 4 bytes │ 4 bytes│  1  │    1    │   1   │    1     │ 8 used (CAN)  │  4 bytes  │
//! └─────────┴────────┴─────┴─────────┴───────┴──────────┴───────────────┴───────────┘
//! ```
//!
//! The timestamp sits behind the full 64 byte data array, so for classic CAN
//! the record is cut to 24 bytes (20 without timestamp), and for CAN FD it is
//! always 80 (76) bytes regardless of the real payload.
//!
//! ## ElmueSoft messages
//!
//! ```text
//! ┌──────┬──────┬───────────────────────────┐
//! │ size │ kind │ body (size - 2 bytes)     │
//! └──────┴──────┴───────────────────────────┘
//! ```
//!
//! Every message is self describing; only `size` bytes travel over USB.

use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::config::ProtocolFlags;
use crate::traits::{ClassError, ClassResult};

/// Full size of a legacy record (CAN FD with timestamp)
pub const LEGACY_FRAME_SIZE: usize = core::mem::size_of::<LegacyFrame>();

/// Bytes of the data array only used by CAN FD frames (64 - 8)
pub const LEGACY_FD_EXTRA: usize = 56;

/// Size of the trailing timestamp field
pub const LEGACY_TIMESTAMP_SIZE: usize = 4;

/// Largest frame received from the host on the OUT endpoint
pub const HOST_FRAME_SIZE: usize = LEGACY_FRAME_SIZE;

/// Capacity of the host-bound transfer buffer
pub const TRANSFER_BUFFER_SIZE: usize = 128;

/// Legacy gs_usb host frame
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct LegacyFrame {
    pub echo_id: U32<LittleEndian>,
    pub can_id: U32<LittleEndian>,
    pub can_dlc: u8,
    pub channel: u8,
    pub flags: u8,
    pub reserved: u8,
    pub data: [u8; 64],
    pub timestamp_us: U32<LittleEndian>,
}

impl LegacyFrame {
    /// Echo id of frames the device received from the bus
    pub const RX_ECHO_ID: u32 = u32::MAX;

    /// Frame received on the bus, ready to be sent to the host
    pub fn received(can_id: u32, data: &[u8], timestamp_us: u32) -> Self {
        let mut frame = Self::new_zeroed();
        let len = data.len().min(frame.data.len());
        frame.echo_id = U32::new(Self::RX_ECHO_ID);
        frame.can_id = U32::new(can_id);
        frame.can_dlc = len as u8;
        frame.data[..len].copy_from_slice(&data[..len]);
        frame.timestamp_us = U32::new(timestamp_us);
        frame
    }
}

/// Common header of all ElmueSoft messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct Header {
    /// Total message length including this header
    pub size: u8,
    /// Message kind (CAN frame, echo, error, debug string, ...)
    pub kind: u8,
}

/// Framing used for host-bound transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireFormat {
    /// Variable length ElmueSoft protocol
    Elmue,
    /// Fixed length gs_usb record
    Legacy { fd: bool, timestamp: bool },
}

impl WireFormat {
    /// Pick the framing for the current protocol flags and CAN mode
    pub fn select(flags: ProtocolFlags, fd_active: bool) -> Self {
        if flags.contains(ProtocolFlags::ELMUE_PROTOCOL) {
            WireFormat::Elmue
        } else {
            WireFormat::Legacy {
                fd: fd_active,
                timestamp: flags.contains(ProtocolFlags::TIMESTAMP),
            }
        }
    }

    /// Number of bytes the host expects for `frame` in this format
    pub fn transfer_len(&self, frame: &[u8]) -> ClassResult<usize> {
        match *self {
            WireFormat::Elmue => {
                let header = Header::read_from_prefix(frame).ok_or(ClassError::InvalidFrame)?;
                let size = usize::from(header.size);
                if size > frame.len() {
                    return Err(ClassError::InvalidFrame);
                }
                Ok(size)
            }
            WireFormat::Legacy { fd, timestamp } => {
                let mut len = LEGACY_FRAME_SIZE;
                if !fd {
                    len -= LEGACY_FD_EXTRA;
                }
                if !timestamp {
                    len -= LEGACY_TIMESTAMP_SIZE;
                }
                Ok(len)
            }
        }
    }
}
