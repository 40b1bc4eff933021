//! # Candlelight USB Class Engine
//!
//! This crate is the USB device-class layer of a gs_usb compatible CAN adapter:
//!
//! - **Control Routing**: SETUP requests to the DFU runtime interface, the
//!   candlelight vendor commands, GET_INTERFACE and the Microsoft OS descriptors
//! - **Frame Pipelines**: host-bound framing (legacy and ElmueSoft protocol,
//!   zero-length-packet termination) and device-bound reception into a frame pool
//! - **Descriptors**: the byte-exact device, configuration and string descriptors
//!
//! ## Architecture
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!  SETUP ─────────────►│ GsUsbClass (ClassDriver)     │──► DfuHandler / VendorHandler / msos
//!  OUT ready (EP 02) ─►│   DeviceBound ───────────────│──► FramePool ──► CAN consumer
//!  IN done  (EP 81) ──►│   TransferState ──────────────│
//!                      └──────────────────────────────┘
//!  main loop ──► TransferState::send_frame ──► UsbTransport::transmit
//! ```
//!
//! ## Execution contexts
//!
//! Every [`ClassDriver`] callback runs in the USB interrupt. The main loop only
//! touches [`TransferState`] (to send) and [`FramePool`] (to drain), both of
//! which are shared by reference and synchronize internally.

#![cfg_attr(not(feature = "std"), no_std)]

#[macro_use]
mod fmt;

pub mod class;
pub mod config;
pub mod descriptors;
pub mod device_bound;
pub mod dfu;
pub mod host_bound;
pub mod msos;
pub mod pool;
pub mod protocol;
pub mod setup;
pub mod state;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use class::GsUsbClass;
pub use config::{ModeCell, ProtocolFlags, SettingsError, UserSettings};
pub use device_bound::{DeviceBound, Reception};
pub use dfu::{DfuHandler, DfuState, DfuStatus, DfuStatusCode};
pub use pool::{FrameHandle, FramePool, PoolError};
pub use protocol::{Header, LegacyFrame, WireFormat};
pub use setup::{ControlReply, Recipient, RequestType, SetupRequest};
pub use state::{InTransfer, TransferState};
pub use traits::{
    BootloaderSwitch, CanPort, ClassDriver, ClassError, ClassResult, EndpointType, SwitchOutcome,
    UsbTransport, VendorHandler,
};

/// Library version for compatibility checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bulk IN endpoint carrying frames to the host
pub const EP_CAN_IN: u8 = 0x81;

/// Bulk OUT endpoint carrying frames from the host
pub const EP_CAN_OUT: u8 = 0x02;

/// Max packet size of both bulk endpoints (full speed)
pub const CAN_MAX_PACKET_SIZE: u16 = 64;

/// Interface number of the gs_usb CAN interface
pub const CAN_INTERFACE: u8 = 0;

/// Interface number of the DFU runtime (firmware update) interface
pub const DFU_INTERFACE: u8 = 1;

/// String index of the CAN interface name
pub const CAN_INTERFACE_STR_INDEX: u8 = 20;

/// String index of the firmware update interface name
pub const DFU_INTERFACE_STR_INDEX: u8 = 0xE0;

/// Vendor request code announced in the Microsoft OS string descriptor
pub const MS_OS_VENDOR_CODE: u8 = 0x20;

/// String index Windows queries for the Microsoft OS string descriptor
pub const MS_OS_STRING_INDEX: u8 = 0xEE;
