//! # DFU Runtime Interface
//!
//! Interface 1 exposes the DFU 1.1 run-time requests the firmware updater
//! needs to push the device into its bootloader. Only DETACH and GETSTATUS
//! are answered; everything else is left to the dispatcher (which stalls).

use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::setup::{ControlReply, SetupRequest};
use crate::traits::{BootloaderSwitch, SwitchOutcome};

/// DFU_DETACH request code
pub const DFU_DETACH: u8 = 0x00;
/// DFU_GETSTATUS request code
pub const DFU_GETSTATUS: u8 = 0x03;

/// `iString` value meaning "no status string"
pub const NO_STRING: u8 = 0xFF;

/// bStatus of the GETSTATUS response
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuStatusCode {
    /// No error condition is present
    Ok = 0x00,
    /// Something went wrong, but the device does not know what it was
    ErrUnknown = 0x0E,
}

/// bState of the GETSTATUS response
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuState {
    /// Running the application, idle
    AppIdle = 0,
    /// Running the application after DFU_DETACH, waiting for a reset
    AppDetach = 1,
}

/// GETSTATUS response, sent verbatim
///
/// ```text
/// ┌─────────┬────────────────────┬────────┬─────────┐
/// │ bStatus │ bwPollTimeout (3)  │ bState │ iString │
/// └─────────┴────────────────────┴────────┴─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct DfuStatus {
    pub status: u8,
    pub poll_timeout: [u8; 3],
    pub state: u8,
    pub string_index: u8,
}

impl DfuStatus {
    /// Status at configuration time
    pub const fn initial() -> Self {
        Self {
            status: DfuStatusCode::Ok as u8,
            poll_timeout: [0; 3],
            state: DfuState::AppIdle as u8,
            string_index: NO_STRING,
        }
    }
}

impl Default for DfuStatus {
    fn default() -> Self {
        Self::initial()
    }
}

/// Firmware update request handler
pub struct DfuHandler<L> {
    status: DfuStatus,
    switch: L,
}

impl<L: BootloaderSwitch> DfuHandler<L> {
    pub const fn new(switch: L) -> Self {
        Self {
            status: DfuStatus::initial(),
            switch,
        }
    }

    /// Back to the configuration-time status
    pub fn reset(&mut self) {
        self.status = DfuStatus::initial();
    }

    pub fn status(&self) -> &DfuStatus {
        &self.status
    }

    pub fn switch(&self) -> &L {
        &self.switch
    }

    /// Answer a request addressed to the DFU interface.
    ///
    /// Returns `None` for requests this interface does not implement.
    pub fn handle(&mut self, request: &SetupRequest) -> Option<ControlReply<'_>> {
        match request.request {
            DFU_DETACH => {
                // A reset into the bootloader is imminent unless the switch
                // needs a power cycle; then the host must be told to replug.
                if self.switch.switch_to_bootloader() == SwitchOutcome::ResetRequired {
                    info!("DFU detach needs a hardware reset");
                    self.status.state = DfuState::AppDetach as u8;
                } else {
                    info!("DFU detach, rebooting into bootloader");
                }
                Some(ControlReply::Ack)
            }
            DFU_GETSTATUS => {
                let len = usize::from(request.length).min(self.status.as_bytes().len());
                Some(ControlReply::Data(&self.status.as_bytes()[..len]))
            }
            _ => None,
        }
    }
}
