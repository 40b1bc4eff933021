//! # Collaborator Traits & Class Callback Set
//!
//! The engine sits between the USB interrupt dispatcher and the rest of the
//! firmware. Everything on either side of it is reached through a trait:
//!
//! - [`UsbTransport`]: endpoint and EP0 primitives of the low-level driver
//! - [`ClassDriver`]: the event hooks the low-level driver invokes (one method
//!   per event, implemented once by [`crate::GsUsbClass`])
//! - [`CanPort`], [`VendorHandler`], [`BootloaderSwitch`]: the CAN side, the
//!   candlelight vendor commands and the DFU mode switch
//!
//! All transport methods take `&self` because the interrupt handler and the
//! main loop both transmit on the same bus.

use crate::setup::SetupRequest;
use crate::state::InTransfer;

/// Errors reported by the class engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClassError {
    /// A host-bound transfer (or its trailing ZLP) is still in flight
    TransmitBusy,
    /// The frame does not fit into the transfer buffer
    FrameTooLarge,
    /// The frame is shorter than its declared size, or empty
    InvalidFrame,
    /// A SETUP packet was not exactly 8 bytes long
    MalformedSetup,
    /// No free slot in the frame pool
    PoolExhausted,
}

/// Result type alias for class operations
pub type ClassResult<T> = Result<T, ClassError>;

/// USB endpoint transfer type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndpointType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// Primitives of the low-level USB driver.
///
/// `transmit` receives the IN transfer as an [`InTransfer`] token. The
/// driver may keep it and pull one packet at a time from it; the bytes stay
/// put until the driver reports the matching `data_in` completion.
pub trait UsbTransport {
    /// Open an endpoint with the given type and max packet size
    fn open_endpoint(&self, addr: u8, ep_type: EndpointType, max_packet_size: u16);

    /// Close a previously opened endpoint
    fn close_endpoint(&self, addr: u8);

    /// Arm an OUT endpoint to receive up to `len` bytes
    fn prepare_receive(&self, addr: u8, len: usize);

    /// Copy the last completed OUT transfer into `buf`.
    ///
    /// Returns the number of bytes received.
    fn read_packet(&self, addr: u8, buf: &mut [u8]) -> usize;

    /// Start an IN transfer. `transfer` may be empty (zero-length packet).
    fn transmit(&self, addr: u8, transfer: InTransfer);

    /// Send the data stage of a control IN request on EP0
    fn control_send(&self, data: &[u8]);

    /// Complete a control request without data stage
    fn control_ack(&self);

    /// Stall EP0, rejecting the current control request
    fn control_stall(&self);
}

/// The event hooks invoked by the low-level driver.
///
/// Every method runs in interrupt context and must return without blocking.
pub trait ClassDriver<B: UsbTransport> {
    /// SET_CONFIGURATION: open endpoints and reset per-configuration state
    fn init(&mut self, bus: &B, config_index: u8);

    /// Configuration cleared or device detached
    fn deinit(&mut self, bus: &B, config_index: u8);

    /// A SETUP packet addressed to the class arrived on EP0
    fn setup(&mut self, bus: &B, request: &SetupRequest);

    /// The OUT data stage of a control request completed
    fn ep0_rx_ready(&mut self, bus: &B);

    /// A bulk OUT transfer completed on `addr`
    fn data_out(&mut self, bus: &B, addr: u8);

    /// A bulk IN transfer completed on `addr`
    fn data_in(&mut self, bus: &B, addr: u8);

    /// Full speed configuration descriptor
    fn config_descriptor(&self) -> &[u8];

    /// Class specific string descriptor, or `None` to stall
    fn user_string(&mut self, index: u8) -> Option<&[u8]>;
}

/// CAN side of the adapter as seen from the USB class
pub trait CanPort {
    /// True while the controller runs in CAN FD mode
    fn is_fd_active(&self) -> bool;

    /// Report that a host frame was lost because the frame pool was empty.
    ///
    /// The CAN driver forwards this to the host through its error path.
    fn report_tx_overflow(&self);
}

/// Candlelight vendor commands (bit timing, mode, identify, ...)
pub trait VendorHandler<B: UsbTransport> {
    /// First stage of a request on the CAN interface.
    ///
    /// Returns `true` if the request was handled (including sending any
    /// response), `false` to let the dispatcher continue.
    fn setup(&mut self, bus: &B, request: &SetupRequest) -> bool;

    /// OUT data stage of a previously accepted request
    fn out_data(&mut self, bus: &B);
}

/// Result of a bootloader switch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwitchOutcome {
    /// The device will reset into the bootloader shortly
    Rebooting,
    /// The switch needs a hardware reset; the user must replug the device
    ResetRequired,
}

/// Mechanism that enters the DFU bootloader
pub trait BootloaderSwitch {
    fn switch_to_bootloader(&mut self) -> SwitchOutcome;
}
