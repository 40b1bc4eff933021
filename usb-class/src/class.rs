//! # gs_usb Class Driver
//!
//! [`GsUsbClass`] implements the [`ClassDriver`] hooks: it routes SETUP
//! requests, feeds OUT completions into the frame pool and IN completions into
//! the shared [`TransferState`].
//!
//! ## Control routing
//!
//! Requests are offered to each handler in turn; the first one that answers
//! wins, and a request nobody answers stalls EP0:
//!
//! 1. class/vendor request to interface 1 → DFU runtime handler
//! 2. class/vendor request with `wIndex` 0 → candlelight vendor commands
//! 3. standard GET_INTERFACE → alternate setting 0
//! 4. MS OS vendor code to device or interface → OS descriptors
//!
//! The DFU interface is tried first so its requests never reach the vendor
//! handler. The MS OS vendor code is tried last because Windows sends it with
//! both device and interface recipients.

use crate::descriptors::{self, CAN_INTERFACE_NAME, CONFIG_DESCRIPTOR, DFU_INTERFACE_NAME};
use crate::device_bound::{DeviceBound, Reception, ReceiveStats};
use crate::dfu::{DfuHandler, DfuStatus};
use crate::msos::{self, EXT_PROPERTIES_LEN, OS_STRING_DESCRIPTOR};
use crate::pool::FramePool;
use crate::setup::{ControlReply, Recipient, RequestType, SetupRequest, REQ_GET_INTERFACE};
use crate::state::TransferState;
use crate::traits::{
    BootloaderSwitch, CanPort, ClassDriver, EndpointType, UsbTransport, VendorHandler,
};
use crate::{
    CAN_INTERFACE, CAN_INTERFACE_STR_INDEX, CAN_MAX_PACKET_SIZE, DFU_INTERFACE,
    DFU_INTERFACE_STR_INDEX, EP_CAN_IN, EP_CAN_OUT, MS_OS_STRING_INDEX,
};

/// The only alternate setting of both interfaces
const ALTERNATE_SETTING: u8 = 0;

/// Class driver of the CAN adapter.
///
/// `state` and `pool` are shared with the main loop, which sends through the
/// former and drains the latter. `state` is `'static` because the transport
/// may hold on to its transmit buffer between events.
pub struct GsUsbClass<'a, C, V, L, const N: usize> {
    state: &'static TransferState,
    pool: &'a FramePool<N>,
    can: C,
    vendor: V,
    dfu: DfuHandler<L>,
    receiver: DeviceBound,
    /// EP0 response buffer for descriptors built at request time
    scratch: [u8; EXT_PROPERTIES_LEN],
}

impl<'a, C, V, L, const N: usize> GsUsbClass<'a, C, V, L, N>
where
    C: CanPort,
    L: BootloaderSwitch,
{
    pub fn new(
        state: &'static TransferState,
        pool: &'a FramePool<N>,
        can: C,
        vendor: V,
        bootloader: L,
    ) -> Self {
        Self {
            state,
            pool,
            can,
            vendor,
            dfu: DfuHandler::new(bootloader),
            receiver: DeviceBound::new(),
            scratch: [0; EXT_PROPERTIES_LEN],
        }
    }

    pub fn dfu_status(&self) -> &DfuStatus {
        self.dfu.status()
    }

    pub fn receive_stats(&self) -> ReceiveStats {
        self.receiver.stats()
    }

    pub fn can(&self) -> &C {
        &self.can
    }

    pub fn vendor(&self) -> &V {
        &self.vendor
    }

    pub fn bootloader(&self) -> &L {
        self.dfu.switch()
    }

    /// Offer `request` to each handler in routing order.
    ///
    /// Returns `false` if nobody answered.
    fn dispatch<B>(&mut self, bus: &B, request: &SetupRequest) -> bool
    where
        B: UsbTransport,
        V: VendorHandler<B>,
    {
        if matches!(request.request_type, RequestType::Class | RequestType::Vendor)
            && request.recipient == Recipient::Interface
            && request.targets_interface(DFU_INTERFACE)
        {
            if let Some(reply) = self.dfu.handle(request) {
                send_reply(bus, reply);
                return true;
            }
        }

        // 0x0A is both GET_INTERFACE and a vendor command
        if request.request_type != RequestType::Standard
            && request.targets_interface(CAN_INTERFACE)
            && self.vendor.setup(bus, request)
        {
            return true;
        }

        if request.request_type == RequestType::Standard && request.request == REQ_GET_INTERFACE {
            bus.control_send(&[ALTERNATE_SETTING]);
            return true;
        }

        if matches!(request.recipient, Recipient::Device | Recipient::Interface) {
            if let Some(data) = msos::respond(request, &mut self.scratch) {
                bus.control_send(data);
                return true;
            }
        }

        false
    }
}

fn send_reply<B: UsbTransport>(bus: &B, reply: ControlReply<'_>) {
    match reply {
        ControlReply::Data(data) => bus.control_send(data),
        ControlReply::Ack => bus.control_ack(),
    }
}

/// Both endpoint numbers and endpoint addresses are accepted
fn same_endpoint(addr: u8, endpoint: u8) -> bool {
    addr & 0x7F == endpoint & 0x7F
}

impl<B, C, V, L, const N: usize> ClassDriver<B> for GsUsbClass<'_, C, V, L, N>
where
    B: UsbTransport,
    C: CanPort,
    V: VendorHandler<B>,
    L: BootloaderSwitch,
{
    fn init(&mut self, bus: &B, config_index: u8) {
        debug!("configuration {} selected, opening CAN endpoints", config_index);
        bus.open_endpoint(EP_CAN_IN, EndpointType::Bulk, CAN_MAX_PACKET_SIZE);
        bus.open_endpoint(EP_CAN_OUT, EndpointType::Bulk, CAN_MAX_PACKET_SIZE);

        self.state.reset();
        self.dfu.reset();
        self.receiver.arm(bus);
    }

    fn deinit(&mut self, bus: &B, config_index: u8) {
        debug!("configuration {} cleared, closing CAN endpoints", config_index);
        bus.close_endpoint(EP_CAN_IN);
        bus.close_endpoint(EP_CAN_OUT);
    }

    fn setup(&mut self, bus: &B, request: &SetupRequest) {
        if !self.dispatch(bus, request) {
            warn!(
                "stall: request {} type {:?} recipient {:?} index {}",
                request.request,
                request.request_type,
                request.recipient,
                request.index
            );
            bus.control_stall();
        }
    }

    fn ep0_rx_ready(&mut self, bus: &B) {
        self.vendor.out_data(bus);
    }

    fn data_out(&mut self, bus: &B, addr: u8) {
        if !same_endpoint(addr, EP_CAN_OUT) {
            trace!("OUT completion on foreign endpoint {}", addr);
            return;
        }
        if self.receiver.receive(bus, self.pool, &self.can) == Reception::Overflow {
            trace!("{} frames waiting for CAN", self.pool.queued_len());
        }
    }

    fn data_in(&mut self, bus: &B, addr: u8) {
        if !same_endpoint(addr, EP_CAN_IN) {
            trace!("IN completion on foreign endpoint {}", addr);
            return;
        }
        self.state.transmit_complete(bus);
    }

    fn config_descriptor(&self) -> &[u8] {
        &CONFIG_DESCRIPTOR
    }

    fn user_string(&mut self, index: u8) -> Option<&[u8]> {
        let name = match index {
            CAN_INTERFACE_STR_INDEX => CAN_INTERFACE_NAME,
            DFU_INTERFACE_STR_INDEX => DFU_INTERFACE_NAME,
            MS_OS_STRING_INDEX => return Some(&OS_STRING_DESCRIPTOR),
            _ => return None,
        };
        let len = descriptors::string_descriptor(name, &mut self.scratch)?;
        Some(&self.scratch[..len])
    }
}
