//! Mock collaborators for the unit tests.

use std::cell::{Cell, RefCell};
use std::vec::Vec;

use crate::setup::SetupRequest;
use crate::state::{InTransfer, TransferState};
use crate::traits::{
    BootloaderSwitch, CanPort, EndpointType, SwitchOutcome, UsbTransport, VendorHandler,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open(u8, EndpointType, u16),
    Close(u8),
    PrepareReceive(u8, usize),
    Transmit(u8, Vec<u8>),
    ControlSend(Vec<u8>),
    ControlAck,
    ControlStall,
}

/// Transport that records every call
#[derive(Default)]
pub struct MockBus {
    events: RefCell<Vec<Event>>,
    rx: RefCell<Vec<u8>>,
    in_flight: RefCell<Option<InTransfer>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes the next `read_packet` returns
    pub fn set_rx(&self, data: &[u8]) {
        *self.rx.borrow_mut() = data.to_vec();
    }

    /// Bytes still readable through the last transmitted token
    pub fn in_flight(&self) -> Option<Vec<u8>> {
        self.in_flight
            .borrow()
            .as_ref()
            .and_then(|t| t.with_data(<[u8]>::to_vec))
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn transmits(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::Transmit(..)))
            .count()
    }

    pub fn last_transmit(&self) -> Option<Vec<u8>> {
        self.events.borrow().iter().rev().find_map(|e| match e {
            Event::Transmit(_, data) => Some(data.clone()),
            _ => None,
        })
    }

    /// The single control outcome recorded since the last `clear`
    pub fn control(&self) -> Option<Event> {
        self.events
            .borrow()
            .iter()
            .find(|e| {
                matches!(
                    e,
                    Event::ControlSend(_) | Event::ControlAck | Event::ControlStall
                )
            })
            .cloned()
    }

    fn push(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

impl UsbTransport for MockBus {
    fn open_endpoint(&self, addr: u8, ep_type: EndpointType, max_packet_size: u16) {
        self.push(Event::Open(addr, ep_type, max_packet_size));
    }

    fn close_endpoint(&self, addr: u8) {
        self.push(Event::Close(addr));
    }

    fn prepare_receive(&self, addr: u8, len: usize) {
        self.push(Event::PrepareReceive(addr, len));
    }

    fn read_packet(&self, _addr: u8, buf: &mut [u8]) -> usize {
        let rx = self.rx.borrow();
        let len = rx.len().min(buf.len());
        buf[..len].copy_from_slice(&rx[..len]);
        len
    }

    fn transmit(&self, addr: u8, transfer: InTransfer) {
        let data = transfer.with_data(<[u8]>::to_vec).unwrap_or_default();
        self.push(Event::Transmit(addr, data));
        *self.in_flight.borrow_mut() = Some(transfer);
    }

    fn control_send(&self, data: &[u8]) {
        self.push(Event::ControlSend(data.to_vec()));
    }

    fn control_ack(&self) {
        self.push(Event::ControlAck);
    }

    fn control_stall(&self) {
        self.push(Event::ControlStall);
    }
}

/// Transfer state with the lifetime the transport hand-off needs
pub fn static_state() -> &'static TransferState {
    Box::leak(Box::new(TransferState::new()))
}

#[derive(Default)]
pub struct MockCan {
    pub fd: Cell<bool>,
    pub overflows: Cell<u32>,
}

impl CanPort for MockCan {
    fn is_fd_active(&self) -> bool {
        self.fd.get()
    }

    fn report_tx_overflow(&self) {
        self.overflows.set(self.overflows.get() + 1);
    }
}

/// Vendor handler that accepts a fixed set of request codes
#[derive(Default)]
pub struct MockVendor {
    pub accepts: Vec<u8>,
    pub seen: Vec<SetupRequest>,
    pub out_stages: usize,
}

impl MockVendor {
    pub fn accepting(codes: &[u8]) -> Self {
        Self {
            accepts: codes.to_vec(),
            ..Self::default()
        }
    }
}

impl<B: UsbTransport> VendorHandler<B> for MockVendor {
    fn setup(&mut self, bus: &B, request: &SetupRequest) -> bool {
        self.seen.push(*request);
        if self.accepts.contains(&request.request) {
            bus.control_ack();
            true
        } else {
            false
        }
    }

    fn out_data(&mut self, _bus: &B) {
        self.out_stages += 1;
    }
}

pub struct MockBootloader {
    pub outcome: SwitchOutcome,
    pub calls: usize,
}

impl MockBootloader {
    pub fn new(outcome: SwitchOutcome) -> Self {
        Self { outcome, calls: 0 }
    }
}

impl BootloaderSwitch for MockBootloader {
    fn switch_to_bootloader(&mut self) -> SwitchOutcome {
        self.calls += 1;
        self.outcome
    }
}
