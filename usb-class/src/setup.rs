//! # SETUP Packet Parsing
//!
//! ```text
//! ┌───────────────┬──────────┬────────┬────────┬─────────┐
//! │ bmRequestType │ bRequest │ wValue │ wIndex │ wLength │
//! │    1 byte     │  1 byte  │ 2 (LE) │ 2 (LE) │  2 (LE) │
//! └───────────────┴──────────┴────────┴────────┴─────────┘
//! ```

use zerocopy::byteorder::{LittleEndian, U16};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::traits::{ClassError, ClassResult};

/// Standard request: GET_INTERFACE
pub const REQ_GET_INTERFACE: u8 = 0x0A;

/// Raw SETUP packet as it arrives on EP0
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: U16<LittleEndian>,
    pub index: U16<LittleEndian>,
    pub length: U16<LittleEndian>,
}

/// Data transfer direction of a control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    HostToDevice,
    DeviceToHost,
}

/// bmRequestType bits 6..5
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
    Reserved,
}

/// bmRequestType bits 4..0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
    Reserved,
}

/// Decoded control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetupRequest {
    pub direction: Direction,
    pub request_type: RequestType,
    pub recipient: Recipient,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupRequest {
    /// Decode the 8 byte SETUP packet
    pub fn parse(raw: &[u8]) -> ClassResult<Self> {
        if raw.len() != core::mem::size_of::<SetupPacket>() {
            return Err(ClassError::MalformedSetup);
        }
        let packet = SetupPacket::read_from(raw).ok_or(ClassError::MalformedSetup)?;
        Ok(Self::from(packet))
    }

    /// Build a request from its fields (used by drivers that pre-decode SETUP)
    pub fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        Self::from(SetupPacket {
            request_type,
            request,
            value: U16::new(value),
            index: U16::new(index),
            length: U16::new(length),
        })
    }

    /// True if `wIndex` names the given interface
    pub fn targets_interface(&self, interface: u8) -> bool {
        self.index == u16::from(interface)
    }
}

impl From<SetupPacket> for SetupRequest {
    fn from(packet: SetupPacket) -> Self {
        let bm = packet.request_type;
        let direction = if bm & 0x80 != 0 {
            Direction::DeviceToHost
        } else {
            Direction::HostToDevice
        };
        let request_type = match (bm >> 5) & 0x03 {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        };
        let recipient = match bm & 0x1F {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => Recipient::Reserved,
        };
        Self {
            direction,
            request_type,
            recipient,
            request: packet.request,
            value: packet.value.get(),
            index: packet.index.get(),
            length: packet.length.get(),
        }
    }
}

/// Answer a class handler gives to a control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlReply<'a> {
    /// Data stage, already truncated to `wLength`
    Data(&'a [u8]),
    /// No data stage, acknowledge with a status packet
    Ack,
}
