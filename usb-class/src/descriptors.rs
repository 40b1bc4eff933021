//! # USB Descriptors
//!
//! Fixed descriptor tables of the adapter. They are versioned wire data: the
//! host drivers (gs_usb on Linux, the Windows updater) match on these bytes,
//! so they must not change without a reason.

use crate::{
    CAN_INTERFACE, CAN_INTERFACE_STR_INDEX, CAN_MAX_PACKET_SIZE, DFU_INTERFACE,
    DFU_INTERFACE_STR_INDEX, EP_CAN_IN, EP_CAN_OUT,
};

pub const USB_DT_DEVICE: u8 = 0x01;
pub const USB_DT_CONFIGURATION: u8 = 0x02;
pub const USB_DT_STRING: u8 = 0x03;
pub const USB_DT_INTERFACE: u8 = 0x04;
pub const USB_DT_ENDPOINT: u8 = 0x05;
pub const USB_DT_DFU_FUNCTIONAL: u8 = 0x21;

/// OpenMoko, Inc.
pub const VENDOR_ID: u16 = 0x1D50;
/// CANable candlelight
pub const PRODUCT_ID: u16 = 0x606F;

pub const IDX_MANUFACTURER_STR: u8 = 1;
pub const IDX_PRODUCT_STR: u8 = 2;
pub const IDX_SERIAL_STR: u8 = 3;
pub const IDX_CONFIG_STR: u8 = 4;

/// EP0 max packet size
pub const EP0_MAX_PACKET_SIZE: u8 = 64;

/// Shown by Windows while the driver is installed
pub const CAN_INTERFACE_NAME: &str = "CAN FD Interface";
/// Shown by Windows while the driver is installed
pub const DFU_INTERFACE_NAME: &str = "Firmware Update Interface";

pub const CONFIG_DESCRIPTOR_LEN: usize = 50;

/// Device descriptor with the firmware version as `bcdDevice`
pub const fn device_descriptor(firmware_bcd: u16) -> [u8; 18] {
    let vid = VENDOR_ID.to_le_bytes();
    let pid = PRODUCT_ID.to_le_bytes();
    let bcd = firmware_bcd.to_le_bytes();
    [
        18,            // bLength
        USB_DT_DEVICE, // bDescriptorType
        0x00, 0x02,    // bcdUSB 2.0
        0x00,          // bDeviceClass: per interface
        0x00,          // bDeviceSubClass
        0x00,          // bDeviceProtocol
        EP0_MAX_PACKET_SIZE,
        vid[0], vid[1],
        pid[0], pid[1],
        bcd[0], bcd[1],
        IDX_MANUFACTURER_STR,
        IDX_PRODUCT_STR,
        IDX_SERIAL_STR,
        0x01, // bNumConfigurations
    ]
}

const MPS: [u8; 2] = CAN_MAX_PACKET_SIZE.to_le_bytes();

/// Full speed configuration: gs_usb interface plus DFU runtime interface
pub const CONFIG_DESCRIPTOR: [u8; CONFIG_DESCRIPTOR_LEN] = [
    // Configuration
    0x09,
    USB_DT_CONFIGURATION,
    CONFIG_DESCRIPTOR_LEN as u8, 0x00, // wTotalLength
    0x02, // bNumInterfaces
    0x01, // bConfigurationValue
    IDX_CONFIG_STR,
    0x80, // bmAttributes: bus powered
    0x4B, // bMaxPower: 150 mA
    // gs_usb interface
    0x09,
    USB_DT_INTERFACE,
    CAN_INTERFACE,
    0x00, // bAlternateSetting
    0x02, // bNumEndpoints
    0xFF, 0xFF, 0xFF, // vendor specific class, subclass, protocol
    CAN_INTERFACE_STR_INDEX,
    // Bulk IN
    0x07,
    USB_DT_ENDPOINT,
    EP_CAN_IN,
    0x02, // bulk
    MPS[0], MPS[1],
    0x00, // bInterval
    // Bulk OUT
    0x07,
    USB_DT_ENDPOINT,
    EP_CAN_OUT,
    0x02, // bulk
    MPS[0], MPS[1],
    0x00, // bInterval
    // DFU runtime interface
    0x09,
    USB_DT_INTERFACE,
    DFU_INTERFACE,
    0x00, // bAlternateSetting
    0x00, // bNumEndpoints
    0xFE, // application specific
    0x01, // DFU
    0x01, // runtime protocol
    DFU_INTERFACE_STR_INDEX,
    // DFU functional
    0x09,
    USB_DT_DFU_FUNCTIONAL,
    0x0B, // bmAttributes: will detach, upload, download
    0xFF, 0x00, // wDetachTimeOut
    0x00, 0x08, // wTransferSize
    0x1A, 0x01, // bcdDFUVersion
];

/// Encode `ascii` as a string descriptor into `out`.
///
/// Returns the descriptor length, or `None` if `out` is too small.
pub fn string_descriptor(ascii: &str, out: &mut [u8]) -> Option<usize> {
    let len = 2 + ascii.len() * 2;
    if len > out.len() || len > usize::from(u8::MAX) {
        return None;
    }
    out[0] = len as u8;
    out[1] = USB_DT_STRING;
    for (dst, &src) in out[2..len].chunks_exact_mut(2).zip(ascii.as_bytes()) {
        dst.copy_from_slice(&u16::from(src).to_le_bytes());
    }
    Some(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_descriptor() {
        let dd = device_descriptor(0x2506);
        assert_eq!(dd[0] as usize, dd.len());
        assert_eq!(&dd[8..12], &[0x50, 0x1D, 0x6F, 0x60]);
        assert_eq!(&dd[12..14], &[0x06, 0x25]);
        assert_eq!(dd[17], 1);
    }

    #[test]
    fn test_config_descriptor_walk() {
        // Every sub-descriptor length must land exactly on the total
        let mut at = 0;
        let mut kinds = Vec::new();
        while at < CONFIG_DESCRIPTOR.len() {
            kinds.push(CONFIG_DESCRIPTOR[at + 1]);
            at += CONFIG_DESCRIPTOR[at] as usize;
        }
        assert_eq!(at, CONFIG_DESCRIPTOR_LEN);
        assert_eq!(
            kinds,
            vec![
                USB_DT_CONFIGURATION,
                USB_DT_INTERFACE,
                USB_DT_ENDPOINT,
                USB_DT_ENDPOINT,
                USB_DT_INTERFACE,
                USB_DT_DFU_FUNCTIONAL
            ]
        );
    }

    #[test]
    fn test_endpoints_match_pipelines() {
        assert_eq!(&CONFIG_DESCRIPTOR[20..24], &[EP_CAN_IN, 0x02, 64, 0]);
        assert_eq!(&CONFIG_DESCRIPTOR[27..31], &[EP_CAN_OUT, 0x02, 64, 0]);
    }

    #[test]
    fn test_string_descriptor() {
        let mut out = [0u8; 64];
        let len = string_descriptor("CAN", &mut out).unwrap();
        assert_eq!(&out[..len], &[8, USB_DT_STRING, b'C', 0, b'A', 0, b'N', 0]);
    }

    #[test]
    fn test_string_descriptor_too_long() {
        let mut out = [0u8; 8];
        assert_eq!(string_descriptor(DFU_INTERFACE_NAME, &mut out), None);
    }
}
