//! # Microsoft OS 1.0 Descriptors
//!
//! Windows reads string descriptor 0xEE, finds the vendor code, and then asks
//! for the compatible-ID table (wIndex 4) and the extended properties
//! (wIndex 5) of each interface with that vendor request. Answering both lets
//! Windows bind WinUSB to the CAN and the firmware update interface without a
//! driver package.
//!
//! Both interfaces need a `DeviceInterfaceGUIDs` entry; without one for the
//! DFU interface WinUSB is not installed there and the updater cannot detach
//! the device. The two GUIDs differ only in their second digit:
//!
//! - interface 0: `{c15b4308-04d3-11e6-b3ea-6057189e6443}`
//! - interface 1: `{c25b4308-04d3-11e6-b3ea-6057189e6443}`

use crate::setup::SetupRequest;
use crate::{DFU_INTERFACE, MS_OS_VENDOR_CODE};

/// wIndex of the extended compat ID request
pub const FEATURE_COMPAT_ID: u16 = 0x0004;

/// wIndex of the extended properties request
pub const FEATURE_EXT_PROPERTIES: u16 = 0x0005;

/// Offset of the GUID digit that tells the two interfaces apart
pub const GUID_PATCH_OFFSET: usize = 70;

/// Extended compat ID descriptor: WINUSB on interfaces 0 and 1
pub const COMPAT_ID_DESCRIPTOR: [u8; 64] = [
    0x40, 0x00, 0x00, 0x00, // dwLength
    0x00, 0x01, // bcdVersion 1.0
    0x04, 0x00, // wIndex
    0x02, // bCount
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // reserved
    // CAN interface
    0x00, // bFirstInterfaceNumber
    0x01, // reserved
    b'W', b'I', b'N', b'U', b'S', b'B', 0x00, 0x00, // compatibleID
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // subCompatibleID
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // reserved
    // Firmware update interface
    0x01, // bFirstInterfaceNumber
    0x01, // reserved
    b'W', b'I', b'N', b'U', b'S', b'B', 0x00, 0x00, // compatibleID
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // subCompatibleID
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // reserved
];

/// Length of [`EXT_PROPERTIES_DESCRIPTOR`]
pub const EXT_PROPERTIES_LEN: usize = 146;

/// Extended properties descriptor with the interface 0 GUID
pub const EXT_PROPERTIES_DESCRIPTOR: [u8; EXT_PROPERTIES_LEN] = ext_properties();

const PROPERTY_NAME: &str = "DeviceInterfaceGUIDs";
const INTERFACE_GUID: &str = "{c15b4308-04d3-11e6-b3ea-6057189e6443}";

const fn ext_properties() -> [u8; EXT_PROPERTIES_LEN] {
    let mut d = [0u8; EXT_PROPERTIES_LEN];
    // Header section
    d[0] = EXT_PROPERTIES_LEN as u8; // dwLength
    d[5] = 0x01; // bcdVersion 1.0
    d[6] = FEATURE_EXT_PROPERTIES as u8; // wIndex
    d[8] = 0x01; // wCount
    // Custom property section
    d[10] = (EXT_PROPERTIES_LEN - 10) as u8; // dwSize
    d[14] = 0x07; // dwPropertyDataType: REG_MULTI_SZ
    d[18] = ((PROPERTY_NAME.len() + 1) * 2) as u8; // wPropertyNameLength
    d = utf16_into(d, 20, PROPERTY_NAME.as_bytes());
    let data_len_at = 20 + (PROPERTY_NAME.len() + 1) * 2;
    d[data_len_at] = ((INTERFACE_GUID.len() + 2) * 2) as u8; // dwPropertyDataLength
    // Two trailing NULs (REG_MULTI_SZ terminator) stay zero
    utf16_into(d, data_len_at + 4, INTERFACE_GUID.as_bytes())
}

const fn utf16_into(
    mut d: [u8; EXT_PROPERTIES_LEN],
    start: usize,
    ascii: &[u8],
) -> [u8; EXT_PROPERTIES_LEN] {
    let mut i = 0;
    while i < ascii.len() {
        d[start + i * 2] = ascii[i];
        i += 1;
    }
    d
}

/// Microsoft OS string descriptor: "MSFT100" followed by the vendor code
pub const OS_STRING_DESCRIPTOR: [u8; 18] = [
    18, 0x03, // bLength, STRING
    b'M', 0, b'S', 0, b'F', 0, b'T', 0, b'1', 0, b'0', 0, b'0', 0, // qwSignature
    MS_OS_VENDOR_CODE, // bMS_VendorCode
    0x00, // bPad
];

/// Answer an OS feature descriptor request.
///
/// `scratch` receives the patched copy of the extended properties. Returns
/// `None` when the request is not one of ours.
pub fn respond<'a>(
    request: &SetupRequest,
    scratch: &'a mut [u8; EXT_PROPERTIES_LEN],
) -> Option<&'a [u8]> {
    if request.request != MS_OS_VENDOR_CODE || request.value > u16::from(DFU_INTERFACE) {
        return None;
    }
    let wanted = usize::from(request.length);

    match request.index {
        FEATURE_COMPAT_ID => {
            trace!("MS OS compat ID, {} bytes", wanted);
            let len = COMPAT_ID_DESCRIPTOR.len().min(wanted);
            scratch[..len].copy_from_slice(&COMPAT_ID_DESCRIPTOR[..len]);
            Some(&scratch[..len])
        }
        FEATURE_EXT_PROPERTIES => {
            trace!("MS OS properties for interface {}", request.value);
            scratch.copy_from_slice(&EXT_PROPERTIES_DESCRIPTOR);
            if request.value == u16::from(DFU_INTERFACE) {
                scratch[GUID_PATCH_OFFSET] = b'2';
            }
            Some(&scratch[..EXT_PROPERTIES_LEN.min(wanted)])
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(value: u16, index: u16, length: u16) -> SetupRequest {
        SetupRequest::new(0xC1, MS_OS_VENDOR_CODE, value, index, length)
    }

    #[test]
    fn test_ext_properties_bytes() {
        let d = &EXT_PROPERTIES_DESCRIPTOR;
        assert_eq!(&d[..10], &[0x92, 0, 0, 0, 0x00, 0x01, 0x05, 0x00, 0x01, 0x00]);
        assert_eq!(&d[10..20], &[0x88, 0, 0, 0, 0x07, 0, 0, 0, 0x2A, 0x00]);
        assert_eq!(&d[20..24], &[b'D', 0, b'e', 0]);
        assert_eq!(&d[60..62], &[0, 0]);
        assert_eq!(&d[62..66], &[0x50, 0, 0, 0]);
        assert_eq!(&d[66..72], &[b'{', 0, b'c', 0, b'1', 0]);
        assert_eq!(&d[140..146], &[b'}', 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_compat_id() {
        let mut scratch = [0u8; EXT_PROPERTIES_LEN];
        let reply = respond(&request(0, FEATURE_COMPAT_ID, 0xFF), &mut scratch).unwrap();
        assert_eq!(reply, &COMPAT_ID_DESCRIPTOR[..]);
    }

    #[test]
    fn test_compat_id_truncated() {
        let mut scratch = [0u8; EXT_PROPERTIES_LEN];
        // Windows first asks for the 16 byte header only
        let reply = respond(&request(0, FEATURE_COMPAT_ID, 16), &mut scratch).unwrap();
        assert_eq!(reply, &COMPAT_ID_DESCRIPTOR[..16]);
    }

    #[test]
    fn test_interfaces_differ_only_in_guid_digit() {
        let mut scratch0 = [0u8; EXT_PROPERTIES_LEN];
        let mut scratch1 = [0u8; EXT_PROPERTIES_LEN];
        let if0 = respond(&request(0, FEATURE_EXT_PROPERTIES, 0x200), &mut scratch0).unwrap();
        let if1 = respond(&request(1, FEATURE_EXT_PROPERTIES, 0x200), &mut scratch1).unwrap();

        assert_eq!(if0.len(), EXT_PROPERTIES_LEN);
        assert_eq!(if1.len(), EXT_PROPERTIES_LEN);
        let diffs: Vec<usize> = (0..EXT_PROPERTIES_LEN).filter(|&i| if0[i] != if1[i]).collect();
        assert_eq!(diffs, vec![GUID_PATCH_OFFSET]);
        assert_eq!(if0[GUID_PATCH_OFFSET], b'1');
        assert_eq!(if1[GUID_PATCH_OFFSET], b'2');
    }

    #[test]
    fn test_ext_properties_truncated() {
        let mut scratch = [0u8; EXT_PROPERTIES_LEN];
        let reply = respond(&request(1, FEATURE_EXT_PROPERTIES, 10), &mut scratch).unwrap();
        assert_eq!(reply, &EXT_PROPERTIES_DESCRIPTOR[..10]);
    }

    #[test]
    fn test_rejects_foreign_requests() {
        let mut scratch = [0u8; EXT_PROPERTIES_LEN];
        // Interface out of range
        assert!(respond(&request(2, FEATURE_COMPAT_ID, 64), &mut scratch).is_none());
        // Unknown feature index
        assert!(respond(&request(0, 0x0006, 64), &mut scratch).is_none());
        // Different vendor code
        let other = SetupRequest::new(0xC1, 0x21, 0, FEATURE_COMPAT_ID, 64);
        assert!(respond(&other, &mut scratch).is_none());
    }

    #[test]
    fn test_os_string_descriptor() {
        assert_eq!(OS_STRING_DESCRIPTOR[0] as usize, OS_STRING_DESCRIPTOR.len());
        assert_eq!(OS_STRING_DESCRIPTOR[16], 0x20);
    }
}
