//! # Protocol Mode & Persisted Settings
//!
//! The active framing is selected by [`ProtocolFlags`]. The mode command
//! handler writes them into a [`ModeCell`]; the host-bound pipeline only
//! reads. [`UserSettings`] is the record the firmware keeps in flash across
//! power cycles, serialized with `postcard`.

use core::sync::atomic::{AtomicU8, Ordering};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Optional behaviors of the host protocol
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ProtocolFlags: u8 {
        /// Variable length ElmueSoft framing instead of the legacy gs_usb record
        const ELMUE_PROTOCOL = 0x01;
        /// Frames to the host carry a 32 bit microsecond timestamp
        const TIMESTAMP = 0x02;
    }
}

/// Process-wide holder of the active [`ProtocolFlags`]
pub struct ModeCell {
    bits: AtomicU8,
}

impl ModeCell {
    pub const fn new(flags: ProtocolFlags) -> Self {
        Self {
            bits: AtomicU8::new(flags.bits()),
        }
    }

    #[inline]
    pub fn load(&self) -> ProtocolFlags {
        ProtocolFlags::from_bits_truncate(self.bits.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, flags: ProtocolFlags) {
        self.bits.store(flags.bits(), Ordering::Release);
    }
}

impl Default for ModeCell {
    fn default() -> Self {
        Self::new(ProtocolFlags::empty())
    }
}

/// Errors while loading or storing [`UserSettings`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingsError {
    /// Output buffer too small
    BufferTooSmall,
    /// Stored bytes are not a valid settings record (erased flash, old layout)
    Corrupt,
}

impl From<postcard::Error> for SettingsError {
    fn from(e: postcard::Error) -> Self {
        match e {
            postcard::Error::SerializeBufferFull => SettingsError::BufferTooSmall,
            _ => SettingsError::Corrupt,
        }
    }
}

/// Settings persisted in flash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UserSettings {
    /// Raw [`ProtocolFlags`] bits
    pub flags: u8,
    /// Firmware version reported as `bcdDevice`
    pub firmware_bcd: u16,
}

impl UserSettings {
    /// Largest encoded size (varint u16 takes at most 3 bytes)
    pub const MAX_ENCODED_SIZE: usize = 4;

    pub const fn new(flags: ProtocolFlags, firmware_bcd: u16) -> Self {
        Self {
            flags: flags.bits(),
            firmware_bcd,
        }
    }

    pub fn protocol_flags(&self) -> ProtocolFlags {
        ProtocolFlags::from_bits_truncate(self.flags)
    }

    /// Device descriptor reporting this firmware version
    pub const fn device_descriptor(&self) -> [u8; 18] {
        crate::descriptors::device_descriptor(self.firmware_bcd)
    }

    /// Serialize into `buffer`, returning the used prefix
    pub fn to_bytes<'a>(&self, buffer: &'a mut [u8]) -> Result<&'a [u8], SettingsError> {
        postcard::to_slice(self, buffer)
            .map(|used| &*used)
            .map_err(SettingsError::from)
    }

    /// Deserialize a record previously written by [`UserSettings::to_bytes`]
    pub fn from_bytes(data: &[u8]) -> Result<Self, SettingsError> {
        Ok(postcard::from_bytes(data)?)
    }
}

impl Default for UserSettings {
    fn default() -> Self {
        Self::new(ProtocolFlags::empty(), 0x0100)
    }
}
