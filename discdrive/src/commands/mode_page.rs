//! MODE SENSE(10) / MODE SELECT(10) (op codes 0x5A / 0x55) over the four
//! mode pages the drive layer negotiates: ReadWriteErrorRecovery (0x01),
//! Caching (0x08), CapabilitiesAndMechanicalStatus (0x2A), AllPages
//! (0x3F).

use bitflags::bitflags;
use thiserror::Error;

use super::{Command, Control};

const MODE_SENSE_HEADER_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum Error {
    #[error("MODE SENSE(10) response must be at least {size} bytes long, received {0}", size = MODE_SENSE_HEADER_LEN)]
    IncompleteHeader(usize),
    #[error("MODE SENSE(10) declared {declared} bytes of page data, but only {available} were returned")]
    TruncatedPage { declared: usize, available: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageControl {
    Current = 0b00,
    Changeable = 0b01,
    Default = 0b10,
    Saved = 0b11,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageCode {
    ReadWriteErrorRecovery = 0x01,
    Caching = 0x08,
    CapabilitiesAndMechanicalStatus = 0x2A,
    AllPages = 0x3F,
}

#[derive(Debug)]
pub struct ModeSense10 {
    page_control: PageControl,
    page_code: PageCode,
    allocation_len: u16,
    control: Control,
}

impl ModeSense10 {
    pub fn new(page_control: PageControl, page_code: PageCode, allocation_len: u16, control: Control) -> Self {
        Self {
            page_control,
            page_code,
            allocation_len,
            control,
        }
    }
}

impl Command<10> for ModeSense10 {
    const OP_CODE: u8 = 0x5A;

    type Response = ModeSenseResponse;

    fn as_cdb(&self) -> [u8; 10] {
        let mut bytes = [0u8; 10];
        bytes[0] = Self::OP_CODE;
        bytes[2] = (self.page_control as u8) << 6 | (self.page_code as u8 & 0x3F);
        bytes[7] = (self.allocation_len >> 8) as u8;
        bytes[8] = self.allocation_len as u8;
        bytes[9] = self.control.into();
        bytes
    }

    fn allocation_len(&self) -> usize {
        self.allocation_len.into()
    }
}

/// The raw mode-data header plus the page-specific bytes (the page code
/// byte onward), kept opaque here; callers parse the page bytes with
/// [`ReadWriteErrorRecoveryPage`], [`CachingPage`] or
/// [`CapabilitiesAndMechanicalStatusPage`] as appropriate.
#[derive(Debug)]
pub struct ModeSenseResponse {
    pub mode_data_length: u16,
    pub medium_type: u8,
    pub block_descriptor_length: u16,
    pub page_bytes: Vec<u8>,
}

impl TryFrom<Vec<u8>> for ModeSenseResponse {
    type Error = Error;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        if value.len() < MODE_SENSE_HEADER_LEN {
            return Err(Error::IncompleteHeader(value.len()));
        }

        let mode_data_length = u16::from_be_bytes([value[0], value[1]]);
        let medium_type = value[2];
        let block_descriptor_length = u16::from_be_bytes([value[6], value[7]]);

        let page_start = MODE_SENSE_HEADER_LEN + block_descriptor_length as usize;
        let page_bytes = value.get(page_start..).unwrap_or_default().to_vec();

        Ok(Self {
            mode_data_length,
            medium_type,
            block_descriptor_length,
            page_bytes,
        })
    }
}

/// Writes back a raw page (as read via [`ModeSense10`] with
/// `page_control = Current`, masked by the `Changeable` bits) with PF=1,
/// SP=0.
#[derive(Debug)]
pub struct ModeSelect10<'a> {
    page_bytes: &'a [u8],
    control: Control,
}

impl<'a> ModeSelect10<'a> {
    pub fn new(page_bytes: &'a [u8], control: Control) -> Self {
        Self { page_bytes, control }
    }
}

impl<'a> Command<10> for ModeSelect10<'a> {
    const OP_CODE: u8 = 0x55;

    type Response = Vec<u8>;

    fn as_cdb(&self) -> [u8; 10] {
        let mut bytes = [0u8; 10];
        let len = (MODE_SENSE_HEADER_LEN + self.page_bytes.len()) as u16;
        bytes[0] = Self::OP_CODE;
        bytes[1] |= 1 << 4; // PF
        bytes[7] = (len >> 8) as u8;
        bytes[8] = len as u8;
        bytes[9] = self.control.into();
        bytes
    }

    fn allocation_len(&self) -> usize {
        MODE_SENSE_HEADER_LEN + self.page_bytes.len()
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ErrorRecoveryFlags: u8 {
        const AWRE = 1 << 7;
        const ARRE = 1 << 6;
        const TB = 1 << 5;
        const RC = 1 << 4;
        const EER = 1 << 3;
        const PER = 1 << 2;
        const DTE = 1 << 1;
        const DCR = 1 << 0;
    }
}

/// Mode page 0x01 (Read-Write Error Recovery). `read_retry_count` is the
/// only field the extraction engine mutates (`set_read_retry_count`).
#[derive(Debug, Clone, Copy)]
pub struct ReadWriteErrorRecoveryPage {
    pub flags: ErrorRecoveryFlags,
    pub read_retry_count: u8,
    pub write_retry_count: u8,
    pub recovery_time_limit_ms: u16,
}

impl ReadWriteErrorRecoveryPage {
    pub const PAGE_LENGTH: usize = 12;

    pub fn to_bytes(self) -> [u8; Self::PAGE_LENGTH] {
        let mut bytes = [0u8; Self::PAGE_LENGTH];
        bytes[0] = PageCode::ReadWriteErrorRecovery as u8;
        bytes[1] = 0x0A;
        bytes[2] = self.flags.bits();
        bytes[3] = self.read_retry_count;
        bytes[8] = self.write_retry_count;
        let limit = self.recovery_time_limit_ms.to_be_bytes();
        bytes[10] = limit[0];
        bytes[11] = limit[1];
        bytes
    }
}

impl TryFrom<&[u8]> for ReadWriteErrorRecoveryPage {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() < Self::PAGE_LENGTH {
            return Err(Error::TruncatedPage {
                declared: Self::PAGE_LENGTH,
                available: value.len(),
            });
        }

        Ok(Self {
            flags: ErrorRecoveryFlags::from_bits_truncate(value[2]),
            read_retry_count: value[3],
            write_retry_count: value[8],
            recovery_time_limit_ms: u16::from_be_bytes([value[10], value[11]]),
        })
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CachingFlags: u8 {
        const WCE = 1 << 2;
        const RCD = 1 << 0;
    }
}

/// Mode page 0x08 (Caching), negotiated but never mutated by this crate.
#[derive(Debug, Clone, Copy)]
pub struct CachingPage {
    pub flags: CachingFlags,
}

impl TryFrom<&[u8]> for CachingPage {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() < 3 {
            return Err(Error::TruncatedPage {
                declared: 3,
                available: value.len(),
            });
        }

        Ok(Self {
            flags: CachingFlags::from_bits_truncate(value[2]),
        })
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AudioCapabilities: u8 {
        const CDDA_COMMANDS_SUPPORTED = 1 << 0;
        /// Successive CD-DA reads of the same sector return the same
        /// bytes; a precondition `read_drive_info` enforces.
        const CDDA_STREAM_IS_ACCURATE = 1 << 1;
        const RW_SUPPORTED = 1 << 2;
        const RW_DEINTERLEAVED_AND_CORRECTED = 1 << 3;
        /// C2 error pointers are returned for ReadCD; the other
        /// precondition `read_drive_info` enforces.
        const C2_POINTERS_SUPPORTED = 1 << 4;
        const ISRC = 1 << 5;
        const UPC = 1 << 6;
    }
}

/// Mode page 0x2A (CD Capabilities and Mechanical Status), trimmed to
/// the fields `DriveInfo` and the extraction engine's preconditions use.
#[derive(Debug, Clone, Copy)]
pub struct CapabilitiesAndMechanicalStatusPage {
    pub audio: AudioCapabilities,
    pub buffer_size_kb: u16,
}

impl TryFrom<&[u8]> for CapabilitiesAndMechanicalStatusPage {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() < 14 {
            return Err(Error::TruncatedPage {
                declared: 14,
                available: value.len(),
            });
        }

        Ok(Self {
            audio: AudioCapabilities::from_bits_truncate(value[5]),
            buffer_size_kb: u16::from_be_bytes([value[12], value[13]]),
        })
    }
}
