//! READ TOC/PMA/ATIP (op code 0x43) in all six `format` variants. Only
//! `RawTOC` (the Full-TOC) is consumed by the disc model builder; the
//! others are encoded for completeness of the command surface and
//! return their response as opaque bytes.

use std::marker::PhantomData;

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::addressing::{Sector, SectorAddress, SectorError};

use super::Command;

const TOC_HEADER_LEN: usize = 4;
const FULL_TOC_ENTRY_LEN: usize = 11;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    InvalidAddress(#[from] SectorError),
    #[error("received {0} bytes of READ TOC response, expected at least {min}", min = TOC_HEADER_LEN)]
    IncompleteHeader(usize),
    #[error("Full-TOC entry is {0} bytes, expected {FULL_TOC_ENTRY_LEN}")]
    ShortEntry(usize),
}

pub trait TOCAddr: Sized {
    const MSF_FLAG: bool;

    fn from_be_bytes(bytes: &[u8; 4]) -> Result<Self, SectorError>;
}

impl TOCAddr for Sector {
    const MSF_FLAG: bool = false;

    fn from_be_bytes(bytes: &[u8; 4]) -> Result<Self, SectorError> {
        Sector::try_from(i32::from_be_bytes(*bytes))
    }
}

impl TOCAddr for SectorAddress {
    const MSF_FLAG: bool = true;

    fn from_be_bytes(bytes: &[u8; 4]) -> Result<Self, SectorError> {
        SectorAddress::new(bytes[1], bytes[2], bytes[3])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum Format {
    FormattedTOC = 0b0000,
    MultiSessionInfo = 0b0001,
    RawTOC = 0b0010,
    Pma = 0b0011,
    Atip = 0b0100,
    CDText = 0b0101,
}

fn toc_cdb(format: Format, msf_flag: bool, track_or_session: u8, allocation_len: u16, control: u8) -> [u8; 10] {
    let mut bytes = [0u8; 10];
    bytes[0] = 0x43;
    bytes[1] |= u8::from(msf_flag) << 1;
    bytes[2] |= u8::from(format) & 0xF;
    bytes[6] = track_or_session;
    bytes[7] = (allocation_len >> 8) as u8;
    bytes[8] = allocation_len as u8;
    bytes[9] = control;
    bytes
}

/// READ TOC format 0: the formatted (CD-ROM-style) TOC, one 8-byte
/// descriptor per track plus the lead-out.
#[derive(Debug)]
pub struct FormattedTOC<Addr: TOCAddr> {
    track: u8,
    allocation_len: u16,
    control: u8,
    _addr: PhantomData<Addr>,
}

impl<Addr: TOCAddr> FormattedTOC<Addr> {
    pub fn new(track: u8, allocation_len: u16, control: u8) -> Self {
        Self {
            track,
            allocation_len,
            control,
            _addr: PhantomData,
        }
    }
}

impl<Addr: TOCAddr> Command<10> for FormattedTOC<Addr> {
    const OP_CODE: u8 = 0x43;

    type Response = Toc<Addr>;

    fn as_cdb(&self) -> [u8; 10] {
        toc_cdb(Format::FormattedTOC, Addr::MSF_FLAG, self.track, self.allocation_len, self.control)
    }

    fn allocation_len(&self) -> usize {
        self.allocation_len.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Adr {
    Mode1Q = 0b0001,
    Mode2Q = 0b0010,
    Mode3Q = 0b0011,
    /// Full-TOC skip-interval / next-possible-program-area pointers.
    Mode5Q = 0b0101,
}

bitflags! {
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control: u8 {
        const FOUR_CHANNELS = 1 << 3;
        const IS_DATA = 1 << 2;
        const COPY_PERMITTED = 1 << 1;
        const PREEMPHASIS_OR_INCREMENTAL = 1 << 0;
    }
}

impl Control {
    pub fn category(self) -> super::super::disc::TrackCategory {
        use super::super::disc::TrackCategory;
        match (self.contains(Control::IS_DATA), self.contains(Control::FOUR_CHANNELS)) {
            (false, false) => TrackCategory::Audio2Channels,
            (true, _) => TrackCategory::Data,
            (false, true) => TrackCategory::Audio4Channels,
        }
    }
}

#[allow(dead_code)]
#[derive(Debug)]
pub struct TrackDescriptor<Addr: TOCAddr> {
    pub adr: Adr,
    pub control: Control,
    pub number: u8,
    pub start_addr: Addr,
}

#[allow(dead_code)]
#[derive(Debug)]
pub struct Toc<Addr: TOCAddr> {
    pub length: u16,
    pub first_track_num: u8,
    pub last_track_num: u8,
    pub track_descriptors: Vec<TrackDescriptor<Addr>>,
}

impl<Addr: TOCAddr> TryFrom<Vec<u8>> for Toc<Addr> {
    type Error = Error;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        if value.len() < 4 {
            return Err(Error::IncompleteHeader(value.len()));
        }

        let length = u16::from_be_bytes([value[0], value[1]]);
        let first_track_num = value[2];
        let last_track_num = value[3];

        let mut track_descriptors = Vec::new();
        for descriptor in value[4..].chunks_exact(8) {
            let adr_bits = (descriptor[1] & 0xF0) >> 4;
            let adr = Adr::try_from_primitive(adr_bits).unwrap_or(Adr::Mode1Q);
            let control = Control::from_bits_truncate(descriptor[1] & 0x0F);
            let track_num = descriptor[2];
            let start_addr = Addr::from_be_bytes(&descriptor[4..=7].try_into().unwrap())?;

            track_descriptors.push(TrackDescriptor {
                adr,
                control,
                number: track_num,
                start_addr,
            });
        }

        Ok(Toc {
            length,
            first_track_num,
            last_track_num,
            track_descriptors,
        })
    }
}

/// A track-start, session-boundary or lead-out pointer, keyed by
/// `(session_number, adr, point)` as described by §4.3.
pub const POINT_FIRST_TRACK_IN_SESSION: u8 = 0xA0;
pub const POINT_LAST_TRACK_IN_SESSION: u8 = 0xA1;
pub const POINT_LEAD_OUT: u8 = 0xA2;

#[derive(Debug, Clone, Copy)]
pub struct FullTocEntry {
    pub session_number: u8,
    pub adr: Adr,
    pub control: Control,
    pub point: u8,
    /// The entry's own MSF location within the TOC track; vendors
    /// generally leave this at its nominal lead-in value.
    pub address: SectorAddress,
    /// Absolute address of the data track/point referenced by `point`.
    /// Always BCD-free; decoded straight from the raw MSF bytes.
    pub paddress: SectorAddress,
}

impl FullTocEntry {
    pub fn is_track_point(&self) -> bool {
        matches!(self.adr, Adr::Mode1Q) && (0x01..=0x63).contains(&self.point)
    }
}

/// READ TOC format 2 (Full-TOC): a stream of 11-byte entries.
#[derive(Debug)]
pub struct FullTOC {
    session: u8,
    allocation_len: u16,
    control: u8,
}

impl FullTOC {
    pub fn new(session: u8, allocation_len: u16, control: u8) -> Self {
        Self {
            session,
            allocation_len,
            control,
        }
    }
}

impl Command<10> for FullTOC {
    const OP_CODE: u8 = 0x43;

    type Response = FullToc;

    fn as_cdb(&self) -> [u8; 10] {
        toc_cdb(Format::RawTOC, false, self.session, self.allocation_len, self.control)
    }

    fn allocation_len(&self) -> usize {
        self.allocation_len.into()
    }
}

#[derive(Debug)]
pub struct FullToc {
    pub length: u16,
    pub first_session: u8,
    pub last_session: u8,
    pub entries: Vec<FullTocEntry>,
}

impl TryFrom<Vec<u8>> for FullToc {
    type Error = Error;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        if value.len() < TOC_HEADER_LEN {
            return Err(Error::IncompleteHeader(value.len()));
        }

        let length = u16::from_be_bytes([value[0], value[1]]);
        let first_session = value[2];
        let last_session = value[3];

        let mut entries = Vec::new();
        for chunk in value[TOC_HEADER_LEN..].chunks(FULL_TOC_ENTRY_LEN) {
            if chunk.len() < FULL_TOC_ENTRY_LEN {
                return Err(Error::ShortEntry(chunk.len()));
            }

            let session_number = chunk[0];
            let adr_bits = (chunk[1] & 0xF0) >> 4;
            let adr = Adr::try_from_primitive(adr_bits).unwrap_or(Adr::Mode1Q);
            let control = Control::from_bits_truncate(chunk[1] & 0x0F);
            let point = chunk[3];
            let address = SectorAddress::new(chunk[4], chunk[5], chunk[6])?;
            let paddress = SectorAddress::new(chunk[8], chunk[9], chunk[10])?;

            entries.push(FullTocEntry {
                session_number,
                adr,
                control,
                point,
                address,
                paddress,
            });
        }

        Ok(FullToc {
            length,
            first_session,
            last_session,
            entries,
        })
    }
}

macro_rules! opaque_toc_format {
    ($name:ident, $format:expr) => {
        #[derive(Debug)]
        pub struct $name {
            session: u8,
            allocation_len: u16,
            control: u8,
        }

        impl $name {
            pub fn new(session: u8, allocation_len: u16, control: u8) -> Self {
                Self {
                    session,
                    allocation_len,
                    control,
                }
            }
        }

        impl Command<10> for $name {
            const OP_CODE: u8 = 0x43;

            type Response = Vec<u8>;

            fn as_cdb(&self) -> [u8; 10] {
                toc_cdb($format, false, self.session, self.allocation_len, self.control)
            }

            fn allocation_len(&self) -> usize {
                self.allocation_len.into()
            }
        }
    };
}

opaque_toc_format!(MultiSessionInfo, Format::MultiSessionInfo);
opaque_toc_format!(Pma, Format::Pma);
opaque_toc_format!(Atip, Format::Atip);
opaque_toc_format!(CDText, Format::CDText);
