//! Drive abstraction (component D): opens a device handle, negotiates
//! mode pages, auto-detects the ReadCD sector/C2/subchannel layout, and
//! exposes the public contract of spec §4.4.

use std::fs::File;

use i24::u24;

use crate::addressing::Sector;
use crate::commands::Command;
use crate::commands::inquiry::{Inquiry, PeripheralDeviceType};
use crate::commands::mode_page::{
    CapabilitiesAndMechanicalStatusPage, ModeSelect10, ModeSense10, PageCode, PageControl,
    ReadWriteErrorRecoveryPage,
};
use crate::commands::read_cd::{C2ErrorCode, MainChannelFlags, ReadCD, SectorType, SubChannelSelection};
use crate::commands::test_unit_ready::TestUnitReady;
use crate::commands::toc::{FullTOC, FullToc};
use crate::commands::Control;
use crate::disc::{build_disc_info, DiscInfo};
use crate::error::RipError;
use crate::offset::lookup_read_offset_correction;
use crate::subchannel::{self, CHANNEL_Q};
use crate::transport::sgio::{DxferDirection, run_sgio};
use crate::transport::Transport;

const SECTOR_DATA_LEN: usize = 2352;
const C2_DATA_LEN: usize = 294;
const SUBCHANNELS_DATA_LEN: usize = 96;
const RAW_SECTOR_BUFFER_LEN: usize = SECTOR_DATA_LEN + C2_DATA_LEN + SUBCHANNELS_DATA_LEN;

/// One absolute-sector read, with the three sub-buffers the drive
/// returns split out according to the detected [`ReadCdLayout`].
#[derive(Debug, Clone)]
pub struct RawSector {
    pub sector_data: Vec<u8>,
    pub subchannels_data: Vec<u8>,
    pub c2_data: Vec<u8>,
}

impl From<RawSector> for crate::extract::RawRead {
    fn from(raw: RawSector) -> Self {
        crate::extract::RawRead {
            sector_data: raw.sector_data,
            subchannels_data: raw.subchannels_data,
            c2_data: raw.c2_data,
        }
    }
}

/// The two known orderings a drive returns `[sector | C2 | subchannel]`
/// data in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCdLayout {
    /// `[sector | C2 | subchannel]`
    SectorC2Subchannel,
    /// `[sector | subchannel | C2]`
    SectorSubchannelC2,
}

impl ReadCdLayout {
    fn split<'a>(self, raw: &'a [u8]) -> (&'a [u8], &'a [u8], &'a [u8]) {
        let sector = &raw[..SECTOR_DATA_LEN];
        match self {
            ReadCdLayout::SectorC2Subchannel => {
                let c2 = &raw[SECTOR_DATA_LEN..SECTOR_DATA_LEN + C2_DATA_LEN];
                let subchannels = &raw[SECTOR_DATA_LEN + C2_DATA_LEN..];
                (sector, subchannels, c2)
            }
            ReadCdLayout::SectorSubchannelC2 => {
                let subchannels = &raw[SECTOR_DATA_LEN..SECTOR_DATA_LEN + SUBCHANNELS_DATA_LEN];
                let c2 = &raw[SECTOR_DATA_LEN + SUBCHANNELS_DATA_LEN..];
                (sector, subchannels, c2)
            }
        }
    }
}

#[derive(Debug)]
pub struct DriveInfo {
    pub vendor: String,
    pub product: String,
    pub layout: ReadCdLayout,
    pub buffer_size_kb: u16,
    pub supports_accurate_stream: bool,
    pub supports_c2_error_reporting: bool,
    pub read_offset_correction: Option<i32>,
}

/// Bit-mask of writable fields for a mode page, read once at open time
/// via the `Changeable` page-control value.
#[derive(Debug, Clone, Copy)]
struct PageMask {
    bytes: [u8; ReadWriteErrorRecoveryPage::PAGE_LENGTH],
}

impl PageMask {
    fn allows(&self, field_offset: usize) -> bool {
        self.bytes.get(field_offset).is_some_and(|&b| b != 0)
    }
}

pub struct Drive {
    file: File,
    layout: Option<ReadCdLayout>,
    error_recovery_mask: Option<PageMask>,
}

const MAX_AUTODETECT_PASSES: u8 = 3;
const AUTODETECT_SAMPLE_SECTORS: i32 = 10;
/// Relative sector 0, per §4.4's auto-detection starting point.
const AUTODETECT_START_SECTOR: i32 = 150;
const AUTODETECT_MAX_DELTA: i32 = 10;

impl Drive {
    pub fn new(file: File) -> Self {
        Self {
            file,
            layout: None,
            error_recovery_mask: None,
        }
    }

    fn read_mode_page_current(&self, page_code: PageCode) -> Result<Vec<u8>, RipError> {
        let cmd = ModeSense10::new(PageControl::Current, page_code, 255, Control::from(0));
        let response = self.file.execute(cmd).map_err(scsi_error)?;
        Ok(response.page_bytes)
    }

    fn read_mode_page_changeable(&self, page_code: PageCode) -> Result<Vec<u8>, RipError> {
        let cmd = ModeSense10::new(PageControl::Changeable, page_code, 255, Control::from(0));
        let response = self.file.execute(cmd).map_err(scsi_error)?;
        Ok(response.page_bytes)
    }

    /// Reads the CHANGABLE_VALUES mask for every negotiated mode page.
    /// Only the Read-Write Error Recovery page's mask is retained
    /// (it's the only page this crate ever writes back).
    fn negotiate_mode_pages(&mut self) -> Result<(), RipError> {
        for page_code in [
            PageCode::ReadWriteErrorRecovery,
            PageCode::Caching,
            PageCode::CapabilitiesAndMechanicalStatus,
            PageCode::AllPages,
        ] {
            let _ = self.read_mode_page_changeable(page_code)?;
        }

        let mask_bytes = self.read_mode_page_changeable(PageCode::ReadWriteErrorRecovery)?;
        if mask_bytes.len() >= ReadWriteErrorRecoveryPage::PAGE_LENGTH {
            let mut bytes = [0u8; ReadWriteErrorRecoveryPage::PAGE_LENGTH];
            bytes.copy_from_slice(&mask_bytes[..ReadWriteErrorRecoveryPage::PAGE_LENGTH]);
            self.error_recovery_mask = Some(PageMask { bytes });
        }

        Ok(())
    }

    fn read_raw_sector(&self, sector: Sector) -> Result<Vec<u8>, RipError> {
        let cmd = ReadCD {
            sector_type: SectorType::AllTypes,
            dap: false,
            starting_sector: sector,
            transfer_length: u24!(1),
            main_channel: MainChannelFlags::all(),
            c2_error_info: C2ErrorCode::ErrorBits,
            sub_channel: SubChannelSelection::RWSubChannel,
            control: Control::from(0),
        };
        run_sgio(&self.file, cmd, DxferDirection::FromDev).map_err(RipError::from)
    }

    /// Implements §4.4's layout auto-detection: try layout A (sector |
    /// C2 | subchannel), fall back to layout B, bounded to a handful of
    /// passes before giving up.
    fn detect_layout(&mut self) -> Result<ReadCdLayout, RipError> {
        for _pass in 0..MAX_AUTODETECT_PASSES {
            for candidate in [ReadCdLayout::SectorC2Subchannel, ReadCdLayout::SectorSubchannelC2] {
                if self.try_layout(candidate)? {
                    self.layout = Some(candidate);
                    return Ok(candidate);
                }
            }
        }

        Err(RipError::AutoDetect("ReadCD sector/C2/subchannel layout".into()))
    }

    fn try_layout(&self, layout: ReadCdLayout) -> Result<bool, RipError> {
        let mut deltas = Vec::with_capacity(AUTODETECT_SAMPLE_SECTORS as usize);

        for offset in 0..AUTODETECT_SAMPLE_SECTORS {
            let expected = AUTODETECT_START_SECTOR + offset;
            let sector = Sector::try_from(expected)?;

            let raw = self.read_raw_sector(sector)?;
            if raw.len() < RAW_SECTOR_BUFFER_LEN {
                return Ok(false);
            }

            let (_sector_data, subchannels, _c2) = layout.split(&raw);
            let mut block = [0u8; 96];
            block.copy_from_slice(subchannels);
            let channels = subchannel::deinterleave(&block);
            let q = channels[CHANNEL_Q];

            if !subchannel::q_crc_valid(&q) {
                continue;
            }

            let decoded = decode_q_absolute_sector(&q);
            if let Some(decoded) = decoded {
                deltas.push(expected - decoded);
            }
        }

        if deltas.len() < 9 {
            return Ok(false);
        }

        let first = deltas[0];
        Ok(deltas.iter().all(|&d| d == first) && first.unsigned_abs() as i32 <= AUTODETECT_MAX_DELTA)
    }

    /// Public contract: fails unless the drive is an optical device
    /// that supports accurate CD-DA streaming and C2 error reporting.
    pub fn read_drive_info(&mut self) -> Result<DriveInfo, RipError> {
        let inquiry_response = self
            .file
            .execute(Inquiry::new(false, 0, Control::from(0)))
            .map_err(scsi_error)?;

        if inquiry_response.peripheral_device_type != PeripheralDeviceType::CdOrDvdDevice {
            return Err(RipError::MediaState(
                "peripheral device type is not CD/DVD".into(),
            ));
        }

        self.negotiate_mode_pages()?;

        let caps_bytes = self.read_mode_page_current(PageCode::CapabilitiesAndMechanicalStatus)?;
        let caps = CapabilitiesAndMechanicalStatusPage::try_from(caps_bytes.as_slice())
            .map_err(|e| RipError::PageMask(e.to_string()))?;

        if !caps.audio.contains(crate::commands::mode_page::AudioCapabilities::CDDA_STREAM_IS_ACCURATE) {
            return Err(RipError::MediaState("drive does not report an accurate CD-DA stream".into()));
        }
        if !caps.audio.contains(crate::commands::mode_page::AudioCapabilities::C2_POINTERS_SUPPORTED) {
            return Err(RipError::MediaState("drive does not support C2 error pointers".into()));
        }

        let layout = self.detect_layout()?;

        let vendor = inquiry_response.t10_vendor_identification;
        let product = inquiry_response.product_identification;
        let read_offset_correction = lookup_read_offset_correction(&vendor, &product);

        Ok(DriveInfo {
            vendor,
            product,
            layout,
            buffer_size_kb: caps.buffer_size_kb,
            supports_accurate_stream: true,
            supports_c2_error_reporting: true,
            read_offset_correction,
        })
    }

    /// Calls TEST UNIT READY first; absence of media surfaces as a
    /// typed `RipError` rather than a malformed Full-TOC read.
    pub fn read_disc_info(&self) -> Result<DiscInfo, RipError> {
        self.file
            .execute(TestUnitReady::new(Control::from(0)))
            .map_err(scsi_error)?;

        let full_toc = self
            .file
            .execute(FullTOC::new(1, u16::MAX, 0))
            .map_err(scsi_error)?;

        build_disc_info(&full_toc, |sector| self.read_sector_user_data(sector))
    }

    fn read_sector_user_data(&self, sector: Sector) -> Result<Vec<u8>, RipError> {
        let raw = self.read_raw_sector(sector)?;
        let layout = self.layout.ok_or_else(|| {
            RipError::AutoDetect("ReadCD sector/C2/subchannel layout not yet detected".into())
        })?;
        let (sector_data, _subchannels, _c2) = layout.split(&raw);
        Ok(sector_data.to_vec())
    }

    /// Issues one single-sector read and splits the result into its
    /// three sub-buffers according to the detected layout.
    pub fn read_absolute_sector(&self, sector: Sector) -> Result<RawSector, RipError> {
        let layout = self.layout.ok_or_else(|| {
            RipError::AutoDetect("ReadCD sector/C2/subchannel layout not yet detected".into())
        })?;

        let raw = self.read_raw_sector(sector)?;
        if raw.len() < RAW_SECTOR_BUFFER_LEN {
            return Err(RipError::Missing(format!(
                "ReadCD returned {} bytes, expected at least {RAW_SECTOR_BUFFER_LEN}",
                raw.len()
            )));
        }

        let (sector_data, subchannels, c2) = layout.split(&raw);
        Ok(RawSector {
            sector_data: sector_data.to_vec(),
            subchannels_data: subchannels.to_vec(),
            c2_data: c2.to_vec(),
        })
    }

    /// Modifies the Read-Write Error Recovery page's `read_retry_count`
    /// and writes it back, logging (via the returned `Ok(false)`) when
    /// the changeable-bits mask forbids the write rather than sending
    /// it to the device.
    pub fn set_read_retry_count(&self, n: u8) -> Result<bool, RipError> {
        const READ_RETRY_COUNT_OFFSET: usize = 3;

        if let Some(mask) = &self.error_recovery_mask {
            if !mask.allows(READ_RETRY_COUNT_OFFSET) {
                return Ok(false);
            }
        }

        let current_bytes = self.read_mode_page_current(PageCode::ReadWriteErrorRecovery)?;
        let mut page = ReadWriteErrorRecoveryPage::try_from(current_bytes.as_slice())
            .map_err(|e| RipError::PageMask(e.to_string()))?;
        page.read_retry_count = n;

        let bytes = page.to_bytes();
        self.file
            .execute(ModeSelect10::new(&bytes, Control::from(0)))
            .map_err(scsi_error)?;

        Ok(true)
    }
}

/// Decodes the BCD absolute address out of a deinterleaved Q channel
/// carrying an adr=1 (current position) frame.
fn decode_q_absolute_sector(q: &subchannel::Channel) -> Option<i32> {
    use crate::util::bcd_decode;

    let adr = (q[0] & 0xF0) >> 4;
    if adr != 1 {
        return None;
    }

    let m = bcd_decode(q[7]).ok()?;
    let s = bcd_decode(q[8]).ok()?;
    let f = bcd_decode(q[9]).ok()?;
    let addr = crate::addressing::SectorAddress::new(m, s, f).ok()?;
    crate::addressing::Sector::try_from(addr).ok().map(Sector::get)
}

fn scsi_error<Cmd, const N: usize>(err: crate::commands::ExecuteError<Cmd, N>) -> RipError
where
    Cmd: Command<N>,
{
    match err {
        #[cfg(target_os = "linux")]
        crate::commands::ExecuteError::SCSIError(e) => RipError::from(e),
        crate::commands::ExecuteError::ParseError(_) => {
            RipError::Missing("command response failed to parse".into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::bcd_encode;

    fn sample_raw_buffer() -> Vec<u8> {
        let mut raw = vec![0u8; RAW_SECTOR_BUFFER_LEN];
        raw[..SECTOR_DATA_LEN].fill(1);
        raw[SECTOR_DATA_LEN..SECTOR_DATA_LEN + C2_DATA_LEN].fill(2);
        raw[SECTOR_DATA_LEN + C2_DATA_LEN..].fill(3);
        raw
    }

    #[test]
    fn layout_a_splits_sector_then_c2_then_subchannel() {
        let raw = sample_raw_buffer();
        let (sector, subchannels, c2) = ReadCdLayout::SectorC2Subchannel.split(&raw);
        assert_eq!(sector, &vec![1u8; SECTOR_DATA_LEN][..]);
        assert_eq!(c2, &vec![2u8; C2_DATA_LEN][..]);
        assert_eq!(subchannels, &vec![3u8; SUBCHANNELS_DATA_LEN][..]);
    }

    #[test]
    fn layout_b_splits_sector_then_subchannel_then_c2() {
        let mut raw = vec![0u8; RAW_SECTOR_BUFFER_LEN];
        raw[..SECTOR_DATA_LEN].fill(1);
        raw[SECTOR_DATA_LEN..SECTOR_DATA_LEN + SUBCHANNELS_DATA_LEN].fill(4);
        raw[SECTOR_DATA_LEN + SUBCHANNELS_DATA_LEN..].fill(5);

        let (sector, subchannels, c2) = ReadCdLayout::SectorSubchannelC2.split(&raw);
        assert_eq!(sector, &vec![1u8; SECTOR_DATA_LEN][..]);
        assert_eq!(subchannels, &vec![4u8; SUBCHANNELS_DATA_LEN][..]);
        assert_eq!(c2, &vec![5u8; C2_DATA_LEN][..]);
    }

    #[test]
    fn page_mask_allows_only_nonzero_offsets() {
        let mut bytes = [0u8; ReadWriteErrorRecoveryPage::PAGE_LENGTH];
        bytes[3] = 0xFF;
        let mask = PageMask { bytes };

        assert!(mask.allows(3));
        assert!(!mask.allows(2));
    }

    #[test]
    fn page_mask_rejects_offset_past_the_page() {
        let mask = PageMask { bytes: [0u8; ReadWriteErrorRecoveryPage::PAGE_LENGTH] };
        assert!(!mask.allows(ReadWriteErrorRecoveryPage::PAGE_LENGTH + 1));
    }

    #[test]
    fn decodes_current_position_q_channel_into_an_absolute_sector() {
        let mut q: subchannel::Channel = [0u8; 12];
        q[0] = 0x10; // adr=1 (current position), control nibble unused here
        q[7] = bcd_encode(0).unwrap();
        q[8] = bcd_encode(2).unwrap();
        q[9] = bcd_encode(0).unwrap();

        assert_eq!(decode_q_absolute_sector(&q), Some(0));
    }

    #[test]
    fn ignores_q_channels_that_are_not_current_position() {
        let mut q: subchannel::Channel = [0u8; 12];
        q[0] = 0x20; // adr=2 (media catalog number)
        assert_eq!(decode_q_absolute_sector(&q), None);
    }
}
