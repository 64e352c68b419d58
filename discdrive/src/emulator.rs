//! Emulated drive (component J, §4.9): answers the command surface
//! [`Transport`] and [`Drive`](crate::drive::Drive) expose, but against
//! a previously written ODI image instead of a physical SCSI device.
//! Lets the extraction engine and the CLI's dispatch logic run
//! unmodified in tests or demos with no hardware attached.
//!
//! [`Drive::read_raw_sector`](crate::drive::Drive) talks to
//! `SG_IO` directly rather than going through [`Transport::execute`]
//! (it needs the untouched byte buffer before `ReadCD`'s layout is
//! split apart), so an emulated drive can't intercept that path by
//! implementing `Transport` alone. [`Emulator::read_raw_sector`] is the
//! parallel entry point extraction code should call instead; see
//! DESIGN.md.

use std::path::Path;

use crate::addressing::Sector;
use crate::commands::inquiry::Inquiry;
use crate::commands::mode_page::{ModeSense10, PageCode, ReadWriteErrorRecoveryPage};
use crate::commands::test_unit_ready::TestUnitReady;
use crate::commands::toc::{Format, FullTOC};
use crate::commands::{Command, ExecuteError};
use crate::disc::PointInfo;
use crate::error::RipError;
use crate::extract::RawRead;
use crate::image::odi::OdiImage;
use crate::transport::Transport;

const MODE_SENSE_HEADER_LEN: usize = 8;
const TOC_HEADER_LEN: usize = 4;

/// An ODI image opened in place of a real device handle.
pub struct Emulator {
    image: OdiImage,
}

impl Emulator {
    pub fn open(path: &Path) -> Result<Self, RipError> {
        Ok(Self { image: OdiImage::open(path)? })
    }

    /// Reads one absolute sector straight out of the ODI image,
    /// bypassing `SG_IO` entirely; the counterpart to
    /// [`crate::drive::Drive::read_raw_sector`] used by the extraction
    /// engine when ripping from an emulated drive.
    pub fn read_raw_sector(&self, sector: Sector) -> Result<RawRead, RipError> {
        let read = self.image.read_sector(sector)?;
        if !read.readable {
            return Err(RipError::Transport(std::io::Error::other(format!(
                "sector {} marked unreadable in ODI image",
                sector.get()
            ))));
        }

        Ok(RawRead {
            sector_data: read.sector_data,
            subchannels_data: read.subchannels_data.unwrap_or_default(),
            c2_data: Vec::new(),
        })
    }

    fn inquiry_response() -> Vec<u8> {
        let mut bytes = vec![0u8; 36];
        bytes[0] = 0x05; // peripheral_device_type: CD/DVD device
        bytes[1] = 0x80; // removable_media
        bytes[2] = 0x05; // version: SPC3
        bytes[8..16].copy_from_slice(b"OVERDRV ");
        bytes[16..32].copy_from_slice(b"EMULATED IMAGE  ");
        bytes[32..36].copy_from_slice(b"1.0 ");
        bytes
    }

    fn mode_page_bytes(page_code: PageCode) -> Vec<u8> {
        match page_code {
            PageCode::ReadWriteErrorRecovery => ReadWriteErrorRecoveryPage {
                flags: crate::commands::mode_page::ErrorRecoveryFlags::empty(),
                read_retry_count: 0,
                write_retry_count: 0,
                recovery_time_limit_ms: 0,
            }
            .to_bytes()
            .to_vec(),
            PageCode::Caching => vec![PageCode::Caching as u8, 0x02, 0x00],
            PageCode::CapabilitiesAndMechanicalStatus => {
                let mut page = vec![0u8; 14];
                page[0] = PageCode::CapabilitiesAndMechanicalStatus as u8;
                page[1] = 12;
                page[5] = 0b0001_1111; // every AudioCapabilities bit this crate checks
                page[12..14].copy_from_slice(&1024u16.to_be_bytes());
                page
            }
            PageCode::AllPages => {
                let mut all = Self::mode_page_bytes(PageCode::ReadWriteErrorRecovery);
                all.extend(Self::mode_page_bytes(PageCode::Caching));
                all.extend(Self::mode_page_bytes(PageCode::CapabilitiesAndMechanicalStatus));
                all
            }
        }
    }

    fn mode_sense_response(cdb: &[u8]) -> Vec<u8> {
        let page_code_bits = cdb[2] & 0x3F;
        let page_code = match page_code_bits {
            0x01 => PageCode::ReadWriteErrorRecovery,
            0x08 => PageCode::Caching,
            0x2A => PageCode::CapabilitiesAndMechanicalStatus,
            _ => PageCode::AllPages,
        };

        let page_bytes = Self::mode_page_bytes(page_code);
        let mut response = vec![0u8; MODE_SENSE_HEADER_LEN];
        let mode_data_length = (MODE_SENSE_HEADER_LEN - 2 + page_bytes.len()) as u16;
        response[0..2].copy_from_slice(&mode_data_length.to_be_bytes());
        response.extend(page_bytes);
        response
    }

    fn raw_full_toc_entry(point: &PointInfo) -> [u8; 11] {
        let mut bytes = [0u8; 11];
        bytes[0] = point.session_number;
        bytes[1] = (u8::from(point.adr) << 4) | point.control.bits();
        bytes[3] = point.point;
        bytes[4] = point.address.m;
        bytes[5] = point.address.s;
        bytes[6] = point.address.f;
        bytes[8] = point.paddress.m;
        bytes[9] = point.paddress.s;
        bytes[10] = point.paddress.f;
        bytes
    }

    fn full_toc_response(&self) -> Vec<u8> {
        let points = self.image.points();
        let first_session = points.iter().map(|p| p.session_number).min().unwrap_or(1);
        let last_session = points.iter().map(|p| p.session_number).max().unwrap_or(1);

        let mut out = vec![0u8; TOC_HEADER_LEN];
        let length = (2 + points.len() * 11) as u16;
        out[0..2].copy_from_slice(&length.to_be_bytes());
        out[2] = first_session;
        out[3] = last_session;
        for point in points {
            out.extend_from_slice(&Self::raw_full_toc_entry(point));
        }
        out
    }

    fn formatted_toc_response(&self, msf_flag: bool) -> Vec<u8> {
        let points = self.image.points();
        let track_points: Vec<&PointInfo> = points
            .iter()
            .filter(|p| (0x01..=0x63).contains(&p.point))
            .collect();
        let lead_out = points.iter().find(|p| p.point == crate::commands::toc::POINT_LEAD_OUT);

        let first_track = track_points.iter().map(|p| p.point).min().unwrap_or(1);
        let last_track = track_points.iter().map(|p| p.point).max().unwrap_or(1);

        let descriptor_count = track_points.len() + usize::from(lead_out.is_some());
        let mut out = vec![0u8; TOC_HEADER_LEN];
        let length = (2 + descriptor_count * 8) as u16;
        out[0..2].copy_from_slice(&length.to_be_bytes());
        out[2] = first_track;
        out[3] = last_track;

        for point in &track_points {
            out.extend(Self::track_descriptor(point.adr, point.control, point.point, point.paddress, msf_flag));
        }
        if let Some(point) = lead_out {
            out.extend(Self::track_descriptor(point.adr, point.control, 0xAA, point.paddress, msf_flag));
        }

        out
    }

    fn track_descriptor(
        adr: crate::commands::toc::Adr,
        control: crate::commands::toc::Control,
        track_num: u8,
        paddress: crate::addressing::SectorAddress,
        msf_flag: bool,
    ) -> [u8; 8] {
        let mut descriptor = [0u8; 8];
        descriptor[1] = (u8::from(adr) << 4) | control.bits();
        descriptor[2] = track_num;
        if msf_flag {
            descriptor[5] = paddress.m;
            descriptor[6] = paddress.s;
            descriptor[7] = paddress.f;
        } else {
            let sector = crate::addressing::get_sector_from_address(paddress).unwrap_or(Sector::ZERO);
            descriptor[4..8].copy_from_slice(&sector.get().to_be_bytes());
        }
        descriptor
    }

    fn dispatch(&self, op_code: u8, cdb: &[u8]) -> Vec<u8> {
        match op_code {
            TestUnitReady::OP_CODE => Vec::new(),
            Inquiry::OP_CODE => Self::inquiry_response(),
            ModeSense10::OP_CODE => Self::mode_sense_response(cdb),
            FullTOC::OP_CODE => {
                let format_nibble = cdb[2] & 0x0F;
                let msf_flag = cdb[1] & 0b10 != 0;
                if format_nibble == u8::from(Format::RawTOC) {
                    self.full_toc_response()
                } else {
                    self.formatted_toc_response(msf_flag)
                }
            }
            _ => Vec::new(),
        }
    }
}

impl Transport for Emulator {
    fn execute<Cmd: Command<N>, const N: usize>(
        &self,
        cmd: Cmd,
    ) -> Result<Cmd::Response, ExecuteError<Cmd, N>> {
        let cdb = cmd.as_cdb();
        let bytes = self.dispatch(Cmd::OP_CODE, &cdb[..]);
        <Cmd::Response as TryFrom<Vec<u8>>>::try_from(bytes).map_err(ExecuteError::ParseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::toc::{Adr, Control};
    use crate::disc::{DiscInfo, SessionInfo, SessionType, TrackInfo, TrackType};
    use crate::image::{DiscData, TrackData};
    use std::collections::BTreeMap;

    fn sample_odi(dir: &Path) -> Emulator {
        let track = TrackInfo {
            number: 1,
            track_type: TrackType::Audio2Channels,
            first_sector_absolute: Sector::ZERO,
            last_sector_absolute: Sector::try_from(2).unwrap(),
            length_sectors: 2,
        };
        let point_track = PointInfo {
            session_number: 1,
            adr: Adr::Mode1Q,
            control: Control::empty(),
            point: 1,
            address: crate::addressing::SectorAddress::new(0, 2, 0).unwrap(),
            paddress: crate::addressing::SectorAddress::new(0, 2, 0).unwrap(),
        };
        let point_lead_out = PointInfo {
            session_number: 1,
            adr: Adr::Mode1Q,
            control: Control::empty(),
            point: crate::commands::toc::POINT_LEAD_OUT,
            address: crate::addressing::SectorAddress::new(0, 2, 0).unwrap(),
            paddress: crate::addressing::SectorAddress::new(0, 2, 2).unwrap(),
        };

        let mut tracks = BTreeMap::new();
        tracks.insert(
            1,
            TrackData {
                sector_data: vec![vec![7u8; 2352], vec![9u8; 2352]],
                subchannels_data: None,
            },
        );

        let disc = DiscData {
            disc: DiscInfo {
                sessions: vec![SessionInfo {
                    number: 1,
                    session_type: SessionType::CddaOrCdrom,
                    tracks: vec![track],
                    points: vec![point_track, point_lead_out],
                    lead_in_length_sectors: 4500,
                    pregap_sectors: 150,
                    length_sectors: 2,
                    lead_out_length_sectors: 6750,
                }],
                length_sectors: 2,
            },
            tracks,
        };

        crate::image::odi::write(&disc, "emu", dir).unwrap();
        Emulator::open(&dir.join("emu.odi")).unwrap()
    }

    #[test]
    fn reads_back_sector_bytes_written_to_the_image() {
        let dir = tempfile::tempdir().unwrap();
        let emulator = sample_odi(dir.path());

        let read = emulator.read_raw_sector(Sector::ZERO).unwrap();
        assert_eq!(read.sector_data, vec![7u8; 2352]);
        let read = emulator.read_raw_sector(Sector::try_from(1).unwrap()).unwrap();
        assert_eq!(read.sector_data, vec![9u8; 2352]);
    }

    #[test]
    fn full_toc_response_carries_every_point() {
        let dir = tempfile::tempdir().unwrap();
        let emulator = sample_odi(dir.path());

        let bytes = emulator.full_toc_response();
        assert_eq!(bytes[2], 1); // first_session
        assert_eq!(bytes[3], 1); // last_session
        assert_eq!((bytes.len() - TOC_HEADER_LEN) / 11, 2);
    }

    #[test]
    fn inquiry_response_is_long_enough_to_parse() {
        assert_eq!(Emulator::inquiry_response().len(), 36);
    }
}
