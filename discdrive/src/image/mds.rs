//! MDS/MDF serializer, §4.8.2.
//!
//! The MDS layout's `unknown_*` fields are reproduced as the fixed
//! constants the spec calls out; their real-world meaning is opaque
//! and not relied on here beyond round-tripping the same bytes back
//! out.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::commands::toc::{Adr, Control};
use crate::disc::{PointInfo, TrackType};
use crate::error::RipError;

use super::DiscData;

const FILE_HEADER_LEN: usize = 24;
const SESSION_TABLE_HEADER_LEN: usize = 20;
const SESSION_TABLE_ENTRY_LEN: usize = 36;
const TRACK_TABLE_HEADER_LEN: usize = 24;
const TRACK_TABLE_ENTRY_LEN: usize = 8;
const FILE_TABLE_ENTRY: &[u8] = b"*.mdf\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum TrackMode {
    None = 0x0,
    Audio = 0x9,
    Mode1 = 0xA,
    Mode2 = 0xB,
    Mode2Form1 = 0xC,
    Mode2Form2 = 0xD,
}

fn track_mode_and_flags(track_type: TrackType) -> (TrackMode, u8) {
    match track_type {
        TrackType::Audio2Channels | TrackType::Audio4Channels => (TrackMode::Audio, 0xA),
        TrackType::DataMode0 => (TrackMode::None, 0xA),
        TrackType::DataMode1 => (TrackMode::Mode1, 0xA),
        TrackType::DataMode2 => (TrackMode::Mode2, 0xA),
        TrackType::DataMode2Form1 => (TrackMode::Mode2Form1, 0xE),
        TrackType::DataMode2Form2 => (TrackMode::Mode2Form2, 0xE),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum SubchannelMode {
    None = 0,
    Interleaved96 = 1,
}

fn raw_full_toc_entry(point: &PointInfo) -> [u8; 11] {
    let mut bytes = [0u8; 11];
    bytes[0] = point.session_number;
    bytes[1] = (u8::from(point.adr) << 4) | point.control.bits();
    bytes[2] = 0; // TNO, always zero on redbook media
    bytes[3] = point.point;
    bytes[4] = point.address.m;
    bytes[5] = point.address.s;
    bytes[6] = point.address.f;
    bytes[7] = 0;
    bytes[8] = point.paddress.m;
    bytes[9] = point.paddress.s;
    bytes[10] = point.paddress.f;
    bytes
}

fn write_session_table_entry(
    out: &mut Vec<u8>,
    point: &PointInfo,
    track_mode: TrackMode,
    track_mode_flags: u8,
    subchannel_mode: SubchannelMode,
    sector_length: u16,
    first_sector_on_disc: u32,
    mdf_byte_offset: u64,
    track_table_entry_offset: u32,
    file_table_header_offset: u32,
) {
    out.push(track_mode as u8);
    out.push(track_mode_flags);
    out.extend_from_slice(&raw_full_toc_entry(point));
    out.push(subchannel_mode as u8);
    out.extend_from_slice(&sector_length.to_le_bytes());
    out.extend_from_slice(&first_sector_on_disc.to_le_bytes());
    out.extend_from_slice(&mdf_byte_offset.to_le_bytes());
    out.extend_from_slice(&track_table_entry_offset.to_le_bytes());
    out.extend_from_slice(&file_table_header_offset.to_le_bytes());
}

/// Writes the `.mds` manifest and `.mdf` sector data into `out_dir`.
/// `save_audio_subchannels`/`save_data_subchannels` select, per track
/// category, whether that track's 96-byte subchannel blocks are
/// interleaved into the MDF alongside its sectors.
pub fn write(
    disc: &DiscData,
    save_audio_subchannels: bool,
    save_data_subchannels: bool,
    stem: &str,
    out_dir: &Path,
) -> Result<(), RipError> {
    let mut mdf = Vec::new();
    let mut mdf_byte_offset: u64 = 0;

    // Track-table entries are emitted once, after every session; their
    // absolute offset needs to be known up front so session entries
    // for track points can reference it.
    let total_tracks: usize = disc.disc.sessions.iter().map(|s| s.tracks.len()).sum();

    let session_header_area_offset = FILE_HEADER_LEN;
    let mut session_headers_and_entries_len = 0usize;
    for session in &disc.disc.sessions {
        session_headers_and_entries_len += SESSION_TABLE_HEADER_LEN + session.points.len() * SESSION_TABLE_ENTRY_LEN;
    }

    let track_table_header_offset = session_header_area_offset + session_headers_and_entries_len;
    let track_table_entries_offset = track_table_header_offset + TRACK_TABLE_HEADER_LEN;
    let file_table_header_offset = track_table_entries_offset + total_tracks * TRACK_TABLE_ENTRY_LEN;
    let file_table_entry_offset = file_table_header_offset + 4;

    let mut mds = Vec::new();
    // FileHeader, rewritten below once the footer offset is known.
    mds.extend_from_slice(&[0u8; FILE_HEADER_LEN]);

    let mut entry_table_offset = session_header_area_offset;
    let mut track_entry_index: u32 = 0;

    for session in &disc.disc.sessions {
        let non_track_point_count = session.points.len() - session.tracks.len();

        mds.extend_from_slice(&(-150i32).to_le_bytes());
        mds.extend_from_slice(&(session.length_sectors as i32).to_le_bytes());
        mds.extend_from_slice(&(session.number as u16).to_le_bytes());
        mds.extend_from_slice(&(session.points.len() as u16).to_le_bytes());
        mds.extend_from_slice(&(non_track_point_count as u16).to_le_bytes());
        mds.push(session.tracks.first().map(|t| t.number).unwrap_or(0));
        mds.push(session.tracks.last().map(|t| t.number).unwrap_or(0));
        mds.extend_from_slice(&((entry_table_offset + SESSION_TABLE_HEADER_LEN) as u32).to_le_bytes());

        entry_table_offset += SESSION_TABLE_HEADER_LEN + session.points.len() * SESSION_TABLE_ENTRY_LEN;

        for point in &session.points {
            let is_track_point = (0x01..=0x63).contains(&point.point);

            if !is_track_point {
                write_session_table_entry(
                    &mut mds,
                    point,
                    TrackMode::None,
                    0,
                    SubchannelMode::None,
                    0,
                    0,
                    0,
                    0,
                    0,
                );
                continue;
            }

            let track = session
                .tracks
                .iter()
                .find(|t| t.number == point.point)
                .ok_or_else(|| RipError::Missing(format!("no track for point {}", point.point)))?;

            let (track_mode, track_mode_flags) = track_mode_and_flags(track.track_type);
            let is_audio = matches!(track.track_type, TrackType::Audio2Channels | TrackType::Audio4Channels);
            let save_subchannels = if is_audio { save_audio_subchannels } else { save_data_subchannels };
            let subchannel_mode = if save_subchannels { SubchannelMode::Interleaved96 } else { SubchannelMode::None };
            let sector_length: u16 = if save_subchannels { 2448 } else { 2352 };

            let data = disc
                .tracks
                .get(&track.number)
                .ok_or_else(|| RipError::Missing(format!("no captured sectors for track {}", track.number)))?;

            let first_mdf_byte_offset = mdf_byte_offset;
            for (idx, sector) in data.sector_data.iter().enumerate() {
                mdf.extend_from_slice(sector);
                mdf_byte_offset += sector.len() as u64;

                if save_subchannels {
                    let subchannel = data
                        .subchannels_data
                        .as_ref()
                        .and_then(|s| s.get(idx))
                        .ok_or_else(|| RipError::Missing(format!("no subchannel data for track {} sector {idx}", track.number)))?;
                    mdf.extend_from_slice(subchannel);
                    mdf_byte_offset += subchannel.len() as u64;
                }
            }

            let track_table_entry_offset = (track_table_entries_offset + track_entry_index as usize * TRACK_TABLE_ENTRY_LEN) as u32;

            write_session_table_entry(
                &mut mds,
                point,
                track_mode,
                track_mode_flags,
                subchannel_mode,
                sector_length,
                track.first_sector_absolute.get() as u32,
                first_mdf_byte_offset,
                track_table_entry_offset,
                file_table_header_offset as u32,
            );

            track_entry_index += 1;
        }
    }

    mds.extend_from_slice(&[0u8; TRACK_TABLE_HEADER_LEN]);

    let mut first_track_written = false;
    for session in &disc.disc.sessions {
        for track in &session.tracks {
            let pregap_sectors: u32 = if !first_track_written { 150 } else { 0 };
            first_track_written = true;
            mds.extend_from_slice(&pregap_sectors.to_le_bytes());
            mds.extend_from_slice(&(track.length_sectors as u32).to_le_bytes());
        }
    }

    mds.extend_from_slice(&(file_table_entry_offset as u32).to_le_bytes());
    mds.extend_from_slice(FILE_TABLE_ENTRY);

    // Bad-sector identification belongs to the extraction engine; a
    // `DiscData` carries no bad-sector list, so this serializer never
    // has one to report and the footer offset stays zero.
    let footer_offset: u32 = 0;

    mds[16..20].copy_from_slice(&(FILE_HEADER_LEN as u32).to_le_bytes());
    mds[20..24].copy_from_slice(&footer_offset.to_le_bytes());
    mds[0] = 0; // medium_type
    mds[1] = disc.disc.sessions.len() as u8;
    mds[2..4].copy_from_slice(&2u16.to_le_bytes()); // unknown_a

    File::create(out_dir.join(format!("{stem}.mds"))).map_err(RipError::IO)?.write_all(&mds).map_err(RipError::IO)?;
    File::create(out_dir.join(format!("{stem}.mdf"))).map_err(RipError::IO)?.write_all(&mdf).map_err(RipError::IO)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_mode_mapping_matches_table() {
        assert_eq!(track_mode_and_flags(TrackType::Audio2Channels), (TrackMode::Audio, 0xA));
        assert_eq!(track_mode_and_flags(TrackType::DataMode0), (TrackMode::None, 0xA));
        assert_eq!(track_mode_and_flags(TrackType::DataMode1), (TrackMode::Mode1, 0xA));
        assert_eq!(track_mode_and_flags(TrackType::DataMode2), (TrackMode::Mode2, 0xA));
        assert_eq!(track_mode_and_flags(TrackType::DataMode2Form1), (TrackMode::Mode2Form1, 0xE));
        assert_eq!(track_mode_and_flags(TrackType::DataMode2Form2), (TrackMode::Mode2Form2, 0xE));
    }

    #[test]
    fn raw_full_toc_entry_round_trips_fields() {
        let point = PointInfo {
            session_number: 1,
            adr: Adr::Mode1Q,
            control: Control::empty(),
            point: 1,
            address: crate::addressing::SectorAddress::new(0, 2, 0).unwrap(),
            paddress: crate::addressing::SectorAddress::new(0, 2, 0).unwrap(),
        };
        let bytes = raw_full_toc_entry(&point);
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[3], 1);
        assert_eq!(bytes[4..7], [0, 2, 0]);
        assert_eq!(bytes[8..11], [0, 2, 0]);
    }
}
