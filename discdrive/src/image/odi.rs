//! ODI container: the bespoke format that stores every captured sector
//! individually, each with its own compression method, alongside the
//! Full-TOC points needed to rebuild a [`DiscInfo`]. §4.8.4.
//!
//! [`write`] is the serializer; [`OdiImage::open`] is its inverse, used
//! by [`crate::emulator`] to answer drive commands from a previously
//! written image instead of a real device.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::addressing::Sector;
use crate::commands::toc::Adr;
use crate::disc::{PointInfo, TrackType};
use crate::error::RipError;

use super::compress::{self, CompressionMethod};
use super::DiscData;

const FILE_HEADER_IDENTIFIER: &[u8; 16] = b"OVERDRIVE IMAGE";
const FILE_HEADER_VERSION: (u8, u8, u8) = (1, 0, 0);
const FILE_HEADER_LEN: u64 = 16 + 3 + 4 + 4 + 4;
const SECTOR_TABLE_ENTRY_LEN: usize = 8 + 4 + 4 + 4 + 4 + 1 + 1 + 1;
const POINT_TABLE_ENTRY_LEN: usize = 9;
const ALIGNMENT: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Readability {
    Readable = 0,
    Unreadable = 1,
}

impl TryFrom<u8> for Readability {
    type Error = RipError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Readability::Readable),
            1 => Ok(Readability::Unreadable),
            other => Err(RipError::Missing(format!("unknown ODI readability tag {other}"))),
        }
    }
}

/// Chooses which of the two §4.8.4 compressors to try for a sector
/// payload: delta coding for 2-channel audio, run-length otherwise.
/// [`compress::compress`] itself falls back callers must still handle:
/// if even the chosen method fails to shrink the buffer, it is stored
/// with [`CompressionMethod::None`].
fn choose_method(track_type: TrackType) -> CompressionMethod {
    match track_type {
        TrackType::Audio2Channels => CompressionMethod::LosslessStereoAudio,
        _ => CompressionMethod::RunLengthEncoding,
    }
}

fn compress_or_store(method: CompressionMethod, data: &[u8]) -> (CompressionMethod, Vec<u8>) {
    match compress::compress(method, data) {
        Ok(compressed) => (method, compressed),
        Err(_) => (CompressionMethod::None, data.to_vec()),
    }
}

fn pad_to_alignment(out: &mut Vec<u8>) {
    let remainder = out.len() as u64 % ALIGNMENT;
    if remainder != 0 {
        out.extend(std::iter::repeat_n(0u8, (ALIGNMENT - remainder) as usize));
    }
}

struct SectorTableEntry {
    first_sector: i32,
    sector_data_len: u32,
    compressed_data_offset: u64,
    sector_data_compressed_len: u32,
    subchannels_compressed_len: u32,
    sector_data_method: CompressionMethod,
    subchannels_method: CompressionMethod,
    readability: Readability,
}

fn write_sector_table_entry(out: &mut Vec<u8>, entry: &SectorTableEntry) {
    out.extend_from_slice(&entry.compressed_data_offset.to_le_bytes());
    out.extend_from_slice(&entry.first_sector.to_le_bytes());
    out.extend_from_slice(&entry.sector_data_len.to_le_bytes());
    out.extend_from_slice(&entry.sector_data_compressed_len.to_le_bytes());
    out.extend_from_slice(&entry.subchannels_compressed_len.to_le_bytes());
    out.push(entry.sector_data_method as u8);
    out.push(entry.subchannels_method as u8);
    out.push(entry.readability as u8);
}

fn write_point_table_entry(out: &mut Vec<u8>, point: &PointInfo) {
    out.push(point.session_number);
    out.push((u8::from(point.adr) << 4) | point.control.bits());
    out.push(point.point);
    out.push(point.address.m);
    out.push(point.address.s);
    out.push(point.address.f);
    out.push(point.paddress.m);
    out.push(point.paddress.s);
    out.push(point.paddress.f);
}

/// Writes `{stem}.odi`: one file holding every track's sector and
/// subchannel payloads, compressed per-sector, plus the point table
/// needed to reconstruct the disc's topology on read-back.
///
/// Sectors are streamed in disc order per session: lead-in, pregap,
/// tracks, lead-out. Only captured sectors (those present in
/// `disc.tracks`) are written; a session's lead-in/lead-out carry no
/// payload and contribute no sector-table entries.
pub fn write(disc: &DiscData, stem: &str, out_dir: &Path) -> Result<(), RipError> {
    let mut body = Vec::new();
    let mut sector_entries = Vec::new();

    for session in &disc.disc.sessions {
        for track in &session.tracks {
            let Some(data) = disc.tracks.get(&track.number) else {
                continue;
            };
            let method = choose_method(track.track_type);

            for (idx, sector) in data.sector_data.iter().enumerate() {
                let (sector_method, sector_compressed) = compress_or_store(method, sector);

                let (subchannels_method, subchannels_compressed) = match data
                    .subchannels_data
                    .as_ref()
                    .and_then(|s| s.get(idx))
                {
                    Some(subchannel) => compress_or_store(CompressionMethod::RunLengthEncoding, subchannel),
                    None => (CompressionMethod::None, Vec::new()),
                };

                let offset = body.len() as u64;
                body.extend_from_slice(&sector_compressed);
                body.extend_from_slice(&subchannels_compressed);

                sector_entries.push(SectorTableEntry {
                    first_sector: track.first_sector_absolute.get() + idx as i32,
                    sector_data_len: sector.len() as u32,
                    compressed_data_offset: offset,
                    sector_data_compressed_len: sector_compressed.len() as u32,
                    subchannels_compressed_len: subchannels_compressed.len() as u32,
                    sector_data_method: sector_method,
                    subchannels_method,
                    readability: Readability::Readable,
                });
            }
        }
    }

    let mut file_body = Vec::new();
    file_body.extend_from_slice(&body);
    pad_to_alignment(&mut file_body);

    let sector_table_offset = FILE_HEADER_LEN + file_body.len() as u64;
    let mut sector_table = Vec::with_capacity(sector_entries.len() * SECTOR_TABLE_ENTRY_LEN);
    for entry in &sector_entries {
        write_sector_table_entry(&mut sector_table, entry);
    }
    file_body.extend_from_slice(&sector_table);
    pad_to_alignment(&mut file_body);

    let point_table_offset = FILE_HEADER_LEN + file_body.len() as u64;
    let mut point_table = Vec::new();
    for session in &disc.disc.sessions {
        for point in &session.points {
            write_point_table_entry(&mut point_table, point);
        }
    }
    file_body.extend_from_slice(&point_table);

    let path = out_dir.join(format!("{stem}.odi"));
    let mut file = File::create(&path).map_err(RipError::IO)?;

    file.write_all(FILE_HEADER_IDENTIFIER).map_err(RipError::IO)?;
    file.write_all(&[FILE_HEADER_VERSION.0, FILE_HEADER_VERSION.1, FILE_HEADER_VERSION.2])
        .map_err(RipError::IO)?;
    file.write_all(&(sector_entries.len() as u32).to_le_bytes()).map_err(RipError::IO)?;
    file.write_all(&(sector_table_offset as u32).to_le_bytes()).map_err(RipError::IO)?;
    file.write_all(&(point_table_offset as u32).to_le_bytes()).map_err(RipError::IO)?;
    file.write_all(&file_body).map_err(RipError::IO)?;

    // Every table offset is known before the first byte is emitted, so
    // the header is written once, up front, with no rewrite pass.
    file.flush().map_err(RipError::IO)?;

    Ok(())
}

struct ParsedSectorEntry {
    first_sector: i32,
    sector_data_len: u32,
    compressed_data_offset: usize,
    sector_data_compressed_len: u32,
    subchannels_compressed_len: u32,
    sector_data_method: CompressionMethod,
    subchannels_method: CompressionMethod,
    readability: Readability,
}

/// A previously written `.odi` file, loaded for read-back.
pub struct OdiImage {
    body: Vec<u8>,
    sectors: Vec<ParsedSectorEntry>,
    points: Vec<PointInfo>,
}

/// What [`OdiImage::read_sector`] returns: a decompressed sector plus
/// its optional subchannel block, or a flag marking it unreadable.
pub struct ReadSector {
    pub sector_data: Vec<u8>,
    pub subchannels_data: Option<Vec<u8>>,
    pub readable: bool,
}

impl OdiImage {
    pub fn open(path: &Path) -> Result<Self, RipError> {
        let mut bytes = Vec::new();
        File::open(path).map_err(RipError::IO)?.read_to_end(&mut bytes).map_err(RipError::IO)?;

        if bytes.len() < FILE_HEADER_LEN as usize || &bytes[0..16] != FILE_HEADER_IDENTIFIER {
            return Err(RipError::Missing("not an ODI file: bad header identifier".into()));
        }

        let sector_count = u32::from_le_bytes(bytes[19..23].try_into().unwrap()) as usize;
        let sector_table_offset = u32::from_le_bytes(bytes[23..27].try_into().unwrap()) as usize;
        let point_table_offset = u32::from_le_bytes(bytes[27..31].try_into().unwrap()) as usize;

        let mut sectors = Vec::with_capacity(sector_count);
        for i in 0..sector_count {
            let off = sector_table_offset + i * SECTOR_TABLE_ENTRY_LEN;
            let entry = &bytes[off..off + SECTOR_TABLE_ENTRY_LEN];
            sectors.push(ParsedSectorEntry {
                compressed_data_offset: u64::from_le_bytes(entry[0..8].try_into().unwrap()) as usize,
                first_sector: i32::from_le_bytes(entry[8..12].try_into().unwrap()),
                sector_data_len: u32::from_le_bytes(entry[12..16].try_into().unwrap()),
                sector_data_compressed_len: u32::from_le_bytes(entry[16..20].try_into().unwrap()),
                subchannels_compressed_len: u32::from_le_bytes(entry[20..24].try_into().unwrap()),
                sector_data_method: CompressionMethod::try_from(entry[24])
                    .map_err(|_| RipError::Missing("unknown ODI sector compression method".into()))?,
                subchannels_method: CompressionMethod::try_from(entry[25])
                    .map_err(|_| RipError::Missing("unknown ODI subchannel compression method".into()))?,
                readability: Readability::try_from(entry[26])?,
            });
        }
        sectors.sort_by_key(|e| e.first_sector);

        let points_len = (bytes.len() - point_table_offset) / POINT_TABLE_ENTRY_LEN;
        let mut points = Vec::with_capacity(points_len);
        for i in 0..points_len {
            let off = point_table_offset + i * POINT_TABLE_ENTRY_LEN;
            let entry = &bytes[off..off + POINT_TABLE_ENTRY_LEN];
            let adr = Adr::try_from(entry[1] >> 4).unwrap_or(Adr::Mode1Q);
            let control = crate::commands::toc::Control::from_bits_truncate(entry[1] & 0x0F);
            points.push(PointInfo {
                session_number: entry[0],
                adr,
                control,
                point: entry[2],
                address: crate::addressing::SectorAddress::new(entry[3], entry[4], entry[5])
                    .map_err(RipError::from)?,
                paddress: crate::addressing::SectorAddress::new(entry[6], entry[7], entry[8])
                    .map_err(RipError::from)?,
            });
        }

        Ok(Self { body: bytes, sectors, points })
    }

    pub fn points(&self) -> &[PointInfo] {
        &self.points
    }

    /// Reconstructs the sector and (if captured) subchannel payload
    /// for `sector`, or `Missing` if it was never part of the image.
    pub fn read_sector(&self, sector: Sector) -> Result<ReadSector, RipError> {
        let idx = self
            .sectors
            .binary_search_by_key(&sector.get(), |e| e.first_sector)
            .map_err(|_| RipError::Missing(format!("sector {} not present in ODI image", sector.get())))?;
        let entry = &self.sectors[idx];

        let data_start = entry.compressed_data_offset;
        let data_end = data_start + entry.sector_data_compressed_len as usize;
        let compressed = &self.body[data_start..data_end];
        let sector_data = compress::decompress(entry.sector_data_method, compressed, entry.sector_data_len as usize);

        let subchannels_data = if entry.subchannels_compressed_len > 0 {
            let sub_start = data_end;
            let sub_end = sub_start + entry.subchannels_compressed_len as usize;
            let compressed = &self.body[sub_start..sub_end];
            Some(compress::decompress(entry.subchannels_method, compressed, 96))
        } else {
            None
        };

        Ok(ReadSector {
            sector_data,
            subchannels_data,
            readable: entry.readability == Readability::Readable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disc::{DiscInfo, SessionInfo, SessionType, TrackInfo};
    use crate::image::TrackData;
    use std::collections::BTreeMap;

    fn single_track_disc() -> DiscData {
        let track = TrackInfo {
            number: 1,
            track_type: TrackType::Audio2Channels,
            first_sector_absolute: crate::addressing::Sector::ZERO,
            last_sector_absolute: crate::addressing::Sector::try_from(2).unwrap(),
            length_sectors: 2,
        };
        let mut tracks = BTreeMap::new();
        tracks.insert(
            1,
            TrackData {
                sector_data: vec![vec![0u8; 2352], vec![1u8; 2352]],
                subchannels_data: None,
            },
        );

        DiscData {
            disc: DiscInfo {
                sessions: vec![SessionInfo {
                    number: 1,
                    session_type: SessionType::CddaOrCdrom,
                    tracks: vec![track],
                    points: vec![],
                    lead_in_length_sectors: 4500,
                    pregap_sectors: 150,
                    length_sectors: 2,
                    lead_out_length_sectors: 6750,
                }],
                length_sectors: 2,
            },
            tracks,
        }
    }

    #[test]
    fn writes_header_and_nonempty_body_for_single_track_disc() {
        let disc = single_track_disc();
        let dir = tempfile::tempdir().unwrap();
        write(&disc, "image", dir.path()).unwrap();

        let bytes = std::fs::read(dir.path().join("image.odi")).unwrap();
        assert_eq!(&bytes[0..16], FILE_HEADER_IDENTIFIER);
        assert!(bytes.len() as u64 > FILE_HEADER_LEN);
    }

    #[test]
    fn round_trips_sector_payloads_through_open() {
        let disc = single_track_disc();
        let dir = tempfile::tempdir().unwrap();
        write(&disc, "image", dir.path()).unwrap();

        let image = OdiImage::open(&dir.path().join("image.odi")).unwrap();
        let first = image.read_sector(crate::addressing::Sector::ZERO).unwrap();
        assert_eq!(first.sector_data, vec![0u8; 2352]);
        let second = image.read_sector(crate::addressing::Sector::try_from(1).unwrap()).unwrap();
        assert_eq!(second.sector_data, vec![1u8; 2352]);
    }

    #[test]
    fn choose_method_prefers_stereo_audio_coder_for_audio_tracks() {
        assert_eq!(choose_method(TrackType::Audio2Channels), CompressionMethod::LosslessStereoAudio);
        assert_eq!(choose_method(TrackType::DataMode1), CompressionMethod::RunLengthEncoding);
    }

    #[test]
    fn compress_or_store_falls_back_to_none_on_expansion() {
        let noise: Vec<u8> = (0..=255u8).collect();
        let (method, payload) = compress_or_store(CompressionMethod::RunLengthEncoding, &noise);
        assert_eq!(method, CompressionMethod::None);
        assert_eq!(payload, noise);
    }
}
