//! Disc model builder (component E): turns a validated Full-TOC into a
//! normalized [`DiscInfo`] of sessions, tracks and points.

use std::collections::BTreeMap;

use crate::addressing::{Sector, SectorAddress};
use crate::commands::toc::{FullToc, FullTocEntry, POINT_FIRST_TRACK_IN_SESSION, POINT_LEAD_OUT};
use crate::constants::{
    FIRST_LEAD_OUT_LENGTH_SECTORS, LEAD_IN_LENGTH_SECTORS, SUBSEQUENT_LEAD_OUT_LENGTH_SECTORS,
};
use crate::error::RipError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    CddaOrCdrom,
    Cdi,
    CdxaOrDdcd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackCategory {
    Audio2Channels,
    Audio4Channels,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    Audio2Channels,
    Audio4Channels,
    DataMode0,
    DataMode1,
    DataMode2,
    DataMode2Form1,
    DataMode2Form2,
}

impl TrackType {
    /// `(sector_length, user_data_offset, user_data_length)`, for data
    /// track types only (audio tracks carry no header/offset).
    pub fn layout(self) -> Option<(usize, usize, usize)> {
        match self {
            TrackType::DataMode1 => Some((2352, 16, 2048)),
            TrackType::DataMode2 => Some((2352, 16, 2336)),
            TrackType::DataMode2Form1 => Some((2352, 24, 2048)),
            TrackType::DataMode2Form2 => Some((2352, 24, 2324)),
            TrackType::DataMode0 | TrackType::Audio2Channels | TrackType::Audio4Channels => None,
        }
    }
}

/// The primary volume descriptor always lives at ISO 9660 relative
/// sector 16, i.e. absolute sector 166 in this crate's `Sector` axis.
const PVD_PROBE_SECTOR: i32 = 166;

#[derive(Debug, Clone, Copy)]
pub struct TrackInfo {
    pub number: u8,
    pub track_type: TrackType,
    pub first_sector_absolute: Sector,
    pub last_sector_absolute: Sector,
    pub length_sectors: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct PointInfo {
    pub session_number: u8,
    pub adr: crate::commands::toc::Adr,
    pub control: crate::commands::toc::Control,
    pub point: u8,
    pub address: SectorAddress,
    pub paddress: SectorAddress,
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub number: u8,
    pub session_type: SessionType,
    pub tracks: Vec<TrackInfo>,
    pub points: Vec<PointInfo>,
    pub lead_in_length_sectors: u32,
    pub pregap_sectors: u32,
    pub length_sectors: i64,
    pub lead_out_length_sectors: u32,
}

#[derive(Debug, Clone)]
pub struct DiscInfo {
    pub sessions: Vec<SessionInfo>,
    pub length_sectors: i64,
}

fn session_type_from_first_track_entry(entry: &FullTocEntry) -> SessionType {
    match entry.paddress.s {
        0x10 => SessionType::Cdi,
        0x20 => SessionType::CdxaOrDdcd,
        _ => SessionType::CddaOrCdrom,
    }
}

fn track_category(control: crate::commands::toc::Control) -> TrackCategory {
    control.category()
}

/// Builds a [`DiscInfo`] from a validated Full-TOC, probing data tracks
/// for their exact mode via `read_sector`, a caller-supplied callback
/// that returns a raw 2352-byte sector (sync header included) for an
/// absolute sector index.
pub fn build_disc_info<R>(full_toc: &FullToc, mut read_sector: R) -> Result<DiscInfo, RipError>
where
    R: FnMut(Sector) -> Result<Vec<u8>, RipError>,
{
    let mut by_session: BTreeMap<u8, Vec<&FullTocEntry>> = BTreeMap::new();
    for entry in &full_toc.entries {
        by_session.entry(entry.session_number).or_default().push(entry);
    }

    let mut sessions = Vec::new();
    let mut running_offset = Sector::ZERO;
    let mut disc_length: i64 = 0;

    for (session_number, entries) in by_session {
        let first_track_entry = entries
            .iter()
            .find(|e| e.point == POINT_FIRST_TRACK_IN_SESSION)
            .copied()
            .ok_or_else(|| RipError::Missing(format!("session {session_number} has no 0xA0 point")))?;
        let session_type = session_type_from_first_track_entry(first_track_entry);

        let lead_out_entry = entries
            .iter()
            .find(|e| e.point == POINT_LEAD_OUT)
            .copied()
            .ok_or_else(|| RipError::Missing(format!("session {session_number} has no lead-out point")))?;
        let lead_out_sector = Sector::try_from(lead_out_entry.paddress)?;

        let mut track_entries: Vec<&FullTocEntry> =
            entries.iter().copied().filter(|e| e.is_track_point()).collect();
        track_entries.sort_by_key(|e| e.point);

        let points: Vec<PointInfo> = entries
            .iter()
            .map(|e| PointInfo {
                session_number: e.session_number,
                adr: e.adr,
                control: e.control,
                point: e.point,
                address: e.address,
                paddress: e.paddress,
            })
            .collect();

        let mut tracks = Vec::with_capacity(track_entries.len());
        for (idx, entry) in track_entries.iter().enumerate() {
            let first_sector_absolute = Sector::try_from(entry.paddress)?;
            let next_sector = track_entries
                .get(idx + 1)
                .map(|next| Sector::try_from(next.paddress))
                .transpose()?
                .unwrap_or(lead_out_sector);

            let length_sectors = next_sector.get() - first_sector_absolute.get();
            let category = track_category(entry.control);
            let track_type = determine_track_type(category, session_type, &mut read_sector)?;

            tracks.push(TrackInfo {
                number: entry.point,
                track_type,
                first_sector_absolute,
                last_sector_absolute: next_sector,
                length_sectors,
            });
        }

        let pregap_sectors_signed = tracks
            .first()
            .map(|t| t.first_sector_absolute.get() - running_offset.get())
            .unwrap_or(0);

        let pregap_sectors = if pregap_sectors_signed > 150 {
            let synthetic_start = running_offset.get() + 150;
            let synthetic_length = pregap_sectors_signed - 150;
            let synthetic = TrackInfo {
                number: 0,
                track_type: TrackType::Audio2Channels,
                first_sector_absolute: Sector::try_from(synthetic_start)?,
                last_sector_absolute: Sector::try_from(synthetic_start + synthetic_length)?,
                length_sectors: synthetic_length,
            };
            tracks.insert(0, synthetic);
            150u32
        } else {
            pregap_sectors_signed.max(0) as u32
        };

        let lead_in_length_sectors = LEAD_IN_LENGTH_SECTORS;
        let lead_out_length_sectors = if session_number == 1 {
            FIRST_LEAD_OUT_LENGTH_SECTORS
        } else {
            SUBSEQUENT_LEAD_OUT_LENGTH_SECTORS
        };

        let length_sectors: i64 = tracks.iter().map(|t| i64::from(t.length_sectors)).sum();

        let session_total = i64::from(lead_in_length_sectors)
            + i64::from(pregap_sectors)
            + length_sectors
            + i64::from(lead_out_length_sectors);
        disc_length += session_total;

        running_offset = tracks
            .last()
            .map(|t| t.last_sector_absolute)
            .unwrap_or(running_offset);
        running_offset = Sector::try_from(running_offset.get() + lead_out_length_sectors as i32)?;

        sessions.push(SessionInfo {
            number: session_number,
            session_type,
            tracks,
            points,
            lead_in_length_sectors,
            pregap_sectors,
            length_sectors,
            lead_out_length_sectors,
        });
    }

    Ok(DiscInfo {
        sessions,
        length_sectors: disc_length,
    })
}

fn determine_track_type<R>(
    category: TrackCategory,
    session_type: SessionType,
    read_sector: &mut R,
) -> Result<TrackType, RipError>
where
    R: FnMut(Sector) -> Result<Vec<u8>, RipError>,
{
    Ok(match category {
        TrackCategory::Audio2Channels => TrackType::Audio2Channels,
        TrackCategory::Audio4Channels => TrackType::Audio4Channels,
        TrackCategory::Data => {
            let probe_sector = Sector::try_from(PVD_PROBE_SECTOR)?;
            let raw = read_sector(probe_sector)?;
            if raw.len() < 16 {
                return Err(RipError::Missing(format!(
                    "PVD probe sector read returned {} bytes, need at least 16",
                    raw.len()
                )));
            }
            let mode = raw[15];

            match session_type {
                SessionType::CdxaOrDdcd => {
                    let form2 = raw.get(18).map(|b| b & 0b0010_0000 != 0).unwrap_or(false);
                    if form2 {
                        TrackType::DataMode2Form2
                    } else {
                        TrackType::DataMode2Form1
                    }
                }
                _ => match mode {
                    0 => TrackType::DataMode0,
                    1 => TrackType::DataMode1,
                    2 => TrackType::DataMode2,
                    _ => TrackType::DataMode0,
                },
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::get_address_from_sector;
    use crate::commands::toc::{Adr, Control};

    fn entry(point: u8, control: Control, paddress_sector: i32) -> FullTocEntry {
        let paddress = get_address_from_sector(Sector::try_from(paddress_sector).unwrap());
        FullTocEntry {
            session_number: 1,
            adr: Adr::Mode1Q,
            control,
            point,
            address: paddress,
            paddress,
        }
    }

    fn never_called(_: Sector) -> Result<Vec<u8>, RipError> {
        panic!("read_sector should not be called for an audio track")
    }

    #[test]
    fn single_audio_track_with_small_pregap_needs_no_synthetic_track() {
        let full_toc = FullToc {
            length: 0,
            first_session: 1,
            last_session: 1,
            entries: vec![
                entry(POINT_FIRST_TRACK_IN_SESSION, Control::empty(), 0),
                entry(1, Control::empty(), 0),
                entry(POINT_LEAD_OUT, Control::empty(), 100),
            ],
        };

        let disc = build_disc_info(&full_toc, never_called).unwrap();
        assert_eq!(disc.sessions.len(), 1);
        let session = &disc.sessions[0];
        assert_eq!(session.tracks.len(), 1);
        assert_eq!(session.tracks[0].number, 1);
        assert_eq!(session.tracks[0].track_type, TrackType::Audio2Channels);
        assert_eq!(session.tracks[0].length_sectors, 100);
        assert_eq!(session.pregap_sectors, 0);
    }

    #[test]
    fn oversized_pregap_gets_a_synthetic_track_zero() {
        // A session whose first track starts at sector 225 with a
        // running offset of 0 has a 225-sector pregap; the builder
        // injects a 75-sector track 0 starting at sector 150 and clamps
        // session.pregap_sectors to 150.
        let full_toc = FullToc {
            length: 0,
            first_session: 1,
            last_session: 1,
            entries: vec![
                entry(POINT_FIRST_TRACK_IN_SESSION, Control::empty(), 0),
                entry(1, Control::empty(), 225),
                entry(POINT_LEAD_OUT, Control::empty(), 325),
            ],
        };

        let disc = build_disc_info(&full_toc, never_called).unwrap();
        let session = &disc.sessions[0];
        assert_eq!(session.tracks.len(), 2);

        let synthetic = &session.tracks[0];
        assert_eq!(synthetic.number, 0);
        assert_eq!(synthetic.first_sector_absolute.get(), 150);
        assert_eq!(synthetic.length_sectors, 75);

        let real = &session.tracks[1];
        assert_eq!(real.number, 1);
        assert_eq!(real.first_sector_absolute.get(), 225);

        assert_eq!(session.pregap_sectors, 150);
    }

    #[test]
    fn data_track_mode_is_probed_from_the_primary_volume_descriptor() {
        let full_toc = FullToc {
            length: 0,
            first_session: 1,
            last_session: 1,
            entries: vec![
                entry(POINT_FIRST_TRACK_IN_SESSION, Control::empty(), 0),
                entry(1, Control::IS_DATA, 0),
                entry(POINT_LEAD_OUT, Control::empty(), 100),
            ],
        };

        let read_sector = |sector: Sector| {
            assert_eq!(sector.get(), PVD_PROBE_SECTOR);
            let mut raw = vec![0u8; 16];
            raw[15] = 2; // mode 2
            Ok(raw)
        };

        let disc = build_disc_info(&full_toc, read_sector).unwrap();
        assert_eq!(disc.sessions[0].tracks[0].track_type, TrackType::DataMode2);
    }

    #[test]
    fn lead_out_length_differs_for_first_vs_later_sessions() {
        let mut entries = vec![
            entry(POINT_FIRST_TRACK_IN_SESSION, Control::empty(), 0),
            entry(1, Control::empty(), 0),
            entry(POINT_LEAD_OUT, Control::empty(), 100),
        ];
        entries.extend([
            FullTocEntry { session_number: 2, ..entry(POINT_FIRST_TRACK_IN_SESSION, Control::empty(), 0) },
            FullTocEntry { session_number: 2, ..entry(2, Control::empty(), 7500) },
            FullTocEntry { session_number: 2, ..entry(POINT_LEAD_OUT, Control::empty(), 7600) },
        ]);

        let full_toc = FullToc { length: 0, first_session: 1, last_session: 2, entries };
        let disc = build_disc_info(&full_toc, never_called).unwrap();

        assert_eq!(disc.sessions[0].lead_out_length_sectors, FIRST_LEAD_OUT_LENGTH_SECTORS);
        assert_eq!(disc.sessions[1].lead_out_length_sectors, SUBSEQUENT_LEAD_OUT_LENGTH_SECTORS);
    }
}
