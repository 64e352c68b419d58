//! ISO serializer, §4.8.3: one `.NN.iso` file per data track's
//! user-data slice.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::disc::TrackType;
use crate::error::RipError;

use super::DiscData;

pub fn write(disc: &DiscData, stem: &str, out_dir: &Path) -> Result<(), RipError> {
    for session in &disc.disc.sessions {
        for track in &session.tracks {
            if track.number == 0 {
                continue;
            }

            let Some((_, user_data_offset, user_data_length)) = track.track_type.layout() else {
                return Err(RipError::UnsupportedValue(format!(
                    "track {} is not a data track", track.number
                )));
            };
            if user_data_length != 2048 {
                return Err(RipError::InvalidArgument(format!(
                    "track {} has user-data length {user_data_length}, expected 2048",
                    track.number
                )));
            }

            let data = disc
                .tracks
                .get(&track.number)
                .ok_or_else(|| RipError::Missing(format!("no captured sectors for track {}", track.number)))?;

            let mut out = Vec::with_capacity(data.sector_data.len() * user_data_length);
            for sector in &data.sector_data {
                out.extend_from_slice(&sector[user_data_offset..user_data_offset + user_data_length]);
            }

            let path = out_dir.join(format!("{stem}.{:02}.iso", track.number));
            File::create(&path).map_err(RipError::IO)?.write_all(&out).map_err(RipError::IO)?;
        }
    }

    // Audio tracks silently contribute nothing; rejecting them outright
    // instead would make a mixed-mode disc impossible to export at all.
    if !disc.disc.sessions.iter().any(|s| s.tracks.iter().any(|t| t.track_type.layout().is_some())) {
        return Err(RipError::UnsupportedValue("disc has no data track to export as ISO".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disc::{DiscInfo, SessionInfo, SessionType, TrackInfo};
    use std::collections::BTreeMap;

    #[test]
    fn rejects_audio_only_disc() {
        let track = TrackInfo {
            number: 1,
            track_type: TrackType::Audio2Channels,
            first_sector_absolute: crate::addressing::Sector::ZERO,
            last_sector_absolute: crate::addressing::Sector::try_from(10).unwrap(),
            length_sectors: 10,
        };
        let disc = DiscData {
            disc: DiscInfo {
                sessions: vec![SessionInfo {
                    number: 1,
                    session_type: SessionType::CddaOrCdrom,
                    tracks: vec![track],
                    points: vec![],
                    lead_in_length_sectors: 4500,
                    pregap_sectors: 150,
                    length_sectors: 10,
                    lead_out_length_sectors: 6750,
                }],
                length_sectors: 10,
            },
            tracks: BTreeMap::new(),
        };

        let dir = tempfile::tempdir().unwrap();
        assert!(write(&disc, "image", dir.path()).is_err());
    }
}
