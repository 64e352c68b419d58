//! CUE/BIN serializer (split or merged), §4.8.1.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::disc::TrackType;
use crate::error::RipError;

use super::{msf_from_sector_offset, DiscData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFileFormat {
    Bin,
    Wav,
}

#[derive(Debug, Clone)]
pub struct CueOptions {
    pub merge_tracks: bool,
    pub trim_data_tracks: bool,
    pub audio_file_format: AudioFileFormat,
    /// Basename (without extension) for the emitted `.cue`/`.bin`/`.wav` files.
    pub stem: String,
}

const WAV_HEADER_LEN: usize = 44;

fn wav_header(data_length: u32) -> [u8; WAV_HEADER_LEN] {
    let mut header = [0u8; WAV_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_length).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&2u16.to_le_bytes()); // stereo
    header[24..28].copy_from_slice(&44_100u32.to_le_bytes());
    header[28..32].copy_from_slice(&(44_100 * 4).to_le_bytes()); // byte rate
    header[32..34].copy_from_slice(&4u16.to_le_bytes()); // block align
    header[34..36].copy_from_slice(&16u16.to_le_bytes()); // bits per sample
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_length.to_le_bytes());
    header
}

/// `TRACK NN {AUDIO|MODE1/2048|...}`, or `UnsupportedValue` for the
/// two track types §4.8.1 rejects outright.
fn cue_track_mode(track_type: TrackType, trim: bool) -> Result<&'static str, RipError> {
    Ok(match (track_type, trim) {
        (TrackType::Audio2Channels, _) => "AUDIO",
        (TrackType::DataMode1, true) => "MODE1/2048",
        (TrackType::DataMode1, false) => "MODE1/2352",
        (TrackType::DataMode2, true) => "MODE2/2336",
        (TrackType::DataMode2, false) => "MODE2/2352",
        (TrackType::DataMode2Form1, true) => "MODE2/2048",
        (TrackType::DataMode2Form1, false) => "MODE2/2352",
        (TrackType::DataMode2Form2, true) => "MODE2/2324",
        (TrackType::DataMode2Form2, false) => "MODE2/2352",
        (TrackType::Audio4Channels, _) => {
            return Err(RipError::UnsupportedValue("AUDIO_4_CHANNELS has no CUE track mode".into()))
        }
        (TrackType::DataMode0, _) => {
            return Err(RipError::UnsupportedValue("DATA_MODE0 has no CUE track mode".into()))
        }
    })
}

fn track_payload(track_type: TrackType, trim_data_tracks: bool, sector_data: &[Vec<u8>]) -> Vec<u8> {
    let Some((_, user_data_offset, user_data_length)) = track_type.layout() else {
        return sector_data.concat();
    };
    if !trim_data_tracks {
        return sector_data.concat();
    }

    let mut out = Vec::with_capacity(sector_data.len() * user_data_length);
    for sector in sector_data {
        out.extend_from_slice(&sector[user_data_offset..user_data_offset + user_data_length]);
    }
    out
}

/// Writes the `.cue` manifest plus one or more `.bin`/`.wav` payload
/// files into `out_dir`.
pub fn write(disc: &DiscData, options: &CueOptions, out_dir: &Path) -> Result<(), RipError> {
    let mut cue = String::new();
    let mut running_offset: i64 = 0;

    let merged_ext = if options.merge_tracks { "bin" } else { "" };
    let merged_path = out_dir.join(format!("{}.bin", options.stem));
    let mut merged_file = if options.merge_tracks {
        Some(File::create(&merged_path).map_err(RipError::IO)?)
    } else {
        None
    };
    if options.merge_tracks {
        cue.push_str(&format!("FILE \"{}.{merged_ext}\" BINARY\n", options.stem));
    }

    for session in &disc.disc.sessions {
        for track in &session.tracks {
            if track.number == 0 {
                continue;
            }
            let mode = cue_track_mode(track.track_type, options.trim_data_tracks)?;
            let is_audio = matches!(track.track_type, TrackType::Audio2Channels);

            let Some(data) = disc.tracks.get(&track.number) else {
                return Err(RipError::Missing(format!("no captured sectors for track {}", track.number)));
            };
            let payload = track_payload(track.track_type, options.trim_data_tracks, &data.sector_data);

            if !options.merge_tracks {
                let (file_name, contents) = single_track_file(options, track.number, is_audio, &payload);
                let path = out_dir.join(&file_name);
                File::create(&path).map_err(RipError::IO)?.write_all(&contents).map_err(RipError::IO)?;

                let ext = if is_audio && options.audio_file_format == AudioFileFormat::Wav { "wav" } else { "bin" };
                let format_tag = if is_audio && options.audio_file_format == AudioFileFormat::Wav { "WAVE" } else { "BINARY" };
                cue.push_str(&format!("FILE \"{}.{:02}.{ext}\" {format_tag}\n", options.stem, track.number));
                cue.push_str(&format!("  TRACK {:02} {mode}\n", track.number));
                cue.push_str("    PREGAP 00:00:00\n");
                cue.push_str("    INDEX 01 00:00:00\n");
            } else {
                let file = merged_file.as_mut().expect("merged_file set when merge_tracks is true");
                file.write_all(&payload).map_err(RipError::IO)?;

                let (m, s, f) = msf_from_sector_offset(running_offset);
                cue.push_str(&format!("  TRACK {:02} {mode}\n", track.number));
                cue.push_str("    PREGAP 00:00:00\n");
                cue.push_str(&format!("    INDEX 01 {m:02}:{s:02}:{f:02}\n"));

                running_offset += i64::from(track.length_sectors);
            }
        }
    }

    let cue_path = out_dir.join(format!("{}.cue", options.stem));
    File::create(&cue_path).map_err(RipError::IO)?.write_all(cue.as_bytes()).map_err(RipError::IO)?;

    Ok(())
}

fn single_track_file(
    options: &CueOptions,
    track_number: u8,
    is_audio: bool,
    payload: &[u8],
) -> (PathBuf, Vec<u8>) {
    if is_audio && options.audio_file_format == AudioFileFormat::Wav {
        let mut contents = Vec::with_capacity(WAV_HEADER_LEN + payload.len());
        contents.extend_from_slice(&wav_header(payload.len() as u32));
        contents.extend_from_slice(payload);
        (PathBuf::from(format!("{}.{:02}.wav", options.stem, track_number)), contents)
    } else {
        (PathBuf::from(format!("{}.{:02}.bin", options.stem, track_number)), payload.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_four_channel_and_mode0() {
        assert!(cue_track_mode(TrackType::Audio4Channels, false).is_err());
        assert!(cue_track_mode(TrackType::DataMode0, false).is_err());
    }

    #[test]
    fn wav_header_declares_pcm_stereo_44100_16bit() {
        let header = wav_header(2352 * 10);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(u16::from_le_bytes([header[20], header[21]]), 1);
        assert_eq!(u16::from_le_bytes([header[22], header[23]]), 2);
        assert_eq!(u32::from_le_bytes([header[24], header[25], header[26], header[27]]), 44_100);
        assert_eq!(u16::from_le_bytes([header[34], header[35]]), 16);
    }

    #[test]
    fn trims_data_track_to_user_data_length() {
        let sector = vec![0xFFu8; 2352];
        let payload = track_payload(TrackType::DataMode1, true, &[sector]);
        assert_eq!(payload.len(), 2048);
    }
}
