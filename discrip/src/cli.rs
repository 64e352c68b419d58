//! Argument surface: one shared rip configuration plus a subcommand
//! per output image format.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "discrip", version, about = "Bit-accurate CD ripper")]
pub struct Cli {
    /// Device node to read from, e.g. /dev/sr0, or "auto" to pick the
    /// first optical device discovered on the system.
    #[arg(short, long, default_value = "/dev/cdrom")]
    pub drive: String,

    /// Read from a previously written ODI image instead of a physical
    /// drive; lets the rip be replayed without hardware attached.
    #[arg(long, conflicts_with = "drive")]
    pub emulate: Option<PathBuf>,

    /// Eject the tray (if the drive allows it) and exit without
    /// ripping anything.
    #[arg(long)]
    pub eject: bool,

    /// Directory the output image is written into.
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Basename for the emitted files (without extension).
    #[arg(long, default_value = "rip")]
    pub stem: String,

    /// Samples to shift audio reads by; overrides the drive's looked-up
    /// offset (or 0, if none is known).
    #[arg(long)]
    pub read_correction: Option<i32>,

    /// Comma-separated track numbers to extract; all tracks if omitted.
    #[arg(long, value_delimiter = ',')]
    pub track_numbers: Option<Vec<u8>>,

    #[arg(long, default_value_t = 1)]
    pub min_data_passes: u8,
    #[arg(long, default_value_t = 1)]
    pub max_data_passes: u8,
    #[arg(long, default_value_t = 1)]
    pub min_audio_passes: u8,
    #[arg(long, default_value_t = 1)]
    pub max_audio_passes: u8,

    #[arg(long, default_value_t = 0)]
    pub max_data_retries: u8,
    #[arg(long, default_value_t = 0)]
    pub max_audio_retries: u8,

    #[arg(long, default_value_t = 1)]
    pub min_data_copies: u8,
    #[arg(long, default_value_t = 1)]
    pub max_data_copies: u8,
    #[arg(long, default_value_t = 1)]
    pub min_audio_copies: u8,
    #[arg(long, default_value_t = 1)]
    pub max_audio_copies: u8,

    /// Capture interleaved 96-byte subchannel blocks for audio tracks.
    #[arg(long)]
    pub save_audio_subchannels: bool,
    /// Capture interleaved 96-byte subchannel blocks for data tracks.
    #[arg(long)]
    pub save_data_subchannels: bool,

    /// Output image format; not required when `--eject` is given alone.
    #[command(subcommand)]
    pub format: Option<Format>,
}

#[derive(Debug, Subcommand)]
pub enum Format {
    /// CUE sheet plus BIN or WAV payloads.
    Cue {
        /// Emit a single merged BIN/WAV instead of one file per track.
        #[arg(long)]
        merge_tracks: bool,
        /// Strip data tracks down to their user-data region.
        #[arg(long)]
        trim_data_tracks: bool,
        #[arg(long, value_enum, default_value_t = AudioFileFormat::Bin)]
        audio_file_format: AudioFileFormat,
    },
    /// One `.NN.iso` file per data track.
    Iso,
    /// Alcohol 120%-style MDS/MDF pair.
    Mds,
    /// This project's own compressed single-file container.
    Odi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AudioFileFormat {
    Bin,
    Wav,
}

impl From<AudioFileFormat> for discdrive::image::cue::AudioFileFormat {
    fn from(value: AudioFileFormat) -> Self {
        match value {
            AudioFileFormat::Bin => discdrive::image::cue::AudioFileFormat::Bin,
            AudioFileFormat::Wav => discdrive::image::cue::AudioFileFormat::Wav,
        }
    }
}
