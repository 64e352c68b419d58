//! Entry point: opens a drive (or an emulated one), reads its table of
//! contents, runs the multi-pass consensus extraction engine over every
//! requested track, and writes the result out in the chosen image
//! format.

mod cli;

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use chrono::Local;
use clap::Parser;
use tracing::{info, warn};

use discdrive::addressing::Sector;
use discdrive::commands::toc::FullTOC;
use discdrive::commands::{Command, ExecuteError};
use discdrive::constants::SECTOR_LENGTH;
use discdrive::disc::{DiscInfo, TrackInfo, TrackType};
use discdrive::drive::Drive;
use discdrive::emulator::Emulator;
use discdrive::error::RipError;
use discdrive::extract::{self, RawRead};
use discdrive::image::cue::CueOptions;
use discdrive::image::{cue, iso, mds, odi, DiscData, TrackData};
use discdrive::transport::Transport;

use cli::{Cli, Format};

/// Either a live device handle or an ODI image stood in for one; the
/// rip loop below only needs these three operations from whichever it
/// got.
enum Source {
    Drive(Drive),
    Emulator(Emulator),
}

fn execute_error_to_rip<Cmd, const N: usize>(err: ExecuteError<Cmd, N>) -> RipError
where
    Cmd: Command<N>,
{
    match err {
        #[cfg(target_os = "linux")]
        ExecuteError::SCSIError(e) => RipError::from(e),
        ExecuteError::ParseError(_) => RipError::Missing("command response failed to parse".into()),
    }
}

impl Source {
    fn disc_info(&mut self) -> Result<DiscInfo, RipError> {
        match self {
            Source::Drive(drive) => drive.read_disc_info(),
            Source::Emulator(emulator) => {
                let full_toc = emulator
                    .execute(FullTOC::new(1, u16::MAX, 0))
                    .map_err(execute_error_to_rip)?;
                discdrive::disc::build_disc_info(&full_toc, |sector| {
                    Ok(emulator.read_raw_sector(sector)?.sector_data)
                })
            }
        }
    }

    fn set_retry_count(&self, n: u8) -> Result<bool, RipError> {
        match self {
            Source::Drive(drive) => drive.set_read_retry_count(n),
            // The emulator replays a capture; there's nothing to retry.
            Source::Emulator(_) => Ok(true),
        }
    }

    fn read_sector(&self, sector: Sector) -> Result<RawRead, RipError> {
        match self {
            Source::Drive(drive) => drive.read_absolute_sector(sector).map(Into::into),
            Source::Emulator(emulator) => emulator.read_raw_sector(sector),
        }
    }
}

fn is_audio(track_type: TrackType) -> bool {
    matches!(track_type, TrackType::Audio2Channels | TrackType::Audio4Channels)
}

struct PassParams {
    min_passes: u8,
    max_passes: u8,
    max_retries: u8,
    min_copies: u8,
    max_copies: u8,
}

fn pass_params(cli: &Cli, track_type: TrackType) -> PassParams {
    if is_audio(track_type) {
        PassParams {
            min_passes: cli.min_audio_passes,
            max_passes: cli.max_audio_passes,
            max_retries: cli.max_audio_retries,
            min_copies: cli.min_audio_copies,
            max_copies: cli.max_audio_copies,
        }
    } else {
        PassParams {
            min_passes: cli.min_data_passes,
            max_passes: cli.max_data_passes,
            max_retries: cli.max_data_retries,
            min_copies: cli.min_data_copies,
            max_copies: cli.max_data_copies,
        }
    }
}

/// Runs consensus extraction over `[first, last)`, logging every
/// C2/subchannel-CRC flag and bad sector the engine itself stays quiet
/// about, and returns the winning payload per sector plus the last
/// subchannel block observed for it (`None` entries if a sector never
/// produced a winner).
fn extract_range(
    source: &Source,
    first: Sector,
    last: Sector,
    params: &PassParams,
    track_number: u8,
) -> Result<(Vec<Vec<u8>>, BTreeMap<i32, Vec<u8>>), RipError> {
    let mut subchannels: BTreeMap<i32, Vec<u8>> = BTreeMap::new();

    let buckets = extract::read_absolute_sector_range(
        first,
        last,
        params.min_passes,
        params.max_passes,
        params.max_retries,
        params.min_copies,
        params.max_copies,
        |sector| {
            let raw = source.read_sector(sector)?;
            subchannels.insert(sector.get(), raw.subchannels_data.clone());
            Ok(raw)
        },
        |n| source.set_retry_count(n),
    )?;

    for bad in extract::identify_bad_sectors(first, &buckets) {
        warn!(track = track_number, sector = bad.get(), "no readable copy of sector");
    }

    for (offset, bucket) in buckets.iter().enumerate() {
        if bucket.iter().any(|e| e.ever_c2_error) {
            warn!(track = track_number, sector = first.get() + offset as i32, "drive reported C2 error bits");
        }
        if bucket.iter().any(|e| e.ever_subchannel_crc_invalid) {
            warn!(track = track_number, sector = first.get() + offset as i32, "subchannel Q CRC failed at least once");
        }
    }

    let sectors = buckets
        .iter()
        .map(|bucket| extract::winning_payload(bucket).map(<[u8]>::to_vec).unwrap_or_else(|| vec![0u8; SECTOR_LENGTH]))
        .collect();

    Ok((sectors, subchannels))
}

fn extract_track(
    source: &Source,
    cli: &Cli,
    track: &TrackInfo,
    read_correction: i32,
) -> Result<TrackData, RipError> {
    let params = pass_params(cli, track.track_type);
    let first = track.first_sector_absolute;
    let last = Sector::try_from(first.get() + track.length_sectors)?;
    let save_subchannels = if is_audio(track.track_type) { cli.save_audio_subchannels } else { cli.save_data_subchannels };

    if is_audio(track.track_type) && read_correction != 0 {
        let plan = extract::plan_audio_offset(first, last, read_correction)?;
        let (raw_sectors, subchannels) = extract_range(source, plan.adj_first, plan.adj_last, &params, track.number)?;
        let sector_data = extract::reassemble_audio_sectors(first, last, &plan, &raw_sectors);

        // Each reassembled sector straddles two physical reads once
        // shifted by the offset; the first of the pair's subchannel
        // block is the one attached.
        let subchannels_data = save_subchannels.then(|| {
            (first.get()..last.get())
                .map(|sector| subchannels.get(&sector).cloned().unwrap_or_else(|| vec![0u8; 96]))
                .collect()
        });

        Ok(TrackData { sector_data, subchannels_data })
    } else {
        let (sector_data, subchannels) = extract_range(source, first, last, &params, track.number)?;
        let subchannels_data = save_subchannels.then(|| {
            (first.get()..last.get()).map(|s| subchannels.get(&s).cloned().unwrap_or_else(|| vec![0u8; 96])).collect()
        });
        Ok(TrackData { sector_data, subchannels_data })
    }
}

fn resolve_drive_path(drive: &str) -> Result<String, RipError> {
    if drive != "auto" {
        return Ok(drive.to_owned());
    }

    let discovered = discdrive::device::discover_drives()?;
    discovered
        .into_iter()
        .next()
        .map(|d| d.devnode)
        .ok_or_else(|| RipError::MediaState("no optical device found".into()))
}

fn eject(drive_path: &str) -> Result<(), RipError> {
    use discdrive::commands::start_stop_unit::{LoadEjectOperation, StartStopUnit};
    use discdrive::commands::Control;

    let file = File::open(drive_path).map_err(RipError::IO)?;
    file.execute(StartStopUnit::new(false, LoadEjectOperation::EjectIfPermitted, Control::from(0)))
        .map_err(execute_error_to_rip)?;
    info!(drive = drive_path, "ejected");
    Ok(())
}

fn run(cli: &Cli) -> Result<(), RipError> {
    if cli.eject {
        let drive_path = resolve_drive_path(&cli.drive)?;
        return eject(&drive_path);
    }

    let format = cli.format.as_ref().ok_or_else(|| {
        RipError::InvalidArgument("an output format subcommand is required unless --eject is given".into())
    })?;

    let mut source = match &cli.emulate {
        Some(path) => Source::Emulator(Emulator::open(path)?),
        None => {
            let drive_path = resolve_drive_path(&cli.drive)?;
            let file = File::open(&drive_path).map_err(RipError::IO)?;
            let mut drive = Drive::new(file);
            let drive_info = drive.read_drive_info()?;
            info!(vendor = %drive_info.vendor, product = %drive_info.product, "drive ready");
            Source::Drive(drive)
        }
    };

    let disc = source.disc_info()?;
    info!(sessions = disc.sessions.len(), length_sectors = disc.length_sectors, "table of contents read");

    let read_correction = cli.read_correction.unwrap_or(0);

    let wanted: Option<Vec<u8>> = cli.track_numbers.clone();
    let mut tracks: BTreeMap<u8, TrackData> = BTreeMap::new();

    for session in &disc.sessions {
        for track in &session.tracks {
            if track.number == 0 {
                continue; // synthetic pregap track; never extracted or written out
            }
            if let Some(wanted) = &wanted {
                if !wanted.contains(&track.number) {
                    continue;
                }
            }

            info!(track = track.number, sectors = track.length_sectors, "extracting track");
            let data = extract_track(&source, cli, track, read_correction)?;
            tracks.insert(track.number, data);
        }
    }

    let disc_data = DiscData { disc, tracks };
    std::fs::create_dir_all(&cli.output).map_err(RipError::IO)?;

    match format {
        Format::Cue { merge_tracks, trim_data_tracks, audio_file_format } => {
            let options = CueOptions {
                merge_tracks: *merge_tracks,
                trim_data_tracks: *trim_data_tracks,
                audio_file_format: (*audio_file_format).into(),
                stem: cli.stem.clone(),
            };
            cue::write(&disc_data, &options, &cli.output)
        }
        Format::Iso => iso::write(&disc_data, &cli.stem, &cli.output),
        Format::Mds => mds::write(&disc_data, cli.save_audio_subchannels, cli.save_data_subchannels, &cli.stem, &cli.output),
        Format::Odi => odi::write(&disc_data, &cli.stem, &cli.output),
    }
}

fn print_log_header(output: &Path, stem: &str) {
    println!("discrip {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("extraction log from {}", Local::now());
    println!("writing {stem} into {}", output.display());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_audio_covers_both_channel_counts_only() {
        assert!(is_audio(TrackType::Audio2Channels));
        assert!(is_audio(TrackType::Audio4Channels));
        assert!(!is_audio(TrackType::DataMode1));
    }

    #[test]
    fn pass_params_splits_by_track_type() {
        let cli = Cli::parse_from([
            "discrip",
            "--min-audio-passes", "2",
            "--max-audio-passes", "5",
            "--min-data-passes", "1",
            "--max-data-passes", "3",
            "iso",
        ]);

        let audio = pass_params(&cli, TrackType::Audio2Channels);
        assert_eq!((audio.min_passes, audio.max_passes), (2, 5));

        let data = pass_params(&cli, TrackType::DataMode1);
        assert_eq!((data.min_passes, data.max_passes), (1, 3));
    }

    #[test]
    fn resolve_drive_path_passes_through_explicit_paths() {
        assert_eq!(resolve_drive_path("/dev/sr1").unwrap(), "/dev/sr1");
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    print_log_header(&cli.output, &cli.stem);

    match run(&cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "rip failed");
            std::process::ExitCode::FAILURE
        }
    }
}
