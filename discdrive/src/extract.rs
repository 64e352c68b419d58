//! Multi-pass consensus extraction engine (component H): the read loop
//! that tolerates transient drive errors and read-offset jitter, plus
//! the audio offset-reassembly and bad-sector reporting helpers that
//! consume its output.

use crate::addressing::Sector;
use crate::constants::{BYTES_PER_AUDIO_SAMPLE, SECTOR_LENGTH};
use crate::error::RipError;
use crate::subchannel::{self, CHANNEL_Q};
use crate::util::{idiv_ceil, idiv_floor};

/// One raw read of a single absolute sector, as returned by whichever
/// transport (a live [`crate::drive::Drive`] or the ODI-backed
/// emulator) the caller wires in behind `read_sector`.
#[derive(Debug, Clone)]
pub struct RawRead {
    pub sector_data: Vec<u8>,
    pub subchannels_data: Vec<u8>,
    pub c2_data: Vec<u8>,
}

/// One distinct payload observed for a sector across passes, plus how
/// many times it reproduced exactly and whether it was ever flagged by
/// the drive's C2 pointers or a failed subchannel-Q CRC. `discdrive`
/// never logs these flags itself; callers decide whether to warn.
#[derive(Debug, Clone)]
pub struct ExtractedSector {
    pub sector_data: Vec<u8>,
    pub counter: u32,
    pub ever_c2_error: bool,
    pub ever_subchannel_crc_invalid: bool,
}

fn top_counter(bucket: &[ExtractedSector]) -> u32 {
    bucket.iter().map(|e| e.counter).max().unwrap_or(0)
}

fn subchannel_q_crc_valid(subchannels_data: &[u8]) -> bool {
    let Ok(block): Result<[u8; 96], _> = subchannels_data.try_into() else {
        return false;
    };
    let channels = subchannel::deinterleave(&block);
    subchannel::q_crc_valid(&channels[CHANNEL_Q])
}

/// Runs the multi-pass consensus read loop over `[first, last)`.
///
/// `read_sector` issues one single-sector read; a transport failure
/// simply drops that sector from the current pass (its bucket list is
/// left untouched) rather than aborting the range. `set_retry_count` is
/// called once, before the first pass, to apply `max_retries`.
pub fn read_absolute_sector_range<R, S>(
    first: Sector,
    last: Sector,
    min_passes: u8,
    max_passes: u8,
    max_retries: u8,
    min_copies: u8,
    max_copies: u8,
    mut read_sector: R,
    set_retry_count: S,
) -> Result<Vec<Vec<ExtractedSector>>, RipError>
where
    R: FnMut(Sector) -> Result<RawRead, RipError>,
    S: FnOnce(u8) -> Result<bool, RipError>,
{
    let span = last.get() - first.get();
    if span <= 0 {
        return Err(RipError::InvalidArgument(format!(
            "range [{first}, {last}) is empty or reversed"
        )));
    }
    let count = span as usize;

    set_retry_count(max_retries)?;

    let mut buckets: Vec<Vec<ExtractedSector>> = vec![Vec::new(); count];

    for pass_index in 0..max_passes {
        for (offset, bucket) in buckets.iter_mut().enumerate() {
            let sector = Sector::try_from(first.get() + offset as i32)?;
            let Ok(raw) = read_sector(sector) else {
                continue;
            };

            let c2_had_error = raw.c2_data.iter().any(|&b| b != 0);
            let subchannel_crc_valid = subchannel_q_crc_valid(&raw.subchannels_data);

            match bucket.iter_mut().find(|e| e.sector_data == raw.sector_data) {
                Some(existing) => {
                    existing.counter += 1;
                    existing.ever_c2_error |= c2_had_error;
                    existing.ever_subchannel_crc_invalid |= !subchannel_crc_valid;
                }
                None => bucket.push(ExtractedSector {
                    sector_data: raw.sector_data,
                    counter: 1,
                    ever_c2_error: c2_had_error,
                    ever_subchannel_crc_invalid: !subchannel_crc_valid,
                }),
            }
        }

        let identical_copies = buckets.iter().map(|b| top_counter(b)).min().unwrap_or(0);

        if u32::from(pass_index) + 1 >= u32::from(min_passes) && identical_copies >= u32::from(max_copies) {
            break;
        }
    }

    let (worst_offset, identical_copies) = buckets
        .iter()
        .map(|b| top_counter(b))
        .enumerate()
        .min_by_key(|&(_, counter)| counter)
        .unwrap_or((0, 0));

    if identical_copies < u32::from(min_copies) {
        return Err(RipError::Consensus {
            sector: first.get() + worst_offset as i32,
            passes: u32::from(max_passes),
        });
    }

    Ok(buckets)
}

/// Picks the winning payload of a bucket list: the one with the
/// highest reproduction counter.
pub fn winning_payload(bucket: &[ExtractedSector]) -> Option<&[u8]> {
    bucket.iter().max_by_key(|e| e.counter).map(|e| e.sector_data.as_slice())
}

/// A sector is bad iff its bucket list is empty or its top counter is
/// 0 (the latter can't arise from [`read_absolute_sector_range`]
/// itself, but is checked for callers that assemble bucket lists by
/// other means). Returns absolute sector indices.
pub fn identify_bad_sectors(first: Sector, buckets: &[Vec<ExtractedSector>]) -> Vec<Sector> {
    buckets
        .iter()
        .enumerate()
        .filter(|(_, bucket)| bucket.is_empty() || top_counter(bucket) == 0)
        .filter_map(|(offset, _)| Sector::try_from(first.get() + offset as i32).ok())
        .collect()
}

/// The sector range to read, and the prefix/suffix byte split, to
/// compensate for a drive's audio read-offset correction. See
/// [`reassemble_audio_sectors`] for turning the wider read back into
/// `[first, last)`-aligned 2352-byte payloads.
pub struct AudioOffsetPlan {
    pub adj_first: Sector,
    pub adj_last: Sector,
    pub prefix: usize,
    pub suffix: usize,
}

pub fn plan_audio_offset(first: Sector, last: Sector, off_samples: i32) -> Result<AudioOffsetPlan, RipError> {
    let off_bytes = i64::from(off_samples) * BYTES_PER_AUDIO_SAMPLE;
    let sector_length = SECTOR_LENGTH as i64;

    let first_i = i64::from(first.get());
    let last_i = i64::from(last.get());

    let adj_first_i = idiv_floor(first_i * sector_length + off_bytes, sector_length);
    let adj_last_i = idiv_ceil(last_i * sector_length + off_bytes, sector_length);
    let prefix = (off_bytes - (adj_first_i - first_i) * sector_length) as usize;
    let suffix = SECTOR_LENGTH - prefix;

    let adj_first = Sector::try_from(adj_first_i as i32)?;
    let adj_last = Sector::try_from(adj_last_i as i32)?;

    Ok(AudioOffsetPlan { adj_first, adj_last, prefix, suffix })
}

/// Reassembles `[first, last)` 2352-byte audio payloads from the wider
/// `raw_sectors` read (indexed from `plan.adj_first`). The caller is
/// responsible for truncating the result to the track's
/// `length_sectors`; a dangling final sector's errors are discarded by
/// that truncation, per the documented limitation.
pub fn reassemble_audio_sectors(
    first: Sector,
    last: Sector,
    plan: &AudioOffsetPlan,
    raw_sectors: &[Vec<u8>],
) -> Vec<Vec<u8>> {
    let mut out = Vec::with_capacity((last.get() - first.get()).max(0) as usize);

    for i in first.get()..last.get() {
        let idx = (i - plan.adj_first.get()) as usize;
        let mut sector = Vec::with_capacity(SECTOR_LENGTH);
        sector.extend_from_slice(&raw_sectors[idx][plan.prefix..]);
        sector.extend_from_slice(&raw_sectors[idx + 1][..plan.prefix]);
        out.push(sector);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector(n: i32) -> Sector {
        Sector::try_from(n).unwrap()
    }

    #[test]
    fn consensus_terminates_early_once_copies_reached() {
        let mut pass_count = 0u8;
        let first = sector(0);
        let last = sector(3);

        let result = read_absolute_sector_range(
            first,
            last,
            2,
            4,
            16,
            2,
            2,
            |s| {
                if s == first {
                    pass_count += 1;
                }
                Ok(RawRead {
                    sector_data: vec![0xAB; 2352],
                    subchannels_data: vec![0u8; 96],
                    c2_data: vec![0u8; 294],
                })
            },
            |_| Ok(true),
        )
        .unwrap();

        assert_eq!(pass_count, 2);
        for bucket in &result {
            assert_eq!(top_counter(bucket), 2);
        }
    }

    #[test]
    fn below_min_copies_is_consensus_error() {
        let first = sector(0);
        let last = sector(1);
        let mut call = 0u32;

        let err = read_absolute_sector_range(
            first,
            last,
            1,
            2,
            16,
            2,
            2,
            |_| {
                call += 1;
                Ok(RawRead {
                    sector_data: vec![call as u8; 2352],
                    subchannels_data: vec![0u8; 96],
                    c2_data: vec![0u8; 294],
                })
            },
            |_| Ok(true),
        )
        .unwrap_err();

        assert!(matches!(err, RipError::Consensus { .. }));
    }

    #[test]
    fn transport_failure_drops_sector_from_pass_without_poisoning_bucket() {
        let first = sector(0);
        let last = sector(1);
        let mut call = 0u32;

        let result = read_absolute_sector_range(
            first,
            last,
            1,
            3,
            16,
            2,
            2,
            |_| {
                call += 1;
                if call == 2 {
                    return Err(RipError::Transport(std::io::Error::other("drive hiccup")));
                }
                Ok(RawRead {
                    sector_data: vec![0x11; 2352],
                    subchannels_data: vec![0u8; 96],
                    c2_data: vec![0u8; 294],
                })
            },
            |_| Ok(true),
        )
        .unwrap();

        assert_eq!(top_counter(&result[0]), 2);
    }

    #[test]
    fn audio_offset_plan_matches_known_sample() {
        let plan = plan_audio_offset(sector(0), sector(100), 6).unwrap();
        assert_eq!(plan.adj_first, sector(0));
        assert_eq!(plan.adj_last, sector(101));
        assert_eq!(plan.prefix, 24);
        assert_eq!(plan.suffix, 2328);
    }

    #[test]
    fn reassembly_concatenates_suffix_then_prefix() {
        let plan = plan_audio_offset(sector(0), sector(2), 6).unwrap();
        let mut raw0 = vec![0u8; 2352];
        raw0[2351] = 0xAA;
        let mut raw1 = vec![0u8; 2352];
        raw1[0] = 0xBB;
        let mut raw2 = vec![0u8; 2352];
        raw2[0] = 0xCC;
        let raws = vec![raw0, raw1, raw2];

        let out = reassemble_audio_sectors(sector(0), sector(2), &plan, &raws);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 2352);
        assert_eq!(out[0][2351 - plan.prefix], 0xAA);
        assert_eq!(out[0][2352 - plan.prefix], 0xBB);
    }

    #[test]
    fn bad_sectors_are_those_with_empty_buckets() {
        let buckets = vec![
            vec![ExtractedSector {
                sector_data: vec![0u8; 4],
                counter: 2,
                ever_c2_error: false,
                ever_subchannel_crc_invalid: false,
            }],
            Vec::new(),
        ];
        let bad = identify_bad_sectors(sector(10), &buckets);
        assert_eq!(bad, vec![sector(11)]);
    }
}
