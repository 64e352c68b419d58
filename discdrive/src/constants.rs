/// The number of frames per second of audio.
pub const FRAMES_PER_SECOND: u8 = 75;

/// The number of frames per minute of audio.
pub const FRAMES_PER_MINUTE: u16 = FRAMES_PER_SECOND as u16 * 60;

/// Frames between the start of the disc and the first playable sector.
///
/// CDs are designed so that the first frame of playable audio actually
/// occurs at 00:02:00 (2 seconds in), meaning there are 150 frames of
/// gap between the disc start at 00:00:00 and the first addressable
/// sector.
pub const PREGAP_OFFSET: u8 = FRAMES_PER_SECOND * 2;

/// Raw bytes in one sector as read off the disc (2352-byte CD-DA / Mode
/// 1/2 raw frame, independent of how much of it is user data).
pub const SECTOR_LENGTH: usize = 2352;

/// Raw bytes of one subchannel's worth of data in a sector (P..W).
pub const SUBCHANNEL_LENGTH: usize = 12;

/// Number of interleaved subchannels (P, Q, R, S, T, U, V, W).
pub const SUBCHANNEL_COUNT: usize = 8;

/// Total interleaved subchannel bytes per sector, as returned by the
/// drive and as stored in CUE/MDF sidecar data: `8 * 12`.
pub const SUBCHANNELS_LENGTH: usize = SUBCHANNEL_COUNT * SUBCHANNEL_LENGTH;

/// C2 error-pointer bytes per sector: one bit per raw byte.
pub const C2_LENGTH: usize = SECTOR_LENGTH / 8;

/// Lead-in length, in sectors, for every session.
pub const LEAD_IN_LENGTH_SECTORS: u32 = 4500;

/// Lead-out length, in sectors, for the first session on the disc.
pub const FIRST_LEAD_OUT_LENGTH_SECTORS: u32 = 6750;

/// Lead-out length, in sectors, for every session after the first.
pub const SUBSEQUENT_LEAD_OUT_LENGTH_SECTORS: u32 = 2250;

/// Stereo 16-bit PCM sample size in bytes, used to convert a read-offset
/// correction expressed in samples to one expressed in bytes.
pub const BYTES_PER_AUDIO_SAMPLE: i64 = 4;
