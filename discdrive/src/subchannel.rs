//! Subchannel P-W deinterleave and subchannel-Q CRC validation
//! (component F).
//!
//! A drive returns the 96 subchannel bytes for one sector pre-interleaved:
//! byte `k` of the raw block packs one bit from each of the eight P..W
//! channels, MSB = P through LSB = W. Deinterleaving regroups those bits
//! back into eight 12-byte channels.

use crate::constants::{SUBCHANNELS_LENGTH, SUBCHANNEL_COUNT, SUBCHANNEL_LENGTH};
use crate::util::crc16;

pub type Subchannels = [u8; SUBCHANNELS_LENGTH];
pub type Channel = [u8; SUBCHANNEL_LENGTH];

/// Index of the Q channel among the eight deinterleaved channels.
pub const CHANNEL_Q: usize = 1;

/// Splits a raw 96-byte interleaved subchannel block into the eight
/// 12-byte P..W channels.
pub fn deinterleave(raw: &Subchannels) -> [Channel; SUBCHANNEL_COUNT] {
    let mut channels = [[0u8; SUBCHANNEL_LENGTH]; SUBCHANNEL_COUNT];

    for (channel_index, channel) in channels.iter_mut().enumerate() {
        let bit_shift = 7 - channel_index;
        for (byte_index, out_byte) in channel.iter_mut().enumerate() {
            let mut byte = 0u8;
            for (k, raw_byte) in raw[byte_index * 8..byte_index * 8 + 8].iter().enumerate() {
                let bit = (raw_byte >> bit_shift) & 1;
                byte |= bit << (7 - k);
            }
            *out_byte = byte;
        }
    }

    channels
}

/// Inverse of [`deinterleave`]: packs eight 12-byte P..W channels back
/// into one raw 96-byte interleaved block.
pub fn reinterleave(channels: &[Channel; SUBCHANNEL_COUNT]) -> Subchannels {
    let mut raw = [0u8; SUBCHANNELS_LENGTH];

    for (channel_index, channel) in channels.iter().enumerate() {
        let bit_shift = 7 - channel_index;
        for (byte_index, &channel_byte) in channel.iter().enumerate() {
            for k in 0..8 {
                let bit = (channel_byte >> (7 - k)) & 1;
                raw[byte_index * 8 + k] |= bit << bit_shift;
            }
        }
    }

    raw
}

/// Computes the CRC-16 over a Q channel's first 10 bytes and compares it
/// to the big-endian CRC stored in its last 2 bytes.
pub fn q_crc_valid(q: &Channel) -> bool {
    let computed = crc16(&q[..10]);
    let stored = u16::from_be_bytes([q[10], q[11]]);
    computed == stored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deinterleave_reinterleave_round_trip() {
        let mut raw = [0u8; SUBCHANNELS_LENGTH];
        for (i, byte) in raw.iter_mut().enumerate() {
            *byte = (i * 37 + 11) as u8;
        }

        let channels = deinterleave(&raw);
        let back = reinterleave(&channels);
        assert_eq!(raw, back);
    }

    #[test]
    fn q_crc_matches_known_sample() {
        let mut q = [0u8; SUBCHANNEL_LENGTH];
        q[..10].copy_from_slice(&[0x01, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00]);
        let crc = 0x9683u16.to_be_bytes();
        q[10] = crc[0];
        q[11] = crc[1];

        assert!(q_crc_valid(&q));

        q[11] ^= 0xFF;
        assert!(!q_crc_valid(&q));
    }
}
