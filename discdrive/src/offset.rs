//! Per-drive read-offset correction lookup, keyed by trimmed
//! `vendor|product` (component supporting §3's `DriveInfo`).
//!
//! The table is a small, hand-maintained sample of widely documented
//! offsets; it is not meant to be exhaustive; absence from the table
//! means the correction is simply unknown (callers then treat the
//! correction as `0` or refuse offset-sensitive audio extraction, per
//! their own policy).

/// `(vendor|product, read_offset_correction_samples)`.
const KNOWN_OFFSETS: &[(&str, i32)] = &[
    ("PLEXTOR|CD-R PX-W4824A", 98),
    ("PLEXTOR|DVDR PX-716A", 30),
    ("LITE-ON|DVDRW SHM-165P6S", 6),
    ("ASUS|DRW-24B1ST", 667),
    ("HL-DT-ST|DVDRAM GH22NS50", 6),
    ("TSSTcorp|CDDVDW SH-S223C", 6),
    ("PIONEER|DVD-RW DVR-216D", 667),
    ("SONY|DVD RW AW-G170A", 48),
];

/// Looks up the read-offset correction for `vendor|product`, trimming
/// both before the match. Drive firmware pads these fields with
/// trailing spaces, so trimming is required for a hit.
pub fn lookup_read_offset_correction(vendor: &str, product: &str) -> Option<i32> {
    let key = format!("{}|{}", vendor.trim(), product.trim());
    KNOWN_OFFSETS
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(&key))
        .map(|(_, offset)| *offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vendor_product_resolves() {
        assert_eq!(lookup_read_offset_correction("PLEXTOR", "CD-R PX-W4824A"), Some(98));
        assert_eq!(lookup_read_offset_correction("  PLEXTOR  ", "  CD-R PX-W4824A  "), Some(98));
    }

    #[test]
    fn unknown_vendor_product_is_none() {
        assert_eq!(lookup_read_offset_correction("NOBODY", "MADE THIS UP"), None);
    }
}
