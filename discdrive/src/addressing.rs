use std::fmt;

use derive_more::{Add, AddAssign, Into, Neg, Sub, SubAssign};
use thiserror::Error;

use crate::constants::{FRAMES_PER_MINUTE, FRAMES_PER_SECOND, PREGAP_OFFSET};
use crate::util::idiv_floor;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorError {
    #[error("sector {0} is outside the addressable range {min}..={max}", min = Sector::MIN.0, max = Sector::MAX.0)]
    OutOfRange(i32),
    #[error("MSF field {field} value {value} is out of range")]
    InvalidField { field: &'static str, value: u8 },
}

/// A signed absolute sector index.
///
/// Index 0 sits at MSF `00:02:00`, 150 frames (2 s) into the disc; the
/// sectors before it, down to [`Sector::MIN`], are the pregap / HTOA
/// region. [`Sector::MAX`] is the highest sector addressable on a
/// 99-minute disc: `(99 + 1) * 60 * 75 - 1 - PREGAP_OFFSET`.
#[repr(transparent)]
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Into, Add, AddAssign, Sub, SubAssign, Neg,
)]
pub struct Sector(i32);

impl Sector {
    pub const MIN: Sector = Sector(-(PREGAP_OFFSET as i32));
    pub const MAX: Sector = Sector(100 * FRAMES_PER_MINUTE as i32 - 1 - PREGAP_OFFSET as i32);
    pub const ZERO: Sector = Sector(0);

    pub const fn get(self) -> i32 {
        self.0
    }
}

impl TryFrom<i32> for Sector {
    type Error = SectorError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let sector = Self(value);
        if !(Self::MIN..=Self::MAX).contains(&sector) {
            return Err(SectorError::OutOfRange(value));
        }
        Ok(sector)
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Minute/Second/Frame position on the disc (75 frames per second).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectorAddress {
    pub m: u8,
    pub s: u8,
    pub f: u8,
}

impl SectorAddress {
    pub fn new(m: u8, s: u8, f: u8) -> Result<Self, SectorError> {
        if s >= 60 {
            return Err(SectorError::InvalidField { field: "s", value: s });
        }
        if f >= FRAMES_PER_SECOND {
            return Err(SectorError::InvalidField { field: "f", value: f });
        }
        Ok(Self { m, s, f })
    }
}

impl fmt::Display for SectorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.m, self.s, self.f)
    }
}

/// `sector = (m*60 + s)*75 + f - PREGAP_OFFSET`.
pub fn get_sector_from_address(addr: SectorAddress) -> Result<Sector, SectorError> {
    let raw = (i32::from(addr.m) * 60 + i32::from(addr.s)) * i32::from(FRAMES_PER_SECOND)
        + i32::from(addr.f)
        - i32::from(PREGAP_OFFSET);
    Sector::try_from(raw)
}

/// Inverse of [`get_sector_from_address`]. Total over the addressable
/// range: `100 * 60 * 75` frame combinations exactly cover
/// `Sector::MIN..=Sector::MAX`.
pub fn get_address_from_sector(sector: Sector) -> SectorAddress {
    let mut raw = sector.0 + i32::from(PREGAP_OFFSET);
    let m = idiv_floor(i64::from(raw), i64::from(FRAMES_PER_MINUTE)) as i32;
    raw -= m * i32::from(FRAMES_PER_MINUTE);
    let s = raw / i32::from(FRAMES_PER_SECOND);
    raw -= s * i32::from(FRAMES_PER_SECOND);
    SectorAddress {
        m: m as u8,
        s: s as u8,
        f: raw as u8,
    }
}

impl TryFrom<SectorAddress> for Sector {
    type Error = SectorError;

    fn try_from(value: SectorAddress) -> Result<Self, Self::Error> {
        get_sector_from_address(value)
    }
}

impl From<Sector> for SectorAddress {
    fn from(value: Sector) -> Self {
        get_address_from_sector(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_whole_range() {
        for raw in [Sector::MIN.0, -1, 0, 1, 12345, Sector::MAX.0] {
            let sector = Sector::try_from(raw).unwrap();
            let addr = SectorAddress::from(sector);
            let back = Sector::try_from(addr).unwrap();
            assert_eq!(back, sector);
        }
    }

    #[test]
    fn concrete_msf_arithmetic() {
        assert_eq!(
            get_sector_from_address(SectorAddress::new(0, 2, 0).unwrap()).unwrap(),
            Sector::ZERO
        );
        assert_eq!(
            get_sector_from_address(SectorAddress::new(0, 0, 0).unwrap()).unwrap(),
            Sector::try_from(-150).unwrap()
        );
        assert_eq!(
            get_sector_from_address(SectorAddress::new(79, 59, 74).unwrap()).unwrap(),
            Sector::try_from(359_849).unwrap()
        );
        assert_eq!(
            get_address_from_sector(Sector::ZERO),
            SectorAddress { m: 0, s: 2, f: 0 }
        );
        assert!(Sector::try_from(-151).is_err());
        assert_eq!(Sector::MAX.get(), 449_849);
    }

    #[test]
    fn out_of_range_rejected() {
        assert!(Sector::try_from(Sector::MAX.0 + 1).is_err());
        assert!(Sector::try_from(Sector::MIN.0 - 1).is_err());
    }
}
