//! Bit-accurate CD-format disc extraction.
//!
//! This crate is split along the four subsystems of the ripper: the
//! device command codec ([`commands`]), the disc model builder
//! ([`disc`]), the extraction engine ([`extract`]), and the image
//! serializers ([`image`]). [`drive`] ties the command layer to a real
//! device handle; [`emulator`] provides the same contract against a
//! previously written ODI file.

pub mod addressing;
pub mod commands;
pub mod constants;
pub mod disc;
pub mod error;
pub mod extract;
pub mod image;
pub mod iso9660;
pub mod offset;
pub mod subchannel;
pub mod transport;
pub mod util;

#[cfg(target_os = "linux")]
pub mod device;
#[cfg(target_os = "linux")]
pub mod drive;
#[cfg(target_os = "linux")]
pub mod emulator;

pub use disc::DiscInfo;
pub use error::RipError;
