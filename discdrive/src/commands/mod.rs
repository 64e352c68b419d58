pub mod inquiry;
pub mod mode_page;
pub mod read_cd;
pub mod read_track_info;
pub mod start_stop_unit;
pub mod test_unit_ready;
pub mod toc;

use std::fs::File;

use derive_more::{Debug, From, Into};
use thiserror::Error;

#[cfg(target_os = "linux")]
use crate::transport::sgio::{DxferDirection, SCSIError, run_sgio};

#[derive(Debug, Error)]
pub enum ExecuteError<Cmd: Command<N>, const N: usize> {
    #[cfg(target_os = "linux")]
    #[error(transparent)]
    SCSIError(#[from] SCSIError),
    #[error("failed to parse the response from the command")]
    ParseError(#[source] <Cmd::Response as TryFrom<Vec<u8>>>::Error),
}

/// A single MMC command: its CDB encoding, allocation length and
/// response type.
pub trait Command<const CDB_LEN: usize>: Sized {
    /// OPERATION CODE for this command.
    /// ```text
    ///   7   6   5   4   3   2   1   0
    /// +---+---+---+---+---+---+---+---+
    /// | GROUPCODE |    COMMAND CODE   |
    /// +---+---+---+---+---+---+---+---+
    /// ```
    const OP_CODE: u8;

    type Response: TryFrom<Vec<u8>>;

    fn as_cdb(&self) -> [u8; CDB_LEN];

    fn allocation_len(&self) -> usize;

    #[cfg(target_os = "linux")]
    fn execute(self, file: &File) -> Result<Self::Response, ExecuteError<Self, CDB_LEN>> {
        let bytes = run_sgio(file, self, DxferDirection::FromDev)?;
        <Self::Response as TryFrom<Vec<u8>>>::try_from(bytes).map_err(ExecuteError::ParseError)
    }
}

/// CONTROL byte newtype.
/// ```text
///   7   6   5   4   3   2   1   0
/// +---+---+---+---+---+---+---+---+
/// |   VS  |  Reserved | N | O | L |
/// +---+---+---+---+---+---+---+---+
/// ```
/// * **VS** - Vendor Specific
/// * **N**  - NACA (Normal Auto Contingent Allegiance)
/// * **O**  - Obsolete
/// * **L**  - Link
#[repr(transparent)]
#[derive(Debug, Clone, Copy, From, Into)]
pub struct Control(u8);
