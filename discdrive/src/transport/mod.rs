//! The device transport: an opaque handle plus the ioctl call that
//! sends a command block and optional data buffer, returning a status
//! byte and sense bytes (component B).
//!
//! On Linux this is `SG_IO`; other platforms would plug in here behind
//! the same [`Transport`] trait without touching the command codec.

use std::fs::File;
use std::time::Duration;

#[cfg(target_os = "linux")]
pub mod sgio;

#[cfg(target_os = "linux")]
pub use sgio::{DxferDirection, SCSIError};

use crate::commands::{Command, ExecuteError};

/// Per-command timeout applied by the transport. Not currently
/// user-overridable; see the open design question this constant
/// resolves.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends a single MMC command over an open device handle and parses
/// its response.
pub trait Transport {
    fn execute<Cmd: Command<N>, const N: usize>(
        &self,
        cmd: Cmd,
    ) -> Result<Cmd::Response, ExecuteError<Cmd, N>>;
}

#[cfg(target_os = "linux")]
impl Transport for File {
    fn execute<Cmd: Command<N>, const N: usize>(
        &self,
        cmd: Cmd,
    ) -> Result<Cmd::Response, ExecuteError<Cmd, N>> {
        cmd.execute(self)
    }
}
