//! Linux `SG_IO` ioctl transport: the raw `sg_io_hdr_t` struct and the
//! glue that turns a [`Command`](crate::commands::Command) into an
//! ioctl call and an interpreted result.
//!
//! Many of the struct fields below are straight from
//! `linux/include/scsi/sg.h`.

use std::ffi::{c_uchar, c_void};
use std::fs::File;
use std::os::fd::AsRawFd;

use nix::ioctl_read_bad;
use thiserror::Error;

use crate::commands::Command;
use crate::error::SenseError;

use super::DEFAULT_COMMAND_TIMEOUT;

const SG_IO: u64 = 0x2285;

/// A fixed-format sense buffer is at most this many bytes; `sbp`/
/// `sb_len_wr` never need more for the sense data this crate decodes.
const SENSE_BUFFER_LEN: usize = 32;

#[repr(i32)]
#[allow(dead_code)]
pub enum DxferDirection {
    /// No data transfer, e.g. TEST UNIT READY.
    None = -1,
    /// Host to device.
    ToDev = -2,
    /// Device to host.
    FromDev = -3,
    ToFromDev = -4,
    Unknown = -5,
}

#[repr(C)]
pub struct SgIoHeader {
    pub interface_id: i32,
    pub dxfer_direction: DxferDirection,
    pub cmd_len: u8,
    pub mx_sb_len: u8,
    pub iovec_count: u16,
    pub dxfer_len: u32,
    pub dxferp: *mut c_void,
    pub cmdp: *mut c_uchar,
    pub sbp: *mut c_uchar,
    pub timeout: u32,
    pub flags: u32,
    pub pack_id: i32,
    pub usr_ptr: *mut c_void,
    pub status: u8,
    pub masked_status: u8,
    pub msg_status: u8,
    pub sb_len_wr: u8,
    pub host_status: u16,
    pub driver_status: u16,
    pub resid: i32,
    pub duration: u32,
    pub info: u32,
}

impl SgIoHeader {
    pub fn new(
        dxfer_direction: DxferDirection,
        cdb_bytes: &mut [u8],
        data_buf: &mut [u8],
        sense_buf: &mut [u8],
    ) -> Self {
        SgIoHeader {
            interface_id: 'S' as i32,
            dxfer_direction,
            cmd_len: cdb_bytes.len() as u8,
            mx_sb_len: sense_buf.len() as u8,
            iovec_count: 0,
            dxfer_len: data_buf.len() as u32,
            dxferp: data_buf.as_mut_ptr() as *mut c_void,
            cmdp: cdb_bytes.as_mut_ptr(),
            sbp: sense_buf.as_mut_ptr(),
            timeout: DEFAULT_COMMAND_TIMEOUT.as_millis() as u32,
            flags: 0,
            pack_id: 0,
            usr_ptr: std::ptr::null_mut(),
            status: 0,
            masked_status: 0,
            msg_status: 0,
            sb_len_wr: 0,
            host_status: 0,
            driver_status: 0,
            resid: 0,
            duration: 0,
            info: 0,
        }
    }
}

ioctl_read_bad!(ioctl_sg_io, SG_IO, SgIoHeader);

#[derive(Debug, Error)]
pub enum SCSIError {
    #[error("SG_IO ioctl failed: {0}")]
    Ioctl(#[from] nix::Error),
    #[error("adapter/driver reported failure (host_status={host_status:#06x}, driver_status={driver_status:#06x})")]
    HostOrDriverFailure { host_status: u16, driver_status: u16 },
    #[error(transparent)]
    Sense(#[from] SenseError),
    #[error("CHECK CONDITION with sense key {sk:#x} ASC {asc:#x} ASCQ {ascq:#x} is not in the known taxonomy")]
    UnrecognizedSense { sk: u8, asc: u8, ascq: u8 },
}

/// SCSI status codes relevant here; everything else is treated as GOOD.
const STATUS_CHECK_CONDITION: u8 = 0x02;

fn decode_fixed_format_sense(sense: &[u8]) -> Result<(), SCSIError> {
    if sense.len() < 14 {
        return Ok(());
    }
    let response_code = sense[0] & 0x7F;
    if response_code != 0x70 && response_code != 0x71 {
        return Ok(());
    }
    let sk = sense[2] & 0x0F;
    let asc = sense[12];
    let ascq = sense[13];
    if sk == 0 {
        return Ok(());
    }
    match SenseError::from_codes(sk, asc, ascq) {
        Some(err) => Err(SCSIError::Sense(err)),
        None => Err(SCSIError::UnrecognizedSense { sk, asc, ascq }),
    }
}

/// Sends `cmd`'s CDB to `file` via `SG_IO`, and returns the raw response
/// bytes (truncated to however many the adapter actually transferred).
pub fn run_sgio<Cmd: Command<N>, const N: usize>(
    file: &File,
    cmd: Cmd,
    direction: DxferDirection,
) -> Result<Vec<u8>, SCSIError> {
    let mut cdb_bytes = cmd.as_cdb();
    let mut data = vec![0u8; cmd.allocation_len()];
    let mut sense = [0u8; SENSE_BUFFER_LEN];

    let mut header = SgIoHeader::new(direction, &mut cdb_bytes, &mut data, &mut sense);

    unsafe {
        ioctl_sg_io(file.as_raw_fd(), &mut header)?;
    }

    if header.host_status != 0 || header.driver_status != 0 {
        return Err(SCSIError::HostOrDriverFailure {
            host_status: header.host_status,
            driver_status: header.driver_status,
        });
    }

    if header.status == STATUS_CHECK_CONDITION {
        decode_fixed_format_sense(&sense[..header.sb_len_wr as usize])?;
    }

    let transferred = data.len().saturating_sub(header.resid.max(0) as usize);
    data.truncate(transferred);
    Ok(data)
}
