//! Drive auto-discovery: sysfs scan for optical block devices, used by
//! the CLI's `--drive=auto` mode (component D support).

use std::fs::{self, File};
use std::io;
use std::path::Path;

use nix::fcntl::{OFlag, open};
use nix::sys::stat::Mode;

use crate::commands::inquiry::{Inquiry, InquiryResponse, Version};
use crate::error::RipError;
use crate::transport::DxferDirection;
use crate::transport::sgio::run_sgio;

/// One optical device node discovered on the system, with its identity
/// already read via INQUIRY.
#[allow(dead_code)]
#[derive(Debug)]
pub struct DiscoveredDrive {
    pub devnode: String,
    pub removable_medium: bool,
    pub version: Version,
    pub vendor: String,
    pub product: String,
    pub revision: String,
}

const OPTICAL_DEVICE_TYPE: &str = "5";

fn scan_sysfs() -> io::Result<Vec<String>> {
    let mut devnodes = Vec::new();
    let base = Path::new("/sys/class/block");

    for entry in fs::read_dir(base)? {
        let Ok(entry) = entry else { continue };
        let name = entry.file_name().to_string_lossy().into_owned();
        let type_path = entry.path().join("device").join("type");

        let Ok(dev_type) = fs::read_to_string(&type_path) else {
            continue;
        };

        if dev_type.trim() == OPTICAL_DEVICE_TYPE {
            devnodes.push(format!("/dev/{name}"));
        }
    }

    Ok(devnodes)
}

fn open_read_only(device: &str) -> io::Result<File> {
    let fd = open(device, OFlag::O_RDONLY | OFlag::O_NONBLOCK, Mode::empty())?;
    Ok(File::from(fd))
}

/// Scans `/sys/class/block` for optical (type 5) devices, opens each
/// and identifies it via INQUIRY. Devices that fail to open or respond
/// are silently skipped rather than aborting the whole scan.
pub fn discover_drives() -> Result<Vec<DiscoveredDrive>, RipError> {
    let mut drives = Vec::new();

    for devnode in scan_sysfs().map_err(RipError::Transport)? {
        let Ok(file) = open_read_only(&devnode) else {
            continue;
        };

        let inquiry = Inquiry::new(false, 0, 0.into());
        let Ok(bytes) = run_sgio(&file, inquiry, DxferDirection::FromDev) else {
            continue;
        };
        let Ok(response) = InquiryResponse::try_from(bytes) else {
            continue;
        };

        drives.push(DiscoveredDrive {
            devnode,
            removable_medium: response.removable_media,
            version: response.version,
            vendor: response.t10_vendor_identification,
            product: response.product_identification,
            revision: response.product_revision_level,
        });
    }

    Ok(drives)
}
