//! Parsers for the output of discovery commands
//!
//! Each parser documents the grammar of the command it consumes and fails with
//! a `ParseError` instead of guessing when the output does not match.

use std::fmt;

use serde::Deserialize;
use tracing::trace;

use crate::{DriveLetter, Filesystem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A line that does not follow the command's grammar
    MalformedLine { line: String, reason: String },

    /// A structured listing that could not be decoded
    MalformedListing(String),

    /// A serial number that does not encode a volume id
    InvalidSerial(String),

    /// The listing did not contain the requested device
    DeviceNotListed(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MalformedLine { line, reason } => {
                write!(f, "malformed line '{}': {}", line, reason)
            }
            ParseError::MalformedListing(reason) => write!(f, "malformed listing: {}", reason),
            ParseError::InvalidSerial(serial) => {
                write!(f, "serial '{}' does not encode a volume id", serial)
            }
            ParseError::DeviceNotListed(device) => {
                write!(f, "device '{}' not present in listing", device)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Mounted block device with a journaling filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub name: String,
    pub filesystem: Filesystem,
    pub mountpoint: String,
}

fn strip_tree_markers(line: &str) -> &str {
    line.trim_start_matches(|c: char| c == '|' || c == '`' || c == '-' || c.is_whitespace())
}

#[derive(Debug, Deserialize)]
struct BlockDeviceListing {
    blockdevices: Vec<ListedDevice>,
}

#[derive(Debug, Deserialize)]
struct ListedDevice {
    name: String,

    #[serde(default)]
    fstype: Option<String>,

    #[serde(default)]
    mountpoint: Option<String>,

    #[serde(default)]
    children: Vec<ListedDevice>,
}

fn collect_mounted(device: ListedDevice, devices: &mut Vec<BlockDevice>) {
    let ListedDevice {
        name,
        fstype,
        mountpoint,
        children,
    } = device;

    if let (Some(fstype), Some(mountpoint)) = (fstype, mountpoint)
        && let Ok(filesystem) = fstype.parse::<Filesystem>()
    {
        trace!("block device {name} ({filesystem}) at {mountpoint}");
        devices.push(BlockDevice {
            name,
            filesystem,
            mountpoint,
        });
    }

    for child in children {
        collect_mounted(child, devices);
    }
}

/// Parse `lsblk -J -o NAME,FSTYPE,MOUNTPOINT`
///
/// ```text
/// { "blockdevices": [ { "name", "fstype", "mountpoint", "children": [ ... ] } ] }
/// ```
///
/// Disks come before their partitions. Only devices formatted ext4/xfs and
/// currently mounted are returned; disks without a filesystem, swap and
/// unmounted volumes are skipped. Mount paths are taken verbatim, spaces
/// included. Empty output yields no devices.
pub fn parse_block_devices(output: &str) -> Result<Vec<BlockDevice>, ParseError> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }

    let listing: BlockDeviceListing = serde_json::from_str(output)
        .map_err(|e| ParseError::MalformedListing(e.to_string()))?;

    let mut devices = Vec::new();
    for device in listing.blockdevices {
        collect_mounted(device, &mut devices);
    }
    Ok(devices)
}

/// Parse `Get-Partition | Select-Object -ExpandProperty DriveLetter`
///
/// One drive letter per line, CRLF terminated. Partitions without a letter
/// (system reserved, recovery) print a blank line or a NUL character and are
/// skipped.
pub fn parse_drive_letters(output: &str) -> Result<Vec<DriveLetter>, ParseError> {
    let mut letters = Vec::new();

    for line in output.lines() {
        let line = line.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if line.is_empty() {
            continue;
        }

        let letter = line
            .parse::<DriveLetter>()
            .map_err(|reason| ParseError::MalformedLine {
                line: line.to_string(),
                reason,
            })?;

        if !letters.contains(&letter) {
            letters.push(letter);
        }
    }

    Ok(letters)
}

/// Turn a disk serial into a volume id
///
/// ```text
/// serial := "vol" ALNUM+ ["_" ANY*]
/// ```
///
/// The volume id is `vol-` followed by the alphanumeric remainder.
pub fn parse_volume_serial(output: &str) -> Result<String, ParseError> {
    let serial = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();

    let token = serial.split('_').next().unwrap_or_default();

    match token.strip_prefix("vol") {
        Some(rest) if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()) => {
            Ok(format!("vol-{rest}"))
        }
        _ => Err(ParseError::InvalidSerial(serial.to_string())),
    }
}

/// Find `device` in `lsblk -d -n -o NAME,SERIAL` and decode its serial
///
/// ```text
/// line := NAME [SERIAL]
/// ```
pub fn parse_serial_listing(output: &str, device: &str) -> Result<String, ParseError> {
    for line in output.lines() {
        let mut fields = strip_tree_markers(line).split_whitespace();
        if fields.next() != Some(device) {
            continue;
        }

        let serial = fields.next().unwrap_or_default();
        return parse_volume_serial(serial);
    }

    Err(ParseError::DeviceNotListed(device.to_string()))
}
