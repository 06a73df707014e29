//! Sizing policy and OS-level extension scripts

use crate::command::{CommandDocument, CommandParameters};
use crate::resizer::volume::DeviceName;
use crate::{DiskDescriptor, DriveLetter, Filesystem, Platform};

/// New volume size in GB, `ceil(threshold * current / desired)`
///
/// The alarm threshold stands in for the current utilisation, so the result
/// brings a disk that just crossed the threshold down to the desired level.
/// `None` when the product does not fit in a `u64`.
pub fn target_size(threshold: u8, current_gb: u64, desired: u8) -> Option<u64> {
    let desired = u64::from(desired.max(1));
    u64::from(threshold)
        .checked_mul(current_gb)
        .map(|scaled| scaled.div_ceil(desired))
}

/// Grows the partition and filesystem of a resized disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsExtension {
    Windows {
        drive: DriveLetter,
    },
    Linux {
        device: Option<DeviceName>,
        raw_device: String,
        filesystem: Filesystem,
        mount_path: String,
    },
}

impl OsExtension {
    pub fn for_disk(disk: &DiskDescriptor) -> Self {
        match disk {
            DiskDescriptor::Windows { drive_letter } => OsExtension::Windows {
                drive: *drive_letter,
            },
            DiskDescriptor::Linux {
                device,
                filesystem,
                mount_path,
            } => OsExtension::Linux {
                device: DeviceName::parse(device),
                raw_device: device.clone(),
                filesystem: *filesystem,
                mount_path: mount_path.clone(),
            },
        }
    }

    /// Partition name as shown in the narrative
    pub fn label(&self) -> String {
        match self {
            OsExtension::Windows { drive } => drive.to_string(),
            OsExtension::Linux { raw_device, .. } => raw_device.clone(),
        }
    }

    pub fn document(&self) -> CommandDocument {
        match self {
            OsExtension::Windows { .. } => CommandDocument::script_for(Platform::Windows),
            OsExtension::Linux { .. } => CommandDocument::script_for(Platform::Linux),
        }
    }

    /// Script lines, starting with an in-band wait for the resize to settle
    pub fn script(&self, delay_secs: u64) -> CommandParameters {
        match self {
            OsExtension::Windows { drive } => CommandParameters::commands([
                format!("Start-Sleep -s {delay_secs}"),
                format!(
                    "$a = Get-PartitionSupportedSize -DriveLetter {drive} | Select-Object -ExpandProperty SizeMax"
                ),
                "$b = [math]::floor($a/1024)".to_string(),
                format!("iex \"Resize-Partition -DriveLetter {drive} -Size $($b)KB\""),
            ]),
            OsExtension::Linux {
                device,
                raw_device,
                filesystem,
                mount_path,
            } => {
                let mut lines = vec![format!("sleep {delay_secs}")];

                if let Some(device) = device
                    && let Some(partition) = device.partition()
                {
                    lines.push(format!("growpart /dev/{} {}", device.parent(), partition));
                }

                lines.push(match filesystem {
                    Filesystem::Ext4 => format!("resize2fs /dev/{raw_device}"),
                    Filesystem::Xfs => format!("xfs_growfs -d {mount_path}"),
                });

                CommandParameters::commands(lines)
            }
        }
    }
}
