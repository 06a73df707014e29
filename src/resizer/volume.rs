//! Mapping guest devices back to cloud volume ids
//!
//! Three addressing schemes are in use, tried in this order:
//!
//! | Variant         | Applies to                | Source of the volume id                      |
//! |-----------------|---------------------------|----------------------------------------------|
//! | `WindowsVolume` | any windows drive         | disk serial behind the drive letter          |
//! | `NvmeVolume`    | `nvme<c>n<ns>[p<part>]`   | serial of the NVMe namespace (`lsblk`)       |
//! | `LegacyVolume`  | `xvd<l>[n]`, `sd<l>[n]`   | block-device mapping entry with letter `<l>` |
//!
//! Serial-based lookups rely on the serial being the volume id without its
//! dash, e.g. `vol0123abcd` for `vol-0123abcd`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::command::parse::{ParseError, parse_serial_listing, parse_volume_serial};
use crate::command::{CommandDocument, CommandOutcome, RemoteCommandRunner, scripts};
use crate::services::{InstanceService, ServiceError};
use crate::{DiskDescriptor, DriveLetter, Platform};

// Single-letter legacy names only. Two-letter attachments such as `xvdba`
// match no scheme and are left unresolved.
static DEVICE_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^(?:/dev/)?(?:nvme(?P<controller>\d+)n(?P<namespace>\d+)(?:p(?P<nvme_part>\d+))?|(?P<kind>xvd|sd)(?P<letter>[a-z])(?P<part>\d+)?)$",
    )
    .ok()
});

/// Opaque cloud volume identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeId(String);

impl VolumeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Linux block device name split into its addressing parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceName {
    Nvme {
        controller: u32,
        namespace: u32,
        partition: Option<u32>,
    },
    Xen {
        letter: char,
        partition: Option<u32>,
    },
    Scsi {
        letter: char,
        partition: Option<u32>,
    },
}

impl DeviceName {
    /// Parse `nvme1n1p2`, `xvdf`, `sdb1`, with or without `/dev/`
    pub fn parse(device: &str) -> Option<DeviceName> {
        let captures = DEVICE_NAME.as_ref()?.captures(device.trim())?;
        let number = |name: &str| captures.name(name).and_then(|m| m.as_str().parse().ok());

        if let Some(kind) = captures.name("kind") {
            let letter = captures.name("letter")?.as_str().chars().next()?;
            let partition = number("part");
            return Some(match kind.as_str() {
                "xvd" => DeviceName::Xen { letter, partition },
                _ => DeviceName::Scsi { letter, partition },
            });
        }

        Some(DeviceName::Nvme {
            controller: number("controller")?,
            namespace: number("namespace")?,
            partition: number("nvme_part"),
        })
    }

    /// Whole-disk device, e.g. `nvme1n1` for `nvme1n1p2`
    pub fn parent(&self) -> String {
        match self {
            DeviceName::Nvme {
                controller,
                namespace,
                ..
            } => format!("nvme{controller}n{namespace}"),
            DeviceName::Xen { letter, .. } => format!("xvd{letter}"),
            DeviceName::Scsi { letter, .. } => format!("sd{letter}"),
        }
    }

    pub fn partition(&self) -> Option<u32> {
        match self {
            DeviceName::Nvme { partition, .. }
            | DeviceName::Xen { partition, .. }
            | DeviceName::Scsi { partition, .. } => *partition,
        }
    }

    /// Letter shared by the `xvd` and `sd` spellings of a legacy device
    pub fn mapping_letter(&self) -> Option<char> {
        match self {
            DeviceName::Nvme { .. } => None,
            DeviceName::Xen { letter, .. } | DeviceName::Scsi { letter, .. } => Some(*letter),
        }
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parent = self.parent();
        match (self, self.partition()) {
            (DeviceName::Nvme { .. }, Some(partition)) => write!(f, "{parent}p{partition}"),
            (_, Some(partition)) => write!(f, "{parent}{partition}"),
            (_, None) => f.write_str(&parent),
        }
    }
}

#[derive(Debug)]
pub enum ResolveError {
    /// Device name matches none of the supported addressing schemes
    UnrecognizedDevice(String),
    CommandFailed(CommandOutcome),
    Parse(ParseError),
    Lookup(ServiceError),
    /// No block-device mapping entry uses the device letter
    NotMapped(char),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::UnrecognizedDevice(device) => {
                write!(f, "unrecognized device name '{}'", device)
            }
            ResolveError::CommandFailed(outcome) => {
                write!(f, "serial lookup ended {:?}", outcome)
            }
            ResolveError::Parse(e) => write!(f, "{}", e),
            ResolveError::Lookup(e) => write!(f, "block-device mapping lookup failed: {}", e),
            ResolveError::NotMapped(letter) => {
                write!(f, "no block-device mapping for xvd{0} or sd{0}", letter)
            }
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<ParseError> for ResolveError {
    fn from(err: ParseError) -> Self {
        ResolveError::Parse(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeResolver {
    WindowsVolume { drive: DriveLetter },
    NvmeVolume { device: DeviceName },
    LegacyVolume { letter: char },
}

impl VolumeResolver {
    pub fn classify(disk: &DiskDescriptor) -> Result<Self, ResolveError> {
        let device = match disk {
            DiskDescriptor::Windows { drive_letter } => {
                return Ok(VolumeResolver::WindowsVolume {
                    drive: *drive_letter,
                });
            }
            DiskDescriptor::Linux { device, .. } => device,
        };

        let name = DeviceName::parse(device)
            .ok_or_else(|| ResolveError::UnrecognizedDevice(device.clone()))?;

        Ok(match name.mapping_letter() {
            None => VolumeResolver::NvmeVolume { device: name },
            Some(letter) => VolumeResolver::LegacyVolume { letter },
        })
    }

    #[instrument(skip(self, runner, instances), fields(resolver = ?self))]
    pub async fn resolve(
        &self,
        instance_id: &str,
        runner: &RemoteCommandRunner,
        instances: &dyn InstanceService,
    ) -> Result<VolumeId, ResolveError> {
        match self {
            VolumeResolver::WindowsVolume { drive } => {
                let result = runner
                    .execute(
                        instance_id,
                        CommandDocument::script_for(Platform::Windows),
                        &scripts::drive_serial_lookup(*drive),
                    )
                    .await;
                if !result.is_success() {
                    return Err(ResolveError::CommandFailed(result.status));
                }
                Ok(VolumeId(parse_volume_serial(&result.output)?))
            }
            VolumeResolver::NvmeVolume { device } => {
                let result = runner
                    .execute(
                        instance_id,
                        CommandDocument::script_for(Platform::Linux),
                        &scripts::disk_serial_listing(),
                    )
                    .await;
                if !result.is_success() {
                    return Err(ResolveError::CommandFailed(result.status));
                }
                Ok(VolumeId(parse_serial_listing(&result.output, &device.parent())?))
            }
            VolumeResolver::LegacyVolume { letter } => {
                debug!("extracting block device mapping");
                let mappings = instances
                    .block_device_mappings(instance_id)
                    .await
                    .map_err(ResolveError::Lookup)?;

                mappings
                    .into_iter()
                    .find(|mapping| {
                        DeviceName::parse(&mapping.device_name)
                            .and_then(|name| name.mapping_letter())
                            == Some(*letter)
                    })
                    .map(|mapping| VolumeId(mapping.volume_id))
                    .ok_or(ResolveError::NotMapped(*letter))
            }
        }
    }
}
