//! Platform specific disk discovery
//!
//! Discovery runs in two rounds. The first one lists mount points for the agent
//! configuration, the second one (after the agent is installed) produces the
//! disk descriptors alarms are built from.

use std::fmt;

use tracing::debug;

use crate::command::parse::{ParseError, parse_block_devices, parse_drive_letters};
use crate::command::{CommandDocument, CommandParameters, RemoteCommandRunner, scripts};
use crate::{DiskDescriptor, DriveLetter, Platform};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The discovery command did not succeed
    CommandFailed,

    /// The command succeeded but reported no usable disk
    NoDisks,

    Parse(ParseError),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::CommandFailed => write!(f, "discovery command failed"),
            DiscoveryError::NoDisks => write!(f, "discovery reported no disks"),
            DiscoveryError::Parse(err) => write!(f, "unexpected discovery output: {}", err),
        }
    }
}

impl std::error::Error for DiscoveryError {}

impl From<ParseError> for DiscoveryError {
    fn from(err: ParseError) -> Self {
        DiscoveryError::Parse(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskDiscovery {
    LinuxDisk,
    WindowsDisk,
}

impl DiskDiscovery {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Linux => DiskDiscovery::LinuxDisk,
            Platform::Windows => DiskDiscovery::WindowsDisk,
        }
    }

    /// Resources to monitor: mount paths on linux, `X:` drives on windows
    pub async fn discover_mount_points(
        &self,
        runner: &RemoteCommandRunner,
        instance_id: &str,
    ) -> Result<Vec<String>, DiscoveryError> {
        let resources: Vec<String> = match self {
            DiskDiscovery::LinuxDisk => {
                let output =
                    run(runner, instance_id, Platform::Linux, scripts::block_device_listing())
                        .await?;
                let mut mount_points = Vec::new();
                for device in parse_block_devices(&output)? {
                    if !mount_points.contains(&device.mountpoint) {
                        mount_points.push(device.mountpoint);
                    }
                }
                mount_points
            }
            DiskDiscovery::WindowsDisk => {
                let output =
                    run(runner, instance_id, Platform::Windows, scripts::drive_letter_listing())
                        .await?;
                parse_drive_letters(&output)?
                    .iter()
                    .map(DriveLetter::resource)
                    .collect()
            }
        };

        if resources.is_empty() {
            return Err(DiscoveryError::NoDisks);
        }

        debug!("discovered mount points: {resources:?}");
        Ok(resources)
    }

    /// Disk metadata for alarm registration
    ///
    /// Windows alarms are keyed by drive letter alone, so the resources found by
    /// the first round are reused instead of asking the host again.
    pub async fn discover_disks(
        &self,
        runner: &RemoteCommandRunner,
        instance_id: &str,
        resources: &[String],
    ) -> Result<Vec<DiskDescriptor>, DiscoveryError> {
        let disks: Vec<DiskDescriptor> = match self {
            DiskDiscovery::LinuxDisk => {
                let output =
                    run(runner, instance_id, Platform::Linux, scripts::block_device_listing())
                        .await?;
                parse_block_devices(&output)?
                    .into_iter()
                    .map(|device| DiskDescriptor::Linux {
                        device: device.name,
                        filesystem: device.filesystem,
                        mount_path: device.mountpoint,
                    })
                    .collect()
            }
            DiskDiscovery::WindowsDisk => resources
                .iter()
                .map(|resource| {
                    resource
                        .parse::<DriveLetter>()
                        .map(|drive_letter| DiskDescriptor::Windows { drive_letter })
                        .map_err(|reason| ParseError::MalformedLine {
                            line: resource.clone(),
                            reason,
                        })
                })
                .collect::<Result<_, _>>()?,
        };

        if disks.is_empty() {
            return Err(DiscoveryError::NoDisks);
        }

        Ok(disks)
    }
}

async fn run(
    runner: &RemoteCommandRunner,
    instance_id: &str,
    platform: Platform,
    parameters: CommandParameters,
) -> Result<String, DiscoveryError> {
    let result = runner
        .execute(instance_id, CommandDocument::script_for(platform), &parameters)
        .await;

    if !result.is_success() {
        return Err(DiscoveryError::CommandFailed);
    }

    Ok(result.output)
}
