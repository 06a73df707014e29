pub mod command;
pub mod config;
pub mod discord;
pub mod notify;
pub mod provisioner;
pub mod resizer;
pub mod services;
pub mod util;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Guest operating system family of an instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Linux,
    Windows,
}

impl Platform {
    /// Instances without platform metadata are treated as linux.
    pub fn detect(metadata: Option<&str>) -> Platform {
        match metadata {
            Some(platform) if platform.trim().eq_ignore_ascii_case("windows") => Platform::Windows,
            _ => Platform::Linux,
        }
    }

    pub fn capitalized(&self) -> &'static str {
        match self {
            Platform::Linux => "Linux",
            Platform::Windows => "Windows",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Linux => write!(f, "linux"),
            Platform::Windows => write!(f, "windows"),
        }
    }
}

/// One instance under management
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub instance_id: String,
    pub platform: Platform,
}

impl Target {
    pub fn new(instance_id: impl Into<String>, platform_metadata: Option<&str>) -> Self {
        Self {
            instance_id: instance_id.into(),
            platform: Platform::detect(platform_metadata),
        }
    }
}

/// Journaling filesystems the autoscaler knows how to grow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filesystem {
    Ext4,
    Xfs,
}

impl Filesystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Filesystem::Ext4 => "ext4",
            Filesystem::Xfs => "xfs",
        }
    }
}

impl FromStr for Filesystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ext4" => Ok(Filesystem::Ext4),
            "xfs" => Ok(Filesystem::Xfs),
            other => Err(format!("unsupported filesystem '{other}'")),
        }
    }
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Windows drive letter, always stored upper case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DriveLetter(char);

impl DriveLetter {
    pub fn letter(&self) -> char {
        self.0
    }

    /// Form used by the monitoring agent's `LogicalDisk` resources, e.g. `D:`
    pub fn resource(&self) -> String {
        format!("{}:", self.0)
    }
}

impl FromStr for DriveLetter {
    type Err = String;

    /// Accepts `D`, `d`, `D:` and `D:\`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let Some(letter) = chars.next() else {
            return Err("empty drive letter".to_string());
        };
        if !letter.is_ascii_alphabetic() {
            return Err(format!("invalid drive letter '{trimmed}'"));
        }
        match chars.as_str() {
            "" | ":" | ":\\" => Ok(DriveLetter(letter.to_ascii_uppercase())),
            _ => Err(format!("invalid drive letter '{trimmed}'")),
        }
    }
}

impl fmt::Display for DriveLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A discovered disk, shaped by the platform that reported it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DiskDescriptor {
    Linux {
        device: String,
        filesystem: Filesystem,
        mount_path: String,
    },
    Windows {
        drive_letter: DriveLetter,
    },
}

impl DiskDescriptor {
    /// Unique per-instance identifier used in alarm names
    pub fn identifier(&self) -> String {
        match self {
            DiskDescriptor::Linux { device, .. } => device.clone(),
            DiskDescriptor::Windows { drive_letter } => drive_letter.resource(),
        }
    }
}

/// Alarm dimension as carried by alarm definitions and alarm notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}
