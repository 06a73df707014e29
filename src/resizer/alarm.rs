//! Alarm notification payloads
//!
//! ```text
//! {"Records": [{"Sns": {"Message": "<payload json>"}}]}
//! payload := {"AlarmName": "...", "Trigger": {"Dimensions": [{"name": "...", "value": "..."}]}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::provisioner::alarms::AlarmName;
use crate::{Dimension, DiskDescriptor, DriveLetter, Filesystem};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    #[serde(rename = "Records")]
    pub records: Vec<NotificationRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    #[serde(rename = "Sns")]
    pub sns: NotificationMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// JSON encoded `AlarmPayload`
    #[serde(rename = "Message")]
    pub message: String,
}

impl NotificationEnvelope {
    /// Envelope carrying a single message
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            records: vec![NotificationRecord {
                sns: NotificationMessage {
                    message: message.into(),
                },
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmPayload {
    #[serde(rename = "AlarmName")]
    pub alarm_name: String,

    #[serde(rename = "Trigger")]
    pub trigger: AlarmTrigger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmTrigger {
    #[serde(rename = "Dimensions", default)]
    pub dimensions: Vec<Dimension>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmParseError {
    EmptyEnvelope,
    InvalidPayload(String),

    /// Neither an `InstanceId` dimension nor a parsable alarm name
    MissingInstance,

    /// Both linux and windows dimensions are present
    MixedDimensions,

    MissingDimension(&'static str),
    UnsupportedFilesystem(String),
    InvalidDriveLetter(String),
}

impl fmt::Display for AlarmParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmParseError::EmptyEnvelope => write!(f, "notification carries no record"),
            AlarmParseError::InvalidPayload(e) => write!(f, "invalid alarm payload: {}", e),
            AlarmParseError::MissingInstance => write!(f, "alarm does not name an instance"),
            AlarmParseError::MixedDimensions => {
                write!(f, "alarm mixes linux and windows dimensions")
            }
            AlarmParseError::MissingDimension(name) => {
                write!(f, "alarm is missing the '{}' dimension", name)
            }
            AlarmParseError::UnsupportedFilesystem(fs) => {
                write!(f, "unsupported filesystem '{}'", fs)
            }
            AlarmParseError::InvalidDriveLetter(drive) => {
                write!(f, "invalid drive letter '{}'", drive)
            }
        }
    }
}

impl std::error::Error for AlarmParseError {}

/// Instance and disk an alarm fired for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmContext {
    pub alarm_name: String,
    pub instance_id: String,
    pub disk: DiskDescriptor,
}

impl AlarmContext {
    pub fn from_envelope(
        alarm_prefix: &str,
        envelope: &NotificationEnvelope,
    ) -> Result<Self, AlarmParseError> {
        let record = envelope
            .records
            .first()
            .ok_or(AlarmParseError::EmptyEnvelope)?;
        let payload: AlarmPayload = serde_json::from_str(&record.sns.message)
            .map_err(|e| AlarmParseError::InvalidPayload(e.to_string()))?;

        Self::from_payload(alarm_prefix, &payload)
    }

    pub fn from_payload(alarm_prefix: &str, payload: &AlarmPayload) -> Result<Self, AlarmParseError> {
        let dimension = |name: &str| {
            payload
                .trigger
                .dimensions
                .iter()
                .find(|dimension| dimension.name == name)
                .map(|dimension| dimension.value.trim())
                .filter(|value| !value.is_empty())
        };

        let instance_id = match dimension("InstanceId") {
            Some(instance_id) => instance_id.to_string(),
            None => AlarmName::parse(alarm_prefix, &payload.alarm_name)
                .map(|name| name.instance_id)
                .ok_or(AlarmParseError::MissingInstance)?,
        };

        let device = dimension("device");
        let fstype = dimension("fstype");
        let path = dimension("path");
        let drive = dimension("instance");

        let is_linux = device.is_some() || fstype.is_some() || path.is_some();

        let disk = match drive {
            Some(_) if is_linux => return Err(AlarmParseError::MixedDimensions),
            Some(drive) => {
                // the agent reports `D:`, only the letter identifies the drive
                let letter: String = drive.chars().take(1).collect();
                let drive_letter = letter
                    .parse::<DriveLetter>()
                    .map_err(|_| AlarmParseError::InvalidDriveLetter(drive.to_string()))?;
                DiskDescriptor::Windows { drive_letter }
            }
            None => {
                let device = device.ok_or(AlarmParseError::MissingDimension("device"))?;
                let fstype = fstype.ok_or(AlarmParseError::MissingDimension("fstype"))?;
                let filesystem = fstype
                    .parse::<Filesystem>()
                    .map_err(|_| AlarmParseError::UnsupportedFilesystem(fstype.to_string()))?;
                let mount_path = path.ok_or(AlarmParseError::MissingDimension("path"))?;

                DiskDescriptor::Linux {
                    device: device.trim_start_matches("/dev/").to_string(),
                    filesystem,
                    mount_path: mount_path.to_string(),
                }
            }
        };

        Ok(Self {
            alarm_name: payload.alarm_name.clone(),
            instance_id,
            disk,
        })
    }
}
