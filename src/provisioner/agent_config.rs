//! Monitoring agent configuration document
//!
//! The document is stored per platform in the parameter store. Only the list of
//! monitored disks is touched, everything else round-trips untouched.

use std::fmt;

use serde_json::{Map, Value};

use crate::Platform;

#[derive(Debug)]
pub enum AgentConfigError {
    Invalid(serde_json::Error),

    /// A section on the path to the disk resources is not a JSON object
    NotAnObject(&'static str),
}

impl fmt::Display for AgentConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentConfigError::Invalid(err) => write!(f, "invalid agent configuration: {}", err),
            AgentConfigError::NotAnObject(section) => {
                write!(f, "agent configuration section '{}' is not an object", section)
            }
        }
    }
}

impl std::error::Error for AgentConfigError {}

/// Parameter name of the platform's agent configuration, e.g. `/CWAgent/Linux/Disk`
pub fn parameter_name(prefix: &str, platform: Platform) -> String {
    format!(
        "{}/{}/Disk",
        prefix.trim_end_matches('/'),
        platform.capitalized()
    )
}

fn disk_section(platform: Platform) -> &'static str {
    match platform {
        Platform::Linux => "disk",
        Platform::Windows => "LogicalDisk",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    document: Value,
}

impl AgentConfig {
    pub fn parse(raw: &str) -> Result<Self, AgentConfigError> {
        let document: Value = serde_json::from_str(raw).map_err(AgentConfigError::Invalid)?;
        Ok(Self { document })
    }

    /// Replace the monitored disk resources, creating missing sections
    pub fn set_disk_resources(
        &mut self,
        platform: Platform,
        resources: &[String],
    ) -> Result<(), AgentConfigError> {
        let mut node = &mut self.document;
        for section in ["metrics", "metrics_collected", disk_section(platform)] {
            let Some(object) = node.as_object_mut() else {
                return Err(AgentConfigError::NotAnObject(section));
            };
            node = object
                .entry(section)
                .or_insert_with(|| Value::Object(Map::new()));
        }

        let Some(object) = node.as_object_mut() else {
            return Err(AgentConfigError::NotAnObject(disk_section(platform)));
        };
        object.insert(
            "resources".to_string(),
            Value::from(resources.to_vec()),
        );
        Ok(())
    }

    pub fn to_json(&self) -> String {
        self.document.to_string()
    }
}
