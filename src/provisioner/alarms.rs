//! Disk utilisation alarm definitions
//!
//! ```text
//! linux:   disk_used_percent          > threshold          {InstanceId, device, fstype, path}
//! windows: LogicalDisk % Free Space   < 100 - threshold    {InstanceId, instance, objectname}
//! ```
//!
//! The windows agent reports free space, hence the inverted comparison.

use crate::services::{ComparisonOperator, MetricAlarm};
use crate::{Dimension, DiskDescriptor};

pub const LINUX_METRIC: &str = "disk_used_percent";
pub const WINDOWS_METRIC: &str = "LogicalDisk % Free Space";

/// Settings shared by every alarm the provisioner registers
#[derive(Debug, Clone)]
pub struct AlarmSettings {
    pub prefix: String,
    pub namespace: String,
    pub topic: String,
    pub threshold: u8,
}

/// Deterministic alarm name `<prefix>-<instance>-<disk>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmName {
    pub instance_id: String,
    pub disk: String,
}

impl AlarmName {
    pub fn new(instance_id: impl Into<String>, disk: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            disk: disk.into(),
        }
    }

    pub fn format(&self, prefix: &str) -> String {
        format!("{}-{}-{}", prefix, self.instance_id, self.disk)
    }

    /// Inverse of [`AlarmName::format`]. Disk identifiers never contain `-`, so
    /// the last dash separates the instance id from the disk.
    pub fn parse(prefix: &str, name: &str) -> Option<AlarmName> {
        let rest = name.strip_prefix(prefix)?.strip_prefix('-')?;
        let (instance_id, disk) = rest.rsplit_once('-')?;
        if instance_id.is_empty() || disk.is_empty() {
            return None;
        }
        Some(AlarmName::new(instance_id, disk))
    }
}

/// Alarm for one discovered disk of `instance_id`
pub fn alarm_for_disk(
    instance_id: &str,
    disk: &DiskDescriptor,
    settings: &AlarmSettings,
) -> MetricAlarm {
    let mut dimensions = vec![Dimension::new("InstanceId", instance_id)];

    let (metric_name, comparison, threshold) = match disk {
        DiskDescriptor::Linux {
            device,
            filesystem,
            mount_path,
        } => {
            dimensions.push(Dimension::new("device", device.as_str()));
            dimensions.push(Dimension::new("fstype", filesystem.as_str()));
            dimensions.push(Dimension::new("path", mount_path.as_str()));
            (
                LINUX_METRIC,
                ComparisonOperator::GreaterThanThreshold,
                f64::from(settings.threshold),
            )
        }
        DiskDescriptor::Windows { drive_letter } => {
            dimensions.push(Dimension::new("instance", drive_letter.resource()));
            dimensions.push(Dimension::new("objectname", "LogicalDisk"));
            (
                WINDOWS_METRIC,
                ComparisonOperator::LessThanThreshold,
                f64::from(100u8.saturating_sub(settings.threshold)),
            )
        }
    };

    MetricAlarm {
        name: AlarmName::new(instance_id, disk.identifier()).format(&settings.prefix),
        metric_name: metric_name.to_string(),
        namespace: settings.namespace.clone(),
        dimensions,
        statistic: "Average".to_string(),
        period_secs: 60,
        evaluation_periods: 1,
        datapoints_to_alarm: 1,
        comparison,
        threshold,
        alarm_actions: vec![settings.topic.clone()],
    }
}
