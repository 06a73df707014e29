//! Helper functions for integration tests

use serde_json::{Value, json};
use volume_autoscaler::config::PollingConfig;
use volume_autoscaler::provisioner::alarms::AlarmSettings;
use volume_autoscaler::provisioner::{ProvisionSettings, Provisioner};
use volume_autoscaler::resizer::{NotificationEnvelope, ResizeSettings, Resizer};
use volume_autoscaler::services::memory::MemoryServices;

pub const ALARM_PREFIX: &str = "EBSUtilisationExceededAlarm";
pub const THRESHOLD: u8 = 80;
pub const DESIRED: u8 = 50;

pub const LINUX_AGENT_CONFIG: &str = "/CWAgent/Linux/Disk";
pub const WINDOWS_AGENT_CONFIG: &str = "/CWAgent/Windows/Disk";

pub fn fast_polling() -> PollingConfig {
    PollingConfig {
        interval_ms: 1,
        timeout_secs: None,
    }
}

/// `lsblk -J` output listing `devices`
pub fn block_devices(devices: Value) -> String {
    json!({ "blockdevices": devices }).to_string()
}

pub fn agent_config_json() -> String {
    json!({
        "agent": { "metrics_collection_interval": 60 },
        "metrics": {
            "append_dimensions": { "InstanceId": "${aws:InstanceId}" },
            "metrics_collected": {
                "disk": { "measurement": ["used_percent"], "resources": ["*"] },
                "LogicalDisk": { "measurement": ["% Free Space"], "resources": ["*"] }
            }
        }
    })
    .to_string()
}

pub fn provisioner(memory: &MemoryServices) -> Provisioner {
    Provisioner::new(
        memory.services(),
        &fast_polling(),
        ProvisionSettings {
            parameter_prefix: "/CWAgent".to_string(),
            alarm: AlarmSettings {
                prefix: ALARM_PREFIX.to_string(),
                namespace: "CWAgent".to_string(),
                topic: "arn:alarm-topic".to_string(),
                threshold: THRESHOLD,
            },
        },
    )
}

pub fn resizer(memory: &MemoryServices, notifications_enabled: bool) -> Resizer {
    Resizer::new(
        memory.services(),
        &fast_polling(),
        ResizeSettings {
            threshold: THRESHOLD,
            desired: DESIRED,
            os_extend_delay_secs: 0,
            alarm_prefix: ALARM_PREFIX.to_string(),
            notifications_enabled,
        },
    )
}

/// Alarm notification as delivered for a linux disk
pub fn linux_alarm(instance_id: &str, device: &str, fstype: &str, path: &str) -> NotificationEnvelope {
    let payload = json!({
        "AlarmName": format!("{ALARM_PREFIX}-{instance_id}-{device}"),
        "NewStateValue": "ALARM",
        "Trigger": {
            "MetricName": "disk_used_percent",
            "Namespace": "CWAgent",
            "Dimensions": [
                { "name": "InstanceId", "value": instance_id },
                { "name": "device", "value": device },
                { "name": "fstype", "value": fstype },
                { "name": "path", "value": path }
            ]
        }
    });
    NotificationEnvelope::single(payload.to_string())
}

/// Alarm notification as delivered for a windows drive
pub fn windows_alarm(instance_id: &str, drive: &str) -> NotificationEnvelope {
    let payload = json!({
        "AlarmName": format!("{ALARM_PREFIX}-{instance_id}-{drive}"),
        "NewStateValue": "ALARM",
        "Trigger": {
            "MetricName": "LogicalDisk % Free Space",
            "Namespace": "CWAgent",
            "Dimensions": [
                { "name": "InstanceId", "value": instance_id },
                { "name": "instance", "value": drive },
                { "name": "objectname", "value": "LogicalDisk" }
            ]
        }
    });
    NotificationEnvelope::single(payload.to_string())
}
