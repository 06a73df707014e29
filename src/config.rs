use serde::{Deserialize, Deserializer};
use tracing::trace;

use crate::util;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub scaling: ScalingConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub agent: AgentSettings,

    pub gateway: GatewayConfig,

    #[serde(default)]
    pub notification: NotificationConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ScalingConfig {
    /// Utilisation percent at which the disk alarms fire
    pub threshold_utilisation: u8,

    /// Utilisation percent a resized volume should end up at
    pub desired_utilisation: u8,

    /// Delay embedded in the OS-level extension script
    #[serde(default = "default_extend_delay")]
    pub os_extend_delay_secs: u64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// Upper bound for a single remote command, unbounded when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AgentSettings {
    /// Prefix of the per-platform agent configuration parameter
    #[serde(default = "default_parameter_prefix")]
    pub parameter_prefix: String,

    #[serde(default = "default_alarm_prefix")]
    pub alarm_prefix: String,

    /// Metric namespace the agent publishes into
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Action attached to every disk alarm
    #[serde(default)]
    pub alarm_topic: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            parameter_prefix: default_parameter_prefix(),
            alarm_prefix: default_alarm_prefix(),
            namespace: default_namespace(),
            alarm_topic: String::new(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GatewayConfig {
    pub url: String,
    pub token: Option<String>,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct NotificationConfig {
    /// Accepts `true`/`false` as well as `"yes"`/`"no"`
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub enabled: bool,

    pub target: Option<NotificationTarget>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTarget {
    Discord(Discord),
    Webhook(Webhook),

    /// Control-plane notification topic, published through the gateway
    Topic(String),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

fn default_extend_delay() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_parameter_prefix() -> String {
    "/CWAgent".to_string()
}

fn default_alarm_prefix() -> String {
    "EBSUtilisationExceededAlarm".to_string()
}

fn default_namespace() -> String {
    "CWAgent".to_string()
}

fn default_gateway_timeout() -> u64 {
    30
}

pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" => Some(true),
        "no" | "false" | "" => Some(false),
        _ => None,
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(flag) => Ok(flag),
        Flag::Text(text) => parse_flag(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid flag '{text}'"))),
    }
}

impl Config {
    /// Apply environment overrides on top of the file contents
    pub fn apply_env(&mut self) {
        if let Some(threshold) = util::get_threshold_override() {
            self.scaling.threshold_utilisation = threshold;
        }
        if let Some(desired) = util::get_desired_override() {
            self.scaling.desired_utilisation = desired;
        }
        if let Some(enabled) = util::get_notifications_override() {
            self.notification.enabled = enabled;
        }
        if let Some(topic) = util::get_notification_topic_override() {
            self.notification.target = Some(NotificationTarget::Topic(topic));
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let ScalingConfig {
            threshold_utilisation,
            desired_utilisation,
            ..
        } = self.scaling;

        if !(1..=100).contains(&threshold_utilisation) {
            anyhow::bail!("threshold_utilisation must be within 1..=100, got {threshold_utilisation}");
        }
        if !(1..=100).contains(&desired_utilisation) {
            anyhow::bail!("desired_utilisation must be within 1..=100, got {desired_utilisation}");
        }
        if self.polling.interval_ms == 0 || self.polling.interval_ms >= 5000 {
            anyhow::bail!(
                "polling interval must be between 1 and 4999 ms, got {}",
                self.polling.interval_ms
            );
        }
        if self.notification.enabled && self.notification.target.is_none() {
            anyhow::bail!("notifications are enabled but no notification target is configured");
        }
        Ok(())
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    let mut config: Config = serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;
    config.apply_env();
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
