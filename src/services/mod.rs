//! External collaborators of the autoscaler
//!
//! Every service the provisioner and resizer talk to is described by a trait so
//! the orchestration logic never binds to a concrete provider.
//!
//! ## Design
//!
//! - **Trait-based**: implementations are injected as `Arc<dyn ...>` handles
//! - **Async**: all calls are async for compatibility with Tokio
//! - **Uniform errors**: implementations convert provider errors into `ServiceError`
//!
//! ## Implementations
//!
//! - **Gateway** (`gateway::GatewayClient`): JSON-over-HTTP control-plane gateway
//! - **In-memory** (`memory`): recording fakes for tests and local runs
//! - **Notifier** (`crate::notify::Notifier`): topic, Discord or webhook delivery

pub mod error;
pub mod gateway;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Dimension;
use crate::command::{CommandDocument, CommandParameters, InvocationStatus};
use crate::config::Config;
use crate::notify::Notifier;

pub use error::{ServiceError, ServiceResult};

/// Instance as reported by the metadata service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,

    /// Platform metadata, absent for linux guests
    #[serde(default)]
    pub platform: Option<String>,
}

/// One entry of an instance's block-device mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDeviceMapping {
    /// Device name as attached, e.g. `/dev/sdf` or `/dev/xvda`
    pub device_name: String,

    pub volume_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    GreaterThanThreshold,
    LessThanThreshold,
}

/// Alarm definition handed to the alarm service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAlarm {
    pub name: String,
    pub metric_name: String,
    pub namespace: String,
    pub dimensions: Vec<Dimension>,
    pub statistic: String,
    pub period_secs: u32,
    pub evaluation_periods: u32,
    pub datapoints_to_alarm: u32,
    pub comparison: ComparisonOperator,
    pub threshold: f64,
    pub alarm_actions: Vec<String>,
}

/// Instance and volume metadata plus the volume resize control plane
#[async_trait]
pub trait InstanceService: Send + Sync {
    /// Enumerate every instance visible to the autoscaler
    async fn describe_instances(&self) -> ServiceResult<Vec<Instance>>;

    async fn describe_instance(&self, instance_id: &str) -> ServiceResult<Instance>;

    /// Current size of a volume in GB
    async fn volume_size(&self, volume_id: &str) -> ServiceResult<u64>;

    async fn block_device_mappings(
        &self,
        instance_id: &str,
    ) -> ServiceResult<Vec<BlockDeviceMapping>>;

    /// Request a resize of the volume to `size_gb`
    async fn modify_volume(&self, volume_id: &str, size_gb: u64) -> ServiceResult<()>;
}

/// Remote command execution on managed hosts
#[async_trait]
pub trait CommandService: Send + Sync {
    /// Submit a command and return its command id
    async fn send_command(
        &self,
        instance_id: &str,
        document: CommandDocument,
        parameters: &CommandParameters,
    ) -> ServiceResult<String>;

    async fn command_status(
        &self,
        command_id: &str,
        instance_id: &str,
    ) -> ServiceResult<InvocationStatus>;

    /// Captured standard output of a finished invocation
    async fn command_output(&self, command_id: &str, instance_id: &str) -> ServiceResult<String>;
}

/// Named text blobs, used for the monitoring agent configuration
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn get_parameter(&self, name: &str) -> ServiceResult<String>;

    /// Write a parameter, overwriting any existing value
    async fn put_parameter(&self, name: &str, value: &str) -> ServiceResult<()>;
}

#[async_trait]
pub trait AlarmService: Send + Sync {
    /// Create or replace the alarm with the same name
    async fn put_metric_alarm(&self, alarm: &MetricAlarm) -> ServiceResult<()>;
}

/// Fire-and-forget delivery of plain-text messages
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn publish(&self, message: &str);
}

/// Handles to every collaborator, shared by the provisioner and the resizer
#[derive(Clone)]
pub struct Services {
    pub instances: Arc<dyn InstanceService>,
    pub commands: Arc<dyn CommandService>,
    pub parameters: Arc<dyn ParameterStore>,
    pub alarms: Arc<dyn AlarmService>,
    pub notifications: Arc<dyn NotificationService>,
}

impl Services {
    /// Wire the gateway client and the configured notifier
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let gateway = gateway::GatewayClient::new(&config.gateway)?;
        let notifier = Arc::new(
            Notifier::new(config.notification.target.clone()).with_gateway(gateway.clone()),
        );
        let gateway = Arc::new(gateway);

        Ok(Self {
            instances: gateway.clone(),
            commands: gateway.clone(),
            parameters: gateway.clone(),
            alarms: gateway,
            notifications: notifier,
        })
    }
}
