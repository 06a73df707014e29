//! Disk monitoring provisioner
//!
//! For every target instance: load the platform's agent configuration, point it
//! at the mounted disks, (re)install the monitoring agent and register one
//! utilisation alarm per disk.
//!
//! ```text
//! get_parameter → discover mount points → put_parameter → install agent
//!               → discover disks → put_metric_alarm × N
//! ```
//!
//! Every stage can end the run for its target. Other targets of the same event
//! are provisioned regardless.

pub mod agent_config;
pub mod alarms;
pub mod discovery;

use std::fmt;

use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

use crate::Target;
use crate::command::{CommandDocument, CommandOutcome, CommandParameters, RemoteCommandRunner};
use crate::config::{Config, PollingConfig};
use crate::services::{ServiceError, ServiceResult, Services};

use agent_config::{AgentConfig, AgentConfigError, parameter_name};
use alarms::{AlarmSettings, alarm_for_disk};
use discovery::{DiscoveryError, DiskDiscovery};

/// Instance id selecting every instance
pub const ALL_INSTANCES: &str = "*";

/// Provisioning request, `{"InstanceId": "<id>" | "*"}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProvisionEvent {
    #[serde(rename = "InstanceId")]
    pub instance_id: String,
}

impl ProvisionEvent {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
        }
    }

    pub fn targets_all(&self) -> bool {
        self.instance_id.trim() == ALL_INSTANCES
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub parameter_prefix: String,
    pub alarm: AlarmSettings,
}

impl ProvisionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            parameter_prefix: config.agent.parameter_prefix.clone(),
            alarm: AlarmSettings {
                prefix: config.agent.alarm_prefix.clone(),
                namespace: config.agent.namespace.clone(),
                topic: config.agent.alarm_topic.clone(),
                threshold: config.scaling.threshold_utilisation,
            },
        }
    }
}

/// Why provisioning stopped for a target
#[derive(Debug)]
pub enum ProvisionError {
    ConfigUnavailable(ServiceError),
    InvalidAgentConfig(AgentConfigError),
    Discovery(DiscoveryError),
    ConfigPersist(ServiceError),
    AgentInstall(CommandOutcome),
    Metadata(DiscoveryError),
    Alarm(ServiceError),
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionError::ConfigUnavailable(e) => {
                write!(f, "could not load agent configuration: {}", e)
            }
            ProvisionError::InvalidAgentConfig(e) => write!(f, "{}", e),
            ProvisionError::Discovery(e) => write!(f, "mount point discovery failed: {}", e),
            ProvisionError::ConfigPersist(e) => {
                write!(f, "could not store agent configuration: {}", e)
            }
            ProvisionError::AgentInstall(outcome) => {
                write!(f, "monitoring agent installation ended {:?}", outcome)
            }
            ProvisionError::Metadata(e) => write!(f, "disk metadata discovery failed: {}", e),
            ProvisionError::Alarm(e) => write!(f, "could not register alarm: {}", e),
        }
    }
}

impl std::error::Error for ProvisionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProvisionError::ConfigUnavailable(e)
            | ProvisionError::ConfigPersist(e)
            | ProvisionError::Alarm(e) => Some(e),
            ProvisionError::InvalidAgentConfig(e) => Some(e),
            ProvisionError::Discovery(e) | ProvisionError::Metadata(e) => Some(e),
            ProvisionError::AgentInstall(_) => None,
        }
    }
}

/// Result of provisioning one instance, the number of alarms on success
#[derive(Debug)]
pub struct TargetReport {
    pub instance_id: String,
    pub result: Result<usize, ProvisionError>,
}

pub struct Provisioner {
    services: Services,
    runner: RemoteCommandRunner,
    settings: ProvisionSettings,
}

impl Provisioner {
    pub fn new(services: Services, polling: &PollingConfig, settings: ProvisionSettings) -> Self {
        let runner = RemoteCommandRunner::new(services.commands.clone(), polling);
        Self {
            services,
            runner,
            settings,
        }
    }

    /// Provision every instance selected by `event`
    ///
    /// Only failing to enumerate the targets is an error. Per-target failures
    /// are logged and returned in the reports.
    #[instrument(skip(self, event), fields(instance = %event.instance_id))]
    pub async fn handle(&self, event: &ProvisionEvent) -> ServiceResult<Vec<TargetReport>> {
        let instances = if event.targets_all() {
            self.services.instances.describe_instances().await?
        } else {
            vec![
                self.services
                    .instances
                    .describe_instance(event.instance_id.trim())
                    .await?,
            ]
        };

        debug!("provisioning {} instance(s)", instances.len());

        let mut reports = Vec::with_capacity(instances.len());
        for instance in instances {
            let target = Target::new(instance.instance_id, instance.platform.as_deref());
            let result = self.provision_target(&target).await;

            match &result {
                Ok(alarms) => info!("{}: {} alarm(s) registered", target.instance_id, alarms),
                Err(e) => error!("{}: provisioning aborted: {}", target.instance_id, e),
            }

            reports.push(TargetReport {
                instance_id: target.instance_id,
                result,
            });
        }

        Ok(reports)
    }

    #[instrument(skip(self, target), fields(instance = %target.instance_id, platform = %target.platform))]
    pub async fn provision_target(&self, target: &Target) -> Result<usize, ProvisionError> {
        info!("------------ {} ------------", target.instance_id);

        let instance_id = target.instance_id.as_str();
        let key = parameter_name(&self.settings.parameter_prefix, target.platform);

        let raw = self
            .services
            .parameters
            .get_parameter(&key)
            .await
            .map_err(ProvisionError::ConfigUnavailable)?;
        let mut agent_config =
            AgentConfig::parse(&raw).map_err(ProvisionError::InvalidAgentConfig)?;

        let discovery = DiskDiscovery::for_platform(target.platform);
        let resources = discovery
            .discover_mount_points(&self.runner, instance_id)
            .await
            .map_err(ProvisionError::Discovery)?;

        agent_config
            .set_disk_resources(target.platform, &resources)
            .map_err(ProvisionError::InvalidAgentConfig)?;
        self.services
            .parameters
            .put_parameter(&key, &agent_config.to_json())
            .await
            .map_err(ProvisionError::ConfigPersist)?;
        debug!("agent configuration {key} now monitors {resources:?}");

        let install = self
            .runner
            .execute(
                instance_id,
                CommandDocument::MonitoringAgent,
                &CommandParameters::configuration_location(&key),
            )
            .await;
        if !install.is_success() {
            return Err(ProvisionError::AgentInstall(install.status));
        }

        let disks = discovery
            .discover_disks(&self.runner, instance_id, &resources)
            .await
            .map_err(ProvisionError::Metadata)?;

        for (n, disk) in disks.iter().enumerate() {
            info!("Disk {} : {:?}", n + 1, disk);

            let alarm = alarm_for_disk(instance_id, disk, &self.settings.alarm);
            if let Err(e) = self.services.alarms.put_metric_alarm(&alarm).await {
                warn!("alarm {} was not registered", alarm.name);
                return Err(ProvisionError::Alarm(e));
            }
        }

        Ok(disks.len())
    }
}
