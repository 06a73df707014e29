//! In-memory collaborators
//!
//! Recording fakes for every service trait. They keep all state behind a mutex
//! so tests can inspect what the orchestration did (and, just as important,
//! what it did not touch).
//!
//! ## Limitations
//!
//! - **No persistence**: all state is lost when the value is dropped
//! - **Scripted commands**: `ScriptedCommandService` answers commands strictly in
//!   submission order, it does not interpret the scripts it receives

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::error::{ServiceError, ServiceResult};
use super::{
    AlarmService, BlockDeviceMapping, CommandService, Instance, InstanceService, MetricAlarm,
    NotificationService, ParameterStore, Services,
};
use crate::command::{CommandDocument, CommandParameters, InvocationStatus};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Instances and volumes
// ============================================================================

#[derive(Debug, Default)]
struct InstanceState {
    instances: Vec<Instance>,
    volumes: HashMap<String, u64>,
    mappings: HashMap<String, Vec<BlockDeviceMapping>>,
    modifications: Vec<(String, u64)>,
    mapping_lookups: usize,
    reject_modifications: Option<String>,
    modify_delay: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct MemoryInstanceService {
    state: Mutex<InstanceState>,
}

impl MemoryInstanceService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(self, instance_id: &str, platform: Option<&str>) -> Self {
        lock(&self.state).instances.push(Instance {
            instance_id: instance_id.to_string(),
            platform: platform.map(str::to_string),
        });
        self
    }

    pub fn with_volume(self, volume_id: &str, size_gb: u64) -> Self {
        lock(&self.state)
            .volumes
            .insert(volume_id.to_string(), size_gb);
        self
    }

    pub fn with_mapping(self, instance_id: &str, device_name: &str, volume_id: &str) -> Self {
        lock(&self.state)
            .mappings
            .entry(instance_id.to_string())
            .or_default()
            .push(BlockDeviceMapping {
                device_name: device_name.to_string(),
                volume_id: volume_id.to_string(),
            });
        self
    }

    /// Make every resize request fail with `message`
    pub fn rejecting_modifications(self, message: &str) -> Self {
        lock(&self.state).reject_modifications = Some(message.to_string());
        self
    }

    /// Hold every resize request for `delay` before answering
    pub fn with_modify_delay(self, delay: Duration) -> Self {
        lock(&self.state).modify_delay = Some(delay);
        self
    }

    /// Resize requests received so far, in order
    pub fn modifications(&self) -> Vec<(String, u64)> {
        lock(&self.state).modifications.clone()
    }

    pub fn mapping_lookups(&self) -> usize {
        lock(&self.state).mapping_lookups
    }
}

#[async_trait]
impl InstanceService for MemoryInstanceService {
    async fn describe_instances(&self) -> ServiceResult<Vec<Instance>> {
        Ok(lock(&self.state).instances.clone())
    }

    async fn describe_instance(&self, instance_id: &str) -> ServiceResult<Instance> {
        lock(&self.state)
            .instances
            .iter()
            .find(|instance| instance.instance_id == instance_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("instance {instance_id}")))
    }

    async fn volume_size(&self, volume_id: &str) -> ServiceResult<u64> {
        lock(&self.state)
            .volumes
            .get(volume_id)
            .copied()
            .ok_or_else(|| ServiceError::NotFound(format!("volume {volume_id}")))
    }

    async fn block_device_mappings(
        &self,
        instance_id: &str,
    ) -> ServiceResult<Vec<BlockDeviceMapping>> {
        let mut state = lock(&self.state);
        state.mapping_lookups += 1;
        Ok(state.mappings.get(instance_id).cloned().unwrap_or_default())
    }

    async fn modify_volume(&self, volume_id: &str, size_gb: u64) -> ServiceResult<()> {
        let delay = lock(&self.state).modify_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        if let Some(message) = &state.reject_modifications {
            return Err(ServiceError::Rejected {
                status: 400,
                message: message.clone(),
            });
        }

        debug!("in-memory resize of {volume_id} to {size_gb}GB");
        state.modifications.push((volume_id.to_string(), size_gb));
        state.volumes.insert(volume_id.to_string(), size_gb);
        Ok(())
    }
}

// ============================================================================
// Remote commands
// ============================================================================

/// Canned behaviour for one submitted command
#[derive(Debug, Clone)]
pub struct CommandScript {
    dispatch_fails: bool,
    statuses: Vec<InvocationStatus>,
    output: String,
}

impl CommandScript {
    pub fn success(output: impl Into<String>) -> Self {
        Self::pending_then_success(0, output)
    }

    /// Report `polls` non-terminal statuses before succeeding
    pub fn pending_then_success(polls: usize, output: impl Into<String>) -> Self {
        let mut statuses = vec![InvocationStatus::Pending];
        statuses.extend(std::iter::repeat_n(InvocationStatus::InProgress, polls.saturating_sub(1)));
        statuses.truncate(polls);
        statuses.push(InvocationStatus::Success);

        Self {
            dispatch_fails: false,
            statuses,
            output: output.into(),
        }
    }

    pub fn finished(status: InvocationStatus) -> Self {
        Self {
            dispatch_fails: false,
            statuses: vec![status],
            output: String::new(),
        }
    }

    pub fn failed() -> Self {
        Self::finished(InvocationStatus::Failed)
    }

    /// The command cannot be dispatched at all
    pub fn unreachable() -> Self {
        Self {
            dispatch_fails: true,
            statuses: Vec::new(),
            output: String::new(),
        }
    }

    pub fn never_finishes() -> Self {
        Self::finished(InvocationStatus::InProgress)
    }
}

/// A command as it was submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    pub instance_id: String,
    pub document: CommandDocument,
    pub parameters: CommandParameters,
}

impl SentCommand {
    /// Script lines of shell/PowerShell documents
    pub fn script(&self) -> Vec<String> {
        self.parameters
            .get("commands")
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct CommandState {
    queue: VecDeque<CommandScript>,
    running: HashMap<String, (CommandScript, usize)>,
    sent: Vec<SentCommand>,
    status_requests: usize,
    output_requests: usize,
}

#[derive(Debug, Default)]
pub struct ScriptedCommandService {
    state: Mutex<CommandState>,
}

impl ScriptedCommandService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the behaviour of the next submitted command
    pub fn respond(self, script: CommandScript) -> Self {
        lock(&self.state).queue.push_back(script);
        self
    }

    pub fn sent(&self) -> Vec<SentCommand> {
        lock(&self.state).sent.clone()
    }

    pub fn status_requests(&self) -> usize {
        lock(&self.state).status_requests
    }

    pub fn output_requests(&self) -> usize {
        lock(&self.state).output_requests
    }
}

#[async_trait]
impl CommandService for ScriptedCommandService {
    async fn send_command(
        &self,
        instance_id: &str,
        document: CommandDocument,
        parameters: &CommandParameters,
    ) -> ServiceResult<String> {
        let mut state = lock(&self.state);
        state.sent.push(SentCommand {
            instance_id: instance_id.to_string(),
            document,
            parameters: parameters.clone(),
        });

        let Some(script) = state.queue.pop_front() else {
            return Err(ServiceError::RequestFailed(
                "no scripted response left".to_string(),
            ));
        };

        if script.dispatch_fails {
            return Err(ServiceError::RequestFailed(format!(
                "instance {instance_id} is not reachable"
            )));
        }

        let command_id = format!("cmd-{}", state.sent.len());
        state.running.insert(command_id.clone(), (script, 0));
        Ok(command_id)
    }

    async fn command_status(
        &self,
        command_id: &str,
        _instance_id: &str,
    ) -> ServiceResult<InvocationStatus> {
        let mut state = lock(&self.state);
        state.status_requests += 1;

        let (script, polls) = state
            .running
            .get_mut(command_id)
            .ok_or_else(|| ServiceError::NotFound(format!("command {command_id}")))?;

        let index = (*polls).min(script.statuses.len().saturating_sub(1));
        *polls += 1;

        script
            .statuses
            .get(index)
            .copied()
            .ok_or_else(|| ServiceError::InvalidResponse("empty status script".to_string()))
    }

    async fn command_output(&self, command_id: &str, _instance_id: &str) -> ServiceResult<String> {
        let mut state = lock(&self.state);
        state.output_requests += 1;

        state
            .running
            .get(command_id)
            .map(|(script, _)| script.output.clone())
            .ok_or_else(|| ServiceError::NotFound(format!("command {command_id}")))
    }
}

// ============================================================================
// Parameters, alarms, notifications
// ============================================================================

#[derive(Debug, Default)]
struct ParameterState {
    values: HashMap<String, String>,
    writes: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct MemoryParameterStore {
    state: Mutex<ParameterState>,
}

impl MemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(self, name: &str, value: &str) -> Self {
        lock(&self.state)
            .values
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn value(&self, name: &str) -> Option<String> {
        lock(&self.state).values.get(name).cloned()
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        lock(&self.state).writes.clone()
    }
}

#[async_trait]
impl ParameterStore for MemoryParameterStore {
    async fn get_parameter(&self, name: &str) -> ServiceResult<String> {
        self.value(name)
            .ok_or_else(|| ServiceError::NotFound(format!("parameter {name}")))
    }

    async fn put_parameter(&self, name: &str, value: &str) -> ServiceResult<()> {
        let mut state = lock(&self.state);
        state.values.insert(name.to_string(), value.to_string());
        state.writes.push((name.to_string(), value.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AlarmState {
    alarms: BTreeMap<String, MetricAlarm>,
    calls: usize,
}

#[derive(Debug, Default)]
pub struct MemoryAlarmService {
    state: Mutex<AlarmState>,
}

impl MemoryAlarmService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered alarms ordered by name
    pub fn alarms(&self) -> Vec<MetricAlarm> {
        lock(&self.state).alarms.values().cloned().collect()
    }

    pub fn calls(&self) -> usize {
        lock(&self.state).calls
    }
}

#[async_trait]
impl AlarmService for MemoryAlarmService {
    async fn put_metric_alarm(&self, alarm: &MetricAlarm) -> ServiceResult<()> {
        let mut state = lock(&self.state);
        state.calls += 1;
        state.alarms.insert(alarm.name.clone(), alarm.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryNotificationService {
    messages: Mutex<Vec<String>>,
}

impl MemoryNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

#[async_trait]
impl NotificationService for MemoryNotificationService {
    async fn publish(&self, message: &str) {
        lock(&self.messages).push(message.to_string());
    }
}

/// Typed handles to a full set of in-memory collaborators
#[derive(Clone)]
pub struct MemoryServices {
    pub instances: Arc<MemoryInstanceService>,
    pub commands: Arc<ScriptedCommandService>,
    pub parameters: Arc<MemoryParameterStore>,
    pub alarms: Arc<MemoryAlarmService>,
    pub notifications: Arc<MemoryNotificationService>,
}

impl MemoryServices {
    pub fn new(
        instances: MemoryInstanceService,
        commands: ScriptedCommandService,
        parameters: MemoryParameterStore,
    ) -> Self {
        Self {
            instances: Arc::new(instances),
            commands: Arc::new(commands),
            parameters: Arc::new(parameters),
            alarms: Arc::new(MemoryAlarmService::new()),
            notifications: Arc::new(MemoryNotificationService::new()),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            instances: self.instances.clone(),
            commands: self.commands.clone(),
            parameters: self.parameters.clone(),
            alarms: self.alarms.clone(),
            notifications: self.notifications.clone(),
        }
    }
}
