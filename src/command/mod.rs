//! Remote command protocol
//!
//! Submits a command document to a managed host and blocks the caller until the
//! invocation reaches a terminal status.
//!
//! ## Message Flow
//!
//! ```text
//! send_command → sleep(interval) → command_status ─┬─ Pending/InProgress → sleep again
//!                                                  ├─ Success → command_output → RemoteCommandResult
//!                                                  └─ anything else → Failed
//! ```
//!
//! Dispatch errors, status lookup errors and non-success terminal states all end
//! up as a `Failed` result with empty output. Callers never see a raised error,
//! so "could not execute" and "executed and failed" are handled the same way.

pub mod parse;
pub mod scripts;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, instrument, trace, warn};

use crate::Platform;
use crate::config::PollingConfig;
use crate::services::CommandService;

/// Logical command documents understood by the command service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandDocument {
    #[serde(rename = "AWS-RunShellScript")]
    ShellScript,
    #[serde(rename = "AWS-RunPowerShellScript")]
    PowerShellScript,
    /// Installs and configures the monitoring agent
    #[serde(rename = "CloudWatchAgent")]
    MonitoringAgent,
}

impl CommandDocument {
    pub fn name(&self) -> &'static str {
        match self {
            CommandDocument::ShellScript => "AWS-RunShellScript",
            CommandDocument::PowerShellScript => "AWS-RunPowerShellScript",
            CommandDocument::MonitoringAgent => "CloudWatchAgent",
        }
    }

    /// Script document for the guest platform
    pub fn script_for(platform: Platform) -> Self {
        match platform {
            Platform::Linux => CommandDocument::ShellScript,
            Platform::Windows => CommandDocument::PowerShellScript,
        }
    }

    /// The agent installer has no stdout contract, only its status matters.
    pub fn captures_output(&self) -> bool {
        !matches!(self, CommandDocument::MonitoringAgent)
    }
}

impl fmt::Display for CommandDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Invocation status as reported by the command service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvocationStatus {
    Pending,
    InProgress,
    Success,
    Cancelled,
    TimedOut,
    Failed,
    #[serde(other)]
    Unknown,
}

impl InvocationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvocationStatus::Pending | InvocationStatus::InProgress)
    }
}

/// Parameter map of a command document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandParameters(BTreeMap<String, Vec<String>>);

impl CommandParameters {
    /// Script lines for the shell/PowerShell documents
    pub fn commands<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::single("commands", lines.into_iter().map(Into::into).collect())
    }

    /// Agent configuration key for the monitoring agent document
    pub fn configuration_location(key: impl Into<String>) -> Self {
        Self::single("configurationLocation", vec![key.into()])
    }

    fn single(name: &str, values: Vec<String>) -> Self {
        Self(BTreeMap::from([(name.to_string(), values)]))
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(name).map(Vec::as_slice)
    }
}

/// Outcome of one remote command as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    Failed,
    /// The configured polling ceiling elapsed before a terminal status
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommandResult {
    pub status: CommandOutcome,
    pub output: String,
}

impl RemoteCommandResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: CommandOutcome::Success,
            output: output.into(),
        }
    }

    pub fn failed() -> Self {
        Self {
            status: CommandOutcome::Failed,
            output: String::new(),
        }
    }

    pub fn timed_out() -> Self {
        Self {
            status: CommandOutcome::TimedOut,
            output: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandOutcome::Success
    }
}

/// Executes command documents and polls them to completion
#[derive(Clone)]
pub struct RemoteCommandRunner {
    commands: Arc<dyn CommandService>,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl RemoteCommandRunner {
    pub fn new(commands: Arc<dyn CommandService>, polling: &PollingConfig) -> Self {
        Self {
            commands,
            poll_interval: Duration::from_millis(polling.interval_ms),
            timeout: polling.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Run `document` on `instance_id` and wait for a terminal status
    #[instrument(skip(self, parameters), fields(instance = %instance_id, document = %document))]
    pub async fn execute(
        &self,
        instance_id: &str,
        document: CommandDocument,
        parameters: &CommandParameters,
    ) -> RemoteCommandResult {
        let command_id = match self
            .commands
            .send_command(instance_id, document, parameters)
            .await
        {
            Ok(command_id) => command_id,
            Err(e) => {
                error!(
                    "failed to send command: {e}. Make sure the command agent is installed on the instance and the appropriate role is attached"
                );
                return RemoteCommandResult::failed();
            }
        };

        debug!("command {command_id} submitted");
        let started = Instant::now();

        loop {
            sleep(self.poll_interval).await;

            let status = match self.commands.command_status(&command_id, instance_id).await {
                Ok(status) => status,
                Err(e) => {
                    error!("failed to query status of command {command_id}: {e}");
                    return RemoteCommandResult::failed();
                }
            };

            trace!("command {command_id} is {status:?}");

            if !status.is_terminal() {
                if let Some(timeout) = self.timeout
                    && started.elapsed() >= timeout
                {
                    warn!("command {command_id} still {status:?} after {timeout:?}, giving up");
                    return RemoteCommandResult::timed_out();
                }
                continue;
            }

            if status != InvocationStatus::Success {
                warn!("command {command_id} finished with status {status:?}");
                return RemoteCommandResult::failed();
            }

            if !document.captures_output() {
                return RemoteCommandResult::success(String::new());
            }

            return match self.commands.command_output(&command_id, instance_id).await {
                Ok(output) => RemoteCommandResult::success(output),
                Err(e) => {
                    error!("failed to fetch output of command {command_id}: {e}");
                    RemoteCommandResult::failed()
                }
            };
        }
    }
}
