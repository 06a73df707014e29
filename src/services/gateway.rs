//! JSON-over-HTTP control-plane gateway
//!
//! Every operation is a `POST {url}/<service>/<operation>` carrying a JSON body
//! and answered with a JSON body. Errors come back as `{"message": "..."}` with a
//! non-2xx status.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{instrument, trace};

use super::error::{ServiceError, ServiceResult};
use super::{
    AlarmService, BlockDeviceMapping, CommandService, Instance, InstanceService, MetricAlarm,
    ParameterStore,
};
use crate::command::{CommandDocument, CommandParameters, InvocationStatus};
use crate::config::GatewayConfig;

/// Header carrying the gateway token
pub const TOKEN_HEADER: &str = "X-AUTOSCALER-TOKEN";

#[derive(Debug, serde::Deserialize)]
struct GatewayErrorBody {
    message: String,
}

#[derive(Debug, serde::Deserialize)]
struct InstancesResponse {
    instances: Vec<Instance>,
}

#[derive(Debug, serde::Deserialize)]
struct VolumeResponse {
    size_gb: u64,
}

#[derive(Debug, serde::Deserialize)]
struct MappingsResponse {
    mappings: Vec<BlockDeviceMapping>,
}

#[derive(Debug, serde::Deserialize)]
struct SendCommandResponse {
    command_id: String,
}

#[derive(Debug, serde::Deserialize)]
struct StatusResponse {
    status: InvocationStatus,
}

#[derive(Debug, serde::Deserialize)]
struct OutputResponse {
    #[serde(default)]
    standard_output: String,
}

#[derive(Debug, serde::Deserialize)]
struct ParameterResponse {
    value: String,
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    /// HTTP client (reused across requests)
    client: reqwest::Client,

    base_url: String,

    token: Option<String>,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    #[instrument(skip(self, body))]
    async fn call<B>(&self, operation: &str, body: &B) -> ServiceResult<reqwest::Response>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = format!("{}/{}", self.base_url, operation);
        trace!("calling {url}");

        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<GatewayErrorBody>()
            .await
            .map(|body| body.message)
            .unwrap_or_else(|_| status.to_string());

        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(message));
        }

        Err(ServiceError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    /// Publish plain text to a notification topic
    pub async fn publish_to_topic(&self, topic: &str, message: &str) -> ServiceResult<()> {
        self.call("sns/publish", &json!({ "topic": topic, "message": message }))
            .await?;
        Ok(())
    }

    async fn call_json<B, R>(&self, operation: &str, body: &B) -> ServiceResult<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let response = self.call(operation, body).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ServiceError::InvalidResponse(format!("{operation}: {e}"))
        })
    }
}

#[async_trait]
impl InstanceService for GatewayClient {
    async fn describe_instances(&self) -> ServiceResult<Vec<Instance>> {
        let response: InstancesResponse = self
            .call_json("ec2/describe-instances", &json!({}))
            .await?;
        Ok(response.instances)
    }

    async fn describe_instance(&self, instance_id: &str) -> ServiceResult<Instance> {
        let response: InstancesResponse = self
            .call_json(
                "ec2/describe-instances",
                &json!({ "instance_ids": [instance_id] }),
            )
            .await?;

        response
            .instances
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::NotFound(format!("instance {instance_id}")))
    }

    async fn volume_size(&self, volume_id: &str) -> ServiceResult<u64> {
        let response: VolumeResponse = self
            .call_json("ec2/describe-volume", &json!({ "volume_id": volume_id }))
            .await?;
        Ok(response.size_gb)
    }

    async fn block_device_mappings(
        &self,
        instance_id: &str,
    ) -> ServiceResult<Vec<BlockDeviceMapping>> {
        let response: MappingsResponse = self
            .call_json(
                "ec2/block-device-mappings",
                &json!({ "instance_id": instance_id }),
            )
            .await?;
        Ok(response.mappings)
    }

    async fn modify_volume(&self, volume_id: &str, size_gb: u64) -> ServiceResult<()> {
        self.call(
            "ec2/modify-volume",
            &json!({ "volume_id": volume_id, "size_gb": size_gb }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CommandService for GatewayClient {
    async fn send_command(
        &self,
        instance_id: &str,
        document: CommandDocument,
        parameters: &CommandParameters,
    ) -> ServiceResult<String> {
        let response: SendCommandResponse = self
            .call_json(
                "ssm/send-command",
                &json!({
                    "instance_ids": [instance_id],
                    "document_name": document,
                    "parameters": parameters,
                }),
            )
            .await?;
        Ok(response.command_id)
    }

    async fn command_status(
        &self,
        command_id: &str,
        instance_id: &str,
    ) -> ServiceResult<InvocationStatus> {
        let response: StatusResponse = self
            .call_json(
                "ssm/command-status",
                &json!({ "command_id": command_id, "instance_id": instance_id }),
            )
            .await?;
        Ok(response.status)
    }

    async fn command_output(&self, command_id: &str, instance_id: &str) -> ServiceResult<String> {
        let response: OutputResponse = self
            .call_json(
                "ssm/command-output",
                &json!({ "command_id": command_id, "instance_id": instance_id }),
            )
            .await?;
        Ok(response.standard_output)
    }
}

#[async_trait]
impl ParameterStore for GatewayClient {
    async fn get_parameter(&self, name: &str) -> ServiceResult<String> {
        let response: ParameterResponse = self
            .call_json("ssm/get-parameter", &json!({ "name": name }))
            .await?;
        Ok(response.value)
    }

    async fn put_parameter(&self, name: &str, value: &str) -> ServiceResult<()> {
        self.call(
            "ssm/put-parameter",
            &json!({ "name": name, "value": value, "overwrite": true }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AlarmService for GatewayClient {
    async fn put_metric_alarm(&self, alarm: &MetricAlarm) -> ServiceResult<()> {
        self.call("cloudwatch/put-metric-alarm", alarm).await?;
        Ok(())
    }
}
