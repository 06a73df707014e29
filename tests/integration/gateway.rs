//! Resizer runs against the HTTP control-plane gateway

use std::sync::Arc;

use serde_json::json;
use volume_autoscaler::config::{Config, GatewayConfig};
use volume_autoscaler::resizer::{ResizeOutcome, ResizeSettings, Resizer};
use volume_autoscaler::services::Services;
use volume_autoscaler::services::gateway::{GatewayClient, TOKEN_HEADER};
use volume_autoscaler::services::memory::MemoryNotificationService;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn gateway_resizer(server: &MockServer, notifications: Arc<MemoryNotificationService>) -> Resizer {
    let gateway = Arc::new(
        GatewayClient::new(&GatewayConfig {
            url: server.uri(),
            token: Some("gateway-token".to_string()),
            timeout_secs: 5,
        })
        .unwrap(),
    );

    let services = Services {
        instances: gateway.clone(),
        commands: gateway.clone(),
        parameters: gateway.clone(),
        alarms: gateway,
        notifications,
    };

    Resizer::new(
        services,
        &fast_polling(),
        ResizeSettings {
            threshold: THRESHOLD,
            desired: DESIRED,
            os_extend_delay_secs: 0,
            alarm_prefix: ALARM_PREFIX.to_string(),
            notifications_enabled: true,
        },
    )
}

#[tokio::test]
async fn test_legacy_resize_through_gateway() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ec2/block-device-mappings"))
        .and(header(TOKEN_HEADER, "gateway-token"))
        .and(body_partial_json(json!({ "instance_id": "i-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mappings": [
                { "device_name": "/dev/xvda", "volume_id": "vol-root" },
                { "device_name": "/dev/sdf", "volume_id": "vol-0data" }
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ec2/describe-volume"))
        .and(body_partial_json(json!({ "volume_id": "vol-0data" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "size_gb": 100 })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ec2/modify-volume"))
        .and(body_partial_json(json!({ "volume_id": "vol-0data", "size_gb": 160 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ssm/send-command"))
        .and(body_partial_json(json!({ "document_name": "AWS-RunShellScript" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "command_id": "cmd-42" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ssm/command-status"))
        .and(body_partial_json(json!({ "command_id": "cmd-42" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Success" })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ssm/command-output"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "standard_output": "" })))
        .mount(&mock_server)
        .await;

    let notifications = Arc::new(MemoryNotificationService::new());
    let report = gateway_resizer(&mock_server, notifications.clone())
        .handle(&linux_alarm("i-1", "xvdf", "ext4", "/data"))
        .await;

    assert_eq!(report.outcome, ResizeOutcome::Completed);
    assert_eq!(notifications.messages().len(), 1);
}

#[tokio::test]
async fn test_gateway_rejection_reaches_narrative() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ec2/block-device-mappings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mappings": [{ "device_name": "/dev/sdf", "volume_id": "vol-0data" }]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ec2/describe-volume"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "size_gb": 100 })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ec2/modify-volume"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "You've reached the maximum modification rate per volume limit."
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ssm/send-command"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "command_id": "cmd-1" })))
        .expect(0)
        .mount(&mock_server)
        .await;

    let notifications = Arc::new(MemoryNotificationService::new());
    let report = gateway_resizer(&mock_server, notifications.clone())
        .handle(&linux_alarm("i-1", "xvdf", "ext4", "/data"))
        .await;

    assert_eq!(report.outcome, ResizeOutcome::ModifyFailed);
    let messages = notifications.messages();
    assert!(messages[0].contains("maximum modification rate"));
}

#[tokio::test]
async fn test_narrative_reaches_configured_topic() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ec2/block-device-mappings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "mappings": [] })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/sns/publish"))
        .and(header(TOKEN_HEADER, "gateway-token"))
        .and(body_partial_json(json!({ "topic": "arn:scaling-topic" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config: Config = serde_json::from_value(json!({
        "scaling": { "threshold_utilisation": THRESHOLD, "desired_utilisation": DESIRED },
        "gateway": { "url": mock_server.uri(), "token": "gateway-token" },
        "notification": { "enabled": true, "target": { "topic": "arn:scaling-topic" } }
    }))
    .unwrap();

    let resizer = Resizer::new(
        Services::from_config(&config).unwrap(),
        &fast_polling(),
        ResizeSettings::from_config(&config),
    );
    let report = resizer
        .handle(&linux_alarm("i-1", "xvdf", "ext4", "/data"))
        .await;

    assert_eq!(report.outcome, ResizeOutcome::Unresolved);
}
