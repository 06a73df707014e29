//! Provisioning scenarios: discovery, agent configuration and alarm registration

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::Value;
use volume_autoscaler::Dimension;
use volume_autoscaler::command::{CommandDocument, CommandOutcome};
use volume_autoscaler::provisioner::ProvisionError;
use volume_autoscaler::provisioner::ProvisionEvent;
use volume_autoscaler::provisioner::discovery::DiscoveryError;
use volume_autoscaler::services::ComparisonOperator;
use volume_autoscaler::services::memory::{
    CommandScript, MemoryInstanceService, MemoryParameterStore, MemoryServices,
    ScriptedCommandService,
};

use crate::helpers::*;

fn two_disks() -> String {
    block_devices(serde_json::json!([
        { "name": "nvme0n1", "fstype": null, "mountpoint": null, "children": [
            { "name": "nvme0n1p1", "fstype": "xfs", "mountpoint": "/" }
        ]},
        { "name": "nvme1n1", "fstype": "ext4", "mountpoint": "/data" },
        { "name": "nvme2n1", "fstype": null, "mountpoint": null }
    ]))
}

fn single_disk(fstype: &str, mountpoint: &str) -> String {
    block_devices(serde_json::json!([
        { "name": "xvdf", "fstype": fstype, "mountpoint": mountpoint }
    ]))
}

fn linux_host(commands: ScriptedCommandService) -> MemoryServices {
    MemoryServices::new(
        MemoryInstanceService::new().with_instance("i-linux", None),
        commands,
        MemoryParameterStore::new().with_parameter(LINUX_AGENT_CONFIG, &agent_config_json()),
    )
}

fn linux_round(commands: ScriptedCommandService, listing: &str) -> ScriptedCommandService {
    commands
        .respond(CommandScript::pending_then_success(2, listing))
        .respond(CommandScript::pending_then_success(3, ""))
        .respond(CommandScript::success(listing))
}

#[tokio::test]
async fn test_two_linux_disks_get_two_alarms() {
    let memory = linux_host(linux_round(ScriptedCommandService::new(), &two_disks()));

    let reports = provisioner(&memory)
        .handle(&ProvisionEvent::new("i-linux"))
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_matches!(reports[0].result, Ok(2));

    let alarms = memory.alarms.alarms();
    let names: Vec<&str> = alarms.iter().map(|alarm| alarm.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "EBSUtilisationExceededAlarm-i-linux-nvme0n1p1",
            "EBSUtilisationExceededAlarm-i-linux-nvme1n1",
        ]
    );

    for alarm in &alarms {
        assert_eq!(alarm.comparison, ComparisonOperator::GreaterThanThreshold);
        assert_eq!(alarm.threshold, f64::from(THRESHOLD));
        assert_eq!(alarm.metric_name, "disk_used_percent");
        assert_eq!(alarm.statistic, "Average");
        assert_eq!(alarm.period_secs, 60);
        assert_eq!(alarm.alarm_actions, vec!["arn:alarm-topic"]);
    }
    assert!(alarms[1].dimensions.contains(&Dimension::new("path", "/data")));
    assert!(alarms[1].dimensions.contains(&Dimension::new("fstype", "ext4")));
}

#[tokio::test]
async fn test_agent_config_points_at_discovered_mounts() {
    let memory = linux_host(linux_round(ScriptedCommandService::new(), &two_disks()));

    provisioner(&memory)
        .handle(&ProvisionEvent::new("i-linux"))
        .await
        .unwrap();

    let stored: Value =
        serde_json::from_str(&memory.parameters.value(LINUX_AGENT_CONFIG).unwrap()).unwrap();
    assert_eq!(
        stored["metrics"]["metrics_collected"]["disk"]["resources"],
        serde_json::json!(["/", "/data"])
    );
    assert_eq!(stored["agent"]["metrics_collection_interval"], 60);

    let sent = memory.commands.sent();
    let documents: Vec<CommandDocument> = sent.iter().map(|command| command.document).collect();
    assert_eq!(
        documents,
        vec![
            CommandDocument::ShellScript,
            CommandDocument::MonitoringAgent,
            CommandDocument::ShellScript,
        ]
    );
    assert!(sent.iter().all(|command| command.instance_id == "i-linux"));
}

#[tokio::test]
async fn test_windows_drive_gets_inverted_alarm() {
    let memory = MemoryServices::new(
        MemoryInstanceService::new().with_instance("i-windows", Some("windows")),
        ScriptedCommandService::new()
            .respond(CommandScript::success("\r\n\r\nD\r\n"))
            .respond(CommandScript::success("")),
        MemoryParameterStore::new().with_parameter(WINDOWS_AGENT_CONFIG, &agent_config_json()),
    );

    let reports = provisioner(&memory)
        .handle(&ProvisionEvent::new("i-windows"))
        .await
        .unwrap();

    assert_matches!(reports[0].result, Ok(1));

    let alarms = memory.alarms.alarms();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].name, "EBSUtilisationExceededAlarm-i-windows-D:");
    assert_eq!(alarms[0].comparison, ComparisonOperator::LessThanThreshold);
    assert_eq!(alarms[0].threshold, f64::from(100 - THRESHOLD));
    assert!(alarms[0].dimensions.contains(&Dimension::new("instance", "D:")));

    let stored: Value =
        serde_json::from_str(&memory.parameters.value(WINDOWS_AGENT_CONFIG).unwrap()).unwrap();
    assert_eq!(
        stored["metrics"]["metrics_collected"]["LogicalDisk"]["resources"],
        serde_json::json!(["D:"])
    );
    assert_eq!(memory.commands.sent()[0].document, CommandDocument::PowerShellScript);
}

#[tokio::test]
async fn test_failed_discovery_touches_nothing() {
    let memory = linux_host(ScriptedCommandService::new().respond(CommandScript::failed()));

    let reports = provisioner(&memory)
        .handle(&ProvisionEvent::new("i-linux"))
        .await
        .unwrap();

    assert_matches!(
        reports[0].result,
        Err(ProvisionError::Discovery(DiscoveryError::CommandFailed))
    );
    assert!(memory.parameters.writes().is_empty());
    assert_eq!(memory.alarms.calls(), 0);
    assert_eq!(memory.commands.sent().len(), 1);
}

#[tokio::test]
async fn test_empty_discovery_never_reaches_alarms() {
    let memory = linux_host(
        ScriptedCommandService::new().respond(CommandScript::success(&block_devices(
            serde_json::json!([
                { "name": "xvda", "fstype": null, "mountpoint": null },
                { "name": "xvdb", "fstype": "swap", "mountpoint": "[SWAP]" }
            ]),
        ))),
    );

    let reports = provisioner(&memory)
        .handle(&ProvisionEvent::new("i-linux"))
        .await
        .unwrap();

    assert_matches!(
        reports[0].result,
        Err(ProvisionError::Discovery(DiscoveryError::NoDisks))
    );
    assert!(memory.parameters.writes().is_empty());
    assert_eq!(memory.alarms.calls(), 0);
}

#[tokio::test]
async fn test_empty_metadata_round_registers_nothing() {
    let memory = linux_host(
        ScriptedCommandService::new()
            .respond(CommandScript::success(&two_disks()))
            .respond(CommandScript::success(""))
            .respond(CommandScript::success("")),
    );

    let reports = provisioner(&memory)
        .handle(&ProvisionEvent::new("i-linux"))
        .await
        .unwrap();

    assert_matches!(
        reports[0].result,
        Err(ProvisionError::Metadata(DiscoveryError::NoDisks))
    );
    assert_eq!(memory.alarms.calls(), 0);
}

#[tokio::test]
async fn test_provisioning_twice_overwrites() {
    let commands = linux_round(
        linux_round(ScriptedCommandService::new(), &two_disks()),
        &two_disks(),
    );
    let memory = linux_host(commands);
    let provisioner = provisioner(&memory);

    provisioner
        .handle(&ProvisionEvent::new("i-linux"))
        .await
        .unwrap();
    let first_alarms = memory.alarms.alarms();
    let first_config = memory.parameters.value(LINUX_AGENT_CONFIG);

    provisioner
        .handle(&ProvisionEvent::new("i-linux"))
        .await
        .unwrap();

    assert_eq!(memory.alarms.alarms(), first_alarms);
    assert_eq!(memory.alarms.calls(), 4);
    assert_eq!(memory.parameters.value(LINUX_AGENT_CONFIG), first_config);
    assert_eq!(memory.parameters.writes().len(), 2);
}

#[tokio::test]
async fn test_wildcard_continues_after_failed_target() {
    let commands = ScriptedCommandService::new()
        // i-broken: agent install fails on the host
        .respond(CommandScript::success(&two_disks()))
        .respond(CommandScript::failed());
    let commands = linux_round(commands, &single_disk("ext4", "/data"));

    let memory = MemoryServices::new(
        MemoryInstanceService::new()
            .with_instance("i-broken", None)
            .with_instance("i-healthy", Some("")),
        commands,
        MemoryParameterStore::new().with_parameter(LINUX_AGENT_CONFIG, &agent_config_json()),
    );

    let reports = provisioner(&memory)
        .handle(&ProvisionEvent::new("*"))
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].instance_id, "i-broken");
    assert_matches!(
        reports[0].result,
        Err(ProvisionError::AgentInstall(CommandOutcome::Failed))
    );
    assert_eq!(reports[1].instance_id, "i-healthy");
    assert_matches!(reports[1].result, Ok(1));

    let alarms = memory.alarms.alarms();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].name, "EBSUtilisationExceededAlarm-i-healthy-xvdf");
}

#[tokio::test]
async fn test_missing_windows_config_skips_target() {
    let memory = MemoryServices::new(
        MemoryInstanceService::new()
            .with_instance("i-windows", Some("windows"))
            .with_instance("i-linux", None),
        linux_round(ScriptedCommandService::new(), &single_disk("xfs", "/data")),
        MemoryParameterStore::new().with_parameter(LINUX_AGENT_CONFIG, &agent_config_json()),
    );

    let reports = provisioner(&memory)
        .handle(&ProvisionEvent::new("*"))
        .await
        .unwrap();

    assert_matches!(reports[0].result, Err(ProvisionError::ConfigUnavailable(_)));
    assert_matches!(reports[1].result, Ok(1));
    assert!(
        memory
            .commands
            .sent()
            .iter()
            .all(|command| command.instance_id == "i-linux")
    );
}

#[tokio::test]
async fn test_spaced_mount_path_reaches_config_and_alarm() {
    let listing = single_disk("ext4", "/mnt/my data");
    let memory = linux_host(linux_round(ScriptedCommandService::new(), &listing));

    let reports = provisioner(&memory)
        .handle(&ProvisionEvent::new("i-linux"))
        .await
        .unwrap();

    assert_matches!(reports[0].result, Ok(1));

    let stored: Value =
        serde_json::from_str(&memory.parameters.value(LINUX_AGENT_CONFIG).unwrap()).unwrap();
    assert_eq!(
        stored["metrics"]["metrics_collected"]["disk"]["resources"],
        serde_json::json!(["/mnt/my data"])
    );

    let alarms = memory.alarms.alarms();
    assert!(alarms[0].dimensions.contains(&Dimension::new("path", "/mnt/my data")));
}
