//! Resize scenarios: volume resolution, sizing and OS-level extension

use pretty_assertions::assert_eq;
use volume_autoscaler::command::CommandDocument;
use volume_autoscaler::resizer::ResizeOutcome;
use volume_autoscaler::services::memory::{
    CommandScript, MemoryInstanceService, MemoryParameterStore, MemoryServices,
    ScriptedCommandService,
};

use crate::helpers::*;

fn services(instances: MemoryInstanceService, commands: ScriptedCommandService) -> MemoryServices {
    MemoryServices::new(instances, commands, MemoryParameterStore::new())
}

#[tokio::test]
async fn test_legacy_device_resized_and_extended() {
    let memory = services(
        MemoryInstanceService::new()
            .with_mapping("i-1", "/dev/xvda", "vol-root")
            .with_mapping("i-1", "/dev/sdf", "vol-0data")
            .with_volume("vol-0data", 100),
        ScriptedCommandService::new().respond(CommandScript::pending_then_success(2, "")),
    );

    let report = resizer(&memory, true)
        .handle(&linux_alarm("i-1", "xvdf", "ext4", "/data"))
        .await;

    assert_eq!(report.outcome, ResizeOutcome::Completed);
    assert_eq!(
        memory.instances.modifications(),
        vec![("vol-0data".to_string(), 160)]
    );
    assert_eq!(
        report.narrative.lines(),
        [
            "\"EBSUtilisationExceededAlarm-i-1-xvdf\" alarm triggered.",
            "Starting volume scaling for \"i-1\".",
            "Finding volume id.",
            "VolumeId : vol-0data",
            "Current volume size : 100GB",
            "Target volume size  : 160GB",
            "Modifying volume.",
            "Successfully modified volume.",
            "Starting to extend partition \"xvdf\" at OS level.",
            "Volume scaling completed successfully.",
        ]
    );

    let sent = memory.commands.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].document, CommandDocument::ShellScript);
    assert_eq!(sent[0].script(), vec!["sleep 0", "resize2fs /dev/xvdf"]);

    assert_eq!(memory.notifications.messages(), vec![report.narrative.render()]);
}

#[tokio::test]
async fn test_nvme_partition_resolved_from_serial() {
    let memory = services(
        MemoryInstanceService::new().with_volume("vol-0abc123", 20),
        ScriptedCommandService::new()
            .respond(CommandScript::success(
                "nvme0n1 vol0root\nnvme1n1 vol0abc123\n",
            ))
            .respond(CommandScript::success("")),
    );

    let report = resizer(&memory, false)
        .handle(&linux_alarm("i-1", "nvme1n1p1", "xfs", "/data"))
        .await;

    assert_eq!(report.outcome, ResizeOutcome::Completed);
    assert_eq!(
        memory.instances.modifications(),
        vec![("vol-0abc123".to_string(), 32)]
    );
    assert_eq!(memory.instances.mapping_lookups(), 0);

    let sent = memory.commands.sent();
    assert_eq!(sent[0].script(), vec!["lsblk -d -n -o NAME,SERIAL"]);
    assert_eq!(
        sent[1].script(),
        vec!["sleep 0", "growpart /dev/nvme1n1 1", "xfs_growfs -d /data"]
    );
    assert!(memory.notifications.messages().is_empty());
}

#[tokio::test]
async fn test_windows_drive_resolved_through_guest() {
    let memory = services(
        MemoryInstanceService::new().with_volume("vol-0win", 50),
        ScriptedCommandService::new()
            .respond(CommandScript::success("vol0win\r\n"))
            .respond(CommandScript::success("")),
    );

    let report = resizer(&memory, false)
        .handle(&windows_alarm("i-win", "D:"))
        .await;

    assert_eq!(report.outcome, ResizeOutcome::Completed);
    assert_eq!(memory.instances.modifications(), vec![("vol-0win".to_string(), 80)]);

    let sent = memory.commands.sent();
    assert!(
        sent.iter()
            .all(|command| command.document == CommandDocument::PowerShellScript)
    );
    assert!(sent[0].script()[0].contains("-DriveLetter D "));
    assert!(
        report
            .narrative
            .lines()
            .contains(&"Starting to extend partition \"D\" at OS level.".to_string())
    );
}

#[tokio::test]
async fn test_unknown_device_is_reported_without_resize() {
    let memory = services(MemoryInstanceService::new(), ScriptedCommandService::new());

    let report = resizer(&memory, true)
        .handle(&linux_alarm("i-1", "md0", "ext4", "/raid"))
        .await;

    assert_eq!(report.outcome, ResizeOutcome::Unresolved);
    assert!(memory.instances.modifications().is_empty());
    assert!(memory.commands.sent().is_empty());
    assert_eq!(
        &report.narrative.lines()[report.narrative.lines().len() - 2..],
        ["Failed to find volume id.", "Failed to execute volume scaling."]
    );

    let messages = memory.notifications.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].ends_with("Failed to execute volume scaling."));
}

#[tokio::test]
async fn test_unmapped_legacy_letter_is_unresolved() {
    let memory = services(
        MemoryInstanceService::new().with_mapping("i-1", "/dev/xvda", "vol-root"),
        ScriptedCommandService::new(),
    );

    let report = resizer(&memory, false)
        .handle(&linux_alarm("i-1", "sdg", "xfs", "/logs"))
        .await;

    assert_eq!(report.outcome, ResizeOutcome::Unresolved);
    assert_eq!(memory.instances.mapping_lookups(), 1);
    assert!(memory.instances.modifications().is_empty());
}

#[tokio::test]
async fn test_failed_serial_lookup_is_unresolved() {
    let memory = services(
        MemoryInstanceService::new(),
        ScriptedCommandService::new().respond(CommandScript::unreachable()),
    );

    let report = resizer(&memory, false)
        .handle(&windows_alarm("i-win", "E:"))
        .await;

    assert_eq!(report.outcome, ResizeOutcome::Unresolved);
    assert!(memory.instances.modifications().is_empty());
}

#[tokio::test]
async fn test_rejected_modification_stops_before_extension() {
    let memory = services(
        MemoryInstanceService::new()
            .with_mapping("i-1", "/dev/sdf", "vol-0data")
            .with_volume("vol-0data", 100)
            .rejecting_modifications("volume is in optimizing state"),
        ScriptedCommandService::new(),
    );

    let report = resizer(&memory, true)
        .handle(&linux_alarm("i-1", "xvdf", "ext4", "/data"))
        .await;

    assert_eq!(report.outcome, ResizeOutcome::ModifyFailed);
    assert!(memory.commands.sent().is_empty());

    let lines = report.narrative.lines();
    assert_eq!(lines[lines.len() - 2], "Failed to modify volume.");
    assert!(lines[lines.len() - 1].starts_with("ERROR OCCURED :: "));
    assert!(lines[lines.len() - 1].contains("volume is in optimizing state"));
    assert_eq!(memory.notifications.messages().len(), 1);
}

#[tokio::test]
async fn test_notifications_disabled_publishes_nothing() {
    let memory = services(MemoryInstanceService::new(), ScriptedCommandService::new());

    let report = resizer(&memory, false)
        .handle(&linux_alarm("i-1", "loop0", "ext4", "/snap"))
        .await;

    assert_eq!(report.outcome, ResizeOutcome::Unresolved);
    assert!(memory.notifications.messages().is_empty());
}
