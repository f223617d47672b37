mod common;

use chrono::Utc;
use common::{FakeNetwork, executor, executor_with_deadline, profile};
use netguard::core::{Device, DeviceOutcome, FailureKind, TaskDescriptor, TaskExecutor};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn task(commands: &[&str]) -> TaskDescriptor {
    let device = Device {
        id: "dev-1".to_string(),
        name: "edge-1".to_string(),
        address: "10.0.0.1".to_string(),
        vendor: "Cisco IOS".to_string(),
        location: "Unknown".to_string(),
        last_backup: None,
        created_at: Utc::now(),
    };
    let commands: Vec<String> = commands.iter().map(|c| c.to_string()).collect();
    TaskDescriptor::new(&device, Arc::new(profile()), commands.into())
}

#[tokio::test]
async fn test_failed_command_is_recorded_inline_and_later_commands_run() {
    let network = Arc::new(FakeNetwork::new());
    network.fail_command("show ip route");
    let dir = TempDir::new().unwrap();

    let outcome = executor(network.clone(), dir.path())
        .execute(&task(&["show version", "show ip route", "show running-config"]))
        .await;

    let success = match outcome {
        DeviceOutcome::Success(success) => success,
        other => panic!("a failed command must not fail the device: {:?}", other),
    };
    let content = &success.content;

    let failed = content.find("# Command: show ip route\n[ERROR] ").unwrap();
    let after = content.find("# Command: show running-config\n").unwrap();
    assert!(content.find("# Command: show version\n").unwrap() < failed);
    assert!(failed < after);
    assert!(content.contains("10.0.0.1:22"));
    assert!(content.contains("10.0.0.1# show running-config"));

    let on_disk = std::fs::read_to_string(dir.path().join(&success.filename)).unwrap();
    assert_eq!(&on_disk, content);
    assert_eq!(network.active(), 0);
}

#[tokio::test]
async fn test_session_deadline_is_a_connection_timeout() {
    let network = Arc::new(FakeNetwork::new());
    network.stream_endlessly("10.0.0.1");
    let dir = TempDir::new().unwrap();

    let outcome = executor_with_deadline(network.clone(), dir.path(), Duration::from_millis(200))
        .execute(&task(&["show tech-support"]))
        .await;

    let failure = match outcome {
        DeviceOutcome::Failure(failure) => failure,
        other => panic!("endless output must hit the session deadline: {:?}", other),
    };
    assert_eq!(failure.kind, FailureKind::ConnectionTimeout);
    assert!(failure.message.contains("10.0.0.1:22"), "{}", failure.message);
    assert_eq!(network.active(), 0);
    assert!(!dir.path().join("edge-1_10.0.0.1.cfg").exists());
}

#[tokio::test]
async fn test_rejected_login_short_circuits_the_command_loop() {
    let network = Arc::new(FakeNetwork::new());
    network.reject("10.0.0.1");
    let dir = TempDir::new().unwrap();

    let outcome = executor(network.clone(), dir.path())
        .execute(&task(&["show version", "show running-config"]))
        .await;

    let failure = match outcome {
        DeviceOutcome::Failure(failure) => failure,
        other => panic!("rejected credentials must fail the device: {:?}", other),
    };
    assert_eq!(failure.kind, FailureKind::Authentication);
    assert_eq!(network.connects(), 1);
    assert_eq!(network.active(), 0);
    assert!(!dir.path().join("edge-1_10.0.0.1.cfg").exists());
}
