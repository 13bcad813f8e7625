// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end supervisor tests against a fake agent binary.

use cc_core::JobStatus;
use cc_runner::{ApprovalPolicy, CreateJobOptions, Runner, SandboxMode};
use std::io::Write;
use std::time::Duration;
use tempfile::tempdir;

/// Write an executable script that stands in for the real agent binary.
/// It ignores its argv (the runner always prepends its own flags) and
/// only reacts to stdin.
fn write_fake_agent(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    write!(file, "{body}").unwrap();
    drop(file);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

fn base_options(task: &str) -> CreateJobOptions {
    CreateJobOptions {
        task: task.to_string(),
        sandbox: SandboxMode::WorkspaceWrite,
        approval: ApprovalPolicy::Never,
        ..CreateJobOptions::default()
    }
}

#[tokio::test]
async fn job_completes_successfully_and_captures_events() {
    let repo = tempdir().unwrap();
    let agent_home = tempdir().unwrap();
    let agent = write_fake_agent(
        repo.path(),
        "fake-agent",
        "read line\necho '{\"type\":\"agent_message\",\"task_id\":\"abc\"}'\nexit 0\n",
    );

    let runner = Runner::new(agent.to_string_lossy().to_string());
    let snapshot = runner
        .create_job(repo.path(), agent_home.path(), base_options("hello"))
        .await
        .unwrap();

    let mut final_snapshot = snapshot.clone();
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        final_snapshot = runner.get_job(snapshot.id).await.unwrap();
        if final_snapshot.status.is_terminal() {
            break;
        }
    }

    assert_eq!(final_snapshot.status, JobStatus::Succeeded);
    assert_eq!(final_snapshot.returncode, Some(0));
    assert_eq!(final_snapshot.task_id.as_deref(), Some("abc"));
    assert!(!final_snapshot.events_tail.is_empty());
}

#[tokio::test]
async fn nonzero_exit_marks_job_failed() {
    let repo = tempdir().unwrap();
    let agent_home = tempdir().unwrap();
    let agent = write_fake_agent(repo.path(), "fake-agent", "read line\nexit 7\n");

    let runner = Runner::new(agent.to_string_lossy().to_string());
    let snapshot = runner
        .create_job(repo.path(), agent_home.path(), base_options("hello"))
        .await
        .unwrap();

    let mut final_snapshot = snapshot.clone();
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        final_snapshot = runner.get_job(snapshot.id).await.unwrap();
        if final_snapshot.status.is_terminal() {
            break;
        }
    }

    assert_eq!(final_snapshot.status, JobStatus::Failed);
    assert_eq!(final_snapshot.returncode, Some(7));
}

#[tokio::test]
async fn canceling_a_running_job_terminates_it() {
    let repo = tempdir().unwrap();
    let agent_home = tempdir().unwrap();
    let agent = write_fake_agent(repo.path(), "fake-agent", "read line\nsleep 30\n");

    let runner = Runner::new(agent.to_string_lossy().to_string());
    let snapshot = runner
        .create_job(repo.path(), agent_home.path(), base_options("hello"))
        .await
        .unwrap();

    // Give the supervisor time to spawn the child and record its pid.
    let mut running = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let snap = runner.get_job(snapshot.id).await.unwrap();
        if snap.status == JobStatus::Running {
            running = true;
            break;
        }
    }
    assert!(running, "job never reached running");

    assert!(runner.cancel_job(snapshot.id).await);

    let mut final_snapshot = snapshot.clone();
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        final_snapshot = runner.get_job(snapshot.id).await.unwrap();
        if final_snapshot.status.is_terminal() {
            break;
        }
    }
    assert_eq!(final_snapshot.status, JobStatus::Canceled);
}

#[tokio::test]
async fn canceling_an_unknown_job_returns_false() {
    let runner = Runner::new("codex");
    assert!(!runner.cancel_job(cc_core::JobId::new()).await);
}

#[tokio::test]
async fn spawn_failure_marks_job_failed_with_null_returncode() {
    let repo = tempdir().unwrap();
    let agent_home = tempdir().unwrap();

    let runner = Runner::new(repo.path().join("does-not-exist").to_string_lossy().to_string());
    let snapshot = runner
        .create_job(repo.path(), agent_home.path(), base_options("hello"))
        .await
        .unwrap();

    let mut final_snapshot = snapshot.clone();
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        final_snapshot = runner.get_job(snapshot.id).await.unwrap();
        if final_snapshot.status.is_terminal() {
            break;
        }
    }

    assert_eq!(final_snapshot.status, JobStatus::Failed);
    assert_eq!(final_snapshot.returncode, None);
}
