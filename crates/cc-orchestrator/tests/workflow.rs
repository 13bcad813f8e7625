// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end insights/proposal workflow tests against a fake agent binary.

use cc_orchestrator::{InsightsRequest, Orchestrator, ProposalRequest, RunMode};
use cc_runner::Runner;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn write_fake_agent(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("fake-agent");
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

async fn wait_terminal(runner: &Runner, job_id: cc_core::JobId) -> cc_core::JobSnapshot {
    let mut snapshot = runner.get_job(job_id).await.unwrap();
    for _ in 0..100 {
        if snapshot.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        snapshot = runner.get_job(job_id).await.unwrap();
    }
    snapshot
}

#[tokio::test]
async fn insights_run_writes_markdown_and_json_artifacts() {
    let repo = tempdir().unwrap();
    let agent_home = tempdir().unwrap();
    let agent = write_fake_agent(
        repo.path(),
        "read line\nout=\"\"\nprev=\"\"\nfor arg in \"$@\"; do\n  if [ \"$prev\" = \"-o\" ]; then out=\"$arg\"; fi\n  prev=\"$arg\"\ndone\nprintf '{\"insights_markdown\":\"## done\",\"score\":1}' > \"$out\"\nexit 0\n",
    );

    let runner = Arc::new(Runner::new(agent.to_string_lossy().to_string()));
    let orchestrator = Orchestrator::new(Arc::clone(&runner));

    let (job_id, artifact) = orchestrator
        .start_insights_run(
            repo.path(),
            agent_home.path(),
            InsightsRequest {
                session_id: "sess-1".to_string(),
                prompt: "summarize".to_string(),
                mode: RunMode::Fresh,
                workdir: None,
                model: None,
                output_schema_path: "/schemas/insights.json".to_string(),
            },
        )
        .await
        .unwrap();

    let snapshot = wait_terminal(&runner, job_id).await;
    assert_eq!(snapshot.status, cc_core::JobStatus::Succeeded);

    // Give the detached finalizer a moment past the terminal observation.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let json_contents = std::fs::read_to_string(&artifact.json_path).unwrap();
    assert!(json_contents.contains("\"score\""));
    let md_contents = std::fs::read_to_string(&artifact.markdown_path).unwrap();
    assert_eq!(md_contents, "## done\n");

    let runs_dir = repo.path().join(".codex-orchestrator").join("runs");
    assert!(runs_dir.join(format!("{}.json", job_id.0)).exists());
}

#[tokio::test]
async fn proposal_run_rejects_disallowed_diff_paths() {
    let repo = tempdir().unwrap();
    let agent_home = tempdir().unwrap();
    let agent = write_fake_agent(
        repo.path(),
        "read line\nout=\"\"\nprev=\"\"\nfor arg in \"$@\"; do\n  if [ \"$prev\" = \"-o\" ]; then out=\"$arg\"; fi\n  prev=\"$arg\"\ndone\nprintf '{\"diff\":\"--- a/src/lib.rs\\n+++ b/src/lib.rs\\n\"}' > \"$out\"\nexit 0\n",
    );

    let runner = Arc::new(Runner::new(agent.to_string_lossy().to_string()));
    let orchestrator = Orchestrator::new(Arc::clone(&runner));

    let (job_id, artifact) = orchestrator
        .start_proposal_run(
            repo.path(),
            agent_home.path(),
            ProposalRequest {
                session_id: "sess-1".to_string(),
                insight_json: json!({"score": 1}),
                prompt: None,
                mode: RunMode::Fresh,
                workdir: None,
                model: None,
                output_schema_path: "/schemas/proposal.json".to_string(),
            },
        )
        .await
        .unwrap();

    let snapshot = wait_terminal(&runner, job_id).await;
    assert_eq!(snapshot.status, cc_core::JobStatus::Succeeded);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The finalizer writes the raw diff regardless of allow-list outcome;
    // only `apply_proposal_diff` enforces the allow-list.
    let diff_text = std::fs::read_to_string(&artifact.diff_path).unwrap();
    let outcome = cc_orchestrator::apply_proposal_diff(&artifact.diff_path, repo.path()).unwrap();
    assert!(!outcome.applied);
    assert!(outcome.errors.iter().any(|e| e.contains("Disallowed path")));
    assert!(diff_text.contains("src/lib.rs"));
}

#[test]
fn validate_diff_paths_accepts_agents_md_only() {
    let diff = "--- a/AGENTS.md\n+++ b/AGENTS.md\n@@ -1 +1 @@\n-a\n+b\n";
    let v = cc_orchestrator::validate_diff_paths(diff);
    assert!(v.ok);
}
