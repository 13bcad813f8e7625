// SPDX-License-Identifier: MIT OR Apache-2.0
//! Concurrent subprocess supervisor for headless agent invocations.
//!
//! [`Runner`] owns a registry of [`cc_core::Job`] records keyed by
//! [`JobId`]. Creating a job spawns a detached supervisor task that owns
//! the child process end-to-end; the registry only ever sees the job's
//! bounded tails and, for cancellation, the child's raw pid.
//!
//! Unlike most crates in this workspace, `unsafe` is not denied here: the
//! only use of it is the raw `kill(2)` call needed to cancel a running
//! agent, confined to [`send_sigterm`].

mod argv;

pub use argv::{ApprovalPolicy, ArgvSpec, LocalProvider, SandboxMode};

use cc_core::{AgentEvent, CoordError, Job, JobId, JobSnapshot, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// Parameters accepted by [`Runner::create_job`], mirroring the headless
/// agent's own CLI surface.
#[derive(Debug, Clone)]
pub struct CreateJobOptions {
    /// Prompt text written to the agent's stdin.
    pub task: String,
    /// Working directory, relative to the repo root or absolute.
    pub workdir: Option<String>,
    /// Filesystem access granted to the agent.
    pub sandbox: SandboxMode,
    /// Approval policy for risky actions.
    pub approval: ApprovalPolicy,
    /// Optional model override.
    pub model: Option<String>,
    /// Route through an OSS-compatible provider.
    pub oss: bool,
    /// Optional local model provider.
    pub local_provider: Option<LocalProvider>,
    /// Optional named configuration profile.
    pub profile: Option<String>,
    /// `key=value` config overrides, applied in order given.
    pub config_overrides: Vec<String>,
    /// Optional path to a JSON schema the final message must satisfy.
    pub output_schema_path: Option<String>,
    /// Skip the agent's own git-repo sanity check.
    pub skip_git_repo_check: bool,
    /// Capacity of each output tail; clamped to the supported range.
    pub max_output_lines: usize,
    /// When set, resumes this prior session instead of starting fresh.
    pub resume_session_id: Option<String>,
}

impl Default for CreateJobOptions {
    fn default() -> Self {
        Self {
            task: String::new(),
            workdir: None,
            sandbox: SandboxMode::WorkspaceWrite,
            approval: ApprovalPolicy::Never,
            model: None,
            oss: false,
            local_provider: None,
            profile: None,
            config_overrides: Vec::new(),
            output_schema_path: None,
            skip_git_repo_check: false,
            max_output_lines: cc_core::tail::DEFAULT_CAPACITY,
            resume_session_id: None,
        }
    }
}

struct Entry {
    job: Job,
    /// Populated once the supervisor has spawned the child; read by
    /// `cancel_job` to signal it without holding the child across tasks.
    pid: StdMutex<Option<u32>>,
}

/// Owns the registry of in-flight and completed jobs for one agent binary.
pub struct Runner {
    agent_binary: String,
    entries: AsyncMutex<HashMap<JobId, Arc<Entry>>>,
}

impl Runner {
    /// Create a runner that spawns `agent_binary` (e.g. `"codex"`) for
    /// every job.
    #[must_use]
    pub fn new(agent_binary: impl Into<String>) -> Self {
        Self {
            agent_binary: agent_binary.into(),
            entries: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Register a new job and hand it to a detached supervisor task.
    ///
    /// `repo_root` and `agent_home` are resolved by the caller (see
    /// `cc-paths`) so this crate stays free of filesystem-discovery
    /// concerns.
    pub async fn create_job(
        &self,
        repo_root: &Path,
        agent_home: &Path,
        options: CreateJobOptions,
    ) -> Result<JobSnapshot> {
        let workdir = cc_paths::resolve_workdir(repo_root, options.workdir.as_deref());
        let job_id = JobId::new();

        std::fs::create_dir_all(agent_home)
            .map_err(|e| CoordError::io(agent_home.to_path_buf(), e))?;
        let job_dir = agent_home.join("jobs").join(job_id.to_string());
        std::fs::create_dir_all(&job_dir).map_err(|e| CoordError::io(job_dir.clone(), e))?;
        let last_message_path = job_dir.join("last_message.txt");

        let argv_spec = ArgvSpec {
            agent_binary: &self.agent_binary,
            approval: options.approval,
            sandbox: options.sandbox,
            workdir: &workdir,
            last_message_path: &last_message_path,
            model: options.model.as_deref(),
            oss: options.oss,
            local_provider: options.local_provider,
            profile: options.profile.as_deref(),
            config_overrides: &options.config_overrides,
            output_schema_path: options.output_schema_path.as_deref(),
            skip_git_repo_check: options.skip_git_repo_check,
            resume_session_id: options.resume_session_id.as_deref(),
        };
        let command = argv::build_argv(&argv_spec);

        let job = Job::new(
            job_id,
            options.task,
            command,
            repo_root.to_path_buf(),
            agent_home.to_path_buf(),
            job_dir,
            last_message_path,
            options.max_output_lines,
        );
        let entry = Arc::new(Entry {
            job,
            pid: StdMutex::new(None),
        });

        {
            let mut entries = self.entries.lock().await;
            entries.insert(job_id, Arc::clone(&entry));
        }

        tokio::spawn(supervise(Arc::clone(&entry)));

        Ok(entry.job.snapshot())
    }

    /// Point-in-time view of a job, or `None` if unknown.
    pub async fn get_job(&self, id: JobId) -> Option<JobSnapshot> {
        let entries = self.entries.lock().await;
        entries.get(&id).map(|e| e.job.snapshot())
    }

    /// Request cancellation of a job.
    ///
    /// Returns `false` if the job is unknown, has no child yet (it is
    /// still queued and the supervisor has not spawned it), or is
    /// already terminal. A `true` result means `SIGTERM` was sent (or
    /// the process had already exited, which is not treated as an
    /// error).
    pub async fn cancel_job(&self, id: JobId) -> bool {
        let entry = {
            let entries = self.entries.lock().await;
            match entries.get(&id) {
                Some(e) => Arc::clone(e),
                None => return false,
            }
        };

        let pid = {
            let guard = entry.pid.lock().expect("pid lock poisoned");
            *guard
        };
        let Some(pid) = pid else {
            return false;
        };
        if !entry.job.status().is_active() {
            return false;
        }
        if !entry.job.mark_canceled() {
            return false;
        }

        send_sigterm(pid);
        true
    }

    /// Last `n` stdout lines retained for a job.
    pub async fn stdout_tail(&self, id: JobId, n: usize) -> Option<Vec<String>> {
        let entries = self.entries.lock().await;
        entries.get(&id).map(|e| e.job.stdout_tail.last(n))
    }

    /// Last `n` stderr lines retained for a job.
    pub async fn stderr_tail(&self, id: JobId, n: usize) -> Option<Vec<String>> {
        let entries = self.entries.lock().await;
        entries.get(&id).map(|e| e.job.stderr_tail.last(n))
    }

    /// Last `n` parsed stdout events retained for a job.
    pub async fn events_tail(&self, id: JobId, n: usize) -> Option<Vec<AgentEvent>> {
        let entries = self.entries.lock().await;
        entries.get(&id).map(|e| e.job.events_tail.last(n))
    }
}

async fn supervise(entry: Arc<Entry>) {
    let job = &entry.job;
    if !job.mark_running() {
        return;
    }

    let mut command = Command::new(&job.command()[0]);
    command
        .args(&job.command()[1..])
        .current_dir(job.cwd())
        .env("CODEX_HOME", job.agent_home())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(job_id = %job.id(), error = %e, "failed to spawn agent process");
            job.fail_immediately(&format!("failed to spawn agent process: {e}"));
            return;
        }
    };

    if let Some(pid) = child.id() {
        *entry.pid.lock().expect("pid lock poisoned") = Some(pid);
    }

    if let Some(mut stdin) = child.stdin.take() {
        let mut payload = job.task().as_bytes().to_vec();
        payload.push(b'\n');
        if let Err(e) = stdin.write_all(&payload).await {
            debug!(job_id = %job.id(), error = %e, "failed writing task to agent stdin");
        }
        drop(stdin);
    }

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stdout_task = stdout.map(|out| {
        let job = job_ref(&entry);
        tokio::spawn(async move { read_stdout(job, out).await })
    });
    let stderr_task = stderr.map(|err| {
        let job = job_ref(&entry);
        tokio::spawn(async move { read_stderr(job, err).await })
    });

    if let Some(t) = stdout_task {
        let _ = t.await;
    }
    if let Some(t) = stderr_task {
        let _ = t.await;
    }

    let status = child.wait().await;
    let returncode = match status {
        Ok(status) => Some(exit_code(status)),
        Err(e) => {
            warn!(job_id = %job.id(), error = %e, "failed waiting on agent process");
            None
        }
    };
    job.finish(returncode);
}

/// `Job` is not `Clone`; the reader tasks only need shared access to push
/// into its tails, so they hold the registry's `Arc<Entry>` directly.
fn job_ref(entry: &Arc<Entry>) -> Arc<Entry> {
    Arc::clone(entry)
}

async fn read_stdout(entry: Arc<Entry>, stdout: tokio::process::ChildStdout) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let decoded = String::from_utf8_lossy(&buf);
                let text = decoded.trim_end_matches(['\n', '\r']).to_string();
                entry.job.stdout_tail.push(text.clone());
                if let Ok(event) = serde_json::from_str::<Value>(&text) {
                    if event.is_object() {
                        if let Some(task_id) = extract_task_id(&event) {
                            entry.job.set_task_id_if_absent(task_id);
                        }
                        entry.job.events_tail.push(event);
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "error reading agent stdout");
                break;
            }
        }
    }
}

async fn read_stderr(entry: Arc<Entry>, stderr: tokio::process::ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let decoded = String::from_utf8_lossy(&buf);
                let text = decoded.trim_end_matches(['\n', '\r']).to_string();
                entry.job.stderr_tail.push(text);
            }
            Err(e) => {
                debug!(error = %e, "error reading agent stderr");
                break;
            }
        }
    }
}

/// Depth-first search for a `task_id`/`taskId`/`taskID` string field,
/// checked on the current object before recursing into its values (and,
/// for arrays, each element in order).
fn extract_task_id(event: &Value) -> Option<String> {
    match event {
        Value::Object(map) => {
            for key in ["task_id", "taskId", "taskID"] {
                if let Some(Value::String(s)) = map.get(key) {
                    let trimmed = s.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed.to_string());
                    }
                }
            }
            map.values().find_map(extract_task_id)
        }
        Value::Array(items) => items.iter().find_map(extract_task_id),
        _ => None,
    }
}

/// Exit code, or, on Unix, the negated signal number when the child was
/// terminated by a signal rather than exiting normally — mirroring the
/// host platform's own `returncode` convention.
fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

#[cfg(unix)]
fn send_sigterm(pid: u32) {
    // SAFETY: `kill` with a valid pid and signal number is always safe to
    // call; a missing process (ESRCH) is a normal race with exit, not a
    // programming error, so the return value is intentionally ignored.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_task_id_from_top_level_key() {
        let event = json!({"task_id": " abc123 "});
        assert_eq!(extract_task_id(&event).as_deref(), Some("abc123"));
    }

    #[test]
    fn extracts_task_id_from_camel_case_variant() {
        let event = json!({"taskId": "xyz"});
        assert_eq!(extract_task_id(&event).as_deref(), Some("xyz"));
    }

    #[test]
    fn recurses_into_nested_objects_and_arrays() {
        let event = json!({"msg": {"items": [{"taskID": "nested"}]}});
        assert_eq!(extract_task_id(&event).as_deref(), Some("nested"));
    }

    #[test]
    fn ignores_blank_task_id_values() {
        let event = json!({"task_id": "   ", "taskId": "fallback"});
        assert_eq!(extract_task_id(&event).as_deref(), Some("fallback"));
    }

    #[test]
    fn returns_none_when_absent() {
        let event = json!({"type": "agent_message", "text": "hi"});
        assert_eq!(extract_task_id(&event), None);
    }

    #[test]
    fn exit_code_passes_through_normal_exit() {
        use std::process::Command;
        let status = Command::new("true").status();
        if let Ok(status) = status {
            assert_eq!(exit_code(status), 0);
        }
    }
}
