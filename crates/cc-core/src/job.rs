//! The Job record: one agent invocation and its bounded output tails.

use crate::tail::BoundedTail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

/// Opaque unique identifier for a [`Job`]. Assigned at creation, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a fresh, random job id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a [`Job`].
///
/// Transitions follow the DAG `queued -> running -> {succeeded, failed,
/// canceled}`; `queued -> canceled` is also legal. Terminal states are
/// final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Registered but the supervisor has not yet spawned the child.
    Queued,
    /// The child process is running.
    Running,
    /// The child exited with return code zero.
    Succeeded,
    /// The child exited with a non-zero return code, or failed to spawn.
    Failed,
    /// Cancellation was requested before or during execution.
    Canceled,
}

impl JobStatus {
    /// Whether the job is still alive (not yet in a terminal state).
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Whether the status is one of the three terminal states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

/// A JSON event emitted on the agent's stdout.
pub type AgentEvent = serde_json::Value;

/// Point-in-time, clone-able view of a [`Job`] suitable for returning from
/// an accessor without holding the registry lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Identifier of the job.
    pub id: JobId,
    /// Task text sent to the agent's stdin.
    pub task: String,
    /// Full argv used to spawn the agent binary.
    pub command: Vec<String>,
    /// Working directory the child was spawned in.
    pub cwd: PathBuf,
    /// Resolved agent home directory (`CODEX_HOME`).
    pub agent_home: PathBuf,
    /// Path to the file the agent writes its final message into.
    pub last_message_path: PathBuf,
    /// When the job was created (registered, not yet spawned).
    pub created_at: DateTime<Utc>,
    /// When the supervisor transitioned the job to `running`.
    pub started_at: Option<DateTime<Utc>>,
    /// When the supervisor observed process exit.
    pub finished_at: Option<DateTime<Utc>>,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Process exit code; `None` iff status is queued or running.
    pub returncode: Option<i32>,
    /// First non-empty `task_id` extracted from a stdout event, if any.
    pub task_id: Option<String>,
    /// Retained stdout lines.
    pub stdout_tail: Vec<String>,
    /// Retained stderr lines.
    pub stderr_tail: Vec<String>,
    /// Retained parsed JSON events from stdout.
    pub events_tail: Vec<AgentEvent>,
}

/// One agent invocation and its bounded output tails.
///
/// A `Job` exclusively owns its scratch directory and (while running) its
/// child-process handle; the handle itself is not modeled here — the
/// runner crate stores it alongside the registry entry since it is not
/// `Clone` and must not leak out of the registry lock.
pub struct Job {
    id: JobId,
    task: String,
    command: Vec<String>,
    cwd: PathBuf,
    agent_home: PathBuf,
    #[allow(dead_code)]
    scratch_dir: PathBuf,
    last_message_path: PathBuf,
    created_at: DateTime<Utc>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
    status: Mutex<JobStatus>,
    returncode: Mutex<Option<i32>>,
    task_id: Mutex<Option<String>>,
    pub(crate) stdout_tail: BoundedTail<String>,
    pub(crate) stderr_tail: BoundedTail<String>,
    pub(crate) events_tail: BoundedTail<AgentEvent>,
}

impl Job {
    /// Construct a new job in the `queued` state. Called by the runner at
    /// job-creation time; the child process is not yet spawned.
    #[must_use]
    pub fn new(
        id: JobId,
        task: String,
        command: Vec<String>,
        cwd: PathBuf,
        agent_home: PathBuf,
        scratch_dir: PathBuf,
        last_message_path: PathBuf,
        tail_capacity: usize,
    ) -> Self {
        let capacity = crate::tail::clamp_capacity(tail_capacity);
        Self {
            id,
            task,
            command,
            cwd,
            agent_home,
            scratch_dir,
            last_message_path,
            created_at: Utc::now(),
            started_at: Mutex::new(None),
            finished_at: Mutex::new(None),
            status: Mutex::new(JobStatus::Queued),
            returncode: Mutex::new(None),
            task_id: Mutex::new(None),
            stdout_tail: BoundedTail::new(capacity),
            stderr_tail: BoundedTail::new(capacity),
            events_tail: BoundedTail::new(capacity),
        }
    }

    /// Stable identifier.
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Task text that will be (or was) written to the child's stdin.
    #[must_use]
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Full argv used to spawn the agent binary.
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Working directory the child is spawned in.
    #[must_use]
    pub fn cwd(&self) -> &std::path::Path {
        &self.cwd
    }

    /// Resolved agent home directory.
    #[must_use]
    pub fn agent_home(&self) -> &std::path::Path {
        &self.agent_home
    }

    /// Path to the file the agent writes its final message into.
    #[must_use]
    pub fn last_message_path(&self) -> &std::path::Path {
        &self.last_message_path
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        *self.status.lock().expect("status lock poisoned")
    }

    /// Attempt to transition into `running`, stamping `started_at`.
    ///
    /// Returns `false` (and leaves the job untouched) if it is no longer
    /// `queued` — e.g. it was canceled before the supervisor got to it.
    pub fn mark_running(&self) -> bool {
        let mut status = self.status.lock().expect("status lock poisoned");
        if *status != JobStatus::Queued {
            return false;
        }
        *status = JobStatus::Running;
        *self.started_at.lock().expect("started_at lock poisoned") = Some(Utc::now());
        true
    }

    /// Request cancellation. Returns `false` if the job is already terminal.
    pub fn mark_canceled(&self) -> bool {
        let mut status = self.status.lock().expect("status lock poisoned");
        if status.is_terminal() {
            return false;
        }
        *status = JobStatus::Canceled;
        true
    }

    /// Record process exit: stamps `finished_at` and `returncode`, and
    /// transitions to `succeeded`/`failed` unless the job was already
    /// `canceled` (which is preserved).
    pub fn finish(&self, returncode: Option<i32>) {
        *self.returncode.lock().expect("returncode lock poisoned") = returncode;
        *self.finished_at.lock().expect("finished_at lock poisoned") = Some(Utc::now());
        let mut status = self.status.lock().expect("status lock poisoned");
        if *status == JobStatus::Canceled {
            return;
        }
        *status = match returncode {
            Some(0) => JobStatus::Succeeded,
            _ => JobStatus::Failed,
        };
    }

    /// Force the job into `failed` immediately, e.g. because spawning the
    /// child process itself failed.
    pub fn fail_immediately(&self, reason: &str) {
        self.stderr_tail.push(reason.to_string());
        *self.finished_at.lock().expect("finished_at lock poisoned") = Some(Utc::now());
        *self.status.lock().expect("status lock poisoned") = JobStatus::Failed;
    }

    /// Set the extracted `task_id`, but only the first time — later calls
    /// are no-ops once a value is present.
    pub fn set_task_id_if_absent(&self, candidate: String) {
        let mut guard = self.task_id.lock().expect("task_id lock poisoned");
        if guard.is_none() {
            *guard = Some(candidate);
        }
    }

    /// The first non-empty `task_id` extracted so far, if any.
    #[must_use]
    pub fn task_id(&self) -> Option<String> {
        self.task_id.lock().expect("task_id lock poisoned").clone()
    }

    /// Take an immutable, clone-able snapshot of the job's current state.
    #[must_use]
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            task: self.task.clone(),
            command: self.command.clone(),
            cwd: self.cwd.clone(),
            agent_home: self.agent_home.clone(),
            last_message_path: self.last_message_path.clone(),
            created_at: self.created_at,
            started_at: *self.started_at.lock().expect("started_at lock poisoned"),
            finished_at: *self.finished_at.lock().expect("finished_at lock poisoned"),
            status: self.status(),
            returncode: *self.returncode.lock().expect("returncode lock poisoned"),
            task_id: self.task_id(),
            stdout_tail: self.stdout_tail.snapshot(),
            stderr_tail: self.stderr_tail.snapshot(),
            events_tail: self.events_tail.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job::new(
            JobId::new(),
            "say hi".into(),
            vec!["codex".into(), "exec".into()],
            PathBuf::from("/repo"),
            PathBuf::from("/home/.codex"),
            PathBuf::from("/home/.codex/jobs/x"),
            PathBuf::from("/home/.codex/jobs/x/last_message.txt"),
            100,
        )
    }

    #[test]
    fn starts_queued_with_null_returncode() {
        let job = sample_job();
        assert_eq!(job.status(), JobStatus::Queued);
        assert_eq!(job.snapshot().returncode, None);
    }

    #[test]
    fn running_then_success_sets_returncode_and_timestamps() {
        let job = sample_job();
        assert!(job.mark_running());
        job.finish(Some(0));
        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Succeeded);
        assert_eq!(snap.returncode, Some(0));
        assert!(snap.started_at.unwrap() <= snap.finished_at.unwrap());
    }

    #[test]
    fn nonzero_returncode_is_failed() {
        let job = sample_job();
        job.mark_running();
        job.finish(Some(1));
        assert_eq!(job.status(), JobStatus::Failed);
    }

    #[test]
    fn cancel_before_running_blocks_running_transition() {
        let job = sample_job();
        assert!(job.mark_canceled());
        assert!(!job.mark_running());
        assert_eq!(job.status(), JobStatus::Canceled);
    }

    #[test]
    fn finish_preserves_canceled_status() {
        let job = sample_job();
        job.mark_running();
        job.mark_canceled();
        job.finish(Some(-15));
        assert_eq!(job.status(), JobStatus::Canceled);
        assert_eq!(job.snapshot().returncode, Some(-15));
    }

    #[test]
    fn cancel_is_final_once_terminal() {
        let job = sample_job();
        job.mark_running();
        job.finish(Some(0));
        assert!(!job.mark_canceled());
    }

    #[test]
    fn task_id_is_set_once() {
        let job = sample_job();
        job.set_task_id_if_absent("first".into());
        job.set_task_id_if_absent("second".into());
        assert_eq!(job.task_id().as_deref(), Some("first"));
    }

    #[test]
    fn fail_immediately_records_reason_in_stderr_tail() {
        let job = sample_job();
        job.fail_immediately("spawn failed: no such file");
        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Failed);
        assert_eq!(snap.returncode, None);
        assert!(snap.stderr_tail.iter().any(|l| l.contains("spawn failed")));
    }
}
