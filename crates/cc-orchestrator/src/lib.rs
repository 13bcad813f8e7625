// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Two-phase insights/proposal workflow orchestration.
//!
//! [`Orchestrator`] composes [`cc_runner::Runner`] jobs with a polling
//! finalizer that turns the agent's final JSON message into durable
//! artifacts under `<repo_root>/.codex-orchestrator/`.

mod diff;
mod task;

pub use diff::{apply_proposal_diff, validate_diff_paths, ApplyOutcome, DiffValidation};

use cc_core::{InsightsArtifact, JobId, ProposalArtifact, Role, RunKind, RunMeta};
use cc_runner::{CreateJobOptions, Runner};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

const FINALIZER_POLL_INTERVAL: Duration = Duration::from_millis(250);
const ARTIFACT_ID_SEPARATOR: &str = "__";

/// Whether phase one starts a fresh conversation or resumes/forks an
/// existing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Start a fresh agent run unrelated to any prior session.
    Fresh,
    /// Resume the named session directly (`resume_session_id` passed through).
    Resume,
    /// Fork from the named session by embedding its rendered transcript in
    /// the task text, but starting a new agent run.
    Fork,
}

/// Parameters for [`Orchestrator::start_insights_run`].
#[derive(Debug, Clone)]
pub struct InsightsRequest {
    /// Session the insights are generated from (and, in fork mode, whose
    /// transcript is embedded).
    pub session_id: String,
    /// Caller-supplied prompt appended after any embedded transcript.
    pub prompt: String,
    /// Fresh, resume, or fork.
    pub mode: RunMode,
    /// Optional working directory override.
    pub workdir: Option<String>,
    /// Optional model override.
    pub model: Option<String>,
    /// Path to the JSON schema the agent's final message must satisfy.
    pub output_schema_path: String,
}

/// Parameters for [`Orchestrator::start_proposal_run`].
#[derive(Debug, Clone)]
pub struct ProposalRequest {
    /// Session the proposal builds on.
    pub session_id: String,
    /// The insights JSON produced by phase one, embedded into the prompt.
    pub insight_json: serde_json::Value,
    /// Optional additional caller prompt.
    pub prompt: Option<String>,
    /// Fresh, resume, or fork.
    pub mode: RunMode,
    /// Optional working directory override.
    pub workdir: Option<String>,
    /// Optional model override.
    pub model: Option<String>,
    /// Path to the JSON schema the agent's final message must satisfy.
    pub output_schema_path: String,
}

/// Everything the finalizer needs to materialize a finished insights run.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InsightsFinalizeMeta {
    artifact: InsightsArtifact,
}

/// Everything the finalizer needs to materialize a finished proposal run.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProposalFinalizeMeta {
    artifact: ProposalArtifact,
}

/// JSON payload written alongside a proposal's diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProposalMetaFile {
    proposal_id: Uuid,
    session_id: String,
    created_at: DateTime<Utc>,
    job_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    files_touched: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    safety_notes: Option<String>,
}

enum PendingKind {
    Insights(InsightsFinalizeMeta),
    Proposal(ProposalFinalizeMeta),
}

/// Coordinates insights and proposal runs against a [`Runner`].
pub struct Orchestrator {
    runner: Arc<Runner>,
    insights: Mutex<BTreeMap<JobId, InsightsArtifact>>,
    proposals: Mutex<BTreeMap<JobId, ProposalArtifact>>,
}

impl Orchestrator {
    /// Build an orchestrator on top of an existing job runner.
    #[must_use]
    pub fn new(runner: Arc<Runner>) -> Self {
        Self {
            runner,
            insights: Mutex::new(BTreeMap::new()),
            proposals: Mutex::new(BTreeMap::new()),
        }
    }

    /// Start phase one: generate insights about `request.session_id`.
    pub async fn start_insights_run(
        &self,
        repo_root: &Path,
        agent_home: &Path,
        request: InsightsRequest,
    ) -> cc_core::Result<(JobId, InsightsArtifact)> {
        let insights_dir = repo_root
            .join(".codex-orchestrator")
            .join("insights")
            .join(&request.session_id);
        std::fs::create_dir_all(&insights_dir)
            .map_err(|e| cc_core::CoordError::io(insights_dir.clone(), e))?;

        let artifact_id = Uuid::new_v4();
        let now = Utc::now();
        let slug = timestamp_slug(now);
        let stem = format!("{slug}{ARTIFACT_ID_SEPARATOR}{artifact_id}");
        let markdown_path = insights_dir.join(format!("{stem}.md"));
        let json_path = insights_dir.join(format!("{stem}.json"));

        let transcript = if request.mode == RunMode::Fork {
            Some(rendered_transcript(agent_home, &request.session_id))
        } else {
            None
        };
        let task_text = task::insights_task(transcript.as_deref(), &request.prompt);

        let options = CreateJobOptions {
            task: task_text,
            workdir: request.workdir,
            sandbox: cc_runner::SandboxMode::ReadOnly,
            approval: cc_runner::ApprovalPolicy::Never,
            model: request.model,
            output_schema_path: Some(request.output_schema_path),
            resume_session_id: (request.mode == RunMode::Resume)
                .then(|| request.session_id.clone()),
            ..CreateJobOptions::default()
        };

        let snapshot = self.runner.create_job(repo_root, agent_home, options).await?;
        let job_id = snapshot.id;

        let artifact = InsightsArtifact {
            artifact_id,
            session_id: request.session_id.clone(),
            markdown_path,
            json_path,
            created_at: now,
        };

        {
            let mut insights = self.insights.lock().await;
            insights.insert(job_id, artifact.clone());
        }

        persist_run_meta(
            repo_root,
            &RunMeta {
                job_id: job_id.0,
                kind: RunKind::Insights,
                created_at: now,
                command: snapshot.command.clone(),
                workdir: snapshot.cwd.clone(),
                agent_home: snapshot.agent_home.clone(),
                outputs: BTreeMap::from([("artifact_id".to_string(), artifact_id.to_string())]),
            },
        )?;

        spawn_finalizer(
            Arc::clone(&self.runner),
            job_id,
            PendingKind::Insights(InsightsFinalizeMeta {
                artifact: artifact.clone(),
            }),
        );

        Ok((job_id, artifact))
    }

    /// Start phase two: turn phase-one insights into a proposed diff.
    pub async fn start_proposal_run(
        &self,
        repo_root: &Path,
        agent_home: &Path,
        request: ProposalRequest,
    ) -> cc_core::Result<(JobId, ProposalArtifact)> {
        let proposal_id = Uuid::new_v4();
        let proposal_dir = repo_root
            .join(".codex-orchestrator")
            .join("proposals")
            .join(proposal_id.to_string());
        std::fs::create_dir_all(&proposal_dir)
            .map_err(|e| cc_core::CoordError::io(proposal_dir.clone(), e))?;

        let diff_path = proposal_dir.join("proposal.diff");
        let meta_path = proposal_dir.join("meta.json");

        let transcript = if request.mode == RunMode::Fork {
            Some(rendered_transcript(agent_home, &request.session_id))
        } else {
            None
        };
        let task_text = task::proposal_task(
            &request.insight_json,
            transcript.as_deref(),
            request.prompt.as_deref(),
        );

        let options = CreateJobOptions {
            task: task_text,
            workdir: request.workdir,
            sandbox: cc_runner::SandboxMode::ReadOnly,
            approval: cc_runner::ApprovalPolicy::Never,
            model: request.model,
            output_schema_path: Some(request.output_schema_path),
            resume_session_id: (request.mode == RunMode::Resume)
                .then(|| request.session_id.clone()),
            ..CreateJobOptions::default()
        };

        let snapshot = self.runner.create_job(repo_root, agent_home, options).await?;
        let job_id = snapshot.id;
        let now = Utc::now();

        let artifact = ProposalArtifact {
            proposal_id,
            session_id: request.session_id.clone(),
            diff_path,
            meta_path,
            created_at: now,
        };

        {
            let mut proposals = self.proposals.lock().await;
            proposals.insert(job_id, artifact.clone());
        }

        persist_run_meta(
            repo_root,
            &RunMeta {
                job_id: job_id.0,
                kind: RunKind::Proposal,
                created_at: now,
                command: snapshot.command.clone(),
                workdir: snapshot.cwd.clone(),
                agent_home: snapshot.agent_home.clone(),
                outputs: BTreeMap::from([(
                    "proposal_id".to_string(),
                    proposal_id.to_string(),
                )]),
            },
        )?;

        spawn_finalizer(
            Arc::clone(&self.runner),
            job_id,
            PendingKind::Proposal(ProposalFinalizeMeta {
                artifact: artifact.clone(),
            }),
        );

        Ok((job_id, artifact))
    }

    /// The insights artifact registered for a job, if any.
    pub async fn insights_artifact(&self, job_id: JobId) -> Option<InsightsArtifact> {
        self.insights.lock().await.get(&job_id).cloned()
    }

    /// The proposal artifact registered for a job, if any.
    pub async fn proposal_artifact(&self, job_id: JobId) -> Option<ProposalArtifact> {
        self.proposals.lock().await.get(&job_id).cloned()
    }

    /// List insights artifacts already written to disk for a session,
    /// newest first, by globbing `<repo_root>/.codex-orchestrator/insights/<session_id>/`
    /// and parsing the reserved `__` separator out of each stem.
    pub fn list_insight_artifacts(
        repo_root: &Path,
        session_id: &str,
    ) -> std::io::Result<Vec<(String, Uuid)>> {
        let dir = repo_root
            .join(".codex-orchestrator")
            .join("insights")
            .join(session_id);
        let mut found = Vec::new();
        if !dir.is_dir() {
            return Ok(found);
        }
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some((slug, id)) = stem.rsplit_once(ARTIFACT_ID_SEPARATOR) {
                if let Ok(artifact_id) = Uuid::parse_str(id) {
                    found.push((slug.to_string(), artifact_id));
                }
            }
        }
        found.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(found)
    }

    /// Read a previously finalized insights artifact's JSON payload.
    pub fn read_insight_artifact(
        repo_root: &Path,
        session_id: &str,
        slug: &str,
        artifact_id: Uuid,
    ) -> std::io::Result<String> {
        let path = repo_root
            .join(".codex-orchestrator")
            .join("insights")
            .join(session_id)
            .join(format!("{slug}{ARTIFACT_ID_SEPARATOR}{artifact_id}.json"));
        std::fs::read_to_string(path)
    }

    /// Read a previously finalized proposal's diff and metadata.
    pub fn read_proposal(
        repo_root: &Path,
        proposal_id: Uuid,
    ) -> std::io::Result<(String, String)> {
        let dir = repo_root
            .join(".codex-orchestrator")
            .join("proposals")
            .join(proposal_id.to_string());
        let diff = std::fs::read_to_string(dir.join("proposal.diff"))?;
        let meta = std::fs::read_to_string(dir.join("meta.json"))?;
        Ok((diff, meta))
    }
}

fn timestamp_slug(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d-%H%M%SZ").to_string()
}

fn rendered_transcript(agent_home: &Path, session_id: &str) -> String {
    let roles: HashSet<Role> = cc_rollout::default_include_roles();
    let messages = if cc_rollout::find_rollout_by_session(agent_home, session_id).is_some() {
        cc_rollout::read_session_messages(agent_home, session_id, &roles)
    } else {
        Vec::new()
    };
    cc_rollout::render_transcript(&messages, cc_rollout::DEFAULT_TRANSCRIPT_MAX_CHARS)
}

fn persist_run_meta(repo_root: &Path, meta: &RunMeta) -> cc_core::Result<()> {
    let runs_dir = repo_root.join(".codex-orchestrator").join("runs");
    std::fs::create_dir_all(&runs_dir).map_err(|e| cc_core::CoordError::io(runs_dir.clone(), e))?;
    let path = runs_dir.join(format!("{}.json", meta.job_id));
    let mut body = to_pretty_sorted_json(meta)?;
    body.push('\n');
    std::fs::write(&path, body).map_err(|e| cc_core::CoordError::io(path, e))?;
    Ok(())
}

/// Serialize `value` pretty-printed with sorted keys, matching the original
/// `json.dumps(..., indent=2, sort_keys=True)` convention.
///
/// Derived struct serialization preserves field declaration order, not
/// alphabetical order, so a plain `to_string_pretty` on `T` would not sort;
/// routing through `Value` first does, since its object map is a
/// `BTreeMap` (the `preserve_order` feature is not enabled here).
fn to_pretty_sorted_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let as_value = serde_json::to_value(value)?;
    serde_json::to_string_pretty(&as_value)
}

fn spawn_finalizer(runner: Arc<Runner>, job_id: JobId, pending: PendingKind) {
    tokio::spawn(async move {
        loop {
            let Some(snapshot) = runner.get_job(job_id).await else {
                warn!(%job_id, "finalizer found no such job; giving up");
                return;
            };
            if snapshot.status.is_terminal() {
                if snapshot.status != cc_core::JobStatus::Succeeded {
                    debug!(%job_id, status = ?snapshot.status, "finalizer skipping non-success job");
                    return;
                }
                let final_message = std::fs::read_to_string(&snapshot.last_message_path)
                    .ok()
                    .filter(|s| !s.trim().is_empty());
                let Some(final_message) = final_message else {
                    debug!(%job_id, "finalizer found no final message; skipping");
                    return;
                };
                let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&final_message) else {
                    debug!(%job_id, "finalizer found invalid JSON in final message; skipping");
                    return;
                };
                match pending {
                    PendingKind::Insights(meta) => {
                        finalize_insights(&meta.artifact, &parsed);
                    }
                    PendingKind::Proposal(meta) => {
                        finalize_proposal(job_id, &meta.artifact, &parsed);
                    }
                }
                return;
            }
            tokio::time::sleep(FINALIZER_POLL_INTERVAL).await;
        }
    });
}

fn finalize_insights(artifact: &InsightsArtifact, parsed: &serde_json::Value) {
    if let Ok(mut pretty) = serde_json::to_string_pretty(parsed) {
        pretty.push('\n');
        if let Err(e) = std::fs::write(&artifact.json_path, pretty) {
            warn!(error = %e, path = ?artifact.json_path, "failed writing insights json");
        }
    }
    if let Some(markdown) = parsed.get("insights_markdown").and_then(|v| v.as_str()) {
        let trimmed = markdown.trim();
        if !trimmed.is_empty() {
            let mut body = trimmed.to_string();
            body.push('\n');
            if let Err(e) = std::fs::write(&artifact.markdown_path, body) {
                warn!(error = %e, path = ?artifact.markdown_path, "failed writing insights markdown");
            }
        }
    }
}

fn finalize_proposal(job_id: JobId, artifact: &ProposalArtifact, parsed: &serde_json::Value) {
    let Some(diff) = parsed.get("diff").and_then(|v| v.as_str()).filter(|s| !s.trim().is_empty())
    else {
        debug!(%job_id, "finalizer found no non-empty diff field; skipping");
        return;
    };

    let mut body = diff.trim().to_string();
    body.push('\n');
    if let Err(e) = std::fs::write(&artifact.diff_path, &body) {
        warn!(error = %e, path = ?artifact.diff_path, "failed writing proposal diff");
        return;
    }

    let meta = ProposalMetaFile {
        proposal_id: artifact.proposal_id,
        session_id: artifact.session_id.clone(),
        created_at: artifact.created_at,
        job_id: job_id.0,
        summary: parsed.get("summary").and_then(|v| v.as_str()).map(str::to_string),
        files_touched: parsed
            .get("files_touched")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).map(str::to_string).collect()),
        safety_notes: parsed.get("safety_notes").and_then(|v| v.as_str()).map(str::to_string),
    };
    match to_pretty_sorted_json(&meta) {
        Ok(mut json) => {
            json.push('\n');
            if let Err(e) = std::fs::write(&artifact.meta_path, json) {
                warn!(error = %e, path = ?artifact.meta_path, "failed writing proposal meta");
            }
        }
        Err(e) => warn!(error = %e, "failed serializing proposal meta"),
    }
}
