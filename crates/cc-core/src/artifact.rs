//! Durable outputs of orchestrator workflows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Output of phase one (insights).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsArtifact {
    /// Identifier for this artifact, carried explicitly in both filenames.
    pub artifact_id: Uuid,
    /// Session the insights were generated from.
    pub session_id: String,
    /// Path to the rendered markdown file.
    pub markdown_path: PathBuf,
    /// Path to the pretty-printed, sorted-key JSON file.
    pub json_path: PathBuf,
    /// When the artifact's paths were allocated.
    pub created_at: DateTime<Utc>,
}

/// Output of phase two (proposal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalArtifact {
    /// Identifier for this proposal.
    pub proposal_id: Uuid,
    /// Session the proposal was generated from.
    pub session_id: String,
    /// Path to the unified-diff file.
    pub diff_path: PathBuf,
    /// Path to the proposal's metadata file.
    pub meta_path: PathBuf,
    /// When the artifact's paths were allocated.
    pub created_at: DateTime<Utc>,
}

/// What kind of workflow an orchestrator-initiated job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Phase one.
    Insights,
    /// Phase two.
    Proposal,
}

/// Durable record of every orchestrator-initiated runner job, written at
/// job-creation time to `<repo_root>/.codex-orchestrator/runs/<job_id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    /// Job identifier.
    pub job_id: Uuid,
    /// Workflow kind.
    pub kind: RunKind,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// Full argv used to spawn the agent binary.
    pub command: Vec<String>,
    /// Working directory the job ran in.
    pub workdir: PathBuf,
    /// Resolved agent home directory.
    pub agent_home: PathBuf,
    /// Output identifiers produced by this run (`artifact_id` or
    /// `proposal_id`, keyed by name so the JSON stays self-describing).
    pub outputs: std::collections::BTreeMap<String, String>,
}
