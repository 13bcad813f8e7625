// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Thin HTTP adapter over the Runner and Orchestrator.
//!
//! Deliberately out of scope per the core design: this layer only does
//! request validation, status-code mapping, and JSON marshalling. It owns
//! no state of its own beyond [`AppState`] and never reinterprets what the
//! agent binary or the orchestrator produce.
//!
//! One shared `Arc<AppState>`, one `ApiError { status, message }`
//! implementing `IntoResponse`, and a single `Router::new().route(...)`
//! chain registering every endpoint.

use axum::{
    extract::{Path as AxPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use cc_config::CoordConfig;
use cc_core::{CoordError, JobId, JobSnapshot, JobStatus, Role};
use cc_orchestrator::{InsightsRequest, Orchestrator, ProposalRequest, RunMode};
use cc_runner::{ApprovalPolicy, CreateJobOptions, LocalProvider, Runner, SandboxMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use uuid::Uuid;

/// Shared state handed to every route handler.
pub struct AppState {
    /// Job supervisor.
    pub runner: Arc<Runner>,
    /// Two-phase workflow engine.
    pub orchestrator: Arc<Orchestrator>,
    /// Resolved repository root (version-control marker ancestor).
    pub repo_root: PathBuf,
    /// Resolved agent home directory (`CODEX_HOME`).
    pub agent_home: PathBuf,
    /// Loaded daemon configuration.
    pub config: CoordConfig,
}

/// A failure surfaced to an HTTP caller.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    fn not_found(what: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, what)
    }

    fn bad_request(what: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, what)
    }
}

impl From<CoordError> for ApiError {
    fn from(err: CoordError) -> Self {
        match err {
            CoordError::NotFound(msg) => ApiError::not_found(msg),
            CoordError::InvalidRequest(msg) => ApiError::bad_request(msg),
            CoordError::Validation(errors) => {
                ApiError::new(StatusCode::OK, errors.join("; "))
            }
            CoordError::Apply(msg) => ApiError::new(StatusCode::OK, msg),
            other => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

/// Build the Axum router with every `/codex/*` route registered.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = if state.config.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<axum::http::HeaderValue> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|o| axum::http::HeaderValue::from_str(o).ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    Router::new()
        .route("/codex/exec", post(exec_job))
        .route("/codex/jobs/{id}", get(get_job).delete(cancel_job))
        .route("/codex/sessions", get(list_sessions))
        .route("/codex/sessions/{id}", get(get_session_messages))
        .route("/codex/insights/run", post(run_insights))
        .route("/codex/insights/{session_id}", get(list_insights))
        .route(
            "/codex/insights/artifacts/{session_id}/{artifact_id}",
            get(get_insight_artifact),
        )
        .route("/codex/proposals/run", post(run_proposal))
        .route("/codex/proposals/{proposal_id}", get(get_proposal))
        .route("/codex/proposals/{proposal_id}/apply", post(apply_proposal))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "time": Utc::now().to_rfc3339() }))
}

// ---------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------

/// Default number of tail lines returned when a caller does not specify one.
const DEFAULT_TAIL: usize = 200;
/// Largest tail window a caller may request.
const MAX_TAIL: usize = 2_000;

#[derive(Debug, Deserialize)]
struct ExecRequest {
    task: String,
    workdir: Option<String>,
    sandbox: Option<SandboxMode>,
    approval: Option<ApprovalPolicy>,
    model: Option<String>,
    #[serde(default)]
    oss: bool,
    local_provider: Option<LocalProvider>,
    profile: Option<String>,
    #[serde(default)]
    config_overrides: Vec<String>,
    output_schema_path: Option<String>,
    #[serde(default)]
    skip_git_repo_check: bool,
    max_output_lines: Option<usize>,
    resume_session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct JobResponse {
    id: Uuid,
    status: JobStatus,
    returncode: Option<i32>,
    task_id: Option<String>,
    command: Vec<String>,
    codex_home: PathBuf,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    last_message: Option<String>,
    stdout_tail: Vec<String>,
    stderr_tail: Vec<String>,
    events_tail: Vec<serde_json::Value>,
}

impl JobResponse {
    fn from_snapshot(snapshot: JobSnapshot, tail: usize) -> Self {
        let last_message = std::fs::read_to_string(&snapshot.last_message_path)
            .ok()
            .filter(|s| !s.is_empty());
        JobResponse {
            id: snapshot.id.0,
            status: snapshot.status,
            returncode: snapshot.returncode,
            task_id: snapshot.task_id,
            command: snapshot.command,
            codex_home: snapshot.agent_home,
            created_at: snapshot.created_at,
            started_at: snapshot.started_at,
            finished_at: snapshot.finished_at,
            last_message,
            stdout_tail: last_n(&snapshot.stdout_tail, tail),
            stderr_tail: last_n(&snapshot.stderr_tail, tail),
            events_tail: last_n(&snapshot.events_tail, tail),
        }
    }
}

fn last_n<T: Clone>(items: &[T], n: usize) -> Vec<T> {
    let skip = items.len().saturating_sub(n);
    items[skip..].to_vec()
}

fn clamp_tail(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_TAIL).clamp(1, MAX_TAIL)
}

async fn exec_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecRequest>,
) -> Result<Json<JobResponse>, ApiError> {
    if req.task.trim().is_empty() {
        return Err(ApiError::bad_request("task must not be empty"));
    }

    let options = CreateJobOptions {
        task: req.task,
        workdir: req.workdir,
        sandbox: req.sandbox.unwrap_or(SandboxMode::WorkspaceWrite),
        approval: req.approval.unwrap_or(ApprovalPolicy::Never),
        model: req.model,
        oss: req.oss,
        local_provider: req.local_provider,
        profile: req.profile,
        config_overrides: req.config_overrides,
        output_schema_path: req.output_schema_path,
        skip_git_repo_check: req.skip_git_repo_check,
        max_output_lines: req.max_output_lines.unwrap_or(state.config.default_tail_capacity),
        resume_session_id: req.resume_session_id,
    };

    let snapshot = state
        .runner
        .create_job(&state.repo_root, &state.agent_home, options)
        .await?;
    Ok(Json(JobResponse::from_snapshot(snapshot, DEFAULT_TAIL)))
}

#[derive(Debug, Deserialize)]
struct TailQuery {
    tail: Option<usize>,
}

async fn get_job(
    AxPath(id): AxPath<Uuid>,
    Query(q): Query<TailQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<JobResponse>, ApiError> {
    let snapshot = state
        .runner
        .get_job(JobId(id))
        .await
        .ok_or_else(|| ApiError::not_found(format!("unknown job {id}")))?;
    Ok(Json(JobResponse::from_snapshot(snapshot, clamp_tail(q.tail))))
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    status: &'static str,
    id: Uuid,
}

async fn cancel_job(
    AxPath(id): AxPath<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CancelResponse>, ApiError> {
    if !state.runner.cancel_job(JobId(id)).await {
        return Err(ApiError::not_found(format!(
            "job {id} is absent or already terminal"
        )));
    }
    Ok(Json(CancelResponse { status: "canceled", id }))
}

// ---------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------

/// Caller-requested session listing default.
const DEFAULT_SESSION_LIMIT: usize = 50;
/// Largest session listing a caller may request.
const MAX_SESSION_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
struct SessionsQuery {
    limit: Option<usize>,
    #[serde(default)]
    all_repos: bool,
}

async fn list_sessions(
    Query(q): Query<SessionsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(DEFAULT_SESSION_LIMIT).min(MAX_SESSION_LIMIT);
    let repo_root = (!q.all_repos).then_some(state.repo_root.as_path());
    let sessions = cc_rollout::list_sessions(&state.agent_home, repo_root, q.all_repos, limit);
    Json(sessions)
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    include_roles: Option<String>,
}

fn parse_roles(raw: Option<&str>) -> HashSet<Role> {
    match raw {
        None => cc_rollout::default_include_roles(),
        Some(raw) => raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(Role::parse).collect(),
    }
}

async fn get_session_messages(
    AxPath(session_id): AxPath<String>,
    Query(q): Query<MessagesQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    if cc_rollout::find_rollout_by_session(&state.agent_home, &session_id).is_none() {
        return Err(ApiError::not_found(format!("unknown session {session_id}")));
    }
    let roles = parse_roles(q.include_roles.as_deref());
    let messages = cc_rollout::read_session_messages(&state.agent_home, &session_id, &roles);
    Ok(Json(messages))
}

// ---------------------------------------------------------------------
// Insights
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModeParam {
    Fresh,
    Resume,
    Fork,
}

impl From<ModeParam> for RunMode {
    fn from(mode: ModeParam) -> Self {
        match mode {
            ModeParam::Fresh => RunMode::Fresh,
            ModeParam::Resume => RunMode::Resume,
            ModeParam::Fork => RunMode::Fork,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InsightsRunRequest {
    session_id: String,
    prompt: String,
    mode: ModeParam,
    workdir: Option<String>,
    model: Option<String>,
    output_schema_path: String,
}

#[derive(Debug, Serialize)]
struct RunStartedResponse {
    job_id: Uuid,
    #[serde(flatten)]
    artifact: serde_json::Value,
}

async fn run_insights(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InsightsRunRequest>,
) -> Result<Json<RunStartedResponse>, ApiError> {
    if req.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }
    let (job_id, artifact) = state
        .orchestrator
        .start_insights_run(
            &state.repo_root,
            &state.agent_home,
            InsightsRequest {
                session_id: req.session_id,
                prompt: req.prompt,
                mode: req.mode.into(),
                workdir: req.workdir,
                model: req.model,
                output_schema_path: req.output_schema_path,
            },
        )
        .await?;
    Ok(Json(RunStartedResponse {
        job_id: job_id.0,
        artifact: serde_json::to_value(artifact).unwrap_or_default(),
    }))
}

async fn list_insights(
    AxPath(session_id): AxPath<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let found = Orchestrator::list_insight_artifacts(&state.repo_root, &session_id)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(
        found
            .into_iter()
            .map(|(slug, id)| serde_json::json!({ "slug": slug, "artifact_id": id }))
            .collect::<Vec<_>>(),
    ))
}

async fn get_insight_artifact(
    AxPath((session_id, artifact_id)): AxPath<(String, Uuid)>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let found = Orchestrator::list_insight_artifacts(&state.repo_root, &session_id)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let slug = found
        .into_iter()
        .find(|(_, id)| *id == artifact_id)
        .map(|(slug, _)| slug)
        .ok_or_else(|| ApiError::not_found(format!("unknown artifact {artifact_id}")))?;

    let json = Orchestrator::read_insight_artifact(&state.repo_root, &session_id, &slug, artifact_id)
        .map_err(|_| ApiError::not_found(format!("unknown artifact {artifact_id}")))?;
    let parsed: serde_json::Value = serde_json::from_str(&json)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(parsed))
}

// ---------------------------------------------------------------------
// Proposals
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProposalRunRequest {
    session_id: String,
    insight_json: serde_json::Value,
    prompt: Option<String>,
    mode: ModeParam,
    workdir: Option<String>,
    model: Option<String>,
    output_schema_path: String,
}

async fn run_proposal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProposalRunRequest>,
) -> Result<Json<RunStartedResponse>, ApiError> {
    let (job_id, artifact) = state
        .orchestrator
        .start_proposal_run(
            &state.repo_root,
            &state.agent_home,
            ProposalRequest {
                session_id: req.session_id,
                insight_json: req.insight_json,
                prompt: req.prompt,
                mode: req.mode.into(),
                workdir: req.workdir,
                model: req.model,
                output_schema_path: req.output_schema_path,
            },
        )
        .await?;
    Ok(Json(RunStartedResponse {
        job_id: job_id.0,
        artifact: serde_json::to_value(artifact).unwrap_or_default(),
    }))
}

async fn get_proposal(
    AxPath(proposal_id): AxPath<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let (diff, meta) = Orchestrator::read_proposal(&state.repo_root, proposal_id)
        .map_err(|_| ApiError::not_found(format!("unknown proposal {proposal_id}")))?;
    let meta: serde_json::Value = serde_json::from_str(&meta)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(serde_json::json!({ "diff": diff, "meta": meta })))
}

#[derive(Debug, Deserialize)]
struct ApplyRequest {
    #[serde(default)]
    confirm: bool,
}

async fn apply_proposal(
    AxPath(proposal_id): AxPath<Uuid>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ApplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !req.confirm {
        return Err(ApiError::bad_request("apply requires {\"confirm\": true}"));
    }

    let diff_path = state
        .repo_root
        .join(".codex-orchestrator")
        .join("proposals")
        .join(proposal_id.to_string())
        .join("proposal.diff");
    if !diff_path.is_file() {
        return Err(ApiError::not_found(format!("unknown proposal {proposal_id}")));
    }

    let outcome = cc_orchestrator::apply_proposal_diff(&diff_path, &state.repo_root)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(outcome))
}
