// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Forward-only reader for the agent's on-disk session journal.
//!
//! The agent writes one newline-delimited JSON file per session under
//! `<agent_home>/sessions/**/rollout-*.jsonl`. Every listing in this crate
//! re-walks the journal from scratch — there is no cache or index, so a
//! large journal costs `O(files)` per call. Add an indexing layer behind
//! this same interface if profiling ever demands it.

mod timestamp;

pub use timestamp::parse as parse_timestamp;

use cc_core::{ConversationMessage, PromptHistoryEntry, Role, SessionSummary};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default character budget for [`render_transcript`].
pub const DEFAULT_TRANSCRIPT_MAX_CHARS: usize = 60_000;

/// Default roles read by [`read_session_messages`] when the caller does not
/// narrow the set.
#[must_use]
pub fn default_include_roles() -> HashSet<Role> {
    [Role::User, Role::Assistant, Role::Developer].into_iter().collect()
}

fn iter_rollout_files(agent_home: &Path) -> Vec<PathBuf> {
    let sessions_dir = agent_home.join("sessions");
    if !sessions_dir.is_dir() {
        return Vec::new();
    }
    walkdir::WalkDir::new(sessions_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.starts_with("rollout-") && name.ends_with(".jsonl")
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Iterate the non-empty, parsed JSON lines of a rollout file.
///
/// Any I/O or JSON error aborts iteration for *this file only*; the error is
/// logged and swallowed, never propagated — callers see whatever was
/// accumulated before the failure.
fn read_jsonl_lines(path: &Path) -> Vec<Value> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "failed to open rollout file");
            return Vec::new();
        }
    };
    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(l) => l,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "failed to read rollout line");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => out.push(value),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "failed to parse rollout line");
                break;
            }
        }
    }
    out
}

fn as_str(value: &Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(str::to_owned)
}

fn first_session_meta(lines: &[Value]) -> Option<&Value> {
    lines
        .iter()
        .find(|obj| obj.get("type").and_then(Value::as_str) == Some("session_meta"))
        .and_then(|obj| obj.get("payload"))
        .filter(|payload| payload.is_object())
}

fn flatten_content(payload: &Value) -> String {
    let Some(content) = payload.get("content").and_then(Value::as_array) else {
        return String::new();
    };
    content
        .iter()
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn message_payload(record: &Value) -> Option<&Value> {
    if record.get("type").and_then(Value::as_str) != Some("response_item") {
        return None;
    }
    let payload = record.get("payload")?;
    if payload.get("type").and_then(Value::as_str) != Some("message") {
        return None;
    }
    Some(payload)
}

fn first_user_title(lines: &[Value]) -> Option<String> {
    for record in lines {
        let Some(payload) = message_payload(record) else {
            continue;
        };
        if payload.get("role").and_then(Value::as_str) != Some("user") {
            continue;
        }
        let text = flatten_content(payload);
        if text.is_empty() {
            continue;
        }
        let first_line = text.lines().next().unwrap_or("");
        let truncated: String = first_line.chars().take(120).collect();
        return Some(truncated);
    }
    None
}

/// List sessions discovered under `<agent_home>/sessions/**`, newest first.
///
/// When `include_all_repos` is `false` and `repo_root` is `Some`, a session
/// is only included if its meta `cwd` canonicalizes to `repo_root` or an
/// ancestor of it equals `repo_root`.
#[must_use]
pub fn list_sessions(
    agent_home: &Path,
    repo_root: Option<&Path>,
    include_all_repos: bool,
    limit: usize,
) -> Vec<SessionSummary> {
    let mut summaries = Vec::new();

    for path in iter_rollout_files(agent_home) {
        let lines = read_jsonl_lines(&path);
        let Some(meta) = first_session_meta(&lines) else {
            continue;
        };
        let Some(session_id) = as_str(meta, "id").filter(|s| !s.is_empty()) else {
            continue;
        };
        let cwd = as_str(meta, "cwd");

        if !include_all_repos {
            if let (Some(repo_root), Some(cwd)) = (repo_root, cwd.as_deref()) {
                let cwd_path = Path::new(cwd)
                    .canonicalize()
                    .unwrap_or_else(|_| PathBuf::from(cwd));
                let matches = std::iter::once(cwd_path.as_path())
                    .chain(cwd_path.ancestors().skip(1))
                    .any(|ancestor| ancestor == repo_root);
                if !matches {
                    continue;
                }
            }
        }

        summaries.push(SessionSummary {
            session_id,
            started_at: timestamp::parse(meta.get("timestamp").and_then(Value::as_str)),
            cwd,
            originator: as_str(meta, "originator"),
            rollout_path: path,
            title: first_user_title(&lines),
        });
    }

    summaries.sort_by(|a, b| {
        let key = |s: &SessionSummary| s.started_at.map(|t| t.timestamp()).unwrap_or(0);
        // Sessions without a timestamp sort last, so compare `has_timestamp`
        // first and fall back to the timestamp itself.
        (b.started_at.is_some(), key(b)).cmp(&(a.started_at.is_some(), key(a)))
    });
    summaries.truncate(limit);
    summaries
}

/// Linear scan for the rollout file whose meta `id` matches `session_id`.
#[must_use]
pub fn find_rollout_by_session(agent_home: &Path, session_id: &str) -> Option<PathBuf> {
    for path in iter_rollout_files(agent_home) {
        let lines = read_jsonl_lines(&path);
        if let Some(meta) = first_session_meta(&lines) {
            if as_str(meta, "id").as_deref() == Some(session_id) {
                return Some(path);
            }
        }
    }
    None
}

/// Read every message of `session_id` whose role is in `include_roles`,
/// ordered ascending by timestamp (messages without one sort first, stable
/// on insertion order within a tie).
#[must_use]
pub fn read_session_messages(
    agent_home: &Path,
    session_id: &str,
    include_roles: &HashSet<Role>,
) -> Vec<ConversationMessage> {
    let Some(path) = find_rollout_by_session(agent_home, session_id) else {
        return Vec::new();
    };

    let lines = read_jsonl_lines(&path);
    let mut messages: Vec<ConversationMessage> = Vec::new();
    for record in &lines {
        let Some(payload) = message_payload(record) else {
            continue;
        };
        let Some(role_raw) = payload.get("role").and_then(Value::as_str) else {
            continue;
        };
        let role = Role::parse(role_raw);
        if !include_roles.contains(&role) {
            continue;
        }
        let text = flatten_content(payload);
        if text.is_empty() {
            continue;
        }
        messages.push(ConversationMessage {
            session_id: session_id.to_string(),
            timestamp: timestamp::parse(record.get("timestamp").and_then(Value::as_str)),
            role,
            text,
            phase: as_str(payload, "phase"),
        });
    }

    messages.sort_by(|a, b| {
        let ka = a.timestamp.map(|t| t.timestamp_millis()).unwrap_or(i64::MIN);
        let kb = b.timestamp.map(|t| t.timestamp_millis()).unwrap_or(i64::MIN);
        ka.cmp(&kb)
    });
    messages
}

/// Render a plain-text transcript suitable for embedding into a prompt.
///
/// Blocks of the form `[role][phase?]\n<body>\n` are concatenated with
/// blank-line separators until adding the next one would exceed
/// `max_chars`. Truncation is block-granular: a message is never split.
#[must_use]
pub fn render_transcript(messages: &[ConversationMessage], max_chars: usize) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut remaining = max_chars;

    for msg in messages {
        let header = match &msg.phase {
            Some(phase) => format!("[{}][{}]", msg.role.as_str(), phase),
            None => format!("[{}]", msg.role.as_str()),
        };
        let piece = format!("{header}\n{}\n", msg.text.trim());
        if piece.len() > remaining {
            break;
        }
        remaining -= piece.len();
        blocks.push(piece);
    }

    if blocks.is_empty() {
        return String::new();
    }
    blocks.join("\n").trim().to_string()
}

/// Aggregate user/assistant messages across every session visible to
/// `repo_root` (or every session if `include_all_repos`). Intended for
/// dashboards and debugging, not the main workflow.
#[must_use]
pub fn read_conversation_messages(
    agent_home: &Path,
    repo_root: Option<&Path>,
    include_all_repos: bool,
    limit: usize,
) -> Vec<ConversationMessage> {
    let sessions = list_sessions(agent_home, repo_root, include_all_repos, usize::MAX);
    let roles: HashSet<Role> = [Role::User, Role::Assistant].into_iter().collect();

    let mut out = Vec::new();
    for session in sessions {
        out.extend(read_session_messages(agent_home, &session.session_id, &roles));
        if out.len() >= limit {
            break;
        }
    }
    out.sort_by(|a, b| {
        let ka = a.timestamp.map(|t| t.timestamp_millis()).unwrap_or(i64::MIN);
        let kb = b.timestamp.map(|t| t.timestamp_millis()).unwrap_or(i64::MIN);
        ka.cmp(&kb)
    });
    out.truncate(limit);
    out
}

/// Best-effort reader for `<agent_home>/history.jsonl`.
///
/// Each valid line must supply a string `session_id`, string `text`, and
/// numeric `ts`; invalid lines are skipped. Stops after `limit` accepted
/// entries and sorts ascending by `ts`.
#[must_use]
pub fn read_prompt_history(agent_home: &Path, limit: usize) -> Vec<PromptHistoryEntry> {
    let path = agent_home.join("history.jsonl");
    let Ok(file) = File::open(&path) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let (Some(session_id), Some(text), Some(ts)) = (
            as_str(&value, "session_id"),
            as_str(&value, "text"),
            value.get("ts").and_then(Value::as_f64),
        ) else {
            continue;
        };
        entries.push(PromptHistoryEntry { session_id, ts, text });
        if entries.len() >= limit {
            break;
        }
    }

    entries.sort_by(|a, b| a.ts.total_cmp(&b.ts));
    entries
}
