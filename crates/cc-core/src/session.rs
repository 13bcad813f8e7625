//! Read-only projections derived on demand from the agent's rollout journal.
//!
//! None of these types are persisted by this system; they are reconstructed
//! fresh on every read from `<agent_home>/sessions/**/rollout-*.jsonl`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One past agent session discovered in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier from the rollout's `session_meta` record.
    pub session_id: String,
    /// Timestamp from `session_meta`, if parseable.
    pub started_at: Option<DateTime<Utc>>,
    /// Working directory recorded in `session_meta`.
    pub cwd: Option<String>,
    /// Originator string recorded in `session_meta`.
    pub originator: Option<String>,
    /// Path to the rollout file this summary was read from.
    pub rollout_path: PathBuf,
    /// First user message, single line, truncated to 120 characters.
    pub title: Option<String>,
}

/// The conversational role of a [`ConversationMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A human operator.
    User,
    /// The agent model.
    Assistant,
    /// Developer-authored system scaffolding.
    Developer,
    /// System-level instructions.
    System,
    /// Tool output relayed back into the conversation.
    Tool,
    /// Any role the rollout records that does not match a known variant.
    Other,
}

impl Role {
    /// Parse a rollout's raw `role` string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "developer" => Self::Developer,
            "system" => Self::System,
            "tool" => Self::Tool,
            _ => Self::Other,
        }
    }

    /// Render back to the lowercase wire form, so a filter configured with
    /// `Role::parse` round-trips against the original string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Developer => "developer",
            Self::System => "system",
            Self::Tool => "tool",
            Self::Other => "other",
        }
    }
}

/// One turn within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Session this message belongs to.
    pub session_id: String,
    /// Record timestamp, if parseable.
    pub timestamp: Option<DateTime<Utc>>,
    /// Speaker role.
    pub role: Role,
    /// Flattened, non-empty text content.
    pub text: String,
    /// Optional phase tag carried on the payload.
    pub phase: Option<String>,
}

/// One accepted row from `<agent_home>/history.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptHistoryEntry {
    /// Session the prompt belongs to.
    pub session_id: String,
    /// Submission timestamp (seconds, agent-defined epoch).
    pub ts: f64,
    /// Prompt text.
    pub text: String,
}
