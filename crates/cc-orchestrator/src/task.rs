//! Prompt composition for the two orchestrator workflows.

const INSIGHTS_HEADER: &str = "Respond with a single JSON object conforming exactly to the provided output schema. Do not include any prose outside that JSON object.";

const PROPOSAL_HEADER: &str = "Respond with a single JSON object whose `diff` field contains a unified diff. The diff may only touch AGENTS.md (at any depth) or files under .codex/skills/ — any other path will be rejected.";

const PROPOSAL_INSIGHT_JSON_MAX_CHARS: usize = 50_000;

/// Build the task text for an insights run.
#[must_use]
pub fn insights_task(transcript: Option<&str>, prompt: &str) -> String {
    let mut parts = vec![INSIGHTS_HEADER.to_string()];
    if let Some(transcript) = transcript {
        if !transcript.is_empty() {
            parts.push(transcript.to_string());
        }
    }
    parts.push(prompt.to_string());
    parts.join("\n\n")
}

/// Build the task text for a proposal run.
///
/// `insight_json` is serialized pretty with sorted keys and truncated to
/// [`PROPOSAL_INSIGHT_JSON_MAX_CHARS`] characters before embedding.
#[must_use]
pub fn proposal_task(
    insight_json: &serde_json::Value,
    transcript: Option<&str>,
    prompt: Option<&str>,
) -> String {
    // `serde_json::Value`'s object map is a `BTreeMap` (the `preserve_order`
    // feature is not enabled in this workspace), so `to_string_pretty`
    // already emits keys in sorted order.
    let rendered = serde_json::to_string_pretty(insight_json).unwrap_or_default();
    let truncated: String = rendered.chars().take(PROPOSAL_INSIGHT_JSON_MAX_CHARS).collect();

    let mut parts = vec![PROPOSAL_HEADER.to_string(), truncated];
    if let Some(transcript) = transcript {
        if !transcript.is_empty() {
            parts.push(transcript.to_string());
        }
    }
    if let Some(prompt) = prompt {
        if !prompt.is_empty() {
            parts.push(prompt.to_string());
        }
    }
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insights_task_omits_empty_transcript() {
        let task = insights_task(Some(""), "summarize this session");
        assert!(!task.contains("\n\n\n"));
        assert!(task.ends_with("summarize this session"));
    }

    #[test]
    fn insights_task_includes_fork_transcript() {
        let task = insights_task(Some("[user] hi"), "go");
        assert!(task.contains("[user] hi"));
        assert!(task.contains(INSIGHTS_HEADER));
    }

    #[test]
    fn proposal_task_embeds_allow_list_rule() {
        let task = proposal_task(&json!({"a": 1}), None, None);
        assert!(task.contains(".codex/skills/"));
        assert!(task.contains("AGENTS.md"));
    }

    #[test]
    fn proposal_task_truncates_long_insight_json() {
        let big = json!({ "data": "x".repeat(100_000) });
        let task = proposal_task(&big, None, None);
        let json_section = task.split("\n\n").nth(1).unwrap();
        assert!(json_section.chars().count() <= PROPOSAL_INSIGHT_JSON_MAX_CHARS);
    }

    #[test]
    fn proposal_task_skips_absent_optional_sections() {
        let task = proposal_task(&json!({}), None, None);
        assert_eq!(task.split("\n\n").count(), 2);
    }
}
