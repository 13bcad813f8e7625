//! Unified-diff path validation and application.

use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

/// An allowed path either equals `AGENTS.md`, ends with `/AGENTS.md`, or
/// begins with `.codex/skills/`.
fn is_allowed(path: &str) -> bool {
    path == "AGENTS.md" || path.ends_with("/AGENTS.md") || path.starts_with(".codex/skills/")
}

fn strip_prefix(token: &str) -> &str {
    token.strip_prefix("a/").or_else(|| token.strip_prefix("b/")).unwrap_or(token)
}

fn is_dev_null(token: &str) -> bool {
    matches!(token, "a/dev/null" | "b/dev/null" | "/dev/null")
}

/// Result of scanning a diff for touched file paths.
#[derive(Debug, Clone)]
pub struct DiffValidation {
    /// `true` iff every touched path is allowed.
    pub ok: bool,
    /// Every distinct touched path, sorted, regardless of `ok`.
    pub touched_paths: Vec<String>,
    /// Human-readable validation failures; empty iff `ok`.
    pub errors: Vec<String>,
}

/// Scan `diff_text` line by line, collecting the paths named by `+++ `/
/// `--- ` headers, and check each against the allow-list.
#[must_use]
pub fn validate_diff_paths(diff_text: &str) -> DiffValidation {
    let mut touched: BTreeSet<String> = BTreeSet::new();

    for line in diff_text.lines() {
        let rest = if let Some(r) = line.strip_prefix("+++ ") {
            r
        } else if let Some(r) = line.strip_prefix("--- ") {
            r
        } else {
            continue;
        };
        let Some(token) = rest.split_whitespace().next() else {
            continue;
        };
        if is_dev_null(token) {
            continue;
        }
        touched.insert(strip_prefix(token).to_string());
    }

    let touched_paths: Vec<String> = touched.into_iter().collect();

    if touched_paths.is_empty() {
        return DiffValidation {
            ok: false,
            touched_paths,
            errors: vec!["No file paths detected in diff.".to_string()],
        };
    }

    let mut errors = Vec::new();
    for path in &touched_paths {
        if !is_allowed(path) {
            errors.push(format!("Disallowed path in diff: {path}"));
        }
    }

    DiffValidation {
        ok: errors.is_empty(),
        touched_paths,
        errors,
    }
}

/// Outcome of attempting to apply a proposal diff to the working tree.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ApplyOutcome {
    /// Whether `git apply` succeeded.
    pub applied: bool,
    /// Validation or apply errors; empty iff `applied`.
    pub errors: Vec<String>,
    /// Paths the diff touches, regardless of outcome.
    pub files_touched: Vec<String>,
}

/// Validate and apply a proposal diff against `repo_root`.
pub fn apply_proposal_diff(diff_path: &Path, repo_root: &Path) -> std::io::Result<ApplyOutcome> {
    let diff_text = std::fs::read_to_string(diff_path)?;
    let validation = validate_diff_paths(&diff_text);
    if !validation.ok {
        return Ok(ApplyOutcome {
            applied: false,
            errors: validation.errors,
            files_touched: validation.touched_paths,
        });
    }

    let output = Command::new("git")
        .arg("apply")
        .arg("--whitespace=nowarn")
        .arg(diff_path)
        .current_dir(repo_root)
        .output()?;

    if output.status.success() {
        return Ok(ApplyOutcome {
            applied: true,
            errors: Vec::new(),
            files_touched: validation.touched_paths,
        });
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let detail = if !stderr.is_empty() {
        stderr
    } else if !stdout.is_empty() {
        stdout
    } else {
        "unknown error".to_string()
    };

    Ok(ApplyOutcome {
        applied: false,
        errors: vec!["git apply failed".to_string(), detail],
        files_touched: validation.touched_paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_paths_pass() {
        let diff = "--- a/AGENTS.md\n+++ b/AGENTS.md\n@@ -1 +1 @@\n-old\n+new\n";
        let v = validate_diff_paths(diff);
        assert!(v.ok);
        assert_eq!(v.touched_paths, vec!["AGENTS.md".to_string()]);
    }

    #[test]
    fn nested_agents_md_is_allowed() {
        let diff = "--- a/docs/AGENTS.md\n+++ b/docs/AGENTS.md\n";
        let v = validate_diff_paths(diff);
        assert!(v.ok);
    }

    #[test]
    fn codex_skills_prefix_is_allowed() {
        let diff = "--- a/.codex/skills/foo/SKILL.md\n+++ b/.codex/skills/foo/SKILL.md\n";
        let v = validate_diff_paths(diff);
        assert!(v.ok);
    }

    #[test]
    fn disallowed_path_is_rejected() {
        let diff = "--- a/src/main.rs\n+++ b/src/main.rs\n";
        let v = validate_diff_paths(diff);
        assert!(!v.ok);
        assert!(v.errors[0].contains("Disallowed path in diff: src/main.rs"));
    }

    #[test]
    fn dev_null_sentinels_are_ignored() {
        let diff = "--- /dev/null\n+++ b/AGENTS.md\n";
        let v = validate_diff_paths(diff);
        assert!(v.ok);
        assert_eq!(v.touched_paths, vec!["AGENTS.md".to_string()]);
    }

    #[test]
    fn empty_diff_is_an_error() {
        let v = validate_diff_paths("no headers here\njust text\n");
        assert!(!v.ok);
        assert_eq!(v.errors, vec!["No file paths detected in diff.".to_string()]);
    }

    #[test]
    fn mixed_allowed_and_disallowed_reports_only_disallowed() {
        let diff = "--- a/AGENTS.md\n+++ b/AGENTS.md\n--- a/src/lib.rs\n+++ b/src/lib.rs\n";
        let v = validate_diff_paths(diff);
        assert!(!v.ok);
        assert_eq!(v.errors.len(), 1);
        assert!(v.touched_paths.contains(&"AGENTS.md".to_string()));
        assert!(v.touched_paths.contains(&"src/lib.rs".to_string()));
    }
}
