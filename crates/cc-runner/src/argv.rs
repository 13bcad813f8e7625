//! Command-line construction for the agent binary.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Filesystem access level granted to the agent during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    /// No writes permitted.
    ReadOnly,
    /// Writes permitted within the workspace.
    WorkspaceWrite,
    /// No sandboxing at all.
    DangerFullAccess,
}

impl SandboxMode {
    fn as_flag(self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::WorkspaceWrite => "workspace-write",
            Self::DangerFullAccess => "danger-full-access",
        }
    }
}

/// How aggressively the agent asks for human approval before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalPolicy {
    /// Approve nothing automatically.
    Untrusted,
    /// Ask only after a failed attempt.
    OnFailure,
    /// Ask before every risky action.
    OnRequest,
    /// Never ask; run unattended.
    Never,
}

impl ApprovalPolicy {
    fn as_flag(self) -> &'static str {
        match self {
            Self::Untrusted => "untrusted",
            Self::OnFailure => "on-failure",
            Self::OnRequest => "on-request",
            Self::Never => "never",
        }
    }
}

/// A locally hosted model provider, selected in place of the default API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalProvider {
    /// LM Studio.
    Lmstudio,
    /// Ollama.
    Ollama,
}

impl LocalProvider {
    fn as_flag(self) -> &'static str {
        match self {
            Self::Lmstudio => "lmstudio",
            Self::Ollama => "ollama",
        }
    }
}

/// Everything needed to build the argv for one agent invocation.
#[derive(Debug, Clone)]
pub struct ArgvSpec<'a> {
    /// Name (or path) of the agent binary.
    pub agent_binary: &'a str,
    /// Approval policy flag.
    pub approval: ApprovalPolicy,
    /// Sandbox mode flag.
    pub sandbox: SandboxMode,
    /// Resolved working directory, passed via `-C`.
    pub workdir: &'a Path,
    /// Path the agent will write its final message to, passed via `-o`.
    pub last_message_path: &'a Path,
    /// Optional model override.
    pub model: Option<&'a str>,
    /// Whether to pass `--oss`.
    pub oss: bool,
    /// Optional local provider.
    pub local_provider: Option<LocalProvider>,
    /// Optional named profile.
    pub profile: Option<&'a str>,
    /// `-c key=value` config overrides, applied in order.
    pub config_overrides: &'a [String],
    /// Optional path to a JSON schema the final message must conform to.
    pub output_schema_path: Option<&'a str>,
    /// Whether to pass `--skip-git-repo-check`.
    pub skip_git_repo_check: bool,
    /// When set, resumes this prior session id instead of starting fresh.
    pub resume_session_id: Option<&'a str>,
}

/// Build the full argv for spawning the agent binary.
///
/// Layout: `[agent, --no-alt-screen, --ask-for-approval, P, --sandbox, S,
/// (--model M)?, (--oss)?, (--local-provider L)?, (--profile N)?,
/// (-c O)*, exec [resume]? --json -C <workdir> -o <last_message>,
/// (--output-schema S)?, (--skip-git-repo-check)?, [session_id]? -]`.
#[must_use]
pub fn build_argv(spec: &ArgvSpec<'_>) -> Vec<String> {
    let mut cmd = vec![
        spec.agent_binary.to_string(),
        "--no-alt-screen".to_string(),
        "--ask-for-approval".to_string(),
        spec.approval.as_flag().to_string(),
        "--sandbox".to_string(),
        spec.sandbox.as_flag().to_string(),
    ];

    if let Some(model) = spec.model {
        cmd.push("--model".to_string());
        cmd.push(model.to_string());
    }
    if spec.oss {
        cmd.push("--oss".to_string());
    }
    if let Some(provider) = spec.local_provider {
        cmd.push("--local-provider".to_string());
        cmd.push(provider.as_flag().to_string());
    }
    if let Some(profile) = spec.profile {
        cmd.push("--profile".to_string());
        cmd.push(profile.to_string());
    }
    for override_ in spec.config_overrides {
        cmd.push("-c".to_string());
        cmd.push(override_.clone());
    }

    cmd.push("exec".to_string());
    if spec.resume_session_id.is_some() {
        cmd.push("resume".to_string());
    }
    cmd.push("--json".to_string());
    cmd.push("-C".to_string());
    cmd.push(spec.workdir.display().to_string());
    cmd.push("-o".to_string());
    cmd.push(spec.last_message_path.display().to_string());

    if let Some(schema) = spec.output_schema_path {
        cmd.push("--output-schema".to_string());
        cmd.push(schema.to_string());
    }
    if spec.skip_git_repo_check {
        cmd.push("--skip-git-repo-check".to_string());
    }

    if let Some(session_id) = spec.resume_session_id {
        cmd.push(session_id.to_string());
    }
    cmd.push("-".to_string());

    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn base_spec<'a>(workdir: &'a Path, last_message: &'a Path) -> ArgvSpec<'a> {
        ArgvSpec {
            agent_binary: "codex",
            approval: ApprovalPolicy::Never,
            sandbox: SandboxMode::WorkspaceWrite,
            workdir,
            last_message_path: last_message,
            model: None,
            oss: false,
            local_provider: None,
            profile: None,
            config_overrides: &[],
            output_schema_path: None,
            skip_git_repo_check: false,
            resume_session_id: None,
        }
    }

    #[test]
    fn fresh_exec_reads_prompt_from_stdin() {
        let workdir = PathBuf::from("/repo");
        let last_message = PathBuf::from("/repo/last.txt");
        let argv = build_argv(&base_spec(&workdir, &last_message));
        assert_eq!(argv[0], "codex");
        assert!(argv.contains(&"exec".to_string()));
        assert!(argv.contains(&"--json".to_string()));
        assert!(argv.contains(&"-o".to_string()));
        assert_eq!(argv.last().unwrap(), "-");
        assert!(!argv.contains(&"resume".to_string()));
    }

    #[test]
    fn resume_mode_inserts_resume_subcommand_and_session_id() {
        let workdir = PathBuf::from("/repo");
        let last_message = PathBuf::from("/repo/last.txt");
        let mut spec = base_spec(&workdir, &last_message);
        spec.resume_session_id = Some("sess-123");
        let argv = build_argv(&spec);

        let exec_pos = argv.iter().position(|a| a == "exec").unwrap();
        assert_eq!(argv[exec_pos + 1], "resume");
        assert_eq!(argv[argv.len() - 2], "sess-123");
        assert_eq!(argv[argv.len() - 1], "-");
    }

    #[test]
    fn optional_flags_appear_in_order_before_the_subcommand() {
        let workdir = PathBuf::from("/repo");
        let last_message = PathBuf::from("/repo/last.txt");
        let mut spec = base_spec(&workdir, &last_message);
        spec.model = Some("gpt-test");
        spec.oss = true;
        spec.local_provider = Some(LocalProvider::Ollama);
        spec.profile = Some("fast");
        let overrides = vec!["foo=bar".to_string()];
        spec.config_overrides = &overrides;
        spec.output_schema_path = Some("/schemas/insights.json");
        spec.skip_git_repo_check = true;

        let argv = build_argv(&spec);
        let model_pos = argv.iter().position(|a| a == "--model").unwrap();
        assert_eq!(argv[model_pos + 1], "gpt-test");
        assert!(argv.contains(&"--oss".to_string()));
        assert!(argv.contains(&"--local-provider".to_string()));
        assert!(argv.contains(&"ollama".to_string()));
        assert!(argv.contains(&"--profile".to_string()));
        assert!(argv.contains(&"fast".to_string()));
        assert!(argv.contains(&"-c".to_string()));
        assert!(argv.contains(&"foo=bar".to_string()));
        assert!(argv.contains(&"--output-schema".to_string()));
        assert!(argv.contains(&"--skip-git-repo-check".to_string()));
    }
}
