// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Repo-root, agent-home, and workdir resolution.
//!
//! These three functions are the only place in the workspace that reasons
//! about "where on disk are we", so every other crate treats `repo_root`,
//! `agent_home`, and `workdir` as already-resolved, canonical paths.

use std::env;
use std::path::{Path, PathBuf};

/// Name of the version-control marker directory used to locate the repo root.
const VCS_MARKER: &str = ".git";

/// Environment variable that, if set, overrides the default agent home.
const AGENT_HOME_ENV: &str = "CODEX_HOME";

/// Walk upward from `start` looking for a [`VCS_MARKER`] directory.
///
/// `start` is resolved to an absolute, canonical path first. If no ancestor
/// carries the marker, the canonicalized `start` itself is returned.
pub fn find_repo_root(start: &Path) -> PathBuf {
    let start = canonicalize_best_effort(start);
    for candidate in std::iter::once(start.as_path()).chain(start.ancestors().skip(1)) {
        if candidate.join(VCS_MARKER).exists() {
            return candidate.to_path_buf();
        }
    }
    start
}

/// Resolve the agent's home directory.
///
/// If `CODEX_HOME` is set and non-empty: an absolute value is used verbatim,
/// a relative value is joined onto `repo_root`. Either way the result is
/// then `~`-expanded and canonicalized. If unset, defaults to
/// `<user-home>/.codex`.
///
/// Canonicalization is best-effort: a path that does not exist yet (e.g.
/// `.codex` has never been created) is returned un-canonicalized rather than
/// erroring, since callers are expected to `create_dir_all` it on first use.
pub fn resolve_agent_home(repo_root: &Path) -> PathBuf {
    let raw = env::var(AGENT_HOME_ENV).ok().filter(|v| !v.is_empty());
    let candidate = match raw {
        Some(raw) => {
            let p = PathBuf::from(&raw);
            if p.is_absolute() {
                p
            } else {
                repo_root.join(p)
            }
        }
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".codex"),
    };
    canonicalize_best_effort(&expand_user(&candidate))
}

/// Resolve the working directory for an agent invocation.
///
/// `None`/empty resolves to `repo_root`. An absolute `workdir` is used
/// as-is. A relative `workdir` is joined onto `repo_root` and canonicalized.
pub fn resolve_workdir(repo_root: &Path, workdir: Option<&str>) -> PathBuf {
    match workdir.filter(|w| !w.is_empty()) {
        None => repo_root.to_path_buf(),
        Some(w) => {
            let p = PathBuf::from(w);
            if p.is_absolute() {
                p
            } else {
                canonicalize_best_effort(&repo_root.join(p))
            }
        }
    }
}

fn expand_user(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if s == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    path.to_path_buf()
}

fn canonicalize_best_effort(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
