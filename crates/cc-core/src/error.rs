//! Error taxonomy shared by every crate in the workspace.
//!
//! [`CoordError`] is the single type that carries failures across the
//! registry-mutex boundary described in the runtime design: local code
//! never panics on an expected failure, it packages the failure into this
//! enum and returns it (or, for the job runner, records it in a tail).

use std::path::PathBuf;

/// A failure surfaced by any coordinator component.
#[derive(Debug, thiserror::Error)]
pub enum CoordError {
    /// The requested job, session, artifact, or proposal does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A request was malformed or missing a required precondition.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An I/O operation failed.
    #[error("io error at {path}: {source}")]
    Io {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Spawning the agent binary failed.
    #[error("failed to spawn agent process: {0}")]
    Spawn(std::io::Error),

    /// A JSON payload failed to parse or did not match the expected shape.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A proposed diff failed allow-list validation.
    #[error("diff validation failed: {0:?}")]
    Validation(Vec<String>),

    /// The host version-control tool rejected the patch.
    #[error("git apply failed: {0}")]
    Apply(String),
}

impl CoordError {
    /// Wrap an I/O error together with the path that was being accessed.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CoordError>;
