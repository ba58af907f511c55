//! Error types for external toolchain invocation.

use thiserror::Error;

/// Failure to run an external command to completion.
///
/// A command that runs and exits non-zero is not an error here; that is a
/// [`crate::runner::CommandOutput`] with `success == false`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error("failed to start `{program}`: {message}")]
    Spawn { program: String, message: String },

    #[error("`{program}` timed out after {timeout_secs} seconds and was killed")]
    Timeout { program: String, timeout_secs: u64 },

    #[error("i/o with `{program}` failed: {message}")]
    Io { program: String, message: String },
}

/// Adapter-level build failures. Each becomes one synthetic error entry in
/// the resulting `BuildResult`.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid bundler metafile: {0}")]
    Metafile(#[from] serde_json::Error),

    #[error("{0} is not buildable")]
    NotBuildable(String),
}

pub type Result<T> = std::result::Result<T, BuildError>;
