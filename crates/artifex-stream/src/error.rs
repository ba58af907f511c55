//! Session error types.

use thiserror::Error;

use crate::session::{SessionInput, SessionState};

/// Errors that end or reject session work.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The caller's connection is gone.
    #[error("event sink closed")]
    SinkClosed,

    #[error("event sink failed: {0}")]
    Sink(String),

    #[error("invalid transition from {from} on {input:?}")]
    InvalidTransition {
        from: SessionState,
        input: SessionInput,
    },
}

pub type Result<T> = std::result::Result<T, SessionError>;
