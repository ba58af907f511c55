//! Artifex stream: drives the artifact pipeline from a live model stream.
//!
//! A [`SessionManager`] owns the live sessions. Each session consumes text
//! increments, detects artifacts as their fences close, hands them to the
//! [`ArtifactPipeline`] and reports progress as [`StreamEvent`]s through an
//! [`EventSink`].

pub mod config;
pub mod detect;
pub mod error;
pub mod events;
pub mod manager;
pub mod pipeline;
pub mod session;
pub mod sink;

pub use config::SessionConfig;
pub use detect::ArtifactDetector;
pub use error::{Result, SessionError};
pub use events::{BuildStatus, EventKind, ProjectFile, StreamEvent, SSE_HEADERS};
pub use manager::{SessionManager, SessionSummary};
pub use pipeline::ArtifactPipeline;
pub use session::{SessionHandle, SessionInput, SessionState, StreamSession};
pub use sink::{ChannelSink, EventSink, RecordingSink};
