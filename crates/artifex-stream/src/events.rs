//! Events emitted to the caller of a streaming session.

use std::fmt;

use artifex_core::{BuildResult, ConsolidatedArtifact, Language};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Response headers for a server-sent-events connection.
pub const SSE_HEADERS: &[(&str, &str)] = &[
    ("Content-Type", "text/event-stream"),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
    ("X-Accel-Buffering", "no"),
];

/// Classification of a stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Connection,
    Chunk,
    Artifact,
    Build,
    Project,
    Error,
    Complete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connection => "connection",
            EventKind::Chunk => "chunk",
            EventKind::Artifact => "artifact",
            EventKind::Build => "build",
            EventKind::Project => "project",
            EventKind::Error => "error",
            EventKind::Complete => "complete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase reported by a `build` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Started,
    Completed,
    Failed,
}

/// One event in a session's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub session_id: String,
    /// Position in the session's output, starting at 1.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl StreamEvent {
    pub fn new(kind: EventKind, session_id: &str, seq: u64, payload: Value) -> Self {
        Self {
            kind,
            session_id: session_id.to_string(),
            seq,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Render as one server-sent-events frame.
    pub fn to_sse(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("id: {}\nevent: {}\ndata: {}\n\n", self.seq, self.kind, data)
    }
}

pub fn connection_payload(session_id: &str) -> Value {
    json!({ "sessionId": session_id, "status": "connected" })
}

pub fn chunk_payload(text: &str, buffered: usize) -> Value {
    json!({ "text": text, "buffered": buffered })
}

pub fn artifact_payload(artifact: &ConsolidatedArtifact) -> Value {
    json!({ "artifact": artifact })
}

pub fn build_payload(artifact_id: &str, status: BuildStatus, result: Option<&BuildResult>) -> Value {
    let mut payload = json!({ "artifactId": artifact_id, "status": status });
    if let Some(result) = result {
        payload["result"] = json!(result);
    }
    payload
}

/// A file announced in a `project` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub path: String,
    pub language: Language,
    pub line_count: usize,
}

pub fn project_payload(files: &[ProjectFile]) -> Value {
    json!({ "files": files })
}

pub fn error_payload(reason: &str, message: &str) -> Value {
    json!({ "reason": reason, "message": message })
}

pub fn complete_payload(artifacts: usize, duration_ms: u64) -> Value {
    json!({ "artifacts": artifacts, "durationMs": duration_ms })
}
