//! Session orchestration: admission, driving the model stream, teardown.

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use artifex_core::obs::{
    emit_artifact_detected, emit_session_evicted, emit_session_finished, emit_session_started,
    session_span,
};
use artifex_core::ConsolidatedArtifact;
use artifex_state::ArtifactRecord;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{warn, Instrument};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::detect::ArtifactDetector;
use crate::events::{
    artifact_payload, chunk_payload, complete_payload, error_payload, project_payload, EventKind,
};
use crate::pipeline::ArtifactPipeline;
use crate::session::{SessionHandle, SessionInput, SessionState};

/// Outcome of one session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub state: SessionState,
    pub artifacts_processed: usize,
    /// Artifacts whose processing finished before the session ended.
    pub records: Vec<ArtifactRecord>,
    pub events_emitted: u64,
    pub duration_ms: u64,
}

/// Owns every live session and the shared artifact pipeline.
pub struct SessionManager {
    config: SessionConfig,
    pipeline: Arc<ArtifactPipeline>,
    live: Mutex<VecDeque<SessionHandle>>,
}

enum Step {
    Chunk(String),
    Complete,
    Idle,
    Failed(String),
    Terminated,
}

impl SessionManager {
    pub fn new(config: SessionConfig, pipeline: ArtifactPipeline) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
            live: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &ArtifactPipeline {
        &self.pipeline
    }

    pub fn live_count(&self) -> usize {
        self.live().len()
    }

    fn live(&self) -> MutexGuard<'_, VecDeque<SessionHandle>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit a session, evicting the oldest ones over capacity.
    async fn admit(&self, handle: &SessionHandle) {
        let evicted: Vec<SessionHandle> = {
            let mut live = self.live();
            let mut evicted = Vec::new();
            while live.len() >= self.config.max_sessions {
                match live.pop_front() {
                    Some(oldest) => evicted.push(oldest),
                    None => break,
                }
            }
            live.push_back(handle.clone());
            evicted
        };
        for oldest in evicted {
            emit_session_evicted(oldest.id());
            oldest
                .terminate(
                    SessionInput::Evicted,
                    Some((
                        EventKind::Error,
                        error_payload("evicted", "session evicted: too many concurrent sessions"),
                    )),
                )
                .await;
        }
    }

    fn release(&self, id: &str) {
        self.live().retain(|h| h.id() != id);
    }

    /// Drive one exchange: open the connection, consume the model stream,
    /// process artifacts as they appear, finalize, tear down.
    ///
    /// The stream ending is the completion marker; an `Err` item is
    /// session-fatal.
    pub async fn run<S, E>(&self, sink: Arc<dyn crate::sink::EventSink>, stream: S) -> SessionSummary
    where
        S: Stream<Item = Result<String, E>> + Send + Unpin,
        E: Display,
    {
        let id = Uuid::new_v4().to_string();
        let span = session_span(&id);
        self.drive(id, sink, stream).instrument(span).await
    }

    async fn drive<S, E>(
        &self,
        id: String,
        sink: Arc<dyn crate::sink::EventSink>,
        mut stream: S,
    ) -> SessionSummary
    where
        S: Stream<Item = Result<String, E>> + Send + Unpin,
        E: Display,
    {
        let started = Instant::now();
        let handle = SessionHandle::new(id.clone(), sink, self.config.history_capacity);
        self.admit(&handle).await;
        emit_session_started(&id, self.live_count());

        let mut detector = ArtifactDetector::new();
        let mut pending: Vec<JoinHandle<ArtifactRecord>> = Vec::new();
        let mut records: Vec<ArtifactRecord> = Vec::new();

        if handle.open().await.is_ok() {
            loop {
                let step = tokio::select! {
                    _ = handle.wait_terminal() => Step::Terminated,
                    next = tokio::time::timeout(self.config.idle_timeout, stream.next()) => match next {
                        Err(_) => Step::Idle,
                        Ok(None) => Step::Complete,
                        Ok(Some(Err(e))) => Step::Failed(e.to_string()),
                        Ok(Some(Ok(text))) => Step::Chunk(text),
                    },
                };
                match step {
                    Step::Chunk(text) => {
                        let found = detector.push(&text);
                        let payload = if self.config.emit_chunks {
                            chunk_payload(&text, detector.buffer().len())
                        } else {
                            serde_json::Value::Null
                        };
                        if !self.accept_chunk(&handle, payload).await {
                            break;
                        }
                        for artifact in found {
                            if let Some(task) = self.dispatch(&handle, artifact).await {
                                pending.push(task);
                            }
                        }
                    }
                    Step::Complete => {
                        self.finalize(&handle, &mut detector, pending, &mut records, started)
                            .await;
                        pending = Vec::new();
                        break;
                    }
                    Step::Idle => {
                        let secs = self.config.idle_timeout.as_secs();
                        handle
                            .terminate(
                                SessionInput::TimeoutFired,
                                Some((
                                    EventKind::Error,
                                    error_payload("timeout", &format!("no model output for {secs}s")),
                                )),
                            )
                            .await;
                        break;
                    }
                    Step::Failed(message) => {
                        warn!(error = %message, "model stream failed");
                        handle
                            .terminate(
                                SessionInput::Failed,
                                Some((EventKind::Error, error_payload("stream", &message))),
                            )
                            .await;
                        break;
                    }
                    Step::Terminated => break,
                }
            }
        }

        // Dispatched work is not killed; whatever already finished is reported.
        for task in pending {
            if task.is_finished() {
                if let Ok(record) = task.await {
                    records.push(record);
                }
            }
        }

        self.release(&id);
        let snapshot = handle.snapshot().await;
        let duration_ms = started.elapsed().as_millis() as u64;
        emit_session_finished(
            &id,
            snapshot.state().as_str(),
            duration_ms,
            snapshot.artifacts_processed(),
        );
        SessionSummary {
            session_id: id,
            state: snapshot.state(),
            artifacts_processed: snapshot.artifacts_processed(),
            records,
            events_emitted: snapshot.events_emitted(),
            duration_ms,
        }
    }

    async fn accept_chunk(&self, handle: &SessionHandle, payload: serde_json::Value) -> bool {
        if self.config.emit_chunks {
            return handle.receive_chunk(payload).await;
        }
        handle.advance(SessionInput::ChunkReceived).await.is_ok()
    }

    /// Emit the `artifact` event and start processing in the background.
    async fn dispatch(
        &self,
        handle: &SessionHandle,
        artifact: ConsolidatedArtifact,
    ) -> Option<JoinHandle<ArtifactRecord>> {
        if !self.announce(handle, &artifact).await {
            return None;
        }
        let pipeline = self.pipeline.clone();
        let session = handle.clone();
        let span = session_span(handle.id());
        Some(tokio::spawn(
            async move { pipeline.process(&session, artifact).await }.instrument(span),
        ))
    }

    async fn announce(&self, handle: &SessionHandle, artifact: &ConsolidatedArtifact) -> bool {
        emit_artifact_detected(
            handle.id(),
            &artifact.id,
            artifact.language.as_str(),
            artifact.metadata.line_count,
        );
        handle.emit(EventKind::Artifact, artifact_payload(artifact)).await
    }

    /// Process what the final buffer adds, wait for pending work, complete.
    async fn finalize(
        &self,
        handle: &SessionHandle,
        detector: &mut ArtifactDetector,
        pending: Vec<JoinHandle<ArtifactRecord>>,
        records: &mut Vec<ArtifactRecord>,
        started: Instant,
    ) {
        if handle.advance(SessionInput::StreamComplete).await.is_err() {
            return;
        }

        if let Some(artifact) = detector.finish() {
            if self.announce(handle, &artifact).await {
                records.push(self.pipeline.process(handle, artifact).await);
            }
        }

        let files = detector.project_files();
        if files.len() >= 2 {
            handle.emit(EventKind::Project, project_payload(&files)).await;
        }

        for task in pending {
            match task.await {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "artifact processing task failed"),
            }
        }

        let artifacts = handle.snapshot().await.artifacts_processed();
        let duration_ms = started.elapsed().as_millis() as u64;
        handle
            .terminate(
                SessionInput::Finalized,
                Some((EventKind::Complete, complete_payload(artifacts, duration_ms))),
            )
            .await;
    }
}
