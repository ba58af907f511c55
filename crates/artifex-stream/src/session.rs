//! Stream session state machine.
//!
//! ```text
//! created ─chunk─▶ streaming ─complete─▶ finalizing ─finalized─▶ completed
//!    │                 │                     │
//!    └─────────────────┴─────────────────────┴──▶ error | timeout | evicted
//! ```
//!
//! [`StreamSession`] is the pure machine plus its bounded event history.
//! [`SessionHandle`] pairs it with the connection: every write goes through
//! the handle, and once a terminal state is entered nothing is written again.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use artifex_core::obs::emit_step_failed;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::events::{connection_payload, EventKind, StreamEvent, SSE_HEADERS};
use crate::sink::EventSink;

/// Default size of the event history ring.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Created,
    Streaming,
    Finalizing,
    Completed,
    Error,
    Timeout,
    Evicted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Error | SessionState::Timeout | SessionState::Evicted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Streaming => "streaming",
            SessionState::Finalizing => "finalizing",
            SessionState::Completed => "completed",
            SessionState::Error => "error",
            SessionState::Timeout => "timeout",
            SessionState::Evicted => "evicted",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discrete inputs driving the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionInput {
    ChunkReceived,
    StreamComplete,
    /// Final-buffer processing finished.
    Finalized,
    TimeoutFired,
    Evicted,
    Failed,
}

/// Transition table. `None` means the input is not valid in that state.
pub fn transition(state: SessionState, input: SessionInput) -> Option<SessionState> {
    use SessionInput as I;
    use SessionState as S;
    if state.is_terminal() {
        return None;
    }
    match (state, input) {
        (S::Created | S::Streaming, I::ChunkReceived) => Some(S::Streaming),
        (S::Created | S::Streaming, I::StreamComplete) => Some(S::Finalizing),
        (S::Finalizing, I::Finalized) => Some(S::Completed),
        (_, I::TimeoutFired) => Some(S::Timeout),
        (_, I::Evicted) => Some(S::Evicted),
        (_, I::Failed) => Some(S::Error),
        _ => None,
    }
}

/// One streaming exchange.
#[derive(Debug, Clone)]
pub struct StreamSession {
    id: String,
    started_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    state: SessionState,
    artifacts_processed: usize,
    history: VecDeque<StreamEvent>,
    history_capacity: usize,
    seq: u64,
}

impl StreamSession {
    pub fn new(id: impl Into<String>, history_capacity: usize) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            started_at: now,
            last_activity_at: now,
            state: SessionState::Created,
            artifacts_processed: 0,
            history: VecDeque::with_capacity(history_capacity.min(DEFAULT_HISTORY_CAPACITY)),
            history_capacity: history_capacity.max(1),
            seq: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    pub fn artifacts_processed(&self) -> usize {
        self.artifacts_processed
    }

    /// Most recent events, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &StreamEvent> {
        self.history.iter()
    }

    /// Number of events emitted over the session's life.
    pub fn events_emitted(&self) -> u64 {
        self.seq
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn apply(&mut self, input: SessionInput) -> Result<SessionState> {
        let next = transition(self.state, input).ok_or(SessionError::InvalidTransition {
            from: self.state,
            input,
        })?;
        debug!(session_id = %self.id, from = %self.state, to = %next, "session transition");
        self.state = next;
        self.last_activity_at = Utc::now();
        Ok(next)
    }

    /// Allocate the next event, or `None` once terminal.
    pub fn next_event(&mut self, kind: EventKind, payload: Value) -> Option<StreamEvent> {
        if self.is_terminal() {
            return None;
        }
        self.seq += 1;
        let event = StreamEvent::new(kind, &self.id, self.seq, payload);
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(event.clone());
        if kind == EventKind::Artifact {
            self.artifacts_processed += 1;
        }
        self.last_activity_at = event.timestamp;
        Some(event)
    }
}

struct HandleInner {
    id: String,
    sink: Arc<dyn EventSink>,
    session: Mutex<StreamSession>,
    terminal: watch::Sender<bool>,
}

/// Shared, connection-bound view of a session.
///
/// Writes are serialized by the session lock, so event order on the wire is
/// `seq` order.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl SessionHandle {
    pub fn new(id: impl Into<String>, sink: Arc<dyn EventSink>, history_capacity: usize) -> Self {
        let id = id.into();
        let (terminal, _) = watch::channel(false);
        Self {
            inner: Arc::new(HandleInner {
                session: Mutex::new(StreamSession::new(id.clone(), history_capacity)),
                id,
                sink,
                terminal,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub async fn state(&self) -> SessionState {
        self.inner.session.lock().await.state()
    }

    /// Copy of the session for inspection.
    pub async fn snapshot(&self) -> StreamSession {
        self.inner.session.lock().await.clone()
    }

    pub fn is_terminated(&self) -> bool {
        *self.inner.terminal.borrow()
    }

    /// Resolves once the session is in a terminal state.
    pub async fn wait_terminal(&self) {
        let mut rx = self.inner.terminal.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Send headers and the `connection` event.
    pub async fn open(&self) -> Result<()> {
        if let Err(e) = self.inner.sink.open(SSE_HEADERS).await {
            let mut session = self.inner.session.lock().await;
            self.fail_locked(&mut session, &e);
            return Err(e);
        }
        self.emit(EventKind::Connection, connection_payload(self.id()))
            .await;
        Ok(())
    }

    /// Write one event. Returns whether it was written; a no-op once terminal.
    pub async fn emit(&self, kind: EventKind, payload: Value) -> bool {
        let mut session = self.inner.session.lock().await;
        self.write_locked(&mut session, kind, payload).await
    }

    /// Record an inbound chunk and emit it.
    pub async fn receive_chunk(&self, payload: Value) -> bool {
        let mut session = self.inner.session.lock().await;
        if session.apply(SessionInput::ChunkReceived).is_err() {
            return false;
        }
        self.write_locked(&mut session, EventKind::Chunk, payload).await
    }

    /// Apply a non-terminal transition.
    pub async fn advance(&self, input: SessionInput) -> Result<SessionState> {
        let mut session = self.inner.session.lock().await;
        let state = session.apply(input)?;
        if state.is_terminal() {
            self.inner.terminal.send_replace(true);
        }
        Ok(state)
    }

    /// Write a final event, then enter a terminal state.
    ///
    /// Returns `false` when the session was already terminal. A failed final
    /// write ends the session in `error` instead.
    pub async fn terminate(&self, input: SessionInput, last: Option<(EventKind, Value)>) -> bool {
        let mut session = self.inner.session.lock().await;
        if session.is_terminal() {
            return false;
        }
        if let Some((kind, payload)) = last {
            if !self.write_locked(&mut session, kind, payload).await {
                return true;
            }
        }
        let ok = session.apply(input).is_ok();
        self.inner.terminal.send_replace(true);
        ok
    }

    async fn write_locked(&self, session: &mut StreamSession, kind: EventKind, payload: Value) -> bool {
        let Some(event) = session.next_event(kind, payload) else {
            return false;
        };
        match self.inner.sink.send(&event).await {
            Ok(()) => true,
            Err(e) => {
                self.fail_locked(session, &e);
                false
            }
        }
    }

    fn fail_locked(&self, session: &mut StreamSession, error: &SessionError) {
        emit_step_failed(&self.inner.id, "sink.send", error);
        if session.apply(SessionInput::Failed).is_ok() {
            self.inner.terminal.send_replace(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;
    use serde_json::json;

    #[test]
    fn test_transition_table() {
        use SessionInput as I;
        use SessionState as S;
        assert_eq!(transition(S::Created, I::ChunkReceived), Some(S::Streaming));
        assert_eq!(transition(S::Streaming, I::ChunkReceived), Some(S::Streaming));
        assert_eq!(transition(S::Created, I::StreamComplete), Some(S::Finalizing));
        assert_eq!(transition(S::Finalizing, I::Finalized), Some(S::Completed));
        assert_eq!(transition(S::Finalizing, I::ChunkReceived), None);
        assert_eq!(transition(S::Streaming, I::Finalized), None);
        assert_eq!(transition(S::Streaming, I::TimeoutFired), Some(S::Timeout));
        assert_eq!(transition(S::Finalizing, I::Evicted), Some(S::Evicted));
        for terminal in [S::Completed, S::Error, S::Timeout, S::Evicted] {
            assert_eq!(transition(terminal, I::Failed), None);
            assert_eq!(transition(terminal, I::ChunkReceived), None);
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let mut session = StreamSession::new("s", 3);
        for _ in 0..5 {
            session.next_event(EventKind::Chunk, json!({}));
        }
        let seqs: Vec<u64> = session.history().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
        assert_eq!(session.events_emitted(), 5);
    }

    #[tokio::test]
    async fn test_emit_after_terminal_is_noop() {
        let sink = Arc::new(RecordingSink::new());
        let handle = SessionHandle::new("s", sink.clone(), DEFAULT_HISTORY_CAPACITY);
        handle.open().await.unwrap();
        assert!(handle.terminate(SessionInput::TimeoutFired, None).await);
        let attempts = sink.attempts();

        assert!(!handle.emit(EventKind::Chunk, json!({})).await);
        assert!(!handle.receive_chunk(json!({})).await);
        assert!(!handle.terminate(SessionInput::Failed, None).await);
        assert_eq!(sink.attempts(), attempts);
        assert_eq!(handle.state().await, SessionState::Timeout);
        assert!(handle.is_terminated());
    }

    #[tokio::test]
    async fn test_sink_failure_is_session_fatal() {
        let sink = Arc::new(RecordingSink::new());
        let handle = SessionHandle::new("s", sink.clone(), DEFAULT_HISTORY_CAPACITY);
        handle.open().await.unwrap();
        sink.set_fail_sends(true);
        assert!(!handle.receive_chunk(json!({"text": "x"})).await);
        assert_eq!(handle.state().await, SessionState::Error);
        handle.wait_terminal().await;
    }

    #[tokio::test]
    async fn test_artifact_events_are_counted() {
        let sink = Arc::new(RecordingSink::new());
        let handle = SessionHandle::new("s", sink.clone(), DEFAULT_HISTORY_CAPACITY);
        handle.emit(EventKind::Artifact, json!({})).await;
        handle.emit(EventKind::Build, json!({})).await;
        assert_eq!(handle.snapshot().await.artifacts_processed(), 1);
    }
}
