//! Connection abstraction for emitted events.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Result, SessionError};
use crate::events::{EventKind, StreamEvent};

/// Where a session writes. One sink per session.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Send response headers. Called once, before any event.
    async fn open(&self, headers: &[(&str, &str)]) -> Result<()>;

    async fn send(&self, event: &StreamEvent) -> Result<()>;
}

/// Forwards events into a tokio channel.
pub struct ChannelSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn open(&self, _headers: &[(&str, &str)]) -> Result<()> {
        if self.tx.is_closed() {
            return Err(SessionError::SinkClosed);
        }
        Ok(())
    }

    async fn send(&self, event: &StreamEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| SessionError::SinkClosed)
    }
}

/// Records everything it receives (testing only).
#[derive(Default)]
pub struct RecordingSink {
    headers: Mutex<Vec<(String, String)>>,
    events: Mutex<Vec<StreamEvent>>,
    attempts: AtomicUsize,
    fail_sends: AtomicBool,
    fail_after: Mutex<Option<usize>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send from now on fails.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Sends succeed `n` times, then fail.
    pub fn fail_after(&self, n: usize) {
        *self.fail_after.lock().unwrap() = Some(n);
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        self.headers.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }

    pub fn events_of(&self, kind: EventKind) -> Vec<StreamEvent> {
        self.events().into_iter().filter(|e| e.kind == kind).collect()
    }

    /// Write attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn open(&self, headers: &[(&str, &str)]) -> Result<()> {
        *self.headers.lock().unwrap() = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Ok(())
    }

    async fn send(&self, event: &StreamEvent) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let limit_hit = self
            .fail_after
            .lock()
            .unwrap()
            .is_some_and(|n| attempt >= n);
        if limit_hit || self.fail_sends.load(Ordering::SeqCst) {
            return Err(SessionError::Sink("injected send failure".to_string()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::new(4);
        sink.open(&[]).await.unwrap();
        sink.send(&StreamEvent::new(EventKind::Chunk, "s", 1, json!({})))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().seq, 1);
    }

    #[tokio::test]
    async fn test_channel_sink_closed_receiver() {
        let (sink, rx) = ChannelSink::new(1);
        drop(rx);
        let err = sink
            .send(&StreamEvent::new(EventKind::Chunk, "s", 1, json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::SinkClosed);
    }

    #[tokio::test]
    async fn test_recording_sink_fail_after() {
        let sink = RecordingSink::new();
        sink.fail_after(1);
        let event = StreamEvent::new(EventKind::Chunk, "s", 1, json!({}));
        assert!(sink.send(&event).await.is_ok());
        assert!(sink.send(&event).await.is_err());
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.attempts(), 2);
    }
}
