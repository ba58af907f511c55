//! Session orchestration configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::DEFAULT_HISTORY_CAPACITY;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_SESSIONS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// A session with no inbound chunk for this long times out.
    pub idle_timeout: Duration,
    /// Live sessions allowed at once; the oldest is evicted beyond this.
    pub max_sessions: usize,
    pub history_capacity: usize,
    /// Echo inbound text as `chunk` events.
    pub emit_chunks: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: std::env::var("ARTIFEX_SESSION_IDLE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_IDLE_TIMEOUT),
            max_sessions: std::env::var("ARTIFEX_MAX_SESSIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_MAX_SESSIONS),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            emit_chunks: true,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max.max(1);
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_chunk_events(mut self, enabled: bool) -> Self {
        self.emit_chunks = enabled;
        self
    }
}
