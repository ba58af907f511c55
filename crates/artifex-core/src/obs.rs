//! Structured observability hooks for the artifact pipeline.
//!
//! This module provides:
//! - Session-scoped tracing spans via [`session_span`], attached with
//!   `Instrument` so they survive awaits and spawned tasks
//! - Emission functions for lifecycle events: session start/finish, artifact
//!   detection, installs, builds, cache activity
//!
//! Events are emitted at `info!` level unless noted. For JSON output pass
//! `json = true` to [`crate::telemetry::init_tracing`].

use tracing::info;

/// Tracing span for a session, for use with `Instrument` across awaits.
pub fn session_span(session_id: &str) -> tracing::Span {
    tracing::info_span!("artifex.session", session_id = %session_id)
}

pub fn emit_session_started(session_id: &str, live_sessions: usize) {
    info!(event = "session.started", session_id = %session_id, live_sessions = live_sessions);
}

/// Emit event: session reached a terminal state.
pub fn emit_session_finished(session_id: &str, state: &str, duration_ms: u64, artifacts: usize) {
    info!(
        event = "session.finished",
        session_id = %session_id,
        state = %state,
        duration_ms = duration_ms,
        artifacts = artifacts,
    );
}

pub fn emit_session_evicted(session_id: &str) {
    tracing::warn!(event = "session.evicted", session_id = %session_id);
}

/// Emit event: a new artifact hash was detected in the buffer.
pub fn emit_artifact_detected(session_id: &str, artifact_id: &str, language: &str, lines: usize) {
    info!(
        event = "artifact.detected",
        session_id = %session_id,
        artifact_id = %artifact_id,
        language = %language,
        lines = lines,
    );
}

pub fn emit_install_finished(requested: usize, installed: usize, failed: usize, duration_ms: u64) {
    info!(
        event = "install.finished",
        requested = requested,
        installed = installed,
        failed = failed,
        duration_ms = duration_ms,
    );
}

/// Emit event: a build attempt finished, successfully or not.
pub fn emit_build_finished(artifact_id: &str, success: bool, duration_ms: u64, errors: usize) {
    info!(
        event = "build.finished",
        artifact_id = %artifact_id,
        success = success,
        duration_ms = duration_ms,
        errors = errors,
    );
}

pub fn emit_cache_stored(hash: &str, key: &str, size: u64, uploaded: bool) {
    info!(event = "cache.stored", hash = %hash, key = %key, size = size, uploaded = uploaded);
}

/// Emit event: an entry left the in-memory cache (debug level).
pub fn emit_cache_evicted(hash: &str, cause: &str) {
    tracing::debug!(event = "cache.evicted", hash = %hash, cause = %cause);
}

/// Emit event: a recoverable pipeline step failed (warning level).
pub fn emit_step_failed(session_id: &str, step: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "pipeline.step_failed", session_id = %session_id, step = %step, error = %error);
}
