//! Per-artifact processing: build, cache, persist.
//!
//! Nothing here is session-fatal. Build problems travel in the `build` event,
//! storage and persistence failures are logged and the artifact goes on
//! without them.

use std::sync::Arc;

use artifex_build::ArtifactBuilder;
use artifex_core::obs::emit_step_failed;
use artifex_core::ConsolidatedArtifact;
use artifex_state::{ArtifactCache, ArtifactRecord, ArtifactRepository, StoreOptions};
use chrono::Utc;

use crate::events::{build_payload, BuildStatus, EventKind};
use crate::session::SessionHandle;

pub struct ArtifactPipeline {
    builder: ArtifactBuilder,
    cache: ArtifactCache,
    repository: Arc<dyn ArtifactRepository>,
}

impl ArtifactPipeline {
    pub fn new(
        builder: ArtifactBuilder,
        cache: ArtifactCache,
        repository: Arc<dyn ArtifactRepository>,
    ) -> Self {
        Self {
            builder,
            cache,
            repository,
        }
    }

    pub fn builder(&self) -> &ArtifactBuilder {
        &self.builder
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Build (when buildable), store and persist one detected artifact.
    ///
    /// The caller has already emitted its `artifact` event.
    pub async fn process(&self, session: &SessionHandle, artifact: ConsolidatedArtifact) -> ArtifactRecord {
        let build = if artifact.metadata.buildable {
            session
                .emit(EventKind::Build, build_payload(&artifact.id, BuildStatus::Started, None))
                .await;
            let result = self
                .builder
                .build_titled(&artifact.code, &artifact.language, &artifact.title)
                .await;
            let status = if result.success {
                BuildStatus::Completed
            } else {
                BuildStatus::Failed
            };
            session
                .emit(EventKind::Build, build_payload(&artifact.id, status, Some(&result)))
                .await;
            Some(result)
        } else {
            None
        };

        let options = StoreOptions::for_session(session.id()).with_title(&artifact.title);
        let stored = match self.cache.store(&artifact.code, &artifact.language, options).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                emit_step_failed(session.id(), "cache.store", &e);
                None
            }
        };

        let record = ArtifactRecord {
            session_id: session.id().to_string(),
            artifact,
            build,
            stored,
            created_at: Utc::now(),
        };
        if let Err(e) = self.repository.save(&record).await {
            emit_step_failed(session.id(), "repository.save", &e);
        }
        record
    }
}
