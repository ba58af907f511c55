//! End-to-end session behavior with in-memory collaborators.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use artifex_build::fakes::ok_output;
use artifex_build::{
    ArtifactBuilder, BuildConfig, CommandOutput, CommandSpec, FakeCommandRunner, RunnerError,
};
use artifex_state::{ArtifactCache, CacheConfig, MemoryArtifactRepository, MemoryObjectStore};
use artifex_stream::{
    ArtifactPipeline, EventKind, EventSink, RecordingSink, SessionConfig, SessionManager,
    SessionState,
};
use futures::{stream, StreamExt};

const COUNTER: &str = "Here's a counter:\n\n```jsx\nimport { useState } from 'react';\n\nexport default function Counter() {\n  const [n, setN] = useState(0);\n  return <button onClick={() => setN(n + 1)}>{n}</button>;\n}\n```\n\nClick it!";

fn toolchain(spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
    if spec.program == "npm" {
        let prefix = spec.args.iter().position(|a| a == "--prefix").unwrap();
        let modules = PathBuf::from(&spec.args[prefix + 1]).join("node_modules");
        for name in &spec.args[prefix + 2..] {
            std::fs::create_dir_all(modules.join(name)).unwrap();
            std::fs::write(modules.join(name).join("package.json"), "{}").unwrap();
        }
        return Ok(ok_output(""));
    }
    Ok(ok_output("(()=>{})();"))
}

struct Fixture {
    manager: Arc<SessionManager>,
    store: Arc<MemoryObjectStore>,
    repository: Arc<MemoryArtifactRepository>,
    _deps: tempfile::TempDir,
}

fn fixture(config: SessionConfig, build_delay: Duration) -> Fixture {
    let deps = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeCommandRunner::new(toolchain).with_delay(build_delay));
    let builder = ArtifactBuilder::from_config(BuildConfig::new(deps.path()), runner);
    let store = Arc::new(MemoryObjectStore::new());
    let cache = ArtifactCache::new(store.clone(), CacheConfig::default());
    let repository = Arc::new(MemoryArtifactRepository::new());
    let pipeline = ArtifactPipeline::new(builder, cache, repository.clone());
    Fixture {
        manager: Arc::new(SessionManager::new(config, pipeline)),
        store,
        repository,
        _deps: deps,
    }
}

fn chunks(text: &str, size: usize) -> Vec<Result<String, std::io::Error>> {
    text.chars()
        .collect::<Vec<_>>()
        .chunks(size)
        .map(|c| Ok(c.iter().collect()))
        .collect()
}

fn position(kinds: &[EventKind], kind: EventKind) -> usize {
    kinds.iter().position(|k| *k == kind).unwrap()
}

#[tokio::test]
async fn test_component_response_event_order() {
    let fx = fixture(SessionConfig::default(), Duration::from_millis(20));
    let sink = Arc::new(RecordingSink::new());

    let summary = fx
        .manager
        .run(sink.clone(), stream::iter(chunks(COUNTER, 16)))
        .await;

    assert_eq!(summary.state, SessionState::Completed);
    assert_eq!(summary.artifacts_processed, 1);
    assert_eq!(summary.records.len(), 1);

    let kinds = sink.kinds();
    assert_eq!(kinds.first(), Some(&EventKind::Connection));
    assert_eq!(kinds.last(), Some(&EventKind::Complete));
    assert!(kinds.contains(&EventKind::Chunk));

    let builds = sink.events_of(EventKind::Build);
    assert_eq!(builds.len(), 2);
    assert_eq!(builds[0].payload["status"], "started");
    assert_eq!(builds[1].payload["status"], "completed");
    assert!(position(&kinds, EventKind::Artifact) < position(&kinds, EventKind::Build));
    assert!(builds[1].seq < sink.events_of(EventKind::Complete)[0].seq);

    let seqs: Vec<u64> = sink.events().iter().map(|e| e.seq).collect();
    assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1));

    let artifact = &sink.events_of(EventKind::Artifact)[0].payload["artifact"];
    assert_eq!(artifact["title"], "Counter");
    assert_eq!(artifact["type"], "react-component");

    let saved = fx.repository.records_for_session(&summary.session_id);
    assert_eq!(saved.len(), 1);
    assert!(saved[0].build.as_ref().unwrap().success);
    assert!(saved[0].stored.is_some());
    assert_eq!(fx.store.put_count(), 1);
    assert_eq!(sink.headers()[0].1, "text/event-stream");
}

#[tokio::test]
async fn test_web_blocks_are_stored_without_builds() {
    let fx = fixture(SessionConfig::default(), Duration::ZERO);
    let sink = Arc::new(RecordingSink::new());
    let text = "Page:\n```html\n<div class=\"card\">Hello there</div>\n```\nStyles:\n```css\n.card { color: red; padding: 4px; }\n```\n";

    let summary = fx.manager.run(sink.clone(), stream::iter(chunks(text, 10))).await;

    assert_eq!(summary.state, SessionState::Completed);
    // html block, css block, merged page
    assert_eq!(summary.artifacts_processed, 3);
    assert!(sink.events_of(EventKind::Build).is_empty());
    let merged = &sink.events_of(EventKind::Artifact)[2].payload["artifact"];
    assert_eq!(merged["type"], "web-page");
    assert!(merged["code"].as_str().unwrap().contains("<style>"));
    assert!(!merged["code"].as_str().unwrap().contains("<script"));
    assert_eq!(fx.store.put_count(), 3);
}

#[tokio::test]
async fn test_multi_file_response_emits_project() {
    let fx = fixture(SessionConfig::default(), Duration::ZERO);
    let sink = Arc::new(RecordingSink::new());
    let text = "```python\n# app.py\nfrom util import greet\nprint(greet('x'))\n```\n```python\n# util.py\ndef greet(name):\n    return 'hi ' + name\n```\n";

    let summary = fx.manager.run(sink.clone(), stream::iter(chunks(text, 32))).await;

    assert_eq!(summary.state, SessionState::Completed);
    let project = sink.events_of(EventKind::Project);
    assert_eq!(project.len(), 1);
    let files = project[0].payload["files"].as_array().unwrap();
    assert_eq!(files[0]["path"], "app.py");
    assert_eq!(files[1]["path"], "util.py");
}

#[tokio::test(start_paused = true)]
async fn test_idle_session_times_out() {
    let config = SessionConfig::default().with_idle_timeout(Duration::from_secs(5));
    let fx = fixture(config, Duration::ZERO);
    let sink = Arc::new(RecordingSink::new());
    let model = stream::iter(chunks("Thinking", 8)).chain(stream::pending());

    let summary = fx.manager.run(sink.clone(), model).await;

    assert_eq!(summary.state, SessionState::Timeout);
    let last = sink.events().pop().unwrap();
    assert_eq!(last.kind, EventKind::Error);
    assert_eq!(last.payload["reason"], "timeout");
    assert!(!sink.kinds().contains(&EventKind::Complete));
    assert_eq!(fx.manager.live_count(), 0);
}

#[tokio::test]
async fn test_oldest_session_is_evicted_at_capacity() {
    let config = SessionConfig::default()
        .with_max_sessions(1)
        .with_idle_timeout(Duration::from_secs(60));
    let fx = fixture(config, Duration::ZERO);

    let first_sink = Arc::new(RecordingSink::new());
    let manager = fx.manager.clone();
    let sink: Arc<dyn EventSink> = first_sink.clone();
    let first = tokio::spawn(async move {
        let model = stream::iter(chunks("Let me think", 4)).chain(stream::pending());
        manager.run(sink, model).await
    });
    for _ in 0..100 {
        if fx.manager.live_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(fx.manager.live_count(), 1);

    let second_sink = Arc::new(RecordingSink::new());
    let second = fx
        .manager
        .run(second_sink.clone(), stream::iter(chunks("no code here", 4)))
        .await;
    let first = first.await.unwrap();

    assert_eq!(first.state, SessionState::Evicted);
    assert_eq!(second.state, SessionState::Completed);
    let last = first_sink.events().pop().unwrap();
    assert_eq!(last.payload["reason"], "evicted");
    let attempts = first_sink.attempts();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(first_sink.attempts(), attempts);
    assert_eq!(fx.manager.live_count(), 0);
}

#[tokio::test]
async fn test_model_stream_error_is_session_fatal() {
    let fx = fixture(SessionConfig::default(), Duration::ZERO);
    let sink = Arc::new(RecordingSink::new());
    let model = stream::iter(vec![
        Ok("partial ".to_string()),
        Err(std::io::Error::other("upstream reset")),
        Ok("never seen".to_string()),
    ]);

    let summary = fx.manager.run(sink.clone(), model).await;

    assert_eq!(summary.state, SessionState::Error);
    let last = sink.events().pop().unwrap();
    assert_eq!(last.payload["reason"], "stream");
    assert_eq!(last.payload["message"], "upstream reset");
    assert_eq!(sink.events_of(EventKind::Chunk).len(), 1);
}

#[tokio::test]
async fn test_connection_failure_stops_all_writes() {
    let fx = fixture(SessionConfig::default(), Duration::ZERO);
    let sink = Arc::new(RecordingSink::new());
    sink.fail_after(1);

    let summary = fx.manager.run(sink.clone(), stream::iter(chunks(COUNTER, 8))).await;

    assert_eq!(summary.state, SessionState::Error);
    assert_eq!(sink.kinds(), vec![EventKind::Connection]);
    assert_eq!(sink.attempts(), 2);
    assert!(fx.repository.records().is_empty());
}
