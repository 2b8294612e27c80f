#![allow(dead_code)]

use std::{path::PathBuf, sync::Arc};

use lantern_core::{
    Broadcaster, CompletionService, Engine, EngineConfig, ProgressEvent, RunEvent, StateStore,
    ToolRegistry,
};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

/// Helper function to create a test store
pub async fn create_test_store() -> (TempDir, StateStore) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");
    let store = StateStore::open(db_path)
        .await
        .expect("Failed to create store");
    (temp_dir, store)
}

/// Engine over a fresh store with the built-in tools and no retry backoff,
/// plus an empty project directory inside the temp dir.
pub async fn create_test_engine(
    completion: Arc<dyn CompletionService>,
) -> (TempDir, Engine, PathBuf) {
    let (temp_dir, store) = create_test_store().await;
    let project = temp_dir.path().join("project");
    std::fs::create_dir(&project).expect("Failed to create project dir");

    let engine = Engine::new(
        store,
        Broadcaster::new(),
        completion,
        Arc::new(ToolRegistry::builtin()),
        EngineConfig::default().without_backoff(),
    );
    (temp_dir, engine, project)
}

/// Collects every event already published.
pub fn drain(events: &mut UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

/// Waits for the terminal event of `session_id`.
pub async fn wait_for_end(
    events: &mut UnboundedReceiver<ProgressEvent>,
    session_id: &str,
) -> RunEvent {
    loop {
        let event = tokio::time::timeout(std::time::Duration::from_secs(30), events.recv())
            .await
            .expect("Run did not finish in time")
            .expect("Event stream closed");
        if event.event.session_id() == session_id && event.event.is_terminal() {
            return event.event;
        }
    }
}
