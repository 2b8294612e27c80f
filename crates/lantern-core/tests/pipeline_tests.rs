mod common;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use common::{create_test_engine, drain};
use lantern_core::{
    completion::ScriptedCompletion, CompletionRequest, CompletionService, CompletionTask,
    MessageKind, ObjectiveStatus, RunEvent, SubtaskStatus,
};
use tokio_util::sync::CancellationToken;

const LIST_ROOT: &str =
    r#"{"subtasks": [{"name": "inspect root", "tool": "list_directory", "parameters": {}}]}"#;

#[tokio::test]
async fn test_unusable_plan_falls_back_for_unknown_project() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .reply(CompletionTask::Plan, "Sorry, I can't plan that.")
            .always(CompletionTask::Decompose, LIST_ROOT),
    );
    let (_temp_dir, engine, project) = create_test_engine(completion).await;
    engine.store().ensure_session("s1", None).await.unwrap();
    let mut events = engine.broadcaster().subscribe();

    let report = engine
        .run_plan("s1", "add a contact form", &project, CancellationToken::new())
        .await
        .unwrap();

    let objectives = engine.store().get_objectives("s1").await.unwrap();
    assert!(!objectives.is_empty());
    assert!(report.success);
    assert_eq!(report.objectives_done, objectives.len());

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e.event,
        RunEvent::PlanCreated { fallback: true, .. }
    )));
}

#[tokio::test]
async fn test_unknown_tool_is_regenerated_once_then_fails_objective() {
    let teleport = r#"{"subtasks": [{"name": "move", "tool": "teleport_file", "parameters": {"path": "a"}}]}"#;
    let completion = Arc::new(
        ScriptedCompletion::new()
            .reply(CompletionTask::Plan, r#"["Move the file", "Check the root"]"#)
            .reply(CompletionTask::Decompose, teleport)
            .reply(CompletionTask::Decompose, teleport)
            .reply(CompletionTask::Decompose, LIST_ROOT)
            .reply(CompletionTask::Summarize, r#"{"summary": "One of two objectives done."}"#),
    );
    let (_temp_dir, engine, project) = create_test_engine(completion.clone()).await;
    engine.store().ensure_session("s1", None).await.unwrap();

    let report = engine
        .run_plan("s1", "move a file", &project, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(completion.calls(CompletionTask::Decompose), 3);
    assert!(!report.success);
    assert_eq!(report.summary, "One of two objectives done.");

    let objectives = engine.store().get_objectives("s1").await.unwrap();
    assert_eq!(objectives[0].status, ObjectiveStatus::Failed);
    assert!(objectives[0]
        .failure_reason
        .as_deref()
        .unwrap()
        .starts_with("decomposition error"));
    assert!(engine
        .store()
        .get_subtask_group(objectives[0].id)
        .await
        .unwrap()
        .is_none());

    // A failed objective does not block its siblings
    assert_eq!(objectives[1].status, ObjectiveStatus::Done);
}

#[tokio::test]
async fn test_unknown_tool_past_the_subtask_limit_forces_regeneration() {
    let inspect = r#"{"name": "inspect", "tool": "list_directory", "parameters": {}}"#;
    let mut drafts = vec![inspect; 6];
    drafts.push(r#"{"name": "move", "tool": "teleport_file", "parameters": {}}"#);
    let oversized = format!(r#"{{"subtasks": [{}]}}"#, drafts.join(", "));

    let completion = Arc::new(
        ScriptedCompletion::new()
            .reply(CompletionTask::Plan, r#"["Inspect the root"]"#)
            .reply(CompletionTask::Decompose, oversized)
            .reply(CompletionTask::Decompose, LIST_ROOT),
    );
    let (_temp_dir, engine, project) = create_test_engine(completion.clone()).await;
    engine.store().ensure_session("s1", None).await.unwrap();

    let report = engine
        .run_plan("s1", "inspect", &project, CancellationToken::new())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(completion.calls(CompletionTask::Decompose), 2);
    let objective = engine.store().get_objectives("s1").await.unwrap().remove(0);
    let group = engine
        .store()
        .get_subtask_group(objective.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(group.entries.len(), 1);
}

#[tokio::test]
async fn test_failing_subtask_is_skipped_after_two_passes() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .reply(CompletionTask::Plan, r#"{"objectives": ["Read the notes"]}"#)
            .reply(
                CompletionTask::Decompose,
                r#"{"subtasks": [
                    {"name": "read notes", "tool": "read_file", "parameters": {"path": "NOTES.md"}},
                    {"name": "inspect root", "tool": "list_directory", "parameters": {}}
                ]}"#,
            ),
    );
    let (_temp_dir, engine, project) = create_test_engine(completion).await;
    engine.store().ensure_session("s1", None).await.unwrap();

    let report = engine
        .run_plan("s1", "summarize the notes", &project, CancellationToken::new())
        .await
        .unwrap();
    assert!(!report.success);

    let objective = engine.store().get_objectives("s1").await.unwrap().remove(0);
    assert_eq!(objective.status, ObjectiveStatus::Failed);
    assert_eq!(
        objective.failure_reason.as_deref(),
        Some("1 of 2 subtasks skipped")
    );

    let group = engine
        .store()
        .get_subtask_group(objective.id)
        .await
        .unwrap()
        .unwrap();
    let read = &group.entries[0];
    assert_eq!(read.status, SubtaskStatus::Skipped);
    assert_eq!(read.passes, 2);
    // Not-found is terminal, so each pass dispatches once
    assert_eq!(read.attempts, 2);
    assert!(read.error.is_some());

    // The sibling entry still ran
    assert_eq!(group.entries[1].status, SubtaskStatus::Done);
}

/// Answers like a model would and raises the stop signal when the given
/// decomposition request arrives.
struct StopDuringDecompose {
    cancel: CancellationToken,
    stop_at: usize,
    decompose_calls: AtomicUsize,
}

#[async_trait]
impl CompletionService for StopDuringDecompose {
    async fn complete(&self, request: &CompletionRequest) -> lantern_core::Result<String> {
        let reply = match request.task {
            CompletionTask::Plan => {
                r#"["Scaffold the page", "Add the form", "Style the form", "Deploy"]"#
            }
            CompletionTask::Decompose => {
                let call = self.decompose_calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call == self.stop_at {
                    self.cancel.cancel();
                }
                LIST_ROOT
            }
            _ => "{}",
        };
        Ok(reply.to_string())
    }
}

#[tokio::test]
async fn test_stop_signal_between_objectives() {
    let cancel = CancellationToken::new();
    let completion = Arc::new(StopDuringDecompose {
        cancel: cancel.clone(),
        stop_at: 3,
        decompose_calls: AtomicUsize::new(0),
    });
    let (_temp_dir, engine, project) = create_test_engine(completion).await;
    engine.store().ensure_session("s1", None).await.unwrap();
    let mut events = engine.broadcaster().subscribe();

    let report = engine
        .run_plan("s1", "add a contact form", &project, cancel)
        .await
        .unwrap();
    assert!(report.cancelled);
    assert!(!report.success);

    let statuses: Vec<ObjectiveStatus> = engine
        .store()
        .get_objectives("s1")
        .await
        .unwrap()
        .iter()
        .map(|o| o.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            ObjectiveStatus::Done,
            ObjectiveStatus::Done,
            ObjectiveStatus::Failed,
            ObjectiveStatus::Pending,
        ]
    );
    let third = &engine.store().get_objectives("s1").await.unwrap()[2];
    assert_eq!(third.failure_reason.as_deref(), Some("cancelled"));

    let events = drain(&mut events);
    assert!(matches!(
        events.last().map(|e| &e.event),
        Some(RunEvent::RunComplete { success: false, .. })
    ));
    assert!(!events.iter().any(|e| matches!(
        e.event,
        RunEvent::ObjectiveStatus { order: 4, .. }
    )));
}

fn statuses(objectives: &[lantern_core::Objective]) -> Vec<ObjectiveStatus> {
    objectives.iter().map(|o| o.status).collect()
}

#[tokio::test]
async fn test_new_plan_after_stop_leaves_earlier_objectives_alone() {
    let cancel = CancellationToken::new();
    let completion = Arc::new(StopDuringDecompose {
        cancel: cancel.clone(),
        stop_at: 3,
        decompose_calls: AtomicUsize::new(0),
    });
    let (_temp_dir, engine, project) = create_test_engine(completion).await;
    engine.store().ensure_session("s1", None).await.unwrap();

    let stopped = engine
        .run_plan("s1", "add a contact form", &project, cancel)
        .await
        .unwrap();
    assert!(stopped.cancelled);

    let report = engine
        .run_plan("s1", "add a footer", &project, CancellationToken::new())
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.objectives_done, 4);
    assert_eq!(report.objectives_failed, 0);

    let objectives = engine.store().get_objectives("s1").await.unwrap();
    assert_eq!(objectives.len(), 8);
    assert_eq!(
        statuses(&objectives[..4]),
        vec![
            ObjectiveStatus::Done,
            ObjectiveStatus::Done,
            ObjectiveStatus::Failed,
            ObjectiveStatus::Pending,
        ]
    );
    assert!(objectives[4..]
        .iter()
        .all(|o| o.status == ObjectiveStatus::Done));
}

#[tokio::test]
async fn test_resume_after_stop_finishes_the_stopped_plan() {
    let cancel = CancellationToken::new();
    let completion = Arc::new(StopDuringDecompose {
        cancel: cancel.clone(),
        stop_at: 3,
        decompose_calls: AtomicUsize::new(0),
    });
    let (_temp_dir, engine, project) = create_test_engine(completion).await;
    engine
        .store()
        .ensure_session("s1", Some(project.display().to_string()))
        .await
        .unwrap();

    engine
        .run_plan("s1", "add a contact form", &project, cancel)
        .await
        .unwrap();
    let report = engine.resume("s1", CancellationToken::new()).await.unwrap();

    assert!(!report.cancelled);
    assert!(!report.success);
    assert_eq!(report.objectives_done, 3);
    assert_eq!(report.objectives_failed, 1);
    assert_eq!(
        statuses(&engine.store().get_objectives("s1").await.unwrap()),
        vec![
            ObjectiveStatus::Done,
            ObjectiveStatus::Done,
            ObjectiveStatus::Failed,
            ObjectiveStatus::Done,
        ]
    );
}

#[tokio::test]
async fn test_event_stream_matches_final_state() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .reply(CompletionTask::Plan, r#"["Write the page", "Read it back"]"#)
            .reply(
                CompletionTask::Decompose,
                r#"{"subtasks": [{"name": "write", "tool": "write_file", "parameters": {"path": "index.html", "content": "<h1>Hi</h1>"}}]}"#,
            )
            .reply(
                CompletionTask::Decompose,
                r#"{"subtasks": [{"name": "read", "tool": "read_file", "parameters": {"path": "index.html"}}]}"#,
            )
            .reply(CompletionTask::Summarize, "Wrote and verified index.html."),
    );
    let (_temp_dir, engine, project) = create_test_engine(completion).await;
    engine.store().ensure_session("s1", None).await.unwrap();
    let mut events = engine.broadcaster().subscribe();

    let report = engine
        .run_plan("s1", "write a page", &project, CancellationToken::new())
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.summary, "Wrote and verified index.html.");
    assert_eq!(
        std::fs::read_to_string(project.join("index.html")).unwrap(),
        "<h1>Hi</h1>"
    );

    let events = drain(&mut events);
    assert!(events.windows(2).all(|pair| pair[0].seq < pair[1].seq));
    assert!(matches!(
        events.last().map(|e| &e.event),
        Some(RunEvent::RunComplete { success: true, .. })
    ));

    // The last status published for each objective is the stored one
    for objective in engine.store().get_objectives("s1").await.unwrap() {
        let last = events
            .iter()
            .rev()
            .find_map(|e| match &e.event {
                RunEvent::ObjectiveStatus {
                    objective_id,
                    status,
                    ..
                } if *objective_id == objective.id => Some(*status),
                _ => None,
            })
            .unwrap();
        assert_eq!(last, objective.status);
    }

    let messages = engine.store().get_messages("s1").await.unwrap();
    let plan = messages.iter().find(|m| m.kind == MessageKind::Plan).unwrap();
    assert!(plan.payload["objectives"]
        .as_array()
        .unwrap()
        .iter()
        .all(|o| o["status"] == "done"));
    assert_eq!(messages.last().unwrap().kind, MessageKind::Summary);
}

#[tokio::test]
async fn test_completion_outage_aborts_planning() {
    let completion = Arc::new(ScriptedCompletion::new().fail(CompletionTask::Plan, "offline"));
    let (_temp_dir, engine, project) = create_test_engine(completion).await;
    engine.store().ensure_session("s1", None).await.unwrap();

    let result = engine
        .run_plan("s1", "anything", &project, CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(lantern_core::EngineError::Completion { .. })
    ));
    assert!(engine.store().get_objectives("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resume_continues_pending_objectives() {
    let completion = Arc::new(ScriptedCompletion::new().always(CompletionTask::Decompose, LIST_ROOT));
    let (_temp_dir, engine, project) = create_test_engine(completion).await;
    let store = engine.store();
    store
        .ensure_session("s1", Some(project.display().to_string()))
        .await
        .unwrap();
    store
        .add_message(
            "s1",
            lantern_core::MessageRole::User,
            MessageKind::Text,
            serde_json::json!({"request": "tidy up", "mode": "plan"}),
        )
        .await
        .unwrap();
    let objectives = store
        .create_objectives("s1", vec!["First".to_string(), "Second".to_string()])
        .await
        .unwrap();
    store
        .set_objective_status(objectives[0].id, ObjectiveStatus::Running, None)
        .await
        .unwrap();
    store
        .set_objective_status(objectives[0].id, ObjectiveStatus::Done, None)
        .await
        .unwrap();

    let report = engine.resume("s1", CancellationToken::new()).await.unwrap();
    assert!(report.success);
    assert_eq!(report.objectives_done, 2);
}

#[tokio::test]
async fn test_resume_without_plan_is_rejected() {
    let (_temp_dir, engine, project) = create_test_engine(Arc::new(ScriptedCompletion::new())).await;
    engine
        .store()
        .ensure_session("s1", Some(project.display().to_string()))
        .await
        .unwrap();

    let result = engine.resume("s1", CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(lantern_core::EngineError::InvalidInput { .. })
    ));

    let missing = engine.resume("nope", CancellationToken::new()).await;
    assert!(matches!(
        missing,
        Err(lantern_core::EngineError::SessionNotFound { .. })
    ));
}
