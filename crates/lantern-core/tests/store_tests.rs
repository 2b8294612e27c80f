mod common;

use common::create_test_store;
use lantern_core::{
    db::subtask_queries::SubtaskUpdate,
    models::SubtaskDraft,
    EngineError, MessageKind, MessageRole, ObjectiveStatus, SubtaskStatus,
};
use serde_json::{json, Map};

fn draft(name: &str, tool: &str) -> SubtaskDraft {
    SubtaskDraft {
        name: name.to_string(),
        tool: tool.to_string(),
        parameters: Map::new(),
    }
}

#[tokio::test]
async fn test_objective_orders_stay_contiguous_across_plans() {
    let (_temp_dir, store) = create_test_store().await;
    store.ensure_session("s1", Some("/srv/site".to_string())).await.unwrap();

    store
        .create_objectives("s1", vec!["Scaffold".to_string(), "Style".to_string()])
        .await
        .unwrap();
    let appended = store
        .create_objectives("s1", vec!["Deploy".to_string()])
        .await
        .unwrap();
    assert_eq!(appended[0].order, 3);

    let orders: Vec<u32> = store
        .get_objectives("s1")
        .await
        .unwrap()
        .iter()
        .map(|o| o.order)
        .collect();
    assert_eq!(orders, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_objectives_require_a_session() {
    let (_temp_dir, store) = create_test_store().await;

    let result = store
        .create_objectives("missing", vec!["Anything".to_string()])
        .await;
    assert!(matches!(result, Err(EngineError::SessionNotFound { .. })));
}

#[tokio::test]
async fn test_objective_lifecycle_is_enforced() {
    let (_temp_dir, store) = create_test_store().await;
    store.ensure_session("s1", None).await.unwrap();
    let objective = store
        .create_objectives("s1", vec!["Scaffold".to_string()])
        .await
        .unwrap()
        .remove(0);

    let skipped = store
        .set_objective_status(objective.id, ObjectiveStatus::Done, None)
        .await;
    assert!(matches!(
        skipped,
        Err(EngineError::InvalidTransition { entity: "objective", .. })
    ));

    store
        .set_objective_status(objective.id, ObjectiveStatus::Running, None)
        .await
        .unwrap();
    let failed = store
        .set_objective_status(
            objective.id,
            ObjectiveStatus::Failed,
            Some("decomposition error: no tools".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(failed.status, ObjectiveStatus::Failed);
    assert_eq!(
        failed.failure_reason.as_deref(),
        Some("decomposition error: no tools")
    );

    let reopened = store
        .set_objective_status(objective.id, ObjectiveStatus::Running, None)
        .await;
    assert!(reopened.is_err());
}

#[tokio::test]
async fn test_subtask_group_positions_and_passes() {
    let (_temp_dir, store) = create_test_store().await;
    store.ensure_session("s1", None).await.unwrap();
    let objective = store
        .create_objectives("s1", vec!["Build".to_string()])
        .await
        .unwrap()
        .remove(0);

    let group = store
        .create_subtask_group(
            objective.id,
            vec![draft("install", "install_dependency"), draft("build", "run_command")],
        )
        .await
        .unwrap();
    let positions: Vec<u32> = group.entries.iter().map(|e| e.position).collect();
    assert_eq!(positions, vec![0, 1]);
    assert!(group.entries.iter().all(|e| e.status == SubtaskStatus::Pending));

    let stored = store.get_objective(objective.id).await.unwrap().unwrap();
    assert_eq!(stored.subtask_group_id, Some(group.id));

    let entry = group.entries[1].id;
    store
        .update_subtask(entry, SubtaskUpdate::status(SubtaskStatus::Running))
        .await
        .unwrap();
    store
        .update_subtask(
            entry,
            SubtaskUpdate {
                status: SubtaskStatus::Running,
                attempts: 3,
                output: None,
                error: Some("exit code 1".to_string()),
            },
        )
        .await
        .unwrap();
    let skipped = store
        .update_subtask(
            entry,
            SubtaskUpdate {
                status: SubtaskStatus::Skipped,
                attempts: 3,
                output: None,
                error: Some("exit code 2".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(skipped.passes, 2);
    assert_eq!(skipped.attempts, 6);
    assert_eq!(skipped.error.as_deref(), Some("exit code 2"));

    let rerun = store
        .update_subtask(entry, SubtaskUpdate::status(SubtaskStatus::Running))
        .await;
    assert!(rerun.is_err());
}

#[tokio::test]
async fn test_empty_subtask_group_is_rejected() {
    let (_temp_dir, store) = create_test_store().await;
    store.ensure_session("s1", None).await.unwrap();
    let objective = store
        .create_objectives("s1", vec!["Build".to_string()])
        .await
        .unwrap()
        .remove(0);

    let result = store.create_subtask_group(objective.id, Vec::new()).await;
    assert!(matches!(result, Err(EngineError::InvalidInput { .. })));
    assert!(store.get_subtask_group(objective.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_messages_update_session_counts() {
    let (_temp_dir, store) = create_test_store().await;
    store.ensure_session("s1", None).await.unwrap();

    store
        .add_message(
            "s1",
            MessageRole::User,
            MessageKind::Text,
            json!({"request": "add a form"}),
        )
        .await
        .unwrap();
    store
        .add_message(
            "s1",
            MessageRole::Assistant,
            MessageKind::Summary,
            json!({"summary": "done"}),
        )
        .await
        .unwrap();

    let session = store.get_session("s1").await.unwrap().unwrap();
    assert_eq!(session.message_count, 2);

    let kinds: Vec<MessageKind> = store
        .get_messages("s1")
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.kind)
        .collect();
    assert_eq!(kinds, vec![MessageKind::Text, MessageKind::Summary]);
}

#[tokio::test]
async fn test_plan_message_tracks_objective_status() {
    let (_temp_dir, store) = create_test_store().await;
    store.ensure_session("s1", None).await.unwrap();
    let objective = store
        .create_objectives("s1", vec!["Scaffold".to_string()])
        .await
        .unwrap()
        .remove(0);
    let plan = store
        .add_message(
            "s1",
            MessageRole::Assistant,
            MessageKind::Plan,
            json!({"objectives": [{"id": objective.id, "status": "pending"}]}),
        )
        .await
        .unwrap();

    let updated = store
        .update_plan_message_status(plan.id, objective.id, ObjectiveStatus::Running)
        .await
        .unwrap();
    assert_eq!(updated.payload["objectives"][0]["status"], "running");
}

#[tokio::test]
async fn test_sessions_list_with_counts() {
    let (_temp_dir, store) = create_test_store().await;
    store.ensure_session("s1", None).await.unwrap();
    store.ensure_session("s2", None).await.unwrap();
    let objectives = store
        .create_objectives("s2", vec!["One".to_string(), "Two".to_string()])
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
    store.touch_session("s2").await.unwrap();

    let sessions = store.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 2);
    let s2 = sessions.iter().find(|s| s.id == "s2").unwrap();
    assert_eq!(s2.total_objectives, 2);
    assert_eq!(s2.done_objectives, 1);
    assert_eq!(s2.failed_objectives, 0);
}

#[tokio::test]
async fn test_snapshot_of_unknown_session() {
    let (_temp_dir, store) = create_test_store().await;

    let result = store.snapshot("missing").await;
    assert!(matches!(result, Err(EngineError::SessionNotFound { .. })));
}

#[tokio::test]
async fn test_session_rebinds_project_root() {
    let (_temp_dir, store) = create_test_store().await;
    store.ensure_session("s1", None).await.unwrap();

    let bound = store
        .ensure_session("s1", Some("/srv/site".to_string()))
        .await
        .unwrap();
    assert_eq!(bound.project_root.as_deref(), Some("/srv/site"));

    let unchanged = store.ensure_session("s1", None).await.unwrap();
    assert_eq!(unchanged.project_root.as_deref(), Some("/srv/site"));
}
