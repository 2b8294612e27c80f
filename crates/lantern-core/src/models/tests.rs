use jiff::Timestamp;
use serde_json::{json, Map};

use super::*;

fn entry(status: SubtaskStatus) -> SubtaskEntry {
    SubtaskEntry {
        id: 1,
        group_id: 1,
        position: 0,
        name: "Read manifest".to_string(),
        tool: "read_file".to_string(),
        parameters: Map::new(),
        status,
        passes: 0,
        attempts: 0,
        output: None,
        error: None,
        updated_at: Timestamp::from_second(1640995200).unwrap(),
    }
}

#[test]
fn test_objective_transitions_only_move_forward() {
    use ObjectiveStatus::*;

    assert!(Pending.can_transition_to(Running));
    assert!(Running.can_transition_to(Done));
    assert!(Running.can_transition_to(Failed));

    assert!(!Pending.can_transition_to(Done));
    assert!(!Done.can_transition_to(Running));
    assert!(!Failed.can_transition_to(Pending));
    assert!(!Running.can_transition_to(Running));
}

#[test]
fn test_subtask_transitions_allow_second_pass() {
    use SubtaskStatus::*;

    assert!(Pending.can_transition_to(Running));
    assert!(Running.can_transition_to(Running));
    assert!(Running.can_transition_to(Skipped));
    assert!(!Pending.can_transition_to(Skipped));
    assert!(!Skipped.can_transition_to(Running));
    assert!(!Done.can_transition_to(Running));
}

#[test]
fn test_terminal_states() {
    assert!(ObjectiveStatus::Done.is_terminal());
    assert!(ObjectiveStatus::Failed.is_terminal());
    assert!(!ObjectiveStatus::Running.is_terminal());
    assert!(SubtaskStatus::Skipped.is_terminal());
    assert!(!SubtaskStatus::Pending.is_terminal());
}

#[test]
fn test_status_round_trips_through_strings() {
    for status in [
        ObjectiveStatus::Pending,
        ObjectiveStatus::Running,
        ObjectiveStatus::Done,
        ObjectiveStatus::Failed,
    ] {
        assert_eq!(status.as_str().parse::<ObjectiveStatus>(), Ok(status));
    }
    assert!("archived".parse::<ObjectiveStatus>().is_err());
    assert_eq!("SKIPPED".parse::<SubtaskStatus>(), Ok(SubtaskStatus::Skipped));
}

#[test]
fn test_group_all_done() {
    let mut group = SubtaskGroup {
        id: 1,
        objective_id: 1,
        entries: vec![entry(SubtaskStatus::Done), entry(SubtaskStatus::Done)],
        created_at: Timestamp::from_second(1640995200).unwrap(),
    };
    assert!(group.all_done());

    group.entries.push(entry(SubtaskStatus::Skipped));
    assert!(!group.all_done());
}

#[test]
fn test_project_summary_defaults_unknown_fields() {
    let summary: ProjectSummary = serde_json::from_value(json!({
        "languages": ["Rust"]
    }))
    .unwrap();

    assert_eq!(summary.framework, "unknown");
    assert_eq!(summary.kind, "unknown");
    assert_eq!(summary.source, SummarySource::Model);
    assert!(summary.to_prompt_context().contains("Languages: Rust"));
}

#[test]
fn test_session_summary_open_objectives() {
    let summary = SessionSummary {
        id: "s".to_string(),
        project_root: None,
        message_count: 3,
        last_activity_at: Timestamp::from_second(1640995200).unwrap(),
        total_objectives: 4,
        done_objectives: 1,
        failed_objectives: 1,
    };
    assert_eq!(summary.open_objectives(), 2);
}
