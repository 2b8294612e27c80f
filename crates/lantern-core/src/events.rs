//! Progress events and the broadcaster that fans them out to observers.
//!
//! Events are stamped with a broadcaster-wide sequence number under the same
//! lock that delivers them, so every observer sees one total order that
//! matches the order the state changes were made. Observer queues are
//! unbounded; nothing is dropped or coalesced.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::models::{ObjectiveStatus, SubtaskStatus};

/// One objective as announced in a `plan-created` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedObjective {
    pub id: u64,
    pub order: u32,
    pub text: String,
}

/// A state change or run milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RunEvent {
    /// The planner persisted the objectives of a run
    PlanCreated {
        session_id: String,
        objectives: Vec<PlannedObjective>,
        fallback: bool,
    },

    /// An objective changed status
    ObjectiveStatus {
        session_id: String,
        objective_id: u64,
        order: u32,
        status: ObjectiveStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// A subtask entry changed status
    SubtaskStatus {
        session_id: String,
        objective_id: u64,
        subtask_id: u64,
        position: u32,
        tool: String,
        status: SubtaskStatus,
        pass: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A tool dispatch failed and will be attempted again
    ToolRetry {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtask_id: Option<u64>,
        tool: String,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },

    /// The single-loop agent executed one tool call
    AgentStep {
        session_id: String,
        iteration: u32,
        tool: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// The run finished; `success` is false if any objective failed
    RunComplete {
        session_id: String,
        success: bool,
        summary: String,
    },

    /// The run was aborted by an error outside the tool boundary
    RunError { session_id: String, error: String },
}

impl RunEvent {
    pub fn session_id(&self) -> &str {
        match self {
            RunEvent::PlanCreated { session_id, .. }
            | RunEvent::ObjectiveStatus { session_id, .. }
            | RunEvent::SubtaskStatus { session_id, .. }
            | RunEvent::ToolRetry { session_id, .. }
            | RunEvent::AgentStep { session_id, .. }
            | RunEvent::RunComplete { session_id, .. }
            | RunEvent::RunError { session_id, .. } => session_id,
        }
    }

    /// Whether this event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::RunComplete { .. } | RunEvent::RunError { .. })
    }
}

/// A sequenced, timestamped event as delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub seq: u64,
    pub at: Timestamp,
    #[serde(flatten)]
    pub event: RunEvent,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: AtomicU64,
    observers: Mutex<Vec<UnboundedSender<ProgressEvent>>>,
}

/// Fans events out to every subscribed observer.
#[derive(Debug, Clone, Default)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new observer. Only events published after this call are
    /// delivered to it.
    pub fn subscribe(&self) -> UnboundedReceiver<ProgressEvent> {
        let (sender, receiver) = unbounded_channel();
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    /// Stamps and delivers an event, dropping observers that went away.
    pub fn publish(&self, event: RunEvent) -> u64 {
        let mut observers = self
            .inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let progress = ProgressEvent {
            seq,
            at: Timestamp::now(),
            event,
        };
        log::trace!("event #{seq}: {:?}", progress.event);

        observers.retain(|observer| observer.send(progress.clone()).is_ok());
        seq
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
