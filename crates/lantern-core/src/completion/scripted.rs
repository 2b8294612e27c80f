//! Scripted completion service for tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;

use super::{CompletionRequest, CompletionService, CompletionTask};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

#[derive(Debug, Default)]
struct Script {
    queued: HashMap<CompletionTask, VecDeque<Reply>>,
    fallback: HashMap<CompletionTask, Reply>,
    requests: Vec<CompletionRequest>,
}

/// Replays queued responses per task, in order.
///
/// When a task's queue is empty the task's fallback reply is used, if one
/// was set with [`ScriptedCompletion::always`]; otherwise the call fails
/// like an unreachable service would.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    script: Mutex<Script>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a reply for `task`.
    pub fn reply(self, task: CompletionTask, text: impl Into<String>) -> Self {
        self.script()
            .queued
            .entry(task)
            .or_default()
            .push_back(Reply::Text(text.into()));
        self
    }

    /// Queues a service failure for `task`.
    pub fn fail(self, task: CompletionTask, message: impl Into<String>) -> Self {
        self.script()
            .queued
            .entry(task)
            .or_default()
            .push_back(Reply::Fail(message.into()));
        self
    }

    /// Reply used for `task` once its queue is drained.
    pub fn always(self, task: CompletionTask, text: impl Into<String>) -> Self {
        self.script()
            .fallback
            .insert(task, Reply::Text(text.into()));
        self
    }

    /// Number of requests received for `task`.
    pub fn calls(&self, task: CompletionTask) -> usize {
        self.script()
            .requests
            .iter()
            .filter(|r| r.task == task)
            .count()
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.script().requests.clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut guard = self.script();
        let script = &mut *guard;
        script.requests.push(request.clone());

        let reply = script
            .queued
            .get_mut(&request.task)
            .and_then(VecDeque::pop_front)
            .or_else(|| script.fallback.get(&request.task).cloned());

        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(message)) => Err(EngineError::completion(message)),
            None => Err(EngineError::completion(format!(
                "no scripted reply for {}",
                request.task
            ))),
        }
    }
}
