//! Engine tuning knobs.

use std::time::Duration;

/// Limits and timings shared by the pipeline, the agent loop and the tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Dispatch attempts per retry-controller pass
    pub max_attempts: u32,

    /// Backoff after failed attempt `k` (1-based) is `backoff_base * 2^k`
    pub backoff_base: Duration,

    /// Iteration cap of the single-loop agent
    pub max_iterations: u32,

    /// Consecutive unparseable agent replies tolerated before an iteration
    /// is consumed anyway
    pub max_parse_retries: u32,

    /// Default timeout for `run_command` and `install_dependency`
    pub command_timeout: Duration,

    /// Planner output is truncated to this many objectives
    pub max_objectives: usize,

    /// Decomposer output is truncated to this many subtasks
    pub max_subtasks: usize,

    /// Files visited by the project modeler before it stops scanning
    pub scan_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            max_iterations: 10,
            max_parse_retries: 3,
            command_timeout: Duration::from_secs(120),
            max_objectives: 8,
            max_subtasks: 6,
            scan_limit: 2000,
        }
    }
}

impl EngineConfig {
    /// Config with no backoff delay, used where waiting adds nothing.
    pub fn without_backoff(mut self) -> Self {
        self.backoff_base = Duration::ZERO;
        self
    }
}
