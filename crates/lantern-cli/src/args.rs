//! Command-line arguments.
//!
//! Argument structs carry the clap derives and convert into the core
//! parameter types (`StartRun`, `EngineConfig`), so the core stays free of
//! CLI framework concerns.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Args as ClapArgs, Parser, Subcommand};
use lantern_core::{
    params::{RunMode, StartRun},
    EngineConfig,
};

/// Lantern plans software changes from a natural-language request, breaks
/// each objective into tool calls, and executes them against a project tree
/// with bounded retries. Runs, objectives and subtasks are persisted so that
/// they can be inspected and resumed.
#[derive(Parser)]
#[command(version, about, name = "lantern")]
pub struct Args {
    /// Path to the SQLite database file. Defaults to
    /// $XDG_DATA_HOME/lantern/lantern.db
    #[arg(long, global = true, env = "LANTERN_DATABASE_FILE")]
    pub database_file: Option<PathBuf>,

    /// Disable colored output and use plain text
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Engine settings shared by every command that executes runs.
#[derive(ClapArgs, Debug, Clone)]
pub struct EngineArgs {
    /// Shell command answering completion requests. The JSON request is
    /// written to its stdin; the task name is in LANTERN_COMPLETION_TASK.
    #[arg(long, global = true, env = "LANTERN_COMPLETION_COMMAND")]
    pub completion_command: Option<String>,

    /// Seconds to wait for one completion answer
    #[arg(long, global = true, default_value_t = 300)]
    pub completion_timeout: u64,

    /// Dispatch attempts per retry pass
    #[arg(long, global = true, env = "LANTERN_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    /// Iteration cap of the single-loop agent
    #[arg(long, global = true, env = "LANTERN_MAX_ITERATIONS", default_value_t = 10)]
    pub max_iterations: u32,

    /// Default timeout in seconds for shell commands run by tools
    #[arg(long, global = true, env = "LANTERN_COMMAND_TIMEOUT", default_value_t = 120)]
    pub command_timeout: u64,
}

impl From<&EngineArgs> for EngineConfig {
    fn from(args: &EngineArgs) -> Self {
        EngineConfig {
            max_attempts: args.max_attempts,
            max_iterations: args.max_iterations,
            command_timeout: Duration::from_secs(args.command_timeout),
            ..EngineConfig::default()
        }
    }
}

/// Available commands. Without a command, sessions are listed.
#[derive(Subcommand)]
pub enum Commands {
    /// Plan and execute a request in the foreground
    #[command(alias = "r")]
    Run(RunArgs),
    /// Continue a session's unfinished objectives
    Resume(SessionArgs),
    /// List sessions, most recently active first
    #[command(aliases = ["l", "ls"])]
    Sessions,
    /// Show a session's objectives and subtasks
    #[command(alias = "s")]
    Show(SessionArgs),
    /// Show the tool catalogue with parameter schemas
    Tools,
    /// Serve the WebSocket observer channel and HTTP status endpoints
    Serve(ServeArgs),
    /// Start the read-only MCP server on stdio
    Mcp,
}

/// Run a request
#[derive(ClapArgs)]
pub struct RunArgs {
    /// What should be done, in plain language
    pub request: String,
    /// Project root the tools operate in
    #[arg(short, long, default_value = ".")]
    pub project: String,
    /// Continue an existing session instead of starting a new one
    #[arg(short, long)]
    pub session: Option<String>,
    /// Use the single-loop agent instead of planning upfront
    #[arg(long)]
    pub agent: bool,
}

impl From<RunArgs> for StartRun {
    fn from(val: RunArgs) -> Self {
        StartRun {
            request: val.request,
            project: val.project,
            session: val.session,
            mode: if val.agent {
                RunMode::Agent
            } else {
                RunMode::Plan
            },
        }
    }
}

#[derive(ClapArgs)]
pub struct SessionArgs {
    /// ID of the session
    pub session: String,
}

#[derive(ClapArgs)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:7878", env = "LANTERN_BIND")]
    pub bind: SocketAddr,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_run_args_select_mode() {
        let args = Args::parse_from(["lantern", "run", "add a form", "--agent", "-p", "site"]);
        let Some(Commands::Run(run)) = args.command else {
            panic!("expected run command");
        };
        let params = StartRun::from(run);
        assert_eq!(params.mode, RunMode::Agent);
        assert_eq!(params.project, "site");
    }

    #[test]
    fn test_engine_args_map_to_config() {
        let args = Args::parse_from(["lantern", "--max-attempts", "5", "tools"]);
        let config = EngineConfig::from(&args.engine);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.command_timeout, Duration::from_secs(120));
    }
}
