//! Lantern CLI
//!
//! Runs requests in the foreground, inspects persisted sessions, and hosts
//! the observer and MCP servers.

mod args;
mod cli;
mod mcp;
mod renderer;
mod server;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use args::{Args, Commands, EngineArgs};
use clap::Parser;
use cli::Cli;
use lantern_core::{
    Broadcaster, CommandCompletion, Engine, EngineConfig, RunManager, StateStore, ToolRegistry,
};
use log::info;
use mcp::{run_stdio_server, LanternMcpServer};
use renderer::TerminalRenderer;
use Commands::*;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let Args {
        database_file,
        no_color,
        engine,
        command,
    } = Args::parse();

    let store = StateStore::open(database_file)
        .await
        .context("Failed to initialize state store")?;

    let renderer = TerminalRenderer::new(!no_color);

    info!("Lantern started");

    match command {
        Some(Run(run)) => {
            let runs = run_manager(store.clone(), &engine)?;
            Cli::new(store, renderer).run(&runs, run.into()).await
        }
        Some(Resume(target)) => {
            let runs = run_manager(store.clone(), &engine)?;
            Cli::new(store, renderer)
                .resume(&runs, &target.session)
                .await
        }
        Some(Show(target)) => Cli::new(store, renderer).show(&target.session).await,
        Some(Tools) => Cli::new(store, renderer).tools(&ToolRegistry::builtin()),
        Some(Serve(serve)) => {
            let runs = run_manager(store, &engine)?;
            server::serve(serve.bind, runs).await
        }
        Some(Mcp) => {
            info!("Starting Lantern MCP server");
            run_stdio_server(LanternMcpServer::new(
                store,
                Arc::new(ToolRegistry::builtin()),
            ))
            .await
            .context("MCP server failed")
        }
        Some(Sessions) | None => Cli::new(store, renderer).sessions().await,
    }
}

/// Builds the engine for commands that execute runs. These need a
/// completion service; inspection commands do not.
fn run_manager(store: StateStore, args: &EngineArgs) -> Result<RunManager> {
    let command = args.completion_command.as_deref().context(
        "No completion command configured; pass --completion-command or set LANTERN_COMPLETION_COMMAND",
    )?;

    let engine = Engine::new(
        store,
        Broadcaster::new(),
        Arc::new(CommandCompletion::new(
            command,
            Duration::from_secs(args.completion_timeout),
        )),
        Arc::new(ToolRegistry::builtin()),
        EngineConfig::from(args),
    );
    Ok(RunManager::new(engine))
}
