//! Composition-root binary (C9): wires every subsystem crate into one
//! `AppState` and serves the MCP tool surface over either a stdio
//! JSON-RPC transport or an HTTP transport. Tracing init and config load
//! follow the teacher's own `skynet-gateway/src/main.rs`; the CLI surface
//! is this crate's own addition (spec §6 + Ambient) via `clap`.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};

mod app;
mod error;
mod http;
mod mcp_stdio;
mod search;
mod tools;

use app::AppState;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Stdio,
    Http,
}

/// mojo-gateway -- MCP server fronting memory, dreaming, scheduler, and
/// OpenCode project management.
#[derive(Parser)]
#[command(name = "mojo-gateway", version, about)]
struct Cli {
    /// Transport to serve the MCP tool surface over.
    #[arg(long, value_enum, default_value = "stdio")]
    mode: Mode,

    /// Bind host, `--mode http` only. Overrides config's `server.server_host`.
    #[arg(long)]
    host: Option<String>,

    /// Bind port, `--mode http` only. Overrides config's `server.server_port`.
    #[arg(long)]
    port: Option<u16>,

    /// Reload `llm_config.json` task routes on top of the loaded config
    /// even if it was already merged once. No-op if the file is absent.
    #[arg(long)]
    reload: bool,

    /// Path to a TOML config file. Defaults per `AppConfig::load`'s own
    /// search order (explicit path > `MOJO_CONFIG` env > `~/.memory/mojo.toml`).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mojo_gateway=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match mojo_core::config::AppConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "fatal: could not load config");
            return ExitCode::from(1);
        }
    };
    let config = if cli.reload {
        match config.clone().load_llm_routes("llm_config.json") {
            Ok(c) => c,
            Err(e) => {
                error!(err = %e, "failed to reload llm_config.json, keeping previous routes");
                config
            }
        }
    } else {
        config
    };

    let mut config = config;
    if let Some(host) = cli.host {
        config.server.server_host = host;
    }
    if let Some(port) = cli.port {
        config.server.server_port = port;
    }

    let state = match AppState::build(config).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(err = %e, "failed to build application state");
            return ExitCode::from(1);
        }
    };
    state.start_scheduler_daemon();

    let run_result = match cli.mode {
        Mode::Stdio => mcp_stdio::run(state.clone()).await,
        Mode::Http => run_http(state.clone()).await,
    };

    if let Err(e) = state.shutdown().await {
        error!(err = %e, "error during shutdown");
    }

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(err = %e, "fatal runtime error");
            ExitCode::from(2)
        }
    }
}

async fn run_http(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.server.server_host, state.config.server.server_port).parse()?;
    let router = http::build_router(state);
    info!(%addr, "mojo-gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
