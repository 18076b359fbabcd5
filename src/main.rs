//! dsl-starter CLI
//!
//! Drives an ANTLR grammar MCP server over stdio.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use dsl_starter::commands::{self, Command};
use dsl_starter::config::{self, ServerMode};
use dsl_starter::mcp_client::McpClient;

#[derive(Debug, Parser)]
#[command(name = "dsl-starter")]
#[command(about = "Build DSL parsers with an ANTLR grammar MCP server")]
#[command(version)]
struct Cli {
    /// Config file (defaults to dsl-starter.yaml lookup)
    #[arg(long, global = true, env = config::CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// How to launch the server
    #[arg(long, global = true, value_enum)]
    server: Option<ServerMode>,

    /// Docker image for `--server docker`
    #[arg(long, global = true)]
    image: Option<String>,

    /// Jar path for `--server jar`
    #[arg(long, global = true)]
    jar_path: Option<String>,

    /// Repository root used to locate the default jar
    #[arg(long, global = true)]
    repo_root: Option<String>,

    /// Per-request deadline in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut app = match config::load_or_default(cli.config.as_deref()) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(mode) = cli.server {
        app.server.mode = mode;
    }
    if cli.image.is_some() {
        app.server.image = cli.image;
    }
    if cli.jar_path.is_some() {
        app.server.jar_path = cli.jar_path;
    }
    if cli.repo_root.is_some() {
        app.server.repo_root = cli.repo_root;
    }
    if cli.timeout_secs.is_some() {
        app.client.call_timeout_secs = cli.timeout_secs;
    }

    let log_file = cli.log_file.or_else(|| {
        app.logging
            .file
            .as_deref()
            .map(|f| PathBuf::from(config::expand_tilde(f)))
    });
    if let Err(e) = dsl_starter::init_tracing(cli.verbose, log_file.as_deref(), app.logging.json) {
        eprintln!("error: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let server = match app.server.resolve() {
        Ok(server) => server,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let options = app.client.to_options();
    let command = cli.command;

    println!("Starting MCP server: {}", server.display_command());
    tracing::info!(
        command = %server.display_command(),
        timeout_ms = options.call_timeout.map(|d| d.as_millis() as u64),
        "launching session"
    );

    let session = McpClient::with_session::<bool, anyhow::Error, _>(&server, options, |client| {
        Box::pin(async move {
            client.initialize().await?;
            commands::run(command, client).await
        })
    });

    tokio::select! {
        outcome = session => match outcome {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(e) => {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, stopping server");
            ExitCode::from(130)
        }
    }
}
