//! CLI subcommands that drive the grammar server.
//!
//! Each command receives an already-initialized [`McpClient`] and returns
//! `Ok(true)` when every step reported success, `Ok(false)` when the server
//! answered but a tool reported failure.

pub mod all_tools;
pub mod analysis;
pub mod dsl;
pub mod output;
pub mod profile;
pub mod samples;
pub mod tools;

use clap::Subcommand;

use crate::mcp_client::McpClient;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the tools exposed by the server
    Tools,
    /// Invoke a single tool and print its decoded result
    Call(tools::CallArgs),
    /// Validate, parse, and generate a parser for a DSL grammar
    Dsl(dsl::DslArgs),
    /// Left recursion, FIRST/FOLLOW, call graph, and ATN analysis
    Analyze(analysis::AnalyzeArgs),
    /// Profile parsing performance of a sample program
    Profile,
    /// Exercise all nine grammar tools and summarize
    AllTools(all_tools::AllToolsArgs),
}

/// Run one command against an initialized session.
pub async fn run(command: Command, client: &mut McpClient) -> anyhow::Result<bool> {
    match command {
        Command::Tools => tools::list(client).await,
        Command::Call(args) => tools::call(client, args).await,
        Command::Dsl(args) => dsl::run(client, args).await,
        Command::Analyze(args) => analysis::run(client, args).await,
        Command::Profile => profile::run(client).await,
        Command::AllTools(args) => all_tools::run(client, args).await,
    }
}
