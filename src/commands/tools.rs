//! `tools` and `call`: generic access to whatever the server exposes.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use crate::mcp_client::McpClient;

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Tool name, e.g. `validate_grammar`
    pub tool: String,

    /// Tool arguments as a JSON object
    #[arg(long, conflicts_with = "args_file")]
    pub args: Option<String>,

    /// Read tool arguments from a JSON file
    #[arg(long, value_name = "PATH")]
    pub args_file: Option<PathBuf>,

    /// Pretty-print the decoded result
    #[arg(long)]
    pub pretty: bool,
}

pub async fn list(client: &mut McpClient) -> anyhow::Result<bool> {
    let tools = client.list_tools().await?;
    println!("{} tools available on {}:", tools.len(), client.server_name());
    for tool in &tools {
        match tool.description.as_deref() {
            Some(desc) if !desc.is_empty() => {
                let first_line = desc.lines().next().unwrap_or_default();
                println!("  - {:<32} {first_line}", tool.name);
            }
            _ => println!("  - {}", tool.name),
        }
    }
    Ok(true)
}

pub async fn call(client: &mut McpClient, args: CallArgs) -> anyhow::Result<bool> {
    let arguments = parse_arguments(&args).await?;
    let result = client.call_tool(&args.tool, arguments).await?;

    tracing::debug!(
        tool = %result.tool_name,
        duration_ms = result.execution_time_ms,
        "tool returned"
    );

    let rendered = if args.pretty {
        serde_json::to_string_pretty(result.payload())?
    } else {
        serde_json::to_string(result.payload())?
    };
    println!("{rendered}");
    Ok(result.success())
}

async fn parse_arguments(args: &CallArgs) -> anyhow::Result<serde_json::Value> {
    let raw = match (&args.args, &args.args_file) {
        (Some(inline), _) => inline.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => return Ok(serde_json::json!({})),
    };
    arguments_from_str(&raw)
}

/// Parse tool arguments, which must be a JSON object.
fn arguments_from_str(raw: &str) -> anyhow::Result<serde_json::Value> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("tool arguments are not valid JSON")?;
    if !value.is_object() {
        anyhow::bail!("tool arguments must be a JSON object, got: {value}");
    }
    Ok(value)
}
