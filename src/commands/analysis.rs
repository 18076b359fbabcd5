//! `analyze`: grammar structure analysis and visualization.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde_json::{json, Value};

use super::output::{display_field, join_limited, print_preview, section};
use super::samples::{EXPR_GRAMMAR, INDIRECT_LR_GRAMMAR};
use crate::mcp_client::McpClient;

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Save call graph and ATN diagrams (.mmd / .dot) into this directory
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

pub async fn run(client: &mut McpClient, args: AnalyzeArgs) -> anyhow::Result<bool> {
    let out = args.output_dir.as_deref();
    if let Some(dir) = out {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let mut ok = left_recursion(client).await?;
    ok &= first_follow(client).await?;
    ok &= call_graph(client, out).await?;
    ok &= atn(client, out).await?;

    if let Some(dir) = out {
        println!("\nVisualization files saved to: {}", dir.display());
    }
    Ok(ok)
}

async fn left_recursion(client: &mut McpClient) -> anyhow::Result<bool> {
    section("1. LEFT RECURSION ANALYSIS");

    println!("--- Expression grammar (direct left recursion) ---");
    let direct = client
        .call_tool("analyze_left_recursion", json!({ "grammar_text": EXPR_GRAMMAR }))
        .await?;
    for key in [
        "hasLeftRecursion",
        "hasDirectLeftRecursion",
        "hasIndirectLeftRecursion",
    ] {
        println!("{key}: {}", direct.bool_field(key).unwrap_or(false));
    }
    if let Some(rules) = direct.get("leftRecursiveRules").filter(|v| !v.is_null()) {
        println!("Left recursive rules: {rules}");
    }
    if let Some(analysis) = direct.get("analysis").and_then(Value::as_object) {
        println!("\nRule-by-rule analysis:");
        for (rule, info) in analysis {
            let lr_type = info
                .get("leftRecursionType")
                .and_then(Value::as_str)
                .unwrap_or("none");
            if lr_type == "none" {
                continue;
            }
            println!("  {rule}: {lr_type}");
            if let Some(alts) = info.get("leftRecursiveAlternatives").filter(|v| !v.is_null()) {
                println!("    Alternatives: {alts}");
            }
        }
    }

    println!("\n--- Indirect left recursion grammar ---");
    let indirect = client
        .call_tool(
            "analyze_left_recursion",
            json!({ "grammar_text": INDIRECT_LR_GRAMMAR }),
        )
        .await?;
    println!(
        "hasIndirectLeftRecursion: {}",
        indirect.bool_field("hasIndirectLeftRecursion").unwrap_or(false)
    );
    if let Some(cycles) = indirect.get("cycles").filter(|v| !v.is_null()) {
        println!("Cycles found: {cycles}");
    }

    Ok(direct.success() && indirect.success())
}

async fn first_follow(client: &mut McpClient) -> anyhow::Result<bool> {
    section("2. FIRST/FOLLOW SET ANALYSIS");

    let result = client
        .call_tool("analyze_first_follow", json!({ "grammar_text": EXPR_GRAMMAR }))
        .await?;

    println!("Total parser rules:        {}", display_field(result.get("totalParserRules")));
    println!("Nullable rules:            {}", result.u64_field("nullableRuleCount").unwrap_or(0));
    println!("Rules with LL(1) conflicts: {}", result.u64_field("rulesWithConflicts").unwrap_or(0));
    println!("Total decisions:           {}", display_field(result.get("totalDecisions")));
    println!("Ambiguous decisions:       {}", result.u64_field("ambiguousDecisions").unwrap_or(0));

    let rules = result.array_field("rules");
    if !rules.is_empty() {
        println!("\n--- Rule analysis ---");
    }
    for rule in rules {
        let name = rule.get("ruleName").and_then(Value::as_str).unwrap_or("unknown");
        let set = |key: &str| {
            rule.get(key)
                .and_then(Value::as_array)
                .map(|items| join_limited(items, 8))
                .unwrap_or_default()
        };
        println!("\n  {name}:");
        println!("    Alternatives: {}", rule.get("alternativeCount").and_then(Value::as_u64).unwrap_or(0));
        println!("    Nullable: {}", rule.get("nullable").and_then(Value::as_bool).unwrap_or(false));
        println!("    LL(1) conflict: {}", rule.get("hasLL1Conflict").and_then(Value::as_bool).unwrap_or(false));
        println!("    FIRST: {}", set("firstSet"));
        println!("    FOLLOW: {}", set("followSet"));
    }

    let decisions = result.array_field("decisions");
    if !decisions.is_empty() {
        println!("\n--- Decision point analysis ---");
    }
    for dec in decisions.iter().take(3) {
        println!(
            "  Decision {} in {}: {} alternatives, ambiguous={}",
            display_field(dec.get("decisionNumber")),
            dec.get("ruleName").and_then(Value::as_str).unwrap_or("unknown"),
            dec.get("alternativeCount").and_then(Value::as_u64).unwrap_or(0),
            dec.get("hasAmbiguousLookahead").and_then(Value::as_bool).unwrap_or(false),
        );
    }

    Ok(result.success())
}

async fn call_graph(client: &mut McpClient, out: Option<&Path>) -> anyhow::Result<bool> {
    section("3. RULE CALL GRAPH");

    let mermaid = client
        .call_tool(
            "analyze_call_graph",
            json!({ "grammar_text": EXPR_GRAMMAR, "output_format": "mermaid" }),
        )
        .await?;
    println!("Success: {}", mermaid.success());
    if let Some(diagram) = mermaid.str_field("mermaid") {
        println!("\n--- Mermaid diagram ---");
        println!("{diagram}");
        save(out, "call_graph.mmd", diagram)?;
    }

    let dot = client
        .call_tool(
            "analyze_call_graph",
            json!({ "grammar_text": EXPR_GRAMMAR, "output_format": "dot" }),
        )
        .await?;
    if let Some(graph) = dot.str_field("dot") {
        println!("\n--- DOT format (Graphviz) ---");
        print_preview(graph, 10, "");
        if save(out, "call_graph.dot", graph)? {
            println!("Render with: dot -Tpng call_graph.dot -o call_graph.png");
        }
    }

    Ok(mermaid.success() && dot.success())
}

async fn atn(client: &mut McpClient, out: Option<&Path>) -> anyhow::Result<bool> {
    section("4. ATN (Augmented Transition Network) VISUALIZATION");

    let expr = client
        .call_tool(
            "visualize_atn",
            json!({ "grammar_text": EXPR_GRAMMAR, "rule_name": "expr", "format": "all" }),
        )
        .await?;
    println!("Rule: {}", expr.str_field("ruleName").unwrap_or("expr"));
    println!("State count: {}", display_field(expr.get("stateCount")));
    println!("Transition count: {}", display_field(expr.get("transitionCount")));
    if let Some(diagram) = expr.str_field("mermaid") {
        println!("\n--- ATN state diagram (Mermaid) ---");
        print_preview(diagram, 15, "");
        save(out, "atn_expr.mmd", diagram)?;
    }
    if let Some(graph) = expr.str_field("dot") {
        save(out, "atn_expr.dot", graph)?;
    }

    println!("\n--- ATN for 'stat' rule ---");
    let stat = client
        .call_tool(
            "visualize_atn",
            json!({ "grammar_text": EXPR_GRAMMAR, "rule_name": "stat", "format": "mermaid" }),
        )
        .await?;
    println!("State count: {}", display_field(stat.get("stateCount")));
    println!("Transition count: {}", display_field(stat.get("transitionCount")));

    Ok(expr.success() && stat.success())
}

/// Write `contents` to `dir/name` when an output directory was requested.
fn save(dir: Option<&Path>, name: &str, contents: &str) -> anyhow::Result<bool> {
    let Some(dir) = dir else {
        return Ok(false);
    };
    let path = dir.join(name);
    std::fs::write(&path, contents)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Saved to: {}", path.display());
    Ok(true)
}
