//! `all-tools`: exercise every grammar tool once and report pass/fail.

use clap::Args;
use serde_json::{json, Value};

use super::output::{display_field, join_limited, print_preview, section, truncate_chars};
use super::samples::{AMBIGUOUS_GRAMMAR, EXPRESSION_GRAMMAR, EXPRESSION_INPUT};
use crate::mcp_client::{McpClient, ToolCallResult};

const CODEGEN_TARGETS: [&str; 3] = ["java", "python", "javascript"];

#[derive(Debug, Args)]
pub struct AllToolsArgs {
    /// Print extra detail such as the first tokens of the parse
    #[arg(long)]
    pub verbose: bool,
}

/// Outcome of each tool, in invocation order.
#[derive(Debug, Default)]
struct Summary {
    results: Vec<(&'static str, bool)>,
}

impl Summary {
    fn record(&mut self, tool: &'static str, result: &ToolCallResult) {
        self.results.push((tool, result.success()));
    }

    fn all_passed(&self) -> bool {
        self.results.iter().all(|(_, ok)| *ok)
    }

    fn print(&self) {
        section("Summary");
        for (tool, ok) in &self.results {
            let status = if *ok { "PASS" } else { "FAIL" };
            println!("  [{status}] {tool}");
        }
        println!();
        if self.all_passed() {
            println!("  All {} tools tested successfully", self.results.len());
        } else {
            println!("  Some tools had issues. Re-run with --verbose for details.");
        }
    }
}

pub async fn run(client: &mut McpClient, args: AllToolsArgs) -> anyhow::Result<bool> {
    let tools = client.list_tools().await?;
    println!("Connected to MCP server");
    println!("{} tools available:", tools.len());
    for tool in &tools {
        println!("    - {}", tool.name);
    }

    let mut summary = Summary::default();

    section("Tool 1: validate_grammar");
    let result = client
        .call_tool(
            "validate_grammar",
            json!({ "grammar_text": EXPRESSION_GRAMMAR, "grammar_name": "Expression" }),
        )
        .await?;
    println!("  Grammar name: {}", display_field(result.get("grammarName")));
    println!("  Success: {}", result.success());
    println!("  Rule count: {}", display_field(result.get("ruleCount")));
    let rules = result.array_field("rules");
    if !rules.is_empty() {
        println!("  Rules: {}", join_limited(rules, rules.len()));
    }
    summary.record("validate_grammar", &result);

    section("Tool 2: parse_sample");
    let result = client
        .call_tool(
            "parse_sample",
            json!({
                "grammar_text": EXPRESSION_GRAMMAR,
                "sample_input": "x = 1 + 2 * 3;",
                "start_rule": "stat",
                "show_tokens": true,
            }),
        )
        .await?;
    println!("  Success: {}", result.success());
    println!(
        "  Parse tree: {}",
        truncate_chars(result.str_field("parseTree").unwrap_or("N/A"), 100)
    );
    let tokens = result.array_field("tokens");
    if !tokens.is_empty() {
        println!("  Token count: {}", tokens.len());
        if args.verbose {
            for token in tokens.iter().take(5) {
                println!("    {token}");
            }
        }
    }
    summary.record("parse_sample", &result);

    section("Tool 3: compile_grammar_multi_target");
    let mut compile_ok = true;
    for target in CODEGEN_TARGETS {
        let result = client
            .call_tool(
                "compile_grammar_multi_target",
                json!({
                    "grammar_text": EXPRESSION_GRAMMAR,
                    "target_language": target,
                    "generate_listener": true,
                    "generate_visitor": true,
                    "include_generated_code": false,
                }),
            )
            .await?;
        compile_ok &= result.success();
        println!(
            "  {:<12} -> {} files generated",
            target,
            result.u64_field("fileCount").unwrap_or(0)
        );
    }
    summary.results.push(("compile_grammar_multi_target", compile_ok));

    section("Tool 4: detect_ambiguity");
    let result = client
        .call_tool("detect_ambiguity", json!({ "grammar_text": EXPRESSION_GRAMMAR }))
        .await?;
    println!(
        "  Has ambiguities: {}",
        result.bool_field("hasAmbiguities").unwrap_or(false)
    );
    let ambiguities = result.array_field("ambiguities");
    if ambiguities.is_empty() {
        println!("  No structural ambiguities detected");
    } else {
        println!("  Ambiguity count: {}", ambiguities.len());
        for amb in ambiguities.iter().take(3) {
            let desc = match amb.get("description") {
                Some(Value::String(s)) => s.clone(),
                _ => amb.to_string(),
            };
            println!("    - {}", truncate_chars(&desc, 60));
        }
    }
    summary.record("detect_ambiguity", &result);

    let ambiguous = client
        .call_tool(
            "detect_ambiguity",
            json!({ "grammar_text": AMBIGUOUS_GRAMMAR, "sample_inputs": ["foo();"] }),
        )
        .await?;
    println!("\n  Testing ambiguous grammar:");
    println!(
        "  Has ambiguities: {}",
        ambiguous.bool_field("hasAmbiguities").unwrap_or(false)
    );

    section("Tool 5: analyze_left_recursion");
    let result = client
        .call_tool(
            "analyze_left_recursion",
            json!({ "grammar_text": EXPRESSION_GRAMMAR }),
        )
        .await?;
    for (label, key) in [
        ("Has left recursion", "hasLeftRecursion"),
        ("Has direct left recursion", "hasDirectLeftRecursion"),
        ("Has indirect left recursion", "hasIndirectLeftRecursion"),
    ] {
        println!("  {label}: {}", result.bool_field(key).unwrap_or(false));
    }
    if let Some(analysis) = result.get("analysis").and_then(Value::as_object) {
        println!("\n  Rule analysis:");
        for (rule, info) in analysis.iter().take(3) {
            let lr_type = info
                .get("leftRecursionType")
                .and_then(Value::as_str)
                .unwrap_or("none");
            println!("    {rule}: {lr_type}");
        }
    }
    summary.record("analyze_left_recursion", &result);

    section("Tool 6: analyze_first_follow");
    let result = client
        .call_tool(
            "analyze_first_follow",
            json!({ "grammar_text": EXPRESSION_GRAMMAR, "rule_name": "expr" }),
        )
        .await?;
    println!("  Success: {}", result.success());
    println!("  Total parser rules: {}", display_field(result.get("totalParserRules")));
    println!("  Nullable rule count: {}", result.u64_field("nullableRuleCount").unwrap_or(0));
    println!("  Rules with conflicts: {}", result.u64_field("rulesWithConflicts").unwrap_or(0));
    for rule in result.array_field("rules").iter().take(3) {
        let set = |key: &str| {
            rule.get(key)
                .and_then(Value::as_array)
                .map(|items| join_limited(items, 5))
                .unwrap_or_default()
        };
        println!(
            "    {}:",
            rule.get("ruleName").and_then(Value::as_str).unwrap_or("unknown")
        );
        println!("      FIRST: {}", set("firstSet"));
        println!("      FOLLOW: {}", set("followSet"));
        println!(
            "      Nullable: {}",
            rule.get("nullable").and_then(Value::as_bool).unwrap_or(false)
        );
    }
    summary.record("analyze_first_follow", &result);

    section("Tool 7: analyze_call_graph");
    let result = client
        .call_tool(
            "analyze_call_graph",
            json!({ "grammar_text": EXPRESSION_GRAMMAR, "output_format": "mermaid" }),
        )
        .await?;
    println!("  Success: {}", result.success());
    println!("  Node count: {}", display_field(result.get("nodeCount")));
    println!("  Edge count: {}", display_field(result.get("edgeCount")));
    if let Some(diagram) = result.str_field("mermaid") {
        println!("\n  Mermaid diagram preview:");
        print_preview(diagram, 8, "    ");
    }
    summary.record("analyze_call_graph", &result);

    let dot = client
        .call_tool(
            "analyze_call_graph",
            json!({ "grammar_text": EXPRESSION_GRAMMAR, "output_format": "dot" }),
        )
        .await?;
    if let Some(graph) = dot.str_field("dot") {
        println!("\n  DOT format also available ({} chars)", graph.chars().count());
    }

    section("Tool 8: profile_grammar");
    let result = client
        .call_tool(
            "profile_grammar",
            json!({
                "grammar_text": EXPRESSION_GRAMMAR,
                "sample_input": EXPRESSION_INPUT,
                "start_rule": "prog",
            }),
        )
        .await?;
    println!("  Success: {}", result.success());
    println!("  Grammar name: {}", display_field(result.get("grammarName")));
    let total_ms = result.u64_field("totalTimeNanos").unwrap_or(0) as f64 / 1_000_000.0;
    println!("  Total time: {total_ms:.2} ms");
    println!("  Total SLL lookahead: {}", result.u64_field("totalSLLLookahead").unwrap_or(0));
    println!("  Total LL lookahead: {}", result.u64_field("totalLLLookahead").unwrap_or(0));
    println!("  Total DFA states: {}", result.u64_field("totalDFAStates").unwrap_or(0));
    print_top_decisions(result.array_field("decisions"));
    print_bullets("Insights", result.array_field("insights"));
    print_bullets("Optimization hints", result.array_field("optimizationHints"));
    summary.record("profile_grammar", &result);

    section("Tool 9: visualize_atn");
    let result = client
        .call_tool(
            "visualize_atn",
            json!({ "grammar_text": EXPRESSION_GRAMMAR, "rule_name": "expr", "format": "all" }),
        )
        .await?;
    println!("  Rule: {}", result.str_field("ruleName").unwrap_or("expr"));
    println!("  State count: {}", display_field(result.get("stateCount")));
    println!("  Transition count: {}", display_field(result.get("transitionCount")));
    if let Some(diagram) = result.str_field("mermaid") {
        println!("\n  Mermaid ATN preview:");
        print_preview(diagram, 6, "    ");
    }
    for format in ["dot", "svg"] {
        if let Some(rendered) = result.str_field(format) {
            println!("  {} format: {} chars", format.to_uppercase(), rendered.chars().count());
        }
    }
    summary.record("visualize_atn", &result);

    summary.print();
    Ok(summary.all_passed())
}

fn print_top_decisions(decisions: &[Value]) {
    if decisions.is_empty() {
        return;
    }
    let invocations = |d: &Value| d.get("invocations").and_then(Value::as_u64).unwrap_or(0);
    let mut sorted: Vec<&Value> = decisions.iter().collect();
    sorted.sort_by_key(|d| std::cmp::Reverse(invocations(d)));

    println!("\n  Top decisions by invocations:");
    for dec in sorted.into_iter().take(5) {
        let time_ms = dec.get("timeNanos").and_then(Value::as_u64).unwrap_or(0) as f64 / 1_000_000.0;
        println!(
            "    {} (d{}): {} calls, {time_ms:.2}ms, LL fallback: {}",
            dec.get("ruleName").and_then(Value::as_str).unwrap_or("unknown"),
            display_field(dec.get("decisionNumber")),
            invocations(dec),
            dec.get("llFallback").and_then(Value::as_u64).unwrap_or(0),
        );
    }
}

fn print_bullets(title: &str, items: &[Value]) {
    if items.is_empty() {
        return;
    }
    println!("\n  {title}:");
    for item in items.iter().take(3) {
        println!("    - {}", display_field(Some(item)));
    }
}
