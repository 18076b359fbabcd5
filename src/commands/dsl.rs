//! `dsl`: the grammar-to-parser pipeline.
//!
//! Validates a grammar, optionally parses sample input with it, checks for
//! ambiguities, then asks the server to generate a parser for the chosen
//! target language and writes the generated sources to disk.

use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde_json::json;

use super::output::{display_field, print_failure, section};
use super::samples;
use crate::mcp_client::types::GeneratedFile;
use crate::mcp_client::McpClient;

#[derive(Debug, Args)]
pub struct DslArgs {
    /// Grammar file (defaults to the bundled Calculator grammar)
    #[arg(long, value_name = "FILE")]
    pub grammar: Option<PathBuf>,

    /// Grammar name passed to validation (defaults to the `grammar X;` header)
    #[arg(long)]
    pub grammar_name: Option<String>,

    /// File containing sample input to parse
    #[arg(long, value_name = "FILE", conflicts_with = "input")]
    pub sample: Option<PathBuf>,

    /// Sample input given inline
    #[arg(long)]
    pub input: Option<String>,

    /// Start rule for parsing the sample
    #[arg(long)]
    pub start_rule: Option<String>,

    /// Target language for code generation
    #[arg(long, default_value = "python")]
    pub target: String,

    /// Output directory for generated files (defaults to `generated/<target>`)
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Stop after the ambiguity check
    #[arg(long)]
    pub skip_codegen: bool,
}

/// Grammar and sample text after resolving files and bundled defaults.
struct DslInput {
    grammar_text: String,
    grammar_name: String,
    sample: Option<String>,
    start_rule: String,
}

async fn resolve_input(args: &DslArgs) -> anyhow::Result<DslInput> {
    let (grammar_text, default_sample) = match &args.grammar {
        Some(path) => (
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read grammar {}", path.display()))?,
            None,
        ),
        None => (
            samples::CALCULATOR_GRAMMAR.to_string(),
            Some(samples::CALCULATOR_INPUT.trim().to_string()),
        ),
    };

    let sample = match (&args.sample, &args.input) {
        (Some(path), _) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read sample {}", path.display()))?,
        ),
        (None, Some(text)) => Some(text.clone()),
        (None, None) => default_sample,
    };

    let grammar_name = args
        .grammar_name
        .clone()
        .or_else(|| samples::grammar_name(&grammar_text).map(String::from))
        .unwrap_or_else(|| "Grammar".to_string());

    let start_rule = args.start_rule.clone().unwrap_or_else(|| {
        first_parser_rule(&grammar_text).unwrap_or_else(|| "prog".to_string())
    });

    Ok(DslInput {
        grammar_text,
        grammar_name,
        sample,
        start_rule,
    })
}

pub async fn run(client: &mut McpClient, args: DslArgs) -> anyhow::Result<bool> {
    let input = resolve_input(&args).await?;

    let tools = client.list_tools().await?;
    println!("[ok] Connected to MCP server, {} tools available", tools.len());

    section(&format!("Step 1: Validate grammar {}", input.grammar_name));
    let validation = client
        .call_tool(
            "validate_grammar",
            json!({
                "grammar_text": input.grammar_text,
                "grammar_name": input.grammar_name,
            }),
        )
        .await?;
    println!(
        "[ok] validate_grammar success={} grammarName={}",
        validation.confirmed_success(),
        validation.str_field("grammarName").unwrap_or(&input.grammar_name)
    );
    if !validation.confirmed_success() {
        print_failure(&validation);
        return Ok(false);
    }

    let call_graph = client
        .call_tool(
            "analyze_call_graph",
            json!({ "grammar_text": input.grammar_text }),
        )
        .await?;
    let rule_count = call_graph
        .u64_field("ruleCount")
        .or_else(|| call_graph.u64_field("nodeCount"));
    match rule_count {
        Some(n) => println!("     Rules: {n}"),
        None => println!("     Rules: N/A"),
    }

    if let Some(sample) = &input.sample {
        section("Step 2: Parse sample input");
        let parsed = client
            .call_tool(
                "parse_sample",
                json!({
                    "grammar_text": input.grammar_text,
                    "sample_input": sample,
                    "start_rule": input.start_rule,
                    "show_tokens": false,
                }),
            )
            .await?;
        println!("[ok] parse_sample success={}", parsed.confirmed_success());
        if !parsed.confirmed_success() {
            print_failure(&parsed);
            return Ok(false);
        }
        if let Some(tree) = parsed.str_field("parseTree") {
            println!("Parse tree: {tree}");
        }
    }

    section("Step 3: Check for ambiguities");
    let ambiguity = client
        .call_tool("detect_ambiguity", ambiguity_arguments(&input))
        .await?;
    let has_ambiguities = ambiguity
        .bool_field("hasAmbiguities")
        .or_else(|| ambiguity.bool_field("ambiguityDetected"))
        .unwrap_or(false);
    println!("[ok] Ambiguity check: hasAmbiguities={has_ambiguities}");
    for amb in ambiguity.array_field("ambiguities") {
        let desc = amb
            .get("description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("Unknown");
        println!("  - {desc}");
    }
    for detail in ambiguity.array_field("ambiguityDetails") {
        println!("  - {}", display_field(Some(detail)));
    }

    if args.skip_codegen {
        return Ok(true);
    }

    section(&format!("Step 4: Generate {} parser", args.target));
    let compiled = client
        .call_tool(
            "compile_grammar_multi_target",
            json!({
                "grammar_text": input.grammar_text,
                "target_language": args.target,
                "generate_listener": true,
                "generate_visitor": true,
                "include_generated_code": true,
            }),
        )
        .await?;
    println!(
        "[ok] compile_grammar_multi_target success={} fileCount={}",
        compiled.confirmed_success(),
        compiled
            .u64_field("fileCount")
            .map_or_else(|| "N/A".to_string(), |n| n.to_string())
    );
    if !compiled.confirmed_success() {
        print_failure(&compiled);
        return Ok(false);
    }

    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("generated").join(&args.target));
    let files = compiled.generated_files();
    let wrote = write_generated_files(&out_dir, &files)?;
    for file in &files {
        println!("  - {}", file.file_name);
    }
    println!("\n[ok] Wrote {wrote} generated files to: {}", out_dir.display());

    print_next_steps(&args.target, &input.grammar_name, &out_dir);
    Ok(true)
}

/// `detect_ambiguity` arguments. With a sample, the server also checks it
/// for ambiguous parses from the start rule.
fn ambiguity_arguments(input: &DslInput) -> serde_json::Value {
    match &input.sample {
        Some(sample) => json!({
            "grammar_text": input.grammar_text,
            "sample_input": sample,
            "start_rule": input.start_rule,
        }),
        None => json!({ "grammar_text": input.grammar_text }),
    }
}

/// Write generated sources under `out_dir`, creating parent directories.
///
/// Names that would land outside `out_dir` (absolute paths, `..`) are
/// rejected before anything is written.
pub fn write_generated_files(out_dir: &Path, files: &[GeneratedFile]) -> anyhow::Result<usize> {
    let mut targets = Vec::with_capacity(files.len());
    for file in files {
        let relative = Path::new(&file.file_name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            anyhow::bail!(
                "refusing to write generated file outside {}: {}",
                out_dir.display(),
                file.file_name
            );
        }
        targets.push((out_dir.join(relative), &file.content));
    }

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    for (dest, content) in &targets {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(dest, content)
            .with_context(|| format!("failed to write {}", dest.display()))?;
        tracing::debug!(path = %dest.display(), bytes = content.len(), "wrote generated file");
    }
    Ok(targets.len())
}

fn print_next_steps(target: &str, grammar_name: &str, out_dir: &Path) {
    println!("\nNext steps:");
    match target {
        "python" => {
            println!("  pip install antlr4-python3-runtime");
            println!("  Use {grammar_name}Lexer / {grammar_name}Parser from: {}", out_dir.display());
        }
        "javascript" | "typescript" => println!("  npm install antlr4"),
        "java" => println!("  Add the antlr4-runtime dependency to your project"),
        other => println!("  Install the ANTLR runtime for {other}"),
    }
}

/// Name of the first parser rule (lowercase-initial `name:` definition).
fn first_parser_rule(grammar_text: &str) -> Option<String> {
    grammar_text.lines().map(str::trim).find_map(|line| {
        let (name, _) = line.split_once(':')?;
        let name = name.trim();
        let first = name.chars().next()?;
        let is_ident = name.chars().all(|c| c.is_alphanumeric() || c == '_');
        (first.is_ascii_lowercase() && is_ident).then(|| name.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::transport::StdioTransport;
    use crate::mcp_client::ClientOptions;
    use serde_json::Value;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    /// Client wired to an in-memory server. `tools/list` answers with no
    /// tools and each `tools/call` answers with `answer(tool_name)`. The task
    /// yields every request it saw once the client closes its input.
    fn scripted_server(
        answer: fn(&str) -> Value,
    ) -> (McpClient, tokio::task::JoinHandle<Vec<Value>>) {
        let (client_out, server_in) = duplex(64 * 1024);
        let (mut server_out, client_in) = duplex(64 * 1024);
        let transport = StdioTransport::new("fake", client_out, client_in);

        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(server_in).lines();
            let mut seen = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let msg: Value = serde_json::from_str(&line).unwrap();
                let Some(id) = msg.get("id").and_then(Value::as_u64) else {
                    continue;
                };
                let result = match msg["method"].as_str() {
                    Some("tools/call") => {
                        let text = answer(msg["params"]["name"].as_str().unwrap_or_default());
                        json!({"content": [{"type": "text", "text": text.to_string()}]})
                    }
                    _ => json!({"tools": []}),
                };
                seen.push(msg);
                let reply = json!({"jsonrpc": "2.0", "id": id, "result": result});
                server_out
                    .write_all(format!("{reply}\n").as_bytes())
                    .await
                    .unwrap();
            }
            seen
        });

        (
            McpClient::from_transport(transport, ClientOptions::default()),
            task,
        )
    }

    fn default_args(out_dir: &Path) -> DslArgs {
        DslArgs {
            grammar: None,
            grammar_name: None,
            sample: None,
            input: None,
            start_rule: None,
            target: "python".into(),
            out_dir: Some(out_dir.to_path_buf()),
            skip_codegen: false,
        }
    }

    fn tool_names(requests: &[Value]) -> Vec<String> {
        requests
            .iter()
            .map(|r| match r["method"].as_str() {
                Some("tools/call") => r["params"]["name"].as_str().unwrap_or_default().to_string(),
                other => other.unwrap_or_default().to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_validation_without_success_flag_stops_pipeline() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut client, server) =
            scripted_server(|_| json!({"errors": [{"message": "syntax error"}]}));

        let ok = run(&mut client, default_args(dir.path())).await.unwrap();
        client.close().await;

        assert!(!ok);
        let requests = server.await.unwrap();
        assert_eq!(tool_names(&requests), vec!["tools/list", "validate_grammar"]);
    }

    #[tokio::test]
    async fn test_compile_without_success_flag_writes_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("generated");
        let (mut client, server) = scripted_server(|tool| match tool {
            "compile_grammar_multi_target" => json!({
                "fileCount": 1,
                "files": [{"fileName": "CalculatorParser.py", "content": "pass"}]
            }),
            _ => json!({"success": true}),
        });

        let ok = run(&mut client, default_args(&out)).await.unwrap();
        client.close().await;

        assert!(!ok);
        assert!(!out.join("CalculatorParser.py").exists());
        let requests = server.await.unwrap();
        assert_eq!(
            tool_names(&requests).last().map(String::as_str),
            Some("compile_grammar_multi_target")
        );
    }

    #[tokio::test]
    async fn test_ambiguity_check_includes_sample() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut client, server) = scripted_server(|tool| match tool {
            "detect_ambiguity" => json!({
                "success": true,
                "ambiguityDetected": true,
                "ambiguityDetails": ["decision 2 in expr: alts 1,2"]
            }),
            _ => json!({"success": true}),
        });
        let args = DslArgs {
            input: Some("1 + 2".into()),
            start_rule: Some("expr".into()),
            skip_codegen: true,
            ..default_args(dir.path())
        };

        let ok = run(&mut client, args).await.unwrap();
        client.close().await;

        assert!(ok);
        let requests = server.await.unwrap();
        let ambiguity = requests
            .iter()
            .find(|r| r["params"]["name"] == "detect_ambiguity")
            .unwrap();
        let arguments = &ambiguity["params"]["arguments"];
        assert_eq!(arguments["sample_input"], "1 + 2");
        assert_eq!(arguments["start_rule"], "expr");
        assert_eq!(arguments["grammar_text"], samples::CALCULATOR_GRAMMAR);
    }

    #[test]
    fn test_ambiguity_arguments_without_sample() {
        let input = DslInput {
            grammar_text: "grammar G; r: ID; ID: [a-z]+;".into(),
            grammar_name: "G".into(),
            sample: None,
            start_rule: "r".into(),
        };
        assert_eq!(
            ambiguity_arguments(&input),
            json!({"grammar_text": "grammar G; r: ID; ID: [a-z]+;"})
        );
    }

    fn generated(name: &str, content: &str) -> GeneratedFile {
        GeneratedFile {
            file_name: name.into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_write_generated_files_creates_parents() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("generated").join("python");
        let files = vec![
            generated("CalculatorLexer.py", "class CalculatorLexer: pass\n"),
            generated("listener/CalculatorListener.py", "class CalculatorListener: pass\n"),
        ];

        let wrote = write_generated_files(&out, &files).unwrap();

        assert_eq!(wrote, 2);
        assert_eq!(
            std::fs::read_to_string(out.join("CalculatorLexer.py")).unwrap(),
            "class CalculatorLexer: pass\n"
        );
        assert!(out.join("listener").join("CalculatorListener.py").exists());
    }

    #[test]
    fn test_write_generated_files_rejects_escaping_names() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out");

        let err = write_generated_files(&out, &[generated("../evil.py", "x")]).unwrap_err();
        assert!(err.to_string().contains("refusing"));
        assert!(!dir.path().join("evil.py").exists());

        let err = write_generated_files(&out, &[generated("/tmp/evil.py", "x")]).unwrap_err();
        assert!(err.to_string().contains("refusing"));
    }

    #[test]
    fn test_rejected_batch_writes_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out");
        let files = vec![generated("Ok.py", "ok"), generated("../Bad.py", "bad")];

        assert!(write_generated_files(&out, &files).is_err());
        assert!(!out.join("Ok.py").exists());
    }

    #[test]
    fn test_first_parser_rule() {
        assert_eq!(
            first_parser_rule(samples::CALCULATOR_GRAMMAR).as_deref(),
            Some("prog")
        );
        assert_eq!(
            first_parser_rule("grammar G;\nID: [a-z]+ ;\nstart: ID ;").as_deref(),
            Some("start")
        );
        assert_eq!(first_parser_rule("grammar G;\nID: [a-z]+ ;"), None);
    }

    #[tokio::test]
    async fn test_resolve_input_defaults_to_calculator() {
        let args = DslArgs {
            grammar: None,
            grammar_name: None,
            sample: None,
            input: None,
            start_rule: None,
            target: "python".into(),
            out_dir: None,
            skip_codegen: false,
        };
        let input = resolve_input(&args).await.unwrap();
        assert_eq!(input.grammar_name, "Calculator");
        assert_eq!(input.start_rule, "prog");
        assert_eq!(input.sample.as_deref(), Some("2 + 3 * (4 - 1)"));
    }
}
