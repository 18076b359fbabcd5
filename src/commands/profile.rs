//! `profile`: parse-time profiling of the bundled ComplexExpr grammar.

use serde::Deserialize;
use serde_json::json;

use super::output::{display_field, section};
use super::samples::{COMPLEX_EXPR_GRAMMAR, COMPLEX_EXPR_INPUT};
use crate::mcp_client::McpClient;

const START_RULE: &str = "program";

/// Per-decision counters from `profile_grammar`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecisionProfile {
    pub decision_number: Option<u64>,
    pub rule_name: Option<String>,
    pub time_nanos: u64,
    pub invocations: u64,
    pub ll_fallback: u64,
    pub ll_max_look: u64,
    pub ambiguity_count: u64,
    #[serde(rename = "dfaStates")]
    pub dfa_states: u64,
    #[serde(rename = "sllDFATransitions")]
    pub sll_dfa_transitions: u64,
    #[serde(rename = "llDFATransitions")]
    pub ll_dfa_transitions: u64,
}

impl DecisionProfile {
    fn rule(&self) -> &str {
        self.rule_name.as_deref().unwrap_or("unknown")
    }

    fn time_ms(&self) -> f64 {
        nanos_to_ms(self.time_nanos)
    }
}

/// SLL share of total lookahead, as a percentage. `None` when both are zero.
pub fn sll_success_rate(sll: u64, ll: u64) -> Option<f64> {
    let total = sll as f64 + ll as f64;
    (total > 0.0).then(|| sll as f64 / total * 100.0)
}

fn nanos_to_ms(nanos: u64) -> f64 {
    nanos as f64 / 1_000_000.0
}

/// Decode `decisions[]`, skipping entries whose shape doesn't match.
fn decode_decisions(values: &[serde_json::Value]) -> Vec<DecisionProfile> {
    values
        .iter()
        .filter_map(|v| match DecisionProfile::deserialize(v) {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable decision profile");
                None
            }
        })
        .collect()
}

pub async fn run(client: &mut McpClient) -> anyhow::Result<bool> {
    section("Validating grammar");
    let validation = client
        .call_tool("validate_grammar", json!({ "grammar_text": COMPLEX_EXPR_GRAMMAR }))
        .await?;
    println!("Grammar: {}", validation.str_field("grammarName").unwrap_or("ComplexExpr"));
    println!("Valid: {}", validation.success());

    section("PROFILING RESULTS");
    let result = client
        .call_tool(
            "profile_grammar",
            json!({
                "grammar_text": COMPLEX_EXPR_GRAMMAR,
                "sample_input": COMPLEX_EXPR_INPUT,
                "start_rule": START_RULE,
            }),
        )
        .await?;
    println!("Success: {}", result.success());
    println!("Grammar: {}", display_field(result.get("grammarName")));

    let total_ms = nanos_to_ms(result.u64_field("totalTimeNanos").unwrap_or(0));
    let sll = result.u64_field("totalSLLLookahead").unwrap_or(0);
    let ll = result.u64_field("totalLLLookahead").unwrap_or(0);
    let dfa_states = result.u64_field("totalDFAStates").unwrap_or(0);

    println!("\n--- Aggregate statistics ---");
    println!("Total parse time:       {total_ms:.3} ms");
    println!("Total SLL lookahead:    {sll}");
    println!("Total LL lookahead:     {ll}");
    println!(
        "Total ATN transitions:  {}",
        result.u64_field("totalATNTransitions").unwrap_or(0)
    );
    println!("Total DFA states:       {dfa_states}");

    if let Some(rate) = sll_success_rate(sll, ll) {
        println!("\nSLL success rate:       {rate:.1}%");
        if ll > 0 {
            println!("  LL fallbacks detected: some decisions require extra lookahead");
        } else {
            println!("  All decisions resolved with SLL (fast path)");
        }
    }

    let decisions = decode_decisions(result.array_field("decisions"));
    if !decisions.is_empty() {
        print_decisions(&decisions);
    }

    let insights = result.array_field("insights");
    if !insights.is_empty() {
        println!("\n--- Insights ---");
        for insight in insights {
            println!("  * {}", display_field(Some(insight)));
        }
    }
    let hints = result.array_field("optimizationHints");
    if !hints.is_empty() {
        println!("\n--- Optimization hints ---");
        for hint in hints {
            println!("  * {}", display_field(Some(hint)));
        }
    }

    section("PERFORMANCE SUMMARY");
    println!(
        "  Parse time: {total_ms:.3} ms for {} bytes of input",
        COMPLEX_EXPR_INPUT.len()
    );
    println!("  SLL/LL ratio: {sll}/{ll}");
    println!("  DFA states: {dfa_states}");

    Ok(validation.success() && result.success())
}

fn print_decisions(decisions: &[DecisionProfile]) {
    println!("\n--- Decision analysis ({} decisions) ---", decisions.len());

    let mut by_time: Vec<&DecisionProfile> = decisions.iter().collect();
    by_time.sort_by(|a, b| b.time_nanos.cmp(&a.time_nanos));
    println!("\nTop 5 slowest decisions:");
    println!("{:<4} {:<20} {:<10} {:<12} {:<12}", "#", "Rule", "Time(ms)", "Invocations", "LL Fallback");
    println!("{}", "-".repeat(60));
    for dec in by_time.iter().take(5) {
        println!(
            "{:<4} {:<20} {:<10.3} {:<12} {:<12}",
            dec.decision_number.map_or_else(|| "?".to_string(), |n| n.to_string()),
            dec.rule(),
            dec.time_ms(),
            dec.invocations,
            dec.ll_fallback
        );
    }

    let fallbacks: Vec<_> = decisions.iter().filter(|d| d.ll_fallback > 0).collect();
    if !fallbacks.is_empty() {
        println!("\n{} decisions required LL fallback:", fallbacks.len());
        for dec in fallbacks.iter().take(5) {
            println!(
                "    {}: {} fallbacks, max lookahead: {}",
                dec.rule(),
                dec.ll_fallback,
                dec.ll_max_look
            );
        }
    }

    let ambiguous: Vec<_> = decisions.iter().filter(|d| d.ambiguity_count > 0).collect();
    if !ambiguous.is_empty() {
        println!("\n{} decisions had ambiguities:", ambiguous.len());
        for dec in ambiguous.iter().take(5) {
            println!("    {}: {} ambiguities", dec.rule(), dec.ambiguity_count);
        }
    }

    let mut by_dfa: Vec<&DecisionProfile> = decisions.iter().collect();
    by_dfa.sort_by(|a, b| b.dfa_states.cmp(&a.dfa_states));
    println!("\n--- DFA state usage ---");
    println!("{:<25} {:<12} {:<12} {:<12}", "Rule", "DFA States", "SLL Trans", "LL Trans");
    println!("{}", "-".repeat(65));
    for dec in by_dfa.iter().take(5) {
        println!(
            "{:<25} {:<12} {:<12} {:<12}",
            dec.rule(),
            dec.dfa_states,
            dec.sll_dfa_transitions,
            dec.ll_dfa_transitions
        );
    }
}
