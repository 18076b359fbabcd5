//! Console formatting shared by the commands.

pub const RULE_WIDTH: usize = 70;

/// Print a boxed section header.
pub fn section(title: &str) {
    println!();
    println!("{}", "=".repeat(RULE_WIDTH));
    println!("  {title}");
    println!("{}", "=".repeat(RULE_WIDTH));
}

/// The first `max` lines of `text`, plus how many lines were left out.
pub fn preview_lines(text: &str, max: usize) -> (Vec<&str>, usize) {
    let lines: Vec<&str> = text.trim().lines().collect();
    let hidden = lines.len().saturating_sub(max);
    (lines.into_iter().take(max).collect(), hidden)
}

/// Print at most `max` lines of `text`, each prefixed by `indent`.
pub fn print_preview(text: &str, max: usize, indent: &str) {
    let (shown, hidden) = preview_lines(text, max);
    for line in shown {
        println!("{indent}{line}");
    }
    if hidden > 0 {
        println!("{indent}... ({hidden} more lines)");
    }
}

/// Truncate to at most `max` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Render the first `max` entries of a JSON array of strings, comma-separated.
pub fn join_limited(items: &[serde_json::Value], max: usize) -> String {
    let shown: Vec<String> = items
        .iter()
        .take(max)
        .map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        })
        .collect();
    let mut joined = shown.join(", ");
    if items.len() > max {
        joined.push_str("...");
    }
    joined
}

/// Display a JSON value for a summary line: strings unquoted, missing as `N/A`.
pub fn display_field(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => "N/A".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Explain a failed tool step: its `errors[]`, or the whole document if it has none.
pub fn print_failure(result: &crate::mcp_client::ToolCallResult) {
    println!("{}", failure_report(result));
}

fn failure_report(result: &crate::mcp_client::ToolCallResult) -> String {
    let errors = result.array_field("errors");
    if errors.is_empty() {
        return serde_json::to_string_pretty(result.payload())
            .unwrap_or_else(|_| result.payload().to_string());
    }
    errors
        .iter()
        .map(|err| match err.get("message").and_then(serde_json::Value::as_str) {
            Some(message) => format!("  - {message}"),
            None => format!("  - {}", display_field(Some(err))),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
