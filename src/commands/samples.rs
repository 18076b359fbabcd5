//! Sample grammars and inputs bundled into the binary.

/// Expression grammar using direct left recursion for precedence.
pub const EXPR_GRAMMAR: &str = include_str!("../../grammars/Expr.g4");

/// Grammar whose rules form an indirect left-recursive cycle.
pub const INDIRECT_LR_GRAMMAR: &str = include_str!("../../grammars/IndirectLR.g4");

/// Statement/expression grammar used by `all-tools`.
pub const EXPRESSION_GRAMMAR: &str = include_str!("../../grammars/Expression.g4");
pub const EXPRESSION_INPUT: &str = include_str!("../../grammars/expression.sample");

/// Deliberately ambiguous grammar (`foo();` matches two alternatives).
pub const AMBIGUOUS_GRAMMAR: &str = include_str!("../../grammars/Ambig.g4");

/// Larger grammar used by `profile`.
pub const COMPLEX_EXPR_GRAMMAR: &str = include_str!("../../grammars/ComplexExpr.g4");
pub const COMPLEX_EXPR_INPUT: &str = include_str!("../../grammars/complex_expr.sample");

/// Default grammar for `dsl` when none is given.
pub const CALCULATOR_GRAMMAR: &str = include_str!("../../grammars/Calculator.g4");
pub const CALCULATOR_INPUT: &str = include_str!("../../grammars/calculator.sample");

/// Extract the name from a `grammar Name;` / `parser grammar Name;` header.
pub fn grammar_name(grammar_text: &str) -> Option<&str> {
    grammar_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("//"))
        .find_map(|line| {
            let rest = line
                .strip_prefix("lexer grammar ")
                .or_else(|| line.strip_prefix("parser grammar "))
                .or_else(|| line.strip_prefix("grammar "))?;
            let name = rest.split(';').next()?.trim();
            (!name.is_empty()).then_some(name)
        })
}
