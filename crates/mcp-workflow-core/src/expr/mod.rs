//! Path-based expression evaluation.
//!
//! Expressions select and compute values from the data document: dotted and
//! indexed paths (`x.y`, `items[0]`, `a["k"]`), literals, arithmetic,
//! comparisons, `and`/`or`, and `$`-prefixed built-in functions
//! (`$string`, `$number`, `$boolean`, `$parse`, `$parse_utc`, `$to_tz`,
//! `$now_utc`, `$lowercase`, `$uppercase`). Missing paths evaluate to null.
//!
//! Used by switch/loop conditions, transform `set` sources and pick nodes.

mod eval;
mod lexer;
mod parser;

use serde_json::Value;

use crate::error::Result;
use crate::model::Document;

pub use parser::Expr;

/// Parse `source` into an expression AST.
pub fn parse(source: &str) -> Result<Expr> {
    let tokens = lexer::tokenize(source)?;
    parser::parse_tokens(&tokens, source)
}

/// Evaluate `source` against the data document.
pub fn evaluate(source: &str, data: &Document) -> Result<Value> {
    let expr = parse(source)?;
    eval::evaluate(&expr, data)
}
