//! Compiles a query [`Node`] tree into an FTS5 `MATCH` expression.
//!
//! Wildcard and fuzzy markup is not translated into FTS5 prefix or NEAR
//! operators; those nodes match as plain quoted literals.

use super::ast::Node;
use super::parser::parse;
use tracing::debug;

/// Render a node as an FTS5 expression. An empty string means "no constraint".
pub fn compile(node: &Node) -> String {
    match node {
        Node::Root(children) | Node::And(children) => join(children, " AND "),
        Node::Or(children) => format!("({})", join(children, " OR ")),
        Node::Not(child) => match child.as_ref() {
            Node::Token(value) => format!("NOT {}", quote(value)),
            other => {
                let inner = compile(other);
                if is_unconstrained(&inner) {
                    String::new()
                } else {
                    format!("NOT ({})", inner)
                }
            }
        },
        Node::Token(value) | Node::Phrase(value) | Node::Wildcard(value) => quote(value),
        Node::Fuzzy { term, .. } => quote(term),
        Node::Field { field, value } => format!("{}:{}", field, quote(value)),
        Node::Range { .. } => String::new(),
    }
}

/// Parse and compile query text. Unparseable text compiles to the empty
/// predicate.
pub fn compile_query(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    match parse(text) {
        Ok(root) => compile(&root),
        Err(e) => {
            debug!(query = text, error = %e, "Query degraded to no full-text constraint");
            String::new()
        }
    }
}

/// True for predicates that constrain nothing: `""` and the empty group `"()"`.
pub fn is_unconstrained(predicate: &str) -> bool {
    let p = predicate.trim();
    p.is_empty() || p == "()"
}

fn join(children: &[Node], separator: &str) -> String {
    children
        .iter()
        .map(compile)
        .filter(|s| !is_unconstrained(s))
        .collect::<Vec<_>>()
        .join(separator)
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
