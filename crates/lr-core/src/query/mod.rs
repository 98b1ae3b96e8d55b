//! # Query Language
//!
//! Free-text search syntax accepted by the `query` parameter:
//!
//! ```text
//! timeout "connection reset" service_name:checkout (error OR fatal) NOT debug
//! ```
//!
//! Bare tokens, quoted phrases, `field:value` pairs, wildcards (`time*`),
//! fuzzy terms (`timout~1`), parenthesized groups and `AND`/`OR`/`NOT`
//! connectives are understood. Juxtaposition means `AND`. Range terms
//! (`status:[200 TO 299]`) parse but contribute no constraint.
//!
//! The parser builds a [`Node`] tree; the compiler renders it as an SQLite
//! FTS5 `MATCH` expression.

pub mod ast;
pub mod compiler;
pub mod parser;

pub use ast::Node;
pub use compiler::{compile, compile_query, is_unconstrained};
pub use parser::parse;
