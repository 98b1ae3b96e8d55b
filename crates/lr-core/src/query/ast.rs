use serde::{Deserialize, Serialize};

/// A node of a parsed query.
///
/// The set of variants is closed: the compiler matches exhaustively, so a
/// new node kind cannot be added without deciding how it compiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    /// Top level of a query. Children are implicitly ANDed.
    Root(Vec<Node>),
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    /// A bare word.
    Token(String),
    /// A double-quoted phrase, quotes removed.
    Phrase(String),
    /// A word containing `*` or `?`, kept verbatim.
    Wildcard(String),
    /// `term~` or `term~N`.
    Fuzzy { term: String, max_edits: Option<u8> },
    /// `field:value` or `field:"some phrase"`.
    Field { field: String, value: String },
    /// `field:[lower TO upper]` (inclusive) or `field:{lower TO upper}` (exclusive).
    Range {
        field: String,
        lower: String,
        upper: String,
        inclusive: bool,
    },
}

impl Node {
    /// A root with no children, i.e. a query without any terms.
    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Root(children) if children.is_empty())
    }
}
