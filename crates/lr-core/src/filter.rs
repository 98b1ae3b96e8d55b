//! # Structured Filters
//!
//! Compiles filter expressions into SQL boolean fragments for the search
//! builder:
//!
//! ```text
//! service_name == 'checkout' && (attributes.http.status_code >= 500 || severity_text IN ["ERROR", "FATAL"])
//! ```
//!
//! Known record columns map to `log.<column>`. `attributes.<key>` and
//! `resource_attributes.<key>` (or the bracket form `attributes["key"]`)
//! read from the JSON attribute documents. Any other name is taken as a
//! record attribute key.

use crate::error::{CoreError, Result};

const COLUMNS: &[(&str, &str)] = &[
    ("service_name", "service_name"),
    ("serviceName", "service_name"),
    ("severity_text", "severity_text"),
    ("severityText", "severity_text"),
    ("severity_number", "severity_number"),
    ("severityNumber", "severity_number"),
    ("scope", "scope"),
    ("body", "body"),
    ("trace_id", "trace_id"),
    ("traceId", "trace_id"),
    ("span_id", "span_id"),
    ("spanId", "span_id"),
    ("trace_flags", "trace_flags"),
    ("traceFlags", "trace_flags"),
];

const RECORD_ATTRIBUTES: &str = "log.attributes";
const RESOURCE_ATTRIBUTES: &str = "resource_attributes.resource_attributes";

/// `-?digits(.digits)?`
fn is_number(s: &str) -> bool {
    let unsigned = s.strip_prefix('-').unwrap_or(s);
    let (int, frac) = match unsigned.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (unsigned, None),
    };
    let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    digits(int) && frac.map_or(true, digits)
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Compile a filter expression. Blank input yields `None`.
pub fn compile(expr: &str) -> Result<Option<String>> {
    if expr.trim().is_empty() {
        return Ok(None);
    }
    let tokens = lex(expr)?;
    let mut parser = FilterParser { tokens, pos: 0 };
    let sql = parser.parse_or()?;
    if let Some(extra) = parser.tokens.get(parser.pos) {
        return Err(invalid(format!("unexpected {:?}", extra)));
    }
    Ok(Some(sql))
}

fn invalid(msg: impl Into<String>) -> CoreError {
    CoreError::InvalidFilter(msg.into())
}

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Name(String),
    /// `attributes["key"]` / `resource_attributes['key']`
    Indexed(String, String),
    Str(String),
    Number(String),
    Bool(bool),
    Cmp(&'static str),
    In,
    NotIn,
    And,
    Or,
    Not,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

fn lex(input: &str) -> Result<Vec<Tok>> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                out.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                out.push(Tok::RParen);
                i += 1;
            }
            '[' => {
                out.push(Tok::LBracket);
                i += 1;
            }
            ']' => {
                out.push(Tok::RBracket);
                i += 1;
            }
            ',' => {
                out.push(Tok::Comma);
                i += 1;
            }
            '&' if next == Some('&') => {
                out.push(Tok::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                out.push(Tok::Or);
                i += 2;
            }
            '=' if next == Some('=') => {
                out.push(Tok::Cmp("="));
                i += 2;
            }
            '!' if next == Some('=') => {
                out.push(Tok::Cmp("!="));
                i += 2;
            }
            '!' => {
                out.push(Tok::Not);
                i += 1;
            }
            '>' | '<' => {
                let op = match (c, next) {
                    ('>', Some('=')) => ">=",
                    ('<', Some('=')) => "<=",
                    ('>', _) => ">",
                    _ => "<",
                };
                i += op.len();
                out.push(Tok::Cmp(op));
            }
            '"' | '\'' => {
                let (s, end) = read_string(&chars, i)?;
                out.push(Tok::Str(s));
                i = end;
            }
            _ => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                if i == start {
                    return Err(invalid(format!("unexpected character '{}'", c)));
                }
                let word: String = chars[start..i].iter().collect();

                if chars.get(i) == Some(&'[') && matches!(chars.get(i + 1), Some('"' | '\'')) {
                    let (key, end) = read_string(&chars, i + 1)?;
                    if chars.get(end) != Some(&']') {
                        return Err(invalid(format!("expected ']' after {}[{:?}", word, key)));
                    }
                    out.push(Tok::Indexed(word, key));
                    i = end + 1;
                    continue;
                }

                out.push(match word.as_str() {
                    "AND" | "and" => Tok::And,
                    "OR" | "or" => Tok::Or,
                    "NOT" | "not" => Tok::Not,
                    "IN" | "in" => Tok::In,
                    "NIN" | "nin" => Tok::NotIn,
                    "true" => Tok::Bool(true),
                    "false" => Tok::Bool(false),
                    _ if is_number(&word) => Tok::Number(word),
                    _ => Tok::Name(word),
                });
            }
        }
    }
    Ok(out)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Read a quoted string starting at the opening quote.
fn read_string(chars: &[char], start: usize) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut s = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                s.push(chars[i + 1]);
                i += 2;
            }
            c if c == quote => return Ok((s, i + 1)),
            c => {
                s.push(c);
                i += 1;
            }
        }
    }
    Err(invalid("unterminated string"))
}

// =============================================================================
// Parser
// =============================================================================

struct FilterParser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl FilterParser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, want: Tok) -> Result<()> {
        match self.advance() {
            Some(tok) if tok == want => Ok(()),
            Some(tok) => Err(invalid(format!("expected {:?}, found {:?}", want, tok))),
            None => Err(invalid(format!("expected {:?}, found end of input", want))),
        }
    }

    fn parse_or(&mut self) -> Result<String> {
        let mut parts = vec![self.parse_and()?];
        while self.peek() == Some(&Tok::Or) {
            self.pos += 1;
            parts.push(self.parse_and()?);
        }
        Ok(group(parts, " OR "))
    }

    fn parse_and(&mut self) -> Result<String> {
        let mut parts = vec![self.parse_unary()?];
        while self.peek() == Some(&Tok::And) {
            self.pos += 1;
            parts.push(self.parse_unary()?);
        }
        Ok(group(parts, " AND "))
    }

    fn parse_unary(&mut self) -> Result<String> {
        if self.peek() == Some(&Tok::Not) {
            self.pos += 1;
            return Ok(format!("NOT ({})", self.parse_unary()?));
        }
        if self.peek() == Some(&Tok::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            self.expect(Tok::RParen)?;
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<String> {
        let column = match self.advance() {
            Some(Tok::Name(name)) => column_for(&name)?,
            Some(Tok::Indexed(root, key)) => indexed_column(&root, &key)?,
            Some(tok) => return Err(invalid(format!("expected a field name, found {:?}", tok))),
            None => return Err(invalid("expected a field name, found end of input")),
        };

        match self.advance() {
            Some(Tok::Cmp(op)) => {
                let value = self.parse_value()?;
                Ok(format!("{} {} {}", column, op, value))
            }
            Some(Tok::In) => Ok(format!("{} IN ({})", column, self.parse_list()?)),
            Some(Tok::NotIn) => Ok(format!("{} NOT IN ({})", column, self.parse_list()?)),
            Some(tok) => Err(invalid(format!("expected an operator, found {:?}", tok))),
            None => Err(invalid("expected an operator, found end of input")),
        }
    }

    fn parse_list(&mut self) -> Result<String> {
        self.expect(Tok::LBracket)?;
        let mut values = Vec::new();
        if self.peek() != Some(&Tok::RBracket) {
            values.push(self.parse_value()?);
            while self.peek() == Some(&Tok::Comma) {
                self.pos += 1;
                values.push(self.parse_value()?);
            }
        }
        self.expect(Tok::RBracket)?;
        Ok(values.join(", "))
    }

    fn parse_value(&mut self) -> Result<String> {
        match self.advance() {
            Some(Tok::Str(s)) => Ok(sql_string(&s)),
            Some(Tok::Number(n)) => Ok(n),
            Some(Tok::Bool(b)) => Ok(if b { "1" } else { "0" }.to_string()),
            Some(tok) => Err(invalid(format!("expected a value, found {:?}", tok))),
            None => Err(invalid("expected a value, found end of input")),
        }
    }
}

fn group(mut parts: Vec<String>, separator: &str) -> String {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        format!("({})", parts.join(separator))
    }
}

fn sql_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn column_for(name: &str) -> Result<String> {
    if let Some((_, column)) = COLUMNS.iter().find(|(alias, _)| *alias == name) {
        return Ok(format!("log.{}", column));
    }
    for prefix in ["resource_attributes.", "resourceAttributes.", "resource."] {
        if let Some(key) = name.strip_prefix(prefix) {
            return json_path(RESOURCE_ATTRIBUTES, key);
        }
    }
    if let Some(key) = name.strip_prefix("attributes.") {
        return json_path(RECORD_ATTRIBUTES, key);
    }
    if !is_name(name) {
        return Err(invalid(format!("invalid field name '{}'", name)));
    }
    json_path(RECORD_ATTRIBUTES, name)
}

fn indexed_column(root: &str, key: &str) -> Result<String> {
    match root {
        "attributes" => json_path(RECORD_ATTRIBUTES, key),
        "resource_attributes" | "resourceAttributes" | "resource" => {
            json_path(RESOURCE_ATTRIBUTES, key)
        }
        _ => Err(invalid(format!("'{}' cannot be indexed", root))),
    }
}

fn json_path(document: &str, key: &str) -> Result<String> {
    if key.is_empty() || key.contains(['"', '\'', '\\']) {
        return Err(invalid(format!("invalid attribute key '{}'", key)));
    }
    Ok(format!("json_extract({}, '$.\"{}\"')", document, key))
}
