//! # Query Parser
//!
//! Two passes: a lexer that understands quoting, field prefixes and range
//! brackets, and a recursive-descent parser over the resulting lexemes.
//!
//! Precedence, tightest first: `NOT`, `AND` (explicit or juxtaposition), `OR`.
//! Malformed boolean structure never fails the parse: dangling operators,
//! empty groups and unbalanced parentheses are dropped. Only lexical damage
//! (an unterminated phrase or range) is reported.

use super::ast::Node;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Word(String),
    Quoted(String),
    FieldQuoted {
        field: String,
        value: String,
    },
    FieldRange {
        field: String,
        lower: String,
        upper: String,
        inclusive: bool,
    },
}

/// Parse query text into a [`Node::Root`].
pub fn parse(input: &str) -> Result<Node> {
    let lexemes = lex(input)?;
    let mut parser = Parser { lexemes, pos: 0 };
    Ok(parser.parse_root())
}

// =============================================================================
// Lexer
// =============================================================================

fn lex(input: &str) -> Result<Vec<Lexeme>> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '(' => {
                out.push(Lexeme::LParen);
                i += 1;
            }
            ')' => {
                out.push(Lexeme::RParen);
                i += 1;
            }
            '"' => {
                let (phrase, next) = read_quoted(&chars, i + 1)?;
                out.push(Lexeme::Quoted(phrase));
                i = next;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                out.push(Lexeme::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                out.push(Lexeme::Or);
                i += 2;
            }
            '-' | '+' if starts_operand(chars.get(i + 1)) => {
                if c == '-' {
                    out.push(Lexeme::Not);
                }
                i += 1;
            }
            _ => {
                let (lexeme, next) = read_word(&chars, i)?;
                out.push(lexeme);
                i = next;
            }
        }
    }

    Ok(out)
}

fn starts_operand(next: Option<&char>) -> bool {
    matches!(next, Some(c) if !c.is_whitespace() && *c != ')')
}

/// Read a phrase body starting just after the opening quote.
/// Returns the phrase and the index after the closing quote.
fn read_quoted(chars: &[char], start: usize) -> Result<(String, usize)> {
    let mut phrase = String::new();
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                phrase.push(chars[i + 1]);
                i += 2;
            }
            '"' => return Ok((phrase, i + 1)),
            c => {
                phrase.push(c);
                i += 1;
            }
        }
    }
    Err(CoreError::UnsupportedQuerySyntax(format!(
        "unterminated phrase \"{}",
        phrase
    )))
}

fn read_word(chars: &[char], start: usize) -> Result<(Lexeme, usize)> {
    let mut word = String::new();
    let mut i = start;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
            break;
        }
        if c == ':' && is_field_name(&word) {
            match chars.get(i + 1) {
                Some('"') => {
                    let (value, next) = read_quoted(chars, i + 2)?;
                    return Ok((Lexeme::FieldQuoted { field: word, value }, next));
                }
                Some(open @ ('[' | '{')) => {
                    let inclusive = *open == '[';
                    let (lower, upper, next) = read_range(chars, i + 2)?;
                    return Ok((
                        Lexeme::FieldRange {
                            field: word,
                            lower,
                            upper,
                            inclusive,
                        },
                        next,
                    ));
                }
                _ => {}
            }
        }
        word.push(c);
        i += 1;
    }

    let lexeme = match word.as_str() {
        "AND" => Lexeme::And,
        "OR" => Lexeme::Or,
        "NOT" => Lexeme::Not,
        _ => Lexeme::Word(word),
    };
    Ok((lexeme, i))
}

/// Read `lower TO upper` up to the closing `]` or `}`.
fn read_range(chars: &[char], start: usize) -> Result<(String, String, usize)> {
    let close = chars[start..]
        .iter()
        .position(|c| *c == ']' || *c == '}')
        .map(|offset| start + offset)
        .ok_or_else(|| CoreError::UnsupportedQuerySyntax("unterminated range".into()))?;

    let body: String = chars[start..close].iter().collect();
    let parts: Vec<&str> = body.split_whitespace().collect();
    match parts.as_slice() {
        [lower, "TO", upper] => Ok((lower.to_string(), upper.to_string(), close + 1)),
        _ => Err(CoreError::UnsupportedQuerySyntax(format!(
            "malformed range [{}]",
            body
        ))),
    }
}

fn is_field_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Turn a bare word into a token, wildcard, fuzzy or field node.
fn classify(word: String) -> Node {
    if let Some((field, value)) = word.split_once(':') {
        if is_field_name(field) && !value.is_empty() {
            return Node::Field {
                field: field.to_string(),
                value: value.to_string(),
            };
        }
    }

    if let Some(pos) = word.rfind('~') {
        let (term, suffix) = (&word[..pos], &word[pos + 1..]);
        if !term.is_empty() {
            if suffix.is_empty() {
                return Node::Fuzzy {
                    term: term.to_string(),
                    max_edits: None,
                };
            }
            if let Ok(edits) = suffix.parse::<u8>() {
                return Node::Fuzzy {
                    term: term.to_string(),
                    max_edits: Some(edits),
                };
            }
        }
    }

    if word.contains('*') || word.contains('?') {
        return Node::Wildcard(word);
    }

    Node::Token(word)
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
    lexemes: Vec<Lexeme>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.pos)
    }

    fn advance(&mut self) -> Option<Lexeme> {
        let lexeme = self.lexemes.get(self.pos).cloned();
        if lexeme.is_some() {
            self.pos += 1;
        }
        lexeme
    }

    fn parse_root(&mut self) -> Node {
        let mut children = Vec::new();
        while self.peek().is_some() {
            match self.parse_or() {
                Some(Node::And(operands)) => children.extend(operands),
                Some(node) => children.push(node),
                None => {}
            }
            // Only a stray ')' can stop parse_or before the end.
            if matches!(self.peek(), Some(Lexeme::RParen)) {
                self.pos += 1;
            }
        }
        Node::Root(children)
    }

    fn parse_or(&mut self) -> Option<Node> {
        let mut branches = Vec::new();
        if let Some(node) = self.parse_and() {
            branches.push(node);
        }
        while matches!(self.peek(), Some(Lexeme::Or)) {
            self.pos += 1;
            if let Some(node) = self.parse_and() {
                branches.push(node);
            }
        }
        match branches.len() {
            0 => None,
            1 => branches.pop(),
            _ => Some(Node::Or(branches)),
        }
    }

    fn parse_and(&mut self) -> Option<Node> {
        let mut operands = Vec::new();
        loop {
            match self.peek() {
                None | Some(Lexeme::RParen) | Some(Lexeme::Or) => break,
                Some(Lexeme::And) => self.pos += 1,
                Some(_) => {
                    if let Some(node) = self.parse_unary() {
                        operands.push(node);
                    }
                }
            }
        }
        match operands.len() {
            0 => None,
            1 => operands.pop(),
            _ => Some(Node::And(operands)),
        }
    }

    fn parse_unary(&mut self) -> Option<Node> {
        match self.advance()? {
            Lexeme::Not => match self.peek() {
                None | Some(Lexeme::RParen) | Some(Lexeme::Or) | Some(Lexeme::And) => None,
                Some(_) => self.parse_unary().map(|node| Node::Not(Box::new(node))),
            },
            Lexeme::LParen => {
                let inner = self.parse_or();
                if matches!(self.peek(), Some(Lexeme::RParen)) {
                    self.pos += 1;
                }
                inner
            }
            Lexeme::Word(word) => Some(classify(word)),
            Lexeme::Quoted(phrase) => Some(Node::Phrase(phrase)),
            Lexeme::FieldQuoted { field, value } => Some(Node::Field { field, value }),
            Lexeme::FieldRange {
                field,
                lower,
                upper,
                inclusive,
            } => Some(Node::Range {
                field,
                lower,
                upper,
                inclusive,
            }),
            Lexeme::RParen | Lexeme::And | Lexeme::Or => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> Node {
        Node::Token(s.to_string())
    }

    #[test]
    fn test_empty_input_is_empty_root() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_juxtaposition_is_and() {
        let root = parse("timeout retry").unwrap();
        assert_eq!(root, Node::Root(vec![token("timeout"), token("retry")]));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let root = parse("a b OR c").unwrap();
        assert_eq!(
            root,
            Node::Root(vec![Node::Or(vec![
                Node::And(vec![token("a"), token("b")]),
                token("c"),
            ])])
        );
    }

    #[test]
    fn test_group_and_not() {
        let root = parse("(error OR fatal) NOT debug").unwrap();
        assert_eq!(
            root,
            Node::Root(vec![
                Node::Or(vec![token("error"), token("fatal")]),
                Node::Not(Box::new(token("debug"))),
            ])
        );
    }

    #[test]
    fn test_minus_prefix_is_not() {
        let root = parse("-debug").unwrap();
        assert_eq!(root, Node::Root(vec![Node::Not(Box::new(token("debug")))]));
    }

    #[test]
    fn test_word_classification() {
        let root = parse("service_name:checkout time* timout~1 retry~ \"conn reset\"").unwrap();
        assert_eq!(
            root,
            Node::Root(vec![
                Node::Field {
                    field: "service_name".into(),
                    value: "checkout".into()
                },
                Node::Wildcard("time*".into()),
                Node::Fuzzy {
                    term: "timout".into(),
                    max_edits: Some(1)
                },
                Node::Fuzzy {
                    term: "retry".into(),
                    max_edits: None
                },
                Node::Phrase("conn reset".into()),
            ])
        );
    }

    #[test]
    fn test_field_phrase_and_range() {
        let root = parse("body:\"out of memory\" status:[200 TO 299] code:{1 TO 5}").unwrap();
        assert_eq!(
            root,
            Node::Root(vec![
                Node::Field {
                    field: "body".into(),
                    value: "out of memory".into()
                },
                Node::Range {
                    field: "status".into(),
                    lower: "200".into(),
                    upper: "299".into(),
                    inclusive: true
                },
                Node::Range {
                    field: "code".into(),
                    lower: "1".into(),
                    upper: "5".into(),
                    inclusive: false
                },
            ])
        );
    }

    #[test]
    fn test_dangling_operators_are_dropped() {
        assert_eq!(parse("a AND").unwrap(), Node::Root(vec![token("a")]));
        assert_eq!(parse("OR a").unwrap(), Node::Root(vec![token("a")]));
        assert_eq!(parse("a NOT").unwrap(), Node::Root(vec![token("a")]));
        assert!(parse("AND OR NOT").unwrap().is_empty());
    }

    #[test]
    fn test_unbalanced_parentheses_degrade() {
        assert_eq!(
            parse("(a OR b").unwrap(),
            Node::Root(vec![Node::Or(vec![token("a"), token("b")])])
        );
        assert_eq!(
            parse("a ) b").unwrap(),
            Node::Root(vec![token("a"), token("b")])
        );
        assert!(parse("()").unwrap().is_empty());
    }

    #[test]
    fn test_lexical_errors_are_reported() {
        assert!(matches!(
            parse("\"never closed"),
            Err(CoreError::UnsupportedQuerySyntax(_))
        ));
        assert!(matches!(
            parse("status:[200 TO"),
            Err(CoreError::UnsupportedQuerySyntax(_))
        ));
        assert!(matches!(
            parse("status:[200 299]"),
            Err(CoreError::UnsupportedQuerySyntax(_))
        ));
    }

    #[test]
    fn test_lowercase_keywords_are_tokens() {
        assert_eq!(
            parse("a or b").unwrap(),
            Node::Root(vec![token("a"), token("or"), token("b")])
        );
    }
}
