//! Lexer tokens

use std::fmt;

use crate::source_location::SourcePosition;

/// A matched terminal with its source span
///
/// Positions are byte offsets; lines and columns are 1-based. Synthetic tokens
/// created with [`Token::new`] carry zero positions until
/// [`Token::new_borrow_pos`] or [`Token::update`] fills them in.
#[derive(Debug, Clone, Default)]
pub struct Token {
    /// Terminal name
    pub kind: String,
    /// Matched text
    pub value: String,
    /// Byte offset of the first matched byte
    pub start_pos: usize,
    /// Line of the first character
    pub line: usize,
    /// Column of the first character
    pub column: usize,
    /// Line of the last character
    pub end_line: usize,
    /// Column just past the last character
    pub end_column: usize,
    /// Byte offset just past the match
    pub end_pos: usize,
}

impl Token {
    /// Token without position information
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    /// Token spanning `start..end`
    pub fn with_span(
        kind: impl Into<String>,
        value: impl Into<String>,
        start: SourcePosition,
        end: SourcePosition,
    ) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            start_pos: start.offset,
            line: start.line,
            column: start.column,
            end_line: end.line,
            end_column: end.column,
            end_pos: end.offset,
        }
    }

    /// New token that copies the position of `borrow_from`
    pub fn new_borrow_pos(kind: impl Into<String>, value: impl Into<String>, borrow_from: &Token) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            start_pos: borrow_from.start_pos,
            line: borrow_from.line,
            column: borrow_from.column,
            end_line: borrow_from.end_line,
            end_column: borrow_from.end_column,
            end_pos: borrow_from.end_pos,
        }
    }

    /// Copy of this token with a different kind and/or value
    pub fn update(&self, kind: Option<&str>, value: Option<&str>) -> Self {
        Self::new_borrow_pos(
            kind.unwrap_or(&self.kind),
            value.unwrap_or(&self.value),
            self,
        )
    }

    /// Start of the token
    pub fn start(&self) -> SourcePosition {
        SourcePosition::new(self.start_pos, self.line, self.column)
    }

    /// End of the token
    pub fn end(&self) -> SourcePosition {
        SourcePosition::new(self.end_pos, self.end_line, self.end_column)
    }

    /// `Token('KIND', 'value')`
    pub fn repr(&self) -> String {
        format!("Token({}, {})", quote(&self.kind), quote(&self.value))
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Tokens are equal when kind and value match; positions are ignored
impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.value == other.value
    }
}

impl Eq for Token {}

impl std::hash::Hash for Token {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.value.hash(state);
    }
}

impl PartialEq<str> for Token {
    fn eq(&self, other: &str) -> bool {
        self.value == other
    }
}

impl PartialEq<&str> for Token {
    fn eq(&self, other: &&str) -> bool {
        self.value == *other
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_compares_to_str() {
        let tok = Token::new("NUMBER", "42");
        assert_eq!(tok, "42");
        assert!(tok != "43");
    }

    #[test]
    fn test_token_equality_ignores_position() {
        let a = Token::with_span(
            "NAME",
            "x",
            SourcePosition::new(0, 1, 1),
            SourcePosition::new(1, 1, 2),
        );
        let b = Token::new("NAME", "x");
        assert_eq!(a, b);
        assert_ne!(a, Token::new("OTHER", "x"));
    }

    #[test]
    fn test_new_borrow_pos() {
        let a = Token::with_span(
            "NUMBER",
            "7",
            SourcePosition::new(4, 2, 3),
            SourcePosition::new(5, 2, 4),
        );
        let b = Token::new_borrow_pos("COMMA", ",", &a);
        assert_eq!(b.start(), a.start());
        assert_eq!(b.end(), a.end());
        assert_eq!(b.kind, "COMMA");
    }

    #[test]
    fn test_repr_quotes() {
        let tok = Token::new("STRING", "it's\n");
        assert_eq!(tok.repr(), "Token('STRING', 'it\\'s\\n')");
    }
}
