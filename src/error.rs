//! Error types
//!
//! Every fallible operation in the crate returns [`LarkError`]. Build-time
//! failures are [`GrammarError`]s or configuration errors; parse-time failures
//! are one of the three "unexpected input" payloads, which share the helpers
//! exposed through [`UnexpectedInput`].

use std::fmt;

use crate::source_location::context_window;
use crate::token::Token;

/// Root error type
#[derive(Debug)]
pub enum LarkError {
    /// Malformed grammar, failed import, template misuse, undefined symbol
    Grammar(GrammarError),
    /// Invalid option combination or incompatible serialized data
    Configuration(String),
    /// No terminal matched at some position
    UnexpectedCharacters(UnexpectedCharacters),
    /// The parser received a token it has no action for
    UnexpectedToken(UnexpectedToken),
    /// Input ended while the parser expected more
    UnexpectedEof(UnexpectedEof),
    /// A walker callback failed
    Visit(VisitError),
    /// Inconsistent dedent reported by the indenter
    Dedent(String),
    /// Broken internal invariant
    Internal(String),
    /// File system failure while loading a grammar or cache
    Io(String),
}

impl LarkError {
    /// Grammar error without a source position
    pub fn grammar(message: impl Into<String>) -> Self {
        LarkError::Grammar(GrammarError::new(message))
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        LarkError::Configuration(message.into())
    }

    /// Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        LarkError::Internal(message.into())
    }

    /// View of a parse-time error, if this is one
    pub fn as_unexpected_input(&self) -> Option<UnexpectedInput<'_>> {
        match self {
            LarkError::UnexpectedCharacters(e) => Some(UnexpectedInput::Characters(e)),
            LarkError::UnexpectedToken(e) => Some(UnexpectedInput::Token(e)),
            LarkError::UnexpectedEof(e) => Some(UnexpectedInput::Eof(e)),
            _ => None,
        }
    }

    /// True for the grammar-definition errors
    pub fn is_grammar_error(&self) -> bool {
        matches!(self, LarkError::Grammar(_))
    }
}

impl fmt::Display for LarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LarkError::Grammar(e) => write!(f, "{}", e),
            LarkError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            LarkError::UnexpectedCharacters(e) => write!(f, "{}", e),
            LarkError::UnexpectedToken(e) => write!(f, "{}", e),
            LarkError::UnexpectedEof(e) => write!(f, "{}", e),
            LarkError::Visit(e) => write!(f, "{}", e),
            LarkError::Dedent(msg) => write!(f, "Dedent error: {}", msg),
            LarkError::Internal(msg) => write!(f, "Internal error: {}", msg),
            LarkError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for LarkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LarkError::Visit(e) => e
                .source
                .as_deref()
                .map(|s| s as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl From<GrammarError> for LarkError {
    fn from(e: GrammarError) -> Self {
        LarkError::Grammar(e)
    }
}

impl From<VisitError> for LarkError {
    fn from(e: VisitError) -> Self {
        LarkError::Visit(e)
    }
}

impl From<std::io::Error> for LarkError {
    fn from(e: std::io::Error) -> Self {
        LarkError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for LarkError {
    fn from(e: serde_json::Error) -> Self {
        LarkError::Configuration(format!("invalid serialized parser: {}", e))
    }
}

/// Error in a grammar definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarError {
    /// Human-readable diagnosis
    pub message: String,
    /// Line in the grammar text (0 when unknown)
    pub line: usize,
    /// Column in the grammar text (0 when unknown)
    pub column: usize,
}

impl GrammarError {
    /// Error without a position
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: 0,
            column: 0,
        }
    }

    /// Error at a grammar position
    pub fn at(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Grammar error: {}", self.message)
    }
}

impl std::error::Error for GrammarError {}

/// No terminal matched the input at `pos_in_stream`
#[derive(Debug, Clone)]
pub struct UnexpectedCharacters {
    /// The offending character
    pub char: char,
    /// Byte offset of the offending character
    pub pos_in_stream: usize,
    /// Line of the offending character
    pub line: usize,
    /// Column of the offending character
    pub column: usize,
    /// Terminals that were acceptable at this point, sorted
    pub allowed: Vec<String>,
    /// LALR state the lexer was serving, if any
    pub state: Option<usize>,
    /// Tokens lexed just before the failure
    pub token_history: Vec<Token>,
    context: String,
}

impl UnexpectedCharacters {
    /// Build the error from the input and the failing position
    pub fn new(
        text: &[u8],
        pos: usize,
        line: usize,
        column: usize,
        mut allowed: Vec<String>,
        state: Option<usize>,
        token_history: Vec<Token>,
    ) -> Self {
        allowed.sort();
        allowed.dedup();
        let char = char_at(text, pos);
        Self {
            char,
            pos_in_stream: pos,
            line,
            column,
            allowed,
            state,
            token_history,
            context: context_window(text, pos, 40),
        }
    }
}

fn char_at(text: &[u8], pos: usize) -> char {
    let end = (pos + 4).min(text.len());
    let slice = text.get(pos..end).unwrap_or_default();
    match std::str::from_utf8(slice) {
        Ok(s) => s.chars().next().unwrap_or('\0'),
        Err(e) => std::str::from_utf8(&slice[..e.valid_up_to()])
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or_else(|| slice.first().map(|&b| b as char).unwrap_or('\0')),
    }
}

impl fmt::Display for UnexpectedCharacters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "No terminal matches '{}' in the current parser context, at line {} col {}\n\n{}",
            self.char, self.line, self.column, self.context
        )?;
        if !self.allowed.is_empty() {
            write!(f, "\nExpected one of: \n\t* {}\n", self.allowed.join("\n\t* "))?;
        }
        if !self.token_history.is_empty() {
            let history: Vec<String> = self.token_history.iter().map(Token::repr).collect();
            write!(f, "\nPrevious tokens: {}\n", history.join(", "))?;
        }
        Ok(())
    }
}

/// The parser cannot act on `token`
#[derive(Debug, Clone)]
pub struct UnexpectedToken {
    /// The rejected token
    pub token: Token,
    /// Terminal names with an action in the current state, sorted
    pub expected: Vec<String>,
    /// Terminals that would be accepted after any pending reductions, if known
    pub accepts: Option<Vec<String>>,
    /// LALR state of the parser
    pub state: Option<usize>,
    /// Tokens fed just before the failure
    pub token_history: Vec<Token>,
}

impl UnexpectedToken {
    /// Build the error
    pub fn new(token: Token, mut expected: Vec<String>, state: Option<usize>) -> Self {
        expected.sort();
        expected.dedup();
        Self {
            token,
            expected,
            accepts: None,
            state,
            token_history: Vec::new(),
        }
    }

    /// True when the rejected token is the end-of-input marker
    pub fn is_end(&self) -> bool {
        self.token.kind == "$END"
    }
}

impl fmt::Display for UnexpectedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unexpected token {} at line {}, column {}.\n{}",
            self.token.repr(),
            self.token.line,
            self.token.column,
            format_expected(self.accepts.as_deref().unwrap_or(&self.expected))
        )?;
        if !self.token_history.is_empty() {
            let history: Vec<String> = self.token_history.iter().map(Token::repr).collect();
            write!(f, "Previous tokens: {}\n", history.join(", "))?;
        }
        Ok(())
    }
}

/// Input ended early
#[derive(Debug, Clone)]
pub struct UnexpectedEof {
    /// Terminals that could have continued the input, sorted
    pub expected: Vec<String>,
    /// Byte offset of the end of input
    pub pos_in_stream: usize,
    /// Line at end of input
    pub line: usize,
    /// Column at end of input
    pub column: usize,
    /// LALR state, if any
    pub state: Option<usize>,
}

impl UnexpectedEof {
    /// Build the error
    pub fn new(mut expected: Vec<String>, pos_in_stream: usize, line: usize, column: usize) -> Self {
        expected.sort();
        expected.dedup();
        Self {
            expected,
            pos_in_stream,
            line,
            column,
            state: None,
        }
    }
}

impl fmt::Display for UnexpectedEof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unexpected end-of-input. {}", format_expected(&self.expected))
    }
}

fn format_expected(expected: &[String]) -> String {
    format!("Expected one of: \n\t* {}\n", expected.join("\n\t* "))
}

/// A walker callback failed while processing a node
#[derive(Debug)]
pub struct VisitError {
    /// Rule name (or token kind) being processed
    pub rule: String,
    /// Description of the failure
    pub message: String,
    /// Underlying error returned by the callback
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl VisitError {
    /// Error without an underlying cause
    pub fn new(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an error returned by a callback
    pub fn wrap(rule: impl Into<String>, err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self {
            rule: rule.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl fmt::Display for VisitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error trying to process rule \"{}\":\n\n{}",
            self.rule, self.message
        )
    }
}

/// Borrowed view over the three parse-time error payloads
#[derive(Debug, Clone, Copy)]
pub enum UnexpectedInput<'a> {
    /// See [`UnexpectedCharacters`]
    Characters(&'a UnexpectedCharacters),
    /// See [`UnexpectedToken`]
    Token(&'a UnexpectedToken),
    /// See [`UnexpectedEof`]
    Eof(&'a UnexpectedEof),
}

impl<'a> UnexpectedInput<'a> {
    /// Byte offset of the failure
    pub fn pos_in_stream(&self) -> usize {
        match self {
            UnexpectedInput::Characters(e) => e.pos_in_stream,
            UnexpectedInput::Token(e) => e.token.start_pos,
            UnexpectedInput::Eof(e) => e.pos_in_stream,
        }
    }

    /// Line of the failure
    pub fn line(&self) -> usize {
        match self {
            UnexpectedInput::Characters(e) => e.line,
            UnexpectedInput::Token(e) => e.token.line,
            UnexpectedInput::Eof(e) => e.line,
        }
    }

    /// Column of the failure
    pub fn column(&self) -> usize {
        match self {
            UnexpectedInput::Characters(e) => e.column,
            UnexpectedInput::Token(e) => e.token.column,
            UnexpectedInput::Eof(e) => e.column,
        }
    }

    /// Parser state at the failure, if known
    pub fn state(&self) -> Option<usize> {
        match self {
            UnexpectedInput::Characters(e) => e.state,
            UnexpectedInput::Token(e) => e.state,
            UnexpectedInput::Eof(e) => e.state,
        }
    }

    /// Terminals that would have been accepted
    pub fn expected(&self) -> &'a [String] {
        match self {
            UnexpectedInput::Characters(e) => &e.allowed,
            UnexpectedInput::Token(e) => &e.expected,
            UnexpectedInput::Eof(e) => &e.expected,
        }
    }

    /// Token that triggered the failure; end of input is `<EOF>`
    fn token(&self) -> Option<Token> {
        match self {
            UnexpectedInput::Characters(_) => None,
            UnexpectedInput::Token(e) => Some(e.token.clone()),
            UnexpectedInput::Eof(_) => Some(Token::new("<EOF>", "")),
        }
    }

    /// The lines of `text` around the failure with a caret under it
    ///
    /// Shows at most `span` bytes on each side of the position.
    pub fn get_context(&self, text: &str, span: usize) -> String {
        context_window(text.as_bytes(), self.pos_in_stream(), span)
    }

    fn same_state(&self, other: &UnexpectedInput<'_>) -> bool {
        match (self.state(), other.state()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.expected() == other.expected(),
            _ => false,
        }
    }

    /// Find the label of the malformed example that fails like this error
    ///
    /// `parse_fn` is run on every example. A label whose example fails in the
    /// same parser state with the same token wins outright; otherwise the
    /// first label failing in the same state is returned. With
    /// `token_type_match_fallback`, a same-state failure on a token of the
    /// same kind is preferred over a plain state match. With `use_accepts`,
    /// token failures must also agree on the accepted terminal set.
    pub fn match_examples<T, L, F>(
        &self,
        mut parse_fn: F,
        examples: &[(L, Vec<&str>)],
        token_type_match_fallback: bool,
        use_accepts: bool,
    ) -> Option<L>
    where
        L: Clone,
        F: FnMut(&str) -> Result<T, LarkError>,
    {
        let mut candidate: Option<(L, bool)> = None;
        let my_token = self.token();
        for (label, example) in examples {
            for malformed in example {
                let err = match parse_fn(malformed) {
                    Ok(_) => continue,
                    Err(err) => err,
                };
                let Some(ut) = err.as_unexpected_input() else {
                    continue;
                };
                if !self.same_state(&ut) {
                    continue;
                }
                if use_accepts {
                    if let (UnexpectedInput::Token(a), UnexpectedInput::Token(b)) = (self, &ut) {
                        if a.accepts != b.accepts {
                            continue;
                        }
                    }
                }
                if let (Some(mine), Some(theirs)) = (&my_token, ut.token()) {
                    if *mine == theirs {
                        log_debug!("exact example match for {:?}", malformed);
                        return Some(label.clone());
                    }
                    if token_type_match_fallback
                        && mine.kind == theirs.kind
                        && !candidate.as_ref().is_some_and(|(_, strong)| *strong)
                    {
                        candidate = Some((label.clone(), true));
                    }
                }
                if candidate.is_none() {
                    candidate = Some((label.clone(), false));
                }
            }
        }
        candidate.map(|(label, _)| label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_location::SourcePosition;

    fn token_error(kind: &str, value: &str, state: usize) -> LarkError {
        let tok = Token::with_span(
            kind,
            value,
            SourcePosition::new(3, 1, 4),
            SourcePosition::new(4, 1, 5),
        );
        LarkError::UnexpectedToken(UnexpectedToken::new(
            tok,
            vec!["RPAR".into(), "COMMA".into()],
            Some(state),
        ))
    }

    #[test]
    fn test_unexpected_characters_message() {
        let err = UnexpectedCharacters::new(b"ab$cd", 2, 1, 3, vec!["B".into(), "A".into()], None, vec![]);
        let msg = err.to_string();
        assert!(msg.starts_with("No terminal matches '$' in the current parser context, at line 1 col 3"));
        assert!(msg.contains("ab$cd\n  ^\n"));
        assert!(msg.contains("Expected one of: \n\t* A\n\t* B\n"));
        assert_eq!(err.char, '$');
    }

    #[test]
    fn test_unexpected_token_message() {
        let err = token_error("NUMBER", "1", 5);
        let msg = err.to_string();
        assert!(msg.starts_with("Unexpected token Token('NUMBER', '1') at line 1, column 4."));
        assert!(msg.contains("\t* COMMA\n\t* RPAR"));
    }

    #[test]
    fn test_unexpected_eof_message() {
        let err = UnexpectedEof::new(vec!["NAME".into()], 3, 1, 4);
        assert_eq!(err.to_string(), "Unexpected end-of-input. Expected one of: \n\t* NAME\n");
    }

    #[test]
    fn test_get_context() {
        let err = token_error("NUMBER", "1", 0);
        let view = err.as_unexpected_input().unwrap();
        assert_eq!(view.get_context("[0 1]", 40), "[0 1]\n   ^\n");
        assert_eq!(view.pos_in_stream(), 3);
    }

    #[test]
    fn test_match_examples_prefers_exact_token() {
        let err = token_error("NUMBER", "1", 7);
        let view = err.as_unexpected_input().unwrap();
        let examples = vec![("state only", vec!["a"]), ("exact", vec!["b"])];
        let label = view.match_examples(
            |s| -> Result<(), LarkError> {
                match s {
                    "a" => Err(token_error("NUMBER", "9", 7)),
                    _ => Err(token_error("NUMBER", "1", 7)),
                }
            },
            &examples,
            false,
            false,
        );
        assert_eq!(label, Some("exact"));
    }

    #[test]
    fn test_match_examples_state_mismatch() {
        let err = token_error("NUMBER", "1", 7);
        let view = err.as_unexpected_input().unwrap();
        let examples = vec![("other", vec!["a"])];
        let label = view.match_examples(
            |_| -> Result<(), LarkError> { Err(token_error("NUMBER", "1", 8)) },
            &examples,
            false,
            false,
        );
        assert_eq!(label, None);
    }

    #[test]
    fn test_match_examples_token_type_fallback() {
        let err = token_error("NUMBER", "1", 2);
        let view = err.as_unexpected_input().unwrap();
        let examples = vec![("first", vec!["x"]), ("typed", vec!["y"])];
        let label = view.match_examples(
            |s| -> Result<(), LarkError> {
                match s {
                    "x" => Err(token_error("NAME", "q", 2)),
                    _ => Err(token_error("NUMBER", "5", 2)),
                }
            },
            &examples,
            true,
            false,
        );
        assert_eq!(label, Some("typed"));
    }

    #[test]
    fn test_grammar_error_display() {
        let err = LarkError::grammar("Rules defined twice: <a : B>");
        assert_eq!(err.to_string(), "Grammar error: Rules defined twice: <a : B>");
        assert!(err.is_grammar_error());
    }
}
