//! LALR(1) runtime
//!
//! A [`ParserState`] is a state stack plus a value stack. Tokens are fed one
//! at a time; reductions run the tree builder callbacks. Input ends with a
//! synthetic `$END` token, and the parse is accepted when a reduction lands
//! in the end state of the start symbol.

use std::fmt;

use crate::error::{LarkError, UnexpectedToken};
use crate::grammar::Rule;
use crate::lexer::LexerThread;
use crate::parse_tree_builder::ParseTreeBuilder;
use crate::parsers::grammar_analysis::END;
use crate::parsers::lalr_analysis::{Action, LalrAnalyzer, ParseTable};
use crate::parsers::lalr_interactive_parser::InteractiveParser;
use crate::source_location::SourcePosition;
use crate::token::Token;
use crate::tree::Child;

/// Stacks of one parse
#[derive(Debug, Clone, PartialEq)]
pub struct ParserState {
    /// Start symbol being parsed
    pub start: String,
    /// LALR states, the current one last
    pub state_stack: Vec<usize>,
    /// Values built so far, parallel to the state stack minus the initial state
    pub value_stack: Vec<Child>,
}

impl ParserState {
    /// Current state
    #[inline]
    pub fn position(&self) -> usize {
        self.state_stack.last().copied().unwrap_or(0)
    }
}

/// Callback used by [`LalrParser::parse_with_recovery`]
///
/// Returning `false` gives up and re-raises the error.
pub type OnError<'c> = dyn FnMut(&LarkError, &mut InteractiveParser<'_>) -> bool + 'c;

/// LALR(1) parser: table, rules and tree builder
#[derive(Clone)]
pub struct LalrParser {
    table: ParseTable,
    rules: Vec<Rule>,
    builder: ParseTreeBuilder,
}

impl LalrParser {
    /// Analyze `rules` and build the table
    pub fn new(rules: &[Rule], start: &[String], strict: bool, builder: ParseTreeBuilder) -> Result<Self, LarkError> {
        let table = LalrAnalyzer::new(rules, start, strict)?.build()?;
        log_debug!("LALR table built: {} states", table.len());
        Ok(Self::from_table(table, rules.to_vec(), builder))
    }

    /// Parser over an existing table, e.g. one loaded from a cache
    pub fn from_table(table: ParseTable, rules: Vec<Rule>, builder: ParseTreeBuilder) -> Self {
        Self {
            table,
            rules,
            builder,
        }
    }

    /// The parse table
    pub fn table(&self) -> &ParseTable {
        &self.table
    }

    /// Rules reductions refer to
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Fresh stacks for `start`
    pub fn initial_state(&self, start: &str) -> Result<ParserState, LarkError> {
        let Some(&s0) = self.table.start_states.get(start) else {
            return Err(LarkError::config(format!("Unknown start rule {}", start)));
        };
        Ok(ParserState {
            start: start.to_string(),
            state_stack: vec![s0],
            value_stack: Vec::new(),
        })
    }

    fn end_state(&self, start: &str) -> Result<usize, LarkError> {
        self.table
            .end_states
            .get(start)
            .copied()
            .ok_or_else(|| LarkError::internal(format!("no end state for {}", start)))
    }

    fn goto(&self, state: usize, origin: &str) -> Result<usize, LarkError> {
        self.table
            .goto
            .get(state)
            .and_then(|g| g.get(origin))
            .copied()
            .ok_or_else(|| LarkError::internal(format!("missing goto from state {} on {}", state, origin)))
    }

    /// Feed one token, reducing as needed
    ///
    /// Returns the final value when `is_end` and the input is accepted.
    pub fn feed_token(&self, state: &mut ParserState, token: Token, is_end: bool) -> Result<Option<Child>, LarkError> {
        let end_state = self.end_state(&state.start)?;
        loop {
            let top = state.position();
            let Some(&action) = self.table.states.get(top).and_then(|a| a.get(token.kind.as_str())) else {
                let expected = self.table.expected(top);
                let accepts: Vec<String> = expected.iter().filter(|t| self.can_feed(state, t)).cloned().collect();
                let mut err = UnexpectedToken::new(token, expected, Some(top));
                err.accepts = Some(accepts);
                return Err(LarkError::UnexpectedToken(err));
            };
            match action {
                Action::Shift(next) => {
                    if is_end {
                        return Err(LarkError::internal("shift on end of input"));
                    }
                    state.state_stack.push(next);
                    state.value_stack.push(Child::Token(token));
                    return Ok(None);
                }
                Action::Reduce(rule_id) => {
                    let rule = self
                        .rules
                        .get(rule_id)
                        .ok_or_else(|| LarkError::internal(format!("unknown rule {}", rule_id)))?;
                    let size = rule.expansion.len();
                    if size > state.value_stack.len() || size >= state.state_stack.len() {
                        return Err(LarkError::internal("parser stack underflow"));
                    }
                    let children = state.value_stack.split_off(state.value_stack.len() - size);
                    state.state_stack.truncate(state.state_stack.len() - size);
                    let value = self.builder.build(rule_id, children);
                    let next = self.goto(state.position(), rule.origin.name())?;
                    state.state_stack.push(next);
                    state.value_stack.push(value);
                    if is_end && next == end_state {
                        return Ok(state.value_stack.pop());
                    }
                }
            }
        }
    }

    /// Whether `terminal` can be fed in `state` without an error
    ///
    /// Only the state stack is simulated; no values are built.
    pub fn can_feed(&self, state: &ParserState, terminal: &str) -> bool {
        let Ok(end_state) = self.end_state(&state.start) else {
            return false;
        };
        let mut stack = state.state_stack.clone();
        loop {
            let top = stack.last().copied().unwrap_or(0);
            match self.table.states.get(top).and_then(|a| a.get(terminal)) {
                None => return false,
                Some(Action::Shift(_)) => return true,
                Some(&Action::Reduce(r)) => {
                    let size = self.rules[r].expansion.len();
                    if size >= stack.len() {
                        return false;
                    }
                    stack.truncate(stack.len() - size);
                    let Ok(next) = self.goto(stack.last().copied().unwrap_or(0), self.rules[r].origin.name()) else {
                        return false;
                    };
                    stack.push(next);
                    if terminal == END && next == end_state {
                        return true;
                    }
                }
            }
        }
    }

    /// Run the lexer to the end, then feed `$END`
    pub fn parse_from_state(&self, state: &mut ParserState, lexer: &mut LexerThread<'_>) -> Result<Child, LarkError> {
        let mut last = lexer.state.last_token.clone();
        while let Some(token) = lexer.next_token(Some(state.position()))? {
            last = Some(token.clone());
            self.feed_token(state, token, false)?;
        }
        let end = match &last {
            Some(tok) => Token::new_borrow_pos(END, "", tok),
            None => Token::with_span(END, "", SourcePosition::start(), SourcePosition::start()),
        };
        self.feed_token(state, end, true)?
            .ok_or_else(|| LarkError::internal("end of input did not complete the parse"))
    }

    /// Parse everything `lexer` produces from `start`
    pub fn parse(&self, mut lexer: LexerThread<'_>, start: &str) -> Result<Child, LarkError> {
        let mut state = self.initial_state(start)?;
        self.parse_from_state(&mut state, &mut lexer)
    }

    /// Parse with error recovery
    ///
    /// On every unexpected token or character, `on_error` receives the error
    /// and an interactive parser positioned at the failure. It may feed
    /// tokens or move the lexer, and returns `true` to resume. If it leaves
    /// the lexer on a bad character, that character is skipped. A second
    /// failure on `$END` in the same state is returned as is.
    pub fn parse_with_recovery<'a>(
        &'a self,
        lexer: LexerThread<'a>,
        start: &str,
        on_error: &mut OnError<'_>,
    ) -> Result<Child, LarkError> {
        let state = self.initial_state(start)?;
        let mut ip = InteractiveParser::new(self, state, lexer);
        let mut err = match ip.resume_parse() {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        loop {
            let recoverable = matches!(
                err,
                LarkError::UnexpectedToken(_) | LarkError::UnexpectedCharacters(_)
            );
            if !recoverable {
                return Err(err);
            }
            let pos = ip.lexer_position();
            if !on_error(&err, &mut ip) {
                return Err(err);
            }
            if matches!(err, LarkError::UnexpectedCharacters(_)) && ip.lexer_position() == pos {
                ip.skip_chars(1);
            }
            let snapshot = (ip.parser_state.state_stack.len(), ip.parser_state.position());
            match ip.resume_parse() {
                Ok(value) => return Ok(value),
                Err(e2) => {
                    let end_twice = matches!(
                        (&err, &e2),
                        (LarkError::UnexpectedToken(a), LarkError::UnexpectedToken(b))
                            if a.is_end() && b.is_end()
                    );
                    let same_state = snapshot == (ip.parser_state.state_stack.len(), ip.parser_state.position());
                    if end_twice && same_state {
                        return Err(e2);
                    }
                    err = e2;
                }
            }
        }
    }

    /// Interactive parser at the start of `lexer`'s input
    pub fn parse_interactive<'a>(&'a self, lexer: LexerThread<'a>, start: &str) -> Result<InteractiveParser<'a>, LarkError> {
        let state = self.initial_state(start)?;
        Ok(InteractiveParser::new(self, state, lexer))
    }
}

impl fmt::Debug for LalrParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LalrParser")
            .field("states", &self.table.len())
            .field("rules", &self.rules.len())
            .finish()
    }
}
