//! Step-wise LALR parsing
//!
//! An [`InteractiveParser`] owns the parser stacks and the lexer of one
//! parse. Error-recovery callbacks receive it mutably and may feed tokens,
//! skip input or inspect the choices of the current state before the parse
//! resumes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::LarkError;
use crate::parsers::grammar_analysis::END;
use crate::parsers::lalr_analysis::Action;
use crate::parsers::lalr_parser::{LalrParser, ParserState};
use crate::lexer::LexerThread;
use crate::source_location::SourcePosition;
use crate::token::Token;
use crate::tree::Child;

/// LALR parser paused between tokens
#[derive(Clone)]
pub struct InteractiveParser<'a> {
    parser: &'a LalrParser,
    /// Parser stacks
    pub parser_state: ParserState,
    /// Lexer over the remaining input
    pub lexer_thread: LexerThread<'a>,
    /// Value of the accepted parse, once `$END` was fed successfully
    pub result: Option<Child>,
}

impl<'a> InteractiveParser<'a> {
    /// Wrap existing stacks and lexer
    pub fn new(parser: &'a LalrParser, parser_state: ParserState, lexer_thread: LexerThread<'a>) -> Self {
        Self {
            parser,
            parser_state,
            lexer_thread,
            result: None,
        }
    }

    /// Feed one token
    ///
    /// A token of type `$END` finishes the parse; its value is returned and
    /// kept in [`result`](Self::result).
    pub fn feed_token(&mut self, token: Token) -> Result<Option<Child>, LarkError> {
        let is_end = token.kind == END;
        let out = self.parser.feed_token(&mut self.parser_state, token, is_end)?;
        if out.is_some() {
            self.result = out.clone();
        }
        Ok(out)
    }

    /// Feed every remaining token of the lexer, without `$END`
    ///
    /// Returns the tokens fed.
    pub fn exhaust_lexer(&mut self) -> Result<Vec<Token>, LarkError> {
        let mut fed = Vec::new();
        while let Some(token) = self.lexer_thread.next_token(Some(self.parser_state.position()))? {
            fed.push(token.clone());
            self.feed_token(token)?;
        }
        Ok(fed)
    }

    /// Feed `$END`, positioned after `last_token` when given
    pub fn feed_eof(&mut self, last_token: Option<&Token>) -> Result<Option<Child>, LarkError> {
        let last = last_token.or(self.lexer_thread.state.last_token.as_ref());
        let end = match last {
            Some(tok) => Token::new_borrow_pos(END, "", tok),
            None => Token::with_span(END, "", SourcePosition::start(), SourcePosition::start()),
        };
        self.feed_token(end)
    }

    /// Independent copy; feeding it leaves `self` untouched
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Actions of the current state, keyed by symbol name
    ///
    /// Non-terminal transitions are listed as shifts.
    pub fn choices(&self) -> BTreeMap<String, Action> {
        let top = self.parser_state.position();
        let table = self.parser.table();
        let mut out: BTreeMap<String, Action> = BTreeMap::new();
        if let Some(actions) = table.states.get(top) {
            out.extend(actions.iter().map(|(k, v)| (k.clone(), *v)));
        }
        if let Some(gotos) = table.goto.get(top) {
            out.extend(gotos.iter().map(|(k, v)| (k.clone(), Action::Shift(*v))));
        }
        out
    }

    /// Terminals that can be fed next without an error
    pub fn accepts(&self) -> BTreeSet<String> {
        let top = self.parser_state.position();
        let Some(actions) = self.parser.table().states.get(top) else {
            return BTreeSet::new();
        };
        actions
            .keys()
            .filter(|t| self.parser.can_feed(&self.parser_state, t))
            .cloned()
            .collect()
    }

    /// Continue from the current state to the end of input
    pub fn resume_parse(&mut self) -> Result<Child, LarkError> {
        let out = self
            .parser
            .parse_from_state(&mut self.parser_state, &mut self.lexer_thread)?;
        self.result = Some(out.clone());
        Ok(out)
    }

    /// Byte offset of the lexer
    pub fn lexer_position(&self) -> usize {
        self.lexer_thread.position()
    }

    /// Advance the lexer over `n` characters
    pub fn skip_chars(&mut self, n: usize) {
        self.lexer_thread.state.skip(n);
    }

    /// Choices and stack size, one per line
    pub fn pretty(&self) -> String {
        let mut out = String::from("Parser choices:\n");
        for (k, v) in self.choices() {
            out.push_str(&format!("\t- {} -> {}\n", k, v));
        }
        out.push_str(&format!("stack size: {}", self.parser_state.state_stack.len()));
        out
    }
}

impl PartialEq for InteractiveParser<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.parser_state == other.parser_state
    }
}

impl fmt::Debug for InteractiveParser<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractiveParser")
            .field("state_stack", &self.parser_state.state_stack)
            .field("lexer_position", &self.lexer_position())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Pattern, Rule, Symbol, TerminalDef};
    use crate::lexer::{BasicLexer, LexerConf};
    use crate::parse_tree_builder::ParseTreeBuilder;
    use crate::regex_backend::DefaultBackend;
    use std::sync::Arc;

    // start: start PLUS NUM | NUM
    fn sum_parser() -> (LalrParser, BasicLexer) {
        let rules = vec![
            Rule::new(
                Symbol::nonterminal("start"),
                vec![
                    Symbol::nonterminal("start"),
                    Symbol::terminal_filtered("PLUS", true),
                    Symbol::terminal("NUM"),
                ],
            ),
            Rule::new(Symbol::nonterminal("start"), vec![Symbol::terminal("NUM")]),
        ];
        let builder = ParseTreeBuilder::new(&rules, false, false, false);
        let parser = LalrParser::new(&rules, &["start".to_string()], true, builder).unwrap();
        let conf = LexerConf::new(
            vec![
                TerminalDef::new("NUM", Pattern::regex("[0-9]+", "")),
                TerminalDef::new("PLUS", Pattern::string("+", "")),
            ],
            vec![],
            Arc::new(DefaultBackend::new()),
        );
        (parser, BasicLexer::new(&conf).unwrap())
    }

    #[test]
    fn test_feed_tokens_by_hand() {
        let (parser, lexer) = sum_parser();
        let mut ip = parser
            .parse_interactive(LexerThread::new(&lexer, b"", None), "start")
            .unwrap();
        assert_eq!(ip.feed_token(Token::new("NUM", "1")).unwrap(), None);
        assert_eq!(ip.feed_token(Token::new("PLUS", "+")).unwrap(), None);
        assert_eq!(ip.feed_token(Token::new("NUM", "2")).unwrap(), None);
        let out = ip.feed_eof(None).unwrap();
        assert!(out.is_some());
        assert_eq!(ip.result, out);
    }

    #[test]
    fn test_accepts() {
        let (parser, lexer) = sum_parser();
        let mut ip = parser
            .parse_interactive(LexerThread::new(&lexer, b"1", None), "start")
            .unwrap();
        let expected: BTreeSet<String> = ["NUM".to_string()].into_iter().collect();
        assert_eq!(ip.accepts(), expected);
        ip.exhaust_lexer().unwrap();
        let expected: BTreeSet<String> = ["$END".to_string(), "PLUS".to_string()].into_iter().collect();
        assert_eq!(ip.accepts(), expected);
    }

    #[test]
    fn test_copy_is_independent() {
        let (parser, lexer) = sum_parser();
        let mut ip = parser
            .parse_interactive(LexerThread::new(&lexer, b"1+2", None), "start")
            .unwrap();
        let snapshot = ip.copy();
        assert_eq!(ip, snapshot);
        ip.exhaust_lexer().unwrap();
        assert_ne!(ip, snapshot);
        assert_eq!(snapshot.lexer_position(), 0);
        assert_eq!(ip.lexer_position(), 3);
    }

    #[test]
    fn test_choices_and_pretty() {
        let (parser, lexer) = sum_parser();
        let ip = parser
            .parse_interactive(LexerThread::new(&lexer, b"", None), "start")
            .unwrap();
        let choices = ip.choices();
        assert!(matches!(choices.get("NUM"), Some(Action::Shift(_))));
        assert!(matches!(choices.get("start"), Some(Action::Shift(_))));
        let pretty = ip.pretty();
        assert!(pretty.starts_with("Parser choices:\n"));
        assert!(pretty.ends_with("stack size: 1"));
    }

    #[test]
    fn test_skip_chars_then_resume() {
        let (parser, lexer) = sum_parser();
        let mut ip = parser
            .parse_interactive(LexerThread::new(&lexer, b"?1", None), "start")
            .unwrap();
        ip.skip_chars(1);
        assert_eq!(ip.lexer_position(), 1);
        assert!(ip.resume_parse().is_ok());
    }
}
