//! Lexer and parser selection
//!
//! A [`ParsingFrontend`] pairs one parsing algorithm with the lexer it runs
//! over, as chosen by [`LarkOptions`]:
//!
//! | parser | lexer |
//! |---|---|
//! | `lalr` | `contextual` (auto), `basic` |
//! | `earley` | `dynamic` (auto), `dynamic_complete`, `basic` |
//! | `cyk` | `basic` (auto) |

use hashbrown::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::LarkError;
use crate::grammar::{Rule, TerminalDef};
use crate::lark::{Ambiguity, LarkOptions, LexerKind, ParserKind};
use crate::lexer::{BasicLexer, ContextualLexer, Lexer, LexerConf, LexerThread, PostLex};
use crate::parse_tree_builder::ParseTreeBuilder;
use crate::parsers::cyk::CykParser;
use crate::parsers::earley::{EarleyOutput, EarleyParser, TermInfo};
use crate::parsers::earley_forest::Forest;
use crate::parsers::lalr_analysis::ParseTable;
use crate::parsers::lalr_interactive_parser::InteractiveParser;
use crate::parsers::lalr_parser::{LalrParser, OnError};
use crate::parsers::xearley::DynamicLexer;
use crate::tree::Child;

/// Parsing algorithm in use
#[derive(Debug, Clone)]
pub enum FrontendParser {
    /// LALR(1) tables
    Lalr(LalrParser),
    /// Earley chart parser
    Earley(EarleyParser),
    /// CYK over a CNF grammar
    Cyk(CykParser),
}

/// Lexer in use
#[derive(Debug)]
pub enum FrontendLexer {
    /// One scanner for the whole input
    Basic(BasicLexer),
    /// One scanner per LALR state
    Contextual(ContextualLexer),
    /// Scannerless Earley
    Dynamic(DynamicLexer),
}

/// Resolve `auto` and reject invalid parser/lexer pairs
pub fn resolve_lexer(parser: ParserKind, lexer: LexerKind) -> Result<LexerKind, LarkError> {
    use LexerKind::*;
    match (parser, lexer) {
        (ParserKind::Lalr, Auto) => Ok(Contextual),
        (ParserKind::Lalr, Basic | Contextual) => Ok(lexer),
        (ParserKind::Earley, Auto) => Ok(Dynamic),
        (ParserKind::Earley, Basic | Dynamic | DynamicComplete) => Ok(lexer),
        (ParserKind::Cyk, Auto | Basic) => Ok(Basic),
        (parser, lexer) => Err(LarkError::config(format!(
            "Parser '{}' does not support lexer '{}'",
            parser, lexer
        ))),
    }
}

/// A parser together with its lexer
pub struct ParsingFrontend {
    parser: FrontendParser,
    lexer: FrontendLexer,
    postlex: Option<Arc<dyn PostLex>>,
    start: Vec<String>,
}

impl ParsingFrontend {
    /// Build parser and lexer from compiled rules
    ///
    /// `table` skips LALR analysis when a serialized table is available.
    pub fn new(
        conf: &LexerConf,
        rules: &[Rule],
        options: &LarkOptions,
        table: Option<ParseTable>,
    ) -> Result<Self, LarkError> {
        let lexer_kind = resolve_lexer(options.parser, options.lexer)?;
        let explicit = matches!(options.ambiguity, Ambiguity::Explicit | Ambiguity::Forest);
        let builder = ParseTreeBuilder::new(
            rules,
            options.propagate_positions,
            options.parser == ParserKind::Earley && explicit,
            options.maybe_placeholders,
        );
        log_debug!(
            "Building {} parser with {} lexer ({} rules, {} terminals)",
            options.parser,
            lexer_kind,
            rules.len(),
            conf.terminals.len()
        );

        let (parser, lexer) = match options.parser {
            ParserKind::Lalr => {
                let parser = match table {
                    Some(table) => LalrParser::from_table(table, rules.to_vec(), builder),
                    None => LalrParser::new(rules, &options.start, options.strict, builder)?,
                };
                let lexer = match lexer_kind {
                    LexerKind::Contextual => {
                        FrontendLexer::Contextual(ContextualLexer::new(conf, &parser.table().state_accepts())?)
                    }
                    _ => FrontendLexer::Basic(BasicLexer::new(conf)?),
                };
                (FrontendParser::Lalr(parser), lexer)
            }
            ParserKind::Earley => {
                let terms: HashMap<String, TermInfo> = conf
                    .terminals
                    .iter()
                    .map(|t| {
                        let info = TermInfo {
                            priority: t.priority,
                            literal: t.pattern.is_str(),
                        };
                        (t.name.clone(), info)
                    })
                    .collect();
                let parser = EarleyParser::new(rules.to_vec(), &options.start, builder, options.ambiguity, terms)?;
                let lexer = match lexer_kind {
                    LexerKind::Basic => FrontendLexer::Basic(BasicLexer::new(conf)?),
                    kind => FrontendLexer::Dynamic(DynamicLexer::new(conf, kind == LexerKind::DynamicComplete)?),
                };
                (FrontendParser::Earley(parser), lexer)
            }
            ParserKind::Cyk => {
                let parser = CykParser::new(rules.to_vec(), builder)?;
                (FrontendParser::Cyk(parser), FrontendLexer::Basic(BasicLexer::new(conf)?))
            }
        };

        Ok(Self {
            parser,
            lexer,
            postlex: options.postlex.clone(),
            start: options.start.clone(),
        })
    }

    /// The parser
    pub fn parser(&self) -> &FrontendParser {
        &self.parser
    }

    /// The lexer
    pub fn lexer(&self) -> &FrontendLexer {
        &self.lexer
    }

    /// LALR table, if this is an LALR frontend
    pub fn table(&self) -> Option<&ParseTable> {
        match &self.parser {
            FrontendParser::Lalr(p) => Some(p.table()),
            _ => None,
        }
    }

    fn resolve_start<'s>(&'s self, start: Option<&'s str>) -> Result<&'s str, LarkError> {
        match start {
            Some(s) => {
                if self.start.iter().any(|x| x == s) {
                    Ok(s)
                } else {
                    Err(LarkError::config(format!(
                        "Unknown start rule {}. Must be one of {:?}",
                        s, self.start
                    )))
                }
            }
            None => match self.start.as_slice() {
                [only] => Ok(only),
                _ => Err(LarkError::config(format!(
                    "Lark initialized with more than 1 possible start rule. Must specify which start rule to parse: {:?}",
                    self.start
                ))),
            },
        }
    }

    fn token_lexer(&self) -> Result<&dyn Lexer, LarkError> {
        match &self.lexer {
            FrontendLexer::Basic(l) => Ok(l),
            FrontendLexer::Contextual(l) => Ok(l),
            FrontendLexer::Dynamic(_) => Err(LarkError::config(
                "The dynamic Earley lexer does not produce a token stream",
            )),
        }
    }

    fn lexer_thread<'a>(&'a self, text: &'a [u8]) -> Result<LexerThread<'a>, LarkError> {
        Ok(LexerThread::new(self.token_lexer()?, text, self.postlex.as_deref()))
    }

    fn run(&self, text: &[u8], start: &str) -> Result<EarleyOutput, LarkError> {
        match &self.parser {
            FrontendParser::Lalr(p) => Ok(EarleyOutput::Tree(p.parse(self.lexer_thread(text)?, start)?)),
            FrontendParser::Earley(p) => match &self.lexer {
                FrontendLexer::Dynamic(dynamic) => dynamic.parse(p, text, start),
                _ => p.parse(&mut self.lexer_thread(text)?, start),
            },
            FrontendParser::Cyk(p) => Ok(EarleyOutput::Tree(p.parse(&mut self.lexer_thread(text)?, start)?)),
        }
    }

    /// Parse `text` from `start` (the only start symbol when `None`)
    pub fn parse(&self, text: &[u8], start: Option<&str>) -> Result<Child, LarkError> {
        let start = self.resolve_start(start)?;
        match self.run(text, start)? {
            EarleyOutput::Tree(child) => Ok(child),
            EarleyOutput::Forest(_) => Err(LarkError::config(
                "ambiguity='forest' produces a forest; use parse_forest()",
            )),
        }
    }

    /// Parse `text` to a shared packed parse forest
    pub fn parse_forest(&self, text: &[u8], start: Option<&str>) -> Result<Forest, LarkError> {
        let start = self.resolve_start(start)?;
        match self.run(text, start)? {
            EarleyOutput::Forest(forest) => Ok(forest),
            EarleyOutput::Tree(_) => Err(LarkError::config(
                "parse_forest() requires parser='earley' and ambiguity='forest'",
            )),
        }
    }

    fn lalr(&self) -> Result<&LalrParser, LarkError> {
        match &self.parser {
            FrontendParser::Lalr(p) => Ok(p),
            _ => Err(LarkError::config("This operation is only supported by the LALR parser")),
        }
    }

    /// LALR parse with an error handler
    pub fn parse_with_recovery(
        &self,
        text: &[u8],
        start: Option<&str>,
        on_error: &mut OnError<'_>,
    ) -> Result<Child, LarkError> {
        let parser = self.lalr()?;
        let start = self.resolve_start(start)?;
        parser.parse_with_recovery(self.lexer_thread(text)?, start, on_error)
    }

    /// Step-wise LALR parser over `text`
    pub fn parse_interactive<'a>(&'a self, text: &'a [u8], start: Option<&'a str>) -> Result<InteractiveParser<'a>, LarkError> {
        let parser = self.lalr()?;
        let start = self.resolve_start(start)?;
        parser.parse_interactive(self.lexer_thread(text)?, start)
    }
}

impl fmt::Debug for ParsingFrontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsingFrontend")
            .field("parser", &self.parser)
            .field("lexer", &self.lexer)
            .field("postlex", &self.postlex)
            .field("start", &self.start)
            .finish()
    }
}

/// Terminal priorities adjusted for the `priority` option
pub fn apply_priority(
    mode: crate::lark::PriorityMode,
    terminals: &mut [TerminalDef],
    rules: &mut [Rule],
) {
    use crate::lark::PriorityMode;
    match mode {
        PriorityMode::Auto | PriorityMode::Normal => {}
        PriorityMode::Invert => {
            for rule in rules.iter_mut() {
                if let Some(p) = rule.options.priority {
                    rule.options.priority = Some(-p);
                }
            }
            for term in terminals.iter_mut() {
                term.priority = -term.priority;
            }
        }
        PriorityMode::None => {
            for rule in rules.iter_mut() {
                rule.options.priority = None;
            }
            for term in terminals.iter_mut() {
                term.priority = 0;
            }
        }
    }
}
