//! Lark - grammar compiler and LALR(1)/Earley parsing toolkit
//!
//! Grammars are written in an EBNF dialect with templates, imports,
//! priorities, inline rules and aliases. They are compiled into a set of BNF
//! rules and terminal patterns and then run by one of three parsers:
//! - LALR(1) with a contextual lexer, for deterministic grammars
//! - Earley, scannerless or over tokens, for any context-free grammar, with
//!   a shared packed parse forest and ambiguity resolution
//! - CYK over a normal-form conversion of the grammar
//!
//! Parse results are [`Tree`]s, reshaped with a [`Transformer`],
//! [`Visitor`] or [`Interpreter`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lark::prelude::*;
//!
//! let parser = Lark::new(
//!     r#"
//!     start: "[" [NUMBER ("," NUMBER)*] "]"
//!     %import common.NUMBER
//!     %ignore " "
//!     "#,
//!     LarkOptions::default().parser(ParserKind::Lalr),
//! )?;
//!
//! let tree = parser.parse("[1, 2, 3]")?;
//! println!("{}", tree.pretty("  "));
//! ```
//!
//! ## Feature Flags
//!
//! - `logging` (default) - Diagnostics through the `log` crate, target `lark`
//! - `parallel` - [`parallel::parse_batch`] on the rayon thread pool

// Lint configuration for production quality
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]
#![allow(clippy::module_inception)]
#![allow(clippy::redundant_closure)]

#[macro_use]
mod logging;

pub mod cache;
pub mod error;
pub mod grammar;
pub mod indenter;
pub mod lark;
pub mod lexer;
pub mod load_grammar;
pub mod parallel;
pub mod parse_tree_builder;
pub mod parser_frontends;
pub mod parsers;
pub mod prelude;
pub mod regex_backend;
pub mod serialize;
pub mod source_location;
pub mod token;
pub mod tree;
pub mod visitors;

/// Re-export commonly used types for convenience
pub use cache::CacheSetting;
pub use error::{
    GrammarError, LarkError, UnexpectedCharacters, UnexpectedEof, UnexpectedInput, UnexpectedToken, VisitError,
};
pub use grammar::{Pattern, Rule, RuleOptions, Symbol, TerminalDef, TOKEN_DEFAULT_PRIORITY};
pub use indenter::{Indenter, IndenterConfig};
pub use lark::{Ambiguity, Lark, LarkOptions, LexerKind, ParserKind, PriorityMode, VERSION};
pub use lexer::{PostLex, PostLexProcess};
pub use load_grammar::ebnf::{REPEAT_BREAK_THRESHOLD, SMALL_FACTOR_THRESHOLD};
pub use load_grammar::{FsLoader, Loader, MemoryLoader};
pub use parsers::{Forest, InteractiveParser};
pub use regex_backend::{DefaultBackend, RegexBackend, GROUP_LIMIT};
pub use serialize::LoadOverrides;
pub use token::Token;
pub use tree::{Child, Meta, Tree};
pub use visitors::{Interpreter, Outcome, Transformer, VArgs, Value, Visitor};

/// Crate version (`__version__` in saved parsers)
pub fn version() -> &'static str {
    VERSION
}
