//! Parsing algorithms
//!
//! ## Analysis
//! - [`grammar_analysis`] - FIRST/FOLLOW/NULLABLE and rule expansion
//! - [`lalr_analysis`] - LR(0) item sets and LALR(1) lookaheads
//!
//! ## LALR
//! - [`lalr_parser`] - table-driven runtime with error recovery
//! - [`lalr_interactive_parser`] - step-wise parsing
//!
//! ## Earley
//! - [`earley_common`] - items and columns
//! - [`earley`] - chart loop over a token stream
//! - [`xearley`] - chart loop with a dynamic lexer
//! - [`earley_forest`] - shared packed parse forest
//!
//! ## CYK
//! - [`cyk`] - table parsing over a normal-form grammar

pub mod cyk;
pub mod earley;
pub mod earley_common;
pub mod earley_forest;
pub mod grammar_analysis;
pub mod lalr_analysis;
pub mod lalr_interactive_parser;
pub mod lalr_parser;
pub mod xearley;

pub use earley::{EarleyOutput, EarleyParser, TermInfo};
pub use earley_forest::{Forest, ForestNode, NodeId, NodeKind, PackedNode};
pub use lalr_analysis::{Action, ParseTable};
pub use lalr_interactive_parser::InteractiveParser;
pub use lalr_parser::{LalrParser, ParserState};
