//! Prelude module for convenient imports
//!
//! ```
//! use lark::prelude::*;
//! ```
//!
//! # Re-exported Items
//!
//! ## Building parsers
//! - [`Lark`], [`LarkOptions`] and the option enums
//! - [`CacheSetting`], [`LoadOverrides`]
//! - [`MemoryLoader`], [`FsLoader`] for `%import`
//!
//! ## Results
//! - [`Tree`], [`Child`], [`Token`]
//!
//! ## Errors
//! - [`LarkError`] and its payloads
//!
//! ## Walkers
//! - [`Transformer`], [`Visitor`], [`Interpreter`], [`Outcome`], [`VArgs`]

// ============================================================================
// Building parsers
// ============================================================================

pub use crate::cache::CacheSetting;
pub use crate::lark::{Ambiguity, Lark, LarkOptions, LexerKind, ParserKind, PriorityMode};
pub use crate::load_grammar::{FsLoader, Loader, MemoryLoader};
pub use crate::serialize::LoadOverrides;

// ============================================================================
// Results
// ============================================================================

pub use crate::parsers::{Forest, InteractiveParser};
pub use crate::token::Token;
pub use crate::tree::{Child, Meta, Tree};

// ============================================================================
// Post-lexing
// ============================================================================

pub use crate::indenter::{Indenter, IndenterConfig};
pub use crate::lexer::PostLex;

// ============================================================================
// Error Handling
// ============================================================================

pub use crate::error::{GrammarError, LarkError, UnexpectedCharacters, UnexpectedEof, UnexpectedToken, VisitError};

// ============================================================================
// Walkers
// ============================================================================

pub use crate::visitors::{Interpreter, Outcome, Transformer, VArgs, Value, Visitor};
