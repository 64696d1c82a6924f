//! Grammar loading
//!
//! Text in the Lark grammar language goes through these stages:
//!
//! 1. [`meta`] parses it with an LALR parser built for the meta-grammar
//! 2. [`ast`] turns the parse tree into typed statements
//! 3. [`builder`] applies directives, resolves imports and validates names
//! 4. [`compile`] produces terminal patterns and BNF rules, lowering EBNF
//!    through [`ebnf`]

pub mod ast;
pub mod builder;
pub mod compile;
pub mod ebnf;
pub mod literals;
pub mod loader;
pub mod meta;

use std::path::Path;
use std::sync::Arc;

use crate::error::LarkError;

pub use builder::{Grammar, GrammarBuilder, SymbolDef};
pub use compile::CompiledGrammar;
pub use loader::{FsLoader, LoadedGrammar, Loader, MemoryLoader, StdlibLoader};

/// Load a grammar in one go
///
/// `base` is the directory relative imports are resolved against.
pub fn load_grammar(
    text: &str,
    source: &str,
    base: Option<&Path>,
    loaders: Vec<Arc<dyn Loader>>,
    keep_all_tokens: bool,
) -> Result<Grammar, LarkError> {
    let mut builder = GrammarBuilder::new(keep_all_tokens, loaders);
    builder.load_grammar(text, source, base)?;
    builder.build()
}
