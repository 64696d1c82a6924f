//! Batch parsing
//!
//! A built [`Lark`] is immutable, so one instance can parse many independent
//! inputs at once. With the `parallel` feature the inputs are spread over
//! the rayon thread pool; without it they are parsed in order.
//!
//! ```rust,ignore
//! use lark::parallel::parse_batch;
//!
//! let results = parse_batch(&parser, &["[1]", "[2, 3]", "[oops"]);
//! assert!(results[2].is_err());
//! ```

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::LarkError;
use crate::lark::Lark;
use crate::tree::Tree;

/// Parse every input; results keep the input order
#[cfg(feature = "parallel")]
pub fn parse_batch(parser: &Lark, inputs: &[&str]) -> Vec<Result<Tree, LarkError>> {
    inputs.par_iter().map(|input| parser.parse(input)).collect()
}

/// Parse every input; results keep the input order
#[cfg(not(feature = "parallel"))]
pub fn parse_batch(parser: &Lark, inputs: &[&str]) -> Vec<Result<Tree, LarkError>> {
    inputs.iter().map(|input| parser.parse(input)).collect()
}

/// Owned-input variant of [`parse_batch`]
#[cfg(feature = "parallel")]
pub fn parse_batch_owned(parser: &Lark, inputs: Vec<String>) -> Vec<Result<Tree, LarkError>> {
    inputs.into_par_iter().map(|input| parser.parse(&input)).collect()
}

/// Owned-input variant of [`parse_batch`]
#[cfg(not(feature = "parallel"))]
pub fn parse_batch_owned(parser: &Lark, inputs: Vec<String>) -> Vec<Result<Tree, LarkError>> {
    inputs.into_iter().map(|input| parser.parse(&input)).collect()
}
