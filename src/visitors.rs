//! Tree walkers
//!
//! Three ways to process a finished [`Tree`]:
//!
//! - [`Transformer`]: bottom-up; each rule callback receives its already
//!   transformed children and returns the replacement value. Callbacks can
//!   drop a node from its parent by returning [`Outcome::Discard`].
//! - [`Visitor`]: bottom-up or top-down side effects; the tree is unchanged.
//! - [`Interpreter`]: top-down; callbacks decide whether and when to descend
//!   through [`Interpreter::visit_children`].
//!
//! Callbacks are registered by rule name; unregistered rules fall back to a
//! default handler that rebuilds the node.
//!
//! # Example
//!
//! ```rust
//! use lark::visitors::{Transformer, Value};
//! use lark::{Child, Token, Tree};
//!
//! let tree = Tree::new("add", vec![
//!     Child::Token(Token::new("NUMBER", "1")),
//!     Child::Token(Token::new("NUMBER", "2")),
//! ]);
//!
//! let calc = Transformer::<Value>::new()
//!     .visit_tokens(true)
//!     .token("NUMBER", |t| Ok(Value::int(t.value.parse().unwrap_or(0))))
//!     .rule("add", |args| {
//!         Ok(Value::int(args.iter().filter_map(Value::as_int).sum()))
//!     });
//!
//! assert_eq!(calc.transform(tree).unwrap(), Value::int(3));
//! ```

use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{LarkError, VisitError};
use crate::token::Token;
use crate::tree::{Child, Meta, Tree};

/// Result of a callback: keep a value or drop the node from its parent
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// Use this value
    Keep(T),
    /// Remove the node
    Discard,
}

impl<T> Outcome<T> {
    /// The kept value, if any
    pub fn keep(self) -> Option<T> {
        match self {
            Outcome::Keep(v) => Some(v),
            Outcome::Discard => None,
        }
    }
}

impl<T> From<T> for Outcome<T> {
    fn from(v: T) -> Self {
        Outcome::Keep(v)
    }
}

/// Error returned from walker callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum TransformError {
    /// Child had an unexpected shape
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name found
        actual: String,
    },
    /// Wrong number of children
    Arity {
        /// Expected count
        expected: usize,
        /// Actual count
        actual: usize,
    },
    /// Custom error
    Custom(String),
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::TypeMismatch { expected, actual } => {
                write!(f, "Type mismatch: expected {}, got {}", expected, actual)
            }
            TransformError::Arity { expected, actual } => write!(
                f,
                "callback takes {} arguments but {} were given",
                expected, actual
            ),
            TransformError::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for TransformError {}

impl From<String> for TransformError {
    fn from(s: String) -> Self {
        TransformError::Custom(s)
    }
}

impl From<&str> for TransformError {
    fn from(s: &str) -> Self {
        TransformError::Custom(s.to_string())
    }
}

/// Callback result
pub type CallbackResult<T> = Result<Outcome<T>, TransformError>;

/// Values a [`Transformer`] or [`Interpreter`] can produce
///
/// Defines what unhandled nodes, tokens and placeholders turn into.
pub trait TreeValue: Sized {
    /// Value for a token with no token callback
    fn from_token(token: Token) -> Self;

    /// Value for an unmatched `[..]`
    fn placeholder() -> Self;

    /// Value for a rule with no callback
    fn from_node(data: String, children: Vec<Self>, meta: Meta) -> Self;
}

impl TreeValue for Child {
    fn from_token(token: Token) -> Self {
        Child::Token(token)
    }

    fn placeholder() -> Self {
        Child::Placeholder
    }

    fn from_node(data: String, children: Vec<Self>, meta: Meta) -> Self {
        Child::Tree(Tree::with_meta(data, children, meta))
    }
}

/// Dynamically typed transformation target
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Null value (also used for placeholders)
    #[default]
    Nil,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// String value
    String(String),
    /// Array of values
    Array(Vec<Value>),
    /// Key-value pairs
    Hash(BTreeMap<String, Value>),
    /// Untransformed token
    Token(Token),
    /// Untransformed rule node with transformed children
    Node(String, Vec<Value>),
}

impl Value {
    /// Create an integer value
    pub fn int(n: i64) -> Self {
        Value::Int(n)
    }

    /// Create a float value
    pub fn float(f: f64) -> Self {
        Value::Float(f)
    }

    /// Create a string value
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Create an array value
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(items)
    }

    /// Create a hash value
    pub fn hash(pairs: Vec<(impl Into<String>, Value)>) -> Self {
        Value::Hash(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Check if this is nil
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as float; integers convert
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get as string slice; tokens yield their text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Token(t) => Some(&t.value),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get a hash value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Hash(h) => h.get(key),
            _ => None,
        }
    }
}

impl TreeValue for Value {
    fn from_token(token: Token) -> Self {
        Value::Token(token)
    }

    fn placeholder() -> Self {
        Value::Nil
    }

    fn from_node(data: String, children: Vec<Self>, _meta: Meta) -> Self {
        Value::Node(data, children)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Token(t) => write!(f, "{}", t.repr()),
            Value::Array(items) | Value::Node(_, items) => {
                if let Value::Node(name, _) = self {
                    write!(f, "{}", name)?;
                }
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Hash(h) => {
                write!(f, "{{")?;
                for (i, (k, v)) in h.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Arguments of a [`VArgs::Tree`] callback
#[derive(Debug, Clone)]
pub struct TreeArgs<T> {
    /// Rule name
    pub data: String,
    /// Transformed children
    pub children: Vec<T>,
    /// Span of the original node
    pub meta: Meta,
}

/// How a rule callback receives its arguments
pub enum VArgs<T> {
    /// Children as a list (the default)
    List(Box<dyn Fn(Vec<T>) -> CallbackResult<T> + Send + Sync>),
    /// Children as positional arguments; the count must equal `arity`
    Inline {
        /// Number of arguments the callback takes
        arity: usize,
        /// The callback
        f: Box<dyn Fn(Vec<T>) -> CallbackResult<T> + Send + Sync>,
    },
    /// Node span followed by the children
    Meta(Box<dyn Fn(&Meta, Vec<T>) -> CallbackResult<T> + Send + Sync>),
    /// The whole node with transformed children
    Tree(Box<dyn Fn(TreeArgs<T>) -> CallbackResult<T> + Send + Sync>),
}

impl<T> VArgs<T> {
    fn call(&self, data: &str, children: Vec<T>, meta: &Meta) -> CallbackResult<T> {
        match self {
            VArgs::List(f) => f(children),
            VArgs::Inline { arity, f } => {
                if children.len() != *arity {
                    return Err(TransformError::Arity {
                        expected: *arity,
                        actual: children.len(),
                    });
                }
                f(children)
            }
            VArgs::Meta(f) => f(meta, children),
            VArgs::Tree(f) => f(TreeArgs {
                data: data.to_string(),
                children,
                meta: *meta,
            }),
        }
    }
}

impl<T> fmt::Debug for VArgs<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VArgs::List(_) => write!(f, "VArgs::List"),
            VArgs::Inline { arity, .. } => write!(f, "VArgs::Inline({})", arity),
            VArgs::Meta(_) => write!(f, "VArgs::Meta"),
            VArgs::Tree(_) => write!(f, "VArgs::Tree"),
        }
    }
}

type TokenFn<T> = Box<dyn Fn(Token) -> CallbackResult<T> + Send + Sync>;
type DefaultFn<T> = Box<dyn Fn(TreeArgs<T>) -> CallbackResult<T> + Send + Sync>;

/// Bottom-up tree transformer
///
/// The walk is iterative, so arbitrarily deep trees are safe.
pub struct Transformer<T> {
    rules: HashMap<String, VArgs<T>>,
    tokens: HashMap<String, TokenFn<T>>,
    default: Option<DefaultFn<T>>,
    visit_tokens: bool,
}

enum Frame {
    Enter(Tree),
    Exit { data: String, meta: Meta, arity: usize },
    Token(Token),
    Placeholder,
}

impl<T: TreeValue> Transformer<T> {
    /// Transformer with no callbacks; token callbacks are enabled
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
            tokens: HashMap::new(),
            default: None,
            visit_tokens: true,
        }
    }

    /// Whether token callbacks run
    pub fn visit_tokens(mut self, on: bool) -> Self {
        self.visit_tokens = on;
        self
    }

    /// Callback receiving the children as a list
    pub fn rule<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(Vec<T>) -> Result<T, TransformError> + Send + Sync + 'static,
    {
        self.rule_with(name, VArgs::List(Box::new(move |c| f(c).map(Outcome::Keep))))
    }

    /// Callback that may discard its node
    pub fn rule_outcome<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(Vec<T>) -> CallbackResult<T> + Send + Sync + 'static,
    {
        self.rule_with(name, VArgs::List(Box::new(f)))
    }

    /// Callback with an explicit argument convention
    pub fn rule_with(mut self, name: &str, args: VArgs<T>) -> Self {
        self.rules.insert(name.to_string(), args);
        self
    }

    /// Callback for tokens of one terminal
    pub fn token<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Token) -> Result<T, TransformError> + Send + Sync + 'static,
    {
        self.tokens
            .insert(name.to_string(), Box::new(move |t| f(t).map(Outcome::Keep)));
        self
    }

    /// Token callback that may discard the token
    pub fn token_outcome<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Token) -> CallbackResult<T> + Send + Sync + 'static,
    {
        self.tokens.insert(name.to_string(), Box::new(f));
        self
    }

    /// Callback for rules without a registered callback
    pub fn default_rule<F>(mut self, f: F) -> Self
    where
        F: Fn(TreeArgs<T>) -> CallbackResult<T> + Send + Sync + 'static,
    {
        self.default = Some(Box::new(f));
        self
    }

    /// True if a callback is registered for `name`
    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Transform a tree
    ///
    /// Fails with a [`VisitError`] when a callback fails or the root itself
    /// is discarded.
    pub fn transform(&self, tree: Tree) -> Result<T, LarkError> {
        let root = tree.data.clone();
        let mut values: Vec<Option<T>> = Vec::new();
        let mut stack = vec![Frame::Enter(tree)];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(tree) => {
                    stack.push(Frame::Exit {
                        data: tree.data,
                        meta: tree.meta,
                        arity: tree.children.len(),
                    });
                    for child in tree.children.into_iter().rev() {
                        stack.push(match child {
                            Child::Tree(t) => Frame::Enter(t),
                            Child::Token(t) => Frame::Token(t),
                            Child::Placeholder => Frame::Placeholder,
                        });
                    }
                }
                Frame::Token(tok) => values.push(self.call_token(tok)?),
                Frame::Placeholder => values.push(Some(T::placeholder())),
                Frame::Exit { data, meta, arity } => {
                    let start = values.len().saturating_sub(arity);
                    let children: Vec<T> = values.drain(start..).flatten().collect();
                    values.push(self.call_rule(data, children, meta)?);
                }
            }
        }

        match values.pop().flatten() {
            Some(v) => Ok(v),
            None => Err(LarkError::Visit(VisitError::new(root, "the root node was discarded"))),
        }
    }

    fn call_token(&self, tok: Token) -> Result<Option<T>, LarkError> {
        if self.visit_tokens {
            if let Some(f) = self.tokens.get(&tok.kind) {
                let kind = tok.kind.clone();
                return f(tok)
                    .map(Outcome::keep)
                    .map_err(|e| LarkError::Visit(VisitError::wrap(kind, Box::new(e))));
            }
        }
        Ok(Some(T::from_token(tok)))
    }

    fn call_rule(&self, data: String, children: Vec<T>, meta: Meta) -> Result<Option<T>, LarkError> {
        let result = match self.rules.get(&data) {
            Some(handler) => handler.call(&data, children, &meta),
            None => match &self.default {
                Some(f) => f(TreeArgs {
                    data: data.clone(),
                    children,
                    meta,
                }),
                None => return Ok(Some(T::from_node(data, children, meta))),
            },
        };
        result
            .map(Outcome::keep)
            .map_err(|e| LarkError::Visit(VisitError::wrap(data, Box::new(e))))
    }
}

impl Transformer<Child> {
    /// Transform `tree` and store the result back into it
    ///
    /// The root must transform into a tree.
    pub fn transform_in_place(&self, tree: &mut Tree) -> Result<(), LarkError> {
        let taken = std::mem::replace(tree, Tree::new(String::new(), Vec::new()));
        let data = taken.data.clone();
        match self.transform(taken)? {
            Child::Tree(t) => {
                *tree = t;
                Ok(())
            }
            _ => Err(LarkError::Visit(VisitError::new(
                data,
                "in-place transform must produce a tree at the root",
            ))),
        }
    }
}

impl<T: TreeValue> Default for Transformer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Transformer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .field("tokens", &self.tokens.keys().collect::<Vec<_>>())
            .field("visit_tokens", &self.visit_tokens)
            .finish()
    }
}

type VisitFn<'a> = Box<dyn FnMut(&Tree) + 'a>;

/// Side-effect walker
pub struct Visitor<'a> {
    handlers: HashMap<String, VisitFn<'a>>,
    default: Option<VisitFn<'a>>,
}

impl<'a> Visitor<'a> {
    /// Visitor with no handlers
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            default: None,
        }
    }

    /// Handler for nodes named `name`
    pub fn rule<F>(mut self, name: &str, f: F) -> Self
    where
        F: FnMut(&Tree) + 'a,
    {
        self.handlers.insert(name.to_string(), Box::new(f));
        self
    }

    /// Handler for all other nodes
    pub fn default_rule<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Tree) + 'a,
    {
        self.default = Some(Box::new(f));
        self
    }

    fn call(&mut self, tree: &Tree) {
        if let Some(h) = self.handlers.get_mut(&tree.data) {
            h(tree);
        } else if let Some(d) = self.default.as_mut() {
            d(tree);
        }
    }

    /// Visit every sub-tree, children before parents
    pub fn visit(&mut self, tree: &Tree) {
        for sub in tree.iter_subtrees() {
            self.call(sub);
        }
    }

    /// Visit every sub-tree, parents before children
    pub fn visit_topdown(&mut self, tree: &Tree) {
        for sub in tree.iter_subtrees_topdown() {
            self.call(sub);
        }
    }
}

impl Default for Visitor<'_> {
    fn default() -> Self {
        Self::new()
    }
}

type InterpretFn<'a, T> = Box<dyn Fn(&Interpreter<'a, T>, &Tree) -> Result<T, LarkError> + 'a>;

/// Top-down walker whose callbacks control the descent
pub struct Interpreter<'a, T> {
    handlers: HashMap<String, InterpretFn<'a, T>>,
}

impl<'a, T: TreeValue> Interpreter<'a, T> {
    /// Interpreter with no handlers
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Handler for nodes named `name`
    pub fn rule<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Interpreter<'a, T>, &Tree) -> Result<T, LarkError> + 'a,
    {
        self.handlers.insert(name.to_string(), Box::new(f));
        self
    }

    /// Run the handler for `tree`; without one, visit the children
    pub fn visit(&self, tree: &Tree) -> Result<T, LarkError> {
        match self.handlers.get(&tree.data) {
            Some(h) => h(self, tree),
            None => {
                let children = self.visit_children(tree)?;
                Ok(T::from_node(tree.data.clone(), children, tree.meta))
            }
        }
    }

    /// Visit every child of `tree`
    pub fn visit_children(&self, tree: &Tree) -> Result<Vec<T>, LarkError> {
        tree.children
            .iter()
            .map(|child| match child {
                Child::Tree(t) => self.visit(t),
                Child::Token(t) => Ok(T::from_token(t.clone())),
                Child::Placeholder => Ok(T::placeholder()),
            })
            .collect()
    }
}

impl<T: TreeValue> Default for Interpreter<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}
