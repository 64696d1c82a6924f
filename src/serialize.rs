//! Saving and loading built parsers
//!
//! The JSON layout is
//!
//! ```json
//! {"data": {...}, "memo": [...], "__version__": "0.1.0", "options": {...}}
//! ```
//!
//! `memo` holds every rule and terminal once; `data` refers to them by
//! index and carries the LALR table, so loading skips both the grammar
//! compiler and the LALR analysis. A file written by another crate version
//! is rejected.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::LarkError;
use crate::grammar::{Rule, TerminalDef};
use crate::lark::{Lark, LarkOptions, VERSION};
use crate::lexer::{LexerCallback, PostLex};
use crate::parsers::lalr_analysis::ParseTable;
use crate::regex_backend::RegexBackend;
use crate::token::Token;
use crate::visitors::Outcome;

/// Options that may differ between [`Lark::save`] and [`Lark::load`]
pub const LOAD_ALLOWED_OPTIONS: &[&str] = &[
    "postlex",
    "transformer",
    "lexer_callbacks",
    "use_bytes",
    "debug",
    "g_regex_flags",
    "regex",
    "propagate_positions",
    "tree_class",
];

/// A shared object referenced from `data`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "__type__")]
pub enum MemoEntry {
    /// A BNF rule
    Rule(Rule),
    /// A terminal
    TerminalDef(TerminalDef),
}

/// Parser payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserData {
    /// Memo indices of the rules, in rule-id order
    pub rules: Vec<usize>,
    /// Memo indices of the terminals
    pub terminals: Vec<usize>,
    /// Ignored terminal names
    pub ignore: Vec<String>,
    /// LALR table, absent for other parsers
    pub parse_table: Option<ParseTable>,
    /// Regex backend the terminals were compiled for
    pub regex: String,
}

/// Top-level saved form of a [`Lark`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedLark {
    /// Parser payload
    pub data: ParserData,
    /// Shared rules and terminals
    pub memo: Vec<MemoEntry>,
    /// Crate version that wrote the file
    #[serde(rename = "__version__")]
    pub version: String,
    /// Options, minus the ones that cannot be serialized
    pub options: LarkOptions,
}

impl SerializedLark {
    /// Snapshot a parser
    pub fn from_lark(lark: &Lark) -> Self {
        let mut memo = Vec::with_capacity(lark.rules().len() + lark.terminals().len());
        let mut rules = Vec::with_capacity(lark.rules().len());
        for rule in lark.rules() {
            rules.push(memo.len());
            memo.push(MemoEntry::Rule(rule.clone()));
        }
        let mut terminals = Vec::with_capacity(lark.terminals().len());
        for term in lark.terminals() {
            terminals.push(memo.len());
            memo.push(MemoEntry::TerminalDef(term.clone()));
        }
        Self {
            data: ParserData {
                rules,
                terminals,
                ignore: lark.ignore_tokens().to_vec(),
                parse_table: lark.frontend().table().cloned(),
                regex: lark.options().backend().name().to_string(),
            },
            memo,
            version: VERSION.to_string(),
            options: lark.options().clone(),
        }
    }

    /// Encode as JSON
    pub fn to_json(&self) -> Result<String, LarkError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode JSON written by [`SerializedLark::to_json`]
    pub fn from_json(json: &str) -> Result<Self, LarkError> {
        let saved: SerializedLark = serde_json::from_str(json)?;
        if saved.version != VERSION {
            return Err(LarkError::config(format!(
                "Serialized parser was written by version {}, this is version {}",
                saved.version, VERSION
            )));
        }
        Ok(saved)
    }

    fn rule(&self, index: usize) -> Result<Rule, LarkError> {
        match self.memo.get(index) {
            Some(MemoEntry::Rule(rule)) => Ok(rule.clone()),
            _ => Err(LarkError::config(format!("Bad memo reference {} (expected a rule)", index))),
        }
    }

    fn terminal(&self, index: usize) -> Result<TerminalDef, LarkError> {
        match self.memo.get(index) {
            Some(MemoEntry::TerminalDef(term)) => Ok(term.clone()),
            _ => Err(LarkError::config(format!("Bad memo reference {} (expected a terminal)", index))),
        }
    }

    /// Rebuild the parser with `options`
    pub fn into_lark(self, options: LarkOptions) -> Result<Lark, LarkError> {
        let rules = self
            .data
            .rules
            .iter()
            .map(|&i| self.rule(i))
            .collect::<Result<Vec<_>, _>>()?;
        let terminals = self
            .data
            .terminals
            .iter()
            .map(|&i| self.terminal(i))
            .collect::<Result<Vec<_>, _>>()?;
        let backend = options.backend();
        if backend.name() != self.data.regex {
            log_debug!(
                "Loading a parser saved for regex backend {} into {}",
                self.data.regex,
                backend.name()
            );
        }
        Lark::from_parts(terminals, rules, self.data.ignore, options, self.data.parse_table)
    }
}

/// Options to replace when loading a saved parser
#[derive(Default, Clone)]
pub struct LoadOverrides {
    postlex: Option<Arc<dyn PostLex>>,
    regex: Option<Arc<dyn RegexBackend>>,
    lexer_callbacks: HashMap<String, LexerCallback>,
    use_bytes: Option<bool>,
    debug: Option<bool>,
    g_regex_flags: Option<String>,
    propagate_positions: Option<bool>,
}

impl LoadOverrides {
    /// No overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a post-lexer
    pub fn postlex(mut self, postlex: Arc<dyn PostLex>) -> Self {
        self.postlex = Some(postlex);
        self
    }

    /// Use a different regex engine
    pub fn regex(mut self, backend: Arc<dyn RegexBackend>) -> Self {
        self.regex = Some(backend);
        self
    }

    /// Register a token callback
    pub fn lexer_callback<F>(mut self, terminal: impl Into<String>, f: F) -> Self
    where
        F: Fn(Token) -> Outcome<Token> + Send + Sync + 'static,
    {
        self.lexer_callbacks.insert(terminal.into(), Arc::new(f));
        self
    }

    /// Set an option by name from a JSON value
    ///
    /// Options outside [`LOAD_ALLOWED_OPTIONS`] are rejected, and so are the
    /// ones that need a typed setter.
    pub fn set(mut self, name: &str, value: serde_json::Value) -> Result<Self, LarkError> {
        if !LOAD_ALLOWED_OPTIONS.contains(&name) {
            return Err(LarkError::config(format!(
                "Some options are not allowed when loading a Parser: {}",
                name
            )));
        }
        let flag = |v: &serde_json::Value| {
            v.as_bool()
                .ok_or_else(|| LarkError::config(format!("Option {} expects a boolean", name)))
        };
        match name {
            "use_bytes" => self.use_bytes = Some(flag(&value)?),
            "debug" => self.debug = Some(flag(&value)?),
            "propagate_positions" => self.propagate_positions = Some(flag(&value)?),
            "g_regex_flags" => {
                let flags = value
                    .as_str()
                    .ok_or_else(|| LarkError::config("Option g_regex_flags expects a string"))?;
                self.g_regex_flags = Some(flags.to_string());
            }
            "tree_class" if value.as_str() == Some("Tree") => {}
            "tree_class" => return Err(LarkError::config("Only the built-in Tree type is supported")),
            "transformer" => {
                return Err(LarkError::config(
                    "Transformers are applied to the result of parse(), not attached to the parser",
                ))
            }
            other => {
                return Err(LarkError::config(format!(
                    "Option {} cannot be set from a value; use LoadOverrides::{}",
                    other, other
                )))
            }
        }
        Ok(self)
    }

    /// Write the overrides into `options`
    pub fn apply(self, options: &mut LarkOptions) {
        if let Some(postlex) = self.postlex {
            options.postlex = Some(postlex);
        }
        if let Some(regex) = self.regex {
            options.regex = Some(regex);
        }
        options.lexer_callbacks.extend(self.lexer_callbacks);
        if let Some(v) = self.use_bytes {
            options.use_bytes = v;
        }
        if let Some(v) = self.debug {
            options.debug = v;
        }
        if let Some(v) = self.g_regex_flags {
            options.g_regex_flags = v;
        }
        if let Some(v) = self.propagate_positions {
            options.propagate_positions = v;
        }
    }
}

impl fmt::Debug for LoadOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOverrides")
            .field("postlex", &self.postlex)
            .field("regex", &self.regex)
            .field("lexer_callbacks", &self.lexer_callbacks.keys().collect::<Vec<_>>())
            .field("use_bytes", &self.use_bytes)
            .field("debug", &self.debug)
            .field("g_regex_flags", &self.g_regex_flags)
            .field("propagate_positions", &self.propagate_positions)
            .finish()
    }
}
