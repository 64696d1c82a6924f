//! Normalized grammar model
//!
//! The grammar compiler lowers EBNF into this BNF form: one [`Rule`] per
//! alternative, expansions made only of [`Symbol`]s, and a flat list of
//! [`TerminalDef`]s. Everything here is serializable so a compiled parser can
//! be cached and reloaded without re-running the compiler.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::LarkError;
use crate::regex_backend::RegexBackend;

/// Default priority of a terminal without an explicit `.N` suffix
pub const TOKEN_DEFAULT_PRIORITY: i32 = 1;

/// Index of a rule in the compiled rule list
pub type RuleId = usize;

/// A grammar symbol
///
/// Equality and hashing look only at the tag and the name; `filter_out` is
/// presentation metadata consumed by the tree builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Symbol {
    /// Lexical symbol
    Terminal {
        /// Terminal name (uppercase)
        name: String,
        /// Drop matching tokens from the tree unless `keep_all_tokens`
        filter_out: bool,
    },
    /// Grammatical symbol
    NonTerminal {
        /// Rule name (lowercase)
        name: String,
    },
}

impl Symbol {
    /// Terminal that is kept in the tree
    pub fn terminal(name: impl Into<String>) -> Self {
        Symbol::Terminal {
            name: name.into(),
            filter_out: false,
        }
    }

    /// Terminal with an explicit filter flag
    pub fn terminal_filtered(name: impl Into<String>, filter_out: bool) -> Self {
        Symbol::Terminal {
            name: name.into(),
            filter_out,
        }
    }

    /// Non-terminal symbol
    pub fn nonterminal(name: impl Into<String>) -> Self {
        Symbol::NonTerminal { name: name.into() }
    }

    /// Symbol name
    #[inline]
    pub fn name(&self) -> &str {
        match self {
            Symbol::Terminal { name, .. } | Symbol::NonTerminal { name } => name,
        }
    }

    /// True for terminals
    #[inline]
    pub fn is_term(&self) -> bool {
        matches!(self, Symbol::Terminal { .. })
    }

    /// True for terminals marked as filtered out
    #[inline]
    pub fn filter_out(&self) -> bool {
        matches!(self, Symbol::Terminal { filter_out: true, .. })
    }

    /// Whether a name denotes a terminal (last dotted component is uppercase)
    pub fn is_terminal_name(name: &str) -> bool {
        let last = name.rsplit("__").next().unwrap_or(name);
        last.trim_start_matches('_')
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase())
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.is_term() == other.is_term() && self.name() == other.name()
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.is_term().hash(state);
        self.name().hash(state);
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.is_term(), self.name()).cmp(&(other.is_term(), other.name()))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A terminal pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pattern {
    /// Literal text
    Str {
        /// The literal
        value: String,
        /// Sorted inline flags (`i` for case-insensitive)
        flags: String,
    },
    /// Regular expression
    Re {
        /// The expression source
        value: String,
        /// Sorted inline flags from `imsx`
        flags: String,
    },
}

impl Pattern {
    /// Literal pattern
    pub fn string(value: impl Into<String>, flags: &str) -> Self {
        Pattern::Str {
            value: value.into(),
            flags: normalize_flags(flags),
        }
    }

    /// Regex pattern
    pub fn regex(value: impl Into<String>, flags: &str) -> Self {
        Pattern::Re {
            value: value.into(),
            flags: normalize_flags(flags),
        }
    }

    /// Raw value (literal text or regex source)
    pub fn value(&self) -> &str {
        match self {
            Pattern::Str { value, .. } | Pattern::Re { value, .. } => value,
        }
    }

    /// Inline flags
    pub fn flags(&self) -> &str {
        match self {
            Pattern::Str { flags, .. } | Pattern::Re { flags, .. } => flags,
        }
    }

    /// True for literal patterns
    pub fn is_str(&self) -> bool {
        matches!(self, Pattern::Str { .. })
    }

    /// Regex source equivalent to this pattern, flags applied inline
    pub fn to_regexp(&self) -> String {
        let body = match self {
            Pattern::Str { value, .. } => regex::escape(value),
            Pattern::Re { value, .. } => value.clone(),
        };
        let flags: String = self.flags().chars().filter(|c| "imsxU".contains(*c)).collect();
        if flags.is_empty() {
            body
        } else {
            format!("(?{}:{})", flags, body)
        }
    }

    /// `(min, max)` length in bytes of anything this pattern can match
    ///
    /// Unbounded patterns report `usize::MAX` as their maximum.
    pub fn width(&self, backend: &dyn RegexBackend) -> Result<(usize, usize), LarkError> {
        match self {
            Pattern::Str { value, .. } => Ok((value.len(), value.len())),
            Pattern::Re { .. } => backend.width(&self.to_regexp()),
        }
    }

    /// Same pattern with extra flags merged in
    pub fn with_flags(&self, extra: &str) -> Pattern {
        let merged = format!("{}{}", self.flags(), extra);
        match self {
            Pattern::Str { value, .. } => Pattern::string(value.clone(), &merged),
            Pattern::Re { value, .. } => Pattern::regex(value.clone(), &merged),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Str { value, flags } => write!(f, "{:?}{}", value, flags),
            Pattern::Re { value, flags } => write!(f, "/{}/{}", value, flags),
        }
    }
}

fn normalize_flags(flags: &str) -> String {
    let mut chars: Vec<char> = flags.chars().collect();
    chars.sort_unstable();
    chars.dedup();
    chars.into_iter().collect()
}

/// A named terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalDef {
    /// Terminal name
    pub name: String,
    /// What it matches
    pub pattern: Pattern,
    /// Lexer priority; higher wins
    pub priority: i32,
}

impl TerminalDef {
    /// Terminal with the default priority
    pub fn new(name: impl Into<String>, pattern: Pattern) -> Self {
        Self {
            name: name.into(),
            pattern,
            priority: TOKEN_DEFAULT_PRIORITY,
        }
    }

    /// Terminal with an explicit priority
    pub fn with_priority(name: impl Into<String>, pattern: Pattern, priority: i32) -> Self {
        Self {
            name: name.into(),
            pattern,
            priority,
        }
    }
}

impl fmt::Display for TerminalDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.pattern)
    }
}

/// Per-rule options collected from modifiers and desugaring
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleOptions {
    /// `!rule`: keep every token, including filtered punctuation
    pub keep_all_tokens: bool,
    /// `?rule`: replace a node that has a single child by that child
    pub expand1: bool,
    /// `rule.N`: priority used by conflict resolution and Earley
    pub priority: Option<i32>,
    /// Name of the template this rule was instantiated from
    pub template_source: Option<String>,
    /// For each position of the unfiltered expansion, whether `[..]` matched nothing there
    pub empty_indices: Vec<bool>,
}

/// One BNF alternative
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Left-hand side
    pub origin: Symbol,
    /// Right-hand side
    pub expansion: Vec<Symbol>,
    /// Index of this alternative within its origin
    pub order: usize,
    /// `-> alias` name
    pub alias: Option<String>,
    /// Modifiers
    pub options: RuleOptions,
}

impl Rule {
    /// Create a rule with default options
    pub fn new(origin: Symbol, expansion: Vec<Symbol>) -> Self {
        Self {
            origin,
            expansion,
            order: 0,
            alias: None,
            options: RuleOptions::default(),
        }
    }

    /// Name the tree builder uses for nodes of this rule
    pub fn tree_name(&self) -> &str {
        self.alias
            .as_deref()
            .or(self.options.template_source.as_deref())
            .unwrap_or_else(|| self.origin.name())
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.origin == other.origin && self.expansion == other.expansion
    }
}

impl Eq for Rule {}

impl Hash for Rule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.origin.hash(state);
        self.expansion.hash(state);
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} :", self.origin.name())?;
        for sym in &self.expansion {
            write!(f, " {}", sym.name())?;
        }
        write!(f, ">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_equality_ignores_filter_out() {
        let a = Symbol::terminal_filtered("COMMA", true);
        let b = Symbol::terminal("COMMA");
        assert_eq!(a, b);
        assert_ne!(a, Symbol::nonterminal("COMMA"));
    }

    #[test]
    fn test_is_terminal_name() {
        assert!(Symbol::is_terminal_name("NAME"));
        assert!(Symbol::is_terminal_name("_NL"));
        assert!(Symbol::is_terminal_name("common__NUMBER"));
        assert!(Symbol::is_terminal_name("_common__WS"));
        assert!(!Symbol::is_terminal_name("expr"));
        assert!(!Symbol::is_terminal_name("_sep"));
    }

    #[test]
    fn test_pattern_to_regexp() {
        assert_eq!(Pattern::string("a+b", "").to_regexp(), r"a\+b");
        assert_eq!(Pattern::string("if", "i").to_regexp(), "(?i:if)");
        assert_eq!(Pattern::regex("[a-z]+", "xi").to_regexp(), "(?ix:[a-z]+)");
    }

    #[test]
    fn test_rule_equality_by_origin_and_expansion() {
        let mut a = Rule::new(Symbol::nonterminal("a"), vec![Symbol::terminal("B")]);
        let b = Rule::new(Symbol::nonterminal("a"), vec![Symbol::terminal("B")]);
        a.order = 3;
        a.alias = Some("x".into());
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "<a : B>");
    }

    #[test]
    fn test_tree_name_precedence() {
        let mut rule = Rule::new(Symbol::nonterminal("sep{item,COMMA}"), vec![]);
        assert_eq!(rule.tree_name(), "sep{item,COMMA}");
        rule.options.template_source = Some("sep".into());
        assert_eq!(rule.tree_name(), "sep");
        rule.alias = Some("items".into());
        assert_eq!(rule.tree_name(), "items");
    }
}
