//! The `Lark` front-end
//!
//! [`Lark::new`] takes grammar text and [`LarkOptions`], runs the grammar
//! compiler and builds the parser the options ask for. The result is
//! immutable and can be shared between threads.
//!
//! ```rust,ignore
//! use lark::prelude::*;
//!
//! let parser = Lark::new(
//!     r#"
//!     start: NAME "=" NUMBER
//!     %import common (CNAME -> NAME, INT -> NUMBER, WS)
//!     %ignore WS
//!     "#,
//!     LarkOptions::default().parser(ParserKind::Lalr),
//! )?;
//! let tree = parser.parse("answer = 42")?;
//! assert_eq!(tree.data, "start");
//! ```

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::cache::{self, CacheSetting};
use crate::error::LarkError;
use crate::grammar::{Rule, TerminalDef};
use crate::load_grammar::{FsLoader, GrammarBuilder, Loader};
use crate::lexer::{lex_all, BasicLexer, LexerCallback, LexerConf, PostLex};
use crate::parser_frontends::{apply_priority, resolve_lexer, ParsingFrontend};
use crate::parsers::earley_forest::Forest;
use crate::parsers::lalr_analysis::ParseTable;
use crate::parsers::lalr_interactive_parser::InteractiveParser;
use crate::regex_backend::{DefaultBackend, RegexBackend};
use crate::serialize::{LoadOverrides, SerializedLark};
use crate::token::Token;
use crate::tree::{Child, Tree};
use crate::visitors::Outcome;

/// Crate version, recorded in serialized parsers
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

macro_rules! option_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $text:literal $(| $alias:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text $(, alias = $alias)*)]
                $variant,
            )+
        }

        impl $name {
            /// Name used in option strings
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = LarkError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text $(| $alias)* => Ok($name::$variant), )+
                    other => Err(LarkError::config(format!(
                        concat!("Invalid ", $what, " option: {}. Must be one of {:?}"),
                        other,
                        [$($text),+]
                    ))),
                }
            }
        }
    };
}

option_enum! {
    /// Parsing algorithm
    ParserKind, "parser" {
        /// Earley, any context-free grammar
        #[default]
        Earley = "earley",
        /// LALR(1), deterministic grammars
        Lalr = "lalr",
        /// CYK
        Cyk = "cyk",
    }
}

option_enum! {
    /// Lexer to run in front of the parser
    LexerKind, "lexer" {
        /// Best lexer for the parser
        #[default]
        Auto = "auto",
        /// One scanner over all terminals
        Basic = "basic" | "standard",
        /// Terminals restricted to what the LALR state accepts
        Contextual = "contextual",
        /// Scannerless Earley
        Dynamic = "dynamic",
        /// Scannerless Earley that also tries shorter matches
        DynamicComplete = "dynamic_complete",
    }
}

option_enum! {
    /// How Earley handles ambiguous input
    Ambiguity, "ambiguity" {
        /// Same as `resolve`
        #[default]
        Auto = "auto",
        /// Choose one derivation by priority
        Resolve = "resolve",
        /// Keep every derivation under `_ambig` nodes
        Explicit = "explicit",
        /// Return the parse forest
        Forest = "forest",
    }
}

option_enum! {
    /// Treatment of rule and terminal priorities
    PriorityMode, "priority" {
        /// Same as `normal`
        #[default]
        Auto = "auto",
        /// Higher priority wins
        Normal = "normal",
        /// Lower priority wins
        Invert = "invert",
        /// Priorities are ignored
        None = "none",
    }
}

/// Options of [`Lark::new`]
///
/// Every field is public; the setters return `self` for chaining.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LarkOptions {
    /// Start symbols
    pub start: Vec<String>,
    /// Parsing algorithm
    pub parser: ParserKind,
    /// Lexer
    pub lexer: LexerKind,
    /// Earley ambiguity handling
    pub ambiguity: Ambiguity,
    /// Priority handling
    pub priority: PriorityMode,
    /// `[x]` yields a placeholder child when it matches nothing
    pub maybe_placeholders: bool,
    /// Keep punctuation and other filtered tokens
    pub keep_all_tokens: bool,
    /// Fill in tree `meta` spans
    pub propagate_positions: bool,
    /// Inline flags applied to every terminal
    pub g_regex_flags: String,
    /// Input is raw bytes; the grammar must be ASCII
    pub use_bytes: bool,
    /// LALR conflicts are errors instead of warnings
    pub strict: bool,
    /// Extra diagnostics
    pub debug: bool,
    /// Terminals kept even when unused (`"*"` keeps all)
    pub terminals_to_keep: Vec<String>,
    /// Grammar file, for relative imports and messages
    pub source_path: Option<PathBuf>,
    /// Token-stream post-processor
    #[serde(skip)]
    pub postlex: Option<Arc<dyn PostLex>>,
    /// Regex engine; [`DefaultBackend`] when unset
    #[serde(skip)]
    pub regex: Option<Arc<dyn RegexBackend>>,
    /// Per-terminal token callbacks
    #[serde(skip)]
    pub lexer_callbacks: HashMap<String, LexerCallback>,
    /// Extra grammar loaders, tried before the grammar's own directory
    #[serde(skip)]
    pub import_paths: Vec<Arc<dyn Loader>>,
    /// On-disk cache of the built parser (LALR only)
    #[serde(skip)]
    pub cache: CacheSetting,
}

impl Default for LarkOptions {
    fn default() -> Self {
        Self {
            start: vec!["start".to_string()],
            parser: ParserKind::default(),
            lexer: LexerKind::default(),
            ambiguity: Ambiguity::default(),
            priority: PriorityMode::default(),
            maybe_placeholders: true,
            keep_all_tokens: false,
            propagate_positions: false,
            g_regex_flags: String::new(),
            use_bytes: false,
            strict: false,
            debug: false,
            terminals_to_keep: Vec::new(),
            source_path: None,
            postlex: None,
            regex: None,
            lexer_callbacks: HashMap::new(),
            import_paths: Vec::new(),
            cache: CacheSetting::Off,
        }
    }
}

impl LarkOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the start symbols
    pub fn start<I, S>(mut self, start: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start = start.into_iter().map(Into::into).collect();
        self
    }

    /// Set the parser
    pub fn parser(mut self, parser: ParserKind) -> Self {
        self.parser = parser;
        self
    }

    /// Set the lexer
    pub fn lexer(mut self, lexer: LexerKind) -> Self {
        self.lexer = lexer;
        self
    }

    /// Set the ambiguity handling
    pub fn ambiguity(mut self, ambiguity: Ambiguity) -> Self {
        self.ambiguity = ambiguity;
        self
    }

    /// Set the priority handling
    pub fn priority(mut self, priority: PriorityMode) -> Self {
        self.priority = priority;
        self
    }

    /// Enable or disable placeholders for unmatched `[x]`
    pub fn maybe_placeholders(mut self, on: bool) -> Self {
        self.maybe_placeholders = on;
        self
    }

    /// Keep every token in the tree
    pub fn keep_all_tokens(mut self, on: bool) -> Self {
        self.keep_all_tokens = on;
        self
    }

    /// Fill in tree spans
    pub fn propagate_positions(mut self, on: bool) -> Self {
        self.propagate_positions = on;
        self
    }

    /// Inline regex flags for every terminal
    pub fn g_regex_flags(mut self, flags: impl Into<String>) -> Self {
        self.g_regex_flags = flags.into();
        self
    }

    /// Parse bytes instead of text
    pub fn use_bytes(mut self, on: bool) -> Self {
        self.use_bytes = on;
        self
    }

    /// Make LALR conflicts fatal
    pub fn strict(mut self, on: bool) -> Self {
        self.strict = on;
        self
    }

    /// Extra diagnostics
    pub fn debug(mut self, on: bool) -> Self {
        self.debug = on;
        self
    }

    /// Keep these terminals even when no rule uses them
    pub fn terminals_to_keep<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terminals_to_keep = names.into_iter().map(Into::into).collect();
        self
    }

    /// Grammar file path
    pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
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

    /// Register a callback for tokens of `terminal`
    pub fn lexer_callback<F>(mut self, terminal: impl Into<String>, f: F) -> Self
    where
        F: Fn(Token) -> Outcome<Token> + Send + Sync + 'static,
    {
        self.lexer_callbacks.insert(terminal.into(), Arc::new(f));
        self
    }

    /// Add a grammar loader
    pub fn import_path(mut self, loader: Arc<dyn Loader>) -> Self {
        self.import_paths.push(loader);
        self
    }

    /// Add a directory to search for imported grammars
    pub fn import_dir(self, dir: impl Into<PathBuf>) -> Self {
        self.import_path(Arc::new(FsLoader::new(dir)))
    }

    /// Cache the built parser on disk
    pub fn cache(mut self, cache: CacheSetting) -> Self {
        self.cache = cache;
        self
    }

    /// Check the options against each other and the grammar text
    pub fn validate(&self, grammar: &str) -> Result<(), LarkError> {
        if self.start.is_empty() {
            return Err(LarkError::config("At least one start symbol is required"));
        }
        let lexer = resolve_lexer(self.parser, self.lexer)?;
        if self.parser != ParserKind::Earley && !matches!(self.ambiguity, Ambiguity::Auto | Ambiguity::Resolve) {
            return Err(LarkError::config(format!(
                "Only the Earley parser supports ambiguity='{}'",
                self.ambiguity
            )));
        }
        if self.cache != CacheSetting::Off && self.parser != ParserKind::Lalr {
            return Err(LarkError::config("cache only works with parser='lalr' for now"));
        }
        if self.use_bytes && !grammar.is_ascii() {
            return Err(LarkError::config("Grammar must be ascii only, when use_bytes=True"));
        }
        if self.postlex.is_some() && !matches!(lexer, LexerKind::Basic | LexerKind::Contextual) {
            return Err(LarkError::config(format!(
                "Can't use postlex with lexer '{}'",
                lexer
            )));
        }
        Ok(())
    }

    pub(crate) fn backend(&self) -> Arc<dyn RegexBackend> {
        match &self.regex {
            Some(backend) => Arc::clone(backend),
            None if self.use_bytes => Arc::new(DefaultBackend::bytes()),
            None => Arc::new(DefaultBackend::new()),
        }
    }

    fn source_name(&self) -> String {
        self.source_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<string>".to_string())
    }
}

impl fmt::Debug for LarkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LarkOptions")
            .field("start", &self.start)
            .field("parser", &self.parser)
            .field("lexer", &self.lexer)
            .field("ambiguity", &self.ambiguity)
            .field("priority", &self.priority)
            .field("maybe_placeholders", &self.maybe_placeholders)
            .field("keep_all_tokens", &self.keep_all_tokens)
            .field("propagate_positions", &self.propagate_positions)
            .field("use_bytes", &self.use_bytes)
            .field("strict", &self.strict)
            .field("postlex", &self.postlex)
            .field("lexer_callbacks", &self.lexer_callbacks.keys().collect::<Vec<_>>())
            .field("cache", &self.cache)
            .finish()
    }
}

/// A grammar compiled into a ready-to-use parser
pub struct Lark {
    options: LarkOptions,
    terminals: Vec<TerminalDef>,
    rules: Vec<Rule>,
    ignore: Vec<String>,
    lexer_conf: LexerConf,
    frontend: ParsingFrontend,
}

impl Lark {
    /// Compile `grammar` and build its parser
    pub fn new(grammar: &str, options: LarkOptions) -> Result<Self, LarkError> {
        options.validate(grammar)?;

        let cache_path = cache::cache_path(&options.cache, grammar, &options)?;
        if let Some(path) = &cache_path {
            if let Some(lark) = cache::load(path, grammar, &options) {
                return Ok(lark);
            }
        }

        let backend = options.backend();
        let base = options
            .source_path
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty());
        let mut builder = GrammarBuilder::new(options.keep_all_tokens, options.import_paths.clone());
        builder.load_grammar(grammar, &options.source_name(), base)?;
        let compiled = builder
            .build()?
            .compile(&options.start, &options.terminals_to_keep, &*backend)?;
        log_debug!(
            "Compiled grammar: {} rules, {} terminals",
            compiled.rules.len(),
            compiled.terminals.len()
        );

        let mut terminals = compiled.terminals;
        let mut rules = compiled.rules;
        apply_priority(options.priority, &mut terminals, &mut rules);

        let lark = Self::from_parts(terminals, rules, compiled.ignore, options, None)?;
        if let Some(path) = &cache_path {
            cache::store(path, grammar, &lark);
        }
        Ok(lark)
    }

    /// Read a grammar file and build its parser
    ///
    /// Relative imports resolve against the file's directory.
    pub fn open(path: impl AsRef<Path>, options: LarkOptions) -> Result<Self, LarkError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::new(&text, options.source_path(path))
    }

    /// Build from compiled terminals and rules
    pub(crate) fn from_parts(
        terminals: Vec<TerminalDef>,
        rules: Vec<Rule>,
        ignore: Vec<String>,
        options: LarkOptions,
        table: Option<ParseTable>,
    ) -> Result<Self, LarkError> {
        let mut lexer_conf = LexerConf::new(terminals.clone(), ignore.clone(), options.backend());
        lexer_conf.callbacks = options.lexer_callbacks.clone();
        lexer_conf.g_regex_flags = options.g_regex_flags.clone();
        lexer_conf.use_bytes = options.use_bytes;
        lexer_conf.always_accept = options
            .postlex
            .as_ref()
            .map(|p| p.always_accept())
            .unwrap_or_default();

        let frontend = ParsingFrontend::new(&lexer_conf, &rules, &options, table)?;
        Ok(Self {
            options,
            terminals,
            rules,
            ignore,
            lexer_conf,
            frontend,
        })
    }

    /// Options the parser was built with
    pub fn options(&self) -> &LarkOptions {
        &self.options
    }

    /// All terminals, anonymous ones included
    pub fn terminals(&self) -> &[TerminalDef] {
        &self.terminals
    }

    /// Compiled BNF rules
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Ignored terminal names
    pub fn ignore_tokens(&self) -> &[String] {
        &self.ignore
    }

    /// Look up a terminal by name
    pub fn get_terminal(&self, name: &str) -> Option<&TerminalDef> {
        self.terminals.iter().find(|t| t.name == name)
    }

    /// Lexer and parser in use
    pub fn frontend(&self) -> &ParsingFrontend {
        &self.frontend
    }

    fn into_tree(child: Child, start: &str) -> Tree {
        match child {
            Child::Tree(tree) => tree,
            other => Tree::new(start, vec![other]),
        }
    }

    fn root_name<'a>(&'a self, start: Option<&'a str>) -> &'a str {
        start
            .or_else(|| self.options.start.first().map(String::as_str))
            .unwrap_or("start")
    }

    fn check_text_input(&self) -> Result<(), LarkError> {
        if self.options.use_bytes {
            return Err(LarkError::config("Parser was built with use_bytes; call parse_bytes()"));
        }
        Ok(())
    }

    /// Parse `text` from the only start symbol
    pub fn parse(&self, text: &str) -> Result<Tree, LarkError> {
        self.check_text_input()?;
        let child = self.frontend.parse(text.as_bytes(), None)?;
        Ok(Self::into_tree(child, self.root_name(None)))
    }

    /// Parse `text` from the given start symbol
    pub fn parse_with_start(&self, text: &str, start: &str) -> Result<Tree, LarkError> {
        self.check_text_input()?;
        let child = self.frontend.parse(text.as_bytes(), Some(start))?;
        Ok(Self::into_tree(child, start))
    }

    /// Parse raw bytes; requires `use_bytes`
    pub fn parse_bytes(&self, input: &[u8]) -> Result<Tree, LarkError> {
        if !self.options.use_bytes {
            return Err(LarkError::config("parse_bytes() requires use_bytes=True"));
        }
        let child = self.frontend.parse(input, None)?;
        Ok(Self::into_tree(child, self.root_name(None)))
    }

    /// Parse to a shared packed parse forest (`ambiguity=forest`)
    pub fn parse_forest(&self, text: &str) -> Result<Forest, LarkError> {
        self.frontend.parse_forest(text.as_bytes(), None)
    }

    /// LALR parse that hands every error to `on_error`
    ///
    /// The callback gets the error and an interactive parser positioned at
    /// it. Returning `true` resumes parsing, `false` returns the error.
    pub fn parse_with_recovery<F>(&self, text: &str, mut on_error: F) -> Result<Tree, LarkError>
    where
        F: FnMut(&LarkError, &mut InteractiveParser<'_>) -> bool,
    {
        self.check_text_input()?;
        let child = self
            .frontend
            .parse_with_recovery(text.as_bytes(), None, &mut on_error)?;
        Ok(Self::into_tree(child, self.root_name(None)))
    }

    /// Step-wise LALR parser over `text`
    pub fn parse_interactive<'a>(&'a self, text: &'a str, start: Option<&'a str>) -> Result<InteractiveParser<'a>, LarkError> {
        self.frontend.parse_interactive(text.as_bytes(), start)
    }

    /// Tokenize `text` with a basic lexer over all terminals
    ///
    /// With `dont_ignore`, ignored terminals are emitted too.
    pub fn lex(&self, text: &str, dont_ignore: bool) -> Result<Vec<Token>, LarkError> {
        let mut conf = self.lexer_conf.clone();
        if dont_ignore {
            conf.ignore.clear();
        }
        let lexer = BasicLexer::new(&conf)?;
        lex_all(&lexer, text.as_bytes(), self.options.postlex.as_deref())
    }

    /// Serialize to JSON
    pub fn save(&self) -> Result<String, LarkError> {
        SerializedLark::from_lark(self).to_json()
    }

    /// Rebuild a parser saved by [`Lark::save`]
    ///
    /// Only the options in [`LoadOverrides`] can differ from the saved ones.
    pub fn load(json: &str, overrides: LoadOverrides) -> Result<Self, LarkError> {
        let saved = SerializedLark::from_json(json)?;
        let mut options = saved.options.clone();
        overrides.apply(&mut options);
        saved.into_lark(options)
    }
}

impl fmt::Debug for Lark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lark")
            .field("options", &self.options)
            .field("terminals", &self.terminals.len())
            .field("rules", &self.rules.len())
            .field("frontend", &self.frontend)
            .finish()
    }
}
