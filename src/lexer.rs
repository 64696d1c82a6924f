//! Lexers
//!
//! The [`Scanner`] turns a set of terminals into prioritized matchers; the
//! [`BasicLexer`] runs one scanner over the whole input, and the
//! [`ContextualLexer`] keeps one basic lexer per LALR state so that only the
//! terminals the parser can accept are tried. A [`LexerThread`] binds a lexer
//! to an input and an optional post-lexer.
//!
//! Match selection: highest priority first, then the longest match, then
//! string patterns before regexes, then the terminal sort order
//! (`-priority, -max_width, -len(value), name`).

use hashbrown::{HashMap, HashSet};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::error::{LarkError, UnexpectedCharacters, UnexpectedToken};
use crate::grammar::{Pattern, TerminalDef};
use crate::regex_backend::{Matcher, MatcherSet, RegexBackend, GROUP_LIMIT};
use crate::source_location::LineCounter;
use crate::token::Token;
use crate::visitors::Outcome;

/// User hook run on every token of a given terminal
pub type LexerCallback = Arc<dyn Fn(Token) -> Outcome<Token> + Send + Sync>;

/// Everything a lexer needs to know about the terminals
#[derive(Clone)]
pub struct LexerConf {
    /// All pattern-backed terminals
    pub terminals: Vec<TerminalDef>,
    /// Terminals that are matched and dropped
    pub ignore: Vec<String>,
    /// Per-terminal user callbacks
    pub callbacks: HashMap<String, LexerCallback>,
    /// Flags applied to every terminal
    pub g_regex_flags: String,
    /// Input is raw bytes
    pub use_bytes: bool,
    /// Terminals emitted by a post-lexer; always accepted by the contextual lexer
    pub always_accept: Vec<String>,
    /// Regex engine
    pub backend: Arc<dyn RegexBackend>,
}

impl LexerConf {
    /// Configuration without callbacks or global flags
    pub fn new(terminals: Vec<TerminalDef>, ignore: Vec<String>, backend: Arc<dyn RegexBackend>) -> Self {
        Self {
            terminals,
            ignore,
            callbacks: HashMap::new(),
            g_regex_flags: String::new(),
            use_bytes: false,
            always_accept: Vec::new(),
            backend,
        }
    }

    /// Regex source for a terminal with the global flags applied
    pub fn regexp_for(&self, pattern: &Pattern) -> String {
        if self.g_regex_flags.is_empty() {
            pattern.to_regexp()
        } else {
            pattern.with_flags(&self.g_regex_flags).to_regexp()
        }
    }

    /// Look up a terminal by name
    pub fn terminal(&self, name: &str) -> Option<&TerminalDef> {
        self.terminals.iter().find(|t| t.name == name)
    }
}

impl fmt::Debug for LexerConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexerConf")
            .field("terminals", &self.terminals.len())
            .field("ignore", &self.ignore)
            .field("callbacks", &self.callbacks.keys().collect::<Vec<_>>())
            .field("g_regex_flags", &self.g_regex_flags)
            .field("use_bytes", &self.use_bytes)
            .finish()
    }
}

/// Whether matches of a regex may span a newline
pub fn regexp_has_newline(r: &str) -> bool {
    r.contains('\n')
        || r.contains("\\n")
        || r.contains("\\s")
        || r.contains("[^")
        || (r.contains("(?s") && r.contains('.'))
}

#[derive(Debug)]
struct ScanEntry {
    name: String,
    priority: i32,
    is_str: bool,
    matcher: Arc<dyn Matcher>,
}

/// Prioritized matcher over a set of terminals
#[derive(Debug)]
pub struct Scanner {
    entries: Vec<ScanEntry>,
    groups: Vec<(Arc<dyn MatcherSet>, usize)>,
}

impl Scanner {
    /// Compile `terminals` into groups of at most [`GROUP_LIMIT`] patterns
    pub fn new(terminals: &[&TerminalDef], conf: &LexerConf) -> Result<Self, LarkError> {
        let mut keyed = Vec::with_capacity(terminals.len());
        for t in terminals {
            let (_, max_width) = t.pattern.width(conf.backend.as_ref())?;
            keyed.push((*t, max_width));
        }
        keyed.sort_by(|(a, aw), (b, bw)| {
            b.priority
                .cmp(&a.priority)
                .then(bw.cmp(aw))
                .then(b.pattern.value().len().cmp(&a.pattern.value().len()))
                .then(a.name.cmp(&b.name))
        });

        let mut entries = Vec::with_capacity(keyed.len());
        let mut sources = Vec::with_capacity(keyed.len());
        for (t, _) in keyed {
            let source = conf.regexp_for(&t.pattern);
            entries.push(ScanEntry {
                name: t.name.clone(),
                priority: t.priority,
                is_str: t.pattern.is_str(),
                matcher: conf.backend.compile(&source)?,
            });
            sources.push(source);
        }

        let mut groups = Vec::new();
        for (i, chunk) in sources.chunks(GROUP_LIMIT).enumerate() {
            groups.push((conf.backend.compile_set(chunk)?, i * GROUP_LIMIT));
        }
        Ok(Self { entries, groups })
    }

    /// Best terminal matching at `pos`, as `(name, end)`
    pub fn match_at(&self, text: &[u8], pos: usize) -> Option<(&str, usize)> {
        let mut best: Option<(usize, usize)> = None;
        for (set, offset) in &self.groups {
            for local in set.matching_at(text, pos) {
                let idx = offset + local;
                let entry = &self.entries[idx];
                let Some(end) = entry.matcher.match_at(text, pos) else {
                    continue;
                };
                if end == pos {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some((bi, bend)) => {
                        let b = &self.entries[bi];
                        (entry.priority, end, entry.is_str) > (b.priority, bend, b.is_str)
                    }
                };
                if better {
                    best = Some((idx, end));
                }
            }
        }
        best.map(|(idx, end)| (self.entries[idx].name.as_str(), end))
    }

    /// Names of the terminals this scanner can produce
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

/// Position of a lexer within one input
#[derive(Debug, Clone)]
pub struct LexerState<'t> {
    /// Input being lexed
    pub text: &'t [u8],
    /// Current position
    pub line_ctr: LineCounter,
    /// Last token returned
    pub last_token: Option<Token>,
}

impl<'t> LexerState<'t> {
    /// State at the start of `text`
    pub fn new(text: &'t [u8]) -> Self {
        Self {
            text,
            line_ctr: LineCounter::new(),
            last_token: None,
        }
    }

    /// Advance over `n` characters without producing tokens
    pub fn skip(&mut self, n: usize) {
        let start = self.line_ctr.char_pos.min(self.text.len());
        let mut end = start;
        let mut seen = 0;
        while end < self.text.len() {
            if (self.text[end] & 0xC0) != 0x80 {
                if seen == n {
                    break;
                }
                seen += 1;
            }
            end += 1;
        }
        self.line_ctr.feed(&self.text[start..end], true);
    }
}

/// Something that produces tokens from a [`LexerState`]
pub trait Lexer: Send + Sync + fmt::Debug {
    /// Next token, or `None` at end of input
    ///
    /// `parser_state` is the LALR state the token is requested for, when the
    /// lexer is driven by an LALR parser.
    fn next_token(
        &self,
        state: &mut LexerState<'_>,
        parser_state: Option<usize>,
    ) -> Result<Option<Token>, LarkError>;
}

#[derive(Debug)]
struct UnlessEntry {
    matcher: Arc<dyn Matcher>,
    name: String,
}

/// Lexer over a fixed terminal set
pub struct BasicLexer {
    scanner: Scanner,
    ignore: HashSet<String>,
    newline_types: HashSet<String>,
    unless: HashMap<String, Vec<UnlessEntry>>,
    callbacks: HashMap<String, LexerCallback>,
    allowed: Vec<String>,
}

impl BasicLexer {
    /// Lexer over every terminal of `conf`
    pub fn new(conf: &LexerConf) -> Result<Self, LarkError> {
        let all: Vec<&TerminalDef> = conf.terminals.iter().collect();
        Self::with_terminals(conf, &all)
    }

    /// Lexer over a subset of the terminals of `conf`
    pub fn with_terminals(conf: &LexerConf, terminals: &[&TerminalDef]) -> Result<Self, LarkError> {
        let names: HashSet<&str> = terminals.iter().map(|t| t.name.as_str()).collect();
        for t in terminals {
            let source = conf.regexp_for(&t.pattern);
            let (min_width, _) = conf.backend.width(&source)?;
            if min_width == 0 {
                return Err(LarkError::grammar(format!(
                    "Lexer does not allow zero-width terminals. ({}: {})",
                    t.name, t.pattern
                )));
            }
        }
        let undefined: Vec<&str> = conf
            .ignore
            .iter()
            .map(String::as_str)
            .filter(|n| !names.contains(n))
            .collect();
        if !undefined.is_empty() {
            return Err(LarkError::grammar(format!(
                "Ignore terminals are not defined: {}",
                undefined.join(", ")
            )));
        }

        let (kept, unless) = create_unless(terminals, conf)?;
        let scanner = Scanner::new(&kept, conf)?;

        let ignore: HashSet<String> = conf.ignore.iter().cloned().collect();
        let newline_types = terminals
            .iter()
            .filter(|t| regexp_has_newline(&t.pattern.to_regexp()))
            .map(|t| t.name.clone())
            .collect();
        let mut allowed: Vec<String> = kept
            .iter()
            .map(|t| t.name.clone())
            .filter(|n| !ignore.contains(n))
            .collect();
        allowed.sort();

        Ok(Self {
            scanner,
            ignore,
            newline_types,
            unless,
            callbacks: conf.callbacks.clone(),
            allowed,
        })
    }

    /// Terminals this lexer can emit (ignored ones excluded), sorted
    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    fn apply_unless(&self, tok: &mut Token) {
        if let Some(entries) = self.unless.get(&tok.kind) {
            if let Some(hit) = entries
                .iter()
                .find(|e| e.matcher.full_match(tok.value.as_bytes()))
            {
                tok.kind = hit.name.clone();
            }
        }
    }
}

/// Split string terminals embedded in regex terminals of the same priority
///
/// A string that a regex fully matches is lexed through the regex and then
/// reclassified; it is dropped from the scanner when its flags are a subset
/// of the regex's flags.
fn create_unless<'c>(
    terminals: &[&'c TerminalDef],
    conf: &LexerConf,
) -> Result<(Vec<&'c TerminalDef>, HashMap<String, Vec<UnlessEntry>>), LarkError> {
    let mut embedded: HashSet<&str> = HashSet::new();
    let mut unless: HashMap<String, Vec<UnlessEntry>> = HashMap::new();
    for retok in terminals.iter().filter(|t| !t.pattern.is_str()) {
        let matcher = conf.backend.compile(&conf.regexp_for(&retok.pattern))?;
        let mut entries = Vec::new();
        for strtok in terminals.iter().filter(|t| t.pattern.is_str()) {
            if strtok.priority != retok.priority {
                continue;
            }
            let s = strtok.pattern.value().as_bytes();
            if matcher.match_at(s, 0) == Some(s.len()) {
                entries.push(UnlessEntry {
                    matcher: conf.backend.compile(&conf.regexp_for(&strtok.pattern))?,
                    name: strtok.name.clone(),
                });
                if strtok
                    .pattern
                    .flags()
                    .chars()
                    .all(|f| retok.pattern.flags().contains(f))
                {
                    embedded.insert(strtok.name.as_str());
                }
            }
        }
        if !entries.is_empty() {
            unless.insert(retok.name.clone(), entries);
        }
    }
    let kept = terminals
        .iter()
        .copied()
        .filter(|t| !embedded.contains(t.name.as_str()))
        .collect();
    Ok((kept, unless))
}

impl fmt::Debug for BasicLexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicLexer")
            .field("terminals", &self.scanner.names().collect::<Vec<_>>())
            .field("ignore", &self.ignore)
            .finish()
    }
}

impl Lexer for BasicLexer {
    fn next_token(
        &self,
        state: &mut LexerState<'_>,
        parser_state: Option<usize>,
    ) -> Result<Option<Token>, LarkError> {
        let text = state.text;
        while state.line_ctr.char_pos < text.len() {
            let pos = state.line_ctr.char_pos;
            let Some((kind, end)) = self.scanner.match_at(text, pos) else {
                let allowed = if self.allowed.is_empty() {
                    vec!["<END-OF-FILE>".to_string()]
                } else {
                    self.allowed.clone()
                };
                return Err(LarkError::UnexpectedCharacters(UnexpectedCharacters::new(
                    text,
                    pos,
                    state.line_ctr.line,
                    state.line_ctr.column,
                    allowed,
                    parser_state,
                    state.last_token.iter().cloned().collect(),
                )));
            };

            let ignored = self.ignore.contains(kind);
            let has_callback = self.callbacks.contains_key(kind);
            let start = state.line_ctr.position();
            state
                .line_ctr
                .feed(&text[pos..end], self.newline_types.contains(kind));
            if ignored && !has_callback {
                continue;
            }

            let value = String::from_utf8_lossy(&text[pos..end]).into_owned();
            let mut tok = Token::with_span(kind, value, start, state.line_ctr.position());
            self.apply_unless(&mut tok);
            if let Some(cb) = self.callbacks.get(&tok.kind) {
                match cb(tok) {
                    Outcome::Keep(t) => tok = t,
                    Outcome::Discard => continue,
                }
            }
            if ignored {
                continue;
            }
            state.last_token = Some(tok.clone());
            return Ok(Some(tok));
        }
        Ok(None)
    }
}

/// One basic lexer per parser state, restricted to the terminals it accepts
pub struct ContextualLexer {
    by_state: Vec<usize>,
    lexers: Vec<BasicLexer>,
    root: BasicLexer,
}

impl ContextualLexer {
    /// Build from the accepted terminal names of every LALR state
    pub fn new(conf: &LexerConf, state_accepts: &[Vec<String>]) -> Result<Self, LarkError> {
        let by_name: HashMap<&str, &TerminalDef> =
            conf.terminals.iter().map(|t| (t.name.as_str(), t)).collect();
        let mut cache: HashMap<Vec<String>, usize> = HashMap::new();
        let mut lexers = Vec::new();
        let mut by_state = Vec::with_capacity(state_accepts.len());

        for accepts in state_accepts {
            let mut key: Vec<String> = accepts
                .iter()
                .chain(conf.ignore.iter())
                .chain(conf.always_accept.iter())
                .filter(|n| by_name.contains_key(n.as_str()))
                .cloned()
                .collect();
            key.sort();
            key.dedup();
            let idx = match cache.get(&key) {
                Some(&idx) => idx,
                None => {
                    let terms: Vec<&TerminalDef> = key.iter().map(|n| by_name[n.as_str()]).collect();
                    lexers.push(BasicLexer::with_terminals(conf, &terms)?);
                    cache.insert(key, lexers.len() - 1);
                    lexers.len() - 1
                }
            };
            by_state.push(idx);
        }
        log_debug!(
            "contextual lexer: {} states share {} lexers",
            by_state.len(),
            lexers.len()
        );

        Ok(Self {
            by_state,
            lexers,
            root: BasicLexer::new(conf)?,
        })
    }

    /// The lexer that knows every terminal
    pub fn root(&self) -> &BasicLexer {
        &self.root
    }
}

impl fmt::Debug for ContextualLexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextualLexer")
            .field("states", &self.by_state.len())
            .field("lexers", &self.lexers.len())
            .finish()
    }
}

impl Lexer for ContextualLexer {
    fn next_token(
        &self,
        state: &mut LexerState<'_>,
        parser_state: Option<usize>,
    ) -> Result<Option<Token>, LarkError> {
        let lexer = match parser_state.and_then(|s| self.by_state.get(s)) {
            Some(&idx) => &self.lexers[idx],
            None => &self.root,
        };
        match lexer.next_token(state, parser_state) {
            Err(LarkError::UnexpectedCharacters(e)) => {
                // The text may still be a terminal the grammar knows, just not here
                let last = state.last_token.clone();
                match self.root.next_token(state, parser_state) {
                    Ok(Some(tok)) => {
                        let mut err = UnexpectedToken::new(tok, e.allowed.clone(), parser_state);
                        err.token_history = last.into_iter().collect();
                        Err(LarkError::UnexpectedToken(err))
                    }
                    _ => Err(LarkError::UnexpectedCharacters(e)),
                }
            }
            other => other,
        }
    }
}

/// Token-stream transducer run between the lexer and the parser
pub trait PostLex: Send + Sync + fmt::Debug {
    /// Terminals the post-lexer may emit that the lexer never produces
    fn always_accept(&self) -> Vec<String>;

    /// Fresh per-parse processing state
    fn start(&self) -> Box<dyn PostLexProcess>;
}

/// Per-parse state of a [`PostLex`]
pub trait PostLexProcess: Send + fmt::Debug {
    /// Consume one lexer token, pushing zero or more tokens to `out`
    fn feed(&mut self, token: Token, out: &mut VecDeque<Token>) -> Result<(), LarkError>;

    /// End of input; flush pending tokens
    fn finish(&mut self, out: &mut VecDeque<Token>) -> Result<(), LarkError>;

    /// Clone into a box
    fn box_clone(&self) -> Box<dyn PostLexProcess>;
}

/// A lexer bound to one input, with an optional post-lexer
pub struct LexerThread<'a> {
    lexer: &'a dyn Lexer,
    /// Raw lexer position
    pub state: LexerState<'a>,
    postlex: Option<Box<dyn PostLexProcess>>,
    pending: VecDeque<Token>,
    exhausted: bool,
}

impl<'a> LexerThread<'a> {
    /// Start lexing `text`
    pub fn new(lexer: &'a dyn Lexer, text: &'a [u8], postlex: Option<&dyn PostLex>) -> Self {
        Self {
            lexer,
            state: LexerState::new(text),
            postlex: postlex.map(|p| p.start()),
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Next token for the given parser state
    pub fn next_token(&mut self, parser_state: Option<usize>) -> Result<Option<Token>, LarkError> {
        loop {
            if let Some(tok) = self.pending.pop_front() {
                return Ok(Some(tok));
            }
            if self.exhausted {
                return Ok(None);
            }
            match self.lexer.next_token(&mut self.state, parser_state)? {
                Some(tok) => match self.postlex.as_mut() {
                    Some(post) => post.feed(tok, &mut self.pending)?,
                    None => return Ok(Some(tok)),
                },
                None => {
                    self.exhausted = true;
                    if let Some(post) = self.postlex.as_mut() {
                        post.finish(&mut self.pending)?;
                    }
                }
            }
        }
    }

    /// Byte offset of the raw lexer
    pub fn position(&self) -> usize {
        self.state.line_ctr.char_pos
    }
}

impl Clone for LexerThread<'_> {
    fn clone(&self) -> Self {
        Self {
            lexer: self.lexer,
            state: self.state.clone(),
            postlex: self.postlex.as_ref().map(|p| p.box_clone()),
            pending: self.pending.clone(),
            exhausted: self.exhausted,
        }
    }
}

impl fmt::Debug for LexerThread<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexerThread")
            .field("position", &self.position())
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Lex all of `text` with one lexer, post-lexer applied
pub fn lex_all(lexer: &dyn Lexer, text: &[u8], postlex: Option<&dyn PostLex>) -> Result<Vec<Token>, LarkError> {
    let mut thread = LexerThread::new(lexer, text, postlex);
    let mut out = Vec::new();
    while let Some(tok) = thread.next_token(None)? {
        out.push(tok);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regex_backend::DefaultBackend;

    fn conf(terms: Vec<TerminalDef>, ignore: &[&str]) -> LexerConf {
        LexerConf::new(
            terms,
            ignore.iter().map(|s| s.to_string()).collect(),
            Arc::new(DefaultBackend::new()),
        )
    }

    fn kinds(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.kind.as_str()).collect()
    }

    #[test]
    fn test_basic_lexing_with_ignore() {
        let c = conf(
            vec![
                TerminalDef::new("NAME", Pattern::regex("[a-z]+", "")),
                TerminalDef::new("NUMBER", Pattern::regex("[0-9]+", "")),
                TerminalDef::new("WS", Pattern::regex("[ \n]+", "")),
            ],
            &["WS"],
        );
        let lexer = BasicLexer::new(&c).unwrap();
        let toks = lex_all(&lexer, b"abc 12\nx", None).unwrap();
        assert_eq!(kinds(&toks), vec!["NAME", "NUMBER", "NAME"]);
        assert_eq!((toks[2].line, toks[2].column), (2, 1));
        assert_eq!((toks[1].start_pos, toks[1].end_pos), (4, 6));
    }

    #[test]
    fn test_keyword_reclassified_through_unless() {
        let c = conf(
            vec![
                TerminalDef::new("NAME", Pattern::regex("[a-z]+", "")),
                TerminalDef::new("IF", Pattern::string("if", "")),
                TerminalDef::new("WS", Pattern::regex(" +", "")),
            ],
            &["WS"],
        );
        let lexer = BasicLexer::new(&c).unwrap();
        let toks = lex_all(&lexer, b"if iffy", None).unwrap();
        assert_eq!(kinds(&toks), vec!["IF", "NAME"]);
    }

    #[test]
    fn test_priority_beats_length() {
        let c = conf(
            vec![
                TerminalDef::new("WORD", Pattern::regex("[a-z]+", "")),
                TerminalDef::with_priority("AB", Pattern::regex("ab", ""), 2),
            ],
            &[],
        );
        let lexer = BasicLexer::new(&c).unwrap();
        let toks = lex_all(&lexer, b"abc", None).unwrap();
        assert_eq!(kinds(&toks), vec!["AB", "WORD"]);
    }

    #[test]
    fn test_zero_width_rejected() {
        let c = conf(vec![TerminalDef::new("E", Pattern::regex("a*", ""))], &[]);
        let err = BasicLexer::new(&c).unwrap_err();
        assert!(err.to_string().contains("zero-width"));
    }

    #[test]
    fn test_unexpected_characters() {
        let c = conf(vec![TerminalDef::new("A", Pattern::string("a", ""))], &[]);
        let lexer = BasicLexer::new(&c).unwrap();
        let err = lex_all(&lexer, b"aab", None).unwrap_err();
        match err {
            LarkError::UnexpectedCharacters(e) => {
                assert_eq!(e.char, 'b');
                assert_eq!(e.pos_in_stream, 2);
                assert_eq!(e.allowed, vec!["A".to_string()]);
                assert_eq!(e.token_history.len(), 1);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_callback_discard() {
        let mut c = conf(
            vec![
                TerminalDef::new("A", Pattern::string("a", "")),
                TerminalDef::new("B", Pattern::string("b", "")),
            ],
            &[],
        );
        c.callbacks.insert(
            "B".into(),
            Arc::new(|_t: Token| -> Outcome<Token> { Outcome::Discard }) as LexerCallback,
        );
        let lexer = BasicLexer::new(&c).unwrap();
        let toks = lex_all(&lexer, b"abab", None).unwrap();
        assert_eq!(kinds(&toks), vec!["A", "A"]);
    }

    #[test]
    fn test_contextual_falls_back_to_unexpected_token() {
        let c = conf(
            vec![
                TerminalDef::new("A", Pattern::string("a", "")),
                TerminalDef::new("B", Pattern::string("b", "")),
            ],
            &[],
        );
        let lexer = ContextualLexer::new(&c, &[vec!["A".into()], vec!["B".into()]]).unwrap();
        let mut state = LexerState::new(b"b");
        let err = lexer.next_token(&mut state, Some(0)).unwrap_err();
        match err {
            LarkError::UnexpectedToken(e) => {
                assert_eq!(e.token.kind, "B");
                assert_eq!(e.expected, vec!["A".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
        let mut state = LexerState::new(b"b");
        let tok = lexer.next_token(&mut state, Some(1)).unwrap().unwrap();
        assert_eq!(tok.kind, "B");
    }

    #[test]
    fn test_case_insensitive_string() {
        let c = conf(vec![TerminalDef::new("SELECT", Pattern::string("select", "i"))], &[]);
        let lexer = BasicLexer::new(&c).unwrap();
        let toks = lex_all(&lexer, b"SeLeCt", None).unwrap();
        assert_eq!(toks[0].value, "SeLeCt");
    }
}
