//! Pluggable regex engine
//!
//! Terminals are compiled through a [`RegexBackend`]. The default backend
//! wraps `regex::bytes` so the same matchers serve `&str` and byte input, and
//! answers width queries from the `regex-syntax` HIR. Compiled matchers are
//! cached per backend instance.

use hashbrown::HashMap;
use once_cell::sync::OnceCell;
use regex::bytes::{Regex, RegexBuilder, RegexSet, RegexSetBuilder};
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::LarkError;

/// Maximum number of patterns combined into one alternation set
pub const GROUP_LIMIT: usize = 100;

/// What a backend supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `\p{..}` Unicode property classes
    pub unicode_classes: bool,
}

/// A compiled pattern
pub trait Matcher: Send + Sync + fmt::Debug {
    /// End offset of a match that starts exactly at `pos`
    fn match_at(&self, text: &[u8], pos: usize) -> Option<usize>;

    /// True if the pattern matches all of `text`
    fn full_match(&self, text: &[u8]) -> bool;
}

/// A compiled group of patterns tested together
pub trait MatcherSet: Send + Sync + fmt::Debug {
    /// Indices of the patterns that match at `pos`, ascending
    fn matching_at(&self, text: &[u8], pos: usize) -> Vec<usize>;
}

/// Regex engine used by the terminal compiler and the lexers
pub trait RegexBackend: Send + Sync + fmt::Debug {
    /// Backend identifier, recorded in serialized parsers
    fn name(&self) -> &str;

    /// Feature flags the grammar compiler checks patterns against
    fn capabilities(&self) -> Capabilities;

    /// Compile one pattern
    fn compile(&self, pattern: &str) -> Result<Arc<dyn Matcher>, LarkError>;

    /// Compile a group of at most [`GROUP_LIMIT`] patterns
    fn compile_set(&self, patterns: &[String]) -> Result<Arc<dyn MatcherSet>, LarkError>;

    /// `(min, max)` byte length of the strings the pattern matches
    ///
    /// `usize::MAX` stands for an unbounded maximum.
    fn width(&self, pattern: &str) -> Result<(usize, usize), LarkError>;
}

/// Backend built on the `regex` crate
pub struct DefaultBackend {
    unicode: bool,
    cache: Mutex<HashMap<String, Arc<dyn Matcher>>>,
}

impl DefaultBackend {
    /// Unicode-aware backend
    pub fn new() -> Self {
        Self {
            unicode: true,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Byte-oriented backend for `use_bytes`; classes are ASCII-only
    pub fn bytes() -> Self {
        Self {
            unicode: false,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached matchers
    pub fn cache_size(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn build(&self, pattern: &str) -> Result<Regex, LarkError> {
        RegexBuilder::new(pattern)
            .unicode(self.unicode)
            .build()
            .map_err(|e| LarkError::grammar(format!("Cannot compile regexp {}: {}", pattern, e)))
    }
}

impl Default for DefaultBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultBackend")
            .field("unicode", &self.unicode)
            .field("cached", &self.cache_size())
            .finish()
    }
}

impl RegexBackend for DefaultBackend {
    fn name(&self) -> &str {
        if self.unicode {
            "regex"
        } else {
            "regex-bytes"
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            unicode_classes: self.unicode,
        }
    }

    fn compile(&self, pattern: &str) -> Result<Arc<dyn Matcher>, LarkError> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(m) = cache.get(pattern) {
                return Ok(Arc::clone(m));
            }
        }
        let anchored = self.build(&format!(r"\A(?:{})", pattern))?;
        let matcher: Arc<dyn Matcher> = Arc::new(RegexMatcher {
            source: pattern.to_string(),
            unicode: self.unicode,
            anchored,
            full: OnceCell::new(),
        });
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(pattern.to_string(), Arc::clone(&matcher));
        }
        Ok(matcher)
    }

    fn compile_set(&self, patterns: &[String]) -> Result<Arc<dyn MatcherSet>, LarkError> {
        if patterns.len() > GROUP_LIMIT {
            return Err(LarkError::internal(format!(
                "pattern group of {} exceeds the limit of {}",
                patterns.len(),
                GROUP_LIMIT
            )));
        }
        let set = RegexSetBuilder::new(patterns.iter().map(|p| format!(r"\A(?:{})", p)))
            .unicode(self.unicode)
            .build()
            .map_err(|e| LarkError::grammar(format!("Cannot compile terminal group: {}", e)))?;
        Ok(Arc::new(RegexGroup { set }))
    }

    fn width(&self, pattern: &str) -> Result<(usize, usize), LarkError> {
        let hir = regex_syntax::ParserBuilder::new()
            .utf8(false)
            .unicode(self.unicode)
            .build()
            .parse(pattern)
            .map_err(|e| LarkError::grammar(format!("Cannot analyze regexp {}: {}", pattern, e)))?;
        let props = hir.properties();
        Ok((
            props.minimum_len().unwrap_or(0),
            props.maximum_len().unwrap_or(usize::MAX),
        ))
    }
}

struct RegexMatcher {
    source: String,
    unicode: bool,
    anchored: Regex,
    full: OnceCell<Option<Regex>>,
}

impl fmt::Debug for RegexMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegexMatcher({:?})", self.source)
    }
}

impl Matcher for RegexMatcher {
    #[inline]
    fn match_at(&self, text: &[u8], pos: usize) -> Option<usize> {
        let rest = text.get(pos..)?;
        self.anchored.find(rest).map(|m| pos + m.end())
    }

    fn full_match(&self, text: &[u8]) -> bool {
        let full = self.full.get_or_init(|| {
            RegexBuilder::new(&format!(r"\A(?:{})\z", self.source))
                .unicode(self.unicode)
                .build()
                .ok()
        });
        full.as_ref().is_some_and(|re| re.is_match(text))
    }
}

#[derive(Debug)]
struct RegexGroup {
    set: RegexSet,
}

impl MatcherSet for RegexGroup {
    fn matching_at(&self, text: &[u8], pos: usize) -> Vec<usize> {
        match text.get(pos..) {
            Some(rest) => self.set.matches(rest).into_iter().collect(),
            None => Vec::new(),
        }
    }
}

/// True if a pattern uses Unicode property classes
pub fn uses_unicode_classes(pattern: &str) -> bool {
    pattern.contains(r"\p{") || pattern.contains(r"\P{")
}
