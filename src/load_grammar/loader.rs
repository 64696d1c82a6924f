//! Where `%import` finds grammar text
//!
//! A [`Loader`] maps a relative grammar path such as `common.lark` or
//! `lib/sep.lark` to its text. The builder tries, in order, the loaders given
//! in the options, the directory of the importing grammar (relative imports
//! only), and finally the built-in library.

use hashbrown::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::LarkError;

/// Extension of grammar files
pub const GRAMMAR_EXT: &str = ".lark";

const COMMON_GRAMMAR: &str = include_str!("../../grammars/common.lark");

/// Grammar text returned by a [`Loader`]
#[derive(Debug, Clone)]
pub struct LoadedGrammar {
    /// Name used in messages and as the key for change detection
    pub source: String,
    /// Grammar text
    pub text: String,
    /// Directory that relative imports inside this grammar resolve against
    pub base: Option<PathBuf>,
}

/// A source of importable grammars
pub trait Loader: Send + Sync + fmt::Debug {
    /// Text of `grammar_path`, or `None` if this loader doesn't have it
    fn load(&self, grammar_path: &str) -> Result<Option<LoadedGrammar>, LarkError>;
}

/// Loads grammars from a directory
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    /// Loader rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory this loader reads from
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Loader for FsLoader {
    fn load(&self, grammar_path: &str) -> Result<Option<LoadedGrammar>, LarkError> {
        let full = self.root.join(grammar_path);
        if !full.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&full)
            .map_err(|e| LarkError::Io(format!("{}: {}", full.display(), e)))?;
        Ok(Some(LoadedGrammar {
            source: full.display().to_string(),
            base: full.parent().map(Path::to_path_buf),
            text,
        }))
    }
}

/// Serves grammars from memory, keyed by path (`sep.lark`)
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: HashMap<String, String>,
}

impl MemoryLoader {
    /// Empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grammar under `path`
    pub fn with_file(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.files.insert(path.into(), text.into());
        self
    }
}

impl Loader for MemoryLoader {
    fn load(&self, grammar_path: &str) -> Result<Option<LoadedGrammar>, LarkError> {
        Ok(self.files.get(grammar_path).map(|text| LoadedGrammar {
            source: format!("<memory>/{}", grammar_path),
            text: text.clone(),
            base: None,
        }))
    }
}

/// The grammars shipped with the crate (`common`)
#[derive(Debug, Clone, Copy, Default)]
pub struct StdlibLoader;

impl Loader for StdlibLoader {
    fn load(&self, grammar_path: &str) -> Result<Option<LoadedGrammar>, LarkError> {
        let text = match grammar_path {
            "common.lark" => COMMON_GRAMMAR,
            _ => return Ok(None),
        };
        Ok(Some(LoadedGrammar {
            source: format!("<stdlib>/{}", grammar_path),
            text: text.to_string(),
            base: None,
        }))
    }
}

/// Relative file path of a dotted import path
pub fn grammar_path(dotted: &[String]) -> String {
    format!("{}{}", dotted.join("/"), GRAMMAR_EXT)
}

/// Stable 64-bit digest of grammar text
pub fn content_hash(text: &str) -> u64 {
    fixed_state().hash_one(text)
}

/// Hasher state with fixed seeds, for digests that must survive restarts
pub(crate) fn fixed_state() -> ahash::RandomState {
    ahash::RandomState::with_seeds(
        0x6c61_726b_5f67_7261,
        0x6d6d_6172_5f68_6173,
        0x0123_4567_89ab_cdef,
        0xfedc_ba98_7654_3210,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdlib_serves_common() {
        let loaded = StdlibLoader.load("common.lark").unwrap().unwrap();
        assert!(loaded.text.contains("SIGNED_NUMBER"));
        assert!(StdlibLoader.load("missing.lark").unwrap().is_none());
    }

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new().with_file("lib/sep.lark", "x: \"x\"\n");
        assert!(loader.load("lib/sep.lark").unwrap().is_some());
        assert!(loader.load("sep.lark").unwrap().is_none());
        assert_eq!(grammar_path(&["lib".into(), "sep".into()]), "lib/sep.lark");
    }

    #[test]
    fn test_fs_loader_missing_file() {
        let loader = FsLoader::new(std::env::temp_dir().join("lark-no-such-dir"));
        assert!(loader.load("common.lark").unwrap().is_none());
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("a: b\n"), content_hash("a: b\n"));
        assert_ne!(content_hash("a: b\n"), content_hash("a: c\n"));
    }
}
