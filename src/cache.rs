//! On-disk cache of built LALR parsers
//!
//! A cache file starts with one line holding the hex cache key, followed by
//! the JSON of [`Lark::save`]. The key digests the grammar text, the
//! serializable options and the crate version, so any change to them is a
//! miss. Unreadable or stale files are rebuilt; failed writes only log.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LarkError;
use crate::lark::{Lark, LarkOptions, VERSION};
use crate::load_grammar::loader::fixed_state;
use crate::serialize::SerializedLark;

/// Where to cache a built parser
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheSetting {
    /// No caching
    #[default]
    Off,
    /// A file in the system temp directory named after the cache key
    Auto,
    /// A specific file
    File(PathBuf),
}

/// Digest of everything the built parser depends on
pub fn cache_key(grammar: &str, options: &LarkOptions) -> Result<u64, LarkError> {
    let options_json = serde_json::to_string(options)?;
    Ok(fixed_state().hash_one((grammar, options_json.as_str(), VERSION)))
}

/// Cache file for `setting`, or `None` when caching is off
pub fn cache_path(setting: &CacheSetting, grammar: &str, options: &LarkOptions) -> Result<Option<PathBuf>, LarkError> {
    Ok(match setting {
        CacheSetting::Off => None,
        CacheSetting::Auto => {
            let key = cache_key(grammar, options)?;
            Some(std::env::temp_dir().join(format!(".lark_cache_{:016x}_{}.tmp", key, VERSION)))
        }
        CacheSetting::File(path) => Some(path.clone()),
    })
}

/// Load a cached parser; `None` on any miss
pub fn load(path: &Path, grammar: &str, options: &LarkOptions) -> Option<Lark> {
    let result = (|| -> Result<Option<Lark>, LarkError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let Some((key_line, json)) = content.split_once('\n') else {
            return Ok(None);
        };
        let key = format!("{:016x}", cache_key(grammar, options)?);
        if key_line.trim() != key {
            return Ok(None);
        }
        let saved = SerializedLark::from_json(json)?;
        Ok(Some(saved.into_lark(options.clone())?))
    })();
    match result {
        Ok(Some(lark)) => {
            log_debug!("Loaded parser from cache {}", path.display());
            Some(lark)
        }
        Ok(None) => {
            log_debug!("Cache miss for {}", path.display());
            None
        }
        Err(e) => {
            log_debug!("Failed to load cache {}: {}", path.display(), e);
            None
        }
    }
}

/// Write `lark` to the cache; failures are logged and otherwise ignored
pub fn store(path: &Path, grammar: &str, lark: &Lark) {
    let result = (|| -> Result<(), LarkError> {
        let key = cache_key(grammar, lark.options())?;
        let json = lark.save()?;
        fs::write(path, format!("{:016x}\n{}", key, json))?;
        Ok(())
    })();
    match result {
        Ok(()) => log_debug!("Saved parser to cache {}", path.display()),
        Err(e) => log_warn!("Failed to save parser cache to {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lark::ParserKind;

    const GRAMMAR: &str = "start: \"a\"+\n";

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lark_cache_test_{}_{}.tmp", name, std::process::id()))
    }

    #[test]
    fn test_key_changes_with_inputs() {
        let options = LarkOptions::default().parser(ParserKind::Lalr);
        let a = cache_key(GRAMMAR, &options).unwrap();
        assert_eq!(a, cache_key(GRAMMAR, &options).unwrap());
        assert_ne!(a, cache_key("start: \"b\"+\n", &options).unwrap());
        assert_ne!(a, cache_key(GRAMMAR, &options.clone().keep_all_tokens(true)).unwrap());
    }

    #[test]
    fn test_file_cache_roundtrip() {
        let path = temp_file("roundtrip");
        let _ = fs::remove_file(&path);
        let options = LarkOptions::default()
            .parser(ParserKind::Lalr)
            .cache(CacheSetting::File(path.clone()));

        let built = Lark::new(GRAMMAR, options.clone()).unwrap();
        assert!(path.exists());
        let cached = load(&path, GRAMMAR, &options).expect("cache hit");
        assert_eq!(built.parse("aaa").unwrap(), cached.parse("aaa").unwrap());

        assert!(load(&path, "start: \"b\"+\n", &options).is_none());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_corrupt_cache_is_rebuilt() {
        let path = temp_file("corrupt");
        fs::write(&path, "not a cache").unwrap();
        let options = LarkOptions::default()
            .parser(ParserKind::Lalr)
            .cache(CacheSetting::File(path.clone()));
        let parser = Lark::new(GRAMMAR, options).unwrap();
        assert!(parser.parse("a").is_ok());
        let _ = fs::remove_file(&path);
    }
}
