//! Quoted literals of the grammar language
//!
//! `"..."` strings and `/.../` regexes keep their escapes close to how they
//! were written: `\n`, `\t`, `\f`, `\r`, `\xNN` and `\uNNNN` are decoded,
//! `\"` becomes a quote, and every other escape is passed through to the
//! regex engine untouched.

use crate::error::LarkError;
use crate::grammar::Pattern;

/// Flags a literal may carry after its closing delimiter
pub const RE_FLAGS: &str = "imslux";

/// Conventional names for punctuation literals
pub const TERMINAL_NAMES: &[(&str, &str)] = &[
    (".", "DOT"),
    (",", "COMMA"),
    (":", "COLON"),
    (";", "SEMICOLON"),
    ("+", "PLUS"),
    ("-", "MINUS"),
    ("*", "STAR"),
    ("/", "SLASH"),
    ("\\", "BACKSLASH"),
    ("|", "VBAR"),
    ("?", "QMARK"),
    ("!", "BANG"),
    ("@", "AT"),
    ("#", "HASH"),
    ("$", "DOLLAR"),
    ("%", "PERCENT"),
    ("^", "CIRCUMFLEX"),
    ("&", "AMPERSAND"),
    ("_", "UNDERSCORE"),
    ("<", "LESSTHAN"),
    (">", "MORETHAN"),
    ("=", "EQUAL"),
    ("\"", "DBLQUOTE"),
    ("'", "QUOTE"),
    ("`", "BACKQUOTE"),
    ("~", "TILDE"),
    ("(", "LPAR"),
    (")", "RPAR"),
    ("{", "LBRACE"),
    ("}", "RBRACE"),
    ("[", "LSQB"),
    ("]", "RSQB"),
    ("\n", "NEWLINE"),
    ("\r\n", "CRLF"),
    ("\t", "TAB"),
    (" ", "SPACE"),
];

/// Conventional terminal name of a punctuation literal
pub fn punctuation_name(value: &str) -> Option<&'static str> {
    TERMINAL_NAMES.iter().find(|(v, _)| *v == value).map(|(_, n)| *n)
}

/// Decode the escapes of a literal body
pub fn eval_escaping(s: &str) -> Result<String, LarkError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(n) = chars.next() else {
            return Err(LarkError::grammar(format!(
                "Literal ended unexpectedly (bad escaping): `{}`",
                s
            )));
        };
        match n {
            '\\' => out.push_str("\\\\"),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'f' => out.push('\x0c'),
            'r' => out.push('\r'),
            'x' => out.push(hex_escape(&mut chars, 2, s)?),
            'u' => out.push(hex_escape(&mut chars, 4, s)?),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

fn hex_escape(chars: &mut std::str::Chars<'_>, len: usize, source: &str) -> Result<char, LarkError> {
    let digits: String = chars.by_ref().take(len).collect();
    if digits.len() != len {
        return Err(LarkError::grammar(format!("Bad escape sequence in literal: `{}`", source)));
    }
    u32::from_str_radix(&digits, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| LarkError::grammar(format!("Bad escape sequence in literal: `{}`", source)))
}

/// Compile a raw `"..."flags` or `/.../flags` literal
pub fn literal_to_pattern(raw: &str, is_regex: bool) -> Result<Pattern, LarkError> {
    let flag_start = raw
        .rfind(['/', '"'])
        .map(|i| i + 1)
        .ok_or_else(|| LarkError::grammar(format!("Malformed literal {}", raw)))?;
    let flags = &raw[flag_start..];
    if let Some(bad) = flags.chars().find(|f| !RE_FLAGS.contains(*f)) {
        return Err(LarkError::grammar(format!("Unknown flag '{}' in literal {}", bad, raw)));
    }
    if !is_regex && raw.contains('\n') {
        return Err(LarkError::grammar("You cannot put newlines in string literals"));
    }
    if is_regex && raw.contains('\n') && !flags.contains('x') {
        return Err(LarkError::grammar(
            "You can only use newlines in regular expressions with the `x` (verbose) flag",
        ));
    }

    let quoted = &raw[..flag_start];
    if quoted.len() < 2 {
        return Err(LarkError::grammar(format!("Malformed literal {}", raw)));
    }
    let body = eval_escaping(&quoted[1..quoted.len() - 1])?;
    if is_regex {
        Ok(Pattern::regex(body.replace("\\/", "/"), flags))
    } else {
        Ok(Pattern::string(body.replace("\\\\", "\\"), flags))
    }
}

/// Compile `"a".."z"` into a character class
pub fn range_to_pattern(start: &str, end: &str) -> Result<Pattern, LarkError> {
    let inner = |raw: &str| -> Result<String, LarkError> {
        let body = raw
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix('"'))
            .ok_or_else(|| LarkError::grammar(format!("Range bounds must be strings, got {}", raw)))?;
        let decoded = eval_escaping(body)?.replace("\\\\", "\\");
        if decoded.chars().count() != 1 {
            return Err(LarkError::grammar(format!(
                "Range bounds must be single characters, got {}",
                raw
            )));
        }
        Ok(body.to_string())
    };
    let (a, b) = (inner(start)?, inner(end)?);
    Ok(Pattern::regex(format!("[{}-{}]", a, b), ""))
}

/// True if `value` looks like an identifier (`[A-Za-z_][A-Za-z0-9_]*`, Unicode letters included)
pub fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_escaping() {
        assert_eq!(eval_escaping(r"a\nb").unwrap(), "a\nb");
        assert_eq!(eval_escaping(r"\d+").unwrap(), r"\d+");
        assert_eq!(eval_escaping(r#"\""#).unwrap(), "\"");
        assert_eq!(eval_escaping(r"\x41é").unwrap(), "A\u{e9}");
        assert_eq!(eval_escaping(r"\\").unwrap(), r"\\");
        assert!(eval_escaping("abc\\").is_err());
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(literal_to_pattern(r#""abc""#, false).unwrap(), Pattern::string("abc", ""));
        assert_eq!(literal_to_pattern(r#""abc"i"#, false).unwrap(), Pattern::string("abc", "i"));
        assert_eq!(literal_to_pattern(r#""a\\b""#, false).unwrap(), Pattern::string("a\\b", ""));
        assert!(literal_to_pattern("\"a\nb\"", false).is_err());
    }

    #[test]
    fn test_regex_literals() {
        assert_eq!(literal_to_pattern(r"/\d+/", true).unwrap(), Pattern::regex(r"\d+", ""));
        assert_eq!(literal_to_pattern(r"/a\/b/i", true).unwrap(), Pattern::regex("a/b", "i"));
        assert!(literal_to_pattern("/a\nb/", true).is_err());
        assert!(literal_to_pattern("/a\nb/x", true).is_ok());
        assert!(literal_to_pattern("/a/q", true).is_err());
    }

    #[test]
    fn test_ranges_and_names() {
        assert_eq!(range_to_pattern("\"a\"", "\"z\"").unwrap(), Pattern::regex("[a-z]", ""));
        assert!(range_to_pattern("\"ab\"", "\"z\"").is_err());
        assert_eq!(punctuation_name("("), Some("LPAR"));
        assert_eq!(punctuation_name("foo"), None);
        assert!(is_identifier("foo_1"));
        assert!(!is_identifier("1foo"));
        assert!(!is_identifier("a-b"));
    }
}
