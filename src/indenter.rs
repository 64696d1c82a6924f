//! Indentation post-lexer
//!
//! Turns leading whitespace after newline tokens into `_INDENT` / `_DEDENT`
//! tokens, the way indentation-sensitive languages need. Newlines inside
//! brackets are swallowed.

use std::collections::VecDeque;

use crate::error::LarkError;
use crate::lexer::{PostLex, PostLexProcess};
use crate::token::Token;

/// Terminal names and tab width used by an [`Indenter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndenterConfig {
    /// Newline terminal; its text after the last `\n` is the indentation
    pub nl_type: String,
    /// Terminals that open a bracket
    pub open_paren_types: Vec<String>,
    /// Terminals that close a bracket
    pub close_paren_types: Vec<String>,
    /// Emitted when the indentation grows
    pub indent_type: String,
    /// Emitted for each indentation level closed
    pub dedent_type: String,
    /// Columns a tab counts for
    pub tab_len: usize,
}

impl IndenterConfig {
    /// Config without brackets
    pub fn new(nl_type: &str, indent_type: &str, dedent_type: &str, tab_len: usize) -> Self {
        Self {
            nl_type: nl_type.to_string(),
            open_paren_types: Vec::new(),
            close_paren_types: Vec::new(),
            indent_type: indent_type.to_string(),
            dedent_type: dedent_type.to_string(),
            tab_len,
        }
    }

    /// Python conventions: `_NEWLINE`, parens/brackets/braces, tab of 8
    pub fn python() -> Self {
        Self {
            nl_type: "_NEWLINE".to_string(),
            open_paren_types: vec!["LPAR".into(), "LSQB".into(), "LBRACE".into()],
            close_paren_types: vec!["RPAR".into(), "RSQB".into(), "RBRACE".into()],
            indent_type: "_INDENT".to_string(),
            dedent_type: "_DEDENT".to_string(),
            tab_len: 8,
        }
    }
}

/// Post-lexer emitting indentation tokens
#[derive(Debug, Clone)]
pub struct Indenter {
    config: IndenterConfig,
}

impl Indenter {
    /// Indenter with the given config
    pub fn new(config: IndenterConfig) -> Self {
        Self { config }
    }

    /// The configuration
    pub fn config(&self) -> &IndenterConfig {
        &self.config
    }
}

impl PostLex for Indenter {
    fn always_accept(&self) -> Vec<String> {
        vec![self.config.nl_type.clone()]
    }

    fn start(&self) -> Box<dyn PostLexProcess> {
        Box::new(IndenterState {
            config: self.config.clone(),
            paren_level: 0,
            indent_level: vec![0],
        })
    }
}

#[derive(Debug, Clone)]
struct IndenterState {
    config: IndenterConfig,
    paren_level: usize,
    indent_level: Vec<usize>,
}

impl IndenterState {
    fn handle_nl(&mut self, token: Token, out: &mut VecDeque<Token>) -> Result<(), LarkError> {
        if self.paren_level > 0 {
            return Ok(());
        }
        let indent_str = match token.value.rfind('\n') {
            Some(i) => token.value[i + 1..].to_string(),
            None => token.value.clone(),
        };
        let indent = indent_str.matches(' ').count()
            + indent_str.matches('\t').count() * self.config.tab_len;
        let current = self.indent_level.last().copied().unwrap_or(0);

        if indent > current {
            self.indent_level.push(indent);
            let tok = Token::new_borrow_pos(&self.config.indent_type, indent_str, &token);
            out.push_back(token);
            out.push_back(tok);
            return Ok(());
        }

        out.push_back(token.clone());
        while indent < self.indent_level.last().copied().unwrap_or(0) {
            self.indent_level.pop();
            out.push_back(Token::new_borrow_pos(&self.config.dedent_type, indent_str.clone(), &token));
        }
        let expected = self.indent_level.last().copied().unwrap_or(0);
        if indent != expected {
            return Err(LarkError::Dedent(format!(
                "Unexpected dedent to column {}. Expected dedent to {}",
                indent, expected
            )));
        }
        Ok(())
    }
}

impl PostLexProcess for IndenterState {
    fn feed(&mut self, token: Token, out: &mut VecDeque<Token>) -> Result<(), LarkError> {
        let kind = token.kind.clone();
        if kind == self.config.nl_type {
            self.handle_nl(token, out)?;
        } else {
            out.push_back(token);
        }
        if self.config.open_paren_types.contains(&kind) {
            self.paren_level += 1;
        } else if self.config.close_paren_types.contains(&kind) {
            self.paren_level = self.paren_level.saturating_sub(1);
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut VecDeque<Token>) -> Result<(), LarkError> {
        while self.indent_level.len() > 1 {
            self.indent_level.pop();
            out.push_back(Token::new(&self.config.dedent_type, ""));
        }
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn PostLexProcess> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(indenter: &Indenter, tokens: Vec<Token>) -> Result<Vec<String>, LarkError> {
        let mut state = indenter.start();
        let mut out = VecDeque::new();
        for t in tokens {
            state.feed(t, &mut out)?;
        }
        state.finish(&mut out)?;
        Ok(out.into_iter().map(|t| t.kind).collect())
    }

    fn nl(text: &str) -> Token {
        Token::new("_NL", text)
    }

    #[test]
    fn test_indent_and_dedent() {
        let indenter = Indenter::new(IndenterConfig::new("_NL", "_INDENT", "_DEDENT", 8));
        let kinds = run(
            &indenter,
            vec![
                Token::new("NAME", "a"),
                nl("\n    "),
                Token::new("NAME", "b"),
                nl("\n"),
                Token::new("NAME", "c"),
            ],
        )
        .unwrap();
        assert_eq!(kinds, vec!["NAME", "_NL", "_INDENT", "NAME", "_NL", "_DEDENT", "NAME"]);
    }

    #[test]
    fn test_unclosed_levels_dedent_at_end() {
        let indenter = Indenter::new(IndenterConfig::new("_NL", "_INDENT", "_DEDENT", 8));
        let kinds = run(&indenter, vec![nl("\n  "), nl("\n    ")]).unwrap();
        assert_eq!(kinds, vec!["_NL", "_INDENT", "_NL", "_INDENT", "_DEDENT", "_DEDENT"]);
    }

    #[test]
    fn test_inconsistent_dedent() {
        let indenter = Indenter::new(IndenterConfig::new("_NL", "_INDENT", "_DEDENT", 8));
        let err = run(&indenter, vec![nl("\n    "), nl("\n  ")]).unwrap_err();
        assert!(matches!(err, LarkError::Dedent(_)));
    }

    #[test]
    fn test_newlines_inside_parens_are_dropped() {
        let indenter = Indenter::new(IndenterConfig {
            nl_type: "_NEWLINE".into(),
            ..IndenterConfig::python()
        });
        let kinds = run(
            &indenter,
            vec![
                Token::new("LPAR", "("),
                Token::new("_NEWLINE", "\n    "),
                Token::new("RPAR", ")"),
            ],
        )
        .unwrap();
        assert_eq!(kinds, vec!["LPAR", "RPAR"]);
    }

    #[test]
    fn test_tab_width() {
        let indenter = Indenter::new(IndenterConfig::new("_NL", "_INDENT", "_DEDENT", 4));
        let kinds = run(&indenter, vec![nl("\n\t"), nl("\n    ")]).unwrap();
        assert_eq!(kinds, vec!["_NL", "_INDENT", "_NL", "_DEDENT"]);
    }
}
