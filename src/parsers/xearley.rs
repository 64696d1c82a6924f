//! Earley parsing with a dynamic lexer
//!
//! There is no token stream: at every byte offset the parser tries the
//! regexes of exactly the terminals its items expect, so two terminals may
//! overlap freely and the grammar decides between them. Each column of the
//! chart is a byte offset. A match ending at `m` is delayed until column `m`
//! is reached.
//!
//! With `complete_lex`, every shorter match of a terminal is tried as well
//! (`dynamic_complete`), at the cost of many more items.

use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{LarkError, UnexpectedCharacters};
use crate::lexer::LexerConf;
use crate::parsers::earley::{expected_terminals, Chart, EarleyOutput, EarleyParser};
use crate::parsers::earley_common::{Item, ItemKey, ItemSet};
use crate::regex_backend::Matcher;
use crate::source_location::LineCounter;
use crate::token::Token;

/// Terminal matchers for scanning raw text
#[derive(Clone)]
pub struct DynamicLexer {
    matchers: HashMap<String, Arc<dyn Matcher>>,
    ignore: Vec<Arc<dyn Matcher>>,
    complete_lex: bool,
}

impl DynamicLexer {
    /// Compile every terminal of `conf`
    pub fn new(conf: &LexerConf, complete_lex: bool) -> Result<Self, LarkError> {
        let mut matchers = HashMap::with_capacity(conf.terminals.len());
        for term in &conf.terminals {
            let matcher = conf.backend.compile(&conf.regexp_for(&term.pattern))?;
            matchers.insert(term.name.clone(), matcher);
        }
        let mut ignore = Vec::with_capacity(conf.ignore.len());
        for name in &conf.ignore {
            match matchers.get(name) {
                Some(m) => ignore.push(Arc::clone(m)),
                None => return Err(LarkError::grammar(format!("Terminals {} were marked to ignore but were not defined!", name))),
            }
        }
        Ok(Self {
            matchers,
            ignore,
            complete_lex,
        })
    }

    /// True when shorter matches are tried too
    pub fn complete_lex(&self) -> bool {
        self.complete_lex
    }

    /// Ends of the matches of `term` starting at `pos`, longest first
    fn match_ends(&self, term: &str, text: &[u8], pos: usize) -> Vec<usize> {
        let Some(matcher) = self.matchers.get(term) else {
            return Vec::new();
        };
        let Some(end) = matcher.match_at(text, pos).filter(|&e| e > pos) else {
            return Vec::new();
        };
        let mut ends = vec![end];
        if self.complete_lex {
            for e in (pos + 1..end).rev() {
                if !is_char_boundary(text, e) {
                    continue;
                }
                if let Some(shorter) = matcher.match_at(&text[..e], pos) {
                    if shorter > pos && !ends.contains(&shorter) {
                        ends.push(shorter);
                    }
                }
            }
        }
        ends
    }

    fn ignore_ends(&self, text: &[u8], pos: usize) -> Vec<usize> {
        let mut ends: Vec<usize> = self
            .ignore
            .iter()
            .filter_map(|m| m.match_at(text, pos))
            .filter(|&e| e > pos)
            .collect();
        ends.sort_unstable();
        ends.dedup();
        ends
    }

    /// Parse `text` as `start`
    pub fn parse(&self, parser: &EarleyParser, text: &[u8], start: &str) -> Result<EarleyOutput, LarkError> {
        let mut chart = Chart::new(parser, start)?;
        let grammar = chart.grammar();
        let start_sym = chart.start_symbol();
        let mut to_scan = chart.predict_start();
        let mut delayed: BTreeMap<usize, Vec<Item>> = BTreeMap::new();
        let mut line_ctr = LineCounter::new();

        let mut i = 0;
        loop {
            chart.predict_and_complete(i, &mut to_scan);
            if i >= text.len() {
                break;
            }

            let here = line_ctr.position();
            for item in to_scan.items() {
                let Some(sym) = grammar.expect(item) else {
                    continue;
                };
                let term = grammar.name(sym);
                for end in self.match_ends(term, text, i) {
                    let mut end_ctr = line_ctr.clone();
                    end_ctr.feed(&text[i..end], true);
                    let token = Token::with_span(
                        term,
                        String::from_utf8_lossy(&text[i..end]),
                        here,
                        end_ctr.position(),
                    );
                    let token_node = chart.token_node(&token, i, end);
                    let advanced = chart.advance_with_token(item, token_node, end);
                    delayed.entry(end).or_default().push(advanced);
                }
            }

            for end in self.ignore_ends(text, i) {
                let slot = delayed.entry(end).or_default();
                slot.extend(to_scan.items().iter().copied());
                let done = ItemKey::Complete {
                    origin: start_sym,
                    start: 0,
                };
                if let Some(item) = chart.columns[i].get(&done) {
                    slot.push(*item);
                }
            }

            let mut next_set = ItemSet::new();
            let mut next_to_scan = ItemSet::new();
            for item in delayed.remove(&(i + 1)).unwrap_or_default() {
                chart.place_next(item, &mut next_set, &mut next_to_scan);
            }

            if next_set.is_empty() && next_to_scan.is_empty() && delayed.is_empty() {
                let pos = line_ctr.position();
                return Err(LarkError::UnexpectedCharacters(UnexpectedCharacters::new(
                    text,
                    i,
                    pos.line,
                    pos.column,
                    expected_terminals(grammar, &to_scan),
                    None,
                    Vec::new(),
                )));
            }

            chart.columns.push(next_set);
            to_scan = next_to_scan;
            line_ctr.feed(&text[i..i + 1], true);
            i += 1;
        }

        chart.finish(i, &to_scan, line_ctr.position())
    }
}

fn is_char_boundary(text: &[u8], pos: usize) -> bool {
    text.get(pos).map_or(true, |&b| (b & 0xC0) != 0x80)
}

impl fmt::Debug for DynamicLexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.matchers.keys().collect();
        names.sort();
        f.debug_struct("DynamicLexer")
            .field("terminals", &names)
            .field("ignore", &self.ignore.len())
            .field("complete_lex", &self.complete_lex)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Pattern, Rule, Symbol, TerminalDef};
    use crate::lark::Ambiguity;
    use crate::parse_tree_builder::{ParseTreeBuilder, AMBIG};
    use crate::parsers::earley::TermInfo;
    use crate::regex_backend::DefaultBackend;
    use crate::tree::{Child, Tree};

    fn nt(n: &str) -> Symbol {
        Symbol::nonterminal(n)
    }

    fn t(n: &str) -> Symbol {
        Symbol::terminal(n)
    }

    fn setup(
        rules: Vec<Rule>,
        terms: Vec<TerminalDef>,
        ignore: &[&str],
        ambiguity: Ambiguity,
        complete: bool,
    ) -> (EarleyParser, DynamicLexer) {
        let explicit = ambiguity != Ambiguity::Resolve;
        let builder = ParseTreeBuilder::new(&rules, false, explicit, false);
        let infos = terms
            .iter()
            .map(|t| {
                (
                    t.name.clone(),
                    TermInfo {
                        priority: t.priority,
                        literal: t.pattern.is_str(),
                    },
                )
            })
            .collect();
        let conf = LexerConf::new(
            terms,
            ignore.iter().map(|s| s.to_string()).collect(),
            Arc::new(DefaultBackend::new()),
        );
        let parser = EarleyParser::new(rules, &["start".to_string()], builder, ambiguity, infos).unwrap();
        (parser, DynamicLexer::new(&conf, complete).unwrap())
    }

    fn tree_of(out: EarleyOutput) -> Tree {
        match out {
            EarleyOutput::Tree(Child::Tree(t)) => t,
            other => panic!("expected a tree, got {:?}", other),
        }
    }

    #[test]
    fn test_overlapping_terminals() {
        // start: A B ; A: /a+/ ; B: /a*b/
        let (parser, lexer) = setup(
            vec![Rule::new(nt("start"), vec![t("A"), t("B")])],
            vec![
                TerminalDef::new("A", Pattern::regex("a+", "")),
                TerminalDef::new("B", Pattern::regex("a*b", "")),
            ],
            &[],
            Ambiguity::Resolve,
            false,
        );
        let tree = tree_of(lexer.parse(&parser, b"aab", "start").unwrap());
        let values: Vec<&str> = tree.scan_values(|_| true).iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["aa", "b"]);
    }

    #[test]
    fn test_ignored_whitespace() {
        let (parser, lexer) = setup(
            vec![Rule::new(nt("start"), vec![t("WORD"), t("WORD")])],
            vec![
                TerminalDef::new("WORD", Pattern::regex("[a-z]+", "")),
                TerminalDef::new("WS", Pattern::regex(" +", "")),
            ],
            &["WS"],
            Ambiguity::Resolve,
            false,
        );
        let tree = tree_of(lexer.parse(&parser, b"  ab  cd  ", "start").unwrap());
        let tokens = tree.scan_values(|_| true);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].value, "cd");
        assert_eq!(tokens[1].column, 7);
    }

    #[test]
    fn test_complete_lex_finds_shorter_matches() {
        // start: WORD WORD ; WORD: /[a-z]+/
        let rules = vec![Rule::new(nt("start"), vec![t("WORD"), t("WORD")])];
        let terms = vec![TerminalDef::new("WORD", Pattern::regex("[a-z]+", ""))];
        let (parser, plain) = setup(rules.clone(), terms.clone(), &[], Ambiguity::Resolve, false);
        assert!(plain.parse(&parser, b"abc", "start").is_err());

        let (parser, complete) = setup(rules, terms, &[], Ambiguity::Explicit, true);
        let tree = tree_of(complete.parse(&parser, b"abc", "start").unwrap());
        assert_eq!(tree.data, AMBIG);
        assert_eq!(tree.children.len(), 2);
    }

    #[test]
    fn test_unexpected_characters() {
        let (parser, lexer) = setup(
            vec![Rule::new(nt("start"), vec![t("A"), t("B")])],
            vec![
                TerminalDef::new("A", Pattern::string("a", "")),
                TerminalDef::new("B", Pattern::string("b", "")),
            ],
            &[],
            Ambiguity::Resolve,
            false,
        );
        match lexer.parse(&parser, b"ac", "start").unwrap_err() {
            LarkError::UnexpectedCharacters(e) => {
                assert_eq!(e.char, 'c');
                assert_eq!(e.column, 2);
                assert_eq!(e.allowed, vec!["B".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(matches!(
            lexer.parse(&parser, b"a", "start").unwrap_err(),
            LarkError::UnexpectedEof(_)
        ));
    }

    #[test]
    fn test_string_terminal_preferred_over_regex() {
        // start: kw | name ; kw: IF ; name: NAME
        let (parser, lexer) = setup(
            vec![
                Rule::new(nt("start"), vec![nt("kw")]),
                Rule::new(nt("start"), vec![nt("name")]),
                Rule::new(nt("kw"), vec![t("IF")]),
                Rule::new(nt("name"), vec![t("NAME")]),
            ],
            vec![
                TerminalDef::new("IF", Pattern::string("if", "")),
                TerminalDef::new("NAME", Pattern::regex("[a-z]+", "")),
            ],
            &[],
            Ambiguity::Resolve,
            false,
        );
        let tree = tree_of(lexer.parse(&parser, b"if", "start").unwrap());
        assert_eq!(tree.children[0].as_tree().map(|t| t.data.as_str()), Some("kw"));
    }
}
