//! CYK parsing
//!
//! The grammar is converted to Chomsky normal form once: terminals inside
//! longer rules are lifted into wrapper rules and long rules are split into
//! chains of binary rules. Unit rules stay in the grammar and are closed over
//! inside each table cell. Every CNF rule remembers where it came from, so the
//! best derivation is folded back into the original rules before the tree
//! callbacks run.
//!
//! Among the derivations of a symbol over a span, the one with the fewest
//! nodes wins, then the lowest rule index.

use hashbrown::HashMap;
use std::fmt;

use crate::error::{LarkError, UnexpectedEof, UnexpectedToken};
use crate::grammar::{Rule, RuleId};
use crate::lexer::LexerThread;
use crate::parse_tree_builder::ParseTreeBuilder;
use crate::token::Token;
use crate::tree::Child;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Head of an original rule
    User(RuleId),
    /// Tail piece of a split rule
    Split,
    /// Wrapper around a lifted terminal
    Lifted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rhs {
    Term(String),
    Unit(usize),
    Pair(usize, usize),
}

#[derive(Debug, Clone)]
struct CnfRule {
    lhs: usize,
    rhs: Rhs,
    origin: Origin,
}

/// Best derivation of a symbol over a span
#[derive(Debug, Clone, Copy)]
struct Entry {
    rule: usize,
    size: usize,
    split: usize,
}

/// Grammar in Chomsky normal form, ready for table parsing
#[derive(Clone)]
pub struct CykParser {
    rules: Vec<Rule>,
    builder: ParseTreeBuilder,
    cnf: Vec<CnfRule>,
    names: Vec<String>,
    ids: HashMap<String, usize>,
    by_term: HashMap<String, Vec<usize>>,
    units: Vec<usize>,
    by_left: HashMap<usize, Vec<usize>>,
}

impl CykParser {
    /// Convert `rules` to CNF
    ///
    /// Empty rules have no CNF counterpart and are rejected.
    pub fn new(rules: Vec<Rule>, builder: ParseTreeBuilder) -> Result<Self, LarkError> {
        let mut p = Self {
            rules,
            builder,
            cnf: Vec::new(),
            names: Vec::new(),
            ids: HashMap::new(),
            by_term: HashMap::new(),
            units: Vec::new(),
            by_left: HashMap::new(),
        };
        let mut lifted: HashMap<String, usize> = HashMap::new();
        let rules = p.rules.clone();
        for (rid, rule) in rules.iter().enumerate() {
            if rule.expansion.is_empty() {
                return Err(LarkError::grammar(format!(
                    "Empty rules are not supported by the CYK parser: {}",
                    rule.origin
                )));
            }
            let lhs = p.intern(rule.origin.name());
            if let [sym] = rule.expansion.as_slice() {
                let rhs = if sym.is_term() {
                    Rhs::Term(sym.name().to_string())
                } else {
                    Rhs::Unit(p.intern(sym.name()))
                };
                p.push(lhs, rhs, Origin::User(rid));
                continue;
            }

            let mut syms = Vec::with_capacity(rule.expansion.len());
            for sym in &rule.expansion {
                if sym.is_term() {
                    let id = match lifted.get(sym.name()) {
                        Some(&id) => id,
                        None => {
                            let id = p.intern(&format!("__{}_term", sym.name()));
                            p.push(id, Rhs::Term(sym.name().to_string()), Origin::Lifted);
                            lifted.insert(sym.name().to_string(), id);
                            id
                        }
                    };
                    syms.push(id);
                } else {
                    syms.push(p.intern(sym.name()));
                }
            }

            let mut head = lhs;
            let mut origin = Origin::User(rid);
            let last = syms.len() - 2;
            for (k, &left) in syms[..=last].iter().enumerate() {
                let right = if k == last {
                    syms[k + 1]
                } else {
                    p.intern(&format!("__{}_split_{}_{}", rule.origin.name(), rid, k))
                };
                p.push(head, Rhs::Pair(left, right), origin);
                head = right;
                origin = Origin::Split;
            }
        }
        log_debug!("CYK grammar: {} rules in normal form", p.cnf.len());
        Ok(p)
    }

    fn intern(&mut self, name: &str) -> usize {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    fn push(&mut self, lhs: usize, rhs: Rhs, origin: Origin) {
        let idx = self.cnf.len();
        match &rhs {
            Rhs::Term(t) => self.by_term.entry(t.clone()).or_default().push(idx),
            Rhs::Unit(_) => self.units.push(idx),
            Rhs::Pair(b, _) => self.by_left.entry(*b).or_default().push(idx),
        }
        self.cnf.push(CnfRule { lhs, rhs, origin });
    }

    /// Number of rules in normal form
    pub fn cnf_len(&self) -> usize {
        self.cnf.len()
    }

    /// Parse the tokens of `lexer` as `start`
    pub fn parse(&self, lexer: &mut LexerThread<'_>, start: &str) -> Result<Child, LarkError> {
        let mut tokens = Vec::new();
        while let Some(tok) = lexer.next_token(None)? {
            tokens.push(tok);
        }
        self.parse_tokens(&tokens, start)
    }

    /// Parse a token list as `start`
    pub fn parse_tokens(&self, tokens: &[Token], start: &str) -> Result<Child, LarkError> {
        let start_id = self
            .ids
            .get(start)
            .copied()
            .ok_or_else(|| LarkError::config(format!("Unknown start rule {}", start)))?;
        let n = tokens.len();
        if n == 0 {
            let mut expected: Vec<String> = self.by_term.keys().cloned().collect();
            expected.sort();
            return Err(LarkError::UnexpectedEof(UnexpectedEof::new(expected, 0, 1, 1)));
        }

        let width = n + 1;
        let mut table: Vec<HashMap<usize, Entry>> = vec![HashMap::new(); width * width];
        for (i, tok) in tokens.iter().enumerate() {
            let cell = &mut table[i * width + i + 1];
            for &r in self.by_term.get(&tok.kind).into_iter().flatten() {
                offer(cell, self.cnf[r].lhs, Entry { rule: r, size: 1, split: i + 1 });
            }
            self.close_units(cell);
        }

        for len in 2..=n {
            for i in 0..=n - len {
                let j = i + len;
                let mut cell: HashMap<usize, Entry> = HashMap::new();
                for k in i + 1..j {
                    let left = &table[i * width + k];
                    let right = &table[k * width + j];
                    if left.is_empty() || right.is_empty() {
                        continue;
                    }
                    for (b, lb) in left {
                        for &r in self.by_left.get(b).into_iter().flatten() {
                            let Rhs::Pair(_, c) = self.cnf[r].rhs else {
                                continue;
                            };
                            if let Some(rc) = right.get(&c) {
                                let entry = Entry {
                                    rule: r,
                                    size: 1 + lb.size + rc.size,
                                    split: k,
                                };
                                offer(&mut cell, self.cnf[r].lhs, entry);
                            }
                        }
                    }
                }
                self.close_units(&mut cell);
                table[i * width + j] = cell;
            }
        }

        if !table[n].contains_key(&start_id) {
            let reach = (1..=n).rev().find(|&k| !table[k].is_empty()).unwrap_or(0);
            return match tokens.get(reach) {
                Some(tok) => Err(LarkError::UnexpectedToken(UnexpectedToken::new(tok.clone(), Vec::new(), None))),
                None => {
                    let end = tokens[n - 1].end();
                    Err(LarkError::UnexpectedEof(UnexpectedEof::new(Vec::new(), end.offset, end.line, end.column)))
                }
            };
        }

        let mut out = self.revert(&table, width, tokens, start_id, 0, n)?;
        match out.pop() {
            Some(child) if out.is_empty() => Ok(child),
            _ => Err(LarkError::internal("CYK derivation of the start symbol is not a single node")),
        }
    }

    fn close_units(&self, cell: &mut HashMap<usize, Entry>) {
        loop {
            let mut changed = false;
            for &r in &self.units {
                let Rhs::Unit(b) = self.cnf[r].rhs else {
                    continue;
                };
                if let Some(&eb) = cell.get(&b) {
                    let entry = Entry {
                        rule: r,
                        size: eb.size + 1,
                        split: eb.split,
                    };
                    changed |= offer(cell, self.cnf[r].lhs, entry);
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Children contributed by `sym` over `i..j` to the enclosing original rule
    ///
    /// Split and lifted symbols dissolve into their parts; a user rule becomes
    /// one built node.
    fn revert(
        &self,
        table: &[HashMap<usize, Entry>],
        width: usize,
        tokens: &[Token],
        sym: usize,
        i: usize,
        j: usize,
    ) -> Result<Vec<Child>, LarkError> {
        let entry = table[i * width + j]
            .get(&sym)
            .copied()
            .ok_or_else(|| LarkError::internal(format!("CYK table misses {} over {}..{}", self.names[sym], i, j)))?;
        let rule = &self.cnf[entry.rule];
        let parts = match &rule.rhs {
            Rhs::Term(_) => vec![Child::Token(tokens[i].clone())],
            Rhs::Unit(b) => self.revert(table, width, tokens, *b, i, j)?,
            Rhs::Pair(b, c) => {
                let mut parts = self.revert(table, width, tokens, *b, i, entry.split)?;
                parts.extend(self.revert(table, width, tokens, *c, entry.split, j)?);
                parts
            }
        };
        match rule.origin {
            Origin::User(rid) => Ok(vec![self.builder.build(rid, parts)]),
            Origin::Split | Origin::Lifted => Ok(parts),
        }
    }
}

/// Keep the smaller derivation; true if `entry` was stored
fn offer(cell: &mut HashMap<usize, Entry>, sym: usize, entry: Entry) -> bool {
    match cell.get(&sym) {
        Some(old) if (old.size, old.rule) <= (entry.size, entry.rule) => false,
        _ => {
            cell.insert(sym, entry);
            true
        }
    }
}

impl fmt::Debug for CykParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CykParser")
            .field("rules", &self.rules.len())
            .field("cnf_rules", &self.cnf.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Symbol;
    use crate::tree::Tree;

    fn nt(n: &str) -> Symbol {
        Symbol::nonterminal(n)
    }

    fn t(n: &str) -> Symbol {
        Symbol::terminal(n)
    }

    fn cyk(rules: Vec<Rule>) -> CykParser {
        let builder = ParseTreeBuilder::new(&rules, false, false, false);
        CykParser::new(rules, builder).unwrap()
    }

    fn toks(kinds: &[&str]) -> Vec<Token> {
        kinds.iter().map(|k| Token::new(*k, k.to_lowercase())).collect()
    }

    #[test]
    fn test_long_rule_is_reverted() {
        // start: A B C D
        let parser = cyk(vec![Rule::new(nt("start"), vec![t("A"), t("B"), t("C"), t("D")])]);
        let tree = parser.parse_tokens(&toks(&["A", "B", "C", "D"]), "start").unwrap();
        let expected = Tree::new(
            "start",
            ["a", "b", "c", "d"]
                .iter()
                .zip(["A", "B", "C", "D"])
                .map(|(v, k)| Child::Token(Token::new(k, *v)))
                .collect(),
        );
        assert_eq!(tree, Child::Tree(expected));
    }

    #[test]
    fn test_unit_rules_and_recursion() {
        // start: expr ; expr: expr PLUS term | term ; term: NUM
        let parser = cyk(vec![
            Rule::new(nt("start"), vec![nt("expr")]),
            Rule::new(nt("expr"), vec![nt("expr"), t("PLUS"), nt("term")]),
            Rule::new(nt("expr"), vec![nt("term")]),
            Rule::new(nt("term"), vec![t("NUM")]),
        ]);
        let tree = parser
            .parse_tokens(&toks(&["NUM", "PLUS", "NUM", "PLUS", "NUM"]), "start")
            .unwrap();
        let tree = tree.as_tree().unwrap();
        assert_eq!(tree.find_data("term").count(), 3);
        assert_eq!(tree.find_data("expr").count(), 3);
    }

    #[test]
    fn test_fewest_nodes_wins() {
        // start: a | b ; a: X ; b: c ; c: X
        let parser = cyk(vec![
            Rule::new(nt("start"), vec![nt("b")]),
            Rule::new(nt("start"), vec![nt("a")]),
            Rule::new(nt("a"), vec![t("X")]),
            Rule::new(nt("b"), vec![nt("c")]),
            Rule::new(nt("c"), vec![t("X")]),
        ]);
        let tree = parser.parse_tokens(&toks(&["X"]), "start").unwrap();
        let tree = tree.as_tree().unwrap();
        assert_eq!(tree.children[0].as_tree().map(|t| t.data.as_str()), Some("a"));
    }

    #[test]
    fn test_errors() {
        let parser = cyk(vec![Rule::new(nt("start"), vec![t("A"), t("B")])]);
        assert!(matches!(
            parser.parse_tokens(&toks(&["A", "A"]), "start"),
            Err(LarkError::UnexpectedToken(_))
        ));
        assert!(matches!(
            parser.parse_tokens(&[], "start"),
            Err(LarkError::UnexpectedEof(_))
        ));
        let empty = vec![Rule::new(nt("start"), vec![])];
        let builder = ParseTreeBuilder::new(&empty, false, false, false);
        assert!(CykParser::new(empty, builder).is_err());
    }
}
