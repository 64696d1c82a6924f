//! Grammar analysis shared by the LALR and Earley back ends
//!
//! Wraps the compiled rule list with one synthetic root rule per start
//! symbol, validates it, and computes the classic FIRST / FOLLOW / NULLABLE
//! sets. Item closures are produced by [`GrammarAnalyzer::expand_rule`].

use hashbrown::{HashMap, HashSet};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use crate::error::LarkError;
use crate::grammar::{Rule, RuleId, Symbol};

/// End-of-input terminal
pub const END: &str = "$END";

/// Name of the synthetic root rule for a start symbol
pub fn root_name(start: &str) -> String {
    format!("$root_{}", start)
}

/// A rule with a dot position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RulePtr {
    /// Rule index
    pub rule: RuleId,
    /// Dot position within the expansion
    pub index: usize,
}

impl RulePtr {
    /// Pointer at `index` into `rule`
    pub fn new(rule: RuleId, index: usize) -> Self {
        Self { rule, index }
    }

    /// Symbol after the dot, `None` when satisfied
    #[inline]
    pub fn next<'r>(&self, rules: &'r [Rule]) -> Option<&'r Symbol> {
        rules[self.rule].expansion.get(self.index)
    }

    /// True when the dot is at the end
    #[inline]
    pub fn is_satisfied(&self, rules: &[Rule]) -> bool {
        self.index >= rules[self.rule].expansion.len()
    }

    /// Pointer with the dot moved one symbol forward
    #[inline]
    pub fn advance(&self) -> Self {
        Self::new(self.rule, self.index + 1)
    }

    /// Render as `origin: a * b` with the dot shown as `*`
    pub fn display(&self, rules: &[Rule]) -> String {
        let rule = &rules[self.rule];
        let before: Vec<&str> = rule.expansion[..self.index].iter().map(Symbol::name).collect();
        let after: Vec<&str> = rule.expansion[self.index..].iter().map(Symbol::name).collect();
        format!("<{} : {} * {}>", rule.origin.name(), before.join(" "), after.join(" "))
    }
}

/// FIRST, FOLLOW and NULLABLE, keyed by symbol name
#[derive(Debug, Clone, Default)]
pub struct GrammarSets {
    /// Terminals that can begin a derivation of each symbol
    pub first: HashMap<String, BTreeSet<String>>,
    /// Terminals that can follow each symbol
    pub follow: HashMap<String, BTreeSet<String>>,
    /// Symbols that derive the empty string
    pub nullable: HashSet<String>,
}

impl GrammarSets {
    /// Whether `name` derives the empty string
    pub fn is_nullable(&self, name: &str) -> bool {
        self.nullable.contains(name)
    }
}

fn extend_set(target: &mut BTreeSet<String>, items: &BTreeSet<String>) -> bool {
    let before = target.len();
    target.extend(items.iter().cloned());
    target.len() != before
}

/// Fixpoint computation of FIRST, FOLLOW and NULLABLE
pub fn calculate_sets(rules: &[Rule]) -> GrammarSets {
    let mut sets = GrammarSets::default();
    for rule in rules {
        for sym in std::iter::once(&rule.origin).chain(rule.expansion.iter()) {
            let first = sets.first.entry(sym.name().to_string()).or_default();
            if sym.is_term() {
                first.insert(sym.name().to_string());
            }
            sets.follow.entry(sym.name().to_string()).or_default();
        }
    }

    let mut changed = true;
    while changed {
        changed = false;
        for rule in rules {
            let origin = rule.origin.name();
            if !sets.nullable.contains(origin)
                && rule.expansion.iter().all(|s| sets.nullable.contains(s.name()))
            {
                sets.nullable.insert(origin.to_string());
                changed = true;
            }
            for sym in &rule.expansion {
                let add = sets.first.get(sym.name()).cloned().unwrap_or_default();
                if let Some(first) = sets.first.get_mut(origin) {
                    changed |= extend_set(first, &add);
                }
                if !sets.nullable.contains(sym.name()) {
                    break;
                }
            }
        }
    }

    changed = true;
    while changed {
        changed = false;
        for rule in rules {
            let n = rule.expansion.len();
            for (i, sym) in rule.expansion.iter().enumerate() {
                let rest_nullable = rule.expansion[i + 1..]
                    .iter()
                    .all(|s| sets.nullable.contains(s.name()));
                if rest_nullable {
                    let add = sets.follow.get(rule.origin.name()).cloned().unwrap_or_default();
                    if let Some(follow) = sets.follow.get_mut(sym.name()) {
                        changed |= extend_set(follow, &add);
                    }
                }
                for j in i + 1..n {
                    let add = sets.first.get(rule.expansion[j].name()).cloned().unwrap_or_default();
                    if let Some(follow) = sets.follow.get_mut(sym.name()) {
                        changed |= extend_set(follow, &add);
                    }
                    if !sets.nullable.contains(rule.expansion[j].name()) {
                        break;
                    }
                }
            }
        }
    }
    sets
}

/// Analyzer over a rule list extended with root rules
///
/// Two extended lists are kept: `rules` ends every root rule with `$END`
/// and feeds the set computation, `lr0_rules` has plain `$root_s: s` rules
/// for the LR(0) automaton. Root rules have the same ids in both lists,
/// directly after the user rules.
pub struct GrammarAnalyzer {
    /// User rules followed by `$root_s: s $END`
    pub rules: Vec<Rule>,
    /// User rules followed by `$root_s: s`
    pub lr0_rules: Vec<Rule>,
    /// Rule ids of `rules` grouped by origin name
    pub rules_by_origin: HashMap<String, Vec<RuleId>>,
    /// Start symbols, in declaration order
    pub start: Vec<String>,
    /// Id of the root rule of every start symbol
    pub root_rules: Vec<(String, RuleId)>,
    /// FIRST / FOLLOW / NULLABLE of `rules`
    pub sets: GrammarSets,
}

impl GrammarAnalyzer {
    /// Validate `rules` and compute the grammar sets
    pub fn new(rules: &[Rule], start: &[String]) -> Result<Self, LarkError> {
        if start.is_empty() {
            return Err(LarkError::config("at least one start symbol is required"));
        }
        let mut seen: HashSet<&Rule> = HashSet::new();
        let mut duplicates: Vec<String> = Vec::new();
        for rule in rules {
            if !seen.insert(rule) {
                duplicates.push(rule.to_string());
            }
        }
        if !duplicates.is_empty() {
            duplicates.dedup();
            return Err(LarkError::grammar(format!(
                "Rules defined twice: {}",
                duplicates.join(", ")
            )));
        }

        let mut full = rules.to_vec();
        let mut lr0 = rules.to_vec();
        let mut root_rules = Vec::new();
        for s in start {
            let origin = Symbol::nonterminal(root_name(s));
            root_rules.push((s.clone(), full.len()));
            full.push(Rule::new(
                origin.clone(),
                vec![Symbol::nonterminal(s.as_str()), Symbol::terminal(END)],
            ));
            lr0.push(Rule::new(origin, vec![Symbol::nonterminal(s.as_str())]));
        }

        let mut rules_by_origin: HashMap<String, Vec<RuleId>> = HashMap::new();
        for (id, rule) in full.iter().enumerate() {
            rules_by_origin
                .entry(rule.origin.name().to_string())
                .or_default()
                .push(id);
        }

        for rule in &full {
            for sym in &rule.expansion {
                if !sym.is_term() && !rules_by_origin.contains_key(sym.name()) {
                    return Err(LarkError::grammar(format!(
                        "Using an undefined rule: {}",
                        sym.name()
                    )));
                }
            }
        }

        let sets = calculate_sets(&full);
        Ok(Self {
            rules: full,
            lr0_rules: lr0,
            rules_by_origin,
            start: start.to_vec(),
            root_rules,
            sets,
        })
    }

    /// Number of user rules (root rules come after them)
    pub fn user_rule_count(&self) -> usize {
        self.rules.len() - self.root_rules.len()
    }

    /// Root rule id of `start`
    pub fn root_rule(&self, start: &str) -> Option<RuleId> {
        self.root_rules
            .iter()
            .find(|(s, _)| s == start)
            .map(|(_, id)| *id)
    }

    /// Rule ids whose origin is `name`
    pub fn alternatives(&self, name: &str) -> &[RuleId] {
        self.rules_by_origin
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every initial pointer reachable from `origin` through leading non-terminals
    ///
    /// This is the LR(0) closure of predicting `origin`, and the Earley
    /// prediction set of `origin`. The result is sorted.
    pub fn expand_rule(&self, origin: &str) -> Vec<RulePtr> {
        let mut init: BTreeSet<RulePtr> = BTreeSet::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(origin);
        visited.insert(origin);
        while let Some(name) = queue.pop_front() {
            for &id in self.alternatives(name) {
                init.insert(RulePtr::new(id, 0));
                if let Some(first) = self.rules[id].expansion.first() {
                    if !first.is_term() && visited.insert(first.name()) {
                        queue.push_back(first.name());
                    }
                }
            }
        }
        init.into_iter().collect()
    }
}

impl fmt::Debug for GrammarAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrammarAnalyzer")
            .field("rules", &self.rules.len())
            .field("start", &self.start)
            .field("nullable", &self.sets.nullable.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nt(n: &str) -> Symbol {
        Symbol::nonterminal(n)
    }

    fn t(n: &str) -> Symbol {
        Symbol::terminal(n)
    }

    // expr: expr PLUS term | term ; term: NUM | opt NUM ; opt: | MINUS
    fn arith() -> Vec<Rule> {
        vec![
            Rule::new(nt("expr"), vec![nt("expr"), t("PLUS"), nt("term")]),
            Rule::new(nt("expr"), vec![nt("term")]),
            Rule::new(nt("term"), vec![t("NUM")]),
            Rule::new(nt("term"), vec![nt("opt"), t("NUM"), t("NUM")]),
            Rule::new(nt("opt"), vec![]),
            Rule::new(nt("opt"), vec![t("MINUS")]),
        ]
    }

    #[test]
    fn test_sets() {
        let a = GrammarAnalyzer::new(&arith(), &["expr".to_string()]).unwrap();
        assert!(a.sets.is_nullable("opt"));
        assert!(!a.sets.is_nullable("term"));
        let first: Vec<&str> = a.sets.first["expr"].iter().map(String::as_str).collect();
        assert_eq!(first, vec!["MINUS", "NUM"]);
        let follow: Vec<&str> = a.sets.follow["expr"].iter().map(String::as_str).collect();
        assert_eq!(follow, vec![END, "PLUS"]);
        let follow: Vec<&str> = a.sets.follow["opt"].iter().map(String::as_str).collect();
        assert_eq!(follow, vec!["NUM"]);
    }

    #[test]
    fn test_expand_rule() {
        let a = GrammarAnalyzer::new(&arith(), &["expr".to_string()]).unwrap();
        let ptrs = a.expand_rule("expr");
        let rules: Vec<RuleId> = ptrs.iter().map(|p| p.rule).collect();
        assert_eq!(rules, vec![0, 1, 2, 3, 4, 5]);
        assert!(ptrs.iter().all(|p| p.index == 0));
    }

    #[test]
    fn test_root_rules_appended() {
        let a = GrammarAnalyzer::new(&arith(), &["expr".to_string()]).unwrap();
        assert_eq!(a.user_rule_count(), 6);
        let root = a.root_rule("expr").unwrap();
        assert_eq!(root, 6);
        assert_eq!(a.rules[root].expansion.len(), 2);
        assert_eq!(a.lr0_rules[root].expansion.len(), 1);
    }

    #[test]
    fn test_undefined_rule() {
        let rules = vec![Rule::new(nt("start"), vec![nt("missing")])];
        let err = GrammarAnalyzer::new(&rules, &["start".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Using an undefined rule: missing"));
    }

    #[test]
    fn test_duplicate_rule() {
        let rules = vec![
            Rule::new(nt("start"), vec![t("A")]),
            Rule::new(nt("start"), vec![t("A")]),
        ];
        let err = GrammarAnalyzer::new(&rules, &["start".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Rules defined twice"));
    }

    #[test]
    fn test_rule_ptr_display() {
        let rules = arith();
        let p = RulePtr::new(0, 1);
        assert_eq!(p.display(&rules), "<expr : expr * PLUS term>");
        assert_eq!(p.next(&rules).map(Symbol::name), Some("PLUS"));
        assert!(RulePtr::new(4, 0).is_satisfied(&rules));
    }
}
