//! EBNF lowering
//!
//! Rule bodies arrive here with every name resolved to an [`Expr::Symbol`].
//! [`EbnfToBnf`] replaces the repetition operators with helper rules, and
//! [`alternatives`] flattens what is left into plain symbol sequences, one
//! per BNF rule.

use hashbrown::HashMap;

use crate::error::LarkError;
use crate::grammar::Symbol;
use crate::load_grammar::ast::{Expr, RepeatOp};

/// `x ~ n..m` with `m` below this is expanded into every length directly
pub const REPEAT_BREAK_THRESHOLD: usize = 50;

/// Largest factor used when splitting a long repetition into helper rules
pub const SMALL_FACTOR_THRESHOLD: usize = 5;

/// Split `n` into `[(a, b), ..]` such that folding `n = n * a + b` from 1 gives `n`
///
/// Every `a + b` stays within `max_factor`.
pub fn small_factors(n: usize, max_factor: usize) -> Vec<(usize, usize)> {
    if n <= max_factor {
        return vec![(n, 0)];
    }
    for a in (2..=max_factor).rev() {
        let (r, b) = (n / a, n % a);
        if a + b <= max_factor {
            let mut out = small_factors(r, max_factor);
            out.push((a, b));
            return out;
        }
    }
    // a = 2 always leaves b <= 1
    vec![(n, 0)]
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HelperKey {
    Recurse(Expr),
    Repeat(usize, usize, Expr, Expr),
    RepeatOpt(usize, usize, Expr, Expr),
}

/// A helper rule created while lowering
#[derive(Debug, Clone)]
pub struct HelperRule {
    /// Generated name, always `__`-prefixed
    pub name: String,
    /// Body, already lowered
    pub body: Expr,
    /// Inherited `!` modifier of the rule that caused it
    pub keep_all_tokens: bool,
}

/// Replaces `?`, `*`, `+`, `~` and `[..]` with plain alternatives and helper rules
///
/// One instance serves a whole grammar so that identical repetitions share
/// their helper rule.
#[derive(Debug, Default)]
pub struct EbnfToBnf {
    prefix: String,
    keep_all_tokens: bool,
    counter: usize,
    cache: HashMap<HelperKey, Symbol>,
    new_rules: Vec<HelperRule>,
}

impl EbnfToBnf {
    /// Fresh lowering state
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower the body of rule `name`
    pub fn lower(&mut self, name: &str, keep_all_tokens: bool, body: Expr) -> Result<Expr, LarkError> {
        self.prefix = name.to_string();
        self.keep_all_tokens = keep_all_tokens;
        self.transform(body)
    }

    /// Helper rules created so far
    pub fn take_new_rules(&mut self) -> Vec<HelperRule> {
        std::mem::take(&mut self.new_rules)
    }

    fn transform(&mut self, expr: Expr) -> Result<Expr, LarkError> {
        Ok(match expr {
            Expr::Expansions(items) => Expr::Expansions(self.transform_all(items)?),
            Expr::Expansion(items) => Expr::Expansion(self.transform_all(items)?),
            Expr::Alias(inner, name) => Expr::Alias(Box::new(self.transform(*inner)?), name),
            Expr::Repeat(inner, op) => {
                let inner = self.transform(*inner)?;
                match op {
                    RepeatOp::Optional => Expr::Expansions(vec![inner, Expr::Expansion(Vec::new())]),
                    RepeatOp::Plus => Expr::Symbol(self.recurse_rule("plus", inner)),
                    RepeatOp::Star => {
                        let sym = self.recurse_rule("star", inner);
                        Expr::Expansions(vec![Expr::Symbol(sym), Expr::Expansion(Vec::new())])
                    }
                }
            }
            Expr::Range(inner, mn, mx) => {
                if mx < mn {
                    return Err(LarkError::grammar(format!(
                        "Bad Range for {} ({}..{} isn't allowed)",
                        inner, mn, mx
                    )));
                }
                let inner = self.transform(*inner)?;
                self.generate_repeats(inner, mn, mx)
            }
            Expr::Maybe(inner) => {
                let inner = self.transform(*inner)?;
                let empty = if self.has_surviving_symbol(&inner) {
                    Expr::Empty
                } else {
                    Expr::Expansion(Vec::new())
                };
                Expr::Expansions(vec![inner, empty])
            }
            e @ (Expr::Symbol(_) | Expr::Empty) => e,
            other => {
                return Err(LarkError::internal(format!(
                    "unresolved expression in rule {}: {}",
                    self.prefix, other
                )))
            }
        })
    }

    fn transform_all(&mut self, items: Vec<Expr>) -> Result<Vec<Expr>, LarkError> {
        items.into_iter().map(|e| self.transform(e)).collect()
    }

    /// True if some symbol under `expr` would show up in the tree
    fn has_surviving_symbol(&self, expr: &Expr) -> bool {
        let mut stack = vec![expr];
        while let Some(e) = stack.pop() {
            match e {
                Expr::Expansions(items) | Expr::Expansion(items) => stack.extend(items),
                Expr::Alias(inner, _) => stack.push(inner),
                Expr::Symbol(sym) if sym.is_term() => {
                    if self.keep_all_tokens || !sym.filter_out() {
                        return true;
                    }
                }
                Expr::Symbol(sym) => {
                    if !sym.name().starts_with('_') {
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }

    fn next_name(&mut self, kind: &str) -> String {
        let name = format!("__{}_{}_{}", self.prefix, kind, self.counter);
        self.counter += 1;
        name
    }

    fn add_rule(&mut self, key: HelperKey, name: String, body: Expr) -> Symbol {
        let sym = Symbol::nonterminal(name.clone());
        self.new_rules.push(HelperRule {
            name,
            body,
            keep_all_tokens: self.keep_all_tokens,
        });
        self.cache.insert(key, sym.clone());
        sym
    }

    /// `_x: expr | _x expr`
    fn recurse_rule(&mut self, kind: &str, expr: Expr) -> Symbol {
        let key = HelperKey::Recurse(expr.clone());
        if let Some(sym) = self.cache.get(&key) {
            return sym.clone();
        }
        let name = self.next_name(kind);
        let me = Expr::Symbol(Symbol::nonterminal(name.clone()));
        let body = Expr::Expansions(vec![
            Expr::Expansion(vec![expr.clone()]),
            Expr::Expansion(vec![me, expr]),
        ]);
        self.add_rule(key, name, body)
    }

    /// A rule matching `target` `a` times followed by `atom` `b` times
    fn repeat_rule(&mut self, a: usize, b: usize, target: Expr, atom: Expr) -> Expr {
        let key = HelperKey::Repeat(a, b, target.clone(), atom.clone());
        if let Some(sym) = self.cache.get(&key) {
            return Expr::Symbol(sym.clone());
        }
        let name = self.next_name(&format!("repeat_a{}_b{}", a, b));
        let mut items = vec![target; a];
        items.extend(std::iter::repeat(atom).take(b));
        Expr::Symbol(self.add_rule(key, name, Expr::Expansions(vec![Expr::Expansion(items)])))
    }

    /// A rule matching `atom` between 0 and `a * n + b - 1` times, where
    /// `target` matches it `n` times and `target_opt` up to `n - 1` times
    fn repeat_opt_rule(&mut self, a: usize, b: usize, target: Expr, target_opt: Expr, atom: Expr) -> Expr {
        let key = HelperKey::RepeatOpt(a, b, target.clone(), atom.clone());
        if let Some(sym) = self.cache.get(&key) {
            return Expr::Symbol(sym.clone());
        }
        let name = self.next_name(&format!("repeat_a{}_b{}_opt", a, b));
        let mut alts = Vec::with_capacity(a + b);
        for i in 0..a {
            let mut items = vec![target.clone(); i];
            items.push(target_opt.clone());
            alts.push(Expr::Expansion(items));
        }
        for i in 0..b {
            let mut items = vec![target.clone(); a];
            items.extend(std::iter::repeat(atom.clone()).take(i));
            alts.push(Expr::Expansion(items));
        }
        Expr::Symbol(self.add_rule(key, name, Expr::Expansions(alts)))
    }

    /// `rule` repeated between `mn` and `mx` times
    fn generate_repeats(&mut self, rule: Expr, mn: usize, mx: usize) -> Expr {
        if mx < REPEAT_BREAK_THRESHOLD {
            return Expr::Expansions((mn..=mx).map(|n| Expr::Expansion(vec![rule.clone(); n])).collect());
        }

        // rule~mn..mx is rule~mn followed by rule~0..(mx - mn)
        let mut mn_target = rule.clone();
        for (a, b) in small_factors(mn, SMALL_FACTOR_THRESHOLD) {
            mn_target = self.repeat_rule(a, b, mn_target, rule.clone());
        }
        if mx == mn {
            return mn_target;
        }

        // the optional rules match one less than their size
        let diff = mx - mn + 1;
        let factors = small_factors(diff, SMALL_FACTOR_THRESHOLD);
        let mut diff_target = rule.clone();
        let mut diff_opt_target = Expr::Expansion(Vec::new());
        let Some((&(last_a, last_b), init)) = factors.split_last() else {
            return mn_target;
        };
        for &(a, b) in init {
            diff_opt_target = self.repeat_opt_rule(a, b, diff_target.clone(), diff_opt_target, rule.clone());
            diff_target = self.repeat_rule(a, b, diff_target, rule.clone());
        }
        diff_opt_target = self.repeat_opt_rule(last_a, last_b, diff_target, diff_opt_target, rule);
        Expr::Expansions(vec![Expr::Expansion(vec![mn_target, diff_opt_target])])
    }
}

/// One flattened alternative: symbols and `Empty` markers, plus its alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    /// Symbols in order; `Expr::Empty` marks where an optional matched nothing
    pub items: Vec<Expr>,
    /// `-> alias`
    pub alias: Option<String>,
}

/// Distribute groups over their siblings
///
/// `a (b | c) d` becomes `a b d | a c d`. Duplicate alternatives are dropped,
/// keeping the first.
pub fn alternatives(expr: &Expr) -> Result<Vec<Alternative>, LarkError> {
    let alts = match expr {
        Expr::Alias(inner, name) => {
            let mut alts = alternatives(inner)?;
            for alt in &mut alts {
                if alt.alias.is_some() {
                    return Err(LarkError::grammar(format!("Rule {} has more than one alias", expr)));
                }
                alt.alias = Some(name.clone());
            }
            alts
        }
        Expr::Expansions(items) => {
            let mut alts = Vec::new();
            for item in items {
                alts.extend(alternatives(item)?);
            }
            alts
        }
        Expr::Expansion(items) => {
            let mut alts = vec![Vec::new()];
            for item in items {
                let options = alternatives(item)?;
                if options.iter().any(|o| o.alias.is_some()) {
                    return Err(LarkError::grammar(format!(
                        "Aliases are only allowed on whole alternatives, not inside groups ({})",
                        expr
                    )));
                }
                let mut next = Vec::with_capacity(alts.len() * options.len());
                for prefix in &alts {
                    for option in &options {
                        let mut seq: Vec<Expr> = Vec::with_capacity(prefix.len() + option.items.len());
                        seq.extend(prefix.iter().cloned());
                        seq.extend(option.items.iter().cloned());
                        next.push(seq);
                    }
                }
                alts = next;
            }
            alts.into_iter().map(|items| Alternative { items, alias: None }).collect()
        }
        e @ (Expr::Symbol(_) | Expr::Empty) => vec![Alternative {
            items: vec![e.clone()],
            alias: None,
        }],
        other => return Err(LarkError::internal(format!("cannot flatten {}", other))),
    };
    let mut unique: Vec<Alternative> = Vec::with_capacity(alts.len());
    for alt in alts {
        if !unique.contains(&alt) {
            unique.push(alt);
        }
    }
    Ok(unique)
}

/// Substitute template parameters in a copy of a template body
pub fn instantiate(body: &Expr, params: &[String], args: &[Expr]) -> Expr {
    let mut out = body.clone();
    let mut stack = vec![&mut out];
    while let Some(e) = stack.pop() {
        let replacement = match &*e {
            Expr::Rule(name) | Expr::Terminal(name) => params.iter().position(|p| p == name).and_then(|i| args.get(i)),
            _ => None,
        };
        if let Some(arg) = replacement {
            *e = arg.clone();
            continue;
        }
        match e {
            Expr::Expansions(items) | Expr::Expansion(items) => stack.extend(items.iter_mut()),
            Expr::Alias(inner, _) | Expr::Repeat(inner, _) | Expr::Range(inner, _, _) | Expr::Maybe(inner) => {
                stack.push(inner)
            }
            Expr::TemplateUsage(_, targs) => stack.extend(targs.iter_mut()),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nt(name: &str) -> Expr {
        Expr::Symbol(Symbol::nonterminal(name))
    }

    fn t(name: &str) -> Expr {
        Expr::Symbol(Symbol::terminal(name))
    }

    fn fold(factors: &[(usize, usize)]) -> usize {
        factors.iter().fold(1, |n, &(a, b)| n * a + b)
    }

    #[test]
    fn test_small_factors() {
        for n in [0, 1, 5, 6, 49, 50, 60, 86, 1000, 8191] {
            let f = small_factors(n, SMALL_FACTOR_THRESHOLD);
            assert_eq!(fold(&f), n, "{:?}", f);
            assert!(f.iter().all(|&(a, b)| a + b <= SMALL_FACTOR_THRESHOLD || b == 0));
        }
    }

    #[test]
    fn test_plus_and_star_share_helper() {
        let mut lower = EbnfToBnf::new();
        let body = Expr::Expansion(vec![
            Expr::Repeat(Box::new(t("A")), RepeatOp::Plus),
            Expr::Repeat(Box::new(t("A")), RepeatOp::Star),
        ]);
        let out = lower.lower("start", false, body).unwrap();
        let rules = lower.take_new_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "__start_plus_0");
        let alts = alternatives(&out).unwrap();
        assert_eq!(alts.len(), 2);
        assert_eq!(alts[0].items, vec![nt("__start_plus_0"), nt("__start_plus_0")]);
        assert_eq!(alts[1].items, vec![nt("__start_plus_0")]);
    }

    #[test]
    fn test_maybe_marks_empty() {
        let mut lower = EbnfToBnf::new();
        let out = lower
            .lower("start", false, Expr::Expansion(vec![Expr::Maybe(Box::new(nt("a"))), t("B")]))
            .unwrap();
        let alts = alternatives(&out).unwrap();
        assert_eq!(alts[1].items, vec![Expr::Empty, t("B")]);

        let filtered = Expr::Symbol(Symbol::terminal_filtered("COMMA", true));
        let out = lower
            .lower("start", false, Expr::Maybe(Box::new(filtered.clone())))
            .unwrap();
        let alts = alternatives(&out).unwrap();
        assert_eq!(alts[1].items, Vec::<Expr>::new());
    }

    #[test]
    fn test_small_range_is_expanded() {
        let mut lower = EbnfToBnf::new();
        let out = lower.lower("start", false, Expr::Range(Box::new(t("A")), 1, 3)).unwrap();
        let alts = alternatives(&out).unwrap();
        assert_eq!(alts.iter().map(|a| a.items.len()).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(lower.take_new_rules().is_empty());
    }

    #[test]
    fn test_large_range_uses_helpers() {
        let mut lower = EbnfToBnf::new();
        lower.lower("start", false, Expr::Range(Box::new(t("A")), 60, 60)).unwrap();
        let rules = lower.take_new_rules();
        assert!(!rules.is_empty());
        assert!(rules.iter().all(|r| r.name.starts_with("__start_repeat_")));
        assert!(lower.lower("x", false, Expr::Range(Box::new(t("A")), 3, 2)).is_err());
    }

    #[test]
    fn test_groups_distribute_with_alias() {
        let body = Expr::Expansions(vec![
            Expr::Alias(
                Box::new(Expr::Expansion(vec![
                    nt("a"),
                    Expr::Expansions(vec![t("B"), t("C")]),
                ])),
                "pair".into(),
            ),
            Expr::Expansion(vec![nt("a"), t("B")]),
        ]);
        let alts = alternatives(&body).unwrap();
        assert_eq!(alts.len(), 3);
        assert_eq!(alts[0].alias.as_deref(), Some("pair"));
        assert_eq!(alts[2].alias, None);
    }

    #[test]
    fn test_instantiate() {
        let body = Expr::Expansion(vec![Expr::Rule("item".into()), Expr::Rule("other".into())]);
        let out = instantiate(&body, &["item".into()], &[t("NUMBER")]);
        assert_eq!(out, Expr::Expansion(vec![t("NUMBER"), Expr::Rule("other".into())]));
    }
}
