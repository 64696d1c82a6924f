//! Tree construction callbacks
//!
//! Every compiled rule gets a [`RuleBuilder`] that turns the parser's raw
//! children into a [`Child`]. The steps, outermost first:
//!
//! 1. ambiguity expansion: an `_ambig` child in an inlined position makes the
//!    whole node ambiguous, one alternative per combination;
//! 2. position propagation from the raw children;
//! 3. child filtering: filtered terminals dropped, `_rule` children spliced,
//!    placeholders inserted for empty `[..]`;
//! 4. single-child expansion for `?rule`.

use std::fmt;

use crate::grammar::{Rule, RuleId, Symbol};
use crate::tree::{Child, Meta, Tree};

/// Name of the node that groups alternative derivations
pub const AMBIG: &str = "_ambig";

#[derive(Debug, Clone)]
struct ChildFilter {
    /// `(index, splice, placeholders to insert before it)`
    to_include: Vec<(usize, bool, usize)>,
    append_none: usize,
}

impl ChildFilter {
    fn create(rule: &Rule, keep_all_tokens: bool, empty_indices: Option<&[bool]>) -> Option<Self> {
        let n = rule.expansion.len();
        let nones: Vec<usize> = match empty_indices {
            Some(flags) if !flags.is_empty() => {
                let mut counts = vec![0usize];
                for &empty in flags {
                    if empty {
                        if let Some(last) = counts.last_mut() {
                            *last += 1;
                        }
                    } else {
                        counts.push(0);
                    }
                }
                counts.resize(n + 1, 0);
                counts
            }
            _ => vec![0; n + 1],
        };

        let mut to_include = Vec::new();
        let mut pending = 0;
        for (i, sym) in rule.expansion.iter().enumerate() {
            pending += nones[i];
            if keep_all_tokens || !sym.filter_out() {
                to_include.push((i, should_expand(sym), pending));
                pending = 0;
            }
        }
        pending += nones[n];

        let has_placeholders = nones.iter().any(|&c| c > 0);
        if has_placeholders
            || to_include.len() < n
            || to_include.iter().any(|(_, splice, _)| *splice)
        {
            Some(Self {
                to_include,
                append_none: pending,
            })
        } else {
            None
        }
    }

    fn apply(&self, children: Vec<Child>) -> Vec<Child> {
        let mut slots: Vec<Option<Child>> = children.into_iter().map(Some).collect();
        let mut filtered = Vec::with_capacity(slots.len());
        for &(i, splice, add_none) in &self.to_include {
            filtered.extend(std::iter::repeat_with(|| Child::Placeholder).take(add_none));
            let Some(child) = slots.get_mut(i).and_then(Option::take) else {
                continue;
            };
            match child {
                Child::Tree(tree) if splice => filtered.extend(tree.children),
                other => filtered.push(other),
            }
        }
        filtered.extend(std::iter::repeat_with(|| Child::Placeholder).take(self.append_none));
        filtered
    }
}

/// Rules named `_x` are inlined into their parent
fn should_expand(sym: &Symbol) -> bool {
    !sym.is_term() && sym.name().starts_with('_')
}

/// Callback chain of one rule
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    name: String,
    expand_single_child: bool,
    filter: Option<ChildFilter>,
    ambiguous_expand: Vec<usize>,
}

impl RuleBuilder {
    /// Name of the nodes this rule creates
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Callback chains for every rule of a grammar
#[derive(Clone)]
pub struct ParseTreeBuilder {
    builders: Vec<RuleBuilder>,
    propagate_positions: bool,
    ambiguous: bool,
}

impl ParseTreeBuilder {
    /// Precompute the chains
    ///
    /// `ambiguous` enables `_ambig` expansion (Earley with explicit
    /// ambiguity); `maybe_placeholders` honors each rule's `empty_indices`.
    pub fn new(rules: &[Rule], propagate_positions: bool, ambiguous: bool, maybe_placeholders: bool) -> Self {
        let builders = rules
            .iter()
            .map(|rule| {
                let keep_all_tokens = rule.options.keep_all_tokens;
                let empty_indices = if maybe_placeholders {
                    Some(rule.options.empty_indices.as_slice())
                } else {
                    None
                };
                let ambiguous_expand = if ambiguous {
                    rule.expansion
                        .iter()
                        .enumerate()
                        .filter(|(_, sym)| keep_all_tokens || (!sym.filter_out() && should_expand(sym)))
                        .map(|(i, _)| i)
                        .collect()
                } else {
                    Vec::new()
                };
                RuleBuilder {
                    name: rule.tree_name().to_string(),
                    expand_single_child: rule.options.expand1 && rule.alias.is_none(),
                    filter: ChildFilter::create(rule, keep_all_tokens, empty_indices),
                    ambiguous_expand,
                }
            })
            .collect();
        Self {
            builders,
            propagate_positions,
            ambiguous,
        }
    }

    /// Number of rules covered
    pub fn len(&self) -> usize {
        self.builders.len()
    }

    /// True when no rule is covered
    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// Chain of a rule
    pub fn rule(&self, rule: RuleId) -> Option<&RuleBuilder> {
        self.builders.get(rule)
    }

    /// Build the node for a reduction of `rule` over `children`
    pub fn build(&self, rule: RuleId, mut children: Vec<Child>) -> Child {
        let Some(builder) = self.builders.get(rule) else {
            return Child::Tree(Tree::new(AMBIG, children));
        };
        if !self.ambiguous || builder.ambiguous_expand.is_empty() {
            return self.build_positioned(builder, children);
        }

        let mut ambiguous = Vec::new();
        for (i, child) in children.iter_mut().enumerate() {
            if let Child::Tree(t) = child {
                if t.data == AMBIG {
                    if builder.ambiguous_expand.contains(&i) {
                        ambiguous.push(i);
                    }
                    t.expand_kids_by_data(&[AMBIG]);
                }
            }
        }
        if ambiguous.is_empty() {
            return self.build_positioned(builder, children);
        }

        let choices: Vec<Vec<Child>> = children
            .into_iter()
            .enumerate()
            .map(|(i, child)| match child {
                Child::Tree(t) if ambiguous.contains(&i) => t.children,
                other => vec![other],
            })
            .collect();
        let alternatives = cartesian(&choices)
            .into_iter()
            .map(|combo| self.build_positioned(builder, combo))
            .collect();
        Child::Tree(Tree::new(AMBIG, alternatives))
    }

    fn build_positioned(&self, builder: &RuleBuilder, children: Vec<Child>) -> Child {
        if !self.propagate_positions {
            return self.build_filtered(builder, children);
        }
        let mut span = Meta::empty();
        if let Some(first) = children.iter().find_map(start_of) {
            span.set_start_from_meta(&first);
        }
        if let Some(last) = children.iter().rev().find_map(start_of) {
            span.set_end_from_meta(&last);
        }
        let mut res = self.build_filtered(builder, children);
        if let Child::Tree(tree) = &mut res {
            if tree.meta.empty && !span.empty {
                tree.meta = span;
            }
        }
        res
    }

    fn build_filtered(&self, builder: &RuleBuilder, children: Vec<Child>) -> Child {
        let mut filtered = match &builder.filter {
            Some(filter) => filter.apply(children),
            None => children,
        };
        if builder.expand_single_child && filtered.len() == 1 {
            if let Some(only) = filtered.pop() {
                return only;
            }
        }
        Child::Tree(Tree::new(builder.name.clone(), filtered))
    }
}

/// Span carried by a child, if it has one
fn start_of(child: &Child) -> Option<Meta> {
    match child {
        Child::Tree(t) if !t.meta.empty => Some(t.meta),
        Child::Token(tok) => {
            let mut meta = Meta::empty();
            meta.set_start_from_token(tok);
            meta.set_end_from_token(tok);
            Some(meta)
        }
        _ => None,
    }
}

/// Every combination picking one element of each choice list
fn cartesian(choices: &[Vec<Child>]) -> Vec<Vec<Child>> {
    let mut out: Vec<Vec<Child>> = vec![Vec::new()];
    for options in choices {
        let mut next = Vec::with_capacity(out.len() * options.len().max(1));
        for prefix in &out {
            for opt in options {
                let mut combo = prefix.clone();
                combo.push(opt.clone());
                next.push(combo);
            }
        }
        out = next;
    }
    out
}

impl fmt::Debug for ParseTreeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseTreeBuilder")
            .field("rules", &self.builders.len())
            .field("propagate_positions", &self.propagate_positions)
            .field("ambiguous", &self.ambiguous)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_location::SourcePosition;
    use crate::token::Token;

    fn tok(kind: &str, value: &str) -> Child {
        Child::Token(Token::new(kind, value))
    }

    fn positioned(kind: &str, value: &str, start: usize) -> Child {
        let end = start + value.len();
        Child::Token(Token::with_span(
            kind,
            value,
            SourcePosition::new(start, 1, start + 1),
            SourcePosition::new(end, 1, end + 1),
        ))
    }

    fn rule(origin: &str, expansion: Vec<Symbol>) -> Rule {
        Rule::new(Symbol::nonterminal(origin), expansion)
    }

    #[test]
    fn test_filter_out_and_inline() {
        // pair: LPAR _items RPAR, with punctuation filtered
        let r = rule(
            "pair",
            vec![
                Symbol::terminal_filtered("LPAR", true),
                Symbol::nonterminal("_items"),
                Symbol::terminal_filtered("RPAR", true),
            ],
        );
        let builder = ParseTreeBuilder::new(&[r], false, false, false);
        let items = Child::Tree(Tree::new("_items", vec![tok("A", "a"), tok("B", "b")]));
        let out = builder.build(0, vec![tok("LPAR", "("), items, tok("RPAR", ")")]);
        assert_eq!(
            out,
            Child::Tree(Tree::new("pair", vec![tok("A", "a"), tok("B", "b")]))
        );
    }

    #[test]
    fn test_keep_all_tokens() {
        let mut r = rule("p", vec![Symbol::terminal_filtered("COMMA", true)]);
        r.options.keep_all_tokens = true;
        let builder = ParseTreeBuilder::new(&[r], false, false, false);
        let out = builder.build(0, vec![tok("COMMA", ",")]);
        assert_eq!(out.as_tree().map(|t| t.children.len()), Some(1));
    }

    #[test]
    fn test_expand_single_child() {
        let mut r = rule("value", vec![Symbol::terminal("NUMBER")]);
        r.options.expand1 = true;
        let builder = ParseTreeBuilder::new(&[r], false, false, false);
        assert_eq!(builder.build(0, vec![tok("NUMBER", "1")]), tok("NUMBER", "1"));
    }

    #[test]
    fn test_alias_disables_expand_single_child() {
        let mut r = rule("value", vec![Symbol::terminal("NUMBER")]);
        r.options.expand1 = true;
        r.alias = Some("number".into());
        let builder = ParseTreeBuilder::new(&[r], false, false, false);
        let out = builder.build(0, vec![tok("NUMBER", "1")]);
        assert_eq!(out.as_tree().map(|t| t.data.as_str()), Some("number"));
    }

    #[test]
    fn test_placeholders() {
        // opt: [A] B [C], where both optionals were empty: A, C missing
        let mut r = rule("opt", vec![Symbol::terminal("B")]);
        r.options.empty_indices = vec![true, false, true];
        let builder = ParseTreeBuilder::new(&[r.clone()], false, false, true);
        let out = builder.build(0, vec![tok("B", "b")]);
        assert_eq!(
            out,
            Child::Tree(Tree::new(
                "opt",
                vec![Child::Placeholder, tok("B", "b"), Child::Placeholder]
            ))
        );
        let builder = ParseTreeBuilder::new(&[r], false, false, false);
        let out = builder.build(0, vec![tok("B", "b")]);
        assert_eq!(out.as_tree().map(|t| t.children.len()), Some(1));
    }

    #[test]
    fn test_propagate_positions_uses_filtered_tokens() {
        let r = rule(
            "call",
            vec![
                Symbol::terminal_filtered("LPAR", true),
                Symbol::terminal("NAME"),
                Symbol::terminal_filtered("RPAR", true),
            ],
        );
        let builder = ParseTreeBuilder::new(&[r], true, false, false);
        let out = builder.build(
            0,
            vec![positioned("LPAR", "(", 0), positioned("NAME", "ab", 1), positioned("RPAR", ")", 3)],
        );
        let tree = out.as_tree().unwrap();
        assert_eq!(tree.children.len(), 1);
        assert!(!tree.meta.empty);
        assert_eq!((tree.meta.start_pos, tree.meta.end_pos), (0, 4));
        assert_eq!((tree.meta.column, tree.meta.end_column), (1, 5));
    }

    #[test]
    fn test_ambiguous_inline_child_lifts_ambiguity() {
        let r = rule("s", vec![Symbol::nonterminal("_x"), Symbol::terminal("C")]);
        let builder = ParseTreeBuilder::new(&[r], false, true, false);
        let ambig = Child::Tree(Tree::new(
            AMBIG,
            vec![
                Child::Tree(Tree::new("_x", vec![tok("A", "a")])),
                Child::Tree(Tree::new("_x", vec![tok("B", "a")])),
            ],
        ));
        let out = builder.build(0, vec![ambig, tok("C", "c")]);
        let tree = out.as_tree().unwrap();
        assert_eq!(tree.data, AMBIG);
        assert_eq!(tree.children.len(), 2);
        assert_eq!(
            tree.children[1],
            Child::Tree(Tree::new("s", vec![tok("B", "a"), tok("C", "c")]))
        );
    }
}
