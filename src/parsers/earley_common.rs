//! Earley items and columns
//!
//! Symbols are interned into dense ids once per parser so the chart loop
//! compares integers. An [`Item`] is a dotted rule with its origin column
//! and forest node; an [`ItemSet`] is one column (or scan buffer) with
//! de-duplication and an index by expected symbol.

use hashbrown::HashMap;
use std::sync::Arc;

use crate::error::LarkError;
use crate::grammar::{Rule, RuleId};
use crate::parsers::earley_forest::NodeId;
use crate::parsers::grammar_analysis::GrammarAnalyzer;

/// Interned symbol
pub type SymId = usize;

/// Rules with interned symbols and precomputed predictions
#[derive(Debug, Clone)]
pub struct EarleyGrammar {
    rules: Arc<[Rule]>,
    names: Vec<String>,
    ids: HashMap<String, SymId>,
    is_term: Vec<bool>,
    origins: Vec<SymId>,
    expansions: Vec<Vec<SymId>>,
    predictions: Vec<Vec<RuleId>>,
}

impl EarleyGrammar {
    /// Validate `rules` and intern their symbols
    pub fn new(rules: Arc<[Rule]>, start: &[String]) -> Result<Self, LarkError> {
        let analyzer = GrammarAnalyzer::new(&rules, start)?;
        let mut names = Vec::new();
        let mut ids: HashMap<String, SymId> = HashMap::new();
        let mut is_term = Vec::new();
        let mut intern = |name: &str, term: bool| -> SymId {
            if let Some(&id) = ids.get(name) {
                return id;
            }
            let id = names.len();
            names.push(name.to_string());
            is_term.push(term);
            ids.insert(name.to_string(), id);
            id
        };

        let mut origins = Vec::with_capacity(rules.len());
        let mut expansions = Vec::with_capacity(rules.len());
        for rule in rules.iter() {
            origins.push(intern(rule.origin.name(), false));
            expansions.push(
                rule.expansion
                    .iter()
                    .map(|s| intern(s.name(), s.is_term()))
                    .collect::<Vec<_>>(),
            );
        }
        for s in start {
            intern(s, false);
        }

        let mut predictions = vec![Vec::new(); names.len()];
        for (id, name) in names.iter().enumerate() {
            if !is_term[id] {
                predictions[id] = analyzer
                    .expand_rule(name)
                    .into_iter()
                    .map(|p| p.rule)
                    .filter(|&r| r < rules.len())
                    .collect();
            }
        }

        Ok(Self {
            rules,
            names,
            ids,
            is_term,
            origins,
            expansions,
            predictions,
        })
    }

    /// The rules, shared with forests
    pub fn rules(&self) -> &Arc<[Rule]> {
        &self.rules
    }

    /// Id of a symbol name
    pub fn id(&self, name: &str) -> Option<SymId> {
        self.ids.get(name).copied()
    }

    /// Name of a symbol
    pub fn name(&self, sym: SymId) -> &str {
        &self.names[sym]
    }

    /// True for terminals
    pub fn is_term(&self, sym: SymId) -> bool {
        self.is_term[sym]
    }

    /// Origin of a rule
    pub fn origin(&self, rule: RuleId) -> SymId {
        self.origins[rule]
    }

    /// Length of a rule's expansion
    pub fn rule_len(&self, rule: RuleId) -> usize {
        self.expansions[rule].len()
    }

    /// Rules predicted for a non-terminal, including indirect left corners
    pub fn predictions(&self, sym: SymId) -> &[RuleId] {
        &self.predictions[sym]
    }

    /// Symbol after the dot, `None` for complete items
    #[inline]
    pub fn expect(&self, item: &Item) -> Option<SymId> {
        self.expansions[item.rule].get(item.ptr).copied()
    }

    /// Identity of an item within a column
    #[inline]
    pub fn key(&self, item: &Item) -> ItemKey {
        if item.ptr >= self.expansions[item.rule].len() {
            ItemKey::Complete {
                origin: self.origins[item.rule],
                start: item.start,
            }
        } else {
            ItemKey::Partial {
                rule: item.rule,
                ptr: item.ptr,
                start: item.start,
            }
        }
    }
}

/// A dotted rule in the chart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    /// Rule being matched
    pub rule: RuleId,
    /// Position of the dot
    pub ptr: usize,
    /// Column the rule was predicted in
    pub start: usize,
    /// Forest node of the matched part
    pub node: Option<NodeId>,
}

impl Item {
    /// Item without a forest node
    #[inline]
    pub fn new(rule: RuleId, ptr: usize, start: usize) -> Self {
        Self {
            rule,
            ptr,
            start,
            node: None,
        }
    }

    /// Dot moved one symbol right; the node is set by the caller
    #[inline]
    pub fn advance(&self) -> Self {
        Self::new(self.rule, self.ptr + 1, self.start)
    }

    /// Same item with `node`
    #[inline]
    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }
}

/// Item identity
///
/// Complete items are identified by their origin symbol, so two rules of
/// one non-terminal over the same span share an item (and a forest node).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKey {
    /// Completed non-terminal from `start`
    Complete {
        /// Non-terminal
        origin: SymId,
        /// Origin column
        start: usize,
    },
    /// Rule matched up to `ptr`
    Partial {
        /// Rule
        rule: RuleId,
        /// Dot position
        ptr: usize,
        /// Origin column
        start: usize,
    },
}

/// De-duplicated set of items in insertion order
#[derive(Debug, Clone, Default)]
pub struct ItemSet {
    items: Vec<Item>,
    index: HashMap<ItemKey, usize>,
    by_expect: HashMap<SymId, Vec<usize>>,
}

impl ItemSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `item` unless an item with the same key exists
    pub fn add(&mut self, grammar: &EarleyGrammar, item: Item) -> bool {
        let key = grammar.key(&item);
        if self.index.contains_key(&key) {
            return false;
        }
        let pos = self.items.len();
        self.index.insert(key, pos);
        if let Some(sym) = grammar.expect(&item) {
            self.by_expect.entry(sym).or_default().push(pos);
        }
        self.items.push(item);
        true
    }

    /// Item with the given key
    pub fn get(&self, key: &ItemKey) -> Option<&Item> {
        self.index.get(key).map(|&i| &self.items[i])
    }

    /// Record the forest node of an existing item
    pub fn set_node(&mut self, key: &ItemKey, node: NodeId) {
        if let Some(&i) = self.index.get(key) {
            self.items[i].node = Some(node);
        }
    }

    /// Items expecting `sym` next
    pub fn expecting(&self, sym: SymId) -> impl Iterator<Item = &Item> + '_ {
        self.by_expect
            .get(&sym)
            .into_iter()
            .flatten()
            .map(move |&i| &self.items[i])
    }

    /// All items in insertion order
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
