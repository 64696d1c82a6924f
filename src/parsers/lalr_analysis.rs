//! LALR(1) table construction
//!
//! LR(0) item sets are built breadth-first from the start states, then
//! lookaheads are computed with the DeRemer & Pennello relations
//! (`reads`, `includes`, `lookback`) solved by the `digraph` traversal.
//! Conflicts are resolved by rule priority; see [`LalrAnalyzer::build`].

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::error::LarkError;
use crate::grammar::{Rule, RuleId, Symbol};
use crate::parsers::grammar_analysis::{root_name, GrammarAnalyzer, RulePtr, END};

/// Parser action for a terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Push the token and go to a state
    Shift(usize),
    /// Reduce by a rule
    Reduce(RuleId),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Shift(s) => write!(f, "Shift({})", s),
            Action::Reduce(r) => write!(f, "Reduce({})", r),
        }
    }
}

/// Frozen LALR(1) tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseTable {
    /// Terminal actions per state
    pub states: Vec<HashMap<String, Action>>,
    /// Non-terminal transitions per state
    pub goto: Vec<HashMap<String, usize>>,
    /// Initial state of every start symbol
    pub start_states: BTreeMap<String, usize>,
    /// Accepting state of every start symbol
    pub end_states: BTreeMap<String, usize>,
}

impl ParseTable {
    /// Number of states
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True for a table without states
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Sorted terminal names with an action in each state
    pub fn state_accepts(&self) -> Vec<Vec<String>> {
        self.states
            .iter()
            .map(|actions| {
                let mut names: Vec<String> = actions.keys().cloned().collect();
                names.sort();
                names
            })
            .collect()
    }

    /// Sorted terminal names with an action in `state`
    pub fn expected(&self, state: usize) -> Vec<String> {
        let mut names: Vec<String> = self
            .states
            .get(state)
            .map(|a| a.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// An LR(0) state
#[derive(Debug, Clone)]
pub struct LR0ItemSet {
    /// Items that define the state
    pub kernel: Vec<RulePtr>,
    /// Kernel plus predicted items, sorted
    pub closure: Vec<RulePtr>,
    /// Successor state per symbol
    pub transitions: BTreeMap<Symbol, usize>,
    /// Rules to reduce per lookahead terminal
    pub lookaheads: BTreeMap<String, BTreeSet<RuleId>>,
}

type NtTransition = (usize, String);

/// Builds [`ParseTable`]s
pub struct LalrAnalyzer {
    analyzer: GrammarAnalyzer,
    states: Vec<LR0ItemSet>,
    start_states: BTreeMap<String, usize>,
    strict: bool,
    nonterminal_transitions: Vec<NtTransition>,
    directly_reads: HashMap<NtTransition, BTreeSet<String>>,
    reads: HashMap<NtTransition, BTreeSet<NtTransition>>,
    includes: HashMap<NtTransition, BTreeSet<NtTransition>>,
    lookback: HashMap<NtTransition, BTreeSet<(usize, RuleId)>>,
}

impl LalrAnalyzer {
    /// Analyzer over `rules`; `strict` turns priority ties into errors
    pub fn new(rules: &[Rule], start: &[String], strict: bool) -> Result<Self, LarkError> {
        Ok(Self {
            analyzer: GrammarAnalyzer::new(rules, start)?,
            states: Vec::new(),
            start_states: BTreeMap::new(),
            strict,
            nonterminal_transitions: Vec::new(),
            directly_reads: HashMap::new(),
            reads: HashMap::new(),
            includes: HashMap::new(),
            lookback: HashMap::new(),
        })
    }

    /// The underlying grammar analysis
    pub fn analyzer(&self) -> &GrammarAnalyzer {
        &self.analyzer
    }

    /// LR(0) states, valid after [`build`](Self::build)
    pub fn item_sets(&self) -> &[LR0ItemSet] {
        &self.states
    }

    /// Run every construction phase and produce the table
    ///
    /// Shift/reduce: the reduce rule's priority is compared with the best
    /// priority among the items that shift the terminal; the higher side
    /// wins and ties shift. Reduce/reduce: the highest priority wins, then
    /// the lowest declaration order. Ties are errors in strict mode.
    pub fn build(mut self) -> Result<ParseTable, LarkError> {
        self.compute_lr0_states();
        self.compute_reads_relations();
        self.compute_includes_lookback();
        self.compute_lookaheads();
        self.compute_lalr1_states()
    }

    fn lr0_closure(&self, kernel: &[RulePtr]) -> Vec<RulePtr> {
        let rules = &self.analyzer.lr0_rules;
        let mut closure: BTreeSet<RulePtr> = kernel.iter().copied().collect();
        for rp in kernel {
            if let Some(sym) = rp.next(rules) {
                if !sym.is_term() {
                    closure.extend(self.analyzer.expand_rule(sym.name()));
                }
            }
        }
        closure.into_iter().collect()
    }

    fn compute_lr0_states(&mut self) {
        let mut cache: HashMap<Vec<RulePtr>, usize> = HashMap::new();
        let mut queue: VecDeque<usize> = VecDeque::new();

        for (start, root) in self.analyzer.root_rules.clone() {
            let kernel = vec![RulePtr::new(root, 0)];
            let mut closure: BTreeSet<RulePtr> = kernel.iter().copied().collect();
            closure.extend(self.analyzer.expand_rule(&start));
            let id = self.states.len();
            self.states.push(LR0ItemSet {
                kernel: kernel.clone(),
                closure: closure.into_iter().collect(),
                transitions: BTreeMap::new(),
                lookaheads: BTreeMap::new(),
            });
            cache.insert(kernel, id);
            self.start_states.insert(start, id);
            queue.push_back(id);
        }

        while let Some(state) = queue.pop_front() {
            let mut by_next: BTreeMap<Symbol, BTreeSet<RulePtr>> = BTreeMap::new();
            for rp in &self.states[state].closure {
                if let Some(sym) = rp.next(&self.analyzer.lr0_rules) {
                    by_next.entry(sym.clone()).or_default().insert(rp.advance());
                }
            }
            for (sym, kernel) in by_next {
                let kernel: Vec<RulePtr> = kernel.into_iter().collect();
                let target = match cache.get(&kernel) {
                    Some(&id) => id,
                    None => {
                        let closure = self.lr0_closure(&kernel);
                        let id = self.states.len();
                        self.states.push(LR0ItemSet {
                            kernel: kernel.clone(),
                            closure,
                            transitions: BTreeMap::new(),
                            lookaheads: BTreeMap::new(),
                        });
                        cache.insert(kernel, id);
                        queue.push_back(id);
                        id
                    }
                };
                self.states[state].transitions.insert(sym, target);
            }
        }
        log_debug!("LR(0) automaton has {} states", self.states.len());
    }

    fn compute_reads_relations(&mut self) {
        let rules = &self.analyzer.lr0_rules;

        for (start, &state) in &self.start_states {
            self.directly_reads
                .entry((state, start.clone()))
                .or_default()
                .insert(END.to_string());
        }

        for state in 0..self.states.len() {
            let mut seen: BTreeSet<&str> = BTreeSet::new();
            for rp in &self.states[state].closure {
                let Some(sym) = rp.next(rules) else { continue };
                if sym.is_term() || !seen.insert(sym.name()) {
                    continue;
                }
                let nt = (state, sym.name().to_string());
                self.nonterminal_transitions.push(nt.clone());
                let Some(&next_state) = self.states[state].transitions.get(sym) else {
                    continue;
                };
                let dr = self.directly_reads.entry(nt.clone()).or_default();
                let mut reads = BTreeSet::new();
                for rp2 in &self.states[next_state].closure {
                    let Some(s2) = rp2.next(rules) else { continue };
                    if s2.is_term() {
                        dr.insert(s2.name().to_string());
                    }
                    if self.analyzer.sets.is_nullable(s2.name()) {
                        reads.insert((next_state, s2.name().to_string()));
                    }
                }
                self.reads.entry(nt).or_default().extend(reads);
            }
        }
    }

    fn compute_includes_lookback(&mut self) {
        let rules = &self.analyzer.lr0_rules;
        for nt in self.nonterminal_transitions.clone() {
            let (state, nonterminal) = &nt;
            let mut includes = Vec::new();
            let mut lookback = BTreeSet::new();
            for rp in &self.states[*state].closure {
                if rp.index != 0 || rules[rp.rule].origin.name() != nonterminal {
                    continue;
                }
                let expansion = &rules[rp.rule].expansion;
                let mut state2 = *state;
                let mut complete = true;
                for (i, sym) in expansion.iter().enumerate() {
                    let nt2 = (state2, sym.name().to_string());
                    match self.states[state2].transitions.get(sym) {
                        Some(&s) => state2 = s,
                        None => {
                            complete = false;
                            break;
                        }
                    }
                    if !self.reads.contains_key(&nt2) {
                        continue;
                    }
                    if expansion[i + 1..]
                        .iter()
                        .all(|s| self.analyzer.sets.is_nullable(s.name()))
                    {
                        includes.push(nt2);
                    }
                }
                if complete {
                    let satisfied = RulePtr::new(rp.rule, expansion.len());
                    if self.states[state2].closure.contains(&satisfied) {
                        lookback.insert((state2, rp.rule));
                    }
                }
            }
            self.lookback.entry(nt.clone()).or_default().extend(lookback);
            for nt2 in includes {
                self.includes.entry(nt2).or_default().insert(nt.clone());
            }
        }
    }

    fn compute_lookaheads(&mut self) {
        let read_sets = digraph(&self.nonterminal_transitions, &self.reads, &self.directly_reads);
        let follow_sets = digraph(&self.nonterminal_transitions, &self.includes, &read_sets);

        for (nt, lookbacks) in &self.lookback {
            let Some(follow) = follow_sets.get(nt) else { continue };
            for &(state, rule) in lookbacks {
                for terminal in follow {
                    self.states[state]
                        .lookaheads
                        .entry(terminal.clone())
                        .or_default()
                        .insert(rule);
                }
            }
        }
    }

    fn rule_priority(&self, rule: RuleId) -> i32 {
        self.analyzer.lr0_rules[rule].options.priority.unwrap_or(0)
    }

    fn shift_priority(&self, state: &LR0ItemSet, terminal: &str) -> i32 {
        let rules = &self.analyzer.lr0_rules;
        state
            .closure
            .iter()
            .filter(|rp| rp.next(rules).is_some_and(|s| s.name() == terminal))
            .map(|rp| self.rule_priority(rp.rule))
            .max()
            .unwrap_or(0)
    }

    fn resolve_reduce_reduce(&self, terminal: &str, candidates: &BTreeSet<RuleId>) -> Result<RuleId, LarkError> {
        let rules = &self.analyzer.lr0_rules;
        let mut ranked: Vec<RuleId> = candidates.iter().copied().collect();
        ranked.sort_by_key(|&r| (-self.rule_priority(r), rules[r].order, r));
        let best = ranked[0];
        let second = ranked[1];
        if self.rule_priority(best) > self.rule_priority(second) {
            log_debug!(
                "Reduce/Reduce conflict on {} resolved by priority: {}",
                terminal,
                rules[best]
            );
            return Ok(best);
        }
        let listing: String = ranked.iter().map(|&r| format!("\n\t- {}", rules[r])).collect();
        if self.strict {
            return Err(LarkError::grammar(format!(
                "Reduce/Reduce collision in {} between the following rules: {}",
                terminal, listing
            )));
        }
        log_warn!(
            "Reduce/Reduce collision in {} resolved by declaration order: {}",
            terminal,
            listing
        );
        Ok(best)
    }

    fn compute_lalr1_states(self) -> Result<ParseTable, LarkError> {
        let rules = &self.analyzer.lr0_rules;
        let mut states = Vec::with_capacity(self.states.len());
        let mut goto = Vec::with_capacity(self.states.len());

        for itemset in &self.states {
            let mut actions: HashMap<String, Action> = HashMap::new();
            let mut gotos: HashMap<String, usize> = HashMap::new();
            for (sym, &target) in &itemset.transitions {
                if sym.is_term() {
                    actions.insert(sym.name().to_string(), Action::Shift(target));
                } else {
                    gotos.insert(sym.name().to_string(), target);
                }
            }

            for (la, candidates) in &itemset.lookaheads {
                let rule = if candidates.len() > 1 {
                    self.resolve_reduce_reduce(la, candidates)?
                } else {
                    match candidates.iter().next() {
                        Some(&r) => r,
                        None => continue,
                    }
                };
                if actions.contains_key(la.as_str()) {
                    let reduce_priority = self.rule_priority(rule);
                    let shift_priority = self.shift_priority(itemset, la);
                    if reduce_priority > shift_priority {
                        log_debug!(
                            "Shift/Reduce conflict for terminal {} resolved as reduce by priority: {}",
                            la,
                            rules[rule]
                        );
                        actions.insert(la.clone(), Action::Reduce(rule));
                    } else if shift_priority > reduce_priority {
                        log_debug!(
                            "Shift/Reduce conflict for terminal {} resolved as shift by priority: {}",
                            la,
                            rules[rule]
                        );
                    } else if self.strict {
                        return Err(LarkError::grammar(format!(
                            "Shift/Reduce conflict for terminal {}. [strict-mode]\n * {}",
                            la, rules[rule]
                        )));
                    } else {
                        log_warn!(
                            "Shift/Reduce conflict for terminal {}: (resolving as shift)\n * {}",
                            la,
                            rules[rule]
                        );
                    }
                } else {
                    actions.insert(la.clone(), Action::Reduce(rule));
                }
            }
            states.push(actions);
            goto.push(gotos);
        }

        let mut end_states = BTreeMap::new();
        for (id, itemset) in self.states.iter().enumerate() {
            for rp in &itemset.closure {
                if !rp.is_satisfied(rules) {
                    continue;
                }
                for start in self.start_states.keys() {
                    if rules[rp.rule].origin.name() == root_name(start) {
                        end_states.insert(start.clone(), id);
                    }
                }
            }
        }

        Ok(ParseTable {
            states,
            goto,
            start_states: self.start_states,
            end_states,
        })
    }
}

impl fmt::Debug for LalrAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LalrAnalyzer")
            .field("states", &self.states.len())
            .field("strict", &self.strict)
            .finish()
    }
}

struct Digraph<'a> {
    relation: &'a HashMap<NtTransition, BTreeSet<NtTransition>>,
    base: &'a HashMap<NtTransition, BTreeSet<String>>,
    stack: Vec<NtTransition>,
    depth: HashMap<NtTransition, isize>,
    result: HashMap<NtTransition, BTreeSet<String>>,
}

impl Digraph<'_> {
    fn traverse(&mut self, x: &NtTransition) {
        self.stack.push(x.clone());
        let d = self.stack.len() as isize;
        self.depth.insert(x.clone(), d);
        let initial = self.base.get(x).cloned().unwrap_or_default();
        self.result.insert(x.clone(), initial);

        if let Some(related) = self.relation.get(x) {
            for y in related {
                if self.depth.get(y).copied().unwrap_or(0) == 0 {
                    self.traverse(y);
                }
                let n_x = self.depth.get(x).copied().unwrap_or(0);
                let n_y = self.depth.get(y).copied().unwrap_or(0);
                if n_y > 0 && n_y < n_x {
                    self.depth.insert(x.clone(), n_y);
                }
                let from_y = self.result.get(y).cloned().unwrap_or_default();
                if let Some(fx) = self.result.get_mut(x) {
                    fx.extend(from_y);
                }
            }
        }

        if self.depth.get(x).copied() == Some(d) {
            let f_x = self.result.get(x).cloned().unwrap_or_default();
            while let Some(z) = self.stack.pop() {
                self.depth.insert(z.clone(), -1);
                let done = &z == x;
                self.result.insert(z, f_x.clone());
                if done {
                    break;
                }
            }
        }
    }
}

/// Solve `F(x) = G(x) ∪ ⋃{F(y) | x R y}` over the nodes `xs`
fn digraph(
    xs: &[NtTransition],
    relation: &HashMap<NtTransition, BTreeSet<NtTransition>>,
    base: &HashMap<NtTransition, BTreeSet<String>>,
) -> HashMap<NtTransition, BTreeSet<String>> {
    let mut g = Digraph {
        relation,
        base,
        stack: Vec::new(),
        depth: HashMap::new(),
        result: HashMap::new(),
    };
    for x in xs {
        if g.depth.get(x).copied().unwrap_or(0) == 0 {
            g.traverse(x);
        }
    }
    g.result
}
