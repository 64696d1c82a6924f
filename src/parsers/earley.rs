//! Earley parser over a token stream
//!
//! The chart follows Elizabeth Scott's SPPF-building recognizer: every
//! column is closed under prediction and completion, then the scanner moves
//! the items waiting for a terminal into the next column. Completions of
//! empty rules are held per column so that later predictions see them.
//!
//! Deterministic right recursion is short-circuited with Leo links: when a
//! completed `B` has exactly one waiting item in its origin column and `B`
//! ends that item's rule, the completion jumps straight to the top of the
//! chain. The skipped forest nodes are rebuilt after the parse, for the part
//! of the forest reachable from the root only.
//!
//! Scanning whole tokens lives here; scanning raw text with terminal regexes
//! lives in [`crate::parsers::xearley`].

use hashbrown::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{LarkError, UnexpectedEof, UnexpectedToken};
use crate::grammar::{Rule, RuleId, TOKEN_DEFAULT_PRIORITY};
use crate::lark::Ambiguity;
use crate::lexer::LexerThread;
use crate::parse_tree_builder::ParseTreeBuilder;
use crate::parsers::earley_common::{EarleyGrammar, Item, ItemKey, ItemSet, SymId};
use crate::parsers::earley_forest::{Forest, NodeId};
use crate::source_location::SourcePosition;
use crate::token::Token;
use crate::tree::Child;

/// Result of an Earley parse
#[derive(Debug, Clone)]
pub enum EarleyOutput {
    /// Tree built by the rule callbacks
    Tree(Child),
    /// The forest itself, for `ambiguity=forest`
    Forest(Forest),
}

/// Scoring data of a terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermInfo {
    /// Terminal priority
    pub priority: i32,
    /// Defined by a string literal
    pub literal: bool,
}

/// Earley parser: interned grammar, tree builder and ambiguity policy
#[derive(Clone)]
pub struct EarleyParser {
    grammar: EarleyGrammar,
    builder: Arc<ParseTreeBuilder>,
    ambiguity: Ambiguity,
    terms: HashMap<String, TermInfo>,
}

impl EarleyParser {
    /// Prepare predictions for `rules`
    ///
    /// `terms` gives each terminal's priority; unknown terminals score
    /// [`TOKEN_DEFAULT_PRIORITY`].
    pub fn new(
        rules: Vec<Rule>,
        start: &[String],
        builder: ParseTreeBuilder,
        ambiguity: Ambiguity,
        terms: HashMap<String, TermInfo>,
    ) -> Result<Self, LarkError> {
        let grammar = EarleyGrammar::new(rules.into(), start)?;
        Ok(Self {
            grammar,
            builder: Arc::new(builder),
            ambiguity,
            terms,
        })
    }

    /// Interned grammar
    pub fn grammar(&self) -> &EarleyGrammar {
        &self.grammar
    }

    /// Rules of the grammar
    pub fn rules(&self) -> &[Rule] {
        self.grammar.rules()
    }

    /// Ambiguity policy
    pub fn ambiguity(&self) -> Ambiguity {
        self.ambiguity
    }

    /// Parse the tokens of `lexer` as `start`
    pub fn parse(&self, lexer: &mut LexerThread<'_>, start: &str) -> Result<EarleyOutput, LarkError> {
        let mut chart = Chart::new(self, start)?;
        let mut to_scan = chart.predict_start();
        let mut i = 0;
        let mut last: Option<Token> = None;
        while let Some(token) = lexer.next_token(None)? {
            chart.predict_and_complete(i, &mut to_scan);
            to_scan = chart.scan_token(i, &token, &to_scan)?;
            last = Some(token);
            i += 1;
        }
        chart.predict_and_complete(i, &mut to_scan);
        let eof = match &last {
            Some(t) => t.end(),
            None => SourcePosition::start(),
        };
        chart.finish(i, &to_scan, eof)
    }
}

impl fmt::Debug for EarleyParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EarleyParser")
            .field("rules", &self.grammar.rules().len())
            .field("ambiguity", &self.ambiguity)
            .finish()
    }
}

/// Leo link of `(column, symbol)`: the single item waiting for the symbol
#[derive(Debug, Clone, Copy)]
struct LeoLink {
    rule: RuleId,
    start: usize,
    left: Option<NodeId>,
    origin: SymId,
    next: bool,
    top: (RuleId, usize),
}

/// A completion that went through a Leo chain, rebuilt after the parse
#[derive(Debug, Clone, Copy)]
struct LeoPath {
    column: usize,
    symbol: SymId,
    bottom: NodeId,
}

/// State of one parse
pub(crate) struct Chart<'p> {
    parser: &'p EarleyParser,
    start: SymId,
    pub(crate) columns: Vec<ItemSet>,
    forest: Forest,
    labels: HashMap<(ItemKey, usize), NodeId>,
    tokens: HashMap<(String, usize, usize), NodeId>,
    held: HashMap<SymId, NodeId>,
    leo: Vec<HashMap<SymId, Option<LeoLink>>>,
    leo_paths: HashMap<NodeId, Vec<LeoPath>>,
}

impl<'p> Chart<'p> {
    pub(crate) fn new(parser: &'p EarleyParser, start: &str) -> Result<Self, LarkError> {
        let start_id = parser
            .grammar
            .id(start)
            .filter(|&s| !parser.grammar.is_term(s))
            .ok_or_else(|| LarkError::config(format!("Unknown start rule {}", start)))?;
        Ok(Self {
            parser,
            start: start_id,
            columns: vec![ItemSet::new()],
            forest: Forest::new(Arc::clone(parser.grammar.rules())),
            labels: HashMap::new(),
            tokens: HashMap::new(),
            held: HashMap::new(),
            leo: Vec::new(),
            leo_paths: HashMap::new(),
        })
    }

    pub(crate) fn grammar(&self) -> &'p EarleyGrammar {
        &self.parser.grammar
    }

    pub(crate) fn start_symbol(&self) -> SymId {
        self.start
    }

    /// Predict the start symbol in column 0; returns the scan buffer
    pub(crate) fn predict_start(&mut self) -> ItemSet {
        let g = self.grammar();
        let mut to_scan = ItemSet::new();
        for &rule in g.predictions(self.start) {
            let item = Item::new(rule, 0, 0);
            match g.expect(&item) {
                Some(sym) if g.is_term(sym) => {
                    to_scan.add(g, item);
                }
                _ => {
                    self.columns[0].add(g, item);
                }
            }
        }
        to_scan
    }

    fn node_for(&mut self, key: ItemKey, end: usize) -> NodeId {
        if let Some(&id) = self.labels.get(&(key, end)) {
            return id;
        }
        let g = self.grammar();
        let id = match key {
            ItemKey::Complete { origin, start } => self.forest.add_symbol(g.name(origin), start, end),
            ItemKey::Partial { rule, ptr, start } => self.forest.add_intermediate(rule, ptr, start, end),
        };
        self.labels.insert((key, end), id);
        id
    }

    pub(crate) fn token_node(&mut self, token: &Token, start: usize, end: usize) -> NodeId {
        let cache_key = (token.kind.clone(), start, end);
        if let Some(&id) = self.tokens.get(&cache_key) {
            return id;
        }
        let info = self.parser.terms.get(&token.kind).copied().unwrap_or(TermInfo {
            priority: TOKEN_DEFAULT_PRIORITY,
            literal: false,
        });
        let id = self.forest.add_token(
            token.clone(),
            start,
            end,
            info.priority - TOKEN_DEFAULT_PRIORITY,
            info.literal,
        );
        self.tokens.insert(cache_key, id);
        id
    }

    /// Advance `item` over a scanned token; the new item ends at `end`
    pub(crate) fn advance_with_token(&mut self, item: &Item, token_node: NodeId, end: usize) -> Item {
        let new_item = item.advance();
        let key = self.grammar().key(&new_item);
        let node = self.node_for(key, end);
        self.forest.add_family(node, item.rule, item.node, Some(token_node));
        new_item.with_node(node)
    }

    /// Put a freshly scanned item into the next column or scan buffer
    pub(crate) fn place_next(&self, item: Item, next_set: &mut ItemSet, next_to_scan: &mut ItemSet) {
        let g = self.grammar();
        match g.expect(&item) {
            Some(sym) if g.is_term(sym) => {
                next_to_scan.add(g, item);
            }
            _ => {
                next_set.add(g, item);
            }
        }
    }

    fn push_item(&mut self, i: usize, item: Item, to_scan: &mut ItemSet, queue: &mut Vec<Item>) {
        let g = self.grammar();
        match g.expect(&item) {
            Some(sym) if g.is_term(sym) => {
                to_scan.add(g, item);
            }
            _ => {
                if self.columns[i].add(g, item) {
                    queue.push(item);
                }
            }
        }
    }

    /// Close column `i` under prediction and completion
    pub(crate) fn predict_and_complete(&mut self, i: usize, to_scan: &mut ItemSet) {
        let g = self.grammar();
        self.held.clear();
        let mut queue: Vec<Item> = self.columns[i].items().to_vec();
        while let Some(item) = queue.pop() {
            match g.expect(&item) {
                None => self.complete(i, item, to_scan, &mut queue),
                Some(sym) if !g.is_term(sym) => {
                    for &rule in g.predictions(sym) {
                        self.push_item(i, Item::new(rule, 0, i), to_scan, &mut queue);
                    }
                    if let Some(&held) = self.held.get(&sym) {
                        let new_item = item.advance();
                        let node = self.node_for(g.key(&new_item), i);
                        self.forest.add_family(node, new_item.rule, item.node, Some(held));
                        self.push_item(i, new_item.with_node(node), to_scan, &mut queue);
                    }
                }
                Some(_) => {}
            }
        }
    }

    fn complete(&mut self, i: usize, item: Item, to_scan: &mut ItemSet, queue: &mut Vec<Item>) {
        let g = self.grammar();
        let key = g.key(&item);
        let node = match item.node {
            Some(n) => n,
            None => {
                let n = self.node_for(key, i);
                self.forest.add_family(n, item.rule, None, None);
                self.columns[i].set_node(&key, n);
                n
            }
        };
        let origin = g.origin(item.rule);

        if item.start < i {
            if let Some(link) = self.leo_link(item.start, origin) {
                let (rule, start) = link.top;
                let top = Item::new(rule, g.rule_len(rule), start);
                let top_node = self.node_for(g.key(&top), i);
                self.leo_paths.entry(top_node).or_default().push(LeoPath {
                    column: item.start,
                    symbol: origin,
                    bottom: node,
                });
                self.push_item(i, top.with_node(top_node), to_scan, queue);
                return;
            }
        } else {
            self.held.insert(origin, node);
        }

        let originators: Vec<Item> = self.columns[item.start].expecting(origin).copied().collect();
        for orig in originators {
            let new_item = orig.advance();
            let new_node = self.node_for(g.key(&new_item), i);
            self.forest.add_family(new_node, new_item.rule, orig.node, Some(node));
            self.push_item(i, new_item.with_node(new_node), to_scan, queue);
        }
    }

    fn leo_get(&self, column: usize, sym: SymId) -> Option<Option<LeoLink>> {
        self.leo.get(column).and_then(|m| m.get(&sym)).copied()
    }

    fn leo_set(&mut self, column: usize, sym: SymId, link: Option<LeoLink>) {
        if self.leo.len() <= column {
            self.leo.resize_with(column + 1, HashMap::new);
        }
        self.leo[column].insert(sym, link);
    }

    /// The only item of a closed column waiting for `sym`, if `sym` ends its rule
    fn unique_penultimate(&self, column: usize, sym: SymId) -> Option<Item> {
        let g = self.grammar();
        let mut waiting = self.columns[column].expecting(sym);
        let first = *waiting.next()?;
        if waiting.next().is_some() || first.ptr + 1 != g.rule_len(first.rule) {
            return None;
        }
        Some(first)
    }

    /// Leo link of a closed column, computed once
    fn leo_link(&mut self, column: usize, sym: SymId) -> Option<LeoLink> {
        let g = self.grammar();
        let mut pending: Vec<(usize, SymId, Item)> = Vec::new();
        let (mut col, mut s) = (column, sym);
        let mut tail = loop {
            if let Some(known) = self.leo_get(col, s) {
                break known;
            }
            // the start symbol from column 0 must stay visible as a complete item
            if col == 0 && s == self.start {
                self.leo_set(col, s, None);
                break None;
            }
            let Some(orig) = self.unique_penultimate(col, s) else {
                self.leo_set(col, s, None);
                break None;
            };
            self.leo_set(col, s, None);
            pending.push((col, s, orig));
            col = orig.start;
            s = g.origin(orig.rule);
        };
        while let Some((c, s, orig)) = pending.pop() {
            let link = LeoLink {
                rule: orig.rule,
                start: orig.start,
                left: orig.node,
                origin: g.origin(orig.rule),
                next: tail.is_some(),
                top: tail.map_or((orig.rule, orig.start), |t| t.top),
            };
            self.leo_set(c, s, Some(link));
            tail = Some(link);
        }
        tail
    }

    /// Rebuild the nodes skipped by Leo completions below `root`
    fn materialize_leo(&mut self, root: NodeId) {
        if self.leo_paths.is_empty() {
            return;
        }
        let mut seen = hashbrown::HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(paths) = self.leo_paths.remove(&id) {
                let end = self.forest.node(id).end;
                for path in paths {
                    let mut right = path.bottom;
                    let (mut col, mut sym) = (path.column, path.symbol);
                    while let Some(Some(link)) = self.leo_get(col, sym) {
                        let key = ItemKey::Complete {
                            origin: link.origin,
                            start: link.start,
                        };
                        let node = self.node_for(key, end);
                        self.forest.add_family(node, link.rule, link.left, Some(right));
                        right = node;
                        if !link.next {
                            break;
                        }
                        col = link.start;
                        sym = link.origin;
                    }
                }
            }
            for fam in &self.forest.node(id).families {
                stack.extend(fam.left.into_iter().chain(fam.right).filter(|c| !seen.contains(c)));
            }
        }
    }

    /// Scan one token at column `i`
    fn scan_token(&mut self, i: usize, token: &Token, to_scan: &ItemSet) -> Result<ItemSet, LarkError> {
        let g = self.grammar();
        let mut next_set = ItemSet::new();
        let mut next_to_scan = ItemSet::new();
        let token_node = self.token_node(token, i, i + 1);
        for item in to_scan.items() {
            let matches = g.expect(item).is_some_and(|sym| g.name(sym) == token.kind);
            if matches {
                let new_item = self.advance_with_token(item, token_node, i + 1);
                self.place_next(new_item, &mut next_set, &mut next_to_scan);
            }
        }
        if next_set.is_empty() && next_to_scan.is_empty() {
            let expected = expected_terminals(g, to_scan);
            return Err(LarkError::UnexpectedToken(UnexpectedToken::new(
                token.clone(),
                expected,
                None,
            )));
        }
        self.columns.push(next_set);
        Ok(next_to_scan)
    }

    /// Find the solution in the last column and produce the output
    pub(crate) fn finish(mut self, i: usize, to_scan: &ItemSet, eof: SourcePosition) -> Result<EarleyOutput, LarkError> {
        let key = ItemKey::Complete {
            origin: self.start,
            start: 0,
        };
        let solution = self
            .columns
            .get(i)
            .and_then(|c| c.get(&key))
            .and_then(|item| item.node.or_else(|| self.labels.get(&(key, i)).copied()));
        let Some(root) = solution else {
            let expected = expected_terminals(self.grammar(), to_scan);
            return Err(LarkError::UnexpectedEof(UnexpectedEof::new(
                expected,
                eof.offset,
                eof.line,
                eof.column,
            )));
        };

        self.materialize_leo(root);
        self.forest.set_root(root);
        self.forest.prioritize();
        log_debug!("Earley parse done: {} columns, {} forest nodes", self.columns.len(), self.forest.len());

        let parser = self.parser;
        let forest = self.forest.with_builder(Arc::clone(&parser.builder));
        match parser.ambiguity {
            Ambiguity::Forest => Ok(EarleyOutput::Forest(forest)),
            Ambiguity::Explicit => Ok(EarleyOutput::Tree(forest.to_tree(true)?)),
            Ambiguity::Auto | Ambiguity::Resolve => Ok(EarleyOutput::Tree(forest.to_tree(false)?)),
        }
    }
}

pub(crate) fn expected_terminals(g: &EarleyGrammar, to_scan: &ItemSet) -> Vec<String> {
    to_scan
        .items()
        .iter()
        .filter_map(|item| g.expect(item))
        .map(|sym| g.name(sym).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Pattern, Symbol, TerminalDef};
    use crate::lexer::{BasicLexer, LexerConf};
    use crate::parse_tree_builder::AMBIG;
    use crate::regex_backend::DefaultBackend;
    use crate::tree::Tree;

    fn lexer(terms: Vec<TerminalDef>) -> BasicLexer {
        let conf = LexerConf::new(terms, vec![], Arc::new(DefaultBackend::new()));
        BasicLexer::new(&conf).unwrap()
    }

    fn earley(rules: Vec<Rule>, ambiguity: Ambiguity) -> EarleyParser {
        let explicit = ambiguity != Ambiguity::Resolve;
        let builder = ParseTreeBuilder::new(&rules, false, explicit, false);
        EarleyParser::new(rules, &["start".to_string()], builder, ambiguity, HashMap::new()).unwrap()
    }

    fn parse(parser: &EarleyParser, lexer: &BasicLexer, text: &str) -> Result<Child, LarkError> {
        let mut thread = LexerThread::new(lexer, text.as_bytes(), None);
        match parser.parse(&mut thread, "start")? {
            EarleyOutput::Tree(t) => Ok(t),
            EarleyOutput::Forest(_) => panic!("expected a tree"),
        }
    }

    fn nt(n: &str) -> Symbol {
        Symbol::nonterminal(n)
    }

    fn t(n: &str) -> Symbol {
        Symbol::terminal(n)
    }

    fn x_lexer() -> BasicLexer {
        lexer(vec![TerminalDef::new("X", Pattern::string("x", ""))])
    }

    #[test]
    fn test_left_recursion() {
        // start: start X | X
        let parser = earley(
            vec![
                Rule::new(nt("start"), vec![nt("start"), t("X")]),
                Rule::new(nt("start"), vec![t("X")]),
            ],
            Ambiguity::Resolve,
        );
        let tree = parse(&parser, &x_lexer(), "xxx").unwrap();
        let tree = tree.as_tree().unwrap();
        assert_eq!(tree.data, "start");
        assert_eq!(tree.iter_subtrees().len(), 3);
    }

    #[test]
    fn test_right_recursion_through_leo() {
        // start: X start | X
        let parser = earley(
            vec![
                Rule::new(nt("start"), vec![t("X"), nt("start")]),
                Rule::new(nt("start"), vec![t("X")]),
            ],
            Ambiguity::Resolve,
        );
        let tree = parse(&parser, &x_lexer(), "xxxxx").unwrap();
        let tree = tree.as_tree().unwrap();
        assert_eq!(tree.iter_subtrees().len(), 5);
        assert_eq!(tree.scan_values(|_| true).len(), 5);
    }

    #[test]
    fn test_leo_chain_below_start() {
        // start: a ; a: X a | X
        let parser = earley(
            vec![
                Rule::new(nt("start"), vec![nt("a")]),
                Rule::new(nt("a"), vec![t("X"), nt("a")]),
                Rule::new(nt("a"), vec![t("X")]),
            ],
            Ambiguity::Resolve,
        );
        let tree = parse(&parser, &x_lexer(), "xxxx").unwrap();
        let tree = tree.as_tree().unwrap();
        assert_eq!(tree.find_data("a").count(), 4);
    }

    #[test]
    fn test_empty_rules() {
        // start: a a X ; a: | X
        let parser = earley(
            vec![
                Rule::new(nt("start"), vec![nt("a"), nt("a"), t("X")]),
                Rule::new(nt("a"), vec![]),
                Rule::new(nt("a"), vec![t("X")]),
            ],
            Ambiguity::Resolve,
        );
        assert!(parse(&parser, &x_lexer(), "x").is_ok());
        assert!(parse(&parser, &x_lexer(), "xxx").is_ok());
        assert!(parse(&parser, &x_lexer(), "xxxx").is_err());
    }

    #[test]
    fn test_explicit_ambiguity() {
        // start: a X | X a ; a: X
        let parser = earley(
            vec![
                Rule::new(nt("start"), vec![nt("a"), t("X")]),
                Rule::new(nt("start"), vec![t("X"), nt("a")]),
                Rule::new(nt("a"), vec![t("X")]),
            ],
            Ambiguity::Explicit,
        );
        let tree = parse(&parser, &x_lexer(), "xx").unwrap();
        let tree = tree.as_tree().unwrap();
        assert_eq!(tree.data, AMBIG);
        assert_eq!(tree.children.len(), 2);
    }

    #[test]
    fn test_unexpected_token_and_eof() {
        let parser = earley(
            vec![Rule::new(nt("start"), vec![t("X"), t("Y")])],
            Ambiguity::Resolve,
        );
        let lex = lexer(vec![
            TerminalDef::new("X", Pattern::string("x", "")),
            TerminalDef::new("Y", Pattern::string("y", "")),
        ]);
        match parse(&parser, &lex, "xx").unwrap_err() {
            LarkError::UnexpectedToken(e) => assert_eq!(e.expected, vec!["Y".to_string()]),
            other => panic!("unexpected error: {}", other),
        }
        match parse(&parser, &lex, "x").unwrap_err() {
            LarkError::UnexpectedEof(e) => assert_eq!(e.expected, vec!["Y".to_string()]),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_forest_output() {
        let parser = earley(vec![Rule::new(nt("start"), vec![t("X")])], Ambiguity::Forest);
        let lex = x_lexer();
        let mut thread = LexerThread::new(&lex, b"x", None);
        match parser.parse(&mut thread, "start").unwrap() {
            EarleyOutput::Forest(f) => {
                assert!(!f.is_ambiguous());
                let tree = f.to_tree(false).unwrap();
                assert_eq!(
                    tree,
                    Child::Tree(Tree::new("start", vec![Child::Token(Token::new("X", "x"))]))
                );
            }
            EarleyOutput::Tree(_) => panic!("expected a forest"),
        }
    }
}
