//! Shared packed parse forest
//!
//! An Earley parse produces an arena of [`ForestNode`]s. Symbol nodes stand
//! for a completed rule over a span, intermediate nodes for a rule matched up
//! to some position, token nodes for scanned terminals. Symbol and
//! intermediate nodes hold one [`PackedNode`] per derivation (a "family"); a
//! node with more than one family is ambiguous.
//!
//! Derivations are binarized: a family's `left` is the node of the rule
//! prefix, its `right` the node of the last matched symbol.

use hashbrown::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::LarkError;
use crate::grammar::{Rule, RuleId};
use crate::parse_tree_builder::{ParseTreeBuilder, AMBIG};
use crate::token::Token;
use crate::tree::{Child, Tree};

/// Index of a node in a [`Forest`]
pub type NodeId = usize;

/// What a forest node stands for
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A completed non-terminal
    Symbol(String),
    /// Rule `rule` matched up to (not including) `ptr`
    Intermediate {
        /// Rule being matched
        rule: RuleId,
        /// Number of symbols matched
        ptr: usize,
    },
    /// A scanned terminal
    Token(Token),
}

/// One derivation of a symbol or intermediate node
#[derive(Debug, Clone, PartialEq)]
pub struct PackedNode {
    /// Rule the derivation belongs to
    pub rule: RuleId,
    /// Node of the matched prefix
    pub left: Option<NodeId>,
    /// Node of the last matched symbol
    pub right: Option<NodeId>,
    /// Priority sum, valid after [`Forest::prioritize`]
    pub priority: i32,
}

impl PackedNode {
    /// True for the derivation of an empty rule
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    fn children(&self) -> impl Iterator<Item = NodeId> {
        self.left.into_iter().chain(self.right)
    }
}

/// A node of the forest
#[derive(Debug, Clone)]
pub struct ForestNode {
    /// What the node stands for
    pub kind: NodeKind,
    /// Start column
    pub start: usize,
    /// End column
    pub end: usize,
    /// Alternative derivations, best first after [`Forest::prioritize`]
    pub families: Vec<PackedNode>,
    /// Best family priority; the terminal priority for tokens
    pub priority: i32,
    literal: bool,
}

impl ForestNode {
    /// True for partial rule nodes
    #[inline]
    pub fn is_intermediate(&self) -> bool {
        matches!(self.kind, NodeKind::Intermediate { .. })
    }

    /// The token of a token node
    #[inline]
    pub fn token(&self) -> Option<&Token> {
        match &self.kind {
            NodeKind::Token(t) => Some(t),
            _ => None,
        }
    }

    /// More than one derivation
    #[inline]
    pub fn is_ambiguous(&self) -> bool {
        self.families.len() > 1
    }
}

/// Arena of forest nodes with a designated root
#[derive(Clone)]
pub struct Forest {
    nodes: Vec<ForestNode>,
    family_keys: HashSet<(NodeId, RuleId, Option<NodeId>, Option<NodeId>)>,
    root: Option<NodeId>,
    rules: Arc<[Rule]>,
    builder: Option<Arc<ParseTreeBuilder>>,
}

impl Forest {
    /// Empty forest over `rules`
    pub fn new(rules: Arc<[Rule]>) -> Self {
        Self {
            nodes: Vec::new(),
            family_keys: HashSet::new(),
            root: None,
            rules,
            builder: None,
        }
    }

    /// Attach the tree builder used by [`Forest::to_tree`]
    pub fn with_builder(mut self, builder: Arc<ParseTreeBuilder>) -> Self {
        self.builder = Some(builder);
        self
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True for a forest without nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root node, once the parse succeeded
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Node by id
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this forest.
    pub fn node(&self, id: NodeId) -> &ForestNode {
        &self.nodes[id]
    }

    /// Rules the families refer to
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// True if any node reachable from the root has several derivations
    pub fn is_ambiguous(&self) -> bool {
        self.reachable().into_iter().any(|id| self.nodes[id].is_ambiguous())
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub(crate) fn add_symbol(&mut self, name: &str, start: usize, end: usize) -> NodeId {
        self.push(NodeKind::Symbol(name.to_string()), start, end, 0, false)
    }

    pub(crate) fn add_intermediate(&mut self, rule: RuleId, ptr: usize, start: usize, end: usize) -> NodeId {
        self.push(NodeKind::Intermediate { rule, ptr }, start, end, 0, false)
    }

    /// `literal` marks tokens of string terminals
    pub(crate) fn add_token(&mut self, token: Token, start: usize, end: usize, priority: i32, literal: bool) -> NodeId {
        self.push(NodeKind::Token(token), start, end, priority, literal)
    }

    fn push(&mut self, kind: NodeKind, start: usize, end: usize, priority: i32, literal: bool) -> NodeId {
        self.nodes.push(ForestNode {
            kind,
            start,
            end,
            families: Vec::new(),
            priority,
            literal,
        });
        self.nodes.len() - 1
    }

    /// Add a derivation unless an identical one exists
    pub(crate) fn add_family(&mut self, node: NodeId, rule: RuleId, left: Option<NodeId>, right: Option<NodeId>) -> bool {
        if !self.family_keys.insert((node, rule, left, right)) {
            return false;
        }
        self.nodes[node].families.push(PackedNode {
            rule,
            left,
            right,
            priority: 0,
        });
        true
    }

    /// Node ids reachable from the root
    pub fn reachable(&self) -> Vec<NodeId> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        let mut out = Vec::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            for fam in &self.nodes[id].families {
                stack.extend(fam.children().filter(|c| !seen.contains(c)));
            }
        }
        out
    }

    /// Sum priorities bottom-up and order every node's families best first
    ///
    /// A family scores its rule's priority (not counted on intermediate
    /// nodes) plus the scores of its children; a node scores its best family.
    /// Families sort by: non-empty first, higher score, a last child matched
    /// by a string terminal over one matched by a regex, lower rule order.
    /// A node counts as string-matched when its best family does, so the
    /// preference survives rules wrapping the token.
    pub fn prioritize(&mut self) {
        let Some(root) = self.root else {
            return;
        };
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }
        let mut marks = vec![Mark::New; self.nodes.len()];
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                self.score(id);
                marks[id] = Mark::Done;
                continue;
            }
            if marks[id] != Mark::New {
                continue;
            }
            marks[id] = Mark::Active;
            stack.push((id, true));
            for fam in &self.nodes[id].families {
                for child in fam.children() {
                    if marks[child] == Mark::New {
                        stack.push((child, false));
                    }
                }
            }
        }
    }

    fn score(&mut self, id: NodeId) {
        if self.nodes[id].token().is_some() {
            return;
        }
        let intermediate = self.nodes[id].is_intermediate();
        let mut families = std::mem::take(&mut self.nodes[id].families);
        for fam in &mut families {
            let own = if intermediate {
                0
            } else {
                self.rules[fam.rule].options.priority.unwrap_or(0)
            };
            fam.priority = own + fam.children().map(|c| self.nodes[c].priority).sum::<i32>();
        }
        let literal = |fam: &PackedNode| fam.right.is_some_and(|r| self.nodes[r].literal);
        families.sort_by(|a, b| {
            a.is_empty()
                .cmp(&b.is_empty())
                .then(b.priority.cmp(&a.priority))
                .then(literal(b).cmp(&literal(a)))
                .then(self.rules[a.rule].order.cmp(&self.rules[b.rule].order))
        });
        let best_literal = families.first().is_some_and(|f| literal(f));
        let node = &mut self.nodes[id];
        node.priority = families.iter().map(|f| f.priority).max().unwrap_or(0);
        node.literal = best_literal;
        node.families = families;
    }

    /// Convert to a tree with the attached builder
    ///
    /// With `explicit`, every ambiguous symbol node becomes an `_ambig` tree
    /// holding one subtree per derivation; otherwise the first family of each
    /// node is taken. Call [`Forest::prioritize`] first.
    pub fn to_tree(&self, explicit: bool) -> Result<Child, LarkError> {
        let builder = self
            .builder
            .as_deref()
            .ok_or_else(|| LarkError::config("forest has no tree builder attached"))?;
        self.to_tree_with(builder, explicit)
    }

    /// Convert to a tree with the given builder
    pub fn to_tree_with(&self, builder: &ParseTreeBuilder, explicit: bool) -> Result<Child, LarkError> {
        let root = self
            .root
            .ok_or_else(|| LarkError::internal("forest has no root"))?;
        ForestToTree {
            forest: self,
            builder,
            explicit,
        }
        .run(root)
    }
}

impl fmt::Debug for Forest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forest")
            .field("nodes", &self.nodes.len())
            .field("root", &self.root)
            .finish()
    }
}

/// Alternative child sequences a node contributes to its parent
type Alts = Vec<Vec<Child>>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Left,
    Right,
    Combine,
}

struct Frame {
    node: NodeId,
    family: usize,
    stage: Stage,
    left: Alts,
    right: Alts,
    built: Vec<Child>,
    seqs: Alts,
}

impl Frame {
    fn new(node: NodeId) -> Self {
        Self {
            node,
            family: 0,
            stage: Stage::Left,
            left: Vec::new(),
            right: Vec::new(),
            built: Vec::new(),
            seqs: Vec::new(),
        }
    }

    fn next_family(&mut self) {
        self.family += 1;
        self.stage = Stage::Left;
        self.left.clear();
        self.right.clear();
    }

    fn has_result(&self) -> bool {
        !self.built.is_empty() || !self.seqs.is_empty()
    }
}

/// Iterative forest walk
///
/// A node already on the walk path is a cycle; the family that reached it
/// fails and the next family is tried.
struct ForestToTree<'f> {
    forest: &'f Forest,
    builder: &'f ParseTreeBuilder,
    explicit: bool,
}

enum Entered {
    Value(Option<Alts>),
    Pushed,
}

impl ForestToTree<'_> {
    fn run(&self, root: NodeId) -> Result<Child, LarkError> {
        let mut frames: Vec<Frame> = Vec::new();
        let mut on_path: HashSet<NodeId> = HashSet::new();
        let mut cache: HashMap<NodeId, Alts> = HashMap::new();
        let mut ret: Option<Option<Alts>> = None;

        if let Entered::Value(v) = self.enter(root, &mut frames, &mut on_path, &cache) {
            ret = Some(v);
        }

        while let Some(frame) = frames.last_mut() {
            if let Some(value) = ret.take() {
                match (value, frame.stage) {
                    (None, _) => frame.next_family(),
                    (Some(alts), Stage::Left) => {
                        frame.left = alts;
                        frame.stage = Stage::Right;
                    }
                    (Some(alts), Stage::Right) => {
                        frame.right = alts;
                        frame.stage = Stage::Combine;
                    }
                    (Some(_), Stage::Combine) => {
                        return Err(LarkError::internal("forest walk out of sync"));
                    }
                }
            }

            let node = self.forest.node(frame.node);
            if frame.family >= node.families.len() || (!self.explicit && frame.has_result()) {
                let id = frame.node;
                let value = match frames.pop() {
                    Some(done) => self.finish(done),
                    None => None,
                };
                on_path.remove(&id);
                if self.explicit {
                    if let Some(v) = &value {
                        cache.insert(id, v.clone());
                    }
                }
                ret = Some(value);
                continue;
            }

            let fam = &node.families[frame.family];
            let need = match frame.stage {
                Stage::Left => match fam.left {
                    Some(left) => Some(left),
                    None => {
                        frame.left = vec![Vec::new()];
                        frame.stage = Stage::Right;
                        None
                    }
                },
                Stage::Right => match fam.right {
                    Some(right) => Some(right),
                    None => {
                        frame.right = vec![Vec::new()];
                        frame.stage = Stage::Combine;
                        None
                    }
                },
                Stage::Combine => {
                    let left = std::mem::take(&mut frame.left);
                    let right = std::mem::take(&mut frame.right);
                    for l in &left {
                        for r in &right {
                            let mut seq = Vec::with_capacity(l.len() + r.len());
                            seq.extend(l.iter().cloned());
                            seq.extend(r.iter().cloned());
                            if node.is_intermediate() {
                                frame.seqs.push(seq);
                            } else {
                                frame.built.push(self.builder.build(fam.rule, seq));
                            }
                        }
                    }
                    frame.next_family();
                    None
                }
            };

            if let Some(child) = need {
                if let Entered::Value(v) = self.enter(child, &mut frames, &mut on_path, &cache) {
                    ret = Some(v);
                }
            }
        }

        match ret {
            Some(Some(mut alts)) if !alts.is_empty() && alts[0].len() == 1 => {
                let mut first = alts.swap_remove(0);
                first
                    .pop()
                    .ok_or_else(|| LarkError::internal("empty forest root"))
            }
            _ => Err(LarkError::internal("Infinite recursion in grammar")),
        }
    }

    fn enter(
        &self,
        id: NodeId,
        frames: &mut Vec<Frame>,
        on_path: &mut HashSet<NodeId>,
        cache: &HashMap<NodeId, Alts>,
    ) -> Entered {
        let node = self.forest.node(id);
        if let Some(token) = node.token() {
            return Entered::Value(Some(vec![vec![Child::Token(token.clone())]]));
        }
        if on_path.contains(&id) || node.families.is_empty() {
            return Entered::Value(None);
        }
        if let Some(v) = cache.get(&id) {
            return Entered::Value(Some(v.clone()));
        }
        on_path.insert(id);
        frames.push(Frame::new(id));
        Entered::Pushed
    }

    fn finish(&self, frame: Frame) -> Option<Alts> {
        let node = self.forest.node(frame.node);
        if node.is_intermediate() {
            let mut seqs = frame.seqs;
            if seqs.is_empty() {
                return None;
            }
            if self.explicit {
                let mut unique: Alts = Vec::with_capacity(seqs.len());
                for s in seqs {
                    if !unique.contains(&s) {
                        unique.push(s);
                    }
                }
                return Some(unique);
            }
            seqs.truncate(1);
            return Some(seqs);
        }

        let mut built = frame.built;
        if built.is_empty() {
            return None;
        }
        if !self.explicit {
            built.truncate(1);
            return Some(vec![built]);
        }
        let mut alternatives: Vec<Child> = Vec::with_capacity(built.len());
        for child in built {
            let parts = match child {
                Child::Tree(t) if t.data == AMBIG => t.children,
                other => vec![other],
            };
            for part in parts {
                if !alternatives.contains(&part) {
                    alternatives.push(part);
                }
            }
        }
        if alternatives.len() == 1 {
            Some(vec![alternatives])
        } else {
            Some(vec![vec![Child::Tree(Tree::new(AMBIG, alternatives))]])
        }
    }
}
