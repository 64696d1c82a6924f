//! Parse trees
//!
//! A [`Tree`] owns its children outright. Equality compares `data` and
//! children and ignores [`Meta`], so trees built from different inputs with
//! the same shape compare equal.

use std::fmt;

use crate::token::Token;

/// Source span of a tree node, filled by position propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Meta {
    /// True until a span has been recorded
    pub empty: bool,
    /// Line of the first token
    pub line: usize,
    /// Column of the first token
    pub column: usize,
    /// Byte offset of the first token
    pub start_pos: usize,
    /// Line of the last token
    pub end_line: usize,
    /// Column after the last token
    pub end_column: usize,
    /// Byte offset after the last token
    pub end_pos: usize,
}

impl Meta {
    /// Meta without a span
    pub fn empty() -> Self {
        Self {
            empty: true,
            ..Default::default()
        }
    }

    /// Copy start coordinates from a token
    pub fn set_start_from_token(&mut self, tok: &Token) {
        self.line = tok.line;
        self.column = tok.column;
        self.start_pos = tok.start_pos;
        self.empty = false;
    }

    /// Copy end coordinates from a token
    pub fn set_end_from_token(&mut self, tok: &Token) {
        self.end_line = tok.end_line;
        self.end_column = tok.end_column;
        self.end_pos = tok.end_pos;
        self.empty = false;
    }

    /// Copy start coordinates from another meta
    pub fn set_start_from_meta(&mut self, other: &Meta) {
        self.line = other.line;
        self.column = other.column;
        self.start_pos = other.start_pos;
        self.empty = false;
    }

    /// Copy end coordinates from another meta
    pub fn set_end_from_meta(&mut self, other: &Meta) {
        self.end_line = other.end_line;
        self.end_column = other.end_column;
        self.end_pos = other.end_pos;
        self.empty = false;
    }
}

/// A child of a tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Child {
    /// Sub-tree
    Tree(Tree),
    /// Leaf token
    Token(Token),
    /// Unmatched `[..]` with `maybe_placeholders`
    Placeholder,
}

impl Child {
    /// The sub-tree, if this is one
    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Child::Tree(t) => Some(t),
            _ => None,
        }
    }

    /// The token, if this is one
    pub fn as_token(&self) -> Option<&Token> {
        match self {
            Child::Token(t) => Some(t),
            _ => None,
        }
    }

    /// True for placeholders
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Child::Placeholder)
    }
}

impl From<Tree> for Child {
    fn from(t: Tree) -> Self {
        Child::Tree(t)
    }
}

impl From<Token> for Child {
    fn from(t: Token) -> Self {
        Child::Token(t)
    }
}

impl fmt::Display for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Child::Tree(t) => write!(f, "{}", t),
            Child::Token(t) => f.write_str(&t.repr()),
            Child::Placeholder => f.write_str("None"),
        }
    }
}

/// A parse tree node
#[derive(Debug, Clone)]
pub struct Tree {
    /// Rule name or alias
    pub data: String,
    /// Children in source order
    pub children: Vec<Child>,
    /// Span information
    pub meta: Meta,
}

impl Tree {
    /// Node with an empty meta
    pub fn new(data: impl Into<String>, children: Vec<Child>) -> Self {
        Self {
            data: data.into(),
            children,
            meta: Meta::empty(),
        }
    }

    /// Node with a given meta
    pub fn with_meta(data: impl Into<String>, children: Vec<Child>, meta: Meta) -> Self {
        Self {
            data: data.into(),
            children,
            meta,
        }
    }

    /// Indented multi-line rendering
    pub fn pretty(&self, indent: &str) -> String {
        let mut out = String::new();
        self.pretty_into(&mut out, 0, indent);
        out
    }

    fn pretty_into(&self, out: &mut String, level: usize, indent: &str) {
        out.push_str(&indent.repeat(level));
        out.push_str(&self.data);
        if self.children.len() == 1 && !matches!(self.children[0], Child::Tree(_)) {
            out.push('\t');
            push_leaf(out, &self.children[0]);
            out.push('\n');
            return;
        }
        out.push('\n');
        for child in &self.children {
            match child {
                Child::Tree(t) => t.pretty_into(out, level + 1, indent),
                leaf => {
                    out.push_str(&indent.repeat(level + 1));
                    push_leaf(out, leaf);
                    out.push('\n');
                }
            }
        }
    }

    /// Direct sub-trees
    pub fn child_trees(&self) -> impl Iterator<Item = &Tree> {
        self.children.iter().filter_map(Child::as_tree)
    }

    /// Direct token children
    pub fn child_tokens(&self) -> impl Iterator<Item = &Token> {
        self.children.iter().filter_map(Child::as_token)
    }

    /// All sub-trees in post-order, this node last
    pub fn iter_subtrees(&self) -> Vec<&Tree> {
        let mut out = Vec::new();
        let mut stack: Vec<(&Tree, bool)> = vec![(self, false)];
        while let Some((tree, expanded)) = stack.pop() {
            if expanded {
                out.push(tree);
                continue;
            }
            stack.push((tree, true));
            for child in tree.children.iter().rev() {
                if let Child::Tree(t) = child {
                    stack.push((t, false));
                }
            }
        }
        out
    }

    /// All sub-trees in pre-order, this node first
    pub fn iter_subtrees_topdown(&self) -> Vec<&Tree> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(tree) = stack.pop() {
            out.push(tree);
            for child in tree.children.iter().rev() {
                if let Child::Tree(t) = child {
                    stack.push(t);
                }
            }
        }
        out
    }

    /// Sub-trees satisfying `pred`, in post-order
    pub fn find_pred<'a, P>(&'a self, mut pred: P) -> impl Iterator<Item = &'a Tree>
    where
        P: FnMut(&Tree) -> bool + 'a,
    {
        self.iter_subtrees().into_iter().filter(move |t| pred(*t))
    }

    /// Sub-trees whose `data` equals `data`
    pub fn find_data<'a>(&'a self, data: &'a str) -> impl Iterator<Item = &'a Tree> {
        self.find_pred(move |t| t.data == data)
    }

    /// Tokens anywhere below this node that satisfy `pred`, in source order
    pub fn scan_values<P>(&self, mut pred: P) -> Vec<&Token>
    where
        P: FnMut(&Token) -> bool,
    {
        let mut out = Vec::new();
        let mut stack = vec![self];
        let mut pending: Vec<&Child> = Vec::new();
        while let Some(tree) = stack.pop() {
            pending.extend(tree.children.iter().rev());
            while let Some(child) = pending.pop() {
                match child {
                    Child::Token(tok) => {
                        if pred(tok) {
                            out.push(tok);
                        }
                    }
                    Child::Tree(t) => pending.extend(t.children.iter().rev()),
                    Child::Placeholder => {}
                }
            }
        }
        out
    }

    /// Replace every child tree whose data is in `data` by its own children
    pub fn expand_kids_by_data(&mut self, data: &[&str]) -> bool {
        let mut changed = false;
        let old = std::mem::take(&mut self.children);
        for child in old {
            match child {
                Child::Tree(t) if data.contains(&t.data.as_str()) => {
                    self.children.extend(t.children);
                    changed = true;
                }
                other => self.children.push(other),
            }
        }
        changed
    }
}

fn push_leaf(out: &mut String, child: &Child) {
    match child {
        Child::Token(t) => out.push_str(&t.value),
        Child::Placeholder => out.push_str("None"),
        Child::Tree(t) => out.push_str(&t.data),
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data && self.children == other.children
    }
}

impl Eq for Tree {}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tree('{}', [", self.data)?;
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", child)?;
        }
        f.write_str("])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(kind: &str, value: &str) -> Child {
        Child::Token(Token::new(kind, value))
    }

    fn sample() -> Tree {
        Tree::new(
            "start",
            vec![
                Child::Tree(Tree::new("a", vec![tok("X", "1")])),
                Child::Tree(Tree::new(
                    "b",
                    vec![tok("Y", "2"), Child::Tree(Tree::new("a", vec![tok("X", "3")]))],
                )),
            ],
        )
    }

    #[test]
    fn test_pretty() {
        let expected = "start\n  a\t1\n  b\n    2\n    a\t3\n";
        assert_eq!(sample().pretty("  "), expected);
    }

    #[test]
    fn test_iter_subtrees_post_order() {
        let t = sample();
        let names: Vec<&str> = t.iter_subtrees().iter().map(|t| t.data.as_str()).collect();
        assert_eq!(names, vec!["a", "a", "b", "start"]);
        let names: Vec<&str> = t
            .iter_subtrees_topdown()
            .iter()
            .map(|t| t.data.as_str())
            .collect();
        assert_eq!(names, vec!["start", "a", "b", "a"]);
    }

    #[test]
    fn test_find_data_and_scan_values() {
        let t = sample();
        assert_eq!(t.find_data("a").count(), 2);
        let values: Vec<&str> = t
            .scan_values(|tok| tok.kind == "X")
            .iter()
            .map(|tok| tok.value.as_str())
            .collect();
        assert_eq!(values, vec!["1", "3"]);
    }

    #[test]
    fn test_equality_ignores_meta() {
        let mut a = sample();
        a.meta.line = 9;
        a.meta.empty = false;
        assert_eq!(a, sample());
    }

    #[test]
    fn test_expand_kids_by_data() {
        let mut t = sample();
        assert!(t.expand_kids_by_data(&["b"]));
        assert_eq!(t.children.len(), 3);
        assert_eq!(t.children[1], tok("Y", "2"));
    }

    #[test]
    fn test_display() {
        let t = Tree::new("x", vec![tok("A", "a"), Child::Placeholder]);
        assert_eq!(t.to_string(), "Tree('x', [Token('A', 'a'), None])");
    }
}
