//! Typed grammar AST
//!
//! The meta-grammar parser produces a generic [`Tree`]; this module turns it
//! into statements and rule bodies that the builder can pattern-match on.
//! Later passes rewrite [`Expr`] trees in place: literals become
//! [`Expr::Pattern`], names become [`Expr::Symbol`], and EBNF operators
//! disappear.

use std::fmt;

use crate::error::LarkError;
use crate::grammar::{Pattern, Symbol};
use crate::token::Token;
use crate::tree::{Child, Tree};

/// Repetition operator after an atom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepeatOp {
    /// `?`
    Optional,
    /// `*`
    Star,
    /// `+`
    Plus,
}

/// Kind of a quoted literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    /// `"..."`
    Str,
    /// `/.../`
    Regex,
}

/// Right-hand side of a rule or terminal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Alternatives
    Expansions(Vec<Expr>),
    /// Sequence
    Expansion(Vec<Expr>),
    /// `expansion -> name`
    Alias(Box<Expr>, String),
    /// `x?`, `x*`, `x+`
    Repeat(Box<Expr>, RepeatOp),
    /// `x ~ min..max`
    Range(Box<Expr>, usize, usize),
    /// `[x]`
    Maybe(Box<Expr>),
    /// Rule name or template parameter
    Rule(String),
    /// Terminal name
    Terminal(String),
    /// Quoted literal with its raw text, flags included
    Literal(LiteralKind, String),
    /// `"a".."z"`, raw quoted ends
    CharRange(String, String),
    /// `name{arg, ...}`
    TemplateUsage(String, Vec<Expr>),
    /// Compiled literal
    Pattern(Pattern),
    /// Resolved symbol
    Symbol(Symbol),
    /// Position where an optional `[..]` matched nothing
    Empty,
}

impl Expr {
    /// Every rule or terminal name used, template names included
    pub fn used_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            match e {
                Expr::Expansions(items) | Expr::Expansion(items) => stack.extend(items.iter().rev()),
                Expr::Alias(inner, _) | Expr::Repeat(inner, _) | Expr::Range(inner, _, _) | Expr::Maybe(inner) => {
                    stack.push(inner)
                }
                Expr::Rule(name) | Expr::Terminal(name) => out.push(name.as_str()),
                Expr::TemplateUsage(name, args) => {
                    out.push(name.as_str());
                    stack.extend(args.iter().rev());
                }
                Expr::Symbol(sym) => out.push(sym.name()),
                Expr::Literal(..) | Expr::CharRange(..) | Expr::Pattern(_) | Expr::Empty => {}
            }
        }
        out
    }

    /// Template usages, outermost first
    pub fn template_usages(&self) -> Vec<(&str, &[Expr])> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            match e {
                Expr::Expansions(items) | Expr::Expansion(items) => stack.extend(items.iter().rev()),
                Expr::Alias(inner, _) | Expr::Repeat(inner, _) | Expr::Range(inner, _, _) | Expr::Maybe(inner) => {
                    stack.push(inner)
                }
                Expr::TemplateUsage(name, args) => {
                    out.push((name.as_str(), args.as_slice()));
                    stack.extend(args.iter().rev());
                }
                _ => {}
            }
        }
        out
    }

    /// Rename every rule and terminal reference
    pub fn rename(&mut self, f: &dyn Fn(&str) -> String) {
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            match e {
                Expr::Expansions(items) | Expr::Expansion(items) => stack.extend(items.iter_mut()),
                Expr::Alias(inner, _) | Expr::Repeat(inner, _) | Expr::Range(inner, _, _) | Expr::Maybe(inner) => {
                    stack.push(inner)
                }
                Expr::Rule(name) | Expr::Terminal(name) => *name = f(name),
                Expr::TemplateUsage(name, args) => {
                    *name = f(name);
                    stack.extend(args.iter_mut());
                }
                _ => {}
            }
        }
    }

    /// True for a sequence with no items
    pub fn is_empty_expansion(&self) -> bool {
        matches!(self, Expr::Expansion(items) if items.is_empty())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Expansions(items) => {
                let parts: Vec<String> = items.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", parts.join(" | "))
            }
            Expr::Expansion(items) => {
                let parts: Vec<String> = items.iter().map(|e| e.to_string()).collect();
                f.write_str(&parts.join(" "))
            }
            Expr::Alias(inner, name) => write!(f, "{} -> {}", inner, name),
            Expr::Repeat(inner, op) => {
                let op = match op {
                    RepeatOp::Optional => "?",
                    RepeatOp::Star => "*",
                    RepeatOp::Plus => "+",
                };
                write!(f, "{}{}", inner, op)
            }
            Expr::Range(inner, a, b) => write!(f, "{} ~ {}..{}", inner, a, b),
            Expr::Maybe(inner) => write!(f, "[{}]", inner),
            Expr::Rule(name) | Expr::Terminal(name) => f.write_str(name),
            Expr::Literal(_, raw) => f.write_str(raw),
            Expr::CharRange(a, b) => write!(f, "{}..{}", a, b),
            Expr::TemplateUsage(name, args) => {
                let parts: Vec<String> = args.iter().map(|e| e.to_string()).collect();
                write!(f, "{}{{{}}}", name, parts.join(", "))
            }
            Expr::Pattern(p) => write!(f, "{}", p),
            Expr::Symbol(s) => write!(f, "{}", s),
            Expr::Empty => f.write_str("<empty>"),
        }
    }
}

/// A rule or terminal definition
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    /// Name without modifiers
    pub name: String,
    /// Template parameters
    pub params: Vec<String>,
    /// `name.N`
    pub priority: Option<i32>,
    /// `!name`
    pub keep_all_tokens: bool,
    /// `?name`
    pub expand1: bool,
    /// Body
    pub body: Expr,
    /// Line of the definition
    pub line: usize,
}

impl Definition {
    /// True for terminal definitions
    pub fn is_term(&self) -> bool {
        is_term_name(&self.name)
    }
}

/// `%import` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// `%import .x` rather than `%import x`
    pub relative: bool,
    /// Dotted path of the grammar
    pub path: Vec<String>,
    /// Imported name to local name
    pub aliases: Vec<(String, String)>,
}

/// Top-level statement of a grammar
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `rule: ...` or `TERM: ...`
    Define(Definition),
    /// `%override ...`
    Override(Definition),
    /// `%extend ...`
    Extend(Definition),
    /// `%ignore ...`
    Ignore(Expr),
    /// `%declare A B`
    Declare(Vec<String>),
    /// `%import ...`
    Import(Import),
}

/// Terminal names are upper case after the last `__` of a mangled prefix
pub fn is_term_name(name: &str) -> bool {
    let last = match name.rfind("__") {
        Some(i) => &name[i + 2..],
        None => name,
    };
    last.chars().any(|c| c.is_alphabetic()) && !last.chars().any(|c| c.is_lowercase())
}

fn bad_tree(what: &str, tree: &Tree) -> LarkError {
    LarkError::internal(format!("malformed meta-grammar tree for {}: {}", what, tree.data))
}

fn token(child: &Child) -> Option<&Token> {
    child.as_token()
}

fn subtree(child: &Child) -> Option<&Tree> {
    child.as_tree()
}

fn number(tok: &Token) -> Result<i64, LarkError> {
    tok.value
        .parse::<i64>()
        .map_err(|_| LarkError::grammar(format!("Expected a number, got {}", tok.value)))
}

/// Convert the meta-grammar parse tree into statements
pub fn statements(tree: &Tree) -> Result<Vec<Stmt>, LarkError> {
    let mut out = Vec::new();
    for child in &tree.children {
        let Some(stmt) = subtree(child) else {
            continue;
        };
        out.push(statement(stmt)?);
    }
    Ok(out)
}

fn statement(t: &Tree) -> Result<Stmt, LarkError> {
    match t.data.as_str() {
        "rule" | "term" => Ok(Stmt::Define(definition(t)?)),
        "override" | "extend" => {
            let inner = t
                .children
                .first()
                .and_then(subtree)
                .ok_or_else(|| bad_tree("override", t))?;
            let def = definition(inner)?;
            Ok(if t.data == "override" {
                Stmt::Override(def)
            } else {
                Stmt::Extend(def)
            })
        }
        "ignore" => {
            let body = t.children.first().ok_or_else(|| bad_tree("ignore", t))?;
            Ok(Stmt::Ignore(expr(body)?))
        }
        "declare" => Ok(Stmt::Declare(
            t.children.iter().filter_map(token).map(|tok| tok.value.clone()).collect(),
        )),
        "import" => import(t),
        _ => Err(bad_tree("statement", t)),
    }
}

fn definition(t: &Tree) -> Result<Definition, LarkError> {
    let name_tok = t.children.first().and_then(token).ok_or_else(|| bad_tree("definition", t))?;
    let body = t.children.last().ok_or_else(|| bad_tree("definition", t))?;
    let mut params = Vec::new();
    let mut priority = None;
    for child in &t.children[1..t.children.len() - 1] {
        match child {
            Child::Tree(p) if p.data == "template_params" => {
                params.extend(p.children.iter().filter_map(token).map(|tok| tok.value.clone()));
            }
            Child::Token(n) if n.kind == "NUMBER" => priority = Some(number(n)? as i32),
            _ => return Err(bad_tree("definition", t)),
        }
    }

    let mut raw = name_tok.value.as_str();
    let (mut keep_all_tokens, mut expand1) = (false, false);
    loop {
        if let Some(rest) = raw.strip_prefix('!') {
            keep_all_tokens = true;
            raw = rest;
        } else if let Some(rest) = raw.strip_prefix('?') {
            expand1 = true;
            raw = rest;
        } else {
            break;
        }
    }
    let name = raw.to_string();
    Ok(Definition {
        name,
        params,
        priority,
        keep_all_tokens,
        expand1,
        body: expr(body)?,
        line: name_tok.line,
    })
}

fn import(t: &Tree) -> Result<Stmt, LarkError> {
    let path_tree = t.children.first().and_then(subtree).ok_or_else(|| bad_tree("import", t))?;
    let relative = path_tree.data == "import_rel";
    let parts: Vec<String> = path_tree
        .children
        .iter()
        .filter_map(token)
        .map(|tok| tok.value.clone())
        .collect();

    match t.children.get(1) {
        Some(Child::Tree(list)) => {
            let aliases = list
                .children
                .iter()
                .filter_map(token)
                .map(|tok| (tok.value.clone(), tok.value.clone()))
                .collect();
            Ok(Stmt::Import(Import {
                relative,
                path: parts,
                aliases,
            }))
        }
        other => {
            let Some((name, path)) = parts.split_last() else {
                return Err(bad_tree("import", t));
            };
            if path.is_empty() {
                return Err(LarkError::grammar(format!("Nothing was imported from grammar `{}`", name)));
            }
            let local = match other {
                Some(Child::Token(alias)) => alias.value.clone(),
                _ => name.clone(),
            };
            Ok(Stmt::Import(Import {
                relative,
                path: path.to_vec(),
                aliases: vec![(name.clone(), local)],
            }))
        }
    }
}

fn expr(child: &Child) -> Result<Expr, LarkError> {
    let t = match child {
        Child::Tree(t) => t,
        Child::Token(tok) => return name_expr(tok),
        Child::Placeholder => return Err(LarkError::internal("placeholder in meta-grammar tree")),
    };
    let kids = || t.children.iter().map(expr).collect::<Result<Vec<_>, _>>();
    match t.data.as_str() {
        "expansions" => Ok(Expr::Expansions(kids()?)),
        "expansion" => Ok(Expr::Expansion(kids()?)),
        "alias" => {
            let inner = t.children.first().ok_or_else(|| bad_tree("alias", t))?;
            let name = t.children.get(1).and_then(token).ok_or_else(|| bad_tree("alias", t))?;
            Ok(Expr::Alias(Box::new(expr(inner)?), name.value.clone()))
        }
        "expr" => {
            let atom = t.children.first().ok_or_else(|| bad_tree("expr", t))?;
            let op = t.children.get(1).and_then(token).ok_or_else(|| bad_tree("expr", t))?;
            let inner = Box::new(expr(atom)?);
            match op.value.as_str() {
                "?" => Ok(Expr::Repeat(inner, RepeatOp::Optional)),
                "*" => Ok(Expr::Repeat(inner, RepeatOp::Star)),
                "+" => Ok(Expr::Repeat(inner, RepeatOp::Plus)),
                "~" => {
                    let nums: Vec<i64> = t.children[2..]
                        .iter()
                        .filter_map(token)
                        .map(number)
                        .collect::<Result<_, _>>()?;
                    let (mn, mx) = match nums.as_slice() {
                        [n] => (*n, *n),
                        [a, b] => (*a, *b),
                        _ => return Err(bad_tree("expr", t)),
                    };
                    if mn < 0 || mx < mn {
                        return Err(LarkError::grammar(format!(
                            "Bad Range for {} ({}..{} isn't allowed)",
                            inner, mn, mx
                        )));
                    }
                    Ok(Expr::Range(inner, mn as usize, mx as usize))
                }
                other => Err(LarkError::grammar(format!("Unknown operator {}", other))),
            }
        }
        "maybe" => {
            let inner = t.children.first().ok_or_else(|| bad_tree("maybe", t))?;
            Ok(Expr::Maybe(Box::new(expr(inner)?)))
        }
        "value" => {
            let inner = t.children.first().ok_or_else(|| bad_tree("value", t))?;
            expr(inner)
        }
        "terminal" | "nonterminal" => {
            let tok = t.children.first().and_then(token).ok_or_else(|| bad_tree("name", t))?;
            name_expr(tok)
        }
        "literal" => {
            let tok = t.children.first().and_then(token).ok_or_else(|| bad_tree("literal", t))?;
            let kind = if tok.kind == "REGEXP" {
                LiteralKind::Regex
            } else {
                LiteralKind::Str
            };
            Ok(Expr::Literal(kind, tok.value.clone()))
        }
        "range" => {
            let a = t.children.first().and_then(token).ok_or_else(|| bad_tree("range", t))?;
            let b = t.children.get(1).and_then(token).ok_or_else(|| bad_tree("range", t))?;
            Ok(Expr::CharRange(a.value.clone(), b.value.clone()))
        }
        "template_usage" => {
            let name = t.children.first().and_then(token).ok_or_else(|| bad_tree("template", t))?;
            let args = t.children[1..].iter().map(expr).collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::TemplateUsage(name.value.clone(), args))
        }
        _ => Err(bad_tree("expression", t)),
    }
}

fn name_expr(tok: &Token) -> Result<Expr, LarkError> {
    match tok.kind.as_str() {
        "RULE" => Ok(Expr::Rule(tok.value.clone())),
        "TERMINAL" => Ok(Expr::Terminal(tok.value.clone())),
        "STRING" => Ok(Expr::Literal(LiteralKind::Str, tok.value.clone())),
        "REGEXP" => Ok(Expr::Literal(LiteralKind::Regex, tok.value.clone())),
        other => Err(LarkError::internal(format!("unexpected {} token in rule body", other))),
    }
}
