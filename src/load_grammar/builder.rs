//! Collects definitions from a grammar and everything it imports
//!
//! Statements are applied in source order after all `%import`s of the file
//! have been resolved. Imported grammars are loaded by a nested builder whose
//! names are mangled with the import path, then trimmed to what the import
//! list actually reaches.

use hashbrown::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{GrammarError, LarkError};
use crate::grammar::TOKEN_DEFAULT_PRIORITY;
use crate::load_grammar::ast::{is_term_name, Definition, Expr, Import, Stmt};
use crate::load_grammar::loader::{content_hash, grammar_path, FsLoader, Loader, StdlibLoader};
use crate::load_grammar::meta::parse_grammar;

/// A rule or terminal as the builder tracks it
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolDef {
    /// Terminal rather than rule
    pub is_term: bool,
    /// Body; `None` for `%declare`d terminals
    pub body: Option<Expr>,
    /// Template parameters
    pub params: Vec<String>,
    /// Rule priority, or terminal priority (always set for terminals)
    pub priority: Option<i32>,
    /// `!rule`
    pub keep_all_tokens: bool,
    /// `?rule`
    pub expand1: bool,
}

impl SymbolDef {
    fn kind(&self) -> &'static str {
        if self.is_term {
            "Terminal"
        } else {
            "Rule"
        }
    }
}

/// Insertion-ordered definition table
///
/// Redefining a name keeps its original position.
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    entries: Vec<(String, SymbolDef)>,
    index: HashMap<String, usize>,
}

impl Definitions {
    /// Definition of `name`
    pub fn get(&self, name: &str) -> Option<&SymbolDef> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut SymbolDef> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.entries[i].1),
            None => None,
        }
    }

    /// True if `name` is defined
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn insert(&mut self, name: String, def: SymbolDef) {
        match self.index.get(&name) {
            Some(&i) => self.entries[i].1 = def,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, def));
            }
        }
    }

    fn retain(&mut self, keep: &HashSet<String>) {
        self.entries.retain(|(name, _)| keep.contains(name));
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
    }

    /// Definitions in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SymbolDef)> {
        self.entries.iter().map(|(n, d)| (n.as_str(), d))
    }

    /// Number of definitions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is defined
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Renames the symbols of an imported grammar
#[derive(Debug)]
struct Mangle {
    prefix: String,
    aliases: HashMap<String, String>,
    base: Option<Rc<Mangle>>,
}

impl Mangle {
    fn apply(&self, name: &str) -> String {
        let renamed = match self.aliases.get(name) {
            Some(alias) => alias.clone(),
            None => match name.strip_prefix('_') {
                Some(rest) => format!("_{}__{}", self.prefix, rest),
                None => format!("{}__{}", self.prefix, name),
            },
        };
        match &self.base {
            Some(base) => base.apply(&renamed),
            None => renamed,
        }
    }
}

/// The builder's output: validated definitions ready to compile
#[derive(Debug, Clone)]
pub struct Grammar {
    /// Rules and templates, in definition order
    pub rule_defs: Vec<(String, SymbolDef)>,
    /// Terminals, in definition order
    pub term_defs: Vec<(String, SymbolDef)>,
    /// Names of ignored terminals
    pub ignore: Vec<String>,
}

/// Grammar builder
pub struct GrammarBuilder {
    keep_all_tokens: bool,
    loaders: Vec<Arc<dyn Loader>>,
    definitions: Definitions,
    ignore_names: Vec<String>,
    used_files: HashMap<String, u64>,
}

impl GrammarBuilder {
    /// Builder with extra import locations, tried before the built-in library
    pub fn new(keep_all_tokens: bool, loaders: Vec<Arc<dyn Loader>>) -> Self {
        Self {
            keep_all_tokens,
            loaders,
            definitions: Definitions::default(),
            ignore_names: Vec::new(),
            used_files: HashMap::new(),
        }
    }

    /// Definitions collected so far
    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    /// Add the statements of `text`
    ///
    /// `source` names the grammar in messages; relative imports resolve
    /// against `base`, or the working directory when it is `None`.
    pub fn load_grammar(&mut self, text: &str, source: &str, base: Option<&Path>) -> Result<(), LarkError> {
        self.load(text, source, base, None)
    }

    fn load(&mut self, text: &str, source: &str, base: Option<&Path>, mangle: Option<&Rc<Mangle>>) -> Result<(), LarkError> {
        let stmts = parse_grammar(text, source)?;

        let mut imports: Vec<(Import, Option<PathBuf>)> = Vec::new();
        for stmt in &stmts {
            let Stmt::Import(import) = stmt else {
                continue;
            };
            let base_dir = if import.relative {
                Some(match base {
                    Some(dir) => dir.to_path_buf(),
                    None => std::env::current_dir()?,
                })
            } else {
                None
            };
            match imports
                .iter_mut()
                .find(|(seen, _)| seen.path == import.path && seen.relative == import.relative)
            {
                Some((seen, _)) => seen.aliases.extend(import.aliases.iter().cloned()),
                None => imports.push((import.clone(), base_dir)),
            }
        }
        for (import, base_dir) in &imports {
            self.do_import(import, base_dir.as_deref(), mangle)?;
        }

        for stmt in stmts {
            match stmt {
                Stmt::Define(def) => {
                    let (name, sym) = self.unpack(def, mangle)?;
                    self.define(name, sym, false)?;
                }
                Stmt::Override(def) => {
                    let (name, sym) = self.unpack(def, mangle)?;
                    self.define(name, sym, true)?;
                }
                Stmt::Extend(def) => {
                    let (name, sym) = self.unpack(def, mangle)?;
                    self.extend(name, sym)?;
                }
                // only the top-level grammar decides what is ignored
                Stmt::Ignore(expr) if mangle.is_none() => self.ignore(expr),
                Stmt::Ignore(_) => {}
                Stmt::Declare(names) => {
                    for name in names {
                        let is_term = is_term_name(&name);
                        let name = match mangle {
                            Some(m) => m.apply(&name),
                            None => name,
                        };
                        let def = SymbolDef {
                            is_term,
                            body: None,
                            params: Vec::new(),
                            priority: is_term.then_some(TOKEN_DEFAULT_PRIORITY),
                            keep_all_tokens: false,
                            expand1: false,
                        };
                        self.define(name, def, false)?;
                    }
                }
                Stmt::Import(_) => {}
            }
        }
        Ok(())
    }

    fn unpack(&self, def: Definition, mangle: Option<&Rc<Mangle>>) -> Result<(String, SymbolDef), LarkError> {
        let is_term = def.is_term();
        if def.expand1 && def.name.starts_with('_') {
            return Err(LarkError::Grammar(GrammarError::at(
                "Inlined rules (_rule) cannot use the ?rule modifier.",
                def.line,
                0,
            )));
        }
        let mut body = def.body;
        let (name, params) = match mangle {
            Some(m) => {
                body.rename(&|s| m.apply(s));
                (m.apply(&def.name), def.params.iter().map(|p| m.apply(p)).collect())
            }
            None => (def.name, def.params),
        };
        let priority = if is_term {
            Some(def.priority.unwrap_or(TOKEN_DEFAULT_PRIORITY))
        } else {
            def.priority
        };
        Ok((
            name,
            SymbolDef {
                is_term,
                body: Some(body),
                params,
                priority,
                keep_all_tokens: !is_term && (def.keep_all_tokens || self.keep_all_tokens),
                expand1: def.expand1,
            },
        ))
    }

    fn define(&mut self, name: String, def: SymbolDef, is_override: bool) -> Result<(), LarkError> {
        if self.definitions.contains(&name) {
            if !is_override {
                return Err(LarkError::grammar(format!(
                    "{} '{}' defined more than once",
                    def.kind(),
                    name
                )));
            }
        } else if is_override {
            return Err(LarkError::grammar(format!(
                "Cannot override a nonexisting {} {}",
                def.kind().to_lowercase(),
                name
            )));
        }
        if name.starts_with("__") {
            return Err(LarkError::grammar(format!(
                "Names starting with double-underscore are reserved (Error at {})",
                name
            )));
        }
        self.definitions.insert(name, def);
        Ok(())
    }

    fn extend(&mut self, name: String, def: SymbolDef) -> Result<(), LarkError> {
        let kind = def.kind().to_lowercase();
        let Some(base) = self.definitions.get_mut(&name) else {
            return Err(LarkError::grammar(format!(
                "Can't extend {} {} as it wasn't defined before",
                kind, name
            )));
        };
        if base.is_term != def.is_term {
            return Err(LarkError::grammar(format!(
                "Cannot extend {} {} - one is a terminal, while the other is not.",
                kind, name
            )));
        }
        if base.params != def.params {
            return Err(LarkError::grammar(format!(
                "Cannot extend {} with different parameters: {}",
                kind, name
            )));
        }
        let Some(Expr::Expansions(alts)) = base.body.as_mut() else {
            return Err(LarkError::grammar(format!(
                "Can't extend {} {} - it is abstract.",
                kind, name
            )));
        };
        match def.body {
            Some(Expr::Expansions(more)) => alts.extend(more),
            Some(other) => alts.push(other),
            None => {}
        }
        Ok(())
    }

    fn ignore(&mut self, expr: Expr) {
        if let Expr::Expansions(alts) = &expr {
            if let [Expr::Expansion(items)] = alts.as_slice() {
                if let [Expr::Terminal(name)] = items.as_slice() {
                    self.ignore_names.push(name.clone());
                    return;
                }
            }
        }
        let name = format!("__IGNORE_{}", self.ignore_names.len());
        self.ignore_names.push(name.clone());
        self.definitions.insert(
            name,
            SymbolDef {
                is_term: true,
                body: Some(expr),
                params: Vec::new(),
                priority: Some(TOKEN_DEFAULT_PRIORITY),
                keep_all_tokens: false,
                expand1: false,
            },
        );
    }

    fn do_import(&mut self, import: &Import, base_dir: Option<&Path>, base_mangle: Option<&Rc<Mangle>>) -> Result<(), LarkError> {
        let mangle = Rc::new(Mangle {
            prefix: import.path.join("__"),
            aliases: import.aliases.iter().cloned().collect(),
            base: base_mangle.cloned(),
        });
        let path = grammar_path(&import.path);

        let mut to_try: Vec<Arc<dyn Loader>> = self.loaders.clone();
        if let Some(dir) = base_dir {
            to_try.push(Arc::new(FsLoader::new(dir)));
        }
        to_try.push(Arc::new(StdlibLoader));

        for loader in &to_try {
            let Some(loaded) = loader.load(&path)? else {
                continue;
            };
            let h = content_hash(&loaded.text);
            if *self.used_files.get(&loaded.source).unwrap_or(&h) != h {
                return Err(LarkError::grammar(format!(
                    "Grammar file {} changed during import",
                    loaded.source
                )));
            }
            self.used_files.insert(loaded.source.clone(), h);

            let mut nested = GrammarBuilder::new(self.keep_all_tokens, self.loaders.clone());
            nested.used_files = std::mem::take(&mut self.used_files);
            let result = nested.load(&loaded.text, &loaded.source, loaded.base.as_deref(), Some(&mangle));
            self.used_files = std::mem::take(&mut nested.used_files);
            result?;

            nested.remove_unused(import.aliases.iter().map(|(name, _)| mangle.apply(name)));
            for (name, _) in nested.definitions.iter() {
                if self.definitions.contains(name) {
                    return Err(LarkError::grammar(format!(
                        "Cannot import '{}' from '{}': Symbol already defined.",
                        name, path
                    )));
                }
            }
            for (name, def) in nested.definitions.entries {
                self.definitions.insert(name, def);
            }
            log_debug!("imported {} from {}", import.path.join("."), loaded.source);
            return Ok(());
        }
        Err(LarkError::grammar(format!(
            "Couldn't import grammar {}: {} not found",
            import.path.join("."),
            path
        )))
    }

    /// Keep only the definitions reachable from `used`
    fn remove_unused(&mut self, used: impl IntoIterator<Item = String>) {
        let mut seen: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = used.into_iter().collect();
        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let Some(def) = self.definitions.get(&name) else {
                continue;
            };
            if let Some(body) = &def.body {
                for dep in body.used_names() {
                    if !def.params.iter().any(|p| p == dep) && !seen.contains(dep) {
                        stack.push(dep.to_string());
                    }
                }
            }
        }
        self.definitions.retain(&seen);
    }

    /// Check that every reference resolves
    pub fn validate(&self) -> Result<(), LarkError> {
        for (name, def) in self.definitions.iter() {
            for (i, p) in def.params.iter().enumerate() {
                if self.definitions.contains(p) {
                    return Err(LarkError::grammar(format!(
                        "Template Parameter conflicts with rule {} (in template {})",
                        p, name
                    )));
                }
                if def.params[..i].contains(p) {
                    return Err(LarkError::grammar(format!(
                        "Duplicate Template Parameter {} (in template {})",
                        p, name
                    )));
                }
            }
            let Some(body) = &def.body else {
                continue;
            };
            let kind = def.kind().to_lowercase();

            for (template, args) in body.template_usages() {
                if def.params.iter().any(|p| p == template) {
                    continue;
                }
                let Some(target) = self.definitions.get(template) else {
                    return Err(LarkError::grammar(format!(
                        "Template '{}' used but not defined (in {} {})",
                        template, kind, name
                    )));
                };
                if args.len() != target.params.len() {
                    return Err(LarkError::grammar(format!(
                        "Wrong number of template arguments used for {} (expected {}, got {}) (in {} {})",
                        template,
                        target.params.len(),
                        args.len(),
                        kind,
                        name
                    )));
                }
            }

            for sym in body.used_names() {
                if !self.definitions.contains(sym) && !def.params.iter().any(|p| p == sym) {
                    let used_kind = if is_term_name(sym) { "Terminal" } else { "Rule" };
                    return Err(LarkError::grammar(format!(
                        "{} '{}' used but not defined (in {} {})",
                        used_kind, sym, kind, name
                    )));
                }
            }
        }

        let missing: Vec<&str> = self
            .ignore_names
            .iter()
            .filter(|n| !self.definitions.contains(n))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(LarkError::grammar(format!(
                "Terminals {:?} were marked to ignore but were not defined!",
                missing
            )));
        }
        Ok(())
    }

    /// Validate and split into rules and terminals
    pub fn build(self) -> Result<Grammar, LarkError> {
        self.validate()?;
        let mut rule_defs = Vec::new();
        let mut term_defs = Vec::new();
        for (name, def) in self.definitions.entries {
            if def.is_term {
                term_defs.push((name, def));
            } else {
                rule_defs.push((name, def));
            }
        }
        Ok(Grammar {
            rule_defs,
            term_defs,
            ignore: self.ignore_names,
        })
    }
}

impl std::fmt::Debug for GrammarBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrammarBuilder")
            .field("definitions", &self.definitions.len())
            .field("ignore", &self.ignore_names)
            .field("loaders", &self.loaders)
            .finish()
    }
}
