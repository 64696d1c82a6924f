//! From definitions to terminals and BNF rules
//!
//! Terminals are compiled first: each body becomes a single [`Pattern`],
//! with references to other terminals inlined. Rule bodies then have their
//! literals turned into (possibly anonymous) terminals and their template
//! usages instantiated, before EBNF lowering splits them into [`Rule`]s.
//! Rules and terminals unreachable from the start symbols are dropped.

use hashbrown::{HashMap, HashSet};
use std::cmp::Reverse;

use crate::error::LarkError;
use crate::grammar::{Pattern, Rule, RuleOptions, Symbol, TerminalDef};
use crate::load_grammar::ast::{Expr, LiteralKind};
use crate::load_grammar::builder::{Grammar, SymbolDef};
use crate::load_grammar::ebnf::{alternatives, instantiate, EbnfToBnf};
use crate::load_grammar::literals::{is_identifier, literal_to_pattern, punctuation_name, range_to_pattern};
use crate::regex_backend::{uses_unicode_classes, RegexBackend};

/// Output of the grammar compiler
#[derive(Debug, Clone)]
pub struct CompiledGrammar {
    /// Terminals with patterns, user-defined first
    pub terminals: Vec<TerminalDef>,
    /// BNF rules, one per alternative
    pub rules: Vec<Rule>,
    /// Ignored terminal names
    pub ignore: Vec<String>,
}

/// Compiles terminal bodies to patterns, resolving references between terminals
struct TermCompiler<'g> {
    defs: HashMap<&'g str, &'g SymbolDef>,
    done: HashMap<String, Pattern>,
    visiting: Vec<String>,
    backend: &'g dyn RegexBackend,
}

impl<'g> TermCompiler<'g> {
    fn resolve(&mut self, name: &str) -> Result<Pattern, LarkError> {
        if let Some(p) = self.done.get(name) {
            return Ok(p.clone());
        }
        if self.visiting.iter().any(|n| n == name) {
            return Err(LarkError::grammar(format!(
                "Recursion in terminal '{}' (recursion is only allowed in rules, not terminals)",
                name
            )));
        }
        let def = self
            .defs
            .get(name)
            .copied()
            .ok_or_else(|| LarkError::grammar(format!("Terminal used but not defined: {}", name)))?;
        let body = def.body.as_ref().ok_or_else(|| {
            LarkError::grammar(format!("Terminal {} is only declared and cannot be used inside another terminal", name))
        })?;
        self.visiting.push(name.to_string());
        let result = self.pattern(name, body);
        self.visiting.pop();
        let pattern = result?;
        self.done.insert(name.to_string(), pattern.clone());
        Ok(pattern)
    }

    fn pattern(&mut self, owner: &str, expr: &Expr) -> Result<Pattern, LarkError> {
        match expr {
            Expr::Expansions(_) => {
                let mut alts = Vec::new();
                flatten_alternatives(expr, &mut alts);
                let mut pats = alts
                    .into_iter()
                    .map(|a| self.pattern(owner, a))
                    .collect::<Result<Vec<_>, _>>()?;
                if pats.len() == 1 {
                    return Ok(pats.remove(0));
                }
                // leftmost-first alternation: longest candidates go first
                let mut keyed = Vec::with_capacity(pats.len());
                for p in pats {
                    ensure_supported(owner, &p, self.backend)?;
                    let (min, max) = p.width(self.backend)?;
                    keyed.push(((Reverse(max), Reverse(min), Reverse(p.value().len())), p));
                }
                keyed.sort_by(|a, b| a.0.cmp(&b.0));
                let joined: Vec<String> = keyed.iter().map(|(_, p)| p.to_regexp()).collect();
                Ok(Pattern::regex(format!("(?:{})", joined.join("|")), ""))
            }
            Expr::Expansion(items) => {
                let mut pats = items
                    .iter()
                    .map(|i| self.pattern(owner, i))
                    .collect::<Result<Vec<_>, _>>()?;
                match pats.len() {
                    0 => Ok(Pattern::string("", "")),
                    1 => Ok(pats.remove(0)),
                    _ => Ok(Pattern::regex(
                        pats.iter().map(Pattern::to_regexp).collect::<String>(),
                        "",
                    )),
                }
            }
            Expr::Repeat(inner, op) => {
                let inner = self.pattern(owner, inner)?;
                let op = match op {
                    crate::load_grammar::ast::RepeatOp::Optional => "?",
                    crate::load_grammar::ast::RepeatOp::Star => "*",
                    crate::load_grammar::ast::RepeatOp::Plus => "+",
                };
                Ok(Pattern::regex(format!("(?:{}){}", inner.to_regexp(), op), ""))
            }
            Expr::Range(inner, mn, mx) => {
                let inner = self.pattern(owner, inner)?;
                let op = if mn == mx {
                    format!("{{{}}}", mn)
                } else {
                    format!("{{{},{}}}", mn, mx)
                };
                Ok(Pattern::regex(format!("(?:{}){}", inner.to_regexp(), op), ""))
            }
            Expr::Maybe(inner) => {
                let inner = self.pattern(owner, inner)?;
                Ok(Pattern::regex(format!("(?:{})?", inner.to_regexp()), ""))
            }
            Expr::Literal(kind, raw) => {
                let pattern = literal_to_pattern(raw, *kind == LiteralKind::Regex)?;
                match pattern {
                    Pattern::Re { ref value, ref flags } if value.contains("${") => {
                        let expanded = self.expand_references(value)?;
                        Ok(Pattern::regex(expanded, flags))
                    }
                    other => Ok(other),
                }
            }
            Expr::CharRange(a, b) => range_to_pattern(a, b),
            Expr::Terminal(name) => self.resolve(name),
            Expr::Pattern(p) => Ok(p.clone()),
            Expr::Rule(name) => Err(LarkError::grammar(format!(
                "Rules aren't allowed inside terminals ({} in {})",
                name, owner
            ))),
            Expr::Alias(..) => Err(LarkError::grammar(
                "Aliasing not allowed in terminals (You used -> in the wrong place)",
            )),
            Expr::TemplateUsage(name, _) => Err(LarkError::grammar(format!(
                "Templates not allowed in terminals ({} in {})",
                name, owner
            ))),
            Expr::Symbol(_) | Expr::Empty => Err(LarkError::internal(format!(
                "unexpected expression in terminal {}",
                owner
            ))),
        }
    }

    /// Inline `${NAME}` references inside a regex body
    fn expand_references(&mut self, value: &str) -> Result<String, LarkError> {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let name = &after[..end];
            let referenced = self.resolve(name)?;
            out.push_str("(?:");
            out.push_str(&referenced.to_regexp());
            out.push(')');
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Names literals used in rules, reusing user terminals with the same pattern
struct AnonTerminals<'t> {
    terminals: &'t mut Vec<TerminalDef>,
    names: HashSet<String>,
    by_pattern: HashMap<Pattern, String>,
    counter: usize,
}

impl<'t> AnonTerminals<'t> {
    fn new(terminals: &'t mut Vec<TerminalDef>) -> Self {
        let names = terminals.iter().map(|t| t.name.clone()).collect();
        let by_pattern = terminals
            .iter()
            .map(|t| (t.pattern.clone(), t.name.clone()))
            .collect();
        Self {
            terminals,
            names,
            by_pattern,
            counter: 0,
        }
    }

    fn symbol_for(&mut self, pattern: Pattern, keep_all_tokens: bool) -> Result<Symbol, LarkError> {
        if pattern.is_str() && pattern.value().is_empty() {
            return Err(LarkError::grammar("Empty terminals are not allowed (\"\")"));
        }
        let mut name = self.by_pattern.get(&pattern).cloned();
        if name.is_none() && pattern.is_str() {
            let value = pattern.value();
            let candidate = match punctuation_name(value) {
                Some(n) => Some(n.to_string()),
                None if is_identifier(value) && !self.names.contains(&value.to_uppercase()) => {
                    Some(value.to_uppercase())
                }
                None => None,
            };
            name = candidate.filter(|n| !self.names.contains(n));
        }
        let name = match name {
            Some(n) => n,
            None => {
                let n = format!("__ANON_{}", self.counter);
                self.counter += 1;
                n
            }
        };
        if !self.names.contains(&name) {
            self.names.insert(name.clone());
            self.by_pattern.insert(pattern.clone(), name.clone());
            self.terminals.push(TerminalDef::new(name.clone(), pattern.clone()));
        }
        let filter_out = !keep_all_tokens && pattern.is_str();
        Ok(Symbol::terminal_filtered(name, filter_out))
    }
}

#[derive(Debug, Clone)]
struct RuleEntry {
    name: String,
    params: Vec<String>,
    body: Option<Expr>,
    options: RuleOptions,
}

/// Resolves names, literals and template usages in rule bodies
struct RulePreparer<'t> {
    anon: AnonTerminals<'t>,
    work: Vec<RuleEntry>,
    index: HashMap<String, usize>,
}

impl RulePreparer<'_> {
    fn prepare(&mut self, expr: Expr, keep_all_tokens: bool) -> Result<Expr, LarkError> {
        Ok(match expr {
            Expr::Expansions(items) => Expr::Expansions(self.prepare_all(items, keep_all_tokens)?),
            Expr::Expansion(items) => Expr::Expansion(self.prepare_all(items, keep_all_tokens)?),
            Expr::Alias(inner, name) => Expr::Alias(Box::new(self.prepare(*inner, keep_all_tokens)?), name),
            Expr::Repeat(inner, op) => Expr::Repeat(Box::new(self.prepare(*inner, keep_all_tokens)?), op),
            Expr::Range(inner, mn, mx) => Expr::Range(Box::new(self.prepare(*inner, keep_all_tokens)?), mn, mx),
            Expr::Maybe(inner) => Expr::Maybe(Box::new(self.prepare(*inner, keep_all_tokens)?)),
            Expr::Rule(name) => Expr::Symbol(Symbol::nonterminal(name)),
            Expr::Terminal(name) => {
                let filter_out = !keep_all_tokens && name.starts_with('_');
                Expr::Symbol(Symbol::terminal_filtered(name, filter_out))
            }
            Expr::Literal(kind, raw) => {
                let pattern = literal_to_pattern(&raw, kind == LiteralKind::Regex)?;
                Expr::Symbol(self.anon.symbol_for(pattern, keep_all_tokens)?)
            }
            Expr::CharRange(a, b) => Expr::Symbol(self.anon.symbol_for(range_to_pattern(&a, &b)?, keep_all_tokens)?),
            Expr::Pattern(p) => Expr::Symbol(self.anon.symbol_for(p, keep_all_tokens)?),
            Expr::TemplateUsage(name, args) => {
                let args = self.prepare_all(args, keep_all_tokens)?;
                Expr::Symbol(self.instantiate(&name, args)?)
            }
            e @ (Expr::Symbol(_) | Expr::Empty) => e,
        })
    }

    fn prepare_all(&mut self, items: Vec<Expr>, keep_all_tokens: bool) -> Result<Vec<Expr>, LarkError> {
        items.into_iter().map(|e| self.prepare(e, keep_all_tokens)).collect()
    }

    fn instantiate(&mut self, template: &str, args: Vec<Expr>) -> Result<Symbol, LarkError> {
        let mut arg_names = Vec::with_capacity(args.len());
        for arg in &args {
            match arg {
                Expr::Symbol(sym) => arg_names.push(sym.name().to_string()),
                other => {
                    return Err(LarkError::grammar(format!(
                        "Template arguments must be names or literals, got {} (in {})",
                        other, template
                    )))
                }
            }
        }
        let result_name = format!("{}{{{}}}", template, arg_names.join(","));
        if self.index.contains_key(&result_name) {
            return Ok(Symbol::nonterminal(result_name));
        }

        let source = self
            .index
            .get(template)
            .map(|&i| &self.work[i])
            .ok_or_else(|| LarkError::grammar(format!("Template '{}' used but not defined", template)))?;
        if source.params.len() != args.len() {
            return Err(LarkError::grammar(format!(
                "Wrong number of template arguments used for {} (expected {}, got {})",
                template,
                source.params.len(),
                args.len()
            )));
        }
        let body = source
            .body
            .as_ref()
            .map(|b| instantiate(b, &source.params, &args));
        let mut options = source.options.clone();
        options.template_source = Some(template.to_string());

        self.index.insert(result_name.clone(), self.work.len());
        self.work.push(RuleEntry {
            name: result_name.clone(),
            params: Vec::new(),
            body,
            options,
        });
        Ok(Symbol::nonterminal(result_name))
    }
}

impl Grammar {
    /// Compile to terminals and BNF rules
    ///
    /// Rules not reachable from `start` are dropped, and so are terminals no
    /// surviving rule uses, unless they are ignored or listed in
    /// `terminals_to_keep` (`"*"` keeps every terminal).
    pub fn compile(
        &self,
        start: &[String],
        terminals_to_keep: &[String],
        backend: &dyn RegexBackend,
    ) -> Result<CompiledGrammar, LarkError> {
        let mut terminals = self.compile_terminals(backend)?;

        let work: Vec<RuleEntry> = self
            .rule_defs
            .iter()
            .map(|(name, def)| RuleEntry {
                name: name.clone(),
                params: def.params.clone(),
                body: def.body.clone(),
                options: RuleOptions {
                    keep_all_tokens: def.keep_all_tokens,
                    expand1: def.expand1,
                    priority: def.priority,
                    template_source: None,
                    empty_indices: Vec::new(),
                },
            })
            .collect();
        let index = work.iter().enumerate().map(|(i, e)| (e.name.clone(), i)).collect();
        let mut preparer = RulePreparer {
            anon: AnonTerminals::new(&mut terminals),
            work,
            index,
        };

        let mut lower = EbnfToBnf::new();
        let mut lowered: Vec<(String, Expr, RuleOptions)> = Vec::new();
        let mut i = 0;
        while i < preparer.work.len() {
            let entry = preparer.work[i].clone();
            i += 1;
            if !entry.params.is_empty() {
                continue;
            }
            let Some(body) = entry.body else {
                continue;
            };
            let keep = entry.options.keep_all_tokens;
            let prepared = preparer.prepare(body, keep)?;
            let body = lower.lower(&entry.name, keep, prepared)?;
            lowered.push((entry.name, body, entry.options));
        }
        for helper in lower.take_new_rules() {
            let options = RuleOptions {
                keep_all_tokens: helper.keep_all_tokens,
                ..RuleOptions::default()
            };
            lowered.push((helper.name, helper.body, options));
        }

        let rules = build_rules(lowered)?;
        let rules = remove_unused_rules(rules, start);

        let keep_all = terminals_to_keep.iter().any(|t| t == "*");
        let terminals = if keep_all {
            terminals
        } else {
            let used: HashSet<&str> = rules
                .iter()
                .flat_map(|r| r.expansion.iter())
                .filter(|s| s.is_term())
                .map(Symbol::name)
                .collect();
            let (kept, unused): (Vec<TerminalDef>, Vec<TerminalDef>) = terminals.into_iter().partition(|t| {
                used.contains(t.name.as_str())
                    || self.ignore.contains(&t.name)
                    || terminals_to_keep.contains(&t.name)
            });
            if !unused.is_empty() {
                log_debug!(
                    "Unused terminals: {:?}",
                    unused.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
                );
            }
            kept
        };
        check_backend_support(&terminals, backend)?;

        Ok(CompiledGrammar {
            terminals,
            rules,
            ignore: self.ignore.clone(),
        })
    }

    fn compile_terminals(&self, backend: &dyn RegexBackend) -> Result<Vec<TerminalDef>, LarkError> {
        for (name, def) in &self.term_defs {
            if let Some(Expr::Expansions(alts)) = &def.body {
                if let [only] = alts.as_slice() {
                    if only.is_empty_expansion() {
                        return Err(LarkError::grammar(format!("Terminals cannot be empty ({})", name)));
                    }
                }
            }
        }

        let mut compiler = TermCompiler {
            defs: self.term_defs.iter().map(|(n, d)| (n.as_str(), d)).collect(),
            done: HashMap::new(),
            visiting: Vec::new(),
            backend,
        };
        let mut terminals = Vec::with_capacity(self.term_defs.len());
        for (name, def) in &self.term_defs {
            if def.body.is_none() {
                continue;
            }
            let pattern = compiler.resolve(name)?;
            let priority = def.priority.unwrap_or(crate::grammar::TOKEN_DEFAULT_PRIORITY);
            terminals.push(TerminalDef::with_priority(name.clone(), pattern, priority));
        }
        Ok(terminals)
    }
}

/// Reject terminals whose regex needs features the backend lacks
fn check_backend_support(terminals: &[TerminalDef], backend: &dyn RegexBackend) -> Result<(), LarkError> {
    terminals
        .iter()
        .try_for_each(|t| ensure_supported(&t.name, &t.pattern, backend))
}

fn ensure_supported(name: &str, pattern: &Pattern, backend: &dyn RegexBackend) -> Result<(), LarkError> {
    if backend.capabilities().unicode_classes || !uses_unicode_classes(&pattern.to_regexp()) {
        return Ok(());
    }
    Err(LarkError::grammar(format!(
        "Terminal {} uses Unicode property classes, which the '{}' regex backend does not support",
        name,
        backend.name()
    )))
}

/// Collect the leaves of nested alternations, so that they sort as one list
fn flatten_alternatives<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::Expansions(alts) => {
            for alt in alts {
                flatten_alternatives(alt, out);
            }
        }
        Expr::Expansion(items) if items.len() == 1 => flatten_alternatives(&items[0], out),
        other => out.push(other),
    }
}

fn build_rules(lowered: Vec<(String, Expr, RuleOptions)>) -> Result<Vec<Rule>, LarkError> {
    let mut rules: Vec<Rule> = Vec::new();
    let mut seen: HashMap<(Symbol, Vec<Symbol>), usize> = HashMap::new();

    for (name, body, options) in lowered {
        for (order, alt) in alternatives(&body)?.into_iter().enumerate() {
            if alt.alias.is_some() && name.starts_with('_') {
                return Err(LarkError::grammar(format!(
                    "Rule {} is marked for expansion (it starts with an underscore) and isn't allowed to have aliases (alias={})",
                    name,
                    alt.alias.as_deref().unwrap_or_default()
                )));
            }
            let mut rule_options = options.clone();
            if alt.items.iter().any(|e| *e == Expr::Empty) {
                rule_options.empty_indices = alt.items.iter().map(|e| *e == Expr::Empty).collect();
            }
            let expansion: Vec<Symbol> = alt
                .items
                .into_iter()
                .filter_map(|e| match e {
                    Expr::Symbol(sym) if sym.is_term() && rule_options.keep_all_tokens => {
                        Some(Symbol::terminal_filtered(sym.name(), false))
                    }
                    Expr::Symbol(sym) => Some(sym),
                    _ => None,
                })
                .collect();

            let mut rule = Rule::new(Symbol::nonterminal(name.clone()), expansion);
            rule.order = order;
            rule.alias = alt.alias;
            rule.options = rule_options;

            let key = (rule.origin.clone(), rule.expansion.clone());
            if let Some(&first) = seen.get(&key) {
                if !rule.expansion.is_empty() {
                    return Err(LarkError::grammar(format!(
                        "Rules defined twice: {}\n  * {}\n  * {}\n\n(Might happen due to colliding expansion of optionals: [] or ?)",
                        rule, rules[first], rule
                    )));
                }
                continue;
            }
            seen.insert(key, rules.len());
            rules.push(rule);
        }
    }
    Ok(rules)
}

fn remove_unused_rules(rules: Vec<Rule>, start: &[String]) -> Vec<Rule> {
    let mut by_origin: HashMap<&str, Vec<&Rule>> = HashMap::new();
    for r in &rules {
        by_origin.entry(r.origin.name()).or_default().push(r);
    }

    let mut reachable: HashSet<String> = start.iter().cloned().collect();
    let mut queue: Vec<String> = start.to_vec();
    while let Some(name) = queue.pop() {
        let Some(alts) = by_origin.get(name.as_str()) else {
            continue;
        };
        for sym in alts.iter().flat_map(|r| r.expansion.iter()) {
            if !sym.is_term() && reachable.insert(sym.name().to_string()) {
                queue.push(sym.name().to_string());
            }
        }
    }
    drop(by_origin);

    let (kept, unused): (Vec<Rule>, Vec<Rule>) = rules
        .into_iter()
        .partition(|r| reachable.contains(r.origin.name()));
    for r in &unused {
        log_debug!("Unused rule: {}", r);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_grammar::builder::GrammarBuilder;
    use crate::regex_backend::DefaultBackend;

    fn compile(text: &str) -> Result<CompiledGrammar, LarkError> {
        let mut b = GrammarBuilder::new(false, Vec::new());
        b.load_grammar(text, "<test>", None)?;
        b.build()?
            .compile(&["start".to_string()], &[], &DefaultBackend::new())
    }

    fn terminal<'a>(g: &'a CompiledGrammar, name: &str) -> &'a TerminalDef {
        g.terminals
            .iter()
            .find(|t| t.name == name)
            .unwrap_or_else(|| panic!("no terminal {}", name))
    }

    #[test]
    fn test_terminal_references_are_inlined() {
        let g = compile("start: NUM\nNUM: DIGIT+ (\".\" DIGIT+)?\nDIGIT: \"0\"..\"9\"\n").unwrap();
        assert_eq!(terminal(&g, "NUM").pattern.value(), r"(?:[0-9])+(?:\.(?:[0-9])+)?");
        assert!(g.terminals.iter().all(|t| t.name != "DIGIT"));
    }

    #[test]
    fn test_alternation_puts_longest_first() {
        let g = compile("start: OP\nOP: \"=\" | \"==\" | \"===\"\n").unwrap();
        assert_eq!(terminal(&g, "OP").pattern.value(), "(?:===|==|=)");
    }

    #[test]
    fn test_nested_alternation_is_flattened() {
        let g = compile("start: OP\nOP: \"a\" | \"abc\" | \"ab\"\n").unwrap();
        assert_eq!(terminal(&g, "OP").pattern.value(), "(?:abc|ab|a)");
    }

    #[test]
    fn test_unicode_classes_need_backend_support() {
        let text = "start: UP \"-\" /\\p{Ll}+/\nUP: /\\p{Lu}+/\n";
        let grammar = || {
            let mut b = GrammarBuilder::new(false, Vec::new());
            b.load_grammar(text, "<test>", None).unwrap();
            b.build().unwrap()
        };
        let start = ["start".to_string()];

        assert!(grammar().compile(&start, &[], &DefaultBackend::new()).is_ok());
        let err = grammar().compile(&start, &[], &DefaultBackend::bytes()).unwrap_err();
        assert!(err.is_grammar_error());
        assert!(err.to_string().contains("Unicode property classes"), "{}", err);

        let mut b = GrammarBuilder::new(false, Vec::new());
        b.load_grammar("start: W\nW: /\\p{L}+/ | \"_\"\n", "<test>", None).unwrap();
        let err = b.build().unwrap().compile(&start, &[], &DefaultBackend::bytes()).unwrap_err();
        assert!(err.to_string().contains("Terminal W uses Unicode"), "{}", err);
    }

    #[test]
    fn test_terminal_recursion_is_rejected() {
        let err = compile("start: A\nA: \"a\" B\nB: \"b\" A\n").unwrap_err();
        assert!(err.to_string().contains("Recursion in terminal"));
        let err = compile("start: A\nA: \"a\" b\nb: \"b\"\n").unwrap_err();
        assert!(err.to_string().contains("Rules aren't allowed inside terminals"));
    }

    #[test]
    fn test_regex_terminal_references() {
        let g = compile("start: ID\nID: /${LETTER}\\w*/\nLETTER: /[a-z]/\n").unwrap();
        assert_eq!(terminal(&g, "ID").pattern.value(), r"(?:[a-z])\w*");
    }

    #[test]
    fn test_anonymous_terminal_names() {
        let g = compile("start: \"(\" \"if\" \"a+b\" /x+/ KW\nKW: \"kw\"\n%extend start: \"kw\"\n").unwrap();
        let names: Vec<&str> = g.terminals.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"LPAR"));
        assert!(names.contains(&"IF"));
        assert!(names.contains(&"__ANON_0"));
        assert!(names.contains(&"__ANON_1"));
        assert_eq!(g.rules[1].expansion, vec![Symbol::terminal("KW")]);
        assert!(g.rules[0].expansion[0].filter_out());
        assert!(!g.rules[0].expansion[3].filter_out());
    }

    #[test]
    fn test_keep_all_tokens_unfilters() {
        let g = compile("!start: \"(\" \")\"\n").unwrap();
        assert!(g.rules[0].expansion.iter().all(|s| !s.filter_out()));
    }

    #[test]
    fn test_templates_are_shared() {
        let g = compile("start: sep{A, \",\"} sep{A, \",\"}\nsep{x, d}: x (d x)*\nA: \"a\"\n").unwrap();
        let origins: HashSet<&str> = g
            .rules
            .iter()
            .map(|r| r.origin.name())
            .filter(|n| n.starts_with("sep{"))
            .collect();
        assert_eq!(origins, ["sep{A,COMMA}"].into_iter().collect());
        let inst = g.rules.iter().find(|r| r.origin.name() == "sep{A,COMMA}").unwrap();
        assert_eq!(inst.options.template_source.as_deref(), Some("sep"));
        assert_eq!(inst.tree_name(), "sep");
    }

    #[test]
    fn test_maybe_records_empty_indices() {
        let g = compile("start: [a] B\na: \"a\"\nB: \"b\"\n").unwrap();
        let without = g.rules.iter().find(|r| r.expansion.len() == 1).unwrap();
        assert_eq!(without.options.empty_indices, vec![true, false]);
    }

    #[test]
    fn test_duplicate_rules() {
        let g = compile("start: a | a\na: \"a\"\n").unwrap();
        assert_eq!(g.rules.iter().filter(|r| r.origin.name() == "start").count(), 1);
        let err = compile("start: [a] [a]\na: \"a\"\n").unwrap_err();
        assert!(err.to_string().contains("Rules defined twice"));
    }

    #[test]
    fn test_unused_rules_removed() {
        let g = compile("start: a\na: \"a\"\nb: c\nc: b \"x\"\n").unwrap();
        let origins: HashSet<&str> = g.rules.iter().map(|r| r.origin.name()).collect();
        assert_eq!(origins, ["start", "a"].into_iter().collect());
        assert!(g.terminals.iter().all(|t| t.name != "X"));
    }

    #[test]
    fn test_unreachable_cycle_removed() {
        let g = compile("start: NAME+\nNAME: /[a-z]+/\n%ignore \" \"\nb: c\nc: b \"if\"\n").unwrap();
        let origins: HashSet<&str> = g.rules.iter().map(|r| r.origin.name()).collect();
        assert!(origins.contains("start"));
        assert!(!origins.contains("b") && !origins.contains("c"));
        assert!(g.terminals.iter().all(|t| t.name != "IF"));
    }

    #[test]
    fn test_inline_rule_alias_rejected() {
        let err = compile("start: _a\n_a: \"a\" -> x\n").unwrap_err();
        assert!(err.to_string().contains("isn't allowed to have aliases"));
    }

    #[test]
    fn test_empty_terminals_rejected() {
        assert!(compile("start: \"\"\n").is_err());
    }
}
