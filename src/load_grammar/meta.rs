//! The grammar language, parsed by this crate's own LALR machinery
//!
//! The meta-grammar is a fixed rule table compiled once on first use. Syntax
//! errors are explained by replaying a list of labelled malformed snippets
//! through the same parser and picking the one that fails the same way.

use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::error::{GrammarError, LarkError};
use crate::grammar::{Pattern, Rule, Symbol, TerminalDef};
use crate::lexer::{BasicLexer, LexerConf, LexerThread};
use crate::load_grammar::ast::{is_term_name, statements, Stmt};
use crate::parse_tree_builder::ParseTreeBuilder;
use crate::parsers::lalr_parser::LalrParser;
use crate::regex_backend::DefaultBackend;
use crate::tree::{Child, Tree};

/// Terminals of the grammar language
///
/// Overlaps (`?` as operator or rule prefix, `.` against `..`, `//` against
/// a regex) are settled by the lexer's longest-match rule.
const TERMINALS: &[(&str, &str)] = &[
    ("_LPAR", r"\("),
    ("_RPAR", r"\)"),
    ("_LBRA", r"\["),
    ("_RBRA", r"\]"),
    ("_LBRACE", r"\{"),
    ("_RBRACE", r"\}"),
    ("OP", r"[+*?]"),
    ("_COLON", ":"),
    ("_COMMA", ","),
    ("_OR", r"\|"),
    ("_DOT", r"\."),
    ("_DOTDOT", r"\.\."),
    ("TILDE", "~"),
    ("RULE", r"(!\?|\?!|!|\?)?_?[a-z][_a-z0-9]*"),
    ("TERMINAL", "_?[A-Z][_A-Z0-9]*"),
    ("STRING", r#""(\\"|\\\\|[^"\n])*?"i?"#),
    ("REGEXP", r"/(\\/|\\\\|[^/\n]|\n)+?/[imslux]*"),
    ("_NL", r"(\r?\n)+\s*"),
    ("WS", r"[ \t]+"),
    ("COMMENT", r"\s*//[^\n]*"),
    ("BACKSLASH", r"\\[ ]*\r?\n"),
    ("_TO", "->"),
    ("_IGNORE", "%ignore"),
    ("_OVERRIDE", "%override"),
    ("_DECLARE", "%declare"),
    ("_EXTEND", "%extend"),
    ("_IMPORT", "%import"),
    ("NUMBER", r"[+-]?\d+"),
];

/// Rules of the grammar language; `?name` inlines single children
const RULES: &[(&str, &[&str])] = &[
    ("start", &["_list"]),
    ("_list", &["_item", "_list _item"]),
    (
        "_item",
        &["rule", "term", "ignore", "import", "declare", "override", "extend", "_NL"],
    ),
    (
        "rule",
        &[
            "RULE template_params _COLON expansions _NL",
            "RULE template_params _DOT NUMBER _COLON expansions _NL",
        ],
    ),
    ("template_params", &["_LBRACE _template_params _RBRACE", ""]),
    ("_template_params", &["RULE", "_template_params _COMMA RULE"]),
    (
        "expansions",
        &["alias", "expansions _OR alias", "expansions _NL _OR alias"],
    ),
    ("?alias", &["expansion _TO RULE", "expansion"]),
    ("expansion", &["_expansion"]),
    ("_expansion", &["", "_expansion expr"]),
    (
        "?expr",
        &[
            "atom",
            "atom OP",
            "atom TILDE NUMBER",
            "atom TILDE NUMBER _DOTDOT NUMBER",
        ],
    ),
    ("?atom", &["_LPAR expansions _RPAR", "maybe", "value"]),
    (
        "value",
        &["terminal", "nonterminal", "literal", "range", "template_usage"],
    ),
    ("terminal", &["TERMINAL"]),
    ("nonterminal", &["RULE"]),
    ("?name", &["RULE", "TERMINAL"]),
    ("maybe", &["_LBRA expansions _RBRA"]),
    ("range", &["STRING _DOTDOT STRING"]),
    ("template_usage", &["RULE _LBRACE _template_args _RBRACE"]),
    ("_template_args", &["value", "_template_args _COMMA value"]),
    (
        "term",
        &[
            "TERMINAL _COLON expansions _NL",
            "TERMINAL _DOT NUMBER _COLON expansions _NL",
        ],
    ),
    ("override", &["_OVERRIDE rule", "_OVERRIDE term"]),
    ("extend", &["_EXTEND rule", "_EXTEND term"]),
    ("ignore", &["_IGNORE expansions _NL"]),
    ("declare", &["_DECLARE _declare_args _NL"]),
    (
        "import",
        &[
            "_IMPORT _import_path _NL",
            "_IMPORT _import_path _LPAR name_list _RPAR _NL",
            "_IMPORT _import_path _TO name _NL",
        ],
    ),
    ("_import_path", &["import_lib", "import_rel"]),
    ("import_lib", &["_import_args"]),
    ("import_rel", &["_DOT _import_args"]),
    ("_import_args", &["name", "_import_args _DOT name"]),
    ("name_list", &["_name_list"]),
    ("_name_list", &["name", "_name_list _COMMA name"]),
    ("_declare_args", &["name", "_declare_args name"]),
    ("literal", &["REGEXP", "STRING"]),
];

/// Malformed snippets labelled with the diagnosis they illustrate
pub const GRAMMAR_ERRORS: &[(&str, &[&str])] = &[
    ("Incorrect type of value", &["a: 1\n"]),
    ("Unclosed parenthesis", &["a: (\n"]),
    ("Unmatched closing parenthesis", &["a: )\n", "a: [)\n", "a: (]\n"]),
    (
        "Expecting rule or terminal definition (missing colon)",
        &["a\n", "A\n", "a->\n", "A->\n", "a A\n"],
    ),
    ("Illegal name for rules or terminals", &["Aa:\n"]),
    ("Alias expects lowercase name", &["a: -> \"a\"\n"]),
    (
        "Unexpected colon",
        &["a::\n", "a: b:\n", "a: B:\n", "a: \"a\":\n"],
    ),
    (
        "Misplaced operator",
        &["a: b??", "a: b(?)", "a:+\n", "a:?\n", "a:*\n", "a:|*\n"],
    ),
    (
        "Expecting option (\"|\") or a new rule or terminal definition",
        &["a:a\n()\n"],
    ),
    ("Terminal names cannot contain dots", &["A.B\n"]),
    ("Expecting rule or terminal definition", &["\"a\"\n"]),
    ("%import expects a name", &["%import \"a\"\n"]),
    ("%ignore expects a value", &["%ignore %import\n"]),
];

/// Compiled parser of the grammar language
pub struct MetaParser {
    parser: LalrParser,
    lexer: BasicLexer,
}

static META: OnceCell<MetaParser> = OnceCell::new();

/// The shared meta-grammar parser, built on first use
pub fn meta_parser() -> Result<&'static MetaParser, LarkError> {
    META.get_or_try_init(MetaParser::build)
}

impl MetaParser {
    fn build() -> Result<Self, LarkError> {
        let terminals = TERMINALS
            .iter()
            .map(|(name, re)| TerminalDef::new(*name, Pattern::regex(*re, "")))
            .collect();

        let mut rules = Vec::new();
        for (raw, alternatives) in RULES {
            let expand1 = raw.starts_with('?');
            let name = raw.trim_start_matches('?');
            for (order, alt) in alternatives.iter().enumerate() {
                let expansion = alt
                    .split_whitespace()
                    .map(|s| {
                        if is_term_name(s) {
                            Symbol::terminal_filtered(s, s.starts_with('_'))
                        } else {
                            Symbol::nonterminal(s)
                        }
                    })
                    .collect();
                let mut rule = Rule::new(Symbol::nonterminal(name), expansion);
                rule.order = order;
                rule.options.expand1 = expand1;
                rules.push(rule);
            }
        }

        let builder = ParseTreeBuilder::new(&rules, false, false, false);
        let parser = LalrParser::new(&rules, &["start".to_string()], false, builder)?;
        let conf = LexerConf::new(
            terminals,
            vec!["WS".to_string(), "COMMENT".to_string(), "BACKSLASH".to_string()],
            Arc::new(DefaultBackend::new()),
        );
        let lexer = BasicLexer::new(&conf)?;
        log_debug!("meta-grammar parser built: {} rules, {} states", rules.len(), parser.table().len());
        Ok(Self { parser, lexer })
    }

    /// Parse grammar text into the raw meta tree
    pub fn parse(&self, text: &str) -> Result<Tree, LarkError> {
        let thread = LexerThread::new(&self.lexer, text.as_bytes(), None);
        match self.parser.parse(thread, "start")? {
            Child::Tree(t) => Ok(t),
            other => Ok(Tree::new("start", vec![other])),
        }
    }
}

/// Parse grammar text named `name` into statements
pub fn parse_grammar(text: &str, name: &str) -> Result<Vec<Stmt>, LarkError> {
    let meta = meta_parser()?;
    let full = format!("{}\n", text);
    match meta.parse(&full) {
        Ok(tree) => statements(&tree),
        Err(err) => Err(translate_error(meta, text, name, err)),
    }
}

fn translate_error(meta: &MetaParser, text: &str, name: &str, err: LarkError) -> LarkError {
    let Some(view) = err.as_unexpected_input() else {
        return err;
    };
    let (line, column) = (view.line(), view.column());
    let context = view.get_context(text, 40);
    if let LarkError::UnexpectedCharacters(_) = err {
        return LarkError::Grammar(GrammarError::at(
            format!(
                "Unexpected input at line {} column {} in {}: \n\n{}",
                line, column, name, context
            ),
            line,
            column,
        ));
    }

    let examples: Vec<(&str, Vec<&str>)> = GRAMMAR_ERRORS
        .iter()
        .map(|(label, snippets)| (*label, snippets.to_vec()))
        .collect();
    let label = view
        .match_examples(|s| meta.parse(s), &examples, false, true)
        .map(str::to_string)
        .or_else(|| {
            view.expected()
                .iter()
                .any(|e| e == "STRING")
                .then(|| "Expecting a value".to_string())
        });
    let message = match label {
        Some(label) => format!("{}, at line {} column {}\n\n{}", label, line, column, context),
        None => format!(
            "Unexpected input at line {} column {} in {}: expected one of {}\n\n{}",
            line,
            column,
            name,
            view.expected().join(", "),
            context
        ),
    };
    LarkError::Grammar(GrammarError::at(message, line, column))
}
