//! Integration tests for the LALR(1) parser
//!
//! These tests cover:
//! - JSON-like grammars with `?` inlining and aliases
//! - Error recovery through `parse_with_recovery`
//! - The indentation post-lexer
//! - Template imports and `%override`
//! - The interactive parser

use std::sync::Arc;

use lark::prelude::*;

const JSON_GRAMMAR: &str = r#"
    ?start: value

    ?value: object
          | array
          | string
          | SIGNED_NUMBER      -> number
          | "true"             -> true
          | "false"            -> false
          | "null"             -> null

    array  : "[" [value ("," value)*] "]"
    object : "{" [pair ("," pair)*] "}"
    pair   : string ":" value

    string : ESCAPED_STRING

    %import common.ESCAPED_STRING
    %import common.SIGNED_NUMBER
    %import common.WS
    %ignore WS
"#;

const LIST_GRAMMAR: &str = r#"
    start: "[" num ("," num)* "]"
    ?num: SIGNED_NUMBER
    %import common.SIGNED_NUMBER
    %ignore " "
"#;

fn lalr(grammar: &str) -> Lark {
    Lark::new(grammar, LarkOptions::default().parser(ParserKind::Lalr)).expect("grammar should build")
}

fn values(tree: &Tree) -> Vec<String> {
    tree.scan_values(|_| true)
        .into_iter()
        .map(|t| t.value.clone())
        .collect()
}

// ============================================================================
// JSON Tests
// ============================================================================

#[test]
fn test_json_number_array() {
    let parser = lalr(JSON_GRAMMAR);
    let tree = parser.parse("[0, 1, -2, 3.3, 4.4e5, 6.6e-7]").unwrap();

    assert_eq!(tree.data, "array");
    assert_eq!(tree.children.len(), 6);
    for child in &tree.children {
        let number = child.as_tree().expect("number subtree");
        assert_eq!(number.data, "number");
        assert_eq!(number.children.len(), 1);
    }
    assert_eq!(values(&tree), vec!["0", "1", "-2", "3.3", "4.4e5", "6.6e-7"]);
}

#[test]
fn test_json_object() {
    let parser = lalr(JSON_GRAMMAR);
    let tree = parser
        .parse(r#"{"a": [true, null], "b": {"c": "d"}}"#)
        .unwrap();

    assert_eq!(tree.data, "object");
    let pairs: Vec<&Tree> = tree.find_data("pair").collect();
    assert_eq!(pairs.len(), 3);
    assert_eq!(tree.find_data("true").count(), 1);
    assert_eq!(tree.find_data("null").count(), 1);
}

#[test]
fn test_json_empty_array_placeholder() {
    let parser = lalr(JSON_GRAMMAR);
    let tree = parser.parse("[]").unwrap();
    assert_eq!(tree.data, "array");
    assert_eq!(tree.children, vec![Child::Placeholder]);

    let parser = Lark::new(
        JSON_GRAMMAR,
        LarkOptions::default()
            .parser(ParserKind::Lalr)
            .maybe_placeholders(false),
    )
    .unwrap();
    assert!(parser.parse("[]").unwrap().children.is_empty());
}

#[test]
fn test_json_syntax_error() {
    let parser = lalr(JSON_GRAMMAR);
    let err = parser.parse("[1, 2").unwrap_err();
    assert!(matches!(err, LarkError::UnexpectedToken(ref e) if e.is_end()));

    let err = parser.parse("[1 ; 2]").unwrap_err();
    assert!(matches!(err, LarkError::UnexpectedCharacters(_)));
}

// ============================================================================
// Error Recovery Tests
// ============================================================================

#[test]
fn test_recovery_inserts_and_drops_commas() {
    let parser = lalr(LIST_GRAMMAR);

    let recovered = parser
        .parse_with_recovery("[0 1, 2,, 3,,, 4, 5 6 ]", |err, ip| {
            let LarkError::UnexpectedToken(ut) = err else {
                return false;
            };
            match ut.token.kind.as_str() {
                "COMMA" => true,
                "SIGNED_NUMBER" => {
                    let comma = Token::new_borrow_pos("COMMA", ",", &ut.token);
                    ip.feed_token(comma).is_ok() && ip.feed_token(ut.token.clone()).is_ok()
                }
                _ => false,
            }
        })
        .unwrap();

    let clean = parser.parse("[0, 1, 2, 3, 4, 5, 6]").unwrap();
    assert_eq!(recovered, clean);
    assert_eq!(values(&recovered), vec!["0", "1", "2", "3", "4", "5", "6"]);
}

#[test]
fn test_recovery_json_array() {
    let parser = lalr(JSON_GRAMMAR);

    let recovered = parser
        .parse_with_recovery("[0 1, 2,, 3,,, 4, 5 6 ]", |err, ip| {
            let LarkError::UnexpectedToken(ut) = err else {
                return false;
            };
            match ut.token.kind.as_str() {
                "COMMA" => true,
                "SIGNED_NUMBER" => {
                    ip.feed_token(Token::new("COMMA", ",")).is_ok() && ip.feed_token(ut.token.clone()).is_ok()
                }
                _ => false,
            }
        })
        .unwrap();

    assert_eq!(recovered, parser.parse("[0, 1, 2, 3, 4, 5, 6]").unwrap());
    assert_eq!(recovered.data, "array");
    assert_eq!(recovered.children.len(), 7);
}

#[test]
fn test_recovery_refused() {
    let parser = lalr(LIST_GRAMMAR);
    let mut calls = 0;
    let err = parser
        .parse_with_recovery("[0 1]", |_, _| {
            calls += 1;
            false
        })
        .unwrap_err();
    assert_eq!(calls, 1);
    assert!(matches!(err, LarkError::UnexpectedToken(_)));
}

#[test]
fn test_recovery_skips_characters() {
    let parser = lalr(LIST_GRAMMAR);
    let tree = parser
        .parse_with_recovery("[1, 2 $]", |err, _| matches!(err, LarkError::UnexpectedCharacters(_)))
        .unwrap();
    assert_eq!(values(&tree), vec!["1", "2"]);
}

#[test]
fn test_recovery_gives_up_at_end() {
    let parser = lalr(LIST_GRAMMAR);
    let err = parser.parse_with_recovery("[1, 2", |_, _| true).unwrap_err();
    assert!(matches!(err, LarkError::UnexpectedToken(ref e) if e.is_end()));
}

// ============================================================================
// Indenter Tests
// ============================================================================

const TREE_GRAMMAR: &str = r#"
    ?start: _NL* tree

    tree: NAME _NL [_INDENT tree+ _DEDENT]

    %import common.CNAME -> NAME
    %import common.WS_INLINE
    %declare _INDENT _DEDENT
    %ignore WS_INLINE

    _NL: /(\r?\n[\t ]*)+/
"#;

const TREE_TEXT: &str = "a\n    b\n    c\n        d\n        e\n    f\n        g\n";

fn tree_parser() -> Lark {
    let indenter = Indenter::new(IndenterConfig::new("_NL", "_INDENT", "_DEDENT", 8));
    Lark::new(
        TREE_GRAMMAR,
        LarkOptions::default()
            .parser(ParserKind::Lalr)
            .postlex(Arc::new(indenter)),
    )
    .unwrap()
}

fn name_of(tree: &Tree) -> &str {
    tree.child_tokens().next().map(|t| t.value.as_str()).unwrap_or("")
}

#[test]
fn test_indented_tree() {
    let tree = tree_parser().parse(TREE_TEXT).unwrap();

    assert_eq!(tree.data, "tree");
    assert_eq!(name_of(&tree), "a");
    let kids: Vec<&Tree> = tree.child_trees().collect();
    assert_eq!(kids.iter().map(|t| name_of(t)).collect::<Vec<_>>(), vec!["b", "c", "f"]);

    let c: Vec<&str> = kids[1].child_trees().map(name_of).collect();
    assert_eq!(c, vec!["d", "e"]);
    let f: Vec<&str> = kids[2].child_trees().map(name_of).collect();
    assert_eq!(f, vec!["g"]);
    assert_eq!(kids[0].children.len(), 1);
}

#[test]
fn test_indented_tree_with_tabs() {
    let text = "a\n\tb\n\t\tc\n\td\n";
    let tree = tree_parser().parse(text).unwrap();
    let kids: Vec<&str> = tree.child_trees().map(name_of).collect();
    assert_eq!(kids, vec!["b", "d"]);
}

#[test]
fn test_inconsistent_dedent() {
    let err = tree_parser().parse("a\n    b\n  c\n").unwrap_err();
    assert!(matches!(err, LarkError::Dedent(_)), "{}", err);
}

#[test]
fn test_lex_runs_postlex() {
    let tokens = tree_parser().lex("a\n    b\n", false).unwrap();
    let kinds: Vec<&str> = tokens.iter().map(|t| t.kind.as_str()).collect();
    assert_eq!(kinds, vec!["NAME", "_NL", "_INDENT", "NAME", "_NL", "_DEDENT"]);
}

// ============================================================================
// Template Import Tests
// ============================================================================

const TEMPLATE_LIB: &str = r#"
    start: "[" sep{NUMBER, ","} "]"
    sep{item, delim}: item (delim item)*
    NUMBER: /\d+/
"#;

fn template_parser(grammar: &str) -> Result<Lark, LarkError> {
    let loader = MemoryLoader::new().with_file("test_templates_import.lark", TEMPLATE_LIB);
    Lark::new(
        grammar,
        LarkOptions::default()
            .parser(ParserKind::Lalr)
            .import_path(Arc::new(loader)),
    )
}

#[test]
fn test_template_import() {
    let parser = template_parser(
        r#"
        %import .test_templates_import (start, sep)
        %ignore " "
        "#,
    )
    .unwrap();

    let tree = parser.parse("[1, 2, 3]").unwrap();
    assert_eq!(tree.data, "start");
    let sep = tree.child_trees().next().unwrap();
    assert!(sep.data.starts_with("sep{"), "{}", sep.data);
    assert_eq!(values(&tree), vec!["1", "2", "3"]);
    assert!(parser.parse("[1, 2, ]").is_err());
}

#[test]
fn test_template_override() {
    let parser = template_parser(
        r#"
        %import .test_templates_import (start, sep)
        %override sep{item, delim}: item (delim item)* delim?
        %ignore " "
        "#,
    )
    .unwrap();

    let a = parser.parse("[1, 2, 3]").unwrap();
    let b = parser.parse("[1, 2, 3, ]").unwrap();
    assert_eq!(a, b);
    assert_eq!(values(&b), vec!["1", "2", "3"]);
}

#[test]
fn test_template_import_missing() {
    let err = Lark::new(
        "%import .no_such_file (start)\n",
        LarkOptions::default().parser(ParserKind::Lalr),
    )
    .unwrap_err();
    assert!(err.is_grammar_error());
}

// ============================================================================
// Interactive Parser Tests
// ============================================================================

#[test]
fn test_interactive_feed_and_finish() {
    let parser = lalr(LIST_GRAMMAR);
    let mut ip = parser.parse_interactive("[1, 2", None).unwrap();

    let fed = ip.exhaust_lexer().unwrap();
    assert_eq!(fed.len(), 4);

    let accepts = ip.accepts();
    assert!(accepts.contains("COMMA"));
    assert!(accepts.contains("RSQB"));
    assert!(!accepts.contains("SIGNED_NUMBER"));

    ip.feed_token(Token::new("RSQB", "]")).unwrap();
    let result = ip.feed_eof(None).unwrap().expect("finished parse");
    let tree = result.as_tree().unwrap();
    assert_eq!(tree, &parser.parse("[1, 2]").unwrap());
}

#[test]
fn test_interactive_copy_is_independent() {
    let parser = lalr(LIST_GRAMMAR);
    let mut ip = parser.parse_interactive("[1", None).unwrap();
    ip.exhaust_lexer().unwrap();

    let snapshot = ip.copy();
    assert_eq!(snapshot, ip);

    ip.feed_token(Token::new("COMMA", ",")).unwrap();
    assert_ne!(snapshot, ip);
    assert!(snapshot.accepts().contains("RSQB"));
    assert!(!ip.accepts().contains("RSQB"));
}

#[test]
fn test_interactive_resume() {
    let parser = lalr(LIST_GRAMMAR);
    let mut ip = parser.parse_interactive("[7, 8]", None).unwrap();
    let result = ip.resume_parse().unwrap();
    assert_eq!(values(result.as_tree().unwrap()), vec!["7", "8"]);
    assert!(ip.result.is_some());
}

#[test]
fn test_interactive_choices_and_pretty() {
    let parser = lalr(LIST_GRAMMAR);
    let ip = parser.parse_interactive("", None).unwrap();
    assert!(ip.choices().contains_key("LSQB"));
    assert!(ip.pretty().starts_with("Parser choices:"));
}

#[test]
fn test_interactive_rejects_bad_token() {
    let parser = lalr(LIST_GRAMMAR);
    let mut ip = parser.parse_interactive("", None).unwrap();
    let err = ip.feed_token(Token::new("RSQB", "]")).unwrap_err();
    assert!(matches!(err, LarkError::UnexpectedToken(_)));
}

#[test]
fn test_interactive_needs_lalr() {
    let parser = Lark::new(LIST_GRAMMAR, LarkOptions::default()).unwrap();
    assert!(parser.parse_interactive("[1]", None).is_err());
}

// ============================================================================
// Position Tests
// ============================================================================

#[test]
fn test_propagate_positions() {
    let parser = Lark::new(
        LIST_GRAMMAR,
        LarkOptions::default()
            .parser(ParserKind::Lalr)
            .propagate_positions(true),
    )
    .unwrap();
    let tree = parser.parse(" [10, 20] ").unwrap();
    assert_eq!(tree.meta.start_pos, 1);
    assert_eq!(tree.meta.end_pos, 9);
    assert_eq!(tree.meta.line, 1);
    assert_eq!(tree.meta.column, 2);
}

#[test]
fn test_strict_mode_rejects_conflicts() {
    let grammar = "start: a | b\na: \"x\"\nb: \"x\"\n";
    let err = Lark::new(
        grammar,
        LarkOptions::default().parser(ParserKind::Lalr).strict(true),
    )
    .unwrap_err();
    assert!(err.is_grammar_error(), "{}", err);
}
