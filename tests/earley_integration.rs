//! Integration tests for the Earley and CYK parsers
//!
//! These tests cover:
//! - Ambiguity handling (resolve, explicit, forest)
//! - Rule and terminal priorities
//! - Scannerless parsing with the dynamic lexers
//! - Agreement between the parser algorithms

use lark::prelude::*;

const SENTENCE_GRAMMAR: &str = r#"
    sentence: noun verb noun        -> simple
            | noun verb "like" noun -> comparative

    noun: adj? NOUN
    verb: VERB
    adj: ADJ

    NOUN: "flies" | "bananas" | "fruit"
    VERB: "like" | "flies"
    ADJ: "fruit"

    %import common.WS
    %ignore WS
"#;

const EXPR_GRAMMAR: &str = r#"
    ?start: sum
    ?sum: sum "+" product
        | sum "-" product
        | product
    ?product: product "*" atom
            | atom
    ?atom: NUMBER -> number
         | "(" sum ")"

    %import common.NUMBER
    %import common.WS_INLINE
    %ignore WS_INLINE
"#;

fn sentence_parser(ambiguity: Ambiguity) -> Lark {
    Lark::new(
        SENTENCE_GRAMMAR,
        LarkOptions::default()
            .start(["sentence"])
            .ambiguity(ambiguity),
    )
    .expect("sentence grammar should build")
}

fn leaf_values(tree: &Tree) -> Vec<String> {
    tree.scan_values(|_| true)
        .into_iter()
        .map(|t| t.value.clone())
        .collect()
}

// ============================================================================
// Ambiguity Tests
// ============================================================================

#[test]
fn test_explicit_ambiguity() {
    let parser = sentence_parser(Ambiguity::Explicit);
    let tree = parser.parse("fruit flies like bananas").unwrap();

    assert_eq!(tree.data, "_ambig");
    let mut options: Vec<&str> = tree.child_trees().map(|t| t.data.as_str()).collect();
    options.sort_unstable();
    assert_eq!(options, vec!["comparative", "simple"]);
}

#[test]
fn test_resolved_ambiguity() {
    let parser = sentence_parser(Ambiguity::Resolve);
    let tree = parser.parse("fruit flies like bananas").unwrap();

    assert!(tree.data == "simple" || tree.data == "comparative", "{}", tree.data);
    assert_eq!(tree.find_data("_ambig").count(), 0);
}

#[test]
fn test_unambiguous_input_has_no_ambig_node() {
    let parser = sentence_parser(Ambiguity::Explicit);
    let tree = parser.parse("bananas like fruit").unwrap();
    assert_eq!(tree.data, "simple");
    assert_eq!(tree.find_data("_ambig").count(), 0);
}

#[test]
fn test_parse_forest() {
    let parser = sentence_parser(Ambiguity::Forest);
    let forest = parser.parse_forest("fruit flies like bananas").unwrap();
    assert!(forest.is_ambiguous());

    let explicit = forest.to_tree(true).unwrap();
    assert_eq!(explicit.as_tree().unwrap().data, "_ambig");

    let resolved = forest.to_tree(false).unwrap();
    assert_ne!(resolved.as_tree().unwrap().data, "_ambig");
}

#[test]
fn test_parse_with_forest_mode_requires_parse_forest() {
    let parser = sentence_parser(Ambiguity::Forest);
    let err = parser.parse("fruit flies like bananas").unwrap_err();
    assert!(matches!(err, LarkError::Configuration(_)));
}

#[test]
fn test_ambiguity_needs_earley() {
    let err = Lark::new(
        SENTENCE_GRAMMAR,
        LarkOptions::default()
            .start(["sentence"])
            .parser(ParserKind::Lalr)
            .ambiguity(Ambiguity::Explicit),
    )
    .unwrap_err();
    assert!(matches!(err, LarkError::Configuration(_)));
}

// ============================================================================
// Priority Tests
// ============================================================================

#[test]
fn test_rule_priority() {
    let grammar = r#"
        start: a | b
        a.1: "a"
        b.2: "a"
    "#;
    for lexer in [LexerKind::Basic, LexerKind::Dynamic] {
        let parser = Lark::new(grammar, LarkOptions::default().lexer(lexer)).unwrap();
        let tree = parser.parse("a").unwrap();
        assert_eq!(tree.child_trees().next().unwrap().data, "b", "lexer {}", lexer);
    }

    let swapped = r#"
        start: a | b
        a.2: "a"
        b.1: "a"
    "#;
    for lexer in [LexerKind::Basic, LexerKind::Dynamic] {
        let parser = Lark::new(swapped, LarkOptions::default().lexer(lexer)).unwrap();
        let tree = parser.parse("a").unwrap();
        assert_eq!(tree.child_trees().next().unwrap().data, "a", "lexer {}", lexer);
    }
}

#[test]
fn test_priority_invert() {
    let grammar = r#"
        start: a | b
        a.1: "a"
        b.2: "a"
    "#;
    let parser = Lark::new(grammar, LarkOptions::default().priority(PriorityMode::Invert)).unwrap();
    let tree = parser.parse("a").unwrap();
    assert_eq!(tree.child_trees().next().unwrap().data, "a");
}

#[test]
fn test_terminal_priority_with_basic_lexer() {
    let grammar = r#"
        start: A | B
        A.2: /a/
        B: "a"
    "#;
    let parser = Lark::new(grammar, LarkOptions::default().lexer(LexerKind::Basic)).unwrap();
    let tree = parser.parse("a").unwrap();
    assert_eq!(tree.child_tokens().next().unwrap().kind, "A");
}

// ============================================================================
// Dynamic Lexer Tests
// ============================================================================

#[test]
fn test_dynamic_lexer_longest_match_only() {
    let grammar = "start: A A\nA: /a+/\n";
    let parser = Lark::new(grammar, LarkOptions::default().lexer(LexerKind::Dynamic)).unwrap();
    assert!(parser.parse("aaa").is_err());
}

#[test]
fn test_dynamic_complete_tries_shorter_matches() {
    let grammar = "start: A A\nA: /a+/\n";
    let parser = Lark::new(grammar, LarkOptions::default().lexer(LexerKind::DynamicComplete)).unwrap();
    let tree = parser.parse("aaa").unwrap();
    assert_eq!(tree.children.len(), 2);
    assert_eq!(leaf_values(&tree).concat(), "aaa");
}

#[test]
fn test_scannerless_keywords() {
    let grammar = r#"
        start: (kw | NUMBER)+
        kw: "if" | "then"
        %import common.NUMBER
        %ignore " "
    "#;
    let parser = Lark::new(grammar, LarkOptions::default()).unwrap();
    let tree = parser.parse("if 1 then 2").unwrap();
    assert_eq!(tree.find_data("kw").count(), 2);
    assert_eq!(leaf_values(&tree), vec!["1", "2"]);
}

#[test]
fn test_dynamic_unexpected_characters() {
    let parser = Lark::new(EXPR_GRAMMAR, LarkOptions::default()).unwrap();
    let err = parser.parse("1 + $").unwrap_err();
    let view = err.as_unexpected_input().expect("parse error");
    assert_eq!(view.column(), 5);
}

// ============================================================================
// Agreement Tests
// ============================================================================

#[test]
fn test_earley_matches_lalr() {
    let lalr = Lark::new(EXPR_GRAMMAR, LarkOptions::default().parser(ParserKind::Lalr)).unwrap();
    let earley = Lark::new(EXPR_GRAMMAR, LarkOptions::default()).unwrap();
    let earley_basic = Lark::new(EXPR_GRAMMAR, LarkOptions::default().lexer(LexerKind::Basic)).unwrap();

    for input in ["1", "1 + 2", "1 + 2 * 3", "(1 + 2) * 3 - 4", "((((5))))"] {
        let expected = lalr.parse(input).unwrap();
        assert_eq!(earley.parse(input).unwrap(), expected, "{}", input);
        assert_eq!(earley_basic.parse(input).unwrap(), expected, "{}", input);
    }
}

#[test]
fn test_left_associative_tree() {
    let parser = Lark::new(EXPR_GRAMMAR, LarkOptions::default()).unwrap();
    let tree = parser.parse("1 - 2 - 3").unwrap();
    assert_eq!(tree.data, "sum");
    let inner = tree.child_trees().next().unwrap();
    assert_eq!(inner.data, "sum");
    assert_eq!(leaf_values(inner), vec!["1", "2"]);
}

#[test]
fn test_cyk_matches_lalr() {
    let grammar = r#"
        start: item+
        item: "a" | "b" pair
        pair: "b" "a"
    "#;
    let lalr = Lark::new(grammar, LarkOptions::default().parser(ParserKind::Lalr)).unwrap();
    let cyk = Lark::new(grammar, LarkOptions::default().parser(ParserKind::Cyk)).unwrap();
    for input in ["a", "aa", "bba", "abbaa"] {
        assert_eq!(cyk.parse(input).unwrap(), lalr.parse(input).unwrap(), "{}", input);
    }
    assert!(cyk.parse("ab").is_err());
}

#[test]
fn test_earley_empty_and_optional() {
    let grammar = r#"
        start: head? tail*
        head: "h"
        tail: "t"
    "#;
    let parser = Lark::new(grammar, LarkOptions::default()).unwrap();
    assert!(parser.parse("").unwrap().children.is_empty());
    let tree = parser.parse("htt").unwrap();
    assert_eq!(tree.find_data("tail").count(), 2);
}
