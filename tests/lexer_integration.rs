//! Integration tests for the lexers
//!
//! These tests cover:
//! - Terminal precedence and keyword extraction from regex terminals
//! - Contextual lexing
//! - Token callbacks, including on ignored terminals
//! - Line and column tracking
//! - Global regex flags and byte input

use std::sync::{Arc, Mutex};

use lark::prelude::*;

fn kinds(tokens: &[Token]) -> Vec<&str> {
    tokens.iter().map(|t| t.kind.as_str()).collect()
}

// ============================================================================
// Precedence Tests
// ============================================================================

#[test]
fn test_keyword_inside_regex_terminal() {
    let grammar = r#"
        start: (IF | NAME)+
        IF: "if"
        NAME: /[a-z]+/
        %ignore " "
    "#;
    for lexer in [LexerKind::Basic, LexerKind::Contextual] {
        let parser = Lark::new(
            grammar,
            LarkOptions::default().parser(ParserKind::Lalr).lexer(lexer),
        )
        .unwrap();
        let tree = parser.parse("if iffy if").unwrap();
        let got: Vec<(&str, &str)> = tree
            .child_tokens()
            .map(|t| (t.kind.as_str(), t.value.as_str()))
            .collect();
        assert_eq!(got, vec![("IF", "if"), ("NAME", "iffy"), ("IF", "if")], "lexer {}", lexer);
    }
}

#[test]
fn test_longest_string_wins() {
    let parser = Lark::new(
        "start: (EQ | EQEQ)+\nEQ: \"=\"\nEQEQ: \"==\"\n",
        LarkOptions::default().parser(ParserKind::Lalr),
    )
    .unwrap();
    let tokens = parser.lex("===", false).unwrap();
    assert_eq!(kinds(&tokens), vec!["EQEQ", "EQ"]);
}

#[test]
fn test_terminal_priority_beats_length() {
    let parser = Lark::new(
        "start: (A | B)+\nA.2: /a/\nB: /a+/\n",
        LarkOptions::default().parser(ParserKind::Lalr).lexer(LexerKind::Basic),
    )
    .unwrap();
    let tokens = parser.lex("aa", false).unwrap();
    assert_eq!(kinds(&tokens), vec!["A", "A"]);
}

#[test]
fn test_contextual_lexer_disambiguates() {
    // A and B overlap; only the terminal the parser expects is tried
    let grammar = "start: A B\nA: /[a-z]+/\nB: /[a-z0-9]+/\n%ignore \" \"\n";
    let contextual = Lark::new(grammar, LarkOptions::default().parser(ParserKind::Lalr)).unwrap();
    let tree = contextual.parse("abc def").unwrap();
    assert_eq!(kinds(&tree.child_tokens().cloned().collect::<Vec<_>>()), vec!["A", "B"]);

    let basic = Lark::new(
        grammar,
        LarkOptions::default().parser(ParserKind::Lalr).lexer(LexerKind::Basic),
    )
    .unwrap();
    assert!(basic.parse("abc def").is_err());
}

// ============================================================================
// lex() Tests
// ============================================================================

#[test]
fn test_lex_with_and_without_ignored() {
    let parser = Lark::new(
        "start: NAME+\nNAME: /[a-z]+/\nWS: \" \"+\n%ignore WS\n",
        LarkOptions::default().parser(ParserKind::Lalr),
    )
    .unwrap();
    assert_eq!(kinds(&parser.lex("ab cd", false).unwrap()), vec!["NAME", "NAME"]);
    assert_eq!(kinds(&parser.lex("ab  cd", true).unwrap()), vec!["NAME", "WS", "NAME"]);
}

#[test]
fn test_lex_error_position() {
    let parser = Lark::new(
        "start: NAME+\nNAME: /[a-z]+/\n%ignore \"\\n\"\n",
        LarkOptions::default().parser(ParserKind::Lalr),
    )
    .unwrap();
    let err = parser.lex("ab\ncd\ne!", false).unwrap_err();
    let LarkError::UnexpectedCharacters(e) = err else {
        panic!("expected UnexpectedCharacters");
    };
    assert_eq!((e.line, e.column), (3, 2));
    assert_eq!(e.char, '!');
}

// ============================================================================
// Position Tests
// ============================================================================

#[test]
fn test_token_positions_across_lines() {
    let parser = Lark::new(
        "start: (NAME | NL)+\nNAME: /[a-z]+/\nNL: /\\n/\n",
        LarkOptions::default().parser(ParserKind::Lalr),
    )
    .unwrap();
    let tokens = parser.lex("a\nbb\n", false).unwrap();
    assert_eq!(kinds(&tokens), vec!["NAME", "NL", "NAME", "NL"]);

    let bb = &tokens[2];
    assert_eq!((bb.line, bb.column), (2, 1));
    assert_eq!((bb.end_line, bb.end_column), (2, 3));
    assert_eq!((bb.start_pos, bb.end_pos), (2, 4));

    let nl = &tokens[1];
    assert_eq!((nl.line, nl.end_line), (1, 2));
}

#[test]
fn test_token_spans_cover_input() {
    let parser = Lark::new(
        "start: (WORD | NUMBER)+\n%import common.WORD\n%import common.NUMBER\n%import common.WS\n%ignore WS\n",
        LarkOptions::default().parser(ParserKind::Lalr),
    )
    .unwrap();
    let text = "abc 12 de\n  3.5";
    for tok in parser.lex(text, false).unwrap() {
        assert_eq!(&text[tok.start_pos..tok.end_pos], tok.value);
    }
}

// ============================================================================
// Callback Tests
// ============================================================================

#[test]
fn test_callback_collects_ignored_comments() {
    let comments = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&comments);

    let grammar = r#"
        start: NAME+
        NAME: /[a-z]+/
        COMMENT: /#[^\n]*/
        %import common.WS
        %ignore WS
        %ignore COMMENT
    "#;
    let parser = Lark::new(
        grammar,
        LarkOptions::default()
            .parser(ParserKind::Lalr)
            .lexer_callback("COMMENT", move |tok: Token| {
                sink.lock().unwrap().push(tok.value.clone());
                Outcome::Keep(tok)
            }),
    )
    .unwrap();

    let tree = parser.parse("a # first\nb\n# second\nc").unwrap();
    assert_eq!(tree.children.len(), 3);
    assert_eq!(*comments.lock().unwrap(), vec!["# first", "# second"]);
}

#[test]
fn test_callback_rewrites_token() {
    let parser = Lark::new(
        "start: NAME+\nNAME: /[a-z]+/\n%ignore \" \"\n",
        LarkOptions::default()
            .parser(ParserKind::Lalr)
            .lexer_callback("NAME", |tok: Token| {
                let upper = tok.value.to_uppercase();
                Outcome::Keep(tok.update(None, Some(upper.as_str())))
            }),
    )
    .unwrap();
    let tree = parser.parse("ab cd").unwrap();
    let got: Vec<&str> = tree.child_tokens().map(|t| t.value.as_str()).collect();
    assert_eq!(got, vec!["AB", "CD"]);
}

#[test]
fn test_callback_discards_token() {
    let parser = Lark::new(
        "start: NAME*\nNAME: /[a-z]+/\n%ignore \" \"\n",
        LarkOptions::default()
            .parser(ParserKind::Lalr)
            .lexer_callback("NAME", |tok: Token| {
                if tok.value == "skip" {
                    Outcome::Discard
                } else {
                    Outcome::Keep(tok)
                }
            }),
    )
    .unwrap();
    let tree = parser.parse("a skip b").unwrap();
    assert_eq!(tree.children.len(), 2);
}

// ============================================================================
// Flag Tests
// ============================================================================

#[test]
fn test_global_regex_flags() {
    let grammar = "start: \"select\" NAME\nNAME: /[a-z]+/\n%ignore \" \"\n";
    let parser = Lark::new(grammar, LarkOptions::default().parser(ParserKind::Lalr)).unwrap();
    assert!(parser.parse("SELECT Foo").is_err());

    let parser = Lark::new(
        grammar,
        LarkOptions::default()
            .parser(ParserKind::Lalr)
            .g_regex_flags("i"),
    )
    .unwrap();
    let tree = parser.parse("SELECT Foo").unwrap();
    assert_eq!(tree.child_tokens().next().unwrap().value, "Foo");
}

#[test]
fn test_use_bytes() {
    let grammar = "start: WORD+\nWORD: /[a-z]+/\n%ignore \" \"\n";
    let parser = Lark::new(
        grammar,
        LarkOptions::default()
            .parser(ParserKind::Lalr)
            .use_bytes(true),
    )
    .unwrap();
    let tree = parser.parse_bytes(b"abc def").unwrap();
    assert_eq!(tree.children.len(), 2);

    assert!(matches!(parser.parse("abc"), Err(LarkError::Configuration(_))));

    let text_parser = Lark::new(grammar, LarkOptions::default().parser(ParserKind::Lalr)).unwrap();
    assert!(text_parser.parse_bytes(b"abc").is_err());
}

#[test]
fn test_use_bytes_requires_ascii_grammar() {
    let err = Lark::new(
        "start: \"é\"\n",
        LarkOptions::default().parser(ParserKind::Lalr).use_bytes(true),
    )
    .unwrap_err();
    assert!(matches!(err, LarkError::Configuration(_)));
}

#[test]
fn test_use_bytes_rejects_unicode_classes() {
    let grammar = "start: UPPER\nUPPER: /\\p{Lu}+/\n";
    let err = Lark::new(grammar, LarkOptions::default().parser(ParserKind::Lalr).use_bytes(true)).unwrap_err();
    assert!(err.is_grammar_error(), "{}", err);

    let parser = Lark::new(grammar, LarkOptions::default().parser(ParserKind::Lalr)).unwrap();
    assert!(parser.parse("ÀB").is_ok());
}

#[test]
fn test_unicode_input() {
    let parser = Lark::new(
        "start: WORD+\nWORD: /\\w+/\n%ignore \" \"\n",
        LarkOptions::default().parser(ParserKind::Lalr),
    )
    .unwrap();
    let tree = parser.parse("héllo wörld").unwrap();
    let got: Vec<&str> = tree.child_tokens().map(|t| t.value.as_str()).collect();
    assert_eq!(got, vec!["héllo", "wörld"]);
}
