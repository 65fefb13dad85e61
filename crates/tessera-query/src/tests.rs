use expect_test::{Expect, expect};
use tessera_generate::GrammarBuilder;
use tessera_generate::rules::*;
use tessera_grammar::Language;
use tessera_parse::Parser;
use tessera_syntax::Tree;

use crate::{Query, QueryCursor, QueryErrorKind};

fn language() -> Language {
    language_named("arithmetic")
}

fn language_named(name: &str) -> Language {
    let table = GrammarBuilder::new(name)
        .rule(
            "expr",
            choice([
                prec_left(1, seq([field("left", sym("expr")), string("+"), field("right", sym("expr"))])),
                sym("name"),
                sym("comment_block"),
            ]),
        )
        .rule("name", pattern("[a-z]+"))
        .rule("comment_block", seq([string("{"), repeat(sym("name")), string("}")]))
        .extra(pattern(r"\s"))
        .build()
        .unwrap();
    Language::from_table(table, None).unwrap()
}

fn parse(text: &str) -> Tree {
    Parser::new(language()).parse_str(text, None).unwrap()
}

/// One line per match: pattern index, then `@capture=text` pairs.
fn check(query: &str, text: &str, expect: Expect) {
    let query = Query::new(&language(), query).unwrap();
    let tree = parse(text);
    let mut out = String::new();
    for found in QueryCursor::new().matches(&query, &tree.root_node(), text.as_bytes()) {
        out.push_str(&found.pattern_index.to_string());
        for capture in &found.captures {
            let name = &query.capture_names()[capture.index as usize];
            let text = capture.node.utf8_text(text.as_bytes()).unwrap();
            out.push_str(&format!(" @{name}={text}"));
        }
        out.push('\n');
    }
    expect.assert_eq(&out);
}

fn error(query: &str) -> (QueryErrorKind, usize, u32, u32) {
    let err = Query::new(&language(), query).unwrap_err();
    (err.kind, err.offset, err.row, err.column)
}

#[test]
fn field_capture() {
    check(
        "(expr right: (_) @rhs)",
        "a+b",
        expect![[r#"
            0 @rhs=b
        "#]],
    );
}

#[test]
fn every_placement_is_a_match() {
    check(
        "(expr (expr) @operand)",
        "a + b",
        expect![[r#"
            0 @operand=a
            0 @operand=b
        "#]],
    );
}

#[test]
fn anonymous_nodes_and_wildcards() {
    check(
        r#"(expr "+" @op) (name) @name"#,
        "x + y",
        expect![[r#"
            0 @op=+
            1 @name=x
            1 @name=y
        "#]],
    );
    check(
        "(expr left: _ @left)",
        "x + y",
        expect![[r#"
            0 @left=x
        "#]],
    );
}

#[test]
fn negated_fields() {
    check(
        "(expr !left) @leaf",
        "x + y",
        expect![[r#"
            0 @leaf=x
            0 @leaf=y
        "#]],
    );
}

#[test]
fn alternations() {
    check(
        r#"[(name) "+"] @token"#,
        "x+y",
        expect![[r#"
            0 @token=x
            0 @token=+
            0 @token=y
        "#]],
    );
}

#[test]
fn quantifiers_are_greedy() {
    check(
        r#"(comment_block "{" (name)* @names "}")"#,
        "{ a b c }",
        expect![[r#"
            0 @names=a @names=b @names=c
        "#]],
    );
    check(
        "(comment_block (name)? @first)",
        "{ a b }",
        expect![[r#"
            0 @first=a
        "#]],
    );
    check(
        "(comment_block (name)+ @names)",
        "{ }",
        expect![""],
    );
}

#[test]
fn predicates_filter_matches() {
    check(
        r#"((name) @n (#eq? @n "b"))"#,
        "a + b + b",
        expect![[r#"
            0 @n=b
            0 @n=b
        "#]],
    );
    check(
        r#"((name) @n (#not-match? @n "^a"))"#,
        "ab + ba",
        expect![[r#"
            0 @n=ba
        "#]],
    );
    check(
        r#"((name) @n (#any-of? @n "x" "z"))"#,
        "x + y + z",
        expect![[r#"
            0 @n=x
            0 @n=z
        "#]],
    );
    check(
        "(expr left: (_) @l right: (_) @r (#eq? @l @r))",
        "a + a + b",
        expect![[r#"
            0 @l=a @r=a
        "#]],
    );
}

#[test]
fn sibling_groups() {
    check(
        "((name) @first (name) @second)",
        "{ a b c }",
        expect![[r#"
            0 @first=a @second=b
            0 @first=a @second=c
            0 @first=b @second=c
        "#]],
    );
}

#[test]
fn error_and_missing_nodes() {
    check(
        "(MISSING) @missing",
        "a +",
        expect![[r#"
            0 @missing=
        "#]],
    );
    check(
        "(ERROR) @error",
        "a b",
        expect![[r#"
            0 @error=a
        "#]],
    );
}

#[test]
fn comments_are_ignored() {
    check(
        "; names only\n(name) @n ; trailing\n",
        "q",
        expect![[r#"
            0 @n=q
        "#]],
    );
}

#[test]
fn byte_range_limits_roots() {
    let query = Query::new(&language(), "(name) @n").unwrap();
    let text = "aa + bb + cc";
    let tree = parse(text);
    let mut cursor = QueryCursor::new();
    cursor.set_byte_range(5..6);
    let names: Vec<String> = cursor
        .captures(&query, &tree.root_node(), text.as_bytes())
        .map(|capture| capture.node.utf8_text(text.as_bytes()).unwrap().to_owned())
        .collect();
    assert_eq!(names, ["bb"]);
}

#[test]
fn matches_are_lazy_and_restartable() {
    let query = Query::new(&language(), "(name) @n").unwrap();
    let text = "a + b + c";
    let tree = parse(text);
    let cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, &tree.root_node(), text.as_bytes());
    let first = matches.next().unwrap();
    let rest: Vec<_> = matches.clone().collect();
    assert_eq!(rest.len(), 2);
    assert_eq!(matches.collect::<Vec<_>>(), rest);

    let again: Vec<_> = cursor.matches(&query, &tree.root_node(), text.as_bytes()).collect();
    assert_eq!(again[0], first);
    assert_eq!(again.len(), 3);
}

#[test]
fn separately_loaded_languages_match() {
    let query = Query::new(&language(), "(expr right: (_) @rhs)").unwrap();
    let text = "a+b";
    let tree = Parser::new(language()).parse_str(text, None).unwrap();
    assert_eq!(QueryCursor::new().captures(&query, &tree.root_node(), text.as_bytes()).count(), 1);

    let other = Parser::new(language_named("other")).parse_str(text, None).unwrap();
    assert_eq!(QueryCursor::new().captures(&query, &other.root_node(), text.as_bytes()).count(), 0);
}

#[test]
fn query_metadata() {
    let query = Query::new(&language(), "(name) @a\n(expr) @b @a").unwrap();
    assert_eq!(query.pattern_count(), 2);
    assert_eq!(query.capture_names(), ["a", "b"]);
    assert_eq!(query.capture_index_for_name("b"), Some(1));
    assert_eq!(query.start_byte_for_pattern(1), Some(10));
}

#[test]
fn reports_errors_with_positions() {
    assert_eq!(error("(nope)"), (QueryErrorKind::NodeType, 1, 0, 1));
    assert_eq!(error("\n(expr nope: (_))"), (QueryErrorKind::Field, 7, 1, 6));
    assert_eq!(error("(expr !nope)"), (QueryErrorKind::Field, 6, 0, 6));
    assert_eq!(error("(expr"), (QueryErrorKind::Syntax, 0, 0, 0));
    assert_eq!(error(r#""/""#), (QueryErrorKind::NodeType, 0, 0, 0));
    assert_eq!(error("((name) (#eq? @x \"a\"))"), (QueryErrorKind::Capture, 14, 0, 14));
    assert_eq!(error("((name) @n (#frob? @n))"), (QueryErrorKind::Predicate, 11, 0, 11));
    assert_eq!(error(r#"((name) @n (#match? @n "("))"#).0, QueryErrorKind::Regex);

    let err = Query::new(&language(), "(nope)").unwrap_err();
    assert_eq!(err.to_string(), "invalid node type at 1:2: unknown node type `nope`");
}
