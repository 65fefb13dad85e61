use expect_test::{Expect, expect};
use tessera_generate::GrammarBuilder;
use tessera_generate::rules::*;
use tessera_grammar::Language;
use tessera_parse::Parser;

use crate::{Diagnostic, Renderer, syntax_errors};

fn diagnostics(text: &str) -> Vec<Diagnostic> {
    let table = GrammarBuilder::new("arithmetic")
        .rule(
            "expr",
            choice([
                prec_left(1, seq([field("left", sym("expr")), string("+"), field("right", sym("expr"))])),
                string("a"),
                string("b"),
            ]),
        )
        .extra(pattern(r"\s"))
        .build()
        .unwrap();
    let parser = Parser::new(Language::from_table(table, None).unwrap());
    let tree = parser.parse_str(text, None).unwrap();
    syntax_errors(&tree.root_node(), text.as_bytes())
}

fn check(text: &str, expect: Expect) {
    let actual: String = diagnostics(text)
        .iter()
        .map(|diagnostic| format!("{:?} {}\n", diagnostic.range(), diagnostic.message()))
        .collect();
    expect.assert_eq(&actual);
}

#[test]
fn valid_input_has_no_diagnostics() {
    check("a + b", expect![""]);
}

#[test]
fn reports_missing_tokens() {
    check(
        "a +",
        expect![[r#"
            3..3 missing `a`
        "#]],
    );
}

#[test]
fn reports_skipped_input() {
    check(
        "a+$a",
        expect![[r#"
            2..3 unexpected `$`
        "#]],
    );
    check(
        "a a",
        expect![[r#"
            0..1 unexpected `a`
        "#]],
    );
}

#[test]
fn renders_with_source() {
    let text = "a +";
    let diagnostics = diagnostics(text);
    let rendered = diagnostics[0].render(&Renderer::plain(), "sum.txt", text).to_string();
    assert!(rendered.contains("error: missing `a`"), "{rendered}");
    assert!(rendered.contains("sum.txt"), "{rendered}");
}
