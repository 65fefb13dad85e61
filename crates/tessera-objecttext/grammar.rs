//! Rules of Object Text, the data language of the Halfling engine.

use tessera_generate::GrammarBuilder;
use tessera_generate::rules::*;

const ASSIGNMENT: i32 = 5;
const CALL: i32 = 4;
const UNARY: i32 = 3;
const PRODUCT: i32 = 2;
const SUM: i32 = 1;

const IDENTIFIER: &str = r"\.?[a-zA-Z0-9_][a-zA-Z0-9_.]*";

/// `<file.rules>/Some/Path`
fn file_path() -> String {
    format!("<[^>]+>(?:/{IDENTIFIER})*")
}

/// `~/Some/Path`, `../Sibling`, `^/0/Name`
fn internal_path() -> String {
    let segment = format!(r"(?:{IDENTIFIER}|\^|\.\.)");
    format!("(?:[.~]/|/)?{segment}(?:/{segment})*")
}

/// What may sit between a key and its list or block: `=`, or `:` followed
/// by the paths the value inherits from.
fn inheritance() -> Rule {
    optional(choice([string("="), seq([string(":"), repeat1(sym("extension"))])]))
}

fn separator() -> Rule {
    optional(choice([string(","), string(";")]))
}

fn number() -> Rule {
    let digits = || pattern(r"\d(?:_?\d)*");
    let signed = seq([optional(choice([string("-"), string("+")])), digits()]);
    let exponent = seq([choice([string("e"), string("E")]), signed]);
    let integer = choice([
        string("0"),
        seq([optional(string("0")), pattern("[1-9]"), optional(seq([optional(string("_")), digits()]))]),
    ]);
    let decimal = choice([
        seq([integer.clone(), string("."), optional(digits()), optional(exponent.clone())]),
        seq([string("."), digits(), optional(exponent.clone())]),
        seq([integer, exponent]),
        digits(),
    ]);
    token(choice([decimal, pattern(r"\d*\.?\d+[dr%]?")]))
}

fn quoted(open: &str) -> Rule {
    token(seq([string(open), pattern(r#"(?:[^"\\]|\\.)*"#), string("\"")]))
}

fn binary(precedence: i32, operators: [&str; 2]) -> Rule {
    prec_left(
        precedence,
        seq([
            field("left", sym("expression")),
            field("operator", choice(operators.map(string))),
            field("right", sym("expression")),
        ]),
    )
}

pub(crate) fn objecttext() -> GrammarBuilder {
    GrammarBuilder::new("objecttext")
        .rule("source_file", repeat1(prec(-1, sym("_assignment"))))
        .rule("_assignment", choice([sym("assignment"), sym("block"), sym("list")]))
        .rule(
            "assignment",
            prec(
                ASSIGNMENT,
                seq([field("key", sym("identifier")), string("="), field("value", sym("value"))]),
            ),
        )
        .rule(
            "list",
            prec_right(ASSIGNMENT, seq([field("key", sym("identifier")), inheritance(), sym("_list")])),
        )
        .rule(
            "block",
            prec_right(ASSIGNMENT, seq([field("key", sym("identifier")), inheritance(), sym("_block")])),
        )
        .rule(
            "_list_as_value",
            prec_right(0, seq([optional(field("key", sym("identifier"))), inheritance(), sym("_list")])),
        )
        .rule(
            "_block_as_value",
            prec_right(0, seq([optional(field("key", sym("identifier"))), inheritance(), sym("_block")])),
        )
        .rule("_list", seq([string("["), repeat(sym("_list_value")), string("]")]))
        .rule("_block", seq([string("{"), repeat(sym("_block_value")), string("}")]))
        .rule("_list_value", seq([choice([sym("_assignment"), sym("value")]), separator()]))
        .rule("_block_value", seq([sym("_assignment"), separator()]))
        .rule(
            "extension",
            seq([choice([pattern(file_path()), pattern(internal_path())]), optional(pattern("[;,]"))]),
        )
        .rule(
            "reference",
            choice([pattern(format!("&{}", file_path())), pattern(format!("&{}", internal_path()))]),
        )
        .rule("number", number())
        .rule(
            "expression",
            choice([
                sym("number"),
                sym("reference"),
                sym("unary_expression"),
                sym("binary_expression"),
                sym("function_call"),
            ]),
        )
        .rule(
            "unary_expression",
            choice([
                prec_left(UNARY, seq([string("("), sym("expression"), string(")")])),
                prec_left(UNARY, seq([string("-"), sym("expression")])),
            ]),
        )
        .rule("binary_expression", choice([binary(PRODUCT, ["*", "/"]), binary(SUM, ["+", "-"])]))
        // Engine-side these are bare words handed to an expression evaluator.
        .rule(
            "function_call",
            prec_left(
                CALL,
                seq([
                    sym("identifier"),
                    immediate_token(string("(")),
                    repeat1(seq([sym("expression"), optional(string(","))])),
                    string(")"),
                ]),
            ),
        )
        .rule("bool", choice([string("true"), string("false")]))
        .rule("identifier", token(prec(-2, pattern(IDENTIFIER))))
        .rule(
            "value",
            choice([
                alias(quoted("\""), "string", true),
                alias(quoted("@\""), "verbatim", true),
                alias(sym("_list_as_value"), "list", true),
                alias(sym("_block_as_value"), "block", true),
                sym("expression"),
                sym("identifier"),
                sym("bool"),
                prec(10, sym("bare_string")),
            ]),
        )
        .rule(
            "comment",
            token(choice([
                seq([string("//"), pattern(r"[^\n]*")]),
                seq([string("/*"), pattern(r"(?:[^*]|\*+[^/*])*\*+"), string("/")]),
            ])),
        )
        .extra(pattern(r"\s"))
        .extra(sym("comment"))
        .external("bare_string")
        .external("error_sentinel")
}
