use expect_test::expect;
use tessera_grammar::{Action, GrammarTable, Language, Lexeme, Symbol};

use crate::rules::*;
use crate::{GenerateError, GrammarBuilder};

fn arithmetic(wrap: fn(i32, Rule) -> Rule) -> GrammarBuilder {
    GrammarBuilder::new("arithmetic").rule(
        "expr",
        choice([
            wrap(1, seq([field("left", sym("expr")), string("+"), field("right", sym("expr"))])),
            string("a"),
            string("b"),
        ]),
    )
}

fn symbol(table: &GrammarTable, name: &str) -> Symbol {
    let index = table.symbols.iter().position(|info| info.name == name).unwrap();
    Symbol(index as u16)
}

/// Actions on `symbol` in the state that reduces `expr + expr` at the end of
/// input.
fn actions_after_binary(table: &GrammarTable, symbol: Symbol) -> Vec<Action> {
    let state = table
        .states
        .iter()
        .find(|state| {
            state.actions.iter().any(|entry| {
                entry.symbol == Symbol::END
                    && entry.actions == [Action::Reduce { production: 0 }]
            })
        })
        .unwrap();
    state
        .actions
        .iter()
        .find(|entry| entry.symbol == symbol)
        .map(|entry| entry.actions.clone())
        .unwrap_or_default()
}

#[test]
fn symbols_are_numbered_terminals_first() {
    let table = arithmetic(prec_left).build().unwrap();
    let names: Vec<_> = table
        .symbols
        .iter()
        .map(|info| format!("{} {:?} named={} visible={}", info.name, info.kind, info.named, info.visible))
        .collect();
    expect![[r#"
        [
            "end End named=false visible=false",
            "ERROR Error named=true visible=true",
            "+ Terminal named=false visible=true",
            "a Terminal named=false visible=true",
            "b Terminal named=false visible=true",
            "expr NonTerminal named=true visible=true",
        ]
    "#]]
    .assert_debug_eq(&names);
    assert_eq!(table.fields, ["left", "right"]);
    assert_eq!(table.productions.len(), 3);
    assert_eq!(table.productions[0].precedence, 1);
    assert_eq!(table.productions[0].children[0].field.map(|field| field.0), Some(0));
    assert_eq!(table.productions[0].children[1].field, None);
}

#[test]
fn built_table_loads() {
    let table = arithmetic(prec_left).build().unwrap();
    let language = Language::from_table(table, None).unwrap();
    assert_eq!(language.name(), "arithmetic");
    assert!(language.state_count() > 3);
    let blob = language.table().to_blob().unwrap();
    assert!(Language::load(&blob).is_ok());
}

#[test]
fn left_associativity_reduces() {
    let table = arithmetic(prec_left).build().unwrap();
    let plus = symbol(&table, "+");
    assert_eq!(actions_after_binary(&table, plus), [Action::Reduce { production: 0 }]);
    assert!(table.states.iter().all(|state| state.actions.iter().all(|entry| entry.actions.len() == 1)));
}

#[test]
fn right_associativity_shifts() {
    let table = arithmetic(prec_right).build().unwrap();
    let plus = symbol(&table, "+");
    let actions = actions_after_binary(&table, plus);
    assert!(matches!(actions[..], [Action::Shift { .. }]));
}

#[test]
fn unresolved_conflicts_are_kept() {
    let table = arithmetic(|_, rule| rule).build().unwrap();
    let plus = symbol(&table, "+");
    let actions = actions_after_binary(&table, plus);
    assert!(matches!(actions[..], [Action::Shift { .. }, Action::Reduce { production: 0 }]));
}

#[test]
fn higher_precedence_wins() {
    let table = GrammarBuilder::new("calc")
        .rule(
            "expr",
            choice([
                prec_left(1, seq([sym("expr"), string("+"), sym("expr")])),
                prec_left(2, seq([sym("expr"), string("*"), sym("expr")])),
                string("n"),
            ]),
        )
        .build()
        .unwrap();
    let times = symbol(&table, "*");
    // `expr + expr . * ...` shifts.
    let shifts_times = table.states.iter().any(|state| {
        let reduces_sum = state.actions.iter().any(|entry| {
            entry.symbol == Symbol::END && entry.actions == [Action::Reduce { production: 0 }]
        });
        reduces_sum
            && state.actions.iter().any(|entry| {
                entry.symbol == times && matches!(entry.actions[..], [Action::Shift { .. }])
            })
    });
    assert!(shifts_times);
    assert!(table.states.iter().all(|state| state.actions.iter().all(|entry| entry.actions.len() == 1)));
}

#[test]
fn repetitions_become_hidden_helpers() {
    let table = GrammarBuilder::new("lists")
        .rule("list", seq([string("["), repeat(sym("item")), string("]")]))
        .rule("item", string("x"))
        .build()
        .unwrap();
    let helper = table.symbols.iter().find(|info| info.name == "_list_repeat1").unwrap();
    assert!(!helper.visible);
    assert!(!helper.named);
    let item = table.symbols.iter().find(|info| info.name == "item").unwrap();
    assert!(item.named);
    assert!(item.kind.is_terminal());
    // `[ ]` and `[ helper ]` for the list, two for the helper.
    assert_eq!(table.productions.len(), 4);
}

#[test]
fn tokens_compile_to_patterns() {
    let table = GrammarBuilder::new("numbers")
        .rule("source", repeat(sym("number")))
        .rule(
            "number",
            token(seq([pattern("[0-9]+"), optional(seq([string("."), pattern("[0-9]+")]))])),
        )
        .extra(pattern(r"\s"))
        .build()
        .unwrap();
    let number = symbol(&table, "number");
    let rule = table.terminals.iter().find(|rule| rule.symbol == number).unwrap();
    assert_eq!(rule.lexeme, Lexeme::Pattern(r"(?:[0-9]+)(?:\.(?:[0-9]+)|)".into()));
    assert_eq!(table.extras.len(), 1);

    let language = Language::from_table(table, None).unwrap();
    let matcher = language.matcher(number).unwrap();
    assert_eq!(matcher.longest_match(b"12.5 ", 0).len, Some(4));
}

#[test]
fn immediate_tokens_and_lexical_precedence() {
    let table = GrammarBuilder::new("calls")
        .rule("call", seq([sym("name"), immediate_token(string("(")), string(")")]))
        .rule("name", prec(-1, pattern("[a-z]+")))
        .build()
        .unwrap();
    let name = symbol(&table, "name");
    let name_rule = table.terminals.iter().find(|rule| rule.symbol == name).unwrap();
    assert_eq!(name_rule.precedence, -1);
    assert!(table.terminals.iter().any(|rule| rule.immediate && rule.lexeme == Lexeme::Literal("(".into())));
}

#[test]
fn aliases_rename_children() {
    let table = GrammarBuilder::new("aliases")
        .rule("source", seq([alias(sym("_inner"), "block", true), string(";")]))
        .rule("_inner", string("x"))
        .build()
        .unwrap();
    let block = symbol(&table, "block");
    assert_eq!(table.productions[0].children[0].alias, Some(block));
    assert!(table.symbols[block.index()].visible);
}

#[test]
fn externals_follow_terminals() {
    let table = GrammarBuilder::new("externals")
        .rule("source", seq([sym("text"), string(";")]))
        .external("text")
        .build()
        .unwrap();
    let text = symbol(&table, "text");
    assert_eq!(table.externals, [text]);
    assert!(table.lex_modes.iter().any(|mode| mode.externals == [true]));
}

#[test]
fn rejects_invalid_grammars() {
    assert_eq!(GrammarBuilder::new("empty").build(), Err(GenerateError::EmptyGrammar));
    assert_eq!(
        GrammarBuilder::new("undefined").rule("source", seq([sym("missing")])).build(),
        Err(GenerateError::UndefinedSymbol { name: "missing".into(), rule: "source".into() })
    );
    assert_eq!(
        GrammarBuilder::new("token").rule("source", string("x")).build(),
        Err(GenerateError::StartIsToken("source".into()))
    );
    assert_eq!(
        GrammarBuilder::new("duplicate")
            .rule("source", sym("item"))
            .rule("item", string("x"))
            .rule("item", string("y"))
            .build(),
        Err(GenerateError::DuplicateRule("item".into()))
    );
    assert_eq!(
        GrammarBuilder::new("extra")
            .rule("source", sym("item"))
            .rule("item", seq([string("x")]))
            .extra(sym("item"))
            .build(),
        Err(GenerateError::ExtraNotToken("item".into()))
    );
    assert_eq!(
        GrammarBuilder::new("nested")
            .rule("source", token(seq([string("x"), sym("source")])))
            .rule("other", string("y"))
            .build(),
        Err(GenerateError::StartIsToken("source".into()))
    );
    assert_eq!(
        GrammarBuilder::new("nested")
            .rule("source", sym("word"))
            .rule("word", token(seq([string("x"), sym("source")])))
            .build(),
        Err(GenerateError::TokenContainsSymbol("word".into()))
    );
}
