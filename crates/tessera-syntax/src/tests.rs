use expect_test::expect;
use tessera_grammar::{
    FieldId, GrammarTable, Language, LexMode, Lexeme, ParseState, Symbol, SymbolInfo, SymbolKind,
    TerminalRule,
};

use crate::{
    GreenNode, GreenTrivia, InputEdit, LeafInfo, NodeFlags, NodeInfo, TriviaPiece, Tree,
    WalkEvent,
};

const A: Symbol = Symbol(2);
const PLUS: Symbol = Symbol(3);
const WS: Symbol = Symbol(4);
const EXPR: Symbol = Symbol(5);
const LEFT: FieldId = FieldId(0);
const RIGHT: FieldId = FieldId(1);

fn language() -> Language {
    let symbol = |name: &str, kind, named, visible| SymbolInfo { name: name.into(), kind, named, visible };
    let terminal = |symbol, lexeme| TerminalRule { symbol, lexeme, precedence: 0, immediate: false };
    let table = GrammarTable {
        name: "arith".into(),
        symbols: vec![
            symbol("end", SymbolKind::End, false, false),
            symbol("ERROR", SymbolKind::Error, true, true),
            symbol("a", SymbolKind::Terminal, false, true),
            symbol("+", SymbolKind::Terminal, false, true),
            symbol("_ws", SymbolKind::Terminal, false, false),
            symbol("expr", SymbolKind::NonTerminal, true, true),
        ],
        fields: vec!["left".into(), "right".into()],
        terminals: vec![
            terminal(A, Lexeme::Literal("a".into())),
            terminal(PLUS, Lexeme::Literal("+".into())),
            terminal(WS, Lexeme::Pattern(r"\s+".into())),
        ],
        extras: vec![WS],
        externals: vec![],
        productions: vec![],
        states: vec![ParseState { actions: vec![], gotos: vec![], lex_mode: 0 }],
        lex_modes: vec![LexMode { terminals: vec![A, PLUS], externals: vec![] }],
        start_state: 0,
    };
    Language::from_table(table, None).unwrap()
}

fn token(symbol: Symbol, len: u32, trailing: u32) -> GreenNode {
    let trailing = match trailing {
        0 => GreenTrivia::empty(),
        len => GreenTrivia::new(&[TriviaPiece::new(WS, len.into())]),
    };
    GreenNode::leaf(LeafInfo {
        symbol,
        kind: symbol,
        flags: NodeFlags::VISIBLE,
        leading: GreenTrivia::empty(),
        text_len: len.into(),
        trailing,
        lookahead: 1.into(),
        parse_state: 0,
        lex_mode: 0,
        next_lex_mode: 0,
    })
}

fn expr(children: Vec<(Option<FieldId>, GreenNode)>) -> GreenNode {
    let info = NodeInfo {
        symbol: EXPR,
        kind: EXPR,
        flags: NodeFlags::NAMED | NodeFlags::VISIBLE,
        parse_state: 0,
        dynamic_precedence: 0,
    };
    GreenNode::node(info, children)
}

/// `a + a`
fn sum_tree() -> Tree {
    let left = expr(vec![(None, token(A, 1, 1))]);
    let right = expr(vec![(None, token(A, 1, 0))]);
    let root = expr(vec![(Some(LEFT), left), (None, token(PLUS, 1, 1)), (Some(RIGHT), right)]);
    Tree::new(root, language())
}

#[test]
fn sexp_quotes_anonymous_nodes() {
    let tree = sum_tree();
    expect![[r#"(expr (expr "a") "+" (expr "a"))"#]].assert_eq(&tree.to_sexp());
}

#[test]
fn sexp_marks_missing_leaves() {
    let missing = GreenNode::missing(A, A, NodeFlags::VISIBLE, 0);
    let root = expr(vec![
        (Some(LEFT), expr(vec![(None, token(A, 1, 0))])),
        (None, token(PLUS, 1, 0)),
        (Some(RIGHT), expr(vec![(None, missing)])),
    ]);
    let tree = Tree::new(root, language());
    expect![[r#"(expr (expr "a") "+" (expr (MISSING "a")))"#]].assert_eq(&tree.to_sexp());
    assert!(tree.root_node().has_error());
    let last = tree.root_node().descendants().last().unwrap();
    assert!(last.is_missing());
    assert_eq!(last.text_range(), crate::TextRange::empty(2.into()));
}

#[test]
fn navigation() {
    let tree = sum_tree();
    let source = b"a + a";
    let root = tree.root_node();

    assert_eq!(root.kind(), "expr");
    assert_eq!(root.child_count(), 3);
    assert_eq!(root.named_child_count(), 2);

    let right = root.child_by_field_name("right").unwrap();
    assert_eq!(right.utf8_text(source).unwrap(), "a");
    assert_eq!(right.start_byte(), 4);
    assert_eq!(right.field_name(), Some("right"));
    assert_eq!(root.field_name_for_child(1), None);

    let plus = right.prev_sibling().unwrap();
    assert_eq!(plus.kind(), "+");
    assert!(!plus.is_named());
    assert_eq!(plus.text_range(), crate::TextRange::new(2.into(), 4.into()));
    assert_eq!(plus.trimmed_range(), crate::TextRange::new(2.into(), 3.into()));

    let left = right.prev_named_sibling().unwrap();
    assert_eq!(left.field_name(), Some("left"));
    assert_eq!(left.next_named_sibling(), Some(right.clone()));
    assert_eq!(right.parent(), Some(root.clone()));
    assert_eq!(root.child_by_field_name("nope"), None);
}

#[test]
fn descendant_lookup_prefers_later_node_at_boundary() {
    let tree = sum_tree();
    let root = tree.root_node();

    let node = root.descendant_for_byte_range(4, 5).unwrap();
    assert_eq!(node.kind(), "a");
    assert_eq!(node.start_byte(), 4);

    // `+` is anonymous, so the named lookup stops at its parent.
    let node = root.named_descendant_for_byte_range(2, 2).unwrap();
    assert_eq!(node, root);

    let node = root.descendant_at_offset(2).unwrap();
    assert_eq!(node.kind(), "+");

    let node = root.descendant_for_byte_range(0, 3).unwrap();
    assert_eq!(node, root);
    assert_eq!(root.descendant_for_byte_range(3, 9), None);
}

#[test]
fn preorder_can_skip_subtrees() {
    let tree = sum_tree();
    let mut walk = tree.root_node().preorder();
    let mut entered = Vec::new();
    while let Some(event) = walk.next() {
        if let WalkEvent::Enter(node) = event {
            entered.push(format!("{}@{}", node.kind(), node.start_byte()));
            if node.kind() == "expr" && node.start_byte() == 0 && node.parent().is_some() {
                walk.skip_subtree();
            }
        }
    }
    assert_eq!(entered, ["expr@0", "expr@0", "+@2", "expr@4", "a@4"]);
}

#[test]
fn edit_produces_new_version() {
    let tree = sum_tree();
    let old_root = tree.root_node();

    let edit = InputEdit::replace("a + a", 4..5, "b");
    let edited = tree.edit(&edit);

    assert_eq!(edited.version(), tree.version() + 1);
    assert!(tree.is_current(&old_root));
    assert!(!edited.is_current(&old_root));
    assert!(edited.is_current(&edited.root_node()));

    // The left operand lies outside the edit and its lookahead.
    let left = edited.root_node().child(0).unwrap();
    assert!(!left.has_changes());
    assert!(left.green().ptr_eq(old_root.child(0).unwrap().green()));
    assert!(edited.root_node().child(2).unwrap().has_changes());

    assert!(!tree.root_green().has_changes());
    assert!(tree.structurally_eq(&edited));
}

#[test]
fn trees_are_equal_only_to_their_copies() {
    let tree = sum_tree();
    assert_eq!(tree, tree.clone());
    assert_ne!(tree, sum_tree());
    assert_ne!(tree, tree.edit(&InputEdit::replace("a + a", 4..5, "b")));
    assert_ne!(tree, tree.clone().with_version(7));
    assert_eq!(tree.clone().with_version(7).version(), 7);
}

#[test]
fn noop_edit_keeps_structure() {
    let tree = sum_tree();
    let edit = InputEdit::replace("a + a", 2..2, "");
    assert!(edit.is_empty());
    let edited = tree.edit(&edit);
    assert!(edited.structurally_eq(&tree));
    assert_eq!(edited.to_sexp(), tree.to_sexp());
}
