use proptest::prelude::*;
use tessera_parse::Parser;
use tessera_syntax::{InputEdit, Tree};

const PART: &str = "\
// Thruster
Part : <ships/base.rules>/Part
{
    ID = cosmoteer.thruster
    Size = [2, 1]; Cost = &../BaseCost * 2
    Thrust = max(10, -(3 + 4)) / 2
    /* rated
       in kN */
    Description = Pushes the ship forward
    Verbatim = @\"C:\\\\path\"
    Flags = [ dark red, blue ]
    Enabled = true
}
";

fn parser() -> Parser {
    Parser::new(tessera_objecttext::language().unwrap())
}

/// The root spans the whole text, leading comment included.
fn assert_covers(tree: &Tree, text: &str) {
    let range = tree.root_node().text_range();
    assert_eq!(u32::from(range.start()), 0);
    assert_eq!(u32::from(range.end()) as usize, text.len());
}

#[test]
fn document_parses_cleanly() {
    let tree = parser().parse_str(PART, None).unwrap();
    assert!(!tree.root_node().has_error(), "{}", tree.to_sexp());
    assert_covers(&tree, PART);
}

fn edits() -> impl Strategy<Value = (usize, usize, String)> {
    (0..=PART.len(), 0..8usize, r#"[a-z0-9 =\n/*"&(),.\[\]{}:;-]{0,6}"#)
        .prop_map(|(start, len, insert)| (start, (start + len).min(PART.len()), insert))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn incremental_parse_matches_fresh_parse((start, end, insert) in edits()) {
        let parser = parser();
        let tree = parser.parse_str(PART, None).unwrap();

        let edit = InputEdit::replace(PART, start..end, &insert);
        let mut updated = PART.to_owned();
        updated.replace_range(start..end, &insert);
        let reparsed = parser.parse_str(&updated, Some(&tree.edit(&edit))).unwrap();
        let fresh = parser.parse_str(&updated, None).unwrap();

        prop_assert_eq!(reparsed.to_sexp(), fresh.to_sexp());
        prop_assert!(reparsed.structurally_eq(&fresh));
        assert_covers(&reparsed, &updated);
    }
}
