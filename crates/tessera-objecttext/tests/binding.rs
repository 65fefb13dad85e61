use expect_test::expect;
use tessera_grammar::{FORMAT_VERSION, Language, LoadError};
use tessera_parse::Parser;
use tessera_query::{Query, QueryCursor};

#[test]
fn can_load_grammar() {
    let language = tessera_objecttext::language().expect("Error loading Object Text grammar");
    assert_eq!(language.name(), "objecttext");
    let parser = Parser::new(language.clone());
    assert_eq!(parser.language(), &language);
}

#[test]
fn rejects_incompatible_blob() {
    let language = tessera_objecttext::language().unwrap();
    let blob = language.table().to_blob_with_version(FORMAT_VERSION + 1).unwrap();
    let err = Language::load(&blob).unwrap_err();
    assert!(matches!(err, LoadError::IncompatibleVersion { found, .. } if found == FORMAT_VERSION + 1));
}

fn parse(text: &str) -> String {
    let language = tessera_objecttext::language().unwrap();
    Parser::new(language).parse_str(text, None).unwrap().to_sexp()
}

#[test]
fn bare_strings() {
    expect![[r#"(source_file (assignment (identifier) "=" (value (bare_string))))"#]]
        .assert_eq(&parse("Description = Pushes the ship forward"));
    expect![[r#"(source_file (assignment (identifier) "=" (value (identifier))))"#]]
        .assert_eq(&parse("ID = cosmoteer.thruster"));
    expect![[r#"(source_file (list (identifier) "=" "[" (value (bare_string)) "," (value (identifier)) "]"))"#]]
        .assert_eq(&parse("Colors = [ dark red, blue ]"));
}

#[test]
fn strings_and_numbers() {
    expect![[r#"(source_file (assignment (identifier) "=" (value (string))) (assignment (identifier) "=" (value (expression (number)))))"#]]
        .assert_eq(&parse("Name = \"Thruster\"\nMass = 1.25"));
}

#[test]
fn expressions() {
    expect![[r#"(source_file (assignment (identifier) "=" (value (expression (binary_expression (expression (number)) "*" (expression (number)))))))"#]]
        .assert_eq(&parse("A = 3 * 2"));
    expect![[r#"(source_file (assignment (identifier) "=" (value (expression (binary_expression (expression (reference)) "*" (expression (number)))))))"#]]
        .assert_eq(&parse("A = &../B * 2"));
    expect![[r#"(source_file (assignment (identifier) "=" (value (expression (binary_expression (expression (reference)) "+" (expression (number)))))))"#]]
        .assert_eq(&parse("Cost = &~/A + 1"));
    expect![[r#"(source_file (assignment (identifier) "=" (value (expression (unary_expression "-" (expression (unary_expression "(" (expression (binary_expression (expression (number)) "+" (expression (number)))) ")")))))))"#]]
        .assert_eq(&parse("A = -(1 + 2)"));
    expect![[r#"(source_file (assignment (identifier) "=" (value (expression (binary_expression (expression (function_call (identifier) "(" (expression (number)) ")")) "/" (expression (number)))))))"#]]
        .assert_eq(&parse("A = f(1) / 2"));
}

#[test]
fn parses_a_part_definition() {
    let text = "\
Part : <ships/base.rules>/Part
{
    ID = cosmoteer.thruster
    Size = [2, 1]
    // inherited from the base part
    Cost = &../BaseCost * 2
    Description = Pushes the ship forward
}
";
    let language = tessera_objecttext::language().unwrap();
    let tree = Parser::new(language.clone()).parse_str(text, None).unwrap();
    assert!(!tree.root_node().has_error(), "{}", tree.to_sexp());

    let query = Query::new(&language, "(assignment key: (identifier) @key value: (value (bare_string)))").unwrap();
    let keys: Vec<&str> = QueryCursor::new()
        .captures(&query, &tree.root_node(), text.as_bytes())
        .map(|capture| capture.node.utf8_text(text.as_bytes()).unwrap())
        .collect();
    assert_eq!(keys, ["Description"]);
}
