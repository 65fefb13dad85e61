use salsa::{Accumulator as _, Database};
use tessera_errors::{Diagnostic, TextRange, syntax_errors};
use tessera_grammar::Language;
use tessera_inputs::File;
use tessera_parse::{ParseOptions, Parser};
use tessera_syntax::Tree;

/// A file together with the grammar and limits it is parsed with.
#[salsa::input(debug)]
pub(crate) struct Document {
    pub(crate) file: File,
    #[returns(ref)]
    pub(crate) language: Language,
    #[returns(ref)]
    pub(crate) options: ParseOptions,
}

/// `None` when the parse gave up on a resource limit.
#[salsa::tracked(returns(ref), no_eq)]
pub(crate) fn parse_file(db: &dyn Database, document: Document) -> Option<Tree> {
    let file = document.file(db);
    let mut parser = Parser::new(document.language(db).clone());
    parser.set_options(document.options(db).clone());
    match parser.parse_str(file.text(db), None) {
        Ok(tree) => Some(tree),
        Err(err) => {
            tracing::warn!(path = %file.path(db), "{err}");
            Diagnostic::error(err.to_string(), TextRange::empty(0.into())).accumulate(db);
            None
        }
    }
}

#[salsa::tracked]
pub(crate) fn check_file(db: &dyn Database, document: Document) {
    let Some(tree) = parse_file(db, document) else {
        return;
    };
    let text = document.file(db).text(db);
    for diagnostic in syntax_errors(&tree.root_node(), text.as_bytes()) {
        diagnostic.accumulate(db);
    }
}

#[cfg(test)]
mod tests {
    use salsa::DatabaseImpl;
    use tessera_errors::Diagnostic;
    use tessera_inputs::File;
    use tessera_errors::syntax_errors;
    use tessera_parse::ParseOptions;

    use super::{Document, check_file, parse_file};

    fn document(db: &DatabaseImpl, text: &str, options: ParseOptions) -> Document {
        let file = File::new(db, "part.rules".into(), text.to_owned());
        Document::new(db, file, tessera_objecttext::language().unwrap(), options)
    }

    #[test]
    fn syntax_errors_are_accumulated() {
        let db = DatabaseImpl::default();
        let text = "A = [1, 2";
        let document = document(&db, text, ParseOptions::default());
        let tree = parse_file(&db, document).clone().unwrap();
        assert!(tree.root_node().has_error());
        // Memoized: the same tree comes back.
        assert_eq!(parse_file(&db, document).as_ref(), Some(&tree));

        let diagnostics = check_file::accumulated::<Diagnostic>(&db, document);
        assert!(!diagnostics.is_empty());
        assert_eq!(diagnostics.len(), syntax_errors(&tree.root_node(), text.as_bytes()).len());
    }

    #[test]
    fn limits_are_reported() {
        let db = DatabaseImpl::default();
        let options = ParseOptions { max_operations: Some(1), ..ParseOptions::default() };
        let document = document(&db, "A = 3 * 2", options);
        assert!(parse_file(&db, document).is_none());

        let diagnostics = check_file::accumulated::<Diagnostic>(&db, document);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message(), "parse aborted: operation limit reached");
    }

    #[test]
    fn clean_files_have_no_diagnostics() {
        let db = DatabaseImpl::default();
        let document = document(&db, "Name = \"Thruster\"", ParseOptions::default());
        assert!(check_file::accumulated::<Diagnostic>(&db, document).is_empty());
    }
}
