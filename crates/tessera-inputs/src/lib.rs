pub use line_index::LineIndex;
use text_size::TextSize;

#[salsa::input(debug)]
pub struct File {
    #[returns(ref)]
    pub path: camino::Utf8PathBuf,
    #[returns(deref)]
    pub text: String,
}

#[salsa::tracked]
impl File {
    #[salsa::tracked(returns(ref), no_eq)]
    pub fn line_index(self, db: &dyn salsa::Database) -> LineIndex {
        LineIndex::new(self.text(db))
    }
}

impl File {
    /// One-based `line:column` of `offset`, columns counted in chars.
    pub fn location(self, db: &dyn salsa::Database, offset: usize) -> String {
        let text = self.text(db);
        let offset = offset.min(text.len());
        let position = self.line_index(db).line_col(TextSize::new(offset as u32));
        let line_start = offset - position.col as usize;
        let column = text.get(line_start..offset).map_or(position.col as usize, |prefix| prefix.chars().count());
        format!("{}:{}", position.line + 1, column + 1)
    }
}

#[cfg(test)]
mod tests {
    use salsa::DatabaseImpl;

    use super::*;

    #[test]
    fn locations_are_one_based() {
        let db = DatabaseImpl::default();
        let file = File::new(&db, "a.txt".into(), "ab\nçd\n".to_owned());
        assert_eq!(file.location(&db, 0), "1:1");
        assert_eq!(file.location(&db, 3), "2:1");
        assert_eq!(file.location(&db, 5), "2:2");
        assert_eq!(file.location(&db, 100), "3:1");
    }
}
