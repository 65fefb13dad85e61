//! Boundary contract for caller-supplied lexing extensions.

/// Cursor handed to an external scanner.
///
/// The scanner may only look at the char under the cursor, move forward one
/// char at a time and mark where its token ends. Everything the cursor was
/// asked to look at counts as inspected for incremental reuse.
pub trait ScanCursor {
    /// The char under the cursor, `None` at end of input.
    fn lookahead(&mut self) -> Option<char>;

    /// Moves past the current char.
    fn advance(&mut self);

    /// Ends the token at the current position. Without a call, the token ends
    /// where the cursor stops.
    fn mark_end(&mut self);

    fn is_eof(&mut self) -> bool {
        self.lookahead().is_none()
    }

    /// Absolute byte offset of the cursor.
    fn position(&self) -> usize;
}

/// A lexing extension for tokens the table's patterns cannot express.
///
/// Implementations must be reentrant: the same `Language` may be used by
/// several parses on different threads at once.
pub trait ExternalScanner: Send + Sync {
    /// Tries to recognize one external token. `valid` is indexed by external
    /// token index. Returns the index of the recognized token.
    fn scan(&self, cursor: &mut dyn ScanCursor, valid: &[bool]) -> Option<usize>;
}
