use tessera_grammar::{ScanCursor, decode_char};

/// Cursor handed to external scanners. Remembers the furthest byte the
/// scanner looked at.
pub(crate) struct Cursor<'a> {
    text: &'a [u8],
    position: usize,
    marked_end: Option<usize>,
    inspected_end: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(text: &'a [u8], position: usize) -> Self {
        Self { text, position, marked_end: None, inspected_end: position }
    }

    /// End of the recognized token: the marked end, or where the cursor
    /// stopped.
    pub(crate) fn token_end(&self) -> usize {
        self.marked_end.unwrap_or(self.position)
    }

    pub(crate) fn inspected_end(&self) -> usize {
        self.inspected_end
    }
}

impl ScanCursor for Cursor<'_> {
    fn lookahead(&mut self) -> Option<char> {
        match decode_char(self.text, self.position) {
            Some((c, width)) => {
                self.inspected_end = self.inspected_end.max(self.position + width);
                Some(c)
            }
            None => {
                self.inspected_end = self.inspected_end.max(self.text.len());
                None
            }
        }
    }

    fn advance(&mut self) {
        if let Some((_, width)) = decode_char(self.text, self.position) {
            self.position += width;
            self.inspected_end = self.inspected_end.max(self.position);
        }
    }

    fn mark_end(&mut self) {
        self.marked_end = Some(self.position);
    }

    fn position(&self) -> usize {
        self.position
    }
}
