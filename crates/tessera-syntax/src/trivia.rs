use tessera_grammar::Symbol;
use text_size::TextSize;
use triomphe::ThinArc;

/// Trivia attached to one side of a leaf.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct GreenTrivia {
    ptr: Option<ThinArc<TextSize, TriviaPiece>>,
}

impl std::fmt::Debug for GreenTrivia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GreenTrivia")
            .field("pieces", &self.pieces())
            .field("total_len", &self.len())
            .finish()
    }
}

impl GreenTrivia {
    pub fn new(pieces: &[TriviaPiece]) -> Self {
        if pieces.is_empty() {
            return Self::empty();
        }
        let total_len = pieces.iter().map(|piece| piece.len).sum();
        Self { ptr: Some(ThinArc::from_header_and_slice(total_len, pieces)) }
    }

    pub const fn empty() -> Self {
        Self { ptr: None }
    }

    pub fn len(&self) -> TextSize {
        match self.ptr {
            None => TextSize::new(0),
            Some(ref ptr) => ptr.header.header,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == TextSize::new(0)
    }

    pub fn pieces(&self) -> &[TriviaPiece] {
        match &self.ptr {
            None => &[],
            Some(ptr) => &ptr.slice,
        }
    }

    /// Cuts the trivia down to at most `max` bytes, shortening the piece that
    /// crosses the limit.
    pub fn truncate(&self, max: TextSize) -> Self {
        if self.len() <= max {
            return self.clone();
        }
        let mut remaining = max;
        let mut pieces = Vec::new();
        for piece in self.pieces() {
            if remaining == TextSize::new(0) {
                break;
            }
            let len = piece.len.min(remaining);
            pieces.push(TriviaPiece::new(piece.symbol, len));
            remaining -= len;
        }
        Self::new(&pieces)
    }
}

/// A run of text matched by one of the grammar's extras, such as whitespace
/// or a comment.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TriviaPiece {
    pub symbol: Symbol,
    pub len: TextSize,
}

impl TriviaPiece {
    pub fn new(symbol: Symbol, len: TextSize) -> Self {
        Self { symbol, len }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn piece(symbol: u16, len: u32) -> TriviaPiece {
        TriviaPiece::new(Symbol(symbol), len.into())
    }

    #[test]
    fn empty_trivia_has_no_allocation() {
        let trivia = GreenTrivia::new(&[]);
        assert!(trivia.is_empty());
        assert_eq!(trivia, GreenTrivia::empty());
    }

    #[test]
    fn truncate_cuts_crossing_piece() {
        let trivia = GreenTrivia::new(&[piece(5, 2), piece(6, 4), piece(5, 1)]);
        assert_eq!(trivia.len(), 7.into());

        let cut = trivia.truncate(4.into());
        assert_eq!(cut.pieces(), &[piece(5, 2), piece(6, 2)]);
        assert_eq!(cut.len(), 4.into());

        assert_eq!(trivia.truncate(10.into()), trivia);
        assert!(trivia.truncate(0.into()).is_empty());
    }
}
