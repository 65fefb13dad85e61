//! Context-aware lexer driven by a loaded grammar.
//!
//! The parser asks for one token at a time, passing the lex modes of its
//! live stack heads. Only terminals valid in those modes compete, which lets
//! the same text lex differently depending on where the parser is.

mod cursor;

use std::cmp::Reverse;

use cursor::Cursor;
use tessera_grammar::{Language, Symbol, decode_char};
use tessera_syntax::{GreenTrivia, NO_LEX_MODE, TriviaPiece};
use text_size::{TextRange, TextSize};

#[derive(Debug, Clone)]
pub struct Token {
    pub leading: GreenTrivia,
    pub symbol: Symbol,
    pub kind_range: TextRange,
    pub trailing: GreenTrivia,
    /// One past the furthest byte looked at while producing the token and
    /// its trivia.
    pub lookahead_end: TextSize,
    /// The mode the token was lexed in, `NO_LEX_MODE` if several were merged.
    pub lex_mode: u32,
}

impl Token {
    /// Start including leading trivia.
    #[inline]
    pub fn start(&self) -> TextSize {
        self.kind_range.start() - self.leading.len()
    }

    /// End including trailing trivia.
    #[inline]
    pub fn end(&self) -> TextSize {
        self.kind_range.end() + self.trailing.len()
    }

    /// Bytes inspected past `end`.
    #[inline]
    pub fn lookahead(&self) -> TextSize {
        self.lookahead_end.checked_sub(self.end()).unwrap_or_default()
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        self.symbol == Symbol::END
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.symbol == Symbol::ERROR
    }
}

pub struct Lexer<'a> {
    language: &'a Language,
    text: &'a [u8],
    trivia_pieces: Vec<TriviaPiece>,
    selected: Vec<u32>,
    candidates: Vec<Symbol>,
    valid_externals: Vec<bool>,
}

impl<'a> Lexer<'a> {
    /// `text` must be shorter than 4 GiB; `Parser::parse` rejects longer
    /// input before lexing.
    pub fn new(language: &'a Language, text: &'a [u8]) -> Self {
        debug_assert!(u32::try_from(text.len()).is_ok(), "input of {} bytes", text.len());
        Self {
            language,
            text,
            trivia_pieces: Vec::with_capacity(4),
            selected: Vec::new(),
            candidates: Vec::new(),
            valid_externals: Vec::new(),
        }
    }

    #[inline]
    pub fn text(&self) -> &'a [u8] {
        self.text
    }

    /// Lexes the token at `position` together with the trivia that follows
    /// it. Leading trivia is only collected at the start of the input.
    ///
    /// `after_trivia` tells whether trivia separated `position` from the
    /// previous token; immediate terminals cannot match in that case.
    pub fn next_token(&mut self, position: TextSize, modes: &[u32], after_trivia: bool) -> Token {
        self.select(modes);

        let mut inspected_end = usize::from(position);
        let mut pos = usize::from(position);
        if pos == 0 {
            pos = self.trivia(pos, &mut inspected_end);
        }
        let leading_count = self.trivia_pieces.len();
        let after_trivia = after_trivia || leading_count > 0;

        let (symbol, end) = self.token(pos, after_trivia, &mut inspected_end);
        if symbol != Symbol::END {
            self.trivia(end, &mut inspected_end);
        }

        let (leading, trailing) = self.trivia_pieces.split_at(leading_count);
        let token = Token {
            leading: GreenTrivia::new(leading),
            symbol,
            kind_range: TextRange::new(TextSize::new(pos as u32), TextSize::new(end as u32)),
            trailing: GreenTrivia::new(trailing),
            lookahead_end: TextSize::new(inspected_end as u32),
            lex_mode: match modes {
                [mode] => *mode,
                _ => NO_LEX_MODE,
            },
        };
        self.trivia_pieces.clear();

        tracing::trace!(
            symbol = self.language.symbol_name(symbol),
            range = ?token.kind_range,
            lookahead_end = u32::from(token.lookahead_end),
            "lexed token"
        );
        token
    }

    /// Collects the terminals and externals valid in any of `modes`.
    fn select(&mut self, modes: &[u32]) {
        if self.selected == modes {
            return;
        }
        self.selected.clear();
        self.selected.extend_from_slice(modes);
        self.candidates.clear();
        self.valid_externals.clear();
        self.valid_externals.resize(self.language.externals().len(), false);

        for &mode in modes {
            let mode = self.language.lex_mode(mode);
            self.candidates.extend_from_slice(&mode.terminals);
            for (valid, &flag) in self.valid_externals.iter_mut().zip(&mode.externals) {
                *valid |= flag;
            }
        }
        self.candidates.sort_unstable();
        self.candidates.dedup();
    }

    /// Consumes trivia starting at `pos` and returns where it stops. An extra
    /// only counts as trivia when it beats every terminal of the mode.
    fn trivia(&mut self, mut pos: usize, inspected_end: &mut usize) -> usize {
        let language = self.language;
        let extras = language.extras();
        loop {
            if pos >= self.text.len() {
                *inspected_end = (*inspected_end).max(self.text.len());
                return pos;
            }
            let best = longest_match(
                language,
                self.text,
                pos,
                extras.iter().chain(&self.candidates).copied(),
                false,
                inspected_end,
            );
            match best {
                Some((symbol, len)) if extras.contains(&symbol) => {
                    self.trivia_pieces.push(TriviaPiece::new(symbol, TextSize::new(len as u32)));
                    pos += len;
                }
                _ => return pos,
            }
        }
    }

    fn token(&mut self, pos: usize, after_trivia: bool, inspected_end: &mut usize) -> (Symbol, usize) {
        if pos >= self.text.len() {
            *inspected_end = (*inspected_end).max(self.text.len());
            return (Symbol::END, pos);
        }

        if let Some(found) = self.scan_external(pos, inspected_end) {
            return found;
        }

        let language = self.language;
        let candidates = self.candidates.iter().copied();
        if let Some((symbol, len)) =
            longest_match(language, self.text, pos, candidates, after_trivia, inspected_end)
        {
            return (symbol, pos + len);
        }

        // Nothing valid here. Lex any real token so recovery has something
        // better than single chars to work with.
        let extras = language.extras();
        let all = language.terminals().filter(|symbol| !extras.contains(symbol));
        if let Some((symbol, len)) =
            longest_match(language, self.text, pos, all, after_trivia, inspected_end)
        {
            return (symbol, pos + len);
        }

        let width = decode_char(self.text, pos).map_or(1, |(_, width)| width);
        *inspected_end = (*inspected_end).max(pos + width);
        (Symbol::ERROR, pos + width)
    }

    fn scan_external(&self, pos: usize, inspected_end: &mut usize) -> Option<(Symbol, usize)> {
        let scanner = self.language.external_scanner()?;
        if !self.valid_externals.contains(&true) {
            return None;
        }

        let mut cursor = Cursor::new(self.text, pos);
        let result = scanner.scan(&mut cursor, &self.valid_externals);
        *inspected_end = (*inspected_end).max(cursor.inspected_end());

        let index = result?;
        if !self.valid_externals.get(index).copied().unwrap_or(false) {
            tracing::warn!(index, "external scanner produced a token that is not valid here");
            return None;
        }
        let end = cursor.token_end().min(self.text.len());
        if end <= pos {
            return None;
        }
        Some((self.language.externals()[index], end))
    }
}

/// Longest match among `symbols` at `pos`. Ties go to the higher lexical
/// precedence, then to immediate terminals, then to the earlier declaration.
fn longest_match(
    language: &Language,
    text: &[u8],
    pos: usize,
    symbols: impl Iterator<Item = Symbol>,
    after_trivia: bool,
    inspected_end: &mut usize,
) -> Option<(Symbol, usize)> {
    let mut best = None;
    let mut best_key = None;
    for symbol in symbols {
        let Some(matcher) = language.matcher(symbol) else { continue };
        let immediate = language.is_immediate(symbol);
        if immediate && after_trivia {
            continue;
        }
        let found = matcher.longest_match(text, pos);
        *inspected_end = (*inspected_end).max(found.inspected_end);
        let Some(len) = found.len else { continue };

        let key = (
            len,
            language.lexical_precedence(symbol),
            immediate,
            Reverse(language.declaration_order(symbol)),
        );
        if best_key.is_none_or(|best_key| key > best_key) {
            best_key = Some(key);
            best = Some((symbol, len));
        }
    }
    best
}
