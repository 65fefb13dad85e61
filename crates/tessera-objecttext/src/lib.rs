//! Object Text, the data language of the Halfling engine.
//!
//! The grammar table is generated at build time and embedded in the crate;
//! [`language`] loads it together with the scanner for `bare_string`.
//!
//! ```text
//! Part : <base.rules>/Part
//! {
//!     ID = cosmoteer.thruster
//!     Description = Pushes the ship forward
//!     Cost = &../BaseCost * 2
//! }
//! ```

use std::sync::Arc;

use tessera_grammar::{ExternalScanner, Language, LoadError, ScanCursor};

/// The encoded grammar table.
pub const GRAMMAR: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/objecttext.blob"));

const BARE_STRING: usize = 0;

/// Characters a bare string never starts with.
const NOT_FIRST: &str = "\"@&(-.[{*/+),;}]";

/// Loads the Object Text grammar.
pub fn language() -> Result<Language, LoadError> {
    Language::load_with_scanner(GRAMMAR, Arc::new(BareStringScanner))
}

/// Recognizes `bare_string`: unquoted text of at least two words that runs
/// to the end of the line, a separator, a closing bracket or a comment.
///
/// Text that starts like a number, path, reference, string or nested value
/// is left to the regular tokens, as is any line that contains `=`, `:` or
/// an opening bracket. So is text that continues an expression: an operator
/// or closing character after a value, or a first word that opens a call.
#[derive(Debug)]
struct BareStringScanner;

impl ExternalScanner for BareStringScanner {
    fn scan(&self, cursor: &mut dyn ScanCursor, valid: &[bool]) -> Option<usize> {
        if !valid.get(BARE_STRING).copied().unwrap_or(false) {
            return None;
        }
        let first = cursor.lookahead()?;
        if first.is_whitespace() || first.is_ascii_digit() || NOT_FIRST.contains(first) {
            return None;
        }

        let mut words = 0;
        let mut in_word = false;
        let mut in_quotes = false;
        while let Some(c) = cursor.lookahead() {
            if c == '\n' {
                break;
            }
            if in_quotes {
                in_quotes = c != '"';
                cursor.advance();
                cursor.mark_end();
                continue;
            }
            if c.is_whitespace() {
                in_word = false;
                cursor.advance();
                continue;
            }
            match c {
                ';' | ',' | '}' | ']' => break,
                '[' | '{' | ':' | '&' | '=' => return None,
                '(' if words == 1 && in_word => return None,
                '/' => {
                    cursor.advance();
                    if matches!(cursor.lookahead(), Some('/' | '*')) {
                        break;
                    }
                }
                '"' => {
                    in_quotes = true;
                    cursor.advance();
                }
                _ => cursor.advance(),
            }
            if !in_word {
                words += 1;
                in_word = true;
            }
            cursor.mark_end();
        }
        (words >= 2).then_some(BARE_STRING)
    }
}
