//! Compiled grammar tables and the `Language` handle shared by every parse.
//!
//! A grammar is produced ahead of time as a versioned blob and loaded once.
//! After loading, a `Language` is immutable and can be read from any number
//! of threads without synchronization.

mod language;
mod pattern;
mod scanner;
mod symbol;
mod table;

/// Loaded, validated grammar and its lookup helpers.
pub use language::{Language, LoadError};
/// Lexical matchers compiled from terminal rules.
pub use pattern::{Match, Matcher, PatternError, decode_char};
/// Capability interface for caller-supplied lexing extensions.
pub use scanner::{ExternalScanner, ScanCursor};
/// Identifiers used throughout the tables.
pub use symbol::{FieldId, StateId, Symbol, SymbolInfo, SymbolKind};
/// Serializable table format.
pub use table::{
    Action, ActionEntry, Assoc, ChildInfo, FORMAT_VERSION, GrammarTable, LexMode, Lexeme,
    MIN_COMPATIBLE_VERSION, ParseState, Production, ProductionId, TerminalRule,
};
