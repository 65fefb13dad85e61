//! The serializable grammar table and its blob encoding.

use serde::{Deserialize, Serialize};

use crate::{FieldId, StateId, Symbol, SymbolInfo};

/// Table format version written by `GrammarTable::to_blob`.
pub const FORMAT_VERSION: u32 = 3;
/// Oldest table format `Language::load` still accepts.
pub const MIN_COMPATIBLE_VERSION: u32 = 2;

pub(crate) const MAGIC: &[u8; 4] = b"TSRA";
pub(crate) const HEADER_LEN: usize = 8;

pub type ProductionId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Shift { state: StateId },
    Reduce { production: ProductionId },
    Accept,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assoc {
    Left,
    Right,
    NonAssoc,
}

/// Per-child metadata of a production.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<Symbol>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Production {
    pub lhs: Symbol,
    pub children: Vec<ChildInfo>,
    #[serde(default)]
    pub precedence: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associativity: Option<Assoc>,
    #[serde(default)]
    pub dynamic_precedence: i32,
}

impl Production {
    #[inline]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// All actions of one state for one terminal. More than one action is a
/// conflict the parser explores in parallel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub symbol: Symbol,
    pub actions: Vec<Action>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseState {
    /// Sorted by symbol.
    pub actions: Vec<ActionEntry>,
    /// Sorted by symbol.
    pub gotos: Vec<(Symbol, StateId)>,
    pub lex_mode: u32,
}

/// The terminals the lexer may produce in a group of states.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LexMode {
    /// Sorted by symbol.
    pub terminals: Vec<Symbol>,
    /// Indexed by external token index.
    pub externals: Vec<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Lexeme {
    Literal(String),
    Pattern(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalRule {
    pub symbol: Symbol,
    pub lexeme: Lexeme,
    #[serde(default)]
    pub precedence: i32,
    /// Only matches directly after the previous token, with no trivia in
    /// between.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub immediate: bool,
}

/// Compiled automaton and symbol metadata describing one language.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarTable {
    pub name: String,
    pub symbols: Vec<SymbolInfo>,
    pub fields: Vec<String>,
    /// In declaration order, which breaks lexical ties.
    pub terminals: Vec<TerminalRule>,
    pub extras: Vec<Symbol>,
    /// External terminals, indexed by the scanner's token index.
    pub externals: Vec<Symbol>,
    pub productions: Vec<Production>,
    pub states: Vec<ParseState>,
    pub lex_modes: Vec<LexMode>,
    pub start_state: StateId,
}

impl GrammarTable {
    /// Encodes the table as a blob tagged with `FORMAT_VERSION`.
    pub fn to_blob(&self) -> Result<Vec<u8>, serde_json::Error> {
        self.to_blob_with_version(FORMAT_VERSION)
    }

    /// Encodes the table under an explicit format version tag.
    pub fn to_blob_with_version(&self, version: u32) -> Result<Vec<u8>, serde_json::Error> {
        let mut blob = Vec::with_capacity(HEADER_LEN + 4096);
        blob.extend_from_slice(MAGIC);
        blob.extend_from_slice(&version.to_le_bytes());
        serde_json::to_writer(&mut blob, self)?;
        Ok(blob)
    }
}
