use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a parse state in the table.
pub type StateId = u32;

/// A grammar symbol: terminal, external terminal or non-terminal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(pub u16);

impl Symbol {
    /// End of input.
    pub const END: Self = Self(0);
    /// Error tokens and error nodes.
    pub const ERROR: Self = Self(1);

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

/// Index into the table's field-name list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(pub u16);

impl FieldId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    End,
    Error,
    Terminal,
    External,
    NonTerminal,
}

impl SymbolKind {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::End | Self::Error | Self::Terminal | Self::External)
    }
}

/// Metadata for one symbol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    /// Named symbols come from rules and named tokens; anonymous ones are
    /// string literals such as `"+"`.
    pub named: bool,
    /// Hidden symbols are spliced into their parent when a node is built.
    pub visible: bool,
}
