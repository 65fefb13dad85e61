//! Pattern queries over syntax trees.
//!
//! Queries are written as S-expressions:
//!
//! ```text
//! ; every sum whose right operand is a named node
//! (expr right: (_) @rhs)
//! ((identifier) @name (#match? @name "^[A-Z]"))
//! ```
//!
//! A [`Query`] is compiled once per language and can be run any number of
//! times with a [`QueryCursor`]. Matching never modifies the tree.

mod compile;
mod matcher;
#[cfg(test)]
mod tests;

use std::fmt;

use tessera_grammar::Language;

pub use matcher::{QueryCaptures, QueryCursor, QueryMatches};
use tessera_syntax::SyntaxNode;

/// A compiled query.
#[derive(Debug)]
pub struct Query {
    language: Language,
    patterns: Vec<compile::Pattern>,
    capture_names: Vec<String>,
    /// Some pattern starts with a sibling group or a quantifier.
    needs_siblings: bool,
}

impl Query {
    pub fn new(language: &Language, source: &str) -> Result<Self, QueryError> {
        let mut capture_names = Vec::new();
        let patterns = compile::QueryParser::new(language, source, &mut capture_names).patterns()?;
        let needs_siblings = patterns.iter().any(compile::Pattern::spans_siblings);
        tracing::debug!(
            language = language.name(),
            patterns = patterns.len(),
            captures = capture_names.len(),
            "compiled query"
        );
        Ok(Self { language: language.clone(), patterns, capture_names, needs_siblings })
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Byte offset of pattern `index` in the query source.
    pub fn start_byte_for_pattern(&self, index: usize) -> Option<usize> {
        self.patterns.get(index).map(|pattern| pattern.start_byte)
    }

    pub fn capture_names(&self) -> &[String] {
        &self.capture_names
    }

    pub fn capture_index_for_name(&self, name: &str) -> Option<u32> {
        self.capture_names.iter().position(|capture| capture == name).map(|index| index as u32)
    }
}

/// One successful match of a pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryMatch {
    pub pattern_index: usize,
    pub captures: Vec<QueryCapture>,
}

impl QueryMatch {
    /// Nodes captured under `index`, in tree order.
    pub fn nodes_for_capture(&self, index: u32) -> impl Iterator<Item = &SyntaxNode> + '_ {
        self.captures.iter().filter(move |capture| capture.index == index).map(|capture| &capture.node)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryCapture {
    pub index: u32,
    pub node: SyntaxNode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryErrorKind {
    Syntax,
    NodeType,
    Field,
    Capture,
    Predicate,
    Regex,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Syntax => "invalid syntax",
            Self::NodeType => "invalid node type",
            Self::Field => "invalid field",
            Self::Capture => "invalid capture",
            Self::Predicate => "invalid predicate",
            Self::Regex => "invalid regex",
        })
    }
}

/// Position is zero based; `Display` prints it one based.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {}:{}: {message}", .row + 1, .column + 1)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub offset: usize,
    pub row: u32,
    pub column: u32,
    pub message: String,
}
