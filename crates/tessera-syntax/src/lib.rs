//! Persistent syntax trees with relative spans, attached trivia and cheap
//! edits.
//!
//! Green nodes are immutable and shared between tree versions; red handles
//! add absolute positions and parent links on demand.

mod cursor;
mod edit;
mod green;
mod syntax;
mod trivia;

#[cfg(test)]
mod tests;

/// Pre-order traversal over red handles.
pub use cursor::{Preorder, WalkEvent};
/// Edits and positions.
pub use edit::{InputEdit, Point};
/// Shared, immutable tree storage.
pub use green::{
    ERROR_COST_PER_MISSING, ERROR_COST_PER_RECOVERY, ERROR_COST_PER_SKIPPED_BYTE, GreenChild,
    GreenNode, LeafInfo, NO_LEX_MODE, NodeFlags, NodeInfo,
};
/// Primary syntax tree API.
pub use syntax::{SyntaxNode, SyntaxNodeChildren, Tree};
/// Trivia pieces attached to leaves.
pub use trivia::{GreenTrivia, TriviaPiece};
/// Re-exported so callers can name spans without depending on `text-size`.
pub use text_size::{TextRange, TextSize};
