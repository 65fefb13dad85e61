use std::ops::Range;

use line_index::LineIndex;
use text_size::TextSize;

use crate::green::{GreenChild, GreenNode};

/// Zero-based row and byte column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    pub row: u32,
    pub column: u32,
}

impl Point {
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }
}

/// A single replacement of `start_byte..old_end_byte` by text now spanning
/// `start_byte..new_end_byte`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputEdit {
    pub start_byte: u32,
    pub old_end_byte: u32,
    pub new_end_byte: u32,
    pub start_position: Point,
    pub old_end_position: Point,
    pub new_end_position: Point,
}

impl InputEdit {
    /// Describes replacing `range` of `old_text` with `new_text`, computing
    /// the row/column positions from both versions of the text.
    pub fn replace(old_text: &str, range: Range<usize>, new_text: &str) -> Self {
        let mut updated = String::with_capacity(old_text.len() - range.len() + new_text.len());
        updated.push_str(&old_text[..range.start]);
        updated.push_str(new_text);
        updated.push_str(&old_text[range.end..]);

        let old_index = LineIndex::new(old_text);
        let new_index = LineIndex::new(&updated);
        let new_end = range.start + new_text.len();

        Self {
            start_byte: range.start as u32,
            old_end_byte: range.end as u32,
            new_end_byte: new_end as u32,
            start_position: point(&old_index, range.start),
            old_end_position: point(&old_index, range.end),
            new_end_position: point(&new_index, new_end),
        }
    }

    /// `true` if the edit replaces nothing with nothing.
    pub fn is_empty(&self) -> bool {
        self.start_byte == self.old_end_byte && self.start_byte == self.new_end_byte
    }

    /// Applies the edit to a byte offset in the old text. Offsets inside the
    /// replaced range move to its new end.
    pub fn map_offset(&self, offset: u32) -> u32 {
        if offset < self.start_byte {
            offset
        } else if offset < self.old_end_byte {
            self.new_end_byte
        } else {
            offset - self.old_end_byte + self.new_end_byte
        }
    }
}

fn point(index: &LineIndex, offset: usize) -> Point {
    let line_col = index.line_col(TextSize::new(offset as u32));
    Point { row: line_col.line, column: line_col.col }
}

/// Rewrites the nodes of `node` whose span, extended by the bytes the lexer
/// inspected past it, touches the edit. Everything else is shared with the
/// old tree. `owns_insertion` says whether the inserted text lands in this
/// node.
pub(crate) fn edit_node(
    node: &GreenNode,
    start: TextSize,
    edit: &InputEdit,
    owns_insertion: bool,
) -> GreenNode {
    let edit_start = TextSize::new(edit.start_byte);
    let edit_old_end = TextSize::new(edit.old_end_byte);
    let edit_new_end = TextSize::new(edit.new_end_byte);

    let end = start + node.text_len();
    let lookahead_end = end + node.lookahead();
    if lookahead_end < edit_start || start > edit_old_end {
        return node.clone();
    }

    let overlap_start = start.max(edit_start);
    let overlap_end = end.min(edit_old_end);
    let removed = overlap_end.checked_sub(overlap_start).unwrap_or_default();
    let inserted =
        if owns_insertion { edit_new_end - edit_start } else { TextSize::new(0) };
    let new_len = node.text_len() - removed + inserted;

    let children = node.children();
    let children_end = children.last().map_or(start, |child| start + child.end());
    let owner = if !owns_insertion {
        None
    } else {
        children
            .iter()
            .position(|child| {
                let child_start = start + child.offset;
                child_start <= edit_start && edit_start < start + child.end()
            })
            .or_else(|| {
                // Insertion at the end of the last child belongs to it unless
                // the node has trailing slack to absorb it.
                (edit_start == children_end && children_end == end && !children.is_empty())
                    .then(|| children.len() - 1)
            })
    };

    let mut offset = TextSize::new(0);
    let mut edited = Vec::with_capacity(children.len());
    for (index, child) in children.iter().enumerate() {
        let child_node = edit_node(&child.node, start + child.offset, edit, owner == Some(index));
        let len = child_node.text_len();
        edited.push(GreenChild { offset, field: child.field, node: child_node });
        offset += len;
    }

    node.edited(new_len.max(offset), edited)
}
