use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use tessera_grammar::{FieldId, StateId, Symbol};
use text_size::TextSize;
use triomphe::Arc;

use crate::GreenTrivia;

/// Fixed cost of every error recovery that produced an `ERROR` node or token.
pub const ERROR_COST_PER_RECOVERY: u32 = 100;
/// Cost of one inserted `MISSING` leaf.
pub const ERROR_COST_PER_MISSING: u32 = 110;
/// Cost of each byte swallowed by an `ERROR` node or token.
pub const ERROR_COST_PER_SKIPPED_BYTE: u32 = 1;

/// Lex mode recorded when a token was lexed while several parse heads were
/// alive. Nodes starting with such a token are never reused.
pub const NO_LEX_MODE: u32 = u32::MAX;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NodeFlags(u16);

impl NodeFlags {
    pub const NAMED: Self = Self(1 << 0);
    pub const VISIBLE: Self = Self(1 << 1);
    pub const EXTRA: Self = Self(1 << 2);
    /// An `ERROR` node or a one-char error token.
    pub const ERROR: Self = Self(1 << 3);
    pub const MISSING: Self = Self(1 << 4);
    /// Built while the parser was exploring several alternatives, or contains
    /// errors. Fragile nodes are never reused.
    pub const FRAGILE: Self = Self(1 << 5);
    pub const HAS_CHANGES: Self = Self(1 << 6);
    pub const HAS_ERROR: Self = Self(1 << 7);
    pub const LEAF: Self = Self(1 << 8);

    /// Flags that describe what a node is rather than how it was built.
    const STRUCTURAL: Self = Self(
        Self::NAMED.0 | Self::VISIBLE.0 | Self::EXTRA.0 | Self::ERROR.0 | Self::MISSING.0 | Self::LEAF.0,
    );

    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[inline]
    const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }
}

impl BitOr for NodeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for NodeFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl fmt::Debug for NodeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(NodeFlags, &str); 9] = [
            (NodeFlags::NAMED, "NAMED"),
            (NodeFlags::VISIBLE, "VISIBLE"),
            (NodeFlags::EXTRA, "EXTRA"),
            (NodeFlags::ERROR, "ERROR"),
            (NodeFlags::MISSING, "MISSING"),
            (NodeFlags::FRAGILE, "FRAGILE"),
            (NodeFlags::HAS_CHANGES, "HAS_CHANGES"),
            (NodeFlags::HAS_ERROR, "HAS_ERROR"),
            (NodeFlags::LEAF, "LEAF"),
        ];
        let mut list = f.debug_set();
        for (flag, name) in NAMES {
            if self.contains(flag) {
                list.entry(&format_args!("{name}"));
            }
        }
        list.finish()
    }
}

/// A child slot: offset relative to the parent's start, the field the
/// production assigned to it, and the child itself.
#[derive(Clone, Debug)]
pub struct GreenChild {
    pub offset: TextSize,
    pub field: Option<FieldId>,
    pub node: GreenNode,
}

impl GreenChild {
    #[inline]
    pub fn end(&self) -> TextSize {
        self.offset + self.node.text_len()
    }
}

/// A token turned into a leaf.
#[derive(Clone, Debug)]
pub struct LeafInfo {
    pub symbol: Symbol,
    pub kind: Symbol,
    pub flags: NodeFlags,
    pub leading: GreenTrivia,
    /// Length of the token text without trivia.
    pub text_len: TextSize,
    pub trailing: GreenTrivia,
    /// Bytes past the end of the trailing trivia the lexer looked at.
    pub lookahead: TextSize,
    pub parse_state: StateId,
    pub lex_mode: u32,
    pub next_lex_mode: u32,
}

/// Header of an interior node built by a reduction.
#[derive(Clone, Copy, Debug)]
pub struct NodeInfo {
    pub symbol: Symbol,
    pub kind: Symbol,
    pub flags: NodeFlags,
    pub parse_state: StateId,
    pub dynamic_precedence: i32,
}

/// Immutable, shareable syntax node. Lengths and child offsets are relative,
/// so a subtree can be reused at any absolute position.
#[derive(Clone)]
pub struct GreenNode {
    data: Arc<GreenNodeData>,
}

#[derive(Clone)]
struct GreenNodeData {
    symbol: Symbol,
    kind: Symbol,
    flags: NodeFlags,
    text_len: TextSize,
    lookahead: TextSize,
    parse_state: StateId,
    lex_mode: u32,
    next_lex_mode: u32,
    error_cost: u32,
    dynamic_precedence: i32,
    leading_len: TextSize,
    trailing_len: TextSize,
    leading: GreenTrivia,
    trailing: GreenTrivia,
    children: Box<[GreenChild]>,
}

impl GreenNode {
    pub fn leaf(info: LeafInfo) -> Self {
        let mut flags = info.flags | NodeFlags::LEAF;
        let text_len = info.leading.len() + info.text_len + info.trailing.len();
        let mut error_cost = 0;
        if flags.contains(NodeFlags::ERROR) {
            flags |= NodeFlags::HAS_ERROR | NodeFlags::FRAGILE;
            error_cost = ERROR_COST_PER_RECOVERY + ERROR_COST_PER_SKIPPED_BYTE * u32::from(text_len);
        }
        Self {
            data: Arc::new(GreenNodeData {
                symbol: info.symbol,
                kind: info.kind,
                flags,
                text_len,
                lookahead: info.lookahead,
                parse_state: info.parse_state,
                lex_mode: info.lex_mode,
                next_lex_mode: info.next_lex_mode,
                error_cost,
                dynamic_precedence: 0,
                leading_len: info.leading.len(),
                trailing_len: info.trailing.len(),
                leading: info.leading,
                trailing: info.trailing,
                children: Box::new([]),
            }),
        }
    }

    /// A zero-length leaf standing for a terminal the parser had to assume.
    pub fn missing(symbol: Symbol, kind: Symbol, flags: NodeFlags, parse_state: StateId) -> Self {
        Self {
            data: Arc::new(GreenNodeData {
                symbol,
                kind,
                flags: flags
                    | NodeFlags::LEAF
                    | NodeFlags::MISSING
                    | NodeFlags::HAS_ERROR
                    | NodeFlags::FRAGILE,
                text_len: TextSize::new(0),
                lookahead: TextSize::new(0),
                parse_state,
                lex_mode: NO_LEX_MODE,
                next_lex_mode: NO_LEX_MODE,
                error_cost: ERROR_COST_PER_MISSING,
                dynamic_precedence: 0,
                leading_len: TextSize::new(0),
                trailing_len: TextSize::new(0),
                leading: GreenTrivia::empty(),
                trailing: GreenTrivia::empty(),
                children: Box::new([]),
            }),
        }
    }

    /// Builds an interior node. Hidden interior children are replaced by
    /// their own children, which inherit the hidden child's field when they
    /// have none.
    pub fn node(info: NodeInfo, children: impl IntoIterator<Item = (Option<FieldId>, GreenNode)>) -> Self {
        let mut slots = Vec::new();
        let mut offset = TextSize::new(0);
        for (field, child) in children {
            if child.is_leaf() || child.is_visible() {
                let len = child.text_len();
                slots.push(GreenChild { offset, field, node: child });
                offset += len;
            } else {
                for grandchild in child.children() {
                    slots.push(GreenChild {
                        offset: offset + grandchild.offset,
                        field: grandchild.field.or(field),
                        node: grandchild.node.clone(),
                    });
                }
                offset += child.text_len();
            }
        }

        let mut data = GreenNodeData {
            symbol: info.symbol,
            kind: info.kind,
            flags: info.flags.difference(NodeFlags::LEAF),
            text_len: offset,
            lookahead: TextSize::new(0),
            parse_state: info.parse_state,
            lex_mode: NO_LEX_MODE,
            next_lex_mode: NO_LEX_MODE,
            error_cost: 0,
            dynamic_precedence: info.dynamic_precedence,
            leading_len: TextSize::new(0),
            trailing_len: TextSize::new(0),
            leading: GreenTrivia::empty(),
            trailing: GreenTrivia::empty(),
            children: slots.into_boxed_slice(),
        };
        data.summarize();
        if data.flags.contains(NodeFlags::ERROR) {
            data.error_cost += ERROR_COST_PER_RECOVERY
                + ERROR_COST_PER_SKIPPED_BYTE * u32::from(data.text_len);
            data.flags |= NodeFlags::HAS_ERROR;
        }
        if data.flags.contains(NodeFlags::HAS_ERROR) {
            data.flags |= NodeFlags::FRAGILE;
        }
        Self { data: Arc::new(data) }
    }

    /// Returns a copy shown as `kind`, as done for aliased children.
    pub fn aliased(&self, kind: Symbol, named: bool) -> Self {
        let mut data = (*self.data).clone();
        data.kind = kind;
        data.flags = data.flags.difference(NodeFlags::NAMED) | NodeFlags::VISIBLE;
        if named {
            data.flags |= NodeFlags::NAMED;
        }
        Self { data: Arc::new(data) }
    }

    /// Returns a copy with `flags` added.
    pub fn with_flags(&self, flags: NodeFlags) -> Self {
        if self.flags().contains(flags) {
            return self.clone();
        }
        let mut data = (*self.data).clone();
        data.flags |= flags;
        Self { data: Arc::new(data) }
    }

    /// Returns a copy covering `len` bytes. The bytes past the last child are
    /// trivia owned by the node itself.
    pub fn with_text_len(&self, len: TextSize) -> Self {
        let mut data = (*self.data).clone();
        let children_end = data.children.last().map_or(TextSize::new(0), GreenChild::end);
        data.text_len = len.max(children_end);
        if !data.flags.contains(NodeFlags::LEAF) {
            data.lookahead = data.lookahead_past_end();
            let (leading_len, trailing_len) = data.trivia_lens();
            data.leading_len = leading_len;
            data.trailing_len = trailing_len;
        }
        Self { data: Arc::new(data) }
    }

    pub(crate) fn edited(&self, text_len: TextSize, children: Vec<GreenChild>) -> Self {
        let mut data = (*self.data).clone();
        data.flags |= NodeFlags::HAS_CHANGES;
        data.text_len = text_len;
        if data.flags.contains(NodeFlags::LEAF) {
            data.leading = data.leading.truncate(text_len);
            data.trailing = data.trailing.truncate(text_len - data.leading.len());
            data.leading_len = data.leading.len();
            data.trailing_len = data.trailing.len();
        } else {
            data.children = children.into_boxed_slice();
            let (leading_len, trailing_len) = data.trivia_lens();
            data.leading_len = leading_len;
            data.trailing_len = trailing_len;
        }
        Self { data: Arc::new(data) }
    }

    #[inline]
    pub fn symbol(&self) -> Symbol {
        self.data.symbol
    }

    /// The symbol the node is shown as, after aliasing.
    #[inline]
    pub fn kind(&self) -> Symbol {
        self.data.kind
    }

    #[inline]
    pub fn flags(&self) -> NodeFlags {
        self.data.flags
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.flags().contains(NodeFlags::LEAF)
    }

    #[inline]
    pub fn is_named(&self) -> bool {
        self.flags().contains(NodeFlags::NAMED)
    }

    #[inline]
    pub fn is_visible(&self) -> bool {
        self.flags().contains(NodeFlags::VISIBLE)
    }

    #[inline]
    pub fn is_extra(&self) -> bool {
        self.flags().contains(NodeFlags::EXTRA)
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.flags().contains(NodeFlags::ERROR)
    }

    #[inline]
    pub fn is_missing(&self) -> bool {
        self.flags().contains(NodeFlags::MISSING)
    }

    #[inline]
    pub fn is_fragile(&self) -> bool {
        self.flags().contains(NodeFlags::FRAGILE)
    }

    #[inline]
    pub fn has_changes(&self) -> bool {
        self.flags().contains(NodeFlags::HAS_CHANGES)
    }

    #[inline]
    pub fn has_error(&self) -> bool {
        self.flags().contains(NodeFlags::HAS_ERROR)
    }

    /// Length including trivia.
    #[inline]
    pub fn text_len(&self) -> TextSize {
        self.data.text_len
    }

    #[inline]
    pub fn lookahead(&self) -> TextSize {
        self.data.lookahead
    }

    /// The parse state on top of the stack before this node was pushed.
    #[inline]
    pub fn parse_state(&self) -> StateId {
        self.data.parse_state
    }

    /// Lex mode of the node's first token.
    #[inline]
    pub fn lex_mode(&self) -> u32 {
        self.data.lex_mode
    }

    /// Lex mode of the token that followed the node's last token.
    #[inline]
    pub fn next_lex_mode(&self) -> u32 {
        self.data.next_lex_mode
    }

    #[inline]
    pub fn error_cost(&self) -> u32 {
        self.data.error_cost
    }

    #[inline]
    pub fn dynamic_precedence(&self) -> i32 {
        self.data.dynamic_precedence
    }

    /// Length of the trivia before the node's first token.
    #[inline]
    pub fn leading_len(&self) -> TextSize {
        self.data.leading_len
    }

    /// Length of the trivia after the node's last token.
    #[inline]
    pub fn trailing_len(&self) -> TextSize {
        self.data.trailing_len
    }

    /// Leading trivia of a leaf. Interior nodes carry none of their own.
    pub fn leading_trivia(&self) -> &GreenTrivia {
        &self.data.leading
    }

    pub fn trailing_trivia(&self) -> &GreenTrivia {
        &self.data.trailing
    }

    #[inline]
    pub fn children(&self) -> &[GreenChild] {
        &self.data.children
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Compares kinds, spans and fields of both trees, ignoring the parser
    /// bookkeeping stored on the nodes.
    pub fn structurally_eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.kind() == other.kind()
            && self.flags().intersection(NodeFlags::STRUCTURAL)
                == other.flags().intersection(NodeFlags::STRUCTURAL)
            && self.text_len() == other.text_len()
            && self.leading_len() == other.leading_len()
            && self.trailing_len() == other.trailing_len()
            && self.children().len() == other.children().len()
            && self.children().iter().zip(other.children()).all(|(a, b)| {
                a.offset == b.offset && a.field == b.field && a.node.structurally_eq(&b.node)
            })
    }
}

impl GreenNodeData {
    /// Recomputes everything an interior node derives from its children.
    fn summarize(&mut self) {
        let mut error_cost = 0u32;
        let mut dynamic_precedence = 0i32;
        let mut has_error = false;
        for child in self.children.iter() {
            error_cost = error_cost.saturating_add(child.node.error_cost());
            dynamic_precedence += child.node.dynamic_precedence();
            has_error |= child.node.has_error();
        }
        self.lookahead = self.lookahead_past_end();
        self.error_cost = error_cost;
        self.dynamic_precedence += dynamic_precedence;
        if has_error {
            self.flags |= NodeFlags::HAS_ERROR;
        }
        self.lex_mode = self.children.first().map_or(NO_LEX_MODE, |child| child.node.lex_mode());
        self.next_lex_mode =
            self.children.last().map_or(NO_LEX_MODE, |child| child.node.next_lex_mode());
        let (leading_len, trailing_len) = self.trivia_lens();
        self.leading_len = leading_len;
        self.trailing_len = trailing_len;
    }

    fn lookahead_past_end(&self) -> TextSize {
        let end = self
            .children
            .iter()
            .map(|child| child.end() + child.node.lookahead())
            .fold(self.text_len, TextSize::max);
        end - self.text_len
    }

    fn trivia_lens(&self) -> (TextSize, TextSize) {
        let zero = TextSize::new(0);
        let mut non_empty = self.children.iter().filter(|child| child.node.text_len() > zero);
        let Some(first) = non_empty.next() else {
            return (self.text_len, zero);
        };
        let last = non_empty.next_back().unwrap_or(first);
        let leading = first.offset + first.node.leading_len();
        let content_end = last.end() - last.node.trailing_len();
        (leading, self.text_len - content_end.max(leading))
    }
}

impl fmt::Debug for GreenNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GreenNode")
            .field("kind", &self.kind())
            .field("flags", &self.flags())
            .field("text_len", &self.text_len())
            .field("children", &self.children())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TriviaPiece;

    const WS: Symbol = Symbol(2);
    const A: Symbol = Symbol(3);
    const EXPR: Symbol = Symbol(4);
    const HIDDEN: Symbol = Symbol(5);

    fn token(symbol: Symbol, len: u32, trailing: u32) -> GreenNode {
        let trailing = if trailing == 0 {
            GreenTrivia::empty()
        } else {
            GreenTrivia::new(&[TriviaPiece::new(WS, trailing.into())])
        };
        GreenNode::leaf(LeafInfo {
            symbol,
            kind: symbol,
            flags: NodeFlags::VISIBLE,
            leading: GreenTrivia::empty(),
            text_len: len.into(),
            trailing,
            lookahead: 1.into(),
            parse_state: 0,
            lex_mode: 7,
            next_lex_mode: 8,
        })
    }

    fn info(symbol: Symbol, flags: NodeFlags) -> NodeInfo {
        NodeInfo { symbol, kind: symbol, flags, parse_state: 0, dynamic_precedence: 0 }
    }

    #[test]
    fn node_summarizes_children() {
        let node = GreenNode::node(
            info(EXPR, NodeFlags::NAMED | NodeFlags::VISIBLE),
            [(None, token(A, 1, 2)), (None, token(A, 3, 1))],
        );
        assert_eq!(node.text_len(), 7.into());
        assert_eq!(node.children()[1].offset, 3.into());
        assert_eq!(node.trailing_len(), 1.into());
        assert_eq!(node.leading_len(), 0.into());
        assert_eq!(node.lookahead(), 1.into());
        assert_eq!(node.lex_mode(), 7);
        assert_eq!(node.next_lex_mode(), 8);
        assert!(!node.has_error());
    }

    #[test]
    fn hidden_children_are_spliced() {
        let hidden = GreenNode::node(info(HIDDEN, NodeFlags::empty()), [(None, token(A, 1, 0)), (None, token(A, 1, 0))]);
        let field = Some(FieldId(0));
        let node = GreenNode::node(
            info(EXPR, NodeFlags::NAMED | NodeFlags::VISIBLE),
            [(None, token(A, 2, 0)), (field, hidden)],
        );
        let offsets: Vec<_> = node.children().iter().map(|child| u32::from(child.offset)).collect();
        assert_eq!(offsets, [0, 2, 3]);
        assert_eq!(node.children()[2].field, field);
    }

    #[test]
    fn errors_propagate() {
        let missing = GreenNode::missing(A, A, NodeFlags::VISIBLE, 0);
        let node = GreenNode::node(
            info(EXPR, NodeFlags::NAMED | NodeFlags::VISIBLE),
            [(None, token(A, 1, 0)), (None, missing)],
        );
        assert!(node.has_error());
        assert!(node.is_fragile());
        assert_eq!(node.error_cost(), ERROR_COST_PER_MISSING);

        let error = GreenNode::node(info(Symbol::ERROR, NodeFlags::VISIBLE | NodeFlags::ERROR), [(None, token(A, 2, 0))]);
        assert_eq!(error.error_cost(), ERROR_COST_PER_RECOVERY + 2 * ERROR_COST_PER_SKIPPED_BYTE);
    }

    #[test]
    fn structural_equality_ignores_bookkeeping() {
        let a = GreenNode::node(info(EXPR, NodeFlags::VISIBLE), [(None, token(A, 1, 0))]);
        let b = GreenNode::node(
            NodeInfo { parse_state: 9, ..info(EXPR, NodeFlags::VISIBLE | NodeFlags::FRAGILE) },
            [(None, token(A, 1, 0))],
        );
        let c = GreenNode::node(info(EXPR, NodeFlags::VISIBLE), [(None, token(A, 2, 0))]);
        assert!(a.structurally_eq(&b));
        assert!(!a.structurally_eq(&c));
    }

    #[test]
    fn slack_counts_as_trivia() {
        let root = GreenNode::node(info(EXPR, NodeFlags::VISIBLE), []).with_text_len(3.into());
        assert_eq!(root.text_len(), 3.into());
        assert_eq!(root.leading_len(), 3.into());
        assert_eq!(root.trailing_len(), 0.into());
    }
}
