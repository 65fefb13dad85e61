//! Public syntax tree API built on immutable green nodes and parent-linked
//! red handles.

use std::fmt::{self, Write as _};

use tessera_grammar::{FieldId, Language, Symbol};
use text_size::{TextRange, TextSize};
use triomphe::Arc;

use crate::cursor::Preorder;
use crate::edit::{InputEdit, edit_node};
use crate::green::GreenNode;

/// The result of one parse: a root node plus the language it was parsed
/// with. The tree does not own the source text.
#[derive(Clone)]
pub struct Tree {
    root: GreenNode,
    language: Language,
    version: u64,
}

/// Identity, not structure: equal trees share their root node.
impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.root.ptr_eq(&other.root) && self.language == other.language
    }
}

impl Eq for Tree {}

impl Tree {
    pub fn new(root: GreenNode, language: Language) -> Self {
        Self { root, language, version: 0 }
    }

    /// Stamps the tree with `version`; a reparse continues the count of the
    /// tree it reused.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    #[inline]
    pub fn root_node(&self) -> SyntaxNode {
        SyntaxNode::new_root(self.root.clone(), self.language.clone(), self.version)
    }

    #[inline]
    pub fn root_green(&self) -> &GreenNode {
        &self.root
    }

    #[inline]
    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Incremented by every edit and by every reparse of an edited tree.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns a copy of the tree adjusted to describe the text after `edit`.
    ///
    /// Nodes whose span or inspected lookahead touch the edit are copied and
    /// marked as changed; every other subtree is shared with `self`, which is
    /// left as it was.
    pub fn edit(&self, edit: &InputEdit) -> Tree {
        let root = edit_node(&self.root, TextSize::new(0), edit, true);
        tracing::trace!(
            start = edit.start_byte,
            old_end = edit.old_end_byte,
            new_end = edit.new_end_byte,
            version = self.version + 1,
            "edited tree"
        );
        Tree { root, language: self.language.clone(), version: self.version + 1 }
    }

    /// `true` if `node` was obtained from this exact tree and version.
    pub fn is_current(&self, node: &SyntaxNode) -> bool {
        node.data.version == self.version
            && node.ancestors().last().is_some_and(|root| root.green().ptr_eq(&self.root))
    }

    /// Compares kinds, spans and fields with another tree.
    pub fn structurally_eq(&self, other: &Tree) -> bool {
        self.root.structurally_eq(&other.root)
    }

    pub fn to_sexp(&self) -> String {
        self.root_node().to_sexp()
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("language", &self.language.name())
            .field("version", &self.version)
            .field("root", &self.to_sexp())
            .finish()
    }
}

/// Handle to a node at a specific position of a specific tree.
#[derive(Clone)]
pub struct SyntaxNode {
    data: Arc<NodeData>,
}

struct NodeData {
    green: GreenNode,
    offset: TextSize,
    index: u32,
    field: Option<FieldId>,
    parent: Option<SyntaxNode>,
    language: Language,
    version: u64,
}

impl SyntaxNode {
    fn new_root(green: GreenNode, language: Language, version: u64) -> Self {
        Self {
            data: Arc::new(NodeData {
                green,
                offset: TextSize::new(0),
                index: 0,
                field: None,
                parent: None,
                language,
                version,
            }),
        }
    }

    fn new_child(&self, index: usize) -> Option<Self> {
        let slot = self.green().children().get(index)?;
        Some(Self {
            data: Arc::new(NodeData {
                green: slot.node.clone(),
                offset: self.data.offset + slot.offset,
                index: index as u32,
                field: slot.field,
                parent: Some(self.clone()),
                language: self.data.language.clone(),
                version: self.data.version,
            }),
        })
    }

    #[inline]
    pub fn green(&self) -> &GreenNode {
        &self.data.green
    }

    #[inline]
    pub fn language(&self) -> &Language {
        &self.data.language
    }

    /// Version of the tree the handle was taken from.
    #[inline]
    pub fn tree_version(&self) -> u64 {
        self.data.version
    }

    /// Returns the node's type name, after aliasing.
    #[inline]
    pub fn kind(&self) -> &str {
        self.data.language.symbol_name(self.green().kind())
    }

    /// Returns the node's type as a symbol, after aliasing.
    #[inline]
    pub fn kind_id(&self) -> Symbol {
        self.green().kind()
    }

    /// Returns the grammar symbol the node was reduced or lexed as.
    #[inline]
    pub fn grammar_symbol(&self) -> Symbol {
        self.green().symbol()
    }

    #[inline]
    pub fn is_named(&self) -> bool {
        self.green().is_named()
    }

    #[inline]
    pub fn is_extra(&self) -> bool {
        self.green().is_extra()
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.green().kind() == Symbol::ERROR
    }

    #[inline]
    pub fn is_missing(&self) -> bool {
        self.green().is_missing()
    }

    #[inline]
    pub fn has_error(&self) -> bool {
        self.green().has_error()
    }

    #[inline]
    pub fn has_changes(&self) -> bool {
        self.green().has_changes()
    }

    /// Returns the range including attached trivia.
    #[inline]
    pub fn text_range(&self) -> TextRange {
        TextRange::at(self.data.offset, self.green().text_len())
    }

    /// Returns the range excluding leading and trailing trivia.
    pub fn trimmed_range(&self) -> TextRange {
        let range = self.text_range();
        let start = range.start() + self.green().leading_len();
        let end = range.end().checked_sub(self.green().trailing_len()).unwrap_or(start);
        TextRange::new(start, end.max(start))
    }

    #[inline]
    pub fn start_byte(&self) -> usize {
        self.trimmed_range().start().into()
    }

    #[inline]
    pub fn end_byte(&self) -> usize {
        self.trimmed_range().end().into()
    }

    /// Returns the node text excluding trivia.
    pub fn utf8_text<'a>(&self, source: &'a [u8]) -> Result<&'a str, std::str::Utf8Error> {
        let range = self.trimmed_range();
        let bytes = source.get(usize::from(range.start())..usize::from(range.end())).unwrap_or_default();
        std::str::from_utf8(bytes)
    }

    /// Returns the parent node.
    #[inline]
    pub fn parent(&self) -> Option<SyntaxNode> {
        self.data.parent.clone()
    }

    /// Returns an iterator over this node and its ancestors.
    pub fn ancestors(&self) -> impl Iterator<Item = SyntaxNode> + use<> {
        std::iter::successors(Some(self.clone()), SyntaxNode::parent)
    }

    /// Position among the parent's children.
    #[inline]
    pub fn index(&self) -> usize {
        self.data.index as usize
    }

    #[inline]
    pub fn child_count(&self) -> usize {
        self.green().children().len()
    }

    pub fn child(&self, index: usize) -> Option<SyntaxNode> {
        self.new_child(index)
    }

    pub fn first_child(&self) -> Option<SyntaxNode> {
        self.new_child(0)
    }

    pub fn last_child(&self) -> Option<SyntaxNode> {
        self.new_child(self.child_count().checked_sub(1)?)
    }

    pub fn children(&self) -> SyntaxNodeChildren {
        SyntaxNodeChildren { parent: self.clone(), next: 0 }
    }

    pub fn named_child_count(&self) -> usize {
        self.green().children().iter().filter(|child| child.node.is_named()).count()
    }

    pub fn named_child(&self, index: usize) -> Option<SyntaxNode> {
        self.named_children().nth(index)
    }

    pub fn named_children(&self) -> impl Iterator<Item = SyntaxNode> + use<> {
        self.children().filter(SyntaxNode::is_named)
    }

    pub fn next_sibling(&self) -> Option<SyntaxNode> {
        self.parent()?.new_child(self.index() + 1)
    }

    pub fn prev_sibling(&self) -> Option<SyntaxNode> {
        self.parent()?.new_child(self.index().checked_sub(1)?)
    }

    pub fn next_named_sibling(&self) -> Option<SyntaxNode> {
        std::iter::successors(self.next_sibling(), SyntaxNode::next_sibling)
            .find(SyntaxNode::is_named)
    }

    pub fn prev_named_sibling(&self) -> Option<SyntaxNode> {
        std::iter::successors(self.prev_sibling(), SyntaxNode::prev_sibling)
            .find(SyntaxNode::is_named)
    }

    /// The field under which the parent holds this node.
    pub fn field_id(&self) -> Option<FieldId> {
        self.data.field
    }

    pub fn field_name(&self) -> Option<&str> {
        self.data.field.map(|field| self.data.language.field_name(field))
    }

    pub fn field_name_for_child(&self, index: usize) -> Option<&str> {
        let field = self.green().children().get(index)?.field?;
        Some(self.data.language.field_name(field))
    }

    pub fn child_by_field_id(&self, field: FieldId) -> Option<SyntaxNode> {
        let index = self.green().children().iter().position(|child| child.field == Some(field))?;
        self.new_child(index)
    }

    pub fn child_by_field_name(&self, name: &str) -> Option<SyntaxNode> {
        self.child_by_field_id(self.data.language.field_id(name)?)
    }

    pub fn children_by_field_name(&self, name: &str) -> impl Iterator<Item = SyntaxNode> + use<> {
        let field = self.data.language.field_id(name);
        self.children().filter(move |child| field.is_some() && child.field_id() == field)
    }

    /// Returns the smallest descendant whose range, trivia included, contains
    /// `start..end`. At a boundary between two nodes the later one wins.
    pub fn descendant_for_byte_range(&self, start: usize, end: usize) -> Option<SyntaxNode> {
        self.descendant_where(start, end, |_| true)
    }

    /// Like `descendant_for_byte_range`, but only stops at named nodes.
    pub fn named_descendant_for_byte_range(&self, start: usize, end: usize) -> Option<SyntaxNode> {
        self.descendant_where(start, end, SyntaxNode::is_named)
    }

    pub fn descendant_at_offset(&self, offset: usize) -> Option<SyntaxNode> {
        self.descendant_for_byte_range(offset, offset)
    }

    fn descendant_where(
        &self,
        start: usize,
        end: usize,
        accept: impl Fn(&SyntaxNode) -> bool,
    ) -> Option<SyntaxNode> {
        if end < start {
            return None;
        }
        let start = TextSize::new(start as u32);
        let end = TextSize::new(end as u32);
        let range = self.text_range();
        if start < range.start() || end > range.end() {
            return None;
        }

        let mut node = self.clone();
        let mut found = accept(&node).then(|| node.clone());
        loop {
            let children = node.green().children();
            let relative_start = start - node.data.offset;
            let relative_end = end - node.data.offset;
            let index = children.partition_point(|child| child.offset <= relative_start);
            let Some(index) = index.checked_sub(1) else { break };
            if relative_end > children[index].end() {
                break;
            }
            let Some(child) = node.new_child(index) else { break };
            if accept(&child) {
                found = Some(child.clone());
            }
            node = child;
        }
        found
    }

    /// Pre-order traversal of this subtree.
    pub fn preorder(&self) -> Preorder {
        Preorder::new(self.clone())
    }

    /// Iterates over all descendants in pre-order, starting with `self`.
    pub fn descendants(&self) -> impl Iterator<Item = SyntaxNode> + use<> {
        self.preorder().filter_map(|event| match event {
            crate::WalkEvent::Enter(node) => Some(node),
            crate::WalkEvent::Leave(_) => None,
        })
    }

    /// Renders the subtree as an S-expression. Named nodes print as
    /// `(kind children...)`, anonymous nodes as their quoted text.
    pub fn to_sexp(&self) -> String {
        let mut out = String::new();
        self.write_sexp(&mut out);
        out
    }

    fn write_sexp(&self, out: &mut String) {
        let name = self.kind();
        if self.is_missing() {
            out.push_str("(MISSING ");
            if self.is_named() {
                out.push_str(name);
            } else {
                write_quoted(out, name);
            }
            out.push(')');
            return;
        }
        if !self.is_named() && !self.is_error() {
            write_quoted(out, name);
            return;
        }
        out.push('(');
        out.push_str(name);
        for child in self.children() {
            let green = child.green();
            if green.is_leaf() && !green.is_visible() && !green.is_missing() {
                continue;
            }
            out.push(' ');
            child.write_sexp(out);
        }
        out.push(')');
    }
}

fn write_quoted(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => {
                let _ = write!(out, "{}", c.escape_default());
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

impl PartialEq for SyntaxNode {
    fn eq(&self, other: &Self) -> bool {
        self.data.offset == other.data.offset
            && self.data.version == other.data.version
            && self.green().ptr_eq(other.green())
    }
}

impl Eq for SyntaxNode {}

impl fmt::Debug for SyntaxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:?}", self.kind(), self.text_range())
    }
}

/// Iterator over the children of a node.
#[derive(Clone)]
pub struct SyntaxNodeChildren {
    parent: SyntaxNode,
    next: usize,
}

impl Iterator for SyntaxNodeChildren {
    type Item = SyntaxNode;

    fn next(&mut self) -> Option<SyntaxNode> {
        let child = self.parent.new_child(self.next)?;
        self.next += 1;
        Some(child)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.parent.child_count().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SyntaxNodeChildren {}
