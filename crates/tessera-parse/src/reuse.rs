//! Walks an edited tree in byte order, offering its subtrees for reuse.

use tessera_syntax::GreenNode;
use text_size::TextSize;

pub(crate) struct ReuseCursor {
    /// Parents being walked, with their start and the next child index.
    stack: Vec<(GreenNode, TextSize, usize)>,
    current: Option<(GreenNode, TextSize)>,
}

impl ReuseCursor {
    pub(crate) fn new(root: &GreenNode) -> Self {
        Self { stack: Vec::new(), current: Some((root.clone(), TextSize::new(0))) }
    }

    /// The first node starting exactly at `position`, skipping whatever ends
    /// before it. Returns `None` once the walk is past `position`.
    pub(crate) fn candidate(&mut self, position: TextSize) -> Option<GreenNode> {
        loop {
            let (node, start) = self.current.as_ref()?;
            let end = *start + node.text_len();
            if *start > position {
                return None;
            }
            if *start < position || node.text_len() == TextSize::new(0) {
                if end > position && !node.is_leaf() {
                    self.descend();
                } else {
                    self.advance();
                }
                continue;
            }
            return Some(node.clone());
        }
    }

    /// Moves past the current node.
    pub(crate) fn advance(&mut self) {
        self.current = None;
        while let Some((parent, start, index)) = self.stack.last_mut() {
            if let Some(child) = parent.children().get(*index) {
                *index += 1;
                self.current = Some((child.node.clone(), *start + child.offset));
                return;
            }
            self.stack.pop();
        }
    }

    /// Moves to the first child of the current node.
    pub(crate) fn descend(&mut self) {
        if let Some((node, start)) = self.current.take() {
            self.stack.push((node, start, 0));
        }
        self.advance();
    }
}

#[cfg(test)]
mod tests {
    use tessera_grammar::Symbol;
    use tessera_syntax::{GreenTrivia, LeafInfo, NO_LEX_MODE, NodeFlags, NodeInfo};

    use super::*;

    fn leaf(len: u32) -> GreenNode {
        GreenNode::leaf(LeafInfo {
            symbol: Symbol(2),
            kind: Symbol(2),
            flags: NodeFlags::VISIBLE,
            leading: GreenTrivia::empty(),
            text_len: len.into(),
            trailing: GreenTrivia::empty(),
            lookahead: 0.into(),
            parse_state: 0,
            lex_mode: NO_LEX_MODE,
            next_lex_mode: NO_LEX_MODE,
        })
    }

    fn node(children: Vec<GreenNode>) -> GreenNode {
        let info = NodeInfo {
            symbol: Symbol(3),
            kind: Symbol(3),
            flags: NodeFlags::VISIBLE | NodeFlags::NAMED,
            parse_state: 0,
            dynamic_precedence: 0,
        };
        GreenNode::node(info, children.into_iter().map(|child| (None, child)))
    }

    #[test]
    fn offers_largest_node_at_each_position() {
        // root [0, 4) = inner [0, 2) + leaf [2, 3) + leaf [3, 4)
        let inner = node(vec![leaf(1), leaf(1)]);
        let root = node(vec![inner.clone(), leaf(1), leaf(1)]);
        let mut cursor = ReuseCursor::new(&root);

        assert!(cursor.candidate(0.into()).unwrap().ptr_eq(&root));
        cursor.descend();
        assert!(cursor.candidate(0.into()).unwrap().ptr_eq(&inner));
        cursor.advance();
        assert!(cursor.candidate(1.into()).is_none());
        let third = cursor.candidate(2.into()).unwrap();
        assert!(third.is_leaf());
        cursor.advance();
        assert!(cursor.candidate(3.into()).unwrap().is_leaf());
        cursor.advance();
        assert!(cursor.candidate(4.into()).is_none());
    }

    #[test]
    fn descends_into_nodes_straddling_the_position() {
        let inner = node(vec![leaf(1), leaf(2)]);
        let root = node(vec![inner, leaf(1)]);
        let mut cursor = ReuseCursor::new(&root);
        let found = cursor.candidate(1.into()).unwrap();
        assert_eq!(found.text_len(), 2.into());
    }
}
