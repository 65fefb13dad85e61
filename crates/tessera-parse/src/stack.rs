//! Graph-structured stack shared by all parse heads.
//!
//! Each stack node records the state reached after pushing a subtree. Heads
//! that reach the same state at the same position share one node with
//! several links, so later reductions see every alternative below it.

use la_arena::{Arena, Idx};
use smallvec::SmallVec;
use tessera_grammar::StateId;
use tessera_syntax::GreenNode;
use text_size::TextSize;

pub(crate) type StackId = Idx<StackNode>;

/// Upper bound on the paths a single reduction explores.
const MAX_PATHS: usize = 16;

#[derive(Clone, Debug)]
pub(crate) struct Link {
    pub(crate) prev: StackId,
    pub(crate) subtree: GreenNode,
}

#[derive(Debug)]
pub(crate) struct StackNode {
    pub(crate) state: StateId,
    pub(crate) position: TextSize,
    pub(crate) links: SmallVec<[Link; 2]>,
    /// Error cost of the cheapest path down to the base.
    pub(crate) error_cost: u32,
    pub(crate) dynamic_precedence: i32,
}

/// The subtrees popped along one path, bottom first.
#[derive(Debug)]
pub(crate) struct Path {
    pub(crate) base: StackId,
    pub(crate) subtrees: Vec<GreenNode>,
    /// Extras that sat above the popped subtrees. They are pushed back after
    /// the reduced node instead of becoming its children.
    pub(crate) trailing_extras: Vec<GreenNode>,
}

pub(crate) struct Stack {
    nodes: Arena<StackNode>,
}

impl std::ops::Index<StackId> for Stack {
    type Output = StackNode;

    fn index(&self, id: StackId) -> &StackNode {
        &self.nodes[id]
    }
}

impl Stack {
    /// Creates a stack holding only the start state. Returns the base node.
    pub(crate) fn new(start_state: StateId) -> (Self, StackId) {
        let mut nodes = Arena::new();
        let base = nodes.alloc(StackNode {
            state: start_state,
            position: TextSize::new(0),
            links: SmallVec::new(),
            error_cost: 0,
            dynamic_precedence: 0,
        });
        (Self { nodes }, base)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn push(&mut self, prev: StackId, subtree: GreenNode, state: StateId) -> StackId {
        let below = &self.nodes[prev];
        let node = StackNode {
            state,
            position: below.position + subtree.text_len(),
            error_cost: below.error_cost.saturating_add(subtree.error_cost()),
            dynamic_precedence: below.dynamic_precedence + subtree.dynamic_precedence(),
            links: SmallVec::from_iter([Link { prev, subtree }]),
        };
        self.nodes.alloc(node)
    }

    /// Adds another way of reaching `node`. Returns `true` if the node
    /// changed and its reductions need to be explored again.
    pub(crate) fn add_link(&mut self, node: StackId, prev: StackId, subtree: GreenNode) -> bool {
        if node == prev || self.reaches(prev, node) {
            return false;
        }
        let cost = self.nodes[prev].error_cost.saturating_add(subtree.error_cost());
        let precedence = self.nodes[prev].dynamic_precedence + subtree.dynamic_precedence();

        let target = &mut self.nodes[node];
        if let Some(existing) = target.links.iter_mut().find(|link| link.prev == prev) {
            // Same predecessor: an ambiguity. The first derivation wins ties.
            if !prefer(&subtree, &existing.subtree) {
                return false;
            }
            existing.subtree = subtree;
        } else {
            target.links.push(Link { prev, subtree });
        }
        target.error_cost = target.error_cost.min(cost);
        target.dynamic_precedence = target.dynamic_precedence.max(precedence);
        true
    }

    /// `true` if `target` lies below `from` without leaving `from`'s
    /// position.
    fn reaches(&self, from: StackId, target: StackId) -> bool {
        let position = self.nodes[from].position;
        let mut pending = vec![from];
        while let Some(id) = pending.pop() {
            if id == target {
                return true;
            }
            for link in &self.nodes[id].links {
                if self.nodes[link.prev].position == position {
                    pending.push(link.prev);
                }
            }
        }
        false
    }

    /// Pops `count` subtrees along every path from `top`. Extras do not
    /// count towards `count`.
    pub(crate) fn pop(&self, top: StackId, count: usize) -> Vec<Path> {
        let mut paths = Vec::new();
        let mut pending = vec![(top, Vec::new(), 0)];
        while let Some((id, mut collected, counted)) = pending.pop() {
            if counted == count {
                paths.push(finish_path(id, collected));
                if paths.len() >= MAX_PATHS {
                    break;
                }
                continue;
            }
            let links = &self.nodes[id].links;
            for (index, link) in links.iter().enumerate().rev() {
                let mut subtrees = if index == 0 { std::mem::take(&mut collected) } else { collected.clone() };
                let counted = counted + usize::from(!link.subtree.is_extra());
                subtrees.push(link.subtree.clone());
                pending.push((link.prev, subtrees, counted));
            }
        }
        paths
    }

    /// Links along the first path from `top`, top first.
    pub(crate) fn first_path(&self, top: StackId) -> impl Iterator<Item = &Link> + '_ {
        std::iter::successors(self.nodes[top].links.first(), |link| {
            self.nodes[link.prev].links.first()
        })
    }

    /// States along the first path, bottom first, one per non-extra entry.
    pub(crate) fn first_path_states(&self, top: StackId) -> Vec<StateId> {
        let mut states = vec![self.nodes[top].state];
        for link in self.first_path(top) {
            if !link.subtree.is_extra() {
                states.push(self.nodes[link.prev].state);
            }
        }
        states.reverse();
        states
    }
}

/// Orders alternatives for the same span: lower error cost, then higher
/// dynamic precedence.
pub(crate) fn prefer(candidate: &GreenNode, existing: &GreenNode) -> bool {
    (candidate.error_cost(), -candidate.dynamic_precedence())
        < (existing.error_cost(), -existing.dynamic_precedence())
}

fn finish_path(base: StackId, mut collected: Vec<GreenNode>) -> Path {
    // `collected` is top first; the leading extras are the trailing ones.
    let trailing = collected.iter().take_while(|subtree| subtree.is_extra()).count();
    let mut trailing_extras: Vec<GreenNode> = collected.drain(..trailing).collect();
    trailing_extras.reverse();
    collected.reverse();
    Path { base, subtrees: collected, trailing_extras }
}
