//! The GLR driver.
//!
//! All live heads sit at the same byte position and see the same lookahead
//! token. Reductions run until every head has either shifted, accepted or
//! failed; when all of them fail the cheapest head is recovered.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::time::Instant;

use smallvec::SmallVec;
use tessera_grammar::{Action, FieldId, Language, ProductionId, StateId, Symbol};
use tessera_syntax::{GreenNode, LeafInfo, NO_LEX_MODE, NodeFlags, NodeInfo, Tree};
use tessera_tokenizer::{Lexer, Token};
use text_size::{TextRange, TextSize};

use crate::reuse::ReuseCursor;
use crate::stack::{Stack, StackId, prefer};
use crate::{Limit, ParseError, ParseOptions};

const MAX_HEADS: usize = 6;
const MAX_MISSING_STREAK: u32 = 3;
const MAX_RECOVERIES_PER_TOKEN: u32 = 8;
const MAX_SIMULATED_REDUCTIONS: usize = 256;

pub(crate) struct ParseRun<'a> {
    language: &'a Language,
    lexer: Lexer<'a>,
    stack: Stack,
    heads: Vec<StackId>,
    position: TextSize,
    after_trivia: bool,
    /// Mode for the next token, taken from the last reused node.
    pending_lex_mode: Option<u32>,
    reuse: Option<ReuseCursor>,
    /// Reused nodes not yet followed by a consumed token, oldest first.
    unconfirmed: Vec<Backtrack>,
    budget: Budget<'a>,
    missing_streak: u32,
    recoveries: u32,
    result: Option<GreenNode>,
    stats: Stats,
}

/// Parser position before a subtree was reused.
#[derive(Debug)]
struct Backtrack {
    head: StackId,
    position: TextSize,
    after_trivia: bool,
    pending_lex_mode: Option<u32>,
}

#[derive(Debug, Default)]
struct Stats {
    reused_nodes: u32,
    reused_leaves: u32,
    recoveries: u32,
}

struct Budget<'a> {
    options: &'a ParseOptions,
    operations: u64,
    deadline: Option<Instant>,
}

impl Budget<'_> {
    fn tick(&mut self) -> Result<(), ParseError> {
        self.operations += 1;
        let limit = if self.options.max_operations.is_some_and(|max| self.operations > max) {
            Limit::Operations
        } else if self.options.cancellation.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            Limit::Cancelled
        } else if self.operations % 64 == 1 && self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            Limit::Timeout
        } else {
            return Ok(());
        };
        tracing::debug!(operations = self.operations, %limit, "parse aborted");
        Err(ParseError::ResourceExceeded { limit })
    }
}

/// Outcome of feeding one token to the heads.
enum Step {
    Consumed,
    Failed,
}

impl<'a> ParseRun<'a> {
    pub(crate) fn new(
        language: &'a Language,
        text: &'a [u8],
        old_tree: Option<&Tree>,
        options: &'a ParseOptions,
    ) -> Self {
        let (stack, base) = Stack::new(language.start_state());
        let reuse = old_tree
            .filter(|tree| tree.language() == language)
            .map(|tree| ReuseCursor::new(tree.root_green()));
        Self {
            language,
            lexer: Lexer::new(language, text),
            stack,
            heads: vec![base],
            position: TextSize::new(0),
            after_trivia: false,
            pending_lex_mode: None,
            reuse,
            unconfirmed: Vec::new(),
            budget: Budget {
                options,
                operations: 0,
                deadline: options.timeout.map(|timeout| Instant::now() + timeout),
            },
            missing_streak: 0,
            recoveries: 0,
            result: None,
            stats: Stats::default(),
        }
    }

    pub(crate) fn run(mut self) -> Result<GreenNode, ParseError> {
        loop {
            if let Some(root) = self.result.take() {
                return Ok(self.finish(root));
            }
            self.budget.tick()?;

            let mut token = None;
            if self.heads.len() == 1 {
                if let Some(node) = self.reusable_node() {
                    if node.is_leaf() {
                        self.stats.reused_leaves += 1;
                        token = Some(self.token_from_leaf(&node));
                    } else {
                        self.push_reused(node);
                        continue;
                    }
                }
            }
            let token = match token {
                Some(token) => token,
                None => self.lex(),
            };
            self.consume(&token)?;
        }
    }

    fn finish(&self, root: GreenNode) -> GreenNode {
        let len = TextSize::new(self.lexer.text().len() as u32);
        let root = if root.text_len() < len { root.with_text_len(len) } else { root };
        tracing::debug!(
            language = self.language.name(),
            bytes = u32::from(len),
            operations = self.budget.operations,
            stack_nodes = self.stack.len(),
            reused_nodes = self.stats.reused_nodes,
            reused_leaves = self.stats.reused_leaves,
            recoveries = self.stats.recoveries,
            error_cost = root.error_cost(),
            "parsed"
        );
        root
    }

    fn lex(&mut self) -> Token {
        let modes: SmallVec<[u32; 4]> = match self.pending_lex_mode.take() {
            Some(mode) => SmallVec::from_elem(mode, 1),
            None => {
                let mut modes = SmallVec::new();
                for &head in &self.heads {
                    let mode = self.language.lex_mode_id(self.stack[head].state);
                    if !modes.contains(&mode) {
                        modes.push(mode);
                    }
                }
                modes
            }
        };
        self.lexer.next_token(self.position, &modes, self.after_trivia)
    }

    /// Feeds `token` to the heads, recovering until it is consumed or the
    /// parse is finished.
    fn consume(&mut self, token: &Token) -> Result<(), ParseError> {
        self.pending_lex_mode = None;
        let lex_state = self.stack[self.heads[0]].state;
        loop {
            match self.advance(token, lex_state)? {
                Step::Consumed => {
                    self.unconfirmed.clear();
                    return Ok(());
                }
                Step::Failed => {
                    // Undo the last reused subtree and parse its text instead,
                    // so recovery sees the same stack as a fresh parse.
                    if let Some(backtrack) = self.unconfirmed.pop() {
                        tracing::trace!(position = u32::from(backtrack.position), "backtracking");
                        self.heads = vec![backtrack.head];
                        self.position = backtrack.position;
                        self.after_trivia = backtrack.after_trivia;
                        self.pending_lex_mode = backtrack.pending_lex_mode;
                        return Ok(());
                    }
                    if !self.recover(token)? {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn advance(&mut self, token: &Token, lex_state: StateId) -> Result<Step, ParseError> {
        let language = self.language;
        let mut active = self.heads.clone();
        let mut queue: VecDeque<StackId> = self.heads.iter().copied().collect();
        let mut shifts: Vec<(StackId, StateId)> = Vec::new();
        let mut accepts: Vec<StackId> = Vec::new();
        let mut forked = self.heads.len() > 1;

        while let Some(head) = queue.pop_front() {
            let actions = language.actions(self.stack[head].state, token.symbol);
            forked |= actions.len() > 1;
            for &action in actions {
                match action {
                    Action::Shift { state } => {
                        if !shifts.contains(&(head, state)) {
                            shifts.push((head, state));
                        }
                    }
                    Action::Reduce { production } => {
                        self.reduce(head, production, forked, &mut active, &mut queue)?;
                    }
                    Action::Accept => {
                        if !accepts.contains(&head) {
                            accepts.push(head);
                        }
                    }
                }
            }
        }

        if !accepts.is_empty() {
            self.accept(&accepts);
            return Ok(Step::Consumed);
        }
        if shifts.is_empty() {
            return Ok(Step::Failed);
        }

        let fragile = forked || shifts.len() > 1;
        let mut heads: Vec<StackId> = Vec::with_capacity(shifts.len());
        for (head, target) in shifts {
            self.budget.tick()?;
            tracing::trace!(symbol = language.symbol_name(token.symbol), state = target, "shift");
            let leaf = self.leaf(token, lex_state, target, fragile);
            let existing = heads.iter().copied().find(|&id| self.stack[id].state == target);
            match existing {
                Some(existing) => {
                    self.stack.add_link(existing, head, leaf);
                }
                None => heads.push(self.stack.push(head, leaf, target)),
            }
        }
        if heads.len() > MAX_HEADS {
            heads.sort_by_key(|&id| (self.stack[id].error_cost, -self.stack[id].dynamic_precedence));
            heads.truncate(MAX_HEADS);
        }

        self.heads = heads;
        self.position = token.end();
        self.after_trivia = !token.trailing.is_empty();
        self.missing_streak = 0;
        self.recoveries = 0;
        Ok(Step::Consumed)
    }

    fn reduce(
        &mut self,
        head: StackId,
        production: ProductionId,
        fragile: bool,
        active: &mut Vec<StackId>,
        queue: &mut VecDeque<StackId>,
    ) -> Result<(), ParseError> {
        let language = self.language;
        let info = language.production(production);
        for path in self.stack.pop(head, info.len()) {
            self.budget.tick()?;
            let base_state = self.stack[path.base].state;
            let Some(target) = language.goto(base_state, info.lhs) else { continue };
            tracing::trace!(
                symbol = language.symbol_name(info.lhs),
                production,
                state = target,
                "reduce"
            );
            let node = build_node(language, production, base_state, &path.subtrees, fragile);
            let mut top = self.push_merged(path.base, node, target, active, queue);
            for extra in path.trailing_extras {
                top = self.push_merged(top, extra, target, active, queue);
            }
        }
        Ok(())
    }

    /// Pushes `subtree`, merging with an active node that already has the
    /// same state at the current position.
    fn push_merged(
        &mut self,
        prev: StackId,
        subtree: GreenNode,
        state: StateId,
        active: &mut Vec<StackId>,
        queue: &mut VecDeque<StackId>,
    ) -> StackId {
        let position = self.stack[prev].position + subtree.text_len();
        if position != self.position {
            return self.stack.push(prev, subtree, state);
        }
        let existing = active.iter().copied().find(|&id| self.stack[id].state == state);
        if let Some(existing) = existing {
            if self.stack.add_link(existing, prev, subtree) && !queue.contains(&existing) {
                queue.push_back(existing);
            }
            return existing;
        }
        let id = self.stack.push(prev, subtree, state);
        active.push(id);
        queue.push_back(id);
        id
    }

    fn accept(&mut self, accepts: &[StackId]) {
        let mut best: Option<GreenNode> = None;
        for &head in accepts {
            let root = self.root_from(head);
            if best.as_ref().is_none_or(|best| prefer(&root, best)) {
                best = Some(root);
            }
        }
        self.result = best;
    }

    /// The accepted root, with extras left around it moved inside.
    fn root_from(&self, head: StackId) -> GreenNode {
        let mut subtrees: Vec<GreenNode> =
            self.stack.first_path(head).map(|link| link.subtree.clone()).collect();
        subtrees.reverse();
        let Some(index) = subtrees.iter().position(|subtree| !subtree.is_extra()) else {
            return self.error_root(head);
        };
        let root = subtrees[index].clone();
        if subtrees.len() == 1 {
            return root;
        }

        let before = subtrees[..index].iter().map(|extra| (None, extra.clone()));
        let inner = root.children().iter().map(|child| (child.field, child.node.clone()));
        let after = subtrees[index + 1..].iter().map(|extra| (None, extra.clone()));
        GreenNode::node(
            NodeInfo {
                symbol: root.symbol(),
                kind: root.kind(),
                flags: visibility_flags(root.is_named(), root.is_visible()),
                parse_state: root.parse_state(),
                dynamic_precedence: 0,
            },
            before.chain(inner).chain(after),
        )
    }

    /// Wraps everything on the first path of `head` in an `ERROR` root.
    fn error_root(&self, head: StackId) -> GreenNode {
        let mut subtrees: Vec<GreenNode> =
            self.stack.first_path(head).map(|link| link.subtree.clone()).collect();
        subtrees.reverse();
        error_node(subtrees.into_iter().map(|subtree| (None, subtree)), false, self.stack[head].state)
    }

    /// Tries, in order: assuming a missing terminal, popping entries into an
    /// `ERROR` node, skipping the token. Returns `true` if `token` should be
    /// fed again.
    fn recover(&mut self, token: &Token) -> Result<bool, ParseError> {
        self.budget.tick()?;
        self.stats.recoveries += 1;
        self.recoveries += 1;

        let best = self
            .heads
            .iter()
            .copied()
            .min_by_key(|&id| (self.stack[id].error_cost, -self.stack[id].dynamic_precedence))
            .unwrap_or(self.heads[0]);
        self.heads = vec![best];
        tracing::trace!(
            symbol = self.language.symbol_name(token.symbol),
            position = u32::from(self.position),
            state = self.stack[best].state,
            "recovering"
        );

        if self.recoveries <= MAX_RECOVERIES_PER_TOKEN && token.symbol != Symbol::ERROR {
            if self.missing_streak < MAX_MISSING_STREAK && self.insert_missing(best, token.symbol) {
                self.missing_streak += 1;
                return Ok(true);
            }
            if self.pop_until_valid(best, token.symbol) {
                return Ok(true);
            }
        }

        if token.is_end() {
            self.result = Some(self.error_root(best));
        } else {
            self.skip(best, token);
        }
        Ok(false)
    }

    fn insert_missing(&mut self, head: StackId, lookahead: Symbol) -> bool {
        let language = self.language;
        let state = self.stack[head].state;
        let states = self.stack.first_path_states(head);
        for terminal in language.shiftable_terminals(state) {
            let Some(target) = language.actions(state, terminal).iter().find_map(|action| match action {
                Action::Shift { state } => Some(*state),
                _ => None,
            }) else {
                continue;
            };
            if !self.accepted_after(&states, target, lookahead) {
                continue;
            }
            let info = language.symbol_info(terminal);
            let leaf = GreenNode::missing(terminal, terminal, visibility_flags(info.named, info.visible), state);
            tracing::trace!(symbol = language.symbol_name(terminal), "inserted missing");
            self.heads = vec![self.stack.push(head, leaf, target)];
            return true;
        }
        false
    }

    /// Simulates the first action path after shifting into `target` and
    /// reports whether `lookahead` would then be shifted or accepted.
    fn accepted_after(&self, states: &[StateId], target: StateId, lookahead: Symbol) -> bool {
        let language = self.language;
        let mut states = states.to_vec();
        states.push(target);
        for _ in 0..MAX_SIMULATED_REDUCTIONS {
            let Some(&top) = states.last() else { return false };
            let actions = language.actions(top, lookahead);
            if actions.iter().any(|action| matches!(action, Action::Shift { .. } | Action::Accept)) {
                return true;
            }
            let Some(production) = actions.iter().find_map(|action| match action {
                Action::Reduce { production } => Some(*production),
                _ => None,
            }) else {
                return false;
            };
            let production = language.production(production);
            if production.len() >= states.len() {
                return false;
            }
            states.truncate(states.len() - production.len());
            let Some(&base) = states.last() else { return false };
            let Some(next) = language.goto(base, production.lhs) else { return false };
            states.push(next);
        }
        false
    }

    fn pop_until_valid(&mut self, head: StackId, lookahead: Symbol) -> bool {
        let language = self.language;
        let mut popped = Vec::new();
        let mut base = None;
        for link in self.stack.first_path(head) {
            popped.push(link.subtree.clone());
            if !language.actions(self.stack[link.prev].state, lookahead).is_empty() {
                base = Some(link.prev);
                break;
            }
        }
        let Some(base) = base else { return false };
        popped.reverse();
        let state = self.stack[base].state;
        let error = error_node(popped.into_iter().map(|subtree| (None, subtree)), true, state);
        tracing::trace!(len = u32::from(error.text_len()), "popped into error");
        self.heads = vec![self.stack.push(base, error, state)];
        true
    }

    /// Wraps the token in an `ERROR` node, extending the one directly below
    /// if there is one.
    fn skip(&mut self, head: StackId, token: &Token) {
        let language = self.language;
        let state = self.stack[head].state;
        let leaf = if token.is_error() {
            // Unrecognized text: kept in the tree but not shown.
            GreenNode::leaf(LeafInfo {
                symbol: Symbol::ERROR,
                kind: Symbol::ERROR,
                flags: NodeFlags::empty(),
                leading: token.leading.clone(),
                text_len: token.kind_range.len(),
                trailing: token.trailing.clone(),
                lookahead: token.lookahead(),
                parse_state: state,
                lex_mode: token.lex_mode,
                next_lex_mode: language.lex_mode_id(state),
            })
        } else {
            self.leaf(token, state, state, true)
        };

        let previous = self.stack[head]
            .links
            .first()
            .filter(|link| link.subtree.is_extra() && link.subtree.is_error() && !link.subtree.is_leaf())
            .cloned();
        let (base, mut children): (StackId, Vec<_>) = match previous {
            Some(link) => (
                link.prev,
                link.subtree.children().iter().map(|child| (child.field, child.node.clone())).collect(),
            ),
            None => (head, Vec::new()),
        };
        children.push((None, leaf));
        let error = error_node(children, true, state);
        tracing::trace!(symbol = language.symbol_name(token.symbol), "skipped token");

        self.heads = vec![self.stack.push(base, error, state)];
        self.position = token.end();
        self.after_trivia = !token.trailing.is_empty();
        self.missing_streak = 0;
        self.recoveries = 0;
    }

    fn leaf(&self, token: &Token, lex_state: StateId, target: StateId, fragile: bool) -> GreenNode {
        let info = self.language.symbol_info(token.symbol);
        let mut flags = visibility_flags(info.named, info.visible);
        if fragile {
            flags |= NodeFlags::FRAGILE;
        }
        GreenNode::leaf(LeafInfo {
            symbol: token.symbol,
            kind: token.symbol,
            flags,
            leading: token.leading.clone(),
            text_len: token.kind_range.len(),
            trailing: token.trailing.clone(),
            lookahead: token.lookahead(),
            parse_state: lex_state,
            lex_mode: token.lex_mode,
            next_lex_mode: self.language.lex_mode_id(target),
        })
    }

    /// Next subtree of the old tree that can stand in for parsing at the
    /// current position.
    fn reusable_node(&mut self) -> Option<GreenNode> {
        let language = self.language;
        let state = self.stack[self.heads[0]].state;
        let mode = self.pending_lex_mode.unwrap_or_else(|| language.lex_mode_id(state));
        let after_trivia = self.after_trivia;
        let cursor = self.reuse.as_mut()?;
        loop {
            let node = cursor.candidate(self.position)?;
            if can_reuse(language, &node, state, mode, after_trivia) {
                cursor.advance();
                return Some(node);
            }
            if node.is_leaf() || node.children().is_empty() {
                cursor.advance();
                return None;
            }
            cursor.descend();
        }
    }

    fn push_reused(&mut self, node: GreenNode) {
        let head = self.heads[0];
        let state = self.stack[head].state;
        let Some(target) = self.language.goto(state, node.symbol()) else { return };
        tracing::trace!(
            symbol = self.language.symbol_name(node.symbol()),
            len = u32::from(node.text_len()),
            "reused node"
        );
        self.stats.reused_nodes += 1;
        self.unconfirmed.push(Backtrack {
            head,
            position: self.position,
            after_trivia: self.after_trivia,
            pending_lex_mode: self.pending_lex_mode,
        });
        self.position += node.text_len();
        self.after_trivia = node.trailing_len() > TextSize::new(0);
        self.pending_lex_mode = Some(node.next_lex_mode());
        self.missing_streak = 0;
        self.recoveries = 0;
        self.heads[0] = self.stack.push(head, node, target);
    }

    fn token_from_leaf(&self, leaf: &GreenNode) -> Token {
        let start = self.position;
        let end = start + leaf.text_len();
        Token {
            leading: leaf.leading_trivia().clone(),
            symbol: leaf.symbol(),
            kind_range: TextRange::new(start + leaf.leading_len(), end - leaf.trailing_len()),
            trailing: leaf.trailing_trivia().clone(),
            lookahead_end: end + leaf.lookahead(),
            lex_mode: leaf.lex_mode(),
        }
    }
}

fn can_reuse(language: &Language, node: &GreenNode, state: StateId, mode: u32, after_trivia: bool) -> bool {
    if node.has_changes() || node.is_fragile() || node.is_missing() || node.is_error() || node.is_extra() {
        return false;
    }
    if node.lex_mode() == NO_LEX_MODE || node.lex_mode() != mode {
        return false;
    }
    if node.is_leaf() {
        return !(after_trivia && language.is_immediate(node.symbol()));
    }
    node.parse_state() == state
        && node.next_lex_mode() != NO_LEX_MODE
        && language.goto(state, node.symbol()).is_some()
}

fn visibility_flags(named: bool, visible: bool) -> NodeFlags {
    let mut flags = NodeFlags::empty();
    if named {
        flags |= NodeFlags::NAMED;
    }
    if visible {
        flags |= NodeFlags::VISIBLE;
    }
    flags
}

fn error_node(
    children: impl IntoIterator<Item = (Option<FieldId>, GreenNode)>,
    extra: bool,
    parse_state: StateId,
) -> GreenNode {
    let mut flags = NodeFlags::NAMED | NodeFlags::VISIBLE | NodeFlags::ERROR;
    if extra {
        flags |= NodeFlags::EXTRA;
    }
    let info = NodeInfo {
        symbol: Symbol::ERROR,
        kind: Symbol::ERROR,
        flags,
        parse_state,
        dynamic_precedence: 0,
    };
    GreenNode::node(info, children)
}

fn build_node(
    language: &Language,
    production: ProductionId,
    base_state: StateId,
    subtrees: &[GreenNode],
    fragile: bool,
) -> GreenNode {
    let production = language.production(production);
    let info = language.symbol_info(production.lhs);
    let mut flags = visibility_flags(info.named, info.visible);
    if fragile {
        flags |= NodeFlags::FRAGILE;
    }
    let mut slots = production.children.iter();
    let children = subtrees.iter().map(|subtree| {
        if subtree.is_extra() {
            return (None, subtree.clone());
        }
        let slot = slots.next().copied().unwrap_or_default();
        let node = match slot.alias {
            Some(alias) => subtree.aliased(alias, language.is_named(alias)),
            None => subtree.clone(),
        };
        (slot.field, node)
    });
    GreenNode::node(
        NodeInfo {
            symbol: production.lhs,
            kind: production.lhs,
            flags,
            parse_state: base_state,
            dynamic_precedence: production.dynamic_precedence,
        },
        children,
    )
}
