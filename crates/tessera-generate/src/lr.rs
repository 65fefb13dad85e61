//! LALR(1) automaton construction and conflict resolution.
//!
//! States are LR(0) item cores; lookaheads are propagated between them until
//! nothing changes. Conflicts that precedence cannot settle stay in the
//! table and are explored in parallel at parse time.

use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};

use rustc_hash::FxHashMap;
use tessera_grammar::{
    Action, ActionEntry, Assoc, ChildInfo, GrammarTable, LexMode, ParseState, Production,
    ProductionId, StateId, Symbol, SymbolKind,
};

use crate::grammar::LoweredGrammar;

#[derive(Clone, Debug, PartialEq, Eq)]
struct TerminalSet {
    words: Vec<u64>,
}

impl TerminalSet {
    fn new(len: usize) -> Self {
        Self { words: vec![0; len.div_ceil(64)] }
    }

    fn insert(&mut self, index: usize) {
        self.words[index / 64] |= 1 << (index % 64);
    }

    fn contains(&self, index: usize) -> bool {
        self.words[index / 64] & (1 << (index % 64)) != 0
    }

    /// Returns `true` if anything was added.
    fn union_with(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (word, &other) in self.words.iter_mut().zip(&other.words) {
            let merged = *word | other;
            changed |= merged != *word;
            *word = merged;
        }
        changed
    }

    fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(index, &word)| {
            (0..64).filter(move |bit| word & (1 << bit) != 0).map(move |bit| index * 64 + bit)
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Item {
    production: u32,
    dot: u32,
}

struct ItemSet {
    kernel: Vec<Item>,
    lookaheads: Vec<TerminalSet>,
}

struct Builder<'g> {
    grammar: &'g LoweredGrammar,
    /// Right-hand sides, with the augmented start production last.
    rhs: Vec<Vec<Symbol>>,
    augmented: u32,
    by_lhs: Vec<Vec<u32>>,
    nullable: Vec<bool>,
    first: Vec<TerminalSet>,
    states: Vec<ItemSet>,
    transitions: Vec<Vec<(Symbol, StateId)>>,
    index: FxHashMap<Vec<Item>, StateId>,
}

pub(crate) fn build_table(grammar: &LoweredGrammar) -> GrammarTable {
    let mut builder = Builder::new(grammar);
    builder.compute_first();
    builder.build_states();
    builder.emit()
}

impl<'g> Builder<'g> {
    fn new(grammar: &'g LoweredGrammar) -> Self {
        let mut rhs: Vec<Vec<Symbol>> = grammar
            .productions
            .iter()
            .map(|production| production.steps.iter().map(|step| step.symbol).collect())
            .collect();
        rhs.push(vec![grammar.start]);
        let augmented = grammar.productions.len() as u32;

        let mut by_lhs = vec![Vec::new(); grammar.symbols.len()];
        for (index, production) in grammar.productions.iter().enumerate() {
            by_lhs[production.lhs.index()].push(index as u32);
        }

        Self {
            grammar,
            rhs,
            augmented,
            by_lhs,
            nullable: vec![false; grammar.symbols.len()],
            first: vec![TerminalSet::new(grammar.terminal_limit); grammar.symbols.len()],
            states: Vec::new(),
            transitions: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    fn is_terminal(&self, symbol: Symbol) -> bool {
        symbol.index() < self.grammar.terminal_limit
    }

    fn compute_first(&mut self) {
        for index in 0..self.grammar.terminal_limit {
            self.first[index].insert(index);
        }
        let mut changed = true;
        while changed {
            changed = false;
            for production in &self.grammar.productions {
                let lhs = production.lhs.index();
                let mut all_nullable = true;
                for step in &production.steps {
                    let symbol = step.symbol.index();
                    if symbol != lhs {
                        let first = self.first[symbol].clone();
                        changed |= self.first[lhs].union_with(&first);
                    }
                    if !self.nullable[symbol] {
                        all_nullable = false;
                        break;
                    }
                }
                if all_nullable && !self.nullable[lhs] {
                    self.nullable[lhs] = true;
                    changed = true;
                }
            }
        }
    }

    fn closure(&self, state: StateId) -> Vec<(Item, TerminalSet)> {
        let set = &self.states[state as usize];
        let mut items: Vec<(Item, TerminalSet)> =
            set.kernel.iter().copied().zip(set.lookaheads.iter().cloned()).collect();
        let mut positions: FxHashMap<Item, usize> =
            items.iter().enumerate().map(|(position, (item, _))| (*item, position)).collect();
        let mut queue: VecDeque<usize> = (0..items.len()).collect();

        while let Some(position) = queue.pop_front() {
            let item = items[position].0;
            let rhs = &self.rhs[item.production as usize];
            let Some(&next) = rhs.get(item.dot as usize) else { continue };
            if self.is_terminal(next) {
                continue;
            }

            let mut follow = TerminalSet::new(self.grammar.terminal_limit);
            let mut rest_nullable = true;
            for &symbol in &rhs[item.dot as usize + 1..] {
                follow.union_with(&self.first[symbol.index()]);
                if !self.nullable[symbol.index()] {
                    rest_nullable = false;
                    break;
                }
            }
            if rest_nullable {
                let lookahead = items[position].1.clone();
                follow.union_with(&lookahead);
            }

            for &production in &self.by_lhs[next.index()] {
                let new_item = Item { production, dot: 0 };
                match positions.get(&new_item) {
                    Some(&existing) => {
                        if items[existing].1.union_with(&follow) {
                            queue.push_back(existing);
                        }
                    }
                    None => {
                        positions.insert(new_item, items.len());
                        queue.push_back(items.len());
                        items.push((new_item, follow.clone()));
                    }
                }
            }
        }
        items
    }

    fn add_state(&mut self, kernel: Vec<Item>, lookaheads: Vec<TerminalSet>) -> StateId {
        let id = self.states.len() as StateId;
        self.index.insert(kernel.clone(), id);
        self.states.push(ItemSet { kernel, lookaheads });
        self.transitions.push(Vec::new());
        id
    }

    fn build_states(&mut self) {
        let mut end = TerminalSet::new(self.grammar.terminal_limit);
        end.insert(Symbol::END.index());
        self.add_state(vec![Item { production: self.augmented, dot: 0 }], vec![end]);

        let mut queue = VecDeque::from([0 as StateId]);
        let mut queued = vec![true];
        while let Some(state) = queue.pop_front() {
            queued[state as usize] = false;
            let closure = self.closure(state);

            let mut groups: Vec<(Symbol, Vec<(Item, TerminalSet)>)> = Vec::new();
            let mut group_of: FxHashMap<Symbol, usize> = FxHashMap::default();
            for (item, lookahead) in closure {
                let Some(&next) = self.rhs[item.production as usize].get(item.dot as usize) else {
                    continue;
                };
                let group = *group_of.entry(next).or_insert_with(|| {
                    groups.push((next, Vec::new()));
                    groups.len() - 1
                });
                groups[group].1.push((Item { dot: item.dot + 1, ..item }, lookahead));
            }

            let mut transitions = Vec::with_capacity(groups.len());
            for (symbol, mut items) in groups {
                items.sort_by_key(|(item, _)| *item);
                let kernel: Vec<Item> = items.iter().map(|(item, _)| *item).collect();
                let target = match self.index.get(&kernel) {
                    Some(&target) => {
                        let mut changed = false;
                        let existing = &mut self.states[target as usize].lookaheads;
                        for (slot, (_, lookahead)) in existing.iter_mut().zip(&items) {
                            changed |= slot.union_with(lookahead);
                        }
                        if changed && !queued[target as usize] {
                            queued[target as usize] = true;
                            queue.push_back(target);
                        }
                        target
                    }
                    None => {
                        let lookaheads = items.into_iter().map(|(_, lookahead)| lookahead).collect();
                        let target = self.add_state(kernel, lookaheads);
                        queued.push(true);
                        queue.push_back(target);
                        target
                    }
                };
                transitions.push((symbol, target));
            }
            self.transitions[state as usize] = transitions;
        }
    }

    /// Precedence of the step at the item's dot.
    fn step_prec(&self, item: Item) -> i32 {
        if item.production == self.augmented {
            return 0;
        }
        self.grammar.productions[item.production as usize]
            .steps
            .get(item.dot as usize)
            .map_or(0, |step| step.prec)
    }

    fn emit(&self) -> GrammarTable {
        let grammar = self.grammar;
        let mut states = Vec::with_capacity(self.states.len());
        let mut lex_modes: Vec<LexMode> = Vec::new();
        let mut lex_mode_ids: FxHashMap<LexMode, u32> = FxHashMap::default();
        let mut conflicts = 0;

        for state in 0..self.states.len() as StateId {
            let closure = self.closure(state);

            let mut shifts: FxHashMap<Symbol, (StateId, i32)> = FxHashMap::default();
            for &(symbol, target) in &self.transitions[state as usize] {
                if self.is_terminal(symbol) {
                    shifts.insert(symbol, (target, i32::MIN));
                }
            }
            let mut reduces: BTreeMap<Symbol, Vec<(ProductionId, i32, Option<Assoc>)>> =
                BTreeMap::new();
            let mut accept = false;
            for (item, lookahead) in &closure {
                let rhs = &self.rhs[item.production as usize];
                if let Some(&next) = rhs.get(item.dot as usize) {
                    if let Some((_, prec)) = shifts.get_mut(&next) {
                        *prec = (*prec).max(self.step_prec(*item));
                    }
                    continue;
                }
                if item.production == self.augmented {
                    accept |= lookahead.contains(Symbol::END.index());
                    continue;
                }
                let production = &grammar.productions[item.production as usize];
                for terminal in lookahead.iter() {
                    reduces.entry(Symbol(terminal as u16)).or_default().push((
                        item.production,
                        production.prec,
                        production.assoc,
                    ));
                }
            }

            let mut entries: BTreeMap<Symbol, Vec<Action>> = BTreeMap::new();
            for (&symbol, &shift) in &shifts {
                let candidates = reduces.remove(&symbol).unwrap_or_default();
                let actions = resolve(Some(shift), candidates, &mut conflicts);
                if !actions.is_empty() {
                    entries.insert(symbol, actions);
                }
            }
            for (symbol, candidates) in reduces {
                let actions = resolve(None, candidates, &mut conflicts);
                if !actions.is_empty() {
                    entries.insert(symbol, actions);
                }
            }
            if accept {
                entries.entry(Symbol::END).or_default().insert(0, Action::Accept);
            }

            let mut mode = LexMode {
                terminals: Vec::new(),
                externals: vec![false; grammar.externals.len()],
            };
            for &symbol in entries.keys() {
                match grammar.symbols[symbol.index()].kind {
                    SymbolKind::Terminal => mode.terminals.push(symbol),
                    SymbolKind::External => {
                        if let Some(index) = grammar.externals.iter().position(|&e| e == symbol) {
                            mode.externals[index] = true;
                        }
                    }
                    _ => {}
                }
            }
            let lex_mode = *lex_mode_ids.entry(mode.clone()).or_insert_with(|| {
                lex_modes.push(mode);
                lex_modes.len() as u32 - 1
            });

            let mut gotos: Vec<(Symbol, StateId)> = self.transitions[state as usize]
                .iter()
                .copied()
                .filter(|&(symbol, _)| !self.is_terminal(symbol))
                .collect();
            gotos.sort_unstable();

            states.push(ParseState {
                actions: entries
                    .into_iter()
                    .map(|(symbol, actions)| ActionEntry { symbol, actions })
                    .collect(),
                gotos,
                lex_mode,
            });
        }

        tracing::debug!(
            name = %grammar.name,
            states = states.len(),
            lex_modes = lex_modes.len(),
            conflicts,
            "built parse table"
        );

        GrammarTable {
            name: grammar.name.clone(),
            symbols: grammar.symbols.clone(),
            fields: grammar.fields.clone(),
            terminals: grammar.terminals.clone(),
            extras: grammar.extras.clone(),
            externals: grammar.externals.clone(),
            productions: grammar
                .productions
                .iter()
                .map(|production| Production {
                    lhs: production.lhs,
                    children: production
                        .steps
                        .iter()
                        .map(|step| ChildInfo { field: step.field, alias: step.alias })
                        .collect(),
                    precedence: production.prec,
                    associativity: production.assoc,
                    dynamic_precedence: production.dynamic,
                })
                .collect(),
            states,
            lex_modes,
            start_state: 0,
        }
    }
}

/// Settles the actions for one terminal. Whatever precedence and
/// associativity leave undecided is kept.
fn resolve(
    shift: Option<(StateId, i32)>,
    mut reduces: Vec<(ProductionId, i32, Option<Assoc>)>,
    conflicts: &mut usize,
) -> Vec<Action> {
    if let Some(best) = reduces.iter().map(|&(_, prec, _)| prec).max() {
        reduces.retain(|&(_, prec, _)| prec == best);
    }
    reduces.sort_unstable_by_key(|&(production, _, _)| production);
    reduces.dedup_by_key(|&mut (production, _, _)| production);

    let mut keep_shift = shift.is_some();
    if let Some((_, shift_prec)) = shift {
        reduces.retain(|&(_, prec, assoc)| match shift_prec.cmp(&prec) {
            Ordering::Greater => false,
            Ordering::Less => {
                keep_shift = false;
                true
            }
            Ordering::Equal => match assoc {
                Some(Assoc::Left) => {
                    keep_shift = false;
                    true
                }
                Some(Assoc::Right) => false,
                Some(Assoc::NonAssoc) => {
                    keep_shift = false;
                    false
                }
                None => true,
            },
        });
    }

    let mut actions = Vec::with_capacity(reduces.len() + 1);
    if let (true, Some((state, _))) = (keep_shift, shift) {
        actions.push(Action::Shift { state });
    }
    actions.extend(reduces.into_iter().map(|(production, _, _)| Action::Reduce { production }));
    if actions.len() > 1 {
        *conflicts += 1;
    }
    actions
}
