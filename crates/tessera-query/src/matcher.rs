//! Running compiled patterns against a tree.
//!
//! Child patterns match an ordered subsequence of a node's children, so
//! unmentioned children (extras, punctuation) can sit between them. Every
//! distinct way of placing single child patterns is reported as its own
//! match. Quantified patterns are greedy: fewer repetitions are only tried
//! when the rest of the pattern fails.

use std::collections::VecDeque;
use std::ops::Range;

use tessera_syntax::SyntaxNode;

use crate::compile::{Atom, Element, KindTest, NodePattern, Operand, Predicate, Quantifier};
use crate::{Query, QueryCapture, QueryMatch};

type Captures = Vec<QueryCapture>;

/// Runs queries. Holds only the optional byte range, so one cursor can serve
/// any number of runs.
#[derive(Clone, Debug, Default)]
pub struct QueryCursor {
    byte_range: Option<Range<usize>>,
}

impl QueryCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only report matches rooted at nodes that intersect `range`.
    pub fn set_byte_range(&mut self, range: Range<usize>) {
        self.byte_range = Some(range);
    }

    /// Lazily matches every pattern at `node` and its descendants, in
    /// pre-order, patterns in query order for each node.
    pub fn matches<'q, 's>(&self, query: &'q Query, node: &SyntaxNode, source: &'s [u8]) -> QueryMatches<'q, 's> {
        let mut pending = Vec::new();
        if node.language() == query.language() {
            pending.push(node.clone());
        } else {
            tracing::warn!(
                query = query.language().name(),
                tree = node.language().name(),
                "query and tree languages differ"
            );
        }
        QueryMatches { query, source, byte_range: self.byte_range.clone(), pending, ready: VecDeque::new() }
    }

    /// Captures of every match, in match order.
    pub fn captures<'q, 's>(&self, query: &'q Query, node: &SyntaxNode, source: &'s [u8]) -> QueryCaptures<'q, 's> {
        QueryCaptures { matches: self.matches(query, node, source), current: Vec::new().into_iter() }
    }
}

#[derive(Clone)]
pub struct QueryMatches<'q, 's> {
    query: &'q Query,
    source: &'s [u8],
    byte_range: Option<Range<usize>>,
    /// Nodes still to visit, next on top.
    pending: Vec<SyntaxNode>,
    ready: VecDeque<QueryMatch>,
}

impl Iterator for QueryMatches<'_, '_> {
    type Item = QueryMatch;

    fn next(&mut self) -> Option<QueryMatch> {
        loop {
            if let Some(found) = self.ready.pop_front() {
                return Some(found);
            }
            let node = self.pending.pop()?;
            let children: Vec<SyntaxNode> = node.children().filter(|child| self.intersects(child)).collect();
            self.pending.extend(children.into_iter().rev());
            if is_visible(&node) {
                self.match_at(&node);
            }
        }
    }
}

impl QueryMatches<'_, '_> {
    fn intersects(&self, node: &SyntaxNode) -> bool {
        self.byte_range.as_ref().is_none_or(|range| {
            let span = node.text_range();
            usize::from(span.start()) <= range.end && usize::from(span.end()) >= range.start
        })
    }

    fn match_at(&mut self, node: &SyntaxNode) {
        let (siblings, index) = match node.parent() {
            Some(parent) if self.query.needs_siblings => {
                let siblings = visible_children(&parent);
                let index = siblings.iter().position(|sibling| sibling == node).unwrap_or(0);
                (siblings, index)
            }
            _ => (vec![node.clone()], 0),
        };

        let query = self.query;
        let mut found = Vec::new();
        for (pattern_index, pattern) in query.patterns.iter().enumerate() {
            found.clear();
            match_sequence(std::slice::from_ref(&pattern.root), &siblings, index, true, &Vec::new(), &mut found);
            let first = self.ready.len();
            for (end, captures) in found.drain(..) {
                if end == index || !pattern.predicates.iter().all(|predicate| self.satisfied(predicate, &captures)) {
                    continue;
                }
                let duplicate = self
                    .ready
                    .range(first..)
                    .any(|existing| existing.pattern_index == pattern_index && existing.captures == captures);
                if !duplicate {
                    self.ready.push_back(QueryMatch { pattern_index, captures });
                }
            }
        }
    }

    /// Checks `predicate` against every node of its capture. Captures that
    /// matched nothing pass.
    fn satisfied(&self, predicate: &Predicate, captures: &[QueryCapture]) -> bool {
        let source = self.source;
        let texts = move |index: u32| {
            captures
                .iter()
                .filter(move |capture| capture.index == index)
                .map(move |capture| capture.node.utf8_text(source).unwrap_or_default())
        };
        match predicate {
            Predicate::Eq { capture, other, negated } => texts(*capture).all(|text| {
                let equal = match other {
                    Operand::Text(expected) => text == expected.as_str(),
                    Operand::Capture(other) => texts(*other).all(|other| other == text),
                };
                equal != *negated
            }),
            Predicate::Match { capture, regex, negated } => {
                texts(*capture).all(|text| regex.is_match(text) != *negated)
            }
            Predicate::AnyOf { capture, values, negated } => {
                texts(*capture).all(|text| values.iter().any(|value| value.as_str() == text) != *negated)
            }
        }
    }
}

#[derive(Clone)]
pub struct QueryCaptures<'q, 's> {
    matches: QueryMatches<'q, 's>,
    current: std::vec::IntoIter<QueryCapture>,
}

impl Iterator for QueryCaptures<'_, '_> {
    type Item = QueryCapture;

    fn next(&mut self) -> Option<QueryCapture> {
        loop {
            if let Some(capture) = self.current.next() {
                return Some(capture);
            }
            self.current = self.matches.next()?.captures.into_iter();
        }
    }
}

/// Matches `elements` against `siblings[start..]`, pushing the index after
/// the last matched sibling with the captures of every solution. With
/// `anchored` the first matched sibling must be `siblings[start]`.
fn match_sequence(
    elements: &[Element],
    siblings: &[SyntaxNode],
    start: usize,
    anchored: bool,
    captures: &Captures,
    out: &mut Vec<(usize, Captures)>,
) {
    let Some((first, rest)) = elements.split_first() else {
        out.push((start, captures.clone()));
        return;
    };

    if first.quantifier == Quantifier::One {
        for (next, captures) in match_single(first, siblings, start, anchored, captures) {
            match_sequence(rest, siblings, next, false, &captures, out);
        }
        return;
    }

    let max = if first.quantifier == Quantifier::ZeroOrOne { 1 } else { usize::MAX };
    let min = usize::from(first.quantifier == Quantifier::OneOrMore);
    let mut chain = vec![(start, captures.clone())];
    while chain.len() <= max {
        let Some((position, captures)) = chain.last() else { break };
        let first_anchored = anchored && chain.len() == 1;
        let Some(found) = match_single(first, siblings, *position, first_anchored, captures).into_iter().next()
        else {
            break;
        };
        chain.push(found);
    }
    for (count, (next, captures)) in chain.iter().enumerate().skip(min).rev() {
        let before = out.len();
        match_sequence(rest, siblings, *next, anchored && count == 0, captures, out);
        if out.len() > before {
            break;
        }
    }
}

/// One occurrence of `element`, ignoring its quantifier.
fn match_single(
    element: &Element,
    siblings: &[SyntaxNode],
    start: usize,
    anchored: bool,
    captures: &Captures,
) -> Vec<(usize, Captures)> {
    let end = if anchored { siblings.len().min(start + 1) } else { siblings.len() };
    let mut results = Vec::new();
    for index in start..end {
        let node = &siblings[index];
        if element.field.is_some() && node.field_id() != element.field {
            continue;
        }
        let found: Vec<(usize, Captures)> = match &element.atom {
            Atom::Node(pattern) => {
                match_node(pattern, node, captures).into_iter().map(|captures| (index + 1, captures)).collect()
            }
            Atom::Alternation(alternatives) => alternatives
                .iter()
                .flat_map(|alternative| match_single(alternative, siblings, index, true, captures))
                .collect(),
            Atom::Group(elements) => {
                let mut found = Vec::new();
                match_sequence(elements, siblings, index, true, captures, &mut found);
                found
            }
        };
        for (next, mut captures) in found {
            captures.extend(element.captures.iter().map(|&index| QueryCapture { index, node: node.clone() }));
            results.push((next, captures));
        }
    }
    results
}

fn match_node(pattern: &NodePattern, node: &SyntaxNode, captures: &Captures) -> Vec<Captures> {
    if !kind_matches(&pattern.kind, node)
        || pattern.negated_fields.iter().any(|&field| node.child_by_field_id(field).is_some())
    {
        return Vec::new();
    }
    if pattern.children.is_empty() {
        return vec![captures.clone()];
    }
    let children = visible_children(node);
    let mut found = Vec::new();
    match_sequence(&pattern.children, &children, 0, false, captures, &mut found);
    found.into_iter().map(|(_, captures)| captures).collect()
}

fn kind_matches(kind: &KindTest, node: &SyntaxNode) -> bool {
    match kind {
        KindTest::Any => true,
        KindTest::Named => node.is_named(),
        KindTest::Symbols(symbols) => symbols.contains(&node.kind_id()),
        KindTest::Error => node.is_error(),
        KindTest::Missing(None) => node.is_missing(),
        KindTest::Missing(Some(symbols)) => node.is_missing() && symbols.contains(&node.kind_id()),
    }
}

fn is_visible(node: &SyntaxNode) -> bool {
    node.green().is_visible() || node.is_missing()
}

fn visible_children(node: &SyntaxNode) -> Vec<SyntaxNode> {
    node.children().filter(is_visible).collect()
}
