//! Lexical matchers.
//!
//! Patterns are parsed with `regex-syntax` and lowered to a Thompson NFA that
//! is simulated one char at a time. Besides the longest match, the simulation
//! reports how far into the input it had to look before the automaton died.
//! Incremental parsing relies on that extent to decide which tokens an edit
//! can affect.

use regex_syntax::hir::{Class, Hir, HirKind};

use crate::Lexeme;

const MAX_INSTRUCTIONS: usize = 1 << 16;

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("{0}")]
    Syntax(Box<regex_syntax::Error>),
    #[error("look-around assertions are not supported in token patterns")]
    UnsupportedLook,
    #[error("pattern expands to more than {MAX_INSTRUCTIONS} automaton states")]
    TooLarge,
    #[error("empty literal")]
    EmptyLiteral,
}

/// Outcome of running a matcher at some position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    /// Length in bytes of the longest non-empty match, if any.
    pub len: Option<usize>,
    /// Absolute offset one past the last byte that was read.
    pub inspected_end: usize,
}

#[derive(Debug)]
pub enum Matcher {
    Literal(Box<[u8]>),
    Automaton(Nfa),
}

impl Matcher {
    pub fn new(lexeme: &Lexeme) -> Result<Self, PatternError> {
        match lexeme {
            Lexeme::Literal(text) if text.is_empty() => Err(PatternError::EmptyLiteral),
            Lexeme::Literal(text) => Ok(Self::Literal(text.as_bytes().into())),
            Lexeme::Pattern(pattern) => {
                let hir = regex_syntax::parse(pattern)
                    .map_err(|err| PatternError::Syntax(Box::new(err)))?;
                Nfa::compile(&hir).map(Self::Automaton)
            }
        }
    }

    pub fn longest_match(&self, text: &[u8], start: usize) -> Match {
        match self {
            Self::Literal(literal) => {
                let rest = &text[start.min(text.len())..];
                let common = rest.iter().zip(literal.iter()).take_while(|(a, b)| a == b).count();
                if common == literal.len() {
                    Match { len: Some(literal.len()), inspected_end: start + common }
                } else if common == rest.len() {
                    // Ran out of input in the middle of the literal.
                    Match { len: None, inspected_end: text.len() }
                } else {
                    Match { len: None, inspected_end: start + common + 1 }
                }
            }
            Self::Automaton(nfa) => nfa.longest_match(text, start),
        }
    }
}

#[derive(Debug)]
enum Inst {
    Chars { ranges: Box<[(char, char)]>, next: usize },
    Split(usize, usize),
    Match,
}

#[derive(Debug)]
pub struct Nfa {
    insts: Vec<Inst>,
    start: usize,
}

impl Nfa {
    fn compile(hir: &Hir) -> Result<Self, PatternError> {
        let mut nfa = Self { insts: vec![Inst::Match], start: 0 };
        nfa.start = nfa.lower(hir, 0)?;
        Ok(nfa)
    }

    fn push(&mut self, inst: Inst) -> Result<usize, PatternError> {
        if self.insts.len() >= MAX_INSTRUCTIONS {
            return Err(PatternError::TooLarge);
        }
        self.insts.push(inst);
        Ok(self.insts.len() - 1)
    }

    /// Lowers `hir` so that a successful run continues at `next`, returning
    /// the entry instruction.
    fn lower(&mut self, hir: &Hir, next: usize) -> Result<usize, PatternError> {
        match hir.kind() {
            HirKind::Empty => Ok(next),
            HirKind::Literal(literal) => {
                let text = String::from_utf8_lossy(&literal.0);
                let mut next = next;
                for c in text.chars().rev() {
                    next = self.push(Inst::Chars { ranges: Box::new([(c, c)]), next })?;
                }
                Ok(next)
            }
            HirKind::Class(Class::Unicode(class)) => {
                let ranges = class.ranges().iter().map(|r| (r.start(), r.end())).collect();
                self.push(Inst::Chars { ranges, next })
            }
            HirKind::Class(Class::Bytes(class)) => {
                let ranges = class
                    .ranges()
                    .iter()
                    .map(|r| (char::from(r.start()), char::from(r.end())))
                    .collect();
                self.push(Inst::Chars { ranges, next })
            }
            HirKind::Look(_) => Err(PatternError::UnsupportedLook),
            HirKind::Capture(capture) => self.lower(&capture.sub, next),
            HirKind::Concat(items) => {
                let mut next = next;
                for item in items.iter().rev() {
                    next = self.lower(item, next)?;
                }
                Ok(next)
            }
            HirKind::Alternation(branches) => {
                let mut entries = Vec::with_capacity(branches.len());
                for branch in branches {
                    entries.push(self.lower(branch, next)?);
                }
                let mut entry = entries.pop().unwrap_or(next);
                while let Some(other) = entries.pop() {
                    entry = self.push(Inst::Split(other, entry))?;
                }
                Ok(entry)
            }
            HirKind::Repetition(rep) => {
                let mut tail = match rep.max {
                    None => {
                        let split = self.push(Inst::Split(next, next))?;
                        let body = self.lower(&rep.sub, split)?;
                        self.insts[split] = Inst::Split(body, next);
                        split
                    }
                    Some(max) => {
                        let mut tail = next;
                        for _ in rep.min..max {
                            let body = self.lower(&rep.sub, tail)?;
                            tail = self.push(Inst::Split(body, next))?;
                        }
                        tail
                    }
                };
                for _ in 0..rep.min {
                    tail = self.lower(&rep.sub, tail)?;
                }
                Ok(tail)
            }
        }
    }

    fn add_state(&self, set: &mut Vec<usize>, seen: &mut [bool], pc: usize) {
        let mut stack = vec![pc];
        while let Some(pc) = stack.pop() {
            if std::mem::replace(&mut seen[pc], true) {
                continue;
            }
            match self.insts[pc] {
                Inst::Split(a, b) => {
                    stack.push(b);
                    stack.push(a);
                }
                Inst::Chars { .. } | Inst::Match => set.push(pc),
            }
        }
    }

    fn longest_match(&self, text: &[u8], start: usize) -> Match {
        let mut seen = vec![false; self.insts.len()];
        let mut current = Vec::new();
        let mut next = Vec::new();
        self.add_state(&mut current, &mut seen, self.start);

        let mut pos = start;
        let mut inspected_end = start;
        let mut last_match = None;

        loop {
            if current.iter().any(|&pc| matches!(self.insts[pc], Inst::Match)) && pos > start {
                last_match = Some(pos - start);
            }
            if !current.iter().any(|&pc| matches!(self.insts[pc], Inst::Chars { .. })) {
                break;
            }
            let Some((c, width)) = decode_char(text, pos) else {
                inspected_end = text.len();
                break;
            };
            pos += width;
            inspected_end = pos;

            seen.iter_mut().for_each(|flag| *flag = false);
            next.clear();
            for &pc in &current {
                let Inst::Chars { ref ranges, next: target } = self.insts[pc] else { continue };
                if ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi) {
                    self.add_state(&mut next, &mut seen, target);
                }
            }
            std::mem::swap(&mut current, &mut next);
        }

        Match { len: last_match, inspected_end }
    }
}

/// Decodes the char starting at `pos`. Invalid UTF-8 decodes as one
/// replacement char per byte.
pub fn decode_char(text: &[u8], pos: usize) -> Option<(char, usize)> {
    let first = *text.get(pos)?;
    let width = match first {
        0x00..=0x7F => return Some((char::from(first), 1)),
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return Some((char::REPLACEMENT_CHARACTER, 1)),
    };
    match text.get(pos..pos + width).and_then(|bytes| std::str::from_utf8(bytes).ok()) {
        Some(decoded) => decoded.chars().next().map(|c| (c, width)),
        None => Some((char::REPLACEMENT_CHARACTER, 1)),
    }
}
