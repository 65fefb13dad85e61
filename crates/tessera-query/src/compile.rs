//! Query source to pattern trees.

use std::str::Chars;

use line_index::LineIndex;
use regex::Regex;
use tessera_grammar::{FieldId, Language, Symbol};
use text_size::TextSize;

use crate::{QueryError, QueryErrorKind};

const EOF_CHAR: char = '\0';

#[derive(Debug)]
pub(crate) struct Pattern {
    pub(crate) root: Element,
    pub(crate) predicates: Vec<Predicate>,
    pub(crate) start_byte: usize,
}

impl Pattern {
    pub(crate) fn spans_siblings(&self) -> bool {
        self.root.quantifier != Quantifier::One || matches!(self.root.atom, Atom::Group(_))
    }
}

/// A pattern item together with what is attached to it: a field prefix, a
/// quantifier and captures.
#[derive(Debug)]
pub(crate) struct Element {
    pub(crate) atom: Atom,
    pub(crate) field: Option<FieldId>,
    pub(crate) quantifier: Quantifier,
    pub(crate) captures: Vec<u32>,
}

#[derive(Debug)]
pub(crate) enum Atom {
    Node(NodePattern),
    Alternation(Vec<Element>),
    /// Consecutive siblings, `((a) (b))`.
    Group(Vec<Element>),
}

#[derive(Debug)]
pub(crate) struct NodePattern {
    pub(crate) kind: KindTest,
    pub(crate) children: Vec<Element>,
    pub(crate) negated_fields: Vec<FieldId>,
}

#[derive(Debug)]
pub(crate) enum KindTest {
    /// `_`
    Any,
    /// `(_)`
    Named,
    Symbols(Vec<Symbol>),
    Error,
    Missing(Option<Vec<Symbol>>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Quantifier {
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

#[derive(Debug)]
pub(crate) enum Predicate {
    Eq { capture: u32, other: Operand, negated: bool },
    Match { capture: u32, regex: Regex, negated: bool },
    AnyOf { capture: u32, values: Vec<String>, negated: bool },
}

#[derive(Debug)]
pub(crate) enum Operand {
    Capture(u32),
    Text(String),
}

/// Predicate as written, resolved once its pattern is complete.
struct RawPredicate {
    name: String,
    args: Vec<Argument>,
    offset: usize,
}

enum Argument {
    Capture { name: String, offset: usize },
    Text { text: String, offset: usize },
}

pub(crate) struct QueryParser<'a> {
    language: &'a Language,
    source: &'a str,
    chars: Chars<'a>,
    capture_names: &'a mut Vec<String>,
    /// Captures declared by the pattern being parsed.
    pattern_captures: Vec<u32>,
}

impl<'a> QueryParser<'a> {
    pub(crate) fn new(language: &'a Language, source: &'a str, capture_names: &'a mut Vec<String>) -> Self {
        Self { language, source, chars: source.chars(), capture_names, pattern_captures: Vec::new() }
    }

    pub(crate) fn patterns(mut self) -> Result<Vec<Pattern>, QueryError> {
        let mut patterns = Vec::new();
        loop {
            self.skip_trivia();
            if self.at_eof() {
                return Ok(patterns);
            }
            let start_byte = self.offset();
            if self.at_predicate() {
                return Err(self.error(QueryErrorKind::Predicate, start_byte, "predicate outside of a pattern"));
            }
            self.pattern_captures.clear();
            let mut raw = Vec::new();
            let root = self.element(&mut raw)?;
            let predicates = raw.into_iter().map(|raw| self.resolve(raw)).collect::<Result<_, _>>()?;
            patterns.push(Pattern { root, predicates, start_byte });
        }
    }

    fn element(&mut self, predicates: &mut Vec<RawPredicate>) -> Result<Element, QueryError> {
        self.skip_trivia();
        let start = self.offset();

        let mut field = None;
        if is_ident_char(self.peek()) {
            let name = self.ident();
            self.skip_trivia();
            if self.peek() == ':' {
                self.advance();
                field = Some(self.field(&name, start)?);
                self.skip_trivia();
            } else if name == "_" {
                return self.finish_element(Atom::Node(node(KindTest::Any)), None);
            } else {
                return Err(self.error(QueryErrorKind::Syntax, start, format!("unexpected `{name}`")));
            }
        }

        let atom = match self.peek() {
            '(' => self.parenthesized(predicates)?,
            '[' => {
                self.advance();
                let mut alternatives = Vec::new();
                loop {
                    self.skip_trivia();
                    match self.peek() {
                        ']' => break,
                        EOF_CHAR if self.at_eof() => {
                            return Err(self.error(QueryErrorKind::Syntax, start, "unclosed `[`"));
                        }
                        _ => alternatives.push(self.element(predicates)?),
                    }
                }
                self.advance();
                if alternatives.is_empty() {
                    return Err(self.error(QueryErrorKind::Syntax, start, "empty alternation"));
                }
                Atom::Alternation(alternatives)
            }
            '"' => {
                let offset = self.offset();
                let text = self.string()?;
                Atom::Node(node(KindTest::Symbols(self.symbols(&text, false, offset)?)))
            }
            '_' => {
                self.advance();
                Atom::Node(node(KindTest::Any))
            }
            _ => {
                let offset = self.offset();
                return Err(self.error(QueryErrorKind::Syntax, offset, "expected a pattern"));
            }
        };
        self.finish_element(atom, field)
    }

    /// Parses the quantifier and captures after an atom.
    fn finish_element(&mut self, atom: Atom, field: Option<FieldId>) -> Result<Element, QueryError> {
        let quantifier = match self.peek() {
            '?' => Quantifier::ZeroOrOne,
            '*' => Quantifier::ZeroOrMore,
            '+' => Quantifier::OneOrMore,
            _ => Quantifier::One,
        };
        if quantifier != Quantifier::One {
            self.advance();
        }

        let mut captures = Vec::new();
        loop {
            self.skip_trivia();
            if self.peek() != '@' {
                break;
            }
            let offset = self.offset();
            self.advance();
            let name = self.ident();
            if name.is_empty() {
                return Err(self.error(QueryErrorKind::Syntax, offset, "expected a capture name"));
            }
            let index = self.intern_capture(name);
            self.pattern_captures.push(index);
            captures.push(index);
        }
        Ok(Element { atom, field, quantifier, captures })
    }

    fn parenthesized(&mut self, predicates: &mut Vec<RawPredicate>) -> Result<Atom, QueryError> {
        let start = self.offset();
        self.advance();
        self.skip_trivia();

        if matches!(self.peek(), '(' | '[' | '"') {
            let elements = self.children(start, predicates, |_, _| Ok(false))?;
            return Ok(Atom::Group(elements));
        }
        if self.peek() == ')' {
            return Err(self.error(QueryErrorKind::Syntax, start, "empty pattern"));
        }
        if self.peek() == '#' {
            return Err(self.error(QueryErrorKind::Predicate, start, "predicate outside of a pattern"));
        }

        let name_offset = self.offset();
        let name = self.ident();
        if name.is_empty() {
            return Err(self.error(QueryErrorKind::Syntax, name_offset, "expected a node type"));
        }
        let kind = match name.as_str() {
            "_" => KindTest::Named,
            "ERROR" => KindTest::Error,
            "MISSING" => {
                self.skip_trivia();
                let offset = self.offset();
                if self.peek() == '"' {
                    let text = self.string()?;
                    KindTest::Missing(Some(self.symbols(&text, false, offset)?))
                } else if is_ident_char(self.peek()) {
                    let name = self.ident();
                    KindTest::Missing(Some(self.symbols(&name, true, offset)?))
                } else {
                    KindTest::Missing(None)
                }
            }
            _ => KindTest::Symbols(self.symbols(&name, true, name_offset)?),
        };

        let mut negated_fields = Vec::new();
        let children = self.children(start, predicates, |parser, offset| {
            if parser.peek() != '!' {
                return Ok(false);
            }
            parser.advance();
            let name = parser.ident();
            negated_fields.push(parser.field(&name, offset)?);
            Ok(true)
        })?;
        Ok(Atom::Node(NodePattern { kind, children, negated_fields }))
    }

    /// Parses elements and predicates up to the closing `)`. `special` gets
    /// the first look at each item and returns `true` if it consumed it.
    fn children(
        &mut self,
        start: usize,
        predicates: &mut Vec<RawPredicate>,
        mut special: impl FnMut(&mut Self, usize) -> Result<bool, QueryError>,
    ) -> Result<Vec<Element>, QueryError> {
        let mut elements = Vec::new();
        loop {
            self.skip_trivia();
            let offset = self.offset();
            if self.peek() == ')' {
                self.advance();
                return Ok(elements);
            }
            if self.at_eof() {
                return Err(self.error(QueryErrorKind::Syntax, start, "unclosed `(`"));
            }
            if self.at_predicate() {
                predicates.push(self.predicate()?);
            } else if !special(self, offset)? {
                elements.push(self.element(predicates)?);
            }
        }
    }

    fn predicate(&mut self) -> Result<RawPredicate, QueryError> {
        let offset = self.offset();
        self.advance();
        self.skip_trivia();
        self.advance(); // `#`
        let start = self.offset();
        self.advance_while(|c| is_ident_char(c) || matches!(c, '?' | '!'));
        let name = self.source[start..self.offset()].to_owned();
        let mut args = Vec::new();
        loop {
            self.skip_trivia();
            let arg_offset = self.offset();
            match self.peek() {
                ')' => {
                    self.advance();
                    return Ok(RawPredicate { name, args, offset });
                }
                '@' => {
                    self.advance();
                    args.push(Argument::Capture { name: self.ident(), offset: arg_offset });
                }
                '"' => args.push(Argument::Text { text: self.string()?, offset: arg_offset }),
                c if is_ident_char(c) => args.push(Argument::Text { text: self.ident(), offset: arg_offset }),
                _ if self.at_eof() => {
                    return Err(self.error(QueryErrorKind::Syntax, offset, "unclosed predicate"));
                }
                c => {
                    return Err(self.error(QueryErrorKind::Syntax, arg_offset, format!("unexpected `{c}`")));
                }
            }
        }
    }

    fn resolve(&self, raw: RawPredicate) -> Result<Predicate, QueryError> {
        let (negated, base) = match raw.name.strip_prefix("not-") {
            Some(base) => (true, base),
            None => (false, raw.name.as_str()),
        };
        let mut args = raw.args.into_iter();
        let capture = match args.next() {
            Some(Argument::Capture { name, offset }) => self.capture(&name, offset)?,
            _ => {
                let message = format!("#{} expects a capture as its first argument", raw.name);
                return Err(self.error(QueryErrorKind::Predicate, raw.offset, message));
            }
        };
        let rest: Vec<Argument> = args.collect();

        match base {
            "eq?" => {
                let [other] = <[Argument; 1]>::try_from(rest).map_err(|_rest| {
                    self.error(QueryErrorKind::Predicate, raw.offset, format!("#{} takes two arguments", raw.name))
                })?;
                let other = match other {
                    Argument::Capture { name, offset } => Operand::Capture(self.capture(&name, offset)?),
                    Argument::Text { text, .. } => Operand::Text(text),
                };
                Ok(Predicate::Eq { capture, other, negated })
            }
            "match?" => match <[Argument; 1]>::try_from(rest) {
                Ok([Argument::Text { text, offset }]) => {
                    let regex = Regex::new(&text)
                        .map_err(|err| self.error(QueryErrorKind::Regex, offset, err.to_string()))?;
                    Ok(Predicate::Match { capture, regex, negated })
                }
                _ => Err(self.error(
                    QueryErrorKind::Predicate,
                    raw.offset,
                    format!("#{} takes a capture and a regex", raw.name),
                )),
            },
            "any-of?" => {
                let mut values = Vec::with_capacity(rest.len());
                for arg in rest {
                    match arg {
                        Argument::Text { text, .. } => values.push(text),
                        Argument::Capture { offset, .. } => {
                            let message = format!("#{} only takes strings after the capture", raw.name);
                            return Err(self.error(QueryErrorKind::Predicate, offset, message));
                        }
                    }
                }
                Ok(Predicate::AnyOf { capture, values, negated })
            }
            _ => Err(self.error(QueryErrorKind::Predicate, raw.offset, format!("unknown predicate #{}", raw.name))),
        }
    }

    fn capture(&self, name: &str, offset: usize) -> Result<u32, QueryError> {
        self.capture_names
            .iter()
            .position(|capture| capture == name)
            .map(|index| index as u32)
            .filter(|index| self.pattern_captures.contains(index))
            .ok_or_else(|| self.error(QueryErrorKind::Capture, offset, format!("undefined capture @{name}")))
    }

    fn intern_capture(&mut self, name: String) -> u32 {
        match self.capture_names.iter().position(|capture| *capture == name) {
            Some(index) => index as u32,
            None => {
                self.capture_names.push(name);
                (self.capture_names.len() - 1) as u32
            }
        }
    }

    fn field(&self, name: &str, offset: usize) -> Result<FieldId, QueryError> {
        self.language
            .field_id(name)
            .ok_or_else(|| self.error(QueryErrorKind::Field, offset, format!("unknown field `{name}`")))
    }

    fn symbols(&self, name: &str, named: bool, offset: usize) -> Result<Vec<Symbol>, QueryError> {
        let symbols: Vec<Symbol> = self
            .language
            .symbols_for_name(name)
            .iter()
            .copied()
            .filter(|&symbol| self.language.is_named(symbol) == named)
            .collect();
        if symbols.is_empty() {
            return Err(self.error(QueryErrorKind::NodeType, offset, format!("unknown node type `{name}`")));
        }
        Ok(symbols)
    }

    fn string(&mut self) -> Result<String, QueryError> {
        let start = self.offset();
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                '"' => return Ok(text),
                '\\' => match self.advance() {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    '0' => text.push('\0'),
                    EOF_CHAR if self.at_eof() => break,
                    c => text.push(c),
                },
                EOF_CHAR if self.at_eof() => break,
                c => text.push(c),
            }
        }
        Err(self.error(QueryErrorKind::Syntax, start, "unterminated string"))
    }

    fn ident(&mut self) -> String {
        let start = self.offset();
        self.advance_while(is_ident_char);
        self.source[start..self.offset()].to_owned()
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                c if c.is_whitespace() => {
                    self.advance();
                }
                ';' => self.advance_while(|c| c != '\n'),
                _ => return,
            }
        }
    }

    /// `(` followed by `#`.
    fn at_predicate(&self) -> bool {
        let mut chars = self.chars.clone();
        chars.next() == Some('(') && chars.find(|c| !c.is_whitespace()) == Some('#')
    }

    fn error(&self, kind: QueryErrorKind, offset: usize, message: impl Into<String>) -> QueryError {
        let line_col = LineIndex::new(self.source).line_col(TextSize::new(offset as u32));
        QueryError { kind, offset, row: line_col.line, column: line_col.col, message: message.into() }
    }

    fn offset(&self) -> usize {
        self.source.len() - self.chars.as_str().len()
    }

    fn at_eof(&self) -> bool {
        self.chars.as_str().is_empty()
    }

    fn peek(&self) -> char {
        self.chars.clone().next().unwrap_or(EOF_CHAR)
    }

    fn advance(&mut self) -> char {
        self.chars.next().unwrap_or(EOF_CHAR)
    }

    fn advance_while(&mut self, f: impl Fn(char) -> bool) {
        while !self.at_eof() && f(self.peek()) {
            self.advance();
        }
    }
}

fn node(kind: KindTest) -> NodePattern {
    NodePattern { kind, children: Vec::new(), negated_fields: Vec::new() }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}
