//! Grammar rule DSL.

/// Kind of a precedence annotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrecKind {
    Plain,
    Left,
    Right,
    Dynamic,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rule {
    Blank,
    String(String),
    Pattern(String),
    Symbol(String),
    Seq(Vec<Rule>),
    Choice(Vec<Rule>),
    Repeat(Box<Rule>),
    Repeat1(Box<Rule>),
    Prec { kind: PrecKind, value: i32, rule: Box<Rule> },
    Field { name: String, rule: Box<Rule> },
    Alias { name: String, named: bool, rule: Box<Rule> },
    Token { immediate: bool, rule: Box<Rule> },
}

impl Rule {
    /// Strips precedence wrappers, returning the innermost rule together
    /// with the outermost non-dynamic precedence seen.
    pub(crate) fn without_prec(&self) -> (&Rule, Option<i32>) {
        let mut rule = self;
        let mut prec = None;
        while let Rule::Prec { kind, value, rule: inner } = rule {
            if *kind != PrecKind::Dynamic {
                prec = prec.or(Some(*value));
            }
            rule = inner;
        }
        (rule, prec)
    }

    /// `true` for rules the lexer matches as a single terminal.
    pub(crate) fn is_lexical(&self) -> bool {
        matches!(self.without_prec().0, Rule::String(_) | Rule::Pattern(_) | Rule::Token { .. })
    }
}

pub fn blank() -> Rule {
    Rule::Blank
}

pub fn string(text: impl Into<String>) -> Rule {
    Rule::String(text.into())
}

pub fn pattern(regex: impl Into<String>) -> Rule {
    Rule::Pattern(regex.into())
}

pub fn sym(name: impl Into<String>) -> Rule {
    Rule::Symbol(name.into())
}

pub fn seq(rules: impl IntoIterator<Item = Rule>) -> Rule {
    Rule::Seq(rules.into_iter().collect())
}

pub fn choice(rules: impl IntoIterator<Item = Rule>) -> Rule {
    Rule::Choice(rules.into_iter().collect())
}

pub fn optional(rule: Rule) -> Rule {
    choice([rule, blank()])
}

pub fn repeat(rule: Rule) -> Rule {
    Rule::Repeat(Box::new(rule))
}

pub fn repeat1(rule: Rule) -> Rule {
    Rule::Repeat1(Box::new(rule))
}

pub fn prec(value: i32, rule: Rule) -> Rule {
    Rule::Prec { kind: PrecKind::Plain, value, rule: Box::new(rule) }
}

pub fn prec_left(value: i32, rule: Rule) -> Rule {
    Rule::Prec { kind: PrecKind::Left, value, rule: Box::new(rule) }
}

pub fn prec_right(value: i32, rule: Rule) -> Rule {
    Rule::Prec { kind: PrecKind::Right, value, rule: Box::new(rule) }
}

pub fn prec_dynamic(value: i32, rule: Rule) -> Rule {
    Rule::Prec { kind: PrecKind::Dynamic, value, rule: Box::new(rule) }
}

pub fn field(name: impl Into<String>, rule: Rule) -> Rule {
    Rule::Field { name: name.into(), rule: Box::new(rule) }
}

/// Shows `rule` as a node named `name`.
pub fn alias(rule: Rule, name: impl Into<String>, named: bool) -> Rule {
    Rule::Alias { name: name.into(), named, rule: Box::new(rule) }
}

/// Lexes `rule` as one terminal.
pub fn token(rule: Rule) -> Rule {
    Rule::Token { immediate: false, rule: Box::new(rule) }
}

/// Like `token`, but only directly after the previous token.
pub fn immediate_token(rule: Rule) -> Rule {
    Rule::Token { immediate: true, rule: Box::new(rule) }
}
