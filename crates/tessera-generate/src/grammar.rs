//! Lowering of rule definitions into symbols, terminal rules and flat
//! productions.

use rustc_hash::FxHashMap;
use tessera_grammar::{Assoc, FieldId, Lexeme, Symbol, SymbolInfo, SymbolKind, TerminalRule};

use crate::GenerateError;
use crate::rules::{PrecKind, Rule};

/// A grammar under construction. Rules keep their insertion order; the
/// first rule is the start symbol.
#[derive(Clone, Debug, Default)]
pub struct GrammarBuilder {
    pub(crate) name: String,
    pub(crate) rules: Vec<(String, Rule)>,
    pub(crate) extras: Vec<Rule>,
    pub(crate) externals: Vec<String>,
}

impl GrammarBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn rule(mut self, name: impl Into<String>, rule: Rule) -> Self {
        self.rules.push((name.into(), rule));
        self
    }

    /// Adds a token that may appear anywhere between other tokens.
    pub fn extra(mut self, rule: Rule) -> Self {
        self.extras.push(rule);
        self
    }

    /// Declares a token produced by the external scanner. Externals are
    /// numbered in declaration order.
    pub fn external(mut self, name: impl Into<String>) -> Self {
        self.externals.push(name.into());
        self
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Step {
    pub(crate) symbol: Symbol,
    pub(crate) field: Option<FieldId>,
    pub(crate) alias: Option<Symbol>,
    pub(crate) prec: i32,
    pub(crate) assoc: Option<Assoc>,
    pub(crate) dynamic: i32,
}

#[derive(Clone, Debug)]
pub(crate) struct FlatProduction {
    pub(crate) lhs: Symbol,
    pub(crate) steps: Vec<Step>,
    pub(crate) prec: i32,
    pub(crate) assoc: Option<Assoc>,
    pub(crate) dynamic: i32,
}

/// Output of lowering, input of table construction.
#[derive(Debug)]
pub(crate) struct LoweredGrammar {
    pub(crate) name: String,
    pub(crate) symbols: Vec<SymbolInfo>,
    pub(crate) fields: Vec<String>,
    pub(crate) terminals: Vec<TerminalRule>,
    pub(crate) extras: Vec<Symbol>,
    pub(crate) externals: Vec<Symbol>,
    pub(crate) productions: Vec<FlatProduction>,
    pub(crate) start: Symbol,
    /// Symbols below this index are terminals, externals or reserved.
    pub(crate) terminal_limit: usize,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct TerminalKey {
    lexeme: Lexeme,
    precedence: i32,
    immediate: bool,
}

#[derive(Clone, Copy)]
struct Context {
    field: Option<FieldId>,
    alias: Option<Symbol>,
    prec: i32,
    assoc: Option<Assoc>,
    dynamic: i32,
}

impl Context {
    const ROOT: Self = Self { field: None, alias: None, prec: 0, assoc: None, dynamic: 0 };
}

/// One alternative of a rule: its steps, plus the precedence in effect when
/// the alternative turned out empty.
#[derive(Clone)]
struct Alternative {
    steps: Vec<Step>,
    empty_prec: (i32, Option<Assoc>),
}

struct Lowering {
    symbols: Vec<SymbolInfo>,
    by_name: FxHashMap<String, Symbol>,
    anonymous: FxHashMap<TerminalKey, Symbol>,
    terminals: Vec<TerminalRule>,
    fields: Vec<String>,
    productions: Vec<FlatProduction>,
    current_rule: String,
    token_counter: usize,
    aux_counter: usize,
}

pub(crate) fn lower(grammar: &GrammarBuilder) -> Result<LoweredGrammar, GenerateError> {
    let Some((start_name, start_rule)) = grammar.rules.first() else {
        return Err(GenerateError::EmptyGrammar);
    };
    if start_rule.is_lexical() {
        return Err(GenerateError::StartIsToken(start_name.clone()));
    }

    let mut lowering = Lowering {
        symbols: vec![
            SymbolInfo { name: "end".into(), kind: SymbolKind::End, named: false, visible: false },
            SymbolInfo { name: "ERROR".into(), kind: SymbolKind::Error, named: true, visible: true },
        ],
        by_name: FxHashMap::default(),
        anonymous: FxHashMap::default(),
        terminals: Vec::new(),
        fields: Vec::new(),
        productions: Vec::new(),
        current_rule: String::new(),
        token_counter: 0,
        aux_counter: 0,
    };

    for (name, _) in &grammar.rules {
        if grammar.rules.iter().filter(|(other, _)| other == name).count() > 1
            || grammar.externals.contains(name)
        {
            return Err(GenerateError::DuplicateRule(name.clone()));
        }
    }

    // Terminals first, in declaration order.
    for (name, rule) in &grammar.rules {
        lowering.current_rule.clone_from(name);
        lowering.token_counter = 0;
        if rule.is_lexical() {
            let (lexeme, precedence, immediate) = lexeme_of(name, rule)?;
            let symbol = lowering.add_symbol(name, SymbolKind::Terminal, true);
            lowering.terminals.push(TerminalRule { symbol, lexeme, precedence, immediate });
        } else {
            lowering.collect_terminals(rule)?;
        }
    }
    let mut extras = Vec::new();
    for extra in &grammar.extras {
        lowering.current_rule = "extra".into();
        let symbol = match extra {
            Rule::Symbol(name) => match lowering.by_name.get(name) {
                Some(&symbol) if lowering.symbols[symbol.index()].kind == SymbolKind::Terminal => symbol,
                _ => return Err(GenerateError::ExtraNotToken(name.clone())),
            },
            rule if rule.is_lexical() => lowering.anonymous_terminal(rule)?,
            _ => return Err(GenerateError::ExtraNotToken(format!("{extra:?}"))),
        };
        extras.push(symbol);
    }

    let mut externals = Vec::new();
    for name in &grammar.externals {
        externals.push(lowering.add_symbol(name, SymbolKind::External, true));
    }
    let terminal_limit = lowering.symbols.len();

    for (name, rule) in &grammar.rules {
        if !rule.is_lexical() {
            lowering.add_symbol(name, SymbolKind::NonTerminal, true);
        }
    }
    for (name, rule) in &grammar.rules {
        if rule.is_lexical() {
            continue;
        }
        lowering.current_rule.clone_from(name);
        lowering.token_counter = 0;
        let lhs = lowering.by_name[name];
        let alternatives = lowering.expand(rule, Context::ROOT)?;
        lowering.push_productions(lhs, alternatives);
    }

    let start = lowering.by_name[start_name];
    Ok(LoweredGrammar {
        name: grammar.name.clone(),
        symbols: lowering.symbols,
        fields: lowering.fields,
        terminals: lowering.terminals,
        extras,
        externals,
        productions: lowering.productions,
        start,
        terminal_limit,
    })
}

impl Lowering {
    fn add_symbol(&mut self, name: &str, kind: SymbolKind, named: bool) -> Symbol {
        let symbol = Symbol(self.symbols.len() as u16);
        self.symbols.push(SymbolInfo {
            name: name.into(),
            kind,
            named,
            visible: !name.starts_with('_'),
        });
        if named {
            self.by_name.insert(name.into(), symbol);
        }
        symbol
    }

    fn collect_terminals(&mut self, rule: &Rule) -> Result<(), GenerateError> {
        match rule {
            Rule::Blank | Rule::Symbol(_) => {}
            Rule::String(_) | Rule::Pattern(_) | Rule::Token { .. } => {
                self.anonymous_terminal(rule)?;
            }
            Rule::Seq(rules) | Rule::Choice(rules) => {
                for rule in rules {
                    self.collect_terminals(rule)?;
                }
            }
            Rule::Repeat(rule)
            | Rule::Repeat1(rule)
            | Rule::Field { rule, .. }
            | Rule::Alias { rule, .. } => self.collect_terminals(rule)?,
            Rule::Prec { rule, .. } => {
                // Precedence around a token is a parse precedence, not a
                // lexical one.
                let (inner, _) = rule.without_prec();
                self.collect_terminals(inner)?;
            }
        }
        Ok(())
    }

    fn anonymous_terminal(&mut self, rule: &Rule) -> Result<Symbol, GenerateError> {
        let (lexeme, precedence, immediate) = lexeme_of(&self.current_rule, rule)?;
        let key = TerminalKey { lexeme: lexeme.clone(), precedence, immediate };
        if let Some(&symbol) = self.anonymous.get(&key) {
            return Ok(symbol);
        }
        let symbol = match &lexeme {
            Lexeme::Literal(text) => {
                let symbol = Symbol(self.symbols.len() as u16);
                self.symbols.push(SymbolInfo {
                    name: text.clone(),
                    kind: SymbolKind::Terminal,
                    named: false,
                    visible: true,
                });
                symbol
            }
            _ => {
                self.token_counter += 1;
                let name = format!("_{}_token{}", self.current_rule.trim_start_matches('_'), self.token_counter);
                self.add_symbol(&name, SymbolKind::Terminal, false)
            }
        };
        self.anonymous.insert(key, symbol);
        self.terminals.push(TerminalRule { symbol, lexeme, precedence, immediate });
        Ok(symbol)
    }

    fn field_id(&mut self, name: &str) -> FieldId {
        match self.fields.iter().position(|field| field == name) {
            Some(index) => FieldId(index as u16),
            None => {
                self.fields.push(name.into());
                FieldId(self.fields.len() as u16 - 1)
            }
        }
    }

    fn alias_symbol(&mut self, name: &str, named: bool, target_kind: SymbolKind) -> Symbol {
        let existing = self.symbols.iter().position(|info| {
            info.name == name && info.named == named && info.kind != SymbolKind::External
        });
        if let Some(index) = existing {
            return Symbol(index as u16);
        }
        let kind = if target_kind.is_terminal() { SymbolKind::Terminal } else { SymbolKind::NonTerminal };
        let symbol = Symbol(self.symbols.len() as u16);
        self.symbols.push(SymbolInfo { name: name.into(), kind, named, visible: true });
        symbol
    }

    fn step(&self, symbol: Symbol, ctx: Context) -> Alternative {
        Alternative {
            steps: vec![Step {
                symbol,
                field: ctx.field,
                alias: ctx.alias,
                prec: ctx.prec,
                assoc: ctx.assoc,
                dynamic: ctx.dynamic,
            }],
            empty_prec: (ctx.prec, ctx.assoc),
        }
    }

    fn expand(&mut self, rule: &Rule, ctx: Context) -> Result<Vec<Alternative>, GenerateError> {
        Ok(match rule {
            Rule::Blank => vec![Alternative { steps: Vec::new(), empty_prec: (ctx.prec, ctx.assoc) }],
            Rule::String(_) | Rule::Pattern(_) | Rule::Token { .. } => {
                let symbol = self.anonymous_terminal(rule)?;
                vec![self.step(symbol, ctx)]
            }
            Rule::Symbol(name) => {
                let Some(&symbol) = self.by_name.get(name) else {
                    return Err(GenerateError::UndefinedSymbol {
                        name: name.clone(),
                        rule: self.current_rule.clone(),
                    });
                };
                vec![self.step(symbol, ctx)]
            }
            Rule::Seq(rules) => {
                let mut result = vec![Alternative { steps: Vec::new(), empty_prec: (ctx.prec, ctx.assoc) }];
                for rule in rules {
                    let tails = self.expand(rule, ctx)?;
                    let mut next = Vec::with_capacity(result.len() * tails.len());
                    for head in &result {
                        for tail in &tails {
                            let mut steps = head.steps.clone();
                            steps.extend_from_slice(&tail.steps);
                            next.push(Alternative { steps, empty_prec: head.empty_prec });
                        }
                    }
                    result = next;
                }
                result
            }
            Rule::Choice(rules) => {
                let mut result = Vec::new();
                for rule in rules {
                    result.extend(self.expand(rule, ctx)?);
                }
                result
            }
            Rule::Repeat(inner) | Rule::Repeat1(inner) => {
                let aux = self.repeat_symbol(inner, ctx)?;
                let plain = Context { field: None, alias: None, ..ctx };
                let mut result = vec![self.step(aux, plain)];
                if matches!(rule, Rule::Repeat(_)) {
                    result.push(Alternative { steps: Vec::new(), empty_prec: (ctx.prec, ctx.assoc) });
                }
                result
            }
            Rule::Prec { kind, value, rule } => {
                let ctx = match kind {
                    PrecKind::Plain => Context { prec: *value, assoc: None, ..ctx },
                    PrecKind::Left => Context { prec: *value, assoc: Some(Assoc::Left), ..ctx },
                    PrecKind::Right => Context { prec: *value, assoc: Some(Assoc::Right), ..ctx },
                    PrecKind::Dynamic => Context { dynamic: *value, ..ctx },
                };
                self.expand(rule, ctx)?
            }
            Rule::Field { name, rule } => {
                let field = self.field_id(name);
                self.expand(rule, Context { field: Some(field), ..ctx })?
            }
            Rule::Alias { name, named, rule } => {
                let target_kind = match rule.as_ref() {
                    Rule::Symbol(target) => self
                        .by_name
                        .get(target)
                        .map_or(SymbolKind::NonTerminal, |symbol| self.symbols[symbol.index()].kind),
                    rule if rule.is_lexical() => SymbolKind::Terminal,
                    _ => SymbolKind::NonTerminal,
                };
                let alias = self.alias_symbol(name, *named, target_kind);
                self.expand(rule, Context { alias: Some(alias), ..ctx })?
            }
        })
    }

    /// Introduces a hidden left-recursive helper `aux -> aux item | item`.
    fn repeat_symbol(&mut self, item: &Rule, ctx: Context) -> Result<Symbol, GenerateError> {
        self.aux_counter += 1;
        let name = format!("_{}_repeat{}", self.current_rule.trim_start_matches('_'), self.aux_counter);
        let aux = Symbol(self.symbols.len() as u16);
        self.symbols.push(SymbolInfo { name, kind: SymbolKind::NonTerminal, named: false, visible: false });

        let items = self.expand(item, ctx)?;
        let recursive = self.step(aux, Context { field: None, alias: None, ..ctx });
        let mut alternatives = Vec::with_capacity(items.len() * 2);
        for alternative in &items {
            let mut steps = recursive.steps.clone();
            steps.extend_from_slice(&alternative.steps);
            alternatives.push(Alternative { steps, empty_prec: alternative.empty_prec });
        }
        alternatives.extend(items);
        self.push_productions(aux, alternatives);
        Ok(aux)
    }

    fn push_productions(&mut self, lhs: Symbol, alternatives: Vec<Alternative>) {
        for alternative in alternatives {
            let (prec, assoc) = match alternative.steps.last() {
                Some(step) => (step.prec, step.assoc),
                None => alternative.empty_prec,
            };
            let dynamic = alternative
                .steps
                .iter()
                .map(|step| step.dynamic)
                .max_by_key(|dynamic| dynamic.abs())
                .unwrap_or(0);
            let production = FlatProduction { lhs, steps: alternative.steps, prec, assoc, dynamic };
            let duplicate = self.productions.iter().any(|existing| {
                existing.lhs == lhs
                    && existing.steps.len() == production.steps.len()
                    && existing.steps.iter().zip(&production.steps).all(|(a, b)| {
                        a.symbol == b.symbol && a.field == b.field && a.alias == b.alias
                    })
            });
            if !duplicate {
                self.productions.push(production);
            }
        }
    }
}

/// Turns a lexical rule into a lexeme, its lexical precedence and whether it
/// is immediate.
fn lexeme_of(rule_name: &str, rule: &Rule) -> Result<(Lexeme, i32, bool), GenerateError> {
    let (inner, outer_prec) = rule.without_prec();
    let (inner, immediate) = match inner {
        Rule::Token { immediate, rule } => (rule.as_ref(), *immediate),
        other => (other, false),
    };
    let (inner, token_prec) = inner.without_prec();
    let precedence = token_prec.or(outer_prec).unwrap_or(0);
    let lexeme = match inner {
        Rule::String(text) => Lexeme::Literal(text.clone()),
        Rule::Pattern(pattern) => Lexeme::Pattern(pattern.clone()),
        other => {
            let mut regex = String::new();
            write_regex(rule_name, other, &mut regex)?;
            Lexeme::Pattern(regex)
        }
    };
    Ok((lexeme, precedence, immediate))
}

fn write_regex(rule_name: &str, rule: &Rule, out: &mut String) -> Result<(), GenerateError> {
    match rule {
        Rule::Blank => {}
        Rule::String(text) => out.push_str(&regex_syntax::escape(text)),
        Rule::Pattern(pattern) => {
            out.push_str("(?:");
            out.push_str(pattern);
            out.push(')');
        }
        Rule::Seq(rules) => {
            for rule in rules {
                write_regex(rule_name, rule, out)?;
            }
        }
        Rule::Choice(rules) => {
            out.push_str("(?:");
            for (index, rule) in rules.iter().enumerate() {
                if index > 0 {
                    out.push('|');
                }
                write_regex(rule_name, rule, out)?;
            }
            out.push(')');
        }
        Rule::Repeat(inner) | Rule::Repeat1(inner) => {
            out.push_str("(?:");
            write_regex(rule_name, inner, out)?;
            out.push_str(if matches!(rule, Rule::Repeat(_)) { ")*" } else { ")+" });
        }
        Rule::Prec { rule, .. }
        | Rule::Field { rule, .. }
        | Rule::Alias { rule, .. }
        | Rule::Token { rule, .. } => write_regex(rule_name, rule, out)?,
        Rule::Symbol(_) => return Err(GenerateError::TokenContainsSymbol(rule_name.into())),
    }
    Ok(())
}
