use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::pattern::{Matcher, PatternError};
use crate::table::{HEADER_LEN, MAGIC};
use crate::{
    Action, ExternalScanner, FORMAT_VERSION, FieldId, GrammarTable, LexMode,
    MIN_COMPATIBLE_VERSION, Production, ProductionId, StateId, Symbol, SymbolInfo, SymbolKind,
};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("grammar blob is shorter than its header")]
    Truncated,
    #[error("grammar blob does not start with the table magic")]
    BadMagic,
    #[error("incompatible table format version {found}, supported versions are {min}..={max}")]
    IncompatibleVersion { found: u32, min: u32, max: u32 },
    #[error("corrupt grammar table: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("invalid pattern for terminal `{terminal}`: {source}")]
    InvalidPattern {
        terminal: String,
        #[source]
        source: PatternError,
    },
    #[error("inconsistent grammar table: {0}")]
    Inconsistent(String),
}

/// A loaded grammar. Cloning is cheap and clones share the same table.
#[derive(Clone)]
pub struct Language {
    inner: Arc<LanguageInner>,
}

struct LanguageInner {
    table: GrammarTable,
    version: u32,
    matchers: Vec<Option<Matcher>>,
    precedences: Vec<i32>,
    declaration_order: Vec<u32>,
    immediate: Vec<bool>,
    symbols_by_name: FxHashMap<String, Vec<Symbol>>,
    fields_by_name: FxHashMap<String, FieldId>,
    scanner: Option<Arc<dyn ExternalScanner>>,
}

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Language")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("states", &self.state_count())
            .field("symbols", &self.symbol_count())
            .finish_non_exhaustive()
    }
}

/// Two languages are equal when they were loaded from the same table, even
/// by separate loads.
impl PartialEq for Language {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.version == other.inner.version && self.inner.table == other.inner.table)
    }
}

impl Eq for Language {}

impl Language {
    /// Loads a grammar blob produced by `GrammarTable::to_blob`.
    pub fn load(blob: &[u8]) -> Result<Self, LoadError> {
        let (version, table) = decode(blob)?;
        Self::build(table, version, None)
    }

    /// Loads a grammar blob whose external tokens are produced by `scanner`.
    pub fn load_with_scanner(
        blob: &[u8],
        scanner: Arc<dyn ExternalScanner>,
    ) -> Result<Self, LoadError> {
        let (version, table) = decode(blob)?;
        Self::build(table, version, Some(scanner))
    }

    /// Validates an in-memory table, as produced by the generator.
    pub fn from_table(
        table: GrammarTable,
        scanner: Option<Arc<dyn ExternalScanner>>,
    ) -> Result<Self, LoadError> {
        Self::build(table, FORMAT_VERSION, scanner)
    }

    fn build(
        table: GrammarTable,
        version: u32,
        scanner: Option<Arc<dyn ExternalScanner>>,
    ) -> Result<Self, LoadError> {
        validate(&table)?;

        let symbol_count = table.symbols.len();
        let mut matchers = Vec::with_capacity(symbol_count);
        matchers.resize_with(symbol_count, || None);
        let mut precedences = vec![0; symbol_count];
        let mut declaration_order = vec![u32::MAX; symbol_count];
        let mut immediate = vec![false; symbol_count];

        for (order, rule) in table.terminals.iter().enumerate() {
            let matcher = Matcher::new(&rule.lexeme).map_err(|source| {
                LoadError::InvalidPattern {
                    terminal: table.symbols[rule.symbol.index()].name.clone(),
                    source,
                }
            })?;
            matchers[rule.symbol.index()] = Some(matcher);
            precedences[rule.symbol.index()] = rule.precedence;
            declaration_order[rule.symbol.index()] = order as u32;
            immediate[rule.symbol.index()] = rule.immediate;
        }

        let mut symbols_by_name: FxHashMap<String, Vec<Symbol>> = FxHashMap::default();
        for (index, info) in table.symbols.iter().enumerate() {
            symbols_by_name.entry(info.name.clone()).or_default().push(Symbol(index as u16));
        }
        let fields_by_name = table
            .fields
            .iter()
            .enumerate()
            .map(|(index, name)| (name.clone(), FieldId(index as u16)))
            .collect();

        tracing::debug!(
            name = %table.name,
            version,
            states = table.states.len(),
            symbols = symbol_count,
            "loaded grammar table"
        );

        Ok(Self {
            inner: Arc::new(LanguageInner {
                table,
                version,
                matchers,
                precedences,
                declaration_order,
                immediate,
                symbols_by_name,
                fields_by_name,
                scanner,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.table.name
    }

    /// Format version of the blob this language was loaded from.
    pub fn version(&self) -> u32 {
        self.inner.version
    }

    pub fn table(&self) -> &GrammarTable {
        &self.inner.table
    }

    pub fn start_state(&self) -> StateId {
        self.inner.table.start_state
    }

    pub fn state_count(&self) -> usize {
        self.inner.table.states.len()
    }

    pub fn symbol_count(&self) -> usize {
        self.inner.table.symbols.len()
    }

    /// All actions for `symbol` in `state`; empty means a syntax error.
    pub fn actions(&self, state: StateId, symbol: Symbol) -> &[Action] {
        let actions = &self.inner.table.states[state as usize].actions;
        match actions.binary_search_by_key(&symbol, |entry| entry.symbol) {
            Ok(index) => &actions[index].actions,
            Err(_) => &[],
        }
    }

    pub fn goto(&self, state: StateId, symbol: Symbol) -> Option<StateId> {
        let gotos = &self.inner.table.states[state as usize].gotos;
        gotos.binary_search_by_key(&symbol, |&(symbol, _)| symbol).ok().map(|index| gotos[index].1)
    }

    /// Terminals that `state` can shift, in symbol order.
    pub fn shiftable_terminals(&self, state: StateId) -> impl Iterator<Item = Symbol> + '_ {
        self.inner.table.states[state as usize]
            .actions
            .iter()
            .filter(|entry| {
                entry.symbol != Symbol::END
                    && entry.actions.iter().any(|action| matches!(action, Action::Shift { .. }))
            })
            .map(|entry| entry.symbol)
    }

    pub fn lex_mode_id(&self, state: StateId) -> u32 {
        self.inner.table.states[state as usize].lex_mode
    }

    pub fn lex_mode(&self, id: u32) -> &LexMode {
        &self.inner.table.lex_modes[id as usize]
    }

    pub fn lex_mode_count(&self) -> usize {
        self.inner.table.lex_modes.len()
    }

    pub fn production(&self, id: ProductionId) -> &Production {
        &self.inner.table.productions[id as usize]
    }

    pub fn symbol_info(&self, symbol: Symbol) -> &SymbolInfo {
        &self.inner.table.symbols[symbol.index()]
    }

    pub fn symbol_name(&self, symbol: Symbol) -> &str {
        &self.symbol_info(symbol).name
    }

    pub fn is_named(&self, symbol: Symbol) -> bool {
        self.symbol_info(symbol).named
    }

    pub fn is_visible(&self, symbol: Symbol) -> bool {
        self.symbol_info(symbol).visible
    }

    /// Every symbol carrying `name`, aliases included.
    pub fn symbols_for_name(&self, name: &str) -> &[Symbol] {
        self.inner.symbols_by_name.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.inner.fields_by_name.get(name).copied()
    }

    pub fn field_name(&self, field: FieldId) -> &str {
        &self.inner.table.fields[field.index()]
    }

    pub fn field_count(&self) -> usize {
        self.inner.table.fields.len()
    }

    /// Terminals in declaration order.
    pub fn terminals(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.inner.table.terminals.iter().map(|rule| rule.symbol)
    }

    pub fn extras(&self) -> &[Symbol] {
        &self.inner.table.extras
    }

    pub fn externals(&self) -> &[Symbol] {
        &self.inner.table.externals
    }

    pub fn matcher(&self, symbol: Symbol) -> Option<&Matcher> {
        self.inner.matchers.get(symbol.index())?.as_ref()
    }

    pub fn lexical_precedence(&self, symbol: Symbol) -> i32 {
        self.inner.precedences[symbol.index()]
    }

    /// Position of the terminal's rule in the table; earlier rules win ties.
    pub fn declaration_order(&self, symbol: Symbol) -> u32 {
        self.inner.declaration_order[symbol.index()]
    }

    pub fn is_immediate(&self, symbol: Symbol) -> bool {
        self.inner.immediate.get(symbol.index()).copied().unwrap_or(false)
    }

    pub fn external_scanner(&self) -> Option<&dyn ExternalScanner> {
        self.inner.scanner.as_deref()
    }
}

fn decode(blob: &[u8]) -> Result<(u32, GrammarTable), LoadError> {
    if blob.len() < HEADER_LEN {
        return Err(LoadError::Truncated);
    }
    let (header, payload) = blob.split_at(HEADER_LEN);
    if &header[..4] != MAGIC {
        return Err(LoadError::BadMagic);
    }
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if !(MIN_COMPATIBLE_VERSION..=FORMAT_VERSION).contains(&version) {
        return Err(LoadError::IncompatibleVersion {
            found: version,
            min: MIN_COMPATIBLE_VERSION,
            max: FORMAT_VERSION,
        });
    }
    let table = serde_json::from_slice(payload)?;
    Ok((version, table))
}

fn validate(table: &GrammarTable) -> Result<(), LoadError> {
    let inconsistent = |message: String| Err(LoadError::Inconsistent(message));
    let symbol_count = table.symbols.len();
    let kind_of = |symbol: Symbol| table.symbols.get(symbol.index()).map(|info| info.kind);

    if symbol_count > usize::from(u16::MAX) {
        return inconsistent(format!("{symbol_count} symbols do not fit in a symbol id"));
    }
    if kind_of(Symbol::END) != Some(SymbolKind::End)
        || kind_of(Symbol::ERROR) != Some(SymbolKind::Error)
    {
        return inconsistent("symbols 0 and 1 must be the end and error symbols".into());
    }
    if table.start_state as usize >= table.states.len() {
        return inconsistent(format!("start state {} out of range", table.start_state));
    }
    for rule in &table.terminals {
        if kind_of(rule.symbol) != Some(SymbolKind::Terminal) {
            return inconsistent(format!("terminal rule for non-terminal {:?}", rule.symbol));
        }
    }
    for &extra in &table.extras {
        if !table.terminals.iter().any(|rule| rule.symbol == extra) {
            return inconsistent(format!("extra {extra:?} has no lexical rule"));
        }
    }
    for &external in &table.externals {
        if kind_of(external) != Some(SymbolKind::External) {
            return inconsistent(format!("external {external:?} is not an external symbol"));
        }
    }
    for (index, production) in table.productions.iter().enumerate() {
        if kind_of(production.lhs) != Some(SymbolKind::NonTerminal) {
            return inconsistent(format!("production {index} reduces to a terminal"));
        }
        for child in &production.children {
            if child.field.is_some_and(|field| field.index() >= table.fields.len()) {
                return inconsistent(format!("production {index} names an unknown field"));
            }
            if child.alias.is_some_and(|alias| alias.index() >= symbol_count) {
                return inconsistent(format!("production {index} aliases an unknown symbol"));
            }
        }
    }
    for mode in &table.lex_modes {
        if mode.externals.len() != table.externals.len() {
            return inconsistent("lex mode external flags do not match externals".into());
        }
        if mode.terminals.iter().any(|&terminal| terminal.index() >= symbol_count) {
            return inconsistent("lex mode names an unknown terminal".into());
        }
    }
    for (index, state) in table.states.iter().enumerate() {
        if state.lex_mode as usize >= table.lex_modes.len() {
            return inconsistent(format!("state {index} has an unknown lex mode"));
        }
        if !state.actions.is_sorted_by_key(|entry| entry.symbol)
            || !state.gotos.is_sorted_by_key(|&(symbol, _)| symbol)
        {
            return inconsistent(format!("state {index} has unsorted entries"));
        }
        for entry in &state.actions {
            if !kind_of(entry.symbol).is_some_and(SymbolKind::is_terminal) {
                return inconsistent(format!("state {index} acts on a non-terminal"));
            }
            for action in &entry.actions {
                let valid = match *action {
                    Action::Shift { state } => (state as usize) < table.states.len(),
                    Action::Reduce { production } => {
                        (production as usize) < table.productions.len()
                    }
                    Action::Accept => true,
                };
                if !valid {
                    return inconsistent(format!("state {index} has a dangling action"));
                }
            }
        }
        for &(symbol, target) in &state.gotos {
            if kind_of(symbol) != Some(SymbolKind::NonTerminal)
                || target as usize >= table.states.len()
            {
                return inconsistent(format!("state {index} has a dangling goto"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActionEntry, ChildInfo, LexMode, Lexeme, ParseState, TerminalRule};

    fn symbol(name: &str, kind: SymbolKind) -> SymbolInfo {
        SymbolInfo { name: name.into(), kind, named: kind == SymbolKind::NonTerminal, visible: true }
    }

    /// `start -> "a"`
    fn tiny_table() -> GrammarTable {
        GrammarTable {
            name: "tiny".into(),
            symbols: vec![
                symbol("end", SymbolKind::End),
                symbol("ERROR", SymbolKind::Error),
                symbol("a", SymbolKind::Terminal),
                symbol("start", SymbolKind::NonTerminal),
            ],
            fields: vec![],
            terminals: vec![TerminalRule {
                symbol: Symbol(2),
                lexeme: Lexeme::Literal("a".into()),
                precedence: 0,
                immediate: false,
            }],
            extras: vec![],
            externals: vec![],
            productions: vec![Production {
                lhs: Symbol(3),
                children: vec![ChildInfo::default()],
                precedence: 0,
                associativity: None,
                dynamic_precedence: 0,
            }],
            states: vec![
                ParseState {
                    actions: vec![ActionEntry {
                        symbol: Symbol(2),
                        actions: vec![Action::Shift { state: 1 }],
                    }],
                    gotos: vec![(Symbol(3), 2)],
                    lex_mode: 0,
                },
                ParseState {
                    actions: vec![ActionEntry {
                        symbol: Symbol::END,
                        actions: vec![Action::Reduce { production: 0 }],
                    }],
                    gotos: vec![],
                    lex_mode: 1,
                },
                ParseState {
                    actions: vec![ActionEntry { symbol: Symbol::END, actions: vec![Action::Accept] }],
                    gotos: vec![],
                    lex_mode: 1,
                },
            ],
            lex_modes: vec![
                LexMode { terminals: vec![Symbol(2)], externals: vec![] },
                LexMode { terminals: vec![], externals: vec![] },
            ],
            start_state: 0,
        }
    }

    #[test]
    fn load_round_trip() {
        let blob = tiny_table().to_blob().unwrap();
        let language = Language::load(&blob).unwrap();
        assert_eq!(language.name(), "tiny");
        assert_eq!(language.version(), FORMAT_VERSION);
        assert_eq!(language.actions(0, Symbol(2)), &[Action::Shift { state: 1 }]);
        assert!(language.actions(0, Symbol::END).is_empty());
        assert_eq!(language.goto(0, Symbol(3)), Some(2));
        assert_eq!(language.symbols_for_name("start"), &[Symbol(3)]);
        assert_eq!(language.shiftable_terminals(0).collect::<Vec<_>>(), vec![Symbol(2)]);
    }

    #[test]
    fn older_compatible_version_loads() {
        let blob = tiny_table().to_blob_with_version(MIN_COMPATIBLE_VERSION).unwrap();
        assert_eq!(Language::load(&blob).unwrap().version(), MIN_COMPATIBLE_VERSION);
    }

    #[test]
    fn incompatible_version_is_rejected() {
        let blob = tiny_table().to_blob_with_version(FORMAT_VERSION + 1).unwrap();
        let err = Language::load(&blob).unwrap_err();
        assert!(matches!(err, LoadError::IncompatibleVersion { found, .. } if found == FORMAT_VERSION + 1));

        let blob = tiny_table().to_blob_with_version(MIN_COMPATIBLE_VERSION - 1).unwrap();
        assert!(matches!(Language::load(&blob), Err(LoadError::IncompatibleVersion { .. })));
    }

    #[test]
    fn corrupt_blobs_are_rejected() {
        assert!(matches!(Language::load(b"TSR"), Err(LoadError::Truncated)));
        assert!(matches!(Language::load(b"NOPE\x03\0\0\0{}"), Err(LoadError::BadMagic)));

        let mut blob = tiny_table().to_blob().unwrap();
        blob.truncate(blob.len() / 2);
        assert!(matches!(Language::load(&blob), Err(LoadError::Corrupt(_))));
    }

    #[test]
    fn dangling_indices_are_rejected() {
        let mut table = tiny_table();
        table.states[0].actions[0].actions[0] = Action::Shift { state: 42 };
        let blob = table.to_blob().unwrap();
        assert!(matches!(Language::load(&blob), Err(LoadError::Inconsistent(_))));
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        let mut table = tiny_table();
        table.terminals[0].lexeme = Lexeme::Pattern("(".into());
        let err = Language::from_table(table, None).unwrap_err();
        assert!(matches!(err, LoadError::InvalidPattern { ref terminal, .. } if terminal == "a"));
    }

    #[test]
    fn separate_loads_of_one_table_are_equal() {
        let blob = tiny_table().to_blob().unwrap();
        let first = Language::load(&blob).unwrap();
        let second = Language::load(&blob).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Language::from_table(tiny_table(), None).unwrap());

        let mut renamed = tiny_table();
        renamed.name = "other".into();
        assert_ne!(first, Language::from_table(renamed, None).unwrap());
    }

    #[test]
    fn language_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Language>();
    }
}
