//! Compiles grammar rules into a `GrammarTable`.
//!
//! Grammars are written with the combinators in [`rules`], collected in a
//! [`GrammarBuilder`] and turned into LALR(1) tables by
//! [`GrammarBuilder::build`]. Generation normally runs in a build script;
//! the resulting blob is what ships.

mod grammar;
mod lr;
pub mod rules;

pub use grammar::GrammarBuilder;
use tessera_grammar::GrammarTable;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GenerateError {
    #[error("grammar has no rules")]
    EmptyGrammar,
    #[error("rule `{0}` is defined more than once")]
    DuplicateRule(String),
    #[error("undefined symbol `{name}` in rule `{rule}`")]
    UndefinedSymbol { name: String, rule: String },
    #[error("start rule `{0}` must not be a token")]
    StartIsToken(String),
    #[error("token in rule `{0}` refers to another symbol")]
    TokenContainsSymbol(String),
    #[error("extra `{0}` is not a token")]
    ExtraNotToken(String),
}

impl GrammarBuilder {
    pub fn build(&self) -> Result<GrammarTable, GenerateError> {
        let lowered = grammar::lower(self)?;
        Ok(lr::build_table(&lowered))
    }
}

#[cfg(test)]
mod tests;
