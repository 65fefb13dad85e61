//! Incremental, error-tolerant GLR parsing.
//!
//! [`Parser::parse`] always produces a tree: input that does not fit the
//! grammar ends up under `ERROR` nodes or next to zero-width `MISSING`
//! leaves. Passing the edited previous tree lets unchanged subtrees be reused;
//! the result is the same as parsing the new text from scratch.

mod parser;
mod reuse;
mod stack;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tessera_grammar::Language;
use tessera_syntax::Tree;

/// Limits checked while parsing.
#[derive(Clone, Debug, Default)]
pub struct ParseOptions {
    /// Maximum number of shifts, reductions and recoveries.
    pub max_operations: Option<u64>,
    pub timeout: Option<Duration>,
    /// Setting the flag from another thread aborts the parse.
    pub cancellation: Option<Arc<AtomicBool>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Limit {
    Operations,
    Timeout,
    Cancelled,
    /// Offsets are 32-bit, so inputs must be shorter than 4 GiB.
    InputLength,
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Operations => "operation limit reached",
            Self::Timeout => "timed out",
            Self::Cancelled => "cancelled",
            Self::InputLength => "input is 4 GiB or longer",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("parse aborted: {limit}")]
    ResourceExceeded { limit: Limit },
}

/// Parses text with one language. A parser holds no per-parse state, so one
/// instance can serve several threads.
#[derive(Clone, Debug)]
pub struct Parser {
    language: Language,
    options: ParseOptions,
}

impl Parser {
    pub fn new(language: Language) -> Self {
        Self { language, options: ParseOptions::default() }
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: ParseOptions) {
        self.options = options;
    }

    /// Parses `text`. `old_tree` must already have been edited to match
    /// `text`; it is ignored if it belongs to another language.
    pub fn parse(&self, text: &[u8], old_tree: Option<&Tree>) -> Result<Tree, ParseError> {
        check_input_len(text.len())?;
        let root = parser::ParseRun::new(&self.language, text, old_tree, &self.options).run()?;
        let version = old_tree
            .filter(|tree| tree.language() == &self.language)
            .map_or(0, |tree| tree.version() + 1);
        Ok(Tree::new(root, self.language.clone()).with_version(version))
    }

    pub fn parse_str(&self, text: &str, old_tree: Option<&Tree>) -> Result<Tree, ParseError> {
        self.parse(text.as_bytes(), old_tree)
    }
}

fn check_input_len(len: usize) -> Result<(), ParseError> {
    match u32::try_from(len) {
        Ok(_) => Ok(()),
        Err(_) => Err(ParseError::ResourceExceeded { limit: Limit::InputLength }),
    }
}
