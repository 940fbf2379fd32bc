//! Regex-typed parameter values.

use crate::binding::ParseArg;
use complyscan_core::{Error, Result};
use regex::Regex;
use std::fmt;

/// A regex parameter: the raw source plus the automata compiled when the
/// argument was bound. Compile failures surface at bind time, never at
/// first use inside a check.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
    /// `^(?:source)$`; leftmost-first search on the plain automaton cannot
    /// answer whole-string questions when alternatives share a prefix.
    anchored: Regex,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let regex = compile(&source)?;
        let anchored = compile(&format!("^(?:{})$", source))?;
        Ok(Self {
            source,
            regex,
            anchored,
        })
    }

    /// The pattern text as the caller supplied it.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// True when `text` contains a match anywhere (grep semantics).
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// True when the whole of `text` matches.
    pub fn matches_fully(&self, text: &str) -> bool {
        self.anchored.is_match(text)
    }
}

fn compile(source: &str) -> Result<Regex> {
    Regex::new(source).map_err(|err| {
        Error::invalid_argument(format!(
            "regular expression '{}' compilation failed: {}",
            source, err
        ))
    })
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl ParseArg for Pattern {
    fn parse_arg(raw: &str) -> Result<Self> {
        Pattern::new(raw)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
