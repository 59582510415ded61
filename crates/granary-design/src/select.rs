//! Relation selection
//!
//! Commands take zero or more patterns like `www`, `www.orders`, or
//! `www.order*`. No patterns selects everything; a bare schema pattern
//! selects every relation in matching schemas. `*` and `?` are the only
//! wildcards.

use granary_core::RelationName;
use regex::Regex;
use thiserror::Error;

/// A set of selection patterns.
#[derive(Debug, Clone)]
pub struct Selector {
    patterns: Vec<Pattern>,
}

#[derive(Debug, Clone)]
struct Pattern {
    raw: String,
    schema: Regex,
    table: Option<Regex>,
}

impl Selector {
    /// Select everything
    pub fn all() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Compile command-line patterns; an empty list selects everything
    pub fn from_patterns(patterns: &[String]) -> Result<Self, SelectError> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let (schema, table) = match raw.split_once('.') {
                Some((schema, table)) => (schema, Some(table)),
                None => (raw.as_str(), None),
            };
            if schema.is_empty() || table == Some("") {
                return Err(SelectError::InvalidPattern(raw.clone()));
            }
            compiled.push(Pattern {
                raw: raw.clone(),
                schema: glob_regex(schema),
                table: table.map(glob_regex),
            });
        }
        Ok(Self { patterns: compiled })
    }

    /// True when the relation matches any pattern (or there are none)
    pub fn matches(&self, name: &RelationName) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|pattern| pattern.matches(name))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The raw patterns, for log lines
    pub fn descriptions(&self) -> Vec<&str> {
        self.patterns
            .iter()
            .map(|pattern| pattern.raw.as_str())
            .collect()
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::all()
    }
}

impl Pattern {
    fn matches(&self, name: &RelationName) -> bool {
        if !self.schema.is_match(&name.schema) {
            return false;
        }
        match &self.table {
            Some(table) => table.is_match(&name.table),
            None => true,
        }
    }
}

fn glob_regex(glob: &str) -> Regex {
    let escaped = regex::escape(glob).replace(r"\*", ".*").replace(r"\?", ".");
    Regex::new(&format!("^{escaped}$")).expect("escaped glob is a valid regex")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("invalid selection pattern '{0}'")]
    InvalidPattern(String),
}
