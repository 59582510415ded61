//! Relation identity
//!
//! Every relation lives in exactly one schema, so a schema/table pair is
//! enough to address it. The dotted `identifier` form (`schema.table`) is
//! what design documents and selection patterns use; the `Display` form is
//! the double-quoted rendering that goes into SQL.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Name of a warehouse relation (table or view).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationName {
    /// Schema containing the relation
    pub schema: String,

    /// Relation name within the schema
    pub table: String,
}

impl RelationName {
    /// Create a new relation name
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Dotted identifier, e.g. `www.orders`
    pub fn identifier(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Parse a dotted identifier into a relation name
    ///
    /// The identifier splits at the first `.`, so the schema part never
    /// contains a dot.
    pub fn from_identifier(identifier: &str) -> Result<Self, InvalidIdentifier> {
        match identifier.split_once('.') {
            Some((schema, table)) if !schema.is_empty() && !table.is_empty() => {
                Ok(Self::new(schema, table))
            }
            _ => Err(InvalidIdentifier(identifier.to_string())),
        }
    }
}

impl fmt::Display for RelationName {
    /// Quoted SQL form, e.g. `"www"."orders"`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\".\"{}\"", self.schema, self.table)
    }
}

/// Error for identifiers that do not split into a schema and a table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid relation identifier '{0}', expected 'schema.table'")]
pub struct InvalidIdentifier(pub String);
