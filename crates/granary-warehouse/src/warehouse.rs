//! Warehouse interface
//!
//! The executor and the validator only ever talk to the warehouse through
//! this trait, so tests can swap in a recording mock and assert on the
//! statement stream instead of needing a live cluster.

use granary_core::RelationName;
use std::fmt;
use thiserror::Error;

/// One warehouse session.
///
/// All calls are blocking; transaction state belongs to the session, so one
/// value of this type must never be shared across concurrently built
/// relations.
pub trait Warehouse {
    /// Label for log lines, e.g. the configured DSN environment name
    fn name(&self) -> &str;

    /// Run one statement and return the affected row count
    fn execute(&mut self, sql: &str) -> Result<u64, WarehouseError>;

    fn begin(&mut self) -> Result<(), WarehouseError>;
    fn commit(&mut self) -> Result<(), WarehouseError>;
    fn rollback(&mut self) -> Result<(), WarehouseError>;

    /// Fetch the plan for a query without running it
    fn explain(&mut self, query: &str) -> Result<Vec<String>, WarehouseError>;

    /// Most recent row of the load-error table for this session, if any
    fn last_load_error(&mut self) -> Result<Option<LoadErrorRow>, WarehouseError>;

    /// Relations a view reads from, according to the catalog
    fn view_dependencies(
        &mut self,
        name: &RelationName,
    ) -> Result<Vec<RelationName>, WarehouseError>;

    /// Output columns of a relation in catalog order
    fn relation_columns(&mut self, name: &RelationName) -> Result<Vec<String>, WarehouseError>;
}

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("failed to connect to warehouse '{0}': {1}")]
    ConnectionError(String, String),

    #[error("statement failed: {0}")]
    StatementError(String),

    #[error("unexpected result from warehouse: {0}")]
    UnexpectedResult(String),
}

/// One row of the warehouse's load-error table.
///
/// All fields are kept as text: the row only exists to be logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadErrorRow {
    pub query: String,
    pub starttime: String,
    pub filename: String,
    pub colname: String,
    pub column_type: String,
    pub col_length: String,
    pub line_number: String,
    pub position: String,
    pub err_code: String,
    pub err_reason: String,
}

impl fmt::Display for LoadErrorRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            ("query", &self.query),
            ("starttime", &self.starttime),
            ("filename", &self.filename),
            ("colname", &self.colname),
            ("type", &self.column_type),
            ("col_length", &self.col_length),
            ("line_number", &self.line_number),
            ("position", &self.position),
            ("err_code", &self.err_code),
            ("err_reason", &self.err_reason),
        ];
        for (idx, (key, value)) in fields.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{key}: {value}")?;
        }
        Ok(())
    }
}
