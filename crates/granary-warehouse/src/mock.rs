//! In-memory warehouse for tests
//!
//! Records every statement instead of executing it, and can be primed to
//! fail on a statement fragment, to return a load-error row, or to answer
//! catalog queries with canned dependencies and columns.

use std::collections::HashMap;

use granary_core::RelationName;

use crate::warehouse::{LoadErrorRow, Warehouse, WarehouseError};

#[derive(Debug, Default)]
pub struct MockWarehouse {
    /// Every statement sent, in order, including BEGIN/COMMIT/ROLLBACK
    pub executed: Vec<String>,
    fail_on: Option<(String, String)>,
    load_error: Option<LoadErrorRow>,
    dependencies: HashMap<String, Vec<RelationName>>,
    columns: HashMap<String, Vec<String>>,
    rows_affected: u64,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any statement containing `fragment` with the given message
    pub fn with_failure_on(mut self, fragment: impl Into<String>, message: impl Into<String>) -> Self {
        self.fail_on = Some((fragment.into(), message.into()));
        self
    }

    pub fn with_load_error(mut self, row: LoadErrorRow) -> Self {
        self.load_error = Some(row);
        self
    }

    /// Prime the catalog answer for `view_dependencies` on one relation
    pub fn with_dependencies(mut self, identifier: &str, dependencies: Vec<RelationName>) -> Self {
        self.dependencies.insert(identifier.to_string(), dependencies);
        self
    }

    /// Prime the catalog answer for `relation_columns` on one relation
    pub fn with_columns(mut self, identifier: &str, columns: Vec<String>) -> Self {
        self.columns.insert(identifier.to_string(), columns);
        self
    }

    pub fn with_rows_affected(mut self, rows: u64) -> Self {
        self.rows_affected = rows;
        self
    }

    fn check(&self, sql: &str) -> Result<(), WarehouseError> {
        if let Some((fragment, message)) = &self.fail_on {
            if sql.contains(fragment.as_str()) {
                return Err(WarehouseError::StatementError(message.clone()));
            }
        }
        Ok(())
    }
}

impl Warehouse for MockWarehouse {
    fn name(&self) -> &str {
        "mock"
    }

    fn execute(&mut self, sql: &str) -> Result<u64, WarehouseError> {
        self.check(sql)?;
        self.executed.push(sql.to_string());
        Ok(self.rows_affected)
    }

    fn begin(&mut self) -> Result<(), WarehouseError> {
        self.execute("BEGIN").map(|_| ())
    }

    fn commit(&mut self) -> Result<(), WarehouseError> {
        self.execute("COMMIT").map(|_| ())
    }

    fn rollback(&mut self) -> Result<(), WarehouseError> {
        self.execute("ROLLBACK").map(|_| ())
    }

    fn explain(&mut self, query: &str) -> Result<Vec<String>, WarehouseError> {
        self.check(query)?;
        self.executed.push(format!("EXPLAIN\n{query}"));
        Ok(vec!["XN Seq Scan".to_string()])
    }

    fn last_load_error(&mut self) -> Result<Option<LoadErrorRow>, WarehouseError> {
        Ok(self.load_error.clone())
    }

    fn view_dependencies(
        &mut self,
        name: &RelationName,
    ) -> Result<Vec<RelationName>, WarehouseError> {
        Ok(self
            .dependencies
            .get(&name.identifier())
            .cloned()
            .unwrap_or_default())
    }

    fn relation_columns(&mut self, name: &RelationName) -> Result<Vec<String>, WarehouseError> {
        Ok(self
            .columns
            .get(&name.identifier())
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_statements_in_order() {
        let mut warehouse = MockWarehouse::new();
        warehouse.begin().unwrap();
        warehouse.execute("DELETE FROM \"www\".\"orders\"").unwrap();
        warehouse.commit().unwrap();
        assert_eq!(
            warehouse.executed,
            vec!["BEGIN", "DELETE FROM \"www\".\"orders\"", "COMMIT"]
        );
    }

    #[test]
    fn test_failure_injection() {
        let mut warehouse = MockWarehouse::new().with_failure_on("COPY", "permission denied");
        assert!(warehouse.execute("DELETE FROM \"raw\".\"orders\"").is_ok());
        let error = warehouse.execute("COPY \"raw\".\"orders\"\nFROM 's3://b/k'").unwrap_err();
        assert!(error.to_string().contains("permission denied"));
        // The failed statement is not recorded.
        assert_eq!(warehouse.executed.len(), 1);
    }

    #[test]
    fn test_canned_catalog_answers() {
        let mut warehouse = MockWarehouse::new()
            .with_dependencies("stg.v", vec![RelationName::new("raw", "orders")])
            .with_columns("stg.v", vec!["order_id".to_string()]);
        let name = RelationName::new("stg", "v");
        assert_eq!(
            warehouse.view_dependencies(&name).unwrap(),
            vec![RelationName::new("raw", "orders")]
        );
        assert_eq!(warehouse.relation_columns(&name).unwrap(), vec!["order_id"]);
        let other = RelationName::new("stg", "other");
        assert!(warehouse.view_dependencies(&other).unwrap().is_empty());
    }
}
