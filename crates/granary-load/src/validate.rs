//! Design validator
//!
//! Materializes a derived relation's query as a throwaway view, asks the
//! warehouse catalog what the view actually reads and returns, and diffs
//! that against the design. Catches stale `depends_on` lists and column
//! drift before a build wastes an hour loading on top of them.

use std::collections::BTreeSet;

use granary_core::{Diagnostic, DiagnosticCode, RelationName, Severity, TableDesign};
use granary_design::RelationDescriptor;
use granary_warehouse::{ddl, Warehouse};

use crate::executor::LoadError;

/// Name prefix of the throwaway views, reserved for the validator.
const TEMP_VIEW_PREFIX: &str = "granary_temp$";

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    /// Report mismatches as warnings instead of errors
    pub keep_going: bool,

    /// EXPLAIN the query and log the plan before materializing it
    pub with_explain: bool,
}

/// Validate one relation's design against the warehouse.
///
/// Upstream relations have nothing to check and return no findings. For
/// CTAS and VIEW relations the query is materialized under a temporary
/// name, inspected, and the view dropped again whatever the outcome.
///
/// A missing design or query aborts either way. A warehouse failure while
/// checking is fatal in strict mode; under `keep_going` it turns into a
/// warning so the remaining relations still get checked.
pub fn validate_relation(
    warehouse: &mut dyn Warehouse,
    descriptor: &RelationDescriptor,
    options: &ValidateOptions,
) -> Result<Vec<Diagnostic>, LoadError> {
    let design = descriptor.design()?;
    if !design.source_name.is_derived() {
        return Ok(Vec::new());
    }
    let query = descriptor.query()?;

    match check_against_warehouse(warehouse, descriptor, design, query, options) {
        Err(LoadError::Warehouse(error)) if options.keep_going => {
            tracing::warn!(
                "ignoring failure to check '{}' and proceeding as requested: {error}",
                descriptor.identifier()
            );
            Ok(vec![Diagnostic::new(
                DiagnosticCode::LoadFailed,
                Severity::Warn,
                format!(
                    "design of '{}' could not be checked: {error}",
                    descriptor.identifier()
                ),
            )
            .with_relation(descriptor.identifier())])
        }
        result => result,
    }
}

fn check_against_warehouse(
    warehouse: &mut dyn Warehouse,
    descriptor: &RelationDescriptor,
    design: &TableDesign,
    query: &str,
    options: &ValidateOptions,
) -> Result<Vec<Diagnostic>, LoadError> {
    if options.with_explain {
        let plan = warehouse.explain(query)?;
        tracing::debug!(
            "query plan for '{}':\n{}",
            descriptor.identifier(),
            plan.join("\n")
        );
    }

    let view = RelationName::new(
        descriptor.name.schema.clone(),
        format!("{TEMP_VIEW_PREFIX}{}", descriptor.name.table),
    );
    tracing::info!("validating design of '{}'", descriptor.identifier());

    let created = warehouse.execute(&format!("CREATE OR REPLACE VIEW {view} AS\n{query}"));
    let result = match created {
        Ok(_) => inspect_view(warehouse, &view, descriptor, design, options),
        Err(error) => Err(error.into()),
    };
    if let Err(error) = warehouse.execute(&ddl::build_drop_view(&view)) {
        tracing::warn!("failed to drop temporary view {view}: {error}");
    }
    result
}

fn inspect_view(
    warehouse: &mut dyn Warehouse,
    view: &RelationName,
    descriptor: &RelationDescriptor,
    design: &TableDesign,
    options: &ValidateOptions,
) -> Result<Vec<Diagnostic>, LoadError> {
    let severity = if options.keep_going {
        Severity::Warn
    } else {
        Severity::Error
    };
    let mut diagnostics = Vec::new();

    let declared = descriptor.dependencies()?;
    let observed: BTreeSet<String> = warehouse
        .view_dependencies(view)?
        .iter()
        .map(RelationName::identifier)
        .collect();

    let not_declared: Vec<String> = observed.difference(declared).cloned().collect();
    if !not_declared.is_empty() {
        diagnostics.push(
            Diagnostic::new(
                DiagnosticCode::DependencyNotDeclared,
                severity,
                format!(
                    "relation '{}' reads from relations its design does not declare: {}",
                    descriptor.identifier(),
                    quoted_list(&not_declared)
                ),
            )
            .with_relation(descriptor.identifier()),
        );
    }
    let not_observed: Vec<String> = declared.difference(&observed).cloned().collect();
    if !not_observed.is_empty() {
        diagnostics.push(
            Diagnostic::new(
                DiagnosticCode::DependencyNotObserved,
                severity,
                format!(
                    "relation '{}' declares dependencies its query does not read: {}",
                    descriptor.identifier(),
                    quoted_list(&not_observed)
                ),
            )
            .with_relation(descriptor.identifier()),
        );
    }

    let expected: Vec<String> = design
        .unskipped_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let mut observed_columns = warehouse.relation_columns(view)?;
    // Identity columns only exist on real tables, never in a view's
    // output; reinsert them at their designed position so the designed
    // and observed lists compare like for like.
    for (index, column) in design.unskipped_columns().enumerate() {
        if column.identity {
            if index <= observed_columns.len() {
                observed_columns.insert(index, column.name.clone());
            } else {
                observed_columns.push(column.name.clone());
            }
        }
    }
    if observed_columns != expected {
        diagnostics.push(
            Diagnostic::new(
                DiagnosticCode::ColumnMismatch,
                severity,
                format!(
                    "columns of '{}' in design and warehouse differ",
                    descriptor.identifier()
                ),
            )
            .with_relation(descriptor.identifier())
            .with_comparison(expected, observed_columns),
        );
    }
    Ok(diagnostics)
}

fn quoted_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("'{item}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use granary_core::{ColumnDef, SourceKind};
    use granary_warehouse::MockWarehouse;
    use pretty_assertions::assert_eq;

    fn ctas_descriptor(columns: Vec<ColumnDef>, depends_on: &[&str]) -> RelationDescriptor {
        let name = RelationName::new("mart", "orders");
        let design = TableDesign::new("mart.orders", SourceKind::Ctas)
            .with_columns(columns)
            .with_depends_on(depends_on.iter().map(|d| d.to_string()).collect());
        RelationDescriptor::with_design(name, design)
            .with_query("SELECT id, amount FROM raw.orders")
    }

    #[test]
    fn test_upstream_relations_have_nothing_to_validate() {
        let name = RelationName::new("raw", "orders");
        let design = TableDesign::new("raw.orders", SourceKind::Upstream("erp".to_string()));
        let descriptor = RelationDescriptor::with_design(name, design);
        let mut warehouse = MockWarehouse::new();

        let diagnostics =
            validate_relation(&mut warehouse, &descriptor, &ValidateOptions::default()).unwrap();
        assert!(diagnostics.is_empty());
        assert!(warehouse.executed.is_empty());
    }

    #[test]
    fn test_clean_design_produces_no_findings() {
        let descriptor = ctas_descriptor(
            vec![
                ColumnDef::new("id", "integer"),
                ColumnDef::new("amount", "numeric(10,2)"),
            ],
            &["raw.orders"],
        );
        let mut warehouse = MockWarehouse::new()
            .with_dependencies("mart.granary_temp$orders", vec![RelationName::new("raw", "orders")])
            .with_columns(
                "mart.granary_temp$orders",
                vec!["id".to_string(), "amount".to_string()],
            );

        let diagnostics =
            validate_relation(&mut warehouse, &descriptor, &ValidateOptions::default()).unwrap();
        assert_eq!(diagnostics, Vec::new());

        // The throwaway view is created under the reserved prefix and
        // dropped again at the end.
        assert!(warehouse.executed[0]
            .starts_with("CREATE OR REPLACE VIEW \"mart\".\"granary_temp$orders\" AS"));
        assert_eq!(
            warehouse.executed.last().map(String::as_str),
            Some("DROP VIEW IF EXISTS \"mart\".\"granary_temp$orders\" CASCADE")
        );
    }

    #[test]
    fn test_identity_columns_are_reinserted_before_comparing() {
        let descriptor = ctas_descriptor(
            vec![
                ColumnDef::new("a", "integer").with_identity(),
                ColumnDef::new("b", "integer"),
                ColumnDef::new("c", "integer"),
            ],
            &[],
        );
        let mut warehouse = MockWarehouse::new().with_columns(
            "mart.granary_temp$orders",
            vec!["b".to_string(), "c".to_string()],
        );

        let diagnostics =
            validate_relation(&mut warehouse, &descriptor, &ValidateOptions::default()).unwrap();
        assert_eq!(diagnostics, Vec::new());
    }

    #[test]
    fn test_dependency_diff_reports_both_directions() {
        let descriptor = ctas_descriptor(
            vec![ColumnDef::new("id", "integer")],
            &["raw.orders", "raw.customers"],
        );
        let mut warehouse = MockWarehouse::new()
            .with_dependencies(
                "mart.granary_temp$orders",
                vec![
                    RelationName::new("raw", "orders"),
                    RelationName::new("raw", "line_items"),
                ],
            )
            .with_columns("mart.granary_temp$orders", vec!["id".to_string()]);

        let diagnostics =
            validate_relation(&mut warehouse, &descriptor, &ValidateOptions::default()).unwrap();
        assert_eq!(diagnostics.len(), 2);

        assert_eq!(diagnostics[0].code, DiagnosticCode::DependencyNotDeclared);
        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert!(diagnostics[0].message.contains("'raw.line_items'"));

        assert_eq!(diagnostics[1].code, DiagnosticCode::DependencyNotObserved);
        assert!(diagnostics[1].message.contains("'raw.customers'"));
    }

    #[test]
    fn test_keep_going_downgrades_findings_to_warnings() {
        let descriptor = ctas_descriptor(vec![ColumnDef::new("id", "integer")], &["raw.orders"]);
        let mut warehouse =
            MockWarehouse::new().with_columns("mart.granary_temp$orders", vec!["id".to_string()]);

        let keep_going = ValidateOptions {
            keep_going: true,
            ..ValidateOptions::default()
        };
        let diagnostics = validate_relation(&mut warehouse, &descriptor, &keep_going).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::DependencyNotObserved);
        assert_eq!(diagnostics[0].severity, Severity::Warn);
    }

    #[test]
    fn test_column_mismatch_carries_both_sides() {
        let descriptor = ctas_descriptor(
            vec![
                ColumnDef::new("id", "integer"),
                ColumnDef::new("amount", "numeric(10,2)"),
            ],
            &[],
        );
        let mut warehouse = MockWarehouse::new().with_columns(
            "mart.granary_temp$orders",
            vec!["id".to_string(), "total".to_string()],
        );

        let diagnostics =
            validate_relation(&mut warehouse, &descriptor, &ValidateOptions::default()).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::ColumnMismatch);
        assert_eq!(
            diagnostics[0].expected,
            Some(vec!["id".to_string(), "amount".to_string()])
        );
        assert_eq!(
            diagnostics[0].actual,
            Some(vec!["id".to_string(), "total".to_string()])
        );
    }

    #[test]
    fn test_view_is_dropped_even_when_creation_fails() {
        let descriptor = ctas_descriptor(vec![ColumnDef::new("id", "integer")], &[]);
        let mut warehouse =
            MockWarehouse::new().with_failure_on("CREATE OR REPLACE VIEW", "syntax error");

        let error = validate_relation(&mut warehouse, &descriptor, &ValidateOptions::default())
            .unwrap_err();
        assert!(error.to_string().contains("syntax error"));
        assert_eq!(
            warehouse.executed,
            vec!["DROP VIEW IF EXISTS \"mart\".\"granary_temp$orders\" CASCADE"]
        );
    }

    #[test]
    fn test_keep_going_turns_a_creation_failure_into_a_warning() {
        let descriptor = ctas_descriptor(vec![ColumnDef::new("id", "integer")], &[]);
        let mut warehouse =
            MockWarehouse::new().with_failure_on("CREATE OR REPLACE VIEW", "syntax error");

        let keep_going = ValidateOptions {
            keep_going: true,
            ..ValidateOptions::default()
        };
        let diagnostics = validate_relation(&mut warehouse, &descriptor, &keep_going).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::LoadFailed);
        assert_eq!(diagnostics[0].severity, Severity::Warn);
        assert_eq!(diagnostics[0].relation.as_deref(), Some("mart.orders"));
        assert!(diagnostics[0].message.contains("syntax error"));
        assert_eq!(
            warehouse.executed,
            vec!["DROP VIEW IF EXISTS \"mart\".\"granary_temp$orders\" CASCADE"]
        );
    }
}
