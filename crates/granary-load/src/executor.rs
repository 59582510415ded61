//! Build executor
//!
//! Drives a resolved batch against the warehouse, one relation at a time.
//! Each table gets one transaction enclosing create, populate, and grant;
//! ANALYZE runs right after the commit. VACUUM is collected per run and
//! executed later through [`vacuum_relations`] on a separate autocommit
//! connection, because the warehouse refuses vacuum-class statements
//! inside a transaction block.
//!
//! A failure rolls back the open transaction and marks the relation
//! failed. Unless the caller asked to keep going, every later relation is
//! left in skipped state so a broken upstream never feeds a downstream
//! build.

use std::time::Instant;

use granary_core::{
    BuildPhase, BuildStatus, Diagnostic, DiagnosticCode, RelationName, RelationOutcome, Severity,
    TableDesign,
};
use granary_design::{DesignError, RelationDescriptor};
use granary_warehouse::{ddl, scrub_credentials, Warehouse, WarehouseError};
use thiserror::Error;

use crate::copy_source::CopySource;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Design(#[from] DesignError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

/// Caller-supplied knobs for one run.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Log every statement instead of executing anything
    pub dry_run: bool,

    /// Continue with later relations after a failure
    pub keep_going: bool,

    /// Drop every relation before creating it (forced rebuild)
    pub drop_first: bool,

    /// EXPLAIN each transformation query before staging it
    pub with_explain: bool,

    /// Role that ends up owning created tables
    pub owner: String,

    /// Group granted full privileges
    pub etl_group: String,

    /// Group granted SELECT
    pub reader_group: String,

    /// IAM role the warehouse assumes for COPY
    pub iam_role: String,

    /// Object storage bucket holding the data files
    pub bucket: String,

    /// Key prefix under the bucket, e.g. `data`
    pub prefix: String,
}

/// Everything a run produced, ready to be turned into a report.
#[derive(Debug, Default)]
pub struct BuildOutput {
    pub outcomes: Vec<RelationOutcome>,
    pub diagnostics: Vec<Diagnostic>,

    /// Tables that were built and still need their deferred VACUUM
    pub vacuumable: Vec<RelationName>,
}

/// Build every relation of the batch, in the order given.
///
/// The batch must already be resolved: the slice order is the build order.
/// Design or query problems abort the whole run before any statement is
/// issued; per-relation warehouse failures are isolated to that relation.
pub fn build_relations(
    warehouse: &mut dyn Warehouse,
    relations: &[RelationDescriptor],
    options: &BuildOptions,
) -> Result<BuildOutput, LoadError> {
    // Fail on unreadable designs and missing queries before touching the
    // warehouse at all.
    for descriptor in relations {
        let design = descriptor.design()?;
        if design.source_name.is_derived() {
            descriptor.query()?;
        }
    }

    let mut output = BuildOutput::default();
    let mut aborted = false;

    for descriptor in relations {
        let design = descriptor.design()?;
        let mut outcome = RelationOutcome::new(descriptor.identifier(), design.source_name.label());
        if aborted {
            tracing::warn!("skipping '{}' after earlier failure", descriptor.identifier());
            output.outcomes.push(outcome);
            continue;
        }

        let started = Instant::now();
        let mut transaction_open = false;
        let result = build_relation(
            warehouse,
            descriptor,
            design,
            options,
            &mut outcome,
            &mut transaction_open,
        );
        outcome.elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                outcome.status = BuildStatus::Built;
                if !design.source_name.is_view() {
                    output.vacuumable.push(descriptor.name.clone());
                }
            }
            Err(error) => {
                outcome.status = BuildStatus::Failed;
                let message = error.to_string();
                if !options.dry_run {
                    // ANALYZE runs after the commit, so a failure there
                    // has no transaction left to roll back.
                    if transaction_open {
                        if let Err(rollback_error) = warehouse.rollback() {
                            tracing::warn!(
                                "rollback after failed build of '{}' failed: {rollback_error}",
                                descriptor.identifier()
                            );
                        }
                    }
                    if message.contains("stl_load_errors") {
                        log_last_load_error(warehouse);
                    }
                }
                tracing::error!("failed to build '{}': {message}", descriptor.identifier());
                output.diagnostics.push(
                    Diagnostic::new(DiagnosticCode::LoadFailed, Severity::Error, message.clone())
                        .with_relation(descriptor.identifier()),
                );
                outcome.error = Some(message);
                if !options.keep_going {
                    aborted = true;
                }
            }
        }
        output.outcomes.push(outcome);
    }

    Ok(output)
}

fn log_last_load_error(warehouse: &mut dyn Warehouse) {
    match warehouse.last_load_error() {
        Ok(Some(row)) => tracing::warn!("most recent load error:\n{row}"),
        Ok(None) => {}
        Err(error) => tracing::warn!("failed to fetch load error details: {error}"),
    }
}

fn build_relation(
    warehouse: &mut dyn Warehouse,
    descriptor: &RelationDescriptor,
    design: &TableDesign,
    options: &BuildOptions,
    outcome: &mut RelationOutcome,
    transaction_open: &mut bool,
) -> Result<(), LoadError> {
    let name = &descriptor.name;
    tracing::info!(
        "building {} '{}'",
        design.source_name.label(),
        descriptor.identifier()
    );

    if !options.dry_run {
        warehouse.begin()?;
        *transaction_open = true;
    }

    if design.source_name.is_view() {
        let mut statements = Vec::new();
        if options.drop_first {
            statements.push(ddl::build_drop_view(name));
        }
        statements.push(ddl::build_view(design, name, descriptor.query()?));
        run_phase(warehouse, outcome, options, BuildPhase::Created, statements)?;
        if !options.dry_run {
            warehouse.commit()?;
            *transaction_open = false;
        }
        return Ok(());
    }

    let mut statements = Vec::new();
    if options.drop_first {
        statements.push(ddl::build_drop_table(name));
    }
    statements.push(ddl::build_table(design, &name.to_string(), false));
    statements.push(ddl::build_alter_owner(name, &options.owner));
    run_phase(warehouse, outcome, options, BuildPhase::Created, statements)?;

    let rows = if design.source_name.is_upstream() {
        populate_from_upstream(warehouse, outcome, name, options)?
    } else {
        populate_from_query(warehouse, outcome, descriptor, design, options)?
    };
    if !options.dry_run {
        outcome.rows = Some(rows);
    }

    let statements = vec![
        ddl::build_grant_all(name, &options.etl_group),
        ddl::build_grant_select(name, &options.reader_group),
    ];
    run_phase(warehouse, outcome, options, BuildPhase::Granted, statements)?;

    if !options.dry_run {
        warehouse.commit()?;
        *transaction_open = false;
    }

    // ANALYZE runs on its own, outside the write transaction.
    let statements = vec![ddl::build_analyze(name)];
    run_phase(warehouse, outcome, options, BuildPhase::Analyzed, statements)?;
    Ok(())
}

fn populate_from_upstream(
    warehouse: &mut dyn Warehouse,
    outcome: &mut RelationOutcome,
    name: &RelationName,
    options: &BuildOptions,
) -> Result<u64, LoadError> {
    let source = CopySource::manifest_for(&options.prefix, name);
    let statements = vec![
        ddl::build_delete(name),
        ddl::build_copy(
            name,
            &source.location(&options.bucket),
            &options.iam_role,
            source.with_manifest(),
        ),
    ];
    let counts = run_phase(warehouse, outcome, options, BuildPhase::Populated, statements)?;
    Ok(counts.last().copied().unwrap_or(0))
}

fn populate_from_query(
    warehouse: &mut dyn Warehouse,
    outcome: &mut RelationOutcome,
    descriptor: &RelationDescriptor,
    design: &TableDesign,
    options: &BuildOptions,
) -> Result<u64, LoadError> {
    let name = &descriptor.name;
    let query = descriptor.query()?;
    if options.with_explain && !options.dry_run {
        let plan = warehouse.explain(query)?;
        tracing::debug!(
            "query plan for '{}':\n{}",
            descriptor.identifier(),
            plan.join("\n")
        );
    }

    let staging = ddl::staging_table_name(name);
    let mut statements = Vec::new();
    if design.has_identity() {
        statements.push(ddl::build_table(design, &staging, true));
        statements.push(ddl::build_staging_fill(design, &staging, query));
    } else {
        statements.push(ddl::build_staging_ctas(design, &staging, query));
    }
    statements.push(ddl::build_delete(name));
    statements.push(ddl::build_swap(design, name, &staging));
    statements.push(ddl::build_drop_staging(&staging));

    let counts = run_phase(warehouse, outcome, options, BuildPhase::Populated, statements)?;
    // Row count of the swap INSERT, just before the staging DROP.
    Ok(counts[counts.len() - 2])
}

/// Execute one phase's statements in order, or log them in dry-run mode.
///
/// The phase is recorded on the outcome either way, with credentials
/// scrubbed, so a dry-run report shows the full planned sequence.
fn run_phase(
    warehouse: &mut dyn Warehouse,
    outcome: &mut RelationOutcome,
    options: &BuildOptions,
    phase: BuildPhase,
    statements: Vec<String>,
) -> Result<Vec<u64>, LoadError> {
    let mut counts = Vec::with_capacity(statements.len());
    for statement in &statements {
        if options.dry_run {
            tracing::info!("dry-run, would execute:\n{}\n;", scrub_credentials(statement));
            counts.push(0);
        } else {
            counts.push(warehouse.execute(statement)?);
        }
    }
    outcome.record_phase(
        phase,
        statements.iter().map(|s| scrub_credentials(s)).collect(),
    );
    Ok(counts)
}

/// Run the deferred VACUUMs for every table the run built.
///
/// `warehouse` must be a separate autocommit connection opened after the
/// build transactions have closed; the statements run bare, with no BEGIN.
pub fn vacuum_relations(
    warehouse: &mut dyn Warehouse,
    output: &mut BuildOutput,
    dry_run: bool,
) -> Result<(), LoadError> {
    let names = output.vacuumable.clone();
    for name in &names {
        let statement = ddl::build_vacuum(name);
        if dry_run {
            tracing::info!("dry-run, would execute:\n{statement}\n;");
        } else {
            warehouse.execute(&statement)?;
        }
        if let Some(outcome) = output
            .outcomes
            .iter_mut()
            .find(|outcome| outcome.relation == name.identifier())
        {
            outcome.record_phase(BuildPhase::Vacuumed, vec![statement]);
        }
    }
    Ok(())
}
