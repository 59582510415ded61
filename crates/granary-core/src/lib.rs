//! Granary Core
//!
//! Shared domain model for the Granary warehouse orchestrator: relation
//! names, design documents, diagnostics, run reports, and configuration.

pub mod config;
pub mod design;
pub mod diagnostic;
pub mod name;
pub mod report;

pub use config::{Config, ConfigError, DesignConfig, LoadConfig, WarehouseConfig};
pub use design::{
    ColumnDef, Constraints, DistStyle, Distribution, ForeignKey, SourceKind, TableAttributes,
    TableDesign,
};
pub use diagnostic::{Diagnostic, DiagnosticCode, Severity};
pub use name::{InvalidIdentifier, RelationName};
pub use report::{
    BuildPhase, BuildStatus, PhaseRecord, RelationOutcome, Report, ReportSummary, ReportVersion,
};
