//! Run reports
//!
//! A report is the machine-readable record of one orchestrator run: what
//! was built, in which phases, how long it took, and every diagnostic the
//! run produced. Reports serialize to JSON for CI and audit trails.

use crate::diagnostic::{Diagnostic, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Version of the report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    pub major: u32,
    pub minor: u32,
}

impl ReportVersion {
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

/// Build phases a relation passes through, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildPhase {
    Created,
    Populated,
    Granted,
    Analyzed,
    Vacuumed,
}

impl BuildPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Populated => "populated",
            Self::Granted => "granted",
            Self::Analyzed => "analyzed",
            Self::Vacuumed => "vacuumed",
        }
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Statements that ran (or would run) for one phase of one relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: BuildPhase,

    /// Statements in execution order, with credentials scrubbed
    pub statements: Vec<String>,
}

impl PhaseRecord {
    pub fn new(phase: BuildPhase, statements: Vec<String>) -> Self {
        Self { phase, statements }
    }
}

/// Final status of one relation in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Built,
    Failed,
    Skipped,
}

/// Per-relation result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationOutcome {
    /// Relation identifier, e.g. `www.orders`
    pub relation: String,

    /// Source kind label from the design (`CTAS`, `VIEW`, or a source name)
    pub kind: String,

    pub status: BuildStatus,

    /// Wall-clock time spent on the relation
    pub elapsed_ms: u64,

    /// Rows loaded or inserted, when the warehouse reported a count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,

    /// Error message for failed relations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Phases in the order they ran
    pub phases: Vec<PhaseRecord>,
}

impl RelationOutcome {
    pub fn new(relation: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            kind: kind.into(),
            status: BuildStatus::Skipped,
            elapsed_ms: 0,
            rows: None,
            error: None,
            phases: Vec::new(),
        }
    }

    /// Record a completed phase
    pub fn record_phase(&mut self, phase: BuildPhase, statements: Vec<String>) {
        self.phases.push(PhaseRecord::new(phase, statements));
    }
}

/// Aggregate counts over one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub relations: usize,
    pub built: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
}

/// The full record of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub version: ReportVersion,

    /// When the run finished, RFC 3339 in UTC
    pub timestamp: String,

    /// True when no statement was sent to the warehouse
    pub dry_run: bool,

    pub summary: ReportSummary,
    pub outcomes: Vec<RelationOutcome>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    /// Assemble a report from the results of a run
    pub fn from_run(
        outcomes: Vec<RelationOutcome>,
        diagnostics: Vec<Diagnostic>,
        dry_run: bool,
    ) -> Self {
        let mut summary = ReportSummary {
            relations: outcomes.len(),
            ..ReportSummary::default()
        };
        for outcome in &outcomes {
            match outcome.status {
                BuildStatus::Built => summary.built += 1,
                BuildStatus::Failed => summary.failed += 1,
                BuildStatus::Skipped => summary.skipped += 1,
            }
        }
        for diagnostic in &diagnostics {
            match diagnostic.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warn => summary.warnings += 1,
                Severity::Info => summary.info += 1,
            }
        }
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            dry_run,
            summary,
            outcomes,
            diagnostics,
        }
    }

    /// Append a diagnostic and keep the summary counts in step
    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.summary.errors += 1,
            Severity::Warn => self.summary.warnings += 1,
            Severity::Info => self.summary.info += 1,
        }
        self.diagnostics.push(diagnostic);
    }

    /// True when the run should fail CI
    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0 || self.summary.failed > 0
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the JSON report to a file
    pub fn save_to_file(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}
