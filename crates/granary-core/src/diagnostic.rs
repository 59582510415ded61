//! Diagnostics
//!
//! Structured findings produced by the resolver, the executor, and the
//! design validator. Each diagnostic carries a stable code so downstream
//! tooling can filter without parsing messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for a class of finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// A design depends on an identifier that no relation in the batch has
    UnknownDependency,
    /// The warehouse observed a dependency the design does not declare
    DependencyNotDeclared,
    /// The design declares a dependency the warehouse does not observe
    DependencyNotObserved,
    /// Observed output columns differ from the designed columns
    ColumnMismatch,
    /// A relation failed to build or load
    LoadFailed,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownDependency => "UNKNOWN_DEPENDENCY",
            Self::DependencyNotDeclared => "DEPENDENCY_NOT_DECLARED",
            Self::DependencyNotObserved => "DEPENDENCY_NOT_OBSERVED",
            Self::ColumnMismatch => "COLUMN_MISMATCH",
            Self::LoadFailed => "LOAD_FAILED",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How serious a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One finding about a relation or a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub message: String,

    /// Identifier of the relation the finding is about, when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,

    /// What the design declares, for comparison findings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Vec<String>>,

    /// What the warehouse observed, for comparison findings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Vec<String>>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            relation: None,
            expected: None,
            actual: None,
        }
    }

    /// Attach the relation the finding is about
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    /// Attach the declared and observed sides of a comparison
    pub fn with_comparison(mut self, expected: Vec<String>, actual: Vec<String>) -> Self {
        self.expected = Some(expected);
        self.actual = Some(actual);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            Some(relation) => {
                write!(f, "[{}] {}: {}", self.severity, relation, self.message)
            }
            None => write!(f, "[{}] {}", self.severity, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_strings() {
        assert_eq!(DiagnosticCode::UnknownDependency.as_str(), "UNKNOWN_DEPENDENCY");
        assert_eq!(DiagnosticCode::ColumnMismatch.as_str(), "COLUMN_MISMATCH");
        assert_eq!(DiagnosticCode::LoadFailed.to_string(), "LOAD_FAILED");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
    }

    #[test]
    fn test_builders_and_display() {
        let diagnostic = Diagnostic::new(
            DiagnosticCode::ColumnMismatch,
            Severity::Error,
            "columns of 'www.orders' in design and database differ",
        )
        .with_relation("www.orders")
        .with_comparison(vec!["a".to_string()], vec!["b".to_string()]);

        assert_eq!(diagnostic.relation.as_deref(), Some("www.orders"));
        assert_eq!(diagnostic.expected, Some(vec!["a".to_string()]));
        assert_eq!(diagnostic.actual, Some(vec!["b".to_string()]));
        assert_eq!(
            diagnostic.to_string(),
            "[error] www.orders: columns of 'www.orders' in design and database differ"
        );
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let diagnostic = Diagnostic::new(
            DiagnosticCode::UnknownDependency,
            Severity::Warn,
            "found unknown dependencies",
        );
        let value = serde_json::to_value(&diagnostic).unwrap();
        assert!(value.get("relation").is_none());
        assert!(value.get("expected").is_none());
        assert_eq!(value["severity"], "warn");
    }
}
