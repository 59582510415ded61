//! Relation descriptors
//!
//! A descriptor pairs a relation name with the files that define it. The
//! design document, the transformation query, and the dependency set are
//! loaded lazily and cached, so descriptors can be passed around freely
//! and only touch the disk when content is actually needed.

use crate::files::RelationFileSet;
use granary_core::{RelationName, TableDesign};
use once_cell::unsync::OnceCell;
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

/// One relation of the batch: its name, its files, and (after resolution)
/// its position in the build order.
#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    /// Relation the descriptor describes
    pub name: RelationName,

    design_path: PathBuf,
    query_path: Option<PathBuf>,

    design: OnceCell<TableDesign>,
    query: OnceCell<String>,
    dependencies: OnceCell<BTreeSet<String>>,

    order: Option<u32>,
}

impl RelationDescriptor {
    /// Wrap a discovered file set
    pub fn from_file_set(file_set: RelationFileSet) -> Self {
        Self {
            name: file_set.name,
            design_path: file_set.design_path,
            query_path: file_set.query_path,
            design: OnceCell::new(),
            query: OnceCell::new(),
            dependencies: OnceCell::new(),
            order: None,
        }
    }

    /// Build a descriptor around an in-memory design
    pub fn with_design(name: RelationName, design: TableDesign) -> Self {
        Self {
            name,
            design_path: PathBuf::new(),
            query_path: None,
            design: OnceCell::with_value(design),
            query: OnceCell::new(),
            dependencies: OnceCell::new(),
            order: None,
        }
    }

    /// Attach an in-memory transformation query
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = OnceCell::with_value(normalize_query(&query.into()));
        self
    }

    /// Dotted identifier of the relation, e.g. `www.orders`
    pub fn identifier(&self) -> String {
        self.name.identifier()
    }

    /// The design document, loaded and validated on first access
    pub fn design(&self) -> Result<&TableDesign, DesignError> {
        self.design.get_or_try_init(|| {
            let path = self.design_path.display().to_string();
            let contents = std::fs::read_to_string(&self.design_path)
                .map_err(|e| DesignError::IoError(path.clone(), e.to_string()))?;
            let design: TableDesign = serde_json::from_str(&contents)
                .map_err(|e| DesignError::ParseError(path.clone(), e.to_string()))?;
            if design.name != self.name.identifier() {
                return Err(DesignError::NameMismatch {
                    path,
                    declared: design.name,
                    expected: self.name.identifier(),
                });
            }
            Ok(design)
        })
    }

    /// The transformation query, loaded and normalized on first access
    ///
    /// Normalization trims surrounding whitespace and any trailing
    /// semicolons so the text can be embedded in larger statements.
    pub fn query(&self) -> Result<&str, DesignError> {
        let query = self.query.get_or_try_init(|| {
            let path = self
                .query_path
                .as_ref()
                .ok_or_else(|| DesignError::MissingQuery(self.name.identifier()))?;
            let contents = std::fs::read_to_string(path)
                .map_err(|e| DesignError::IoError(path.display().to_string(), e.to_string()))?;
            Ok(normalize_query(&contents))
        })?;
        Ok(query.as_str())
    }

    /// Identifiers of the relations this one reads from
    pub fn dependencies(&self) -> Result<&BTreeSet<String>, DesignError> {
        self.dependencies
            .get_or_try_init(|| Ok(self.design()?.depends_on.iter().cloned().collect()))
    }

    /// Position in the build order, set by the resolver
    pub fn order(&self) -> Option<u32> {
        self.order
    }

    pub(crate) fn set_order(&mut self, order: u32) {
        self.order = Some(order);
    }
}

fn normalize_query(raw: &str) -> String {
    raw.trim().trim_end_matches(';').trim_end().to_string()
}

#[derive(Debug, Error)]
pub enum DesignError {
    #[error("failed to read '{0}': {1}")]
    IoError(String, String),

    #[error("failed to parse '{0}': {1}")]
    ParseError(String, String),

    #[error("design file '{path}' declares '{declared}', expected '{expected}'")]
    NameMismatch {
        path: String,
        declared: String,
        expected: String,
    },

    #[error("relation '{0}' has no transformation query")]
    MissingQuery(String),
}
