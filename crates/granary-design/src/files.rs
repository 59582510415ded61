//! Design file discovery
//!
//! Designs live under one directory as `<schema>/<table>.json`, with an
//! optional `<schema>/<table>.sql` transformation query next to each
//! design. Discovery walks the directory once and pairs the files up.

use crate::relation::{DesignError, RelationDescriptor};
use granary_core::RelationName;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

static TABLE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<table>[a-z_][a-z0-9_]*)\.(?P<ext>json|sql)$").unwrap());

/// The files that define one relation on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationFileSet {
    pub name: RelationName,
    pub design_path: PathBuf,
    pub query_path: Option<PathBuf>,
}

/// Discover design file sets under `dir`
///
/// Returns file sets sorted by relation name. Files whose names are not
/// valid lowercase identifiers are ignored; a `.sql` file without a
/// matching `.json` design is reported and skipped.
pub fn discover_file_sets(dir: &Path) -> Result<Vec<RelationFileSet>, DesignError> {
    let mut designs: BTreeMap<RelationName, PathBuf> = BTreeMap::new();
    let mut queries: BTreeMap<RelationName, PathBuf> = BTreeMap::new();

    for entry in WalkDir::new(dir).min_depth(2).max_depth(2) {
        let entry = entry
            .map_err(|e| DesignError::IoError(dir.display().to_string(), e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = match entry.file_name().to_str() {
            Some(file_name) => file_name,
            None => continue,
        };
        let captures = match TABLE_FILE.captures(file_name) {
            Some(captures) => captures,
            None => {
                tracing::debug!(file = %entry.path().display(), "ignoring unexpected file name");
                continue;
            }
        };
        let schema = match entry.path().parent().and_then(Path::file_name).and_then(|n| n.to_str()) {
            Some(schema) => schema,
            None => continue,
        };
        let name = RelationName::new(schema, &captures["table"]);
        let is_design = &captures["ext"] == "json";
        if is_design {
            designs.insert(name, entry.into_path());
        } else {
            queries.insert(name, entry.into_path());
        }
    }

    let mut file_sets = Vec::with_capacity(designs.len());
    for (name, design_path) in designs {
        let query_path = queries.remove(&name);
        file_sets.push(RelationFileSet {
            name,
            design_path,
            query_path,
        });
    }
    for name in queries.keys() {
        tracing::warn!(
            relation = %name.identifier(),
            "query file has no matching design file, skipping"
        );
    }
    Ok(file_sets)
}

/// Discover relations under `dir` and wrap them in descriptors
pub fn discover_relations(dir: &Path) -> Result<Vec<RelationDescriptor>, DesignError> {
    Ok(discover_file_sets(dir)?
        .into_iter()
        .map(RelationDescriptor::from_file_set)
        .collect())
}
