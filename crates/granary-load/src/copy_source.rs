//! Load locations in object storage
//!
//! An upstream table is loaded either from an explicit manifest object or
//! from a common key prefix covering every data file of one batch. The
//! build executor always loads from the per-relation manifest the upload
//! side writes; the prefix form is for callers that list object storage
//! themselves, which this crate does not do.

use granary_core::RelationName;

/// Where a COPY reads its files from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopySource {
    /// An explicit manifest object listing every file of the batch
    Manifest(String),
    /// The longest common prefix of the batch's file keys
    KeyPrefix(String),
}

impl CopySource {
    /// Manifest location for a relation under the shared data prefix.
    ///
    /// The upload side writes one manifest per relation at
    /// `{prefix}/{schema}/{table}.manifest`.
    pub fn manifest_for(prefix: &str, name: &RelationName) -> Self {
        Self::Manifest(format!("{}/{}/{}.manifest", prefix, name.schema, name.table))
    }

    /// Reduce an explicit file list to its longest common prefix.
    ///
    /// Character-level, not path-aware: the prefix may end in the middle
    /// of a key segment, which COPY accepts.
    pub fn from_files(files: &[String]) -> Option<Self> {
        let mut files = files.iter();
        let mut prefix = files.next()?.clone();
        for file in files {
            let shared: usize = prefix
                .chars()
                .zip(file.chars())
                .take_while(|(ours, theirs)| ours == theirs)
                .map(|(ours, _)| ours.len_utf8())
                .sum();
            prefix.truncate(shared);
        }
        Some(Self::KeyPrefix(prefix))
    }

    /// Full object storage location of this source
    pub fn location(&self, bucket: &str) -> String {
        match self {
            Self::Manifest(key) | Self::KeyPrefix(key) => format!("s3://{bucket}/{key}"),
        }
    }

    /// True when the COPY statement needs the MANIFEST keyword
    pub fn with_manifest(&self) -> bool {
        matches!(self, Self::Manifest(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_location() {
        let name = RelationName::new("raw", "orders");
        let source = CopySource::manifest_for("data", &name);
        assert_eq!(source.location("acme-dwh"), "s3://acme-dwh/data/raw/orders.manifest");
        assert!(source.with_manifest());
    }

    #[test]
    fn test_common_prefix_of_file_list() {
        let files = vec![
            "data/raw/orders/part-0000.gz".to_string(),
            "data/raw/orders/part-0001.gz".to_string(),
            "data/raw/orders/part-0002.gz".to_string(),
        ];
        let source = CopySource::from_files(&files).unwrap();
        assert_eq!(source, CopySource::KeyPrefix("data/raw/orders/part-000".to_string()));
        assert!(!source.with_manifest());
    }

    #[test]
    fn test_prefix_may_end_mid_segment() {
        let files = vec![
            "data/raw/orders_2024.gz".to_string(),
            "data/raw/orders_2025.gz".to_string(),
        ];
        let source = CopySource::from_files(&files).unwrap();
        assert_eq!(source, CopySource::KeyPrefix("data/raw/orders_202".to_string()));
    }

    #[test]
    fn test_single_file_is_its_own_prefix() {
        let files = vec!["data/raw/orders/part-0000.gz".to_string()];
        assert_eq!(
            CopySource::from_files(&files),
            Some(CopySource::KeyPrefix("data/raw/orders/part-0000.gz".to_string()))
        );
    }

    #[test]
    fn test_empty_file_list_has_no_source() {
        assert_eq!(CopySource::from_files(&[]), None);
    }
}
