//! Configuration
//!
//! Granary reads one TOML file (`granary.toml` by convention) with three
//! sections: warehouse roles, load locations, and where design documents
//! live. Every field has a default so a minimal deployment can start from
//! an empty file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Warehouse connection and role settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Environment variable holding the warehouse DSN
    pub dsn_env: String,

    /// Role that ends up owning every built relation
    pub owner: String,

    /// Group granted full privileges after a build
    pub etl_group: String,

    /// Group granted read access after a build
    pub reader_group: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            dsn_env: "GRANARY_DSN".to_string(),
            owner: "etl".to_string(),
            etl_group: "etl".to_string(),
            reader_group: "analytics".to_string(),
        }
    }
}

/// Where upstream extracts live in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Bucket holding the extracted files
    pub bucket: String,

    /// Key prefix below the bucket
    pub prefix: String,

    /// IAM role the warehouse assumes to read the files
    pub iam_role: String,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: "data".to_string(),
            iam_role: String::new(),
        }
    }
}

/// Where design documents live on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignConfig {
    /// Directory scanned for `<schema>/<table>.json` design files
    pub dir: PathBuf,
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("schemas"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub warehouse: WarehouseConfig,
    pub load: LoadConfig,
    pub design: DesignConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.display().to_string(), e.to_string()))?;
        Self::from_toml(&contents)
            .map_err(|e| ConfigError::ParseError(path.display().to_string(), e.to_string()))
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    IoError(String, String),

    #[error("failed to parse config file '{0}': {1}")]
    ParseError(String, String),
}
