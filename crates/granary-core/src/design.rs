//! Relation design documents
//!
//! A design document is the JSON description of one relation: where its
//! data comes from, its columns in output order, table constraints,
//! physical attributes, and the relations it reads from. Designs are the
//! single source of truth that the resolver, the DDL builder, and the
//! validator all work from.

use serde::{Deserialize, Serialize};

/// How a relation is populated.
///
/// Serialized as the design document's `source_name` string: the literal
/// `CTAS` and `VIEW` markers select the derived kinds, anything else names
/// an upstream source system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceKind {
    /// Loaded from files delivered by the named upstream source
    Upstream(String),
    /// Materialized from a query into a real table
    Ctas,
    /// Created as a view over other relations
    View,
}

impl SourceKind {
    /// True for relations built from a query (CTAS or view)
    pub fn is_derived(&self) -> bool {
        matches!(self, Self::Ctas | Self::View)
    }

    /// True for relations loaded from upstream files
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }

    pub fn is_ctas(&self) -> bool {
        matches!(self, Self::Ctas)
    }

    pub fn is_view(&self) -> bool {
        matches!(self, Self::View)
    }

    /// Short tag used in reports and log lines
    pub fn label(&self) -> &str {
        match self {
            Self::Upstream(source) => source,
            Self::Ctas => "CTAS",
            Self::View => "VIEW",
        }
    }
}

impl From<String> for SourceKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "CTAS" => Self::Ctas,
            "VIEW" => Self::View,
            _ => Self::Upstream(value),
        }
    }
}

impl From<SourceKind> for String {
    fn from(value: SourceKind) -> Self {
        match value {
            SourceKind::Upstream(source) => source,
            SourceKind::Ctas => "CTAS".to_string(),
            SourceKind::View => "VIEW".to_string(),
        }
    }
}

/// One column of a relation design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,

    /// Warehouse type, e.g. `varchar(255)` or `numeric(18,4)`
    pub sql_type: String,

    /// Generic type family from the design tooling, e.g. `string`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub generic_type: Option<String>,

    /// Column carries a NOT NULL constraint
    #[serde(default)]
    pub not_null: bool,

    /// Column values come from a generated identity sequence
    #[serde(default)]
    pub identity: bool,

    /// Column is excluded from generated DDL and DML
    #[serde(default)]
    pub skipped: bool,

    /// Compression encoding, e.g. `lzo`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,

    /// Column-level foreign key: referenced relation identifier and columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<(String, Vec<String>)>,
}

impl ColumnDef {
    /// Create a column with the given name and SQL type
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            generic_type: None,
            not_null: false,
            identity: false,
            skipped: false,
            encoding: None,
            references: None,
        }
    }

    /// Add a NOT NULL constraint
    pub fn with_not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Mark the column as identity-generated
    pub fn with_identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Exclude the column from generated DDL and DML
    pub fn with_skipped(mut self) -> Self {
        self.skipped = true;
        self
    }

    /// Set the compression encoding
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Set the generic type family
    pub fn with_generic_type(mut self, generic_type: impl Into<String>) -> Self {
        self.generic_type = Some(generic_type.into());
        self
    }

    /// Add a column-level foreign key reference
    pub fn with_references(mut self, relation: impl Into<String>, columns: Vec<String>) -> Self {
        self.references = Some((relation.into(), columns));
        self
    }
}

/// Table-level constraints of a design.
///
/// `surrogate_key` is an alias for `primary_key` and `natural_key` for
/// `unique`; designs use whichever name matches their modeling vocabulary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surrogate_key: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural_key: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKey>,
}

/// A table-level foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Local columns making up the key
    pub columns: Vec<String>,

    /// Referenced relation identifier and its columns
    pub references: (String, Vec<String>),
}

/// Physical table attributes (distribution and sort keys).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Distribution>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compound_sort: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interleaved_sort: Option<Vec<String>>,
}

/// Distribution declaration: either a key column list or a bare style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Distribution {
    /// `DISTSTYLE KEY` over the listed columns
    Key(Vec<String>),
    /// `DISTSTYLE ALL` or `DISTSTYLE EVEN`
    Style(DistStyle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistStyle {
    All,
    Even,
}

/// A complete relation design document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDesign {
    /// Identifier of the relation this design describes, e.g. `www.orders`
    pub name: String,

    /// Upstream source name, or the `CTAS` / `VIEW` markers
    pub source_name: SourceKind,

    /// Columns in output order
    pub columns: Vec<ColumnDef>,

    #[serde(default)]
    pub constraints: Constraints,

    #[serde(default)]
    pub attributes: TableAttributes,

    /// Identifiers of relations this one reads from
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl TableDesign {
    /// Create an empty design for the given relation and source kind
    pub fn new(name: impl Into<String>, source_name: SourceKind) -> Self {
        Self {
            name: name.into(),
            source_name,
            columns: Vec::new(),
            constraints: Constraints::default(),
            attributes: TableAttributes::default(),
            depends_on: Vec::new(),
        }
    }

    /// Set the columns
    pub fn with_columns(mut self, columns: Vec<ColumnDef>) -> Self {
        self.columns = columns;
        self
    }

    /// Set the declared dependencies
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Set the table constraints
    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Set the physical attributes
    pub fn with_attributes(mut self, attributes: TableAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Columns that participate in generated DDL and DML
    pub fn unskipped_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|column| !column.skipped)
    }

    /// Names of the unskipped columns, in declared order
    pub fn unskipped_column_names(&self) -> Vec<&str> {
        self.unskipped_columns()
            .map(|column| column.name.as_str())
            .collect()
    }

    /// True when any column is identity-generated
    pub fn has_identity(&self) -> bool {
        self.columns.iter().any(|column| column.identity)
    }
}
