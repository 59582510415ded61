//! Granary Design
//!
//! Everything that happens before the warehouse is touched: discovering
//! design files on disk, wrapping them in lazily-loading descriptors,
//! selecting subsets by pattern, and resolving the batch into a build
//! order.

pub mod files;
pub mod relation;
pub mod resolver;
pub mod select;

pub use files::{discover_file_sets, discover_relations, RelationFileSet};
pub use relation::{DesignError, RelationDescriptor};
pub use resolver::{order_by_dependencies, Resolution, ResolveError};
pub use select::{SelectError, Selector};
