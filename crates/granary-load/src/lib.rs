//! Granary Load
//!
//! The run side of the orchestrator: the build executor that drives a
//! resolved batch of relations against the warehouse, the design validator
//! that cross-checks designs against the catalog, and the object storage
//! locations COPY loads from.

pub mod copy_source;
pub mod executor;
pub mod validate;

pub use copy_source::CopySource;
pub use executor::{build_relations, vacuum_relations, BuildOptions, BuildOutput, LoadError};
pub use validate::{validate_relation, ValidateOptions};
