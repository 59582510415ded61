//! Granary Warehouse
//!
//! The SQL side of the orchestrator: deterministic statement builders, a
//! blocking Redshift client speaking the simple query protocol, and a
//! recording mock for tests.

pub mod client;
pub mod ddl;
pub mod mock;
pub mod scrub;
pub mod warehouse;

pub use client::RedshiftClient;
pub use mock::MockWarehouse;
pub use scrub::scrub_credentials;
pub use warehouse::{LoadErrorRow, Warehouse, WarehouseError};
