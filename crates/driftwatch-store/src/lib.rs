//! Persistence adapters for driftwatch.
//!
//! Each concern is a capability trait (`SchemaStore`, `PermitStore`,
//! `JobHistory`) with a Postgres implementation for production and an
//! in-memory one for dry runs and tests.

pub mod adapter;
pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;

pub use adapter::{JobHistory, PermitStore, SchemaStore};
pub use error::{Result, StoreError};
pub use memory::{InMemoryJobHistory, InMemoryPermitStore, InMemorySchemaStore};
pub use model::{BuildingPermit, ColumnStatus, JobExecution, JobStatus, SchemaColumnRecord};
pub use postgres::{PostgresStore, connect, connect_with};
