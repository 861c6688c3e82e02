//! Core contracts for driftwatch.
//!
//! This crate defines the in-memory batch model, canonical column types,
//! schema extraction and the drift classifier that compares each incoming
//! batch against the schema recorded for its table. Nothing here performs
//! I/O; stores, sources and alerting live in the adapter crates.

pub mod batch;
pub mod drift;
pub mod error;
pub mod redaction;
pub mod report;
pub mod schema;
pub mod types;

pub use batch::{Batch, Column, Value, ValueKind};
pub use drift::{ColumnDriftDetector, SchemaValidator};
pub use error::{Error, Result, ValidationError};
pub use redaction::{RedactedConnection, redact_connection_string};
pub use report::{DriftReport, Severity, TypeChange};
pub use schema::{SchemaMap, extract_schema};
pub use types::{CanonicalType, normalize};
