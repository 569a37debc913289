//! Check that a PostgreSQL store has the schema an application expects.
//!
//! An application describes its tables once, as a [`SchemaDescriptor`].
//! At startup (or in a test) a [`SchemaValidator`] reads the store's catalog
//! through an [`Introspector`], diffs it with the descriptor and hands back a
//! [`ValidationResult`]: errors for what would break the application,
//! warnings for what merely differs.
//!
//! ```ignore
//! use cairn::{PgIntrospector, SchemaDescriptor, SchemaValidator};
//!
//! let validator = SchemaValidator::new(PgIntrospector::new(pool), "13.2.0");
//! let result = validator.validate(&SCHEMA).await?;
//! for error in result.errors() {
//!     eprintln!("{error}");
//! }
//! ```
//!
//! All queries are logged through `tracing` (see [`TracedConn`]).

mod compare;
mod descriptor;
mod error;
mod introspect;
pub mod order;
mod report;
pub mod schema;
mod traced;
mod validate;

pub use compare::{SchemaComparator, same_default};
pub use descriptor::SchemaDescriptor;
pub use error::{DescriptorError, Error};
pub use introspect::{Introspector, PgIntrospector, SnapshotIntrospector, introspect_connection};
pub use report::{Discrepancy, DiscrepancyKind, Severity, ValidationCounts, ValidationResult};
pub use traced::{Connection, ConnectionExt, TracedConn};
pub use validate::{SchemaHealth, SchemaValidator};

// Re-export the data model
pub use cairn_db_schema::{
    Column, ForeignKey, Index, PgType, PostgresTypes, Schema, Table, TypeMapper,
};

pub type Result<T> = std::result::Result<T, Error>;
