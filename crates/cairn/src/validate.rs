//! Validation runs: introspect, compare, report.

use crate::{
    Introspector, Result, SchemaComparator, SchemaDescriptor, ValidationResult,
};
use cairn_db_schema::Table;
use tracing::Instrument;

/// Checks a store against descriptors on behalf of one application version.
pub struct SchemaValidator<I> {
    introspector: I,
    version: String,
}

/// Outcome of [`SchemaValidator::health_check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaHealth {
    /// No errors. There may still be warnings; they were logged.
    Valid,
    /// The store cannot serve this application version.
    Invalid(ValidationResult),
    /// The store could not be read.
    Unreachable(String),
}

impl SchemaHealth {
    pub fn is_valid(&self) -> bool {
        matches!(self, SchemaHealth::Valid)
    }
}

impl<I: Introspector> SchemaValidator<I> {
    pub fn new(introspector: I, version: impl Into<String>) -> Self {
        Self {
            introspector,
            version: version.into(),
        }
    }

    pub fn introspector(&self) -> &I {
        &self.introspector
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Compare the store with `descriptor`.
    ///
    /// Discrepancies are data in the returned result. Only failing to read
    /// the store is an error.
    pub async fn validate(&self, descriptor: &SchemaDescriptor) -> Result<ValidationResult> {
        let span = tracing::info_span!(
            "validate_schema",
            version = %self.version,
            tables = descriptor.len(),
        );
        async {
            let actual = self
                .introspector
                .introspect(&descriptor.table_names())
                .await?;
            let result = SchemaComparator::new(self.introspector.type_mapper())
                .compare(&descriptor.to_schema(), &actual);
            tracing::info!(
                errors = result.errors().len(),
                warnings = result.warnings().len(),
                "schema validated"
            );
            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Build a descriptor from `tables`, putting them in dependency order,
    /// then validate against it.
    pub async fn validate_tables(
        &self,
        tables: impl IntoIterator<Item = Table>,
    ) -> Result<ValidationResult> {
        let descriptor = SchemaDescriptor::new(tables)?;
        self.validate(&descriptor).await
    }

    /// Validate, failing with [`crate::Error::SchemaMismatch`] when the store
    /// has errors. Meant as a startup gate.
    pub async fn require_valid(&self, descriptor: &SchemaDescriptor) -> Result<ValidationResult> {
        let result = self.validate(descriptor).await?;
        result.ensure_valid(&self.version)?;
        Ok(result)
    }

    /// Validate and log every discrepancy, without ever failing.
    pub async fn health_check(&self, descriptor: &SchemaDescriptor) -> SchemaHealth {
        let result = match self.validate(descriptor).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(version = %self.version, error = %err, "schema health check failed");
                return SchemaHealth::Unreachable(err.to_string());
            }
        };

        for d in result.errors() {
            tracing::error!(version = %self.version, table = %d.table, "{}", d);
        }
        for d in result.warnings() {
            tracing::warn!(version = %self.version, table = %d.table, "{}", d);
        }

        if result.is_valid() {
            SchemaHealth::Valid
        } else {
            SchemaHealth::Invalid(result)
        }
    }
}
