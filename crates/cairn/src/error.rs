use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid schema descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("cannot reach the store: {0}")]
    Connectivity(String),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("schema mismatch for version {version}: {errors} error(s), first: {first}")]
    SchemaMismatch {
        version: String,
        errors: usize,
        first: String,
    },
}

impl From<deadpool_postgres::PoolError> for Error {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Error::Connectivity(err.to_string())
    }
}

/// A schema descriptor that cannot describe a real store.
///
/// These are programming errors in the application's table list and are
/// reported when the descriptor is built, never during validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("a schema descriptor needs at least one table")]
    Empty,

    #[error("table '{table}' is declared twice")]
    DuplicateTable { table: String },

    #[error("table '{table}' declares column '{column}' twice")]
    DuplicateColumn { table: String, column: String },

    #[error("index '{index}' on '{table}' names unknown column '{column}'")]
    UnknownIndexColumn {
        table: String,
        index: String,
        column: String,
    },

    #[error("foreign key '{foreign_key}' on '{table}' names unknown column '{column}'")]
    UnknownForeignKeyColumn {
        table: String,
        foreign_key: String,
        column: String,
    },

    #[error("table '{table}' references '{references}', which is not in the descriptor")]
    DanglingReference { table: String, references: String },

    #[error(
        "foreign key '{foreign_key}' on '{table}' references unknown column '{references}.{column}'"
    )]
    UnknownReferencedColumn {
        table: String,
        foreign_key: String,
        references: String,
        column: String,
    },

    #[error(
        "foreign key '{foreign_key}' on '{table}' has {local} column(s) but references {referenced}"
    )]
    ColumnCountMismatch {
        table: String,
        foreign_key: String,
        local: usize,
        referenced: usize,
    },

    #[error(
        "{kind} name '{name}' on '{table}' is {len} bytes; Postgres keeps at most {max}",
        len = .name.len(),
        max = cairn_sql::PG_IDENT_MAX
    )]
    IdentifierTooLong {
        table: String,
        kind: &'static str,
        name: String,
    },

    #[error("tables reference each other in a cycle: {}", .tables.join(" -> "))]
    Cycle { tables: Vec<String> },

    #[error("invalid schema file: {0}")]
    SchemaFile(String),
}

/// A dropped connection is a connectivity problem, not a query problem.
pub(crate) fn store_error(err: tokio_postgres::Error) -> Error {
    if err.is_closed() {
        Error::Connectivity(err.to_string())
    } else {
        Error::Postgres(err)
    }
}
