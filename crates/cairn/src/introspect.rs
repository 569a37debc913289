//! Store introspection - read a live schema back as a [`Schema`].
//!
//! [`PgIntrospector`] reads `pg_catalog` for exactly the tables it is asked
//! about. Names match case-insensitively, since an application declaring
//! `content` must find a table created as `"Content"`. Tables the store does
//! not have are simply absent from the snapshot; the comparator reports them.

use crate::error::store_error;
use crate::traced::{Connection, ConnectionExt};
use crate::{Error, Result};
use cairn_db_schema::{
    Column, ForeignKey, Index, PostgresTypes, Schema, Table, TypeMapper, same_ident,
};
use indexmap::IndexMap;
use std::future::Future;
use std::sync::Arc;

/// Reads the actual schema of a store.
pub trait Introspector {
    /// Snapshot the named tables, in the order given. Tables the store lacks
    /// are left out.
    fn introspect(&self, table_names: &[&str]) -> impl Future<Output = Result<Schema>> + Send;

    /// How this store's type names map to logical types.
    fn type_mapper(&self) -> &dyn TypeMapper;
}

/// Introspects a PostgreSQL database through a connection pool.
///
/// Each call checks out one connection and returns it to the pool when the
/// call finishes, whether it succeeded or not.
#[derive(Clone)]
pub struct PgIntrospector {
    pool: deadpool_postgres::Pool,
    pg_schema: String,
    types: Arc<dyn TypeMapper>,
}

impl PgIntrospector {
    /// Introspect the `public` schema with [`PostgresTypes`].
    pub fn new(pool: deadpool_postgres::Pool) -> Self {
        Self {
            pool,
            pg_schema: cairn_config::DEFAULT_PG_SCHEMA.to_string(),
            types: Arc::new(PostgresTypes),
        }
    }

    /// Introspect another Postgres schema (namespace).
    pub fn in_schema(mut self, pg_schema: impl Into<String>) -> Self {
        self.pg_schema = pg_schema.into();
        self
    }

    pub fn with_type_mapper(mut self, types: impl TypeMapper + 'static) -> Self {
        self.types = Arc::new(types);
        self
    }

    pub fn pg_schema(&self) -> &str {
        &self.pg_schema
    }
}

impl Introspector for PgIntrospector {
    async fn introspect(&self, table_names: &[&str]) -> Result<Schema> {
        let conn = self.pool.get().await?;
        if Connection::is_closed(&conn) {
            return Err(Error::Connectivity(
                "pooled connection is closed".to_string(),
            ));
        }
        introspect_connection(&conn, &self.pg_schema, table_names, self.types.as_ref()).await
    }

    fn type_mapper(&self) -> &dyn TypeMapper {
        self.types.as_ref()
    }
}

/// Serves a fixed snapshot. Useful offline and in tests.
pub struct SnapshotIntrospector {
    schema: Schema,
    types: Box<dyn TypeMapper>,
}

impl SnapshotIntrospector {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            types: Box::new(PostgresTypes),
        }
    }

    pub fn with_type_mapper(mut self, types: impl TypeMapper + 'static) -> Self {
        self.types = Box::new(types);
        self
    }
}

impl Introspector for SnapshotIntrospector {
    fn introspect(&self, table_names: &[&str]) -> impl Future<Output = Result<Schema>> + Send {
        let schema = Schema::from_tables(
            table_names
                .iter()
                .filter_map(|name| self.schema.get_table(name))
                .cloned(),
        );
        async move { Ok(schema) }
    }

    fn type_mapper(&self) -> &dyn TypeMapper {
        self.types.as_ref()
    }
}

const TABLES_SQL: &str = r#"
SELECT c.relname::text AS table_name
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1
  AND c.relkind IN ('r', 'p')
  AND lower(c.relname) = ANY($2)
ORDER BY c.relname
"#;

const COLUMNS_SQL: &str = r#"
SELECT c.relname::text AS table_name,
       a.attname::text AS column_name,
       pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
       NOT a.attnotnull AS nullable,
       pg_catalog.pg_get_expr(d.adbin, d.adrelid) AS default_expr,
       a.attidentity <> '' AS is_identity
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
WHERE n.nspname = $1
  AND c.relkind IN ('r', 'p')
  AND lower(c.relname) = ANY($2)
  AND a.attnum > 0
  AND NOT a.attisdropped
ORDER BY c.relname, a.attnum
"#;

const CONSTRAINTS_SQL: &str = r#"
SELECT c.relname::text AS table_name,
       con.conname::text AS constraint_name,
       con.contype::text AS kind,
       ARRAY(
           SELECT a.attname::text
           FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
           JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
           ORDER BY k.ord
       ) AS columns,
       rc.relname::text AS references_table,
       ARRAY(
           SELECT a.attname::text
           FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
           JOIN pg_catalog.pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
           ORDER BY k.ord
       ) AS references_columns
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid
WHERE n.nspname = $1
  AND lower(c.relname) = ANY($2)
  AND con.contype IN ('p', 'u', 'f')
ORDER BY c.relname, con.conname
"#;

// Indexes backing primary key, unique and exclusion constraints are covered
// by the constraints query.
const INDEXES_SQL: &str = r#"
SELECT t.relname::text AS table_name,
       i.relname::text AS index_name,
       ix.indisunique AS is_unique,
       ARRAY(
           SELECT pg_catalog.pg_get_indexdef(ix.indexrelid, k.ord, true)
           FROM generate_series(1, ix.indnkeyatts::int) AS k(ord)
           ORDER BY k.ord
       ) AS columns
FROM pg_catalog.pg_index ix
JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
WHERE n.nspname = $1
  AND lower(t.relname) = ANY($2)
  AND NOT EXISTS (
      SELECT 1 FROM pg_catalog.pg_constraint con
      WHERE con.conindid = ix.indexrelid AND con.contype IN ('p', 'u', 'x')
  )
ORDER BY t.relname, i.relname
"#;

/// Introspect over any connection, e.g. a raw `tokio_postgres::Client`.
pub async fn introspect_connection<C: Connection + ?Sized>(
    conn: &C,
    pg_schema: &str,
    table_names: &[&str],
    types: &dyn TypeMapper,
) -> Result<Schema> {
    let conn = conn.traced();
    let folded: Vec<String> = table_names.iter().map(|n| n.to_lowercase()).collect();

    let tables = conn
        .query(TABLES_SQL, &[&pg_schema, &folded])
        .await
        .map_err(store_error)?
        .iter()
        .map(|row| row.try_get::<_, String>("table_name"))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut columns = Vec::new();
    for row in conn
        .query(COLUMNS_SQL, &[&pg_schema, &folded])
        .await
        .map_err(store_error)?
    {
        columns.push(ColumnRow {
            table: row.try_get("table_name")?,
            name: row.try_get("column_name")?,
            data_type: row.try_get("data_type")?,
            nullable: row.try_get("nullable")?,
            default: row.try_get("default_expr")?,
            identity: row.try_get("is_identity")?,
        });
    }

    let mut constraints = Vec::new();
    for row in conn
        .query(CONSTRAINTS_SQL, &[&pg_schema, &folded])
        .await
        .map_err(store_error)?
    {
        let kind: String = row.try_get("kind")?;
        constraints.push(ConstraintRow {
            table: row.try_get("table_name")?,
            name: row.try_get("constraint_name")?,
            kind: ConstraintKind::from_contype(&kind),
            columns: row.try_get("columns")?,
            references_table: row.try_get("references_table")?,
            references_columns: row.try_get("references_columns")?,
        });
    }

    let mut indexes = Vec::new();
    for row in conn
        .query(INDEXES_SQL, &[&pg_schema, &folded])
        .await
        .map_err(store_error)?
    {
        let columns: Vec<String> = row.try_get("columns")?;
        indexes.push(IndexRow {
            table: row.try_get("table_name")?,
            name: row.try_get("index_name")?,
            unique: row.try_get("is_unique")?,
            columns: columns.iter().map(|c| unquote_ident(c)).collect(),
        });
    }

    let schema = assemble(
        table_names,
        &tables,
        CatalogRows {
            columns,
            constraints,
            indexes,
        },
        types,
    );
    for table in schema.iter_tables() {
        tracing::debug!(
            table = %table.name,
            columns = table.columns.len(),
            indexes = table.indices.len(),
            foreign_keys = table.foreign_keys.len(),
            "introspected table"
        );
    }
    Ok(schema)
}

#[derive(Debug, Clone)]
struct ColumnRow {
    table: String,
    name: String,
    data_type: String,
    nullable: bool,
    default: Option<String>,
    identity: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
    Other,
}

impl ConstraintKind {
    fn from_contype(contype: &str) -> Self {
        match contype {
            "p" => ConstraintKind::PrimaryKey,
            "u" => ConstraintKind::Unique,
            "f" => ConstraintKind::ForeignKey,
            _ => ConstraintKind::Other,
        }
    }
}

#[derive(Debug, Clone)]
struct ConstraintRow {
    table: String,
    name: String,
    kind: ConstraintKind,
    columns: Vec<String>,
    references_table: Option<String>,
    references_columns: Vec<String>,
}

#[derive(Debug, Clone)]
struct IndexRow {
    table: String,
    name: String,
    unique: bool,
    columns: Vec<String>,
}

#[derive(Debug, Default)]
struct CatalogRows {
    columns: Vec<ColumnRow>,
    constraints: Vec<ConstraintRow>,
    indexes: Vec<IndexRow>,
}

/// Build the snapshot from catalog rows.
///
/// `existing` lists the tables the store has among those requested. Each
/// requested name picks its table by exact name first, then
/// case-insensitively, and the snapshot follows the requested order.
fn assemble(
    requested: &[&str],
    existing: &[String],
    rows: CatalogRows,
    types: &dyn TypeMapper,
) -> Schema {
    let mut tables: IndexMap<String, Table> = existing
        .iter()
        .map(|name| (name.clone(), Table::new(name.as_str())))
        .collect();

    for row in rows.columns {
        let Some(table) = tables.get_mut(&row.table) else {
            continue;
        };
        let auto_generated = row.identity
            || row
                .default
                .as_deref()
                .is_some_and(|d| d.starts_with("nextval("));
        table.columns.push(Column {
            name: row.name,
            pg_type: types.map_type(&row.data_type),
            nullable: row.nullable,
            default: row.default,
            primary_key: false,
            unique: false,
            auto_generated,
        });
    }

    for row in rows.constraints {
        let Some(table) = tables.get_mut(&row.table) else {
            continue;
        };
        match row.kind {
            ConstraintKind::PrimaryKey => {
                for col in &mut table.columns {
                    if row.columns.iter().any(|c| c == &col.name) {
                        col.primary_key = true;
                    }
                }
            }
            ConstraintKind::Unique if row.columns.len() == 1 => {
                for col in &mut table.columns {
                    if col.name == row.columns[0] {
                        col.unique = true;
                    }
                }
            }
            ConstraintKind::Unique => table.indices.push(Index {
                name: row.name,
                columns: row.columns,
                unique: true,
            }),
            ConstraintKind::ForeignKey => {
                if let Some(references_table) = row.references_table {
                    table.foreign_keys.push(ForeignKey {
                        name: row.name,
                        columns: row.columns,
                        references_table,
                        references_columns: row.references_columns,
                    });
                }
            }
            ConstraintKind::Other => {}
        }
    }

    for row in rows.indexes {
        if let Some(table) = tables.get_mut(&row.table) {
            table.indices.push(Index {
                name: row.name,
                columns: row.columns,
                unique: row.unique,
            });
        }
    }

    let mut schema = Schema::new();
    for name in requested {
        let found = tables
            .get(*name)
            .or_else(|| tables.values().find(|t| same_ident(&t.name, name)));
        if let Some(table) = found
            && !schema.contains_table(&table.name)
        {
            schema.insert(table.clone());
        }
    }
    schema
}

/// `pg_get_indexdef` quotes identifiers that need it: `"nodeId"` -> `nodeId`.
fn unquote_ident(ident: &str) -> String {
    match ident.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        None => ident.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_db_schema::PgType;

    fn column(table: &str, name: &str, data_type: &str) -> ColumnRow {
        ColumnRow {
            table: table.to_string(),
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: false,
            default: None,
            identity: false,
        }
    }

    fn constraint(table: &str, name: &str, kind: &str, columns: &[&str]) -> ConstraintRow {
        ConstraintRow {
            table: table.to_string(),
            name: name.to_string(),
            kind: ConstraintKind::from_contype(kind),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            references_table: None,
            references_columns: Vec::new(),
        }
    }

    fn catalog() -> (Vec<String>, CatalogRows) {
        let existing = vec!["Content".to_string(), "users".to_string()];
        let mut id = column("users", "id", "bigint");
        id.default = Some("nextval('users_id_seq'::regclass)".to_string());
        let mut bio = column("users", "bio", "text");
        bio.nullable = true;
        let mut content_id = column("Content", "id", "integer");
        content_id.identity = true;

        let mut fk = constraint("Content", "Content_author_fkey", "f", &["author_id"]);
        fk.references_table = Some("users".to_string());
        fk.references_columns = vec!["id".to_string()];

        let rows = CatalogRows {
            columns: vec![
                content_id,
                column("Content", "author_id", "bigint"),
                column("Content", "title", "character varying(200)"),
                id,
                column("users", "email", "text"),
                bio,
                column("orphans", "id", "integer"),
            ],
            constraints: vec![
                constraint("Content", "Content_pkey", "p", &["id"]),
                constraint("Content", "Content_title_author_key", "u", &["title", "author_id"]),
                fk,
                constraint("users", "users_email_key", "u", &["email"]),
                constraint("users", "users_pkey", "p", &["id"]),
            ],
            indexes: vec![IndexRow {
                table: "users".to_string(),
                name: "users_bio_idx".to_string(),
                unique: false,
                columns: vec!["bio".to_string()],
            }],
        };
        (existing, rows)
    }

    #[test]
    fn test_assemble_follows_requested_order() {
        let (existing, rows) = catalog();
        let schema = assemble(&["users", "content", "missing"], &existing, rows, &PostgresTypes);
        assert_eq!(schema.table_names(), vec!["users", "Content"]);
    }

    #[test]
    fn test_assemble_columns_and_constraints() {
        let (existing, rows) = catalog();
        let schema = assemble(&["users", "content"], &existing, rows, &PostgresTypes);

        let users = schema.get_table("users").unwrap();
        let id = users.find_column("id").unwrap();
        assert_eq!(id.pg_type, PgType::BigInt);
        assert!(id.primary_key);
        assert!(id.auto_generated);
        assert!(users.find_column("email").unwrap().unique);
        assert!(users.find_column("bio").unwrap().nullable);
        assert_eq!(users.indices, vec![Index::new("users_bio_idx", &["bio"])]);

        let content = schema.get_table("content").unwrap();
        assert!(content.find_column("id").unwrap().auto_generated);
        assert_eq!(
            content.find_column("title").unwrap().pg_type,
            PgType::Varchar(Some(200))
        );
        // multi-column unique constraints become unique indexes
        assert_eq!(content.indices.len(), 1);
        assert!(content.indices[0].unique);
        assert_eq!(content.indices[0].columns, vec!["title", "author_id"]);
        assert_eq!(
            content.foreign_keys,
            vec![ForeignKey::new("Content", &["author_id"], "users", &["id"]).named("Content_author_fkey")]
        );
    }

    #[test]
    fn test_assemble_ignores_rows_for_unrequested_tables() {
        let (existing, rows) = catalog();
        let schema = assemble(&["users"], &existing, rows, &PostgresTypes);
        assert_eq!(schema.len(), 1);
        assert!(!schema.contains_table("orphans"));
    }

    #[test]
    fn test_unquote_ident() {
        assert_eq!(unquote_ident("\"nodeId\""), "nodeId");
        assert_eq!(unquote_ident("\"a\"\"b\""), "a\"b");
        assert_eq!(unquote_ident("plain"), "plain");
        assert_eq!(unquote_ident("lower((email)::text)"), "lower((email)::text)");
    }

    #[tokio::test]
    async fn test_snapshot_introspector_filters_and_orders() {
        let snapshot = Schema::from_tables([
            Table::new("a"),
            Table::new("B"),
            Table::new("c"),
        ]);
        let introspector = SnapshotIntrospector::new(snapshot);
        let schema = introspector.introspect(&["c", "b", "zzz"]).await.unwrap();
        assert_eq!(schema.table_names(), vec!["c", "B"]);
    }
}
