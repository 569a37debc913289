//! The schema an application expects.

use crate::{DescriptorError, order};
use cairn_config::{ForeignKeySpec, IndexSpec, SchemaFile, TableSpec};
use cairn_db_schema::{
    Column, ForeignKey, Index, PgType, Schema, Table, parse_fk_reference, same_ident,
};
use cairn_sql::{PG_IDENT_MAX, foreign_key_name, index_name, unique_index_name};

/// An ordered, validated set of table definitions.
///
/// Construction checks that the definitions describe a schema a store could
/// actually hold, then puts the tables in dependency order. Once built, a
/// descriptor never changes; applications typically keep one in a `static`:
///
/// ```ignore
/// static SCHEMA: LazyLock<SchemaDescriptor> =
///     LazyLock::new(|| SchemaDescriptor::new(tables()).expect("valid schema"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    tables: Vec<Table>,
}

impl SchemaDescriptor {
    pub fn new(tables: impl IntoIterator<Item = Table>) -> Result<Self, DescriptorError> {
        let tables: Vec<Table> = tables.into_iter().collect();
        if tables.is_empty() {
            return Err(DescriptorError::Empty);
        }
        check_tables(&tables)?;
        let tables = order::resolve(tables)?;
        Ok(Self { tables })
    }

    /// Tables in dependency order. Never empty.
    pub fn ordered_tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Find a table by name (case-insensitive).
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| same_ident(&t.name, name))
    }

    /// The expected snapshot, in dependency order.
    pub fn to_schema(&self) -> Schema {
        Schema::from_tables(self.tables.iter().cloned())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Always false: an empty descriptor cannot be built.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn check_tables(tables: &[Table]) -> Result<(), DescriptorError> {
    for (i, table) in tables.iter().enumerate() {
        check_identifier_lengths(table)?;

        if tables[..i].iter().any(|t| same_ident(&t.name, &table.name)) {
            return Err(DescriptorError::DuplicateTable {
                table: table.name.clone(),
            });
        }

        for (j, column) in table.columns.iter().enumerate() {
            if table.columns[..j]
                .iter()
                .any(|c| same_ident(&c.name, &column.name))
            {
                return Err(DescriptorError::DuplicateColumn {
                    table: table.name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        for index in &table.indices {
            if let Some(column) = first_unknown(table, &index.columns) {
                return Err(DescriptorError::UnknownIndexColumn {
                    table: table.name.clone(),
                    index: index.name.clone(),
                    column: column.to_string(),
                });
            }
        }

        for fk in &table.foreign_keys {
            check_foreign_key(tables, table, fk)?;
        }
    }
    Ok(())
}

/// Postgres truncates longer identifiers, so the store would report names
/// the descriptor never declared.
fn check_identifier_lengths(table: &Table) -> Result<(), DescriptorError> {
    let names = std::iter::once(("table", &table.name))
        .chain(table.columns.iter().map(|c| ("column", &c.name)))
        .chain(table.indices.iter().map(|i| ("index", &i.name)))
        .chain(table.foreign_keys.iter().map(|fk| ("foreign key", &fk.name)));

    for (kind, name) in names {
        if name.len() > PG_IDENT_MAX {
            return Err(DescriptorError::IdentifierTooLong {
                table: table.name.clone(),
                kind,
                name: name.clone(),
            });
        }
    }
    Ok(())
}

fn check_foreign_key(
    tables: &[Table],
    table: &Table,
    fk: &ForeignKey,
) -> Result<(), DescriptorError> {
    if let Some(column) = first_unknown(table, &fk.columns) {
        return Err(DescriptorError::UnknownForeignKeyColumn {
            table: table.name.clone(),
            foreign_key: fk.name.clone(),
            column: column.to_string(),
        });
    }

    let Some(target) = tables
        .iter()
        .find(|t| same_ident(&t.name, &fk.references_table))
    else {
        return Err(DescriptorError::DanglingReference {
            table: table.name.clone(),
            references: fk.references_table.clone(),
        });
    };

    if let Some(column) = first_unknown(target, &fk.references_columns) {
        return Err(DescriptorError::UnknownReferencedColumn {
            table: table.name.clone(),
            foreign_key: fk.name.clone(),
            references: target.name.clone(),
            column: column.to_string(),
        });
    }

    if fk.columns.is_empty() || fk.columns.len() != fk.references_columns.len() {
        return Err(DescriptorError::ColumnCountMismatch {
            table: table.name.clone(),
            foreign_key: fk.name.clone(),
            local: fk.columns.len(),
            referenced: fk.references_columns.len(),
        });
    }

    Ok(())
}

fn first_unknown<'a>(table: &Table, columns: &'a [String]) -> Option<&'a str> {
    columns
        .iter()
        .find(|c| table.find_column(c).is_none())
        .map(String::as_str)
}

impl TryFrom<&SchemaFile> for SchemaDescriptor {
    type Error = DescriptorError;

    fn try_from(file: &SchemaFile) -> Result<Self, Self::Error> {
        let tables = file
            .tables
            .iter()
            .map(table_from_spec)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(tables)
    }
}

fn table_from_spec(spec: &TableSpec) -> Result<Table, DescriptorError> {
    let mut table = Table::new(spec.name.as_str());

    for col in &spec.columns {
        if col.ty.trim().is_empty() {
            return Err(DescriptorError::SchemaFile(format!(
                "column '{}.{}' has no type",
                spec.name, col.name
            )));
        }
        let mut column = Column::new(col.name.as_str(), PgType::parse(&col.ty));
        if col.nullable {
            column = column.nullable();
        }
        if col.pk {
            column = column.primary_key();
        }
        if col.unique {
            column = column.unique();
        }
        if let Some(default) = &col.default {
            column = column.with_default(default.as_str());
        }
        table = table.with_column(column);
    }

    for index in &spec.indexes {
        table = table.with_index(index_from_spec(&spec.name, index));
    }

    for fk in &spec.foreign_keys {
        table = table.with_foreign_key(foreign_key_from_spec(&spec.name, fk)?);
    }

    Ok(table)
}

fn index_from_spec(table: &str, spec: &IndexSpec) -> Index {
    let name = match &spec.name {
        Some(name) => name.clone(),
        None if spec.unique => unique_index_name(table, spec.columns.as_slice()),
        None => index_name(table, spec.columns.as_slice()),
    };
    Index {
        name,
        columns: spec.columns.clone(),
        unique: spec.unique,
    }
}

fn foreign_key_from_spec(table: &str, spec: &ForeignKeySpec) -> Result<ForeignKey, DescriptorError> {
    let (references_table, references_columns) = if spec.references_columns.is_empty() {
        let Some((target, column)) = parse_fk_reference(&spec.references) else {
            return Err(DescriptorError::SchemaFile(format!(
                "foreign key on '{}' references '{}' without naming a column; \
                 use `table.column` or `references_columns`",
                table, spec.references
            )));
        };
        (target.to_string(), vec![column.to_string()])
    } else {
        (spec.references.clone(), spec.references_columns.clone())
    };

    Ok(ForeignKey {
        name: spec
            .name
            .clone()
            .unwrap_or_else(|| foreign_key_name(table, spec.columns.as_slice())),
        columns: spec.columns.clone(),
        references_table,
        references_columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_config::{ColumnSpec, parse_schema_file};

    fn users() -> Table {
        Table::new("users")
            .with_column(Column::new("id", PgType::BigSerial).primary_key())
            .with_column(Column::new("name", PgType::Text))
    }

    fn posts() -> Table {
        Table::new("posts")
            .with_column(Column::new("id", PgType::BigSerial).primary_key())
            .with_column(Column::new("user_id", PgType::BigInt))
            .with_foreign_key(ForeignKey::new("posts", &["user_id"], "users", &["id"]))
    }

    #[test]
    fn test_orders_tables_on_construction() {
        let descriptor = SchemaDescriptor::new([posts(), users()]).unwrap();
        assert_eq!(descriptor.table_names(), vec!["users", "posts"]);
        assert_eq!(descriptor.len(), 2);
        assert!(!descriptor.is_empty());
    }

    #[test]
    fn test_to_schema_keeps_dependency_order() {
        let descriptor = SchemaDescriptor::new([posts(), users()]).unwrap();
        let schema = descriptor.to_schema();
        assert_eq!(schema.table_names(), vec!["users", "posts"]);
        assert!(schema.get_table("POSTS").is_some());
    }

    #[test]
    fn test_get_table_is_case_insensitive() {
        let descriptor = SchemaDescriptor::new([users()]).unwrap();
        assert_eq!(descriptor.get_table("Users").map(|t| t.name.as_str()), Some("users"));
        assert!(descriptor.get_table("posts").is_none());
    }

    #[test]
    fn test_empty_descriptor() {
        assert_eq!(
            SchemaDescriptor::new(Vec::new()).unwrap_err(),
            DescriptorError::Empty
        );
    }

    #[test]
    fn test_duplicate_table() {
        let mut dup = users();
        dup.name = "USERS".to_string();
        assert_eq!(
            SchemaDescriptor::new([users(), dup]).unwrap_err(),
            DescriptorError::DuplicateTable {
                table: "USERS".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_column() {
        let table = users().with_column(Column::new("Name", PgType::Text));
        assert_eq!(
            SchemaDescriptor::new([table]).unwrap_err(),
            DescriptorError::DuplicateColumn {
                table: "users".to_string(),
                column: "Name".to_string(),
            }
        );
    }

    #[test]
    fn test_index_on_unknown_column() {
        let table = users().with_index(Index::on("users", &["email"]));
        assert!(matches!(
            SchemaDescriptor::new([table]).unwrap_err(),
            DescriptorError::UnknownIndexColumn { column, .. } if column == "email"
        ));
    }

    #[test]
    fn test_foreign_key_on_unknown_column() {
        let table = users().with_foreign_key(ForeignKey::new("users", &["team_id"], "users", &["id"]));
        assert!(matches!(
            SchemaDescriptor::new([table]).unwrap_err(),
            DescriptorError::UnknownForeignKeyColumn { column, .. } if column == "team_id"
        ));
    }

    #[test]
    fn test_reference_to_missing_table() {
        assert_eq!(
            SchemaDescriptor::new([posts()]).unwrap_err(),
            DescriptorError::DanglingReference {
                table: "posts".to_string(),
                references: "users".to_string(),
            }
        );
    }

    #[test]
    fn test_reference_to_missing_column() {
        let table = Table::new("posts")
            .with_column(Column::new("user_uuid", PgType::Uuid))
            .with_foreign_key(ForeignKey::new("posts", &["user_uuid"], "users", &["uuid"]));
        assert!(matches!(
            SchemaDescriptor::new([users(), table]).unwrap_err(),
            DescriptorError::UnknownReferencedColumn { column, .. } if column == "uuid"
        ));
    }

    #[test]
    fn test_column_count_mismatch() {
        let table = Table::new("posts")
            .with_column(Column::new("user_id", PgType::BigInt))
            .with_foreign_key(ForeignKey::new("posts", &["user_id"], "users", &["id", "name"]));
        assert_eq!(
            SchemaDescriptor::new([users(), table]).unwrap_err(),
            DescriptorError::ColumnCountMismatch {
                table: "posts".to_string(),
                foreign_key: "fk_posts_user_id".to_string(),
                local: 1,
                referenced: 2,
            }
        );
    }

    #[test]
    fn test_identifier_too_long() {
        let long = "a".repeat(64);
        let table = users().with_column(Column::new(long.as_str(), PgType::Text));
        let err = SchemaDescriptor::new([table]).unwrap_err();
        assert_eq!(
            err,
            DescriptorError::IdentifierTooLong {
                table: "users".to_string(),
                kind: "column",
                name: long.clone(),
            }
        );
        assert_eq!(
            err.to_string(),
            format!("column name '{long}' on 'users' is 64 bytes; Postgres keeps at most 63")
        );

        let mut table = users();
        table.name = "t".repeat(64);
        assert!(matches!(
            SchemaDescriptor::new([table]).unwrap_err(),
            DescriptorError::IdentifierTooLong { kind: "table", .. }
        ));

        // exactly 63 bytes is fine
        let table = users().with_column(Column::new("c".repeat(63), PgType::Text));
        assert!(SchemaDescriptor::new([table]).is_ok());
    }

    #[test]
    fn test_generated_names_fit_on_long_composite_keys() {
        let table = Table::new("organization_membership_invitations")
            .with_column(Column::new("organization_id", PgType::BigInt))
            .with_column(Column::new("invited_by_user_id", PgType::BigInt))
            .with_column(Column::new("created_at", PgType::Timestamptz))
            .with_index(Index::on(
                "organization_membership_invitations",
                &["organization_id", "invited_by_user_id", "created_at"],
            ));
        let descriptor = SchemaDescriptor::new([table]).unwrap();
        let index = &descriptor.ordered_tables()[0].indices[0];
        assert!(index.name.len() <= PG_IDENT_MAX);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let a = Table::new("a")
            .with_column(Column::new("id", PgType::Integer).primary_key())
            .with_column(Column::new("b_id", PgType::Integer))
            .with_foreign_key(ForeignKey::new("a", &["b_id"], "b", &["id"]));
        let b = Table::new("b")
            .with_column(Column::new("id", PgType::Integer).primary_key())
            .with_column(Column::new("a_id", PgType::Integer))
            .with_foreign_key(ForeignKey::new("b", &["a_id"], "a", &["id"]));
        assert!(matches!(
            SchemaDescriptor::new([a, b]).unwrap_err(),
            DescriptorError::Cycle { .. }
        ));
    }

    #[test]
    fn test_from_schema_file() {
        let file = parse_schema_file(
            r#"
tables (
    {
        name posts
        columns (
            {name id, type bigserial, pk true}
            {name user_id, type bigint}
            {name title, type "string(200)", nullable true}
        )
        indexes ({columns (user_id)})
        foreign_keys ({columns (user_id), references users.id})
    }
    {
        name users
        columns (
            {name id, type bigserial, pk true}
            {name email, type text, unique true, default "''"}
        )
    }
)
"#,
        )
        .unwrap();

        let descriptor = SchemaDescriptor::try_from(&file).unwrap();
        assert_eq!(descriptor.table_names(), vec!["users", "posts"]);

        let posts = descriptor.get_table("posts").unwrap();
        assert_eq!(posts.find_column("title").unwrap().pg_type, PgType::Varchar(Some(200)));
        assert!(posts.find_column("title").unwrap().nullable);
        assert!(posts.find_column("id").unwrap().auto_generated);
        assert_eq!(posts.indices[0].name, "idx_posts_user_id");
        assert_eq!(posts.foreign_keys[0].name, "fk_posts_user_id");
        assert_eq!(posts.foreign_keys[0].references_table, "users");
        assert_eq!(posts.foreign_keys[0].references_columns, vec!["id"]);

        let email = descriptor.get_table("users").unwrap().find_column("email").unwrap();
        assert!(email.unique);
        assert_eq!(email.default.as_deref(), Some("''"));
    }

    #[test]
    fn test_schema_file_reference_needs_a_column() {
        let file = SchemaFile {
            tables: vec![TableSpec {
                name: "posts".to_string(),
                columns: vec![ColumnSpec {
                    name: "user_id".to_string(),
                    ty: "bigint".to_string(),
                    nullable: false,
                    default: None,
                    pk: false,
                    unique: false,
                }],
                indexes: Vec::new(),
                foreign_keys: vec![ForeignKeySpec {
                    name: None,
                    columns: vec!["user_id".to_string()],
                    references: "users".to_string(),
                    references_columns: Vec::new(),
                }],
            }],
        };
        assert!(matches!(
            SchemaDescriptor::try_from(&file).unwrap_err(),
            DescriptorError::SchemaFile(_)
        ));
    }
}
