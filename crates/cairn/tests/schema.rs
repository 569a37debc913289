//! End-to-end validation runs against in-memory stores.

use cairn::{
    Column, DescriptorError, DiscrepancyKind, Error, ForeignKey, Introspector, PgType,
    PostgresTypes, Result, Schema, SchemaDescriptor, SchemaHealth, SchemaValidator,
    SnapshotIntrospector, Table, TypeMapper,
};
use std::future::Future;
use std::sync::LazyLock;

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

static SCHEMA: LazyLock<SchemaDescriptor> =
    LazyLock::new(|| SchemaDescriptor::new([posts(), users()]).unwrap());

/// The store as Postgres reports it when it matches [`SCHEMA`].
fn store() -> Schema {
    let mut schema = SCHEMA.to_schema();
    for table in schema.tables.values_mut() {
        for col in &mut table.columns {
            if col.pg_type == PgType::BigSerial {
                col.pg_type = PgType::BigInt;
                col.default = Some(format!("nextval('{}_id_seq'::regclass)", table.name));
            }
        }
    }
    schema
}

fn validator(schema: Schema) -> SchemaValidator<SnapshotIntrospector> {
    SchemaValidator::new(SnapshotIntrospector::new(schema), "1.0.0")
}

/// An introspector whose store is down.
struct Unreachable;

impl Introspector for Unreachable {
    fn introspect(&self, _table_names: &[&str]) -> impl Future<Output = Result<Schema>> + Send {
        async { Err(Error::Connectivity("connection refused".to_string())) }
    }

    fn type_mapper(&self) -> &dyn TypeMapper {
        &PostgresTypes
    }
}

#[tokio::test]
async fn test_matching_store_has_zero_errors() {
    let result = validator(store()).validate(&SCHEMA).await.unwrap();
    assert!(result.is_valid(), "{result}");
    assert!(result.errors().is_empty());
    assert_eq!(result.counts().tables, 2);
    assert_eq!(result.counts().valid_tables, 2);
}

#[tokio::test]
async fn test_missing_foreign_key_column() {
    // Postgres drops the constraint together with the column
    let mut store = store();
    store.tables["posts"].columns.retain(|c| c.name != "user_id");
    store.tables["posts"].foreign_keys.clear();

    let result = validator(store).validate(&SCHEMA).await.unwrap();
    assert!(!result.is_valid());
    assert_eq!(result.errors().len(), 1, "{result}");
    assert_eq!(result.errors()[0].kind, DiscrepancyKind::MissingColumn);
    assert_eq!(result.errors()[0].table, "posts");
    assert_eq!(result.errors()[0].object.as_deref(), Some("user_id"));
}

#[tokio::test]
async fn test_missing_table_is_one_error() {
    let mut store = store();
    store.tables.shift_remove("posts");

    let result = validator(store).validate(&SCHEMA).await.unwrap();
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].kind, DiscrepancyKind::MissingTable);
    assert_eq!(result.errors()[0].table, "posts");
}

#[tokio::test]
async fn test_store_names_match_case_insensitively() {
    let descriptor = SchemaDescriptor::new([Table::new("content")
        .with_column(Column::new("id", PgType::Integer).primary_key())])
    .unwrap();
    let store = Schema::from_tables([
        Table::new("Content").with_column(Column::new("id", PgType::Integer).primary_key())
    ]);

    let result = validator(store).validate(&descriptor).await.unwrap();
    assert!(result.is_valid(), "{result}");
}

#[tokio::test]
async fn test_repeated_validation_is_identical() {
    let mut store = store();
    store.tables["users"].columns[1].nullable = true;
    store.tables["users"]
        .columns
        .push(Column::new("legacy", PgType::Boolean));

    let validator = validator(store);
    let first = validator.validate(&SCHEMA).await.unwrap();
    let second = validator.validate(&SCHEMA).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_string(), second.to_string());
}

#[tokio::test]
async fn test_validate_tables_orders_the_list() {
    let result = validator(store())
        .validate_tables([posts(), users()])
        .await
        .unwrap();
    assert!(result.is_valid(), "{result}");
}

#[tokio::test]
async fn test_validate_tables_rejects_cycles() {
    let a = Table::new("a")
        .with_column(Column::new("id", PgType::Integer).primary_key())
        .with_column(Column::new("b_id", PgType::Integer))
        .with_foreign_key(ForeignKey::new("a", &["b_id"], "b", &["id"]));
    let b = Table::new("b")
        .with_column(Column::new("id", PgType::Integer).primary_key())
        .with_column(Column::new("a_id", PgType::Integer))
        .with_foreign_key(ForeignKey::new("b", &["a_id"], "a", &["id"]));

    let err = validator(store()).validate_tables([a, b]).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Descriptor(DescriptorError::Cycle { .. })
    ));
}

#[tokio::test]
async fn test_require_valid() {
    let validator_ok = validator(store());
    assert!(validator_ok.require_valid(&SCHEMA).await.is_ok());

    let mut broken = store();
    broken.tables.shift_remove("users");
    let err = validator(broken).require_valid(&SCHEMA).await.unwrap_err();
    match err {
        Error::SchemaMismatch { version, errors, first } => {
            assert_eq!(version, "1.0.0");
            assert_eq!(errors, 1);
            assert_eq!(first, "missing table: users");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unreachable_store_is_an_error() {
    let validator = SchemaValidator::new(Unreachable, "1.0.0");
    let err = validator.validate(&SCHEMA).await.unwrap_err();
    assert!(matches!(err, Error::Connectivity(_)));
}

#[tokio::test]
async fn test_health_check() {
    assert_eq!(validator(store()).health_check(&SCHEMA).await, SchemaHealth::Valid);

    let mut broken = store();
    broken.tables.shift_remove("posts");
    let SchemaHealth::Invalid(result) = validator(broken).health_check(&SCHEMA).await else {
        panic!("expected an invalid schema");
    };
    assert_eq!(result.errors().len(), 1);

    let health = SchemaValidator::new(Unreachable, "1.0.0")
        .health_check(&SCHEMA)
        .await;
    assert!(matches!(health, SchemaHealth::Unreachable(_)));
    assert!(!health.is_valid());
}
