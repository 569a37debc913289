//! DDL generation and schema creation.
//!
//! A fresh store can be brought to the shape a descriptor declares by running
//! [`schema_to_sql`]'s output, which is what [`create_schema`] does. Tables
//! come out in descriptor order, so every `REFERENCES` points at a table
//! created earlier in the script (or at the table itself).
//!
//! Changing an existing store is out of scope: there is no `ALTER`.

use crate::error::store_error;
use crate::traced::{Connection, ConnectionExt};
use crate::{Result, SchemaDescriptor};
use cairn_db_schema::{Index, Table};
use cairn_sql::{quote_ident, quote_idents};

/// Generate the CREATE TABLE statement for a table, foreign keys included.
pub fn create_table_sql(table: &Table) -> String {
    let pk_columns = table.primary_key_columns();

    // A composite key needs a table constraint.
    let composite_pk = pk_columns.len() > 1;

    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|col| {
            let mut def = format!("    {} {}", quote_ident(&col.name), col.pg_type);
            if col.primary_key && !composite_pk {
                def.push_str(" PRIMARY KEY");
            } else if !col.nullable {
                def.push_str(" NOT NULL");
            }
            if col.unique && !col.primary_key {
                def.push_str(" UNIQUE");
            }
            if let Some(default) = &col.default {
                def.push_str(" DEFAULT ");
                def.push_str(default);
            }
            def
        })
        .collect();

    if composite_pk {
        parts.push(format!("    PRIMARY KEY ({})", quote_idents(&pk_columns)));
    }

    for fk in &table.foreign_keys {
        parts.push(format!(
            "    CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_ident(&fk.name),
            quote_idents(&fk.columns),
            quote_ident(&fk.references_table),
            quote_idents(&fk.references_columns),
        ));
    }

    format!(
        "CREATE TABLE {} (\n{}\n);",
        quote_ident(&table.name),
        parts.join(",\n")
    )
}

/// Generate the CREATE INDEX statement for an index on `table`.
pub fn create_index_sql(table: &Table, idx: &Index) -> String {
    format!(
        "CREATE {}INDEX {} ON {} ({});",
        if idx.unique { "UNIQUE " } else { "" },
        quote_ident(&idx.name),
        quote_ident(&table.name),
        quote_idents(&idx.columns),
    )
}

/// The full creation script: each table followed by its indexes.
pub fn schema_to_sql(descriptor: &SchemaDescriptor) -> String {
    descriptor
        .ordered_tables()
        .iter()
        .map(|table| {
            let mut stmts = vec![create_table_sql(table)];
            stmts.extend(table.indices.iter().map(|idx| create_index_sql(table, idx)));
            stmts.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Create every table of `descriptor` in one transaction.
///
/// Nothing is created if any statement fails.
pub async fn create_schema<C: Connection + ?Sized>(
    conn: &C,
    descriptor: &SchemaDescriptor,
) -> Result<()> {
    let conn = conn.traced();
    let script = schema_to_sql(descriptor);

    conn.batch_execute("BEGIN").await.map_err(store_error)?;
    if let Err(err) = conn.batch_execute(&script).await {
        if let Err(rollback) = conn.batch_execute("ROLLBACK").await {
            tracing::warn!(error = %rollback, "rollback after failed schema creation failed");
        }
        return Err(store_error(err));
    }
    conn.batch_execute("COMMIT").await.map_err(store_error)?;

    tracing::info!(tables = descriptor.len(), "created schema");
    Ok(())
}
