//! Database schema types for cairn.
//!
//! The same shapes describe both sides of a validation run: the schema an
//! application expects (built from a descriptor) and the schema a live store
//! actually has (built by introspection). Keeping one shape for both is what
//! lets the comparator diff them structurally.
//!
//! Identifiers are compared case-insensitively everywhere in this crate
//! (see [`same_ident`]), since stores disagree on how they fold case.

use cairn_sql::{foreign_key_name, index_name, unique_index_name};
use indexmap::IndexMap;
use std::fmt;

mod types;
pub use types::{PgType, PostgresTypes, TypeMapper};


/// Whether two identifiers name the same object.
pub fn same_ident(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Whether two identifier lists match element-wise, in order.
pub fn same_idents(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_ident(x, y))
}

/// A database column definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Logical type
    pub pg_type: PgType,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Default value expression (if any)
    pub default: Option<String>,
    /// Whether this column is part of the primary key
    pub primary_key: bool,
    /// Whether this column has a single-column unique constraint
    pub unique: bool,
    /// Whether values are generated by the store (serial, identity)
    pub auto_generated: bool,
}

impl Column {
    /// A NOT NULL column with no default.
    pub fn new(name: impl Into<String>, pg_type: PgType) -> Self {
        let auto_generated = pg_type.is_serial();
        Self {
            name: name.into(),
            pg_type,
            nullable: false,
            default: None,
            primary_key: false,
            unique: false,
            auto_generated,
        }
    }

    /// Allow NULL values.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark as (part of) the primary key. Primary key columns are never null.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Add a single-column unique constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set the default value expression.
    pub fn with_default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Signature used in reports, e.g. `BIGINT NOT NULL PRIMARY KEY GENERATED`.
    pub fn signature(&self) -> String {
        let mut sig = self.pg_type.to_string();
        if !self.nullable {
            sig.push_str(" NOT NULL");
        }
        if self.primary_key {
            sig.push_str(" PRIMARY KEY");
        }
        if self.unique {
            sig.push_str(" UNIQUE");
        }
        // serial type names already say so
        if self.auto_generated && !self.pg_type.is_serial() {
            sig.push_str(" GENERATED");
        }
        sig
    }
}

/// A database index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Index {
    /// Index name
    pub name: String,
    /// Indexed columns, in key order
    pub columns: Vec<String>,
    /// Whether this is a unique index
    pub unique: bool,
}

impl Index {
    /// A non-unique index with an explicit name.
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        }
    }

    /// A non-unique index named `idx_{table}_{columns}`.
    pub fn on(table: &str, columns: &[&str]) -> Self {
        Self::new(index_name(table, columns), columns)
    }

    /// A unique index named `uq_{table}_{columns}`.
    pub fn unique_on(table: &str, columns: &[&str]) -> Self {
        Self {
            unique: true,
            ..Self::new(unique_index_name(table, columns), columns)
        }
    }

    /// Whether `other` indexes the same columns with the same uniqueness.
    pub fn same_definition(&self, other: &Index) -> bool {
        self.unique == other.unique && same_idents(&self.columns, &other.columns)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unique {
            write!(f, "UNIQUE ")?;
        }
        write!(f, "({})", self.columns.join(", "))
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    /// Constraint name
    pub name: String,
    /// Column(s) in this table
    pub columns: Vec<String>,
    /// Referenced table
    pub references_table: String,
    /// Referenced column(s)
    pub references_columns: Vec<String>,
}

impl ForeignKey {
    /// A foreign key named `fk_{table}_{columns}`.
    pub fn new(
        table: &str,
        columns: &[&str],
        references_table: impl Into<String>,
        references_columns: &[&str],
    ) -> Self {
        Self {
            name: foreign_key_name(table, columns),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            references_table: references_table.into(),
            references_columns: references_columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Override the constraint name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether `other` links the same columns to the same target.
    pub fn same_definition(&self, other: &ForeignKey) -> bool {
        same_idents(&self.columns, &other.columns)
            && same_ident(&self.references_table, &other.references_table)
            && same_idents(&self.references_columns, &other.references_columns)
    }

    /// Whether this key points back at its own table.
    pub fn is_self_reference(&self, table: &str) -> bool {
        same_ident(&self.references_table, table)
    }
}

impl fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}) -> {}({})",
            self.columns.join(", "),
            self.references_table,
            self.references_columns.join(", ")
        )
    }
}

/// A database table definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Columns, in declaration (or ordinal) order
    pub columns: Vec<Column>,
    /// Foreign keys
    pub foreign_keys: Vec<ForeignKey>,
    /// Indices (excluding those backing primary key / unique constraints)
    pub indices: Vec<Index>,
}

impl Table {
    /// An empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.indices.push(index);
        self
    }

    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Find a column by name (case-insensitive).
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| same_ident(&c.name, name))
    }

    /// Names of the primary key columns, in column order.
    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Names of the tables this table references, excluding itself,
    /// deduplicated, in foreign key order.
    pub fn referenced_tables(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for fk in &self.foreign_keys {
            if fk.is_self_reference(&self.name) {
                continue;
            }
            if !out.iter().any(|t| same_ident(t, &fk.references_table)) {
                out.push(&fk.references_table);
            }
        }
        out
    }
}

/// A point-in-time schema: expected (from a descriptor) or actual (from a
/// store).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    /// Tables in the schema, indexed by name, in insertion order
    pub tables: IndexMap<String, Table>,
}

impl Schema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema from tables, keeping their order.
    pub fn from_tables(tables: impl IntoIterator<Item = Table>) -> Self {
        Self {
            tables: tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    /// Add (or replace) a table, keeping its position if it was present.
    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Get a table by name. Exact matches win, then case-insensitive ones.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables
            .get(name)
            .or_else(|| self.tables.values().find(|t| same_ident(&t.name, name)))
    }

    /// Whether a table with this name exists (case-insensitive).
    pub fn contains_table(&self, name: &str) -> bool {
        self.get_table(name).is_some()
    }

    /// Iterate over all tables.
    pub fn iter_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Table names, in order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.values().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Parse a foreign key reference of the form `table.column` or `table(column)`.
pub fn parse_fk_reference(fk_ref: &str) -> Option<(&str, &str)> {
    if let Some((table, col)) = fk_ref.split_once('.')
        && !table.is_empty()
        && !col.is_empty()
    {
        return Some((table, col));
    }

    if let Some(paren_idx) = fk_ref.find('(')
        && fk_ref.ends_with(')')
    {
        let table = &fk_ref[..paren_idx];
        let col = &fk_ref[paren_idx + 1..fk_ref.len() - 1];
        if !table.is_empty() && !col.is_empty() {
            return Some((table, col));
        }
    }

    None
}
