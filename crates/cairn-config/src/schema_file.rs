//! Declarative schema files.
//!
//! ```text
//! tables (
//!   {
//!     name users
//!     columns (
//!       {name id, type bigserial, pk true}
//!       {name email, type "varchar(255)", unique true}
//!     )
//!   }
//!   {
//!     name posts
//!     columns (
//!       {name id, type bigserial, pk true}
//!       {name user_id, type bigint}
//!     )
//!     foreign_keys ({columns (user_id), references users.id})
//!   }
//! )
//! ```
//!
//! Types with spaces or parentheses must be quoted.

use facet::Facet;

/// A schema file: the tables an application expects, in declaration order.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct SchemaFile {
    pub tables: Vec<TableSpec>,
}

/// One table.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub name: String,

    pub columns: Vec<ColumnSpec>,

    #[facet(default)]
    pub indexes: Vec<IndexSpec>,

    #[facet(default)]
    pub foreign_keys: Vec<ForeignKeySpec>,
}

/// One column.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,

    /// Type name, e.g. `bigint`, `"varchar(255)"`, `"string(40)"`.
    #[facet(rename = "type")]
    pub ty: String,

    #[facet(default)]
    pub nullable: bool,

    /// Default value expression, as SQL.
    #[facet(default)]
    pub default: Option<String>,

    /// Member of the primary key.
    #[facet(default)]
    pub pk: bool,

    #[facet(default)]
    pub unique: bool,
}

/// One index. Unnamed indexes get `idx_{table}_{columns}` (or `uq_…`).
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct IndexSpec {
    #[facet(default)]
    pub name: Option<String>,

    pub columns: Vec<String>,

    #[facet(default)]
    pub unique: bool,
}

/// One foreign key. Unnamed keys get `fk_{table}_{columns}`.
///
/// `references` is either a table name (with `references_columns` listing
/// the target columns) or the `table.column` shorthand for single-column
/// keys.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct ForeignKeySpec {
    #[facet(default)]
    pub name: Option<String>,

    pub columns: Vec<String>,

    pub references: String,

    #[facet(default)]
    pub references_columns: Vec<String>,
}
