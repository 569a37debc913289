//! Validation results.
//!
//! A [`ValidationResult`] is plain data: an ordered list of errors, an
//! ordered list of warnings, and tallies of what matched. It is built once by
//! the comparator and never mutated afterwards. Rendering it with `Display`
//! gives the same text for the same discrepancies, byte for byte.

use crate::{Error, Result};
use std::fmt;

/// How much a discrepancy matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// The application cannot run against this store.
    Error,
    /// Worth a look, but the application works.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// What kind of difference was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscrepancyKind {
    MissingTable,
    MissingColumn,
    /// Type, nullability, primary key membership or uniqueness differs.
    ColumnMismatch,
    ExtraColumn,
    DefaultMismatch,
    MissingIndex,
    /// Index found by name, but over other columns or with other uniqueness.
    IndexMismatch,
    /// An index with the expected definition exists under another name.
    IndexNameDiffers,
    ExtraIndex,
    MissingForeignKey,
    ForeignKeyMismatch,
    ForeignKeyNameDiffers,
    ExtraForeignKey,
}

impl DiscrepancyKind {
    pub fn severity(self) -> Severity {
        use DiscrepancyKind::*;
        match self {
            MissingTable | MissingColumn | ColumnMismatch | MissingIndex | IndexMismatch
            | MissingForeignKey | ForeignKeyMismatch => Severity::Error,
            ExtraColumn | DefaultMismatch | IndexNameDiffers | ExtraIndex
            | ForeignKeyNameDiffers | ExtraForeignKey => Severity::Warning,
        }
    }

    pub fn label(self) -> &'static str {
        use DiscrepancyKind::*;
        match self {
            MissingTable => "missing table",
            MissingColumn => "missing column",
            ColumnMismatch => "column mismatch",
            ExtraColumn => "extra column",
            DefaultMismatch => "default mismatch",
            MissingIndex => "missing index",
            IndexMismatch => "index mismatch",
            IndexNameDiffers => "index name differs",
            ExtraIndex => "extra index",
            MissingForeignKey => "missing foreign key",
            ForeignKeyMismatch => "foreign key mismatch",
            ForeignKeyNameDiffers => "foreign key name differs",
            ExtraForeignKey => "extra foreign key",
        }
    }
}

/// One difference between the expected and the actual schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    /// Table the discrepancy belongs to.
    pub table: String,
    /// Column, index or constraint name, if the discrepancy is below table level.
    pub object: Option<String>,
    /// What the descriptor declares.
    pub expected: Option<String>,
    /// What the store has.
    pub actual: Option<String>,
}

impl Discrepancy {
    pub(crate) fn new(kind: DiscrepancyKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            object: None,
            expected: None,
            actual: None,
        }
    }

    pub(crate) fn object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub(crate) fn expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub(crate) fn actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    /// `table` or `table.object`.
    pub fn path(&self) -> String {
        match &self.object {
            Some(object) => format!("{}.{}", self.table, object),
            None => self.table.clone(),
        }
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.path())?;
        match (&self.expected, &self.actual) {
            (Some(e), Some(a)) => write!(f, " (expected {}, found {})", e, a),
            (Some(e), None) => write!(f, " (expected {})", e),
            (None, Some(a)) => write!(f, " (found {})", a),
            (None, None) => Ok(()),
        }
    }
}

/// Tallies of what matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ValidationCounts {
    /// Expected tables checked.
    pub tables: usize,
    /// Tables present with no error-level discrepancy.
    pub valid_tables: usize,
    pub valid_columns: usize,
    pub valid_indexes: usize,
    pub valid_foreign_keys: usize,
}

/// The outcome of comparing an expected schema with an actual one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ValidationResult {
    errors: Vec<Discrepancy>,
    warnings: Vec<Discrepancy>,
    counts: ValidationCounts,
}

impl ValidationResult {
    pub(crate) fn push(&mut self, discrepancy: Discrepancy) {
        match discrepancy.severity() {
            Severity::Error => self.errors.push(discrepancy),
            Severity::Warning => self.warnings.push(discrepancy),
        }
    }

    pub(crate) fn counts_mut(&mut self) -> &mut ValidationCounts {
        &mut self.counts
    }

    pub fn errors(&self) -> &[Discrepancy] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Discrepancy] {
        &self.warnings
    }

    pub fn counts(&self) -> ValidationCounts {
        self.counts
    }

    /// Errors first, then warnings.
    pub fn discrepancies(&self) -> impl Iterator<Item = &Discrepancy> {
        self.errors.iter().chain(&self.warnings)
    }

    /// Whether the store can serve the application. Warnings do not count.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turn an invalid result into [`Error::SchemaMismatch`].
    pub fn ensure_valid(&self, version: &str) -> Result<()> {
        match self.errors.first() {
            None => Ok(()),
            Some(first) => Err(Error::SchemaMismatch {
                version: version.to_string(),
                errors: self.errors.len(),
                first: first.to_string(),
            }),
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counts;
        writeln!(
            f,
            "{} of {} table(s) valid, {} error(s), {} warning(s)",
            c.valid_tables,
            c.tables,
            self.errors.len(),
            self.warnings.len()
        )?;
        writeln!(
            f,
            "matched {} column(s), {} index(es), {} foreign key(s)",
            c.valid_columns, c.valid_indexes, c.valid_foreign_keys
        )?;
        for d in self.discrepancies() {
            writeln!(f, "{}: {}", d.severity(), d)?;
        }
        Ok(())
    }
}
