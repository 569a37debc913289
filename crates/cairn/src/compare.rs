//! Schema comparison - diff an expected schema against a store's actual one.
//!
//! Unlike a migration diff, nothing here describes how to fix the store. The
//! comparator only reports what differs, classifying each difference as an
//! error (the application cannot run) or a warning (it can, but someone
//! should look):
//!
//! ```text
//! error: missing column: posts.user_id (expected BIGINT NOT NULL)
//! warning: extra column: users.legacy_flag (found BOOLEAN)
//! ```
//!
//! Tables are visited in the expected schema's order, and within a table
//! columns, then indexes, then foreign keys, each in declaration order. The
//! same inputs therefore always give the same result.

use crate::report::{Discrepancy, DiscrepancyKind, ValidationResult};
use cairn_db_schema::{Column, ForeignKey, Index, Schema, Table, TypeMapper, same_ident};

/// Compares schemas, normalizing types through a [`TypeMapper`].
#[derive(Clone, Copy)]
pub struct SchemaComparator<'a> {
    types: &'a dyn TypeMapper,
}

impl<'a> SchemaComparator<'a> {
    pub fn new(types: &'a dyn TypeMapper) -> Self {
        Self { types }
    }

    /// Diff `actual` against `expected`. Tables only present in `actual` are
    /// not reported: a store may hold tables of other applications.
    pub fn compare(&self, expected: &Schema, actual: &Schema) -> ValidationResult {
        let mut result = ValidationResult::default();

        for table in expected.iter_tables() {
            result.counts_mut().tables += 1;

            let Some(current) = actual.get_table(&table.name) else {
                result.push(Discrepancy::new(DiscrepancyKind::MissingTable, &table.name));
                continue;
            };

            let errors_before = result.errors().len();
            let missing = self.compare_columns(table, current, &mut result);
            compare_indices(table, current, &missing, &mut result);
            compare_foreign_keys(table, current, &missing, &mut result);
            if result.errors().len() == errors_before {
                result.counts_mut().valid_tables += 1;
            }
        }

        result
    }

    /// Returns the expected columns the store lacks.
    fn compare_columns<'e>(
        &self,
        expected: &'e Table,
        actual: &Table,
        result: &mut ValidationResult,
    ) -> Vec<&'e str> {
        let mut missing = Vec::new();
        let expected_single_pk = expected.primary_key_columns().len() == 1;
        let actual_single_pk = actual.primary_key_columns().len() == 1;

        for col in &expected.columns {
            let want = self.normalized(col, expected_single_pk);
            let Some(current) = actual.find_column(&col.name) else {
                missing.push(col.name.as_str());
                result.push(
                    Discrepancy::new(DiscrepancyKind::MissingColumn, &expected.name)
                        .object(&col.name)
                        .expected(want.signature()),
                );
                continue;
            };

            let have = self.normalized(current, actual_single_pk);
            // A store may generate values the application does not rely on,
            // not the other way round.
            if want.pg_type != have.pg_type
                || want.nullable != have.nullable
                || want.primary_key != have.primary_key
                || want.unique != have.unique
                || (want.auto_generated && !have.auto_generated)
            {
                result.push(
                    Discrepancy::new(DiscrepancyKind::ColumnMismatch, &expected.name)
                        .object(&col.name)
                        .expected(want.signature())
                        .actual(have.signature()),
                );
                continue;
            }
            result.counts_mut().valid_columns += 1;

            // Only defaults the descriptor declares are checked; stores add
            // their own for serial and identity columns.
            if let Some(default) = &col.default {
                let same = current
                    .default
                    .as_deref()
                    .is_some_and(|d| same_default(default, d));
                if !same {
                    let mut d = Discrepancy::new(DiscrepancyKind::DefaultMismatch, &expected.name)
                        .object(&col.name)
                        .expected(default.as_str());
                    if let Some(actual_default) = &current.default {
                        d = d.actual(actual_default.as_str());
                    }
                    result.push(d);
                }
            }
        }

        for col in &actual.columns {
            if expected.find_column(&col.name).is_none() {
                result.push(
                    Discrepancy::new(DiscrepancyKind::ExtraColumn, &expected.name)
                        .object(&col.name)
                        .actual(self.normalized(col, actual_single_pk).signature()),
                );
            }
        }

        missing
    }

    /// The column with its type normalized. The primary key of a
    /// single-column key is unique by definition, whether or not a separate
    /// unique constraint says so.
    fn normalized(&self, col: &Column, single_pk: bool) -> Column {
        Column {
            pg_type: self.types.normalize(&col.pg_type),
            unique: col.unique && !(col.primary_key && single_pk),
            ..col.clone()
        }
    }
}

/// Whether an object spans a column the store lacks. Postgres drops indexes
/// and constraints along with any column they use, so such objects are
/// already accounted for by the missing column.
fn uses_missing_column(columns: &[String], missing: &[&str]) -> bool {
    columns
        .iter()
        .any(|c| missing.iter().any(|m| same_ident(m, c)))
}

fn compare_indices(
    expected: &Table,
    actual: &Table,
    missing: &[&str],
    result: &mut ValidationResult,
) {
    let (matches, unclaimed) = match_objects(
        &expected.indices,
        &actual.indices,
        |i: &Index| i.name.as_str(),
        Index::same_definition,
    );

    for (idx, m) in expected.indices.iter().zip(matches) {
        let (kind, want, have) = match m {
            Match::Named(i) if idx.same_definition(&actual.indices[i]) => {
                result.counts_mut().valid_indexes += 1;
                continue;
            }
            Match::Named(i) => (
                DiscrepancyKind::IndexMismatch,
                idx.to_string(),
                Some(actual.indices[i].to_string()),
            ),
            Match::Renamed(i) => {
                result.counts_mut().valid_indexes += 1;
                (
                    DiscrepancyKind::IndexNameDiffers,
                    idx.name.clone(),
                    Some(actual.indices[i].name.clone()),
                )
            }
            Match::Missing if uses_missing_column(&idx.columns, missing) => continue,
            Match::Missing => (DiscrepancyKind::MissingIndex, idx.to_string(), None),
        };
        result.push(object_discrepancy(kind, &expected.name, &idx.name, want, have));
    }

    for i in unclaimed {
        let idx = &actual.indices[i];
        result.push(
            Discrepancy::new(DiscrepancyKind::ExtraIndex, &expected.name)
                .object(&idx.name)
                .actual(idx.to_string()),
        );
    }
}

fn compare_foreign_keys(
    expected: &Table,
    actual: &Table,
    missing: &[&str],
    result: &mut ValidationResult,
) {
    let (matches, unclaimed) = match_objects(
        &expected.foreign_keys,
        &actual.foreign_keys,
        |fk: &ForeignKey| fk.name.as_str(),
        ForeignKey::same_definition,
    );

    for (fk, m) in expected.foreign_keys.iter().zip(matches) {
        let (kind, want, have) = match m {
            Match::Named(i) if fk.same_definition(&actual.foreign_keys[i]) => {
                result.counts_mut().valid_foreign_keys += 1;
                continue;
            }
            Match::Named(i) => (
                DiscrepancyKind::ForeignKeyMismatch,
                fk.to_string(),
                Some(actual.foreign_keys[i].to_string()),
            ),
            Match::Renamed(i) => {
                result.counts_mut().valid_foreign_keys += 1;
                (
                    DiscrepancyKind::ForeignKeyNameDiffers,
                    fk.name.clone(),
                    Some(actual.foreign_keys[i].name.clone()),
                )
            }
            Match::Missing if uses_missing_column(&fk.columns, missing) => continue,
            Match::Missing => (DiscrepancyKind::MissingForeignKey, fk.to_string(), None),
        };
        result.push(object_discrepancy(kind, &expected.name, &fk.name, want, have));
    }

    for i in unclaimed {
        let fk = &actual.foreign_keys[i];
        result.push(
            Discrepancy::new(DiscrepancyKind::ExtraForeignKey, &expected.name)
                .object(&fk.name)
                .actual(fk.to_string()),
        );
    }
}

fn object_discrepancy(
    kind: DiscrepancyKind,
    table: &str,
    object: &str,
    expected: String,
    actual: Option<String>,
) -> Discrepancy {
    let d = Discrepancy::new(kind, table).object(object).expected(expected);
    match actual {
        Some(actual) => d.actual(actual),
        None => d,
    }
}

/// How an expected index or foreign key was found in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Match {
    /// Same name; the definition may still differ.
    Named(usize),
    /// Different name, same definition.
    Renamed(usize),
    Missing,
}

/// Pair expected objects with actual ones: by name first, then by
/// definition among the actual objects no name claimed. Returns one
/// [`Match`] per expected object and the positions of actual objects left
/// unclaimed.
fn match_objects<T>(
    expected: &[T],
    actual: &[T],
    name: impl Fn(&T) -> &str,
    same: impl Fn(&T, &T) -> bool,
) -> (Vec<Match>, Vec<usize>) {
    let mut claimed = vec![false; actual.len()];

    let mut matches: Vec<Match> = expected
        .iter()
        .map(|e| {
            let found = actual
                .iter()
                .enumerate()
                .position(|(i, a)| !claimed[i] && same_ident(name(a), name(e)));
            match found {
                Some(i) => {
                    claimed[i] = true;
                    Match::Named(i)
                }
                None => Match::Missing,
            }
        })
        .collect();

    for (e, m) in expected.iter().zip(matches.iter_mut()) {
        if *m != Match::Missing {
            continue;
        }
        if let Some(i) = (0..actual.len()).find(|&i| !claimed[i] && same(e, &actual[i])) {
            claimed[i] = true;
            *m = Match::Renamed(i);
        }
    }

    let unclaimed = (0..actual.len()).filter(|&i| !claimed[i]).collect();
    (matches, unclaimed)
}

/// Whether two default expressions mean the same thing.
///
/// Stores echo defaults back with explicit casts and quoting (`'draft'` comes
/// back as `'draft'::character varying`, `-1` as `'-1'::integer`), so casts
/// are stripped and quoted numbers unquoted before comparing
/// case-insensitively.
pub fn same_default(expected: &str, actual: &str) -> bool {
    normalize_default(expected).eq_ignore_ascii_case(&normalize_default(actual))
}

fn normalize_default(expr: &str) -> String {
    let stripped = strip_casts(expr.trim());
    let stripped = stripped.trim();
    let unparenthesized = stripped
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .filter(|s| !s.contains('(') && !s.contains(')'))
        .unwrap_or(stripped);

    if let Some(inner) = unparenthesized
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        && is_numeric_literal(inner)
    {
        return inner.to_string();
    }
    unparenthesized.to_string()
}

/// Plain decimal or exponent notation. `'NaN'` and `'infinity'` parse as
/// floats too but are text until cast, so they stay quoted.
fn is_numeric_literal(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit())
        && s.chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        && s.parse::<f64>().is_ok()
}

/// Words that continue a multi-word type name after a cast.
const TYPE_NAME_CONTINUATIONS: &[&str] = &["varying", "precision", "with", "without", "time", "zone"];

/// Remove `::type` casts outside string literals.
fn strip_casts(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut rest = expr;
    let mut in_literal = false;

    while let Some(c) = rest.chars().next() {
        if c == '\'' {
            in_literal = !in_literal;
        }
        if !in_literal && rest.starts_with("::") {
            rest = skip_type_name(&rest[2..]);
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn skip_type_name(s: &str) -> &str {
    let is_name = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '"' || c == '.';
    let mut rest = s.trim_start_matches(is_name);
    loop {
        let Some(after_space) = rest.strip_prefix(' ') else {
            break;
        };
        let word_len = after_space
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(after_space.len());
        let word = &after_space[..word_len];
        if !TYPE_NAME_CONTINUATIONS
            .iter()
            .any(|w| w.eq_ignore_ascii_case(word))
        {
            break;
        }
        rest = &after_space[word_len..];
    }
    // type modifiers and array brackets
    if rest.starts_with('(')
        && let Some(end) = rest.find(')')
    {
        rest = &rest[end + 1..];
    }
    while let Some(r) = rest.strip_prefix("[]") {
        rest = r;
    }
    rest
}
