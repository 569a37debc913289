//! Ordering resolver - puts tables in dependency order.
//!
//! A table must come after every table its foreign keys reference, so that
//! creating (or checking) tables front to back never meets a reference to
//! something that does not exist yet.
//!
//! ```text
//! declared:  posts, comments, users
//! resolved:  users, posts, comments
//! ```
//!
//! The sort is stable: tables with no ordering constraint between them keep
//! their declaration order, so a list that is already valid comes back
//! unchanged. A table referencing itself is not a constraint.

use crate::DescriptorError;
use cairn_db_schema::{Table, same_ident};
use std::collections::BTreeSet;

/// Names of the tables `table` must come after.
pub fn dependencies(table: &Table) -> Vec<&str> {
    table.referenced_tables()
}

/// Sort tables so that every referenced table precedes its referrers.
///
/// Fails with [`DescriptorError::DanglingReference`] when a foreign key
/// targets a table missing from `tables`, and with
/// [`DescriptorError::Cycle`] when no valid order exists.
pub fn resolve(tables: Vec<Table>) -> Result<Vec<Table>, DescriptorError> {
    let deps = dependency_indices(&tables)?;
    let n = tables.len();

    let mut pending: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, ds) in deps.iter().enumerate() {
        for &d in ds {
            dependents[d].push(i);
        }
    }

    // Kahn's algorithm, always taking the earliest declared ready table.
    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &j in &dependents[i] {
            pending[j] -= 1;
            if pending[j] == 0 {
                ready.insert(j);
            }
        }
    }

    if order.len() < n {
        return Err(DescriptorError::Cycle {
            tables: cycle_path(&tables, &deps, &pending),
        });
    }

    let mut slots: Vec<Option<Table>> = tables.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// For each table, the positions of the tables it references.
fn dependency_indices(tables: &[Table]) -> Result<Vec<Vec<usize>>, DescriptorError> {
    tables
        .iter()
        .map(|table| {
            dependencies(table)
                .into_iter()
                .map(|name| {
                    tables
                        .iter()
                        .position(|t| same_ident(&t.name, name))
                        .ok_or_else(|| DescriptorError::DanglingReference {
                            table: table.name.clone(),
                            references: name.to_string(),
                        })
                })
                .collect()
        })
        .collect()
}

/// Walk unresolved tables until one repeats, e.g. `a -> b -> a`.
///
/// Every table left with pending dependencies has at least one dependency
/// that is itself unresolved, so the walk always closes a loop.
fn cycle_path(tables: &[Table], deps: &[Vec<usize>], pending: &[usize]) -> Vec<String> {
    let Some(mut current) = (0..tables.len()).find(|&i| pending[i] > 0) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = Vec::new();
    loop {
        if let Some(start) = path.iter().position(|&i| i == current) {
            let mut names: Vec<String> = path[start..]
                .iter()
                .map(|&i| tables[i].name.clone())
                .collect();
            names.push(tables[current].name.clone());
            return names;
        }
        path.push(current);
        match deps[current].iter().find(|&&d| pending[d] > 0) {
            Some(&next) => current = next,
            None => return path.iter().map(|&i| tables[i].name.clone()).collect(),
        }
    }
}
