//! SQL quoting and conventional object names.
//!
//! Every identifier cairn renders into DDL goes through [`Ident`], and every
//! object cairn names on the caller's behalf uses the helpers below, so that
//! a descriptor and the DDL generated from it always agree.

use std::fmt;

/// Longest identifier Postgres keeps, in bytes. Longer ones are silently
/// truncated by the server (NAMEDATALEN - 1).
pub const PG_IDENT_MAX: usize = 63;

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use cairn_sql::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"")?;
        f.write_str(&self.0.as_ref().replace('"', "\"\""))?;
        f.write_str("\"")
    }
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes, so reserved words like `user` or `order` work as table
/// names. Quoting also preserves case: `"Content"` stays `Content` in the
/// catalog.
pub fn quote_ident(name: &str) -> String {
    Ident(name).to_string()
}

/// Quote and join a list of identifiers with `, `.
///
/// ```
/// assert_eq!(cairn_sql::quote_idents(&["a", "b"]), "\"a\", \"b\"");
/// ```
pub fn quote_idents(names: &[impl AsRef<str>]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Generate a standard index name for a table and columns.
///
/// ```
/// assert_eq!(cairn_sql::index_name("post", &["author_id", "created_at"]), "idx_post_author_id_created_at");
/// ```
pub fn index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    conventional_name("idx", table, columns)
}

/// Generate a standard unique index name for a table and columns.
///
/// ```
/// assert_eq!(cairn_sql::unique_index_name("user", &["email"]), "uq_user_email");
/// ```
pub fn unique_index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    conventional_name("uq", table, columns)
}

/// Generate a standard foreign key constraint name.
///
/// ```
/// assert_eq!(cairn_sql::foreign_key_name("post", &["user_id"]), "fk_post_user_id");
/// ```
pub fn foreign_key_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    conventional_name("fk", table, columns)
}

/// `{prefix}_{table}_{columns}`, kept within [`PG_IDENT_MAX`] so the store
/// reports back exactly the name we generated. Names that would be longer
/// are cut and end in a stable hash of the full name, so two long names that
/// share a prefix stay distinct.
fn conventional_name(prefix: &str, table: &str, columns: &[impl AsRef<str>]) -> String {
    let cols: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    let name = format!("{}_{}_{}", prefix, table, cols.join("_"));
    if name.len() <= PG_IDENT_MAX {
        return name;
    }

    let hex = blake3::hash(name.as_bytes()).to_hex().to_string();
    let suffix = &hex[..16];
    let keep = PG_IDENT_MAX - suffix.len() - 1;
    format!("{}_{}", truncate_ident(&name, keep), suffix)
}

/// The longest prefix of `name` that fits in `max` bytes without splitting a
/// character.
pub fn truncate_ident(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut len = max;
    while len > 0 && !name.is_char_boundary(len) {
        len -= 1;
    }
    &name[..len]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_preserves_case() {
        assert_eq!(quote_ident("Content"), "\"Content\"");
        assert_eq!(quote_ident("order"), "\"order\"");
    }

    #[test]
    fn long_names_fit_postgres_identifiers() {
        let table = "organization_membership_invitations";
        let columns = ["organization_id", "invited_by_user_id", "created_at"];
        let name = index_name(table, &columns);
        assert_eq!(name.len(), PG_IDENT_MAX);
        assert!(name.starts_with("idx_organization_membership_invitations_"));

        // same prefix, different tail
        let other = index_name(table, &["organization_id", "invited_by_user_id", "updated_at"]);
        assert_eq!(other.len(), PG_IDENT_MAX);
        assert_ne!(name, other);

        // stable across calls
        assert_eq!(name, index_name(table, &columns));
        assert!(foreign_key_name(table, &columns).len() <= PG_IDENT_MAX);
        assert!(unique_index_name(table, &columns).len() <= PG_IDENT_MAX);
    }

    #[test]
    fn truncate_ident_respects_char_boundaries() {
        assert_eq!(truncate_ident("short", PG_IDENT_MAX), "short");
        assert_eq!(truncate_ident("abcdef", 3), "abc");
        // 'é' is two bytes; cutting at 2 would split it
        assert_eq!(truncate_ident("aéb", 2), "a");
    }

    #[test]
    fn composite_names() {
        assert_eq!(index_name("post", &["a", "b"]), "idx_post_a_b");
        assert_eq!(unique_index_name("tag", &["shop_id", "handle"]), "uq_tag_shop_id_handle");
        assert_eq!(foreign_key_name("comment", &["post_id"]), "fk_comment_post_id");
    }
}
