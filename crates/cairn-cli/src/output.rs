//! Terminal rendering.

use cairn::{Severity, ValidationResult};
use cairn_config::DeliveryApiSettings;
use owo_colors::OwoColorize;
use std::fmt::Write;
use std::io::IsTerminal;

/// Renders text, with colors when stdout is a terminal and `NO_COLOR` is unset.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    color: bool,
}

impl Printer {
    pub fn detect() -> Self {
        Self {
            color: std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
        }
    }

    #[cfg(test)]
    pub fn plain() -> Self {
        Self { color: false }
    }

    fn severity(&self, severity: Severity) -> String {
        let label = severity.to_string();
        match (self.color, severity) {
            (false, _) => label,
            (true, Severity::Error) => label.red().bold().to_string(),
            (true, Severity::Warning) => label.yellow().bold().to_string(),
        }
    }

    fn dim(&self, s: &str) -> String {
        if self.color {
            s.dimmed().to_string()
        } else {
            s.to_string()
        }
    }

    fn verdict(&self, ok: bool, s: &str) -> String {
        match (self.color, ok) {
            (false, _) => s.to_string(),
            (true, true) => s.green().bold().to_string(),
            (true, false) => s.red().bold().to_string(),
        }
    }

    pub fn report(&self, result: &ValidationResult) -> String {
        let mut out = String::new();
        for d in result.discrepancies() {
            let _ = writeln!(out, "{}: {}", self.severity(d.severity()), d);
        }
        if result.discrepancies().next().is_some() {
            out.push('\n');
        }

        let counts = result.counts();
        let _ = writeln!(
            out,
            "{}",
            self.dim(&format!(
                "{} of {} table(s) valid; matched {} column(s), {} index(es), {} foreign key(s)",
                counts.valid_tables,
                counts.tables,
                counts.valid_columns,
                counts.valid_indexes,
                counts.valid_foreign_keys
            ))
        );

        let verdict = if result.is_valid() {
            format!("schema OK, {} warning(s)", result.warnings().len())
        } else {
            format!(
                "schema INVALID, {} error(s), {} warning(s)",
                result.errors().len(),
                result.warnings().len()
            )
        };
        let _ = writeln!(out, "{}", self.verdict(result.is_valid(), &verdict));
        out
    }

    pub fn table_order(&self, names: &[&str]) -> String {
        let mut out = String::new();
        for (i, name) in names.iter().enumerate() {
            let _ = writeln!(out, "{} {}", self.dim(&format!("{:>3}.", i + 1)), name);
        }
        out
    }

    pub fn delivery_api(&self, api: &DeliveryApiSettings) -> String {
        let on_off = |b: bool| if b { "yes" } else { "no" };
        let mut out = String::new();
        let _ = writeln!(out, "delivery api");
        let _ = writeln!(out, "  enabled:                  {}", on_off(api.enabled));
        let _ = writeln!(out, "  public access:            {}", on_off(api.public_access));
        let _ = writeln!(
            out,
            "  api key:                  {}",
            if api.api_key.is_some() { "set" } else { "not set" }
        );
        let aliases = if api.disallowed_content_type_aliases.is_empty() {
            self.dim("none")
        } else {
            api.disallowed_content_type_aliases.join(", ")
        };
        let _ = writeln!(out, "  disallowed content types: {}", aliases);
        let _ = writeln!(
            out,
            "  rich text as json:        {}",
            on_off(api.rich_text_output_as_json)
        );
        let _ = writeln!(out, "  media enabled:            {}", on_off(api.media_enabled()));
        let _ = writeln!(
            out,
            "  media public access:      {}",
            on_off(api.media_public_access())
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn::{Column, PgType, Schema, SchemaComparator, PostgresTypes, Table};

    #[test]
    fn test_plain_report() {
        let expected = Schema::from_tables([Table::new("users")
            .with_column(Column::new("id", PgType::Integer).primary_key())
            .with_column(Column::new("name", PgType::Text))]);
        let actual = Schema::from_tables([Table::new("users")
            .with_column(Column::new("id", PgType::Integer).primary_key())
            .with_column(Column::new("nickname", PgType::Text).nullable())]);
        let result = SchemaComparator::new(&PostgresTypes).compare(&expected, &actual);

        let text = Printer::plain().report(&result);
        assert_eq!(
            text,
            "error: missing column: users.name (expected TEXT NOT NULL)\n\
             warning: extra column: users.nickname (found TEXT)\n\
             \n\
             0 of 1 table(s) valid; matched 1 column(s), 0 index(es), 0 foreign key(s)\n\
             schema INVALID, 1 error(s), 1 warning(s)\n"
        );
    }

    #[test]
    fn test_table_order() {
        assert_eq!(
            Printer::plain().table_order(&["users", "posts"]),
            "  1. users\n  2. posts\n"
        );
    }

    #[test]
    fn test_delivery_api_hides_key() {
        let api = DeliveryApiSettings {
            enabled: true,
            api_key: Some("hunter2".to_string()),
            ..DeliveryApiSettings::default()
        };
        let text = Printer::plain().delivery_api(&api);
        assert!(text.contains("api key:                  set"));
        assert!(!text.contains("hunter2"));
    }
}
