//! Logical column types and the mapping from store spellings to them.

use std::fmt;

/// Postgres column types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PgType {
    /// SMALLINT (2 bytes)
    SmallInt,
    /// INTEGER (4 bytes)
    Integer,
    /// BIGINT (8 bytes)
    BigInt,
    /// SMALLSERIAL (SMALLINT backed by a sequence)
    SmallSerial,
    /// SERIAL (INTEGER backed by a sequence)
    Serial,
    /// BIGSERIAL (BIGINT backed by a sequence)
    BigSerial,
    /// REAL (4 bytes floating point)
    Real,
    /// DOUBLE PRECISION (8 bytes floating point)
    DoublePrecision,
    /// NUMERIC, optionally with (precision, scale)
    Numeric(Option<(u32, u32)>),
    /// BOOLEAN
    Boolean,
    /// TEXT
    Text,
    /// VARCHAR, optionally length-limited
    Varchar(Option<u32>),
    /// CHAR, optionally with a length
    Char(Option<u32>),
    /// BYTEA (binary)
    Bytea,
    /// TIMESTAMP (without time zone)
    Timestamp,
    /// TIMESTAMPTZ
    Timestamptz,
    /// DATE
    Date,
    /// TIME
    Time,
    /// UUID
    Uuid,
    /// JSON
    Json,
    /// JSONB
    Jsonb,
    /// One-dimensional array of another type
    Array(Box<PgType>),
    /// Anything cairn has no dedicated variant for, as spelled by the store
    Other(String),
}

impl PgType {
    /// Parse a type name as written in a descriptor or reported by
    /// `format_type()`.
    ///
    /// Matching is case-insensitive and accepts the common aliases
    /// (`int4`, `character varying(255)`, `timestamp with time zone`, ...),
    /// internal array names (`_int4`), and `string(n)` as a synonym for
    /// `varchar(n)`. Unknown names become [`PgType::Other`].
    pub fn parse(raw: &str) -> PgType {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();

        if let Some(elem) = lower.strip_suffix("[]") {
            return PgType::Array(Box::new(PgType::parse(elem)));
        }
        if let Some(elem) = lower.strip_prefix('_')
            && !elem.is_empty()
        {
            return PgType::Array(Box::new(PgType::parse(elem)));
        }

        let Some((base, args)) = split_type_args(&lower) else {
            return PgType::Other(trimmed.to_string());
        };

        match (base.as_str(), args.as_slice()) {
            ("smallint" | "int2", []) => PgType::SmallInt,
            ("integer" | "int" | "int4", []) => PgType::Integer,
            ("bigint" | "int8", []) => PgType::BigInt,
            ("smallserial" | "serial2", []) => PgType::SmallSerial,
            ("serial" | "serial4", []) => PgType::Serial,
            ("bigserial" | "serial8", []) => PgType::BigSerial,
            ("real" | "float4", []) => PgType::Real,
            ("double precision" | "double" | "float8", []) => PgType::DoublePrecision,
            ("float", [p]) if *p <= 24 => PgType::Real,
            ("float", [] | [_]) => PgType::DoublePrecision,
            ("numeric" | "decimal", []) => PgType::Numeric(None),
            ("numeric" | "decimal", [p]) => PgType::Numeric(Some((*p, 0))),
            ("numeric" | "decimal", [p, s]) => PgType::Numeric(Some((*p, *s))),
            ("boolean" | "bool", []) => PgType::Boolean,
            ("text", []) => PgType::Text,
            ("varchar" | "character varying" | "string", []) => PgType::Varchar(None),
            ("varchar" | "character varying" | "string", [n]) => PgType::Varchar(Some(*n)),
            ("char" | "character" | "bpchar", []) => PgType::Char(None),
            ("char" | "character" | "bpchar", [n]) => PgType::Char(Some(*n)),
            ("bytea", []) => PgType::Bytea,
            // timestamp/time precision is not modelled
            ("timestamp" | "timestamp without time zone", [] | [_]) => PgType::Timestamp,
            ("timestamptz" | "timestamp with time zone", [] | [_]) => PgType::Timestamptz,
            ("date", []) => PgType::Date,
            ("time" | "time without time zone", [] | [_]) => PgType::Time,
            ("uuid", []) => PgType::Uuid,
            ("json", []) => PgType::Json,
            ("jsonb", []) => PgType::Jsonb,
            _ => PgType::Other(trimmed.to_string()),
        }
    }

    /// Whether this type is backed by an implicit sequence.
    pub fn is_serial(&self) -> bool {
        matches!(
            self,
            PgType::SmallSerial | PgType::Serial | PgType::BigSerial
        )
    }
}

/// Split `character varying(255)` into `("character varying", [255])`.
///
/// Arguments may sit in the middle (`timestamp(3) with time zone`); they are
/// lifted out and the remaining words are rejoined with single spaces.
/// Returns `None` when the arguments are not unsigned integers or the
/// parentheses are unbalanced.
fn split_type_args(lower: &str) -> Option<(String, Vec<u32>)> {
    let Some(open) = lower.find('(') else {
        return Some((collapse_spaces(lower), Vec::new()));
    };
    let close = open + lower[open..].find(')')?;
    let args = lower[open + 1..close]
        .split(',')
        .map(|a| a.trim().parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    let base = format!("{} {}", &lower[..open], &lower[close + 1..]);
    Some((collapse_spaces(&base), args))
}

fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl fmt::Display for PgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgType::SmallInt => write!(f, "SMALLINT"),
            PgType::Integer => write!(f, "INTEGER"),
            PgType::BigInt => write!(f, "BIGINT"),
            PgType::SmallSerial => write!(f, "SMALLSERIAL"),
            PgType::Serial => write!(f, "SERIAL"),
            PgType::BigSerial => write!(f, "BIGSERIAL"),
            PgType::Real => write!(f, "REAL"),
            PgType::DoublePrecision => write!(f, "DOUBLE PRECISION"),
            PgType::Numeric(None) => write!(f, "NUMERIC"),
            PgType::Numeric(Some((p, s))) => write!(f, "NUMERIC({},{})", p, s),
            PgType::Boolean => write!(f, "BOOLEAN"),
            PgType::Text => write!(f, "TEXT"),
            PgType::Varchar(None) => write!(f, "VARCHAR"),
            PgType::Varchar(Some(n)) => write!(f, "VARCHAR({})", n),
            PgType::Char(None) => write!(f, "CHAR"),
            PgType::Char(Some(n)) => write!(f, "CHAR({})", n),
            PgType::Bytea => write!(f, "BYTEA"),
            PgType::Timestamp => write!(f, "TIMESTAMP"),
            PgType::Timestamptz => write!(f, "TIMESTAMPTZ"),
            PgType::Date => write!(f, "DATE"),
            PgType::Time => write!(f, "TIME"),
            PgType::Uuid => write!(f, "UUID"),
            PgType::Json => write!(f, "JSON"),
            PgType::Jsonb => write!(f, "JSONB"),
            PgType::Array(inner) => write!(f, "{}[]", inner),
            PgType::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Reconciles a store's type spellings with logical types.
///
/// An introspector hands its mapper to the comparator, so a store reporting
/// `character varying(255)` and a descriptor declaring `string(255)` end up
/// as the same [`PgType`] before they are compared.
pub trait TypeMapper: Send + Sync {
    /// Map a raw catalog type name to a logical type.
    fn map_type(&self, raw: &str) -> PgType;

    /// Canonical form of a type for comparison purposes.
    fn normalize(&self, ty: &PgType) -> PgType {
        ty.clone()
    }
}

/// Type mapping for PostgreSQL catalogs.
///
/// Serial pseudo-types fold to their integer storage type (the catalog only
/// ever reports `integer` plus a `nextval` default), an unbounded `varchar`
/// is `text`, and a bare `char` is `char(1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresTypes;

impl TypeMapper for PostgresTypes {
    fn map_type(&self, raw: &str) -> PgType {
        PgType::parse(raw)
    }

    fn normalize(&self, ty: &PgType) -> PgType {
        match ty {
            PgType::SmallSerial => PgType::SmallInt,
            PgType::Serial => PgType::Integer,
            PgType::BigSerial => PgType::BigInt,
            PgType::Varchar(None) => PgType::Text,
            PgType::Char(None) => PgType::Char(Some(1)),
            PgType::Array(inner) => PgType::Array(Box::new(self.normalize(inner))),
            PgType::Other(name) => PgType::Other(name.to_ascii_lowercase()),
            other => other.clone(),
        }
    }
}
