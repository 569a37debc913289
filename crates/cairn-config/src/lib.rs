//! Configuration for cairn.
//!
//! Two kinds of file are described here:
//!
//! - `.config/cairn.styx`, found by walking up from the working directory,
//!   with the database connection settings and the Delivery API feature
//!   flags of the content application;
//! - a schema file, a declarative list of the tables an application expects
//!   (see [`SchemaFile`]).
//!
//! Every section and most fields are optional. Missing values take the
//! defaults named by the `DEFAULT_*` constants.

mod delivery;
mod schema_file;

pub use delivery::{
    DEFAULT_ENABLED, DEFAULT_PUBLIC_ACCESS, DEFAULT_RICH_TEXT_OUTPUT_AS_JSON,
    DeliveryApiSettings, MediaSettings,
};
pub use schema_file::{ColumnSpec, ForeignKeySpec, IndexSpec, SchemaFile, TableSpec};

use camino::{Utf8Path, Utf8PathBuf};
use facet::Facet;

/// Path of the config file relative to a project directory.
pub const CONFIG_FILE: &str = ".config/cairn.styx";

/// Postgres schema introspected when none is configured.
pub const DEFAULT_PG_SCHEMA: &str = "public";

/// Top-level contents of `.config/cairn.styx`.
#[derive(Facet, Debug, Clone, PartialEq, Default)]
#[facet(default)]
pub struct Config {
    /// Delivery API feature flags.
    pub delivery_api: DeliveryApiSettings,

    /// Where the store lives.
    pub database: DatabaseSettings,
}

impl Config {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.delivery_api.validate()?;
        self.database.validate()
    }
}

/// Database connection settings.
#[derive(Facet, Debug, Clone, PartialEq)]
#[facet(default)]
pub struct DatabaseSettings {
    /// Connection URL, e.g. `postgres://app@localhost/app`.
    pub url: Option<String>,

    /// Postgres schema (namespace) holding the application's tables.
    pub schema: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            schema: DEFAULT_PG_SCHEMA.to_string(),
        }
    }
}

impl DatabaseSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.schema.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "database.schema must not be empty".to_string(),
            ));
        }
        if let Some(url) = &self.url
            && url.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "database.url is set but empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from `.config/cairn.styx`, searching up the directory tree.
pub fn load() -> Result<(Config, Utf8PathBuf), ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(e.to_string()))?;
    let cwd = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|p| ConfigError::Io(format!("working directory is not UTF-8: {}", p.display())))?;
    load_from(&cwd)
}

/// Load configuration starting from a specific directory.
pub fn load_from(start: &Utf8Path) -> Result<(Config, Utf8PathBuf), ConfigError> {
    let config_path = find_config_file(start)?;
    let content =
        std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Io(e.to_string()))?;
    let config = parse_config(&content)?;
    Ok((config, config_path))
}

/// Parse and validate the contents of a config file.
pub fn parse_config(source: &str) -> Result<Config, ConfigError> {
    let config: Config =
        facet_styx::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Read and parse a schema file.
pub fn load_schema_file(path: &Utf8Path) -> Result<SchemaFile, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {}", path, e)))?;
    parse_schema_file(&content)
}

/// Parse the contents of a schema file.
pub fn parse_schema_file(source: &str) -> Result<SchemaFile, ConfigError> {
    facet_styx::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Find `.config/cairn.styx` by searching up the directory tree.
fn find_config_file(start: &Utf8Path) -> Result<Utf8PathBuf, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Ok(config_path);
        }

        if !current.pop() {
            return Err(ConfigError::NotFound);
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// No `.config/cairn.styx` found in any parent directory
    NotFound,
    /// I/O error reading a file
    Io(String),
    /// Parse error in a Styx file
    Parse(String),
    /// The file parsed but its values are inconsistent
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound => {
                write!(
                    f,
                    "No {} found in current directory or any parent",
                    CONFIG_FILE
                )
            }
            ConfigError::Io(e) => write!(f, "Failed to read configuration: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse configuration: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
