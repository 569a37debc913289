use cairn::{DescriptorError, PgIntrospector, SchemaDescriptor, SchemaValidator};
use cairn_config::{Config, ConfigError, DEFAULT_PG_SCHEMA};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use deadpool_postgres::{CreatePoolError, Runtime};
use std::process::ExitCode;
use tokio_postgres::NoTls;

mod output;

use output::Printer;

/// Check a Postgres schema against the one an application expects.
#[derive(Parser, Debug)]
#[command(name = "cairn", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a database against a schema file
    Validate {
        /// Schema file (styx)
        #[arg(short, long)]
        schema: Utf8PathBuf,

        /// Database connection URL
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,

        /// Postgres schema holding the tables [default: database.schema, or public]
        #[arg(long)]
        pg_schema: Option<String>,

        /// Application version, for reports
        #[arg(long, default_value = "unversioned")]
        app_version: String,
    },
    /// Print tables in dependency order
    Order {
        /// Schema file (styx)
        #[arg(short, long)]
        schema: Utf8PathBuf,
    },
    /// Print the SQL that creates the schema
    Sql {
        /// Schema file (styx)
        #[arg(short, long)]
        schema: Utf8PathBuf,
    },
    /// Show the effective configuration
    Config,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Descriptor(#[from] DescriptorError),

    #[error("{0}")]
    Cairn(#[from] cairn::Error),

    #[error("invalid database URL: {0}")]
    Pool(#[from] CreatePoolError),

    #[error("no database URL: pass --database-url, set DATABASE_URL, or set database.url in {}", cairn_config::CONFIG_FILE)]
    NoDatabaseUrl,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let printer = Printer::detect();

    let result = match cli.command {
        Command::Validate {
            schema,
            database_url,
            pg_schema,
            app_version,
        } => validate(&printer, &schema, database_url, pg_schema, app_version).await,
        Command::Order { schema } => load_descriptor(&schema).map(|descriptor| {
            print!("{}", printer.table_order(&descriptor.table_names()));
            ExitCode::SUCCESS
        }),
        Command::Sql { schema } => load_descriptor(&schema).map(|descriptor| {
            println!("{}", cairn::schema::schema_to_sql(&descriptor));
            ExitCode::SUCCESS
        }),
        Command::Config => show_config(&printer),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("cairn: {err}");
            ExitCode::from(2)
        }
    }
}

async fn validate(
    printer: &Printer,
    schema: &Utf8Path,
    database_url: Option<String>,
    pg_schema: Option<String>,
    app_version: String,
) -> Result<ExitCode, CliError> {
    let descriptor = load_descriptor(schema)?;
    let config = load_config()?;
    let url = database_url
        .or_else(|| config.as_ref().and_then(|c| c.database.url.clone()))
        .ok_or(CliError::NoDatabaseUrl)?;
    let pg_schema = pg_schema
        .or_else(|| config.map(|c| c.database.schema))
        .unwrap_or_else(|| DEFAULT_PG_SCHEMA.to_string());

    tracing::info!(
        database = %mask_password(&url),
        pg_schema = %pg_schema,
        tables = descriptor.len(),
        "validating"
    );

    let mut pool_config = deadpool_postgres::Config::new();
    pool_config.url = Some(url);
    let pool = pool_config.create_pool(Some(Runtime::Tokio1), NoTls)?;

    let validator = SchemaValidator::new(PgIntrospector::new(pool).in_schema(pg_schema), app_version);
    let result = validator.validate(&descriptor).await?;
    print!("{}", printer.report(&result));

    Ok(if result.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn load_descriptor(path: &Utf8Path) -> Result<SchemaDescriptor, CliError> {
    let file = cairn_config::load_schema_file(path)?;
    Ok(SchemaDescriptor::try_from(&file)?)
}

/// The config file is optional; a broken one is not.
fn load_config() -> Result<Option<Config>, CliError> {
    match cairn_config::load() {
        Ok((config, path)) => {
            tracing::debug!(path = %path, "loaded config");
            Ok(Some(config))
        }
        Err(ConfigError::NotFound) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn show_config(printer: &Printer) -> Result<ExitCode, CliError> {
    let config = match cairn_config::load() {
        Ok((config, path)) => {
            println!("config: {path}");
            config
        }
        Err(ConfigError::NotFound) => {
            println!("config: none found, showing defaults");
            Config::default()
        }
        Err(err) => return Err(err.into()),
    };

    println!();
    print!("{}", printer.delivery_api(&config.delivery_api));
    println!();
    println!("database");
    println!(
        "  url:    {}",
        config
            .database
            .url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "not set".to_string())
    );
    println!("  schema: {}", config.database.schema);
    Ok(ExitCode::SUCCESS)
}

/// Mask the password in a database URL for display.
fn mask_password(url: &str) -> String {
    let Some(start) = url.find("://").map(|i| i + 3) else {
        return url.to_string();
    };
    let Some(at) = url[start..].rfind('@').map(|i| start + i) else {
        return url.to_string();
    };
    match url[start..at].find(':') {
        Some(colon) => format!("{}:***{}", &url[..start + colon], &url[at..]),
        None => url.to_string(),
    }
}
