//! preflight - pre-execution safety analysis for MySQL schema changes
//! and bulk writes.

mod analyze;
mod classify;
mod cli;
mod config;
mod db;
mod error;
mod render;
mod topology;

use anyhow::Context;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use analyze::{AnalysisInput, AnalysisOutcome};
use classify::{ParsedStatement, StatementClassifier, StatementKind};
use cli::Cli;
use config::{Config, ConnectionConfig};
use db::DatabaseClient;
use render::{OutputFormat, Report};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    match run(&cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> anyhow::Result<i32> {
    let format = cli
        .parse_output_format()
        .map_err(anyhow::Error::msg)?;

    let classifier = StatementClassifier::new();
    let statement = classifier.classify(&cli.statement)?;
    debug!(
        operation = %statement.operation,
        table = statement.table.as_deref().unwrap_or("(none)"),
        "statement classified"
    );

    // Out-of-scope statements are refused before any connection is made.
    if let Some(reason) = analyze::refusal_reason(&statement) {
        println!("{}", Report::refusal(&reason).render(format)?);
        return Ok(0);
    }

    let config_path = cli.config_path();
    debug!("loading config from {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;
    let connection = resolve_connection(cli, &config)?;
    info!("connecting to {}", connection.display_string());

    let client = db::connect(&connection).await?;

    // The connection is closed on every path, including errors.
    let outcome =
        analyze_with_client(cli, &config, &connection, &statement, client.as_ref(), format).await;
    if let Err(e) = client.close().await {
        warn!("error closing connection: {e}");
    }
    let report = outcome?;

    println!("{report}");
    Ok(0)
}

/// Runs the connected part of the pipeline and renders the result.
async fn analyze_with_client(
    cli: &Cli,
    config: &Config,
    connection: &ConnectionConfig,
    statement: &ParsedStatement,
    client: &dyn DatabaseClient,
    format: OutputFormat,
) -> anyhow::Result<String> {
    let version = db::fetch_server_version(client).await?;
    debug!(version = %version, "server version");

    let topology = topology::detect(client, &version).await?;
    debug!(topology = %topology.topology, "topology detected");

    let database = statement
        .database
        .clone()
        .or_else(|| connection.database.clone())
        .context("no schema selected: qualify the table name or pass --database")?;

    let metadata = match &statement.table {
        Some(table) => db::fetch_table_metadata(client, &database, table).await?,
        // Tablespace maintenance has no table binding; analysis proceeds
        // on an empty record.
        None => db::TableMetadata {
            database: database.clone(),
            ..db::TableMetadata::default()
        },
    };
    debug!(
        rows = metadata.table_rows,
        bytes = metadata.total_bytes(),
        "table metadata read"
    );

    let estimate = if statement.kind == StatementKind::Dml && statement.has_filter {
        Some(db::estimate_rows(client, statement, &metadata).await)
    } else {
        None
    };

    let mut options = config.analysis.clone();
    if let Some(chunk_size) = cli.chunk_size {
        options.chunk_size = chunk_size;
    }

    let outcome = analyze::analyze(&AnalysisInput {
        statement,
        metadata: &metadata,
        topology: &topology,
        version: &version,
        estimate,
        options: &options,
    });

    if !cli.no_script {
        if let AnalysisOutcome::Plan(result) = &outcome {
            if let Some(script) = &result.script {
                write_script(&script.suggested_path, &script.body)?;
                info!("chunked script written to {}", script.suggested_path);
            }
        }
    }

    Ok(Report::new(&version, &topology, &outcome).render(format)?)
}

fn write_script(path: &str, body: &str) -> anyhow::Result<()> {
    std::fs::write(path, body).with_context(|| format!("failed to write script {path}"))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("failed to mark script {path} executable"))?;
    }
    Ok(())
}

/// Resolves the final connection configuration with precedence: CLI
/// arguments, then the named connection, then the config default, then
/// environment variables.
fn resolve_connection(cli: &Cli, config: &Config) -> anyhow::Result<ConnectionConfig> {
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                anyhow::bail!("connection '{name}' not found in config file");
            }
        }
    }

    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    // Fall back to localhost refined by the mysql client's env vars.
    let mut connection = connection.unwrap_or_default();
    connection.apply_env_defaults();
    Ok(connection)
}
