use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tidepool_connection::{ConnectionManager, ManagerConfig};
use tidepool_driver_mysql::MySqlConnector;

mod commands;
mod output;

#[derive(Parser)]
#[command(
    name = "tidepool",
    about = "Keep connection counts on a shared MySQL server in check",
    version,
    propagate_version = true
)]
struct Cli {
    /// Manager configuration file
    #[arg(short, long, env = "TIDEPOOL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log line format
    #[arg(long, env = "TIDEPOOL_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Trim idle connections and reap sessions left sleeping on the server
    Flush,
    /// Print the server's connection ceiling and current usage
    Usage,
    /// Run one statement through the manager and print its rows
    Query {
        /// SQL to run
        sql: String,
    },
    /// Flush on an interval until interrupted
    Watch {
        /// Seconds between flushes
        #[arg(short, long, default_value_t = 30)]
        interval: u64,
    },
}

/// Logs go to stderr so command output on stdout stays machine-readable
fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tidepool=info,warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// `--config`, or `<config dir>/tidepool/config.toml`
fn config_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => dirs::config_dir()
            .map(|dir| dir.join("tidepool").join("config.toml"))
            .context("no --config given and no user config directory found"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let path = config_path(cli.config)?;
    let config = ManagerConfig::from_file(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    let connector = MySqlConnector::new(config.connection());
    let manager = ConnectionManager::new(config, connector).context("invalid configuration")?;

    let result = match cli.command {
        Commands::Flush => commands::flush(&manager, cli.json).await,
        Commands::Usage => commands::usage(&manager, cli.json).await,
        Commands::Query { sql } => commands::query(&manager, &sql, cli.json).await,
        Commands::Watch { interval } => commands::watch(&manager, interval, cli.json).await,
    };

    if let Err(err) = manager.end().await {
        tracing::warn!(error = %err, "failed to close connections cleanly");
    }
    result
}
