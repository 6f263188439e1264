//! logtable: write and inspect log tables whose columns follow configuration.

use anyhow::Result;
use clap::{Parser, Subcommand};
use logtable_logging::{init_logging, LogConfig};
use logtable_sink::{Level, TimeEncoding};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

mod cli;

use cli::config::{self, Overrides};

#[derive(Parser, Debug)]
#[command(
    name = "logtable",
    version,
    about = "Store structured log records in a SQLite table with configurable columns"
)]
struct Cli {
    /// Database file or sqlite: URL (default: ~/.logtable/logtable.db)
    #[arg(long, global = true, env = "LOGTABLE_DB")]
    db: Option<String>,

    /// Log table name (default: log)
    #[arg(long, global = true, env = "LOGTABLE_TABLE")]
    table: Option<String>,

    /// Additional column; repeat for several. Replaces the configured list.
    #[arg(long = "column", global = true)]
    columns: Vec<String>,

    /// Config file (default: ~/.logtable/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Time column encoding: unix_seconds, unix_millis or datetime
    #[arg(long, global = true)]
    time_encoding: Option<TimeEncoding>,

    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the table if needed and bring its columns in line with configuration
    Sync {
        /// Show pending column changes without applying them
        #[arg(long)]
        dry_run: bool,
    },

    /// Store one record
    Write {
        /// Record message
        #[arg(short, long)]
        message: String,

        /// Record level (name or numeric value)
        #[arg(short, long, default_value = "info")]
        level: Level,

        /// Record channel
        #[arg(short, long, default_value = "logtable")]
        channel: String,

        /// Payload field as key=value; repeat for several
        #[arg(short = 'f', long = "field")]
        fields: Vec<String>,

        /// Write only the columns the table already has; never alter it
        #[arg(long)]
        skip_sync: bool,
    },

    /// List the live columns of the table
    Columns,

    /// Show the most recent records
    Tail {
        /// Number of records
        #[arg(short = 'n', long, default_value = "20")]
        rows: usize,

        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },
}

fn run_command(cli: Cli) -> Result<()> {
    let file = config::load(cli.config.as_deref())?;
    let overrides = Overrides {
        database: cli.db,
        table: cli.table,
        columns: cli.columns,
        time_encoding: cli.time_encoding,
    };
    let resolved = config::resolve(file, &overrides)?;
    debug!(database = %resolved.database, table = %resolved.sink.table, "Resolved configuration");

    match cli.command {
        Commands::Sync { dry_run } => cli::sync::run(&resolved, dry_run),
        Commands::Write {
            message,
            level,
            channel,
            fields,
            skip_sync,
        } => cli::write::run(
            &resolved,
            cli::write::WriteArgs {
                message: &message,
                level,
                channel: &channel,
                fields: &fields,
                skip_sync,
            },
        ),
        Commands::Columns => cli::columns::run(&resolved),
        Commands::Tail { rows, json } => cli::tail::run(&resolved, rows, json),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::new("logtable");
    log_config.verbose = cli.verbose;
    log_config.quiet = matches!(cli.command, Commands::Tail { json: true, .. });
    if let Err(err) = init_logging(log_config) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_write_with_fields() {
        let cli = Cli::try_parse_from([
            "logtable",
            "--db",
            "sqlite::memory:",
            "--column",
            "username",
            "--column",
            "userid",
            "write",
            "-m",
            "login",
            "-l",
            "warning",
            "-f",
            "username=ada",
            "-f",
            "userid=42",
        ])
        .unwrap();

        assert_eq!(cli.columns, vec!["username", "userid"]);
        match cli.command {
            Commands::Write { level, fields, .. } => {
                assert_eq!(level, Level::Warning);
                assert_eq!(fields.len(), 2);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_work_after_subcommand() {
        let cli = Cli::try_parse_from([
            "logtable",
            "tail",
            "-n",
            "5",
            "--time-encoding",
            "datetime",
        ])
        .unwrap();
        assert_eq!(cli.time_encoding, Some(TimeEncoding::Datetime));
        assert!(matches!(cli.command, Commands::Tail { rows: 5, json: false }));
    }
}
