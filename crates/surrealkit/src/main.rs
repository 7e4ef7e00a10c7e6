//! surrealkit CLI
//!
//! Command-line tool for generating and applying SurrealDB migrations.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use surrealkit::config::{load_env_file, parse_backoff_factor, DEFAULT_ROOT};
use surrealkit::prelude::*;
use surrealkit::writer::validate_slug;

/// Schema-diffing migrations for SurrealDB.
#[derive(Parser)]
#[command(name = "surrealkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directory holding `schema/` and `migrations/`.
    #[arg(long, env = "SURREALKIT_ROOT", default_value = DEFAULT_ROOT)]
    root: PathBuf,

    /// Path of the `surreal` binary.
    #[arg(long, env = "SURREALKIT_BINARY", default_value = "surreal")]
    surreal_binary: PathBuf,

    /// Readiness probes before giving up on a database.
    #[arg(long, default_value_t = 10)]
    connect_attempts: u32,

    /// Wait before the first readiness probe, in milliseconds.
    #[arg(long, default_value_t = 200)]
    connect_delay_ms: u64,

    /// Multiplier applied to the wait after each failed probe.
    #[arg(long, default_value_t = 1.5, value_parser = parse_backoff_factor)]
    connect_backoff: f64,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.connect_attempts,
            Duration::from_millis(self.connect_delay_ms),
            self.connect_backoff,
        )
    }
}

/// Target database settings.
#[derive(Args)]
struct ConnectionArgs {
    /// Database endpoint; `http://` is assumed when no scheme is given.
    #[arg(long, env = "SURREALKIT_ENDPOINT")]
    endpoint: String,

    /// Namespace.
    #[arg(long, env = "SURREAL_NAMESPACE")]
    namespace: String,

    /// Database.
    #[arg(long, env = "SURREAL_DATABASE")]
    database: String,

    /// User name.
    #[arg(long, env = "SURREAL_USER")]
    user: String,

    /// Password.
    #[arg(long, env = "SURREAL_PASS", hide_env_values = true)]
    password: String,
}

impl From<ConnectionArgs> for ConnectionConfig {
    fn from(args: ConnectionArgs) -> Self {
        Self::new(
            &args.endpoint,
            args.namespace,
            args.database,
            args.user,
            args.password,
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty migration to fill in by hand.
    New {
        /// Migration name (letters, digits, `_` and `-`).
        name: String,
    },

    /// Generate a migration from the difference between migrations and schema.
    Diff {
        /// Migration name (letters, digits, `_` and `-`).
        name: String,

        /// Print the statements without writing a file.
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply pending migrations to the target database.
    Migrate {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Show which migrations have been applied to the target database.
    Status {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Connection settings may live in a `.env` file.
    load_env_file(None);
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let layout = ProjectLayout::new(&cli.root);
    layout.ensure_dirs()?;
    let retry = cli.retry_policy();

    match cli.command {
        Commands::New { name } => {
            let writer = MigrationWriter::new(layout.migrations_dir());
            writer.create_manual(&name, Utc::now())?;
        }

        Commands::Diff { name, dry_run } => {
            validate_slug(&name)?;

            let provider = EphemeralSnapshotProvider::new(&cli.surreal_binary, retry);
            let changes = detect_schema_changes(&provider, &layout).await?;

            if dry_run {
                info!("Dry run mode - no file will be written.");
                if changes.is_empty() {
                    info!("Schema is up to date.");
                } else {
                    println!("{}", render_statements(&changes));
                }
            } else {
                let writer = MigrationWriter::new(layout.migrations_dir());
                writer.create_schema_migration(&name, Utc::now(), &changes)?;
            }
        }

        Commands::Migrate { connection } => {
            let client = SurrealCli::new(&cli.surreal_binary, connection.into());
            client.connect(&retry).await?;

            let executor =
                MigrationExecutor::new(client.clone(), client, layout.migrations_dir());
            if let ApplyOutcome::Applied(applied) = executor.apply_pending().await? {
                info!(count = applied.len(), "Migrations applied.");
            }
        }

        Commands::Status { connection } => {
            let client = SurrealCli::new(&cli.surreal_binary, connection.into());
            client.connect(&retry).await?;

            let executor =
                MigrationExecutor::new(client.clone(), client, layout.migrations_dir());
            let status = executor.status().await?;

            if status.is_empty() {
                info!("No migrations found.");
            } else {
                println!("\nMigrations:");
                println!("{:-<60}", "");
                for migration in &status {
                    let mark = if migration.applied { "X" } else { " " };
                    println!(" [{mark}] {}", migration.name);
                }
                println!();
            }
        }
    }

    Ok(())
}
