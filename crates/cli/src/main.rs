mod commands;
mod error;
mod logging;

use clap::{Parser, Subcommand};
use console::style;
use migshift_core::{MigrateConfig, MigrateConfigTrait};
use migshift_engine::Version;
use std::path::PathBuf;
use std::process::ExitCode;

use commands::{config, interactive, migrate, Context};
use error::CliError;

#[derive(Parser)]
#[command(name = "migshift")]
#[command(about = "Inspect, run and reorder timestamped SQL migrations")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./migshift.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Migrations directory
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Keep the ledger in a JSON file instead of PostgreSQL
    #[arg(long, global = true)]
    ledger_file: Option<PathBuf>,

    /// Update the ledger without executing SQL
    #[arg(long, global = true)]
    fake: bool,

    /// Confirm destructive commands in production
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    /// Debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every migration and whether it is applied
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply one migration
    Up { version: Version },

    /// Revert one migration
    Down { version: Version },

    /// Revert and re-apply one migration
    Redo { version: Version },

    /// Apply pending migrations up to and including VERSION (all when omitted)
    Migrate { version: Option<Version> },

    /// Revert applied migrations above VERSION (the latest one when omitted)
    Rollback { version: Option<Version> },

    /// Give a migration a version above every other one
    BringToTop {
        version: Version,

        /// Revert at the old version and re-apply at the new one
        #[arg(long, conflicts_with = "no_rerun")]
        rerun: bool,

        /// Keep the applied state without re-running
        #[arg(long)]
        no_rerun: bool,
    },

    /// Create a new migration script
    Create {
        /// Migration name, e.g. "add users"
        name: String,
    },

    /// Compare the ledger with the scripts on disk
    Check,

    /// Browse migrations and act on them
    Interactive,

    /// Show the resolved configuration
    Config,
}

impl Commands {
    /// `--rerun`/`--no-rerun` as a preset decision
    fn rerun_preset(rerun: bool, no_rerun: bool) -> Option<bool> {
        match (rerun, no_rerun) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<MigrateConfig, CliError> {
    let mut config = MigrateConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.dir {
        config = config.with_migrations_dir(dir);
    }
    if let Some(path) = &cli.ledger_file {
        config = config.with_ledger_file(path);
    }
    if cli.verbose {
        config = config.with_log_level("debug");
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = resolve_config(&cli)?;

    // `config` shows settings even when they do not validate
    if let Commands::Config = cli.command {
        config::show(&config);
        return Ok(());
    }

    config.validate()?;
    logging::init(&config.log_level, cli.verbose, cli.log_json)?;
    tracing::debug!(
        "Environment {}, ledger {}",
        config.environment,
        config.ledger
    );

    let ctx = Context::connect(config, cli.fake, cli.yes).await?;

    match cli.command {
        Commands::Status { json } => migrate::status(&ctx, json).await,
        Commands::Up { version } => migrate::up(&ctx, version).await,
        Commands::Down { version } => migrate::down(&ctx, version).await,
        Commands::Redo { version } => migrate::redo(&ctx, version).await,
        Commands::Migrate { version } => migrate::migrate(&ctx, version).await,
        Commands::Rollback { version } => migrate::rollback(&ctx, version).await,
        Commands::BringToTop {
            version,
            rerun,
            no_rerun,
        } => migrate::bring_to_top(&ctx, version, Commands::rerun_preset(rerun, no_rerun)).await,
        Commands::Create { name } => migrate::create(&ctx, &name),
        Commands::Check => migrate::check(&ctx).await,
        Commands::Interactive => interactive::run(&ctx).await,
        Commands::Config => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {}", style("error:").red().bold(), err);
            if let Some(hint) = err.hint() {
                eprintln!("  {}", style(hint).dim());
            }
            ExitCode::from(err.exit_code())
        }
    }
}
