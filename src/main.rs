use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use sleeve::core::log::init_logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Load holdings or NAV records from a YAML file
    #[command(subcommand)]
    Import(ImportCommands),
    /// Manage the target allocation
    #[command(subcommand)]
    Policy(PolicyCommands),
    /// Fetch FX rates against the base currency
    SyncFx {
        /// Rate date (YYYY-MM-DD), latest when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Value the portfolio now and store it as the current snapshot
    Refresh,
    /// Record the end-of-day snapshot for a date
    Close {
        /// Close date (YYYY-MM-DD), today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Replace an existing snapshot for the date
        #[arg(long)]
        force: bool,
    },
    /// Show the most recent snapshot with drift against the policy
    Latest,
    /// List holdings of the most recent snapshot by value
    Positions {
        /// Write CSV to stdout instead of a table
        #[arg(long)]
        csv: bool,
    },
    /// List end-of-day snapshots in a date range
    History {
        /// First date, 30 days before --to when omitted
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last date, today when omitted
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Suggest trades for sleeves outside their bands
    Rebalance,
}

#[derive(Subcommand)]
enum ImportCommands {
    /// Import holdings, replacing the current set unless --append is given
    Holdings {
        file: PathBuf,
        /// Upsert by account and instrument instead of replacing
        #[arg(long)]
        append: bool,
    },
    /// Import NAV records
    Nav { file: PathBuf },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// Validate and store a policy file
    Set { file: PathBuf },
    /// Show the stored policy
    Show,
}

impl From<Commands> for sleeve::AppCommand {
    fn from(cmd: Commands) -> sleeve::AppCommand {
        match cmd {
            Commands::Import(ImportCommands::Holdings { file, append }) => {
                sleeve::AppCommand::ImportHoldings { file, append }
            }
            Commands::Import(ImportCommands::Nav { file }) => sleeve::AppCommand::ImportNav { file },
            Commands::Policy(PolicyCommands::Set { file }) => sleeve::AppCommand::SetPolicy { file },
            Commands::Policy(PolicyCommands::Show) => sleeve::AppCommand::ShowPolicy,
            Commands::SyncFx { date } => sleeve::AppCommand::SyncFx { date },
            Commands::Refresh => sleeve::AppCommand::Refresh,
            Commands::Close { date, force } => sleeve::AppCommand::Close { date, force },
            Commands::Latest => sleeve::AppCommand::Latest,
            Commands::Positions { csv } => sleeve::AppCommand::Positions { csv },
            Commands::History { from, to } => {
                let to = to.unwrap_or_else(|| Utc::now().date_naive());
                let from = from.unwrap_or(to - Duration::days(30));
                sleeve::AppCommand::History { from, to }
            }
            Commands::Rebalance => sleeve::AppCommand::Rebalance,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => sleeve::cli::setup::setup(),
        Some(cmd) => sleeve::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
