pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::snapshot::SnapshotEngine;
use anyhow::Result;
use chrono::NaiveDate;
use std::path::PathBuf;
use store::KeyValueStore;
use store::ledger::Ledger;
use tracing::{debug, info};

pub enum AppCommand {
    ImportHoldings { file: PathBuf, append: bool },
    ImportNav { file: PathBuf },
    SetPolicy { file: PathBuf },
    ShowPolicy,
    SyncFx { date: Option<NaiveDate> },
    Refresh,
    Close { date: Option<NaiveDate>, force: bool },
    Latest,
    Positions { csv: bool },
    History { from: NaiveDate, to: NaiveDate },
    Rebalance,
}

/// Wires the store, the provider chain and the FX source into an engine.
pub fn build_engine(config: &AppConfig) -> Result<SnapshotEngine> {
    let data_path = config.data_path()?;
    let store = KeyValueStore::open(&data_path)?;
    let ledger = Ledger::new(&store)?;
    let chain = providers::build_chain(config)?;
    let fx_source = providers::build_fx_source(config)?;

    Ok(SnapshotEngine::new(
        chain,
        fx_source,
        ledger,
        config.valuation_settings(),
    ))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Sleeve starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let engine = build_engine(&config)?;

    match command {
        AppCommand::ImportHoldings { file, append } => {
            cli::import::holdings(&engine, &file, append).await
        }
        AppCommand::ImportNav { file } => cli::import::nav(&engine, &file).await,
        AppCommand::SetPolicy { file } => cli::policy::set(&engine, &file).await,
        AppCommand::ShowPolicy => cli::policy::show(&engine).await,
        AppCommand::SyncFx { date } => cli::fx::sync(&engine, date).await,
        AppCommand::Refresh => cli::snapshot::refresh(&engine).await,
        AppCommand::Close { date, force } => cli::snapshot::close(&engine, date, force).await,
        AppCommand::Latest => cli::snapshot::latest(&engine).await,
        AppCommand::Positions { csv } => cli::positions::run(&engine, csv).await,
        AppCommand::History { from, to } => cli::snapshot::history(&engine, from, to).await,
        AppCommand::Rebalance => cli::rebalance::run(&engine).await,
    }
}
