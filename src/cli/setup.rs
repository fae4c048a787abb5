use super::ui::{self, StyleType};
use crate::core::config::AppConfig;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

const EXAMPLE_CONFIG: &str = include_str!("../../docs/example_config.yaml");

/// Where `setup` put things.
#[derive(Debug)]
pub struct SetupPaths {
    pub config: PathBuf,
    pub data: PathBuf,
}

/// Writes the example config to the platform config dir and creates the data dir.
pub fn setup() -> Result<()> {
    let config = AppConfig::default();
    let paths = setup_at_path(AppConfig::default_config_path()?, config.data_path()?)?;

    println!(
        "{} {}",
        ui::style_text("Config:", StyleType::TotalLabel),
        paths.config.display()
    );
    println!(
        "{} {}",
        ui::style_text("Data:", StyleType::TotalLabel),
        paths.data.display()
    );
    println!(
        "\n{}",
        ui::style_text(
            "Next: sleeve import holdings <file>, sleeve sync-fx, sleeve refresh",
            StyleType::Subtle
        )
    );
    Ok(())
}

pub fn setup_at_path<P: AsRef<Path>>(path: P, data: PathBuf) -> Result<SetupPaths> {
    let path = path.as_ref();
    if path.exists() {
        bail!("Configuration file already exists at {}", path.display());
    }

    for dir in path.parent().into_iter().chain([data.as_path()]) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(SetupPaths {
        config: path.to_path_buf(),
        data,
    })
}
