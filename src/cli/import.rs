use super::ui::{self, StyleType};
use crate::core::holding::{Holding, NavRecord};
use crate::core::snapshot::SnapshotEngine;
use anyhow::{Context, Result};
use serde::{Deserialize, de::DeserializeOwned};
use std::path::Path;

#[derive(Deserialize)]
struct HoldingsFile {
    holdings: Vec<Holding>,
}

#[derive(Deserialize)]
struct NavFile {
    nav: Vec<NavRecord>,
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn read_holdings(path: &Path) -> Result<Vec<Holding>> {
    Ok(read_yaml::<HoldingsFile>(path)?.holdings)
}

pub fn read_nav(path: &Path) -> Result<Vec<NavRecord>> {
    Ok(read_yaml::<NavFile>(path)?.nav)
}

pub async fn holdings(engine: &SnapshotEngine, path: &Path, append: bool) -> Result<()> {
    let batch = read_holdings(path)?;
    let count = if append {
        engine.append_holdings(batch).await?
    } else {
        engine.replace_holdings(batch).await?
    };

    let verb = if append { "Upserted" } else { "Replaced holdings with" };
    println!(
        "{} {}",
        ui::style_text(verb, StyleType::TotalLabel),
        ui::style_text(&format!("{count} records"), StyleType::TotalValue)
    );
    Ok(())
}

pub async fn nav(engine: &SnapshotEngine, path: &Path) -> Result<()> {
    let count = engine.upsert_nav(read_nav(path)?).await?;
    println!(
        "{} {}",
        ui::style_text("Stored", StyleType::TotalLabel),
        ui::style_text(&format!("{count} NAV records"), StyleType::TotalValue)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::holding::AssetClass;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_read_holdings_file() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"
holdings:
  - account: Broker
    name: Apple
    instrument: AAPL
    asset_class: stock
    currency: USD
    quantity: 15
  - account: Bank
    name: Savings
    instrument: "CASH:EUR"
    asset_class: Cash
    currency: EUR
    quantity: "8000.50"
    book_cost: 8000
"#
        )?;

        let holdings = read_holdings(file.path())?;
        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].asset_class, AssetClass::Equity);
        assert!(holdings[0].book_cost.is_none());
        assert_eq!(holdings[1].quantity, dec!(8000.50));
        assert_eq!(holdings[1].book_cost, Some(dec!(8000)));
        Ok(())
    }

    #[test]
    fn test_read_nav_file() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"
nav:
  - date: "2024-05-03"
    instrument: "LEND:MINTOS"
    nav: "4210.77"
    currency: EUR
"#
        )?;

        let records = read_nav(file.path())?;
        assert_eq!(records[0].nav, dec!(4210.77));
        assert_eq!(records[0].date.to_string(), "2024-05-03");
        Ok(())
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = read_holdings(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
