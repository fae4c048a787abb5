use super::ui::{self, StyleType};
use crate::core::snapshot::SnapshotEngine;
use anyhow::Result;
use chrono::NaiveDate;

pub async fn sync(engine: &SnapshotEngine, date: Option<NaiveDate>) -> Result<()> {
    let pb = ui::new_spinner("Syncing FX rates...");
    let result = engine.sync_fx(date).await;
    pb.finish_and_clear();

    let count = result?;
    println!(
        "{} {}",
        ui::style_text(
            &format!("Stored {count} FX rates against"),
            StyleType::TotalLabel
        ),
        ui::style_text(engine.base_currency(), StyleType::TotalValue)
    );
    Ok(())
}
