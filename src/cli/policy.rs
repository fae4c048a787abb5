use super::ui::{self, StyleType};
use crate::core::policy::Policy;
use crate::core::snapshot::SnapshotEngine;
use anyhow::{Context, Result};
use comfy_table::Cell;
use rust_decimal::Decimal;
use std::path::Path;

/// Validates and stores the policy in `path`. An invalid file leaves the
/// stored policy untouched.
pub async fn set(engine: &SnapshotEngine, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let policy: Policy = serde_yaml::from_str(&content)
        .with_context(|| format!("Invalid policy in {}", path.display()))?;

    engine.set_policy(&policy).await?;
    println!("{}", ui::style_text("Policy updated", StyleType::TotalLabel));
    display_policy(&policy);
    Ok(())
}

pub async fn show(engine: &SnapshotEngine) -> Result<()> {
    let policy = engine.policy().await?;
    display_policy(&policy);
    Ok(())
}

fn display_policy(policy: &Policy) {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Sleeve"),
        ui::header_cell("Target"),
        ui::header_cell("Band"),
        ui::header_cell("Range"),
    ]);

    for target in policy.targets() {
        let low = (target.weight - target.band).max(Decimal::ZERO);
        let high = (target.weight + target.band).min(Decimal::ONE);
        table.add_row(vec![
            Cell::new(target.sleeve),
            ui::weight_cell(target.weight),
            ui::weight_cell(target.band),
            Cell::new(format!(
                "{} - {}",
                ui::format_weight(low),
                ui::format_weight(high)
            )),
        ]);
    }

    println!("\n{}", ui::style_text("Target Allocation", StyleType::Title));
    println!("{table}");
}
