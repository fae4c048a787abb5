use super::ui::{self, StyleType};
use crate::core::price::Freshness;
use crate::core::snapshot::SnapshotEngine;
use crate::core::valuation::{HoldingStatus, ValuationSnapshot};
use anyhow::Result;
use comfy_table::{Cell, Color, Table};
use rust_decimal::Decimal;
use std::io::Write;

/// Per-holding view of the latest snapshot, as a table or as CSV on stdout.
pub async fn run(engine: &SnapshotEngine, csv: bool) -> Result<()> {
    let snapshot = engine.latest_snapshot().await?;
    if csv {
        return write_csv(&snapshot, std::io::stdout().lock());
    }

    let title = format!("Positions {} ({})", snapshot.date, snapshot.kind);
    println!("\n{}", ui::style_text(&title, StyleType::Title));
    println!("{}", positions_table(&snapshot));
    println!(
        "{} {}",
        ui::style_text("Total:", StyleType::TotalLabel),
        ui::style_text(
            &ui::format_money(snapshot.total, &snapshot.base_currency),
            StyleType::TotalValue
        )
    );
    Ok(())
}

/// Holdings by value, largest first, with their share of the total.
pub fn positions_table(snapshot: &ValuationSnapshot) -> Table {
    let currency = snapshot.base_currency.as_str();
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Account"),
        ui::header_cell("Holding"),
        ui::header_cell("Class"),
        ui::header_cell("Quantity"),
        ui::header_cell("Price"),
        ui::header_cell("Source"),
        ui::header_cell("Value"),
        ui::header_cell("Weight"),
    ]);

    for holding in snapshot.positions() {
        let mut row = vec![
            Cell::new(&holding.account),
            Cell::new(format!("{} ({})", holding.name, holding.instrument)),
            Cell::new(holding.asset_class),
            Cell::new(holding.quantity.normalize()),
        ];
        match &holding.status {
            HoldingStatus::Priced(priced) => {
                let source = Cell::new(format!("{} / {}", priced.price_source, priced.freshness));
                row.push(ui::money_cell(priced.price, &priced.price_currency));
                row.push(if priced.freshness == Freshness::Stale {
                    source.fg(Color::Yellow)
                } else {
                    source
                });
                row.push(ui::money_cell(priced.value, currency));
                row.push(ui::weight_cell(priced.weight));
            }
            HoldingStatus::Unpriced(_) => {
                row.extend((0..4).map(|_| ui::na_cell(true)));
            }
        }
        table.add_row(row);
    }
    table
}

fn fixed2(value: Decimal) -> String {
    format!("{:.2}", ui::round2(value))
}

/// Writes one row per holding, ordered like the table. Unpriced holdings
/// carry their reason and leave the price columns empty.
pub fn write_csv<W: Write>(snapshot: &ValuationSnapshot, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([
        "Account".to_string(),
        "Name".to_string(),
        "Instrument".to_string(),
        "Asset Class".to_string(),
        "Quantity".to_string(),
        "Price".to_string(),
        "Price Currency".to_string(),
        "Source".to_string(),
        "Freshness".to_string(),
        format!("Value ({})", snapshot.base_currency),
        "Weight %".to_string(),
        "Unpriced Reason".to_string(),
    ])?;

    for holding in snapshot.positions() {
        let mut record = vec![
            holding.account.clone(),
            holding.name.clone(),
            holding.instrument.clone(),
            holding.asset_class.to_string(),
            holding.quantity.normalize().to_string(),
        ];
        match &holding.status {
            HoldingStatus::Priced(priced) => record.extend([
                priced.price.normalize().to_string(),
                priced.price_currency.clone(),
                priced.price_source.clone(),
                priced.freshness.to_string(),
                fixed2(priced.value),
                fixed2(priced.weight * Decimal::ONE_HUNDRED),
                String::new(),
            ]),
            HoldingStatus::Unpriced(reason) => {
                record.extend((0..6).map(|_| String::new()));
                record.push(reason.to_string());
            }
        }
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}
